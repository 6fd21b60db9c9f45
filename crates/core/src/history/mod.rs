pub mod archive;
pub mod buffer;

pub use archive::{HistoricalProvider, HistoryError};
pub use buffer::{AlertLogEntry, HistoryBuffer};
