//! Threshold evaluation and alert-onset detection.

pub mod edge;
pub mod evaluator;

pub use edge::{OnsetDetector, onset};
pub use evaluator::{AlertState, Violation};
