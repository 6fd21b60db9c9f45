//! Environmental monitoring core: reading acquisition, polling, rolling
//! history, threshold alerts with sound, historical series, and AI analysis.

pub mod alert;
pub mod analysis;
pub mod config;
pub mod history;
pub mod runtime;
pub mod sensor;
pub mod sound;
pub mod types;

#[cfg(test)]
mod test_support;
