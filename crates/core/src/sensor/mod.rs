//! Reading acquisition: a seeded random-walk simulator and an HTTP device client.

pub mod device;
pub mod simulated;

use std::time::Duration;

pub use device::DeviceClient;
pub use simulated::Simulator;

use crate::types::{SensorReading, SourceMode};

/// Why a single reading could not be acquired.
#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("device did not answer within {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("device returned status {0}")]
    Status(u16),
    #[error("malformed device payload: {0}")]
    Malformed(String),
}

/// Where a poll loop gets its readings from.
#[derive(Debug)]
pub enum ReadingSource {
    Simulated(Simulator),
    Device(DeviceClient),
}

impl ReadingSource {
    pub fn mode(&self) -> SourceMode {
        match self {
            Self::Simulated(_) => SourceMode::Mock,
            Self::Device(_) => SourceMode::Device,
        }
    }

    /// Acquire one reading. The simulated variant never fails.
    pub async fn fetch(&mut self) -> Result<SensorReading, AcquisitionError> {
        match self {
            Self::Simulated(sim) => Ok(sim.next_reading()),
            Self::Device(client) => client.fetch().await,
        }
    }
}
