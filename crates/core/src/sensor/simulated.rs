use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::{SEA_LEVEL_PRESSURE_HPA, SensorReading, now_millis};

/// Per-call drift bounds (±) and starting baseline.
pub const TEMP_DRIFT: f64 = 0.15;
pub const HUMID_DRIFT: f64 = 0.5;
pub const PRESSURE_DRIFT: f64 = 0.1;
pub const HUMID_MIN: f64 = 10.0;
pub const HUMID_MAX: f64 = 99.0;

const BASE_TEMP: f64 = 24.0;
const BASE_HUMID: f64 = 55.0;

/// Simulated DHT22 + BMP280 pair. Each call performs one bounded random-walk
/// step from the previous state, so consecutive readings stay close.
#[derive(Debug)]
pub struct Simulator {
    rng: StdRng,
    temperature: f64,
    humidity: f64,
    pressure: f64,
}

impl Simulator {
    /// Entropy-seeded simulator at the standard baseline.
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Deterministic simulator for tests and replays.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng,
            temperature: BASE_TEMP,
            humidity: BASE_HUMID,
            pressure: SEA_LEVEL_PRESSURE_HPA,
        }
    }

    /// Advance the walk one step and return the new state as a reading.
    pub fn next_reading(&mut self) -> SensorReading {
        self.temperature += self.rng.gen_range(-TEMP_DRIFT..=TEMP_DRIFT);
        self.humidity = (self.humidity + self.rng.gen_range(-HUMID_DRIFT..=HUMID_DRIFT))
            .clamp(HUMID_MIN, HUMID_MAX);
        self.pressure += self.rng.gen_range(-PRESSURE_DRIFT..=PRESSURE_DRIFT);

        SensorReading::derived(now_millis(), self.temperature, self.humidity, self.pressure)
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}
