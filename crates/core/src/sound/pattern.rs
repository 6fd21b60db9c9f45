use std::f64::consts::PI;
use std::time::Duration;

use crate::types::SoundType;

/// Oscillator shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
    Triangle,
}

impl Waveform {
    /// Sample at `phase` in [0, 1).
    fn sample(self, phase: f64) -> f64 {
        match self {
            Self::Sine => (2.0 * PI * phase).sin(),
            Self::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Self::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        }
    }
}

fn linear(from: f64, to: f64, t0: f64, t1: f64, t: f64) -> f64 {
    let k = ((t - t0) / (t1 - t0)).clamp(0.0, 1.0);
    from + (to - from) * k
}

/// Exponential ramp; both ends must be positive.
fn exponential(from: f64, to: f64, t0: f64, t1: f64, t: f64) -> f64 {
    let k = ((t - t0) / (t1 - t0)).clamp(0.0, 1.0);
    from * (to / from).powf(k)
}

/// Oscillator, pitch curve and gain envelope of one alert sound.
#[derive(Debug, Clone, Copy)]
pub struct Pattern {
    sound: SoundType,
}

impl Pattern {
    pub fn new(sound: SoundType) -> Self {
        Self { sound }
    }

    pub fn waveform(&self) -> Waveform {
        match self.sound {
            SoundType::Beep => Waveform::Sine,
            SoundType::Alarm => Waveform::Square,
            SoundType::Chime => Waveform::Triangle,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(match self.sound {
            SoundType::Beep => 300,
            SoundType::Alarm => 500,
            SoundType::Chime => 800,
        })
    }

    /// Pitch in Hz at `t` seconds.
    pub fn frequency_at(&self, t: f64) -> f64 {
        match self.sound {
            SoundType::Beep => 880.0,
            SoundType::Alarm => {
                if t < 0.1 {
                    exponential(440.0, 880.0, 0.0, 0.1, t)
                } else {
                    exponential(880.0, 440.0, 0.1, 0.2, t)
                }
            }
            SoundType::Chime => exponential(523.25, 783.99, 0.0, 0.4, t),
        }
    }

    /// Linear gain at `t` seconds.
    pub fn gain_at(&self, t: f64) -> f64 {
        match self.sound {
            SoundType::Beep => {
                if t < 0.05 {
                    linear(0.0, 0.2, 0.0, 0.05, t)
                } else {
                    exponential(0.2, 0.01, 0.05, 0.3, t)
                }
            }
            SoundType::Alarm => {
                if t < 0.05 {
                    linear(0.0, 0.1, 0.0, 0.05, t)
                } else {
                    linear(0.1, 0.0, 0.05, 0.5, t)
                }
            }
            SoundType::Chime => {
                if t < 0.1 {
                    linear(0.0, 0.2, 0.0, 0.1, t)
                } else {
                    exponential(0.2, 0.01, 0.1, 0.8, t)
                }
            }
        }
    }

    /// Render mono PCM at `sample_rate`. Phase is accumulated so pitch sweeps
    /// stay continuous.
    pub fn render(&self, sample_rate: u32) -> Vec<f32> {
        let rate = f64::from(sample_rate.max(1));
        let count = (self.duration().as_secs_f64() * rate).round() as usize;
        let wave = self.waveform();
        let mut phase = 0.0_f64;
        let mut out = Vec::with_capacity(count);
        for n in 0..count {
            let t = n as f64 / rate;
            out.push((wave.sample(phase) * self.gain_at(t)) as f32);
            phase = (phase + self.frequency_at(t) / rate).fract();
        }
        out
    }
}
