//! Alert sound synthesis and playback.

pub mod notifier;
pub mod pattern;
pub mod sink;

pub use notifier::SoundNotifier;
pub use pattern::{Pattern, Waveform};
pub use sink::{AudioSink, NullSink, SoundError};
