use super::pattern::Pattern;
use super::sink::{AudioSink, NullSink, SoundError};
use crate::types::{SoundType, Thresholds};

type OpenSink = Box<dyn Fn() -> Result<Box<dyn AudioSink>, SoundError>>;

/// Plays alert sounds. Owns the audio output: opened on first use, released
/// by [`release`](Self::release) or on drop. Never fails the caller.
pub struct SoundNotifier {
    open: OpenSink,
    sink: Option<Box<dyn AudioSink>>,
}

impl SoundNotifier {
    /// Default backend: the host output device when built with the `audio`
    /// feature, otherwise a logging no-op sink at `sample_rate`.
    pub fn new(sample_rate: u32) -> Self {
        #[cfg(feature = "audio")]
        {
            let _ = sample_rate;
            Self::with_backend(|| Ok(Box::new(super::sink::CpalSink::open()?) as Box<dyn AudioSink>))
        }
        #[cfg(not(feature = "audio"))]
        {
            Self::with_backend(move || Ok(Box::new(NullSink::new(sample_rate)) as Box<dyn AudioSink>))
        }
    }

    /// Silent notifier, regardless of features.
    pub fn silent(sample_rate: u32) -> Self {
        Self::with_backend(move || Ok(Box::new(NullSink::new(sample_rate)) as Box<dyn AudioSink>))
    }

    pub fn with_backend(
        open: impl Fn() -> Result<Box<dyn AudioSink>, SoundError> + 'static,
    ) -> Self {
        Self { open: Box::new(open), sink: None }
    }

    /// Alert-onset hook: plays the configured pattern if sound is enabled.
    /// Returns whether a sound was handed to the output.
    pub fn on_alert_onset(&mut self, thresholds: &Thresholds) -> bool {
        if !thresholds.sound_enabled {
            return false;
        }
        self.play(thresholds.sound_type)
    }

    /// Best effort: failures are logged and the output is dropped so the next
    /// call reopens it.
    pub fn play(&mut self, sound: SoundType) -> bool {
        if self.sink.is_none() {
            match (self.open)() {
                Ok(sink) => self.sink = Some(sink),
                Err(e) => {
                    tracing::warn!(error = %e, sound = %sound, "audio output unavailable, alert sound skipped");
                    return false;
                }
            }
        }
        let Some(sink) = self.sink.as_mut() else {
            return false;
        };

        let pcm = Pattern::new(sound).render(sink.sample_rate());
        match sink.play(&pcm) {
            Ok(()) => {
                tracing::debug!(sound = %sound, samples = pcm.len(), "alert sound queued");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, sound = %sound, "alert sound failed");
                self.release();
                false
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.sink.is_some()
    }

    /// Close the audio output. Idempotent.
    pub fn release(&mut self) {
        if self.sink.take().is_some() {
            tracing::debug!("audio output released");
        }
    }
}

impl Drop for SoundNotifier {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for SoundNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundNotifier").field("open", &self.is_open()).finish()
    }
}
