/// Why a sound could not be played.
#[derive(Debug, thiserror::Error)]
pub enum SoundError {
    #[error("no audio output device")]
    NoDevice,
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("unsupported output format: {0}")]
    Unsupported(String),
}

/// An open audio output.
pub trait AudioSink {
    /// Rate the sink expects samples at.
    fn sample_rate(&self) -> u32;

    /// Queue mono samples for playback. Must not block for the clip length.
    fn play(&mut self, samples: &[f32]) -> Result<(), SoundError>;
}

/// Sink used when no audio backend is compiled in. Logs and discards.
#[derive(Debug)]
pub struct NullSink {
    sample_rate: u32,
}

impl NullSink {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

impl AudioSink for NullSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn play(&mut self, samples: &[f32]) -> Result<(), SoundError> {
        tracing::debug!(samples = samples.len(), "audio backend disabled, alert sound discarded");
        Ok(())
    }
}

#[cfg(feature = "audio")]
pub use self::cpal_sink::CpalSink;

#[cfg(feature = "audio")]
mod cpal_sink {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{FromSample, Sample, SampleFormat, SizedSample};

    use super::{AudioSink, SoundError};

    type Queue = Arc<Mutex<VecDeque<f32>>>;

    /// Default host output device. Samples are fed to the device callback
    /// through a shared queue; silence is written when it runs dry.
    pub struct CpalSink {
        _stream: cpal::Stream,
        queue: Queue,
        sample_rate: u32,
    }

    impl CpalSink {
        pub fn open() -> Result<Self, SoundError> {
            let host = cpal::default_host();
            let device = host.default_output_device().ok_or(SoundError::NoDevice)?;
            let supported = device
                .default_output_config()
                .map_err(|e| SoundError::Stream(e.to_string()))?;

            let format = supported.sample_format();
            let config = supported.config();
            let sample_rate = config.sample_rate.0;
            let queue: Queue = Arc::new(Mutex::new(VecDeque::new()));

            let stream = match format {
                SampleFormat::F32 => build::<f32>(&device, &config, Arc::clone(&queue)),
                SampleFormat::I16 => build::<i16>(&device, &config, Arc::clone(&queue)),
                SampleFormat::U16 => build::<u16>(&device, &config, Arc::clone(&queue)),
                other => return Err(SoundError::Unsupported(format!("{other:?}"))),
            }?;
            stream.play().map_err(|e| SoundError::Stream(e.to_string()))?;

            tracing::info!(sample_rate, channels = config.channels, ?format, "audio output opened");
            Ok(Self { _stream: stream, queue, sample_rate })
        }
    }

    fn build<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        feed: Queue,
    ) -> Result<cpal::Stream, SoundError>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = usize::from(config.channels.max(1));
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let mut q = match feed.lock() {
                        Ok(q) => q,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    fill_frames(data, channels, &mut q);
                },
                |err| tracing::warn!(error = %err, "audio output stream error"),
                None,
            )
            .map_err(|e| SoundError::Stream(e.to_string()))
    }

    /// Copy one queued mono sample into every channel of each frame.
    pub(super) fn fill_frames<T>(data: &mut [T], channels: usize, q: &mut VecDeque<f32>)
    where
        T: Sample + FromSample<f32>,
    {
        for frame in data.chunks_mut(channels) {
            let s = q.pop_front().unwrap_or(0.0);
            frame.fill(T::from_sample(s));
        }
    }

    impl AudioSink for CpalSink {
        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        fn play(&mut self, samples: &[f32]) -> Result<(), SoundError> {
            let mut q = self
                .queue
                .lock()
                .map_err(|_| SoundError::Stream("sample queue poisoned".into()))?;
            q.extend(samples.iter().copied());
            Ok(())
        }
    }
}
