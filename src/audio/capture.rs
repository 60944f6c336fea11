//! Microphone capture pipeline
//!
//! Owns the input device and turns each capture block into one `audio`
//! frame: resample to 16 kHz, encode PCM16, base64, push onto the
//! transport feed.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream};
use tokio::sync::mpsc;

use crate::protocol::ClientMessage;
use crate::{Error, Result};

use super::{encode_base64, float_to_pcm16, resample};

/// Transport sample rate for captured audio (16 kHz for speech input)
pub const CAPTURE_RATE: u32 = 16000;

/// Preferred device capture rate; any supported rate >= 16 kHz is accepted
pub const NATIVE_RATE: u32 = 48000;

/// Captures audio from the default input device and emits encoded
/// [`ClientMessage::Audio`] frames
pub struct CapturePipeline {
    frames: mpsc::UnboundedSender<ClientMessage>,
    stream: Option<Stream>,
    device_rate: u32,
}

impl CapturePipeline {
    /// Create a capture pipeline feeding the given transport channel
    #[must_use]
    pub fn new(frames: mpsc::UnboundedSender<ClientMessage>) -> Self {
        Self {
            frames,
            stream: None,
            device_rate: NATIVE_RATE,
        }
    }

    /// Start capturing. No-op when already running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Device`] if no input device is available, access is
    /// denied, or no usable mono config exists. Capture stays stopped.
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Device("no input device available".to_string()))?;

        let supported: Vec<_> = device
            .supported_input_configs()
            .map_err(|e| Error::Device(e.to_string()))?
            .filter(|c| c.channels() == 1)
            .collect();

        let config = supported
            .iter()
            .find(|c| {
                c.min_sample_rate() <= SampleRate(NATIVE_RATE)
                    && c.max_sample_rate() >= SampleRate(NATIVE_RATE)
            })
            .map(|c| c.clone().with_sample_rate(SampleRate(NATIVE_RATE)))
            .or_else(|| {
                // Fallback: highest supported mono rate, as long as we can
                // still decimate down to the transport rate
                supported
                    .iter()
                    .find(|c| c.max_sample_rate() >= SampleRate(CAPTURE_RATE))
                    .map(|c| c.clone().with_max_sample_rate())
            })
            .ok_or_else(|| Error::Device("no suitable input config found".to_string()))?
            .config();

        let device_rate = config.sample_rate.0;
        let frames = self.frames.clone();

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let block = resample(data, device_rate, CAPTURE_RATE);
                    let frame = ClientMessage::Audio {
                        data: encode_base64(&float_to_pcm16(&block)),
                    };
                    if frames.send(frame).is_err() {
                        tracing::warn!("capture frame receiver dropped");
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Device(e.to_string()))?;

        stream.play().map_err(|e| Error::Device(e.to_string()))?;
        self.stream = Some(stream);
        self.device_rate = device_rate;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            rate = device_rate,
            "audio capture started"
        );
        Ok(())
    }

    /// Stop capturing and emit one `audio_end` frame to mark the utterance
    /// boundary. Safe to call when not capturing (no frame is emitted).
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            let _ = self.frames.send(ClientMessage::AudioEnd);
            tracing::debug!("audio capture stopped");
        }
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// The device rate selected at start, before decimation
    #[must_use]
    pub const fn device_rate(&self) -> u32 {
        self.device_rate
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        // Drop the stream without emitting audio_end; an explicit stop()
        // marks the utterance boundary, a teardown does not.
        self.stream.take();
    }
}
