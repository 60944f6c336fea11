//! Speaker playback pipeline
//!
//! A strictly-ordered queue of decoded chunks drained one at a time:
//! the next chunk starts only after the previous one has played out in
//! full, so consecutive model audio renders gapless and non-overlapping.
//! `flush` drops queued chunks on interruption; a chunk already rendering
//! finishes naturally.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::{Error, Result};

use super::pcm16_to_float;

/// Playback sample rate (matches the model's PCM output)
pub const PLAYBACK_RATE: u32 = 24000;

/// Renders one chunk of f32 samples, returning only after the chunk's full
/// playback duration has elapsed. That await is what serializes the queue.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play the chunk to completion
    async fn play(&self, samples: Vec<f32>) -> Result<()>;
}

#[derive(Default)]
struct QueueState {
    chunks: VecDeque<Vec<f32>>,
    playing: bool,
}

/// Ordered, gapless playback of decoded PCM chunks through an [`AudioSink`]
#[derive(Clone)]
pub struct PlaybackPipeline {
    state: Arc<Mutex<QueueState>>,
    sink: Arc<dyn AudioSink>,
}

impl PlaybackPipeline {
    /// Create a pipeline rendering through the given sink
    #[must_use]
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            sink,
        }
    }

    /// Decode a PCM16 chunk and append it to the queue, starting the drain
    /// task if idle. An enqueue while draining is just a push: the running
    /// drain already observes the non-empty queue.
    pub fn enqueue(&self, chunk: &[i16]) {
        let samples = pcm16_to_float(chunk);

        // The playing flag flips inside the same lock as the push, so a
        // drain that just saw an empty queue cannot race a fresh enqueue
        // into a lost wakeup.
        let start_drain = {
            let mut state = self.state.lock().unwrap();
            state.chunks.push_back(samples);
            if state.playing {
                false
            } else {
                state.playing = true;
                true
            }
        };

        if start_drain {
            let pipeline = self.clone();
            tokio::spawn(async move { pipeline.drain().await });
        }
    }

    /// Drop all queued-not-yet-started chunks immediately. The chunk
    /// currently rendering is allowed to finish.
    pub fn flush(&self) {
        let dropped = {
            let mut state = self.state.lock().unwrap();
            let n = state.chunks.len();
            state.chunks.clear();
            n
        };
        if dropped > 0 {
            tracing::debug!(dropped, "playback queue flushed");
        }
    }

    /// True when nothing is queued and nothing is rendering
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock().unwrap();
        !state.playing && state.chunks.is_empty()
    }

    /// Number of chunks waiting to render
    #[must_use]
    pub fn queued(&self) -> usize {
        self.state.lock().unwrap().chunks.len()
    }

    async fn drain(&self) {
        loop {
            let chunk = {
                let mut state = self.state.lock().unwrap();
                match state.chunks.pop_front() {
                    Some(chunk) => chunk,
                    None => {
                        state.playing = false;
                        return;
                    }
                }
            };

            if let Err(e) = self.sink.play(chunk).await {
                tracing::warn!(error = %e, "playback chunk failed");
            }
        }
    }
}

/// Plays f32 mono chunks at 24 kHz on the default output device. The output
/// stream config is resolved lazily on the first chunk and reused after.
#[derive(Default)]
pub struct CpalSink {
    config: Mutex<Option<StreamConfig>>,
}

impl CpalSink {
    /// Create a sink; the output device is not touched until the first play
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn output_config(&self) -> Result<StreamConfig> {
        let mut cached = self.config.lock().unwrap();
        if let Some(config) = cached.as_ref() {
            return Ok(config.clone());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Device("no output device available".to_string()))?;

        let supported = device
            .supported_output_configs()
            .map_err(|e| Error::Device(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_RATE)
            })
            .or_else(|| {
                // Fallback: stereo, samples duplicated across the frame
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(PLAYBACK_RATE)
                        && c.max_sample_rate() >= SampleRate(PLAYBACK_RATE)
                })
            })
            .ok_or_else(|| Error::Device("no suitable output config found".to_string()))?;

        let config = supported.with_sample_rate(SampleRate(PLAYBACK_RATE)).config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        *cached = Some(config.clone());
        Ok(config)
    }
}

#[async_trait]
impl AudioSink for CpalSink {
    async fn play(&self, samples: Vec<f32>) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let config = self.output_config()?;

        // cpal streams are not Send, so the stream lives entirely inside a
        // blocking task that sleeps out the chunk duration.
        tokio::task::spawn_blocking(move || play_blocking(&config, samples))
            .await
            .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
    }
}

fn play_blocking(config: &StreamConfig, samples: Vec<f32>) -> Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Device("no output device".to_string()))?;

    let channels = config.channels as usize;
    let total = samples.len();

    let samples = Arc::new(samples);
    let position = Arc::new(Mutex::new(0usize));
    let finished = Arc::new(Mutex::new(false));

    let samples_cb = Arc::clone(&samples);
    let position_cb = Arc::clone(&position);
    let finished_cb = Arc::clone(&finished);

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut pos = position_cb.lock().unwrap();
                for frame in data.chunks_mut(channels) {
                    let sample = if *pos < samples_cb.len() {
                        let s = samples_cb[*pos];
                        *pos += 1;
                        s
                    } else {
                        *finished_cb.lock().unwrap() = true;
                        0.0
                    };
                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    // Await the chunk's full duration, then poll briefly for the callback
    // to confirm it ran dry.
    let duration_ms = (total as u64 * 1000) / u64::from(PLAYBACK_RATE);
    std::thread::sleep(Duration::from_millis(duration_ms));

    let deadline = std::time::Instant::now() + Duration::from_millis(500);
    while !*finished.lock().unwrap() {
        if std::time::Instant::now() > deadline {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    drop(stream);
    tracing::trace!(samples = total, "chunk playback complete");
    Ok(())
}
