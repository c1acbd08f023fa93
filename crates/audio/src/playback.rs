//! Speaker output for the agent's voice.
//!
//! The output callback owns a [`PlaybackRenderer`]: a ring buffer of mono
//! samples plus the receiving end of a message channel. The runtime side
//! decodes and resamples PCM, then posts it; the callback applies messages in
//! order before every render, so a flush discards exactly what was queued
//! before it.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Observer, Producer};
use shoplive_core::CodecError;
use shoplive_core::codec::{self, PLAYBACK_SAMPLE_RATE};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::error::AudioError;
use crate::resample::StreamResampler;

/// Seconds of audio the jitter buffer holds before dropping new samples.
pub const DEFAULT_BUFFER_SECS: u32 = 180;
/// Input chunk for the playback resampler, 10 ms at 24 kHz.
const RESAMPLER_CHUNK: usize = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackConfig {
    /// Rate of incoming PCM when the envelope does not state one.
    pub source_rate: u32,
    pub buffer_secs: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            source_rate: PLAYBACK_SAMPLE_RATE,
            buffer_secs: DEFAULT_BUFFER_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackMessage {
    Samples(Vec<f32>),
    Flush,
}

/// FIFO of mono samples waiting to be played.
pub struct PlaybackQueue {
    ring: HeapRb<f32>,
}

impl PlaybackQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: HeapRb::new(capacity.max(1)),
        }
    }

    /// Appends samples; whatever does not fit is dropped. Returns how many
    /// were accepted.
    pub fn push(&mut self, samples: &[f32]) -> usize {
        let accepted = self.ring.push_slice(samples);
        if accepted < samples.len() {
            trace!(dropped = samples.len() - accepted, "Playback buffer full");
        }
        accepted
    }

    /// Discards every queued sample, returning how many were dropped.
    pub fn flush(&mut self) -> usize {
        let queued = self.ring.occupied_len();
        Consumer::skip(&mut self.ring, queued)
    }

    /// Fills interleaved output frames, duplicating each mono sample across
    /// `channels`. Frames past the end of the queue are silence. Returns the
    /// number of frames taken from the queue.
    pub fn fill(&mut self, out: &mut [f32], channels: usize) -> usize {
        let mut played = 0;
        for frame in out.chunks_mut(channels.max(1)) {
            let sample = match self.ring.try_pop() {
                Some(sample) => {
                    played += 1;
                    sample
                }
                None => 0.0,
            };
            frame.fill(sample);
        }
        played
    }

    pub fn len(&self) -> usize {
        self.ring.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

/// Callback-side state: the queue and its inbox.
pub struct PlaybackRenderer {
    queue: PlaybackQueue,
    rx: mpsc::UnboundedReceiver<PlaybackMessage>,
    channels: usize,
}

impl PlaybackRenderer {
    /// Applies pending messages, then renders one output buffer.
    pub fn render(&mut self, out: &mut [f32]) {
        while let Ok(message) = self.rx.try_recv() {
            match message {
                PlaybackMessage::Samples(samples) => {
                    self.queue.push(&samples);
                }
                PlaybackMessage::Flush => {
                    self.queue.flush();
                }
            }
        }
        self.queue.fill(out, self.channels);
    }

    pub fn queue(&self) -> &PlaybackQueue {
        &self.queue
    }
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only played, paused and dropped by its owning
/// pipeline; its callback runs on a thread cpal manages.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// The agent's voice output.
///
/// The output stream is created on the first [`start`](Self::start) and kept
/// for the life of the pipeline; [`stop`](Self::stop) only pauses it.
pub struct PlaybackPipeline {
    config: PlaybackConfig,
    stream: Option<SendableStream>,
    playing: bool,
    tx: Option<mpsc::UnboundedSender<PlaybackMessage>>,
    device_rate: u32,
    source_rate: u32,
    resampler: Option<StreamResampler>,
    /// A flush posted while paused that the callback has not seen yet.
    paused_flush: bool,
}

impl PlaybackPipeline {
    pub fn new(config: PlaybackConfig) -> Self {
        Self {
            config,
            stream: None,
            playing: false,
            tx: None,
            device_rate: config.source_rate,
            source_rate: config.source_rate,
            resampler: None,
            paused_flush: false,
        }
    }

    /// Opens the output stream on first use, resumes it afterwards.
    pub fn start(&mut self) -> Result<(), AudioError> {
        match &self.stream {
            None => {
                let stream = self.open()?;
                self.stream = Some(SendableStream(stream));
            }
            Some(SendableStream(stream)) if !self.playing => {
                stream
                    .play()
                    .map_err(|e| AudioError::Device(format!("failed to resume output: {}", e)))?;
                debug!("Playback resumed");
            }
            Some(_) => {}
        }
        self.playing = true;
        self.paused_flush = false;
        Ok(())
    }

    /// Pauses output. Queued audio is kept and plays on the next `start`;
    /// audio arriving while paused is dropped, since the callback is not
    /// draining its inbox.
    pub fn stop(&mut self) {
        if !self.playing {
            return;
        }
        if let Some(SendableStream(stream)) = &self.stream
            && let Err(e) = stream.pause()
        {
            warn!(error = %e, "Failed to pause output stream");
        }
        self.playing = false;
        debug!("Playback paused");
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Queues little-endian int16 PCM at the configured source rate.
    pub fn enqueue(&mut self, pcm: &[u8]) -> Result<(), CodecError> {
        let samples = codec::float_from_pcm(pcm)?;
        self.enqueue_samples(&samples, self.config.source_rate);
        Ok(())
    }

    /// Queues base64 PCM as carried by an `audio/pcm` envelope.
    pub fn enqueue_base64(&mut self, data: &str, sample_rate: Option<u32>) -> Result<(), CodecError> {
        let samples = codec::decode_base64_pcm_to_f32(data)?;
        self.enqueue_samples(&samples, sample_rate.unwrap_or(self.config.source_rate));
        Ok(())
    }

    /// Discards everything queued but not yet played.
    pub fn flush(&mut self) {
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
        if !self.playing {
            if self.paused_flush {
                return;
            }
            self.paused_flush = true;
        }
        if let Some(tx) = &self.tx {
            let _ = tx.send(PlaybackMessage::Flush);
        }
    }

    /// Wires a renderer for a device running at `device_rate` with `channels`
    /// interleaved channels. Replaces any previous renderer.
    pub fn attach_renderer(
        &mut self,
        device_rate: u32,
        channels: usize,
    ) -> Result<PlaybackRenderer, AudioError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.resampler = Some(StreamResampler::new(
            self.config.source_rate,
            device_rate,
            RESAMPLER_CHUNK,
        )?);
        self.source_rate = self.config.source_rate;
        self.device_rate = device_rate;
        self.tx = Some(tx);

        let capacity = device_rate as usize * self.config.buffer_secs as usize;
        Ok(PlaybackRenderer {
            queue: PlaybackQueue::with_capacity(capacity),
            rx,
            channels: channels.max(1),
        })
    }

    fn enqueue_samples(&mut self, samples: &[f32], source_rate: u32) {
        let Some(tx) = &self.tx else {
            debug!(samples = samples.len(), "Playback not started; dropping audio");
            return;
        };
        if !self.playing {
            trace!(samples = samples.len(), "Playback paused; dropping audio");
            return;
        }
        if source_rate != self.source_rate {
            match StreamResampler::new(source_rate, self.device_rate, RESAMPLER_CHUNK) {
                Ok(resampler) => {
                    info!(source_rate, device_rate = self.device_rate, "Playback source rate changed");
                    self.resampler = Some(resampler);
                    self.source_rate = source_rate;
                }
                Err(e) => {
                    warn!(error = %e, "Cannot play audio at this rate; dropping");
                    return;
                }
            }
        }
        let resampled = match self.resampler.as_mut() {
            Some(resampler) => resampler.process(samples),
            None => samples.to_vec(),
        };
        if !resampled.is_empty() {
            let _ = tx.send(PlaybackMessage::Samples(resampled));
        }
    }

    fn open(&mut self) -> Result<cpal::Stream, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::Device("no output device available".to_string()))?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".into());

        let default_config = device
            .default_output_config()
            .map_err(AudioError::from_config_error)?;
        let sample_format = default_config.sample_format();
        let stream_config: cpal::StreamConfig = default_config.into();
        info!(
            device = %device_name,
            rate = stream_config.sample_rate.0,
            channels = stream_config.channels,
            format = ?sample_format,
            "Audio output config"
        );

        let renderer =
            self.attach_renderer(stream_config.sample_rate.0, stream_config.channels as usize)?;
        let stream = match sample_format {
            SampleFormat::F32 => build_output::<f32>(&device, &stream_config, renderer),
            SampleFormat::I16 => build_output::<i16>(&device, &stream_config, renderer),
            SampleFormat::U16 => build_output::<u16>(&device, &stream_config, renderer),
            other => Err(AudioError::Device(format!(
                "unsupported output sample format {:?}",
                other
            ))),
        }?;
        stream
            .play()
            .map_err(|e| AudioError::Device(format!("failed to start output stream: {}", e)))?;
        info!(device = %device_name, "Playback started");
        Ok(stream)
    }
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut renderer: PlaybackRenderer,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                renderer.render(&mut scratch);
                for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                    *out = T::from_sample(sample);
                }
            },
            |err| error!(error = %err, "Audio output stream error"),
            None,
        )
        .map_err(AudioError::from_build_error)
}
