//! Microphone capture gated by voice activity.
//!
//! Two halves talk over one bounded channel:
//! - [`CaptureFrontEnd`] runs inside the cpal callback. It downmixes, resamples
//!   to 16 kHz, frames fixed-size blocks and classifies each block with the VAD.
//!   It never blocks; if the channel is full the message is dropped.
//! - [`CapturePump`] runs on the tokio runtime. It owns the [`VoiceWindow`],
//!   drops blocks while the window is silent and forwards the rest as
//!   `audio/pcm` envelopes.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use shoplive_core::codec::{self, CAPTURE_SAMPLE_RATE};
use shoplive_core::{Clock, EventBus, NamedEvent, TokioClock, envelope};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::error::AudioError;
use crate::resample::StreamResampler;
use crate::vad::{VadConfig, VadReport, VadStage};
use crate::window::{VoiceWindow, WindowTransition};

/// Samples per block, one processing quantum.
pub const DEFAULT_BLOCK_SIZE: usize = 128;
/// Input device picked over the host default when present.
pub const DEFAULT_PREFERRED_DEVICE: &str = "Wireless GO II";
const DEFAULT_CHANNEL_CAPACITY: usize = 512;
/// Input chunk for the capture resampler, 10 ms at 48 kHz.
const RESAMPLER_CHUNK: usize = 480;

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Substring of the input device name to prefer.
    pub preferred_device: Option<String>,
    pub vad: VadConfig,
    pub block_size: usize,
    /// Messages buffered between the audio thread and the pump.
    pub channel_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            preferred_device: Some(DEFAULT_PREFERRED_DEVICE.to_string()),
            vad: VadConfig::default(),
            block_size: DEFAULT_BLOCK_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Posted from the audio thread to the pump.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureMessage {
    Vad(VadReport),
    Block(Vec<f32>),
}

/// Capture activity published on the event bus.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// A block left the pipeline as an envelope.
    BlockForwarded { samples: usize },
    VoiceStarted,
    VoiceStopped { samples_per_sec: f64 },
}

impl CaptureEvent {
    pub const AUDIO_RECORDER_MESSAGE: &'static str = "audio-recorder-message";
    pub const VOICE_STARTED: &'static str = "voice-started";
    pub const VOICE_STOPPED: &'static str = "voice-stopped";
}

impl NamedEvent for CaptureEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::BlockForwarded { .. } => Self::AUDIO_RECORDER_MESSAGE,
            Self::VoiceStarted => Self::VOICE_STARTED,
            Self::VoiceStopped { .. } => Self::VOICE_STOPPED,
        }
    }
}

/// Cuts a continuous sample stream into equal blocks.
#[derive(Debug)]
pub struct BlockFramer {
    block_size: usize,
    pending: Vec<f32>,
}

impl BlockFramer {
    pub fn new(block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            block_size,
            pending: Vec::with_capacity(block_size * 2),
        }
    }

    /// Appends samples and returns every block completed by them.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        self.pending.extend_from_slice(samples);
        let complete = self.pending.len() / self.block_size;
        let mut blocks = Vec::with_capacity(complete);
        for _ in 0..complete {
            blocks.push(self.pending.drain(..self.block_size).collect());
        }
        blocks
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Averages interleaved frames down to one channel.
pub fn downmix_to_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Audio-thread half of the pipeline.
pub struct CaptureFrontEnd {
    channels: usize,
    resampler: StreamResampler,
    framer: BlockFramer,
    vad: VadStage,
    tx: mpsc::Sender<CaptureMessage>,
    dropped: u64,
}

impl CaptureFrontEnd {
    pub fn new(
        channels: usize,
        device_rate: u32,
        config: &CaptureConfig,
        tx: mpsc::Sender<CaptureMessage>,
    ) -> Result<Self, AudioError> {
        Ok(Self {
            channels: channels.max(1),
            resampler: StreamResampler::new(device_rate, CAPTURE_SAMPLE_RATE, RESAMPLER_CHUNK)?,
            framer: BlockFramer::new(config.block_size),
            vad: VadStage::new(&config.vad),
            tx,
            dropped: 0,
        })
    }

    /// Handles one callback's worth of interleaved samples.
    pub fn process(&mut self, interleaved: &[f32]) {
        let mono = downmix_to_mono(interleaved, self.channels);
        let resampled = self.resampler.process(&mono);
        for block in self.framer.push(&resampled) {
            // The report goes first so a voiced block is forwarded immediately.
            let report = self.vad.process(&block);
            self.post(CaptureMessage::Vad(report));
            self.post(CaptureMessage::Block(block));
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn post(&mut self, message: CaptureMessage) {
        match self.tx.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped += 1;
                trace!(dropped = self.dropped, "Capture channel full; dropping message");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Receives each forwarded block as a ready-to-send `audio/pcm` envelope.
pub type BlockHandler = Box<dyn FnMut(String) + Send>;

/// Runtime half of the pipeline.
pub struct CapturePump {
    window: VoiceWindow,
    clock: Arc<dyn Clock>,
    bus: EventBus<CaptureEvent>,
    on_block: BlockHandler,
}

impl CapturePump {
    pub fn new(
        vad: &VadConfig,
        clock: Arc<dyn Clock>,
        bus: EventBus<CaptureEvent>,
        on_block: BlockHandler,
    ) -> Self {
        Self {
            window: VoiceWindow::new(vad.hangover),
            clock,
            bus,
            on_block,
        }
    }

    pub fn window(&self) -> &VoiceWindow {
        &self.window
    }

    pub fn handle(&mut self, message: CaptureMessage) {
        match message {
            CaptureMessage::Vad(report) => {
                match self.window.apply(report, self.clock.now()) {
                    Some(WindowTransition::VoiceStarted) => self.bus.emit(CaptureEvent::VoiceStarted),
                    Some(WindowTransition::VoiceStopped { samples_per_sec }) => {
                        self.bus.emit(CaptureEvent::VoiceStopped { samples_per_sec })
                    }
                    None => {}
                }
            }
            CaptureMessage::Block(block) => {
                if self.window.is_silence() {
                    return;
                }
                let message =
                    envelope::encode_audio_pcm(&codec::encode_f32_to_base64_pcm(&block));
                self.window.record_forwarded(block.len());
                trace!(samples = block.len(), "Forwarding audio block");
                self.bus.emit(CaptureEvent::BlockForwarded {
                    samples: block.len(),
                });
                (self.on_block)(message);
            }
        }
    }

    /// Drains messages until the audio side hangs up.
    pub async fn run(mut self, mut rx: mpsc::Receiver<CaptureMessage>) {
        while let Some(message) = rx.recv().await {
            self.handle(message);
        }
        debug!("Capture pump stopped");
    }
}

/// Index of the first device whose name contains `preferred`, skipping the
/// `default` pseudo-device.
pub fn select_preferred(names: &[String], preferred: &str) -> Option<usize> {
    names
        .iter()
        .position(|name| !name.eq_ignore_ascii_case("default") && name.contains(preferred))
}

/// Names of the host's input devices; empty when enumeration fails.
pub fn list_input_devices() -> Vec<String> {
    let host = cpal::default_host();
    match host.input_devices() {
        Ok(devices) => devices.filter_map(|device| device.name().ok()).collect(),
        Err(e) => {
            warn!(error = %e, "Failed to enumerate input devices");
            Vec::new()
        }
    }
}

fn select_input_device(host: &cpal::Host, preferred: Option<&str>) -> Result<cpal::Device, AudioError> {
    if let Some(preferred) = preferred {
        match host.input_devices() {
            Ok(devices) => {
                let mut devices: Vec<cpal::Device> = devices.collect();
                let names: Vec<String> = devices
                    .iter()
                    .map(|device| device.name().unwrap_or_default())
                    .collect();
                if let Some(index) = select_preferred(&names, preferred) {
                    info!(device = %names[index], "Using preferred input device");
                    return Ok(devices.swap_remove(index));
                }
                debug!(preferred, "Preferred input device not present");
            }
            Err(e) => warn!(error = %e, "Failed to enumerate input devices; using default"),
        }
    }
    host.default_input_device()
        .ok_or_else(|| AudioError::Device("no input device available".to_string()))
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only paused and dropped through the handle's mutex;
/// its callback runs on a thread cpal manages.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Exclusive owner of a running microphone stream.
pub struct CaptureHandle {
    stream: Mutex<Option<SendableStream>>,
    device_name: String,
}

impl CaptureHandle {
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn is_running(&self) -> bool {
        match self.stream.lock() {
            Ok(stream) => stream.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }

    /// Stops the microphone. Safe to call any number of times.
    ///
    /// Blocks already posted to the pump are still delivered.
    pub fn stop(&self) {
        let stream = match self.stream.lock() {
            Ok(mut stream) => stream.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(SendableStream(stream)) = stream {
            if let Err(e) = stream.pause() {
                debug!(error = %e, "Failed to pause input stream before drop");
            }
            drop(stream);
            info!(device = %self.device_name, "Microphone stopped");
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

pub struct CapturePipeline;

impl CapturePipeline {
    /// Opens the microphone and starts forwarding voiced blocks to `on_block`.
    ///
    /// Must be called from within a tokio runtime; the pump runs as a task on it.
    pub fn start(
        config: CaptureConfig,
        on_block: impl FnMut(String) + Send + 'static,
        bus: EventBus<CaptureEvent>,
    ) -> Result<CaptureHandle, AudioError> {
        let host = cpal::default_host();
        let device = select_input_device(&host, config.preferred_device.as_deref())?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".into());

        let default_config = device
            .default_input_config()
            .map_err(AudioError::from_config_error)?;
        let sample_format = default_config.sample_format();
        let stream_config: cpal::StreamConfig = default_config.into();
        info!(
            device = %device_name,
            rate = stream_config.sample_rate.0,
            channels = stream_config.channels,
            format = ?sample_format,
            "Audio input config"
        );

        let (tx, rx) = mpsc::channel(config.channel_capacity.max(2));
        let front = CaptureFrontEnd::new(
            stream_config.channels as usize,
            stream_config.sample_rate.0,
            &config,
            tx,
        )?;

        let stream = match sample_format {
            SampleFormat::F32 => build_input::<f32>(&device, &stream_config, front),
            SampleFormat::I16 => build_input::<i16>(&device, &stream_config, front),
            SampleFormat::U16 => build_input::<u16>(&device, &stream_config, front),
            other => Err(AudioError::Device(format!(
                "unsupported input sample format {:?}",
                other
            ))),
        }?;
        stream
            .play()
            .map_err(|e| AudioError::Device(format!("failed to start input stream: {}", e)))?;

        let pump = CapturePump::new(&config.vad, Arc::new(TokioClock), bus, Box::new(on_block));
        tokio::spawn(pump.run(rx));

        info!(device = %device_name, "Microphone started");
        Ok(CaptureHandle {
            stream: Mutex::new(Some(SendableStream(stream))),
            device_name,
        })
    }
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut front: CaptureFrontEnd,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data.iter().map(|&s| s.to_sample::<f32>()).collect();
                front.process(&samples);
            },
            |err| error!(error = %err, "Audio input stream error"),
            None,
        )
        .map_err(AudioError::from_build_error)
}
