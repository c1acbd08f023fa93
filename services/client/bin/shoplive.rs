//! Main Entrypoint for the Shoplive terminal client
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment and the command line.
//! 2. Opening the live session and, in audio mode, the speaker and microphone.
//! 3. Printing what the agent says and forwarding typed lines to it.
//! 4. Closing the session and releasing the audio devices on Ctrl+C or `/quit`.

use anyhow::Context;
use clap::Parser;
use shoplive_audio::{CaptureEvent, CapturePipeline, PlaybackPipeline};
use shoplive_client::{
    bridge::{playback_subscription, spawn_playback_bridge},
    config::Config,
    console::{ConsoleCommand, parse_line, render_event},
};
use shoplive_core::{EventBus, SessionEvent, Subscription};
use shoplive_realtime::{Mode, SessionTransport, TungsteniteConnector};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(version, about = "Talk to the shop agent from a terminal")]
struct Args {
    /// Streaming mode (text|audio); overrides SHOPLIVE_MODE.
    #[arg(long)]
    mode: Option<Mode>,
    /// Agent host; overrides SHOPLIVE_HOST.
    #[arg(long)]
    host: Option<String>,
    /// Keep the microphone closed in audio mode.
    #[arg(long)]
    no_mic: bool,
    /// List input devices and exit.
    #[arg(long)]
    list_devices: bool,
}

/// Prints session events for the user until the bus closes.
async fn print_events(mut events: Subscription<SessionEvent>) {
    while let Some(event) = events.recv().await {
        if let Some(line) = render_event(&event) {
            println!("{}", line);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.list_devices {
        for name in shoplive_audio::capture::list_input_devices() {
            println!("{}", name);
        }
        return Ok(());
    }

    // --- 1. Load Configuration ---
    let mut config =
        Config::from_env_with_host(args.host.clone()).context("Failed to load configuration")?;
    if let Some(mode) = args.mode {
        config.mode = mode;
    }

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
    info!(deployment = ?config.target, mode = %config.mode, "Configuration loaded");

    // --- 3. Open the Session ---
    let transport = SessionTransport::new(
        config.endpoint(),
        TungsteniteConnector,
        EventBus::<SessionEvent>::default(),
    );
    info!(
        host = %transport.endpoint().host(),
        url = %transport.endpoint().url(),
        "Connecting to agent"
    );
    let printer = tokio::spawn(print_events(transport.subscribe()));
    transport.connect();

    // --- 4. Audio Pipelines ---
    let audio = config.mode == Mode::Audio;
    let mut bridge = None;
    if audio {
        let mut playback = PlaybackPipeline::new(config.playback_config());
        match playback.start() {
            Ok(()) => {
                bridge = Some(spawn_playback_bridge(
                    playback_subscription(transport.events()),
                    playback,
                ))
            }
            Err(e) => warn!(error = %e, "Speaker unavailable; continuing without voice output"),
        }
    }

    let capture_bus = EventBus::<CaptureEvent>::default();
    let capture = if audio && !args.no_mic {
        let uplink = transport.clone();
        let handle = CapturePipeline::start(
            config.capture_config(),
            move |message| uplink.send(message),
            capture_bus.clone(),
        )
        .context("Failed to open the microphone")?;
        info!(device = %handle.device_name(), "Listening");
        Some(handle)
    } else {
        None
    };

    // --- 5. Read User Input ---
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => match parse_line(&line) {
                    ConsoleCommand::Message(text) => transport.send_message(&text),
                    ConsoleCommand::SetAudio(on) => transport.set_mode(on),
                    ConsoleCommand::GenerateImage(product_id) => transport.generate_image(product_id),
                    ConsoleCommand::Upload(path) => match tokio::fs::read(&path).await {
                        Ok(jpeg) => transport.send_image(&jpeg),
                        Err(e) => warn!(error = %e, path = %path.display(), "Failed to read image"),
                    },
                    ConsoleCommand::SetLocation(location) => transport.set_user_location(location),
                    ConsoleCommand::Quit => break,
                    ConsoleCommand::Empty => {}
                },
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read from stdin");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal. Shutting down gracefully...");
                break;
            }
        }
    }

    // --- 6. Shut Down ---
    transport.close();
    if let Some(capture) = capture.as_ref().filter(|capture| capture.is_running()) {
        capture.stop();
    }
    drop(capture);
    drop(transport);
    drop(capture_bus);

    if let Some(bridge) = bridge {
        match tokio::time::timeout(Duration::from_secs(2), bridge).await {
            Ok(Ok(mut playback)) => playback.stop(),
            _ => warn!("Playback did not shut down in time"),
        }
    }
    printer.abort();

    info!("Session closed.");
    Ok(())
}
