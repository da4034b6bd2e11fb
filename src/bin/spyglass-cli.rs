//! Spyglass CLI - terminal client for the acquisition monitor
//!
//! Connects to a monitor server, toggles acquisition, and streams
//! incoming frames to a local frame store.

use std::io;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};

use spyglass::engine::transport::{read_frame, TcpTransport};
use spyglass::monitor::sink::FrameStore;
use spyglass::monitor::{install, new_panel, MonitorConfig};
use spyglass::protocol::OpCode;
use spyglass::{Dispatcher, JsonCodec};

/// How often the event loop wakes up to drive response deadlines.
const TICK_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(name = "spyglass")]
#[command(about = "Client for a live image-acquisition monitor", long_about = None)]
struct Cli {
    /// Monitor server address
    #[arg(short, long, default_value = "127.0.0.1:7700")]
    endpoint: String,

    /// Service response timeout in milliseconds
    #[arg(long, default_value = "5000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start acquisition and stream frames until enough arrived
    Watch {
        /// Number of frames to receive before stopping
        #[arg(short, long, default_value = "16")]
        frames: u64,

        /// Directory to save received frames into
        #[arg(long)]
        save_dir: Option<std::path::PathBuf>,
    },

    /// Request an acquisition start and wait for the response
    Start,

    /// Request an acquisition stop and wait for the response
    Stop,
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = MonitorConfig {
        endpoint: cli.endpoint,
        service_timeout_ms: cli.timeout_ms,
        save_dir: match &cli.command {
            Commands::Watch { save_dir, .. } => save_dir.clone(),
            _ => None,
        },
    };

    let transport = TcpTransport::connect(&config.endpoint)
        .with_context(|| format!("connecting to {}", config.endpoint))?;
    transport.set_read_timeout(Some(TICK_INTERVAL))?;
    let mut reader = transport.reader()?;

    let panel = new_panel();
    let registry = install(&panel, config.service_timeout())?;
    let store = match &config.save_dir {
        Some(dir) => FrameStore::with_save_dir(dir)?,
        None => FrameStore::new(),
    };
    let mut dispatcher = Dispatcher::new(JsonCodec, registry, store);

    match cli.command {
        Commands::Watch { frames, .. } => {
            dispatcher.request(OpCode::StartAcquisition, &transport, Instant::now())?;
            pump(&mut dispatcher, &mut reader, |d| {
                d.sink().frames_seen() >= frames
            })?;
            println!("received {} frames", dispatcher.sink().frames_seen());
        }
        Commands::Start => {
            dispatcher.request(OpCode::StartAcquisition, &transport, Instant::now())?;
            pump(&mut dispatcher, &mut reader, |d| {
                settled(d, OpCode::StartAcquisition)
            })?;
            println!("acquiring: {}", panel.lock().acquiring());
        }
        Commands::Stop => {
            dispatcher.request(OpCode::StopAcquisition, &transport, Instant::now())?;
            pump(&mut dispatcher, &mut reader, |d| {
                settled(d, OpCode::StopAcquisition)
            })?;
            println!("acquiring: {}", panel.lock().acquiring());
        }
    }

    // Teardown: stop acquisition server-side, then drop the channel.
    if let Err(err) = dispatcher.shutdown(&transport, Instant::now()) {
        tracing::warn!(error = %err, "shutdown request failed");
    }
    transport.close();
    Ok(())
}

fn settled(dispatcher: &Dispatcher<JsonCodec, FrameStore>, code: OpCode) -> bool {
    dispatcher
        .registry()
        .get(code)
        .map(|service| service.pending_request().is_none())
        .unwrap_or(true)
}

/// Drive the event loop: interleave inbound frames with deadline polls
/// until `done` reports completion or the server closes the channel.
fn pump(
    dispatcher: &mut Dispatcher<JsonCodec, FrameStore>,
    reader: &mut std::net::TcpStream,
    done: impl Fn(&Dispatcher<JsonCodec, FrameStore>) -> bool,
) -> anyhow::Result<()> {
    loop {
        if done(dispatcher) {
            return Ok(());
        }
        match read_frame(reader) {
            Ok(Some(frame)) => {
                let now = Instant::now();
                if let Err(err) = dispatcher.handle_frame(&frame, now) {
                    tracing::error!(error = %err, "dropped frame");
                }
                dispatcher.tick(now);
            }
            Ok(None) => {
                tracing::info!("server closed the stream");
                return Ok(());
            }
            Err(err)
                if err.kind() == io::ErrorKind::WouldBlock
                    || err.kind() == io::ErrorKind::TimedOut =>
            {
                dispatcher.tick(Instant::now());
            }
            Err(err) => return Err(err).context("reading from the monitor stream"),
        }
    }
}
