mod event_log;
mod shell;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use event_log::EventLogger;
use ostinato_core::{Coordinator, SessionConfig};
use ostinato_domain_song::MidiEventSource;
use ostinato_infra_serial::SerialLink;
use ostinato_infra_storage_fs::FsStorage;
use ostinato_ports::link::LinkPort;
use ostinato_ports::storage::{PlayerSettings, StoragePort, TransportMode};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Ostinato - stream MIDI songs to a serial playback device
#[derive(Parser, Debug)]
#[command(name = "ostinato")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Queue MIDI files and stream them to a serial playback device", long_about = None)]
struct Args {
    /// Serial port of the playback device
    #[arg(long, global = true, value_name = "PORT")]
    port: Option<String>,

    /// Serial baud rate
    #[arg(long, global = true, value_name = "RATE")]
    baud: Option<u32>,

    /// Flow control between lines
    #[arg(long, global = true, value_enum)]
    mode: Option<ModeArg>,

    /// How long to wait for the device's OK after each line
    #[arg(long, global = true, value_name = "MS")]
    ack_timeout_ms: Option<u64>,

    /// Directory holding settings.json (defaults to the user config dir)
    #[arg(long, global = true, value_name = "DIR")]
    settings_dir: Option<PathBuf>,

    /// Persist the effective settings after applying flags
    #[arg(long, global = true)]
    save_settings: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List serial devices
    Ports,

    /// Play MIDI files in order and exit when the queue drains
    Play {
        #[arg(value_name = "FILES", required = true)]
        files: Vec<PathBuf>,
    },

    /// Interactive command shell
    Shell,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    /// Wait for OK after every line
    Handshake,
    /// Fixed pause after every line
    FixedDelay,
}

impl From<ModeArg> for TransportMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Handshake => TransportMode::Handshake,
            ModeArg::FixedDelay => TransportMode::FixedDelay,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let settings = load_settings(&args)?;

    match args.command {
        Commands::Ports => list_ports(),
        Commands::Play { files } => play(&settings, &files),
        Commands::Shell => run_shell(&settings),
    }
}

fn load_settings(args: &Args) -> Result<PlayerSettings> {
    let storage = match &args.settings_dir {
        Some(dir) => FsStorage::new(dir.clone()),
        None => FsStorage::default(),
    };
    let mut settings = storage.load_settings().with_context(|| {
        format!(
            "loading settings from {}",
            storage.settings_path().display()
        )
    })?;

    if let Some(port) = &args.port {
        settings.port = port.clone();
    }
    if let Some(baud) = args.baud {
        settings.baud_rate = baud;
    }
    if let Some(mode) = args.mode {
        settings.transport_mode = mode.into();
    }
    if let Some(timeout) = args.ack_timeout_ms {
        settings.ack_timeout_ms = timeout;
    }

    if args.save_settings {
        storage.save_settings(&settings).context("saving settings")?;
    }
    log::debug!("effective settings: {:?}", settings);
    Ok(settings)
}

fn build_coordinator(settings: &PlayerSettings) -> Arc<Coordinator> {
    Arc::new(Coordinator::new(
        Box::new(SerialLink::new()),
        Box::new(MidiEventSource),
        SessionConfig::from(settings),
    ))
}

fn list_ports() -> Result<()> {
    let devices = SerialLink::new()
        .list_devices()
        .context("enumerating serial ports")?;
    if devices.is_empty() {
        println!("no serial devices found");
    }
    for device in devices {
        println!("{}\t{}", device.id, device.name);
    }
    Ok(())
}

fn play(settings: &PlayerSettings, files: &[PathBuf]) -> Result<()> {
    let coordinator = build_coordinator(settings);
    coordinator
        .connect(&settings.port, settings.baud_rate)
        .with_context(|| format!("connecting to {}", settings.port))?;
    let events = EventLogger::spawn(Arc::clone(&coordinator));

    let mut failed = 0;
    for file in files {
        match coordinator.submit_path(file) {
            Ok(song) => log::info!("queued {} from {}", song, file.display()),
            Err(err) => {
                log::error!("skipping {}: {}", file.display(), err);
                failed += 1;
            }
        }
    }

    while !coordinator.wait_until_idle(Duration::from_secs(1)) {}
    let status = coordinator.status();
    events.finish();

    if !status.pending.is_empty() {
        bail!(
            "playback aborted with {} song(s) still queued",
            status.pending.len()
        );
    }
    if failed > 0 {
        bail!("{} file(s) could not be converted", failed);
    }
    Ok(())
}

fn run_shell(settings: &PlayerSettings) -> Result<()> {
    let coordinator = build_coordinator(settings);
    if let Err(err) = coordinator.connect(&settings.port, settings.baud_rate) {
        log::warn!("not connected ({}); use 'connect <port>'", err);
    }
    let events = EventLogger::spawn(Arc::clone(&coordinator));

    let result = shell::run(&coordinator, settings.baud_rate);

    coordinator.shutdown();
    events.finish();
    result
}
