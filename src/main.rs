use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bt_gamepad::bluetooth::{
    Bluez, DeviceSession, L2capTransport, PairingControls, SessionBackends, SessionConfig,
};
use bt_gamepad::config::{AppConfig, ConfigStore, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
use bt_gamepad::controller::{
    layout_for, ControllerSource, FakeController, IdleController, Poller, SendMode,
};
use bt_gamepad::events::{EventBus, SystemEvent};
use bt_gamepad::hid::ReportDescriptor;
use bt_gamepad::sdp::build_hid_record;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// Built-in controller source
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum SourceKind {
    /// Sweeping axes and toggling buttons
    #[default]
    Fake,
    /// Rest state only
    Idle,
}

/// bt-gamepad command line arguments
#[derive(Parser, Debug)]
#[command(name = "bt-gamepad")]
#[command(version, about = "Emulate a Bluetooth HID gamepad through BlueZ", long_about = None)]
struct CliArgs {
    /// Configuration file (default: $BT_GAMEPAD_CONFIG or /etc/bt-gamepad/config.json)
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Adapter alias advertised to hosts (overrides config)
    #[arg(short = 'n', long, value_name = "NAME")]
    name: Option<String>,

    /// Local adapter, e.g. hci0 (overrides config)
    #[arg(long, value_name = "ADAPTER")]
    adapter: Option<String>,

    /// Poll rate in Hz (overrides config)
    #[arg(short = 'r', long, value_name = "HZ")]
    rate: Option<u32>,

    /// Send a report every tick, not only on change
    #[arg(long)]
    always_send: bool,

    /// Accept pairing requests from startup
    #[arg(long)]
    pairable: bool,

    /// Be discoverable from startup
    #[arg(long)]
    discoverable: bool,

    /// Controller source
    #[arg(short = 's', long, value_name = "SOURCE", default_value = "fake")]
    source: SourceKind,

    /// Print the report descriptor and SDP record, then exit
    #[arg(long)]
    dump_sdp: bool,

    /// Write the effective configuration to the config file, then exit
    #[arg(long)]
    write_config: bool,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting bt-gamepad v{}", env!("CARGO_PKG_VERSION"));

    let config_path = args.config.clone().unwrap_or_else(get_config_path);
    let store = ConfigStore::load(&config_path)
        .await
        .with_context(|| format!("loading {}", config_path.display()))?;
    store.apply(|config| apply_cli_overrides(config, &args));

    if args.write_config {
        store.save().await?;
        tracing::info!("Configuration written to {}", store.path().display());
        return Ok(());
    }

    let config = store.get();
    let source = build_source(args.source, &config);
    let layout = layout_for(config.layout.kind, source.as_ref()).context("invalid report layout")?;

    if args.dump_sdp {
        let descriptor = ReportDescriptor::for_layout(&layout)?;
        let record = build_hid_record(&config.service_info(), &descriptor)?;
        println!("{}", descriptor.hex());
        println!();
        print!("{}", record.xml());
        return Ok(());
    }

    if !nix::unistd::Uid::effective().is_root() {
        tracing::warn!("Not running as root; binding PSM 17/19 and configuring the adapter usually needs root");
    }

    let events = Arc::new(EventBus::new());
    spawn_event_logger(&events);

    let bluez = Arc::new(
        Bluez::system(&config.device.adapter)
            .await
            .context("connecting to the system bus")?,
    );
    let backends = SessionBackends {
        adapter: bluez.clone(),
        daemon: bluez.clone(),
        trust: bluez,
        transport: Arc::new(L2capTransport),
    };
    let session_config = SessionConfig {
        device_name: config.device.name.clone(),
        device_class: config.device_class(),
        layout,
        service: config.service_info(),
    };

    let mut session = DeviceSession::new(session_config, backends, events.clone())?;
    session.open().await.context("session startup failed")?;

    let controls = session.controls().clone();
    if config.pairing.discoverable {
        controls.set_discoverable(true).await?;
    }
    if config.pairing.pairable {
        controls.set_pairable(true).await?;
    }
    spawn_pairing_window_handler(controls, Duration::from_secs(config.pairing.window_secs))?;

    let cancel = CancellationToken::new();
    let poller = Poller::new(session, source, config.poll.poller());
    let poll_task = tokio::spawn(poller.run(cancel.clone()));

    wait_for_shutdown().await?;
    tracing::info!("Shutdown signal received");

    cancel.cancel();
    let mut session = poll_task.await?;
    session.close().await;

    tracing::info!("bt-gamepad stopped");
    Ok(())
}

fn apply_cli_overrides(config: &mut AppConfig, args: &CliArgs) {
    if let Some(name) = &args.name {
        config.device.name = name.clone();
    }
    if let Some(adapter) = &args.adapter {
        config.device.adapter = adapter.clone();
    }
    if let Some(rate) = args.rate {
        config.poll.rate_hz = rate;
    }
    if args.always_send {
        config.poll.send_mode = SendMode::Always;
    }
    if args.pairable {
        config.pairing.pairable = true;
    }
    if args.discoverable {
        config.pairing.discoverable = true;
    }
}

fn build_source(kind: SourceKind, config: &AppConfig) -> Box<dyn ControllerSource> {
    let layout = &config.layout;
    match kind {
        SourceKind::Fake => Box::new(FakeController::new(
            layout.buttons,
            layout.axes.clone(),
            layout.hat_switch,
        )),
        SourceKind::Idle => Box::new(IdleController::new(
            layout.buttons,
            layout.axes.clone(),
            layout.hat_switch,
        )),
    }
}

/// SIGUSR1 opens a pairing window
fn spawn_pairing_window_handler(controls: PairingControls, window: Duration) -> anyhow::Result<()> {
    let mut usr1 = signal(SignalKind::user_defined1())?;
    tokio::spawn(async move {
        while usr1.recv().await.is_some() {
            let controls = controls.clone();
            tokio::spawn(async move {
                if let Err(e) = controls.open_window(window).await {
                    tracing::warn!("Pairing window failed: {}", e);
                }
            });
        }
    });
    Ok(())
}

fn spawn_event_logger(events: &EventBus) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(n)) => tracing::warn!("Event logger lagged, {} events lost", n),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn log_event(event: &SystemEvent) {
    match event {
        SystemEvent::SessionStateChanged { state } => {
            tracing::info!("Session state: {}", state)
        }
        SystemEvent::ChannelAccepted { channel, peer } => {
            tracing::debug!("{} channel connected by {}", channel, peer)
        }
        SystemEvent::ReportChannelLost { reason } => {
            tracing::info!("Host disconnected: {}", reason)
        }
        SystemEvent::PairingRequest { device, accepted } => {
            tracing::info!(
                "Pairing request from {} {}",
                device,
                if *accepted { "accepted" } else { "rejected" }
            )
        }
        other => tracing::debug!("Event {}", other.event_name()),
    }
}

async fn wait_for_shutdown() -> anyhow::Result<()> {
    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = term.recv() => {}
    }
    Ok(())
}

fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "bt_gamepad=error,zbus=error",
        LogLevel::Warn => "bt_gamepad=warn,zbus=warn",
        LogLevel::Info => "bt_gamepad=info,zbus=warn",
        LogLevel::Verbose => "bt_gamepad=debug,zbus=warn",
        LogLevel::Debug => "bt_gamepad=debug,zbus=info",
        LogLevel::Trace => "bt_gamepad=trace,zbus=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}

/// Configuration file path
fn get_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}
