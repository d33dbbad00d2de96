//! `ircd`: a federated IRC server node speaking the P10 server-to-server
//! protocol (§1, §6). Wires the directory/lifecycle, send engine, and
//! admission/config subsystems into a single Gateway task, a TCP listener,
//! a rehash signal handler, and a Prometheus-metrics HTTP endpoint.

mod admission;
mod channel;
mod config;
mod connection;
mod dialect;
mod directory;
mod dns;
mod entity;
mod gateway;
mod history;
mod http;
mod ident;
mod lifecycle;
mod listener;
mod metrics;
mod numnick;
mod pool;
mod rehash;
mod security;
mod send;

use std::fs::OpenOptions;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, PolicySnapshot};
use crate::gateway::{Gateway, GatewayCommand};

/// CLI surface (§6): `-n` foreground, `-t` use stdin/stdout as the first
/// client, `-f <path>` config path, `-x <level>` debug/tracing level,
/// `-d <dir>` chdir before starting. `--log-format` is an additive
/// convenience flag (§10.5), not part of the distilled spec's surface.
#[derive(Parser, Debug)]
#[command(name = "ircd", version, about = "P10 federated IRC server node")]
struct Cli {
    /// Run in the foreground instead of daemonizing.
    #[arg(short = 'n')]
    foreground: bool,

    /// Treat stdin/stdout as the first connected client (bootstrap/testing mode).
    #[arg(short = 't')]
    stdio_client: bool,

    /// Path to the TOML configuration file.
    #[arg(short = 'f', long = "config", default_value = "ircd.conf")]
    config_path: PathBuf,

    /// Tracing filter level/directive for this run (e.g. "info", "debug", "ircd=trace").
    #[arg(short = 'x', default_value = "info")]
    debug_level: String,

    /// Change to this directory before doing anything else.
    #[arg(short = 'd')]
    chdir: Option<PathBuf>,

    /// Log output format.
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Exit codes (§6): 0 clean shutdown, 1 config error, 2 bind failure,
/// 3 already running.
const EXIT_OK: u8 = 0;
const EXIT_CONFIG_ERROR: u8 = 1;
const EXIT_BIND_FAILURE: u8 = 2;
const EXIT_ALREADY_RUNNING: u8 = 3;

/// Single-instance guard (§6 exit code 3 "already running"). No crate in this
/// project's dependency stack covers pidfile/flock semantics, so this is a
/// plain stdlib realization: `create_new` makes the create-and-claim atomic,
/// and the file is removed on clean shutdown by `Drop`.
struct PidFile {
    path: PathBuf,
}

impl PidFile {
    fn acquire(config_path: &Path) -> std::io::Result<Self> {
        let path = config_path.with_extension("pid");
        let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        write!(file, "{}", std::process::id())?;
        Ok(Self { path })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.debug_level, cli.log_format);

    if let Some(dir) = &cli.chdir {
        if let Err(err) = std::env::set_current_dir(dir) {
            error!(dir = %dir.display(), error = %err, "failed to chdir");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    }

    let pidfile = match PidFile::acquire(&cli.config_path) {
        Ok(guard) => guard,
        Err(err) => {
            error!(path = %cli.config_path.with_extension("pid").display(), error = %err, "ircd already running");
            return ExitCode::from(EXIT_ALREADY_RUNNING);
        }
    };

    let config = match config::load(&cli.config_path) {
        Ok(c) => c,
        Err(err) => {
            error!(path = %cli.config_path.display(), error = %err, "failed to load configuration");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            error!(error = %err, "failed to start async runtime");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    runtime.block_on(run(config, &cli))
}

async fn run(config: Config, cli: &Cli) -> ExitCode {
    metrics::init();

    let listen_addrs: Vec<SocketAddr> = if config.listen.is_empty() {
        vec!["0.0.0.0:7000".parse().expect("default listen addr is valid")]
    } else {
        config.listen.iter().map(|l| l.bind).collect()
    };

    // A bind failure must surface as the documented exit code, not just a
    // background task's log line, so every address is probed synchronously
    // before any listener task is spawned against it.
    if !probe_bindable(&listen_addrs).await {
        return ExitCode::from(EXIT_BIND_FAILURE);
    }

    let ping_timeout = Duration::from_secs(config.idle_timeouts.ping_timeout_secs);
    let registration_timeout = Duration::from_secs(config.idle_timeouts.registration_timeout_secs);
    let tick_interval = Duration::from_secs(config.idle_timeouts.ping_freq_secs.max(1));

    let policy = PolicySnapshot::from_config(&config);
    let gateway = Gateway::new(
        policy,
        cli.config_path.clone(),
        config.local.name.clone(),
        config.local.numeric.clone(),
        ping_timeout,
        registration_timeout,
    );

    let (tx, rx) = mpsc::channel(1024);
    let dns = dns::DnsResolver::new();

    for addr in &listen_addrs {
        let addr = *addr;
        let listener_tx = tx.clone();
        let listener_dns = dns.clone();
        tokio::spawn(async move {
            if let Err(err) = listener::run_listener(addr, listener_tx, listener_dns).await {
                error!(%addr, error = %err, "listener failed");
            }
        });
    }

    spawn_ticker(tx.clone(), tick_interval);
    spawn_rehash_handler(tx.clone(), cli.config_path.clone());

    if cli.stdio_client {
        let stdio_tx = tx.clone();
        tokio::spawn(async move {
            if let Err(err) = listener::run_stdio_client(stdio_tx).await {
                error!(error = %err, "stdio client task failed");
            }
        });
    }

    let metrics_port = config.local.metrics_port;
    if metrics_port != 0 {
        tokio::spawn(async move {
            http::run_http_server(metrics_port).await;
        });
    }

    info!(server = %config.local.name, numeric = %config.local.numeric, ?listen_addrs, "ircd starting");

    tokio::select! {
        _ = gateway.run(rx) => {}
        _ = wait_for_shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    ExitCode::from(EXIT_OK)
}

/// Attempts a throwaway bind on every listen address up front so a
/// configuration that names an unusable address fails fast with the
/// documented exit code, rather than only logging from a detached listener
/// task after the process has already reported success.
async fn probe_bindable(addrs: &[SocketAddr]) -> bool {
    for addr in addrs {
        match tokio::net::TcpListener::bind(addr).await {
            Ok(probe) => drop(probe),
            Err(err) => {
                error!(%addr, error = %err, "address not bindable");
                return false;
            }
        }
    }
    true
}

fn spawn_ticker(tx: mpsc::Sender<GatewayCommand>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if tx.send(GatewayCommand::Tick).await.is_err() {
                break;
            }
        }
    });
}

/// SIGHUP triggers a rehash (§4.4); the config path is fixed at startup
/// (`-f`), matching the CLI surface's lack of a separate rehash-path flag.
#[cfg(unix)]
fn spawn_rehash_handler(tx: mpsc::Sender<GatewayCommand>, config_path: PathBuf) {
    tokio::spawn(async move {
        let Ok(mut sighup) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) else {
            return;
        };
        while sighup.recv().await.is_some() {
            info!("SIGHUP received, rehashing");
            let _ = tx.send(GatewayCommand::Rehash { path: config_path.clone() }).await;
        }
    });
}

#[cfg(not(unix))]
fn spawn_rehash_handler(_tx: mpsc::Sender<GatewayCommand>, _config_path: PathBuf) {}

/// §6 "0 clean shutdown (SIGTERM/SIGINT)": races SIGINT against SIGTERM on
/// unix so either one triggers the same clean-shutdown path, mirroring
/// `spawn_rehash_handler`'s unix/non-unix split above.
#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    let Ok(mut sigterm) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) else {
        let _ = ctrl_c.await;
        return;
    };
    tokio::select! {
        _ = ctrl_c => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Text => subscriber.init(),
    }
}
