//! Chat relay daemon - line-oriented TCP chat server
//!
//! Clients connect over TCP, send a display name as their first line, and
//! then exchange single-line commands: `list`, `GONE`, `MESG <name> <text>`,
//! `/CONN <name>`, or plain text to broadcast.
//!
//! # Usage
//!
//! ```bash
//! # Start the relay on the default port (foreground)
//! relayd start
//!
//! # Start on port 4000 in the background
//! relayd start 4000 -d
//!
//! # Stop the relay
//! relayd stop
//!
//! # Check relay status
//! relayd status
//!
//! # Print the effective configuration
//! relayd config --config relay.toml
//!
//! # Enable debug logging (per-line parity and checksum)
//! RUST_LOG=relayd=debug relayd start
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown; every session is deregistered

use std::env;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use relayd::config::RelayConfig;
use relayd::registry::spawn_registry;
use relayd::server::{RelayContext, RelayServer};
use relayd::session_log::{FileSessionLog, NoopSessionLog, SharedSessionLog};

/// Environment variable naming a config file.
const CONFIG_ENV: &str = "RELAY_CONFIG";

/// Chat relay daemon
#[derive(Parser, Debug)]
#[command(name = "relayd", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the relay
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        #[command(flatten)]
        options: ServeOptions,
    },
    /// Stop the running relay
    Stop,
    /// Show relay status
    Status,
    /// Print the effective configuration as TOML
    Config {
        #[command(flatten)]
        options: ServeOptions,
    },
}

/// Options layered over the config file.
#[derive(Args, Debug, Default)]
struct ServeOptions {
    /// TCP port to listen on
    port: Option<u16>,

    /// Config file (TOML)
    #[arg(short, long, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Host or address to bind
    #[arg(long)]
    host: Option<String>,

    /// Maximum number of concurrent clients
    #[arg(long)]
    max_sessions: Option<usize>,

    /// Directory for per-session log files
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Disable per-session log files
    #[arg(long)]
    no_session_logs: bool,
}

impl ServeOptions {
    /// Loads the config file (if any), applies overrides and validates.
    fn resolve(self) -> Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => RelayConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => RelayConfig::default(),
        };

        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(max) = self.max_sessions {
            config.max_sessions = max;
        }
        if let Some(dir) = self.log_dir {
            config.log_dir = dir;
        }
        if self.no_session_logs {
            config.session_logs = false;
        }

        // Daemonizing changes the working directory
        if config.log_dir.is_relative() {
            let cwd = env::current_dir().context("Failed to read working directory")?;
            config.log_dir = cwd.join(&config.log_dir);
        }

        config.validate()?;
        Ok(config)
    }
}

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("chat-relay")
}

fn pid_file_path() -> PathBuf {
    state_dir().join("relayd.pid")
}

fn log_file_path() -> PathBuf {
    state_dir().join("relayd.log")
}

fn read_pid() -> Option<u32> {
    let path = pid_file_path();
    let mut file = File::open(&path).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    // Signal 0 only checks that the process exists
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(not(unix))]
fn is_process_running(_pid: u32) -> bool {
    false
}

fn is_daemon_running() -> Option<u32> {
    if let Some(pid) = read_pid() {
        if is_process_running(pid) {
            return Some(pid);
        }
        remove_pid_file();
    }
    None
}

fn stop_daemon(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let pid = i32::try_from(pid).context("PID out of range")?;
        let result = unsafe { libc::kill(pid, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {pid}");
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Command::Start {
        daemon: false,
        options: ServeOptions::default(),
    });

    match command {
        Command::Start { daemon, options } => {
            if let Some(pid) = is_daemon_running() {
                eprintln!("Relay is already running (PID {pid})");
                eprintln!("Use 'relayd stop' to stop it first.");
                process::exit(1);
            }

            let config = options.resolve()?;

            if daemon {
                daemonize()?;
            }

            write_pid()?;

            let result = run_relay(config);

            remove_pid_file();

            result
        }
        Command::Stop => {
            if let Some(pid) = is_daemon_running() {
                println!("Stopping relay (PID {pid})...");
                stop_daemon(pid)?;

                for _ in 0..50 {
                    if !is_process_running(pid) {
                        println!("Relay stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Relay did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Relay is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some(pid) = is_daemon_running() {
                println!("Relay is running (PID {pid})");
                println!("Log: {}", log_file_path().display());
                Ok(())
            } else {
                println!("Relay is not running.");
                process::exit(1);
            }
        }
        Command::Config { options } => {
            let config = options.resolve()?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to create log file for stderr")?;

    let daemonize = Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr);

    daemonize.start().context("Failed to daemonize")?;

    Ok(())
}

#[tokio::main]
async fn run_relay(config: RelayConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("relayd=info".parse()?)
                .add_directive("relay_core=info".parse()?)
                .add_directive("relay_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "Chat relay starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let session_log: SharedSessionLog = if config.session_logs {
        let sink = FileSessionLog::create(&config.log_dir).with_context(|| {
            format!("Failed to create log directory {}", config.log_dir.display())
        })?;
        info!(dir = %sink.dir().display(), "Session logs enabled");
        Arc::new(sink)
    } else {
        Arc::new(NoopSessionLog)
    };

    let registry = spawn_registry(config.max_sessions);
    info!(max_sessions = config.max_sessions, "Session registry started");

    let context = RelayContext::new(registry, session_log, config.session_settings());
    let addr = config.bind_addr();
    let server = RelayServer::bind(&addr, context, cancel_token)
        .await
        .with_context(|| format!("Failed to start relay on {addr}"))?;

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Chat relay stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
