//! # prl-launcher
//!
//! Runs the launcher on the rig (sysfs GPIO) or on a desktop with mock
//! hardware, serving the HTTP API until Ctrl-C or SIGTERM.
//!
//! ```sh
//! prl-launcher --config /etc/prl-launcher.toml --log-file /var/log/prl2016.log
//! prl-launcher --mock
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use prl_launcher::hal::{MockGpio, SystemClock};
use prl_launcher::services::{run_server_with_state, SharedLauncher, WebServerConfig};
use prl_launcher::{Config, GpioBackend, Launcher};

/// Pan/tilt rocket launcher controller
#[derive(Parser, Debug)]
#[command(name = "prl-launcher")]
#[command(version)]
#[command(about = "Relay, limit switch and encoder control for the PRL launcher rig")]
struct Args {
    /// Path to the TOML configuration (defaults to the reference rig).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Append logs to this file instead of stderr.
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Use mock GPIO instead of sysfs.
    #[arg(long)]
    mock: bool,

    /// Run the control loops without the HTTP API.
    #[arg(long)]
    no_web: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    setup_tracing(&args)?;

    info!("prl-launcher v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    if args.no_web {
        config.web = config.web.with_enabled(false);
    }

    if args.mock {
        warn!("running with mock GPIO, no relay will switch");
        return run(config, Arc::new(MockGpio::new()));
    }

    #[cfg(feature = "sysfs")]
    return run(config, Arc::new(prl_launcher::hal::SysfsGpio::new()));

    #[cfg(not(feature = "sysfs"))]
    anyhow::bail!("built without the `sysfs` feature; run with --mock");
}

fn run<G: GpioBackend>(config: Config, gpio: Arc<G>) -> anyhow::Result<()> {
    let launcher = Launcher::new(&config, gpio, Arc::new(SystemClock::new()))
        .context("initializing launcher")?;
    // Dropped last: stops the loops, forces every output low, releases the pins.
    let _tasks = launcher
        .start_background()
        .context("starting background tasks")?;

    let state = Arc::new(SharedLauncher::new(launcher, config.device.name.as_str()));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating tokio runtime")?;

    runtime.block_on(async {
        if config.web.enabled {
            let web_config = WebServerConfig::from_config(&config.web);
            run_server_with_state(state, web_config, shutdown_signal())
                .await
                .context("web server")?;
        } else {
            info!("web server disabled, waiting for shutdown signal");
            shutdown_signal().await;
        }
        anyhow::Ok(())
    })?;

    info!("shutting down");
    Ok(())
}

/// Setup tracing subscriber: `RUST_LOG` filter, stderr or a log file.
fn setup_tracing(args: &Args) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match &args.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .compact()
                .init();
        }
    }
    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Ctrl-C received"),
        () = terminate => info!("SIGTERM received"),
    }
}
