mod actions;
mod approval;
mod config;
mod console;
mod error;
mod probe;
mod sandbox;
mod supervisor;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::actions::Synthesizer;
use crate::approval::runtime::{ApprovalRuntime, Controls};
use crate::config::Config;
use crate::probe::dashboard::{Dashboard, Gauges};
use crate::probe::metrics::SysinfoSource;
use crate::probe::ProbeLoop;
use crate::sandbox::SandboxExecutor;
use crate::supervisor::{Feature, SupervisedTask, Supervisor};

const DEFAULT_CONFIG_PATH: &str = "config/ara.toml";

fn print_help() {
    println!(
        "\
ara-agent v{}

Self-healing host agent. Watches resource usage, proposes remediation
scripts, and runs the ones you approve in a separate process.

USAGE:
    ara-agent [OPTIONS] [CONFIG_PATH]

ARGUMENTS:
    CONFIG_PATH    Path to TOML configuration file [default: {DEFAULT_CONFIG_PATH}]
                   Built-in defaults are used when the default file is absent.

OPTIONS:
    -h, --help       Print this help message and exit
    -V, --version    Print version and exit

ENVIRONMENT VARIABLES:
    Variables are referenced in the config file via ${{VAR_NAME}} syntax.

    RUST_LOG    Log level filter for tracing
                (e.g. debug, ara_agent=debug,warn)

Once running, type /help for the console commands.

EXAMPLES:
    ara-agent                         # uses {DEFAULT_CONFIG_PATH}
    ara-agent /etc/ara/ara.toml       # custom config path
    RUST_LOG=debug ara-agent          # with debug logging",
        env!("CARGO_PKG_VERSION"),
    );
}

/// Loads the config file. A missing default file means built-in defaults;
/// a missing explicit file is an error.
fn load_config(explicit: Option<String>) -> Result<Config> {
    match explicit {
        Some(path) => {
            info!("Loading configuration from {path}");
            Config::load(&path)
        }
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            info!("Loading configuration from {DEFAULT_CONFIG_PATH}");
            Config::load(DEFAULT_CONFIG_PATH)
        }
        None => {
            info!("No {DEFAULT_CONFIG_PATH}, using built-in defaults");
            Ok(Config::default())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --help / --version before anything else
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("ara-agent v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {}
        }
    }

    // Initialize logging (RUST_LOG=debug for debug mode). Logs go to
    // stderr so they do not interleave with console replies.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ara_agent=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    println!("ara-agent v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(std::env::args().nth(1))?;

    let targets = config
        .probe
        .cpu_targets
        .iter()
        .map(|t| format!("{} > {}%", t.process, t.threshold_percent))
        .collect::<Vec<_>>()
        .join(", ");
    info!(
        "Probe: every {}s, CPU targets [{targets}], memory > {} MB",
        config.probe.tick_secs, config.probe.memory_threshold_mb
    );
    info!(
        "Cleanups: {} every {}s, {} every {}s",
        config.probe.temp_path().display(),
        config.probe.temp_cleanup_secs,
        config.probe.trash_path().display(),
        config.probe.recycle_cleanup_secs
    );
    info!(
        "Supervisor: {:?} cooldown of {}s, {:?} breaker",
        config.supervisor.cooldown, config.supervisor.cooldown_secs, config.supervisor.breaker
    );
    if !config.probe.enabled {
        warn!("Probe loop starts disabled (/enable architecture to start it)");
    }

    let executor = Arc::new(SandboxExecutor::new(
        config.executor.work_path(),
        &config.executor.interpreter,
    )?);
    info!(
        "Scripts run with {} in {}",
        config.executor.interpreter,
        executor.work_dir().display()
    );

    let started = tokio::time::Instant::now();
    let (notice_tx, notice_rx) = mpsc::unbounded_channel();
    let (report_tx, report_rx) = mpsc::unbounded_channel();
    let (gauges_tx, gauges_rx) = watch::channel(Gauges::default());

    // ── Periodic units, one supervisor each ───────────────────────
    let probe = ProbeLoop::from_config(
        &config.probe,
        Box::new(SysinfoSource::new(config.dashboard.disk_path())),
        Synthesizer::default(),
        started,
    );
    let (architecture, probe_task) = SupervisedTask::new(
        probe,
        Supervisor::from_config(Feature::Architecture, &config.supervisor, config.probe.enabled),
        Duration::from_secs(config.probe.tick_secs),
        report_tx,
        notice_tx.clone(),
    )
    .spawn();

    let dashboard = Dashboard::new(
        Box::new(SysinfoSource::new(config.dashboard.disk_path())),
        started,
    );
    let (dashboard, dashboard_task) = SupervisedTask::new(
        dashboard,
        Supervisor::from_config(Feature::Dashboard, &config.supervisor, config.dashboard.enabled),
        Duration::from_secs(config.dashboard.sample_secs),
        gauges_tx,
        notice_tx.clone(),
    )
    .spawn();

    // ── Operator console ──────────────────────────────────────────
    let printer = tokio::spawn(console::print_notices(notice_rx));
    let operator = console::spawn_reader();
    let mut runtime = ApprovalRuntime::new(
        executor,
        Controls {
            architecture,
            dashboard,
        },
        gauges_rx,
        Duration::from_secs(config.executor.run_timeout_secs),
    );

    let interrupted = tokio::select! {
        result = runtime.run(report_rx, operator, notice_tx) => {
            result?;
            false
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, exiting");
            true
        }
    };

    // Dropping the runtime drops the control handles, which stops the units
    drop(runtime);
    let _ = tokio::join!(probe_task, dashboard_task);
    let _ = printer.await;

    if interrupted {
        // A pending stdin read cannot be cancelled and would hold up
        // runtime shutdown until the next line
        std::process::exit(0);
    }
    Ok(())
}
