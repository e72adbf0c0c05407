//! Tensor Smoother CLI
//!
//! Debounced sliding-window mode tracking for detection counts.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tensor_smoother::{
    config::Config,
    core::ModeTracker,
    publish::{client_id, Dispatcher, LogPublisher, Publisher},
    source::LineSource,
    stats::{create_shared_stats_with_persistence, read_persisted},
    VERSION,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tensor-smoother")]
#[command(version = VERSION)]
#[command(about = "Debounced sliding-window mode tracking for detection counts", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Smooth observation batches read as JSON lines and publish changes
    Run {
        /// Input file with one JSON object per line (stdin if omitted)
        #[arg(long, short)]
        input: Option<PathBuf>,

        /// Transport for notifications
        #[arg(long, value_enum, default_value_t = PublisherKind::Log)]
        publisher: PublisherKind,
    },

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show configuration
    Config,

    /// Show statistics from previous sessions
    Status,

    /// Accept observation batches over HTTP (requires server feature)
    #[cfg(feature = "server")]
    Serve {
        /// Port to listen on (0 picks a free port)
        #[arg(long, default_value = "8787")]
        port: u16,

        /// Transport for notifications
        #[arg(long, value_enum, default_value_t = PublisherKind::Log)]
        publisher: PublisherKind,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum PublisherKind {
    /// Print messages to stdout
    Log,
    /// POST messages to the configured host (requires gateway feature)
    Gateway,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = cli.config.unwrap_or_else(Config::config_path);

    match cli.command {
        Commands::Run { input, publisher } => cmd_run(&config_path, input, publisher),
        Commands::Init { force } => cmd_init(&config_path, force),
        Commands::Config => cmd_config(&config_path),
        Commands::Status => cmd_status(&config_path),
        #[cfg(feature = "server")]
        Commands::Serve { port, publisher } => cmd_serve(&config_path, port, publisher),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_run(config_path: &Path, input: Option<PathBuf>, kind: PublisherKind) -> Result<()> {
    let config = Config::load_or_init(config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;
    if let Err(e) = config.ensure_directories() {
        tracing::warn!("Could not create data directory: {e}");
    }

    let tracker_config = config.tracker_config().context("invalid configuration")?;
    let mut tracker: ModeTracker<i64> =
        ModeTracker::new(&tracker_config).context("invalid configuration")?;

    let stats = create_shared_stats_with_persistence(config.stats_path());
    let publisher = build_publisher(&config, kind)?;
    let mut dispatcher = Dispatcher::new(
        publisher,
        config.name.clone(),
        config.topic.clone(),
        client_id(&config.client_name),
    )
    .with_stats(stats.clone());

    tracing::info!(
        keys = tracker.keys().len(),
        default_capacity = tracker_config.default_capacity,
        combine = tracker.combines_notifications(),
        topic = %dispatcher.topic(),
        client_id = %dispatcher.client_id(),
        "Tensor smoother v{VERSION} starting"
    );

    let mut source = LineSource::default().with_stats(stats.clone());
    match input {
        Some(path) => {
            let file = File::open(&path)
                .with_context(|| format!("opening input {}", path.display()))?;
            source.start(BufReader::new(file))?;
        }
        None => source.start(BufReader::new(std::io::stdin()))?,
    }

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    let receiver = source.receiver().clone();
    while running.load(Ordering::SeqCst) {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(observation) => {
                stats.record_batch();
                let deltas = tracker.observe(&observation.counts);
                stats.record_deltas(deltas.len() as u64);
                tracing::debug!(
                    tick = tracker.ticks(),
                    deltas = deltas.len(),
                    queued_ms = (Utc::now() - observation.received_at).num_milliseconds(),
                    "batch applied"
                );

                if let Some(notification) = tracker.notification(deltas) {
                    dispatcher.dispatch(&notification);
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                tracing::info!("Observation input closed");
                break;
            }
        }
    }

    source.stop();
    tracing::info!(ticks = tracker.ticks(), "Stopping");

    if let Err(e) = stats.save() {
        tracing::warn!("Could not save session stats: {e}");
    }

    eprintln!();
    eprintln!("{}", stats.summary());
    Ok(())
}

fn build_publisher(config: &Config, kind: PublisherKind) -> Result<Box<dyn Publisher + Send>> {
    match kind {
        PublisherKind::Log => Ok(Box::new(LogPublisher::stdout())),
        #[cfg(feature = "gateway")]
        PublisherKind::Gateway => {
            use tensor_smoother::publish::{BlockingHttpPublisher, HttpConfig};

            let http_config = HttpConfig::from_config(config);
            let publisher = BlockingHttpPublisher::new(http_config)?;
            match publisher.test_connection() {
                Ok(true) => tracing::info!(host = %config.host, "Gateway connection: OK"),
                Ok(false) => tracing::warn!(host = %config.host, "Gateway health check failed"),
                Err(e) => tracing::warn!(host = %config.host, "Could not reach gateway: {e}"),
            }
            Ok(Box::new(publisher))
        }
        #[cfg(not(feature = "gateway"))]
        PublisherKind::Gateway => {
            tracing::warn!(
                host = %config.host,
                "gateway publisher ignored (gateway feature not enabled at compile time), using log"
            );
            Ok(Box::new(LogPublisher::stdout()))
        }
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        println!(
            "Configuration already exists at {:?} (use --force to overwrite)",
            config_path
        );
        return Ok(());
    }

    Config::default()
        .save_to(config_path)
        .with_context(|| format!("writing {}", config_path.display()))?;
    println!("Wrote default configuration to {config_path:?}");
    Ok(())
}

fn cmd_config(config_path: &Path) -> Result<()> {
    let config = Config::load_from(config_path)?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {config_path:?}");
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);

    match config.tracker_config() {
        Ok(tracker) => {
            println!();
            println!("Tracked keys:");
            for key in &tracker.keys {
                let capacity = tracker
                    .capacity_overrides
                    .get(key)
                    .copied()
                    .unwrap_or(tracker.default_capacity);
                println!("  {key}: window {capacity}");
            }
        }
        Err(e) => eprintln!("Warning: configuration is invalid: {e}"),
    }
    Ok(())
}

fn cmd_status(config_path: &Path) -> Result<()> {
    let config = Config::load_from(config_path)?;

    println!("Tensor Smoother Status");
    println!("======================");
    println!();
    println!("  Keys: {}", config.keys.join(", "));
    println!("  Default window: {}", config.default_window_capacity);
    println!("  Combined notifications: {}", config.combine_notifications);
    println!("  Topic: {}", config.topic);
    println!();

    let stats_path = config.stats_path();
    if stats_path.exists() {
        let stats = read_persisted(&stats_path)
            .with_context(|| format!("reading {}", stats_path.display()))?;
        println!("Cumulative Statistics:");
        println!("  Batches observed: {}", stats.batches_observed);
        println!("  Mode changes: {}", stats.deltas_produced);
        println!("  Messages published: {}", stats.messages_published);
        println!("  Publish failures: {}", stats.publish_failures);
        println!("  Rejected input lines: {}", stats.rejected_lines);
        println!("  Last updated: {}", stats.last_updated.format("%Y-%m-%d %H:%M:%S"));
    } else {
        println!("No previous session data found.");
    }
    Ok(())
}

#[cfg(feature = "server")]
fn cmd_serve(config_path: &Path, port: u16, kind: PublisherKind) -> Result<()> {
    use tensor_smoother::server::{run, ServerConfig};

    let config = Config::load_or_init(config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;
    if let Err(e) = config.ensure_directories() {
        tracing::warn!("Could not create data directory: {e}");
    }

    let server_config = ServerConfig::new(
        port,
        config.tracker_config().context("invalid configuration")?,
        config.name.clone(),
        config.topic.clone(),
        client_id(&config.client_name),
    );
    let stats = create_shared_stats_with_persistence(config.stats_path());
    let publisher = build_publisher(&config, kind)?;

    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
    runtime.block_on(async {
        let (addr, shutdown_tx) = run(server_config, publisher, Some(stats.clone())).await?;
        println!("Listening on http://{addr}, press Ctrl+C to stop");

        tokio::signal::ctrl_c().await?;
        let _ = shutdown_tx.send(());
        anyhow::Ok(())
    })?;

    if let Err(e) = stats.save() {
        tracing::warn!("Could not save session stats: {e}");
    }
    eprintln!("{}", stats.summary());
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("setting Ctrl+C handler")
}
