//! Vector store command-line tool
//!
//! Inspect store configuration and exercise the allocator under load.
//!
//! # Examples
//!
//! ```bash
//! # Show the options a config file resolves to
//! vecstore --config store.toml config
//!
//! # Parallel add/remove/reuse workload
//! vecstore bench --vectors 100000 --dim 128 --threads 8
//! ```

use clap::{Args, Parser, Subcommand};
use rayon::prelude::*;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vecstore::metric::encode_f32;
use vecstore::{InitialReserve, StoreOptions, VectorStore};

/// PhotonDB vector store tool
#[derive(Parser, Debug)]
#[command(name = "vecstore")]
#[command(version = vecstore::VERSION)]
#[command(about = "PhotonDB vector store tool", long_about = None)]
#[command(author = "Anton Feldmann <afeldman@lynqtech.com>")]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Store options file (TOML, JSON or YAML)
    #[arg(long, global = true, env = "VECSTORE_CONFIG")]
    config: Option<PathBuf>,

    /// Log directory path
    #[arg(long, global = true, default_value = "logs", env = "VECSTORE_LOG_DIR")]
    log_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the resolved store options as TOML
    Config,

    /// Run a parallel add/remove/reuse workload
    Bench(BenchArgs),

    /// Show version
    Version,
}

/// Workload parameters
#[derive(Args, Debug)]
struct BenchArgs {
    /// Vectors to add
    #[arg(short, long, default_value = "100000")]
    vectors: u64,

    /// f32 components per vector
    #[arg(short, long, default_value = "128")]
    dim: usize,

    /// Worker threads (0 = one per core)
    #[arg(short, long, default_value = "0")]
    threads: usize,

    /// Percentage of added vectors removed and re-added
    #[arg(long, default_value = "25")]
    churn: u64,

    /// Grow storage on demand instead of reserving it up front
    #[arg(long)]
    lazy: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(&cli)?;

    match cli.command {
        Commands::Config => config_command(cli.config),
        Commands::Bench(args) => bench_command(cli.config, args),
        Commands::Version => {
            println!("vecstore {}", vecstore::VERSION);
            Ok(())
        }
    }
}

/// Setup logging with rolling files and console output
fn setup_logging(cli: &Cli) -> anyhow::Result<()> {
    std::fs::create_dir_all(&cli.log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &cli.log_dir, "vecstore.log");

    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(!cli.no_color)
                .pretty(),
        )
        .with(fmt::layer().with_writer(file_appender).with_ansi(false))
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    Ok(())
}

/// Options from `--config` if given, defaults otherwise
fn load_options(config: Option<PathBuf>) -> anyhow::Result<StoreOptions> {
    match config {
        Some(path) => {
            info!(path = %path.display(), "Loading store options");
            Ok(StoreOptions::from_file(&path)?)
        }
        None => Ok(StoreOptions::default()),
    }
}

/// Config command - print resolved options
fn config_command(config: Option<PathBuf>) -> anyhow::Result<()> {
    let options = load_options(config)?;
    if let Err(e) = options.validate() {
        warn!(error = %e, "Options are incomplete");
    }
    print!("{}", options.to_toml_string()?);
    Ok(())
}

/// Bench command - parallel workload against one shared store
fn bench_command(config: Option<PathBuf>, args: BenchArgs) -> anyhow::Result<()> {
    if args.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build_global()?;
    }

    let mut options = load_options(config)?;
    options.vector_byte_size = args.dim * std::mem::size_of::<f32>();
    options.max_elements = options.max_elements.max(args.vectors as usize);
    if args.lazy {
        options.initial_reserve = InitialReserve::Lazy;
    }

    let start = Instant::now();
    let store = VectorStore::open(options)?;
    info!(elapsed = ?start.elapsed(), "Store opened");

    let payload = |label: u64| {
        let values: Vec<f32> = (0..args.dim).map(|i| (label + i as u64) as f32).collect();
        encode_f32(&values)
    };

    // Phase 1: fill
    let start = Instant::now();
    (0..args.vectors)
        .into_par_iter()
        .try_for_each(|label| store.add_vector(label, &payload(label)).map(|_| ()))?;
    let fill = start.elapsed();

    // Phase 2: remove a slice of labels
    let churned = args.vectors * args.churn.min(100) / 100;
    let start = Instant::now();
    (0..churned)
        .into_par_iter()
        .try_for_each(|label| store.remove_vector(label).map(|_| ()))?;
    let remove = start.elapsed();

    // Phase 3: new labels take over the tombstones
    let start = Instant::now();
    (0..churned).into_par_iter().try_for_each(|i| {
        let label = args.vectors + i;
        store.add_vector(label, &payload(label)).map(|_| ())
    })?;
    let reuse = start.elapsed();

    store.shrink();

    info!(?fill, ?remove, ?reuse, "Workload finished");
    println!(
        "fill: {:?} ({} vectors), remove: {:?}, reuse: {:?} ({} vectors)",
        fill, args.vectors, remove, reuse, churned
    );
    println!("{}", serde_json::to_string_pretty(&store.stats())?);
    Ok(())
}
