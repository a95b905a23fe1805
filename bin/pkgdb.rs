use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pkgdb::rebuild::enumeration_channel;
use pkgdb::{DatabaseConfig, DatabaseMetrics, PackageDatabase, PackageRecord};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::thread;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "pkgdb")]
#[command(about = "Read-optimized package database", long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(long, env = "PKGDB_CONFIG")]
    config: Option<PathBuf>,

    /// Snapshot file to restore from and persist to
    #[arg(long, env = "PKGDB_SNAPSHOT_PATH")]
    snapshot_path: Option<PathBuf>,

    /// Capacity of the enumeration stream
    #[arg(long, env = "PKGDB_STREAM_CAPACITY")]
    stream_capacity: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild from a JSON array of package records
    Rebuild {
        #[arg(long)]
        input: PathBuf,
    },
    /// Look up packages by exact name
    Lookup {
        name: String,
        #[arg(long)]
        arch: Option<String>,
    },
    /// Search names by substring
    Search { needle: String },
    /// Resolve a name;version;arch;repository package id
    Resolve { package_id: String },
    /// Print snapshot statistics
    Stats,
    /// Print Prometheus metrics for the restored snapshot
    Metrics,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DatabaseConfig::from_json_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => DatabaseConfig::default(),
    };
    if let Some(path) = args.snapshot_path {
        config = config.with_snapshot_path(path);
    }
    if let Some(capacity) = args.stream_capacity {
        config = config.with_stream_capacity(capacity);
    }
    if config.snapshot_path.is_none() {
        warn!("no snapshot path configured, nothing will survive this process");
    }

    info!("pkgdb v{}", pkgdb::VERSION);

    let db = PackageDatabase::open(config)?.with_metrics(DatabaseMetrics::new()?);

    match args.command {
        Command::Rebuild { input } => rebuild(&db, input)?,
        Command::Lookup { name, arch } => {
            for record in db.query().lookup(&name, arch.as_deref()) {
                println!("{}", record.key);
            }
        }
        Command::Search { needle } => {
            for record in db.query().search_names(&needle) {
                println!("{}\t{}", record.key, record.summary);
            }
        }
        Command::Resolve { package_id } => match db.query().resolve(&package_id) {
            Some(record) => println!("{}", serde_json::to_string_pretty(record.as_ref())?),
            None => bail!("no package {}", package_id),
        },
        Command::Stats => {
            println!("{}", serde_json::to_string_pretty(&db.query().stats())?);
        }
        Command::Metrics => {
            if let Some(metrics) = db.metrics() {
                print!("{}", metrics.gather_text()?);
            }
        }
    }

    Ok(())
}

/// Stream records from `input` through a producer thread, the way a backend would
fn rebuild(db: &PackageDatabase, input: PathBuf) -> Result<()> {
    let file = File::open(&input).with_context(|| format!("opening {}", input.display()))?;
    let records: Vec<PackageRecord> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", input.display()))?;

    let (sender, receiver) = enumeration_channel(db.config().stream_capacity);

    let report = thread::scope(|scope| {
        scope.spawn(move || {
            for record in records {
                if sender.package(record).is_err() {
                    return;
                }
            }
            let _ = sender.finished();
        });
        db.rebuild_from(receiver)
    })?;

    info!(
        generation = report.generation.as_u64(),
        records = report.record_count,
        persisted_bytes = ?report.persisted_bytes,
        "rebuild complete"
    );
    println!("{}", report.generation);
    Ok(())
}
