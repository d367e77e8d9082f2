//! CLI for the murmur time-series file engine.
//!
//! Provides commands for creating, updating, inspecting, and reading murmur
//! files.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use murmur::{AggregationMethod, Clock, Header, Options, RetentionDef, Store};
use tracing_subscriber::EnvFilter;

/// murmur: fixed-retention, multi-resolution time-series files.
#[derive(Parser)]
#[command(name = "murmur", version, about)]
struct Cli {
    /// Hold an exclusive lock while modifying a file.
    #[arg(long, global = true)]
    lock: bool,

    /// Flush to disk after every modification.
    #[arg(long, global = true)]
    autoflush: bool,

    /// JSON options file; flags given on the command line take precedence.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create a new file.
    Create {
        /// Path of the file to create.
        path: PathBuf,

        /// Archive declarations such as "60:1440", "1m:1d" or "1h:1y".
        #[arg(required = true)]
        retentions: Vec<String>,

        /// Fraction of known points a window needs to propagate.
        #[arg(long, default_value = "0.5")]
        xff: f32,

        /// How windows are aggregated into coarser archives.
        #[arg(long, default_value = "average")]
        aggregation: Aggregation,
    },

    /// Write one or more points.
    Update {
        /// Path of the file to update.
        path: PathBuf,

        /// Points as "timestamp:value"; "N" as the timestamp means now.
        #[arg(required = true)]
        points: Vec<String>,
    },

    /// Change the aggregation method of an existing file.
    SetAggregation {
        /// Path of the file to modify.
        path: PathBuf,

        /// New aggregation method.
        method: Aggregation,
    },

    /// Display the file header.
    Info {
        /// Path of the file to inspect.
        path: PathBuf,

        /// Output format.
        #[arg(long, default_value = "text")]
        format: InfoFormat,
    },

    /// Read a time range.
    Fetch {
        /// Path of the file to read.
        path: PathBuf,

        /// Start of the range in epoch seconds (default: oldest retained).
        #[arg(long)]
        from: Option<u32>,

        /// End of the range in epoch seconds (default: now).
        #[arg(long)]
        until: Option<u32>,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },
}

/// Aggregation method choices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Aggregation {
    /// Arithmetic mean of the known points.
    Average,
    /// Total of the known points.
    Sum,
    /// Most recent known point.
    Last,
    /// Largest known point.
    Max,
    /// Smallest known point.
    Min,
}

impl From<Aggregation> for AggregationMethod {
    fn from(value: Aggregation) -> Self {
        match value {
            Aggregation::Average => Self::Average,
            Aggregation::Sum => Self::Sum,
            Aggregation::Last => Self::Last,
            Aggregation::Max => Self::Max,
            Aggregation::Min => Self::Min,
        }
    }
}

/// Output format for `info`.
#[derive(Clone, ValueEnum)]
enum InfoFormat {
    /// Human-readable listing.
    Text,
    /// JSON object.
    Json,
}

/// Output format for fetch results.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values.
    Csv,
    /// JSON object with a value array.
    Json,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = load_options(&cli).and_then(|options| {
        let store = Store::new(options);
        match cli.command {
            Commands::Create {
                path,
                retentions,
                xff,
                aggregation,
            } => cmd_create(&store, &path, &retentions, xff, aggregation.into()),
            Commands::Update { path, points } => cmd_update(&store, &path, &points),
            Commands::SetAggregation { path, method } => cmd_set_aggregation(&store, &path, method.into()),
            Commands::Info { path, format } => cmd_info(&store, &path, &format),
            Commands::Fetch {
                path,
                from,
                until,
                format,
            } => cmd_fetch(&store, &path, from, until, &format),
        }
    });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Builds options from the `--config` file, then applies the flags.
fn load_options(cli: &Cli) -> Result<Options, Box<dyn std::error::Error>> {
    let mut options = match &cli.config {
        Some(path) => Options::load(path)?,
        None => Options::default(),
    };
    options.lock |= cli.lock;
    options.autoflush |= cli.autoflush;
    tracing::debug!(?options, "resolved options");
    Ok(options)
}

/// Implements `murmur create <path> <retention>...`.
fn cmd_create(
    store: &Store,
    path: &Path,
    retentions: &[String],
    xff: f32,
    method: AggregationMethod,
) -> Result<(), Box<dyn std::error::Error>> {
    let retentions = retentions
        .iter()
        .map(|s| s.parse::<RetentionDef>())
        .collect::<Result<Vec<_>, _>>()?;

    let header = store.create(path, &retentions, xff, method)?;
    println!(
        "Created {} ({} bytes, {} archives)",
        path.display(),
        header.file_size(),
        header.archives.len()
    );
    Ok(())
}

/// Implements `murmur update <path> <timestamp:value>...`.
fn cmd_update(store: &Store, path: &Path, points: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = points
        .iter()
        .map(|p| parse_point(p))
        .collect::<Result<Vec<_>, _>>()?;

    if let [(timestamp, value)] = parsed.as_slice() {
        store.update(path, *value, *timestamp)?;
        return Ok(());
    }

    let now = store.clock().now();
    let batch: Vec<(u32, f64)> = parsed
        .into_iter()
        .map(|(timestamp, value)| (timestamp.unwrap_or(now), value))
        .collect();
    let written = store.update_many(path, &batch)?;
    tracing::debug!(points = batch.len(), slots = written, "batch written");
    Ok(())
}

/// Implements `murmur set-aggregation <path> <method>`.
fn cmd_set_aggregation(
    store: &Store,
    path: &Path,
    method: AggregationMethod,
) -> Result<(), Box<dyn std::error::Error>> {
    let previous = store.info(path)?.aggregation_method();
    store.set_aggregation_method(path, method)?;
    println!("Updated aggregation method: {path} ({previous} -> {method})", path = path.display());
    Ok(())
}

/// Implements `murmur info <path>`.
fn cmd_info(store: &Store, path: &Path, format: &InfoFormat) -> Result<(), Box<dyn std::error::Error>> {
    let header = store.info(path)?;
    match format {
        InfoFormat::Text => print_info(path, &header),
        InfoFormat::Json => {
            let archives: Vec<serde_json::Value> = header
                .archives
                .iter()
                .map(|a| {
                    serde_json::json!({
                        "offset": a.offset,
                        "seconds_per_point": a.seconds_per_point,
                        "points": a.points,
                        "retention": a.retention(),
                        "size": a.size(),
                    })
                })
                .collect();

            let output = serde_json::json!({
                "path": path.display().to_string(),
                "aggregation_method": header.aggregation_method().name(),
                "max_retention": header.max_retention(),
                "xff": header.completeness_factor(),
                "file_size": header.file_size(),
                "archives": archives,
            });

            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn print_info(path: &Path, header: &Header) {
    println!("File: {}", path.display());
    println!("  Aggregation method: {}", header.aggregation_method());
    println!("  Max retention: {}s", header.max_retention());
    println!("  xFilesFactor: {}", header.completeness_factor());
    println!("  File size: {} bytes", header.file_size());
    for (i, archive) in header.archives.iter().enumerate() {
        println!();
        println!("  Archive {i}");
        println!("    Offset: {}", archive.offset);
        println!("    Seconds per point: {}", archive.seconds_per_point);
        println!("    Points: {}", archive.points);
        println!("    Retention: {}s", archive.retention());
        println!("    Size: {} bytes", archive.size());
    }
}

/// Implements `murmur fetch <path>`.
fn cmd_fetch(
    store: &Store,
    path: &Path,
    from: Option<u32>,
    until: Option<u32>,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let range = store.fetch(path, from, until)?;

    match format {
        OutputFormat::Csv => {
            println!(
                "# from={}, until={}, step={}, points={}",
                range.from_interval,
                range.until_interval,
                range.step,
                range.len()
            );
            println!("timestamp,value");
            for (ts, value) in range.values() {
                match value {
                    Some(v) => println!("{ts},{v}"),
                    None => println!("{ts},"),
                }
            }
        }
        OutputFormat::Json => {
            let values: Vec<serde_json::Value> = range
                .values()
                .map(|(ts, value)| {
                    serde_json::json!({
                        "timestamp": ts,
                        "value": value,
                    })
                })
                .collect();

            let output = serde_json::json!({
                "from": range.from_interval,
                "until": range.until_interval,
                "step": range.step,
                "count": range.len(),
                "data": values,
            });

            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Parses `"timestamp:value"`. A timestamp of `N` means now and comes back as
/// `None`.
fn parse_point(s: &str) -> Result<(Option<u32>, f64), Box<dyn std::error::Error>> {
    let (timestamp, value) = s
        .trim()
        .split_once(':')
        .ok_or_else(|| format!("Invalid point '{s}', expected timestamp:value"))?;

    let timestamp = match timestamp {
        "N" | "n" => None,
        ts => Some(
            ts.parse::<u32>()
                .map_err(|e| format!("Invalid timestamp '{ts}': {e}"))?,
        ),
    };
    let value = value
        .parse::<f64>()
        .map_err(|e| format!("Invalid value '{value}': {e}"))?;
    Ok((timestamp, value))
}
