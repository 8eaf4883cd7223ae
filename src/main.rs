use std::{
    fs::File,
    io::{self, BufReader},
    path::PathBuf,
};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use temp_dir::TempDir;

use node_index::{
    builder::{BuilderOptions, IndexBuilder, IndexFormat},
    handler::TaggingHandler,
    index::{IndexSet, NodeIndex, RoaringIndex, SortedU64Index},
    schema::FeatureSpecs,
    NodeId,
};

#[derive(Parser)]
#[command(name = "node-index")]
#[command(about = "Extract and index tagged node IDs")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build indices from a record stream
    #[command(after_help = "EXAMPLES:
  node-index build --input nodes.txt --out ./indices
  node-index build --input - --out ./indices --format roar --features signals,stops")]
    Build {
        /// Record file (`<id> key=value ...` per line), `-` for stdin
        #[arg(long)]
        input: PathBuf,

        /// Output directory for index files
        #[arg(long)]
        out: PathBuf,

        /// Index format to generate: u64, roar or both
        #[arg(long, default_value = "both")]
        format: IndexFormat,

        /// Comma-separated list of features to extract
        #[arg(long, default_value = "signals,stops,calming")]
        features: String,

        /// JSON file with custom feature specifications
        #[arg(long)]
        features_config: Option<PathBuf>,

        /// Temporary directory for sorting (default: a fresh system temp directory)
        #[arg(long)]
        tmp: Option<PathBuf>,

        /// Number of IDs per feature before flushing to disk
        #[arg(long, default_value_t = 100_000)]
        flush_threshold: usize,

        /// Number of IDs above which chunks are merged externally
        #[arg(long, default_value_t = 10_000_000)]
        external_sort_threshold: u64,
    },

    /// Show statistics about the index files in a directory
    Inspect {
        #[arg(long)]
        dir: PathBuf,

        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Count node IDs in the indexed features
    Query {
        #[arg(long)]
        dir: PathBuf,

        /// Restrict to one feature
        #[arg(long)]
        feature: Option<String>,

        /// Node IDs to test
        #[arg(required = true)]
        ids: Vec<NodeId>,
    },
}

fn build(
    input: PathBuf,
    out: PathBuf,
    format: IndexFormat,
    features: String,
    features_config: Option<PathBuf>,
    tmp: Option<PathBuf>,
    options: BuilderOptions,
) -> Result<()> {
    let names: Vec<&str> = features
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let specs = match features_config {
        Some(path) => {
            let file = File::open(&path)
                .with_context(|| format!("cannot open {}", path.display()))?;
            FeatureSpecs::from_json(BufReader::new(file))?.subset(&names)?
        }
        None => FeatureSpecs::select(&names)?,
    };

    info!("Extracting features: {}", specs.names().join(", "));
    info!("Input: {}", input.display());
    info!("Output: {} (format {})", out.display(), format);

    // The temporary directory is removed when dropped (unless given)
    let (_scoped_tmp, tmp_dir) = match tmp {
        Some(path) => (None, path),
        None => {
            let dir = TempDir::new().context("cannot create temp directory")?;
            let path = dir.path().to_path_buf();
            (Some(dir), path)
        }
    };

    let mut handler = TaggingHandler::new(specs, &tmp_dir, options.flush_threshold)?;
    if input.as_os_str() == "-" {
        handler.scan(io::stdin().lock())?;
    } else {
        let file =
            File::open(&input).with_context(|| format!("cannot open {}", input.display()))?;
        handler.scan(BufReader::new(file))?;
    }

    let stats = handler.statistics();
    info!(
        "Processed {} nodes, matched {}",
        stats.nodes_processed, stats.nodes_matched
    );

    let chunk_paths = handler.chunk_paths()?;
    let manifest = IndexBuilder::new(&out, &tmp_dir, format, &options)?
        .with_progress(true)
        .build(&chunk_paths, &stats.feature_counts)?;

    for (feature, summary) in manifest.features.iter() {
        println!(
            "  {}: {} unique nodes -> {}",
            feature,
            summary.unique_count,
            summary.files.join(", ")
        );
    }
    Ok(())
}

fn inspect(dir: PathBuf, json: bool) -> Result<()> {
    let sorted = SortedU64Index::load_dir(&dir)?;
    let roaring = RoaringIndex::load_dir(&dir)?;

    if json {
        let report = serde_json::json!({
            "u64": sorted.statistics(),
            "roar": roaring.statistics(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Inspecting indices in: {}", dir.display());
    let mut found = false;

    let stats = sorted.statistics();
    if !stats.is_empty() {
        found = true;
        println!("\nSorted uint64 indices (.u64):");
        for (feature, info) in stats.iter() {
            println!(
                "  {}: {} nodes ({:.1} KB)",
                feature,
                info.count,
                info.size_bytes as f64 / 1024.
            );
        }
    }

    let stats = roaring.statistics();
    if !stats.is_empty() {
        found = true;
        println!("\nRoaring bitmap indices (.roar):");
        for (feature, info) in stats.iter() {
            let mode = if info.is_64bit == Some(true) {
                "64-bit"
            } else {
                "32-bit"
            };
            println!("  {}: {} nodes ({})", feature, info.count, mode);
        }
    }

    if !found {
        println!("No index files found.");
    }
    Ok(())
}

fn query(dir: PathBuf, feature: Option<String>, ids: Vec<NodeId>) -> Result<()> {
    let set = IndexSet::load_dir(&dir)?;
    let backends = set.backends();
    if backends.is_empty() {
        return Err(anyhow!("no index files in {}", dir.display()));
    }

    for backend in backends {
        println!(".{}", backend.extension());
        match &feature {
            Some(feature) => println!("  {}: {}", feature, backend.count(feature, &ids)?),
            None => {
                for (feature, count) in backend.count_all(&ids)? {
                    println!("  {}: {}", feature, count);
                }
            }
        }
    }

    for mismatch in set.cross_check(&ids)? {
        eprintln!(
            "warning: {} counts differ (u64: {}, roar: {})",
            mismatch.feature, mismatch.sorted_count, mismatch.roaring_count
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if cli.verbose { "debug" } else { "info" },
    ))
    .init();

    match cli.command {
        Commands::Build {
            input,
            out,
            format,
            features,
            features_config,
            tmp,
            flush_threshold,
            external_sort_threshold,
        } => {
            let options = BuilderOptions {
                flush_threshold,
                external_sort_threshold,
                ..Default::default()
            };
            build(input, out, format, features, features_config, tmp, options)
        }
        Commands::Inspect { dir, json } => inspect(dir, json),
        Commands::Query { dir, feature, ids } => query(dir, feature, ids),
    }
}
