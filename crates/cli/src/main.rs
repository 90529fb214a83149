use anyhow::Result;
use clap::{Parser, Subcommand};
use rndsnd_cli::watch;
use rndsnd_core::catalog::CatalogStore;
use rndsnd_core::config::{self, AppConfig};
use rndsnd_core::models::{CatalogEntry, MixParameters, SourceSelector};
use rndsnd_core::pipeline;
use rndsnd_core::provenance::timecode;
use rndsnd_core::scanner::ScanProgress;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted; stopping at the next file boundary.");
            on_ctrl_c.cancel();
        }
    });

    match cli.command {
        Commands::Scan { roots, json } => run_scan(cfg, roots, json, cancel).await,
        Commands::Search { query, limit, json } => run_search(cfg, query, limit, json).await,
        Commands::List {
            prefix,
            limit,
            json,
        } => run_list(cfg, prefix, limit, json).await,
        Commands::Mix {
            minutes,
            seconds,
            layers,
            query,
            prefix,
            seed,
            output,
            json,
        } => {
            let target_duration_ms = match (seconds, minutes) {
                (Some(s), _) => s * 1000,
                (None, Some(m)) => m * 60 * 1000,
                (None, None) => 5 * 60 * 1000,
            };
            run_mix(
                cfg,
                target_duration_ms,
                layers,
                query,
                prefix,
                seed,
                output,
                json,
                cancel,
            )
            .await
        }
        Commands::Watch { roots } => watch::watch_paths(cfg, roots, cancel).await,
    }
}

#[derive(Parser)]
#[command(name = "rndsnd")]
#[command(about = "Audio library indexer and random mix generator", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan folders and index new or changed audio files
    Scan {
        /// Folders to scan; defaults to scan.include from the config
        roots: Vec<PathBuf>,
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
    /// Find catalog entries whose filename or tags contain the text
    Search {
        query: String,
        #[arg(short, long, default_value_t = 500)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// List catalog entries, optionally under a folder prefix
    List {
        #[arg(long)]
        prefix: Option<String>,
        #[arg(short, long, default_value_t = 200)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Generate a random mix from the catalog
    Mix {
        /// Target length in minutes (default 5)
        #[arg(long, conflicts_with = "seconds")]
        minutes: Option<u64>,
        /// Target length in seconds
        #[arg(long)]
        seconds: Option<u64>,
        /// 1 for a crossfaded sequence, more for overlaid layers
        #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
        layers: u64,
        /// Only use entries matching this search text
        #[arg(long, conflicts_with = "prefix")]
        query: Option<String>,
        /// Only use entries under this folder prefix
        #[arg(long)]
        prefix: Option<String>,
        /// Seed for a reproducible mix
        #[arg(long)]
        seed: Option<u64>,
        /// Output directory; defaults to mix.output_dir
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Watch folders and rescan them when audio files change
    Watch {
        roots: Vec<PathBuf>,
    },
}

async fn run_scan(cfg: AppConfig, roots: Vec<PathBuf>, json: bool, cancel: CancellationToken) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ScanProgress>();
    let printer = tokio::spawn(async move {
        while let Some(p) = rx.recv().await {
            if json {
                continue;
            }
            let name = p
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match p.tags {
                Some(ref tags) => eprintln!("[{:>3}%] {} [{}]", p.percent(), name, tags.join(", ")),
                None => eprintln!("[{:>3}%] {}", p.percent(), name),
            }
        }
    });

    let summary = pipeline::run_scan(&cfg, &roots, &cancel, Some(tx)).await?;
    let _ = printer.await;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "scan: examined {}, indexed {}, unchanged {}, skipped {}, removed {}{}",
            summary.files_examined,
            summary.files_newly_indexed,
            summary.files_unchanged,
            summary.files_skipped,
            summary.files_removed,
            if summary.cancelled { " (cancelled)" } else { "" }
        );
    }
    Ok(())
}

fn print_entries(entries: &[CatalogEntry], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }
    for e in entries {
        let duration = if e.duration_seconds > 0.0 {
            timecode((e.duration_seconds * 1000.0) as u64)
        } else {
            "--:--".to_string()
        };
        let size = format!("{:.1}MB", e.size_bytes as f64 / (1024.0 * 1024.0));
        println!("{:>6} {:>8}  {}  [{}]", duration, size, e.path, e.tags_display());
    }
    Ok(())
}

async fn run_search(cfg: AppConfig, query: String, limit: usize, json: bool) -> Result<()> {
    let catalog = pipeline::open_catalog(&cfg).await?;
    let mut entries = catalog.search(&query).await?;
    entries.truncate(limit);
    print_entries(&entries, json)
}

async fn run_list(cfg: AppConfig, prefix: Option<String>, limit: usize, json: bool) -> Result<()> {
    let catalog = pipeline::open_catalog(&cfg).await?;
    let mut entries = catalog
        .list_by_prefix(prefix.as_deref().unwrap_or(""))
        .await?;
    entries.truncate(limit);
    print_entries(&entries, json)
}

#[allow(clippy::too_many_arguments)]
async fn run_mix(
    cfg: AppConfig,
    target_duration_ms: u64,
    layers: u64,
    query: Option<String>,
    prefix: Option<String>,
    seed: Option<u64>,
    output: Option<PathBuf>,
    json: bool,
    cancel: CancellationToken,
) -> Result<()> {
    let source = if query.is_some() || prefix.is_some() {
        let catalog = pipeline::open_catalog(&cfg).await?;
        let entries = match (&query, &prefix) {
            (Some(q), _) => catalog.search(q).await?,
            (None, Some(p)) => catalog.list_by_prefix(p).await?,
            (None, None) => Vec::new(),
        };
        SourceSelector::Paths(entries.into_iter().map(|e| e.path).collect())
    } else {
        SourceSelector::FullCatalog
    };

    let params = MixParameters {
        target_duration_ms,
        layer_count: layers as usize,
        source,
    };
    let report = pipeline::run_mix(&cfg, params, seed, output.as_deref(), &cancel).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "mix: {} ({} layer(s), {} segment(s) from {} source(s)), log {}",
            report.audio_path.display(),
            report.layer_count,
            report.segments,
            report.sources,
            report.log_path.display()
        );
    }
    Ok(())
}
