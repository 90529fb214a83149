use crate::catalog::{CatalogStore, SqliteCatalog};
use crate::codec::{AudioCodec, SymphoniaCodec};
use crate::config::AppConfig;
use crate::mixer::{self, Synthesizer};
use crate::models::MixParameters;
use crate::scanner::{ScanOptions, ScanProgress, ScanResult, Scanner};
use anyhow::Context;
use providers::http::{HttpClassifierConfig, HttpTagClassifier};
use providers::{ProviderRegistry, TagClassifier};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storage::{connect, migrate};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct MixReport {
    pub audio_path: PathBuf,
    pub log_path: PathBuf,
    pub duration_ms: u64,
    pub layer_count: usize,
    pub segments: usize,
    pub sources: usize,
}

pub async fn open_catalog(config: &AppConfig) -> anyhow::Result<SqliteCatalog> {
    let pool = connect(&config.database.path).await.context("db connect")?;
    migrate(&pool).await.context("db migrate")?;
    Ok(SqliteCatalog::new(pool))
}

pub fn build_registry(config: &AppConfig) -> ProviderRegistry {
    let mut reg = ProviderRegistry::new();

    if let Some(url) = &config.tagging.url {
        let provider = HttpTagClassifier::new(HttpClassifierConfig {
            url: url.clone(),
            api_key: std::env::var("RNDSND_TAGGER_API_KEY").ok(),
        });
        reg = reg.with_classifier("http", Arc::new(provider));
    }

    reg.set_preferred_classifier(&config.tagging.provider)
}

/// Resolves the configured classifier once. `none` is a valid setup.
pub fn build_classifier(config: &AppConfig) -> Option<Arc<dyn TagClassifier>> {
    if config.tagging.provider.eq_ignore_ascii_case("none") {
        return None;
    }
    match build_registry(config).classifier(None) {
        Ok(c) => Some(c),
        Err(e) => {
            warn!("Tagging disabled: {}", e);
            None
        }
    }
}

pub fn build_scanner(config: &AppConfig, catalog: Arc<dyn CatalogStore>) -> Scanner {
    let codec: Arc<dyn AudioCodec> = Arc::new(SymphoniaCodec::new(config.tagging.sample_rate));
    Scanner::new(
        catalog,
        codec,
        build_classifier(config),
        ScanOptions {
            excludes: config.scan.exclude.clone(),
            prune_missing: config.scan.prune_missing,
            tagging: config.tagging.settings(),
        },
    )
}

/// Scans every root in turn; `roots` falls back to `scan.include`.
pub async fn run_scan(
    config: &AppConfig,
    roots: &[PathBuf],
    cancel: &CancellationToken,
    progress: Option<UnboundedSender<ScanProgress>>,
) -> anyhow::Result<ScanResult> {
    let catalog: Arc<dyn CatalogStore> = Arc::new(open_catalog(config).await?);
    let mut scanner = build_scanner(config, catalog);
    if let Some(tx) = progress {
        scanner = scanner.with_progress(tx);
    }
    if !scanner.has_classifier() {
        info!("No classifier configured; entries will be stored without content tags");
    }

    let roots: Vec<PathBuf> = if roots.is_empty() {
        config.scan.include.iter().map(PathBuf::from).collect()
    } else {
        roots.to_vec()
    };

    let mut total = ScanResult::default();
    for root in &roots {
        let result = scanner.scan(root, cancel).await?;
        total.merge(&result);
        if result.cancelled {
            break;
        }
    }
    Ok(total)
}

pub async fn run_mix(
    config: &AppConfig,
    params: MixParameters,
    seed: Option<u64>,
    output_dir: Option<&Path>,
    cancel: &CancellationToken,
) -> anyhow::Result<MixReport> {
    let catalog = open_catalog(config).await?;
    let sources = mixer::resolve_sources(&catalog, &params.source).await?;

    let codec = Arc::new(SymphoniaCodec::new(config.mix.sample_rate));
    let synth = Synthesizer::new(codec.clone(), config.mix.settings());
    let format = config.mix.format;
    let out_dir = output_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&config.mix.output_dir));
    let cancel = cancel.clone();

    tokio::task::spawn_blocking(move || -> anyhow::Result<MixReport> {
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let output = synth.generate(&params, &sources, &mut rng, &cancel)?;
        let (audio_path, log_path) = output.write(&out_dir, codec.as_ref(), format)?;
        Ok(MixReport {
            audio_path,
            log_path,
            duration_ms: output.buffer.duration_ms(),
            layer_count: output.log.layer_count,
            segments: output.log.segments.len(),
            sources: sources.len(),
        })
    })
    .await
    .context("mix worker panicked")?
}
