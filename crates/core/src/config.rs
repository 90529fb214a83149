use crate::classifier::TaggingSettings;
use crate::codec::OutputFormat;
use crate::mixer::MixSettings;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scan: ScanPaths,
    pub tagging: TaggingConfig,
    pub mix: MixConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "rndsnd.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanPaths {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Forget catalog entries whose file has disappeared from a scanned root.
    pub prune_missing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggingConfig {
    /// `none` or `http`.
    pub provider: String,
    pub url: Option<String>,
    pub sample_rate: u32,
    pub window_seconds: f64,
    pub short_clip_seconds: f64,
    pub windows: usize,
    pub top_n: usize,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            provider: "none".to_string(),
            url: None,
            sample_rate: 32_000,
            window_seconds: 10.0,
            short_clip_seconds: 30.0,
            windows: 3,
            top_n: 3,
        }
    }
}

impl TaggingConfig {
    pub fn settings(&self) -> TaggingSettings {
        TaggingSettings {
            window_ms: (self.window_seconds.max(0.0) * 1000.0) as u64,
            short_clip_ms: (self.short_clip_seconds.max(0.0) * 1000.0) as u64,
            windows: self.windows.max(1),
            top_n: self.top_n.max(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MixConfig {
    pub sample_rate: u32,
    pub output_dir: String,
    pub format: OutputFormat,
    pub crossfade_ms: u64,
    pub edge_fade_ms: u64,
    pub linear_excerpt_ms: [u64; 2],
    pub layered_excerpt_ms: [u64; 2],
    pub gain_db: [f32; 2],
    pub max_decode_failures: usize,
}

impl Default for MixConfig {
    fn default() -> Self {
        let s = MixSettings::default();
        Self {
            sample_rate: s.sample_rate,
            output_dir: "output".to_string(),
            format: OutputFormat::Wav,
            crossfade_ms: s.crossfade_ms,
            edge_fade_ms: s.edge_fade_ms,
            linear_excerpt_ms: [s.linear_excerpt_ms.0, s.linear_excerpt_ms.1],
            layered_excerpt_ms: [s.layered_excerpt_ms.0, s.layered_excerpt_ms.1],
            gain_db: [s.gain_db.0, s.gain_db.1],
            max_decode_failures: s.max_decode_failures,
        }
    }
}

impl MixConfig {
    pub fn settings(&self) -> MixSettings {
        MixSettings {
            sample_rate: self.sample_rate,
            crossfade_ms: self.crossfade_ms,
            edge_fade_ms: self.edge_fade_ms,
            linear_excerpt_ms: (self.linear_excerpt_ms[0], self.linear_excerpt_ms[1]),
            layered_excerpt_ms: (self.layered_excerpt_ms[0], self.layered_excerpt_ms[1]),
            gain_db: (self.gain_db[0], self.gain_db[1]),
            max_decode_failures: self.max_decode_failures,
        }
    }
}

/// Loads `path` (or the optional `config/default` file) and overlays
/// `RNDSND__SECTION__KEY` environment variables.
pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    settings = settings.add_source(
        config::Environment::with_prefix("RNDSND")
            .separator("__")
            .try_parsing(true),
    );
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}
