use serde::{Deserialize, Serialize};
use std::path::Path;

/// Stored as the only tag when no classifier is configured.
pub const NO_CLASSIFIER_TAG: &str = "no-classifier";
/// Stored as the only tag when classification was attempted but produced nothing.
pub const UNKNOWN_TAG: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub path: String,
    pub filename: String,
    pub folder: String,
    pub tags: Vec<String>,
    pub duration_seconds: f64,
    pub size_bytes: u64,
    /// Unix milliseconds of the file's mtime when it was indexed.
    pub last_modified: Option<i64>,
}

impl CatalogEntry {
    pub fn for_path(path: &Path) -> Self {
        Self {
            path: path.to_string_lossy().into_owned(),
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            folder: path
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            tags: Vec::new(),
            duration_seconds: 0.0,
            size_bytes: 0,
            last_modified: None,
        }
    }

    pub fn tags_display(&self) -> String {
        self.tags.join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceSelector {
    /// An externally filtered subset, e.g. search results.
    Paths(Vec<String>),
    FullCatalog,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixParameters {
    pub target_duration_ms: u64,
    /// `1` builds a crossfaded sequence, more builds overlaid layers.
    pub layer_count: usize,
    pub source: SourceSelector,
}

impl MixParameters {
    pub fn is_layered(&self) -> bool {
        self.layer_count > 1
    }
}

/// One excerpt placed into a mix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixSegment {
    pub source_path: String,
    pub start_offset_ms: u64,
    pub length_ms: u64,
    pub layer_index: usize,
}
