//! Walks a library folder and keeps the catalog in step with it.
//!
//! Files whose stored `last_modified` is at least their current mtime are
//! left alone; everything else is decoded, tagged and upserted. A file that
//! cannot be read or decoded is counted and skipped, never fatal.

use crate::catalog::CatalogStore;
use crate::classifier::{self, TaggingSettings};
use crate::codec::AudioCodec;
use crate::models::CatalogEntry;
use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};
use providers::TagClassifier;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const AUDIO_EXTENSIONS: &[&str] = &[
    "wav", "mp3", "flac", "aiff", "aif", "ogg", "m4a", "wma", "aac", "opus",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub files_examined: usize,
    pub files_newly_indexed: usize,
    pub files_unchanged: usize,
    pub files_skipped: usize,
    pub files_removed: usize,
    pub cancelled: bool,
}

impl ScanResult {
    /// Folds the counts of another root's scan into this one.
    pub fn merge(&mut self, other: &ScanResult) {
        self.files_examined += other.files_examined;
        self.files_newly_indexed += other.files_newly_indexed;
        self.files_unchanged += other.files_unchanged;
        self.files_skipped += other.files_skipped;
        self.files_removed += other.files_removed;
        self.cancelled |= other.cancelled;
    }
}

#[derive(Debug, Clone)]
pub struct ScanProgress {
    pub processed: usize,
    pub total: usize,
    pub path: PathBuf,
    /// `None` when the file was unchanged or skipped.
    pub tags: Option<Vec<String>>,
}

impl ScanProgress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        (self.processed * 100 / self.total) as u8
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub excludes: Vec<String>,
    pub prune_missing: bool,
    pub tagging: TaggingSettings,
}

#[derive(Debug, Clone)]
struct Candidate {
    path: PathBuf,
    size: u64,
    mtime: i64,
}

pub struct Scanner {
    catalog: Arc<dyn CatalogStore>,
    codec: Arc<dyn AudioCodec>,
    classifier: Option<Arc<dyn TagClassifier>>,
    options: ScanOptions,
    progress: Option<UnboundedSender<ScanProgress>>,
}

impl Scanner {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        codec: Arc<dyn AudioCodec>,
        classifier: Option<Arc<dyn TagClassifier>>,
        options: ScanOptions,
    ) -> Self {
        Self {
            catalog,
            codec,
            classifier,
            options,
            progress: None,
        }
    }

    pub fn with_progress(mut self, tx: UnboundedSender<ScanProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    pub async fn scan(&self, root: &Path, cancel: &CancellationToken) -> anyhow::Result<ScanResult> {
        // Catalog keys are absolute, whatever spelling the caller used.
        let root = std::path::absolute(root)
            .with_context(|| format!("cannot resolve scan root {:?}", root))?;
        let root = root.as_path();
        let exclude_set = build_globset(&self.options.excludes)?;
        let walk_root = root.to_path_buf();
        let candidates = task::spawn_blocking(move || collect_audio_files(&walk_root, &exclude_set))
            .await
            .context("directory walk panicked")?;

        let total = candidates.len();
        info!("Scanning {:?}: {} audio file(s) found", root, total);

        let mut result = ScanResult::default();
        let mut seen = HashSet::with_capacity(total);
        for (i, candidate) in candidates.into_iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Scan of {:?} cancelled after {} file(s)", root, i);
                result.cancelled = true;
                break;
            }
            result.files_examined += 1;
            let path_str = candidate.path.to_string_lossy().into_owned();
            seen.insert(path_str.clone());

            let existing = self
                .catalog
                .get(&path_str)
                .await
                .with_context(|| format!("catalog lookup failed for {:?}", candidate.path))?;
            if is_fresh(existing.as_ref(), candidate.mtime) {
                debug!("unchanged: {:?}", candidate.path);
                result.files_unchanged += 1;
                self.report(i + 1, total, &candidate.path, None);
                continue;
            }

            let entry = match self.index_file(&candidate).await {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("skipping {:?}: {}", candidate.path, e);
                    result.files_skipped += 1;
                    self.report(i + 1, total, &candidate.path, None);
                    continue;
                }
            };
            self.catalog
                .upsert(&entry)
                .await
                .with_context(|| format!("failed to store {:?}", candidate.path))?;
            result.files_newly_indexed += 1;
            info!("Indexed {} [{}]", entry.filename, entry.tags_display());
            self.report(i + 1, total, &candidate.path, Some(entry.tags));
        }

        if self.options.prune_missing && !result.cancelled {
            result.files_removed = self.prune(root, &seen).await?;
        }

        info!(
            "Scan of {:?} complete: {} examined, {} indexed, {} unchanged, {} skipped, {} removed",
            root,
            result.files_examined,
            result.files_newly_indexed,
            result.files_unchanged,
            result.files_skipped,
            result.files_removed
        );
        Ok(result)
    }

    async fn index_file(&self, candidate: &Candidate) -> anyhow::Result<CatalogEntry> {
        let codec = self.codec.clone();
        let path = candidate.path.clone();
        let buffer = task::spawn_blocking(move || codec.decode(&path)).await??;

        let outcome = classifier::tag_buffer(
            &buffer,
            self.classifier.as_deref(),
            &self.options.tagging,
        )
        .await;

        let mut entry = CatalogEntry::for_path(&candidate.path);
        entry.tags = outcome.tags;
        entry.duration_seconds = buffer.duration_seconds();
        entry.size_bytes = candidate.size;
        entry.last_modified = Some(candidate.mtime);
        Ok(entry)
    }

    async fn prune(&self, root: &Path, seen: &HashSet<String>) -> anyhow::Result<usize> {
        let mut removed = 0;
        let prefix = root.to_string_lossy();
        for entry in self.catalog.list_by_prefix(&prefix).await? {
            let path = Path::new(&entry.path);
            if !path.starts_with(root) || seen.contains(&entry.path) || path.exists() {
                continue;
            }
            if self.catalog.remove(&entry.path).await? {
                debug!("pruned missing file {:?}", path);
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn report(&self, processed: usize, total: usize, path: &Path, tags: Option<Vec<String>>) {
        if let Some(tx) = &self.progress {
            // A dropped receiver only means nobody is watching.
            let _ = tx.send(ScanProgress {
                processed,
                total,
                path: path.to_path_buf(),
                tags,
            });
        }
    }
}

fn is_fresh(existing: Option<&CatalogEntry>, mtime: i64) -> bool {
    existing
        .and_then(|e| e.last_modified)
        .map(|stored| stored >= mtime)
        .unwrap_or(false)
}

fn collect_audio_files(root: &Path, excludes: &GlobSet) -> Vec<Candidate> {
    let mut out = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| should_descend(e.path(), root, excludes))
    {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let path = entry.path();
        if !entry.file_type().is_file() && !path.is_file() {
            continue;
        }
        if !is_audio_file(path) {
            continue;
        }
        let meta = match fs::metadata(path) {
            Ok(m) => m,
            Err(_) => continue,
        };
        out.push(Candidate {
            path: path.to_path_buf(),
            size: meta.len(),
            mtime: mtime_millis(&meta),
        });
    }
    out
}

pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_lowercase();
            AUDIO_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

fn mtime_millis(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        builder.add(Glob::new(pat)?);
    }
    Ok(builder.build()?)
}

fn should_descend(path: &Path, root: &Path, excludes: &GlobSet) -> bool {
    // The root itself is always walked, even if it is a dot-directory.
    if path == root {
        return true;
    }
    !excludes.is_match(path) && !is_hidden(path)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}
