//! Human-readable record of which excerpts make up a mix.

use crate::models::MixSegment;
use chrono::{DateTime, Local};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct ProvenanceLog {
    pub created_at: DateTime<Local>,
    pub target_duration_ms: u64,
    pub layer_count: usize,
    pub segments: Vec<MixSegment>,
}

/// `MM:SS`, minutes unbounded.
pub fn timecode(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

impl ProvenanceLog {
    pub fn new(
        created_at: DateTime<Local>,
        target_duration_ms: u64,
        layer_count: usize,
        segments: Vec<MixSegment>,
    ) -> Self {
        Self {
            created_at,
            target_duration_ms,
            layer_count,
            segments,
        }
    }

    pub fn header(&self) -> String {
        format!(
            "rndsnd mix created {} | duration {} | layers {}",
            self.created_at.format("%Y-%m-%d %H:%M:%S"),
            timecode(self.target_duration_ms),
            self.layer_count
        )
    }

    fn segment_line(&self, seg: &MixSegment) -> String {
        let name = Path::new(&seg.source_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| seg.source_path.clone());
        let range = format!(
            "{}-{}",
            timecode(seg.start_offset_ms),
            timecode(seg.start_offset_ms + seg.length_ms)
        );
        if self.layer_count > 1 {
            format!("{} | Layer {} | {}", name, seg.layer_index + 1, range)
        } else {
            format!("{} | {}", name, range)
        }
    }

    /// Header followed by one sorted line per segment.
    pub fn lines(&self) -> Vec<String> {
        let mut body: Vec<String> = self.segments.iter().map(|s| self.segment_line(s)).collect();
        body.sort();
        let mut out = Vec::with_capacity(body.len() + 1);
        out.push(self.header());
        out.extend(body);
        out
    }

    pub fn render(&self) -> String {
        let mut text = self.lines().join("\n");
        text.push('\n');
        text
    }

    /// Distinct layer indices that received at least one segment.
    pub fn layers_used(&self) -> Vec<usize> {
        let mut layers: Vec<usize> = self.segments.iter().map(|s| s.layer_index).collect();
        layers.sort_unstable();
        layers.dedup();
        layers
    }
}
