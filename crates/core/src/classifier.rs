//! Content tagging: sample fixed-length windows, sum label scores, keep the top N.

use crate::audio::SampleBuffer;
use crate::models::{NO_CLASSIFIER_TAG, UNKNOWN_TAG};
use providers::{LabelScores, TagClassifier};
use std::cmp::Ordering;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct TaggingSettings {
    pub window_ms: u64,
    /// Clips shorter than this get a single window at offset 0.
    pub short_clip_ms: u64,
    pub windows: usize,
    pub top_n: usize,
}

impl Default for TaggingSettings {
    fn default() -> Self {
        Self {
            window_ms: 10_000,
            short_clip_ms: 30_000,
            windows: 3,
            top_n: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagOutcome {
    pub tags: Vec<String>,
    pub windows_classified: usize,
    pub windows_failed: usize,
}

/// Start frames of the windows to classify.
///
/// Windows are spread evenly from 0 to `duration - window`; with three
/// windows that is the start, the midpoint minus half a window, and the end
/// minus one window. All offsets are floored at 0.
pub fn window_offsets(
    duration: usize,
    window: usize,
    windows: usize,
    short_clip: usize,
) -> Vec<usize> {
    if windows <= 1 || duration < short_clip || duration <= window {
        return vec![0];
    }
    let last = duration - window;
    let mut offsets: Vec<usize> = (0..windows)
        .map(|i| (last as f64 * i as f64 / (windows - 1) as f64).round() as usize)
        .collect();
    offsets.dedup();
    offsets
}

/// Sums scores per label across windows.
pub fn aggregate_scores<I>(windows: I) -> LabelScores
where
    I: IntoIterator<Item = LabelScores>,
{
    let mut total = LabelScores::new();
    for scores in windows {
        for (label, score) in scores {
            *total.entry(label).or_insert(0.0) += score;
        }
    }
    total
}

/// Labels ranked by descending score, ties broken alphabetically.
pub fn top_labels(scores: &LabelScores, n: usize) -> Vec<String> {
    let mut ranked: Vec<(&String, &f32)> = scores.iter().collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    ranked.into_iter().take(n).map(|(l, _)| l.clone()).collect()
}

pub async fn tag_buffer(
    buffer: &SampleBuffer,
    classifier: Option<&dyn TagClassifier>,
    settings: &TaggingSettings,
) -> TagOutcome {
    let Some(classifier) = classifier else {
        return TagOutcome {
            tags: vec![NO_CLASSIFIER_TAG.to_string()],
            windows_classified: 0,
            windows_failed: 0,
        };
    };

    let window = buffer.ms_to_frames(settings.window_ms);
    let offsets = window_offsets(
        buffer.frames(),
        window,
        settings.windows,
        buffer.ms_to_frames(settings.short_clip_ms),
    );

    let mut results = Vec::with_capacity(offsets.len());
    let mut failed = 0;
    for offset in offsets {
        let slice = buffer.slice_frames(offset, offset + window);
        match classifier
            .classify(slice.samples(), slice.sample_rate())
            .await
        {
            Ok(scores) => results.push(scores),
            Err(e) => {
                warn!("classifier failed on window at frame {}: {}", offset, e);
                failed += 1;
            }
        }
    }

    let classified = results.len();
    let tags = top_labels(&aggregate_scores(results), settings.top_n);
    debug!("tagged {} window(s): {:?}", classified, tags);
    TagOutcome {
        tags: if tags.is_empty() {
            vec![UNKNOWN_TAG.to_string()]
        } else {
            tags
        },
        windows_classified: classified,
        windows_failed: failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use providers::ProviderError;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn scores(pairs: &[(&str, f32)]) -> LabelScores {
        pairs.iter().map(|(l, s)| (l.to_string(), *s)).collect()
    }

    #[test]
    fn short_clips_use_one_window() {
        assert_eq!(window_offsets(200, 100, 3, 300), vec![0]);
        // Shorter than one window: classified once even past the threshold.
        assert_eq!(window_offsets(50, 100, 3, 10), vec![0]);
        assert_eq!(window_offsets(100, 100, 3, 10), vec![0]);
        // Offsets that round together are classified once.
        assert_eq!(window_offsets(101, 100, 3, 10), vec![0, 1]);
    }

    #[test]
    fn three_windows_cover_start_middle_end() {
        // 60 s at 1 kHz, 10 s windows.
        let offsets = window_offsets(60_000, 10_000, 3, 30_000);
        assert_eq!(offsets, vec![0, 25_000, 50_000]);
    }

    #[test]
    fn window_count_generalizes() {
        assert_eq!(window_offsets(100, 10, 4, 0), vec![0, 30, 60, 90]);
        assert_eq!(window_offsets(100, 10, 1, 0), vec![0]);
    }

    #[test]
    fn scores_are_summed_not_averaged() {
        let total = aggregate_scores(vec![
            scores(&[("Music", 0.5), ("Speech", 0.4)]),
            scores(&[("Music", 0.25), ("Rain", 0.9)]),
        ]);
        assert_eq!(total["Music"], 0.75);
        assert_eq!(total["Rain"], 0.9);
        assert_eq!(total["Speech"], 0.4);
    }

    #[test]
    fn ranking_is_descending_with_stable_ties() {
        let total = scores(&[("b", 1.0), ("a", 1.0), ("c", 2.0), ("d", 0.1)]);
        assert_eq!(top_labels(&total, 3), vec!["c", "a", "b"]);
        assert!(top_labels(&LabelScores::new(), 3).is_empty());
    }

    struct Counting {
        calls: AtomicUsize,
        fail_every_call: bool,
    }

    #[async_trait::async_trait]
    impl TagClassifier for Counting {
        async fn classify(&self, samples: &[f32], _: u32) -> Result<LabelScores, ProviderError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            if self.fail_every_call {
                return Err(ProviderError::RequestFailed("model offline".into()));
            }
            Ok(scores(&[("Music", 0.5), ("Window", samples.len() as f32)]))
        }
    }

    #[tokio::test]
    async fn long_buffers_are_classified_three_times() {
        let buffer = SampleBuffer::silence(60_000, 100);
        let c = Counting {
            calls: AtomicUsize::new(0),
            fail_every_call: false,
        };
        let classifier: &dyn TagClassifier = &c;
        let out = tag_buffer(&buffer, Some(classifier), &TaggingSettings::default()).await;
        assert_eq!(c.calls.load(AtomicOrdering::SeqCst), 3);
        assert_eq!(out.windows_classified, 3);
        assert_eq!(out.tags, vec!["Window", "Music"]);
    }

    #[tokio::test]
    async fn failures_fall_back_to_unknown() {
        let buffer = SampleBuffer::silence(5_000, 100);
        let c = Counting {
            calls: AtomicUsize::new(0),
            fail_every_call: true,
        };
        let classifier: &dyn TagClassifier = &c;
        let out = tag_buffer(&buffer, Some(classifier), &TaggingSettings::default()).await;
        assert_eq!(c.calls.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(out.tags, vec![UNKNOWN_TAG]);
        assert_eq!(out.windows_failed, 1);
    }

    #[tokio::test]
    async fn missing_classifier_yields_sentinel() {
        let buffer = SampleBuffer::silence(5_000, 100);
        let out = tag_buffer(&buffer, None, &TaggingSettings::default()).await;
        assert_eq!(out.tags, vec![NO_CLASSIFIER_TAG]);
    }
}
