//! Generative mix synthesis from random catalog excerpts.
//!
//! One layer builds a mono crossfaded sequence; more layers each fill a
//! silent stereo track with panned, attenuated excerpts and are summed.

use crate::audio::{frames_to_ms, ms_to_frames, SampleBuffer};
use crate::catalog::CatalogStore;
use crate::codec::{AudioCodec, OutputFormat};
use crate::error::{MixError, StoreError};
use crate::models::{MixParameters, MixSegment, SourceSelector};
use crate::provenance::ProvenanceLog;
use anyhow::Context;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct MixSettings {
    pub sample_rate: u32,
    pub crossfade_ms: u64,
    pub edge_fade_ms: u64,
    pub linear_excerpt_ms: (u64, u64),
    pub layered_excerpt_ms: (u64, u64),
    /// Attenuation range for layered excerpts; positive bounds are capped at 0 dB.
    pub gain_db: (f32, f32),
    /// Consecutive decode failures tolerated before a mix is abandoned.
    pub max_decode_failures: usize,
}

impl Default for MixSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            crossfade_ms: 500,
            edge_fade_ms: 50,
            linear_excerpt_ms: (10_000, 30_000),
            layered_excerpt_ms: (3_000, 15_000),
            gain_db: (-12.0, -3.0),
            max_decode_failures: 25,
        }
    }
}

fn ordered<T: PartialOrd>(range: (T, T)) -> (T, T) {
    if range.0 <= range.1 {
        range
    } else {
        (range.1, range.0)
    }
}

pub struct MixOutput {
    pub buffer: SampleBuffer,
    pub log: ProvenanceLog,
}

impl MixOutput {
    /// Base name shared by the audio file and its log.
    pub fn file_stem(&self) -> String {
        format!("rndsnd_mix_{}", self.log.created_at.format("%Y%m%d_%H%M%S"))
    }

    /// Writes `<stem>.wav` and `<stem>.txt` into `dir`, returning both paths.
    pub fn write(
        &self,
        dir: &Path,
        codec: &dyn AudioCodec,
        format: OutputFormat,
    ) -> anyhow::Result<(PathBuf, PathBuf)> {
        std::fs::create_dir_all(dir).with_context(|| format!("create {:?}", dir))?;
        let stem = self.file_stem();
        let mut n = 1;
        let (audio, log) = loop {
            let name = if n == 1 {
                stem.clone()
            } else {
                format!("{}_{}", stem, n)
            };
            let audio = dir.join(format!("{}.{}", name, format.extension()));
            let log = dir.join(format!("{}.txt", name));
            if !audio.exists() && !log.exists() {
                break (audio, log);
            }
            n += 1;
        };
        codec
            .encode(&self.buffer, &audio, format)
            .with_context(|| format!("encode {:?}", audio))?;
        std::fs::write(&log, self.log.render()).with_context(|| format!("write {:?}", log))?;
        info!("Wrote mix {:?} and log {:?}", audio, log);
        Ok((audio, log))
    }
}

/// Snapshot of the paths a mix draws from.
pub async fn resolve_sources(
    store: &dyn CatalogStore,
    selector: &SourceSelector,
) -> Result<Vec<String>, StoreError> {
    match selector {
        SourceSelector::Paths(paths) => Ok(paths.clone()),
        SourceSelector::FullCatalog => store.all_paths().await,
    }
}

pub struct Synthesizer {
    codec: Arc<dyn AudioCodec>,
    settings: MixSettings,
}

impl Synthesizer {
    pub fn new(codec: Arc<dyn AudioCodec>, settings: MixSettings) -> Self {
        Self { codec, settings }
    }

    pub fn settings(&self) -> &MixSettings {
        &self.settings
    }

    pub fn generate<R: Rng>(
        &self,
        params: &MixParameters,
        sources: &[String],
        rng: &mut R,
        cancel: &CancellationToken,
    ) -> Result<MixOutput, MixError> {
        if sources.is_empty() {
            return Err(MixError::EmptySource);
        }
        let target_ms = params.target_duration_ms.max(1);
        let layers = params.layer_count.max(1);
        info!(
            "Generating {} ms mix from {} source(s), {} layer(s)",
            target_ms,
            sources.len(),
            layers
        );

        let (buffer, segments) = if layers == 1 {
            self.build_linear(target_ms, sources, rng, cancel)?
        } else {
            self.build_layered(target_ms, layers, sources, rng, cancel)?
        };
        debug!("mix assembled from {} segment(s)", segments.len());
        let log = ProvenanceLog::new(chrono::Local::now(), target_ms, layers, segments);
        Ok(MixOutput { buffer, log })
    }

    fn build_linear<R: Rng>(
        &self,
        target_ms: u64,
        sources: &[String],
        rng: &mut R,
        cancel: &CancellationToken,
    ) -> Result<(SampleBuffer, Vec<MixSegment>), MixError> {
        let sr = self.settings.sample_rate;
        let target = ms_to_frames(target_ms, sr);
        let mut mix = SampleBuffer::mono(Vec::new(), sr);
        let mut segments = Vec::new();

        while mix.frames() < target {
            if cancel.is_cancelled() {
                return Err(MixError::Cancelled);
            }
            let (path, source) = self.pick_source(sources, rng)?;
            let (start, mut excerpt) = random_excerpt(&source, self.settings.linear_excerpt_ms, rng);
            excerpt.fade_in(self.settings.edge_fade_ms);
            excerpt.fade_out(self.settings.edge_fade_ms);

            // Capped at half the excerpt so every append lengthens the mix.
            let crossfade = if mix.is_empty() {
                0
            } else {
                self.settings.crossfade_ms.min(excerpt.duration_ms() / 2)
            };
            mix = mix.append_with_crossfade(&excerpt, crossfade)?;
            segments.push(MixSegment {
                source_path: path,
                start_offset_ms: frames_to_ms(start, source.sample_rate()),
                length_ms: excerpt.duration_ms(),
                layer_index: 0,
            });
        }
        let overshoot = frames_to_ms(mix.frames().saturating_sub(target), sr);
        if let Some(last) = segments.last_mut() {
            last.length_ms = last.length_ms.saturating_sub(overshoot);
        }
        mix.truncate_frames(target);
        Ok((mix, segments))
    }

    fn build_layered<R: Rng>(
        &self,
        target_ms: u64,
        layers: usize,
        sources: &[String],
        rng: &mut R,
        cancel: &CancellationToken,
    ) -> Result<(SampleBuffer, Vec<MixSegment>), MixError> {
        let sr = self.settings.sample_rate;
        let target = ms_to_frames(target_ms, sr);
        let (gain_lo, gain_hi) = ordered(self.settings.gain_db);
        let (gain_lo, gain_hi) = (gain_lo.min(0.0), gain_hi.min(0.0));
        let mut base = SampleBuffer::silence_with_channels(target_ms, sr, 2);
        let mut segments = Vec::new();

        for layer in 0..layers {
            let mut track = SampleBuffer::silence_with_channels(target_ms, sr, 2);
            let mut cursor = 0;
            while cursor < target {
                if cancel.is_cancelled() {
                    return Err(MixError::Cancelled);
                }
                let (path, source) = self.pick_source(sources, rng)?;
                let (start, mut excerpt) =
                    random_excerpt(&source, self.settings.layered_excerpt_ms, rng);
                excerpt.truncate_frames(target - cursor);
                excerpt.fade_in(self.settings.edge_fade_ms);
                excerpt.fade_out(self.settings.edge_fade_ms);
                excerpt.gain_db(rng.gen_range(gain_lo..=gain_hi));
                let placed = excerpt.pan(rng.gen_range(-1.0f32..=1.0));

                track.overlay_at_frame(&placed, cursor)?;
                segments.push(MixSegment {
                    source_path: path,
                    start_offset_ms: frames_to_ms(start, source.sample_rate()),
                    length_ms: excerpt.duration_ms(),
                    layer_index: layer,
                });
                cursor += excerpt.frames();
            }
            base.overlay_at_frame(&track, 0)?;
            debug!("layer {} filled", layer + 1);
        }
        Ok((base, segments))
    }

    /// Picks random sources until one decodes to a non-empty buffer.
    fn pick_source<R: Rng>(
        &self,
        sources: &[String],
        rng: &mut R,
    ) -> Result<(String, SampleBuffer), MixError> {
        let mut failures = 0;
        loop {
            let path = &sources[rng.gen_range(0..sources.len())];
            let last_error = match self.codec.decode(Path::new(path)) {
                Ok(buffer) if !buffer.is_empty() => return Ok((path.clone(), buffer)),
                Ok(_) => "decoded to zero samples".to_string(),
                Err(e) => e.to_string(),
            };
            warn!("cannot use {} for mixing: {}", path, last_error);
            failures += 1;
            if failures >= self.settings.max_decode_failures.max(1) {
                return Err(MixError::DecodeRetriesExhausted {
                    attempts: failures,
                    last_error,
                });
            }
        }
    }
}

/// Random contiguous excerpt with a length drawn from `range_ms`; sources
/// shorter than the drawn length are used whole. Returns the start frame too.
fn random_excerpt<R: Rng>(
    source: &SampleBuffer,
    range_ms: (u64, u64),
    rng: &mut R,
) -> (usize, SampleBuffer) {
    let (lo, hi) = ordered(range_ms);
    let len = source.ms_to_frames(rng.gen_range(lo..=hi)).max(1);
    if source.frames() <= len {
        return (0, source.clone());
    }
    let start = rng.gen_range(0..=source.frames() - len);
    (start, source.slice_frames(start, start + len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn excerpts_stay_inside_the_source() {
        let source = SampleBuffer::mono((0..10_000).map(|i| i as f32).collect(), 1000);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let (start, ex) = random_excerpt(&source, (1_000, 3_000), &mut rng);
            assert!(ex.frames() >= 1_000 && ex.frames() <= 3_000);
            assert!(start + ex.frames() <= source.frames());
            assert_eq!(ex.samples()[0], start as f32);
        }
    }

    #[test]
    fn short_sources_are_used_whole() {
        let source = SampleBuffer::mono(vec![0.1; 500], 1000);
        let mut rng = StdRng::seed_from_u64(1);
        let (start, ex) = random_excerpt(&source, (1_000, 3_000), &mut rng);
        assert_eq!(start, 0);
        assert_eq!(ex, source);
    }

    #[test]
    fn inverted_ranges_are_reordered() {
        assert_eq!(ordered((5, 1)), (1, 5));
        assert_eq!(ordered((-3.0, -12.0)), (-12.0, -3.0));
    }
}
