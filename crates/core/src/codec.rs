//! Decode files into [`SampleBuffer`]s and encode mixes back to disk.

use crate::audio::SampleBuffer;
use crate::error::{DecodeError, EncodeError};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use std::str::FromStr;
use symphonia::core::audio::SampleBuffer as PcmBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    #[default]
    #[serde(rename = "wav")]
    Wav,
    #[serde(rename = "wav-f32")]
    WavFloat,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        "wav"
    }
}

impl FromStr for OutputFormat {
    type Err = EncodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "wav" | "wav16" => Ok(OutputFormat::Wav),
            "wav-f32" | "wavf32" => Ok(OutputFormat::WavFloat),
            other => Err(EncodeError::UnsupportedFormat(other.to_string())),
        }
    }
}

pub trait AudioCodec: Send + Sync {
    /// Decodes `path` into a mono buffer at the codec's working sample rate.
    fn decode(&self, path: &Path) -> Result<SampleBuffer, DecodeError>;

    fn encode(
        &self,
        buffer: &SampleBuffer,
        path: &Path,
        format: OutputFormat,
    ) -> Result<(), EncodeError>;
}

/// Symphonia decoding, rubato resampling, hound WAV writing.
#[derive(Debug, Clone)]
pub struct SymphoniaCodec {
    sample_rate: u32,
}

impl SymphoniaCodec {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl AudioCodec for SymphoniaCodec {
    fn decode(&self, path: &Path) -> Result<SampleBuffer, DecodeError> {
        let (samples, source_rate) = decode_mono(path)?;
        let samples = resample(samples, source_rate, self.sample_rate)?;
        Ok(SampleBuffer::mono(samples, self.sample_rate))
    }

    fn encode(
        &self,
        buffer: &SampleBuffer,
        path: &Path,
        format: OutputFormat,
    ) -> Result<(), EncodeError> {
        write_wav(buffer, path, format)
    }
}

fn map_symphonia(err: SymphoniaError) -> DecodeError {
    match err {
        SymphoniaError::IoError(e) => DecodeError::Io(e),
        SymphoniaError::Unsupported(what) => DecodeError::Unsupported(what.to_string()),
        other => DecodeError::Corrupt(other.to_string()),
    }
}

fn decode_mono(path: &Path) -> Result<(Vec<f32>, u32), DecodeError> {
    let src = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(map_symphonia)?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::Unsupported("no supported audio tracks".into()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(map_symphonia)?;

    let mut source_rate = params.sample_rate.unwrap_or(0);
    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            // Chained streams change the track list; keep what the first one yielded.
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => return Err(map_symphonia(err)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                source_rate = spec.rate;
                let channels = spec.channels.count().max(1);
                let mut pcm = PcmBuffer::<f32>::new(decoded.capacity() as u64, spec);
                pcm.copy_interleaved_ref(decoded);
                if channels == 1 {
                    samples.extend_from_slice(pcm.samples());
                } else {
                    for frame in pcm.samples().chunks(channels) {
                        samples.push(frame.iter().sum::<f32>() / channels as f32);
                    }
                }
            }
            // A damaged packet is skipped; the rest of the stream is still usable.
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::debug!("skipping bad packet in {:?}: {}", path, e);
            }
            Err(SymphoniaError::IoError(_)) => break,
            Err(err) => return Err(map_symphonia(err)),
        }
    }

    if source_rate == 0 {
        return Err(DecodeError::Corrupt("unknown sample rate".into()));
    }
    Ok((samples, source_rate))
}

fn resample(samples: Vec<f32>, from: u32, to: u32) -> Result<Vec<f32>, DecodeError> {
    if from == to || samples.is_empty() {
        return Ok(samples);
    }
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(
        to as f64 / from as f64,
        2.0,
        params,
        samples.len(),
        1,
    )
    .map_err(|e| DecodeError::Resample(e.to_string()))?;
    let waves_out = resampler
        .process(&[samples], None)
        .map_err(|e| DecodeError::Resample(e.to_string()))?;
    Ok(waves_out.into_iter().next().unwrap_or_default())
}

fn write_wav(buffer: &SampleBuffer, path: &Path, format: OutputFormat) -> Result<(), EncodeError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let (bits_per_sample, sample_format) = match format {
        OutputFormat::Wav => (16, hound::SampleFormat::Int),
        OutputFormat::WavFloat => (32, hound::SampleFormat::Float),
    };
    let spec = hound::WavSpec {
        channels: buffer.channels(),
        sample_rate: buffer.sample_rate(),
        bits_per_sample,
        sample_format,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    match format {
        OutputFormat::Wav => {
            for s in buffer.samples() {
                writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
            }
        }
        OutputFormat::WavFloat => {
            for s in buffer.samples() {
                writer.write_sample(*s)?;
            }
        }
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_keeps_length() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("out").join("tone.wav");
        let codec = SymphoniaCodec::new(8_000);
        let tone: Vec<f32> = (0..8_000)
            .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / 8_000.0).sin() * 0.5)
            .collect();
        let buffer = SampleBuffer::mono(tone, 8_000);
        codec.encode(&buffer, &path, OutputFormat::Wav).unwrap();

        let decoded = codec.decode(&path).unwrap();
        assert_eq!(decoded.sample_rate(), 8_000);
        assert_eq!(decoded.frames(), 8_000);
        assert!((decoded.peak() - 0.5).abs() < 0.01);
    }

    #[test]
    fn stereo_input_is_downmixed() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("stereo.wav");
        let codec = SymphoniaCodec::new(8_000);
        let stereo = SampleBuffer::mono(vec![0.5; 800], 8_000).pan(-1.0);
        codec.encode(&stereo, &path, OutputFormat::WavFloat).unwrap();

        let decoded = codec.decode(&path).unwrap();
        assert_eq!(decoded.channels(), 1);
        assert_eq!(decoded.frames(), 800);
        assert!((decoded.samples()[10] - 0.25).abs() < 1e-4);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("broken.mp3");
        std::fs::write(&path, b"definitely not audio").unwrap();
        assert!(SymphoniaCodec::new(8_000).decode(&path).is_err());
        assert!(matches!(
            SymphoniaCodec::new(8_000).decode(&temp.path().join("missing.wav")),
            Err(DecodeError::Io(_))
        ));
    }

    #[test]
    fn output_format_parsing() {
        assert_eq!("WAV".parse::<OutputFormat>().unwrap(), OutputFormat::Wav);
        assert_eq!("wav-f32".parse::<OutputFormat>().unwrap(), OutputFormat::WavFloat);
        assert!("mp3".parse::<OutputFormat>().is_err());
    }
}
