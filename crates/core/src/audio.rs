//! In-memory PCM buffers and the edit primitives the mixer is built from.
//!
//! Samples are `f32`, interleaved when there is more than one channel. All
//! time arguments are milliseconds, converted to frames with
//! `round(ms * sample_rate / 1000)`. Nothing here clips: sums produced by
//! [`SampleBuffer::overlay`] may leave `[-1, 1]`.

use crate::error::AudioError;

pub fn ms_to_frames(ms: u64, sample_rate: u32) -> usize {
    (ms as f64 * sample_rate as f64 / 1000.0).round() as usize
}

pub fn frames_to_ms(frames: usize, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    (frames as f64 * 1000.0 / sample_rate as f64).round() as u64
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl SampleBuffer {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    /// Builds a buffer from interleaved samples. A trailing partial frame is dropped.
    pub fn interleaved(mut samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() / channels as usize * channels as usize;
        samples.truncate(whole);
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    pub fn silence(duration_ms: u64, sample_rate: u32) -> Self {
        Self::silence_with_channels(duration_ms, sample_rate, 1)
    }

    pub fn silence_with_channels(duration_ms: u64, sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1);
        let frames = ms_to_frames(duration_ms, sample_rate);
        Self {
            samples: vec![0.0; frames * channels as usize],
            sample_rate,
            channels,
        }
    }

    /// Zero-length buffer with the same format as `self`.
    pub fn empty_like(&self) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Length in frames (one sample per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_ms(&self) -> u64 {
        frames_to_ms(self.frames(), self.sample_rate)
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn ms_to_frames(&self, ms: u64) -> usize {
        ms_to_frames(ms, self.sample_rate)
    }

    /// Copy of `[start_ms, end_ms)`, clamped to the buffer.
    pub fn slice(&self, start_ms: u64, end_ms: u64) -> Self {
        self.slice_frames(self.ms_to_frames(start_ms), self.ms_to_frames(end_ms))
    }

    pub fn slice_frames(&self, start: usize, end: usize) -> Self {
        let len = self.frames();
        let start = start.min(len);
        let end = end.min(len);
        if start >= end {
            return self.empty_like();
        }
        let ch = self.channels as usize;
        Self {
            samples: self.samples[start * ch..end * ch].to_vec(),
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    pub fn truncate_frames(&mut self, frames: usize) {
        self.samples.truncate(frames * self.channels as usize);
    }

    /// Linear ramp from silence over the first `ms`; shorter buffers are ramped entirely.
    pub fn fade_in(&mut self, ms: u64) {
        let n = self.ms_to_frames(ms).min(self.frames());
        let ch = self.channels as usize;
        for k in 0..n {
            let factor = k as f32 / n as f32;
            for s in &mut self.samples[k * ch..(k + 1) * ch] {
                *s *= factor;
            }
        }
    }

    /// Linear ramp to silence over the last `ms`.
    pub fn fade_out(&mut self, ms: u64) {
        let len = self.frames();
        let n = self.ms_to_frames(ms).min(len);
        let ch = self.channels as usize;
        let first = len - n;
        for k in 0..n {
            let factor = (n - 1 - k) as f32 / n as f32;
            let frame = first + k;
            for s in &mut self.samples[frame * ch..(frame + 1) * ch] {
                *s *= factor;
            }
        }
    }

    pub fn gain_db(&mut self, delta: f32) {
        let factor = 10f32.powf(delta / 20.0);
        for s in &mut self.samples {
            *s *= factor;
        }
    }

    /// Places the signal in a stereo field. `balance` runs from -1 (left) to 1 (right).
    ///
    /// Mono input is split with `(1 - balance) / 2` on the left and
    /// `(1 + balance) / 2` on the right. Stereo input keeps its image and has
    /// the far channel attenuated.
    pub fn pan(&self, balance: f32) -> Self {
        let b = balance.clamp(-1.0, 1.0);
        let samples = match self.channels {
            1 => {
                let (l, r) = ((1.0 - b) / 2.0, (1.0 + b) / 2.0);
                self.samples.iter().flat_map(|s| [s * l, s * r]).collect()
            }
            _ => {
                let (l, r) = ((1.0 - b).min(1.0), (1.0 + b).min(1.0));
                let ch = self.channels as usize;
                self.samples
                    .chunks_exact(ch)
                    .flat_map(|frame| [frame[0] * l, frame[1] * r])
                    .collect()
            }
        };
        Self {
            samples,
            sample_rate: self.sample_rate,
            channels: 2,
        }
    }

    /// Concatenates `other`, blending the overlapping edge linearly.
    ///
    /// The overlap is `min(crossfade_ms, len(self), len(other))`, so the result
    /// is `len(self) + len(other) - overlap` frames long.
    pub fn append_with_crossfade(
        &self,
        other: &SampleBuffer,
        crossfade_ms: u64,
    ) -> Result<SampleBuffer, AudioError> {
        self.check_format(other)?;
        let ch = self.channels as usize;
        let (la, lb) = (self.frames(), other.frames());
        let x = self.ms_to_frames(crossfade_ms).min(la).min(lb);

        let mut samples = Vec::with_capacity((la + lb - x) * ch);
        samples.extend_from_slice(&self.samples[..(la - x) * ch]);
        for i in 0..x {
            let t = if x > 1 { i as f32 / (x - 1) as f32 } else { 0.5 };
            for c in 0..ch {
                let a = self.samples[(la - x + i) * ch + c];
                let b = other.samples[i * ch + c];
                samples.push(a * (1.0 - t) + b * t);
            }
        }
        samples.extend_from_slice(&other.samples[x * ch..]);
        Ok(SampleBuffer {
            samples,
            sample_rate: self.sample_rate,
            channels: self.channels,
        })
    }

    /// Adds `other` into `self` starting at `position_ms`. Anything past the
    /// end of `self` is dropped; callers pre-allocate silence.
    pub fn overlay(&mut self, other: &SampleBuffer, position_ms: u64) -> Result<(), AudioError> {
        let frame = self.ms_to_frames(position_ms);
        self.overlay_at_frame(other, frame)
    }

    /// Frame-addressed [`overlay`](Self::overlay). Mono sources are spread to every channel.
    pub fn overlay_at_frame(&mut self, other: &SampleBuffer, frame: usize) -> Result<(), AudioError> {
        if self.sample_rate != other.sample_rate {
            return Err(AudioError::SampleRateMismatch(
                self.sample_rate,
                other.sample_rate,
            ));
        }
        if other.channels != self.channels && other.channels != 1 {
            return Err(AudioError::ChannelMismatch {
                expected: self.channels,
                found: other.channels,
            });
        }
        let ch = self.channels as usize;
        let len = self.frames();
        if frame >= len {
            return Ok(());
        }
        let n = other.frames().min(len - frame);
        for i in 0..n {
            for c in 0..ch {
                let src = if other.channels == 1 {
                    other.samples[i]
                } else {
                    other.samples[i * ch + c]
                };
                self.samples[(frame + i) * ch + c] += src;
            }
        }
        Ok(())
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    fn check_format(&self, other: &SampleBuffer) -> Result<(), AudioError> {
        if self.sample_rate != other.sample_rate {
            return Err(AudioError::SampleRateMismatch(
                self.sample_rate,
                other.sample_rate,
            ));
        }
        if self.channels != other.channels {
            return Err(AudioError::ChannelMismatch {
                expected: self.channels,
                found: other.channels,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize, sample_rate: u32) -> SampleBuffer {
        SampleBuffer::mono(
            (0..frames).map(|i| (i % 100) as f32 / 100.0).collect(),
            sample_rate,
        )
    }

    #[test]
    fn full_slice_is_identity() {
        let buf = ramp(4410, 44_100);
        assert_eq!(buf.slice(0, buf.duration_ms()), buf);
    }

    #[test]
    fn slice_clamps_and_handles_inverted_ranges() {
        let buf = ramp(1000, 1000);
        assert_eq!(buf.slice(900, 5000).frames(), 100);
        assert!(buf.slice(500, 500).is_empty());
        assert!(buf.slice(700, 200).is_empty());
        assert!(buf.slice(2000, 3000).is_empty());
    }

    #[test]
    fn ms_conversion_rounds() {
        assert_eq!(ms_to_frames(1, 44_100), 44);
        assert_eq!(ms_to_frames(3, 44_100), 132);
        assert_eq!(ms_to_frames(1000, 48_000), 48_000);
        assert_eq!(frames_to_ms(22_050, 44_100), 500);
    }

    #[test]
    fn crossfade_length_law() {
        let a = ramp(1000, 1000);
        let b = ramp(300, 1000);
        assert_eq!(a.append_with_crossfade(&b, 100).unwrap().frames(), 1200);
        // Clamped to the shorter buffer.
        assert_eq!(a.append_with_crossfade(&b, 5000).unwrap().frames(), 1000);
        assert_eq!(a.append_with_crossfade(&b, 0).unwrap().frames(), 1300);
        let empty = a.empty_like();
        assert_eq!(empty.append_with_crossfade(&b, 100).unwrap(), b);
    }

    #[test]
    fn crossfade_blends_edges() {
        let a = SampleBuffer::mono(vec![1.0; 10], 1000);
        let b = SampleBuffer::mono(vec![0.0; 10], 1000);
        let out = a.append_with_crossfade(&b, 5).unwrap();
        assert_eq!(out.frames(), 15);
        assert_eq!(out.samples()[4], 1.0);
        assert_eq!(out.samples()[5], 1.0);
        assert_eq!(out.samples()[9], 0.0);
        assert!(out.samples()[7] > 0.0 && out.samples()[7] < 1.0);
    }

    #[test]
    fn crossfade_rejects_mixed_formats() {
        let a = SampleBuffer::silence(10, 1000);
        let b = SampleBuffer::silence(10, 2000);
        assert_eq!(
            a.append_with_crossfade(&b, 5),
            Err(AudioError::SampleRateMismatch(1000, 2000))
        );
    }

    #[test]
    fn fades_ramp_edges_only() {
        let mut buf = SampleBuffer::mono(vec![1.0; 100], 1000);
        buf.fade_in(10);
        buf.fade_out(10);
        assert_eq!(buf.samples()[0], 0.0);
        assert_eq!(buf.samples()[5], 0.5);
        assert_eq!(buf.samples()[50], 1.0);
        assert_eq!(buf.samples()[99], 0.0);
    }

    #[test]
    fn fade_longer_than_buffer_is_truncated() {
        let mut buf = SampleBuffer::mono(vec![1.0; 4], 1000);
        buf.fade_in(1000);
        assert_eq!(buf.samples(), &[0.0, 0.25, 0.5, 0.75]);
    }

    #[test]
    fn gain_in_decibels() {
        let mut buf = SampleBuffer::mono(vec![1.0, -0.5], 1000);
        buf.gain_db(-20.0);
        assert!((buf.samples()[0] - 0.1).abs() < 1e-6);
        assert!((buf.samples()[1] + 0.05).abs() < 1e-6);
    }

    #[test]
    fn pan_splits_mono_into_stereo() {
        let buf = SampleBuffer::mono(vec![1.0, 1.0], 1000);
        let hard_left = buf.pan(-1.0);
        assert_eq!(hard_left.channels(), 2);
        assert_eq!(hard_left.frames(), 2);
        assert_eq!(hard_left.samples(), &[1.0, 0.0, 1.0, 0.0]);
        let centre = buf.pan(0.0);
        assert_eq!(&centre.samples()[..2], &[0.5, 0.5]);
        // Out-of-range balance is clamped.
        assert_eq!(buf.pan(7.0).samples()[1], 1.0);
    }

    #[test]
    fn overlay_adds_without_extending() {
        let mut base = SampleBuffer::silence(10, 1000);
        let other = SampleBuffer::mono(vec![0.75; 8], 1000);
        base.overlay(&other, 5).unwrap();
        base.overlay(&other, 8).unwrap();
        assert_eq!(base.frames(), 10);
        assert_eq!(base.samples()[4], 0.0);
        assert_eq!(base.samples()[6], 0.75);
        // No clipping at the buffer layer.
        assert_eq!(base.samples()[9], 1.5);
    }

    #[test]
    fn overlay_spreads_mono_into_stereo() {
        let mut base = SampleBuffer::silence_with_channels(4, 1000, 2);
        let other = SampleBuffer::mono(vec![0.5; 2], 1000);
        base.overlay_at_frame(&other, 1).unwrap();
        assert_eq!(base.samples(), &[0.0, 0.0, 0.5, 0.5, 0.5, 0.5, 0.0, 0.0]);
        let mut mono = SampleBuffer::silence(4, 1000);
        assert!(mono.overlay(&base, 0).is_err());
    }

    #[test]
    fn silence_has_expected_shape() {
        let s = SampleBuffer::silence_with_channels(250, 44_100, 2);
        assert_eq!(s.frames(), 11_025);
        assert_eq!(s.samples().len(), 22_050);
        assert_eq!(s.peak(), 0.0);
        assert_eq!(s.duration_ms(), 250);
    }
}
