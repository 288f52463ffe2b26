//! In-memory PCM audio and the sample-level operations the engine needs.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::{AlignError, Result};

const RESAMPLE_CHUNK: usize = 1024;

/// Interleaved f32 PCM samples in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self> {
        let buffer = Self {
            samples,
            sample_rate,
            channels,
        };
        buffer.validate()?;
        Ok(buffer)
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        Self::new(samples, sample_rate, 1)
    }

    /// `frames` of digital silence.
    pub fn silence(frames: usize, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: vec![0.0; frames * usize::from(channels)],
            sample_rate,
            channels,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(AlignError::InvalidAudio("sample rate is zero".into()));
        }
        if self.channels == 0 {
            return Err(AlignError::InvalidAudio("channel count is zero".into()));
        }
        if self.samples.len() % usize::from(self.channels) != 0 {
            return Err(AlignError::InvalidAudio(format!(
                "{} samples do not divide into {} channels",
                self.samples.len(),
                self.channels
            )));
        }
        Ok(())
    }

    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of frames covering `secs` at this buffer's rate.
    pub fn frames_for(&self, secs: f64) -> usize {
        frames_for(secs, self.sample_rate)
    }

    /// Average all channels into one.
    pub fn to_mono(self) -> Self {
        if self.channels <= 1 {
            return self;
        }
        let channels = usize::from(self.channels);
        let samples = self
            .samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();
        Self {
            samples,
            sample_rate: self.sample_rate,
            channels: 1,
        }
    }

    /// Convert to `sample_rate`, keeping the duration. Mono only.
    pub fn resample(self, sample_rate: u32) -> Result<Self> {
        if sample_rate == self.sample_rate {
            return Ok(self);
        }
        let buffer = self.require_mono()?;
        let ratio = f64::from(sample_rate) / f64::from(buffer.sample_rate);
        let samples = resample_mono(&buffer.samples, ratio)?;
        Ok(Self {
            samples,
            sample_rate,
            channels: 1,
        })
    }

    /// Play the buffer `speed` times faster at the same sample rate.
    ///
    /// A plain playback-rate change: duration shrinks by `speed` and pitch
    /// rises with it. Mono only.
    pub fn time_stretch(self, speed: f64) -> Result<Self> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(AlignError::InvalidAudio(format!("invalid speed {speed}")));
        }
        let buffer = self.require_mono()?;
        let samples = resample_mono(&buffer.samples, 1.0 / speed)?;
        Ok(Self {
            samples,
            sample_rate: buffer.sample_rate,
            channels: 1,
        })
    }

    /// Append another buffer with the same format.
    pub fn append(&mut self, other: &Self) -> Result<()> {
        if other.sample_rate != self.sample_rate || other.channels != self.channels {
            return Err(AlignError::InvalidAudio(format!(
                "cannot append {} Hz/{} ch audio to {} Hz/{} ch",
                other.sample_rate, other.channels, self.sample_rate, self.channels
            )));
        }
        self.samples.extend_from_slice(&other.samples);
        Ok(())
    }

    /// Pad with silence or cut to exactly `frames` frames.
    pub fn fit_to_frames(&mut self, frames: usize) {
        self.samples
            .resize(frames * usize::from(self.channels), 0.0);
    }

    fn require_mono(self) -> Result<Self> {
        if self.channels != 1 {
            return Err(AlignError::InvalidAudio(format!(
                "expected mono audio, got {} channels",
                self.channels
            )));
        }
        Ok(self)
    }
}

/// Frames covering `secs` at `sample_rate`, rounded to the nearest frame.
pub fn frames_for(secs: f64, sample_rate: u32) -> usize {
    (secs.max(0.0) * f64::from(sample_rate)).round() as usize
}

/// Sinc-resample mono samples by `ratio` (output/input length).
///
/// The result is compensated for the resampler delay and has exactly
/// `round(len * ratio)` samples.
fn resample_mono(samples: &[f32], ratio: f64) -> Result<Vec<f32>> {
    let expected = (samples.len() as f64 * ratio).round() as usize;
    if samples.is_empty() || expected == 0 {
        return Ok(Vec::new());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK, 1)
        .map_err(|e| AlignError::Resample(format!("init: {e}")))?;
    let delay = resampler.output_delay();

    let mut output = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);
    let mut pos = 0;
    while output.len() < expected + delay {
        // Past the end the input is zero padding that flushes the filter.
        let mut block = if pos < samples.len() {
            samples[pos..(pos + RESAMPLE_CHUNK).min(samples.len())].to_vec()
        } else {
            Vec::new()
        };
        block.resize(RESAMPLE_CHUNK, 0.0);
        pos += RESAMPLE_CHUNK;

        let resampled = resampler
            .process(&[block], None)
            .map_err(|e| AlignError::Resample(format!("process: {e}")))?;
        match resampled.first() {
            Some(channel) if !channel.is_empty() => output.extend_from_slice(channel),
            _ => return Err(AlignError::Resample("resampler produced no output".into())),
        }
    }

    output.drain(..delay);
    output.truncate(expected);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(frames: usize, sample_rate: u32) -> Vec<f32> {
        (0..frames)
            .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / sample_rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_invalid_buffers_are_rejected() {
        assert!(AudioBuffer::new(vec![0.0; 3], 16_000, 2).is_err());
        assert!(AudioBuffer::new(vec![0.0; 4], 0, 1).is_err());
        assert!(AudioBuffer::new(vec![0.0; 4], 16_000, 0).is_err());
    }

    #[test]
    fn test_duration_counts_frames() {
        let stereo = AudioBuffer::new(vec![0.0; 32_000], 16_000, 2).unwrap();
        assert_eq!(stereo.frames(), 16_000);
        assert_eq!(stereo.duration_secs(), 1.0);
    }

    #[test]
    fn test_to_mono_averages_channels() {
        let stereo = AudioBuffer::new(vec![1.0, 0.0, 0.5, 0.5], 8_000, 2).unwrap();
        let mono = stereo.to_mono();
        assert_eq!(mono.channels, 1);
        assert_eq!(mono.samples, vec![0.5, 0.5]);
    }

    #[test]
    fn test_time_stretch_shortens_by_speed() {
        let buffer = AudioBuffer::mono(tone(24_000, 24_000), 24_000).unwrap();
        let fast = buffer.time_stretch(1.25).unwrap();
        assert_eq!(fast.frames(), 19_200);
        assert_eq!(fast.sample_rate, 24_000);
        assert!(fast.samples.iter().any(|s| s.abs() > 0.1));
    }

    #[test]
    fn test_resample_keeps_duration() {
        let buffer = AudioBuffer::mono(tone(22_050, 22_050), 22_050).unwrap();
        let out = buffer.resample(16_000).unwrap();
        assert_eq!(out.frames(), 16_000);
        assert_eq!(out.sample_rate, 16_000);
    }

    #[test]
    fn test_stretch_rejects_stereo_and_bad_speed() {
        let stereo = AudioBuffer::new(vec![0.0; 8], 8_000, 2).unwrap();
        assert!(stereo.time_stretch(1.2).is_err());
        let mono = AudioBuffer::mono(vec![0.0; 8], 8_000).unwrap();
        assert!(mono.clone().time_stretch(0.0).is_err());
        assert!(mono.time_stretch(f64::NAN).is_err());
    }

    #[test]
    fn test_append_requires_same_format() {
        let mut a = AudioBuffer::mono(vec![0.1; 4], 8_000).unwrap();
        let b = AudioBuffer::mono(vec![0.2; 4], 16_000).unwrap();
        assert!(a.append(&b).is_err());
        a.append(&AudioBuffer::silence(2, 8_000, 1)).unwrap();
        assert_eq!(a.frames(), 6);
    }

    #[test]
    fn test_fit_to_frames_pads_and_cuts() {
        let mut a = AudioBuffer::mono(vec![0.3; 4], 8_000).unwrap();
        a.fit_to_frames(6);
        assert_eq!(a.samples, vec![0.3, 0.3, 0.3, 0.3, 0.0, 0.0]);
        a.fit_to_frames(3);
        assert_eq!(a.frames(), 3);
    }
}
