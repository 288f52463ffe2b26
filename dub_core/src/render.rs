//! Segment renderer: speed-adjust a clip and pad it to its timeline slot.

use crate::audio::AudioBuffer;
use crate::error::{AlignError, Result};

/// A clip rendered to exactly fill one chunk's slot.
#[derive(Debug, Clone)]
pub struct RenderedSegment {
    pub index: usize,
    pub audio: AudioBuffer,
    /// Speed that was requested for the clip.
    pub speed: f64,
    /// Whether the clip was actually time-stretched.
    pub stretched: bool,
    /// Trailing silence appended, in seconds.
    pub padding_secs: f64,
}

impl RenderedSegment {
    pub fn duration_secs(&self) -> f64 {
        self.audio.duration_secs()
    }
}

/// Render `clip` for chunk `index` at `speed` into a `total_duration` slot.
///
/// Speeds above 1 stretch the clip; at or below 1 it is kept as is, since
/// slowing speech down sounds worse than leaving extra silence. The result
/// is padded with silence to the slot length. A result longer than the slot
/// by more than `tolerance` seconds is an [`AlignError::Overrun`]; a smaller
/// excess is trimmed.
pub fn render(
    index: usize,
    clip: AudioBuffer,
    speed: f64,
    total_duration: f64,
    tolerance: f64,
) -> Result<RenderedSegment> {
    let stretched = speed > 1.0;
    let mut audio = if stretched {
        clip.time_stretch(speed)?
    } else {
        clip
    };

    let target = audio.frames_for(total_duration);
    let actual = audio.frames();
    let sample_rate = f64::from(audio.sample_rate);

    if actual > target {
        let overrun_secs = (actual - target) as f64 / sample_rate;
        if overrun_secs > tolerance {
            return Err(AlignError::Overrun {
                index,
                speed,
                overrun_secs,
            });
        }
    }

    let padding_secs = target.saturating_sub(actual) as f64 / sample_rate;
    audio.fit_to_frames(target);

    Ok(RenderedSegment {
        index,
        audio,
        speed,
        stretched,
        padding_secs,
    })
}
