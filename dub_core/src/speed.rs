//! Speed selection: how much to accelerate a synthesized clip.
//!
//! Two candidate speeds bound the choice:
//! * `speed_max = tts / speech` fits the clip into the original speech span,
//! * `speed_min = tts / total` fits it into the whole slot, eating the gap.
//!
//! The lowest speed that respects `[min_speed, max_speed]` wins, since less
//! stretching sounds better.

use serde::Serialize;

use crate::config::AlignmentConfig;

/// Which rule produced the speed, kept for logs and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedRule {
    /// Speech span too tight; the whole slot fits at or above the floor.
    FitSlot,
    /// Speech span too tight; fitting the slot would fall below the floor.
    SlotBelowFloor,
    /// The clip fits the speech span within bounds.
    FitSpeech,
    /// The clip is short even at the floor speed; padding absorbs the rest.
    SpeechBelowFloor,
    /// Chunk listed in the manual override set.
    Override,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpeedDecision {
    pub speed: f64,
    pub rule: SpeedRule,
}

impl SpeedDecision {
    /// True when the clip only fits its slot above the configured ceiling.
    pub fn exceeds_max(&self, cfg: &AlignmentConfig) -> bool {
        self.speed > cfg.max_speed()
    }
}

/// Apply the speed table. Inputs are durations in seconds.
pub fn select_speed(
    tts_duration: f64,
    speech_duration: f64,
    total_duration: f64,
    cfg: &AlignmentConfig,
) -> SpeedDecision {
    let speed_max = tts_duration / speech_duration;
    let speed_min = tts_duration / total_duration;
    let (min_allowed, max_allowed) = (cfg.min_speed(), cfg.max_speed());

    let (speed, rule) = if speed_max >= max_allowed {
        if speed_min >= min_allowed {
            (speed_min, SpeedRule::FitSlot)
        } else {
            (min_allowed, SpeedRule::SlotBelowFloor)
        }
    } else if speed_max >= min_allowed {
        (speed_max, SpeedRule::FitSpeech)
    } else {
        (min_allowed, SpeedRule::SpeechBelowFloor)
    };

    SpeedDecision { speed, rule }
}

/// Manual correction: use `max_speed` regardless of durations.
pub fn override_speed(cfg: &AlignmentConfig) -> SpeedDecision {
    SpeedDecision {
        speed: cfg.max_speed(),
        rule: SpeedRule::Override,
    }
}
