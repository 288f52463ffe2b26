//! Timeline model: per-chunk slot durations derived from source timestamps.
//!
//! A chunk's slot runs from its own start to the start of the next chunk, so
//! it covers the speech plus the trailing silence. The last chunk has no
//! trailing gap.
//!
//! Upstream timestamps come from a transcriber that reports them relative to
//! a rolling window which restarts every `wrap_offset` seconds. A next chunk
//! that appears to start before the current one ends is re-anchored by adding
//! `wrap_offset`, see [`classify_boundary`].

use serde::Serialize;

use crate::chunk::Chunk;
use crate::error::{AlignError, Result};

/// Absolute tolerance for the `total == gap + speech` identity.
const TIMING_EPSILON: f64 = 1e-9;

/// How the boundary between a chunk and its successor was interpreted.
#[derive(Debug, Clone, PartialEq)]
pub enum Boundary {
    /// The next chunk starts at or after the current end.
    Sequential,
    /// The timestamp window restarted; the next interval re-anchored.
    WrappedRestart { next_start: f64, next_end: f64 },
    /// Out-of-order timestamps that a restart cannot explain.
    Malformed { reason: String },
}

/// Decide how `next` relates to `current` on the timeline.
pub fn classify_boundary(current: &Chunk, next: &Chunk, wrap_offset: f64) -> Boundary {
    if current.end < current.start {
        return Boundary::Malformed {
            reason: format!("end {} is before start {}", current.end, current.start),
        };
    }
    if next.start >= current.end {
        return Boundary::Sequential;
    }

    let next_start = next.start + wrap_offset;
    if wrap_offset > 0.0 && next_start >= current.end {
        Boundary::WrappedRestart {
            next_start,
            next_end: next.end + wrap_offset,
        }
    } else {
        Boundary::Malformed {
            reason: format!(
                "next chunk starts at {} before current end {} (wrap offset {wrap_offset})",
                next.start, current.end
            ),
        }
    }
}

/// Slot of one chunk on the source timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimelineWindow {
    pub index: usize,
    /// Speech plus trailing silence up to the next chunk.
    pub total_duration: f64,
    /// Speech only.
    pub speech_duration: f64,
    /// Whether the successor's timestamps were re-anchored.
    pub wrapped: bool,
}

impl TimelineWindow {
    pub fn gap(&self) -> f64 {
        self.total_duration - self.speech_duration
    }
}

/// Compute `(total_duration, speech_duration)` for chunk `i`.
pub fn window_for(chunks: &[Chunk], i: usize, wrap_offset: f64) -> Result<TimelineWindow> {
    let current = chunks.get(i).ok_or_else(|| {
        AlignError::timing(i, format!("chunk index out of range ({} chunks)", chunks.len()))
    })?;

    let speech_duration = current.end - current.start;
    if speech_duration < 0.0 {
        return Err(AlignError::timing(
            i,
            format!("end {} is before start {}", current.end, current.start),
        ));
    }

    let Some(next) = chunks.get(i + 1) else {
        return Ok(TimelineWindow {
            index: i,
            total_duration: speech_duration,
            speech_duration,
            wrapped: false,
        });
    };

    let (next_start, wrapped) = match classify_boundary(current, next, wrap_offset) {
        Boundary::Sequential => (next.start, false),
        Boundary::WrappedRestart { next_start, .. } => (next_start, true),
        Boundary::Malformed { reason } => return Err(AlignError::timing(i, reason)),
    };

    let total_duration = next_start - current.start;
    let gap = next_start - current.end;
    if (total_duration - (gap + speech_duration)).abs() > TIMING_EPSILON || gap < 0.0 {
        return Err(AlignError::timing(
            i,
            format!(
                "total {total_duration} != gap {gap} + speech {speech_duration}"
            ),
        ));
    }

    Ok(TimelineWindow {
        index: i,
        total_duration,
        speech_duration,
        wrapped,
    })
}

/// Windows for every chunk, in order.
pub fn windows(chunks: &[Chunk], wrap_offset: f64) -> Result<Vec<TimelineWindow>> {
    (0..chunks.len())
        .map(|i| window_for(chunks, i, wrap_offset))
        .collect()
}

/// Length of the dubbed track: the sum of all slot durations.
pub fn total_span(windows: &[TimelineWindow]) -> f64 {
    windows.iter().map(|w| w.total_duration).sum()
}
