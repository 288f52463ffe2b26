//! Alignment engine error types.

/// Errors raised while aligning synthesized speech to the source timeline.
///
/// Every per-chunk variant carries the chunk index so a failed run can be
/// corrected and resumed for that chunk alone.
#[derive(Debug, thiserror::Error)]
pub enum AlignError {
    /// Source timestamps do not describe a sequential timeline.
    #[error("Timing inconsistency at chunk {index}: {reason}")]
    TimingInconsistency { index: usize, reason: String },

    /// A rendered segment is longer than its slot on the timeline.
    #[error("Rendered chunk {index} overruns its slot by {overrun_secs:.3}s at speed {speed:.3}")]
    Overrun {
        index: usize,
        speed: f64,
        overrun_secs: f64,
    },

    /// The synthesis collaborator failed or returned unusable audio.
    #[error("Speech synthesis failed for chunk {index}: {source}")]
    SynthesisFailure {
        index: usize,
        #[source]
        source: anyhow::Error,
    },

    /// Invalid engine configuration, detected before any processing.
    #[error("Invalid alignment configuration: {0}")]
    Configuration(String),

    /// Audio buffer cannot be processed (zero sample rate, bad channel count).
    #[error("Invalid audio: {0}")]
    InvalidAudio(String),

    /// Audio resampling error.
    #[error("Audio resampling failed: {0}")]
    Resample(String),

    /// WAV encode/decode error.
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Chunk list (de)serialization error.
    #[error("Chunk list format error: {0}")]
    Format(#[from] serde_json::Error),

    /// IO error (clip cache, exported track).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AlignError {
    /// Chunk index the error refers to, if it is tied to one.
    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            Self::TimingInconsistency { index, .. }
            | Self::Overrun { index, .. }
            | Self::SynthesisFailure { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub(crate) fn timing(index: usize, reason: impl Into<String>) -> Self {
        Self::TimingInconsistency {
            index,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = AlignError> = std::result::Result<T, E>;
