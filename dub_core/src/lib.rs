//! Chunk alignment and speed-adjustment engine for video dubbing.
//!
//! Given the source chunk timeline and a synthesizer for the translated
//! text, [`assemble`] produces one continuous track whose chunk boundaries
//! line up with the original video.

pub mod assemble;
pub mod audio;
pub mod cache;
pub mod chunk;
pub mod config;
pub mod error;
pub mod render;
pub mod speed;
pub mod synth;
pub mod timeline;
pub mod wav;

pub use assemble::{assemble, Assembler, AudioTrack, SegmentReport};
pub use audio::AudioBuffer;
pub use cache::{CacheOutcome, ClipCache};
pub use chunk::{Chunk, ChunkKey, ChunkRecord, Transcript};
pub use config::{AlignmentConfig, SpeedOverrides};
pub use error::AlignError;
pub use render::{render, RenderedSegment};
pub use speed::{select_speed, SpeedDecision, SpeedRule};
pub use synth::{SynthesisConfig, Synthesizer, VoiceMap};
pub use timeline::{classify_boundary, window_for, windows, Boundary, TimelineWindow};
