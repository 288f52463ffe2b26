//! Track assembler: drives timeline → speed → render per chunk and
//! concatenates the result into one track aligned with the source video.

use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audio::{frames_for, AudioBuffer};
use crate::cache::{CacheOutcome, ClipCache};
use crate::chunk::{Chunk, ChunkKey, Transcript};
use crate::config::AlignmentConfig;
use crate::error::{AlignError, Result};
use crate::render::render;
use crate::speed::{override_speed, select_speed, SpeedRule};
use crate::synth::Synthesizer;
use crate::timeline::window_for;
use crate::wav::{encode_wav_base64, write_wav_file, WavEncoding};

/// What happened to one chunk during assembly.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentReport {
    pub index: usize,
    pub key: ChunkKey,
    /// Position of the slot in the output track, in seconds.
    pub start_secs: f64,
    pub total_duration: f64,
    pub speech_duration: f64,
    pub tts_duration: f64,
    pub speed: f64,
    pub rule: Option<SpeedRule>,
    pub stretched: bool,
    pub padding_secs: f64,
    pub cache: Option<CacheOutcome>,
    pub wrapped: bool,
}

/// The assembled dubbed track.
#[derive(Debug, Clone)]
pub struct AudioTrack {
    pub audio: AudioBuffer,
    pub segments: Vec<SegmentReport>,
}

impl AudioTrack {
    pub fn duration_secs(&self) -> f64 {
        self.audio.duration_secs()
    }

    /// Write the track as a 16-bit PCM WAV file.
    pub fn export<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        write_wav_file(path.as_ref(), &self.audio, WavEncoding::Pcm16)?;
        info!(path = %path.as_ref().display(), duration_secs = self.duration_secs(), "Exported dubbed track");
        Ok(())
    }

    pub fn to_wav_base64(&self) -> Result<String> {
        encode_wav_base64(&self.audio)
    }
}

/// Aligns synthesized speech for a chunk list onto the source timeline.
pub struct Assembler<'a> {
    config: &'a AlignmentConfig,
    synthesizer: &'a dyn Synthesizer,
    cache: &'a ClipCache,
}

impl<'a> Assembler<'a> {
    pub fn new(config: &'a AlignmentConfig, synthesizer: &'a dyn Synthesizer, cache: &'a ClipCache) -> Self {
        Self {
            config,
            synthesizer,
            cache,
        }
    }

    /// Synthesized clip for `chunk`, from the cache when present, converted
    /// to the track format (mono, track sample rate).
    pub fn clip_for(&self, chunk: &Chunk) -> Result<(AudioBuffer, CacheOutcome)> {
        let index = chunk.index;
        let (clip, outcome) = self.cache.get_or_synthesize(index, || {
            let clip = self
                .synthesizer
                .synthesize(&chunk.text, index)
                .map_err(|source| AlignError::SynthesisFailure { index, source })?;
            if let Err(e) = clip.validate() {
                return Err(AlignError::SynthesisFailure {
                    index,
                    source: anyhow::anyhow!(e),
                });
            }
            if clip.is_empty() {
                return Err(AlignError::SynthesisFailure {
                    index,
                    source: anyhow::anyhow!("synthesizer returned empty audio"),
                });
            }
            Ok(clip)
        })?;
        let clip = clip.to_mono().resample(self.config.sample_rate())?;
        Ok((clip, outcome))
    }

    /// Synthesize all missing clips with up to `workers` threads.
    ///
    /// Only fills the cache; [`Assembler::assemble`] still concatenates in
    /// index order afterwards. On failure the error for the lowest failing
    /// index is returned and clips that did succeed stay cached.
    pub fn prefetch(&self, transcript: &Transcript, workers: usize) -> Result<usize> {
        let pending: Vec<&Chunk> = transcript
            .chunks()
            .iter()
            .filter(|c| !c.text.trim().is_empty() && !self.cache.contains(c.index))
            .collect();
        let next = AtomicUsize::new(0);
        let synthesized = AtomicUsize::new(0);
        let errors: Mutex<Vec<AlignError>> = Mutex::new(Vec::new());

        std::thread::scope(|s| {
            for _ in 0..workers.clamp(1, pending.len().max(1)) {
                s.spawn(|| loop {
                    let Some(chunk) = pending.get(next.fetch_add(1, Ordering::Relaxed)) else {
                        break;
                    };
                    match self.clip_for(chunk) {
                        Ok((_, CacheOutcome::Synthesized)) => {
                            synthesized.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok((_, CacheOutcome::Hit)) => {}
                        Err(e) => errors.lock().unwrap_or_else(|p| p.into_inner()).push(e),
                    }
                });
            }
        });

        let errors = errors.into_inner().unwrap_or_else(|p| p.into_inner());
        if let Some(first) = errors
            .into_iter()
            .min_by_key(|e| e.chunk_index().unwrap_or(usize::MAX))
        {
            return Err(first);
        }
        let synthesized = synthesized.into_inner();
        info!(synthesized, "Prefetched clips");
        Ok(synthesized)
    }

    /// Build the aligned track for `transcript`.
    pub fn assemble(&self, transcript: &Transcript) -> Result<AudioTrack> {
        let chunks = transcript.chunks();
        let sample_rate = self.config.sample_rate();
        info!(chunks = chunks.len(), sample_rate, "Assembling dubbed track");

        let mut audio = AudioBuffer::silence(0, sample_rate, 1);
        let mut segments = Vec::with_capacity(chunks.len());
        let mut start_secs = 0.0;

        for (i, chunk) in chunks.iter().enumerate() {
            let window = window_for(chunks, i, self.config.wrap_offset())?;
            // Slot boundaries are rounded on the cumulative timeline so that
            // per-chunk rounding never accumulates into drift.
            let end_secs = start_secs + window.total_duration;
            let slot_frames = frames_for(end_secs, sample_rate) - frames_for(start_secs, sample_rate);
            let slot_secs = slot_frames as f64 / f64::from(sample_rate);

            let report = if chunk.text.trim().is_empty() {
                debug!(index = i, total = window.total_duration, "Blank chunk, rendering silence");
                audio.append(&AudioBuffer::silence(slot_frames, sample_rate, 1))?;
                SegmentReport {
                    index: i,
                    key: chunk.key(),
                    start_secs,
                    total_duration: window.total_duration,
                    speech_duration: window.speech_duration,
                    tts_duration: 0.0,
                    speed: 1.0,
                    rule: None,
                    stretched: false,
                    padding_secs: slot_secs,
                    cache: None,
                    wrapped: window.wrapped,
                }
            } else {
                if window.total_duration <= 0.0 {
                    return Err(AlignError::timing(i, "zero-length slot cannot hold speech"));
                }

                let (clip, outcome) = self.clip_for(chunk)?;
                let tts_duration = clip.duration_secs();

                let decision = if self.config.overrides().contains(chunk) {
                    override_speed(self.config)
                } else {
                    select_speed(
                        tts_duration,
                        window.speech_duration,
                        window.total_duration,
                        self.config,
                    )
                };
                if decision.exceeds_max(self.config) {
                    warn!(
                        index = i,
                        speed = decision.speed,
                        max_speed = self.config.max_speed(),
                        "Clip only fits its slot above max speed"
                    );
                }

                let segment = render(
                    i,
                    clip,
                    decision.speed,
                    slot_secs,
                    self.config.overrun_tolerance(),
                )?;
                debug!(
                    index = i,
                    total = window.total_duration,
                    speech = window.speech_duration,
                    tts = tts_duration,
                    speed = decision.speed,
                    rule = ?decision.rule,
                    padding = segment.padding_secs,
                    "Rendered chunk"
                );
                audio.append(&segment.audio)?;

                SegmentReport {
                    index: i,
                    key: chunk.key(),
                    start_secs,
                    total_duration: window.total_duration,
                    speech_duration: window.speech_duration,
                    tts_duration,
                    speed: decision.speed,
                    rule: Some(decision.rule),
                    stretched: segment.stretched,
                    padding_secs: segment.padding_secs,
                    cache: Some(outcome),
                    wrapped: window.wrapped,
                }
            };

            segments.push(report);
            start_secs = end_secs;
        }

        info!(
            duration_secs = audio.duration_secs(),
            expected_secs = start_secs,
            "Dubbed track assembled"
        );
        Ok(AudioTrack { audio, segments })
    }

    /// Delete the cached clips of `transcript` (best effort).
    pub fn cleanup(&self, transcript: &Transcript) -> usize {
        self.cache.cleanup(transcript.chunks().iter().map(|c| c.index))
    }
}

/// Convenience wrapper: assemble `transcript` with `synthesizer` and `cache`.
pub fn assemble(
    transcript: &Transcript,
    synthesizer: &dyn Synthesizer,
    cache: &ClipCache,
    config: &AlignmentConfig,
) -> Result<AudioTrack> {
    Assembler::new(config, synthesizer, cache).assemble(transcript)
}
