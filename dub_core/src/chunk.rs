//! Source chunks and the persisted chunk-list format.
//!
//! On disk a chunk list is the transcription collaborator's output:
//!
//! ```json
//! { "text": "oi tudo bem", "chunks": [ { "timestamp": [0.0, 2.0], "text": "oi" } ] }
//! ```
//!
//! Only `chunks` is canonical. Any concatenated text (`text`, `concat_text`)
//! is derivable and ignored on input.

use std::{fmt, fs, path::Path};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AlignError, Result};

/// One source speech interval with its (translated) text.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Chunk {
    pub fn new(index: usize, start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            index,
            start,
            end,
            text: text.into(),
        }
    }

    /// Stable identifier derived from the text and interval, independent of
    /// the chunk's position in the list.
    pub fn key(&self) -> ChunkKey {
        ChunkKey::for_chunk(&self.text, self.start, self.end)
    }
}

/// Hex SHA-256 of a chunk's trimmed text and millisecond-rounded interval.
///
/// Used to address manual speed overrides so they survive a re-transcription
/// that shifts chunk positions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkKey(String);

impl ChunkKey {
    pub fn for_chunk(text: &str, start: f64, end: f64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(format!("{start:.3}|{end:.3}|{}", text.trim()).as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap an already computed key (e.g. read from configuration).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialized form of a chunk: `{ "timestamp": [start, end], "text": ... }`.
///
/// Whisper-style transcribers emit `null` for an end they could not place,
/// so the end is optional here and rejected when converting to [`Chunk`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub timestamp: (f64, Option<f64>),
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct TranscriptFile {
    #[serde(default, skip_deserializing)]
    text: String,
    chunks: Vec<ChunkRecord>,
}

/// Ordered, immutable chunk list consumed by the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    chunks: Vec<Chunk>,
}

impl Transcript {
    /// Build from `(start, end, text)` triples; indices follow list order.
    pub fn from_intervals<I, S>(intervals: I) -> Self
    where
        I: IntoIterator<Item = (f64, f64, S)>,
        S: Into<String>,
    {
        let chunks = intervals
            .into_iter()
            .enumerate()
            .map(|(index, (start, end, text))| Chunk::new(index, start, end, text))
            .collect();
        Self { chunks }
    }

    pub fn from_records(records: Vec<ChunkRecord>) -> Result<Self> {
        let mut chunks = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            let (start, end) = record.timestamp;
            let end = end.ok_or_else(|| AlignError::timing(index, "missing end timestamp"))?;
            if !start.is_finite() || !end.is_finite() {
                return Err(AlignError::timing(index, "non-finite timestamp"));
            }
            if start < 0.0 {
                return Err(AlignError::timing(index, format!("negative start {start}")));
            }
            chunks.push(Chunk::new(index, start, end, record.text));
        }
        Ok(Self { chunks })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: TranscriptFile = serde_json::from_str(json)?;
        Self::from_records(file.chunks)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn records(&self) -> Vec<ChunkRecord> {
        self.chunks
            .iter()
            .map(|c| ChunkRecord {
                timestamp: (c.start, Some(c.end)),
                text: c.text.clone(),
            })
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        let file = TranscriptFile {
            text: self.concat_text(),
            chunks: self.records(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Same intervals with new texts, e.g. after translation.
    ///
    /// The replacement must be 1:1 with the existing chunks.
    pub fn with_texts(&self, texts: Vec<String>) -> Result<Self> {
        if texts.len() != self.chunks.len() {
            return Err(AlignError::timing(
                texts.len().min(self.chunks.len()),
                format!(
                    "expected {} texts, got {}",
                    self.chunks.len(),
                    texts.len()
                ),
            ));
        }
        let chunks = self
            .chunks
            .iter()
            .zip(texts)
            .map(|(c, text)| Chunk::new(c.index, c.start, c.end, text))
            .collect();
        Ok(Self { chunks })
    }

    /// All chunk texts joined with single spaces.
    pub fn concat_text(&self) -> String {
        self.chunks
            .iter()
            .map(|c| c.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
