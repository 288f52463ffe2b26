// Alignment engine configuration

use std::collections::BTreeSet;

use crate::chunk::{Chunk, ChunkKey};
use crate::error::{AlignError, Result};

pub const DEFAULT_MIN_SPEED: f64 = 1.0;
pub const DEFAULT_MAX_SPEED: f64 = 1.25;
/// Length of the transcriber's rolling timestamp window, in seconds.
pub const DEFAULT_WRAP_OFFSET: f64 = 29.0;
/// Allowed overrun of a rendered segment before it counts as a defect.
pub const DEFAULT_OVERRUN_TOLERANCE: f64 = 0.010;
pub const DEFAULT_TRACK_SAMPLE_RATE: u32 = 24_000;

/// Chunks forced to `max_speed` instead of the automatic speed table.
///
/// Indices reproduce the positional overrides of a single run; keys address
/// chunks by content and interval so they survive re-transcription.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeedOverrides {
    pub indices: BTreeSet<usize>,
    pub keys: BTreeSet<ChunkKey>,
}

impl SpeedOverrides {
    pub fn contains(&self, chunk: &Chunk) -> bool {
        self.indices.contains(&chunk.index) || (!self.keys.is_empty() && self.keys.contains(&chunk.key()))
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty() && self.keys.is_empty()
    }
}

/// Immutable engine settings, validated on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentConfig {
    min_speed: f64,
    max_speed: f64,
    wrap_offset: f64,
    overrun_tolerance: f64,
    sample_rate: u32,
    overrides: SpeedOverrides,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            min_speed: DEFAULT_MIN_SPEED,
            max_speed: DEFAULT_MAX_SPEED,
            wrap_offset: DEFAULT_WRAP_OFFSET,
            overrun_tolerance: DEFAULT_OVERRUN_TOLERANCE,
            sample_rate: DEFAULT_TRACK_SAMPLE_RATE,
            overrides: SpeedOverrides::default(),
        }
    }
}

impl AlignmentConfig {
    pub fn new(min_speed: f64, max_speed: f64, wrap_offset: f64) -> Result<Self> {
        Self {
            min_speed,
            max_speed,
            wrap_offset,
            ..Self::default()
        }
        .validated()
    }

    pub fn with_overrides(mut self, overrides: SpeedOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_override_indices<I: IntoIterator<Item = usize>>(mut self, indices: I) -> Self {
        self.overrides.indices.extend(indices);
        self
    }

    pub fn with_override_keys<I: IntoIterator<Item = ChunkKey>>(mut self, keys: I) -> Self {
        self.overrides.keys.extend(keys);
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Result<Self> {
        self.sample_rate = sample_rate;
        self.validated()
    }

    pub fn with_overrun_tolerance(mut self, tolerance: f64) -> Result<Self> {
        self.overrun_tolerance = tolerance;
        self.validated()
    }

    /// Read overrides from the environment on top of validated bounds.
    ///
    /// `MIN_SPEED`, `MAX_SPEED`, `WRAP_OFFSET_SECS`, `TRACK_SAMPLE_RATE`,
    /// `SPEED_OVERRIDE_INDICES` and `SPEED_OVERRIDE_KEYS` (comma separated).
    /// Unset variables keep their defaults; malformed ones are errors.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`AlignmentConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let min_speed = parse_var(&lookup, "MIN_SPEED", DEFAULT_MIN_SPEED)?;
        let max_speed = parse_var(&lookup, "MAX_SPEED", DEFAULT_MAX_SPEED)?;
        let wrap_offset = parse_var(&lookup, "WRAP_OFFSET_SECS", DEFAULT_WRAP_OFFSET)?;
        let sample_rate = parse_var(&lookup, "TRACK_SAMPLE_RATE", DEFAULT_TRACK_SAMPLE_RATE)?;

        let indices = match lookup("SPEED_OVERRIDE_INDICES") {
            Some(raw) => parse_index_list(&raw)
                .map_err(|e| AlignError::Configuration(format!("SPEED_OVERRIDE_INDICES: {e}")))?,
            None => BTreeSet::new(),
        };
        let keys = lookup("SPEED_OVERRIDE_KEYS")
            .map(|raw| parse_key_list(&raw))
            .unwrap_or_default();

        Self::new(min_speed, max_speed, wrap_offset)?
            .with_sample_rate(sample_rate)
            .map(|cfg| cfg.with_overrides(SpeedOverrides { indices, keys }))
    }

    fn validated(self) -> Result<Self> {
        let bad = |msg: String| Err(AlignError::Configuration(msg));
        if !self.min_speed.is_finite() || self.min_speed <= 0.0 {
            return bad(format!("min_speed must be positive, got {}", self.min_speed));
        }
        if !self.max_speed.is_finite() || self.max_speed < self.min_speed {
            return bad(format!(
                "max_speed ({}) must be >= min_speed ({})",
                self.max_speed, self.min_speed
            ));
        }
        if !self.wrap_offset.is_finite() || self.wrap_offset < 0.0 {
            return bad(format!("wrap_offset must be >= 0, got {}", self.wrap_offset));
        }
        if !self.overrun_tolerance.is_finite() || self.overrun_tolerance < 0.0 {
            return bad(format!(
                "overrun tolerance must be >= 0, got {}",
                self.overrun_tolerance
            ));
        }
        if self.sample_rate == 0 {
            return bad("sample rate must be non-zero".to_string());
        }
        Ok(self)
    }

    pub fn min_speed(&self) -> f64 {
        self.min_speed
    }

    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }

    pub fn wrap_offset(&self) -> f64 {
        self.wrap_offset
    }

    pub fn overrun_tolerance(&self) -> f64 {
        self.overrun_tolerance
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn overrides(&self) -> &SpeedOverrides {
        &self.overrides
    }
}

fn parse_var<T, F>(lookup: &F, name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| AlignError::Configuration(format!("{name} is not a valid number: {raw}"))),
        _ => Ok(default),
    }
}

/// Parse a comma separated list of chunk indices, e.g. `"37, 47"`.
pub fn parse_index_list(raw: &str) -> Result<BTreeSet<usize>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| AlignError::Configuration(format!("invalid chunk index: {s}")))
        })
        .collect()
}

/// Parse a comma separated list of chunk keys (hex digests).
pub fn parse_key_list(raw: &str) -> BTreeSet<ChunkKey> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ChunkKey::from_hex)
        .collect()
}
