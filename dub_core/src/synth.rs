//! Synthesis collaborator interface and voice configuration.
//!
//! The engine only needs "text in, audio out"; [`Synthesizer`] is that
//! seam. Plain closures implement it, which is what tests and ad hoc callers
//! use. Local Piper voices are available behind the `piper` feature.

use std::{collections::HashMap, fs, path::Path, path::PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;

/// Produces speech for one chunk of (translated) text.
///
/// `index` is the chunk position, passed through for logging and for
/// backends that vary per chunk. Implementations must be `Send + Sync` so
/// clips can be prefetched from several threads.
pub trait Synthesizer: Send + Sync {
    fn synthesize(&self, text: &str, index: usize) -> anyhow::Result<AudioBuffer>;
}

impl<F> Synthesizer for F
where
    F: Fn(&str, usize) -> anyhow::Result<AudioBuffer> + Send + Sync,
{
    fn synthesize(&self, text: &str, index: usize) -> anyhow::Result<AudioBuffer> {
        self(text, index)
    }
}

/// Settings handed to a synthesis backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Target language key, e.g. `en_US`.
    pub language: Option<String>,
    /// Voice id within the language; the map's default when unset.
    pub voice: Option<String>,
    /// Recording of the original speaker, for voice-cloning backends.
    pub reference_voice: Option<PathBuf>,
    /// Explicit consent to model terms of service.
    ///
    /// Voices flagged `requires_terms` in the voice map refuse to load
    /// without it.
    #[serde(default)]
    pub accept_model_terms: bool,
}

/// One voice model in `models/map.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceEntry {
    pub config: String,
    pub speaker_id: Option<i64>,
    pub display_name: Option<String>,
    pub gender: Option<String>,
    pub quality: Option<String>,
    #[serde(default)]
    pub requires_terms: bool,
}

impl VoiceEntry {
    fn legacy(config: String, speaker_id: Option<i64>) -> Self {
        Self {
            config,
            speaker_id,
            display_name: None,
            gender: None,
            quality: None,
            requires_terms: false,
        }
    }
}

#[derive(Debug, Clone)]
struct LanguageVoices {
    default_voice: String,
    voices: HashMap<String, VoiceEntry>,
}

/// Language → voices mapping loaded from `models/map.json`.
///
/// Accepts the multi-voice format
/// `{ "en_US": { "default_voice": "amy", "voices": { "amy": { "config": ... } } } }`
/// and the legacy forms `{ "en_US": "path.onnx.json" }` /
/// `{ "en_US": { "config": ..., "default_speaker": 0 } }`.
#[derive(Debug, Clone, Default)]
pub struct VoiceMap {
    languages: HashMap<String, LanguageVoices>,
}

impl VoiceMap {
    pub fn from_path<P: AsRef<Path>>(p: P) -> anyhow::Result<Self> {
        let text = fs::read_to_string(p.as_ref())
            .with_context(|| format!("Failed to load {}", p.as_ref().display()))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let json: serde_json::Value =
            serde_json::from_str(text).context("map.json is not valid JSON")?;
        let obj = json
            .as_object()
            .ok_or_else(|| anyhow::anyhow!("map.json must be a JSON object"))?;

        let mut languages = HashMap::new();
        for (lang, v) in obj {
            let entry = match v {
                serde_json::Value::Object(o) if o.contains_key("voices") => {
                    let default_voice = o
                        .get("default_voice")
                        .and_then(|x| x.as_str())
                        .ok_or_else(|| anyhow::anyhow!("missing 'default_voice' for language {lang}"))?
                        .to_string();
                    let voices: HashMap<String, VoiceEntry> = serde_json::from_value(
                        o.get("voices").cloned().unwrap_or_default(),
                    )
                    .with_context(|| format!("invalid 'voices' object for language {lang}"))?;
                    if !voices.contains_key(&default_voice) {
                        anyhow::bail!("default voice '{default_voice}' not listed for language {lang}");
                    }
                    LanguageVoices {
                        default_voice,
                        voices,
                    }
                }
                serde_json::Value::Object(o) => {
                    let config = o
                        .get("config")
                        .and_then(|x| x.as_str())
                        .ok_or_else(|| anyhow::anyhow!("missing 'config' for key {lang}"))?
                        .to_string();
                    let speaker = o.get("default_speaker").and_then(|x| x.as_i64());
                    Self::single("default", VoiceEntry::legacy(config, speaker))
                }
                serde_json::Value::String(path) => {
                    Self::single("default", VoiceEntry::legacy(path.clone(), None))
                }
                _ => anyhow::bail!("invalid entry for key {lang} (expected string or object)"),
            };
            languages.insert(lang.clone(), entry);
        }
        Ok(Self { languages })
    }

    fn single(id: &str, entry: VoiceEntry) -> LanguageVoices {
        LanguageVoices {
            default_voice: id.to_string(),
            voices: HashMap::from([(id.to_string(), entry)]),
        }
    }

    /// Supported language keys, sorted.
    pub fn languages(&self) -> Vec<String> {
        let mut langs: Vec<String> = self.languages.keys().cloned().collect();
        langs.sort();
        langs
    }

    /// Resolve the voice entry for a synthesis configuration.
    pub fn resolve(&self, cfg: &SynthesisConfig) -> anyhow::Result<&VoiceEntry> {
        let lang = cfg
            .language
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no target language configured"))?;
        let voices = self
            .languages
            .get(lang)
            .ok_or_else(|| anyhow::anyhow!("Unknown language key: {lang}"))?;
        let voice_id = cfg.voice.as_deref().unwrap_or(&voices.default_voice);
        let entry = voices.voices.get(voice_id).ok_or_else(|| {
            let mut known: Vec<&str> = voices.voices.keys().map(String::as_str).collect();
            known.sort_unstable();
            anyhow::anyhow!(
                "Unknown voice '{voice_id}' for language '{lang}'. Available voices: {}",
                known.join(", ")
            )
        })?;
        if entry.requires_terms && !cfg.accept_model_terms {
            anyhow::bail!(
                "voice '{voice_id}' requires accepting the model terms of service (ACCEPT_MODEL_TERMS=1)"
            );
        }
        Ok(entry)
    }
}

#[cfg(feature = "piper")]
pub use piper::PiperSynthesizer;

#[cfg(feature = "piper")]
mod piper {
    use std::sync::Mutex;

    use anyhow::Context;
    use piper_rs::synth::{PiperSpeechStreamParallel, PiperSpeechSynthesizer};

    use super::{SynthesisConfig, Synthesizer, VoiceMap};
    use crate::audio::AudioBuffer;

    /// Local Piper voice resolved from a [`VoiceMap`].
    pub struct PiperSynthesizer {
        synth: Mutex<PiperSpeechSynthesizer>,
        sample_rate: u32,
    }

    impl std::fmt::Debug for PiperSynthesizer {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("PiperSynthesizer")
                .field("synth", &"<PiperSpeechSynthesizer>")
                .field("sample_rate", &self.sample_rate)
                .finish()
        }
    }

    impl PiperSynthesizer {
        pub fn load(map: &VoiceMap, cfg: &SynthesisConfig) -> anyhow::Result<Self> {
            let entry = map.resolve(cfg)?;
            let sample_rate = read_sample_rate(&entry.config)?;
            let model = piper_rs::from_config_path(std::path::Path::new(&entry.config))
                .map_err(|e| anyhow::anyhow!("piper load error: {e}"))?;
            let synth = PiperSpeechSynthesizer::new(model)?;
            tracing::info!(config = %entry.config, sample_rate, "Loaded Piper voice");
            Ok(Self {
                synth: Mutex::new(synth),
                sample_rate,
            })
        }
    }

    impl Synthesizer for PiperSynthesizer {
        fn synthesize(&self, text: &str, _index: usize) -> anyhow::Result<AudioBuffer> {
            let synth = self
                .synth
                .lock()
                .map_err(|_| anyhow::anyhow!("Synthesizer lock poisoned"))?;
            let iter: PiperSpeechStreamParallel = synth
                .synthesize_parallel(text.to_string(), None)
                .map_err(|e| anyhow::anyhow!("piper synth error: {e}"))?;

            let mut samples: Vec<f32> = Vec::new();
            for part in iter {
                samples.extend(part.map_err(|e| anyhow::anyhow!("chunk error: {e}"))?.into_vec());
            }
            Ok(AudioBuffer::mono(samples, self.sample_rate)?)
        }
    }

    /// Read `audio.sample_rate` from a Piper model config.
    fn read_sample_rate(cfg_path: &str) -> anyhow::Result<u32> {
        let text = std::fs::read_to_string(cfg_path)
            .with_context(|| format!("Failed to read config file: {cfg_path}"))?;
        let json: serde_json::Value =
            serde_json::from_str(&text).context("Config file is not valid JSON")?;
        let sample_rate = json
            .get("audio")
            .and_then(|a| a.get("sample_rate"))
            .and_then(|sr| sr.as_u64())
            .ok_or_else(|| anyhow::anyhow!("Missing or invalid 'audio.sample_rate' in config"))?;
        Ok(u32::try_from(sample_rate)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAP: &str = r#"{
        "en_US": {
            "default_voice": "amy",
            "voices": {
                "amy": { "config": "models/en_US/amy.onnx.json", "speaker_id": null },
                "xtts": { "config": "models/en_US/xtts.onnx.json", "speaker_id": null, "requires_terms": true }
            }
        },
        "de_DE": "models/de_DE/thorsten.onnx.json",
        "pt_BR": { "config": "models/pt_BR/faber.onnx.json", "default_speaker": 2 }
    }"#;

    fn cfg(lang: &str, voice: Option<&str>) -> SynthesisConfig {
        SynthesisConfig {
            language: Some(lang.to_string()),
            voice: voice.map(str::to_string),
            ..SynthesisConfig::default()
        }
    }

    #[test]
    fn test_closure_is_a_synthesizer() {
        let synth = |text: &str, _index: usize| -> anyhow::Result<AudioBuffer> {
            Ok(AudioBuffer::mono(vec![0.0; text.len()], 8_000)?)
        };
        let clip = synth.synthesize("abcd", 0).unwrap();
        assert_eq!(clip.frames(), 4);
    }

    #[test]
    fn test_voice_map_formats() {
        let map = VoiceMap::from_json(MAP).unwrap();
        assert_eq!(map.languages(), vec!["de_DE", "en_US", "pt_BR"]);
        assert_eq!(map.resolve(&cfg("en_US", None)).unwrap().config, "models/en_US/amy.onnx.json");
        assert_eq!(map.resolve(&cfg("de_DE", None)).unwrap().config, "models/de_DE/thorsten.onnx.json");
        assert_eq!(map.resolve(&cfg("pt_BR", None)).unwrap().speaker_id, Some(2));
    }

    #[test]
    fn test_unknown_voice_lists_alternatives() {
        let map = VoiceMap::from_json(MAP).unwrap();
        let err = map.resolve(&cfg("en_US", Some("bob"))).unwrap_err();
        assert!(err.to_string().contains("amy, xtts"));
        assert!(map.resolve(&cfg("fr_FR", None)).is_err());
    }

    #[test]
    fn test_terms_capability_gates_voice() {
        let map = VoiceMap::from_json(MAP).unwrap();
        let mut config = cfg("en_US", Some("xtts"));
        assert!(map.resolve(&config).is_err());
        config.accept_model_terms = true;
        assert!(map.resolve(&config).is_ok());
    }

    #[test]
    fn test_invalid_map_entries() {
        assert!(VoiceMap::from_json("[]").is_err());
        assert!(VoiceMap::from_json(r#"{"en_US": 3}"#).is_err());
        assert!(VoiceMap::from_json(r#"{"en_US": {"voices": {}}}"#).is_err());
    }
}
