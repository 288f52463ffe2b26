use anyhow::{bail, Context, Result};
use dub_core::Transcript;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{debug, info};

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Anything that turns one chunk of source text into target-language text.
pub trait Translator: Send + Sync {
    fn translate(&self, text: &str) -> Result<String>;
}

impl<F> Translator for F
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    fn translate(&self, text: &str) -> Result<String> {
        self(text)
    }
}

/// Structure for the OpenAI Chat API request
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

/// Structure for the OpenAI Chat API response
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Instructions for a voice-over translation between `source` and `target`.
pub fn voice_over_prompt(source: &str, target: &str) -> String {
    format!(
        "Translate this {source} sentence into {target}.\n\
         Please, do not translate names, brands and places, keeping them in the translated text.\n\
         Do not insert any new information.\n\
         Try to keep the same tone and style of the original text, and also the same length, \
         considering that the translation will be used in a voice-over."
    )
}

pub struct OpenAiTranslator {
    api_key: String,
    client: Client,
    model: String,
    system_prompt: String,
    temperature: f32,
}

impl OpenAiTranslator {
    /// Create a new translator. Reads API key from the `OPENAI_API_KEY` env variable.
    pub fn new(model: &str) -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY must be set in the environment")?;
        Ok(Self::with_api_key(api_key, model))
    }

    pub fn with_api_key(api_key: impl Into<String>, model: &str) -> Self {
        Self {
            api_key: api_key.into(),
            client: Client::new(),
            model: model.to_string(),
            system_prompt: voice_over_prompt("Portuguese", "English"),
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    /// Model from `TRANSLATION_MODEL`, falling back to [`DEFAULT_MODEL`].
    pub fn from_env() -> Result<Self> {
        let model = env::var("TRANSLATION_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::new(&model)
    }

    pub fn with_languages(mut self, source: &str, target: &str) -> Self {
        self.system_prompt = voice_over_prompt(source, target);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Translator for OpenAiTranslator {
    fn translate(&self, text: &str) -> Result<String> {
        let req_body = ChatRequest {
            model: &self.model,
            messages: vec![
                Message { role: "system", content: &self.system_prompt },
                Message { role: "user", content: text },
            ],
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&req_body)
            .send()
            .context("translation request failed")?
            .error_for_status()? // convert non-200 into error
            .json::<ChatResponse>()
            .context("malformed translation response")?;

        match response.choices.into_iter().next() {
            Some(choice) => Ok(choice.message.content.trim().to_string()),
            None => bail!("translation response contained no choices"),
        }
    }
}

/// Translate every chunk of `transcript`, keeping its timestamps.
///
/// The result is 1:1 with the input. Blank chunks are passed through
/// without calling the translator.
pub fn translate_transcript(transcript: &Transcript, translator: &dyn Translator) -> Result<Transcript> {
    info!(chunks = transcript.len(), "Translating transcript");
    let mut texts = Vec::with_capacity(transcript.len());
    for chunk in transcript.chunks() {
        if chunk.text.trim().is_empty() {
            texts.push(String::new());
            continue;
        }
        let translated = translator
            .translate(chunk.text.trim())
            .with_context(|| format!("failed to translate chunk {}", chunk.index))?;
        debug!(index = chunk.index, source = %chunk.text, target = %translated, "Translated chunk");
        texts.push(translated);
    }
    Ok(transcript.with_texts(texts)?)
}
