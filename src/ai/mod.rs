//! Generative AI client
//!
//! Wraps a [`GenerativeBackend`] with retry, bounded caching and response
//! validation. Speech comes back as 16-bit little-endian mono PCM at 24 kHz.

pub mod cache;
mod gemini;
pub mod retry;
mod schema;

pub use cache::{BoundedCache, SpeechCache, SpeechKey};
pub use gemini::GeminiBackend;
pub use retry::RetryPolicy;
pub use schema::Schema;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::AiConfig;
use crate::store::Categories;
use crate::{Error, Result};

/// One piece of a multimodal prompt
#[derive(Debug, Clone)]
pub enum Part {
    /// Plain text
    Text(String),
    /// Inline audio sent alongside the prompt
    InlineAudio {
        /// MIME type, e.g. `audio/wav`
        mime_type: String,
        /// Raw encoded bytes
        data: Vec<u8>,
    },
}

/// Structured generation request
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Prompt parts in order
    pub parts: Vec<Part>,
    /// Shape the response must have
    pub schema: Schema,
    /// Optional system instruction
    pub system: Option<String>,
}

impl GenerateRequest {
    /// Text-only request
    #[must_use]
    pub fn text(prompt: impl Into<String>, schema: Schema) -> Self {
        Self {
            parts: vec![Part::Text(prompt.into())],
            schema,
            system: None,
        }
    }
}

/// Trait for hosted model backends
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Generate JSON text for a structured request
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    async fn generate(&self, request: &GenerateRequest) -> Result<String>;

    /// Synthesize speech, returning raw PCM bytes
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Pronunciation assessment of one recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// 0-100
    pub score: u8,
    /// Overall feedback for the learner
    pub feedback: String,
    /// Individual problems found
    #[serde(default)]
    pub mistakes: Vec<Mistake>,
}

/// A single mispronounced or wrong word
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mistake {
    /// Word as it appears in the target text
    pub word: String,
    /// What went wrong
    pub issue: String,
    /// How to fix it
    #[serde(default)]
    pub suggestion: Option<String>,
}

/// Dictionary-style definition of a word
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    /// Headword
    pub word: String,
    /// Meaning in the learner's language
    pub meaning: String,
    /// Part of speech, if known
    #[serde(default)]
    pub part_of_speech: Option<String>,
    /// Example sentence
    #[serde(default)]
    pub example: Option<String>,
}

/// A practice sentence proposed by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedSentence {
    /// Sentence in the target language
    pub text: String,
    /// Translation in the learner's language
    pub translation: String,
    /// Index into the three category labels
    pub category: usize,
}

/// Client for speech synthesis, structured generation and assessment
pub struct AiClient {
    backend: Arc<dyn GenerativeBackend>,
    retry: RetryPolicy,
    speech_cache: SpeechCache,
    definitions: BoundedCache<(String, String), Definition>,
}

impl AiClient {
    /// Create a client with injected caches
    #[must_use]
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        retry: RetryPolicy,
        speech_cache: SpeechCache,
        definitions: BoundedCache<(String, String), Definition>,
    ) -> Self {
        Self {
            backend,
            retry,
            speech_cache,
            definitions,
        }
    }

    /// Create a client sized from configuration
    #[must_use]
    pub fn from_config(backend: Arc<dyn GenerativeBackend>, config: &AiConfig) -> Self {
        Self::new(
            backend,
            config.retry.clone(),
            SpeechCache::new(config.speech_cache_capacity),
            BoundedCache::new(config.definition_cache_capacity),
        )
    }

    /// The speech cache, for inspection
    #[must_use]
    pub const fn speech_cache(&self) -> &SpeechCache {
        &self.speech_cache
    }

    /// Synthesize `text` with `voice`, returning cached bytes when available
    ///
    /// # Errors
    ///
    /// Returns error if the text is empty or synthesis fails after retries
    pub async fn synthesize_speech(&self, text: &str, voice: &str) -> Result<Arc<[u8]>> {
        let normalized = cache::normalize_text(text);
        if normalized.is_empty() {
            return Err(Error::InvalidInput("nothing to synthesize".to_string()));
        }

        let key = SpeechKey::new(voice, &normalized);
        if let Some(hit) = self.speech_cache.get(&key).await {
            tracing::debug!(voice, hash = key.text_hash_hex(), "speech cache hit");
            return Ok(hit);
        }

        let pcm = retry::with_retry(&self.retry, "synthesize", || {
            self.backend.synthesize(&normalized, voice)
        })
        .await?;

        if pcm.is_empty() {
            return Err(Error::MalformedResponse("empty audio payload".to_string()));
        }

        let bytes: Arc<[u8]> = pcm.into();
        tracing::debug!(
            voice,
            hash = key.text_hash_hex(),
            bytes = bytes.len(),
            backend = self.backend.name(),
            "speech synthesized"
        );
        self.speech_cache.put(key, Arc::clone(&bytes)).await;

        Ok(bytes)
    }

    /// Run a structured request and decode the validated result
    ///
    /// # Errors
    ///
    /// Returns `MalformedResponse` if the output is not JSON of the requested
    /// shape, or the service error if the request fails
    pub async fn generate_text<T: DeserializeOwned>(&self, request: &GenerateRequest) -> Result<T> {
        let raw = retry::with_retry(&self.retry, "generate", || self.backend.generate(request)).await?;
        let value = parse_structured(&raw, &request.schema)?;

        serde_json::from_value(value).map_err(|e| Error::MalformedResponse(e.to_string()))
    }

    /// Score a learner's recording of `target_text`
    ///
    /// # Errors
    ///
    /// Returns error if generation fails or the score is out of range
    pub async fn evaluate_recording(
        &self,
        audio: &[u8],
        mime_type: &str,
        target_text: &str,
    ) -> Result<Evaluation> {
        // Decoded via a wide integer so out-of-range scores are reported, not wrapped
        #[derive(Deserialize)]
        struct RawEvaluation {
            score: i64,
            feedback: String,
            mistakes: Vec<Mistake>,
        }

        let schema = Schema::object([
            ("score", Schema::Integer),
            ("feedback", Schema::String),
            (
                "mistakes",
                Schema::array(
                    Schema::object([
                        ("word", Schema::String),
                        ("issue", Schema::String),
                        ("suggestion", Schema::String),
                    ])
                    .optional("suggestion"),
                ),
            ),
        ]);

        let request = GenerateRequest {
            parts: vec![
                Part::Text(format!(
                    "Assess the pronunciation of this recording against the target sentence: \"{target_text}\". \
                     Score from 0 to 100, give short feedback, and list each mispronounced or missing word."
                )),
                Part::InlineAudio {
                    mime_type: mime_type.to_string(),
                    data: audio.to_vec(),
                },
            ],
            schema,
            system: Some("You are a strict but encouraging pronunciation coach.".to_string()),
        };

        let raw: RawEvaluation = self.generate_text(&request).await?;
        let score = u8::try_from(raw.score)
            .ok()
            .filter(|s| *s <= 100)
            .ok_or_else(|| Error::MalformedResponse(format!("score {} outside 0-100", raw.score)))?;

        Ok(Evaluation {
            score,
            feedback: raw.feedback,
            mistakes: raw.mistakes,
        })
    }

    /// Transcribe a spoken answer
    ///
    /// # Errors
    ///
    /// Returns error if generation fails
    pub async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct Transcript {
            transcript: String,
        }

        let request = GenerateRequest {
            parts: vec![
                Part::Text("Transcribe this spoken answer verbatim.".to_string()),
                Part::InlineAudio {
                    mime_type: mime_type.to_string(),
                    data: audio.to_vec(),
                },
            ],
            schema: Schema::object([("transcript", Schema::String)]),
            system: None,
        };

        let t: Transcript = self.generate_text(&request).await?;
        Ok(t.transcript)
    }

    /// Look up a word, caching definitions per language
    ///
    /// # Errors
    ///
    /// Returns error if generation fails
    pub async fn define_word(&self, word: &str, language: &str) -> Result<Definition> {
        let key = (word.trim().to_lowercase(), language.to_string());
        if key.0.is_empty() {
            return Err(Error::InvalidInput("empty word".to_string()));
        }
        if let Some(hit) = self.definitions.get(&key).await {
            return Ok(hit);
        }

        let schema = Schema::object([
            ("word", Schema::String),
            ("meaning", Schema::String),
            ("part_of_speech", Schema::String),
            ("example", Schema::String),
        ])
        .optional("part_of_speech")
        .optional("example");

        let request = GenerateRequest::text(
            format!("Define the word \"{}\" for a learner whose native language is {language}.", key.0),
            schema,
        );

        let definition: Definition = self.generate_text(&request).await?;
        self.definitions.put(key, definition.clone()).await;
        Ok(definition)
    }

    /// Propose practice sentences about `topic`
    ///
    /// # Errors
    ///
    /// Returns error if generation fails or a category index is invalid
    pub async fn generate_sentences(
        &self,
        topic: &str,
        count: usize,
        categories: &Categories,
    ) -> Result<Vec<GeneratedSentence>> {
        let labels = categories
            .labels()
            .iter()
            .enumerate()
            .map(|(i, l)| format!("{i} = {l}"))
            .collect::<Vec<_>>()
            .join(", ");

        let schema = Schema::array(Schema::object([
            ("text", Schema::String),
            ("translation", Schema::String),
            ("category", Schema::Integer),
        ]));

        let request = GenerateRequest::text(
            format!(
                "Write {count} short, natural practice sentences about \"{topic}\" with translations. \
                 Assign each a category index ({labels})."
            ),
            schema,
        );

        let sentences: Vec<GeneratedSentence> = self.generate_text(&request).await?;
        if let Some(bad) = sentences.iter().find(|s| s.category >= Categories::COUNT) {
            return Err(Error::MalformedResponse(format!(
                "category {} out of range",
                bad.category
            )));
        }

        Ok(sentences)
    }
}

/// Parse model output as JSON and validate it
///
/// Markdown code fences around the payload are tolerated.
///
/// # Errors
///
/// Returns `MalformedResponse` on invalid JSON or schema mismatch
pub fn parse_structured(raw: &str, schema: &Schema) -> Result<serde_json::Value> {
    let trimmed = strip_code_fence(raw.trim());
    let value: serde_json::Value = serde_json::from_str(trimmed)
        .map_err(|e| Error::MalformedResponse(format!("invalid JSON: {e}")))?;

    schema.validate(&value).map_err(Error::MalformedResponse)?;
    Ok(value)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn test_parse_structured_rejects_invalid_json() {
        let err = parse_structured("not json", &Schema::String).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn test_parse_structured_rejects_shape() {
        let schema = Schema::object([("transcript", Schema::String)]);
        let err = parse_structured(r#"{"transcript": 4}"#, &schema).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
        assert!(parse_structured(r#"{"transcript": "hola"}"#, &schema).is_ok());
    }
}
