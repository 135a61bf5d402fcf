//! Gemini backend over the Generative Language REST API

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::ai::retry::parse_retry_after;
use crate::ai::{GenerateRequest, GenerativeBackend, Part};
use crate::config::AiConfig;
use crate::{Error, Result};

/// Backend speaking the `generateContent` endpoint
pub struct GeminiBackend {
    client: Client,
    api_key: SecretString,
    base_url: String,
    text_model: String,
    tts_model: String,
}

impl GeminiBackend {
    /// Create a backend from resolved AI configuration
    ///
    /// # Errors
    ///
    /// Returns error if no API key is configured
    pub fn new(config: &AiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("API key required (set SPEAKDRILL_API_KEY)".to_string()))?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            text_model: config.text_model.clone(),
            tts_model: config.tts_model.clone(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{model}:generateContent", self.base_url)
    }

    async fn post(&self, model: &str, body: &ContentRequest<'_>) -> Result<ContentResponse> {
        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Service {
                status: status.as_u16(),
                message,
                retry_after,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let parts: Vec<WirePart<'_>> = request.parts.iter().map(WirePart::from).collect();
        let system = request.system.as_deref().map(|text| Content {
            role: None,
            parts: vec![WirePart::Text { text }],
        });

        let body = ContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts,
            }],
            system_instruction: system,
            generation_config: GenerationConfig {
                response_mime_type: Some("application/json"),
                response_schema: Some(request.schema.to_json()),
                response_modalities: None,
                speech_config: None,
            },
        };

        let response = self.post(&self.text_model, &body).await?;
        response
            .first_text()
            .ok_or_else(|| Error::MalformedResponse("response contained no text part".to_string()))
    }

    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        let body = ContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![WirePart::Text { text }],
            }],
            system_instruction: None,
            generation_config: GenerationConfig {
                response_mime_type: None,
                response_schema: None,
                response_modalities: Some(vec!["AUDIO"]),
                speech_config: Some(SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoice { voice_name: voice },
                    },
                }),
            },
        };

        let response = self.post(&self.tts_model, &body).await?;
        let data = response
            .first_inline_data()
            .ok_or_else(|| Error::MalformedResponse("response contained no audio".to_string()))?;

        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| Error::MalformedResponse(format!("invalid base64 audio: {e}")))
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<WirePart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WirePart<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

impl<'a> From<&'a Part> for WirePart<'a> {
    fn from(part: &'a Part) -> Self {
        match part {
            Part::Text(text) => Self::Text { text },
            Part::InlineAudio { mime_type, data } => Self::Inline {
                inline_data: InlineData {
                    mime_type: mime_type.clone(),
                    data: base64::engine::general_purpose::STANDARD.encode(data),
                },
            },
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<&'a str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<SpeechConfig<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig<'a> {
    voice_config: VoiceConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig<'a> {
    prebuilt_voice_config: PrebuiltVoice<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoice<'a> {
    voice_name: &'a str,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

impl ContentResponse {
    fn parts(&self) -> impl Iterator<Item = &ResponsePart> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .into_iter()
            .flat_map(|c| c.parts.iter())
    }

    fn first_text(&self) -> Option<String> {
        self.parts().find_map(|p| p.text.clone())
    }

    fn first_inline_data(&self) -> Option<&str> {
        self.parts()
            .find_map(|p| p.inline_data.as_ref().map(|d| d.data.as_str()))
    }
}
