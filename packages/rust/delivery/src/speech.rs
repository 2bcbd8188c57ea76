//! ElevenLabs text-to-speech.

use std::time::Duration;

use async_trait::async_trait;
use newsdigest_shared::{NewsDigestError, Result, SpeechConfig};
use serde::Serialize;
use tracing::{info, instrument};

/// Turns a script into audio bytes.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

pub struct ElevenLabsSynthesizer {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    voice_id: String,
    model_id: String,
    stability: f32,
    similarity_boost: f32,
}

impl ElevenLabsSynthesizer {
    pub fn new(config: &SpeechConfig, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("NewsDigest/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| NewsDigestError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            voice_id: config.voice_id.clone(),
            model_id: config.model_id.clone(),
            stability: config.stability,
            similarity_boost: config.similarity_boost,
        })
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    #[instrument(skip_all, fields(voice_id = %self.voice_id, chars = text.len()))]
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        if text.trim().is_empty() {
            return Err(NewsDigestError::validation("speech text is empty"));
        }
        let url = format!("{}/v1/text-to-speech/{}", self.base_url, self.voice_id);
        let body = SpeechRequest {
            text,
            model_id: &self.model_id,
            voice_settings: VoiceSettings {
                stability: self.stability,
                similarity_boost: self.similarity_boost,
            },
        };

        let response = self
            .http
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("accept", "audio/mpeg")
            .json(&body)
            .send()
            .await
            .map_err(|e| NewsDigestError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NewsDigestError::Api {
                service: "elevenlabs",
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| NewsDigestError::Network(format!("{url}: failed to read audio: {e}")))?;
        if bytes.is_empty() {
            return Err(NewsDigestError::Delivery("speech service returned no audio".into()));
        }

        info!(bytes = bytes.len(), "audio synthesized");
        Ok(bytes.to_vec())
    }
}
