use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::SpeechConfig;

pub const VOICE_PRESETS: &[(&str, &str)] = &[
    ("female_us", "en-US-JennyNeural"),
    ("male_us", "en-US-GuyNeural"),
    ("female_uk", "en-GB-SoniaNeural"),
    ("male_uk", "en-GB-RyanNeural"),
    ("female_au", "en-AU-NatashaNeural"),
];

pub const DEFAULT_VOICE: &str = "en-US-JennyNeural";

/// Maps a preset id from the client onto a provider voice name.
/// Unknown or absent ids fall back to the default voice.
pub fn resolve_voice(voice_id: Option<&str>) -> &'static str {
    voice_id
        .and_then(|id| {
            VOICE_PRESETS
                .iter()
                .find(|(preset, _)| *preset == id)
                .map(|(_, name)| *name)
        })
        .unwrap_or(DEFAULT_VOICE)
}

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("Speech service not configured.")]
    NotConfigured,
    #[error("speech service error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait SpeechClient: Send + Sync {
    async fn synthesize(&self, text: &str, voice_name: &str) -> Result<Bytes, SpeechError>;
    async fn transcribe(&self, audio: Bytes) -> Result<String, SpeechError>;
}

struct AzureCredentials {
    key: String,
    region: String,
}

/// Azure Cognitive Services speech via the REST endpoints.
pub struct AzureSpeech {
    client: reqwest::Client,
    credentials: Option<AzureCredentials>,
}

#[derive(Deserialize)]
struct RecognitionResponse {
    #[serde(rename = "RecognitionStatus")]
    recognition_status: String,
    #[serde(rename = "DisplayText", default)]
    display_text: String,
}

impl AzureSpeech {
    pub fn new(config: &SpeechConfig) -> anyhow::Result<Self> {
        let credentials = match (config.key.clone(), config.region.clone()) {
            (Some(key), Some(region)) => Some(AzureCredentials { key, region }),
            _ => {
                warn!("Azure Speech key or region not set; speech endpoints will fail");
                None
            }
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            credentials,
        })
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[async_trait]
impl SpeechClient for AzureSpeech {
    async fn synthesize(&self, text: &str, voice_name: &str) -> Result<Bytes, SpeechError> {
        let creds = self.credentials.as_ref().ok_or(SpeechError::NotConfigured)?;
        let url = format!(
            "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
            creds.region
        );
        let ssml = format!(
            "<speak version='1.0' xml:lang='en-US'><voice name='{}'>{}</voice></speak>",
            voice_name,
            escape_xml(text)
        );

        debug!(voice = %voice_name, "synthesizing speech");
        let resp = self
            .client
            .post(&url)
            .header("Ocp-Apim-Subscription-Key", &creds.key)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", "audio-16khz-64kbitrate-mono-mp3")
            .body(ssml)
            .send()
            .await
            .map_err(|e| SpeechError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(SpeechError::Transport(format!(
                "synthesis returned {}",
                resp.status()
            )));
        }
        resp.bytes()
            .await
            .map_err(|e| SpeechError::Transport(e.to_string()))
    }

    async fn transcribe(&self, audio: Bytes) -> Result<String, SpeechError> {
        let creds = self.credentials.as_ref().ok_or(SpeechError::NotConfigured)?;
        let url = format!(
            "https://{}.stt.speech.microsoft.com/speech/recognition/conversation/cognitiveservices/v1?language=en-US",
            creds.region
        );

        debug!(bytes = audio.len(), "transcribing audio");
        let resp = self
            .client
            .post(&url)
            .header("Ocp-Apim-Subscription-Key", &creds.key)
            .header("Content-Type", "audio/wav")
            .body(audio)
            .send()
            .await
            .map_err(|e| SpeechError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(SpeechError::Transport(format!(
                "recognition returned {}",
                resp.status()
            )));
        }

        let body: RecognitionResponse = resp
            .json()
            .await
            .map_err(|e| SpeechError::Transport(e.to_string()))?;

        // NoMatch is not an error: the audio simply contained no speech.
        if body.recognition_status == "Success" {
            Ok(body.display_text)
        } else {
            Ok(String::new())
        }
    }
}
