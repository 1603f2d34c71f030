use crate::error::SynthesisError;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use serde::Serialize;
use std::io;
use std::sync::Arc;
use std::time::Duration;

const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io/v1";
const XI_API_KEY_HEADER: &str = "xi-api-key";

/// Audio as it arrives from the provider, in order.
pub type AudioChunkStream = BoxStream<'static, Result<Bytes, SynthesisError>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
}

/// Voice, model and encoding requested for every utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceConfig {
    pub voice_id: String,
    pub output_format: String,
    pub model_id: String,
    pub settings: VoiceSettings,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice_id: "DTKMou8ccj1ZaWGBiotd".to_string(),
            output_format: "mp3_22050_32".to_string(),
            model_id: "eleven_flash_v2_5".to_string(),
            settings: VoiceSettings {
                stability: 0.0,
                similarity_boost: 1.0,
                style: 0.0,
                use_speaker_boost: true,
            },
        }
    }
}

/// A text-to-speech provider that sends the full text in one call and
/// answers with a chunked byte stream.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait TextToSpeech: Send + Sync {
    async fn stream_speech(
        &self,
        text: &str,
        voice: &VoiceConfig,
    ) -> Result<AudioChunkStream, SynthesisError>;
}

#[derive(Serialize)]
struct TtsRequestBody<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: &'a VoiceSettings,
}

#[derive(Clone)]
pub struct ElevenLabsClient {
    inner: Client,
    api_key: Option<String>,
}

impl ElevenLabsClient {
    pub fn new(api_key: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let inner = Client::builder().timeout(timeout).build()?;
        Ok(Self { inner, api_key })
    }
}

#[async_trait]
impl TextToSpeech for ElevenLabsClient {
    async fn stream_speech(
        &self,
        text: &str,
        voice: &VoiceConfig,
    ) -> Result<AudioChunkStream, SynthesisError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(SynthesisError::MissingCredential)?;

        let url = format!(
            "{ELEVENLABS_BASE_URL}/text-to-speech/{}/stream",
            voice.voice_id
        );
        let body = TtsRequestBody {
            text,
            model_id: &voice.model_id,
            voice_settings: &voice.settings,
        };

        let resp = self
            .inner
            .post(url)
            .query(&[("output_format", voice.output_format.as_str())])
            .header(XI_API_KEY_HEADER, api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SynthesisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp.bytes_stream().map_err(SynthesisError::from).boxed())
    }
}

/// A fully materialized utterance, read front to back.
///
/// A second reader must call [`AudioBuffer::rewind`] first.
#[derive(Debug, Clone, Default)]
pub struct AudioBuffer {
    data: Bytes,
    pos: usize,
}

impl AudioBuffer {
    pub fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    /// Takes up to `max` bytes from the current position.
    pub fn next_chunk(&mut self, max: usize) -> Option<Bytes> {
        if self.pos >= self.data.len() || max == 0 {
            return None;
        }
        let end = (self.pos + max).min(self.data.len());
        let chunk = self.data.slice(self.pos..end);
        self.pos = end;
        Some(chunk)
    }
}

impl io::Read for AudioBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.next_chunk(buf.len()) {
            Some(chunk) => {
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
            None => Ok(0),
        }
    }
}

/// Turns text into a complete in-memory utterance.
#[derive(Clone)]
pub struct SpeechClient {
    tts: Arc<dyn TextToSpeech>,
    voice: VoiceConfig,
}

impl SpeechClient {
    pub fn new(tts: Arc<dyn TextToSpeech>) -> Self {
        Self {
            tts,
            voice: VoiceConfig::default(),
        }
    }

    /// Collects every chunk the provider sends, skipping empty ones.
    pub async fn synthesize(&self, text: &str) -> Result<AudioBuffer, SynthesisError> {
        let mut chunks = self.tts.stream_speech(text, &self.voice).await?;
        let mut audio = BytesMut::new();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            if !chunk.is_empty() {
                audio.extend_from_slice(&chunk);
            }
        }
        if audio.is_empty() {
            return Err(SynthesisError::EmptyAudio);
        }
        tracing::debug!(bytes = audio.len(), "speech synthesized");
        Ok(AudioBuffer::new(audio.freeze()))
    }
}
