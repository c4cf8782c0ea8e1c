use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::audio::{join_wav, wav_bytes_duration};
use crate::error::{MediaError, SynthesisError};
use crate::media::wait_with_timeout;
use crate::utils::chunk_text;

const GOOGLE_TTS_URL: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";

/// The service rejects inputs over 5000 bytes.
const GOOGLE_MAX_INPUT: usize = 4500;

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Returns WAV bytes for `text`.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AudioEncoding {
    Linear16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConfig {
    pub audio_encoding: AudioEncoding,
    pub effects_profile_id: Vec<String>,
    pub pitch: f64,
    pub speaking_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSelection {
    pub language_code: String,
    pub name: String,
}

/// Voice and audio settings sent with every synthesis request.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceConfig {
    pub voice: VoiceSelection,
    pub audio: AudioConfig,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice: VoiceSelection {
                language_code: "en-US".to_string(),
                name: "en-US-Neural2-C".to_string(),
            },
            audio: AudioConfig {
                audio_encoding: AudioEncoding::Linear16,
                effects_profile_id: vec!["large-home-entertainment-class-device".to_string()],
                pitch: 0.0,
                speaking_rate: 1.0,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: &'a VoiceSelection,
    audio_config: &'a AudioConfig,
}

impl<'a> SynthesizeRequest<'a> {
    pub fn new(text: &'a str, config: &'a VoiceConfig) -> Self {
        Self {
            input: SynthesisInput { text },
            voice: &config.voice,
            audio_config: &config.audio,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    #[serde(default)]
    audio_content: String,
}

/// Google Cloud Text-to-Speech over its REST API.
pub struct GoogleTts {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    config: VoiceConfig,
}

impl GoogleTts {
    pub fn new(api_key: String, config: VoiceConfig, timeout: Option<Duration>) -> Result<Self, SynthesisError> {
        if api_key.trim().is_empty() {
            return Err(SynthesisError::Configuration(
                "a Google TTS API key is required (--google-api-key or GOOGLE_TTS_API_KEY)".to_string(),
            ));
        }
        let mut builder = reqwest::Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        Ok(Self {
            client: builder.build()?,
            api_key,
            endpoint: GOOGLE_TTS_URL.to_string(),
            config,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn synthesize_chunk(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        let res = self
            .client
            .post(&self.endpoint)
            .query(&[("key", &self.api_key)])
            .json(&SynthesizeRequest::new(text, &self.config))
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            error!("Speech service returned {}: {}", status, body);
            return Err(SynthesisError::Api {
                status: status.as_u16(),
                body,
            });
        }
        let parsed: SynthesizeResponse = res.json().await?;
        decode_audio(&parsed.audio_content)
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        let chunks = chunk_text(text, GOOGLE_MAX_INPUT);
        let mut parts = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            debug!("Synthesizing chunk {}/{} ({} bytes)", i + 1, chunks.len(), chunk.len());
            parts.push(self.synthesize_chunk(chunk).await?);
        }
        let audio = join_wav(&parts)?;
        info!("Synthesized {:.2}s of speech", wav_bytes_duration(&audio)?);
        Ok(audio)
    }
}

pub fn decode_audio(content: &str) -> Result<Vec<u8>, SynthesisError> {
    if content.is_empty() {
        return Err(SynthesisError::EmptyAudio);
    }
    let bytes = general_purpose::STANDARD.decode(content)?;
    wav_bytes_duration(&bytes)?;
    Ok(bytes)
}

/// Local Piper TTS, reading text from stdin and writing a WAV file.
pub struct PiperTts {
    pub binary: String,
    pub model: PathBuf,
    pub scratch: PathBuf,
    pub timeout: Option<Duration>,
}

#[async_trait]
impl SpeechSynthesizer for PiperTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        tokio::fs::create_dir_all(&self.scratch).await?;
        let out_path = self.scratch.join("piper_out.wav");
        let mut child = Command::new(&self.binary)
            .arg("--model")
            .arg(&self.model)
            .arg("--output_file")
            .arg(&out_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MediaError::Spawn {
                program: self.binary.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
        }

        let output = wait_with_timeout(&self.binary, child, self.timeout).await?;
        if !output.status.success() {
            error!("Piper TTS command failed for {}", out_path.display());
            return Err(MediaError::from_exit(
                &self.binary,
                output.status.code(),
                &String::from_utf8_lossy(&output.stderr),
            )
            .into());
        }

        let bytes = tokio::fs::read(&out_path).await?;
        tokio::fs::remove_file(&out_path).await?;
        wav_bytes_duration(&bytes)?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::tests::silence;

    #[test]
    fn request_matches_service_schema() {
        let config = VoiceConfig::default();
        let json = serde_json::to_value(SynthesizeRequest::new("Hello there.", &config)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "input": { "text": "Hello there." },
                "voice": { "languageCode": "en-US", "name": "en-US-Neural2-C" },
                "audioConfig": {
                    "audioEncoding": "LINEAR16",
                    "effectsProfileId": ["large-home-entertainment-class-device"],
                    "pitch": 0.0,
                    "speakingRate": 1.0
                }
            })
        );
    }

    #[test]
    fn decodes_wav_audio_content() {
        let wav = silence(0.25, 8000);
        let encoded = general_purpose::STANDARD.encode(&wav);
        assert_eq!(decode_audio(&encoded).unwrap(), wav);
    }

    #[test]
    fn empty_audio_content_is_an_error() {
        assert!(matches!(decode_audio(""), Err(SynthesisError::EmptyAudio)));
    }

    #[test]
    fn non_wav_audio_content_is_an_error() {
        let encoded = general_purpose::STANDARD.encode(b"definitely not audio");
        assert!(matches!(decode_audio(&encoded), Err(SynthesisError::Wav(_))));
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let res = GoogleTts::new("  ".to_string(), VoiceConfig::default(), None);
        assert!(matches!(res, Err(SynthesisError::Configuration(_))));
    }
}
