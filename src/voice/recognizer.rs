//! Speech-to-text backends
//!
//! Both backends are blocking HTTP clients; they run on the voice thread.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::time::Duration;

use crate::config::{LocalSttConfig, RemoteSttConfig};

use super::listen::Utterance;

#[derive(Debug, thiserror::Error)]
pub enum RecognizeError {
    #[error("no api key configured")]
    MissingCredentials,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to encode audio: {0}")]
    Encode(#[from] hound::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    /// 0.0 ..= 1.0 when the backend reports it
    pub confidence: Option<f32>,
}

/// Which backend produced a transcript
#[derive(Debug, Clone, PartialEq)]
pub enum Recognition {
    Remote(Transcript),
    Local(Transcript),
    Nothing,
}

impl Recognition {
    pub fn transcript(&self) -> Option<&Transcript> {
        match self {
            Recognition::Remote(t) | Recognition::Local(t) => Some(t),
            Recognition::Nothing => None,
        }
    }
}

pub trait Recognizer: Send {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means the backend heard nothing it could transcribe
    fn recognize(
        &self,
        utterance: &Utterance,
        language: &str,
    ) -> Result<Option<Transcript>, RecognizeError>;
}

fn check_status(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, RecognizeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(RecognizeError::Status {
        status: status.as_u16(),
        body,
    })
}

// ============================================================================
// Google Cloud Speech (REST)
// ============================================================================

#[derive(serde::Deserialize, Default)]
struct GoogleResponse {
    #[serde(default)]
    results: Vec<GoogleResult>,
}

#[derive(serde::Deserialize)]
struct GoogleResult {
    #[serde(default)]
    alternatives: Vec<GoogleAlternative>,
}

#[derive(serde::Deserialize)]
struct GoogleAlternative {
    #[serde(default)]
    transcript: String,
    confidence: Option<f32>,
}

impl GoogleResponse {
    /// Best alternative of the first result
    fn best(self) -> Option<Transcript> {
        let alt = self.results.into_iter().next()?.alternatives.into_iter().next()?;
        let text = alt.transcript.trim().to_string();
        (!text.is_empty()).then_some(Transcript {
            text,
            confidence: alt.confidence,
        })
    }
}

pub struct GoogleSpeechRecognizer {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
    phrases: Vec<String>,
    boost: f32,
}

impl GoogleSpeechRecognizer {
    pub fn new(config: &RemoteSttConfig) -> Result<Self, RecognizeError> {
        let api_key = config
            .resolved_api_key()
            .ok_or(RecognizeError::MissingCredentials)?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
            phrases: config.phrases.clone(),
            boost: config.boost,
        })
    }

    /// Replace the phrase hints sent with every request
    pub fn with_phrases(mut self, phrases: Vec<String>, boost: f32) -> Self {
        self.phrases = phrases;
        self.boost = boost;
        self
    }

    fn request_body(&self, utterance: &Utterance, language: &str) -> serde_json::Value {
        let mut config = serde_json::json!({
            "encoding": "LINEAR16",
            "sampleRateHertz": utterance.sample_rate,
            "languageCode": language,
            "model": self.model,
            "enableAutomaticPunctuation": false,
        });
        if !self.phrases.is_empty() {
            config["speechContexts"] = serde_json::json!([{
                "phrases": self.phrases,
                "boost": self.boost,
            }]);
        }

        serde_json::json!({
            "config": config,
            "audio": { "content": BASE64.encode(utterance.pcm_bytes()) },
        })
    }
}

impl Recognizer for GoogleSpeechRecognizer {
    fn name(&self) -> &'static str {
        "google"
    }

    fn recognize(
        &self,
        utterance: &Utterance,
        language: &str,
    ) -> Result<Option<Transcript>, RecognizeError> {
        tracing::debug!(
            bytes = utterance.samples.len() * 2,
            language,
            "sending audio to google speech"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&self.request_body(utterance, language))
            .send()?;
        let parsed: GoogleResponse = check_status(response)?.json()?;
        Ok(parsed.best())
    }
}

// ============================================================================
// Local whisper server (OpenAI-compatible)
// ============================================================================

#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

pub struct WhisperServerRecognizer {
    client: reqwest::blocking::Client,
    url: String,
    model: String,
}

impl WhisperServerRecognizer {
    pub fn new(config: &LocalSttConfig) -> Result<Self, RecognizeError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/audio/transcriptions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Whisper wants ISO-639-1 ("pt"), not a locale ("pt-BR")
fn language_code(language: &str) -> &str {
    language.split(['-', '_']).next().unwrap_or(language)
}

impl Recognizer for WhisperServerRecognizer {
    fn name(&self) -> &'static str {
        "whisper"
    }

    fn recognize(
        &self,
        utterance: &Utterance,
        language: &str,
    ) -> Result<Option<Transcript>, RecognizeError> {
        let wav = utterance.to_wav()?;
        tracing::debug!(audio_bytes = wav.len(), url = %self.url, "starting local transcription");

        let part = reqwest::blocking::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")?;
        let form = reqwest::blocking::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("language", language_code(language).to_string())
            .text("response_format", "json");

        let response = self.client.post(&self.url).multipart(form).send()?;
        let parsed: WhisperResponse = check_status(response)?.json()?;

        let text = parsed.text.trim().to_string();
        Ok((!text.is_empty()).then_some(Transcript {
            text,
            confidence: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_google_best_alternative() {
        let json = r#"{"results":[{"alternatives":[
            {"transcript":" cubo ","confidence":0.92},
            {"transcript":"cuba"}
        ]}]}"#;
        let parsed: GoogleResponse = serde_json::from_str(json).unwrap();
        let t = parsed.best().unwrap();
        assert_eq!(t.text, "cubo");
        assert_eq!(t.confidence, Some(0.92));
    }

    #[test]
    fn test_google_empty_response() {
        let parsed: GoogleResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.best().is_none());
        let parsed: GoogleResponse =
            serde_json::from_str(r#"{"results":[{"alternatives":[{"transcript":""}]}]}"#).unwrap();
        assert!(parsed.best().is_none());
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let config = RemoteSttConfig::default();
        assert!(matches!(
            GoogleSpeechRecognizer::new(&config),
            Err(RecognizeError::MissingCredentials)
        ));
    }

    #[test]
    fn test_request_body_shape() {
        let config = RemoteSttConfig {
            api_key: Some("k".into()),
            ..RemoteSttConfig::default()
        };
        let recognizer = GoogleSpeechRecognizer::new(&config)
            .unwrap()
            .with_phrases(vec!["cubo".into()], 15.0);
        let utt = Utterance {
            samples: vec![1, -1],
            sample_rate: 16000,
        };
        let body = recognizer.request_body(&utt, "pt-BR");
        assert_eq!(body["config"]["encoding"], "LINEAR16");
        assert_eq!(body["config"]["sampleRateHertz"], 16000);
        assert_eq!(body["config"]["model"], "command_and_search");
        assert_eq!(body["config"]["speechContexts"][0]["phrases"][0], "cubo");
        assert_eq!(body["audio"]["content"], BASE64.encode([1u8, 0, 255, 255]));
    }

    #[test]
    fn test_language_code() {
        assert_eq!(language_code("pt-BR"), "pt");
        assert_eq!(language_code("en_US"), "en");
        assert_eq!(language_code("de"), "de");
    }

    #[test]
    fn test_whisper_url() {
        let config = LocalSttConfig {
            base_url: "http://localhost:9000/v1/".into(),
            ..LocalSttConfig::default()
        };
        let r = WhisperServerRecognizer::new(&config).unwrap();
        assert_eq!(r.url(), "http://localhost:9000/v1/audio/transcriptions");
    }
}
