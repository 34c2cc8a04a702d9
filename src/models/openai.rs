use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::error::CorpusError;
use crate::models::{CompletionBackend, CompletionRequest};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";

#[derive(Clone, Debug)]
pub struct OpenAiSettings {
    pub base_url: String,
    pub api_key: String,
    /// `None` waits for the endpoint indefinitely.
    pub timeout: Option<Duration>,
}

impl OpenAiSettings {
    /// Read the key from `api_key_env`; a missing or blank key is a configuration error.
    /// The base URL comes from `base_url`, then `OPENAI_BASE_URL`, then the public endpoint.
    pub fn from_env(
        api_key_env: &str,
        base_url: Option<&str>,
        timeout_secs: Option<u64>,
    ) -> Result<Self, CorpusError> {
        let api_key = std::env::var(api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| CorpusError::config(format!("{api_key_env} is not set")))?;
        let base_url = base_url
            .map(str::to_string)
            .or_else(|| std::env::var(BASE_URL_ENV).ok())
            .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string());
        Ok(Self {
            base_url: normalize_base_url(&base_url),
            api_key,
            timeout: timeout_secs.filter(|s| *s > 0).map(Duration::from_secs),
        })
    }
}

/// Blocking client for an OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct OpenAiBackend {
    client: reqwest::blocking::Client,
    url: String,
    api_key: String,
}

impl OpenAiBackend {
    pub fn new(settings: OpenAiSettings) -> Result<Self, CorpusError> {
        // reqwest's blocking client defaults to a 30s timeout; `None` must clear it.
        let client = reqwest::blocking::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| CorpusError::config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            url: format!("{}/v1/chat/completions", settings.base_url),
            api_key: settings.api_key,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

pub(crate) fn request_body(request: &CompletionRequest) -> serde_json::Value {
    let mut body = json!({
        "model": request.model,
        "messages": [
            {"role": "system", "content": request.system},
            {"role": "user", "content": request.prompt},
        ],
        "temperature": request.temperature.clamp(0.0, 1.0),
        "max_tokens": request.max_tokens,
    });
    if request.json_mode {
        body["response_format"] = json!({"type": "json_object"});
    }
    body
}

impl CompletionBackend for OpenAiBackend {
    fn complete(&mut self, request: &CompletionRequest) -> Result<String, CorpusError> {
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request_body(request))
            .send()
            .map_err(|e| CorpusError::transport(format!("failed to reach {}: {e}", self.url)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().unwrap_or_default();
            return Err(CorpusError::transport(format!("http error {status}: {text}")));
        }

        let parsed: ChatResponse = resp
            .json()
            .map_err(|e| CorpusError::transport(format!("invalid response body: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CorpusError::transport("response has no message content"))
    }
}

fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix("/v1").unwrap_or(trimmed);
    if trimmed.is_empty() {
        DEFAULT_OPENAI_BASE_URL.to_string()
    } else {
        trimmed.to_string()
    }
}
