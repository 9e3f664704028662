use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TranslatorConfig;
use crate::sanitize::truncate_body;
use crate::translation::{TranslateError, Translator};

/// HTTP client for a LibreTranslate-compatible translation service.
pub struct TranslationClient {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    max_chunk_chars: usize,
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: String,
}

/// A language offered by the translation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub code: String,
    pub name: String,
}

impl TranslationClient {
    pub fn new(
        config: &TranslatorConfig,
        api_key: Option<SecretString>,
    ) -> Result<Self, TranslateError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.timeout())
            // Each worker drives its own runtime; a pooled connection would
            // stay bound to the runtime that opened it.
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| TranslateError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            max_chunk_chars: config.max_chunk_chars.max(1),
        })
    }

    /// Lists the languages supported by the remote service.
    pub async fn languages(&self) -> Result<Vec<Language>, TranslateError> {
        let url = format!("{}/languages", self.base_url);
        let response = self.client.get(&url).send().await.map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranslateError::Service {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        response.json().await.map_err(|e| TranslateError::Service {
            status: status.as_u16(),
            body: format!("malformed languages response: {}", e),
        })
    }

    async fn translate_chunk(&self, text: &str, target: &str) -> Result<String, TranslateError> {
        let url = format!("{}/translate", self.base_url);
        let request = TranslateRequest {
            q: text,
            source: "auto",
            target,
            format: "text",
            api_key: self.api_key.as_ref().map(|k| k.expose_secret()),
        };

        debug!(target_language = target, chars = text.len(), "Calling translation service");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranslateError::Service {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let parsed: TranslateResponse =
            response.json().await.map_err(|e| TranslateError::Service {
                status: status.as_u16(),
                body: format!("malformed translation response: {}", e),
            })?;

        Ok(parsed.translated_text)
    }
}

#[async_trait]
impl Translator for TranslationClient {
    async fn translate(&self, text: &str, target_language: &str) -> Result<String, TranslateError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        if target_language.trim().is_empty() {
            return Err(TranslateError::Request(
                "target language must not be empty".to_string(),
            ));
        }

        let mut translated = Vec::new();
        for chunk in split_into_chunks(text, self.max_chunk_chars) {
            if chunk.trim().is_empty() {
                translated.push(chunk);
            } else {
                translated.push(self.translate_chunk(&chunk, target_language).await?);
            }
        }

        Ok(translated.join("\n"))
    }
}

/// Maps a transport failure to the error kind callers base retries on.
fn classify(error: reqwest::Error) -> TranslateError {
    if error.is_builder() {
        TranslateError::Request(error.to_string())
    } else {
        TranslateError::Unavailable(error.to_string())
    }
}

/// Groups lines into chunks of at most `max_chars` characters. Chunks joined
/// with `\n` give back the input, so paragraph boundaries survive. A single
/// line longer than `max_chars` becomes a chunk of its own.
fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;
    let mut has_line = false;

    for line in text.split('\n') {
        let line_chars = line.chars().count();
        if has_line && current_chars + 1 + line_chars > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_chars = 0;
            has_line = false;
        }
        if has_line {
            current.push('\n');
            current_chars += 1;
        }
        current.push_str(line);
        current_chars += line_chars;
        has_line = true;
    }

    chunks.push(current);
    chunks
}
