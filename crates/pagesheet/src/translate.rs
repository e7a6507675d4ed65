//! Translation capability injected into the enricher.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::types::TranslateError;

/// Google Cloud Translation v2 REST endpoint.
pub const GOOGLE_TRANSLATE_ENDPOINT: &str = "https://translation.googleapis.com/language/translate/v2";

/// Translates free text into a target locale.
///
/// Implementations are treated as stateless per-call services and may be
/// shared across concurrent enrichment tasks.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target_locale: &str) -> Result<String, TranslateError>;
}

/// Google Cloud Translation (v2) adapter authenticated with an API key.
#[derive(Clone)]
pub struct GoogleTranslator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Deserialize)]
struct TranslateData {
    translations: Vec<Translation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Translation {
    translated_text: String,
}

impl GoogleTranslator {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_endpoint(api_key, GOOGLE_TRANSLATE_ENDPOINT)
    }

    /// Point the adapter at a different endpoint (proxies, tests).
    pub fn with_endpoint(api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(&self, text: &str, target_locale: &str) -> Result<String, TranslateError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&serde_json::json!({
                "q": text,
                "target": target_locale,
                "format": "text",
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(TranslateError::Status(resp.status().as_u16()));
        }

        let body: TranslateResponse = resp
            .json()
            .await
            .map_err(|e| TranslateError::Malformed(e.to_string()))?;

        body.data
            .translations
            .into_iter()
            .next()
            .map(|t| t.translated_text)
            .ok_or_else(|| TranslateError::Malformed("no translations returned".into()))
    }
}
