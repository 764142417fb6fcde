//! Client for the external AI translation API.
//!
//! Optional: configured with `TRANSLATE_API_URL` / `TRANSLATE_API_KEY`.
//! The API takes a batch of texts and a target language and must return one
//! translation per input, in order.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AppConfig;

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("translation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("translation API returned {got} items for {want} inputs")]
    CountMismatch { want: usize, got: usize },
}

#[derive(Serialize)]
struct TranslateBody<'a> {
    texts: &'a [String],
    target_language: &'a str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    translations: Vec<String>,
}

#[derive(Clone)]
pub struct Translator {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl Translator {
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        let endpoint = config.translate_api_url.clone()?;
        let api_key = config.translate_api_key.clone()?;
        Some(Self {
            http: reqwest::Client::new(),
            endpoint,
            api_key,
        })
    }

    pub async fn translate(
        &self,
        texts: &[String],
        target_language: &str,
    ) -> Result<Vec<String>, TranslateError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&TranslateBody {
                texts,
                target_language,
            })
            .send()
            .await?
            .error_for_status()?;
        let body: TranslateResponse = response.json().await?;
        if body.translations.len() != texts.len() {
            return Err(TranslateError::CountMismatch {
                want: texts.len(),
                got: body.translations.len(),
            });
        }
        Ok(body.translations)
    }
}
