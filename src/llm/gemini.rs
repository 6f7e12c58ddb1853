use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::config::Settings;
use crate::core::errors::ApiError;

use super::provider::{ChatTurn, EmbeddingProvider, GenerativeProvider, Part};

/// Gemini REST client implementing both the generative and the embedding
/// capability.
#[derive(Clone)]
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    embedding_model: String,
}

impl GeminiProvider {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: Client::new(),
            api_key: settings.gemini_api_key.clone(),
            base_url: settings.gemini_base_url.trim_end_matches('/').to_string(),
            model: settings.gemini_model.clone(),
            embedding_model: settings.gemini_embedding_model.clone(),
        }
    }

    fn turn_to_value(turn: &ChatTurn) -> Value {
        json!({
            "role": turn.role,
            "parts": [{ "text": turn.text }],
        })
    }

    fn part_to_value(part: &Part) -> Value {
        match part {
            Part::Text(text) => json!({ "text": text }),
            Part::Inline { mime_type, data } => json!({
                "inline_data": {
                    "mime_type": mime_type,
                    "data": BASE64.encode(data),
                }
            }),
        }
    }

    async fn generate_content(&self, contents: Value) -> Result<Value, ApiError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let res = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({ "contents": contents }))
            .send()
            .await
            .map_err(|e| ApiError::GenerationFailed(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::GenerationFailed(format!(
                "provider returned {}: {}",
                status, text
            )));
        }

        res.json()
            .await
            .map_err(|e| ApiError::GenerationFailed(e.to_string()))
    }

    /// Text of the first candidate's first part, if any.
    fn first_text(payload: &Value) -> Option<String> {
        payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
    }
}

#[async_trait]
impl GenerativeProvider for GeminiProvider {
    async fn reply(
        &self,
        history: &[ChatTurn],
        message: &ChatTurn,
    ) -> Result<Option<String>, ApiError> {
        let contents: Vec<Value> = history
            .iter()
            .chain(std::iter::once(message))
            .map(Self::turn_to_value)
            .collect();

        let payload = self.generate_content(Value::Array(contents)).await?;
        Ok(Self::first_text(&payload))
    }

    async fn generate(&self, parts: &[Part]) -> Result<String, ApiError> {
        let parts: Vec<Value> = parts.iter().map(Self::part_to_value).collect();
        let contents = json!([{ "role": "user", "parts": parts }]);

        let payload = self.generate_content(contents).await?;
        Self::first_text(&payload)
            .ok_or_else(|| ApiError::GenerationFailed("model returned no text part".to_string()))
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        let url = format!(
            "{}/models/{}:embedContent",
            self.base_url, self.embedding_model
        );

        let res = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({
                "content": { "parts": [{ "text": text }] }
            }))
            .send()
            .await
            .map_err(|e| ApiError::EmbeddingUnavailable(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::EmbeddingUnavailable(format!(
                "provider returned {}: {}",
                status, text
            )));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| ApiError::EmbeddingUnavailable(e.to_string()))?;

        let values: Vec<f32> = payload["embedding"]["values"]
            .as_array()
            .map(|vals| {
                vals.iter()
                    .filter_map(|v| v.as_f64().map(|f| f as f32))
                    .collect()
            })
            .unwrap_or_default();

        if values.is_empty() {
            return Err(ApiError::EmbeddingUnavailable(
                "provider returned no predictions".to_string(),
            ));
        }

        Ok(values)
    }
}
