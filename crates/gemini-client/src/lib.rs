pub mod models;

pub use models::{GenerateContentRequest, GenerateContentResponse};

use async_trait::async_trait;
use pulse_core::{GenerativeProvider, GroundedText, ProviderError, Schema};
use reqwest::Client;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
/// Upper bound on error-body text kept in `ProviderError::Status`.
const MAX_ERROR_BODY: usize = 500;

/// Configuration for the Gemini REST client
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("GEMINI_API_KEY").unwrap_or_default(),
            model: std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            base_url: std::env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            timeout: Duration::from_secs(60),
        }
    }
}

/// `GenerativeProvider` backed by the Gemini `generateContent` API.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    /// Build the HTTP client. Fails rather than fall back to a client
    /// without the configured timeout.
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn with_defaults() -> Result<Self, ProviderError> {
        Self::new(GeminiConfig::default())
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn model_url(&self) -> String {
        format!(
            "{}/models/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn map_transport_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            let secs = self.config.timeout.as_secs();
            tracing::error!("Gemini request timed out after {}s", secs);
            ProviderError::Timeout(secs)
        } else {
            ProviderError::Request(e.to_string())
        }
    }

    /// POST a `generateContent` call and decode the response envelope.
    pub async fn generate(
        &self,
        body: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, ProviderError> {
        let response = self
            .client
            .post(format!("{}:generateContent", self.model_url()))
            .header("x-goog-api-key", &self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let mut text = response.text().await.unwrap_or_default();
            if text.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
            }
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    self.map_transport_error(e)
                } else {
                    ProviderError::InvalidResponse(e.to_string())
                }
            })
    }
}

#[async_trait]
impl GenerativeProvider for GeminiClient {
    async fn search(&self, prompt: &str) -> Result<GroundedText, ProviderError> {
        let response = self.generate(&GenerateContentRequest::grounded(prompt)).await?;
        let grounded = GroundedText {
            text: response.text(),
            citations: response.citations(),
        };
        tracing::debug!(
            "Gemini search returned {} chars, {} sources",
            grounded.text.len(),
            grounded.citations.len()
        );
        Ok(grounded)
    }

    async fn format(&self, prompt: &str, schema: &Schema) -> Result<String, ProviderError> {
        let response = self
            .generate(&GenerateContentRequest::structured(prompt, schema.to_json()))
            .await?;
        let text = response.text();
        if text.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(text)
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(self.model_url())
            .header("x-goog-api-key", &self.config.api_key)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::warn!("Gemini health check failed: {}", e);
                false
            }
        }
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
