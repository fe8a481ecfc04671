use async_trait::async_trait;

use crate::{Citation, ProviderError, Schema};

/// Free text returned by a grounded search call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroundedText {
    pub text: String,
    /// Sources in the order the provider reported them.
    pub citations: Vec<Citation>,
}

/// The two generation capabilities the orchestrator consumes.
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    /// Generate free text grounded with web search. An empty `text` means the
    /// provider had nothing usable to say.
    async fn search(&self, prompt: &str) -> Result<GroundedText, ProviderError>;

    /// Generate JSON constrained to `schema`. Returns the raw response text.
    async fn format(&self, prompt: &str, schema: &Schema) -> Result<String, ProviderError>;

    /// Cheap reachability check used by readiness endpoints.
    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str;
}
