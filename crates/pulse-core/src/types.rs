use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::Schema;

/// Link written into list items that could not be paired with any source.
pub const CITATION_PLACEHOLDER: &str = "#";

/// A grounding source returned alongside generated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub uri: String,
}

impl Citation {
    pub fn new(title: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            uri: uri.into(),
        }
    }
}

/// Endpoint cost class used for rate limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateTier {
    Default,
    Ai,
    Expensive,
}

impl RateTier {
    pub const ALL: [RateTier; 3] = [RateTier::Default, RateTier::Ai, RateTier::Expensive];

    pub fn as_str(&self) -> &'static str {
        match self {
            RateTier::Default => "default",
            RateTier::Ai => "ai",
            RateTier::Expensive => "expensive",
        }
    }

    /// Machine-readable rejection code, distinct per tier.
    pub fn rejection_reason(&self) -> &'static str {
        match self {
            RateTier::Default => "rate_limit_default",
            RateTier::Ai => "rate_limit_ai",
            RateTier::Expensive => "rate_limit_expensive",
        }
    }

    /// Human-readable rejection message.
    pub fn rejection_message(&self) -> &'static str {
        match self {
            RateTier::Default => "Too many requests from this IP, please try again later.",
            RateTier::Ai => "Too many AI analysis requests. Please wait before making more requests.",
            RateTier::Expensive => "Rate limit exceeded for expensive operations. Please try again later.",
        }
    }
}

impl std::fmt::Display for RateTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a list item is paired with a citation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CitationMatch {
    /// Match on the text of `field`, falling back to the item's position.
    Label { field: String },
    /// Assign citations strictly in order.
    Positional,
}

/// A list inside the formatted payload whose items receive a citation link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationTarget {
    /// Object keys leading to the list. Arrays met along the way are flattened,
    /// so `eventCategories.events` addresses every event of every category.
    pub path: Vec<String>,
    /// Field the chosen link is written to.
    pub link_field: String,
    pub strategy: CitationMatch,
}

impl CitationTarget {
    pub fn by_label(path: &str, label_field: &str, link_field: &str) -> Self {
        Self {
            path: split_path(path),
            link_field: link_field.to_string(),
            strategy: CitationMatch::Label {
                field: label_field.to_string(),
            },
        }
    }

    pub fn positional(path: &str, link_field: &str) -> Self {
        Self {
            path: split_path(path),
            link_field: link_field.to_string(),
            strategy: CitationMatch::Positional,
        }
    }
}

fn split_path(path: &str) -> Vec<String> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// One orchestrated retrieval. Built per call and never persisted.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    /// Fixed name of the API operation, e.g. `stock` or `sentiment`.
    pub operation: String,
    /// Cache-key parameters, in whatever order the caller assembled them.
    pub params: Vec<(String, String)>,
    /// Zero means the cache default.
    pub ttl_seconds: u64,
    pub search_prompt: String,
    pub format_instruction: String,
    pub schema: Schema,
    pub citation_targets: Vec<CitationTarget>,
}

impl RetrievalRequest {
    pub fn new(operation: impl Into<String>, schema: Schema) -> Self {
        Self {
            operation: operation.into(),
            params: Vec::new(),
            ttl_seconds: 0,
            search_prompt: String::new(),
            format_instruction: String::new(),
            schema,
            citation_targets: Vec::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn ttl(mut self, seconds: u64) -> Self {
        self.ttl_seconds = seconds;
        self
    }

    pub fn search_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.search_prompt = prompt.into();
        self
    }

    pub fn format_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.format_instruction = instruction.into();
        self
    }

    pub fn cite(mut self, target: CitationTarget) -> Self {
        self.citation_targets.push(target);
        self
    }

    pub fn param_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Outcome of a retrieval. `data` is `None` whenever any phase failed; the
/// caller decides what to show instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub data: Option<serde_json::Value>,
    pub citations: Vec<Citation>,
}

impl RetrievalResult {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn is_absent(&self) -> bool {
        self.data.is_none()
    }

    /// Deserialize the payload into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.data
            .as_ref()
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
    }
}

/// A completed request as seen by the request monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub endpoint: String,
    pub status_code: u16,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub client_identity: String,
}

impl MetricSample {
    pub fn new(
        endpoint: impl Into<String>,
        status_code: u16,
        duration_ms: u64,
        client_identity: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            status_code,
            duration_ms,
            timestamp: Utc::now(),
            client_identity: client_identity.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status_code >= 400
    }
}
