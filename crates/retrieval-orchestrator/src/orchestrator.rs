use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pulse_core::{
    GenerativeProvider, PulseError, PulseResult, RetrievalRequest, RetrievalResult, Schema,
};
use response_cache::{build_key, CacheStore};
use serde::Serialize;
use serde_json::Value;

use crate::citations;

/// Prompts quoted in diagnostics are cut to this many characters.
const PROMPT_LOG_LIMIT: usize = 200;

#[derive(Default)]
struct Counters {
    search_calls: AtomicU64,
    format_calls: AtomicU64,
    failures: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorStats {
    pub provider: String,
    pub search_calls: u64,
    pub format_calls: u64,
    pub failures: u64,
}

/// Cache-aside front for the generative provider.
///
/// `fetch` runs search then format, pairs list items with the search
/// citations and caches the outcome. Any failure along the way is logged and
/// comes back as an absent result; callers supply their own fallback.
#[derive(Clone)]
pub struct RetrievalOrchestrator {
    provider: Arc<dyn GenerativeProvider>,
    cache: CacheStore,
    counters: Arc<Counters>,
}

impl RetrievalOrchestrator {
    pub fn new(provider: Arc<dyn GenerativeProvider>, cache: CacheStore) -> Self {
        tracing::info!("Retrieval orchestrator using provider '{}'", provider.name());
        Self {
            provider,
            cache,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn provider_healthy(&self) -> bool {
        self.provider.health_check().await
    }

    pub fn stats(&self) -> OrchestratorStats {
        OrchestratorStats {
            provider: self.provider.name().to_string(),
            search_calls: self.counters.search_calls.load(Ordering::Relaxed),
            format_calls: self.counters.format_calls.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    pub fn cache_key(request: &RetrievalRequest) -> String {
        build_key(&request.operation, request.param_pairs())
    }

    pub async fn fetch(&self, request: &RetrievalRequest) -> RetrievalResult {
        let key = Self::cache_key(request);

        match self.cache.get::<RetrievalResult>(&key) {
            Ok(Some(cached)) => return cached,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Dropping unreadable cache entry {}: {}", key, e);
                self.cache.delete(&key);
            }
        }

        match self.search_and_format(request).await {
            Ok(Some(result)) => {
                if let Err(e) = self.cache.set(&key, &result, request.ttl_seconds) {
                    tracing::error!("Failed to cache {}: {}", key, e);
                }
                result
            }
            Ok(None) => RetrievalResult::absent(),
            Err(e) => {
                self.record_failure(request, &request.search_prompt, &e);
                RetrievalResult::absent()
            }
        }
    }

    /// Single schema-constrained call with no search phase. The format
    /// instruction is the whole prompt; results carry no citations.
    pub async fn fetch_structured(&self, request: &RetrievalRequest) -> RetrievalResult {
        let key = Self::cache_key(request);

        let outcome = self
            .cache
            .get_or_set(&key, request.ttl_seconds, || async {
                let data = self
                    .format(&request.format_instruction, &request.schema)
                    .await?;
                Ok::<_, PulseError>(RetrievalResult {
                    data: Some(data),
                    citations: Vec::new(),
                })
            })
            .await;

        match outcome {
            Ok(result) => result,
            Err(e) => {
                self.record_failure(request, &request.format_instruction, &e);
                RetrievalResult::absent()
            }
        }
    }

    async fn search_and_format(
        &self,
        request: &RetrievalRequest,
    ) -> PulseResult<Option<RetrievalResult>> {
        self.counters.search_calls.fetch_add(1, Ordering::Relaxed);
        let grounded = self.provider.search(&request.search_prompt).await?;

        if grounded.text.trim().is_empty() {
            tracing::warn!(
                operation = %request.operation,
                prompt = %truncate_prompt(&request.search_prompt),
                "Search step returned no text"
            );
            return Ok(None);
        }

        let prompt = format!(
            "{}\n\nInformation:\n---\n{}",
            request.format_instruction, grounded.text
        );
        let mut data = self.format(&prompt, &request.schema).await?;

        for target in &request.citation_targets {
            let linked = citations::reconcile(&mut data, target, &grounded.citations);
            tracing::debug!(
                "Linked {} items at {} against {} sources",
                linked,
                target.path.join("."),
                grounded.citations.len()
            );
        }

        Ok(Some(RetrievalResult {
            data: Some(data),
            citations: grounded.citations,
        }))
    }

    async fn format(&self, prompt: &str, schema: &Schema) -> PulseResult<Value> {
        self.counters.format_calls.fetch_add(1, Ordering::Relaxed);
        let raw = self.provider.format(prompt, schema).await?;
        parse_structured(&raw, schema)
    }

    fn record_failure(&self, request: &RetrievalRequest, prompt: &str, error: &PulseError) {
        self.counters.failures.fetch_add(1, Ordering::Relaxed);
        tracing::error!(
            operation = %request.operation,
            prompt = %truncate_prompt(prompt),
            "Retrieval failed: {}",
            error
        );
    }
}

/// Parse formatter output and check it against the schema.
pub fn parse_structured(raw: &str, schema: &Schema) -> PulseResult<Value> {
    let body = strip_code_fence(raw.trim());
    let value: Value = serde_json::from_str(body)
        .map_err(|e| PulseError::SchemaMismatch(format!("invalid JSON: {}", e)))?;
    schema
        .validate(&value)
        .map_err(|violation| PulseError::SchemaMismatch(violation.to_string()))?;
    Ok(value)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest).trim_start();
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Collapse whitespace and cut to `PROMPT_LOG_LIMIT` characters.
pub fn truncate_prompt(prompt: &str) -> String {
    let flat = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PROMPT_LOG_LIMIT {
        return flat;
    }
    let mut cut: String = flat.chars().take(PROMPT_LOG_LIMIT).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockProvider;
    use pulse_core::{Citation, CitationTarget};
    use response_cache::CacheConfig;
    use serde_json::json;
    use std::time::Duration;

    fn headline_schema() -> Schema {
        Schema::object(vec![(
            "news",
            Schema::array(Schema::object(vec![("headline", Schema::string())])),
        )])
    }

    fn news_request() -> RetrievalRequest {
        RetrievalRequest::new("news", headline_schema())
            .param("category", "Mercados")
            .ttl(300)
            .search_prompt("find the news")
            .format_instruction("format the news")
            .cite(CitationTarget::by_label("news", "headline", "url"))
    }

    fn orchestrator(provider: Arc<MockProvider>) -> RetrievalOrchestrator {
        RetrievalOrchestrator::new(provider, CacheStore::with_defaults())
    }

    #[tokio::test]
    async fn test_cold_fetch_calls_each_phase_once_then_serves_cache() {
        let provider = Arc::new(MockProvider::new(
            "Fed raises rates today.",
            r#"{"news":[{"headline":"Fed raises rates"}]}"#,
        ));
        let orchestrator = orchestrator(provider.clone());

        let first = orchestrator.fetch(&news_request()).await;
        assert!(!first.is_absent());
        assert_eq!(provider.search_calls(), 1);
        assert_eq!(provider.format_calls(), 1);

        let second = orchestrator.fetch(&news_request()).await;
        assert_eq!(first, second);
        assert_eq!(provider.search_calls(), 1);
        assert_eq!(provider.format_calls(), 1);
    }

    #[tokio::test]
    async fn test_param_order_shares_cache_entry() {
        let provider = Arc::new(MockProvider::new("text", r#"{"news":[]}"#));
        let orchestrator = orchestrator(provider.clone());

        let a = RetrievalRequest::new("stock", headline_schema())
            .param("ticker", "AAPL")
            .param("region", "US")
            .search_prompt("p");
        let b = RetrievalRequest::new("stock", headline_schema())
            .param("region", "US")
            .param("ticker", "AAPL")
            .search_prompt("p");

        orchestrator.fetch(&a).await;
        orchestrator.fetch(&b).await;
        assert_eq!(provider.search_calls(), 1);
    }

    #[tokio::test]
    async fn test_format_prompt_appends_search_text() {
        let provider = Arc::new(MockProvider::new("the facts", r#"{"news":[]}"#));
        let orchestrator = orchestrator(provider.clone());

        orchestrator.fetch(&news_request()).await;
        assert_eq!(
            provider.last_format_prompt().as_deref(),
            Some("format the news\n\nInformation:\n---\nthe facts")
        );
    }

    #[tokio::test]
    async fn test_malformed_json_is_absent_and_not_cached() {
        let provider = Arc::new(MockProvider::new("text", "{not json"));
        let orchestrator = orchestrator(provider.clone());

        let result = orchestrator.fetch(&news_request()).await;
        assert!(result.is_absent());
        assert!(result.citations.is_empty());
        let key = RetrievalOrchestrator::cache_key(&news_request());
        assert!(orchestrator.cache().get_value(&key).is_none());
        assert_eq!(orchestrator.stats().failures, 1);

        orchestrator.fetch(&news_request()).await;
        assert_eq!(provider.format_calls(), 2);
    }

    #[tokio::test]
    async fn test_schema_violation_is_absent() {
        let provider = Arc::new(MockProvider::new("text", r#"{"news":[{"title":"x"}]}"#));
        let orchestrator = orchestrator(provider);

        assert!(orchestrator.fetch(&news_request()).await.is_absent());
        assert!(orchestrator.cache().is_empty());
    }

    #[tokio::test]
    async fn test_empty_search_skips_format_and_cache() {
        let provider = Arc::new(MockProvider::new("   ", r#"{"news":[]}"#));
        let orchestrator = orchestrator(provider.clone());

        let result = orchestrator.fetch(&news_request()).await;
        assert!(result.is_absent());
        assert_eq!(provider.format_calls(), 0);
        assert!(orchestrator.cache().is_empty());
        assert_eq!(orchestrator.stats().failures, 0);
    }

    #[tokio::test]
    async fn test_provider_error_is_absent() {
        let provider = Arc::new(MockProvider::new("text", r#"{"news":[]}"#).failing_search());
        let orchestrator = orchestrator(provider.clone());

        let result = orchestrator.fetch(&news_request()).await;
        assert!(result.is_absent());
        assert_eq!(provider.format_calls(), 0);
        assert_eq!(orchestrator.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_citations_are_reconciled_and_returned() {
        let provider = Arc::new(
            MockProvider::new(
                "text",
                r#"{"news":[{"headline":"Fed raises rates"},{"headline":"Oil slips"}]}"#,
            )
            .with_citations(vec![
                Citation::new("Tech stocks rally on earnings", "https://a.test"),
                Citation::new("Fed raises interest rates again", "https://b.test"),
            ]),
        );
        let orchestrator = orchestrator(provider);

        let result = orchestrator.fetch(&news_request()).await;
        let data = result.data.unwrap();
        assert_eq!(data["news"][0]["url"], "https://b.test");
        // No title match: same index
        assert_eq!(data["news"][1]["url"], "https://b.test");
        assert_eq!(result.citations.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let provider = Arc::new(MockProvider::new("text", r#"{"news":[]}"#));
        let orchestrator = orchestrator(provider.clone());
        let request = news_request().ttl(180);

        orchestrator.fetch(&request).await;
        tokio::time::advance(Duration::from_secs(179)).await;
        orchestrator.fetch(&request).await;
        assert_eq!(provider.search_calls(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        orchestrator.fetch(&request).await;
        assert_eq!(provider.search_calls(), 2);
    }

    #[tokio::test]
    async fn test_fifteen_calls_one_upstream_pair() {
        let provider = Arc::new(MockProvider::new(
            "AAPL trades at 190.",
            r#"{"news":[{"headline":"Apple steady"}]}"#,
        ));
        let cache = CacheStore::new(CacheConfig::default());
        let orchestrator = RetrievalOrchestrator::new(provider.clone(), cache.clone());
        let request = RetrievalRequest::new("stock-data", headline_schema())
            .param("ticker", "AAPL")
            .ttl(180)
            .search_prompt("price of AAPL");

        for _ in 0..15 {
            assert!(!orchestrator.fetch(&request).await.is_absent());
        }
        assert_eq!(provider.search_calls(), 1);
        assert_eq!(provider.format_calls(), 1);
        assert_eq!(cache.stats().hits, 14);
    }

    #[tokio::test]
    async fn test_fetch_structured_skips_search() {
        let provider = Arc::new(MockProvider::new("unused", r#"{"analysis":"Stay the course."}"#));
        let orchestrator = orchestrator(provider.clone());
        let request = RetrievalRequest::new(
            "retirement",
            Schema::object(vec![("analysis", Schema::string())]),
        )
        .param("currentAge", "30")
        .format_instruction("advise");

        let first = orchestrator.fetch_structured(&request).await;
        let second = orchestrator.fetch_structured(&request).await;
        assert_eq!(first.data.unwrap()["analysis"], json!("Stay the course."));
        assert_eq!(second.citations, Vec::<Citation>::new());
        assert_eq!(provider.search_calls(), 0);
        assert_eq!(provider.format_calls(), 1);
        assert_eq!(provider.last_format_prompt().as_deref(), Some("advise"));
    }

    #[tokio::test]
    async fn test_fetch_structured_failure_not_cached() {
        let provider = Arc::new(MockProvider::new("unused", "[]"));
        let orchestrator = orchestrator(provider.clone());
        let request = RetrievalRequest::new(
            "backtest",
            Schema::object(vec![("aiPrediction", Schema::string())]),
        )
        .format_instruction("predict");

        assert!(orchestrator.fetch_structured(&request).await.is_absent());
        assert!(orchestrator.fetch_structured(&request).await.is_absent());
        assert_eq!(provider.format_calls(), 2);
    }

    #[test]
    fn test_parse_structured_strips_code_fence() {
        let schema = Schema::object(vec![("a", Schema::number())]);
        let value = parse_structured("```json\n{\"a\": 1}\n```", &schema).unwrap();
        assert_eq!(value, json!({"a": 1}));
        assert!(parse_structured("```\n{\"a\": 2}```", &schema).is_ok());
    }

    #[test]
    fn test_truncate_prompt() {
        assert_eq!(truncate_prompt("  a \n  b  "), "a b");
        let long = "x".repeat(500);
        let cut = truncate_prompt(&long);
        assert_eq!(cut.chars().count(), PROMPT_LOG_LIMIT + 3);
        assert!(cut.ends_with("..."));
    }
}
