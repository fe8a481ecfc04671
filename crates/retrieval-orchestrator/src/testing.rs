use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use pulse_core::{Citation, GenerativeProvider, GroundedText, ProviderError, Schema};

/// Scripted provider that counts calls.
pub struct MockProvider {
    search_text: String,
    format_text: String,
    citations: Vec<Citation>,
    fail_search: bool,
    search_calls: AtomicUsize,
    format_calls: AtomicUsize,
    last_format_prompt: Mutex<Option<String>>,
}

impl MockProvider {
    pub fn new(search_text: &str, format_text: &str) -> Self {
        Self {
            search_text: search_text.to_string(),
            format_text: format_text.to_string(),
            citations: Vec::new(),
            fail_search: false,
            search_calls: AtomicUsize::new(0),
            format_calls: AtomicUsize::new(0),
            last_format_prompt: Mutex::new(None),
        }
    }

    pub fn with_citations(mut self, citations: Vec<Citation>) -> Self {
        self.citations = citations;
        self
    }

    pub fn failing_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn format_calls(&self) -> usize {
        self.format_calls.load(Ordering::SeqCst)
    }

    pub fn last_format_prompt(&self) -> Option<String> {
        self.last_format_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeProvider for MockProvider {
    async fn search(&self, _prompt: &str) -> Result<GroundedText, ProviderError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_search {
            return Err(ProviderError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(GroundedText {
            text: self.search_text.clone(),
            citations: self.citations.clone(),
        })
    }

    async fn format(&self, prompt: &str, _schema: &Schema) -> Result<String, ProviderError> {
        self.format_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_format_prompt.lock().unwrap() = Some(prompt.to_string());
        Ok(self.format_text.clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
