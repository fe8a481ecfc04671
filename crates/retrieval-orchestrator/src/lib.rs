//! Grounded retrieval for market content.
//!
//! [`RetrievalOrchestrator`] runs the cache-aside search/format pipeline over
//! any [`pulse_core::GenerativeProvider`]; [`MarketInsights`] maps each API
//! operation onto one retrieval.

pub mod citations;
pub mod insights;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod schemas;

#[cfg(test)]
mod testing;

pub use insights::{image_url, MarketInsights};
pub use models::*;
pub use orchestrator::{parse_structured, truncate_prompt, OrchestratorStats, RetrievalOrchestrator};
