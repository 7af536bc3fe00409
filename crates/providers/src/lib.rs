//! LLM provider implementations for Kindred.
//!
//! One implementation covers the vast majority of endpoints: the
//! OpenAI-compatible chat-completions API. Generation, classification, and
//! embeddings all go through the same provider instance, constructed once at
//! process start and shared by `Arc`.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use kindred_core::Provider;
use std::sync::Arc;

/// Build the process-wide provider from configuration.
pub fn build_from_config(config: &kindred_config::AppConfig) -> Arc<dyn Provider> {
    let api_key = config.llm.api_key.clone().unwrap_or_default();
    Arc::new(OpenAiCompatProvider::new(
        "openai-compat",
        config.llm.base_url.clone(),
        api_key,
    ))
}
