//! Intent and emotion classification.
//!
//! One non-streaming LLM call per message produces a structured "user state
//! report" (`IntentAnalysisResult`). The model's output is treated as
//! untrusted text: JSON is recovered defensively, every field is normalized
//! to the schema, and any failure collapses to a safe neutral fallback. The
//! classifier never raises to its caller.

pub mod analyzer;
pub mod normalize;

pub use analyzer::IntentAnalyzer;
pub use normalize::{normalize, safe_load_json};
