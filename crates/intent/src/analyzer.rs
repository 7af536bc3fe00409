//! The intent analyzer — one classification call per inbound message.

use crate::normalize::{normalize, safe_load_json, truncate_with_ellipsis};
use kindred_core::error::ProviderError;
use kindred_core::intent::{IntentAnalysisResult, MAX_SHORT_EXPLANATION};
use kindred_core::provider::{PromptMessage, Provider, ProviderRequest, ProviderResponse};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Default number of recent turns shown to the classifier.
const DEFAULT_HISTORY_WINDOW: usize = 6;

/// Classifies one message against recent history and the persona summary.
///
/// Constructed once at process start and shared by reference; the underlying
/// provider client is the expensive part.
pub struct IntentAnalyzer {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    history_window: usize,
}

impl IntentAnalyzer {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }

    /// Set how many trailing history lines the classifier sees.
    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    /// Analyze one message. Never returns an error: any failure — network,
    /// timeout, unparseable output — collapses to a safe fallback report
    /// with confidence 0.0.
    pub async fn analyze(
        &self,
        user_message: &str,
        chat_history: &[String],
        persona_summary: &str,
    ) -> IntentAnalysisResult {
        info!(message_len = user_message.len(), "Analyzing message intent");

        match self
            .try_analyze(user_message, chat_history, persona_summary)
            .await
        {
            Ok(result) => {
                debug!(
                    intent = result.primary_intent.as_str(),
                    emotion = result.emotional_state.as_str(),
                    confidence = result.confidence,
                    "Intent analysis complete"
                );
                result
            }
            Err(e) => {
                error!(error = %e, "Intent analysis failed, using fallback");
                Self::fallback(&e)
            }
        }
    }

    async fn try_analyze(
        &self,
        user_message: &str,
        chat_history: &[String],
        persona_summary: &str,
    ) -> Result<IntentAnalysisResult, ProviderError> {
        let start = chat_history.len().saturating_sub(self.history_window);
        let formatted_history = if chat_history[start..].is_empty() {
            "(no prior history)".to_string()
        } else {
            chat_history[start..].join("\n")
        };

        let request = ProviderRequest {
            model: self.model.clone(),
            messages: vec![
                PromptMessage::system(Self::system_prompt(persona_summary)),
                PromptMessage::user(format!(
                    "Now, analyze the following real request:\nCHAT HISTORY:\n{formatted_history}\n\nLATEST MESSAGE:\n{user_message}"
                )),
            ],
            temperature: self.temperature,
            max_tokens: Some(512),
            stream: false,
        };

        let response = self.provider.complete(request).await?;
        let raw_text = response_text(&response);
        debug!(preview = %truncate_with_ellipsis(&raw_text, 200), "Raw classifier output");

        // No JSON at all: keep a trace of what the model said, default the rest.
        let parsed = safe_load_json(&raw_text).unwrap_or_else(|| {
            json!({
                "short_explanation": truncate_with_ellipsis(&raw_text, MAX_SHORT_EXPLANATION)
            })
        });

        Ok(normalize(&parsed))
    }

    fn system_prompt(persona_summary: &str) -> String {
        format!(
            r#"You are a top-tier psychologist and communication analyst. Your client is an AI companion with this persona: {persona_summary}.
Task: read the role-annotated chat history and produce a structured "user state report" for the latest user message. Output ONLY a JSON object with these fields, no prose:
- "primary_intent": one of "information_seeking", "problem_solving", "emotional_expression", "casual_chat", "suggestion_seeking"
- "secondary_intents": array of the same tokens (may be empty)
- "emotional_state": one of "joyful", "sad", "anxious", "angry", "surprised", "neutral"
- "emotional_intensity": integer 1-10
- "underlying_need": short phrase, max 100 characters
- "user_receptivity": one of "needs_validation_and_comfort", "seeks_logical_and_calm_explanation", "open_to_humor_and_lightheartedness", "desires_shared_joy_and_excitement"
- "confidence": number 0.0-1.0
- "short_explanation": max 60 characters
- "persona_hint": max 120 characters
- "reply_seed": max 120 characters

--- EXAMPLE ---
INPUT:
- CHAT HISTORY: [user] I have an interview tomorrow and I'm so nervous...
- LATEST MESSAGE: What if I mess it up and get rejected?

OUTPUT:
{{
    "primary_intent": "emotional_expression",
    "secondary_intents": ["suggestion_seeking"],
    "emotional_state": "anxious",
    "emotional_intensity": 8,
    "underlying_need": "seeks reassurance and a confidence boost",
    "user_receptivity": "needs_validation_and_comfort",
    "confidence": 0.9,
    "short_explanation": "strong interview anxiety, wants support",
    "persona_hint": "empathize with the anxiety first, then gently encourage with one or two practical tips",
    "reply_seed": "Feeling nervous is completely normal - it means you care about this."
}}
--- END OF EXAMPLE ---"#
        )
    }

    /// The safe fallback report: neutral everything, confidence 0.0 so the
    /// composer treats the analysis as unknown and the reply stays generic.
    fn fallback(err: &ProviderError) -> IntentAnalysisResult {
        let mut result = IntentAnalysisResult::neutral();
        result.confidence = 0.0;
        result.underlying_need = "unknown (analysis failed)".into();
        result.short_explanation = Some(truncate_with_ellipsis(
            &format!("analyzer failed: {err}"),
            MAX_SHORT_EXPLANATION,
        ));
        result.persona_hint = Some("Respond in the safest, most generic way.".into());
        result
    }
}

/// Coerce a provider response to raw text.
///
/// The payload should be in `message.content`, but endpoints differ in where
/// they put usable text when the primary field is empty. Fixed probe order:
/// content, then the metadata keys `text`/`content`/`message`/`data`
/// (stringifying non-strings), then a JSON dump of the metadata itself.
pub fn response_text(response: &ProviderResponse) -> String {
    if !response.message.content.trim().is_empty() {
        return response.message.content.clone();
    }

    for key in ["text", "content", "message", "data"] {
        if let Some(value) = response.metadata.get(key) {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if !text.trim().is_empty() {
                return text;
            }
        }
    }

    serde_json::to_string(&response.metadata).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kindred_core::intent::{EmotionalState, Intent};

    /// Mock provider returning a fixed raw completion.
    struct FixedProvider {
        output: String,
    }

    #[async_trait]
    impl Provider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                message: PromptMessage::assistant(self.output.clone()),
                usage: None,
                model: "mock".into(),
                metadata: serde_json::Map::new(),
            })
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl Provider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::Timeout("deadline exceeded".into()))
        }
    }

    fn analyzer(output: &str) -> IntentAnalyzer {
        IntentAnalyzer::new(
            Arc::new(FixedProvider {
                output: output.into(),
            }),
            "mock-model",
            0.1,
        )
    }

    #[tokio::test]
    async fn parses_well_formed_output() {
        let analyzer = analyzer(
            r#"{"primary_intent": "problem_solving", "emotional_state": "anxious",
                "emotional_intensity": 6, "underlying_need": "wants a plan",
                "user_receptivity": "seeks_logical_and_calm_explanation",
                "confidence": 0.8}"#,
        );

        let result = analyzer.analyze("help me fix this", &[], "a calm mentor").await;
        assert_eq!(result.primary_intent, Intent::ProblemSolving);
        assert_eq!(result.emotional_state, EmotionalState::Anxious);
        assert!((result.confidence - 0.8).abs() < 1e-6);
        assert!(result.is_valid());
    }

    #[tokio::test]
    async fn parses_json_wrapped_in_code_fence() {
        let analyzer = analyzer(
            "Here you go:\n```json\n{\"primary_intent\": \"information_seeking\", \"confidence\": 0.7}\n```",
        );

        let result = analyzer.analyze("what's the capital?", &[], "a librarian").await;
        assert_eq!(result.primary_intent, Intent::InformationSeeking);
        assert!(result.is_valid());
    }

    #[tokio::test]
    async fn non_json_output_still_yields_valid_report() {
        let analyzer = analyzer("I think the user is probably just chatting casually.");

        let result = analyzer.analyze("hey", &[], "a friend").await;
        assert!(result.is_valid());
        assert_eq!(result.primary_intent, Intent::CasualChat);
        // The raw text survives as the explanation
        assert!(result.short_explanation.is_some());
    }

    #[tokio::test]
    async fn empty_output_still_yields_valid_report() {
        let analyzer = analyzer("");
        let result = analyzer.analyze("hey", &[], "a friend").await;
        assert!(result.is_valid());
        assert_eq!(result.emotional_intensity, 3);
    }

    #[tokio::test]
    async fn provider_failure_yields_zero_confidence_fallback() {
        let analyzer = IntentAnalyzer::new(Arc::new(FailingProvider), "mock-model", 0.1);

        let result = analyzer.analyze("hello", &[], "a friend").await;
        assert!(result.is_valid());
        assert_eq!(result.confidence, 0.0);
        assert!(
            result
                .short_explanation
                .as_deref()
                .unwrap()
                .starts_with("analyzer failed")
        );
        assert!(result.persona_hint.is_some());
    }

    #[tokio::test]
    async fn history_is_bounded_to_window() {
        // The provider echoes nothing useful; this exercises the request path
        // with a long history without panicking.
        let analyzer = analyzer("{}").with_history_window(2);
        let history: Vec<String> = (0..50).map(|i| format!("[user] message {i}")).collect();
        let result = analyzer.analyze("latest", &history, "persona").await;
        assert!(result.is_valid());
    }

    #[test]
    fn response_text_prefers_message_content() {
        let response = ProviderResponse {
            message: PromptMessage::assistant("primary"),
            usage: None,
            model: "m".into(),
            metadata: serde_json::Map::new(),
        };
        assert_eq!(response_text(&response), "primary");
    }

    #[test]
    fn response_text_probes_metadata_in_order() {
        let mut metadata = serde_json::Map::new();
        metadata.insert("data".into(), serde_json::json!("from data"));
        metadata.insert("text".into(), serde_json::json!("from text"));

        let response = ProviderResponse {
            message: PromptMessage::assistant(""),
            usage: None,
            model: "m".into(),
            metadata,
        };
        // "text" wins over "data" regardless of map insertion order
        assert_eq!(response_text(&response), "from text");
    }

    #[test]
    fn response_text_stringifies_non_string_values() {
        let mut metadata = serde_json::Map::new();
        metadata.insert("content".into(), serde_json::json!({"nested": true}));

        let response = ProviderResponse {
            message: PromptMessage::assistant("   "),
            usage: None,
            model: "m".into(),
            metadata,
        };
        assert!(response_text(&response).contains("nested"));
    }
}
