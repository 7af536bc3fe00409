//! Deterministic layered prompt assembly.
//!
//! Layer order in the system prompt:
//! 1. background knowledge (when retrieval found anything) — takes
//!    precedence over the persona and pins the answer to the material,
//! 2. persona instructions + example dialogue,
//! 3. strategy directive derived from the intent analysis — either the full
//!    user-state report, or a clarification directive when confidence falls
//!    below the gate.
//!
//! Pure code: same inputs, same prompt. No I/O, no clock, no randomness.

use kindred_core::companion::Companion;
use kindred_core::intent::IntentAnalysisResult;
use kindred_core::message::{Role, Turn};
use kindred_core::provider::PromptMessage;

/// A fully assembled prompt, ready for a chat-completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt {
    /// The layered system prompt.
    pub system: String,

    /// Prior turns, oldest first.
    pub history: Vec<PromptMessage>,

    /// The latest user message.
    pub user_message: String,
}

impl ComposedPrompt {
    /// Flatten into the message sequence a provider expects.
    pub fn into_messages(self) -> Vec<PromptMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(PromptMessage::system(self.system));
        messages.extend(self.history);
        messages.push(PromptMessage::user(self.user_message));
        messages
    }
}

/// Assemble the prompt for one turn.
pub fn compose(
    companion: &Companion,
    knowledge: &[String],
    analysis: &IntentAnalysisResult,
    confidence_gate: f32,
    history: &[Turn],
    user_message: &str,
) -> ComposedPrompt {
    let mut system = String::new();

    if !knowledge.is_empty() {
        system.push_str(
            "Answer the user's question based ONLY on the following background knowledge. \
             If the answer is not in the knowledge, say you don't know. \
             Do not invent facts outside it.\n\
             ---BACKGROUND KNOWLEDGE---\n",
        );
        system.push_str(&knowledge.join("\n\n"));
        system.push_str("\n---END BACKGROUND KNOWLEDGE---\n\nYour core instructions are:\n");
    }

    system.push_str(&companion.instructions);
    system.push_str("\n\nHere is an example of how you should talk:\n");
    system.push_str(&companion.seed);
    system.push_str("\n\n");
    system.push_str(&strategy_directive(analysis, confidence_gate));

    let history_messages = history
        .iter()
        .map(|turn| match turn.role {
            Role::User => PromptMessage::user(&turn.content),
            Role::Assistant => PromptMessage::assistant(&turn.content),
        })
        .collect();

    ComposedPrompt {
        system,
        history: history_messages,
        user_message: user_message.to_string(),
    }
}

/// The analysis-driven strategy layer.
fn strategy_directive(analysis: &IntentAnalysisResult, confidence_gate: f32) -> String {
    if analysis.confidence < confidence_gate {
        return format!(
            "The analysis of this message is low-confidence ({:.2}). Do not guess at the \
             user's deeper intent. Stay in persona and gently ask a clarifying question \
             before attempting a direct answer.",
            analysis.confidence
        );
    }

    let mut directive = String::from("--- USER STATE REPORT ---\n");
    directive.push_str(&format!(
        "Primary intent: {}\n",
        analysis.primary_intent.as_str()
    ));
    if !analysis.secondary_intents.is_empty() {
        let tokens: Vec<&str> = analysis
            .secondary_intents
            .iter()
            .map(|i| i.as_str())
            .collect();
        directive.push_str(&format!("Secondary intents: {}\n", tokens.join(", ")));
    }
    directive.push_str(&format!(
        "Emotional state: {} (intensity {}/10)\n",
        analysis.emotional_state.as_str(),
        analysis.emotional_intensity
    ));
    directive.push_str(&format!("Underlying need: {}\n", analysis.underlying_need));
    directive.push_str(&format!(
        "Most receptive to: {}\n",
        analysis.user_receptivity.as_str()
    ));
    if let Some(hint) = &analysis.persona_hint {
        directive.push_str(&format!("Persona hint: {hint}\n"));
    }
    if let Some(seed) = &analysis.reply_seed {
        directive.push_str(&format!("Suggested opening: {seed}\n"));
    }
    directive.push_str(
        "--- END REPORT ---\n\
         Address the user's deeper need using the communication style they are most \
         receptive to, while staying fully in persona.",
    );
    directive
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kindred_core::intent::{EmotionalState, Intent, Receptivity};
    use uuid::Uuid;

    fn companion() -> Companion {
        Companion {
            id: Uuid::nil(),
            owner_id: Uuid::nil(),
            name: "Luna".into(),
            description: "A gentle companion".into(),
            instructions: "You are Luna, warm and curious.".into(),
            seed: "User: hi\nLuna: hello there!".into(),
            avatar_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn analysis(confidence: f32) -> IntentAnalysisResult {
        IntentAnalysisResult {
            primary_intent: Intent::EmotionalExpression,
            secondary_intents: vec![Intent::SuggestionSeeking],
            emotional_state: EmotionalState::Anxious,
            emotional_intensity: 8,
            underlying_need: "seeks reassurance".into(),
            user_receptivity: Receptivity::NeedsValidationAndComfort,
            confidence,
            short_explanation: None,
            persona_hint: Some("empathize first".into()),
            reply_seed: Some("It's okay to feel nervous.".into()),
        }
    }

    #[test]
    fn composition_is_deterministic() {
        let companion = companion();
        let analysis = analysis(0.9);
        let history = vec![Turn::user("hi"), Turn::assistant("hello!")];

        let a = compose(&companion, &[], &analysis, 0.4, &history, "how are you?");
        let b = compose(&companion, &[], &analysis, 0.4, &history, "how are you?");
        assert_eq!(a, b);
    }

    #[test]
    fn low_confidence_requests_clarification() {
        for confidence in [0.0, 0.1, 0.39] {
            let prompt = compose(&companion(), &[], &analysis(confidence), 0.4, &[], "hm");
            assert!(prompt.system.contains("clarifying question"));
            assert!(!prompt.system.contains("USER STATE REPORT"));
            assert!(!prompt.system.contains("Underlying need"));
        }
    }

    #[test]
    fn at_gate_confidence_embeds_full_report() {
        for confidence in [0.4, 0.41, 1.0] {
            let prompt = compose(&companion(), &[], &analysis(confidence), 0.4, &[], "hm");
            assert!(prompt.system.contains("USER STATE REPORT"));
            // Fields appear verbatim as their schema tokens
            assert!(prompt.system.contains("emotional_expression"));
            assert!(prompt.system.contains("anxious (intensity 8/10)"));
            assert!(prompt.system.contains("seeks reassurance"));
            assert!(prompt.system.contains("needs_validation_and_comfort"));
            assert!(prompt.system.contains("empathize first"));
            assert!(prompt.system.contains("It's okay to feel nervous."));
            assert!(!prompt.system.contains("clarifying question"));
        }
    }

    #[test]
    fn no_knowledge_means_no_background_block() {
        let prompt = compose(&companion(), &[], &analysis(0.9), 0.4, &[], "hi");
        assert!(!prompt.system.contains("BACKGROUND KNOWLEDGE"));
        assert!(prompt.system.contains("You are Luna"));
    }

    #[test]
    fn knowledge_block_precedes_persona() {
        let knowledge = vec![
            "The dragon's name is Ember.".to_string(),
            "The castle sits on a cliff.".to_string(),
        ];
        let prompt = compose(&companion(), &knowledge, &analysis(0.9), 0.4, &[], "hi");

        let knowledge_pos = prompt.system.find("BACKGROUND KNOWLEDGE").unwrap();
        let persona_pos = prompt.system.find("You are Luna").unwrap();
        assert!(knowledge_pos < persona_pos);
        assert!(prompt.system.contains("The dragon's name is Ember."));
        assert!(prompt.system.contains("ONLY"));
    }

    #[test]
    fn history_keeps_roles_and_order() {
        let history = vec![
            Turn::user("first"),
            Turn::assistant("second"),
            Turn::user("third"),
        ];
        let prompt = compose(&companion(), &[], &analysis(0.9), 0.4, &history, "fourth");

        let messages = prompt.into_messages();
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0].role, kindred_core::provider::PromptRole::System);
        assert_eq!(messages[1].content, "first");
        assert_eq!(messages[2].role, kindred_core::provider::PromptRole::Assistant);
        assert_eq!(messages[4].content, "fourth");
    }

    #[test]
    fn secondary_intents_listed_when_present() {
        let prompt = compose(&companion(), &[], &analysis(0.9), 0.4, &[], "hi");
        assert!(prompt.system.contains("suggestion_seeking"));

        let mut bare = analysis(0.9);
        bare.secondary_intents.clear();
        let prompt = compose(&companion(), &[], &bare, 0.4, &[], "hi");
        assert!(!prompt.system.contains("Secondary intents"));
    }
}
