//! Structured output of the intent/emotion classification pass.
//!
//! `IntentAnalysisResult` is the contract between the classifier and the
//! prompt composer: a per-message "user state report". Every bounded field is
//! truncated rather than rejected at the source — the report must never be
//! the reason a turn fails.

use serde::{Deserialize, Serialize};

/// Schema bound: `short_explanation` length in characters.
pub const MAX_SHORT_EXPLANATION: usize = 60;
/// Schema bound: `underlying_need` length in characters.
pub const MAX_UNDERLYING_NEED: usize = 100;
/// Schema bound: `persona_hint` length in characters.
pub const MAX_PERSONA_HINT: usize = 120;
/// Schema bound: `reply_seed` length in characters.
pub const MAX_REPLY_SEED: usize = 120;

/// The user's core intent for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    InformationSeeking,
    ProblemSolving,
    EmotionalExpression,
    /// Neutral default when nothing more specific can be inferred.
    #[default]
    CasualChat,
    SuggestionSeeking,
}

impl Intent {
    /// Parse a classifier token; unknown tokens yield `None` so callers can
    /// apply the neutral default.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "information_seeking" => Some(Intent::InformationSeeking),
            "problem_solving" => Some(Intent::ProblemSolving),
            "emotional_expression" => Some(Intent::EmotionalExpression),
            "casual_chat" => Some(Intent::CasualChat),
            "suggestion_seeking" => Some(Intent::SuggestionSeeking),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::InformationSeeking => "information_seeking",
            Intent::ProblemSolving => "problem_solving",
            Intent::EmotionalExpression => "emotional_expression",
            Intent::CasualChat => "casual_chat",
            Intent::SuggestionSeeking => "suggestion_seeking",
        }
    }
}

/// Estimated emotional state of the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionalState {
    Joyful,
    Sad,
    Anxious,
    Angry,
    Surprised,
    #[default]
    Neutral,
}

impl EmotionalState {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "joyful" => Some(EmotionalState::Joyful),
            "sad" => Some(EmotionalState::Sad),
            "anxious" => Some(EmotionalState::Anxious),
            "angry" => Some(EmotionalState::Angry),
            "surprised" => Some(EmotionalState::Surprised),
            "neutral" => Some(EmotionalState::Neutral),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionalState::Joyful => "joyful",
            EmotionalState::Sad => "sad",
            EmotionalState::Anxious => "anxious",
            EmotionalState::Angry => "angry",
            EmotionalState::Surprised => "surprised",
            EmotionalState::Neutral => "neutral",
        }
    }
}

/// Which communication style the user is most receptive to right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Receptivity {
    #[default]
    NeedsValidationAndComfort,
    SeeksLogicalAndCalmExplanation,
    OpenToHumorAndLightheartedness,
    DesiresSharedJoyAndExcitement,
}

impl Receptivity {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "needs_validation_and_comfort" => Some(Receptivity::NeedsValidationAndComfort),
            "seeks_logical_and_calm_explanation" => {
                Some(Receptivity::SeeksLogicalAndCalmExplanation)
            }
            "open_to_humor_and_lightheartedness" => {
                Some(Receptivity::OpenToHumorAndLightheartedness)
            }
            "desires_shared_joy_and_excitement" => Some(Receptivity::DesiresSharedJoyAndExcitement),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Receptivity::NeedsValidationAndComfort => "needs_validation_and_comfort",
            Receptivity::SeeksLogicalAndCalmExplanation => "seeks_logical_and_calm_explanation",
            Receptivity::OpenToHumorAndLightheartedness => "open_to_humor_and_lightheartedness",
            Receptivity::DesiresSharedJoyAndExcitement => "desires_shared_joy_and_excitement",
        }
    }
}

/// Structured analysis of a single inbound message.
///
/// Transient — produced per message, consumed by the prompt composer, never
/// persisted. Invariants: `emotional_intensity` ∈ [1, 10], `confidence` ∈
/// [0.0, 1.0], all text fields within their schema bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentAnalysisResult {
    pub primary_intent: Intent,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondary_intents: Vec<Intent>,

    pub emotional_state: EmotionalState,

    /// 1 (mild) to 10 (intense)
    pub emotional_intensity: u8,

    /// The deeper, possibly unstated need behind the message
    pub underlying_need: String,

    pub user_receptivity: Receptivity,

    /// How much the classifier trusts this report; 0.0 means "treat as unknown"
    pub confidence: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_explanation: Option<String>,

    /// Style or content hint for the persona layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona_hint: Option<String>,

    /// Suggested opening sentence the reply can build on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_seed: Option<String>,
}

impl IntentAnalysisResult {
    /// A neutral report with mid-scale defaults. Confidence 0.5 signals
    /// "plausible but unverified", not failure.
    pub fn neutral() -> Self {
        Self {
            primary_intent: Intent::default(),
            secondary_intents: Vec::new(),
            emotional_state: EmotionalState::default(),
            emotional_intensity: 3,
            underlying_need: "unknown".into(),
            user_receptivity: Receptivity::default(),
            confidence: 0.5,
            short_explanation: None,
            persona_hint: None,
            reply_seed: None,
        }
    }

    /// Whether every invariant of the schema holds.
    pub fn is_valid(&self) -> bool {
        (1..=10).contains(&self.emotional_intensity)
            && (0.0..=1.0).contains(&self.confidence)
            && self.underlying_need.chars().count() <= MAX_UNDERLYING_NEED
            && self
                .short_explanation
                .as_ref()
                .is_none_or(|s| s.chars().count() <= MAX_SHORT_EXPLANATION)
            && self
                .persona_hint
                .as_ref()
                .is_none_or(|s| s.chars().count() <= MAX_PERSONA_HINT)
            && self
                .reply_seed
                .as_ref()
                .is_none_or(|s| s.chars().count() <= MAX_REPLY_SEED)
    }
}
