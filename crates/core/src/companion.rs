//! Companion domain types.
//!
//! A companion is a configured AI persona owned by a single user. Its
//! `instructions` are the behavioral system-prompt body and `seed` is a short
//! example dialogue that anchors its voice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A configured AI persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Companion {
    /// Immutable identity
    pub id: Uuid,

    /// The owning user — the only principal allowed to mutate or delete
    pub owner_id: Uuid,

    /// Display name
    pub name: String,

    /// Short free-text description shown in listings
    pub description: String,

    /// Behavioral instructions — the persona's system-prompt body
    pub instructions: String,

    /// Example dialogue seeding the persona's voice
    pub seed: String,

    /// Optional avatar reference (object-storage URL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a companion.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCompanion {
    pub name: String,
    pub description: String,
    pub instructions: String,
    pub seed: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Partial update — `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompanionUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub seed: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl CompanionUpdate {
    /// Whether this update changes anything at all.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.instructions.is_none()
            && self.seed.is_none()
            && self.avatar_url.is_none()
    }
}
