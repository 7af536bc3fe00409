//! The Kindred conversation pipeline.
//!
//! For every inbound chat message the engine:
//! 1. re-resolves the companion from storage (persona edits apply instantly,
//!    deletions are detected promptly),
//! 2. loads the bounded session-memory window,
//! 3. runs intent classification and knowledge retrieval concurrently,
//! 4. composes a layered prompt (knowledge → persona → strategy directive),
//! 5. persists the user's turn, then streams the reply fragment by fragment,
//! 6. persists the completed reply and refreshes session memory.
//!
//! Failure policy: classification and retrieval degrade internally and never
//! fail a turn; a mid-stream generation failure aborts only the current turn
//! and discards the partial reply; session-memory writes are best-effort.

pub mod composer;
pub mod engine;
pub mod event;
pub mod streamer;

pub use composer::{ComposedPrompt, compose};
pub use engine::{ChatEngine, EngineConfig};
pub use event::{END_OF_STREAM, ERROR_PREFIX, TurnEvent};
pub use streamer::{GenerationStreamer, ReplyStream};

#[cfg(test)]
pub(crate) mod test_helpers;
