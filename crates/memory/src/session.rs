//! The rolling session-memory window.

use kindred_core::cache::CacheStore;
use kindred_core::error::CacheError;
use kindred_core::message::Turn;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Bounded recent-turn memory for one (companion, user) pair.
///
/// - `load` fails open: an unreachable cache or a corrupt blob yields an
///   empty window, never an error — the conversation proceeds memory-less.
/// - `save` overwrites the prior window and refreshes the TTL. Callers treat
///   a failure as log-and-continue; the message log already has the turns.
pub struct SessionMemory {
    cache: Arc<dyn CacheStore>,
    window: usize,
    ttl: Duration,
}

impl SessionMemory {
    pub fn new(cache: Arc<dyn CacheStore>, window: usize, ttl: Duration) -> Self {
        Self { cache, window, ttl }
    }

    /// The configured window size, in turns.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Deterministic cache key — memory is never shared across companions
    /// or users.
    pub fn scope_key(companion_id: Uuid, user_id: Uuid) -> String {
        format!("chat_history:{companion_id}:{user_id}")
    }

    /// Load the remembered window, most recent `window` turns, oldest first.
    pub async fn load(&self, companion_id: Uuid, user_id: Uuid) -> Vec<Turn> {
        let key = Self::scope_key(companion_id, user_id);

        let blob = match self.cache.get(&key).await {
            Ok(Some(blob)) => blob,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(key = %key, error = %e, "Session memory unavailable, proceeding without");
                return Vec::new();
            }
        };

        match serde_json::from_slice::<Vec<Turn>>(&blob) {
            Ok(mut turns) => {
                if turns.len() > self.window {
                    turns.drain(..turns.len() - self.window);
                }
                turns
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Corrupt session memory blob, discarding");
                Vec::new()
            }
        }
    }

    /// Overwrite the window with `turns`, evicting everything beyond the
    /// most recent `window` entries.
    pub async fn save(
        &self,
        companion_id: Uuid,
        user_id: Uuid,
        turns: &[Turn],
    ) -> Result<(), CacheError> {
        let key = Self::scope_key(companion_id, user_id);

        let start = turns.len().saturating_sub(self.window);
        let bounded = &turns[start..];

        let blob = serde_json::to_vec(bounded)
            .map_err(|e| CacheError::WriteFailed(format!("serialize window: {e}")))?;

        self.cache.set(&key, &blob, self.ttl).await?;
        debug!(key = %key, turns = bounded.len(), "Session memory saved");
        Ok(())
    }

    /// Forget everything for one (companion, user) pair.
    pub async fn forget(&self, companion_id: Uuid, user_id: Uuid) -> Result<(), CacheError> {
        self.cache
            .delete(&Self::scope_key(companion_id, user_id))
            .await
    }
}
