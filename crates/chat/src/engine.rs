//! The conversation orchestrator.
//!
//! One `run_turn` call is one pass through the per-message state machine:
//!
//! ```text
//! RECEIVED -> CLASSIFYING/RETRIEVING (concurrent) -> COMPOSING
//!   -> PERSIST_USER_TURN -> STREAMING -> PERSIST_ASSISTANT_TURN
//!   -> MEMORY_UPDATED -> DONE        (ERROR reachable from any step)
//! ```
//!
//! Turn policy:
//! - the companion is re-resolved from storage on every message, never cached
//!   across turns;
//! - the user's turn is written before generation begins, so a mid-stream
//!   failure never loses their input;
//! - a mid-stream failure or disconnect discards the partial reply — no
//!   record beats a half-finished one;
//! - session memory updates never gate turn completion.

use crate::composer::compose;
use crate::event::TurnEvent;
use crate::streamer::GenerationStreamer;
use kindred_core::message::{NewMessage, Turn};
use kindred_core::provider::Provider;
use kindred_core::storage::Storage;
use kindred_intent::IntentAnalyzer;
use kindred_memory::SessionMemory;
use kindred_retrieval::KnowledgeRetriever;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Generation parameters for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub chat_model: String,
    pub chat_temperature: f32,
    pub max_reply_tokens: u32,
    pub confidence_gate: f32,
}

/// The per-session conversation engine.
///
/// Shared immutably across sessions; every collaborator behind it is safe
/// for concurrent use. One `process_message` call handles exactly one turn.
pub struct ChatEngine {
    storage: Arc<dyn Storage>,
    memory: Arc<SessionMemory>,
    retriever: Arc<KnowledgeRetriever>,
    analyzer: Arc<IntentAnalyzer>,
    streamer: GenerationStreamer,
    confidence_gate: f32,
}

impl ChatEngine {
    pub fn new(
        storage: Arc<dyn Storage>,
        memory: Arc<SessionMemory>,
        retriever: Arc<KnowledgeRetriever>,
        analyzer: Arc<IntentAnalyzer>,
        provider: Arc<dyn Provider>,
        config: EngineConfig,
    ) -> Self {
        let streamer = GenerationStreamer::new(
            provider,
            config.chat_model,
            config.chat_temperature,
            config.max_reply_tokens,
        );
        Self {
            storage,
            memory,
            retriever,
            analyzer,
            streamer,
            confidence_gate: config.confidence_gate,
        }
    }

    /// Process one inbound message. Events arrive on the returned receiver;
    /// the final event is always `Done` (possibly preceded by `Error`).
    ///
    /// The channel is deliberately unbuffered-ish (capacity 1): fragments are
    /// forwarded as they arrive, never batched, and a dropped receiver — the
    /// disconnect signal — stops the turn at the next fragment.
    pub fn process_message(
        self: Arc<Self>,
        companion_id: Uuid,
        user_id: Uuid,
        text: String,
    ) -> mpsc::Receiver<TurnEvent> {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            self.run_turn(companion_id, user_id, text, tx).await;
        });
        rx
    }

    async fn run_turn(
        &self,
        companion_id: Uuid,
        user_id: Uuid,
        text: String,
        tx: mpsc::Sender<TurnEvent>,
    ) {
        // RECEIVED: resolve the companion fresh so persona edits apply
        // immediately and deletion is detected promptly.
        let companion = match self.storage.get_companion(companion_id).await {
            Ok(Some(companion)) => companion,
            Ok(None) => {
                info!(companion_id = %companion_id, "Chat against missing companion");
                Self::fail_turn(&tx, "companion unavailable").await;
                return;
            }
            Err(e) => {
                error!(companion_id = %companion_id, error = %e, "Companion lookup failed");
                Self::fail_turn(&tx, "companion unavailable").await;
                return;
            }
        };

        // Identifiers copied up front: once the peer disconnects, the only
        // safe things to log are these.
        let companion_name = companion.name.clone();

        let remembered = self.memory.load(companion_id, user_id).await;
        let history_lines: Vec<String> = remembered
            .iter()
            .map(|turn| format!("[{}] {}", turn.role, turn.content))
            .collect();

        // CLASSIFYING and RETRIEVING have no mutual ordering; run them
        // concurrently. Both recover internally and cannot fail the turn.
        let (analysis, knowledge) = tokio::join!(
            self.analyzer
                .analyze(&text, &history_lines, &companion.description),
            self.retriever.retrieve(&text, companion_id),
        );

        debug!(
            companion = %companion_name,
            intent = analysis.primary_intent.as_str(),
            confidence = analysis.confidence,
            snippets = knowledge.len(),
            "Turn context assembled"
        );

        // COMPOSING: pure, cannot fail.
        let prompt = compose(
            &companion,
            &knowledge,
            &analysis,
            self.confidence_gate,
            &remembered,
            &text,
        );

        // PERSIST_USER_TURN: before generation, so a mid-stream failure
        // never loses the user's input.
        if let Err(e) = self
            .storage
            .create_message(NewMessage::user(companion_id, user_id, &text))
            .await
        {
            error!(companion_id = %companion_id, error = %e, "Failed to persist user turn");
            Self::fail_turn(&tx, "An internal error occurred.").await;
            return;
        }

        // STREAMING
        let mut stream = match self.streamer.start(prompt).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(companion_id = %companion_id, error = %e, "Generation call failed to start");
                Self::fail_turn(&tx, "An internal error occurred.").await;
                return;
            }
        };

        while let Some(item) = stream.next_fragment().await {
            match item {
                Ok(fragment) => {
                    if tx
                        .send(TurnEvent::Fragment { content: fragment })
                        .await
                        .is_err()
                    {
                        // Disconnect is normal lifecycle, not an error. The
                        // partial reply is discarded, not persisted.
                        info!(
                            companion_id = %companion_id,
                            user_id = %user_id,
                            companion = %companion_name,
                            "Client disconnected mid-stream, discarding partial reply"
                        );
                        return;
                    }
                }
                Err(e) => {
                    warn!(
                        companion_id = %companion_id,
                        error = %e,
                        discarded_chars = stream.text().len(),
                        "Generation failed mid-stream, discarding partial reply"
                    );
                    Self::fail_turn(&tx, "An internal error occurred.").await;
                    return;
                }
            }
        }

        let reply = stream.into_text();

        // PERSIST_ASSISTANT_TURN: only for a completed, non-empty reply.
        if reply.is_empty() {
            debug!(companion_id = %companion_id, "Empty reply, nothing to persist");
            let _ = tx.send(TurnEvent::Done).await;
            return;
        }

        if let Err(e) = self
            .storage
            .create_message(NewMessage::assistant(companion_id, user_id, &reply))
            .await
        {
            error!(companion_id = %companion_id, error = %e, "Failed to persist assistant turn");
            Self::fail_turn(&tx, "An internal error occurred.").await;
            return;
        }

        // MEMORY_UPDATED: best-effort; the message log is authoritative.
        let mut window = remembered;
        window.push(Turn::user(&text));
        window.push(Turn::assistant(&reply));
        if let Err(e) = self.memory.save(companion_id, user_id, &window).await {
            warn!(companion_id = %companion_id, error = %e, "Session memory update failed");
        }

        // DONE
        let _ = tx.send(TurnEvent::Done).await;
    }

    /// Notify the caller of a failed turn. The turn always terminates with
    /// `Done`, even after an error.
    async fn fail_turn(tx: &mpsc::Sender<TurnEvent>, message: &str) {
        let _ = tx
            .send(TurnEvent::Error {
                message: message.to_string(),
            })
            .await;
        let _ = tx.send(TurnEvent::Done).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, histogram_embedding};
    use kindred_core::companion::{Companion, NewCompanion};
    use kindred_core::message::MessageOrder;
    use kindred_core::message::Role;
    use kindred_core::user::{NewUser, User};
    use kindred_core::vector::{VectorIndex, VectorRecord};
    use kindred_memory::InMemoryCache;
    use kindred_retrieval::SqliteVectorIndex;
    use kindred_storage::SqliteStore;
    use std::time::Duration;

    struct Harness {
        engine: Arc<ChatEngine>,
        storage: Arc<SqliteStore>,
        index: Arc<SqliteVectorIndex>,
        memory: Arc<SessionMemory>,
        provider: Arc<ScriptedProvider>,
        companion: Companion,
        user: User,
    }

    async fn harness(provider: ScriptedProvider) -> Harness {
        harness_with_window(provider, 30).await
    }

    async fn harness_with_window(provider: ScriptedProvider, window: usize) -> Harness {
        let provider = Arc::new(provider);
        let storage = Arc::new(SqliteStore::in_memory().await.unwrap());
        let index = Arc::new(SqliteVectorIndex::in_memory().await.unwrap());
        let memory = Arc::new(SessionMemory::new(
            Arc::new(InMemoryCache::new()),
            window,
            Duration::from_secs(3600),
        ));

        let user = storage
            .create_user(NewUser {
                email: "owner@example.com".into(),
                hashed_password: "$argon2id$mock".into(),
                nickname: None,
            })
            .await
            .unwrap();
        let companion = storage
            .create_companion(
                user.id,
                NewCompanion {
                    name: "Luna".into(),
                    description: "a gentle, encouraging companion".into(),
                    instructions: "You are Luna, warm and curious.".into(),
                    seed: "User: hi\nLuna: hello there!".into(),
                    avatar_url: None,
                },
            )
            .await
            .unwrap();

        let retriever = Arc::new(KnowledgeRetriever::new(
            provider.clone(),
            index.clone(),
            "histogram",
            3,
        ));
        let analyzer = Arc::new(IntentAnalyzer::new(provider.clone(), "mock-model", 0.1));

        let engine = Arc::new(ChatEngine::new(
            storage.clone(),
            memory.clone(),
            retriever,
            analyzer,
            provider.clone(),
            EngineConfig {
                chat_model: "mock-model".into(),
                chat_temperature: 0.7,
                max_reply_tokens: 256,
                confidence_gate: 0.4,
            },
        ));

        Harness {
            engine,
            storage,
            index,
            memory,
            provider,
            companion,
            user,
        }
    }

    async fn drain(mut rx: mpsc::Receiver<TurnEvent>) -> Vec<TurnEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn scenario_a_reply_persisted_after_user_turn() {
        let h = harness(ScriptedProvider::streaming(vec!["Hello", " there", "!"])).await;

        let rx = h
            .engine
            .clone()
            .process_message(h.companion.id, h.user.id, "Hi".into());
        let events = drain(rx).await;

        assert_eq!(
            events,
            vec![
                TurnEvent::Fragment { content: "Hello".into() },
                TurnEvent::Fragment { content: " there".into() },
                TurnEvent::Fragment { content: "!".into() },
                TurnEvent::Done,
            ]
        );

        let messages = h
            .storage
            .list_messages(h.companion.id, h.user.id, MessageOrder::OldestFirst, 0, 10)
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "Hi");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "Hello there!");

        // Memory reflects the message log's tail
        let window = h.memory.load(h.companion.id, h.user.id).await;
        assert_eq!(window.len(), 2);
        assert_eq!(window[0], Turn::user("Hi"));
        assert_eq!(window[1], Turn::assistant("Hello there!"));

        // No knowledge was indexed, so no background block in the prompt
        let generation = &h.provider.streaming_requests()[0];
        let system = &generation.messages[0].content;
        assert!(!system.contains("BACKGROUND KNOWLEDGE"));
        assert!(system.contains("You are Luna"));
    }

    #[tokio::test]
    async fn scenario_b_disconnect_discards_partial_reply() {
        let h = harness(ScriptedProvider::streaming(vec![
            "one", "two", "three", "four", "five",
        ]))
        .await;

        let mut rx = h
            .engine
            .clone()
            .process_message(h.companion.id, h.user.id, "stream please".into());

        // Receive exactly one fragment, then vanish.
        let first = rx.recv().await.unwrap();
        assert!(matches!(first, TurnEvent::Fragment { .. }));
        drop(rx);

        // Give the turn task time to hit the closed channel and abort.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let messages = h
            .storage
            .list_messages(h.companion.id, h.user.id, MessageOrder::OldestFirst, 0, 10)
            .await
            .unwrap();
        // The user's turn survives; no assistant turn was persisted.
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);

        // Memory was not updated with the aborted exchange.
        assert!(h.memory.load(h.companion.id, h.user.id).await.is_empty());
    }

    #[tokio::test]
    async fn mid_stream_failure_discards_partial_and_reports_error() {
        let h = harness(
            ScriptedProvider::streaming(vec!["partial answer"]).with_stream_error_after(1),
        )
        .await;

        let rx = h
            .engine
            .clone()
            .process_message(h.companion.id, h.user.id, "go on".into());
        let events = drain(rx).await;

        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], TurnEvent::Fragment { .. }));
        assert!(matches!(events[1], TurnEvent::Error { .. }));
        assert_eq!(events[2], TurnEvent::Done);

        let messages = h
            .storage
            .list_messages(h.companion.id, h.user.id, MessageOrder::OldestFirst, 0, 10)
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn missing_companion_terminates_without_persisting() {
        let h = harness(ScriptedProvider::streaming(vec!["never sent"])).await;

        let rx = h
            .engine
            .clone()
            .process_message(Uuid::new_v4(), h.user.id, "anyone there?".into());
        let events = drain(rx).await;

        assert_eq!(events.len(), 2);
        match &events[0] {
            TurnEvent::Error { message } => assert!(message.contains("companion unavailable")),
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(events[1], TurnEvent::Done);
    }

    #[tokio::test]
    async fn scenario_d_deleted_companion_yields_not_found_signal() {
        let h = harness(ScriptedProvider::streaming(vec!["hello"])).await;

        // A first exchange populates the log.
        let rx = h
            .engine
            .clone()
            .process_message(h.companion.id, h.user.id, "hi".into());
        drain(rx).await;

        assert!(h.storage.delete_companion(h.companion.id).await.unwrap());

        let rx = h
            .engine
            .clone()
            .process_message(h.companion.id, h.user.id, "still there?".into());
        let events = drain(rx).await;
        match &events[0] {
            TurnEvent::Error { message } => assert!(message.contains("companion unavailable")),
            other => panic!("expected error, got {other:?}"),
        }

        // Cascade removed the old messages; nothing new was written.
        let messages = h
            .storage
            .list_messages(h.companion.id, h.user.id, MessageOrder::OldestFirst, 0, 10)
            .await
            .unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn scenario_c_knowledge_grounds_the_prompt() {
        let h = harness(ScriptedProvider::streaming(vec!["Her name is Ember."])).await;

        // Simulate completed ingestion: vectors present with companion scope.
        let file_id = Uuid::new_v4();
        let chunk = "The dragon's name is Ember.";
        h.index
            .upsert(vec![VectorRecord {
                id: VectorRecord::chunk_id(file_id, 0),
                companion_id: h.companion.id,
                file_id,
                file_name: "lore.txt".into(),
                chunk_index: 0,
                text: chunk.into(),
                embedding: histogram_embedding(chunk),
            }])
            .await
            .unwrap();

        let rx = h.engine.clone().process_message(
            h.companion.id,
            h.user.id,
            "what is the dragon's name?".into(),
        );
        let events = drain(rx).await;
        assert!(matches!(events.last(), Some(TurnEvent::Done)));

        let generation = &h.provider.streaming_requests()[0];
        let system = &generation.messages[0].content;
        assert!(system.contains("BACKGROUND KNOWLEDGE"));
        assert!(system.contains("Ember"));
    }

    #[tokio::test]
    async fn low_confidence_analysis_requests_clarification() {
        let h = harness(
            ScriptedProvider::streaming(vec!["Could you tell me more?"])
                .with_completion(r#"{"primary_intent": "casual_chat", "confidence": 0.1}"#),
        )
        .await;

        let rx = h
            .engine
            .clone()
            .process_message(h.companion.id, h.user.id, "it".into());
        drain(rx).await;

        let generation = &h.provider.streaming_requests()[0];
        let system = &generation.messages[0].content;
        assert!(system.contains("clarifying question"));
        assert!(!system.contains("USER STATE REPORT"));
    }

    #[tokio::test]
    async fn empty_reply_is_not_persisted() {
        let h = harness(ScriptedProvider::streaming(Vec::<&str>::new())).await;

        let rx = h
            .engine
            .clone()
            .process_message(h.companion.id, h.user.id, "say nothing".into());
        let events = drain(rx).await;
        assert_eq!(events, vec![TurnEvent::Done]);

        let messages = h
            .storage
            .list_messages(h.companion.id, h.user.id, MessageOrder::OldestFirst, 0, 10)
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn memory_window_rolls_and_matches_log_tail() {
        let h = harness_with_window(ScriptedProvider::streaming(vec!["reply"]), 4).await;

        for i in 0..3 {
            let rx = h
                .engine
                .clone()
                .process_message(h.companion.id, h.user.id, format!("message {i}"));
            drain(rx).await;
        }

        let window = h.memory.load(h.companion.id, h.user.id).await;
        assert_eq!(window.len(), 4);

        // The window equals the persisted log's tail.
        let messages = h
            .storage
            .list_messages(h.companion.id, h.user.id, MessageOrder::OldestFirst, 0, 100)
            .await
            .unwrap();
        assert_eq!(messages.len(), 6);
        let tail: Vec<Turn> = messages[2..].iter().map(Turn::from).collect();
        assert_eq!(window, tail);
    }

    #[tokio::test]
    async fn later_turns_see_remembered_history() {
        let h = harness(ScriptedProvider::streaming(vec!["I remember."])).await;

        let rx = h
            .engine
            .clone()
            .process_message(h.companion.id, h.user.id, "my cat is Miso".into());
        drain(rx).await;
        let rx = h
            .engine
            .clone()
            .process_message(h.companion.id, h.user.id, "what's my cat's name?".into());
        drain(rx).await;

        // The second generation request carries the first exchange as history.
        let second = &h.provider.streaming_requests()[1];
        let contents: Vec<&str> = second.messages.iter().map(|m| m.content.as_str()).collect();
        assert!(contents.iter().any(|c| c.contains("my cat is Miso")));
        assert!(contents.iter().any(|c| c.contains("I remember.")));
    }
}
