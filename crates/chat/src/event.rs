//! Turn-level events emitted by the chat engine.
//!
//! The engine speaks `TurnEvent`; the transport decides how to render each
//! variant. Over the WebSocket boundary the contract is plain text: reply
//! fragments verbatim, a distinguishable error fragment, and an out-of-band
//! terminator after every turn — complete or failed — so the client never
//! sees an ambiguously unterminated turn.

use serde::{Deserialize, Serialize};

/// Out-of-band end-of-turn marker sent after the last fragment (or after an
/// error fragment). Distinguishable from any legitimate reply fragment.
pub const END_OF_STREAM: &str = "[END_OF_STREAM]";

/// Prefix marking a recoverable per-turn error fragment.
pub const ERROR_PREFIX: &str = "[ERROR]";

/// Events emitted while processing one inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// An incremental piece of the reply.
    Fragment { content: String },

    /// The turn failed; the connection stays usable for further turns.
    Error { message: String },

    /// Terminal event for the turn — always the last event, after either the
    /// full reply or an error.
    Done,
}

impl TurnEvent {
    /// Render this event as a plain-text WebSocket frame.
    pub fn to_frame(&self) -> String {
        match self {
            TurnEvent::Fragment { content } => content.clone(),
            TurnEvent::Error { message } => format!("{ERROR_PREFIX} {message}"),
            TurnEvent::Done => END_OF_STREAM.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_frame_is_verbatim() {
        let event = TurnEvent::Fragment {
            content: "hello".into(),
        };
        assert_eq!(event.to_frame(), "hello");
    }

    #[test]
    fn error_frame_is_distinguishable() {
        let event = TurnEvent::Error {
            message: "An internal error occurred.".into(),
        };
        let frame = event.to_frame();
        assert!(frame.starts_with(ERROR_PREFIX));
        assert_ne!(frame, END_OF_STREAM);
    }

    #[test]
    fn done_frame_is_the_terminator() {
        assert_eq!(TurnEvent::Done.to_frame(), END_OF_STREAM);
    }

    #[test]
    fn serialization_is_tagged() {
        let json = serde_json::to_string(&TurnEvent::Fragment {
            content: "hi".into(),
        })
        .unwrap();
        assert!(json.contains(r#""type":"fragment""#));
    }
}
