use crate::model::{Match, Message};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events pushed to the realtime tail after a successful commit. Delivery is
/// best effort and never part of the transactional contract.
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    MessageAppended {
        conversation_id: Uuid,
        message: Message,
    },
    MatchStatusChanged {
        #[serde(rename = "match")]
        record: Match,
    },
}

/// Fan out an event to websocket subscribers. A missing or lagging
/// subscriber never fails the write path.
pub fn emit(tx: &broadcast::Sender<String>, event: &Event) {
    match serde_json::to_string(event) {
        Ok(payload) => {
            tracing::debug!(payload = %payload, "emit");
            let _ = tx.send(payload);
        }
        Err(err) => tracing::warn!(error = %err, "event serialization failed"),
    }
}
