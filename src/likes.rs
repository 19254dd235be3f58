use crate::error::{ChatError, Result};
use crate::matches::{self, MatchChange};
use crate::profiles;
use rusqlite::{params, Connection, TransactionBehavior};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug)]
pub struct LikeOutcome {
    pub created: bool,
    pub match_change: Option<MatchChange>,
}

#[derive(Debug)]
pub struct UnlikeOutcome {
    pub removed: bool,
    pub match_change: Option<MatchChange>,
}

/// Record a directed interest edge. Idempotent: re-liking is a no-op with
/// `created = false`. The edge write and the match evaluation run in one
/// immediate transaction so the reciprocity invariant holds at commit.
pub fn like(conn: &mut Connection, from: Uuid, to: Uuid) -> Result<LikeOutcome> {
    if from == to {
        return Err(ChatError::Validation("cannot like yourself".into()));
    }
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    profiles::require(&tx, from)?;
    profiles::require_accepting(&tx, to)?;
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let created = tx.execute(
        "INSERT INTO likes (liker_id, liked_id, created_at) VALUES (?1, ?2, ?3) \
         ON CONFLICT(liker_id, liked_id) DO NOTHING",
        params![from.to_string(), to.to_string(), now],
    )? == 1;
    let match_change = evaluate_after_write(&tx, from, to);
    tx.commit()?;
    Ok(LikeOutcome {
        created,
        match_change,
    })
}

/// Remove a directed edge. Removing one side of an active match demotes it.
pub fn unlike(conn: &mut Connection, from: Uuid, to: Uuid) -> Result<UnlikeOutcome> {
    if from == to {
        return Err(ChatError::Validation("cannot unlike yourself".into()));
    }
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let removed = tx.execute(
        "DELETE FROM likes WHERE liker_id = ?1 AND liked_id = ?2",
        params![from.to_string(), to.to_string()],
    )? == 1;
    let match_change = evaluate_after_write(&tx, from, to);
    tx.commit()?;
    Ok(UnlikeOutcome {
        removed,
        match_change,
    })
}

// Evaluation failures never surface to the like/unlike caller; the ledger
// write stands and the next write for the pair converges the match row.
fn evaluate_after_write(conn: &Connection, a: Uuid, b: Uuid) -> Option<MatchChange> {
    match matches::evaluate_pair(conn, a, b) {
        Ok(change) => change,
        Err(err) => {
            tracing::warn!(%a, %b, error = %err, "match evaluation deferred");
            None
        }
    }
}
