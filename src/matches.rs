use crate::conversations;
use crate::error::{ChatError, Result};
use crate::model::{ConversationKind, Match, MatchStatus};
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;
use uuid::Uuid;

/// Bounded retries absorbing lost races on the canonical pair row.
const EVAL_RETRIES: usize = 3;

const MATCH_COLS: &str = "id, profile_low, profile_high, status, created_at, updated_at";

/// Canonical (low, high) ordering so an unordered pair maps to exactly one
/// match row.
pub fn canonical_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn row_to_match(row: &rusqlite::Row<'_>) -> rusqlite::Result<Match> {
    Ok(Match {
        id: Uuid::parse_str(row.get::<_, String>(0)?.as_str()).unwrap(),
        profile_low: Uuid::parse_str(row.get::<_, String>(1)?.as_str()).unwrap(),
        profile_high: Uuid::parse_str(row.get::<_, String>(2)?.as_str()).unwrap(),
        status: MatchStatus::from_db(row.get::<_, String>(3)?.as_str()).unwrap(),
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub fn get_by_pair(conn: &Connection, a: Uuid, b: Uuid) -> Result<Option<Match>> {
    let (low, high) = canonical_pair(a, b);
    let m = conn
        .prepare(&format!(
            "SELECT {MATCH_COLS} FROM matches WHERE profile_low = ?1 AND profile_high = ?2"
        ))?
        .query_row(params![low.to_string(), high.to_string()], row_to_match)
        .optional()?;
    Ok(m)
}

fn edge_exists(conn: &Connection, from: Uuid, to: Uuid) -> Result<bool> {
    let found: Option<i64> = conn
        .prepare("SELECT 1 FROM likes WHERE liker_id = ?1 AND liked_id = ?2")?
        .query_row(params![from.to_string(), to.to_string()], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

/// Result of an evaluation: the match row as it now stands, and whether its
/// status actually transitioned.
#[derive(Debug, Clone)]
pub struct MatchChange {
    pub record: Match,
    pub changed: bool,
}

/// Re-derive the match state for an unordered pair from the like ledger.
///
/// A match row exists iff both directed edges existed at some evaluation, and
/// is active iff both exist now. Creation races on the unique
/// `(profile_low, profile_high)` constraint: a losing writer observes the
/// conflict, re-reads and converges instead of erroring.
pub fn evaluate_pair(conn: &Connection, a: Uuid, b: Uuid) -> Result<Option<MatchChange>> {
    let (low, high) = canonical_pair(a, b);
    for _ in 0..EVAL_RETRIES {
        let reciprocal = edge_exists(conn, low, high)? && edge_exists(conn, high, low)?;
        let existing = get_by_pair(conn, low, high)?;
        let now = OffsetDateTime::now_utc().unix_timestamp();
        match (reciprocal, existing) {
            (true, None) => {
                let record = Match {
                    id: Uuid::new_v4(),
                    profile_low: low,
                    profile_high: high,
                    status: MatchStatus::Active,
                    created_at: now,
                    updated_at: now,
                };
                let res = conn.execute(
                    "INSERT INTO matches (id, profile_low, profile_high, status, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, 'active', ?4, ?5)",
                    params![
                        record.id.to_string(),
                        low.to_string(),
                        high.to_string(),
                        now,
                        now
                    ],
                );
                match res {
                    Ok(_) => {
                        conversations::get_or_create_for_match(conn, &record)?;
                        return Ok(Some(MatchChange {
                            record,
                            changed: true,
                        }));
                    }
                    Err(e)
                        if matches!(
                            e.sqlite_error_code(),
                            Some(rusqlite::ErrorCode::ConstraintViolation)
                        ) =>
                    {
                        // lost the insert race, re-read and transition instead
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            (true, Some(m)) if m.status == MatchStatus::Inactive => {
                let rows = conn.execute(
                    "UPDATE matches SET status = 'active', updated_at = ?2 \
                     WHERE id = ?1 AND status = 'inactive'",
                    params![m.id.to_string(), now],
                )?;
                if rows == 0 {
                    continue;
                }
                let conv = conversations::get_or_create_for_match(conn, &m)?;
                conversations::set_active(conn, conv.id, true)?;
                return Ok(Some(MatchChange {
                    record: Match {
                        status: MatchStatus::Active,
                        updated_at: now,
                        ..m
                    },
                    changed: true,
                }));
            }
            (true, Some(m)) => {
                return Ok(Some(MatchChange {
                    record: m,
                    changed: false,
                }))
            }
            (false, Some(m)) if m.status == MatchStatus::Active => {
                let rows = conn.execute(
                    "UPDATE matches SET status = 'inactive', updated_at = ?2 \
                     WHERE id = ?1 AND status = 'active'",
                    params![m.id.to_string(), now],
                )?;
                if rows == 0 {
                    continue;
                }
                let conv_id =
                    conversations::conversation_id(ConversationKind::Match, low, high);
                if conversations::get(conn, conv_id)?.is_some() {
                    conversations::set_active(conn, conv_id, false)?;
                }
                return Ok(Some(MatchChange {
                    record: Match {
                        status: MatchStatus::Inactive,
                        updated_at: now,
                        ..m
                    },
                    changed: true,
                }));
            }
            (false, Some(m)) => {
                return Ok(Some(MatchChange {
                    record: m,
                    changed: false,
                }))
            }
            (false, None) => return Ok(None),
        }
    }
    Err(ChatError::Conflict)
}
