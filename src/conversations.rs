use crate::error::{ChatError, Result};
use crate::matches::canonical_pair;
use crate::model::{Conversation, ConversationKind, Match};
use crate::profiles;
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;
use uuid::Uuid;

const CONV_COLS: &str = "id, participant_a, participant_b, kind, match_id, is_active, \
                         last_sequence, last_message_at, created_at";

/// Deterministic UUID for a conversation kind and unordered pair, so
/// get-or-create is naturally idempotent and a pair can never end up with
/// two rows of the same kind.
pub fn conversation_id(kind: ConversationKind, a: Uuid, b: Uuid) -> Uuid {
    let (low, high) = canonical_pair(a, b);
    let name = format!("{}:{}:{}", kind.as_str(), low, high);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: Uuid::parse_str(row.get::<_, String>(0)?.as_str()).unwrap(),
        participant_a: Uuid::parse_str(row.get::<_, String>(1)?.as_str()).unwrap(),
        participant_b: Uuid::parse_str(row.get::<_, String>(2)?.as_str()).unwrap(),
        kind: ConversationKind::from_db(row.get::<_, String>(3)?.as_str()).unwrap(),
        match_id: row
            .get::<_, Option<String>>(4)?
            .and_then(|s| Uuid::parse_str(&s).ok()),
        is_active: row.get::<_, i64>(5)? != 0,
        last_sequence: row.get(6)?,
        last_message_at: row.get(7)?,
        created_at: row.get(8)?,
    })
}

pub fn get(conn: &Connection, id: Uuid) -> Result<Option<Conversation>> {
    let conv = conn
        .prepare(&format!("SELECT {CONV_COLS} FROM conversations WHERE id = ?1"))?
        .query_row([id.to_string()], row_to_conversation)
        .optional()?;
    Ok(conv)
}

pub fn require(conn: &Connection, id: Uuid) -> Result<Conversation> {
    get(conn, id)?.ok_or(ChatError::NotFound("conversation"))
}

/// Create or fetch the conversation anchored to a match. Idempotent; the
/// deterministic id doubles as the uniqueness guarantee under races.
pub fn get_or_create_for_match(conn: &Connection, record: &Match) -> Result<Conversation> {
    let id = conversation_id(
        ConversationKind::Match,
        record.profile_low,
        record.profile_high,
    );
    if let Some(conv) = get(conn, id)? {
        return Ok(conv);
    }
    let now = OffsetDateTime::now_utc().unix_timestamp();
    conn.execute(
        "INSERT INTO conversations (id, participant_a, participant_b, kind, match_id, is_active, created_at) \
         VALUES (?1, ?2, ?3, 'match', ?4, 1, ?5) ON CONFLICT(id) DO NOTHING",
        params![
            id.to_string(),
            record.profile_low.to_string(),
            record.profile_high.to_string(),
            record.id.to_string(),
            now
        ],
    )?;
    require(conn, id)
}

/// Create or fetch an inquiry conversation for an unordered pair, outside the
/// matching flow (e.g. contacting a profile about a listing). Never gated by
/// match status.
pub fn get_or_create_inquiry(conn: &Connection, requester: Uuid, target: Uuid) -> Result<Conversation> {
    if requester == target {
        return Err(ChatError::Validation(
            "cannot open a conversation with yourself".into(),
        ));
    }
    profiles::require(conn, requester)?;
    profiles::require_accepting(conn, target)?;
    let id = conversation_id(ConversationKind::Inquiry, requester, target);
    if let Some(conv) = get(conn, id)? {
        return Ok(conv);
    }
    let (low, high) = canonical_pair(requester, target);
    let now = OffsetDateTime::now_utc().unix_timestamp();
    conn.execute(
        "INSERT INTO conversations (id, participant_a, participant_b, kind, match_id, is_active, created_at) \
         VALUES (?1, ?2, ?3, 'inquiry', NULL, 1, ?4) ON CONFLICT(id) DO NOTHING",
        params![id.to_string(), low.to_string(), high.to_string(), now],
    )?;
    require(conn, id)
}

/// Gate control, reserved for the match resolver. Inquiry conversations stay
/// permanently open.
pub(crate) fn set_active(conn: &Connection, conversation_id: Uuid, active: bool) -> Result<()> {
    let conv = require(conn, conversation_id)?;
    if conv.kind == ConversationKind::Inquiry {
        return Err(ChatError::Validation(
            "inquiry conversations cannot be deactivated".into(),
        ));
    }
    conn.execute(
        "UPDATE conversations SET is_active = ?2 WHERE id = ?1",
        params![conversation_id.to_string(), active as i64],
    )?;
    Ok(())
}

pub fn is_participant(conv: &Conversation, user: Uuid) -> bool {
    conv.participant_a == user || conv.participant_b == user
}

/// "Who is the other party" is computed, never stored.
pub fn other_participant(conv: &Conversation, user: Uuid) -> Option<Uuid> {
    if conv.participant_a == user {
        Some(conv.participant_b)
    } else if conv.participant_b == user {
        Some(conv.participant_a)
    } else {
        None
    }
}

/// Conversations a user takes part in, most recently active first.
pub fn list_for_user(conn: &Connection, user: Uuid) -> Result<Vec<Conversation>> {
    let convs = conn
        .prepare(&format!(
            "SELECT {CONV_COLS} FROM conversations \
             WHERE participant_a = ?1 OR participant_b = ?1 \
             ORDER BY COALESCE(last_message_at, created_at) DESC"
        ))?
        .query_map([user.to_string()], row_to_conversation)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(convs)
}
