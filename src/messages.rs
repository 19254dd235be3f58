use crate::conversations;
use crate::error::{ChatError, Result};
use crate::model::{Conversation, Message, MessageKind};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use time::OffsetDateTime;
use uuid::Uuid;

/// Upper bound for text message bodies, in characters.
pub const MAX_TEXT_LEN: usize = 1000;

const MSG_COLS: &str = "id, conversation_id, sender_id, body, kind, seq, created_at";

/// Append a message to a conversation.
///
/// Preconditions in order, first failure wins: conversation exists, sender is
/// a participant, gate open, body valid. Sequence assignment, the insert and
/// the conversation timestamp bump commit as one unit; an aborted send leaves
/// nothing behind.
pub fn send(
    conn: &mut Connection,
    conversation_id: Uuid,
    sender_id: Uuid,
    body: &str,
    kind: MessageKind,
) -> Result<Message> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let conv = conversations::require(&tx, conversation_id)?;
    if !conversations::is_participant(&conv, sender_id) {
        return Err(ChatError::Forbidden("sender is not a participant"));
    }
    if !conv.is_active {
        return Err(ChatError::MatchInactive);
    }
    if body.trim().is_empty() {
        return Err(ChatError::Validation("empty message body".into()));
    }
    if kind == MessageKind::Text && body.chars().count() > MAX_TEXT_LEN {
        return Err(ChatError::Validation(format!(
            "message body exceeds {MAX_TEXT_LEN} characters"
        )));
    }
    let seq = conv.last_sequence + 1;
    let id = Uuid::new_v4();
    let now = OffsetDateTime::now_utc().unix_timestamp();
    tx.execute(
        &format!("INSERT INTO messages ({MSG_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
        params![
            id.to_string(),
            conversation_id.to_string(),
            sender_id.to_string(),
            body,
            kind.as_str(),
            seq,
            now
        ],
    )?;
    tx.execute(
        "UPDATE conversations SET last_sequence = ?2, last_message_at = ?3 WHERE id = ?1",
        params![conversation_id.to_string(), seq, now],
    )?;
    tx.commit()?;
    Ok(Message {
        id,
        conversation_id,
        sender_id,
        body: body.into(),
        kind,
        seq,
        created_at: now,
        is_read: false,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: Uuid::parse_str(row.get::<_, String>(0)?.as_str()).unwrap(),
        conversation_id: Uuid::parse_str(row.get::<_, String>(1)?.as_str()).unwrap(),
        sender_id: Uuid::parse_str(row.get::<_, String>(2)?.as_str()).unwrap(),
        body: row.get(3)?,
        kind: MessageKind::from_db(row.get::<_, String>(4)?.as_str()).unwrap(),
        seq: row.get(5)?,
        created_at: row.get(6)?,
        is_read: false,
    })
}

/// Messages strictly ordered by sequence, resumable after a cursor. A message
/// counts as read once the counterpart's pointer has reached it.
pub fn list(
    conn: &Connection,
    conversation_id: Uuid,
    after_seq: Option<i64>,
    limit: usize,
) -> Result<Vec<Message>> {
    let conv = conversations::require(conn, conversation_id)?;
    let limit = limit.min(200);
    let after = after_seq.unwrap_or(0);
    let mut msgs = conn
        .prepare(&format!(
            "SELECT {MSG_COLS} FROM messages WHERE conversation_id = ?1 AND seq > ?2 \
             ORDER BY seq ASC LIMIT ?3"
        ))?
        .query_map(
            params![conversation_id.to_string(), after, limit as i64],
            row_to_message,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let ptr_a = read_pointer(conn, conversation_id, conv.participant_a)?;
    let ptr_b = read_pointer(conn, conversation_id, conv.participant_b)?;
    for msg in &mut msgs {
        let counterpart = if msg.sender_id == conv.participant_a {
            ptr_b
        } else {
            ptr_a
        };
        msg.is_read = msg.seq <= counterpart;
    }
    Ok(msgs)
}

pub fn read_pointer(conn: &Connection, conversation_id: Uuid, user: Uuid) -> Result<i64> {
    let seq: Option<i64> = conn
        .prepare(
            "SELECT last_read_seq FROM read_pointers WHERE conversation_id = ?1 AND user_id = ?2",
        )?
        .query_row(params![conversation_id.to_string(), user.to_string()], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(seq.unwrap_or(0))
}

/// Advance a reader's pointer. Monotonic: a lower `through_seq` than the
/// stored one is a no-op, pointers are independent per reader. The pointer
/// never runs ahead of the conversation's last assigned sequence, so a
/// message sent later can never start out read.
pub fn mark_read(
    conn: &Connection,
    conversation_id: Uuid,
    reader_id: Uuid,
    through_seq: i64,
) -> Result<()> {
    let conv = conversations::require(conn, conversation_id)?;
    if !conversations::is_participant(&conv, reader_id) {
        return Err(ChatError::Forbidden("reader is not a participant"));
    }
    conn.execute(
        "INSERT INTO read_pointers (conversation_id, user_id, last_read_seq) VALUES (?1, ?2, ?3) \
         ON CONFLICT(conversation_id, user_id) \
         DO UPDATE SET last_read_seq = MAX(last_read_seq, excluded.last_read_seq)",
        params![
            conversation_id.to_string(),
            reader_id.to_string(),
            through_seq.clamp(0, conv.last_sequence)
        ],
    )?;
    Ok(())
}

/// Messages past the user's pointer that they did not send themselves.
pub fn unread_count(conn: &Connection, conv: &Conversation, user: Uuid) -> Result<i64> {
    let ptr = read_pointer(conn, conv.id, user)?;
    let count: i64 = conn
        .prepare(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1 AND seq > ?2 AND sender_id <> ?3",
        )?
        .query_row(
            params![conv.id.to_string(), ptr, user.to_string()],
            |row| row.get(0),
        )?;
    Ok(count)
}
