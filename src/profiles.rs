use crate::error::{ChatError, Result};
use crate::model::{Profile, Role};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

/// Mirror a profile from the external directory. The directory owns the
/// record; the core only keeps the fields it gates on.
pub fn upsert(conn: &Connection, profile: &Profile) -> Result<()> {
    conn.execute(
        "INSERT INTO profiles (id, role, accepts_messages) VALUES (?1, ?2, ?3) \
         ON CONFLICT(id) DO UPDATE SET role = excluded.role, \
         accepts_messages = excluded.accepts_messages",
        params![
            profile.id.to_string(),
            profile.role.as_str(),
            profile.accepts_messages as i64
        ],
    )?;
    Ok(())
}

pub fn lookup(conn: &Connection, id: Uuid) -> Result<Option<Profile>> {
    let profile = conn
        .prepare("SELECT id, role, accepts_messages FROM profiles WHERE id = ?1")?
        .query_row([id.to_string()], |row| {
            Ok(Profile {
                id: Uuid::parse_str(row.get::<_, String>(0)?.as_str()).unwrap(),
                role: Role::from_db(row.get::<_, String>(1)?.as_str()).unwrap(),
                accepts_messages: row.get::<_, i64>(2)? != 0,
            })
        })
        .optional()?;
    Ok(profile)
}

pub fn require(conn: &Connection, id: Uuid) -> Result<Profile> {
    lookup(conn, id)?.ok_or(ChatError::NotFound("profile"))
}

/// Lookup that additionally enforces the messaging opt-in.
pub fn require_accepting(conn: &Connection, id: Uuid) -> Result<Profile> {
    let profile = require(conn, id)?;
    if !profile.accepts_messages {
        return Err(ChatError::Forbidden("this user is not accepting messages"));
    }
    Ok(profile)
}
