use anyhow::Result;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::Path;

/// Initialize a single SQLite connection and run migrations. Used by unit
/// tests and one-off tooling; the server goes through [`init_pool`].
pub fn init_db<P: AsRef<Path>>(path: P) -> Result<Connection> {
    let conn = Connection::open(path)?;
    apply_pragmas(&conn)?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

/// Initialize the connection pool backing the HTTP handlers. Every checked
/// out connection gets the same pragmas; the schema is idempotent.
pub fn init_pool<P: AsRef<Path>>(path: P) -> Result<Pool<SqliteConnectionManager>> {
    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        apply_pragmas(conn)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    });
    Ok(Pool::new(manager)?)
}

fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    // journal_mode replies with the resulting mode, so it cannot go through
    // execute_batch.
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    Ok(())
}

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS profiles (
  id TEXT PRIMARY KEY,
  role TEXT NOT NULL CHECK (role IN ('seeker','offerer')),
  accepts_messages INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS likes (
  liker_id TEXT NOT NULL REFERENCES profiles(id),
  liked_id TEXT NOT NULL REFERENCES profiles(id),
  created_at INTEGER NOT NULL,
  PRIMARY KEY (liker_id, liked_id),
  CHECK (liker_id <> liked_id)
);

CREATE TABLE IF NOT EXISTS matches (
  id TEXT PRIMARY KEY,
  profile_low TEXT NOT NULL,
  profile_high TEXT NOT NULL,
  status TEXT NOT NULL CHECK (status IN ('active','inactive')),
  created_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL,
  UNIQUE (profile_low, profile_high)
);

CREATE TABLE IF NOT EXISTS conversations (
  id TEXT PRIMARY KEY,
  participant_a TEXT NOT NULL,
  participant_b TEXT NOT NULL,
  kind TEXT NOT NULL CHECK (kind IN ('match','inquiry')),
  match_id TEXT REFERENCES matches(id),
  is_active INTEGER NOT NULL DEFAULT 1,
  last_sequence INTEGER NOT NULL DEFAULT 0,
  last_message_at INTEGER,
  created_at INTEGER NOT NULL,
  UNIQUE (participant_a, participant_b, kind)
);

CREATE TABLE IF NOT EXISTS messages (
  id TEXT PRIMARY KEY,
  conversation_id TEXT NOT NULL REFERENCES conversations(id),
  sender_id TEXT NOT NULL,
  body TEXT NOT NULL,
  kind TEXT NOT NULL CHECK (kind IN ('text','image','system')),
  seq INTEGER NOT NULL,
  created_at INTEGER NOT NULL,
  UNIQUE (conversation_id, seq)
);

CREATE INDEX IF NOT EXISTS idx_messages_conv_seq
  ON messages (conversation_id, seq);

CREATE TABLE IF NOT EXISTS read_pointers (
  conversation_id TEXT NOT NULL REFERENCES conversations(id),
  user_id TEXT NOT NULL,
  last_read_seq INTEGER NOT NULL DEFAULT 0,
  PRIMARY KEY (conversation_id, user_id)
);
"#;
