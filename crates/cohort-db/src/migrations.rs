use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS partnerships (
            id          TEXT PRIMARY KEY,
            student_a   TEXT NOT NULL,
            student_b   TEXT NOT NULL,
            track       TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            UNIQUE(student_a, student_b)
        );

        CREATE INDEX IF NOT EXISTS idx_partnerships_a ON partnerships(student_a);
        CREATE INDEX IF NOT EXISTS idx_partnerships_b ON partnerships(student_b);

        CREATE TABLE IF NOT EXISTS messages (
            id                  TEXT PRIMARY KEY,
            conversation_key    TEXT NOT NULL,
            sender_id           TEXT NOT NULL,
            recipient_id        TEXT NOT NULL,
            kind                TEXT NOT NULL CHECK (kind IN ('text', 'file', 'image')),
            body                TEXT,
            file_name           TEXT,
            file_size           INTEGER,
            content_type        TEXT,
            file_url            TEXT,
            created_at          TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_key, created_at, id);

        CREATE TABLE IF NOT EXISTS notifications (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL,
            kind        TEXT NOT NULL,
            title       TEXT NOT NULL,
            body        TEXT NOT NULL,
            read        INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_user
            ON notifications(user_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
