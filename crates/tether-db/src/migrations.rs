use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            username        TEXT NOT NULL UNIQUE,
            password        TEXT NOT NULL,
            display_name    TEXT NOT NULL,
            avatar_url      TEXT,
            account_type    TEXT NOT NULL DEFAULT 'open',
            partner_id      TEXT REFERENCES users(id),
            created_at      TEXT NOT NULL,
            last_seen       TEXT NOT NULL
        );

        -- One chat per unordered participant pair. The pair is normalized
        -- at insert time (user_lo <= user_hi) so the UNIQUE constraint is
        -- the uniqueness invariant, not application convention. A self
        -- chat (notes to self) has user_lo == user_hi.
        CREATE TABLE IF NOT EXISTS chats (
            id              TEXT PRIMARY KEY,
            user_lo         TEXT NOT NULL REFERENCES users(id),
            user_hi         TEXT NOT NULL REFERENCES users(id),
            is_private_room INTEGER NOT NULL DEFAULT 0,
            wallpaper       TEXT,
            created_at      TEXT NOT NULL,
            last_message_at TEXT NOT NULL,
            UNIQUE(user_lo, user_hi),
            CHECK(user_lo <= user_hi)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            sender_id       TEXT NOT NULL REFERENCES users(id),
            receiver_id     TEXT NOT NULL REFERENCES users(id),
            content         TEXT NOT NULL,
            kind            TEXT NOT NULL DEFAULT 'text',
            file_url        TEXT,
            file_name       TEXT,
            file_size       INTEGER,
            voice_duration  REAL,
            delivered       INTEGER NOT NULL DEFAULT 0,
            read            INTEGER NOT NULL DEFAULT 0,
            read_at         TEXT,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages(sender_id, receiver_id, created_at);

        -- At most one reaction per reactor per message; writes overwrite.
        CREATE TABLE IF NOT EXISTS reactions (
            message_id  TEXT NOT NULL REFERENCES messages(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            emoji       TEXT NOT NULL,
            PRIMARY KEY (message_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS nicknames (
            chat_id     TEXT NOT NULL REFERENCES chats(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            nickname    TEXT NOT NULL,
            set_by      TEXT NOT NULL REFERENCES users(id),
            PRIMARY KEY (chat_id, user_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
