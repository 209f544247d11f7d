use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("DB: running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id            TEXT PRIMARY KEY,
                display_name  TEXT NOT NULL,
                photo_url     TEXT,
                created_at    TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE likes (
                from_user_id  TEXT NOT NULL,
                to_user_id    TEXT NOT NULL,
                created_at    TEXT NOT NULL,
                PRIMARY KEY (from_user_id, to_user_id)
            );

            CREATE INDEX idx_likes_to ON likes(to_user_id);

            CREATE TABLE passes (
                user_id     TEXT NOT NULL,
                target_id   TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (user_id, target_id)
            );

            CREATE TABLE blocks (
                blocker_id  TEXT NOT NULL,
                blocked_id  TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (blocker_id, blocked_id)
            );

            CREATE INDEX idx_blocks_blocked ON blocks(blocked_id);

            CREATE TABLE matches (
                id          TEXT PRIMARY KEY,
                user1_id    TEXT NOT NULL,
                user2_id    TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                UNIQUE (user1_id, user2_id),
                CHECK (user1_id < user2_id)
            );

            CREATE INDEX idx_matches_user2 ON matches(user2_id);

            CREATE TABLE messages (
                id          TEXT PRIMARY KEY,
                match_id    TEXT NOT NULL REFERENCES matches(id),
                sender_id   TEXT NOT NULL,
                content     TEXT NOT NULL,
                client_id   TEXT,
                created_at  TEXT NOT NULL,
                read_at     TEXT
            );

            CREATE INDEX idx_messages_match ON messages(match_id, created_at);

            CREATE TABLE typing_indicators (
                match_id    TEXT NOT NULL,
                user_id     TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                PRIMARY KEY (match_id, user_id)
            );

            CREATE TABLE call_invites (
                id            TEXT PRIMARY KEY,
                match_id      TEXT NOT NULL REFERENCES matches(id),
                caller_id     TEXT NOT NULL,
                callee_id     TEXT NOT NULL,
                channel_name  TEXT NOT NULL,
                call_type     TEXT NOT NULL CHECK (call_type IN ('voice', 'video')),
                status        TEXT NOT NULL
                    CHECK (status IN ('ringing', 'active', 'missed', 'declined', 'ended')),
                created_at    TEXT NOT NULL
            );

            CREATE INDEX idx_call_invites_callee ON call_invites(callee_id, status);
            CREATE INDEX idx_call_invites_match ON call_invites(match_id, status);

            CREATE TABLE user_device_tokens (
                user_id     TEXT PRIMARY KEY,
                token       TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn matches_reject_unordered_pairs() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();

        let err = conn.execute(
            "INSERT INTO matches (id, user1_id, user2_id, created_at) VALUES ('m', 'b', 'a', 'now')",
            [],
        );
        assert!(err.is_err());
    }
}
