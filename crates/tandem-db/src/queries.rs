use crate::Database;
use crate::models::{
    CallInviteRow, MatchRow, MessageRow, TypingRow, UserRow, format_timestamp,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tandem_types::{CallStatus, CanonicalPair};
use uuid::Uuid;

impl Database {
    // -- Users --

    /// Profiles are owned by the profile service; this keeps the display
    /// fields the call prompt needs.
    pub fn upsert_user(&self, id: Uuid, display_name: &str, photo_url: Option<&str>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, display_name, photo_url) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name,
                                               photo_url = excluded.photo_url",
                params![id.to_string(), display_name, photo_url],
            )?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, id))
    }

    // -- Likes, passes, blocks --

    /// Returns false when the like already existed.
    pub fn insert_like(&self, from: Uuid, to: Uuid, at: DateTime<Utc>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO likes (from_user_id, to_user_id, created_at) VALUES (?1, ?2, ?3)",
                params![from.to_string(), to.to_string(), format_timestamp(at)],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn like_exists(&self, from: Uuid, to: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM likes WHERE from_user_id = ?1 AND to_user_id = ?2)",
                params![from.to_string(), to.to_string()],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    pub fn insert_pass(&self, user: Uuid, target: Uuid, at: DateTime<Utc>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO passes (user_id, target_id, created_at) VALUES (?1, ?2, ?3)",
                params![user.to_string(), target.to_string(), format_timestamp(at)],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn insert_block(&self, blocker: Uuid, blocked: Uuid, at: DateTime<Utc>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO blocks (blocker_id, blocked_id, created_at) VALUES (?1, ?2, ?3)",
                params![blocker.to_string(), blocked.to_string(), format_timestamp(at)],
            )?;
            Ok(inserted == 1)
        })
    }

    /// True if either user has blocked the other.
    pub fn is_blocked(&self, a: Uuid, b: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let blocked = conn.query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM blocks
                    WHERE (blocker_id = ?1 AND blocked_id = ?2)
                       OR (blocker_id = ?2 AND blocked_id = ?1))",
                params![a.to_string(), b.to_string()],
                |row| row.get(0),
            )?;
            Ok(blocked)
        })
    }

    /// Users that must not be offered to `user` again: already liked, passed,
    /// blocked, or blocking `user`.
    pub fn discovery_exclusions(&self, user: Uuid) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT to_user_id FROM likes WHERE from_user_id = ?1
                 UNION SELECT target_id FROM passes WHERE user_id = ?1
                 UNION SELECT blocked_id FROM blocks WHERE blocker_id = ?1
                 UNION SELECT blocker_id FROM blocks WHERE blocked_id = ?1",
            )?;
            let ids = stmt
                .query_map([user.to_string()], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    // -- Matches --

    /// Inserts the match for `pair` unless one exists, then returns the stored
    /// row. Concurrent callers for the same pair all get the same row back.
    pub fn upsert_match(&self, pair: CanonicalPair, at: DateTime<Utc>) -> Result<MatchRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO matches (id, user1_id, user2_id, created_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user1_id, user2_id) DO NOTHING",
                params![
                    Uuid::new_v4().to_string(),
                    pair.lo().to_string(),
                    pair.hi().to_string(),
                    format_timestamp(at)
                ],
            )?;
            let row = conn.query_row(
                "SELECT id, user1_id, user2_id, created_at FROM matches
                 WHERE user1_id = ?1 AND user2_id = ?2",
                params![pair.lo().to_string(), pair.hi().to_string()],
                match_from_row,
            )?;
            Ok(row)
        })
    }

    pub fn get_match(&self, id: Uuid) -> Result<Option<MatchRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user1_id, user2_id, created_at FROM matches WHERE id = ?1",
                [id.to_string()],
                match_from_row,
            )
            .optional()
        })
    }

    pub fn find_match(&self, pair: CanonicalPair) -> Result<Option<MatchRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user1_id, user2_id, created_at FROM matches
                 WHERE user1_id = ?1 AND user2_id = ?2",
                params![pair.lo().to_string(), pair.hi().to_string()],
                match_from_row,
            )
            .optional()
        })
    }

    /// Newest first.
    pub fn matches_for_user(&self, user: Uuid) -> Result<Vec<MatchRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user1_id, user2_id, created_at FROM matches
                 WHERE user1_id = ?1 OR user2_id = ?1
                 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([user.to_string()], match_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        id: Uuid,
        match_id: Uuid,
        sender_id: Uuid,
        content: &str,
        client_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Result<MessageRow> {
        let row = MessageRow {
            id: id.to_string(),
            match_id: match_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            client_id: client_id.map(|c| c.to_string()),
            created_at: format_timestamp(at),
            read_at: None,
        };
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, match_id, sender_id, content, client_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    row.id,
                    row.match_id,
                    row.sender_id,
                    row.content,
                    row.client_id,
                    row.created_at
                ],
            )?;
            Ok(())
        })?;
        Ok(row)
    }

    /// Oldest first; rows with equal timestamps keep insertion order.
    pub fn get_messages(&self, match_id: Uuid) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages(conn, match_id))
    }

    /// Stamps `read_at` on every unread message in the match not sent by
    /// `reader`. Returns how many rows changed.
    pub fn mark_read(&self, match_id: Uuid, reader: Uuid, at: DateTime<Utc>) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE messages SET read_at = ?3
                 WHERE match_id = ?1 AND sender_id != ?2 AND read_at IS NULL",
                params![match_id.to_string(), reader.to_string(), format_timestamp(at)],
            )?;
            Ok(updated)
        })
    }

    // -- Typing indicators --

    pub fn upsert_typing(&self, match_id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO typing_indicators (match_id, user_id, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(match_id, user_id) DO UPDATE SET updated_at = excluded.updated_at",
                params![match_id.to_string(), user_id.to_string(), format_timestamp(at)],
            )?;
            Ok(())
        })
    }

    pub fn delete_typing(&self, match_id: Uuid, user_id: Uuid) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "DELETE FROM typing_indicators WHERE match_id = ?1 AND user_id = ?2",
                params![match_id.to_string(), user_id.to_string()],
            )?;
            Ok(())
        })
    }

    pub fn get_typing(&self, match_id: Uuid, user_id: Uuid) -> Result<Option<TypingRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT match_id, user_id, updated_at FROM typing_indicators
                 WHERE match_id = ?1 AND user_id = ?2",
                params![match_id.to_string(), user_id.to_string()],
                |row| {
                    Ok(TypingRow {
                        match_id: row.get(0)?,
                        user_id: row.get(1)?,
                        updated_at: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }

    /// Deletes indicators last updated before `cutoff`.
    pub fn delete_typing_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute(
                "DELETE FROM typing_indicators WHERE updated_at < ?1",
                [format_timestamp(cutoff)],
            )?;
            Ok(deleted)
        })
    }

    // -- Call invites --

    pub fn insert_invite(&self, invite: &CallInviteRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO call_invites
                    (id, match_id, caller_id, callee_id, channel_name, call_type, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    invite.id,
                    invite.match_id,
                    invite.caller_id,
                    invite.callee_id,
                    invite.channel_name,
                    invite.call_type,
                    invite.status,
                    invite.created_at
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_invite(&self, id: Uuid) -> Result<Option<CallInviteRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{} WHERE id = ?1", INVITE_SELECT),
                [id.to_string()],
                invite_from_row,
            )
            .optional()
        })
    }

    /// Newest ringing invite for `callee` within one match.
    pub fn ringing_invite_for_match(&self, match_id: Uuid, callee: Uuid) -> Result<Option<CallInviteRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "{} WHERE match_id = ?1 AND callee_id = ?2 AND status = 'ringing'
                     ORDER BY created_at DESC LIMIT 1",
                    INVITE_SELECT
                ),
                params![match_id.to_string(), callee.to_string()],
                invite_from_row,
            )
            .optional()
        })
    }

    /// Newest ringing invite addressed to `callee` in any match.
    pub fn ringing_invite_for_callee(&self, callee: Uuid) -> Result<Option<CallInviteRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "{} WHERE callee_id = ?1 AND status = 'ringing'
                     ORDER BY created_at DESC LIMIT 1",
                    INVITE_SELECT
                ),
                [callee.to_string()],
                invite_from_row,
            )
            .optional()
        })
    }

    /// Unconditional status write; the last writer wins. Returns false if the
    /// invite does not exist.
    pub fn update_invite_status(&self, id: Uuid, status: CallStatus) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE call_invites SET status = ?2 WHERE id = ?1",
                params![id.to_string(), status.as_str()],
            )?;
            Ok(updated == 1)
        })
    }

    /// Marks invites still ringing since before `cutoff` as missed.
    pub fn expire_ringing_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let expired = conn.execute(
                "UPDATE call_invites SET status = 'missed'
                 WHERE status = 'ringing' AND created_at < ?1",
                [format_timestamp(cutoff)],
            )?;
            Ok(expired)
        })
    }

    // -- Device tokens --

    pub fn upsert_device_token(&self, user_id: Uuid, token: &str, at: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO user_device_tokens (user_id, token, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET token = excluded.token,
                                                    updated_at = excluded.updated_at",
                params![user_id.to_string(), token, format_timestamp(at)],
            )?;
            Ok(())
        })
    }

    pub fn get_device_token(&self, user_id: Uuid) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT token FROM user_device_tokens WHERE user_id = ?1",
                [user_id.to_string()],
                |row| row.get(0),
            )
            .optional()
        })
    }
}

const INVITE_SELECT: &str = "SELECT id, match_id, caller_id, callee_id, channel_name, call_type, status, created_at
     FROM call_invites";

fn query_user(conn: &Connection, id: Uuid) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, display_name, photo_url, created_at FROM users WHERE id = ?1")?;

    let row = stmt
        .query_row([id.to_string()], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                display_name: row.get(1)?,
                photo_url: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_messages(conn: &Connection, match_id: Uuid) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, match_id, sender_id, content, client_id, created_at, read_at
         FROM messages
         WHERE match_id = ?1
         ORDER BY created_at ASC, rowid ASC",
    )?;

    let rows = stmt
        .query_map([match_id.to_string()], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                match_id: row.get(1)?,
                sender_id: row.get(2)?,
                content: row.get(3)?,
                client_id: row.get(4)?,
                created_at: row.get(5)?,
                read_at: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn match_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MatchRow> {
    Ok(MatchRow {
        id: row.get(0)?,
        user1_id: row.get(1)?,
        user2_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn invite_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CallInviteRow> {
    Ok(CallInviteRow {
        id: row.get(0)?,
        match_id: row.get(1)?,
        caller_id: row.get(2)?,
        callee_id: row.get(3)?,
        channel_name: row.get(4)?,
        call_type: row.get(5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn duplicate_like_is_a_no_op() {
        let db = db();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        assert!(db.insert_like(a, b, Utc::now()).unwrap());
        assert!(!db.insert_like(a, b, Utc::now()).unwrap());

        let count: i64 = db
            .with_conn(|c| Ok(c.query_row("SELECT COUNT(*) FROM likes", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 1);
        assert!(db.like_exists(a, b).unwrap());
        assert!(!db.like_exists(b, a).unwrap());
    }

    #[test]
    fn upsert_match_returns_the_same_row_for_both_orders() {
        let db = db();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let first = db.upsert_match(CanonicalPair::new(a, b), Utc::now()).unwrap();
        let second = db.upsert_match(CanonicalPair::new(b, a), Utc::now()).unwrap();
        assert_eq!(first.id, second.id);
        assert!(first.user1_id < first.user2_id);
        assert_eq!(db.matches_for_user(a).unwrap().len(), 1);
        assert_eq!(db.matches_for_user(b).unwrap().len(), 1);
    }

    #[test]
    fn messages_come_back_in_insertion_order() {
        let db = db();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let m = db.upsert_match(CanonicalPair::new(a, b), Utc::now()).unwrap();
        let match_id: Uuid = m.id.parse().unwrap();
        let at = Utc::now();
        for text in ["one", "two", "three"] {
            // Same timestamp for all three: rowid breaks the tie.
            db.insert_message(Uuid::new_v4(), match_id, a, text, None, at).unwrap();
        }
        let contents: Vec<String> = db
            .get_messages(match_id)
            .unwrap()
            .into_iter()
            .map(|r| r.content)
            .collect();
        assert_eq!(contents, ["one", "two", "three"]);
    }

    #[test]
    fn mark_read_only_touches_peer_messages() {
        let db = db();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let m = db.upsert_match(CanonicalPair::new(a, b), Utc::now()).unwrap();
        let match_id: Uuid = m.id.parse().unwrap();
        db.insert_message(Uuid::new_v4(), match_id, a, "from a", None, Utc::now()).unwrap();
        db.insert_message(Uuid::new_v4(), match_id, b, "from b", None, Utc::now()).unwrap();

        assert_eq!(db.mark_read(match_id, b, Utc::now()).unwrap(), 1);
        assert_eq!(db.mark_read(match_id, b, Utc::now()).unwrap(), 0);

        for row in db.get_messages(match_id).unwrap() {
            let sent_by_a = row.sender_id == a.to_string();
            assert_eq!(row.read_at.is_some(), sent_by_a);
        }
    }

    #[test]
    fn typing_upsert_keeps_one_row() {
        let db = db();
        let (m, u) = (Uuid::new_v4(), Uuid::new_v4());
        let t0 = Utc::now();
        db.upsert_typing(m, u, t0).unwrap();
        db.upsert_typing(m, u, t0 + Duration::seconds(1)).unwrap();
        let row = db.get_typing(m, u).unwrap().unwrap();
        assert_eq!(row.updated_at, format_timestamp(t0 + Duration::seconds(1)));

        db.delete_typing(m, u).unwrap();
        assert!(db.get_typing(m, u).unwrap().is_none());
    }

    #[test]
    fn blocks_and_passes_feed_discovery_exclusions() {
        let db = db();
        let me = Uuid::new_v4();
        let (liked, passed, blocked, blocker) =
            (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        db.insert_like(me, liked, Utc::now()).unwrap();
        db.insert_pass(me, passed, Utc::now()).unwrap();
        assert!(!db.insert_pass(me, passed, Utc::now()).unwrap());
        db.insert_block(me, blocked, Utc::now()).unwrap();
        db.insert_block(blocker, me, Utc::now()).unwrap();

        let mut excluded = db.discovery_exclusions(me).unwrap();
        excluded.sort();
        let mut expected: Vec<String> = [liked, passed, blocked, blocker]
            .iter()
            .map(|u| u.to_string())
            .collect();
        expected.sort();
        assert_eq!(excluded, expected);
        assert!(db.is_blocked(blocker, me).unwrap());
        assert!(db.is_blocked(me, blocker).unwrap());
        assert!(!db.is_blocked(me, liked).unwrap());
    }

    #[test]
    fn sweeps_only_touch_stale_rows() {
        let db = db();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let m = db.upsert_match(CanonicalPair::new(a, b), Utc::now()).unwrap();
        let match_id: Uuid = m.id.parse().unwrap();
        let now = Utc::now();

        db.upsert_typing(match_id, a, now - Duration::seconds(10)).unwrap();
        db.upsert_typing(match_id, b, now).unwrap();
        assert_eq!(db.delete_typing_before(now - Duration::seconds(3)).unwrap(), 1);
        assert!(db.get_typing(match_id, a).unwrap().is_none());
        assert!(db.get_typing(match_id, b).unwrap().is_some());

        let invite = |id: Uuid, at: DateTime<Utc>| CallInviteRow {
            id: id.to_string(),
            match_id: match_id.to_string(),
            caller_id: a.to_string(),
            callee_id: b.to_string(),
            channel_name: "c".into(),
            call_type: "voice".into(),
            status: "ringing".into(),
            created_at: format_timestamp(at),
        };
        let (old, fresh) = (Uuid::new_v4(), Uuid::new_v4());
        db.insert_invite(&invite(old, now - Duration::seconds(45))).unwrap();
        db.insert_invite(&invite(fresh, now)).unwrap();

        assert_eq!(db.expire_ringing_before(now - Duration::seconds(30)).unwrap(), 1);
        assert_eq!(db.get_invite(old).unwrap().unwrap().status, "missed");
        assert_eq!(db.get_invite(fresh).unwrap().unwrap().status, "ringing");
    }

    #[test]
    fn device_token_is_overwritten() {
        let db = db();
        let u = Uuid::new_v4();
        db.upsert_device_token(u, "first", Utc::now()).unwrap();
        db.upsert_device_token(u, "second", Utc::now()).unwrap();
        assert_eq!(db.get_device_token(u).unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tandem.db");
        let user = Uuid::new_v4();
        {
            let db = Database::open(&path).unwrap();
            db.upsert_user(user, "Robin", None).unwrap();
        }
        let db = Database::open(&path).unwrap();
        let profile = db.get_user(user).unwrap().unwrap().into_model().unwrap();
        assert_eq!(profile.display_name, "Robin");
    }
}
