use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::Database;
use crate::models::{ChatRow, MessageRow, ReactionRow, UserRow};

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &UserRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, display_name, avatar_url,
                                    account_type, partner_id, created_at, last_seen)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    user.id,
                    user.username,
                    user.password,
                    user.display_name,
                    user.avatar_url,
                    user.account_type,
                    user.partner_id,
                    user.created_at,
                    user.last_seen,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Link `user_id` to `partner_id`, flipping the account to paired.
    pub fn link_partner(&self, user_id: &str, partner_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET partner_id = ?2, account_type = 'paired' WHERE id = ?1",
                [user_id, partner_id],
            )?;
            Ok(())
        })
    }

    pub fn update_profile(
        &self,
        id: &str,
        display_name: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET
                     display_name = COALESCE(?2, display_name),
                     avatar_url   = COALESCE(?3, avatar_url)
                 WHERE id = ?1",
                rusqlite::params![id, display_name, avatar_url],
            )?;
            Ok(())
        })
    }

    pub fn touch_last_seen(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET last_seen = ?2 WHERE id = ?1",
                rusqlite::params![id, at],
            )?;
            Ok(())
        })
    }

    /// Substring search over open accounts, excluding the caller.
    pub fn search_open_users(
        &self,
        query: &str,
        exclude_id: &str,
        limit: u32,
    ) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, password, display_name, avatar_url,
                        account_type, partner_id, created_at, last_seen
                 FROM users
                 WHERE username LIKE '%' || ?1 || '%'
                   AND account_type = 'open'
                   AND id != ?2
                 ORDER BY username
                 LIMIT ?3",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![query, exclude_id, limit], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, msg: &MessageRow) -> Result<()> {
        self.with_conn(|conn| insert_message_stmt(conn, msg))
    }

    /// Persist a message and find-or-create its pair's chat in a single
    /// transaction. If either statement fails nothing is written, so a
    /// failed send can never strand a message without its chat. Returns
    /// the chat id.
    pub fn store_message(
        &self,
        msg: &MessageRow,
        chat_candidate: &str,
        is_private: bool,
    ) -> Result<String> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            insert_message_stmt(&tx, msg)?;
            let chat_id = upsert_chat_stmt(
                &tx,
                chat_candidate,
                &msg.sender_id,
                &msg.receiver_id,
                is_private,
                msg.created_at,
            )?;
            tx.commit()?;
            Ok(chat_id)
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{MESSAGE_SELECT} WHERE id = ?1"))?;
            let row = stmt.query_row([id], message_from_row).optional()?;
            Ok(row)
        })
    }

    /// One page of the conversation between `a` and `b`, most recent first.
    /// `skip`/`limit` window from the newest message backward; callers
    /// reverse the page for ascending display order.
    pub fn history_page(
        &self,
        a: &str,
        b: &str,
        skip: u32,
        limit: u32,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{MESSAGE_SELECT}
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?3 OFFSET ?4"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![a, b, limit, skip], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn last_message_between(&self, a: &str, b: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{MESSAGE_SELECT}
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT 1"
            ))?;
            let row = stmt.query_row([a, b], message_from_row).optional()?;
            Ok(row)
        })
    }

    /// Mark every unread message from `sender_id` to `receiver_id` as read.
    /// Returns how many rows changed; zero is not an error.
    pub fn mark_read(
        &self,
        sender_id: &str,
        receiver_id: &str,
        read_at: DateTime<Utc>,
    ) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET read = 1, read_at = ?3
                 WHERE sender_id = ?1 AND receiver_id = ?2 AND read = 0",
                rusqlite::params![sender_id, receiver_id, read_at],
            )?;
            Ok(changed)
        })
    }

    // -- Reactions --

    /// Set `user_id`'s reaction on a message, overwriting any prior one.
    pub fn set_reaction(&self, message_id: &str, user_id: &str, emoji: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO reactions (message_id, user_id, emoji) VALUES (?1, ?2, ?3)
                 ON CONFLICT(message_id, user_id) DO UPDATE SET emoji = excluded.emoji",
                [message_id, user_id, emoji],
            )?;
            Ok(())
        })
    }

    /// Remove `user_id`'s reaction if present. Returns whether a row existed.
    pub fn clear_reaction(&self, message_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM reactions WHERE message_id = ?1 AND user_id = ?2",
                [message_id, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Batch-fetch reactions for a set of message IDs.
    pub fn reactions_for_messages(&self, message_ids: &[String]) -> Result<Vec<ReactionRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT message_id, user_id, emoji FROM reactions WHERE message_id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(ReactionRow {
                        message_id: row.get(0)?,
                        user_id: row.get(1)?,
                        emoji: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Chats --

    /// Find or create the chat for an unordered pair and bump its recency
    /// marker. The pair is normalized so the whole check-then-act is one
    /// atomic upsert; two concurrent first messages cannot create two chats.
    /// `candidate_id` is used only when the chat does not exist yet; the
    /// existing chat's id is returned otherwise. The private-room flag is
    /// fixed at creation and never updated here.
    pub fn ensure_chat(
        &self,
        candidate_id: &str,
        user_a: &str,
        user_b: &str,
        is_private: bool,
        at: DateTime<Utc>,
    ) -> Result<String> {
        self.with_conn(|conn| upsert_chat_stmt(conn, candidate_id, user_a, user_b, is_private, at))
    }

    pub fn get_chat(&self, id: &str) -> Result<Option<ChatRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{CHAT_SELECT} WHERE id = ?1"))?;
            let row = stmt.query_row([id], chat_from_row).optional()?;
            Ok(row)
        })
    }

    pub fn chats_for_user(&self, user_id: &str) -> Result<Vec<ChatRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{CHAT_SELECT}
                 WHERE user_lo = ?1 OR user_hi = ?1
                 ORDER BY last_message_at DESC"
            ))?;
            let rows = stmt
                .query_map([user_id], chat_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn set_wallpaper(&self, chat_id: &str, wallpaper_url: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE chats SET wallpaper = ?2 WHERE id = ?1",
                [chat_id, wallpaper_url],
            )?;
            Ok(())
        })
    }

    // -- Nicknames --

    pub fn set_nickname(
        &self,
        chat_id: &str,
        user_id: &str,
        nickname: &str,
        set_by: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO nicknames (chat_id, user_id, nickname, set_by)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(chat_id, user_id)
                    DO UPDATE SET nickname = excluded.nickname, set_by = excluded.set_by",
                [chat_id, user_id, nickname, set_by],
            )?;
            Ok(())
        })
    }

    pub fn nickname_for(&self, chat_id: &str, user_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT nickname FROM nicknames WHERE chat_id = ?1 AND user_id = ?2",
                    [chat_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(row)
        })
    }
}

const MESSAGE_SELECT: &str = "SELECT id, sender_id, receiver_id, content, kind,
        file_url, file_name, file_size, voice_duration,
        delivered, read, read_at, created_at
 FROM messages";

const CHAT_SELECT: &str = "SELECT id, user_lo, user_hi, is_private_room, wallpaper,
        created_at, last_message_at
 FROM chats";

fn insert_message_stmt(conn: &Connection, msg: &MessageRow) -> Result<()> {
    conn.execute(
        "INSERT INTO messages (id, sender_id, receiver_id, content, kind,
                               file_url, file_name, file_size, voice_duration,
                               delivered, read, read_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        rusqlite::params![
            msg.id,
            msg.sender_id,
            msg.receiver_id,
            msg.content,
            msg.kind,
            msg.file_url,
            msg.file_name,
            msg.file_size,
            msg.voice_duration,
            msg.delivered,
            msg.read,
            msg.read_at,
            msg.created_at,
        ],
    )?;
    Ok(())
}

// Normalizes the pair; equal ids form a self chat.
fn upsert_chat_stmt(
    conn: &Connection,
    candidate_id: &str,
    user_a: &str,
    user_b: &str,
    is_private: bool,
    at: DateTime<Utc>,
) -> Result<String> {
    let (lo, hi) = if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    };

    let id = conn.query_row(
        "INSERT INTO chats (id, user_lo, user_hi, is_private_room,
                            created_at, last_message_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT(user_lo, user_hi)
            DO UPDATE SET last_message_at = excluded.last_message_at
         RETURNING id",
        rusqlite::params![candidate_id, lo, hi, is_private, at],
        |row| row.get(0),
    )?;
    Ok(id)
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, username, password, display_name, avatar_url,
                account_type, partner_id, created_at, last_seen
         FROM users WHERE {column} = ?1"
    ))?;

    let row = stmt.query_row([value], user_from_row).optional()?;
    Ok(row)
}

fn user_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<UserRow, rusqlite::Error> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        display_name: row.get(3)?,
        avatar_url: row.get(4)?,
        account_type: row.get(5)?,
        partner_id: row.get(6)?,
        created_at: row.get(7)?,
        last_seen: row.get(8)?,
    })
}

fn message_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<MessageRow, rusqlite::Error> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        content: row.get(3)?,
        kind: row.get(4)?,
        file_url: row.get(5)?,
        file_name: row.get(6)?,
        file_size: row.get(7)?,
        voice_duration: row.get(8)?,
        delivered: row.get(9)?,
        read: row.get(10)?,
        read_at: row.get(11)?,
        created_at: row.get(12)?,
    })
}

fn chat_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<ChatRow, rusqlite::Error> {
    Ok(ChatRow {
        id: row.get(0)?,
        user_lo: row.get(1)?,
        user_hi: row.get(2)?,
        is_private_room: row.get(3)?,
        wallpaper: row.get(4)?,
        created_at: row.get(5)?,
        last_message_at: row.get(6)?,
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
    use uuid::Uuid;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn add_user(db: &Database, username: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        db.create_user(&UserRow {
            id: id.clone(),
            username: username.to_string(),
            password: "hash".to_string(),
            display_name: username.to_string(),
            avatar_url: None,
            account_type: "open".to_string(),
            partner_id: None,
            created_at: now,
            last_seen: now,
        })
        .unwrap();
        id
    }

    fn add_message(db: &Database, sender: &str, receiver: &str, content: &str, at: DateTime<Utc>) -> String {
        let id = Uuid::new_v4().to_string();
        db.insert_message(&MessageRow {
            id: id.clone(),
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            content: content.to_string(),
            kind: "text".to_string(),
            file_url: None,
            file_name: None,
            file_size: None,
            voice_duration: None,
            delivered: true,
            read: false,
            read_at: None,
            created_at: at,
        })
        .unwrap();
        id
    }

    #[test]
    fn ensure_chat_is_unique_per_pair() {
        let db = test_db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let now = Utc::now();

        let first = db
            .ensure_chat(&Uuid::new_v4().to_string(), &alice, &bob, false, now)
            .unwrap();
        // Opposite participant order, fresh candidate id: must find, not create.
        let second = db
            .ensure_chat(&Uuid::new_v4().to_string(), &bob, &alice, false, now)
            .unwrap();
        assert_eq!(first, second);

        let chats = db.chats_for_user(&alice).unwrap();
        assert_eq!(chats.len(), 1);
        assert!(chats[0].has_participant(&bob));
        assert_eq!(chats[0].other_participant(&alice), bob);
    }

    #[test]
    fn concurrent_first_calls_agree_on_one_chat() {
        let db = std::sync::Arc::new(test_db());
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                let (a, b) = (alice.clone(), bob.clone());
                std::thread::spawn(move || {
                    db.ensure_chat(&Uuid::new_v4().to_string(), &a, &b, false, Utc::now())
                        .unwrap()
                })
            })
            .collect();

        let ids: std::collections::HashSet<String> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(ids.len(), 1);
        assert_eq!(db.chats_for_user(&alice).unwrap().len(), 1);
    }

    #[test]
    fn self_pair_gets_a_single_chat() {
        let db = test_db();
        let alice = add_user(&db, "alice");
        let now = Utc::now();

        let first = db
            .ensure_chat(&Uuid::new_v4().to_string(), &alice, &alice, false, now)
            .unwrap();
        let second = db
            .ensure_chat(&Uuid::new_v4().to_string(), &alice, &alice, false, now)
            .unwrap();
        assert_eq!(first, second);

        let chats = db.chats_for_user(&alice).unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].other_participant(&alice), alice);
    }

    #[test]
    fn store_message_is_all_or_nothing() {
        let db = test_db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let carol = add_user(&db, "carol");
        let now = Utc::now();

        let taken = db
            .ensure_chat(&Uuid::new_v4().to_string(), &alice, &bob, false, now)
            .unwrap();

        // Reusing an existing chat id for a different pair trips the chats
        // primary key after the message insert; both must roll back.
        let msg_id = Uuid::new_v4().to_string();
        let result = db.store_message(
            &MessageRow {
                id: msg_id.clone(),
                sender_id: alice.clone(),
                receiver_id: carol.clone(),
                content: "hi".to_string(),
                kind: "text".to_string(),
                file_url: None,
                file_name: None,
                file_size: None,
                voice_duration: None,
                delivered: true,
                read: false,
                read_at: None,
                created_at: now,
            },
            &taken,
            false,
        );
        assert!(result.is_err());
        assert!(db.get_message(&msg_id).unwrap().is_none());
        assert!(db.chats_for_user(&carol).unwrap().is_empty());
    }

    #[test]
    fn ensure_chat_bumps_recency_and_keeps_flags() {
        let db = test_db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(10);

        let id = db
            .ensure_chat(&Uuid::new_v4().to_string(), &alice, &bob, true, t0)
            .unwrap();
        db.ensure_chat(&Uuid::new_v4().to_string(), &alice, &bob, false, t1)
            .unwrap();

        let chat = db.get_chat(&id).unwrap().unwrap();
        assert_eq!(chat.last_message_at, t1);
        // Flag fixed at creation, not rewritten by later upserts.
        assert!(chat.is_private_room);
    }

    #[test]
    fn reaction_last_write_wins_then_removal() {
        let db = test_db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let msg = add_message(&db, &alice, &bob, "hi", Utc::now());

        db.set_reaction(&msg, &bob, "👍").unwrap();
        db.set_reaction(&msg, &bob, "😂").unwrap();

        let reactions = db.reactions_for_messages(&[msg.clone()]).unwrap();
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].emoji, "😂");

        assert!(db.clear_reaction(&msg, &bob).unwrap());
        assert!(!db.clear_reaction(&msg, &bob).unwrap());
        assert!(db.reactions_for_messages(&[msg]).unwrap().is_empty());
    }

    #[test]
    fn mark_read_scopes_to_one_direction() {
        let db = test_db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let now = Utc::now();

        let from_bob = add_message(&db, &bob, &alice, "one", now);
        let from_alice = add_message(&db, &alice, &bob, "two", now + Duration::seconds(1));

        let read_at = now + Duration::seconds(5);
        let changed = db.mark_read(&bob, &alice, read_at).unwrap();
        assert_eq!(changed, 1);
        // Idempotent: nothing left unread in that direction.
        assert_eq!(db.mark_read(&bob, &alice, read_at).unwrap(), 0);

        let bobs = db.get_message(&from_bob).unwrap().unwrap();
        assert!(bobs.read);
        assert_eq!(bobs.read_at, Some(read_at));

        let alices = db.get_message(&from_alice).unwrap().unwrap();
        assert!(!alices.read);
        assert!(alices.read_at.is_none());
    }

    #[test]
    fn history_page_windows_from_most_recent() {
        let db = test_db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let t0 = Utc::now();

        for i in 0..5i64 {
            let (s, r) = if i % 2 == 0 { (&alice, &bob) } else { (&bob, &alice) };
            add_message(&db, s, r, &format!("m{i}"), t0 + Duration::seconds(i));
        }

        // Newest first, skipping the two most recent.
        let page = db.history_page(&alice, &bob, 2, 2).unwrap();
        let contents: Vec<_> = page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m1"]);

        // Participant order must not matter.
        let mirrored = db.history_page(&bob, &alice, 2, 2).unwrap();
        let mirrored: Vec<_> = mirrored.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, mirrored);
    }

    #[test]
    fn search_only_returns_open_accounts() {
        let db = test_db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bobcat");
        let carol = add_user(&db, "bobbin");
        db.link_partner(&carol, &alice).unwrap();

        let hits = db.search_open_users("bob", &alice, 20).unwrap();
        let names: Vec<_> = hits.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["bobcat"]);
        assert_eq!(hits[0].id, bob);
    }
}
