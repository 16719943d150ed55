use crate::Database;
use crate::models::{MessageRow, NotificationRow, UserRow};
use anyhow::Result;
use parley_types::chat::conversation_key;
use rusqlite::Connection;

impl Database {
    // -- Users --

    pub fn create_user(&self, username: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute("INSERT INTO users (username) VALUES (?1)", [username])?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    // -- Messages --

    /// Store one immutable message row under the canonical conversation key
    /// for the (sender, recipient) pair and return it.
    pub fn insert_message(&self, sender_id: i64, recipient_id: i64, text: &str) -> Result<MessageRow> {
        let key = conversation_key(sender_id, recipient_id);
        let created_at = now_rfc3339();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (conversation_key, sender_id, recipient_id, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![key, sender_id, recipient_id, text, created_at],
            )?;

            Ok(MessageRow {
                id: conn.last_insert_rowid(),
                conversation_key: key.clone(),
                sender_id,
                recipient_id,
                text: text.to_string(),
                is_read: false,
                created_at: created_at.clone(),
            })
        })
    }

    /// Last `limit` messages between the two users, oldest first.
    /// The pair is unordered — both directions land under one key.
    pub fn conversation_history(&self, a: i64, b: i64, limit: u32) -> Result<Vec<MessageRow>> {
        let key = conversation_key(a, b);
        self.with_conn(|conn| query_conversation(conn, &key, limit))
    }

    // -- Notifications --

    pub fn insert_notification(&self, user_id: i64, content: &str, kind: i64) -> Result<NotificationRow> {
        let created_at = now_rfc3339();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (user_id, content, kind, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![user_id, content, kind, created_at],
            )?;

            Ok(NotificationRow {
                id: conn.last_insert_rowid(),
                user_id,
                content: content.to_string(),
                kind,
                is_read: false,
                created_at: created_at.clone(),
            })
        })
    }
}

/// Fixed-width ISO-8601 so stored timestamps sort lexicographically.
fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

fn query_user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare("SELECT id, username, created_at FROM users WHERE id = ?1")?;

    let row = stmt
        .query_row([id], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                created_at: row.get(2)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_conversation(conn: &Connection, key: &str, limit: u32) -> Result<Vec<MessageRow>> {
    // Select most-recent-first up to `limit`, then flip to chronological.
    let mut stmt = conn.prepare(
        "SELECT id, conversation_key, sender_id, recipient_id, text, is_read, created_at
         FROM messages
         WHERE conversation_key = ?1
         ORDER BY created_at DESC, id DESC
         LIMIT ?2",
    )?;

    let mut rows = stmt
        .query_map(rusqlite::params![key, limit], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                conversation_key: row.get(1)?,
                sender_id: row.get(2)?,
                recipient_id: row.get(3)?,
                text: row.get(4)?,
                is_read: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.reverse();
    Ok(rows)
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
    use crate::Database;

    fn db_with_users(names: &[&str]) -> (Database, Vec<i64>) {
        let db = Database::open_in_memory().unwrap();
        let ids = names.iter().map(|n| db.create_user(n).unwrap()).collect();
        (db, ids)
    }

    #[test]
    fn user_lookup() {
        let (db, ids) = db_with_users(&["alice"]);
        let user = db.get_user_by_id(ids[0]).unwrap().unwrap();
        assert_eq!(user.username, "alice");
        assert!(db.get_user_by_id(99999).unwrap().is_none());
    }

    #[test]
    fn both_directions_share_one_conversation() {
        let (db, ids) = db_with_users(&["alice", "bob"]);
        let (a, b) = (ids[0], ids[1]);

        let m1 = db.insert_message(a, b, "hi bob").unwrap();
        let m2 = db.insert_message(b, a, "hi alice").unwrap();
        assert_eq!(m1.conversation_key, m2.conversation_key);

        let history = db.conversation_history(b, a, 50).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text, "hi bob");
        assert_eq!(history[1].text, "hi alice");
    }

    #[test]
    fn history_respects_limit_and_order() {
        let (db, ids) = db_with_users(&["alice", "bob"]);
        let (a, b) = (ids[0], ids[1]);

        for i in 0..5 {
            db.insert_message(a, b, &format!("msg {i}")).unwrap();
        }

        let history = db.conversation_history(a, b, 3).unwrap();
        assert_eq!(history.len(), 3);
        // Most recent 3, returned oldest first
        assert_eq!(history[0].text, "msg 2");
        assert_eq!(history[2].text, "msg 4");
        for pair in history.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }
    }

    #[test]
    fn empty_history() {
        let (db, ids) = db_with_users(&["alice", "bob"]);
        let history = db.conversation_history(ids[0], ids[1], 50).unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn notifications_start_unread() {
        let (db, ids) = db_with_users(&["alice"]);
        let row = db.insert_notification(ids[0], "bob liked your post", 1).unwrap();
        assert!(!row.is_read);
        assert_eq!(row.user_id, ids[0]);
        assert_eq!(row.kind, 1);
    }
}
