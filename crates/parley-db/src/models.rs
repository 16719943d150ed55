//! Database row types — these map directly to SQLite rows.
//! Distinct from the parley-types wire payloads to keep the DB layer
//! independent.

use parley_types::chat::{MessagePayload, NotificationPayload};

#[derive(Debug)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub created_at: String,
}

#[derive(Debug)]
pub struct MessageRow {
    pub id: i64,
    pub conversation_key: String,
    pub sender_id: i64,
    pub recipient_id: i64,
    pub text: String,
    pub is_read: bool,
    pub created_at: String,
}

impl MessageRow {
    pub fn to_payload(&self) -> MessagePayload {
        MessagePayload {
            id: self.id,
            from: self.sender_id,
            to: self.recipient_id,
            text: self.text.clone(),
            created_at: self.created_at.clone(),
        }
    }
}

#[derive(Debug)]
pub struct NotificationRow {
    pub id: i64,
    pub user_id: i64,
    pub content: String,
    pub kind: i64,
    pub is_read: bool,
    pub created_at: String,
}

impl NotificationRow {
    pub fn to_payload(&self) -> NotificationPayload {
        NotificationPayload {
            id: self.id,
            user_id: self.user_id,
            content: self.content.clone(),
            kind: self.kind,
            is_read: self.is_read,
            created_at: self.created_at.clone(),
        }
    }
}
