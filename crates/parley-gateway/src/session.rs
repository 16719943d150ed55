use std::collections::HashSet;
use std::sync::Arc;

use anyhow::anyhow;
use serde::Serialize;
use tracing::{debug, error, warn};
use uuid::Uuid;

use parley_db::Database;
use parley_db::models::{MessageRow, UserRow};
use parley_types::chat::{
    ChatCommand, ChatEvent, EnvelopeError, ErrorReply, MessagePayload, conversation_key,
    personal_group,
};

use crate::error::GatewayError;
use crate::registry::{ConnId, GroupRegistry, OutboundSender};

const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Run a blocking database call off the async scheduler.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, GatewayError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| GatewayError::Storage(anyhow!("blocking task join error: {e}")))?
        .map_err(GatewayError::Storage)
}

/// Per-connection state: the authenticated identity plus every group this
/// connection has joined. Also the command dispatcher — inbound envelopes are
/// handled here, one at a time, so a sender's messages broadcast in the order
/// they were issued.
pub struct Session {
    conn_id: ConnId,
    user_id: i64,
    joined: HashSet<String>,
    tx: OutboundSender,
    registry: GroupRegistry,
    db: Arc<Database>,
}

impl Session {
    /// Build the session for an authenticated connection and auto-join its
    /// personal notification group.
    pub async fn connect(
        registry: GroupRegistry,
        db: Arc<Database>,
        user_id: i64,
        tx: OutboundSender,
    ) -> Self {
        let mut session = Self {
            conn_id: Uuid::new_v4(),
            user_id,
            joined: HashSet::new(),
            tx,
            registry,
            db,
        };
        let personal = personal_group(user_id);
        session.join_group(&personal).await;
        session
    }

    pub fn conn_id(&self) -> ConnId {
        self.conn_id
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    /// Decode and dispatch one inbound text frame.
    pub async fn handle_text(&mut self, text: &str) {
        match ChatCommand::parse(text) {
            Ok(cmd) => {
                if let Err(e) = self.handle_command(cmd).await {
                    self.reply_with_error(&e);
                }
            }
            Err(EnvelopeError::Unknown(name)) => {
                self.send_reply(&ErrorReply::unknown_command(name));
            }
            Err(EnvelopeError::Invalid(name)) => {
                self.send_reply(&ErrorReply::new(format!("invalid {name} payload")));
            }
            Err(EnvelopeError::Malformed) => {
                // Truncate on a char boundary — a byte slice can split a
                // multi-byte character and panic
                let preview: String = text.chars().take(200).collect();
                warn!(user_id = self.user_id, "dropping malformed frame: {preview}");
            }
        }
    }

    async fn handle_command(&mut self, cmd: ChatCommand) -> Result<(), GatewayError> {
        match cmd {
            ChatCommand::Join { other_id } => {
                let other = other_id.ok_or_else(|| {
                    GatewayError::Validation("other_id required for join".into())
                })?;
                let group = conversation_key(self.user_id, other);
                self.join_group(&group).await;

                let messages = self.fetch_history(other, DEFAULT_HISTORY_LIMIT).await?;
                self.send_reply(&ChatEvent::History { messages });
                Ok(())
            }

            ChatCommand::Leave { other_id } => {
                let Some(other) = other_id else {
                    debug!(user_id = self.user_id, "leave without other_id ignored");
                    return Ok(());
                };
                let group = conversation_key(self.user_id, other);
                self.leave_group(&group).await;
                Ok(())
            }

            ChatCommand::History { other_id, limit } => {
                let Some(other) = other_id else {
                    debug!(user_id = self.user_id, "history without other_id ignored");
                    return Ok(());
                };
                let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
                let messages = self.fetch_history(other, limit).await?;
                self.send_reply(&ChatEvent::History { messages });
                Ok(())
            }

            ChatCommand::Message { to, text } => {
                let to =
                    to.ok_or_else(|| GatewayError::Validation("to and text required".into()))?;
                let text = text.as_deref().unwrap_or("").trim().to_string();
                if text.is_empty() {
                    return Err(GatewayError::Validation("to and text required".into()));
                }

                // Recipient must exist before anything is persisted
                let recipient = self
                    .resolve_user(to)
                    .await?
                    .ok_or(GatewayError::RecipientNotFound)?;

                let row = self.persist_message(recipient.id, &text).await?;

                // Direct send without a prior join still lands the sender in
                // the conversation group
                let group = conversation_key(self.user_id, recipient.id);
                self.join_group(&group).await;

                let frame = serde_json::to_string(&ChatEvent::Message {
                    message: row.to_payload(),
                })
                .unwrap();
                self.registry.send(&group, &frame).await;
                Ok(())
            }
        }
    }

    /// Release every joined group. Runs to completion even when the registry
    /// disagrees about a membership — that is logged and cleanup proceeds to
    /// the next group.
    pub async fn disconnect(mut self) {
        for group in std::mem::take(&mut self.joined) {
            if !self.registry.discard(&group, self.conn_id).await {
                warn!(
                    group,
                    conn_id = %self.conn_id,
                    "session was not a registry member during cleanup"
                );
            }
        }
    }

    async fn join_group(&mut self, group: &str) {
        if self.joined.insert(group.to_string()) {
            self.registry.add(group, self.conn_id, self.tx.clone()).await;
        }
    }

    async fn leave_group(&mut self, group: &str) {
        if self.joined.remove(group) {
            self.registry.discard(group, self.conn_id).await;
        }
    }

    async fn resolve_user(&self, id: i64) -> Result<Option<UserRow>, GatewayError> {
        let db = self.db.clone();
        run_blocking(move || db.get_user_by_id(id)).await
    }

    async fn fetch_history(
        &self,
        other: i64,
        limit: u32,
    ) -> Result<Vec<MessagePayload>, GatewayError> {
        let db = self.db.clone();
        let me = self.user_id;
        let rows = run_blocking(move || db.conversation_history(me, other, limit)).await?;
        Ok(rows.iter().map(MessageRow::to_payload).collect())
    }

    async fn persist_message(&self, to: i64, text: &str) -> Result<MessageRow, GatewayError> {
        let db = self.db.clone();
        let me = self.user_id;
        let text = text.to_string();
        run_blocking(move || db.insert_message(me, to, &text)).await
    }

    fn reply_with_error(&self, err: &GatewayError) {
        match err {
            GatewayError::Validation(msg) => self.send_reply(&ErrorReply::new(msg.clone())),
            GatewayError::RecipientNotFound => {
                self.send_reply(&ErrorReply::new("recipient not found"));
            }
            GatewayError::Storage(e) => {
                error!(user_id = self.user_id, "storage failure: {e:#}");
                self.send_reply(&ErrorReply::new("internal error"));
            }
            GatewayError::Auth => self.send_reply(&ErrorReply::new("unauthorized")),
        }
    }

    /// Queue a frame on this connection's own outbox. A closed outbox means
    /// the connection is going away; the frame is dropped.
    fn send_reply<T: Serialize>(&self, reply: &T) {
        let _ = self.tx.send(serde_json::to_string(reply).unwrap());
    }
}
