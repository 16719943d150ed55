use std::sync::Arc;

use tracing::debug;

use parley_db::Database;
use parley_db::models::NotificationRow;
use parley_types::chat::{ChatEvent, personal_group};

use crate::error::GatewayError;
use crate::registry::GroupRegistry;
use crate::session::run_blocking;

/// Persists notifications and publishes them to the user's personal group.
///
/// Delivery is best-effort: with no active connection the frame is simply
/// dropped, and the stored row stays retrievable through the platform's read
/// path.
#[derive(Clone)]
pub struct Notifier {
    db: Arc<Database>,
    registry: GroupRegistry,
}

impl Notifier {
    pub fn new(db: Arc<Database>, registry: GroupRegistry) -> Self {
        Self { db, registry }
    }

    /// Persist an unread notification row.
    pub async fn create(
        &self,
        user_id: i64,
        content: &str,
        kind: i64,
    ) -> Result<NotificationRow, GatewayError> {
        let db = self.db.clone();
        let content = content.to_string();
        run_blocking(move || db.insert_notification(user_id, &content, kind)).await
    }

    /// Publish a stored notification to the user's personal group.
    pub async fn publish(&self, notification: &NotificationRow) {
        let frame = serde_json::to_string(&ChatEvent::Notification {
            notification: notification.to_payload(),
        })
        .unwrap();

        let delivered = self
            .registry
            .send(&personal_group(notification.user_id), &frame)
            .await;
        if delivered == 0 {
            debug!(
                user_id = notification.user_id,
                notification_id = notification.id,
                "no active connections, notification stored only"
            );
        }
    }

    /// Persist then publish. A persistence failure aborts before any fanout.
    pub async fn notify(
        &self,
        user_id: i64,
        content: &str,
        kind: i64,
    ) -> Result<NotificationRow, GatewayError> {
        let notification = self.create(user_id, content, kind).await?;
        self.publish(&notification).await;
        Ok(notification)
    }
}
