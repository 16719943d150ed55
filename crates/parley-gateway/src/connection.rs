use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::{info, warn};

use parley_db::Database;
use parley_db::models::UserRow;
use parley_types::api::Claims;

use crate::error::GatewayError;
use crate::registry::GroupRegistry;
use crate::session::{Session, run_blocking};

/// Verify the bearer token carried in the upgrade path and resolve the
/// subject against the account store. Runs BEFORE the upgrade is accepted —
/// a bad token is refused at the HTTP layer, never accepted-then-closed.
pub async fn authenticate_token(
    token: &str,
    jwt_secret: &str,
    db: &Arc<Database>,
) -> Result<UserRow, GatewayError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| GatewayError::Auth)?;

    let user_id = token_data.claims.sub;
    let db = db.clone();
    let user = run_blocking(move || db.get_user_by_id(user_id)).await?;

    // Token subject no longer exists — terminal for this attempt
    user.ok_or(GatewayError::Auth)
}

/// Drive one authenticated WebSocket connection until it closes.
///
/// Two tasks per connection: this read loop, which dispatches commands
/// sequentially so one sender's messages broadcast in issue order, and a
/// send task draining the session's outbox into the socket.
pub async fn handle_connection(
    socket: WebSocket,
    registry: GroupRegistry,
    db: Arc<Database>,
    user_id: i64,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();

    let mut session = Session::connect(registry, db, user_id, tx).await;
    let conn_id = session.conn_id();
    info!(user_id, %conn_id, "chat connection open");

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => session.handle_text(&text).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(user_id, %conn_id, "socket error: {e}");
                    break;
                }
            },
            _ = &mut send_task => break,
        }
    }

    send_task.abort();

    // Membership must be fully released before the connection resource drops
    session.disconnect().await;
    info!(user_id, %conn_id, "chat connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    const SECRET: &str = "test-secret";

    fn token_for(user_id: i64, exp_offset_secs: i64) -> String {
        let claims = Claims {
            sub: user_id,
            exp: (chrono::Utc::now().timestamp() + exp_offset_secs) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn valid_token_resolves_user() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let alice = db.create_user("alice").unwrap();

        let user = authenticate_token(&token_for(alice, 3600), SECRET, &db)
            .await
            .unwrap();
        assert_eq!(user.id, alice);
        assert_eq!(user.username, "alice");
    }

    #[tokio::test]
    async fn garbage_token_is_refused() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let err = authenticate_token("not-a-jwt", SECRET, &db).await.unwrap_err();
        assert!(matches!(err, GatewayError::Auth));
    }

    #[tokio::test]
    async fn expired_token_is_refused() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let alice = db.create_user("alice").unwrap();

        let err = authenticate_token(&token_for(alice, -3600), SECRET, &db)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Auth));
    }

    #[tokio::test]
    async fn unknown_subject_is_refused() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let err = authenticate_token(&token_for(99999, 3600), SECRET, &db)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Auth));
    }

    #[tokio::test]
    async fn wrong_secret_is_refused() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let alice = db.create_user("alice").unwrap();

        let err = authenticate_token(&token_for(alice, 3600), "other-secret", &db)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Auth));
    }
}
