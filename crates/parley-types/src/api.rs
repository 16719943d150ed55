use serde::{Deserialize, Serialize};

// -- JWT Claims --

/// JWT claims shared between the upgrade handler (parley-server) and the
/// gateway's token verification. Canonical definition lives here in
/// parley-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub exp: usize,
}

// -- Internal notification ingress --

/// Body of `POST /internal/notifications`, raised by collaborator services
/// (likes, comments) to persist and fan out a notification.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateNotificationRequest {
    pub user_id: i64,
    pub content: String,
    pub kind: i64,
}
