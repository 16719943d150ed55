use thiserror::Error;

/// Failures surfaced by the gateway core.
///
/// `Validation` and `RecipientNotFound` turn into error envelopes on the
/// offending connection, which stays open. `Storage` aborts the command with
/// no partial effects. `Auth` is only possible before the upgrade is
/// accepted.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid token")]
    Auth,

    #[error("{0}")]
    Validation(String),

    #[error("recipient not found")]
    RecipientNotFound,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
