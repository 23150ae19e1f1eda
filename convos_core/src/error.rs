use convos_common::RetryableError;
use convos_invite::InviteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("conversation not found: {0}")]
    NotFound(String),
    #[error("storage: {0}")]
    Internal(String),
}

#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport or sync failure against the messaging network. Retryable
    /// by the caller.
    #[error("network error: {0}")]
    Network(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Invite(#[from] InviteError),
    #[error("unknown client error: {0}")]
    Unknown(String),
}

impl RetryableError for ClientError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl RetryableError for StorageError {
    fn is_retryable(&self) -> bool {
        false
    }
}
