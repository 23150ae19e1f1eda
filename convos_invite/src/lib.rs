//! Invite minting, verification and transport encoding.
//!
//! An invite is a protobuf payload describing the conversation being offered,
//! signed by its creator and serialized to a URL-safe "slug" that travels
//! over deep links, QR codes or direct-message bodies.

pub mod configuration;
pub mod detect;
pub mod metadata;
pub mod payload;
mod proto;
pub mod signed;

use thiserror::Error;

pub use detect::looks_like_slug;
pub use metadata::{generate_tag, ConversationMetadata, MemberProfile};
pub use payload::InvitePayload;
pub use signed::{InviteOptions, SignedInvite};

#[derive(Debug, Error)]
pub enum InviteError {
    /// The slug or link does not parse into a signed invite.
    #[error("invalid invite format")]
    InvalidFormat,
    /// Signature verification failed. The invite must be rejected.
    #[error("invite signature is invalid")]
    SignatureInvalid,
    /// The invite's own TTL has passed.
    #[error("invite has expired")]
    Expired,
    /// The conversation's self-destruct time has passed.
    #[error("conversation has expired")]
    ConversationExpired,
    #[error("serialization: {0}")]
    Serialization(#[from] prost::EncodeError),
    #[error("deserialization: {0}")]
    Deserialization(#[from] prost::DecodeError),
}

impl convos_common::RetryableError for InviteError {
    fn is_retryable(&self) -> bool {
        false
    }
}
