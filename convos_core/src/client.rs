//! Contract required from the underlying secure-messaging client.
//!
//! The network owns group membership, message transport, the
//! per-conversation trust signal and a small application-data slot per
//! group; it also acts as the identity directory resolving an inbox id to
//! its signing public key.

use async_trait::async_trait;
use ed25519_dalek::VerifyingKey;
use futures::stream::BoxStream;

use crate::{
    error::ClientError,
    types::{ConsentState, LocalIdentity, RemoteConversation, RemoteMessage},
};

pub type ConversationStream = BoxStream<'static, Result<RemoteConversation, ClientError>>;

#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Full resynchronization pull: every conversation currently known to
    /// the network for this identity.
    async fn sync_conversations(
        &self,
        inbox_id: &str,
    ) -> Result<Vec<RemoteConversation>, ClientError>;

    /// Incremental push stream of newly-arriving conversations. May
    /// redeliver already-seen conversations after a reconnect.
    async fn stream_conversations(&self, inbox_id: &str)
        -> Result<ConversationStream, ClientError>;

    /// Direct messages received by this identity, newest last, bounded
    /// below by `since_ns` when given.
    async fn list_dm_messages(
        &self,
        inbox_id: &str,
        since_ns: Option<i64>,
    ) -> Result<Vec<RemoteMessage>, ClientError>;

    /// Send a direct message, creating the DM conversation with the peer if
    /// none exists.
    async fn send_dm(
        &self,
        sender_inbox_id: &str,
        peer_inbox_id: &str,
        body: &str,
    ) -> Result<(), ClientError>;

    /// The network's trust signal for a conversation.
    async fn consent_state(&self, conversation_id: &str) -> Result<ConsentState, ClientError>;

    async fn set_consent_state(
        &self,
        conversation_id: &str,
        state: ConsentState,
    ) -> Result<(), ClientError>;

    /// The group's small application-data slot.
    async fn app_data(&self, conversation_id: &str) -> Result<Option<Vec<u8>>, ClientError>;

    async fn set_app_data(&self, conversation_id: &str, data: Vec<u8>) -> Result<(), ClientError>;

    async fn group_members(&self, conversation_id: &str) -> Result<Vec<String>, ClientError>;

    /// Adding an already-present member is a no-op, not an error.
    async fn add_group_member(
        &self,
        conversation_id: &str,
        inbox_id: &str,
    ) -> Result<(), ClientError>;

    /// Identity directory: the signing public key for an inbox.
    async fn verifying_key(&self, inbox_id: &str) -> Result<VerifyingKey, ClientError>;

    /// Delete a conversation and all of its messages.
    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ClientError>;

    async fn local_identities(&self) -> Result<Vec<LocalIdentity>, ClientError>;

    async fn delete_identity(&self, inbox_id: &str) -> Result<(), ClientError>;
}
