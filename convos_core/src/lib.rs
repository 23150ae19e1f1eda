//! Conversation-consent engine for the convos client.
//!
//! Merges three concurrently-arriving views of conversation state, the full
//! resynchronization pull, the incremental push stream, and the invite side
//! channel, into one locally-consistent, monotonic trust decision per
//! conversation. Invite minting and verification live in `convos_invite`;
//! the underlying secure-messaging network and the local row store are
//! reached through the traits in [`client`] and [`store`].

pub mod client;
pub mod configuration;
pub mod error;
pub mod join_requests;
pub mod pending;
pub mod reaper;
pub mod reconcile;
pub mod store;
pub mod tasks;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;


pub use client::MessagingClient;
pub use error::ClientError;
pub use join_requests::JoinRequestProcessor;
pub use pending::{InviteMatched, PendingInvite, PendingInviteStore};
pub use reaper::ExpirationReaper;
pub use reconcile::{ConsentReconciler, MatchLedger, ReconcileSource};
pub use store::{ConversationStore, InMemoryConversationStore};
pub use tasks::{spawn_for_identity, IdentityTasks};
pub use types::{
    ConsentState, Conversation, ConversationKind, JoinRequest, LocalIdentity, RemoteConversation,
    RemoteMessage,
};
