//! Time-based garbage collection for expired conversations and the
//! identities created solely to host them.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use convos_common::time::{interval_stream, now_ns};

use crate::{
    client::MessagingClient,
    configuration::{IDENTITY_GRACE_NS, REAPER_INTERVAL},
    error::ClientError,
    pending::PendingInviteStore,
    store::ConversationStore,
};

pub struct ExpirationReaper<C, S> {
    client: Arc<C>,
    store: Arc<S>,
    pending: Arc<PendingInviteStore>,
}

impl<C, S> ExpirationReaper<C, S>
where
    C: MessagingClient + 'static,
    S: ConversationStore + 'static,
{
    pub fn new(client: Arc<C>, store: Arc<S>, pending: Arc<PendingInviteStore>) -> Self {
        Self {
            client,
            store,
            pending,
        }
    }

    pub fn spawn(self, token: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run(token).await })
    }

    pub async fn run(self, token: CancellationToken) {
        let mut intervals = interval_stream(REAPER_INTERVAL);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                tick = intervals.next() => {
                    if tick.is_none() {
                        break;
                    }
                    if let Err(e) = self.sweep(now_ns()).await {
                        tracing::error!(error = %e, "reaper sweep failed");
                    }
                }
            }
        }
    }

    /// One full pass. Idempotent and safe to run repeatedly; a failure on
    /// one entry does not stop the rest of the sweep.
    pub async fn sweep(&self, now_ns: i64) -> Result<(), ClientError> {
        let conversations = self.sweep_conversations(now_ns).await?;
        let identities = self.sweep_identities(now_ns).await?;
        let invites = self.pending.purge_expired(now_ns);
        if conversations > 0 || identities > 0 || invites > 0 {
            tracing::info!(
                conversations,
                identities,
                invites,
                "reaper deleted expired state"
            );
        }
        Ok(())
    }

    /// Delete conversations whose self-destruct time is at or before now,
    /// along with their messages. Rows with no expiry are never touched.
    async fn sweep_conversations(&self, now_ns: i64) -> Result<usize, ClientError> {
        let expired = self.store.expired_before(now_ns)?;
        let mut deleted = 0;
        for conversation in expired {
            if let Err(e) = self.client.delete_conversation(&conversation.id).await {
                tracing::warn!(conversation_id = %conversation.id, error = %e, "failed to delete expired conversation");
                continue;
            }
            if let Err(e) = self.store.delete(&conversation.id) {
                tracing::warn!(conversation_id = %conversation.id, error = %e, "failed to drop expired row");
                continue;
            }
            deleted += 1;
        }
        Ok(deleted)
    }

    /// Delete locally-created identities owning zero allowed conversations,
    /// except those inside the grace window, which may still be racing
    /// their first conversation into existence.
    async fn sweep_identities(&self, now_ns: i64) -> Result<usize, ClientError> {
        let identities = self.client.local_identities().await?;
        let mut deleted = 0;
        for identity in identities {
            if now_ns - identity.created_at_ns < IDENTITY_GRACE_NS {
                continue;
            }
            if self.store.allowed_count_for_inbox(&identity.inbox_id)? > 0 {
                continue;
            }
            if let Err(e) = self.client.delete_identity(&identity.inbox_id).await {
                tracing::warn!(inbox_id = %identity.inbox_id, error = %e, "failed to delete orphaned identity");
                continue;
            }
            deleted += 1;
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::test_utils::FakeClient;
    use crate::types::{ConsentState, Conversation, ConversationKind};
    use crate::InMemoryConversationStore;
    use convos_common::time::{Duration, NS_IN_SEC};
    use convos_invite::{InviteOptions, SignedInvite};
    use ed25519_dalek::SigningKey;

    fn row(id: &str, inbox: &str, consent: ConsentState, expires_at_ns: Option<i64>) -> Conversation {
        Conversation {
            id: id.to_string(),
            kind: ConversationKind::Group,
            inbox_id: inbox.to_string(),
            creator_inbox_id: "creator".to_string(),
            tag: None,
            consent,
            expires_at_ns,
            name: String::new(),
            description: String::new(),
            image_url: String::new(),
            last_message_ns: None,
            pinned: false,
            muted: false,
            unread_count: 0,
        }
    }

    fn reaper() -> (
        Arc<FakeClient>,
        Arc<InMemoryConversationStore>,
        Arc<PendingInviteStore>,
        ExpirationReaper<FakeClient, InMemoryConversationStore>,
    ) {
        let client = Arc::new(FakeClient::new());
        let store = Arc::new(InMemoryConversationStore::new());
        let pending = Arc::new(PendingInviteStore::new());
        let reaper = ExpirationReaper::new(client.clone(), store.clone(), pending.clone());
        (client, store, pending, reaper)
    }

    #[tokio::test]
    async fn deletes_only_conversations_past_their_expiry() {
        let (client, store, _pending, reaper) = reaper();
        let now = 1_000 * NS_IN_SEC;
        store
            .upsert(row("past", "i1", ConsentState::Allowed, Some(now - 1)))
            .unwrap();
        store
            .upsert(row("boundary", "i2", ConsentState::Allowed, Some(now)))
            .unwrap();
        store
            .upsert(row("future", "i3", ConsentState::Allowed, Some(now + 1)))
            .unwrap();
        store
            .upsert(row("forever", "i4", ConsentState::Denied, None))
            .unwrap();

        reaper.sweep(now).await.unwrap();

        assert!(store.get("past").unwrap().is_none());
        assert!(store.get("boundary").unwrap().is_none());
        assert!(store.get("future").unwrap().is_some());
        assert!(store.get("forever").unwrap().is_some());
        let mut deleted = client.deleted_conversations();
        deleted.sort_unstable();
        assert_eq!(deleted, vec!["boundary".to_string(), "past".to_string()]);
    }

    #[tokio::test]
    async fn sweeping_twice_is_idempotent() {
        let (client, store, _pending, reaper) = reaper();
        let now = 1_000 * NS_IN_SEC;
        store
            .upsert(row("past", "i1", ConsentState::Allowed, Some(now - 1)))
            .unwrap();
        reaper.sweep(now).await.unwrap();
        reaper.sweep(now).await.unwrap();
        assert_eq!(client.deleted_conversations().len(), 1);
    }

    fn invite(tag: &str, ttl: Duration) -> SignedInvite {
        SignedInvite::create(
            InviteOptions {
                conversation_id: "conv".into(),
                creator_inbox_id: "creator".into(),
                tag: tag.into(),
                name: None,
                description: None,
                image_url: None,
                invite_ttl: ttl,
                conversation_expires_at_ns: None,
            },
            &SigningKey::from_bytes(&[7u8; 32]),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn sweep_purges_pending_invites_past_their_ttl() {
        let (_client, _store, pending, reaper) = reaper();
        pending.store(invite("fresh", Duration::from_secs(3600))).unwrap();
        pending.store(invite("stale", Duration::from_secs(1))).unwrap();

        reaper.sweep(now_ns() + 10 * NS_IN_SEC).await.unwrap();

        assert!(pending.has("fresh"));
        assert!(!pending.has("stale"));
    }

    /// Delegates to an in-memory store but refuses to drop one row.
    struct BrokenDeleteStore {
        inner: InMemoryConversationStore,
        broken_id: &'static str,
    }

    impl ConversationStore for BrokenDeleteStore {
        fn get(&self, conversation_id: &str) -> Result<Option<Conversation>, StorageError> {
            self.inner.get(conversation_id)
        }

        fn upsert(&self, conversation: Conversation) -> Result<(), StorageError> {
            self.inner.upsert(conversation)
        }

        fn delete(&self, conversation_id: &str) -> Result<(), StorageError> {
            if conversation_id == self.broken_id {
                return Err(StorageError::Internal("disk full".into()));
            }
            self.inner.delete(conversation_id)
        }

        fn all(&self) -> Result<Vec<Conversation>, StorageError> {
            self.inner.all()
        }

        fn expired_before(&self, now_ns: i64) -> Result<Vec<Conversation>, StorageError> {
            self.inner.expired_before(now_ns)
        }

        fn allowed_count_for_inbox(&self, inbox_id: &str) -> Result<usize, StorageError> {
            self.inner.allowed_count_for_inbox(inbox_id)
        }
    }

    #[tokio::test]
    async fn one_failed_row_drop_does_not_stop_the_sweep() {
        let client = Arc::new(FakeClient::new());
        let store = Arc::new(BrokenDeleteStore {
            inner: InMemoryConversationStore::new(),
            broken_id: "stuck",
        });
        let reaper = ExpirationReaper::new(
            client.clone(),
            store.clone(),
            Arc::new(PendingInviteStore::new()),
        );
        let now = 1_000 * NS_IN_SEC;
        store
            .upsert(row("stuck", "i1", ConsentState::Allowed, Some(now - 1)))
            .unwrap();
        store
            .upsert(row("gone", "i2", ConsentState::Allowed, Some(now - 1)))
            .unwrap();
        client.register_identity_created_at("orphan", now - 2 * IDENTITY_GRACE_NS);

        reaper.sweep(now).await.unwrap();

        // the failing row stays; everything after it is still swept
        assert!(store.get("gone").unwrap().is_none());
        assert!(store.get("stuck").unwrap().is_some());
        assert_eq!(client.deleted_identities(), vec!["orphan".to_string()]);
    }

    #[tokio::test]
    async fn orphaned_identities_are_deleted_after_the_grace_window() {
        let (client, store, _pending, reaper) = reaper();
        let now = now_ns();
        // orphaned and old enough
        client.register_identity_created_at("old-orphan", now - 2 * IDENTITY_GRACE_NS);
        // orphaned but inside the grace window; may still be racing setup
        client.register_identity_created_at("fresh-orphan", now - IDENTITY_GRACE_NS / 2);
        // old, but it still hosts an allowed conversation
        client.register_identity_created_at("occupied", now - 2 * IDENTITY_GRACE_NS);
        store
            .upsert(row("c1", "occupied", ConsentState::Allowed, None))
            .unwrap();
        // old, hosting only a denied conversation; denied rows do not count
        client.register_identity_created_at("denied-host", now - 2 * IDENTITY_GRACE_NS);
        store
            .upsert(row("c2", "denied-host", ConsentState::Denied, None))
            .unwrap();

        reaper.sweep(now).await.unwrap();

        let mut deleted = client.deleted_identities();
        deleted.sort_unstable();
        assert_eq!(
            deleted,
            vec!["denied-host".to_string(), "old-orphan".to_string()]
        );
    }
}
