//! The per-conversation consent state machine.
//!
//! Three producers feed this module: the full resynchronization pull, the
//! incremental push stream, and the invite side channel. Each pass takes
//! the conversation's keyed lock, reads the current row, merges, and writes
//! at most once, so concurrent sync and stream events for the same id can
//! never drop a consent upgrade or a user preference.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use convos_invite::ConversationMetadata;

use crate::{
    client::MessagingClient,
    error::ClientError,
    pending::PendingInviteStore,
    store::ConversationStore,
    types::{ConsentState, Conversation, ConversationKind, RemoteConversation},
};

/// Which producer delivered the conversation being reconciled.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReconcileSource {
    /// Full resynchronization pull.
    FullSync,
    /// Incremental push stream.
    Stream,
}

/// One async mutex per conversation id. Serializes the
/// read-merge-write cycle per key.
#[derive(Default)]
pub(crate) struct ConversationLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConversationLocks {
    pub(crate) fn get(&self, conversation_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.inner
            .lock()
            .entry(conversation_id.to_string())
            .or_default()
            .clone()
    }
}

/// Groups the creator-side join-request processor admitted a member to.
/// Lets a push-stream arrival of that group in the same event resolve to
/// `Allowed` instead of the unsolicited-group default.
#[derive(Default)]
pub struct MatchLedger {
    inner: Mutex<HashSet<String>>,
}

impl MatchLedger {
    pub fn record(&self, conversation_id: &str) {
        self.inner.lock().insert(conversation_id.to_string());
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.inner.lock().contains(conversation_id)
    }
}

pub struct ConsentReconciler<C, S> {
    client: Arc<C>,
    store: Arc<S>,
    pending: Arc<PendingInviteStore>,
    matches: Arc<MatchLedger>,
    locks: ConversationLocks,
}

impl<C, S> ConsentReconciler<C, S>
where
    C: MessagingClient,
    S: ConversationStore,
{
    pub fn new(
        client: Arc<C>,
        store: Arc<S>,
        pending: Arc<PendingInviteStore>,
        matches: Arc<MatchLedger>,
    ) -> Self {
        Self {
            client,
            store,
            pending,
            matches,
            locks: ConversationLocks::default(),
        }
    }

    /// Merge one observed conversation into the local row.
    ///
    /// Returns the written row, or `None` when nothing meaningful changed
    /// and the write was skipped. Errors leave the row untouched; callers
    /// log and move on, redelivery is expected and every path here is safe
    /// to apply twice.
    pub async fn reconcile(
        &self,
        inbox_id: &str,
        remote: RemoteConversation,
        source: ReconcileSource,
    ) -> Result<Option<Conversation>, ClientError> {
        let lock = self.locks.get(&remote.id);
        let _guard = lock.lock().await;

        let existing = self.store.get(&remote.id)?;
        let metadata = self.fetch_metadata(&remote.id).await;
        let tag = metadata
            .as_ref()
            .map(|m| m.tag.clone())
            .filter(|t| !t.is_empty());
        let pending_match = tag.as_deref().map(|t| self.pending.has(t)).unwrap_or(false);

        let consent = self
            .decide_consent(&remote, existing.as_ref(), pending_match, source)
            .await?;

        let merged = merge_row(inbox_id, &remote, existing.as_ref(), metadata, consent);

        // A matched invite must resolve even when the row itself is already
        // settled, as with a re-request for an already-joined group.
        if pending_match && consent == ConsentState::Allowed {
            if let Some(tag) = tag.as_deref() {
                self.pending.resolve(tag, &remote.id);
            }
        }

        if Some(&merged) == existing.as_ref() {
            tracing::trace!(conversation_id = %remote.id, "reconcile pass changed nothing");
            return Ok(None);
        }

        self.store.upsert(merged.clone())?;

        let consent_changed = existing.as_ref().map(|c| c.consent) != Some(consent);
        if consent_changed && consent.is_terminal() {
            // Best-effort mirror to the network's trust signal; the local
            // row is already consistent.
            if let Err(e) = self.client.set_consent_state(&remote.id, consent).await {
                tracing::warn!(conversation_id = %remote.id, error = %e, "failed to mirror consent to network");
            }
        }

        tracing::debug!(
            conversation_id = %remote.id,
            ?source,
            ?consent,
            pending_match,
            "reconciled conversation"
        );
        Ok(Some(merged))
    }

    /// Consent decision, in precedence order. Stored `Allowed`/`Denied`
    /// always win; a pending-invite match overrides any default.
    async fn decide_consent(
        &self,
        remote: &RemoteConversation,
        existing: Option<&Conversation>,
        pending_match: bool,
        source: ReconcileSource,
    ) -> Result<ConsentState, ClientError> {
        if let Some(current) = existing.map(|c| c.consent) {
            if current.is_terminal() {
                return Ok(current);
            }
        }
        if pending_match {
            return Ok(ConsentState::Allowed);
        }
        let consent = match (remote.kind, source) {
            // A fully synced group is one we are a settled member of.
            (ConversationKind::Group, ReconcileSource::FullSync) => ConsentState::Allowed,
            // Fail closed against unsolicited adds, unless our own
            // join-request processing admitted someone to this group.
            (ConversationKind::Group, ReconcileSource::Stream) => {
                if self.matches.contains(&remote.id) {
                    ConsentState::Allowed
                } else {
                    ConsentState::Denied
                }
            }
            // DMs mirror the network's trust signal either way.
            (ConversationKind::Dm, _) => match self.client.consent_state(&remote.id).await? {
                ConsentState::Denied => ConsentState::Denied,
                ConsentState::Allowed | ConsentState::Unknown => ConsentState::Allowed,
            },
        };
        Ok(consent)
    }

    /// Side-channel metadata is enrichment: a missing slot, a fetch
    /// failure or undecodable bytes degrade to `None` instead of failing
    /// the pass.
    async fn fetch_metadata(&self, conversation_id: &str) -> Option<ConversationMetadata> {
        match self.client.app_data(conversation_id).await {
            Ok(Some(bytes)) => match ConversationMetadata::try_from(bytes.as_slice()) {
                Ok(metadata) => Some(metadata),
                Err(e) => {
                    tracing::warn!(conversation_id, error = %e, "undecodable side-channel metadata");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(conversation_id, error = %e, "failed to fetch side-channel metadata");
                None
            }
        }
    }
}

/// The metadata slot is writable by whoever created the group, so a
/// nonsense expiry is treated like any other undecodable enrichment.
pub(crate) fn expiry_secs_to_ns(conversation_id: &str, secs: i64) -> Option<i64> {
    match secs.checked_mul(convos_common::time::NS_IN_SEC) {
        Some(ns) => Some(ns),
        None => {
            tracing::warn!(
                conversation_id,
                secs,
                "side-channel expiry out of range, ignoring"
            );
            None
        }
    }
}

/// Build the row to write. User-local fields never regress; display fields
/// follow the network; the expiry prefers the network value and falls back
/// to the side-channel slot.
fn merge_row(
    inbox_id: &str,
    remote: &RemoteConversation,
    existing: Option<&Conversation>,
    metadata: Option<ConversationMetadata>,
    consent: ConsentState,
) -> Conversation {
    let tag = metadata
        .as_ref()
        .map(|m| m.tag.clone())
        .filter(|t| !t.is_empty());
    let metadata_expiry = metadata
        .as_ref()
        .and_then(|m| m.expires_at_unix)
        .and_then(|secs| expiry_secs_to_ns(&remote.id, secs));
    let expires_at_ns = remote.expires_at_ns.or(metadata_expiry);

    match existing {
        Some(row) => Conversation {
            kind: remote.kind,
            creator_inbox_id: remote.creator_inbox_id.clone(),
            tag: tag.or_else(|| row.tag.clone()),
            consent,
            expires_at_ns: expires_at_ns.or(row.expires_at_ns),
            name: remote.name.clone(),
            description: remote.description.clone(),
            image_url: remote.image_url.clone(),
            last_message_ns: row.last_message_ns.max(remote.last_message_ns),
            ..row.clone()
        },
        None => Conversation {
            id: remote.id.clone(),
            kind: remote.kind,
            inbox_id: inbox_id.to_string(),
            creator_inbox_id: remote.creator_inbox_id.clone(),
            tag,
            consent,
            expires_at_ns,
            name: remote.name.clone(),
            description: remote.description.clone(),
            image_url: remote.image_url.clone(),
            last_message_ns: remote.last_message_ns,
            pinned: false,
            muted: false,
            unread_count: 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeClient;
    use crate::InMemoryConversationStore;
    use convos_common::time::Duration;
    use convos_invite::{InviteOptions, SignedInvite};
    use ed25519_dalek::SigningKey;
    use rstest::rstest;

    fn fixture() -> (
        Arc<FakeClient>,
        Arc<InMemoryConversationStore>,
        Arc<PendingInviteStore>,
        Arc<MatchLedger>,
        ConsentReconciler<FakeClient, InMemoryConversationStore>,
    ) {
        let client = Arc::new(FakeClient::new());
        let store = Arc::new(InMemoryConversationStore::new());
        let pending = Arc::new(PendingInviteStore::new());
        let matches = Arc::new(MatchLedger::default());
        let reconciler = ConsentReconciler::new(
            client.clone(),
            store.clone(),
            pending.clone(),
            matches.clone(),
        );
        (client, store, pending, matches, reconciler)
    }

    fn group(id: &str) -> RemoteConversation {
        RemoteConversation {
            id: id.to_string(),
            kind: ConversationKind::Group,
            creator_inbox_id: "creator".to_string(),
            name: "group".to_string(),
            description: String::new(),
            image_url: String::new(),
            expires_at_ns: None,
            last_message_ns: None,
        }
    }

    fn dm(id: &str) -> RemoteConversation {
        RemoteConversation {
            kind: ConversationKind::Dm,
            ..group(id)
        }
    }

    fn pending_invite_for(tag: &str) -> SignedInvite {
        SignedInvite::create(
            InviteOptions {
                conversation_id: "whichever".into(),
                creator_inbox_id: "creator".into(),
                tag: tag.into(),
                name: None,
                description: None,
                image_url: None,
                invite_ttl: Duration::from_secs(3600),
                conversation_expires_at_ns: None,
            },
            &SigningKey::from_bytes(&[5u8; 32]),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn full_sync_group_defaults_to_allowed() {
        let (_client, store, _pending, _matches, reconciler) = fixture();
        let row = reconciler
            .reconcile("inbox", group("g1"), ReconcileSource::FullSync)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.consent, ConsentState::Allowed);
        assert_eq!(store.get("g1").unwrap().unwrap().consent, ConsentState::Allowed);
    }

    #[tokio::test]
    async fn streamed_group_defaults_to_denied() {
        let (_client, store, _pending, _matches, reconciler) = fixture();
        reconciler
            .reconcile("inbox", group("g1"), ReconcileSource::Stream)
            .await
            .unwrap();
        assert_eq!(store.get("g1").unwrap().unwrap().consent, ConsentState::Denied);
    }

    #[tokio::test]
    async fn two_tags_one_pending_invite() {
        // stream delivers a group tagged T1 (no match -> denied), then one
        // tagged T2 matching the held invite -> allowed
        let (client, store, pending, _matches, reconciler) = fixture();
        pending.store(pending_invite_for("T2")).unwrap();
        let mut events = pending.subscribe();
        client.put_metadata("g1", "T1");
        client.put_metadata("g2", "T2");

        reconciler
            .reconcile("inbox", group("g1"), ReconcileSource::Stream)
            .await
            .unwrap();
        reconciler
            .reconcile("inbox", group("g2"), ReconcileSource::Stream)
            .await
            .unwrap();

        assert_eq!(store.get("g1").unwrap().unwrap().consent, ConsentState::Denied);
        assert_eq!(store.get("g2").unwrap().unwrap().consent, ConsentState::Allowed);
        let event = events.try_recv().unwrap();
        assert_eq!(event.tag, "T2");
        assert_eq!(event.conversation_id, "g2");
        assert!(!pending.has("T2"));
    }

    #[tokio::test]
    async fn pending_match_overrides_full_sync_default_too() {
        let (client, store, pending, _matches, reconciler) = fixture();
        pending.store(pending_invite_for("T9")).unwrap();
        client.put_metadata("d1", "T9");

        // even a DM whose network signal is denied is overridden by a match
        client.set_network_consent("d1", ConsentState::Denied);
        reconciler
            .reconcile("inbox", dm("d1"), ReconcileSource::FullSync)
            .await
            .unwrap();
        assert_eq!(store.get("d1").unwrap().unwrap().consent, ConsentState::Allowed);
    }

    #[rstest]
    #[case::allowed_stays(ConsentState::Allowed)]
    #[case::denied_stays(ConsentState::Denied)]
    #[tokio::test]
    async fn terminal_consent_is_never_overwritten(#[case] state: ConsentState) {
        let (_client, store, _pending, _matches, reconciler) = fixture();
        // seed a row in the opposite direction of what each default would pick
        let seeded = merge_row("inbox", &group("g1"), None, None, state);
        store.upsert(seeded).unwrap();

        for source in [ReconcileSource::FullSync, ReconcileSource::Stream] {
            reconciler
                .reconcile("inbox", group("g1"), source)
                .await
                .unwrap();
            assert_eq!(store.get("g1").unwrap().unwrap().consent, state);
        }
    }

    #[rstest]
    #[case::mirrors_allowed(ConsentState::Allowed, ConsentState::Allowed)]
    #[case::mirrors_denied(ConsentState::Denied, ConsentState::Denied)]
    #[case::unknown_treated_as_allowed(ConsentState::Unknown, ConsentState::Allowed)]
    #[tokio::test]
    async fn dm_mirrors_the_network_signal(
        #[case] signal: ConsentState,
        #[case] expected: ConsentState,
    ) {
        let (client, store, _pending, _matches, reconciler) = fixture();
        client.set_network_consent("d1", signal);
        reconciler
            .reconcile("inbox", dm("d1"), ReconcileSource::FullSync)
            .await
            .unwrap();
        assert_eq!(store.get("d1").unwrap().unwrap().consent, expected);
    }

    #[tokio::test]
    async fn creator_side_match_allows_streamed_group() {
        let (_client, store, _pending, matches, reconciler) = fixture();
        matches.record("g1");
        reconciler
            .reconcile("inbox", group("g1"), ReconcileSource::Stream)
            .await
            .unwrap();
        assert_eq!(store.get("g1").unwrap().unwrap().consent, ConsentState::Allowed);
    }

    #[tokio::test]
    async fn user_local_fields_survive_and_unchanged_passes_skip_writes() {
        let (_client, store, _pending, _matches, reconciler) = fixture();
        reconciler
            .reconcile("inbox", group("g1"), ReconcileSource::FullSync)
            .await
            .unwrap();

        // the user pins and mutes; a later sync pass must not regress it
        let mut row = store.get("g1").unwrap().unwrap();
        row.pinned = true;
        row.muted = true;
        row.unread_count = 4;
        row.last_message_ns = Some(900);
        store.upsert(row).unwrap();
        let writes_before = store.writes();

        let result = reconciler
            .reconcile("inbox", group("g1"), ReconcileSource::FullSync)
            .await
            .unwrap();
        assert!(result.is_none(), "no-op pass should skip the write");
        assert_eq!(store.writes(), writes_before);

        let mut newer = group("g1");
        newer.last_message_ns = Some(1_200);
        let merged = reconciler
            .reconcile("inbox", newer, ReconcileSource::FullSync)
            .await
            .unwrap()
            .unwrap();
        assert!(merged.pinned);
        assert!(merged.muted);
        assert_eq!(merged.unread_count, 4);
        assert_eq!(merged.last_message_ns, Some(1_200));
    }

    #[tokio::test]
    async fn undecodable_metadata_degrades_to_defaults() {
        let (client, store, _pending, _matches, reconciler) = fixture();
        client.put_raw_app_data("g1", vec![0xff, 0xfe]);
        let row = reconciler
            .reconcile("inbox", group("g1"), ReconcileSource::FullSync)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.consent, ConsentState::Allowed);
        assert_eq!(row.tag, None);
        assert!(store.get("g1").unwrap().is_some());
    }

    #[tokio::test]
    async fn rerequest_for_a_settled_row_still_fires_the_matched_event() {
        let (client, store, pending, _matches, reconciler) = fixture();
        client.put_metadata("g1", "T3");
        reconciler
            .reconcile("inbox", group("g1"), ReconcileSource::FullSync)
            .await
            .unwrap();

        // the user re-requests to join a group they are already in; the
        // next sync pass merges to an identical row
        pending.store(pending_invite_for("T3")).unwrap();
        let mut events = pending.subscribe();
        let writes_before = store.writes();

        let result = reconciler
            .reconcile("inbox", group("g1"), ReconcileSource::FullSync)
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(store.writes(), writes_before);
        assert_eq!(events.try_recv().unwrap().tag, "T3");
        assert!(!pending.has("T3"));
    }

    #[tokio::test]
    async fn out_of_range_metadata_expiry_is_ignored() {
        let (client, store, _pending, _matches, reconciler) = fixture();
        let hostile: Vec<u8> = ConversationMetadata {
            tag: "T1".into(),
            expires_at_unix: Some(i64::MAX),
            ..Default::default()
        }
        .try_into()
        .unwrap();
        client.put_raw_app_data("g1", hostile);

        let row = reconciler
            .reconcile("inbox", group("g1"), ReconcileSource::FullSync)
            .await
            .unwrap()
            .unwrap();
        // the rest of the slot still applies; the expiry does not
        assert_eq!(row.tag.as_deref(), Some("T1"));
        assert_eq!(row.expires_at_ns, None);
        assert!(store.expired_before(i64::MAX).unwrap().is_empty());
    }

    #[tokio::test]
    async fn network_failure_leaves_the_row_unchanged() {
        use crate::client::MockMessagingClient;

        let mut client = MockMessagingClient::new();
        client.expect_app_data().returning(|_| Ok(None));
        client
            .expect_consent_state()
            .returning(|_| Err(ClientError::Network("connection reset".into())));
        client.expect_set_consent_state().never();

        let store = Arc::new(InMemoryConversationStore::new());
        let reconciler = ConsentReconciler::new(
            Arc::new(client),
            store.clone(),
            Arc::new(PendingInviteStore::new()),
            Arc::new(MatchLedger::default()),
        );

        let result = reconciler
            .reconcile("inbox", dm("d1"), ReconcileSource::FullSync)
            .await;
        assert!(matches!(result, Err(ClientError::Network(_))));
        assert!(store.get("d1").unwrap().is_none());
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn redelivered_stream_events_are_idempotent() {
        let (client, store, pending, _matches, reconciler) = fixture();
        pending.store(pending_invite_for("T2")).unwrap();
        client.put_metadata("g2", "T2");

        for _ in 0..3 {
            reconciler
                .reconcile("inbox", group("g2"), ReconcileSource::Stream)
                .await
                .unwrap();
        }
        assert_eq!(store.get("g2").unwrap().unwrap().consent, ConsentState::Allowed);
        assert_eq!(client.set_consent_calls("g2"), 1);
    }
}
