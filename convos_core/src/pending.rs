//! Holding area for invites the joiner has requested but whose group has
//! not yet materialized locally.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use convos_common::time::now_ns;
use convos_invite::{InviteError, SignedInvite};

/// An invite awaiting its conversation, keyed by tag. Owned exclusively by
/// the joiner's reconciliation process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInvite {
    pub tag: String,
    pub invite: SignedInvite,
    pub created_at_ns: i64,
}

/// Fired exactly once per tag when a pending invite meets its conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteMatched {
    pub tag: String,
    pub conversation_id: String,
}

pub struct PendingInviteStore {
    inner: Mutex<HashMap<String, PendingInvite>>,
    events: broadcast::Sender<InviteMatched>,
}

impl Default for PendingInviteStore {
    fn default() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Mutex::new(HashMap::new()),
            events,
        }
    }
}

impl PendingInviteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold an invite until its conversation arrives. Keyed by the tag
    /// embedded in the payload.
    pub fn store(&self, invite: SignedInvite) -> Result<PendingInvite, InviteError> {
        let payload = invite.payload()?;
        let pending = PendingInvite {
            tag: payload.tag.clone(),
            invite,
            created_at_ns: now_ns(),
        };
        self.inner.lock().insert(payload.tag, pending.clone());
        Ok(pending)
    }

    /// Read-only probe. Never consumes the pending state; only
    /// [`Self::resolve`] does.
    pub fn has(&self, tag: &str) -> bool {
        self.inner.lock().contains_key(tag)
    }

    pub fn get(&self, tag: &str) -> Option<PendingInvite> {
        self.inner.lock().get(tag).cloned()
    }

    /// Consume the pending invite for `tag` and fire the matched event.
    /// Resolving an unknown or already-resolved tag is a no-op returning
    /// `false`, so duplicate matches cannot fire twice.
    pub fn resolve(&self, tag: &str, conversation_id: &str) -> bool {
        let removed = self.inner.lock().remove(tag).is_some();
        if removed {
            tracing::debug!(tag, conversation_id, "pending invite matched");
            let _ = self.events.send(InviteMatched {
                tag: tag.to_string(),
                conversation_id: conversation_id.to_string(),
            });
        }
        removed
    }

    /// Drop invites whose own TTL has passed.
    pub fn purge_expired(&self, now_ns: i64) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.len();
        inner.retain(|_, pending| !pending.invite.has_expired(now_ns));
        before - inner.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InviteMatched> {
        self.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
