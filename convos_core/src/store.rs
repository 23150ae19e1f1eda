//! Seam to the local keyed store holding conversation rows.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::{
    error::StorageError,
    types::{ConsentState, Conversation},
};

pub trait ConversationStore: Send + Sync {
    fn get(&self, conversation_id: &str) -> Result<Option<Conversation>, StorageError>;
    fn upsert(&self, conversation: Conversation) -> Result<(), StorageError>;
    fn delete(&self, conversation_id: &str) -> Result<(), StorageError>;
    fn all(&self) -> Result<Vec<Conversation>, StorageError>;
    /// Conversations whose self-destruct time is at or before `now_ns`.
    /// Rows without an expiry never qualify.
    fn expired_before(&self, now_ns: i64) -> Result<Vec<Conversation>, StorageError>;
    /// Number of `Allowed` conversations hosted on an identity.
    fn allowed_count_for_inbox(&self, inbox_id: &str) -> Result<usize, StorageError>;
}

/// Keyed in-memory store. The write counter makes "skip the write when
/// nothing changed" observable to callers that care about downstream
/// change notifications.
#[derive(Default)]
pub struct InMemoryConversationStore {
    rows: RwLock<HashMap<String, Conversation>>,
    writes: AtomicUsize,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of row writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn get(&self, conversation_id: &str) -> Result<Option<Conversation>, StorageError> {
        Ok(self.rows.read().get(conversation_id).cloned())
    }

    fn upsert(&self, conversation: Conversation) -> Result<(), StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.rows
            .write()
            .insert(conversation.id.clone(), conversation);
        Ok(())
    }

    fn delete(&self, conversation_id: &str) -> Result<(), StorageError> {
        self.rows.write().remove(conversation_id);
        Ok(())
    }

    fn all(&self) -> Result<Vec<Conversation>, StorageError> {
        Ok(self.rows.read().values().cloned().collect())
    }

    fn expired_before(&self, now_ns: i64) -> Result<Vec<Conversation>, StorageError> {
        Ok(self
            .rows
            .read()
            .values()
            .filter(|c| matches!(c.expires_at_ns, Some(at) if at <= now_ns))
            .cloned()
            .collect())
    }

    fn allowed_count_for_inbox(&self, inbox_id: &str) -> Result<usize, StorageError> {
        Ok(self
            .rows
            .read()
            .values()
            .filter(|c| c.inbox_id == inbox_id && c.consent == ConsentState::Allowed)
            .count())
    }
}
