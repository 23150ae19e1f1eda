//! In-memory stand-in for the underlying secure-messaging client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ed25519_dalek::{SigningKey, VerifyingKey};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use convos_common::time::now_ns;
use convos_invite::ConversationMetadata;

use crate::{
    client::{ConversationStream, MessagingClient},
    error::ClientError,
    types::{ConsentState, LocalIdentity, RemoteConversation, RemoteMessage},
};

#[derive(Default)]
pub struct FakeClient {
    conversations: Mutex<HashMap<String, Vec<RemoteConversation>>>,
    streams: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<RemoteConversation>>>>,
    messages: Mutex<HashMap<String, Vec<RemoteMessage>>>,
    consent: Mutex<HashMap<String, ConsentState>>,
    app_data: Mutex<HashMap<String, Vec<u8>>>,
    members: Mutex<HashMap<String, Vec<String>>>,
    keys: Mutex<HashMap<String, VerifyingKey>>,
    identities: Mutex<Vec<LocalIdentity>>,
    deleted_conversations: Mutex<Vec<String>>,
    deleted_identities: Mutex<Vec<String>>,
    add_member_calls: Mutex<HashMap<String, usize>>,
    set_consent_calls: Mutex<HashMap<String, usize>>,
    message_seq: AtomicUsize,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an identity and its signing key with the directory.
    pub fn register_identity(&self, inbox_id: &str, key: &SigningKey) {
        self.keys
            .lock()
            .insert(inbox_id.to_string(), key.verifying_key());
        self.identities.lock().push(LocalIdentity {
            inbox_id: inbox_id.to_string(),
            created_at_ns: now_ns(),
        });
    }

    pub fn register_identity_created_at(&self, inbox_id: &str, created_at_ns: i64) {
        self.identities.lock().push(LocalIdentity {
            inbox_id: inbox_id.to_string(),
            created_at_ns,
        });
    }

    /// Make a conversation visible to full sync on an identity.
    pub fn put_conversation(&self, inbox_id: &str, conversation: RemoteConversation) {
        self.conversations
            .lock()
            .entry(inbox_id.to_string())
            .or_default()
            .push(conversation);
    }

    /// Deliver a conversation on every open push stream for an identity.
    pub fn push_stream_event(&self, inbox_id: &str, conversation: RemoteConversation) {
        if let Some(senders) = self.streams.lock().get(inbox_id) {
            for sender in senders {
                let _ = sender.send(conversation.clone());
            }
        }
    }

    /// Number of push streams currently open for an identity.
    pub fn open_streams(&self, inbox_id: &str) -> usize {
        self.streams
            .lock()
            .get(inbox_id)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    pub fn put_metadata(&self, conversation_id: &str, tag: &str) {
        let bytes: Vec<u8> = ConversationMetadata::new(tag.to_string())
            .try_into()
            .expect("metadata encodes");
        self.app_data
            .lock()
            .insert(conversation_id.to_string(), bytes);
    }

    pub fn put_raw_app_data(&self, conversation_id: &str, bytes: Vec<u8>) {
        self.app_data
            .lock()
            .insert(conversation_id.to_string(), bytes);
    }

    pub fn set_network_consent(&self, conversation_id: &str, state: ConsentState) {
        self.consent
            .lock()
            .insert(conversation_id.to_string(), state);
    }

    pub fn members_of(&self, conversation_id: &str) -> Vec<String> {
        self.members
            .lock()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn add_member_calls(&self, conversation_id: &str) -> usize {
        self.add_member_calls
            .lock()
            .get(conversation_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn set_consent_calls(&self, conversation_id: &str) -> usize {
        self.set_consent_calls
            .lock()
            .get(conversation_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn deleted_conversations(&self) -> Vec<String> {
        self.deleted_conversations.lock().clone()
    }

    pub fn deleted_identities(&self) -> Vec<String> {
        self.deleted_identities.lock().clone()
    }
}

#[async_trait]
impl MessagingClient for FakeClient {
    async fn sync_conversations(
        &self,
        inbox_id: &str,
    ) -> Result<Vec<RemoteConversation>, ClientError> {
        Ok(self
            .conversations
            .lock()
            .get(inbox_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn stream_conversations(
        &self,
        inbox_id: &str,
    ) -> Result<ConversationStream, ClientError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams
            .lock()
            .entry(inbox_id.to_string())
            .or_default()
            .push(tx);
        let stream = UnboundedReceiverStream::new(rx);
        Ok(Box::pin(futures::StreamExt::map(stream, Ok)))
    }

    async fn list_dm_messages(
        &self,
        inbox_id: &str,
        since_ns: Option<i64>,
    ) -> Result<Vec<RemoteMessage>, ClientError> {
        let messages = self
            .messages
            .lock()
            .get(inbox_id)
            .cloned()
            .unwrap_or_default();
        Ok(match since_ns {
            Some(since) => messages
                .into_iter()
                .filter(|m| m.sent_at_ns > since)
                .collect(),
            None => messages,
        })
    }

    async fn send_dm(
        &self,
        sender_inbox_id: &str,
        peer_inbox_id: &str,
        body: &str,
    ) -> Result<(), ClientError> {
        let seq = self.message_seq.fetch_add(1, Ordering::SeqCst);
        self.messages
            .lock()
            .entry(peer_inbox_id.to_string())
            .or_default()
            .push(RemoteMessage {
                id: format!("m{seq}"),
                sender_inbox_id: sender_inbox_id.to_string(),
                sent_at_ns: now_ns(),
                body: body.to_string(),
            });
        Ok(())
    }

    async fn consent_state(&self, conversation_id: &str) -> Result<ConsentState, ClientError> {
        Ok(self
            .consent
            .lock()
            .get(conversation_id)
            .copied()
            .unwrap_or_default())
    }

    async fn set_consent_state(
        &self,
        conversation_id: &str,
        state: ConsentState,
    ) -> Result<(), ClientError> {
        *self
            .set_consent_calls
            .lock()
            .entry(conversation_id.to_string())
            .or_default() += 1;
        self.consent
            .lock()
            .insert(conversation_id.to_string(), state);
        Ok(())
    }

    async fn app_data(&self, conversation_id: &str) -> Result<Option<Vec<u8>>, ClientError> {
        Ok(self.app_data.lock().get(conversation_id).cloned())
    }

    async fn set_app_data(&self, conversation_id: &str, data: Vec<u8>) -> Result<(), ClientError> {
        self.app_data
            .lock()
            .insert(conversation_id.to_string(), data);
        Ok(())
    }

    async fn group_members(&self, conversation_id: &str) -> Result<Vec<String>, ClientError> {
        Ok(self.members_of(conversation_id))
    }

    async fn add_group_member(
        &self,
        conversation_id: &str,
        inbox_id: &str,
    ) -> Result<(), ClientError> {
        *self
            .add_member_calls
            .lock()
            .entry(conversation_id.to_string())
            .or_default() += 1;
        let mut members = self.members.lock();
        let entry = members.entry(conversation_id.to_string()).or_default();
        if !entry.iter().any(|m| m == inbox_id) {
            entry.push(inbox_id.to_string());
        }
        Ok(())
    }

    async fn verifying_key(&self, inbox_id: &str) -> Result<VerifyingKey, ClientError> {
        self.keys
            .lock()
            .get(inbox_id)
            .copied()
            .ok_or_else(|| ClientError::Unknown(format!("no key for inbox {inbox_id}")))
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ClientError> {
        self.deleted_conversations
            .lock()
            .push(conversation_id.to_string());
        for list in self.conversations.lock().values_mut() {
            list.retain(|c| c.id != conversation_id);
        }
        Ok(())
    }

    async fn local_identities(&self) -> Result<Vec<LocalIdentity>, ClientError> {
        Ok(self.identities.lock().clone())
    }

    async fn delete_identity(&self, inbox_id: &str) -> Result<(), ClientError> {
        self.deleted_identities.lock().push(inbox_id.to_string());
        self.identities.lock().retain(|i| i.inbox_id != inbox_id);
        Ok(())
    }
}
