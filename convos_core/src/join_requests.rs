//! Invite minting and join-request handling on both sides of the side
//! channel.
//!
//! The joiner sends the slug back to the creator as a direct message and
//! parks the invite in the pending store; the creator scans inbound DMs for
//! slugs, verifies them, and admits senders whose tag matches a group it
//! owns. The joiner-side promotion to `allowed` happens in the reconciler
//! when the matching group materializes.

use std::collections::HashMap;
use std::sync::Arc;

use ed25519_dalek::SigningKey;

use convos_common::time::{now_ns, Duration};
use convos_invite::{
    detect::invite_candidates, generate_tag, ConversationMetadata, InviteOptions, SignedInvite,
};

use crate::{
    client::MessagingClient,
    error::ClientError,
    pending::{PendingInvite, PendingInviteStore},
    reconcile::{expiry_secs_to_ns, ConsentReconciler, MatchLedger, ReconcileSource},
    store::ConversationStore,
    types::{ConversationKind, JoinRequest, RemoteConversation},
};

pub struct JoinRequestProcessor<C, S> {
    client: Arc<C>,
    store: Arc<S>,
    pending: Arc<PendingInviteStore>,
    reconciler: Arc<ConsentReconciler<C, S>>,
    matches: Arc<MatchLedger>,
}

impl<C, S> JoinRequestProcessor<C, S>
where
    C: MessagingClient,
    S: ConversationStore,
{
    pub fn new(
        client: Arc<C>,
        store: Arc<S>,
        pending: Arc<PendingInviteStore>,
        reconciler: Arc<ConsentReconciler<C, S>>,
        matches: Arc<MatchLedger>,
    ) -> Self {
        Self {
            client,
            store,
            pending,
            reconciler,
            matches,
        }
    }

    /// Creator side: mint a signed invite for an owned conversation.
    ///
    /// The correlation tag lives in the group's side-channel metadata slot
    /// and is generated once; later mints for the same conversation reuse
    /// it, so every outstanding slug correlates to the same group.
    pub async fn mint_invite(
        &self,
        creator_inbox_id: &str,
        conversation_id: &str,
        key: &SigningKey,
        invite_ttl: Duration,
    ) -> Result<SignedInvite, ClientError> {
        let metadata = match self.client.app_data(conversation_id).await? {
            Some(bytes) => ConversationMetadata::try_from(bytes.as_slice())?,
            None => ConversationMetadata::default(),
        };
        let metadata = if metadata.tag.is_empty() {
            let seeded = ConversationMetadata {
                tag: generate_tag(),
                ..metadata
            };
            let bytes: Vec<u8> = seeded.clone().try_into()?;
            self.client.set_app_data(conversation_id, bytes).await?;
            seeded
        } else {
            metadata
        };

        let row = self.store.get(conversation_id)?;
        let invite = SignedInvite::create(
            InviteOptions {
                conversation_id: conversation_id.to_string(),
                creator_inbox_id: creator_inbox_id.to_string(),
                tag: metadata.tag,
                name: row.as_ref().map(|r| r.name.clone()).filter(|n| !n.is_empty()),
                description: row
                    .as_ref()
                    .map(|r| r.description.clone())
                    .filter(|d| !d.is_empty()),
                image_url: row
                    .as_ref()
                    .map(|r| r.image_url.clone())
                    .filter(|u| !u.is_empty()),
                invite_ttl,
                conversation_expires_at_ns: metadata
                    .expires_at_unix
                    .and_then(|s| expiry_secs_to_ns(conversation_id, s)),
            },
            key,
        )?;
        Ok(invite)
    }

    /// Joiner side: validate an invite link, send the join request over the
    /// DM side channel, and park the invite until its group materializes.
    pub async fn request_to_join(
        &self,
        inbox_id: &str,
        link: &str,
    ) -> Result<PendingInvite, ClientError> {
        let invite = SignedInvite::from_link(link)?;
        let unverified = invite.payload()?;
        let key = self.client.verifying_key(&unverified.creator_inbox_id).await?;
        let payload = invite.validate(&key, now_ns())?;

        self.client
            .send_dm(inbox_id, &payload.creator_inbox_id, &invite.to_slug())
            .await?;
        let pending = self.pending.store(invite)?;
        tracing::info!(tag = %pending.tag, creator = %payload.creator_inbox_id, "join request sent");
        Ok(pending)
    }

    /// Creator side: scan inbound DMs for invite slugs and admit matching
    /// senders.
    ///
    /// Anything that does not parse, verify and pass both expiry checks is
    /// dropped without surfacing an error; the DM channel carries arbitrary
    /// content. Reprocessing a message is harmless: membership adds and
    /// consent writes are idempotent. `since_ns` keeps repeated invocation
    /// cheap.
    pub async fn process_join_requests(
        &self,
        inbox_id: &str,
        since_ns: Option<i64>,
    ) -> Result<Vec<JoinRequest>, ClientError> {
        let messages = self.client.list_dm_messages(inbox_id, since_ns).await?;
        if messages.is_empty() {
            return Ok(Vec::new());
        }
        let owned = self.owned_groups_by_tag(inbox_id).await?;

        let mut admitted = Vec::new();
        let now = now_ns();
        for message in messages {
            if message.sender_inbox_id == inbox_id {
                continue;
            }
            for candidate in invite_candidates(&message.body) {
                let invite = match SignedInvite::from_link(candidate) {
                    Ok(invite) => invite,
                    Err(e) => {
                        tracing::debug!(message_id = %message.id, error = %e, "candidate did not parse");
                        continue;
                    }
                };
                let payload = match self.validate_candidate(&invite, now).await {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::debug!(message_id = %message.id, error = %e, "candidate rejected");
                        continue;
                    }
                };
                let Some(group) = owned.get(&payload.tag) else {
                    tracing::debug!(tag = %payload.tag, "no owned group for tag");
                    continue;
                };

                match self.admit(inbox_id, group, &message.sender_inbox_id).await {
                    Ok(true) => admitted.push(JoinRequest {
                        message_id: message.id.clone(),
                        sender_inbox_id: message.sender_inbox_id.clone(),
                        conversation_id: group.id.clone(),
                        tag: payload.tag.clone(),
                        sent_at_ns: message.sent_at_ns,
                    }),
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(
                            conversation_id = %group.id,
                            sender = %message.sender_inbox_id,
                            error = %e,
                            "failed to admit joiner"
                        );
                    }
                }
            }
        }
        Ok(admitted)
    }

    /// Read-only probe used during conflict resolution: does the group's
    /// side-channel tag correspond to an invite we are still waiting on?
    /// Never consumes the pending state.
    pub async fn has_pending_invite(&self, group_id: &str) -> Result<bool, ClientError> {
        let Some(bytes) = self.client.app_data(group_id).await? else {
            return Ok(false);
        };
        let metadata = match ConversationMetadata::try_from(bytes.as_slice()) {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(group_id, error = %e, "undecodable side-channel metadata");
                return Ok(false);
            }
        };
        Ok(!metadata.tag.is_empty() && self.pending.has(&metadata.tag))
    }

    async fn validate_candidate(
        &self,
        invite: &SignedInvite,
        now: i64,
    ) -> Result<convos_invite::InvitePayload, ClientError> {
        let unverified = invite.payload()?;
        let key = self.client.verifying_key(&unverified.creator_inbox_id).await?;
        Ok(invite.validate(&key, now)?)
    }

    /// Add the sender to the group and mark it allowed. Returns whether the
    /// sender was actually new.
    async fn admit(
        &self,
        inbox_id: &str,
        group: &RemoteConversation,
        sender_inbox_id: &str,
    ) -> Result<bool, ClientError> {
        let members = self.client.group_members(&group.id).await?;
        if members.iter().any(|m| m == sender_inbox_id) {
            tracing::debug!(conversation_id = %group.id, sender = %sender_inbox_id, "already a member");
            return Ok(false);
        }
        self.client
            .add_group_member(&group.id, sender_inbox_id)
            .await?;
        self.matches.record(&group.id);
        self.reconciler
            .reconcile(inbox_id, group.clone(), ReconcileSource::Stream)
            .await?;
        tracing::info!(conversation_id = %group.id, sender = %sender_inbox_id, "admitted joiner");
        Ok(true)
    }

    /// Groups this identity created, indexed by their side-channel tag.
    async fn owned_groups_by_tag(
        &self,
        inbox_id: &str,
    ) -> Result<HashMap<String, RemoteConversation>, ClientError> {
        let conversations = self.client.sync_conversations(inbox_id).await?;
        let mut by_tag = HashMap::new();
        for conversation in conversations {
            if conversation.kind != ConversationKind::Group
                || conversation.creator_inbox_id != inbox_id
            {
                continue;
            }
            let Ok(Some(bytes)) = self.client.app_data(&conversation.id).await else {
                continue;
            };
            let Ok(metadata) = ConversationMetadata::try_from(bytes.as_slice()) else {
                continue;
            };
            if !metadata.tag.is_empty() {
                by_tag.insert(metadata.tag, conversation);
            }
        }
        Ok(by_tag)
    }
}
