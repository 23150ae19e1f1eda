//! The invite payload and its binary codec.

use prost::Message;

use crate::{proto::InvitePayloadProto, InviteError};

/// Logical content of an invite. Immutable once minted; the signature in
/// [`crate::SignedInvite`] covers the canonical encoding of this struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvitePayload {
    pub conversation_id: String,
    pub creator_inbox_id: String,
    /// Opaque correlation tag, mirrored into the group's side-channel
    /// metadata slot.
    pub tag: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    /// Invite TTL deadline in ns since the unix epoch.
    pub expires_at_ns: i64,
    /// The conversation's own self-destruct time, if it has one. Checked
    /// independently of `expires_at_ns`.
    pub conversation_expires_at_ns: Option<i64>,
}

impl InvitePayload {
    /// Canonical encoding. Deterministic for a given payload: prost writes
    /// fields in ascending tag order, so re-encoding a decoded payload
    /// reproduces the signed bytes.
    pub fn encode(&self) -> Result<Vec<u8>, InviteError> {
        let proto: InvitePayloadProto = self.clone().into();
        let mut buf = Vec::new();
        proto.encode(&mut buf)?;
        Ok(buf)
    }

    /// Unknown fields in `bytes` are skipped, not rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self, InviteError> {
        let proto = InvitePayloadProto::decode(bytes)?;
        Ok(proto.into())
    }
}

impl From<InvitePayload> for InvitePayloadProto {
    fn from(value: InvitePayload) -> Self {
        Self {
            conversation_id: value.conversation_id,
            creator_inbox_id: value.creator_inbox_id,
            tag: value.tag,
            name: value.name,
            description: value.description,
            image_url: value.image_url,
            expires_at_ns: value.expires_at_ns,
            conversation_expires_at_ns: value.conversation_expires_at_ns,
        }
    }
}

impl From<InvitePayloadProto> for InvitePayload {
    fn from(value: InvitePayloadProto) -> Self {
        Self {
            conversation_id: value.conversation_id,
            creator_inbox_id: value.creator_inbox_id,
            tag: value.tag,
            name: value.name,
            description: value.description,
            image_url: value.image_url,
            expires_at_ns: value.expires_at_ns,
            conversation_expires_at_ns: value.conversation_expires_at_ns,
        }
    }
}
