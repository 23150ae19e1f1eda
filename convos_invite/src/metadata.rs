//! Conversation side-channel metadata, stored in the group's own
//! application-data slot. This is how the correlation tag becomes visible
//! to every member without a separate directory service.

use prost::Message;
use rand::RngCore;

use crate::{
    configuration::TAG_NONCE_LEN,
    proto::{ConversationMetadataProto, MemberProfileProto},
    InviteError,
};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemberProfile {
    pub inbox_id: String,
    pub name: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConversationMetadata {
    /// Join-correlation tag; opaque, not derived from the conversation id.
    pub tag: String,
    /// Conversation self-destruct time in unix seconds, if set.
    pub expires_at_unix: Option<i64>,
    pub profiles: Vec<MemberProfile>,
}

impl ConversationMetadata {
    pub fn new(tag: String) -> Self {
        Self {
            tag,
            ..Default::default()
        }
    }
}

/// A fresh random correlation tag.
pub fn generate_tag() -> String {
    let mut nonce = [0u8; TAG_NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    hex::encode(nonce)
}

impl TryFrom<ConversationMetadata> for Vec<u8> {
    type Error = InviteError;

    fn try_from(value: ConversationMetadata) -> Result<Self, Self::Error> {
        let proto = ConversationMetadataProto {
            tag: value.tag,
            expires_at_unix: value.expires_at_unix,
            profiles: value
                .profiles
                .into_iter()
                .map(|p| MemberProfileProto {
                    inbox_id: p.inbox_id,
                    name: p.name,
                    image: p.image,
                })
                .collect(),
        };
        let mut buf = Vec::new();
        proto.encode(&mut buf)?;
        Ok(buf)
    }
}

impl TryFrom<&[u8]> for ConversationMetadata {
    type Error = InviteError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let proto = ConversationMetadataProto::decode(value)?;
        Ok(Self {
            tag: proto.tag,
            expires_at_unix: proto.expires_at_unix,
            profiles: proto
                .profiles
                .into_iter()
                .map(|p| MemberProfile {
                    inbox_id: p.inbox_id,
                    name: p.name,
                    image: p.image,
                })
                .collect(),
        })
    }
}
