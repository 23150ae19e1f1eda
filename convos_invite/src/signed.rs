//! Signed invites and their transport encodings.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use prost::Message;
use url::Url;

use convos_common::time::{now_ns, Duration, NS_IN_SEC};

use crate::{
    configuration::{DEEP_LINK_SCHEME, INVITE_PATH_SEGMENT, WEB_LINK_HOST},
    proto::SignedInviteProto,
    InviteError, InvitePayload,
};

/// Options for minting a new invite.
#[derive(Debug, Clone)]
pub struct InviteOptions {
    pub conversation_id: String,
    pub creator_inbox_id: String,
    pub tag: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub invite_ttl: Duration,
    /// The conversation's own self-destruct time, if set.
    pub conversation_expires_at_ns: Option<i64>,
}

/// An invite payload plus a detached signature over its exact encoded
/// bytes. Immutable value type; clones are cheap enough and require no
/// synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedInvite {
    payload_bytes: Vec<u8>,
    signature: Vec<u8>,
}

impl SignedInvite {
    /// Mint a signed invite expiring `opts.invite_ttl` from now.
    pub fn create(opts: InviteOptions, key: &SigningKey) -> Result<Self, InviteError> {
        let payload = InvitePayload {
            conversation_id: opts.conversation_id,
            creator_inbox_id: opts.creator_inbox_id,
            tag: opts.tag,
            name: opts.name,
            description: opts.description,
            image_url: opts.image_url,
            expires_at_ns: now_ns() + opts.invite_ttl.as_secs() as i64 * NS_IN_SEC,
            conversation_expires_at_ns: opts.conversation_expires_at_ns,
        };
        Self::sign(payload, key)
    }

    /// Sign an already-built payload.
    pub fn sign(payload: InvitePayload, key: &SigningKey) -> Result<Self, InviteError> {
        let payload_bytes = payload.encode()?;
        let signature = key.sign(&payload_bytes);
        Ok(Self {
            payload_bytes,
            signature: signature.to_bytes().to_vec(),
        })
    }

    pub fn payload_bytes(&self) -> &[u8] {
        &self.payload_bytes
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Decode the payload without verifying the signature. Use
    /// [`Self::verify`] before trusting any field.
    pub fn payload(&self) -> Result<InvitePayload, InviteError> {
        InvitePayload::decode(&self.payload_bytes)
    }

    /// Verify the signature over the exact payload bytes with the creator's
    /// public key. Any failure, malformed signature included, is
    /// `SignatureInvalid`; verification never fails open.
    pub fn verify(&self, key: &VerifyingKey) -> Result<InvitePayload, InviteError> {
        let signature = Signature::from_slice(&self.signature)
            .map_err(|_| InviteError::SignatureInvalid)?;
        key.verify(&self.payload_bytes, &signature)
            .map_err(|_| InviteError::SignatureInvalid)?;
        self.payload()
    }

    /// Whether the invite's own TTL has passed. Fails closed when the
    /// payload does not decode.
    pub fn has_expired(&self, now_ns: i64) -> bool {
        match self.payload() {
            Ok(p) => p.invite_expired(now_ns),
            Err(_) => true,
        }
    }

    /// Whether the conversation's independent self-destruct time has
    /// passed. Fails closed when the payload does not decode.
    pub fn conversation_has_expired(&self, now_ns: i64) -> bool {
        match self.payload() {
            Ok(p) => p.conversation_expired(now_ns),
            Err(_) => true,
        }
    }

    /// Full acceptance check: signature, invite TTL, conversation expiry.
    /// Both expiries are deliberately distinct and both are checked.
    pub fn validate(&self, key: &VerifyingKey, now_ns: i64) -> Result<InvitePayload, InviteError> {
        let payload = self.verify(key)?;
        if payload.invite_expired(now_ns) {
            return Err(InviteError::Expired);
        }
        if payload.conversation_expired(now_ns) {
            return Err(InviteError::ConversationExpired);
        }
        Ok(payload)
    }

    /// URL-safe serialization, the unit actually transmitted.
    pub fn to_slug(&self) -> String {
        let proto = SignedInviteProto {
            payload: self.payload_bytes.clone(),
            signature: self.signature.clone(),
        };
        URL_SAFE_NO_PAD.encode(proto.encode_to_vec())
    }

    pub fn to_deep_link(&self) -> String {
        format!(
            "{DEEP_LINK_SCHEME}://{INVITE_PATH_SEGMENT}/{}",
            self.to_slug()
        )
    }

    pub fn to_web_link(&self) -> String {
        format!(
            "https://{WEB_LINK_HOST}/{INVITE_PATH_SEGMENT}/{}",
            self.to_slug()
        )
    }

    pub fn from_slug(slug: &str) -> Result<Self, InviteError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(slug.trim())
            .map_err(|_| InviteError::InvalidFormat)?;
        let proto = SignedInviteProto::decode(bytes.as_slice())
            .map_err(|_| InviteError::InvalidFormat)?;
        if proto.payload.is_empty() || proto.signature.is_empty() {
            return Err(InviteError::InvalidFormat);
        }
        Ok(Self {
            payload_bytes: proto.payload,
            signature: proto.signature,
        })
    }

    /// Accepts a deep link, a web link, or a bare slug. All three forms
    /// decode to the same invite.
    pub fn from_link(link: &str) -> Result<Self, InviteError> {
        let link = link.trim();
        if let Ok(url) = Url::parse(link) {
            let slug = slug_from_url(&url).ok_or(InviteError::InvalidFormat)?;
            return Self::from_slug(slug);
        }
        Self::from_slug(link)
    }
}

fn slug_from_url(url: &Url) -> Option<&str> {
    match url.scheme() {
        DEEP_LINK_SCHEME => {
            // convos://i/{slug} parses with "i" as the host
            if url.host_str() != Some(INVITE_PATH_SEGMENT) {
                return None;
            }
            url.path_segments()?.next().filter(|s| !s.is_empty())
        }
        "https" | "http" => {
            if url.host_str() != Some(WEB_LINK_HOST) {
                return None;
            }
            let mut segments = url.path_segments()?;
            if segments.next() != Some(INVITE_PATH_SEGMENT) {
                return None;
            }
            segments.next().filter(|s| !s.is_empty())
        }
        _ => None,
    }
}

impl InvitePayload {
    pub fn invite_expired(&self, now_ns: i64) -> bool {
        self.expires_at_ns <= now_ns
    }

    pub fn conversation_expired(&self, now_ns: i64) -> bool {
        matches!(self.conversation_expires_at_ns, Some(at) if at <= now_ns)
    }
}
