use serde::{Deserialize, Serialize};

/// The trust decision on a conversation.
#[repr(i32)]
#[derive(Debug, Default, Copy, Clone, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub enum ConsentState {
    #[default]
    Unknown = 0,
    /// Visible and active.
    Allowed = 1,
    /// Hidden or rejected.
    Denied = 2,
}

impl ConsentState {
    /// Terminal states are never overwritten by automated reconciliation;
    /// only an explicit user action may leave them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Allowed | Self::Denied)
    }
}

/// The two conversation kinds carry different default-consent policies, so
/// the reconciler matches on this exhaustively.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub enum ConversationKind {
    Group,
    Dm,
}

/// Locally stored conversation row. `consent` is mutated only by the
/// reconciler; `pinned`, `muted` and `unread_count` are user-local and must
/// survive reconciliation untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: String,
    pub kind: ConversationKind,
    /// The local identity hosting this conversation.
    pub inbox_id: String,
    pub creator_inbox_id: String,
    /// Join-correlation tag mirrored from the group's side-channel
    /// metadata slot. Not derived from `id`.
    pub tag: Option<String>,
    pub consent: ConsentState,
    /// Self-destruct time in ns, if the conversation has one.
    pub expires_at_ns: Option<i64>,
    pub name: String,
    pub description: String,
    pub image_url: String,
    pub last_message_ns: Option<i64>,
    pub pinned: bool,
    pub muted: bool,
    pub unread_count: u32,
}

/// A conversation as delivered by the network, via full sync or the push
/// stream. The side-channel metadata slot is fetched separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConversation {
    pub id: String,
    pub kind: ConversationKind,
    pub creator_inbox_id: String,
    pub name: String,
    pub description: String,
    pub image_url: String,
    pub expires_at_ns: Option<i64>,
    pub last_message_ns: Option<i64>,
}

/// A direct message as delivered by the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMessage {
    pub id: String,
    pub sender_inbox_id: String,
    pub sent_at_ns: i64,
    pub body: String,
}

/// A locally-created messaging identity. One identity hosts one
/// conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub inbox_id: String,
    pub created_at_ns: i64,
}

/// A processed join request: a verified invite slug received over the DM
/// side channel whose tag matched an owned group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub message_id: String,
    pub sender_inbox_id: String,
    pub conversation_id: String,
    pub tag: String,
    pub sent_at_ns: i64,
}
