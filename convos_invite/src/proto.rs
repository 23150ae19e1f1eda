//! Hand-rolled prost messages for the invite wire format and the
//! conversation side-channel metadata slot.
//!
//! Field tags are frozen; new fields must use fresh tags so old clients
//! skip them on decode.

/// Logical content of an invite. Signed as the exact bytes produced by
/// encoding this message, so field order must never change.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InvitePayloadProto {
    #[prost(string, tag = "1")]
    pub conversation_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub creator_inbox_id: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub tag: ::prost::alloc::string::String,
    #[prost(string, optional, tag = "4")]
    pub name: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(string, optional, tag = "5")]
    pub description: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(string, optional, tag = "6")]
    pub image_url: ::core::option::Option<::prost::alloc::string::String>,
    /// Invite TTL deadline, nanoseconds since the unix epoch.
    #[prost(int64, tag = "7")]
    pub expires_at_ns: i64,
    /// Self-destruct time of the conversation itself, independent of the
    /// invite TTL.
    #[prost(int64, optional, tag = "8")]
    pub conversation_expires_at_ns: ::core::option::Option<i64>,
}

/// Detached-signature envelope; the unit a slug encodes.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignedInviteProto {
    #[prost(bytes = "vec", tag = "1")]
    pub payload: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub signature: ::prost::alloc::vec::Vec<u8>,
}

/// Record stored in a group's application-data slot; how the correlation
/// tag becomes visible to all members.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConversationMetadataProto {
    #[prost(string, tag = "1")]
    pub tag: ::prost::alloc::string::String,
    #[prost(int64, optional, tag = "2")]
    pub expires_at_unix: ::core::option::Option<i64>,
    #[prost(message, repeated, tag = "3")]
    pub profiles: ::prost::alloc::vec::Vec<MemberProfileProto>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MemberProfileProto {
    #[prost(string, tag = "1")]
    pub inbox_id: ::prost::alloc::string::String,
    #[prost(string, optional, tag = "2")]
    pub name: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(string, optional, tag = "3")]
    pub image: ::core::option::Option<::prost::alloc::string::String>,
}
