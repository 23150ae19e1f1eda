use convos_common::time::Duration;

/// Default invite TTL when the caller does not pick one.
pub const DEFAULT_INVITE_TTL: Duration = Duration::from_secs(60 * 60);

/// Deep-link scheme, `convos://i/{slug}`.
pub const DEEP_LINK_SCHEME: &str = "convos";
/// Web-link host, `https://convos.app/i/{slug}`.
pub const WEB_LINK_HOST: &str = "convos.app";
/// Path segment shared by both link forms.
pub const INVITE_PATH_SEGMENT: &str = "i";

/// Minimum run of base64url characters before message content is even
/// considered a slug candidate.
pub const SLUG_MIN_DETECT_LEN: usize = 96;

/// Number of random bytes behind a correlation tag.
pub const TAG_NONCE_LEN: usize = 16;
