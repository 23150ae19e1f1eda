//! Invite detection in arbitrary message bodies.
//!
//! Direct messages are an untrusted side channel that can carry anything, so
//! deciding that a body "looks like" an invite is an approximation. All of
//! the heuristics live behind [`looks_like_slug`] so there is exactly one
//! predicate to tune, not thresholds scattered across call sites.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

use crate::configuration::SLUG_MIN_DETECT_LEN;

// Tag byte for field 1, length-delimited: the `payload` field of the
// signed-invite envelope always leads the encoding.
const ENVELOPE_PREFIX: u8 = 0x0a;

fn is_base64url_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Whether a token plausibly is an invite slug: a long unbroken base64url
/// run whose decoding starts with the signed-invite envelope prefix.
///
/// Known approximation: any protobuf whose first field is length-delimited
/// and which happens to be base64url-encoded will pass. Callers must still
/// parse and verify the candidate; a positive here only earns an attempt.
pub fn looks_like_slug(token: &str) -> bool {
    let token = token.trim();
    if token.len() < SLUG_MIN_DETECT_LEN {
        return false;
    }
    if !token.chars().all(is_base64url_char) {
        return false;
    }
    match URL_SAFE_NO_PAD.decode(token) {
        Ok(bytes) => bytes.first() == Some(&ENVELOPE_PREFIX),
        Err(_) => false,
    }
}

/// Candidate invite tokens in a message body: link forms and slug-shaped
/// whitespace-separated runs.
pub fn invite_candidates(body: &str) -> Vec<&str> {
    body.split_whitespace()
        .filter(|token| {
            token.starts_with("convos://")
                || token.starts_with("https://convos.app/")
                || looks_like_slug(token)
        })
        .collect()
}
