//! Sender allowlist for the QQ adapter.
//!
//! Allow-by-default: an empty `allow_from` list lets everyone through, as
//! does the wildcard `"*"`. Otherwise the sender openid must be listed.

/// Returns `true` when the given sender may reach the bus.
///
/// Matching is exact and case-sensitive; openids are opaque tokens.
pub fn is_allowed(allow_from: &[String], sender_id: &str) -> bool {
    if allow_from.is_empty() {
        return true;
    }
    allow_from
        .iter()
        .map(|entry| entry.trim())
        .any(|entry| entry == "*" || entry == sender_id)
}
