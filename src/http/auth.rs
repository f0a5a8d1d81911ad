//! Bearer-token extraction for the game endpoints.

use crate::players::TOKEN_LEN;

/// Parses an `Authorization` header value into a registry token.
///
/// The scheme must be exactly `Bearer `; the credential must be exactly 32
/// hex characters and is lowercased before lookup. Anything else is an
/// invalid token.
pub fn parse_bearer_token(header: &str) -> Option<String> {
    let token = header.strip_prefix("Bearer ")?;
    if token.len() != TOKEN_LEN || !token.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(token.to_ascii_lowercase())
}
