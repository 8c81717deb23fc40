use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};

/// PKCE code verifier of 128 alphanumeric characters.
pub fn generate_code_verifier() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(128)
        .map(char::from)
        .collect()
}

/// S256 challenge for `verifier`.
///
/// # Example
///
/// ```
/// use trackteller::utils::generate_code_challenge;
///
/// let challenge = generate_code_challenge("verifier");
/// assert_eq!(challenge.len(), 43);
/// assert!(!challenge.contains('='));
/// ```
pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Random anti-CSRF nonce: 16 bytes, base64url without padding (22 chars).
pub fn generate_state() -> String {
    let random_bytes: [u8; 16] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Formats a duration in milliseconds as `m:ss`.
pub fn format_duration(milliseconds: u64) -> String {
    let total_seconds = milliseconds / 1000;
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}

/// Shortens `text` to at most `max` characters, marking the cut with `…`.
pub fn truncate(text: &str, max: usize) -> String {
    let single_line = text.split_whitespace().collect::<Vec<&str>>().join(" ");
    if single_line.chars().count() <= max {
        return single_line;
    }
    let mut cut: String = single_line.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
