//! Session ID generation
//!
//! IDs use the format: `{6-char-hex}-{kind}-{slug}`
//! Example: `019876-session-quantum-error-correction`

use tracing::debug;

/// Generate an id from kind and title
pub fn generate_id(kind: &str, title: &str) -> String {
    debug!(%kind, %title, "generate_id: called");
    let uuid = uuid::Uuid::now_v7();
    let hex_prefix = &uuid.to_string()[..6];
    format!("{}-{}-{}", hex_prefix, kind, slugify(title))
}

/// Slugify a title for use in IDs
fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c == '\'' || c == '\u{2019}' || c == '\u{2018}' {
                None // apostrophes are stripped, not hyphenated
            } else {
                Some('-')
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .take(8)
        .collect::<Vec<_>>()
        .join("-")
}
