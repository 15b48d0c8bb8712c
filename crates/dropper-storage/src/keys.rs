//! Shared key generation for storage backends.
//!
//! Key format: `{prefix}/{record_id}/{filename}`.

use std::fmt::Display;

/// Generate the destination key for one attachment.
///
/// The record id keeps two files with the same name from overwriting each other.
/// The filename is sanitized so the key cannot escape its prefix.
pub fn destination_key(prefix: &str, record_id: impl Display, filename: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let filename = sanitize_filename(filename);
    if prefix.is_empty() {
        format!("{}/{}", record_id, filename)
    } else {
        format!("{}/{}/{}", prefix, record_id, filename)
    }
}

fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.replace("..", "_");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Reject keys that could resolve outside the storage root.
pub(crate) fn is_safe_key(key: &str) -> bool {
    !key.is_empty() && !key.contains("..") && !key.starts_with('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_includes_prefix_id_and_name() {
        assert_eq!(
            destination_key("attachments", "abc", "photo.png"),
            "attachments/abc/photo.png"
        );
        assert_eq!(destination_key("/nested/p/", "abc", "a.txt"), "nested/p/abc/a.txt");
        assert_eq!(destination_key("", "abc", "a.txt"), "abc/a.txt");
    }

    #[test]
    fn traversal_in_filename_is_neutralized() {
        let key = destination_key("attachments", "abc", "../../etc/passwd");
        assert!(is_safe_key(&key));
        assert!(key.starts_with("attachments/abc/"));
        assert!(!key.trim_start_matches("attachments/abc/").contains('/'));
    }

    #[test]
    fn blank_filename_gets_placeholder() {
        assert_eq!(destination_key("a", "id", "   "), "a/id/file");
    }

    #[test]
    fn unsafe_keys_are_detected() {
        assert!(!is_safe_key("/etc/passwd"));
        assert!(!is_safe_key("a/../b"));
        assert!(!is_safe_key(""));
        assert!(is_safe_key("attachments/id/a.txt"));
    }
}
