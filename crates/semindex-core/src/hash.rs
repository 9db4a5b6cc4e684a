//! Content hashing and text normalization (C1).
//!
//! `hash(kind, payload)` is pure and MUST be stable across runs and
//! machines: it is used both for content-addressed change detection (C7)
//! and for the stored `content_hash` column, so any instability would make
//! delta analysis unsound.

use sha2::{Digest, Sha256};

/// Replace `\r\n` and lone `\r` with `\n`. This is the only normalization
/// C1 performs; CRLF information is intentionally not recoverable from the
/// result (see SPEC_FULL.md §9's open question on round-trip loss).
#[must_use]
pub fn normalize_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\r' {
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            out.push('\n');
        } else {
            out.push(c);
        }
    }
    out
}

/// SHA-256 of normalized UTF-8 text, hex-encoded.
#[must_use]
pub fn hash_text(normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// SHA-256 of raw bytes, hex-encoded. Used for binary files, where no text
/// normalization applies.
#[must_use]
pub fn hash_bytes(raw: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw);
    hex::encode(hasher.finalize())
}

/// SHA-256 of `<language-tag> 0x00 <normalized chunk text>`, so identical
/// text in different languages hashes differently. `language` is the
/// language tag if the owning file is code, or `None` otherwise.
#[must_use]
pub fn hash_chunk(language: Option<&str>, normalized_chunk_text: &str) -> String {
    let mut hasher = Sha256::new();
    if let Some(lang) = language {
        hasher.update(lang.as_bytes());
    }
    hasher.update([0u8]);
    hasher.update(normalized_chunk_text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_collapses_both_line_ending_styles() {
        assert_eq!(normalize_text("a\r\nb\rc\nd"), "a\nb\nc\nd");
    }

    #[test]
    fn normalize_text_is_a_no_op_on_already_lf_text() {
        assert_eq!(normalize_text("a\nb\nc"), "a\nb\nc");
    }

    #[test]
    fn hash_text_is_stable_across_calls() {
        let a = hash_text("fn main() {}\n");
        let b = hash_text("fn main() {}\n");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hash_text_differs_for_differing_content() {
        assert_ne!(hash_text("a"), hash_text("b"));
    }

    #[test]
    fn hash_bytes_matches_hash_text_for_ascii_input() {
        assert_eq!(hash_bytes(b"hello"), hash_text("hello"));
    }

    #[test]
    fn hash_chunk_differs_by_language_tag_for_identical_text() {
        let rust_hash = hash_chunk(Some("rust"), "fn f() {}");
        let python_hash = hash_chunk(Some("python"), "fn f() {}");
        assert_ne!(rust_hash, python_hash);
    }

    #[test]
    fn hash_chunk_with_no_language_matches_prefixed_null_byte_form() {
        let a = hash_chunk(None, "plain text");
        let b = hash_chunk(None, "plain text");
        assert_eq!(a, b);
    }

    #[test]
    fn crlf_normalized_text_hashes_identically_to_lf_text() {
        let crlf = normalize_text("line1\r\nline2\r\n");
        let lf = normalize_text("line1\nline2\n");
        assert_eq!(hash_text(&crlf), hash_text(&lf));
    }
}
