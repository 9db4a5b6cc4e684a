//! File-type classification (C2).
//!
//! The classifier is authoritative: the orchestrator never overrides its
//! verdict. Rules are applied in order — extension lookup first, then a
//! byte-sniff fallback for unknown extensions.

use std::path::Path;

use crate::types::Classification;

/// Result of classifying a single path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifyResult {
    /// The three-way decision.
    pub classification: Classification,
    /// Language tag, present only for `Classification::Code`.
    pub language: Option<String>,
}

/// Extensions recognized as code, paired with their language tag.
const CODE_EXTENSIONS: &[(&str, &str)] = &[
    ("rs", "rust"),
    ("py", "python"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("mjs", "javascript"),
    ("go", "go"),
    ("java", "java"),
    ("kt", "kotlin"),
    ("kts", "kotlin"),
    ("c", "c"),
    ("h", "c"),
    ("cpp", "cpp"),
    ("cc", "cpp"),
    ("cxx", "cpp"),
    ("hpp", "cpp"),
    ("hxx", "cpp"),
    ("cs", "csharp"),
    ("rb", "ruby"),
    ("php", "php"),
    ("swift", "swift"),
    ("sh", "shell"),
    ("bash", "shell"),
    ("zsh", "shell"),
];

/// Extensions recognized as plain/structured text (no language tag).
const TEXT_EXTENSIONS: &[&str] = &[
    "md", "markdown", "txt", "json", "jsonc", "toml", "yml", "yaml", "xml", "html", "htm", "css",
    "scss", "csv", "ini", "cfg",
];

/// Extensions always treated as binary regardless of sniffing.
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "pdf", "zip", "gz", "tar", "so", "dll",
    "dylib", "exe", "woff", "woff2", "ttf", "otf", "mp3", "mp4", "wasm",
];

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Classify a path using extension lookup, falling back to a byte-sniff of
/// `sniff_bytes` (the first up-to-512 bytes of the file) when the
/// extension is unrecognized.
///
/// `sniff_bytes` should be `None` only when the caller could not read the
/// file (I/O failure); per spec §4.2 that case also declares binary.
#[must_use]
pub fn classify(path: &Path, sniff_bytes: Option<&[u8]>) -> ClassifyResult {
    if let Some(ext) = extension_of(path) {
        if let Some((_, lang)) = CODE_EXTENSIONS.iter().find(|(e, _)| *e == ext) {
            return ClassifyResult {
                classification: Classification::Code,
                language: Some((*lang).to_string()),
            };
        }
        if TEXT_EXTENSIONS.contains(&ext.as_str()) {
            return ClassifyResult { classification: Classification::Text, language: None };
        }
        if BINARY_EXTENSIONS.contains(&ext.as_str()) {
            return ClassifyResult { classification: Classification::Binary, language: None };
        }
    }

    match sniff_bytes {
        Some(bytes) if is_text_sniff(bytes) => {
            ClassifyResult { classification: Classification::Text, language: None }
        }
        _ => ClassifyResult { classification: Classification::Binary, language: None },
    }
}

/// `true` iff every byte is `{9, 10, 13}` or within `[32, 126]`.
fn is_text_sniff(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .all(|&b| matches!(b, 9 | 10 | 13) || (32..=126).contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn recognized_code_extension_maps_to_code_with_language_tag() {
        let result = classify(&PathBuf::from("src/main.rs"), None);
        assert_eq!(result.classification, Classification::Code);
        assert_eq!(result.language.as_deref(), Some("rust"));
    }

    #[test]
    fn recognized_text_extension_maps_to_text_with_no_language() {
        let result = classify(&PathBuf::from("README.md"), None);
        assert_eq!(result.classification, Classification::Text);
        assert_eq!(result.language, None);
    }

    #[test]
    fn recognized_binary_extension_maps_to_binary_without_sniffing() {
        let result = classify(&PathBuf::from("logo.png"), Some(b"not actually checked"));
        assert_eq!(result.classification, Classification::Binary);
    }

    #[test]
    fn unknown_extension_with_printable_sniff_is_text() {
        let result = classify(&PathBuf::from("Makefile.unknownext"), Some(b"all:\n\techo hi\n"));
        assert_eq!(result.classification, Classification::Text);
    }

    #[test]
    fn unknown_extension_with_non_printable_sniff_is_binary() {
        let result = classify(&PathBuf::from("data.unknownext"), Some(&[0, 1, 2, 255]));
        assert_eq!(result.classification, Classification::Binary);
    }

    #[test]
    fn io_failure_sniffing_declares_binary() {
        let result = classify(&PathBuf::from("data.unknownext"), None);
        assert_eq!(result.classification, Classification::Binary);
    }

    #[test]
    fn sniff_allows_tab_newline_and_carriage_return_control_bytes() {
        assert!(is_text_sniff(&[9, 10, 13, 65]));
    }

    #[test]
    fn sniff_rejects_other_control_bytes() {
        assert!(!is_text_sniff(&[7]));
    }
}
