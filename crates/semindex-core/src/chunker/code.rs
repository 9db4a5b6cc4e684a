//! Code chunking strategy: locate structural boundary lines with
//! per-language regex sets for functions/classes/interfaces/types/structs/
//! traits/impls, then treat each interval between consecutive boundaries
//! as a candidate chunk.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use super::estimate_tokens;
use super::lines::pack_lines;

/// Per-language structural boundary patterns, anchored to (optionally
/// indented) line starts. Each alternative targets one of
/// function/class/interface/type/struct/trait/impl depending on what the
/// language actually has.
static LANGUAGE_PATTERNS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(
        "rust",
        r"(?m)^\s*(pub(\([^)]*\))?\s+)?(async\s+)?(fn|struct|enum|trait|impl|mod)\s",
    );
    m.insert("python", r"(?m)^\s*(async\s+def|def|class)\s");
    m.insert(
        "typescript",
        r"(?m)^\s*(export\s+)?(default\s+)?(async\s+)?(function|class|interface|type|enum)\s",
    );
    m.insert(
        "javascript",
        r"(?m)^\s*(export\s+)?(default\s+)?(async\s+)?(function|class)\s",
    );
    m.insert("go", r"(?m)^\s*(func|type)\s");
    m.insert("java", r"(?m)^\s*(public|private|protected|static|final|\s)*\s*(class|interface|enum)\s");
    m.insert("csharp", r"(?m)^\s*(public|private|protected|internal|static|sealed|abstract|\s)*\s*(class|interface|struct|enum)\s");
    m.insert("kotlin", r"(?m)^\s*(public|private|internal|open|abstract|\s)*\s*(fun|class|interface|object)\s");
    m.insert("ruby", r"(?m)^\s*(def|class|module)\s");
    m.insert("php", r"(?m)^\s*(abstract\s+|final\s+)?(function|class|interface|trait)\s");
    m.insert("swift", r"(?m)^\s*(public|private|internal|open|\s)*\s*(func|class|struct|enum|protocol)\s");
    m.insert("c", r"(?m)^\s*(struct|enum|union)\s");
    m.insert("cpp", r"(?m)^\s*(class|struct|enum|namespace)\s");
    m
});

fn pattern_for(language: &str) -> Option<Regex> {
    LANGUAGE_PATTERNS
        .get(language)
        .and_then(|pattern| Regex::new(pattern).ok())
}

/// Split `text` on structural boundary lines for `language`. Returns
/// `None` if the language has no registered pattern (the caller should
/// fall back to generic line-packing). Each interval between consecutive
/// boundaries is a candidate; candidates over `target_tokens` are
/// line-packed.
#[must_use]
pub fn chunk_code(text: &str, language: &str, target_tokens: usize) -> Option<Vec<String>> {
    let boundary_re = pattern_for(language)?;
    let starts: Vec<usize> = boundary_re.find_iter(text).map(|m| m.start()).collect();

    let mut sections: Vec<&str> = Vec::new();
    if starts.is_empty() {
        sections.push(text);
    } else {
        if starts[0] != 0 && !text[..starts[0]].trim().is_empty() {
            sections.push(&text[..starts[0]]);
        }
        for (i, &start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(text.len());
            sections.push(&text[start..end]);
        }
    }

    let mut out = Vec::new();
    for section in sections {
        let trimmed = section.trim_end();
        if trimmed.trim().is_empty() {
            continue;
        }
        if estimate_tokens(trimmed) <= target_tokens {
            out.push(trimmed.to_string());
        } else {
            out.extend(pack_lines(trimmed, target_tokens));
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_language_returns_none() {
        assert!(chunk_code("whatever", "cobol", 100).is_none());
    }

    #[test]
    fn splits_rust_source_on_fn_and_struct_boundaries() {
        let text = "struct Foo {\n    x: i32,\n}\n\nfn bar() {\n    println!(\"hi\");\n}\n";
        let chunks = chunk_code(text, "rust", 100).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with("struct Foo"));
        assert!(chunks[1].starts_with("fn bar"));
    }

    #[test]
    fn leading_imports_before_first_boundary_become_their_own_section() {
        let text = "use std::fmt;\n\nfn main() {}\n";
        let chunks = chunk_code(text, "rust", 100).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "use std::fmt;");
    }

    #[test]
    fn oversized_candidate_is_line_packed() {
        let body = "    x();\n".repeat(200);
        let text = format!("fn huge() {{\n{body}}}\n");
        let chunks = chunk_code(&text, "rust", 20).unwrap();
        assert!(chunks.len() > 1);
    }

    #[test]
    fn python_splits_on_def_and_class() {
        let text = "class A:\n    pass\n\ndef f():\n    pass\n";
        let chunks = chunk_code(text, "python", 100).unwrap();
        assert_eq!(chunks.len(), 2);
    }
}
