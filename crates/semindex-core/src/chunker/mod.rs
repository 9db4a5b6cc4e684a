//! Bounded, language-aware text chunking (C4).
//!
//! `chunk` dispatches on the file's extension and language tag to one of
//! four strategies (markdown heading+paragraph split, JSON single-or-line,
//! code structural-boundary split, generic line-packing), then locates
//! each candidate's character offsets in the original normalized text and
//! estimates its token span. The chunker is deterministic: identical
//! inputs always produce identical output.

mod code;
mod lines;
mod markdown;

use std::path::Path;

/// One chunk candidate before a database id is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    /// The chunk's (trimmed) text.
    pub content: String,
    /// 0-based index within the file.
    pub chunk_index: i64,
    /// Start character offset into the file's normalized text.
    pub char_start: i64,
    /// End character offset (exclusive).
    pub char_end: i64,
    /// Estimated start token.
    pub token_start: i64,
    /// Estimated end token (exclusive).
    pub token_end: i64,
    /// Tokens of overlap shared with the previous chunk. 0 unless
    /// `overlap_tokens` applies (prose strategies).
    pub overlap_from_prev: i64,
}

/// Parameters controlling chunking.
#[derive(Debug, Clone, Copy)]
pub struct ChunkOptions {
    /// Target chunk size in estimated tokens.
    pub target_tokens: usize,
    /// Overlap recorded for prose chunks, in estimated tokens.
    pub overlap_tokens: usize,
}

/// Tokens are estimated as `⌈chars/4⌉`; this is the sole token measure
/// used by the chunker and by the orchestrator's pre-flight size checks.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    let chars = text.chars().count();
    chars.div_ceil(4)
}

/// Produce bounded, overlapping chunks for `text`, dispatching by `path`'s
/// extension and the optional `language` tag (from classification).
#[must_use]
pub fn chunk(path: &Path, text: &str, language: Option<&str>, options: ChunkOptions) -> Vec<ChunkSpan> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let (candidates, is_prose) = match extension.as_deref() {
        Some("md" | "markdown") => (markdown::chunk_markdown(text, options.target_tokens), true),
        Some("json") => (chunk_json(text, options.target_tokens), false),
        _ => match language.and_then(|lang| code::chunk_code(text, lang, options.target_tokens)) {
            Some(candidates) => (candidates, false),
            None => (lines::pack_lines(text, options.target_tokens), false),
        },
    };

    locate_spans(text, &candidates, is_prose, options)
}

/// `.json`: a single chunk if the whole document fits the budget,
/// otherwise fall back to line-packing.
fn chunk_json(text: &str, target_tokens: usize) -> Vec<String> {
    if estimate_tokens(text.trim()) <= target_tokens {
        vec![text.trim().to_string()]
    } else {
        lines::pack_lines(text, target_tokens)
    }
}

/// Locate each candidate's character offsets in `text` via a forward
/// search starting at the previous chunk's end, so offsets are
/// monotonically non-decreasing even when candidates were trimmed.
fn locate_spans(
    text: &str,
    candidates: &[String],
    is_prose: bool,
    options: ChunkOptions,
) -> Vec<ChunkSpan> {
    let chars: Vec<char> = text.chars().collect();
    let mut spans = Vec::with_capacity(candidates.len());
    let mut search_from = 0usize;

    for (index, candidate) in candidates.iter().enumerate() {
        let candidate_chars: Vec<char> = candidate.chars().collect();
        let (start, end) = find_char_span(&chars, &candidate_chars, search_from)
            .unwrap_or((search_from, search_from + candidate_chars.len()));
        search_from = end;

        let token_start = chars_to_tokens(start);
        let token_end = chars_to_tokens(end);
        let overlap_from_prev = if is_prose && index > 0 {
            options.overlap_tokens as i64
        } else {
            0
        };

        spans.push(ChunkSpan {
            content: candidate.clone(),
            chunk_index: index as i64,
            char_start: start as i64,
            char_end: end as i64,
            token_start,
            token_end,
            overlap_from_prev,
        });
    }

    spans
}

fn chars_to_tokens(char_count: usize) -> i64 {
    char_count.div_ceil(4) as i64
}

/// Find `needle` within `haystack` at or after `from`, returning the
/// `(start, end)` char-index span. Falls back to `None` if not found
/// (e.g. a strategy produced text that isn't a verbatim substring).
fn find_char_span(haystack: &[char], needle: &[char], from: usize) -> Option<(usize, usize)> {
    if needle.is_empty() {
        return Some((from, from));
    }
    let mut i = from;
    while i + needle.len() <= haystack.len() {
        if haystack[i..i + needle.len()] == *needle {
            return Some((i, i + needle.len()));
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn options(target_tokens: usize) -> ChunkOptions {
        ChunkOptions { target_tokens, overlap_tokens: 10 }
    }

    #[test]
    fn estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn markdown_scenario_s4() {
        let text = "# A\n\npara1\n\n# B\n\npara2\n";
        let spans = chunk(&PathBuf::from("doc.md"), text, None, options(100));
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].content, "# A\n\npara1");
        assert_eq!(spans[1].content, "# B\n\npara2");
        assert!(spans[0].char_end <= spans[1].char_start);
    }

    #[test]
    fn json_under_budget_is_one_chunk() {
        let text = "{\"a\": 1}";
        let spans = chunk(&PathBuf::from("data.json"), text, None, options(1000));
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].content, text);
    }

    #[test]
    fn json_over_budget_falls_back_to_line_packing() {
        let text = format!("{{\n{}\n}}\n", "  \"k\": \"v\",\n".repeat(500));
        let spans = chunk(&PathBuf::from("data.json"), &text, None, options(10));
        assert!(spans.len() > 1);
    }

    #[test]
    fn code_dispatch_uses_language_tag_not_extension() {
        let text = "fn a() {}\n\nfn b() {}\n";
        let spans = chunk(&PathBuf::from("weird_name.txt"), text, Some("rust"), options(100));
        assert_eq!(spans.len(), 2);
    }

    #[test]
    fn generic_fallback_for_unrecognized_extension_and_language() {
        let text = "line one\nline two\nline three\n";
        let spans = chunk(&PathBuf::from("notes.log"), text, None, options(2));
        assert!(spans.len() >= 2);
    }

    #[test]
    fn offsets_are_monotonically_non_decreasing() {
        let text = "fn a() {\n    1;\n}\n\nfn b() {\n    2;\n}\n\nfn c() {\n    3;\n}\n";
        let spans = chunk(&PathBuf::from("x.rs"), text, Some("rust"), options(100));
        for window in spans.windows(2) {
            assert!(window[0].char_end <= window[1].char_start);
        }
    }

    #[test]
    fn chunker_is_deterministic() {
        let text = "# T\n\nhello world\n\n# U\n\nbye\n";
        let a = chunk(&PathBuf::from("x.md"), text, None, options(50));
        let b = chunk(&PathBuf::from("x.md"), text, None, options(50));
        assert_eq!(a, b);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk(&PathBuf::from("empty.rs"), "   \n\n  ", Some("rust"), options(100)).is_empty());
    }

    #[test]
    fn prose_chunks_after_the_first_carry_overlap_metadata() {
        let para = "x".repeat(200);
        let text = format!("# Big\n\n{para}\n\n{para}\n");
        let spans = chunk(&PathBuf::from("x.md"), &text, None, options(50));
        assert!(spans.len() > 1);
        assert_eq!(spans[0].overlap_from_prev, 0);
        assert!(spans[1..].iter().all(|s| s.overlap_from_prev == 10));
    }
}
