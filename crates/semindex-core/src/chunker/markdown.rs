//! Markdown chunking strategy: split on heading lines, then fall back to
//! paragraph-packing for any section that doesn't fit the budget.

use once_cell::sync::Lazy;
use regex::Regex;

use super::estimate_tokens;

static HEADING_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#{1,6} ").expect("valid regex"));

/// Split `text` on heading lines (`^#{1,6} `); each section runs from one
/// heading to the next (or end of text). A section larger than
/// `target_tokens` is further split on blank-line-separated paragraphs,
/// greedily packing paragraphs until the next would exceed the budget.
/// Returned pieces are trimmed of surrounding whitespace.
#[must_use]
pub fn chunk_markdown(text: &str, target_tokens: usize) -> Vec<String> {
    let heading_starts: Vec<usize> = HEADING_LINE.find_iter(text).map(|m| m.start()).collect();

    let mut sections = Vec::new();
    if heading_starts.is_empty() || heading_starts[0] != 0 {
        // Leading content before the first heading (or the whole file, if
        // there are no headings at all) is its own section.
        let end = heading_starts.first().copied().unwrap_or(text.len());
        if !text[..end].trim().is_empty() {
            sections.push(&text[..end]);
        }
    }
    for (i, &start) in heading_starts.iter().enumerate() {
        let end = heading_starts.get(i + 1).copied().unwrap_or(text.len());
        sections.push(&text[start..end]);
    }

    let mut out = Vec::new();
    for section in sections {
        let trimmed = section.trim();
        if trimmed.is_empty() {
            continue;
        }
        if estimate_tokens(trimmed) <= target_tokens {
            out.push(trimmed.to_string());
        } else {
            out.extend(pack_paragraphs(trimmed, target_tokens));
        }
    }
    out
}

/// Greedily pack blank-line-separated paragraphs until the next would
/// exceed `target_tokens`.
fn pack_paragraphs(section: &str, target_tokens: usize) -> Vec<String> {
    let paragraphs: Vec<&str> = section.split("\n\n").filter(|p| !p.trim().is_empty()).collect();

    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_tokens = 0usize;

    for paragraph in paragraphs {
        let paragraph = paragraph.trim();
        let paragraph_tokens = estimate_tokens(paragraph);

        if current.is_empty() {
            current.push_str(paragraph);
            current_tokens = paragraph_tokens;
            continue;
        }

        if current_tokens + paragraph_tokens > target_tokens {
            out.push(std::mem::take(&mut current));
            current.push_str(paragraph);
            current_tokens = paragraph_tokens;
        } else {
            current.push_str("\n\n");
            current.push_str(paragraph);
            current_tokens += paragraph_tokens;
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}
