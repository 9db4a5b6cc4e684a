//! Greedy line-packing, shared by the generic fallback strategy and by
//! every other strategy's over-budget fallback (markdown paragraphs, code
//! candidates over budget, JSON over budget).

use super::estimate_tokens;

/// Accumulate lines until adding the next would exceed `target_tokens`. A
/// single line that alone exceeds the budget is emitted as its own chunk
/// rather than being split further.
#[must_use]
pub fn pack_lines(text: &str, target_tokens: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_tokens = 0usize;

    for line in text.split_inclusive('\n') {
        let line_tokens = estimate_tokens(line);

        if current.is_empty() {
            current.push_str(line);
            current_tokens = line_tokens;
            continue;
        }

        if current_tokens + line_tokens > target_tokens {
            out.push(std::mem::take(&mut current));
            current.push_str(line);
            current_tokens = line_tokens;
        } else {
            current.push_str(line);
            current_tokens += line_tokens;
        }
    }

    if !current.is_empty() {
        out.push(current);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_lines_keeps_short_text_as_one_chunk() {
        let packed = pack_lines("a\nb\nc\n", 100);
        assert_eq!(packed, vec!["a\nb\nc\n"]);
    }

    #[test]
    fn pack_lines_splits_once_budget_exceeded() {
        // Each line is 20 chars -> 5 tokens; budget 6 tokens fits one line only.
        let line = "x".repeat(19) + "\n";
        let text = line.repeat(3);
        let packed = pack_lines(&text, 6);
        assert_eq!(packed.len(), 3);
    }

    #[test]
    fn pack_lines_emits_an_oversized_single_line_alone() {
        let huge_line = "x".repeat(1000);
        let packed = pack_lines(&huge_line, 10);
        assert_eq!(packed.len(), 1);
        assert_eq!(packed[0], huge_line);
    }
}
