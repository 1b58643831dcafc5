use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// An opening bracket runs to the first closing bracket after it; a second
// opening bracket in between is part of the span.
static UNCERTAIN_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]").unwrap());

/// Half-open `[start, end)` span of a low-confidence extraction, in
/// character (not byte) offsets into the text it was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRange {
    pub start: usize,
    pub end: usize,
}

impl ErrorRange {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The bracketed span of `text`, or `None` when the range does not fit.
    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        let start = byte_offset(text, self.start)?;
        let end = byte_offset(text, self.end)?;
        text.get(start..end)
    }
}

/// Scans `text` left to right for `[...]` spans.
pub fn annotate(text: &str) -> Vec<ErrorRange> {
    let mut ranges = Vec::new();
    let mut chars_seen = 0usize;
    let mut bytes_seen = 0usize;
    for m in UNCERTAIN_SPAN.find_iter(text) {
        chars_seen += text[bytes_seen..m.start()].chars().count();
        let start = chars_seen;
        let end = start + m.as_str().chars().count();
        chars_seen = end;
        bytes_seen = m.end();
        ranges.push(ErrorRange { start, end });
    }
    ranges
}

fn byte_offset(text: &str, char_offset: usize) -> Option<usize> {
    if char_offset == text.chars().count() {
        return Some(text.len());
    }
    text.char_indices().nth(char_offset).map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_each_bracketed_span() {
        let text = "Hello [wor]ld and [test] case";
        let ranges = annotate(text);
        assert_eq!(
            ranges,
            vec![
                ErrorRange { start: 6, end: 11 },
                ErrorRange { start: 18, end: 24 }
            ]
        );
        assert_eq!(ranges[0].slice(text), Some("[wor]"));
        assert_eq!(ranges[1].slice(text), Some("[test]"));
    }

    #[test]
    fn nested_brackets_stop_at_first_close() {
        let text = "a [b [c] d] e";
        let ranges = annotate(text);
        assert_eq!(ranges, vec![ErrorRange { start: 2, end: 8 }]);
        assert_eq!(ranges[0].slice(text), Some("[b [c]"));
    }

    #[test]
    fn unterminated_bracket_is_ignored() {
        assert!(annotate("no [closing bracket").is_empty());
        assert_eq!(annotate("[ok] then [open").len(), 1);
        assert!(annotate("stray ] only").is_empty());
    }

    #[test]
    fn offsets_count_characters_not_bytes() {
        let text = "café [naïve] ok";
        let ranges = annotate(text);
        assert_eq!(ranges, vec![ErrorRange { start: 5, end: 12 }]);
        assert_eq!(ranges[0].slice(text), Some("[naïve]"));
    }

    #[test]
    fn empty_brackets_are_still_reported() {
        let ranges = annotate("[]x");
        assert_eq!(ranges, vec![ErrorRange { start: 0, end: 2 }]);
        assert_eq!(ranges[0].len(), 2);
    }

    #[test]
    fn out_of_bounds_slice_is_none() {
        let range = ErrorRange { start: 3, end: 40 };
        assert_eq!(range.slice("short"), None);
    }
}
