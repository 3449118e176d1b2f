//! Paragraph-aware, boundary-seeking text splitter shared by every handler.
//!
//! Lengths and positions are counted in characters, not bytes.

/// Sentence terminators are searched this far back from a proposed cut.
const SENTENCE_LOOKBACK: usize = 100;
/// Whitespace is searched this far back when no sentence boundary is found.
const WORD_LOOKBACK: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitterConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub preserve_paragraphs: bool,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
            preserve_paragraphs: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TextSplitter {
    config: SplitterConfig,
}

impl TextSplitter {
    #[must_use]
    pub fn new(config: SplitterConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// Split `text` into trimmed, non-blank chunks.
    ///
    /// Text that already fits in `chunk_size` is returned unchanged as a
    /// single chunk.
    #[must_use]
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        let SplitterConfig {
            chunk_size,
            chunk_overlap,
            preserve_paragraphs,
        } = self.config;

        if text.chars().count() <= chunk_size {
            return vec![text.to_owned()];
        }

        let chunks = if preserve_paragraphs {
            split_paragraphs(text, chunk_size, chunk_overlap)
        } else {
            let chars: Vec<char> = text.chars().collect();
            split_window(&chars, chunk_size, chunk_overlap)
        };

        chunks
            .into_iter()
            .filter(|c| !c.trim().is_empty())
            .collect()
    }
}

/// Convenience wrapper around [`TextSplitter::split`].
#[must_use]
pub fn split_text(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    preserve_paragraphs: bool,
) -> Vec<String> {
    TextSplitter::new(SplitterConfig {
        chunk_size,
        chunk_overlap,
        preserve_paragraphs,
    })
    .split(text)
}

/// Greedily pack blank-line separated paragraphs into chunks.
fn split_paragraphs(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut buffer_len = 0usize;

    for paragraph in text.split("\n\n") {
        let paragraph_len = paragraph.chars().count();

        if buffer_len + paragraph_len + 2 > chunk_size {
            if buffer.is_empty() {
                let chars: Vec<char> = paragraph.chars().collect();
                let mut pieces = split_window(&chars, chunk_size, chunk_overlap);
                let last = pieces.pop().unwrap_or_default();
                chunks.extend(pieces);
                buffer_len = last.chars().count();
                buffer = last;
            } else {
                chunks.push(buffer.trim().to_owned());
                buffer = if chunk_overlap > 0 {
                    format!("{}\n\n{paragraph}", tail_chars(&buffer, chunk_overlap))
                } else {
                    paragraph.to_owned()
                };
                buffer_len = buffer.chars().count();
            }
        } else {
            if !buffer.is_empty() {
                buffer.push_str("\n\n");
                buffer_len += 2;
            }
            buffer.push_str(paragraph);
            buffer_len += paragraph_len;
        }
    }

    if !buffer.is_empty() {
        chunks.push(buffer.trim().to_owned());
    }
    chunks
}

fn split_window(chars: &[char], chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    window_spans(chars, chunk_size, chunk_overlap)
        .into_iter()
        .filter_map(|(start, end)| {
            let piece: String = chars[start..end].iter().collect();
            let trimmed = piece.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_owned())
        })
        .collect()
}

/// Raw `[start, end)` windows before trimming.
fn window_spans(chars: &[char], chunk_size: usize, chunk_overlap: usize) -> Vec<(usize, usize)> {
    let len = chars.len();
    let mut spans = Vec::new();
    let mut cursor = 0usize;

    while cursor < len {
        let mut end = cursor + chunk_size;
        if end < len {
            end = seek_boundary(chars, cursor, end, chunk_size);
        }
        spans.push((cursor, end.min(len)));
        cursor = (cursor + 1).max(end.saturating_sub(chunk_overlap));
    }
    spans
}

/// Walk back from `end` to a sentence end, then to whitespace, else keep `end`.
fn seek_boundary(chars: &[char], cursor: usize, end: usize, chunk_size: usize) -> usize {
    let floor = cursor + chunk_size / 2;

    let sentence_floor = floor.max(end.saturating_sub(SENTENCE_LOOKBACK));
    if let Some(i) =
        (sentence_floor + 1..=end).rev().find(|&i| matches!(chars[i], '.' | '!' | '?'))
    {
        return i + 1;
    }

    let word_floor = floor.max(end.saturating_sub(WORD_LOOKBACK));
    if let Some(i) = (word_floor + 1..=end).rev().find(|&i| chars[i].is_whitespace()) {
        return i;
    }

    end
}

/// Last `n` characters of `s` (all of it when shorter). `n` must be non-zero.
pub(crate) fn tail_chars(s: &str, n: usize) -> &str {
    match s.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(count: usize) -> String {
        const WORDS: [&str; 6] = ["lorem", "ipsum", "dolor", "sit", "amet", "consectetur"];
        (0..count)
            .map(|i| WORDS[i % WORDS.len()])
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn strip_ws(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn empty_text() {
        assert!(split_text("", 10, 2, true).is_empty());
        assert!(split_text("", 10, 2, false).is_empty());
    }

    #[test]
    fn small_text_single_chunk() {
        assert_eq!(split_text("Hello world", 1000, 100, true), vec!["Hello world"]);
    }

    #[test]
    fn text_at_limit_is_returned_untrimmed() {
        assert_eq!(split_text("  abc  ", 7, 0, false), vec!["  abc  "]);
    }

    #[test]
    fn two_paragraph_overflow_without_overlap() {
        let a = "a".repeat(900);
        let b = "b".repeat(900);
        let text = format!("{a}\n\n{b}");
        assert_eq!(split_text(&text, 1000, 0, true), vec![a, b]);
    }

    #[test]
    fn two_paragraph_overflow_with_overlap_seeds_tail() {
        let a = "a".repeat(900);
        let b = "b".repeat(900);
        let text = format!("{a}\n\n{b}");
        let chunks = split_text(&text, 1000, 10, true);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], a);
        assert_eq!(chunks[1], format!("{}\n\n{b}", "a".repeat(10)));
    }

    #[test]
    fn small_paragraphs_are_merged() {
        let text = format!("{}\n\none\n\ntwo", "x".repeat(20));
        let chunks = split_text(&text, 20, 0, true);
        assert_eq!(chunks, vec!["x".repeat(20), "one\n\ntwo".to_owned()]);
    }

    #[test]
    fn oversized_paragraph_uses_word_boundaries() {
        let text = words(600);
        assert!(text.chars().count() > 3000);
        let chunks = split_text(&text, 1000, 100, true);
        assert!(chunks.len() >= 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 1000);
            assert_eq!(chunk.trim(), chunk);
            assert!(!chunk.ends_with("consecte"));
        }
        for pair in chunks.windows(2) {
            let head: String = pair[1].chars().take(20).collect();
            assert!(pair[0].contains(&head), "expected overlap between chunks");
        }
    }

    #[test]
    fn window_prefers_sentence_boundary() {
        let text = format!("{}. {}", "a".repeat(70), "b".repeat(60));
        let chunks = split_text(&text, 100, 0, false);
        assert_eq!(chunks[0], format!("{}.", "a".repeat(70)));
        assert_eq!(chunks[1], "b".repeat(60));
    }

    #[test]
    fn window_hard_cut_without_boundaries() {
        let text = "x".repeat(250);
        let chunks = split_text(&text, 100, 0, false);
        let lens: Vec<usize> = chunks.iter().map(String::len).collect();
        assert_eq!(lens, vec![100, 100, 50]);
    }

    #[test]
    fn sentence_at_cut_can_exceed_size_by_one() {
        let text = format!("{}.{}", "a".repeat(10), "b".repeat(20));
        let chunks = split_text(&text, 10, 0, false);
        assert_eq!(chunks[0].chars().count(), 11);
    }

    #[test]
    fn overlap_larger_than_size_terminates() {
        let text = "abc def ghi jkl mno pqr".repeat(10);
        let chunks = split_text(&text, 8, 50, false);
        assert!(!chunks.is_empty());
    }

    #[test]
    fn oversized_paragraph_tail_seeds_buffer() {
        let p = "p".repeat(999);
        let text = format!("{p}\n\nqq");
        let chunks = split_text(&text, 1000, 100, true);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], p);
        assert_eq!(chunks[1], format!("{}\n\nqq", "p".repeat(99)));
    }

    #[test]
    fn multibyte_text_is_counted_in_chars() {
        let text = "héllo wörld ".repeat(30);
        let chunks = split_text(&text, 50, 5, false);
        assert!(chunks.iter().all(|c| c.chars().count() <= 51));
    }

    #[test]
    fn whitespace_only_chunks_are_dropped() {
        let text = format!("{}\n\n   \n\n{}", "a".repeat(8), "b".repeat(8));
        let chunks = split_text(&text, 10, 0, true);
        assert!(chunks.iter().all(|c| !c.trim().is_empty()));
    }

    #[test]
    fn tail_chars_handles_short_strings() {
        assert_eq!(tail_chars("abcdef", 3), "def");
        assert_eq!(tail_chars("ab", 5), "ab");
        assert_eq!(tail_chars("añb", 2), "ñb");
    }

    #[test]
    fn splitter_exposes_config() {
        let splitter = TextSplitter::default();
        assert_eq!(splitter.config().chunk_size, 1000);
        assert_eq!(splitter.config().chunk_overlap, 100);
        assert!(splitter.config().preserve_paragraphs);
    }

    mod proptest_splitter {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(500))]

            #[test]
            fn split_never_panics(
                content in "\\PC{0,3000}",
                chunk_size in 1usize..1500,
                chunk_overlap in 0usize..2000,
                preserve in proptest::bool::ANY,
            ) {
                let _ = split_text(&content, chunk_size, chunk_overlap, preserve);
            }

            #[test]
            fn short_text_is_returned_as_is(
                content in "\\PC{1,200}",
                extra in 0usize..50,
                preserve in proptest::bool::ANY,
            ) {
                let size = content.chars().count() + extra;
                let chunks = split_text(&content, size, 0, preserve);
                prop_assert_eq!(chunks, vec![content]);
            }

            #[test]
            fn no_blank_chunks(
                content in "[a-z.!? \\n]{1,2000}",
                chunk_size in 1usize..300,
                chunk_overlap in 0usize..300,
                preserve in proptest::bool::ANY,
            ) {
                let chunks = split_text(&content, chunk_size, chunk_overlap, preserve);
                if content.chars().count() > chunk_size {
                    for chunk in &chunks {
                        prop_assert!(!chunk.trim().is_empty());
                        prop_assert_eq!(chunk.trim(), chunk.as_str());
                    }
                }
            }

            #[test]
            fn non_whitespace_content_is_preserved_without_overlap(
                content in "[a-z.!? \\n]{1,2000}",
                chunk_size in 1usize..300,
                preserve in proptest::bool::ANY,
            ) {
                let chunks = split_text(&content, chunk_size, 0, preserve);
                let joined: String = chunks.iter().map(|c| strip_ws(c)).collect();
                prop_assert_eq!(joined, strip_ws(&content));
            }

            #[test]
            fn window_overlap_is_bounded(
                content in "[a-z. ]{1,2000}",
                chunk_size in 1usize..300,
                chunk_overlap in 0usize..300,
            ) {
                let chars: Vec<char> = content.chars().collect();
                let spans = window_spans(&chars, chunk_size, chunk_overlap);
                for &(start, end) in &spans {
                    prop_assert!(end - start <= chunk_size + 1);
                }
                for pair in spans.windows(2) {
                    let (s1, e1) = pair[0];
                    let (s2, _) = pair[1];
                    prop_assert!(s2 > s1);
                    prop_assert!(e1.saturating_sub(s2) <= chunk_overlap);
                }
            }

            #[test]
            fn window_covers_every_position(
                content in "[a-z. ]{1,2000}",
                chunk_size in 1usize..300,
                chunk_overlap in 0usize..300,
            ) {
                let chars: Vec<char> = content.chars().collect();
                let spans = window_spans(&chars, chunk_size, chunk_overlap);
                let mut covered = 0usize;
                for &(start, end) in &spans {
                    prop_assert!(start <= covered);
                    covered = covered.max(end);
                }
                prop_assert_eq!(covered, chars.len());
            }
        }
    }
}
