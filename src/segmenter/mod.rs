//! Boundary-preference recursive text segmentation.
//!
//! [`RecursiveSegmenter`] splits a block of text into bounded, overlapping
//! segments using an ordered list of separators: the first separator that
//! occurs in the text wins, any piece still over budget is re-split with
//! the remaining separators, and the final empty-string separator falls
//! back to character slicing so termination never depends on the input
//! containing a linguistic boundary. Adjacent pieces are then merged
//! forward greedily up to the size budget, carrying roughly `overlap`
//! characters of the previous chunk's tail into the next chunk so a span
//! that straddles a chunk edge is still readable in one piece.
//!
//! Lengths are measured in `char`s; the character-level fallback slices on
//! grapheme clusters so a combining sequence never tears across chunks.

use std::collections::VecDeque;

use unicode_segmentation::UnicodeSegmentation;
use tracing::warn;

/// Separator preference used by the production pipeline: paragraph breaks,
/// line breaks, sentence ends, words, then raw characters.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Recursive character segmenter with greedy overlap merging.
///
/// All setters are `#[must_use]` builder-style; the defaults mirror the
/// production configuration (350 chars, 70 overlap, default separators,
/// separators retained).
#[derive(Debug, Clone)]
pub struct RecursiveSegmenter {
    max_chars: usize,
    overlap: usize,
    separators: Vec<String>,
    keep_separators: bool,
    strip_whitespace: bool,
}

impl Default for RecursiveSegmenter {
    fn default() -> Self {
        Self {
            max_chars: 350,
            overlap: 70,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
            keep_separators: true,
            strip_whitespace: true,
        }
    }
}

impl RecursiveSegmenter {
    /// Create a segmenter with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum chunk size in characters.
    #[must_use]
    pub fn max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars.max(1);
        self
    }

    /// Set the target overlap between consecutive chunks, in characters.
    #[must_use]
    pub fn overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }

    /// Replace the ordered separator list. An empty-string entry acts as
    /// the character-level fallback; without one, pieces with no finer
    /// boundary are emitted oversize (with a warning) rather than sliced.
    #[must_use]
    pub fn separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    /// Keep separator text attached to the piece it delimits (for meaningful
    /// separators like `". "`) or discard it (for pure whitespace).
    #[must_use]
    pub fn keep_separators(mut self, keep: bool) -> Self {
        self.keep_separators = keep;
        self
    }

    /// Trim surrounding whitespace from emitted chunks. Disable when exact
    /// reconstruction of the source from the chunks matters more than tidy
    /// output.
    #[must_use]
    pub fn strip_whitespace(mut self, strip: bool) -> Self {
        self.strip_whitespace = strip;
        self
    }

    /// Split `text` into bounded, overlapping segments.
    ///
    /// Degenerate input never errors: an empty string comes back as a
    /// single empty segment, and a single token longer than the budget with
    /// no internal separator comes back unmodified (flagged via `warn!`).
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return vec![String::new()];
        }
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        // First separator actually present wins; everything after it is the
        // fallback list for oversize pieces.
        let mut separator = separators.last().cloned().unwrap_or_default();
        let mut remaining: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = String::new();
                remaining = &[];
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate.clone();
                remaining = &separators[i + 1..];
                break;
            }
        }

        let pieces = split_on_separator(text, &separator, self.keep_separators);
        let merge_separator = if self.keep_separators { "" } else { separator.as_str() };

        let mut chunks = Vec::new();
        let mut mergeable: Vec<String> = Vec::new();
        for piece in pieces {
            if char_len(&piece) < self.max_chars {
                mergeable.push(piece);
                continue;
            }
            if !mergeable.is_empty() {
                chunks.extend(self.merge(&mergeable, merge_separator));
                mergeable.clear();
            }
            if remaining.is_empty() {
                warn!(
                    len = char_len(&piece),
                    max = self.max_chars,
                    "no separator splits this token; emitting oversize chunk"
                );
                chunks.push(piece);
            } else {
                chunks.extend(self.split_recursive(&piece, remaining));
            }
        }
        if !mergeable.is_empty() {
            chunks.extend(self.merge(&mergeable, merge_separator));
        }
        chunks
    }

    /// Greedy forward merge of small pieces into chunks of at most
    /// `max_chars`, retaining roughly `overlap` characters of tail between
    /// consecutive chunks.
    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let piece_len = char_len(piece);
            let join_cost = if window.is_empty() { 0 } else { separator_len };
            if total + piece_len + join_cost > self.max_chars {
                if total > self.max_chars {
                    warn!(
                        size = total,
                        max = self.max_chars,
                        "merged chunk exceeds the configured maximum"
                    );
                }
                if !window.is_empty() {
                    if let Some(chunk) = self.join(&window, separator) {
                        chunks.push(chunk);
                    }
                    // Drop pieces from the front until the retained tail fits
                    // the overlap budget and leaves room for the next piece.
                    loop {
                        let join_cost = if window.is_empty() { 0 } else { separator_len };
                        let over_overlap = total > self.overlap;
                        let over_budget =
                            total + piece_len + join_cost > self.max_chars && total > 0;
                        if !(over_overlap || over_budget) {
                            break;
                        }
                        let removed = window.pop_front().expect("nonzero total implies pieces");
                        total -= char_len(removed)
                            + if window.is_empty() { 0 } else { separator_len };
                    }
                }
            }
            window.push_back(piece.as_str());
            total += piece_len + if window.len() > 1 { separator_len } else { 0 };
        }

        if let Some(chunk) = self.join(&window, separator) {
            chunks.push(chunk);
        }
        chunks
    }

    fn join(&self, window: &VecDeque<&str>, separator: &str) -> Option<String> {
        let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
        let joined = if self.strip_whitespace {
            joined.trim().to_string()
        } else {
            joined
        };
        if joined.is_empty() { None } else { Some(joined) }
    }
}

/// Splits on a separator, optionally keeping the separator attached to the
/// front of the piece that follows it. The empty separator splits into
/// grapheme clusters. Empty pieces are dropped.
fn split_on_separator(text: &str, separator: &str, keep: bool) -> Vec<String> {
    if separator.is_empty() {
        return text.graphemes(true).map(str::to_string).collect();
    }
    if !keep {
        return text
            .split(separator)
            .filter(|piece| !piece.is_empty())
            .map(str::to_string)
            .collect();
    }

    let mut pieces = Vec::new();
    let mut carry: Option<&str> = None;
    let mut rest = text;
    while let Some(at) = rest.find(separator) {
        let mut piece = String::new();
        if let Some(prefix) = carry {
            piece.push_str(prefix);
        }
        piece.push_str(&rest[..at]);
        if !piece.is_empty() {
            pieces.push(piece);
        }
        carry = Some(separator);
        rest = &rest[at + separator.len()..];
    }
    let mut tail = String::new();
    if let Some(prefix) = carry {
        tail.push_str(prefix);
    }
    tail.push_str(rest);
    if !tail.is_empty() {
        pieces.push(tail);
    }
    pieces
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        let segmenter = RecursiveSegmenter::new();
        assert_eq!(segmenter.split("short text"), vec!["short text"]);
    }

    #[test]
    fn empty_text_yields_one_empty_chunk() {
        let segmenter = RecursiveSegmenter::new();
        assert_eq!(segmenter.split(""), vec![""]);
    }

    #[test]
    fn text_of_exactly_max_chars_is_not_split() {
        let text = "x".repeat(350);
        let segmenter = RecursiveSegmenter::new();
        let chunks = segmenter.split(&text);
        // 350 is not < 350, so the piece goes through the character
        // fallback and re-merges into a single chunk.
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], text);
    }

    #[test]
    fn separator_free_text_falls_back_to_character_windows() {
        let text: String = (0..400).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let segmenter = RecursiveSegmenter::new();
        let chunks = segmenter.split(&text);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 350);
        assert_eq!(chunks[1].chars().count(), 120);
        // The second chunk starts 70 characters before the first one ends.
        assert_eq!(&chunks[1][..70], &chunks[0][280..]);
    }

    #[test]
    fn paragraph_breaks_are_preferred_over_finer_separators() {
        let paragraph_a = "alpha ".repeat(20);
        let paragraph_b = "beta ".repeat(20);
        let text = format!("{}\n\n{}", paragraph_a.trim(), paragraph_b.trim());
        let segmenter = RecursiveSegmenter::new().max_chars(150).overlap(20);
        let chunks = segmenter.split(&text);

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].contains("alpha"));
        assert!(!chunks[0].contains("beta"));
        assert!(chunks[1].contains("beta"));
    }

    #[test]
    fn kept_separators_stay_attached_to_the_following_piece() {
        let pieces = split_on_separator("one. two. three", ". ", true);
        assert_eq!(pieces, vec!["one", ". two", ". three"]);
    }

    #[test]
    fn discarded_separators_vanish_from_pieces() {
        let pieces = split_on_separator("one two three", " ", false);
        assert_eq!(pieces, vec!["one", "two", "three"]);
    }

    #[test]
    fn single_oversize_token_is_emitted_unmodified() {
        let token = "y".repeat(50);
        let segmenter = RecursiveSegmenter::new()
            .max_chars(10)
            .overlap(2)
            .separators([" "]);
        // No empty-string fallback configured: nothing can split the token.
        let chunks = segmenter.split(&token);
        assert_eq!(chunks, vec![token]);
    }

    #[test]
    fn adjacent_sentences_merge_up_to_the_budget() {
        let text = "First sentence here. Second sentence here. Third sentence here.";
        let segmenter = RecursiveSegmenter::new().max_chars(45).overlap(10);
        let chunks = segmenter.split(&text);

        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 45, "oversize chunk: {chunk:?}");
        }
        assert!(chunks[0].starts_with("First sentence here."));
    }

    #[test]
    fn overlap_carries_tail_between_consecutive_chunks() {
        // Distinct words so the shared-boundary search below cannot match a
        // longer span than the merge actually carried over.
        let text: String = (0..60).map(|i| format!("w{i:02} ")).collect();
        let segmenter = RecursiveSegmenter::new()
            .max_chars(100)
            .overlap(30)
            .strip_whitespace(false);
        let chunks = segmenter.split(text.trim_end());

        assert!(chunks.len() >= 2);
        for pair in chunks.windows(2) {
            let prev = &pair[0];
            let next = &pair[1];
            // The next chunk begins with a suffix of the previous chunk.
            let shared = longest_shared_boundary(prev, next);
            assert!(shared > 0, "no overlap between {prev:?} and {next:?}");
            assert!(shared <= 30 + 5, "overlap {shared} far exceeds budget");
        }
    }

    fn longest_shared_boundary(prev: &str, next: &str) -> usize {
        let prev_chars: Vec<char> = prev.chars().collect();
        let next_chars: Vec<char> = next.chars().collect();
        let max = prev_chars.len().min(next_chars.len());
        (1..=max)
            .rev()
            .find(|&k| prev_chars[prev_chars.len() - k..] == next_chars[..k])
            .unwrap_or(0)
    }
}
