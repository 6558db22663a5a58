//! Property tests for the normalizer and the segmenter.
//!
//! The segmenter geometry is checked on separator-free input, where the
//! character fallback makes chunk boundaries fully deterministic: chunks
//! advance by `max - overlap` characters and adjacent chunks share exactly
//! `overlap` characters.

use chunkforge::segmenter::RecursiveSegmenter;
use chunkforge::titles::{normalize_match, normalize_storage};
use proptest::prelude::*;

proptest! {
    #[test]
    fn storage_normalization_is_idempotent(raw in "\\PC{0,60}") {
        let once = normalize_storage(&raw);
        prop_assert_eq!(normalize_storage(&once), once.clone());
    }

    #[test]
    fn match_normalization_is_idempotent(raw in "\\PC{0,60}") {
        let once = normalize_match(&raw);
        prop_assert_eq!(normalize_match(&once), once.clone());
    }

    #[test]
    fn match_form_is_reachable_from_storage_form(raw in "\\PC{0,60}") {
        // Whatever goes into the allow-list (storage form) must be
        // matchable against a dump title via the match form.
        let via_storage = normalize_storage(&raw).replace('_', " ").to_lowercase();
        prop_assert_eq!(normalize_match(&raw), via_storage);
    }

    #[test]
    fn separator_free_chunks_reconstruct_the_source(text in "[a-z0-9]{0,800}") {
        let segmenter = RecursiveSegmenter::new().max_chars(50).overlap(10);
        let chunks = segmenter.split(&text);

        if text.is_empty() {
            prop_assert_eq!(chunks, vec![String::new()]);
            return Ok(());
        }

        for chunk in &chunks {
            prop_assert!(chunk.chars().count() <= 50);
        }

        // Remove each chunk's carried-over prefix and concatenate: nothing
        // may be dropped or duplicated.
        let mut rebuilt = chunks[0].clone();
        for chunk in &chunks[1..] {
            rebuilt.push_str(&chunk[10..]);
        }
        prop_assert_eq!(rebuilt, text);
    }

    #[test]
    fn separator_free_adjacent_chunks_share_the_overlap(text in "[a-z0-9]{51,400}") {
        let segmenter = RecursiveSegmenter::new().max_chars(50).overlap(10);
        let chunks = segmenter.split(&text);
        prop_assert!(chunks.len() >= 2);

        for pair in chunks.windows(2) {
            let prev = &pair[0];
            let next = &pair[1];
            prop_assert_eq!(&prev[prev.len() - 10..], &next[..10]);
        }
    }

    #[test]
    fn mixed_text_chunks_respect_the_bound(text in "[ -~]{0,500}") {
        let segmenter = RecursiveSegmenter::new().max_chars(60).overlap(12);
        for chunk in segmenter.split(&text) {
            prop_assert!(
                chunk.chars().count() <= 60,
                "chunk of {} chars exceeds 60: {:?}",
                chunk.chars().count(),
                chunk
            );
        }
    }
}
