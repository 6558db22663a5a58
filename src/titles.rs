//! Canonicalization of page titles into stable identifiers.
//!
//! Two output modes share a single canonicalization core so they cannot
//! drift apart:
//!
//! * **storage form** — surrounding whitespace trimmed, interior whitespace
//!   and `/` replaced with `_`, case preserved. Used for chunk ids, URLs,
//!   and the persisted allow-list.
//! * **match form** — the storage form with `_` turned back into spaces and
//!   the whole string lower-cased. Used for set membership against dump
//!   titles of arbitrary case.
//!
//! Both functions are total: empty or whitespace-only input yields the empty
//! string, and callers drop empty identifiers instead of inserting them.

/// Storage-form identifier: trimmed, whitespace and slashes replaced with
/// underscores, case preserved.
pub fn normalize_storage(raw: &str) -> String {
    canonical(raw)
}

/// Match-form identifier: storage form with underscores as spaces,
/// lower-cased.
pub fn normalize_match(raw: &str) -> String {
    canonical(raw)
        .chars()
        .map(|c| if c == '_' { ' ' } else { c })
        .collect::<String>()
        .to_lowercase()
}

fn canonical(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| {
            if c.is_whitespace() || c == '/' {
                '_'
            } else {
                c
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_form_replaces_whitespace_and_slashes() {
        assert_eq!(normalize_storage("Alan Turing"), "Alan_Turing");
        assert_eq!(normalize_storage("AC/DC"), "AC_DC");
        assert_eq!(normalize_storage("  padded \t title "), "padded___title");
    }

    #[test]
    fn match_form_lowercases_and_restores_spaces() {
        assert_eq!(normalize_match("Alan Turing"), "alan turing");
        assert_eq!(normalize_match("Alan_Turing"), "alan turing");
        assert_eq!(normalize_match("AC/DC"), "ac dc");
    }

    #[test]
    fn both_forms_are_total_on_degenerate_input() {
        assert_eq!(normalize_storage(""), "");
        assert_eq!(normalize_storage("   "), "");
        assert_eq!(normalize_match(""), "");
        assert_eq!(normalize_match(" \t "), "");
    }

    #[test]
    fn both_forms_are_idempotent() {
        for raw in ["Alan Turing", "AC/DC", "  x  y ", "a__b", "Łódź Ghetto"] {
            let storage = normalize_storage(raw);
            assert_eq!(normalize_storage(&storage), storage);
            let matched = normalize_match(raw);
            assert_eq!(normalize_match(&matched), matched);
        }
    }

    #[test]
    fn match_form_agrees_with_lowered_storage_form() {
        for raw in ["Alan Turing", "AC/DC", " History of  Japan ", "Łódź"] {
            let via_storage = normalize_storage(raw).replace('_', " ").to_lowercase();
            assert_eq!(normalize_match(raw), via_storage);
        }
    }
}
