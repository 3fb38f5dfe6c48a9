//! Property-based tests for path manipulation functions.
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold for all possible inputs.

#[cfg(test)]
mod proptest_tests {
    use crate::format::{has_placeholders, interpolate};
    use crate::path::{glob_match, has_glob_meta, normalize, standardize, static_prefix_len};
    use crate::process::escape_braces;
    use proptest::prelude::*;
    use std::path::Path;

    // ============================================================================
    // normalize / standardize property tests
    // ============================================================================

    proptest! {
        /// Property: normalize is idempotent
        #[test]
        fn normalize_is_idempotent(path in "(/)?([a-z]{1,4}|\\.|\\.\\.)(/([a-z]{1,4}|\\.|\\.\\.)){0,6}") {
            let once = normalize(Path::new(&path));
            let twice = normalize(&once);
            prop_assert_eq!(once, twice);
        }

        /// Property: normalized paths never contain `.` components
        #[test]
        fn normalize_drops_current_dir(path in "([a-z]{1,4}|\\.)(/([a-z]{1,4}|\\.)){0,6}") {
            let normalized = normalize(Path::new(&path));
            prop_assert!(normalized.components().all(|c| c.as_os_str() != "."));
        }

        /// Property: standardize never produces backslashes
        #[test]
        fn standardize_has_no_backslashes(path in "[a-z/\\\\]{1,30}") {
            prop_assert!(!standardize(Path::new(&path)).contains('\\'));
        }
    }

    // ============================================================================
    // glob property tests
    // ============================================================================

    proptest! {
        /// Property: a literal pattern matches itself
        #[test]
        fn glob_exact_match_works(path in "[a-zA-Z0-9_]{1,20}") {
            let result = glob_match(&path, &path, true);
            prop_assert!(result.is_ok());
            prop_assert!(result.unwrap(), "Exact pattern '{}' should match itself", path);
        }

        /// Property: case-insensitive matching ignores ASCII case
        #[test]
        fn glob_ignore_case_matches_uppercase(path in "[a-z0-9_]{1,20}") {
            let result = glob_match(&path, &path.to_uppercase(), false);
            prop_assert!(result.unwrap());
        }

        /// Property: the static prefix never exceeds the component count and
        /// holds no metacharacter
        #[test]
        fn static_prefix_is_literal(
            head in proptest::collection::vec("[a-z]{1,5}", 0..4),
            tail in proptest::collection::vec("[a-z*?]{1,5}", 1..4),
        ) {
            let pattern = head.iter().chain(tail.iter()).cloned().collect::<Vec<_>>().join("/");
            let len = static_prefix_len(&pattern);
            let components: Vec<&str> = pattern.split('/').collect();
            prop_assert!(len <= components.len());
            prop_assert!(components[..len].iter().all(|c| !has_glob_meta(c)));
        }
    }

    // ============================================================================
    // placeholder escaping property tests
    // ============================================================================

    proptest! {
        /// Property: escaped text survives interpolation verbatim
        #[test]
        fn escaped_text_is_not_interpolated(text in ".*") {
            let escaped = escape_braces(&text);
            prop_assert!(!has_placeholders(&escaped));
            let rendered = interpolate(&escaped, |_| None);
            prop_assert_eq!(rendered.unwrap(), text);
        }
    }
}
