// crates/tenancy-core/tests/proptest_sanitize.rs
// ============================================================================
// Module: Sanitizer Property-Based Tests
// Description: Property tests for sanitizer totality and output discipline.
// Purpose: Detect panics and charset escapes across wide input ranges.
// ============================================================================

//! Property-based tests for sanitizer invariants.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use proptest::prelude::*;
use tenancy_core::IdentifierContext;
use tenancy_core::sanitize;

/// True when every character is in the sanitized namespace alphabet.
fn is_clean_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
}

proptest! {
    /// For all printable-ASCII inputs the sanitizer either returns a token
    /// matching `[a-z0-9_-]+` or rejects; it never emits anything else.
    #[test]
    fn sanitize_is_total_over_printable_ascii(raw in "[ -~]{0,80}") {
        for context in [IdentifierContext::Schema, IdentifierContext::Subdomain] {
            if let Ok(token) = sanitize(&raw, context) {
                prop_assert!(is_clean_token(token.as_str()), "dirty token: {:?}", token.as_str());
            }
        }
    }

    /// Arbitrary unicode input never panics the sanitizer.
    #[test]
    fn sanitize_never_panics_on_unicode(raw in "\\PC{0,80}") {
        let _ = sanitize(&raw, IdentifierContext::Schema);
        let _ = sanitize(&raw, IdentifierContext::Subdomain);
    }

    /// Valid inputs sanitize to themselves lowercased, modulo the
    /// leading-digit prefix rule.
    #[test]
    fn sanitize_preserves_valid_input(raw in "[a-z][a-z0-9_-]{2,40}") {
        let token = sanitize(&raw, IdentifierContext::Schema);
        prop_assert_eq!(token.map(|t| t.as_str().to_string()), Ok(raw));
    }
}
