// crates/tenancy-core/src/sanitize.rs
// ============================================================================
// Module: Tenancy Identifier Sanitizer
// Description: Validation and normalization of tenant-facing identifiers.
// Purpose: Produce safe namespace tokens from untrusted subdomains.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! The sanitizer turns a tenant-facing subdomain into a [`NamespaceToken`]
//! that cannot alter a generated schema or bucket name beyond its intended
//! slot. Rules apply in order: length window, lowercasing, charset check,
//! leading-digit underscore prefix.
//! Invariants:
//! - Pure and total; never touches a database or network.
//! - Invalid bytes are rejected, never stripped.
//! - Output always matches `[a-z0-9_-]+`.
//!
//! Security posture: this is the only normalization applied to identifiers
//! before they reach the session-command renderer; treat every input as
//! hostile.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::identifiers::NamespaceToken;

// ============================================================================
// SECTION: Context and Errors
// ============================================================================

/// Minimum identifier length accepted in any context.
const MIN_IDENTIFIER_LEN: usize = 3;
/// Maximum identifier length in the schema-name context.
const MAX_SCHEMA_IDENTIFIER_LEN: usize = 50;
/// Maximum identifier length in the DNS-subdomain context.
const MAX_SUBDOMAIN_IDENTIFIER_LEN: usize = 63;

/// Length window context for sanitization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierContext {
    /// Token feeds a database schema name (3 to 50 characters).
    Schema,
    /// Token feeds a DNS subdomain (3 to 63 characters).
    Subdomain,
}

impl IdentifierContext {
    /// Returns the maximum raw length accepted in this context.
    const fn max_len(self) -> usize {
        match self {
            Self::Schema => MAX_SCHEMA_IDENTIFIER_LEN,
            Self::Subdomain => MAX_SUBDOMAIN_IDENTIFIER_LEN,
        }
    }
}

/// Sanitizer rejection reasons.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanitizeError {
    /// Identifier is shorter than the minimum length.
    #[error("identifier too short: minimum {min} characters")]
    TooShort {
        /// Minimum accepted length.
        min: usize,
    },
    /// Identifier exceeds the context's length limit.
    #[error("identifier exceeds {max} character limit")]
    TooLong {
        /// Maximum accepted length.
        max: usize,
    },
    /// Identifier contains a byte outside `[a-z0-9_-]` after lowercasing.
    #[error("identifier contains invalid character {found:?}")]
    InvalidCharacter {
        /// Offending character after lowercasing.
        found: char,
    },
}

// ============================================================================
// SECTION: Sanitizer
// ============================================================================

/// Validates and normalizes a tenant-facing identifier into a namespace
/// token.
///
/// # Errors
///
/// Returns [`SanitizeError`] when the identifier falls outside the context's
/// length window or contains a byte outside `[a-z0-9_-]` after lowercasing.
pub fn sanitize(raw: &str, context: IdentifierContext) -> Result<NamespaceToken, SanitizeError> {
    let length = raw.chars().count();
    if length < MIN_IDENTIFIER_LEN {
        return Err(SanitizeError::TooShort {
            min: MIN_IDENTIFIER_LEN,
        });
    }
    let max = context.max_len();
    if length > max {
        return Err(SanitizeError::TooLong {
            max,
        });
    }
    let lowered = raw.to_lowercase();
    for ch in lowered.chars() {
        if !is_namespace_char(ch) {
            return Err(SanitizeError::InvalidCharacter {
                found: ch,
            });
        }
    }
    // A leading digit would make the derived identifier illegal unquoted.
    let token = if lowered.as_bytes().first().is_some_and(u8::is_ascii_digit) {
        format!("_{lowered}")
    } else {
        lowered
    };
    Ok(NamespaceToken::from_validated(token))
}

/// Returns true for characters allowed in namespace tokens.
const fn is_namespace_char(ch: char) -> bool {
    ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-'
}
