// crates/tenancy-postgres/src/ident.rs
// ============================================================================
// Module: Session Command Rendering
// Description: Quoting and rendering of namespace session commands.
// Purpose: Centralize the one sanctioned identifier interpolation point.
// Dependencies: tenancy-core
// ============================================================================

//! ## Overview
//! Namespace identifiers cannot be bound as statement parameters, so the
//! session commands that reference them are rendered as text. All such
//! rendering lives here, behind [`SchemaName`], whose construction already
//! guarantees the `tenant_` prefix and the `[a-z0-9_-]` token alphabet.
//! Invariants:
//! - Every rendered identifier passes through [`quote_ident`].
//! - No other module in this crate formats an identifier into SQL text.

// ============================================================================
// SECTION: Imports
// ============================================================================

use tenancy_core::SchemaName;

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Session command restoring the default namespace search order.
pub const RESET_SEARCH_PATH: &str = "SET search_path TO public";

/// Quotes an identifier for interpolation into a session command.
///
/// Double quotes inside the identifier are doubled, which is sufficient for
/// any byte sequence inside a quoted Postgres identifier.
#[must_use]
pub fn quote_ident(ident: &str) -> String {
    let escaped = ident.replace('"', "\"\"");
    format!("\"{escaped}\"")
}

/// Renders the session command scoping a connection to a tenant schema.
///
/// The default namespace stays last on the search order so shared extension
/// objects remain resolvable while tenant objects shadow nothing outside
/// their own schema.
#[must_use]
pub fn search_path_command(schema: &SchemaName) -> String {
    format!("SET search_path TO {}, public", quote_ident(schema.as_str()))
}

/// Renders the DDL creating a tenant schema.
#[must_use]
pub fn create_schema_command(schema: &SchemaName) -> String {
    format!("CREATE SCHEMA {}", quote_ident(schema.as_str()))
}

/// Renders the DDL dropping a tenant schema and everything it contains.
#[must_use]
pub fn drop_schema_command(schema: &SchemaName) -> String {
    format!("DROP SCHEMA {} CASCADE", quote_ident(schema.as_str()))
}
