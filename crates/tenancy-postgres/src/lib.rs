// crates/tenancy-postgres/src/lib.rs
// ============================================================================
// Module: Tenancy Postgres Library
// Description: Postgres backends for the tenant isolation subsystem.
// Purpose: Implement the registry, schema lifecycle, and session pool.
// Dependencies: postgres, r2d2, r2d2_postgres, serde, tenancy-core, time
// ============================================================================

//! ## Overview
//! Postgres backends for Tenancy. The control-plane pool serves the registry
//! and schema manager in the default namespace; the session pool serves
//! tenant-scoped work through the broker, destroying any connection whose
//! session state could not be verified clean.
//! Invariants:
//! - Identifier interpolation happens only in the [`ident`] module.
//! - Contaminated connections are reported broken to the pool and destroyed.
//!
//! Security posture: subdomains and tenant identifiers are untrusted input;
//! everything that reaches SQL text first passes the sanitizer and the
//! quoting module.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod ident;
pub mod pool;
pub mod registry;
pub mod schema;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use ident::RESET_SEARCH_PATH;
pub use ident::quote_ident;
pub use ident::search_path_command;
pub use pool::ControlPool;
pub use pool::PgSessionConnection;
pub use pool::PgSessionPool;
pub use pool::PostgresPoolConfig;
pub use pool::PostgresPoolError;
pub use pool::SessionConnectionManager;
pub use pool::control_pool;
pub use registry::PostgresTenantRegistry;
pub use schema::PostgresSchemaManager;
