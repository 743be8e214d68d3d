// crates/tenancy-broker/src/lib.rs
// ============================================================================
// Module: Tenancy Broker Library
// Description: Connection-scoped schema switching over pooled connections.
// Purpose: Provide the sole sanctioned entry point for tenant-scoped access.
// Dependencies: tenancy-core, thiserror
// ============================================================================

//! ## Overview
//! Tenancy Broker wraps every tenant-scoped database operation in the
//! borrow-scope-operate-reset protocol. The [`ConnectionBroker`] verifies
//! tenant existence, switches the borrowed connection's namespace search
//! order, runs the caller's operation against a [`TenantHandle`], and
//! unconditionally restores or destroys the connection before release.
//! Invariants:
//! - No connection returns to the pool while scoped to a tenant namespace.
//! - A failed reset contaminates the connection; contaminated connections
//!   are destroyed, never reused.
//! - The operation's own error is never masked by cleanup failures.
//!
//! Security posture: tenant identifiers are untrusted; a lookup miss is
//! treated as a potential probing attempt and audited.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod broker;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use broker::BrokerError;
pub use broker::ConnectionBroker;
pub use broker::ConnectionBrokerBuilder;
pub use broker::TenantHandle;
