// crates/tenancy-provision/src/lib.rs
// ============================================================================
// Module: Tenancy Provision Library
// Description: Composition of the full tenant signup flow.
// Purpose: Provision registry row, schema, and bucket as one operation.
// Dependencies: tenancy-core, serde, thiserror, time
// ============================================================================

//! ## Overview
//! Tenancy Provision wires the tenant directory, schema lifecycle, and
//! bucket lifecycle into a single [`TenantProvisioner::provision`] call with
//! per-step failure attribution and a complete audit trail.
//! Invariants:
//! - No resource is created before policy checks pass.
//! - Activation is the final step; a tenant is never active with missing
//!   resources.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod provisioner;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use provisioner::ProvisionError;
pub use provisioner::ProvisionReceipt;
pub use provisioner::ProvisionRequest;
pub use provisioner::ProvisionStep;
pub use provisioner::TenantProvisioner;
pub use provisioner::TenantProvisionerBuilder;
