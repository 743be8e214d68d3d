// crates/tenancy-storage/src/lib.rs
// ============================================================================
// Module: Tenancy Storage Library
// Description: Object storage backend for tenant asset isolation.
// Purpose: Provision and manage per-tenant S3 buckets.
// Dependencies: aws-config, aws-sdk-s3, serde, tenancy-core, tokio
// ============================================================================

//! ## Overview
//! Tenancy Storage implements the bucket lifecycle over S3-compatible object
//! stores. Each tenant owns exactly one bucket derived from its id, tagged
//! with the plan that bounds its quota, with anonymous reads confined to the
//! `public/` prefix.
//! Invariants:
//! - Bucket names are pure functions of the tenant id.
//! - Buckets are never overwritten; creation of an existing bucket fails.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod bucket;
pub mod policy;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use bucket::BucketProvisioner;
pub use bucket::BucketStoreConfig;
pub use policy::public_read_policy;
