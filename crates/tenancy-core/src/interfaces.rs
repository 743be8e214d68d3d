// crates/tenancy-core/src/interfaces.rs
// ============================================================================
// Module: Tenancy Interfaces
// Description: Backend-agnostic interfaces for sessions, registry, and stores.
// Purpose: Define the contract surfaces implemented by Tenancy backends.
// Dependencies: crate::identifiers, crate::tenant, serde, thiserror, time
// ============================================================================

//! ## Overview
//! Interfaces define how Tenancy integrates with the database cluster and the
//! object storage service without embedding backend-specific details.
//! Implementations must fail closed: a connection whose session state cannot
//! be verified clean is contaminated and never reused.
//! Invariants:
//! - [`ScopeState::Contaminated`] is terminal; no transition leads back to
//!   [`ScopeState::Idle`].
//! - Registry implementations operate only on the default namespace.
//!
//! Security posture: interface implementations consume untrusted tenant
//! identifiers; every namespace name originates from the sanitizer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

use crate::identifiers::BucketName;
use crate::identifiers::SchemaName;
use crate::identifiers::TenantId;
use crate::tenant::Tenant;
use crate::tenant::TenantPlan;
use crate::tenant::TenantStatus;

// ============================================================================
// SECTION: Session Scope
// ============================================================================

/// Session scope of one pooled connection.
///
/// # Invariants
/// - Transitions are `Idle -> Scoped -> {Idle, Contaminated}`.
/// - `Contaminated` is terminal; the connection must be destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    /// Default namespace; eligible for pool reuse.
    Idle,
    /// Tenant namespace; held exclusively by one unit of work.
    Scoped,
    /// Session state could not be verified clean; destroy, never reuse.
    Contaminated,
}

/// Session command errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session-state command failed.
    #[error("session command failed: {0}")]
    Command(String),
}

/// One physical connection with mutable, per-session namespace state.
pub trait SessionConnection {
    /// Points the connection's namespace search order at the tenant schema.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the session command fails.
    fn enter_namespace(&mut self, schema: &SchemaName) -> Result<(), SessionError>;

    /// Restores the connection's namespace search order to the default.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the session command fails; callers must
    /// then mark the connection contaminated.
    fn reset_namespace(&mut self) -> Result<(), SessionError>;

    /// Marks the connection permanently contaminated.
    fn mark_contaminated(&mut self);

    /// Returns the connection's current scope state.
    fn scope_state(&self) -> ScopeState;
}

/// Pool checkout errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Connection checkout failed.
    #[error("connection checkout failed: {0}")]
    Checkout(String),
}

/// Fixed-size pool of reusable session connections.
///
/// The pool is an explicit, injected dependency so tests can substitute a
/// single-slot pool and deterministically reproduce leak scenarios.
pub trait SessionPool {
    /// Connection type vended by this pool.
    type Connection: SessionConnection;
    /// Checkout guard; returning it releases the connection. Connections in
    /// [`ScopeState::Contaminated`] must be destroyed on release, not pooled.
    type Guard: std::ops::DerefMut<Target = Self::Connection>;

    /// Borrows one connection from the pool.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError`] when no connection can be provided.
    fn checkout(&self) -> Result<Self::Guard, PoolError>;
}

// ============================================================================
// SECTION: Tenant Directory
// ============================================================================

/// Tenant directory errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Directory I/O error.
    #[error("tenant directory io error: {0}")]
    Io(String),
    /// Directory data is invalid.
    #[error("tenant directory invalid data: {0}")]
    Invalid(String),
    /// Subdomain already registered.
    #[error("tenant directory conflict: {0}")]
    Conflict(String),
    /// Tenant does not exist.
    #[error("tenant not found: {0}")]
    NotFound(String),
    /// Deletion refused because the tenant is still active.
    #[error("tenant still active: {0}")]
    ActiveTenant(String),
}

/// New tenant registration payload.
///
/// # Invariants
/// - `subdomain` is normalized to lowercase before persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterTenant {
    /// Requested subdomain.
    pub subdomain: String,
    /// Human-readable tenant name.
    pub name: String,
    /// Subscription plan tier.
    pub plan: TenantPlan,
    /// Initial status; defaults to [`TenantStatus::Pending`].
    #[serde(default)]
    pub status: Option<TenantStatus>,
}

/// Partial tenant field update.
///
/// # Invariants
/// - At least one field must be set; empty updates are invalid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantUpdate {
    /// Replacement name, when set.
    #[serde(default)]
    pub name: Option<String>,
    /// Replacement plan, when set.
    #[serde(default)]
    pub plan: Option<TenantPlan>,
    /// Replacement status, when set.
    #[serde(default)]
    pub status: Option<TenantStatus>,
}

impl TenantUpdate {
    /// Returns true when no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.plan.is_none() && self.status.is_none()
    }
}

/// Single authoritative lookup of tenant existence and status.
///
/// All reads and writes happen through the pool's default namespace; they
/// must never run on a connection scoped to a tenant schema.
pub trait TenantDirectory: Send + Sync {
    /// Returns true when `identifier` matches a tenant id or subdomain,
    /// regardless of status.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the lookup fails.
    fn exists(&self, identifier: &str) -> Result<bool, DirectoryError>;

    /// Loads a tenant by subdomain (case-normalized).
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the lookup fails.
    fn get_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, DirectoryError>;

    /// Inserts a new tenant row.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Conflict`] when the subdomain is taken.
    fn register(&self, request: RegisterTenant) -> Result<Tenant, DirectoryError>;

    /// Updates a tenant's status, stamping `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the tenant is missing or the write
    /// fails.
    fn update_status(&self, id: TenantId, status: TenantStatus) -> Result<Tenant, DirectoryError>;

    /// Updates a tenant's plan, stamping `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the tenant is missing or the write
    /// fails.
    fn update_plan(&self, id: TenantId, plan: TenantPlan) -> Result<Tenant, DirectoryError>;

    /// Applies a partial field update, stamping `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the update is empty, the tenant is
    /// missing, or the write fails.
    fn update_tenant(&self, id: TenantId, update: TenantUpdate) -> Result<Tenant, DirectoryError>;

    /// Deletes a tenant row. Refuses tenants whose status is
    /// [`TenantStatus::Active`]; suspend first.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::ActiveTenant`] for active tenants and
    /// [`DirectoryError`] for other failures.
    fn delete(&self, id: TenantId) -> Result<(), DirectoryError>;

    /// Reports directory readiness for liveness/readiness probes.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the directory is unavailable.
    fn readiness(&self) -> Result<(), DirectoryError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Schema Lifecycle
// ============================================================================

/// Schema lifecycle errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Database I/O error.
    #[error("schema lifecycle io error: {0}")]
    Io(String),
    /// Invalid subdomain or schema name.
    #[error("schema lifecycle invalid identifier: {0}")]
    Invalid(String),
    /// Schema already exists; re-creation is rejected, never overwritten.
    #[error("schema already exists: {0}")]
    AlreadyExists(String),
    /// Drop refused because the schema still contains tables.
    #[error("schema not empty: {0}")]
    NotEmpty(String),
}

/// Receipt for a created schema.
///
/// # Invariants
/// - `schema_name` is derived, never caller-supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaReceipt {
    /// Derived schema name.
    pub schema_name: SchemaName,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Wall-clock duration of the create call in milliseconds.
    pub duration_ms: u64,
}

/// Existence and shape report for a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaStatus {
    /// True when the schema exists in the catalog.
    pub exists: bool,
    /// Number of tables the schema contains.
    pub table_count: u64,
}

/// Creates, verifies, lists, and drops per-tenant database schemas.
pub trait SchemaLifecycle: Send + Sync {
    /// Creates the schema for a subdomain.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::AlreadyExists`] when present and
    /// [`SchemaError`] for other failures.
    fn create(&self, subdomain: &str) -> Result<SchemaReceipt, SchemaError>;

    /// Reports schema existence and table count. Absence is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when the catalog lookup fails.
    fn verify(&self, subdomain: &str) -> Result<SchemaStatus, SchemaError>;

    /// Drops the schema. Returns `false` when the schema does not exist, so
    /// drop is idempotent from the caller's point of view.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::NotEmpty`] when `require_empty` is set and the
    /// schema contains tables, and [`SchemaError`] for other failures.
    fn drop_schema(&self, subdomain: &str, require_empty: bool) -> Result<bool, SchemaError>;

    /// Lists tenant schema names in sorted order.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when the catalog lookup fails.
    fn list(&self) -> Result<Vec<SchemaName>, SchemaError>;
}

// ============================================================================
// SECTION: Bucket Lifecycle
// ============================================================================

/// Default expiry for signed URLs, in seconds.
pub const DEFAULT_SIGNED_URL_EXPIRY_SECS: u64 = 3600;

/// Bucket lifecycle errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum BucketError {
    /// Object storage I/O error.
    #[error("bucket lifecycle io error: {0}")]
    Io(String),
    /// Invalid key or configuration.
    #[error("bucket lifecycle invalid input: {0}")]
    Invalid(String),
    /// Bucket already exists; re-creation is rejected, never overwritten.
    #[error("bucket already exists: {0}")]
    AlreadyExists(String),
    /// Delete refused because the bucket still contains objects.
    #[error("bucket not empty: {0}")]
    NotEmpty(String),
}

/// Receipt for a created bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketReceipt {
    /// Derived bucket name.
    pub bucket_name: BucketName,
    /// Storage quota resolved from the plan, in bytes.
    pub quota_bytes: u64,
    /// Endpoint the bucket was created against, when configured.
    pub endpoint: Option<String>,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Wall-clock duration of the create call in milliseconds.
    pub duration_ms: u64,
}

/// Usage report for a tenant bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketStats {
    /// Total bytes stored.
    pub used_bytes: u64,
    /// Total object count.
    pub total_objects: u64,
    /// Plan quota in bytes.
    pub quota_bytes: u64,
    /// Usage as a percentage of quota.
    pub usage_percent: f64,
    /// Most recent object modification, when any objects exist.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_modified: Option<OffsetDateTime>,
}

/// Creates, quotas, inspects, and deletes per-tenant storage buckets.
pub trait BucketLifecycle: Send + Sync {
    /// Creates the bucket for a tenant with versioning, public-prefix
    /// policy, plan tag, and seeded folder markers.
    ///
    /// # Errors
    ///
    /// Returns [`BucketError::AlreadyExists`] when present and
    /// [`BucketError`] for other failures.
    fn create(&self, tenant_id: TenantId, plan: TenantPlan) -> Result<BucketReceipt, BucketError>;

    /// Deletes the bucket. Returns `false` when the bucket does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`BucketError::NotEmpty`] for non-empty buckets without
    /// `force`, and [`BucketError`] for other failures.
    fn delete(&self, tenant_id: TenantId, force: bool) -> Result<bool, BucketError>;

    /// Reports bucket usage against the plan quota.
    ///
    /// # Errors
    ///
    /// Returns [`BucketError`] when listing fails.
    fn stats(&self, tenant_id: TenantId) -> Result<BucketStats, BucketError>;

    /// Issues a time-boxed, single-object upload URL.
    ///
    /// # Errors
    ///
    /// Returns [`BucketError`] when presigning fails.
    fn signed_upload_url(
        &self,
        tenant_id: TenantId,
        key: &str,
        expiry_secs: u64,
    ) -> Result<String, BucketError>;

    /// Issues a time-boxed, single-object download URL.
    ///
    /// # Errors
    ///
    /// Returns [`BucketError`] when presigning fails.
    fn signed_download_url(
        &self,
        tenant_id: TenantId,
        key: &str,
        expiry_secs: u64,
    ) -> Result<String, BucketError>;

    /// Issues an upload URL with the [`DEFAULT_SIGNED_URL_EXPIRY_SECS`]
    /// expiry.
    ///
    /// # Errors
    ///
    /// Returns [`BucketError`] when presigning fails.
    fn default_upload_url(&self, tenant_id: TenantId, key: &str) -> Result<String, BucketError> {
        self.signed_upload_url(tenant_id, key, DEFAULT_SIGNED_URL_EXPIRY_SECS)
    }

    /// Issues a download URL with the [`DEFAULT_SIGNED_URL_EXPIRY_SECS`]
    /// expiry.
    ///
    /// # Errors
    ///
    /// Returns [`BucketError`] when presigning fails.
    fn default_download_url(&self, tenant_id: TenantId, key: &str) -> Result<String, BucketError> {
        self.signed_download_url(tenant_id, key, DEFAULT_SIGNED_URL_EXPIRY_SECS)
    }

    /// Deletes one object, best-effort. Returns `false` instead of erroring
    /// on failure, since object deletion is typically a non-fatal cleanup
    /// step.
    fn delete_object(&self, tenant_id: TenantId, key: &str) -> bool;
}
