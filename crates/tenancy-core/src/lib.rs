// crates/tenancy-core/src/lib.rs
// ============================================================================
// Module: Tenancy Core Library
// Description: Types, naming, policy, and isolation interfaces for Tenancy.
// Purpose: Provide the shared contract surfaces used by all Tenancy backends.
// ============================================================================

//! ## Overview
//! Tenancy Core defines the tenant model, the identifier sanitizer, the pure
//! namespace-naming helpers, the quota policy tables, and the
//! backend-agnostic interfaces implemented by the Postgres and object storage
//! crates.
//! Invariants:
//! - Namespace names are derived, never stored; [`SchemaName`] and
//!   [`BucketName`] are pure functions of stable tenant attributes.
//! - Sanitized tokens always match `[a-z0-9_-]+`; everything else is
//!   rejected at the sanitizer boundary.
//! - A connection whose session state cannot be verified clean transitions
//!   to [`ScopeState::Contaminated`] and is never reused.
//!
//! Security posture: tenant-facing identifiers are untrusted input and must
//! pass through [`sanitize`] before touching any namespace name.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod identifiers;
pub mod interfaces;
pub mod quota;
pub mod sanitize;
pub mod tenant;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditEntity;
pub use audit::AuditError;
pub use audit::AuditRecord;
pub use audit::AuditSink;
pub use audit::CallbackSink;
pub use audit::MemorySink;
pub use audit::NullSink;
pub use identifiers::BucketName;
pub use identifiers::NamespaceToken;
pub use identifiers::SCHEMA_NAME_PREFIX;
pub use identifiers::SchemaName;
pub use identifiers::TenantId;
pub use interfaces::BucketError;
pub use interfaces::BucketLifecycle;
pub use interfaces::BucketReceipt;
pub use interfaces::BucketStats;
pub use interfaces::DEFAULT_SIGNED_URL_EXPIRY_SECS;
pub use interfaces::DirectoryError;
pub use interfaces::PoolError;
pub use interfaces::RegisterTenant;
pub use interfaces::SchemaError;
pub use interfaces::SchemaLifecycle;
pub use interfaces::SchemaReceipt;
pub use interfaces::SchemaStatus;
pub use interfaces::ScopeState;
pub use interfaces::SessionConnection;
pub use interfaces::SessionError;
pub use interfaces::SessionPool;
pub use interfaces::TenantDirectory;
pub use interfaces::TenantUpdate;
pub use quota::PlanLimits;
pub use quota::SubdomainCheck;
pub use quota::is_feature_allowed;
pub use quota::validate_subdomain;
pub use sanitize::IdentifierContext;
pub use sanitize::SanitizeError;
pub use sanitize::sanitize;
pub use tenant::Tenant;
pub use tenant::TenantPlan;
pub use tenant::TenantStatus;
