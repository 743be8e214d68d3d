// crates/tenancy-core/src/identifiers.rs
// ============================================================================
// Module: Tenancy Identifiers
// Description: Strongly typed tenant, schema, and bucket identifiers.
// Purpose: Derive namespace names deterministically from tenant attributes.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! Identifiers are opaque and serialize as strings on the wire. Namespace
//! names ([`SchemaName`], [`BucketName`]) are pure functions of stable tenant
//! attributes and are never persisted independently, so the name used to
//! create a resource always matches the name used to address it later.
//! Invariants:
//! - [`NamespaceToken`] is only produced by [`crate::sanitize::sanitize`].
//! - [`SchemaName`] is always `tenant_` followed by a sanitized token.
//! - [`BucketName`] is always `tenant-<32-hex-digit-id>-assets`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

// ============================================================================
// SECTION: Naming Constants
// ============================================================================

/// Prefix shared by all tenant schema names.
pub const SCHEMA_NAME_PREFIX: &str = "tenant_";
/// Prefix shared by all tenant bucket names.
pub const BUCKET_NAME_PREFIX: &str = "tenant-";
/// Suffix shared by all tenant bucket names.
pub const BUCKET_NAME_SUFFIX: &str = "-assets";

// ============================================================================
// SECTION: Tenant Identifier
// ============================================================================

/// Tenant identifier backing the registry primary key.
///
/// # Invariants
/// - Wraps a UUID; the hyphen-free hex form feeds bucket naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(Uuid);

impl TenantId {
    /// Creates a tenant identifier from an existing UUID.
    #[must_use]
    pub const fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generates a fresh random tenant identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a tenant identifier from its string form.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw).ok().map(Self)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns the hyphen-free lowercase hex form used in bucket names.
    #[must_use]
    pub fn simple_hex(&self) -> String {
        self.0.simple().to_string()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Namespace Token
// ============================================================================

/// Sanitized namespace token produced by the identifier sanitizer.
///
/// # Invariants
/// - Always matches `[a-z0-9_-]+`; constructed only by
///   [`crate::sanitize::sanitize`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceToken(String);

impl NamespaceToken {
    /// Wraps a validated token. Callers outside the sanitizer must not use
    /// this; tokens bypass no further validation downstream.
    pub(crate) fn from_validated(token: String) -> Self {
        Self(token)
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NamespaceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SECTION: Schema Name
// ============================================================================

/// Derived per-tenant database schema name.
///
/// # Invariants
/// - Always `tenant_` + sanitized token; legal as an unquoted identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaName(String);

impl SchemaName {
    /// Derives the schema name for a sanitized namespace token.
    #[must_use]
    pub fn for_token(token: &NamespaceToken) -> Self {
        Self(format!("{SCHEMA_NAME_PREFIX}{token}"))
    }

    /// Accepts a catalog-reported schema name when it follows the tenant
    /// naming convention. Returns `None` for unrelated schemas.
    #[must_use]
    pub fn from_catalog_name(name: &str) -> Option<Self> {
        let token = name.strip_prefix(SCHEMA_NAME_PREFIX)?;
        let token_is_clean = token
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
        if token.is_empty() || !token_is_clean {
            return None;
        }
        Some(Self(name.to_string()))
    }

    /// Returns the schema name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SECTION: Bucket Name
// ============================================================================

/// Derived per-tenant object storage bucket name.
///
/// # Invariants
/// - Always `tenant-<hex-id>-assets`; valid as a DNS bucket label set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketName(String);

impl BucketName {
    /// Derives the bucket name for a tenant identifier.
    #[must_use]
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self(format!("{BUCKET_NAME_PREFIX}{}{BUCKET_NAME_SUFFIX}", tenant_id.simple_hex()))
    }

    /// Returns the bucket name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::BucketName;
    use super::NamespaceToken;
    use super::SchemaName;
    use super::TenantId;

    #[test]
    fn schema_name_prefixes_token() {
        let token = NamespaceToken::from_validated("alpha-test".to_string());
        let schema = SchemaName::for_token(&token);
        assert_eq!(schema.as_str(), "tenant_alpha-test");
    }

    #[test]
    fn bucket_name_uses_hyphen_free_id() {
        let id = TenantId::new(Uuid::from_u128(0x1234_5678_9abc_def0_1234_5678_9abc_def0));
        let bucket = BucketName::for_tenant(id);
        assert_eq!(bucket.as_str(), "tenant-123456789abcdef0123456789abcdef0-assets");
        assert!(!bucket.as_str().contains("--"));
    }

    #[test]
    fn catalog_name_accepts_convention() {
        let schema = SchemaName::from_catalog_name("tenant_alpha-test");
        assert_eq!(schema.map(|s| s.as_str().to_string()), Some("tenant_alpha-test".to_string()));
    }

    #[test]
    fn catalog_name_rejects_foreign_schemas() {
        assert!(SchemaName::from_catalog_name("public").is_none());
        assert!(SchemaName::from_catalog_name("tenant_").is_none());
        assert!(SchemaName::from_catalog_name("tenant_UPPER").is_none());
        assert!(SchemaName::from_catalog_name("tenant_a;drop").is_none());
    }

    #[test]
    fn tenant_id_parse_roundtrip() {
        let id = TenantId::generate();
        let parsed = TenantId::parse(&id.to_string());
        assert_eq!(parsed, Some(id));
        assert!(TenantId::parse("not-a-uuid").is_none());
    }
}
