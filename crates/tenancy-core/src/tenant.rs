// crates/tenancy-core/src/tenant.rs
// ============================================================================
// Module: Tenancy Tenant Model
// Description: Tenant record, plan tiers, and lifecycle statuses.
// Purpose: Model the single source of truth row owned by the registry.
// Dependencies: serde, time, uuid
// ============================================================================

//! ## Overview
//! The [`Tenant`] row is the single authoritative record of tenant existence
//! and plan/status. It is created once at provisioning time; only status and
//! plan mutate afterwards, by administrative action.
//! Invariants:
//! - Subdomains are stored lowercase; comparisons are case-normalized.
//! - Plan and status serialize with stable lowercase labels.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::identifiers::TenantId;

// ============================================================================
// SECTION: Plan Tiers
// ============================================================================

/// Subscription plan tier for a tenant.
///
/// # Invariants
/// - Labels are stable wire and persistence forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantPlan {
    /// Free tier.
    Free,
    /// Basic paid tier.
    Basic,
    /// Professional tier.
    Pro,
    /// Enterprise tier.
    Enterprise,
}

impl TenantPlan {
    /// Returns the stable lowercase label for this plan.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Basic => "basic",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }

    /// Parses a plan from its stable label.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "free" => Some(Self::Free),
            "basic" => Some(Self::Basic),
            "pro" => Some(Self::Pro),
            "enterprise" => Some(Self::Enterprise),
            _ => None,
        }
    }
}

impl fmt::Display for TenantPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// SECTION: Lifecycle Statuses
// ============================================================================

/// Lifecycle status for a tenant.
///
/// # Invariants
/// - Labels are stable wire and persistence forms.
/// - Only administrative actions change status; tenant-scoped code never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    /// Tenant is live and serving requests.
    Active,
    /// Tenant is administratively suspended.
    Suspended,
    /// Tenant is provisioning and not yet activated.
    Pending,
    /// Tenant is under maintenance.
    Maintenance,
}

impl TenantStatus {
    /// Returns the stable lowercase label for this status.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Pending => "pending",
            Self::Maintenance => "maintenance",
        }
    }

    /// Parses a status from its stable label.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "active" => Some(Self::Active),
            "suspended" => Some(Self::Suspended),
            "pending" => Some(Self::Pending),
            "maintenance" => Some(Self::Maintenance),
            _ => None,
        }
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// SECTION: Tenant Record
// ============================================================================

/// One customer occupying an isolated namespace within shared infrastructure.
///
/// # Invariants
/// - `subdomain` is unique across tenants, compared case-insensitively.
/// - `created_at` never changes; every mutation stamps `updated_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    /// Tenant identifier.
    pub id: TenantId,
    /// Unique lowercase subdomain (3 to 63 characters).
    pub subdomain: String,
    /// Human-readable tenant name.
    pub name: String,
    /// Subscription plan tier.
    pub plan: TenantPlan,
    /// Lifecycle status.
    pub status: TenantStatus,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last mutation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}
