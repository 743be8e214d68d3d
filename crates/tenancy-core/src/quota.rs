// crates/tenancy-core/src/quota.rs
// ============================================================================
// Module: Tenancy Quota Policy
// Description: Compiled plan limit tables and subdomain format rules.
// Purpose: Provide the static policy consumed by both provisioning paths.
// Dependencies: crate::tenant
// ============================================================================

//! ## Overview
//! Quota policy is a compiled table, read-only at runtime. Limits are keyed
//! by [`TenantPlan`]; feature checks consult explicit allow-lists (unlisted
//! features are denied, not permitted by default), and the subdomain format
//! check is pure so it can run before any connection is opened.
//! Invariants:
//! - Enterprise allows every feature.
//! - Quota lookups never fail; every plan has a row in the table.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::tenant::TenantPlan;

// ============================================================================
// SECTION: Plan Limits
// ============================================================================

/// One gibibyte in bytes.
const GIB: u64 = 1024 * 1024 * 1024;
/// Sentinel for effectively unlimited counted resources.
const UNLIMITED: u32 = u32::MAX;

/// Static per-plan resource limits.
///
/// # Invariants
/// - Read-only at runtime; not persisted as rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanLimits {
    /// Maximum product count.
    pub max_products: u32,
    /// Maximum object storage usage in bytes.
    pub max_storage_bytes: u64,
    /// Maximum staff user count.
    pub max_staff_users: u32,
    /// Maximum tenants one organization may own.
    pub max_tenants_per_org: u32,
    /// Features available on this plan.
    pub allowed_features: &'static [&'static str],
}

/// Limits for the free tier.
static FREE_LIMITS: PlanLimits = PlanLimits {
    max_products: 100,
    max_storage_bytes: GIB,
    max_staff_users: 2,
    max_tenants_per_org: 1,
    allowed_features: &["storefront", "basic_reports"],
};

/// Limits for the basic tier.
static BASIC_LIMITS: PlanLimits = PlanLimits {
    max_products: 1_000,
    max_storage_bytes: 10 * GIB,
    max_staff_users: 5,
    max_tenants_per_org: 3,
    allowed_features: &["storefront", "basic_reports", "custom_domain", "discounts"],
};

/// Limits for the pro tier.
static PRO_LIMITS: PlanLimits = PlanLimits {
    max_products: 10_000,
    max_storage_bytes: 100 * GIB,
    max_staff_users: 20,
    max_tenants_per_org: 10,
    allowed_features: &[
        "storefront",
        "basic_reports",
        "custom_domain",
        "discounts",
        "api_access",
        "advanced_reports",
        "exports",
        "webhooks",
    ],
};

/// Limits for the enterprise tier.
static ENTERPRISE_LIMITS: PlanLimits = PlanLimits {
    max_products: UNLIMITED,
    max_storage_bytes: 1024 * GIB,
    max_staff_users: UNLIMITED,
    max_tenants_per_org: UNLIMITED,
    // Enterprise bypasses the allow-list in is_feature_allowed.
    allowed_features: &[],
};

impl PlanLimits {
    /// Returns the compiled limits for a plan.
    #[must_use]
    pub const fn for_plan(plan: TenantPlan) -> &'static Self {
        match plan {
            TenantPlan::Free => &FREE_LIMITS,
            TenantPlan::Basic => &BASIC_LIMITS,
            TenantPlan::Pro => &PRO_LIMITS,
            TenantPlan::Enterprise => &ENTERPRISE_LIMITS,
        }
    }
}

/// Returns true when the plan grants the named feature.
///
/// Enterprise allows everything; other tiers consult their allow-list, and
/// unlisted features are denied.
#[must_use]
pub fn is_feature_allowed(plan: TenantPlan, feature: &str) -> bool {
    if plan == TenantPlan::Enterprise {
        return true;
    }
    PlanLimits::for_plan(plan).allowed_features.contains(&feature)
}

// ============================================================================
// SECTION: Subdomain Rules
// ============================================================================

/// Minimum subdomain length accepted at signup.
const MIN_SUBDOMAIN_LEN: usize = 3;
/// Maximum subdomain length accepted at signup.
const MAX_SUBDOMAIN_LEN: usize = 30;

/// Subdomains withheld from tenants.
pub const RESERVED_SUBDOMAINS: &[&str] = &[
    "admin", "api", "app", "assets", "billing", "blog", "cdn", "dev", "docs", "ftp", "internal",
    "mail", "shop", "staging", "status", "store", "support", "system", "test", "www",
];

/// Outcome of a subdomain format/reservation check.
///
/// # Invariants
/// - `reason` is present exactly when `available` is false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubdomainCheck {
    /// True when the candidate passes format and reservation rules.
    pub available: bool,
    /// Rejection reason for unavailable candidates.
    pub reason: Option<String>,
}

impl SubdomainCheck {
    /// Builds a passing check.
    const fn ok() -> Self {
        Self {
            available: true,
            reason: None,
        }
    }

    /// Builds a failing check with a reason.
    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            reason: Some(reason.into()),
        }
    }
}

/// Validates a subdomain candidate against format and reservation rules.
///
/// This check is pure; registry-backed prior-use lookups are composed on top
/// by the provisioner.
#[must_use]
pub fn validate_subdomain(candidate: &str) -> SubdomainCheck {
    let length = candidate.chars().count();
    if length < MIN_SUBDOMAIN_LEN {
        return SubdomainCheck::rejected(format!(
            "subdomain too short: minimum {MIN_SUBDOMAIN_LEN} characters"
        ));
    }
    if length > MAX_SUBDOMAIN_LEN {
        return SubdomainCheck::rejected(format!(
            "subdomain exceeds {MAX_SUBDOMAIN_LEN} character limit"
        ));
    }
    let lowered = candidate.to_lowercase();
    if !lowered.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-') {
        return SubdomainCheck::rejected(
            "subdomain may contain only lowercase letters, digits, and hyphens",
        );
    }
    if lowered.starts_with('-') || lowered.ends_with('-') {
        return SubdomainCheck::rejected("subdomain may not start or end with a hyphen");
    }
    if RESERVED_SUBDOMAINS.contains(&lowered.as_str()) {
        return SubdomainCheck::rejected(format!("subdomain '{lowered}' is reserved"));
    }
    SubdomainCheck::ok()
}
