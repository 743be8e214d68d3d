// crates/tenancy-provision/src/provisioner.rs
// ============================================================================
// Module: Tenant Provisioner
// Description: End-to-end tenant provisioning across registry, schema, bucket.
// Purpose: Compose the full signup flow with per-step failure attribution.
// Dependencies: serde, serde_json, tenancy-core, thiserror, time
// ============================================================================

//! ## Overview
//! Provisioning runs four steps in a fixed order: register the tenant row
//! (pending), create the schema, create the bucket, then activate. A failure
//! stops the flow and names the step it died in; the tenant row stays in
//! `pending` so the attempt can be retried or cleaned up administratively.
//! Invariants:
//! - Policy checks run before any resource is created.
//! - A tenant becomes `active` only after every resource exists.
//! - Every outcome, success or failure, is audited.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use tenancy_core::AuditEntity;
use tenancy_core::AuditRecord;
use tenancy_core::AuditSink;
use tenancy_core::BucketLifecycle;
use tenancy_core::BucketName;
use tenancy_core::DirectoryError;
use tenancy_core::NullSink;
use tenancy_core::RegisterTenant;
use tenancy_core::SchemaLifecycle;
use tenancy_core::SchemaName;
use tenancy_core::TenantDirectory;
use tenancy_core::TenantId;
use tenancy_core::TenantPlan;
use tenancy_core::TenantStatus;
use tenancy_core::validate_subdomain;
use thiserror::Error;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Requests and Receipts
// ============================================================================

/// Signup request driving one provisioning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    /// Requested subdomain.
    pub subdomain: String,
    /// Human-readable tenant name.
    pub name: String,
    /// Subscription plan tier.
    pub plan: TenantPlan,
    /// Administrative contact; recorded in the audit trail only.
    pub admin_email: String,
}

/// Receipt for a fully provisioned tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionReceipt {
    /// Identifier of the new tenant.
    pub tenant_id: TenantId,
    /// Registered subdomain, lowercased.
    pub subdomain: String,
    /// Schema created for the tenant.
    pub schema_name: SchemaName,
    /// Bucket created for the tenant.
    pub bucket_name: BucketName,
    /// Completion timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub provisioned_at: OffsetDateTime,
}

/// Steps of the provisioning flow, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStep {
    /// Tenant row registration.
    Registry,
    /// Schema creation.
    Schema,
    /// Bucket creation.
    Bucket,
    /// Status flip to active.
    Activation,
}

impl ProvisionStep {
    /// Returns the stable label for this step.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Registry => "registry",
            Self::Schema => "schema",
            Self::Bucket => "bucket",
            Self::Activation => "activation",
        }
    }
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Provisioning errors.
///
/// # Invariants
/// - [`ProvisionError::Step`] always names the step that failed.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Provisioner is missing a tenant directory.
    #[error("provisioner tenant directory is not configured")]
    MissingDirectory,
    /// Provisioner is missing a schema lifecycle backend.
    #[error("provisioner schema lifecycle is not configured")]
    MissingSchemas,
    /// Provisioner is missing a bucket lifecycle backend.
    #[error("provisioner bucket lifecycle is not configured")]
    MissingBuckets,
    /// Request rejected before any resource was created.
    #[error("provisioning rejected: {0}")]
    Policy(String),
    /// A provisioning step failed after passing policy checks.
    #[error("provisioning failed at {step} step: {message}")]
    Step {
        /// Step that failed.
        step: ProvisionStep,
        /// Failure detail.
        message: String,
    },
}

// ============================================================================
// SECTION: Provisioner
// ============================================================================

/// Builder for a tenant provisioner.
pub struct TenantProvisionerBuilder {
    /// Tenant directory collaborator.
    directory: Option<Arc<dyn TenantDirectory>>,
    /// Schema lifecycle collaborator.
    schemas: Option<Arc<dyn SchemaLifecycle>>,
    /// Bucket lifecycle collaborator.
    buckets: Option<Arc<dyn BucketLifecycle>>,
    /// Audit sink.
    audit: Option<Arc<dyn AuditSink>>,
}

impl Default for TenantProvisionerBuilder {
    fn default() -> Self {
        Self {
            directory: None,
            schemas: None,
            buckets: None,
            audit: None,
        }
    }
}

impl TenantProvisionerBuilder {
    /// Registers the tenant directory.
    #[must_use]
    pub fn directory(mut self, directory: Arc<dyn TenantDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Registers the schema lifecycle backend.
    #[must_use]
    pub fn schemas(mut self, schemas: Arc<dyn SchemaLifecycle>) -> Self {
        self.schemas = Some(schemas);
        self
    }

    /// Registers the bucket lifecycle backend.
    #[must_use]
    pub fn buckets(mut self, buckets: Arc<dyn BucketLifecycle>) -> Self {
        self.buckets = Some(buckets);
        self
    }

    /// Registers the audit sink. Defaults to [`NullSink`].
    #[must_use]
    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Builds the tenant provisioner.
    ///
    /// # Errors
    ///
    /// Returns a missing-collaborator error when a required backend is
    /// absent.
    pub fn build(self) -> Result<TenantProvisioner, ProvisionError> {
        Ok(TenantProvisioner {
            directory: self.directory.ok_or(ProvisionError::MissingDirectory)?,
            schemas: self.schemas.ok_or(ProvisionError::MissingSchemas)?,
            buckets: self.buckets.ok_or(ProvisionError::MissingBuckets)?,
            audit: self.audit.unwrap_or_else(|| Arc::new(NullSink::new())),
        })
    }
}

/// Composes registry, schema, and bucket backends into the signup flow.
pub struct TenantProvisioner {
    /// Tenant directory collaborator.
    directory: Arc<dyn TenantDirectory>,
    /// Schema lifecycle collaborator.
    schemas: Arc<dyn SchemaLifecycle>,
    /// Bucket lifecycle collaborator.
    buckets: Arc<dyn BucketLifecycle>,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
}

impl TenantProvisioner {
    /// Returns a builder for the tenant provisioner.
    #[must_use]
    pub fn builder() -> TenantProvisionerBuilder {
        TenantProvisionerBuilder::default()
    }

    /// Provisions a tenant end to end.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Policy`] when the request fails validation
    /// or the subdomain is taken, and [`ProvisionError::Step`] naming the
    /// failed step otherwise.
    pub fn provision(
        &self,
        request: &ProvisionRequest,
    ) -> Result<ProvisionReceipt, ProvisionError> {
        let check = validate_subdomain(&request.subdomain);
        if !check.available {
            let reason =
                check.reason.unwrap_or_else(|| "subdomain rejected".to_string());
            self.audit_rejection(&request.subdomain, &reason);
            return Err(ProvisionError::Policy(reason));
        }
        let taken = self
            .directory
            .get_by_subdomain(&request.subdomain)
            .map_err(|err| {
                self.fail(ProvisionStep::Registry, &request.subdomain, &err.to_string())
            })?
            .is_some();
        if taken {
            let reason = format!("subdomain '{}' already registered", request.subdomain);
            self.audit_rejection(&request.subdomain, &reason);
            return Err(ProvisionError::Policy(reason));
        }
        let tenant = self
            .directory
            .register(RegisterTenant {
                subdomain: request.subdomain.clone(),
                name: request.name.clone(),
                plan: request.plan,
                status: None,
            })
            .map_err(|err| match err {
                // Lost a registration race since the availability check.
                DirectoryError::Conflict(detail) => ProvisionError::Policy(detail),
                other => self.fail(ProvisionStep::Registry, &request.subdomain, &other.to_string()),
            })?;
        let schema = self
            .schemas
            .create(&tenant.subdomain)
            .map_err(|err| self.fail(ProvisionStep::Schema, &tenant.subdomain, &err.to_string()))?;
        let bucket = self
            .buckets
            .create(tenant.id, tenant.plan)
            .map_err(|err| self.fail(ProvisionStep::Bucket, &tenant.subdomain, &err.to_string()))?;
        self.directory.update_status(tenant.id, TenantStatus::Active).map_err(|err| {
            self.fail(ProvisionStep::Activation, &tenant.subdomain, &err.to_string())
        })?;
        let receipt = ProvisionReceipt {
            tenant_id: tenant.id,
            subdomain: tenant.subdomain.clone(),
            schema_name: schema.schema_name,
            bucket_name: bucket.bucket_name,
            provisioned_at: OffsetDateTime::now_utc(),
        };
        let _ = self.audit.record(
            &AuditRecord::new("tenant_provisioned", AuditEntity::Tenant, tenant.id.to_string())
                .with_tenant(&tenant.subdomain)
                .with_metadata(json!({
                    "plan": tenant.plan.label(),
                    "admin_email": request.admin_email,
                    "schema": receipt.schema_name.as_str(),
                    "bucket": receipt.bucket_name.as_str(),
                })),
        );
        Ok(receipt)
    }

    /// Audits and builds a step failure. The tenant row, when already
    /// registered, stays pending for retry or administrative cleanup.
    fn fail(&self, step: ProvisionStep, subdomain: &str, message: &str) -> ProvisionError {
        let _ = self.audit.record(
            &AuditRecord::new("provision_failed", AuditEntity::Tenant, subdomain)
                .with_tenant(subdomain)
                .with_metadata(json!({"step": step.label(), "error": message})),
        );
        ProvisionError::Step {
            step,
            message: message.to_string(),
        }
    }

    /// Audits a policy rejection.
    fn audit_rejection(&self, subdomain: &str, reason: &str) {
        let _ = self.audit.record(
            &AuditRecord::new("provision_rejected", AuditEntity::Tenant, subdomain)
                .with_metadata(json!({"reason": reason})),
        );
    }
}
