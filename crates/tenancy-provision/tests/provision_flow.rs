// crates/tenancy-provision/tests/provision_flow.rs
// ============================================================================
// Module: Provisioning Flow Tests
// Description: Unit tests for the end-to-end tenant provisioning flow.
// Purpose: Validate step ordering, failure attribution, and policy gating.
// ============================================================================

//! ## Overview
//! Exercises [`tenancy_provision::TenantProvisioner`] against in-memory
//! fakes, proving policy checks run before resource creation, failures name
//! their step, and activation happens only after every resource exists.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use tenancy_core::BucketError;
use tenancy_core::BucketLifecycle;
use tenancy_core::BucketName;
use tenancy_core::BucketReceipt;
use tenancy_core::BucketStats;
use tenancy_core::DEFAULT_SIGNED_URL_EXPIRY_SECS;
use tenancy_core::DirectoryError;
use tenancy_core::IdentifierContext;
use tenancy_core::MemorySink;
use tenancy_core::PlanLimits;
use tenancy_core::RegisterTenant;
use tenancy_core::SchemaError;
use tenancy_core::SchemaLifecycle;
use tenancy_core::SchemaName;
use tenancy_core::SchemaReceipt;
use tenancy_core::SchemaStatus;
use tenancy_core::Tenant;
use tenancy_core::TenantDirectory;
use tenancy_core::TenantId;
use tenancy_core::TenantPlan;
use tenancy_core::TenantStatus;
use tenancy_core::TenantUpdate;
use tenancy_core::sanitize;
use tenancy_provision::ProvisionError;
use tenancy_provision::ProvisionRequest;
use tenancy_provision::ProvisionStep;
use tenancy_provision::TenantProvisioner;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Fakes
// ============================================================================

/// In-memory tenant directory keyed by subdomain.
#[derive(Default)]
struct FakeDirectory {
    tenants: Mutex<HashMap<String, Tenant>>,
}

impl FakeDirectory {
    fn status_of(&self, subdomain: &str) -> Option<TenantStatus> {
        self.tenants.lock().expect("tenants").get(subdomain).map(|t| t.status)
    }
}

impl TenantDirectory for FakeDirectory {
    fn exists(&self, identifier: &str) -> Result<bool, DirectoryError> {
        let tenants = self.tenants.lock().expect("tenants");
        Ok(tenants.contains_key(&identifier.to_lowercase())
            || tenants.values().any(|t| t.id.to_string() == identifier))
    }

    fn get_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, DirectoryError> {
        Ok(self.tenants.lock().expect("tenants").get(&subdomain.to_lowercase()).cloned())
    }

    fn register(&self, request: RegisterTenant) -> Result<Tenant, DirectoryError> {
        let mut tenants = self.tenants.lock().expect("tenants");
        let subdomain = request.subdomain.to_lowercase();
        if tenants.contains_key(&subdomain) {
            return Err(DirectoryError::Conflict(format!(
                "subdomain '{subdomain}' already registered"
            )));
        }
        let tenant = Tenant {
            id: TenantId::generate(),
            subdomain: subdomain.clone(),
            name: request.name,
            plan: request.plan,
            status: request.status.unwrap_or(TenantStatus::Pending),
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        };
        tenants.insert(subdomain, tenant.clone());
        Ok(tenant)
    }

    fn update_status(&self, id: TenantId, status: TenantStatus) -> Result<Tenant, DirectoryError> {
        let mut tenants = self.tenants.lock().expect("tenants");
        let tenant = tenants
            .values_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| DirectoryError::NotFound(id.to_string()))?;
        tenant.status = status;
        tenant.updated_at = OffsetDateTime::now_utc();
        Ok(tenant.clone())
    }

    fn update_plan(&self, id: TenantId, plan: TenantPlan) -> Result<Tenant, DirectoryError> {
        let mut tenants = self.tenants.lock().expect("tenants");
        let tenant = tenants
            .values_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| DirectoryError::NotFound(id.to_string()))?;
        tenant.plan = plan;
        Ok(tenant.clone())
    }

    fn update_tenant(&self, id: TenantId, _update: TenantUpdate) -> Result<Tenant, DirectoryError> {
        Err(DirectoryError::NotFound(id.to_string()))
    }

    fn delete(&self, id: TenantId) -> Result<(), DirectoryError> {
        let mut tenants = self.tenants.lock().expect("tenants");
        tenants.retain(|_, t| t.id != id);
        Ok(())
    }
}

/// Schema lifecycle fake recording created subdomains.
#[derive(Default)]
struct FakeSchemas {
    created: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl SchemaLifecycle for FakeSchemas {
    fn create(&self, subdomain: &str) -> Result<SchemaReceipt, SchemaError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SchemaError::Io("schema backend unavailable".to_string()));
        }
        let token = sanitize(subdomain, IdentifierContext::Schema)
            .map_err(|err| SchemaError::Invalid(err.to_string()))?;
        self.created.lock().expect("created").push(subdomain.to_string());
        Ok(SchemaReceipt {
            schema_name: SchemaName::for_token(&token),
            created_at: OffsetDateTime::now_utc(),
            duration_ms: 1,
        })
    }

    fn verify(&self, subdomain: &str) -> Result<SchemaStatus, SchemaError> {
        let exists = self.created.lock().expect("created").iter().any(|s| s == subdomain);
        Ok(SchemaStatus {
            exists,
            table_count: 0,
        })
    }

    fn drop_schema(&self, subdomain: &str, _require_empty: bool) -> Result<bool, SchemaError> {
        let mut created = self.created.lock().expect("created");
        let before = created.len();
        created.retain(|s| s != subdomain);
        Ok(created.len() < before)
    }

    fn list(&self) -> Result<Vec<SchemaName>, SchemaError> {
        Ok(Vec::new())
    }
}

/// Bucket lifecycle fake recording created tenants.
#[derive(Default)]
struct FakeBuckets {
    created: Mutex<Vec<TenantId>>,
    fail: AtomicBool,
}

impl BucketLifecycle for FakeBuckets {
    fn create(&self, tenant_id: TenantId, plan: TenantPlan) -> Result<BucketReceipt, BucketError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BucketError::Io("object storage unavailable".to_string()));
        }
        self.created.lock().expect("created").push(tenant_id);
        Ok(BucketReceipt {
            bucket_name: BucketName::for_tenant(tenant_id),
            quota_bytes: PlanLimits::for_plan(plan).max_storage_bytes,
            endpoint: None,
            created_at: OffsetDateTime::now_utc(),
            duration_ms: 1,
        })
    }

    fn delete(&self, tenant_id: TenantId, _force: bool) -> Result<bool, BucketError> {
        let mut created = self.created.lock().expect("created");
        let before = created.len();
        created.retain(|id| *id != tenant_id);
        Ok(created.len() < before)
    }

    fn stats(&self, _tenant_id: TenantId) -> Result<BucketStats, BucketError> {
        Err(BucketError::Io("not supported by fake".to_string()))
    }

    fn signed_upload_url(
        &self,
        _tenant_id: TenantId,
        key: &str,
        expiry_secs: u64,
    ) -> Result<String, BucketError> {
        Ok(format!("https://example.invalid/upload/{key}?expires={expiry_secs}"))
    }

    fn signed_download_url(
        &self,
        _tenant_id: TenantId,
        key: &str,
        expiry_secs: u64,
    ) -> Result<String, BucketError> {
        Ok(format!("https://example.invalid/download/{key}?expires={expiry_secs}"))
    }

    fn delete_object(&self, _tenant_id: TenantId, _key: &str) -> bool {
        true
    }
}

// ============================================================================
// SECTION: Helper Functions
// ============================================================================

struct Harness {
    directory: Arc<FakeDirectory>,
    schemas: Arc<FakeSchemas>,
    buckets: Arc<FakeBuckets>,
    audit: Arc<MemorySink>,
    provisioner: TenantProvisioner,
}

fn harness() -> Harness {
    let directory = Arc::new(FakeDirectory::default());
    let schemas = Arc::new(FakeSchemas::default());
    let buckets = Arc::new(FakeBuckets::default());
    let audit = Arc::new(MemorySink::new());
    let provisioner = TenantProvisioner::builder()
        .directory(Arc::clone(&directory) as Arc<dyn TenantDirectory>)
        .schemas(Arc::clone(&schemas) as Arc<dyn SchemaLifecycle>)
        .buckets(Arc::clone(&buckets) as Arc<dyn BucketLifecycle>)
        .audit(Arc::clone(&audit) as Arc<dyn tenancy_core::AuditSink>)
        .build()
        .expect("provisioner builds");
    Harness {
        directory,
        schemas,
        buckets,
        audit,
        provisioner,
    }
}

fn request(subdomain: &str) -> ProvisionRequest {
    ProvisionRequest {
        subdomain: subdomain.to_string(),
        name: "Alpha Test Inc".to_string(),
        plan: TenantPlan::Pro,
        admin_email: "owner@alpha-test.example".to_string(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn provision_creates_all_resources_and_activates() {
    let h = harness();
    let receipt = h.provisioner.provision(&request("Alpha-Test")).expect("provision succeeds");

    assert_eq!(receipt.subdomain, "alpha-test");
    assert_eq!(receipt.schema_name.as_str(), "tenant_alpha-test");
    assert!(receipt.bucket_name.as_str().starts_with("tenant-"));
    assert!(receipt.bucket_name.as_str().ends_with("-assets"));
    assert_eq!(h.directory.status_of("alpha-test"), Some(TenantStatus::Active));
    assert_eq!(h.schemas.created.lock().expect("created").as_slice(), ["alpha-test"]);
    assert_eq!(h.buckets.created.lock().expect("created").len(), 1);

    let records = h.audit.snapshot();
    let provisioned = records
        .iter()
        .find(|r| r.action == "tenant_provisioned")
        .expect("provisioned audit record");
    assert_eq!(
        provisioned.metadata["admin_email"].as_str(),
        Some("owner@alpha-test.example")
    );
}

#[test]
fn reserved_subdomain_rejected_before_any_resource() {
    let h = harness();
    let result = h.provisioner.provision(&request("admin"));
    assert!(matches!(result, Err(ProvisionError::Policy(_))));
    assert!(h.directory.tenants.lock().expect("tenants").is_empty());
    assert!(h.schemas.created.lock().expect("created").is_empty());
    assert!(h.buckets.created.lock().expect("created").is_empty());
}

#[test]
fn duplicate_subdomain_rejected() {
    let h = harness();
    assert!(h.provisioner.provision(&request("alpha-test")).is_ok());
    let result = h.provisioner.provision(&request("alpha-test"));
    assert!(matches!(result, Err(ProvisionError::Policy(_))));
    assert_eq!(h.schemas.created.lock().expect("created").len(), 1);
}

#[test]
fn schema_failure_names_step_and_leaves_tenant_pending() {
    let h = harness();
    h.schemas.fail.store(true, Ordering::SeqCst);
    let result = h.provisioner.provision(&request("alpha-test"));
    assert!(matches!(
        result,
        Err(ProvisionError::Step {
            step: ProvisionStep::Schema,
            ..
        })
    ));
    assert_eq!(h.directory.status_of("alpha-test"), Some(TenantStatus::Pending));
    assert!(h.buckets.created.lock().expect("created").is_empty());
}

#[test]
fn bucket_failure_names_step() {
    let h = harness();
    h.buckets.fail.store(true, Ordering::SeqCst);
    let result = h.provisioner.provision(&request("alpha-test"));
    assert!(matches!(
        result,
        Err(ProvisionError::Step {
            step: ProvisionStep::Bucket,
            ..
        })
    ));
    assert_eq!(h.directory.status_of("alpha-test"), Some(TenantStatus::Pending));
    assert_eq!(h.schemas.created.lock().expect("created").len(), 1);
}

#[test]
fn schema_drop_reports_false_once_removed() {
    let h = harness();
    h.provisioner.provision(&request("alpha-test")).expect("provision succeeds");

    assert!(!h.schemas.drop_schema("never-created", false).expect("absent drop"));
    assert!(h.schemas.drop_schema("alpha-test", true).expect("first drop"));
    assert!(!h.schemas.drop_schema("alpha-test", true).expect("second drop"));
    assert!(!h.schemas.verify("alpha-test").expect("verify absent").exists);
}

#[test]
fn default_signed_urls_apply_standard_expiry() {
    let h = harness();
    let id = TenantId::generate();

    let upload = h.buckets.default_upload_url(id, "private/report.csv").expect("upload url");
    let download = h.buckets.default_download_url(id, "private/report.csv").expect("download url");
    let suffix = format!("?expires={DEFAULT_SIGNED_URL_EXPIRY_SECS}");
    assert!(upload.ends_with(&suffix));
    assert!(download.ends_with(&suffix));
}

#[test]
fn builder_requires_all_backends() {
    let result = TenantProvisioner::builder().build();
    assert!(matches!(result, Err(ProvisionError::MissingDirectory)));

    let result = TenantProvisioner::builder()
        .directory(Arc::new(FakeDirectory::default()) as Arc<dyn TenantDirectory>)
        .build();
    assert!(matches!(result, Err(ProvisionError::MissingSchemas)));

    let result = TenantProvisioner::builder()
        .directory(Arc::new(FakeDirectory::default()) as Arc<dyn TenantDirectory>)
        .schemas(Arc::new(FakeSchemas::default()) as Arc<dyn SchemaLifecycle>)
        .build();
    assert!(matches!(result, Err(ProvisionError::MissingBuckets)));
}
