// crates/tenancy-storage/src/bucket.rs
// ============================================================================
// Module: Bucket Provisioner
// Description: S3-backed tenant bucket lifecycle and signed URL issuance.
// Purpose: Give each tenant an isolated, quota-tagged storage bucket.
// Dependencies: aws-config, aws-sdk-s3, serde, tenancy-core, time, tokio
// ============================================================================

//! ## Overview
//! The provisioner creates one bucket per tenant, named from the tenant id so
//! names never collide and never contain tenant-chosen text. Buckets are
//! created with versioning, a public-read policy scoped to the `public/`
//! prefix, and a plan tag that later resolves the storage quota.
//! Invariants:
//! - An existing bucket is never re-created or overwritten.
//! - Non-empty buckets are deleted only with `force`.
//! - Object access outside the public prefix happens through signed URLs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::Client;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::BucketLocationConstraint;
use aws_sdk_s3::types::BucketVersioningStatus;
use aws_sdk_s3::types::CreateBucketConfiguration;
use aws_sdk_s3::types::Delete;
use aws_sdk_s3::types::ObjectIdentifier;
use aws_sdk_s3::types::Tag;
use aws_sdk_s3::types::Tagging;
use aws_sdk_s3::types::VersioningConfiguration;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use tenancy_core::AuditEntity;
use tenancy_core::AuditRecord;
use tenancy_core::AuditSink;
use tenancy_core::BucketError;
use tenancy_core::BucketLifecycle;
use tenancy_core::BucketName;
use tenancy_core::BucketReceipt;
use tenancy_core::BucketStats;
use tenancy_core::PlanLimits;
use tenancy_core::TenantId;
use tenancy_core::TenantPlan;
use time::OffsetDateTime;
use tokio::runtime::Runtime;

use crate::policy::public_read_policy;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Tag key carrying the tenant plan on each bucket.
const PLAN_TAG_KEY: &str = "tenant-plan";
/// Folder markers seeded into every new bucket.
const SEED_KEYS: [&str; 2] = ["public/products/.keep", "private/exports/.keep"];
/// Maximum identifiers per batched object deletion.
const DELETE_BATCH: usize = 1000;

/// Configuration for S3-backed bucket provisioning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BucketStoreConfig {
    /// AWS region (optional; falls back to environment configuration).
    #[serde(default)]
    pub region: Option<String>,
    /// Custom endpoint URL (for S3-compatible stores).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Force path-style addressing (for S3-compatible stores).
    #[serde(default)]
    pub force_path_style: bool,
}

// ============================================================================
// SECTION: Provisioner
// ============================================================================

/// S3-backed tenant bucket provisioner.
pub struct BucketProvisioner {
    /// S3 client handle.
    client: Client,
    /// Provisioner configuration.
    config: BucketStoreConfig,
    /// Audit sink for bucket lifecycle events.
    audit: Arc<dyn AuditSink>,
    /// Tokio runtime for blocking S3 calls.
    runtime: Option<Arc<Runtime>>,
}

impl Drop for BucketProvisioner {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            let _ = std::thread::spawn(move || drop(runtime));
        }
    }
}

impl BucketProvisioner {
    /// Creates a new bucket provisioner.
    ///
    /// # Errors
    ///
    /// Returns [`BucketError`] when initialization fails.
    pub fn new(config: BucketStoreConfig, audit: Arc<dyn AuditSink>) -> Result<Self, BucketError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|err| BucketError::Io(err.to_string()))?;
        let shared_config = runtime.block_on(async {
            let mut loader = aws_config::defaults(BehaviorVersion::latest());
            if let Some(region) = &config.region {
                loader = loader.region(Region::new(region.clone()));
            }
            if let Some(endpoint) = &config.endpoint {
                loader = loader.endpoint_url(endpoint);
            }
            loader.load().await
        });
        let mut s3_builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if config.force_path_style {
            s3_builder = s3_builder.force_path_style(true);
        }
        let client = Client::from_conf(s3_builder.build());
        Ok(Self {
            client,
            config,
            audit,
            runtime: Some(Arc::new(runtime)),
        })
    }

    /// Returns the runtime for blocking S3 calls.
    fn runtime(&self) -> Result<&Arc<Runtime>, BucketError> {
        self.runtime
            .as_ref()
            .ok_or_else(|| BucketError::Io("bucket provisioner closed".to_string()))
    }

    /// Emits an audit record, ignoring sink failures.
    fn audit(&self, record: &AuditRecord) {
        let _ = self.audit.record(record);
    }

    /// Collects every object version and delete marker in the bucket.
    async fn collect_versions(
        client: &Client,
        bucket: &str,
    ) -> Result<Vec<ObjectIdentifier>, BucketError> {
        let mut identifiers = Vec::new();
        let mut key_marker: Option<String> = None;
        let mut version_marker: Option<String> = None;
        loop {
            let output = client
                .list_object_versions()
                .bucket(bucket)
                .set_key_marker(key_marker.clone())
                .set_version_id_marker(version_marker.clone())
                .send()
                .await
                .map_err(|err| BucketError::Io(err.to_string()))?;
            for version in output.versions() {
                identifiers.push(
                    ObjectIdentifier::builder()
                        .key(version.key().unwrap_or_default())
                        .set_version_id(version.version_id().map(ToString::to_string))
                        .build()
                        .map_err(|err| BucketError::Invalid(err.to_string()))?,
                );
            }
            for marker in output.delete_markers() {
                identifiers.push(
                    ObjectIdentifier::builder()
                        .key(marker.key().unwrap_or_default())
                        .set_version_id(marker.version_id().map(ToString::to_string))
                        .build()
                        .map_err(|err| BucketError::Invalid(err.to_string()))?,
                );
            }
            if output.is_truncated().unwrap_or(false) {
                key_marker = output.next_key_marker().map(ToString::to_string);
                version_marker = output.next_version_id_marker().map(ToString::to_string);
            } else {
                return Ok(identifiers);
            }
        }
    }

    /// Resolves the plan quota from the bucket's plan tag.
    async fn quota_from_tag(client: &Client, bucket: &str) -> u64 {
        // Missing or unreadable tags fall back to the free tier quota.
        let plan = match client.get_bucket_tagging().bucket(bucket).send().await {
            Ok(output) => output
                .tag_set()
                .iter()
                .find(|tag| tag.key() == PLAN_TAG_KEY)
                .and_then(|tag| TenantPlan::from_label(tag.value()))
                .unwrap_or(TenantPlan::Free),
            Err(_) => TenantPlan::Free,
        };
        PlanLimits::for_plan(plan).max_storage_bytes
    }
}

// ============================================================================
// SECTION: Lifecycle Implementation
// ============================================================================

impl BucketLifecycle for BucketProvisioner {
    fn create(&self, tenant_id: TenantId, plan: TenantPlan) -> Result<BucketReceipt, BucketError> {
        let start = Instant::now();
        let bucket = BucketName::for_tenant(tenant_id);
        let quota_bytes = PlanLimits::for_plan(plan).max_storage_bytes;
        let name = bucket.as_str().to_string();
        let policy = public_read_policy(&bucket);
        let client = self.client.clone();
        let region = self.config.region.clone();
        self.runtime()?.block_on(async move {
            match client.head_bucket().bucket(&name).send().await {
                Ok(_) => return Err(BucketError::AlreadyExists(name.clone())),
                Err(err) => {
                    let service = err.into_service_error();
                    if !service.is_not_found() {
                        return Err(BucketError::Io(service.to_string()));
                    }
                }
            }
            let mut create = client.create_bucket().bucket(&name);
            if let Some(region) = region.filter(|region| region != "us-east-1") {
                let constraint = BucketLocationConstraint::from(region.as_str());
                create = create.create_bucket_configuration(
                    CreateBucketConfiguration::builder().location_constraint(constraint).build(),
                );
            }
            create.send().await.map_err(|err| BucketError::Io(err.to_string()))?;
            client
                .put_bucket_versioning()
                .bucket(&name)
                .versioning_configuration(
                    VersioningConfiguration::builder()
                        .status(BucketVersioningStatus::Enabled)
                        .build(),
                )
                .send()
                .await
                .map_err(|err| BucketError::Io(err.to_string()))?;
            client
                .put_bucket_policy()
                .bucket(&name)
                .policy(policy)
                .send()
                .await
                .map_err(|err| BucketError::Io(err.to_string()))?;
            let tag = Tag::builder()
                .key(PLAN_TAG_KEY)
                .value(plan.label())
                .build()
                .map_err(|err| BucketError::Invalid(err.to_string()))?;
            let tagging = Tagging::builder()
                .tag_set(tag)
                .build()
                .map_err(|err| BucketError::Invalid(err.to_string()))?;
            client
                .put_bucket_tagging()
                .bucket(&name)
                .tagging(tagging)
                .send()
                .await
                .map_err(|err| BucketError::Io(err.to_string()))?;
            for key in SEED_KEYS {
                client
                    .put_object()
                    .bucket(&name)
                    .key(key)
                    .body(ByteStream::from_static(b""))
                    .send()
                    .await
                    .map_err(|err| BucketError::Io(err.to_string()))?;
            }
            Ok(())
        })?;
        let receipt = BucketReceipt {
            bucket_name: bucket.clone(),
            quota_bytes,
            endpoint: self.config.endpoint.clone(),
            created_at: OffsetDateTime::now_utc(),
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        self.audit(
            &AuditRecord::new("bucket_created", AuditEntity::Bucket, bucket.as_str())
                .with_tenant(tenant_id.to_string())
                .with_metadata(json!({
                    "plan": plan.label(),
                    "quota_bytes": quota_bytes,
                    "duration_ms": receipt.duration_ms,
                })),
        );
        Ok(receipt)
    }

    fn delete(&self, tenant_id: TenantId, force: bool) -> Result<bool, BucketError> {
        let bucket = BucketName::for_tenant(tenant_id);
        let name = bucket.as_str().to_string();
        let client = self.client.clone();
        let deleted = self.runtime()?.block_on(async move {
            match client.head_bucket().bucket(&name).send().await {
                Ok(_) => {}
                Err(err) => {
                    let service = err.into_service_error();
                    if service.is_not_found() {
                        return Ok(false);
                    }
                    return Err(BucketError::Io(service.to_string()));
                }
            }
            let identifiers = Self::collect_versions(&client, &name).await?;
            if !identifiers.is_empty() {
                if !force {
                    return Err(BucketError::NotEmpty(format!(
                        "bucket '{name}' still holds {} objects",
                        identifiers.len()
                    )));
                }
                for chunk in identifiers.chunks(DELETE_BATCH) {
                    let batch = Delete::builder()
                        .set_objects(Some(chunk.to_vec()))
                        .build()
                        .map_err(|err| BucketError::Invalid(err.to_string()))?;
                    client
                        .delete_objects()
                        .bucket(&name)
                        .delete(batch)
                        .send()
                        .await
                        .map_err(|err| BucketError::Io(err.to_string()))?;
                }
            }
            client
                .delete_bucket()
                .bucket(&name)
                .send()
                .await
                .map_err(|err| BucketError::Io(err.to_string()))?;
            Ok(true)
        })?;
        if deleted {
            self.audit(
                &AuditRecord::new("bucket_deleted", AuditEntity::Bucket, bucket.as_str())
                    .with_tenant(tenant_id.to_string())
                    .with_metadata(json!({"force": force})),
            );
        }
        Ok(deleted)
    }

    fn stats(&self, tenant_id: TenantId) -> Result<BucketStats, BucketError> {
        let bucket = BucketName::for_tenant(tenant_id);
        let name = bucket.as_str().to_string();
        let client = self.client.clone();
        self.runtime()?.block_on(async move {
            let quota_bytes = Self::quota_from_tag(&client, &name).await;
            let mut used_bytes = 0u64;
            let mut total_objects = 0u64;
            let mut latest_secs: Option<i64> = None;
            let mut continuation: Option<String> = None;
            loop {
                let output = client
                    .list_objects_v2()
                    .bucket(&name)
                    .set_continuation_token(continuation.clone())
                    .send()
                    .await
                    .map_err(|err| BucketError::Io(err.to_string()))?;
                for object in output.contents() {
                    let size = object.size().unwrap_or(0);
                    used_bytes = used_bytes.saturating_add(u64::try_from(size).unwrap_or(0));
                    total_objects += 1;
                    if let Some(modified) = object.last_modified() {
                        let secs = modified.secs();
                        if latest_secs.is_none_or(|latest| secs > latest) {
                            latest_secs = Some(secs);
                        }
                    }
                }
                if output.is_truncated().unwrap_or(false) {
                    continuation = output.next_continuation_token().map(ToString::to_string);
                } else {
                    break;
                }
            }
            Ok(BucketStats {
                used_bytes,
                total_objects,
                quota_bytes,
                usage_percent: usage_percent(used_bytes, quota_bytes),
                last_modified: latest_secs
                    .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok()),
            })
        })
    }

    fn signed_upload_url(
        &self,
        tenant_id: TenantId,
        key: &str,
        expiry_secs: u64,
    ) -> Result<String, BucketError> {
        if key.trim().is_empty() {
            return Err(BucketError::Invalid("object key must be set".to_string()));
        }
        let presigning = PresigningConfig::expires_in(Duration::from_secs(expiry_secs))
            .map_err(|err| BucketError::Invalid(err.to_string()))?;
        let bucket = BucketName::for_tenant(tenant_id);
        let key = key.to_string();
        let client = self.client.clone();
        self.runtime()?.block_on(async move {
            let presigned = client
                .put_object()
                .bucket(bucket.as_str())
                .key(key)
                .presigned(presigning)
                .await
                .map_err(|err| BucketError::Io(err.to_string()))?;
            Ok(presigned.uri().to_string())
        })
    }

    fn signed_download_url(
        &self,
        tenant_id: TenantId,
        key: &str,
        expiry_secs: u64,
    ) -> Result<String, BucketError> {
        if key.trim().is_empty() {
            return Err(BucketError::Invalid("object key must be set".to_string()));
        }
        let presigning = PresigningConfig::expires_in(Duration::from_secs(expiry_secs))
            .map_err(|err| BucketError::Invalid(err.to_string()))?;
        let bucket = BucketName::for_tenant(tenant_id);
        let key = key.to_string();
        let client = self.client.clone();
        self.runtime()?.block_on(async move {
            let presigned = client
                .get_object()
                .bucket(bucket.as_str())
                .key(key)
                .presigned(presigning)
                .await
                .map_err(|err| BucketError::Io(err.to_string()))?;
            Ok(presigned.uri().to_string())
        })
    }

    fn delete_object(&self, tenant_id: TenantId, key: &str) -> bool {
        let Ok(runtime) = self.runtime() else {
            return false;
        };
        let bucket = BucketName::for_tenant(tenant_id);
        let key = key.to_string();
        let client = self.client.clone();
        runtime
            .block_on(async move {
                client.delete_object().bucket(bucket.as_str()).key(key).send().await
            })
            .is_ok()
    }
}

/// Computes usage as a percentage of the plan quota.
#[allow(clippy::cast_precision_loss, reason = "Usage ratio tolerates rounding.")]
fn usage_percent(used_bytes: u64, quota_bytes: u64) -> f64 {
    if quota_bytes == 0 {
        return 0.0;
    }
    used_bytes as f64 / quota_bytes as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use tenancy_core::PlanLimits;
    use tenancy_core::TenantPlan;

    use super::usage_percent;

    #[test]
    fn usage_percent_tracks_quota() {
        let quota = PlanLimits::for_plan(TenantPlan::Pro).max_storage_bytes;
        let half = quota / 2;
        let percent = usage_percent(half, quota);
        assert!((percent - 50.0).abs() < f64::EPSILON);
        assert!((usage_percent(0, quota)).abs() < f64::EPSILON);
        assert!((usage_percent(quota, quota) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn usage_percent_handles_zero_quota() {
        assert!((usage_percent(42, 0)).abs() < f64::EPSILON);
    }
}
