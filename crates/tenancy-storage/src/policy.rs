// crates/tenancy-storage/src/policy.rs
// ============================================================================
// Module: Bucket Policy Rendering
// Description: Bucket policy documents applied at provisioning time.
// Purpose: Grant anonymous reads on the public prefix and nothing else.
// Dependencies: serde_json, tenancy-core
// ============================================================================

//! ## Overview
//! Tenant buckets carry exactly one policy: anonymous `GetObject` on the
//! `public/` prefix. Everything outside that prefix stays private and is
//! reachable only through signed URLs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::json;
use tenancy_core::BucketName;

// ============================================================================
// SECTION: Policy Rendering
// ============================================================================

/// Renders the public-read policy document for a tenant bucket.
#[must_use]
pub fn public_read_policy(bucket: &BucketName) -> String {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Sid": "PublicReadForPublicPrefix",
            "Effect": "Allow",
            "Principal": "*",
            "Action": "s3:GetObject",
            "Resource": format!("arn:aws:s3:::{}/public/*", bucket.as_str()),
        }],
    })
    .to_string()
}
