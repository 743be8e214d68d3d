// crates/tenancy-core/src/audit.rs
// ============================================================================
// Module: Tenancy Audit Sinks
// Description: Audit record type and sink trait with reference sinks.
// Purpose: Report lifecycle and isolation events to an external collaborator.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Every schema or bucket create/drop, tenant status change, isolation
//! violation, and connection contamination emits an [`AuditRecord`] into an
//! [`AuditSink`]. This crate defines the record shape and reference sinks;
//! durable storage of audit records belongs to the collaborator, not here.
//! Invariants:
//! - Sinks must not mutate records.
//! - Sink failures never abort the operation that emitted the record.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Audit Records
// ============================================================================

/// Entity classification for audit records.
///
/// # Invariants
/// - Labels are stable wire forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEntity {
    /// Tenant registry row.
    Tenant,
    /// Per-tenant database schema.
    Schema,
    /// Per-tenant storage bucket.
    Bucket,
    /// Pooled database connection.
    Connection,
}

impl AuditEntity {
    /// Returns the stable label for this entity kind.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Tenant => "tenant",
            Self::Schema => "schema",
            Self::Bucket => "bucket",
            Self::Connection => "connection",
        }
    }
}

/// One audit event emitted by the isolation subsystem.
///
/// # Invariants
/// - `action` is a stable snake_case verb phrase.
/// - `tenant_id` is present whenever the event concerns a known tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Action label, for example `schema_created`.
    pub action: String,
    /// Entity the action applied to.
    pub entity_type: AuditEntity,
    /// Identifier of the affected entity.
    pub entity_id: String,
    /// Tenant the event concerns, when known.
    pub tenant_id: Option<String>,
    /// Free-form structured detail.
    pub metadata: Value,
}

impl AuditRecord {
    /// Builds a record with empty metadata.
    #[must_use]
    pub fn new(
        action: impl Into<String>,
        entity_type: AuditEntity,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            entity_type,
            entity_id: entity_id.into(),
            tenant_id: None,
            metadata: Value::Null,
        }
    }

    /// Attaches the tenant the event concerns.
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Attaches structured metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

// ============================================================================
// SECTION: Sink Trait and Errors
// ============================================================================

/// Errors emitted by audit sinks.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Sink failed to accept the record.
    #[error("audit write failed: {0}")]
    WriteFailed(String),
}

/// Accepts audit records from the isolation subsystem.
pub trait AuditSink: Send + Sync {
    /// Records one audit event.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the sink cannot accept the record.
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

// ============================================================================
// SECTION: Reference Sinks
// ============================================================================

/// Sink that drops every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NullSink {
    /// Creates a new null sink.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl AuditSink for NullSink {
    fn record(&self, _record: &AuditRecord) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Sink that retains records in memory for inspection.
///
/// # Invariants
/// - Records are retained in emission order.
#[derive(Debug, Default)]
pub struct MemorySink {
    /// Retained records in emission order.
    records: Mutex<Vec<AuditRecord>>,
}

impl MemorySink {
    /// Creates a new empty memory sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of recorded events.
    #[must_use]
    pub fn snapshot(&self) -> Vec<AuditRecord> {
        self.records.lock().map(|records| records.clone()).unwrap_or_default()
    }
}

impl AuditSink for MemorySink {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| AuditError::WriteFailed("memory sink poisoned".to_string()))?;
        records.push(record.clone());
        Ok(())
    }
}

/// Sink backed by a caller-provided callback.
pub struct CallbackSink {
    /// Callback invoked for each record.
    callback: Box<dyn Fn(&AuditRecord) -> Result<(), AuditError> + Send + Sync>,
}

impl CallbackSink {
    /// Creates a sink from a callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&AuditRecord) -> Result<(), AuditError> + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl AuditSink for CallbackSink {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        (self.callback)(record)
    }
}
