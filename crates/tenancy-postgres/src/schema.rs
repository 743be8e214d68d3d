// crates/tenancy-postgres/src/schema.rs
// ============================================================================
// Module: Postgres Schema Lifecycle
// Description: Creation, verification, and teardown of tenant schemas.
// Purpose: Manage per-tenant namespaces without ever overwriting one.
// Dependencies: postgres, serde_json, tenancy-core, time
// ============================================================================

//! ## Overview
//! The schema manager owns tenant schema DDL. Names are derived from the
//! sanitized subdomain, never accepted from callers, so the schema created
//! here is always the schema the broker scopes to later.
//! Invariants:
//! - An existing schema is never re-created or overwritten.
//! - Drops are idempotent; a missing schema reports `false`, not an error.
//! - All catalog reads use bound parameters; DDL renders through the
//!   quoting module only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Instant;

use postgres::error::SqlState;
use serde_json::json;
use tenancy_core::AuditEntity;
use tenancy_core::AuditRecord;
use tenancy_core::AuditSink;
use tenancy_core::IdentifierContext;
use tenancy_core::SchemaError;
use tenancy_core::SchemaLifecycle;
use tenancy_core::SchemaName;
use tenancy_core::SchemaReceipt;
use tenancy_core::SchemaStatus;
use tenancy_core::sanitize;
use time::OffsetDateTime;

use crate::ident::create_schema_command;
use crate::ident::drop_schema_command;
use crate::pool::ControlConnection;
use crate::pool::ControlPool;

// ============================================================================
// SECTION: Schema Manager
// ============================================================================

/// Postgres-backed tenant schema lifecycle manager.
pub struct PostgresSchemaManager {
    /// Control-plane connection pool.
    pool: ControlPool,
    /// Audit sink for schema lifecycle events.
    audit: Arc<dyn AuditSink>,
}

impl PostgresSchemaManager {
    /// Creates a schema manager over the control-plane pool.
    #[must_use]
    pub fn new(pool: ControlPool, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            pool,
            audit,
        }
    }

    /// Borrows a control-plane connection.
    fn conn(&self) -> Result<ControlConnection, SchemaError> {
        self.pool.get().map_err(|err| SchemaError::Io(err.to_string()))
    }

    /// Derives the schema name for a subdomain through the sanitizer.
    fn schema_for(subdomain: &str) -> Result<SchemaName, SchemaError> {
        let token = sanitize(subdomain, IdentifierContext::Schema)
            .map_err(|err| SchemaError::Invalid(err.to_string()))?;
        Ok(SchemaName::for_token(&token))
    }

    /// Returns whether the schema exists in the catalog.
    fn schema_exists(
        conn: &mut ControlConnection,
        schema: &SchemaName,
    ) -> Result<bool, SchemaError> {
        let row = conn
            .query_opt(
                "SELECT 1 FROM information_schema.schemata WHERE schema_name = $1",
                &[&schema.as_str()],
            )
            .map_err(|err| SchemaError::Io(err.to_string()))?;
        Ok(row.is_some())
    }

    /// Counts tables inside the schema.
    fn table_count(conn: &mut ControlConnection, schema: &SchemaName) -> Result<u64, SchemaError> {
        let row = conn
            .query_one(
                "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = $1",
                &[&schema.as_str()],
            )
            .map_err(|err| SchemaError::Io(err.to_string()))?;
        let count: i64 = row.get(0);
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Emits an audit record, ignoring sink failures.
    fn audit(&self, record: &AuditRecord) {
        let _ = self.audit.record(record);
    }
}

impl SchemaLifecycle for PostgresSchemaManager {
    fn create(&self, subdomain: &str) -> Result<SchemaReceipt, SchemaError> {
        let start = Instant::now();
        let schema = Self::schema_for(subdomain)?;
        let mut conn = self.conn()?;
        if Self::schema_exists(&mut conn, &schema)? {
            return Err(SchemaError::AlreadyExists(schema.as_str().to_string()));
        }
        conn.batch_execute(&create_schema_command(&schema)).map_err(|err| {
            // Lost a creation race since the existence check.
            if err.code() == Some(&SqlState::DUPLICATE_SCHEMA) {
                SchemaError::AlreadyExists(schema.as_str().to_string())
            } else {
                SchemaError::Io(err.to_string())
            }
        })?;
        let receipt = SchemaReceipt {
            schema_name: schema.clone(),
            created_at: OffsetDateTime::now_utc(),
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        self.audit(
            &AuditRecord::new("schema_created", AuditEntity::Schema, schema.as_str())
                .with_tenant(subdomain)
                .with_metadata(json!({"duration_ms": receipt.duration_ms})),
        );
        Ok(receipt)
    }

    fn verify(&self, subdomain: &str) -> Result<SchemaStatus, SchemaError> {
        let schema = Self::schema_for(subdomain)?;
        let mut conn = self.conn()?;
        if !Self::schema_exists(&mut conn, &schema)? {
            return Ok(SchemaStatus {
                exists: false,
                table_count: 0,
            });
        }
        let table_count = Self::table_count(&mut conn, &schema)?;
        Ok(SchemaStatus {
            exists: true,
            table_count,
        })
    }

    fn drop_schema(&self, subdomain: &str, require_empty: bool) -> Result<bool, SchemaError> {
        let schema = Self::schema_for(subdomain)?;
        let mut conn = self.conn()?;
        if !Self::schema_exists(&mut conn, &schema)? {
            return Ok(false);
        }
        if require_empty {
            let tables = Self::table_count(&mut conn, &schema)?;
            if tables > 0 {
                return Err(SchemaError::NotEmpty(format!(
                    "schema '{schema}' still holds {tables} tables"
                )));
            }
        }
        conn.batch_execute(&drop_schema_command(&schema))
            .map_err(|err| SchemaError::Io(err.to_string()))?;
        self.audit(
            &AuditRecord::new("schema_dropped", AuditEntity::Schema, schema.as_str())
                .with_tenant(subdomain)
                .with_metadata(json!({"require_empty": require_empty})),
        );
        Ok(true)
    }

    fn list(&self) -> Result<Vec<SchemaName>, SchemaError> {
        let mut conn = self.conn()?;
        let rows = conn
            .query(
                "SELECT schema_name FROM information_schema.schemata WHERE schema_name LIKE \
                 'tenant\\_%' ORDER BY schema_name",
                &[],
            )
            .map_err(|err| SchemaError::Io(err.to_string()))?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let name: String = row.get(0);
                SchemaName::from_catalog_name(&name)
            })
            .collect())
    }
}
