// crates/tenancy-postgres/src/registry.rs
// ============================================================================
// Module: Postgres Tenant Registry
// Description: Authoritative tenant directory in the default namespace.
// Purpose: Own the single source of truth for tenant existence and status.
// Dependencies: postgres, serde_json, tenancy-core, time, uuid
// ============================================================================

//! ## Overview
//! The registry persists the `tenants` table in the default namespace and is
//! the only component that writes it. Every lookup and mutation runs on the
//! control-plane pool; nothing here ever touches a tenant-scoped connection.
//! Invariants:
//! - Subdomains persist lowercase; uniqueness is enforced by the database.
//! - `created_at` never changes; every mutation stamps `updated_at`.
//! - Active tenants cannot be deleted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use postgres::Row;
use postgres::error::SqlState;
use serde_json::json;
use tenancy_core::AuditEntity;
use tenancy_core::AuditRecord;
use tenancy_core::AuditSink;
use tenancy_core::DirectoryError;
use tenancy_core::RegisterTenant;
use tenancy_core::Tenant;
use tenancy_core::TenantDirectory;
use tenancy_core::TenantId;
use tenancy_core::TenantPlan;
use tenancy_core::TenantStatus;
use tenancy_core::TenantUpdate;
use time::OffsetDateTime;

use crate::pool::ControlConnection;
use crate::pool::ControlPool;

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Column list shared by every query returning full tenant rows.
const TENANT_COLUMNS: &str = "id, subdomain, name, plan, status, created_at, updated_at";

/// Postgres-backed tenant directory.
///
/// # Invariants
/// - All statements run against the default namespace.
pub struct PostgresTenantRegistry {
    /// Control-plane connection pool.
    pool: ControlPool,
    /// Audit sink for registry mutations.
    audit: Arc<dyn AuditSink>,
}

impl PostgresTenantRegistry {
    /// Creates the registry and runs its migration.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the migration fails.
    pub fn new(pool: ControlPool, audit: Arc<dyn AuditSink>) -> Result<Self, DirectoryError> {
        let registry = Self {
            pool,
            audit,
        };
        registry.migrate()?;
        Ok(registry)
    }

    /// Ensures the tenants table exists.
    fn migrate(&self) -> Result<(), DirectoryError> {
        let mut conn = self.conn()?;
        conn.batch_execute(
            "CREATE TABLE IF NOT EXISTS tenants (id UUID PRIMARY KEY,subdomain TEXT NOT NULL \
             UNIQUE,name TEXT NOT NULL,plan TEXT NOT NULL,status TEXT NOT NULL,created_at \
             TIMESTAMPTZ NOT NULL,updated_at TIMESTAMPTZ NOT NULL);",
        )
        .map_err(|err| DirectoryError::Io(err.to_string()))?;
        Ok(())
    }

    /// Borrows a control-plane connection.
    fn conn(&self) -> Result<ControlConnection, DirectoryError> {
        self.pool.get().map_err(|err| DirectoryError::Io(err.to_string()))
    }

    /// Decodes one tenant row.
    fn tenant_from_row(row: &Row) -> Result<Tenant, DirectoryError> {
        let id: uuid::Uuid = row.get(0);
        let plan_label: String = row.get(3);
        let status_label: String = row.get(4);
        let plan = TenantPlan::from_label(&plan_label)
            .ok_or_else(|| DirectoryError::Invalid(format!("unknown plan label: {plan_label}")))?;
        let status = TenantStatus::from_label(&status_label).ok_or_else(|| {
            DirectoryError::Invalid(format!("unknown status label: {status_label}"))
        })?;
        Ok(Tenant {
            id: TenantId::new(id),
            subdomain: row.get(1),
            name: row.get(2),
            plan,
            status,
            created_at: row.get(5),
            updated_at: row.get(6),
        })
    }

    /// Emits an audit record, ignoring sink failures.
    fn audit(&self, record: &AuditRecord) {
        let _ = self.audit.record(record);
    }
}

impl TenantDirectory for PostgresTenantRegistry {
    fn exists(&self, identifier: &str) -> Result<bool, DirectoryError> {
        let normalized = identifier.to_lowercase();
        let mut conn = self.conn()?;
        let row = if let Some(id) = TenantId::parse(identifier) {
            conn.query_opt(
                "SELECT 1 FROM tenants WHERE id = $1 OR subdomain = $2",
                &[id.as_uuid(), &normalized],
            )
        } else {
            conn.query_opt("SELECT 1 FROM tenants WHERE subdomain = $1", &[&normalized])
        }
        .map_err(|err| DirectoryError::Io(err.to_string()))?;
        Ok(row.is_some())
    }

    fn get_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, DirectoryError> {
        let normalized = subdomain.to_lowercase();
        let mut conn = self.conn()?;
        let query = format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE subdomain = $1");
        conn.query_opt(&query, &[&normalized])
            .map_err(|err| DirectoryError::Io(err.to_string()))?
            .map(|row| Self::tenant_from_row(&row))
            .transpose()
    }

    fn register(&self, request: RegisterTenant) -> Result<Tenant, DirectoryError> {
        let tenant = Tenant {
            id: TenantId::generate(),
            subdomain: request.subdomain.to_lowercase(),
            name: request.name,
            plan: request.plan,
            status: request.status.unwrap_or(TenantStatus::Pending),
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        };
        let mut conn = self.conn()?;
        conn.execute(
            "INSERT INTO tenants (id, subdomain, name, plan, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[
                tenant.id.as_uuid(),
                &tenant.subdomain,
                &tenant.name,
                &tenant.plan.label(),
                &tenant.status.label(),
                &tenant.created_at,
                &tenant.updated_at,
            ],
        )
        .map_err(|err| {
            if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                DirectoryError::Conflict(format!(
                    "subdomain '{}' already registered",
                    tenant.subdomain
                ))
            } else {
                DirectoryError::Io(err.to_string())
            }
        })?;
        self.audit(
            &AuditRecord::new("tenant_registered", AuditEntity::Tenant, tenant.id.to_string())
                .with_tenant(&tenant.subdomain)
                .with_metadata(json!({
                    "plan": tenant.plan.label(),
                    "status": tenant.status.label(),
                })),
        );
        Ok(tenant)
    }

    fn update_status(&self, id: TenantId, status: TenantStatus) -> Result<Tenant, DirectoryError> {
        let mut conn = self.conn()?;
        let query = format!(
            "UPDATE tenants SET status = $2, updated_at = $3 WHERE id = $1 RETURNING \
             {TENANT_COLUMNS}"
        );
        let row = conn
            .query_opt(&query, &[id.as_uuid(), &status.label(), &OffsetDateTime::now_utc()])
            .map_err(|err| DirectoryError::Io(err.to_string()))?
            .ok_or_else(|| DirectoryError::NotFound(id.to_string()))?;
        let tenant = Self::tenant_from_row(&row)?;
        self.audit(
            &AuditRecord::new("tenant_status_updated", AuditEntity::Tenant, id.to_string())
                .with_tenant(&tenant.subdomain)
                .with_metadata(json!({"status": status.label()})),
        );
        Ok(tenant)
    }

    fn update_plan(&self, id: TenantId, plan: TenantPlan) -> Result<Tenant, DirectoryError> {
        let mut conn = self.conn()?;
        let query = format!(
            "UPDATE tenants SET plan = $2, updated_at = $3 WHERE id = $1 RETURNING \
             {TENANT_COLUMNS}"
        );
        let row = conn
            .query_opt(&query, &[id.as_uuid(), &plan.label(), &OffsetDateTime::now_utc()])
            .map_err(|err| DirectoryError::Io(err.to_string()))?
            .ok_or_else(|| DirectoryError::NotFound(id.to_string()))?;
        let tenant = Self::tenant_from_row(&row)?;
        self.audit(
            &AuditRecord::new("tenant_plan_updated", AuditEntity::Tenant, id.to_string())
                .with_tenant(&tenant.subdomain)
                .with_metadata(json!({"plan": plan.label()})),
        );
        Ok(tenant)
    }

    fn update_tenant(&self, id: TenantId, update: TenantUpdate) -> Result<Tenant, DirectoryError> {
        if update.is_empty() {
            return Err(DirectoryError::Invalid("empty tenant update".to_string()));
        }
        let plan_label = update.plan.map(TenantPlan::label);
        let status_label = update.status.map(TenantStatus::label);
        let mut conn = self.conn()?;
        let query = format!(
            "UPDATE tenants SET name = COALESCE($2, name), plan = COALESCE($3, plan), status = \
             COALESCE($4, status), updated_at = $5 WHERE id = $1 RETURNING {TENANT_COLUMNS}"
        );
        let row = conn
            .query_opt(&query, &[
                id.as_uuid(),
                &update.name,
                &plan_label,
                &status_label,
                &OffsetDateTime::now_utc(),
            ])
            .map_err(|err| DirectoryError::Io(err.to_string()))?
            .ok_or_else(|| DirectoryError::NotFound(id.to_string()))?;
        let tenant = Self::tenant_from_row(&row)?;
        self.audit(
            &AuditRecord::new("tenant_updated", AuditEntity::Tenant, id.to_string())
                .with_tenant(&tenant.subdomain),
        );
        Ok(tenant)
    }

    fn delete(&self, id: TenantId) -> Result<(), DirectoryError> {
        let mut conn = self.conn()?;
        // The status guard lives in the statement itself, so a tenant
        // activated concurrently is never deleted.
        let deleted = conn
            .query_opt(
                "DELETE FROM tenants WHERE id = $1 AND status <> $2 RETURNING subdomain",
                &[id.as_uuid(), &TenantStatus::Active.label()],
            )
            .map_err(|err| DirectoryError::Io(err.to_string()))?;
        let Some(row) = deleted else {
            let survivor = conn
                .query_opt("SELECT subdomain FROM tenants WHERE id = $1", &[id.as_uuid()])
                .map_err(|err| DirectoryError::Io(err.to_string()))?;
            return match survivor {
                Some(row) => {
                    let subdomain: String = row.get(0);
                    Err(DirectoryError::ActiveTenant(format!(
                        "tenant '{subdomain}' must be suspended before deletion"
                    )))
                }
                None => Err(DirectoryError::NotFound(id.to_string())),
            };
        };
        let subdomain: String = row.get(0);
        self.audit(
            &AuditRecord::new("tenant_deleted", AuditEntity::Tenant, id.to_string())
                .with_tenant(&subdomain),
        );
        Ok(())
    }

    fn readiness(&self) -> Result<(), DirectoryError> {
        let mut conn = self.conn()?;
        conn.batch_execute("SELECT 1").map_err(|err| DirectoryError::Io(err.to_string()))
    }
}
