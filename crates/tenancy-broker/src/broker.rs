// crates/tenancy-broker/src/broker.rs
// ============================================================================
// Module: Tenancy Connection Broker
// Description: The borrow-scope-operate-reset protocol for pooled sessions.
// Purpose: Guarantee session-state isolation across reused connections.
// Dependencies: tenancy-core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`ConnectionBroker`] is the centerpiece of the isolation subsystem. It is
//! a state machine over each borrowed connection with transitions
//! `Idle -> Scoped -> {Idle, Contaminated}`; `Contaminated` is terminal and
//! the pool destroys such connections instead of reusing them.
//! Invariants:
//! - No connection is borrowed for a nonexistent tenant.
//! - Cleanup runs on every exit path, including unwinds, via a drop guard.
//! - Cleanup failures surface only when the operation itself succeeded.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::json;
use tenancy_core::AuditEntity;
use tenancy_core::AuditRecord;
use tenancy_core::AuditSink;
use tenancy_core::IdentifierContext;
use tenancy_core::NullSink;
use tenancy_core::SchemaName;
use tenancy_core::SessionConnection;
use tenancy_core::SessionError;
use tenancy_core::SessionPool;
use tenancy_core::TenantDirectory;
use tenancy_core::sanitize;
use thiserror::Error;

// ============================================================================
// SECTION: Broker Errors
// ============================================================================

/// Errors returned by the connection broker.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Broker is missing a tenant directory.
    #[error("broker tenant directory is not configured")]
    MissingDirectory,
    /// Broker is missing a session pool.
    #[error("broker session pool is not configured")]
    MissingPool,
    /// Attempted access to a nonexistent or invalid tenant.
    #[error("tenant isolation violation: {0}")]
    IsolationViolation(String),
    /// Tenant directory lookup failed.
    #[error("tenant directory failure: {0}")]
    Directory(String),
    /// Connection checkout failed.
    #[error("connection checkout failed: {0}")]
    Pool(String),
    /// Namespace switch failed before the operation ran.
    #[error("session scoping failed: {0}")]
    Session(String),
    /// Namespace reset failed after a successful operation; the connection
    /// was destroyed rather than pooled.
    #[error("session cleanup failed: {0}")]
    Cleanup(String),
}

// ============================================================================
// SECTION: Tenant Handle
// ============================================================================

/// Scoped handle passed to tenant operations.
///
/// This type is distinct from any registry handle, so a tenant-scoped
/// callback cannot reach the shared registry through the scoped connection.
///
/// # Invariants
/// - The underlying connection is scoped to `schema` for the handle's
///   entire lifetime.
pub struct TenantHandle<'a, C: SessionConnection> {
    /// Connection scoped to the tenant namespace.
    conn: &'a mut C,
    /// Schema the connection is scoped to.
    schema: &'a SchemaName,
}

impl<'a, C: SessionConnection> TenantHandle<'a, C> {
    /// Wraps a scoped connection.
    fn new(conn: &'a mut C, schema: &'a SchemaName) -> Self {
        Self {
            conn,
            schema,
        }
    }

    /// Returns the scoped connection.
    pub fn connection(&mut self) -> &mut C {
        self.conn
    }

    /// Returns the schema this handle is scoped to.
    #[must_use]
    pub const fn schema(&self) -> &SchemaName {
        self.schema
    }
}

// ============================================================================
// SECTION: Scope Guard
// ============================================================================

/// Drop guard holding the reset-or-contaminate decision.
///
/// # Invariants
/// - Cleanup runs exactly once, on `finish` or on drop (unwind path).
struct ScopeGuard<'a, C: SessionConnection> {
    /// Borrowed pooled connection.
    conn: &'a mut C,
    /// Audit sink for contamination events.
    audit: &'a dyn AuditSink,
    /// Tenant identifier for audit context.
    tenant: &'a str,
    /// Set once cleanup has run.
    finished: bool,
}

impl<'a, C: SessionConnection> ScopeGuard<'a, C> {
    /// Creates a guard around a freshly borrowed connection.
    fn new(conn: &'a mut C, audit: &'a dyn AuditSink, tenant: &'a str) -> Self {
        Self {
            conn,
            audit,
            tenant,
            finished: false,
        }
    }

    /// Switches the connection into the tenant namespace.
    fn enter(&mut self, schema: &SchemaName) -> Result<(), SessionError> {
        self.conn.enter_namespace(schema)
    }

    /// Returns the scoped connection.
    fn connection(&mut self) -> &mut C {
        self.conn
    }

    /// Runs cleanup now and reports the outcome.
    fn finish(&mut self) -> Result<(), SessionError> {
        self.finished = true;
        reset_or_contaminate(self.conn, self.audit, self.tenant)
    }
}

impl<C: SessionConnection> Drop for ScopeGuard<'_, C> {
    fn drop(&mut self) {
        if !self.finished {
            // Unwind or early-exit path; the outcome is already decided, so
            // the cleanup result is recorded via audit only.
            let _ = reset_or_contaminate(self.conn, self.audit, self.tenant);
        }
    }
}

/// Resets the connection's namespace, contaminating it on failure.
fn reset_or_contaminate<C: SessionConnection>(
    conn: &mut C,
    audit: &dyn AuditSink,
    tenant: &str,
) -> Result<(), SessionError> {
    match conn.reset_namespace() {
        Ok(()) => Ok(()),
        Err(err) => {
            conn.mark_contaminated();
            let record =
                AuditRecord::new("connection_contaminated", AuditEntity::Connection, tenant)
                    .with_tenant(tenant)
                    .with_metadata(json!({"error": err.to_string()}));
            let _ = audit.record(&record);
            Err(err)
        }
    }
}

// ============================================================================
// SECTION: Connection Broker
// ============================================================================

/// Builder for a connection broker.
///
/// # Invariants
/// - `build` succeeds only when a directory and a pool are configured.
pub struct ConnectionBrokerBuilder<P: SessionPool> {
    /// Tenant directory consulted before any connection is borrowed.
    directory: Option<Arc<dyn TenantDirectory>>,
    /// Session pool the broker borrows from.
    pool: Option<P>,
    /// Audit sink for isolation events.
    audit: Option<Arc<dyn AuditSink>>,
}

impl<P: SessionPool> Default for ConnectionBrokerBuilder<P> {
    fn default() -> Self {
        Self {
            directory: None,
            pool: None,
            audit: None,
        }
    }
}

impl<P: SessionPool> ConnectionBrokerBuilder<P> {
    /// Registers the tenant directory.
    #[must_use]
    pub fn directory(mut self, directory: Arc<dyn TenantDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Registers the session pool.
    #[must_use]
    pub fn pool(mut self, pool: P) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Registers the audit sink. Defaults to [`NullSink`].
    #[must_use]
    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Builds the connection broker.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::MissingDirectory`] or
    /// [`BrokerError::MissingPool`] when required collaborators are absent.
    pub fn build(self) -> Result<ConnectionBroker<P>, BrokerError> {
        Ok(ConnectionBroker {
            directory: self.directory.ok_or(BrokerError::MissingDirectory)?,
            pool: self.pool.ok_or(BrokerError::MissingPool)?,
            audit: self.audit.unwrap_or_else(|| Arc::new(NullSink::new())),
        })
    }
}

/// Broker wrapping every tenant-scoped operation in the isolation protocol.
///
/// # Invariants
/// - A directory and a pool are always configured.
/// - Every borrowed connection is reset or destroyed before release.
pub struct ConnectionBroker<P: SessionPool> {
    /// Tenant directory consulted before any connection is borrowed.
    directory: Arc<dyn TenantDirectory>,
    /// Session pool the broker borrows from.
    pool: P,
    /// Audit sink for isolation events.
    audit: Arc<dyn AuditSink>,
}

impl<P: SessionPool> ConnectionBroker<P> {
    /// Returns a builder for the connection broker.
    #[must_use]
    pub fn builder() -> ConnectionBrokerBuilder<P> {
        ConnectionBrokerBuilder::default()
    }

    /// Runs `operation` against a connection scoped to the tenant's schema.
    ///
    /// The connection is borrowed only after the tenant's existence is
    /// confirmed, scoped through the one reviewed session command, and
    /// unconditionally reset (or destroyed) before release.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::IsolationViolation`] for unknown or invalid
    /// tenants, the operation's own error when it fails, and
    /// [`BrokerError::Cleanup`] when the operation succeeded but the
    /// connection could not be restored.
    pub fn with_tenant_connection<T, E, F>(&self, identifier: &str, operation: F) -> Result<T, E>
    where
        F: FnOnce(&mut TenantHandle<'_, P::Connection>) -> Result<T, E>,
        E: From<BrokerError>,
    {
        let known = self
            .directory
            .exists(identifier)
            .map_err(|err| BrokerError::Directory(err.to_string()))?;
        if !known {
            self.audit_violation(identifier, "tenant not registered");
            return Err(BrokerError::IsolationViolation(format!(
                "tenant '{identifier}' not found or invalid"
            ))
            .into());
        }
        let token = match sanitize(identifier, IdentifierContext::Schema) {
            Ok(token) => token,
            Err(err) => {
                self.audit_violation(identifier, &err.to_string());
                return Err(BrokerError::IsolationViolation(format!(
                    "tenant '{identifier}' not found or invalid"
                ))
                .into());
            }
        };
        let schema = SchemaName::for_token(&token);
        let mut pooled =
            self.pool.checkout().map_err(|err| BrokerError::Pool(err.to_string()))?;
        let mut scope = ScopeGuard::new(&mut *pooled, self.audit.as_ref(), identifier);
        scope
            .enter(&schema)
            .map_err(|err| BrokerError::Session(err.to_string()))?;
        let outcome = {
            let mut handle = TenantHandle::new(scope.connection(), &schema);
            operation(&mut handle)
        };
        let cleanup = scope.finish();
        match (outcome, cleanup) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(BrokerError::Cleanup(err.to_string()).into()),
            // Cleanup failures never mask the operation's own error; the
            // contamination is already audited and the pool will destroy
            // the connection.
            (Err(op_err), _) => Err(op_err),
        }
    }

    /// Audits an isolation violation at high severity.
    fn audit_violation(&self, identifier: &str, reason: &str) {
        let record = AuditRecord::new("isolation_violation", AuditEntity::Tenant, identifier)
            .with_metadata(json!({"reason": reason, "severity": "high"}));
        let _ = self.audit.record(&record);
    }
}
