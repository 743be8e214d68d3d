// crates/tenancy-broker/tests/broker_protocol.rs
// ============================================================================
// Module: Connection Broker Protocol Tests
// Description: Unit tests for the borrow-scope-operate-reset protocol.
// Purpose: Validate the no-leak and destroy-on-cleanup-failure invariants.
// Dependencies: tenancy-broker, tenancy-core
// ============================================================================

//! ## Overview
//! Exercises [`tenancy_broker::ConnectionBroker`] against a deterministic
//! single-process fake pool, proving the invariants the protocol exists for:
//! connections always return to the pool in the default namespace, and a
//! connection whose reset fails is destroyed rather than reused.

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

use std::collections::HashSet;
use std::collections::VecDeque;
use std::ops::Deref;
use std::ops::DerefMut;
use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use tenancy_broker::BrokerError;
use tenancy_broker::ConnectionBroker;
use tenancy_core::DirectoryError;
use tenancy_core::MemorySink;
use tenancy_core::PoolError;
use tenancy_core::RegisterTenant;
use tenancy_core::SchemaName;
use tenancy_core::ScopeState;
use tenancy_core::SessionConnection;
use tenancy_core::SessionError;
use tenancy_core::SessionPool;
use tenancy_core::Tenant;
use tenancy_core::TenantDirectory;
use tenancy_core::TenantId;
use tenancy_core::TenantPlan;
use tenancy_core::TenantStatus;
use tenancy_core::TenantUpdate;

// ============================================================================
// SECTION: Fake Directory
// ============================================================================

/// Directory fake backed by a fixed set of known tenants.
struct FakeDirectory {
    tenants: HashSet<String>,
}

impl FakeDirectory {
    fn with_tenants(tenants: &[&str]) -> Self {
        Self {
            tenants: tenants.iter().map(|t| (*t).to_string()).collect(),
        }
    }
}

impl TenantDirectory for FakeDirectory {
    fn exists(&self, identifier: &str) -> Result<bool, DirectoryError> {
        Ok(self.tenants.contains(&identifier.to_lowercase()))
    }

    fn get_by_subdomain(&self, _subdomain: &str) -> Result<Option<Tenant>, DirectoryError> {
        Err(DirectoryError::Io("not supported by fake".to_string()))
    }

    fn register(&self, _request: RegisterTenant) -> Result<Tenant, DirectoryError> {
        Err(DirectoryError::Io("not supported by fake".to_string()))
    }

    fn update_status(
        &self,
        _id: TenantId,
        _status: TenantStatus,
    ) -> Result<Tenant, DirectoryError> {
        Err(DirectoryError::Io("not supported by fake".to_string()))
    }

    fn update_plan(&self, _id: TenantId, _plan: TenantPlan) -> Result<Tenant, DirectoryError> {
        Err(DirectoryError::Io("not supported by fake".to_string()))
    }

    fn update_tenant(
        &self,
        _id: TenantId,
        _update: TenantUpdate,
    ) -> Result<Tenant, DirectoryError> {
        Err(DirectoryError::Io("not supported by fake".to_string()))
    }

    fn delete(&self, _id: TenantId) -> Result<(), DirectoryError> {
        Err(DirectoryError::Io("not supported by fake".to_string()))
    }
}

// ============================================================================
// SECTION: Fake Pool
// ============================================================================

/// Session connection fake tracking its namespace search order.
struct FakeConnection {
    id: usize,
    search_path: String,
    state: ScopeState,
    fail_next_reset: Arc<AtomicBool>,
    scope_log: Arc<Mutex<Vec<(usize, String)>>>,
}

impl SessionConnection for FakeConnection {
    fn enter_namespace(&mut self, schema: &SchemaName) -> Result<(), SessionError> {
        if self.state == ScopeState::Contaminated {
            return Err(SessionError::Command("connection contaminated".to_string()));
        }
        self.search_path = format!("{}, public", schema.as_str());
        self.state = ScopeState::Scoped;
        self.scope_log
            .lock()
            .expect("scope log")
            .push((self.id, schema.as_str().to_string()));
        Ok(())
    }

    fn reset_namespace(&mut self) -> Result<(), SessionError> {
        if self.fail_next_reset.swap(false, Ordering::SeqCst) {
            return Err(SessionError::Command("injected reset failure".to_string()));
        }
        self.search_path = "public".to_string();
        self.state = ScopeState::Idle;
        Ok(())
    }

    fn mark_contaminated(&mut self) {
        self.state = ScopeState::Contaminated;
    }

    fn scope_state(&self) -> ScopeState {
        self.state
    }
}

/// Shared state behind the fake pool.
struct PoolShared {
    idle: Mutex<VecDeque<FakeConnection>>,
    destroyed: Mutex<Vec<usize>>,
    next_id: AtomicUsize,
    live: AtomicUsize,
    capacity: usize,
    fail_next_reset: Arc<AtomicBool>,
    scope_log: Arc<Mutex<Vec<(usize, String)>>>,
}

/// Deterministic fixed-size pool fake.
#[derive(Clone)]
struct FakePool {
    shared: Arc<PoolShared>,
}

impl FakePool {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                idle: Mutex::new(VecDeque::new()),
                destroyed: Mutex::new(Vec::new()),
                next_id: AtomicUsize::new(0),
                live: AtomicUsize::new(0),
                capacity,
                fail_next_reset: Arc::new(AtomicBool::new(false)),
                scope_log: Arc::new(Mutex::new(Vec::new())),
            }),
        }
    }

    /// Arms a one-shot reset failure on whichever connection resets next.
    fn inject_reset_failure(&self) {
        self.shared.fail_next_reset.store(true, Ordering::SeqCst);
    }

    fn destroyed_ids(&self) -> Vec<usize> {
        self.shared.destroyed.lock().expect("destroyed").clone()
    }

    fn scope_log(&self) -> Vec<(usize, String)> {
        self.shared.scope_log.lock().expect("scope log").clone()
    }

    fn connections_created(&self) -> usize {
        self.shared.next_id.load(Ordering::SeqCst)
    }

    /// Asserts every idle connection sits in the default namespace.
    fn assert_all_idle_clean(&self) {
        let idle = self.shared.idle.lock().expect("idle");
        for conn in idle.iter() {
            assert_eq!(conn.state, ScopeState::Idle, "connection {} not idle", conn.id);
            assert_eq!(conn.search_path, "public", "connection {} leaked scope", conn.id);
        }
    }
}

/// Checkout guard returning or destroying the connection on drop.
struct FakeGuard {
    conn: Option<FakeConnection>,
    shared: Arc<PoolShared>,
}

impl Deref for FakeGuard {
    type Target = FakeConnection;

    fn deref(&self) -> &FakeConnection {
        self.conn.as_ref().expect("guard holds connection")
    }
}

impl DerefMut for FakeGuard {
    fn deref_mut(&mut self) -> &mut FakeConnection {
        self.conn.as_mut().expect("guard holds connection")
    }
}

impl Drop for FakeGuard {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if conn.state == ScopeState::Contaminated {
                self.shared.live.fetch_sub(1, Ordering::SeqCst);
                self.shared.destroyed.lock().expect("destroyed").push(conn.id);
            } else {
                self.shared.idle.lock().expect("idle").push_back(conn);
            }
        }
    }
}

impl SessionPool for FakePool {
    type Connection = FakeConnection;
    type Guard = FakeGuard;

    fn checkout(&self) -> Result<FakeGuard, PoolError> {
        let reused = self.shared.idle.lock().expect("idle").pop_front();
        let conn = match reused {
            Some(conn) => conn,
            None => {
                if self.shared.live.load(Ordering::SeqCst) >= self.shared.capacity {
                    return Err(PoolError::Checkout("pool exhausted".to_string()));
                }
                self.shared.live.fetch_add(1, Ordering::SeqCst);
                FakeConnection {
                    id: self.shared.next_id.fetch_add(1, Ordering::SeqCst),
                    search_path: "public".to_string(),
                    state: ScopeState::Idle,
                    fail_next_reset: Arc::clone(&self.shared.fail_next_reset),
                    scope_log: Arc::clone(&self.shared.scope_log),
                }
            }
        };
        Ok(FakeGuard {
            conn: Some(conn),
            shared: Arc::clone(&self.shared),
        })
    }
}

// ============================================================================
// SECTION: Test Error Type
// ============================================================================

/// Application error wrapper proving operations keep their own error types.
#[derive(Debug)]
enum TestError {
    Broker(#[allow(dead_code, reason = "held for Debug output only")] BrokerError),
    App(String),
}

impl From<BrokerError> for TestError {
    fn from(err: BrokerError) -> Self {
        Self::Broker(err)
    }
}

// ============================================================================
// SECTION: Helper Functions
// ============================================================================

fn broker_with(
    tenants: &[&str],
    pool: FakePool,
) -> ConnectionBroker<FakePool> {
    ConnectionBroker::builder()
        .directory(Arc::new(FakeDirectory::with_tenants(tenants)))
        .pool(pool)
        .build()
        .expect("broker builds")
}

// ============================================================================
// SECTION: Builder Tests
// ============================================================================

#[test]
fn builder_fails_without_directory() {
    let result = ConnectionBroker::<FakePool>::builder().pool(FakePool::with_capacity(1)).build();
    assert!(matches!(result, Err(BrokerError::MissingDirectory)));
}

#[test]
fn builder_fails_without_pool() {
    let result = ConnectionBroker::<FakePool>::builder()
        .directory(Arc::new(FakeDirectory::with_tenants(&[])))
        .build();
    assert!(matches!(result, Err(BrokerError::MissingPool)));
}

// ============================================================================
// SECTION: Isolation Gate Tests
// ============================================================================

#[test]
fn unknown_tenant_rejected_without_borrowing() {
    let pool = FakePool::with_capacity(1);
    let broker = broker_with(&["alpha-test"], pool.clone());
    let calls = AtomicUsize::new(0);

    let result: Result<(), BrokerError> = broker.with_tenant_connection("ghost", |_handle| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    assert!(matches!(result, Err(BrokerError::IsolationViolation(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0, "operation must never run");
    assert_eq!(pool.connections_created(), 0, "no connection may be borrowed");
}

#[test]
fn isolation_violation_is_audited() {
    let pool = FakePool::with_capacity(1);
    let audit = Arc::new(MemorySink::new());
    let broker = ConnectionBroker::builder()
        .directory(Arc::new(FakeDirectory::with_tenants(&[])))
        .pool(pool)
        .audit(Arc::clone(&audit) as Arc<dyn tenancy_core::AuditSink>)
        .build()
        .expect("broker builds");

    let result: Result<(), BrokerError> =
        broker.with_tenant_connection("nonexistent-tenant", |_handle| Ok(()));

    assert!(matches!(result, Err(BrokerError::IsolationViolation(_))));
    let records = audit.snapshot();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, "isolation_violation");
    assert_eq!(records[0].entity_id, "nonexistent-tenant");
}

// ============================================================================
// SECTION: No-Leak Invariant Tests
// ============================================================================

#[test]
fn connection_returns_clean_after_success() {
    let pool = FakePool::with_capacity(1);
    let broker = broker_with(&["alpha-test"], pool.clone());

    let schema: Result<String, BrokerError> = broker
        .with_tenant_connection("alpha-test", |handle| Ok(handle.schema().as_str().to_string()));

    assert_eq!(schema.ok().as_deref(), Some("tenant_alpha-test"));
    pool.assert_all_idle_clean();
}

#[test]
fn sequential_tenants_reuse_one_clean_connection() {
    let pool = FakePool::with_capacity(1);
    let broker = broker_with(&["alpha-test", "beta-corp"], pool.clone());

    for tenant in ["alpha-test", "beta-corp", "alpha-test"] {
        let result: Result<(), BrokerError> = broker.with_tenant_connection(tenant, |handle| {
            assert_eq!(handle.connection().scope_state(), ScopeState::Scoped);
            Ok(())
        });
        assert!(result.is_ok());
        pool.assert_all_idle_clean();
    }

    assert_eq!(pool.connections_created(), 1, "single slot must be reused");
    assert!(pool.destroyed_ids().is_empty());
    let scopes: Vec<String> = pool.scope_log().into_iter().map(|(_, schema)| schema).collect();
    assert_eq!(
        scopes,
        vec!["tenant_alpha-test", "tenant_beta-corp", "tenant_alpha-test"]
    );
}

#[test]
fn no_leak_across_concurrent_tenants() {
    let pool = FakePool::with_capacity(4);
    let broker = Arc::new(broker_with(
        &["tenant-a", "tenant-b", "tenant-c", "tenant-d"],
        pool.clone(),
    ));

    std::thread::scope(|scope| {
        for tenant in ["tenant-a", "tenant-b", "tenant-c", "tenant-d"] {
            let broker = Arc::clone(&broker);
            scope.spawn(move || {
                for _ in 0 .. 25 {
                    let result: Result<(), BrokerError> =
                        broker.with_tenant_connection(tenant, |handle| {
                            assert!(
                                handle.schema().as_str().starts_with("tenant_"),
                                "operation must see its own namespace"
                            );
                            Ok(())
                        });
                    assert!(result.is_ok());
                }
            });
        }
    });

    pool.assert_all_idle_clean();
    assert!(pool.destroyed_ids().is_empty());
}

// ============================================================================
// SECTION: Cleanup Failure Tests
// ============================================================================

#[test]
fn reset_failure_destroys_connection() {
    let pool = FakePool::with_capacity(1);
    let broker = broker_with(&["alpha-test"], pool.clone());

    pool.inject_reset_failure();
    let result: Result<(), BrokerError> =
        broker.with_tenant_connection("alpha-test", |_handle| Ok(()));
    assert!(matches!(result, Err(BrokerError::Cleanup(_))));
    assert_eq!(pool.destroyed_ids(), vec![0], "contaminated connection must be destroyed");

    // The next borrow gets a fresh connection, never the contaminated one.
    let result: Result<(), BrokerError> =
        broker.with_tenant_connection("alpha-test", |_handle| Ok(()));
    assert!(result.is_ok());
    let borrowed: Vec<usize> = pool.scope_log().into_iter().map(|(id, _)| id).collect();
    assert_eq!(borrowed, vec![0, 1]);
    pool.assert_all_idle_clean();
}

#[test]
fn operation_error_propagates_after_cleanup() {
    let pool = FakePool::with_capacity(1);
    let broker = broker_with(&["alpha-test"], pool.clone());

    let result: Result<(), TestError> = broker
        .with_tenant_connection("alpha-test", |_handle| Err(TestError::App("boom".to_string())));

    assert!(matches!(result, Err(TestError::App(ref msg)) if msg == "boom"));
    pool.assert_all_idle_clean();
    assert!(pool.destroyed_ids().is_empty(), "clean reset must pool the connection");
}

#[test]
fn cleanup_failure_never_masks_operation_error() {
    let pool = FakePool::with_capacity(1);
    let broker = broker_with(&["alpha-test"], pool.clone());

    pool.inject_reset_failure();
    let result: Result<(), TestError> = broker
        .with_tenant_connection("alpha-test", |_handle| Err(TestError::App("boom".to_string())));

    assert!(
        matches!(result, Err(TestError::App(ref msg)) if msg == "boom"),
        "operation error must win over cleanup error"
    );
    assert_eq!(pool.destroyed_ids(), vec![0]);
}

#[test]
fn contamination_is_audited() {
    let pool = FakePool::with_capacity(1);
    let audit = Arc::new(MemorySink::new());
    let broker = ConnectionBroker::builder()
        .directory(Arc::new(FakeDirectory::with_tenants(&["alpha-test"])))
        .pool(pool.clone())
        .audit(Arc::clone(&audit) as Arc<dyn tenancy_core::AuditSink>)
        .build()
        .expect("broker builds");

    pool.inject_reset_failure();
    let result: Result<(), BrokerError> =
        broker.with_tenant_connection("alpha-test", |_handle| Ok(()));
    assert!(matches!(result, Err(BrokerError::Cleanup(_))));

    let records = audit.snapshot();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, "connection_contaminated");
    assert_eq!(records[0].tenant_id, Some("alpha-test".to_string()));
}

// ============================================================================
// SECTION: Unwind Safety Tests
// ============================================================================

#[test]
fn panicking_operation_still_resets_connection() {
    let pool = FakePool::with_capacity(1);
    let broker = broker_with(&["alpha-test"], pool.clone());

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let _result: Result<(), BrokerError> =
            broker.with_tenant_connection("alpha-test", |_handle| panic!("mid-operation abort"));
    }));

    assert!(outcome.is_err(), "panic must propagate");
    pool.assert_all_idle_clean();
    assert!(pool.destroyed_ids().is_empty());
}

#[test]
fn panicking_operation_with_failed_reset_destroys_connection() {
    let pool = FakePool::with_capacity(1);
    let broker = broker_with(&["alpha-test"], pool.clone());

    pool.inject_reset_failure();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let _result: Result<(), BrokerError> =
            broker.with_tenant_connection("alpha-test", |_handle| panic!("mid-operation abort"));
    }));

    assert!(outcome.is_err(), "panic must propagate");
    assert_eq!(pool.destroyed_ids(), vec![0]);
}
