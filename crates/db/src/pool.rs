//! Bounded connection pool with scoped acquisition.
//!
//! Admission control is a fair `tokio::sync::Semaphore` holding `max_size`
//! permits: a task waits in FIFO order until a permit frees up, then takes an
//! idle connection or opens a new one. The permit and the connection travel
//! together in a [`ScopedConnection`] and go back to the pool when it drops,
//! whatever the exit path.
//!
//! Lifecycle: `Created → Draining → Closed`. [`Pool::destroy`] stops new
//! acquisitions, waits for every outstanding connection, then closes the idle
//! ones.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use schema::{Row, Value};
use tokio::sync::{Mutex as AsyncMutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use crate::{Connection, Connector, DbError, DriverError, ParamStyle, PoolConfig};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Where a pool is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Created,
    Draining,
    Closed,
}

impl PoolState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Created,
            1 => Self::Draining,
            _ => Self::Closed,
        }
    }
}

/// Point-in-time view of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub state: PoolState,
    pub max_size: usize,
    /// Open connections waiting in the pool.
    pub idle: usize,
    /// Slots currently held by [`ScopedConnection`]s.
    pub in_use: usize,
}

struct Pooled {
    id: u64,
    conn: Box<dyn Connection>,
}

struct Shared {
    connector: Box<dyn Connector>,
    max_size: usize,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Pooled>>,
    state: AtomicU8,
    next_id: AtomicU64,
    shutdown: AsyncMutex<()>,
}

impl Shared {
    fn state(&self) -> PoolState {
        PoolState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: PoolState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn idle(&self) -> MutexGuard<'_, Vec<Pooled>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Close every idle connection.
    async fn close_idle(&self) {
        let idle = std::mem::take(&mut *self.idle());
        for pooled in idle {
            if let Err(e) = pooled.conn.close().await {
                warn!(connection = pooled.id, "error while closing connection: {}", e);
            }
        }
    }

    async fn open(&self) -> Result<Pooled, DriverError> {
        let conn = self.connector.connect().await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(connection = id, "opened connection");
        Ok(Pooled { id, conn })
    }
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// Handle to a connection pool. Clones share the same pool.
#[derive(Clone)]
pub struct Pool {
    shared: Arc<Shared>,
}

impl Pool {
    /// Validate `config` and open `min_size` connections through `connector`.
    ///
    /// # Errors
    /// - [`DbError::InvalidConfig`] before any connection is attempted.
    /// - [`DbError::PoolInit`] if an initial connection cannot be opened.
    pub async fn create(
        config: &PoolConfig,
        connector: impl Connector + 'static,
    ) -> Result<Self, DbError> {
        config.validate()?;
        info!(
            "create database connection pool (host={}, port={}, min_size={}, max_size={})",
            config.host, config.port, config.min_size, config.max_size
        );

        let shared = Shared {
            connector: Box::new(connector),
            max_size: config.max_size,
            permits: Arc::new(Semaphore::new(config.max_size)),
            idle: Mutex::new(Vec::with_capacity(config.max_size)),
            state: AtomicU8::new(PoolState::Created as u8),
            next_id: AtomicU64::new(1),
            shutdown: AsyncMutex::new(()),
        };

        for _ in 0..config.min_size {
            match shared.open().await {
                Ok(pooled) => shared.idle().push(pooled),
                Err(e) => {
                    error!("failed to open initial connection: {}", e);
                    shared.close_idle().await;
                    return Err(DbError::PoolInit(e));
                }
            }
        }

        Ok(Self { shared: Arc::new(shared) })
    }

    /// Borrow a connection, waiting for a free slot if all `max_size` are
    /// taken.
    ///
    /// # Errors
    /// - [`DbError::PoolClosed`] once [`destroy`](Self::destroy) has begun.
    /// - [`DbError::Connect`] if a new connection had to be opened and failed.
    pub async fn acquire(&self) -> Result<ScopedConnection, DbError> {
        if self.shared.state() != PoolState::Created {
            return Err(DbError::PoolClosed);
        }

        let permit = self
            .shared
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DbError::PoolClosed)?;

        let reused = self.shared.idle().pop();
        let pooled = match reused {
            Some(pooled) => pooled,
            None => self.shared.open().await.map_err(DbError::Connect)?,
        };
        debug!(connection = pooled.id, "acquired connection");

        Ok(ScopedConnection {
            pooled: Some(pooled),
            in_flight: false,
            broken: false,
            shared: self.shared.clone(),
            _permit: permit,
        })
    }

    /// Stop new acquisitions, wait for every outstanding connection to come
    /// back, then close all connections. Calling it again is a no-op.
    pub async fn destroy(&self) {
        let _serial = self.shared.shutdown.lock().await;
        if self.shared.state() == PoolState::Closed {
            return;
        }

        self.shared.set_state(PoolState::Draining);
        info!("draining connection pool");

        let all = u32::try_from(self.shared.max_size).unwrap_or(u32::MAX);
        let drained = self.shared.permits.acquire_many(all).await;
        self.shared.permits.close();
        drop(drained);

        self.shared.close_idle().await;

        self.shared.set_state(PoolState::Closed);
        info!("connection pool closed");
    }

    pub fn state(&self) -> PoolState {
        self.shared.state()
    }

    pub fn status(&self) -> PoolStatus {
        let available = self.shared.permits.available_permits();
        PoolStatus {
            state: self.shared.state(),
            max_size: self.shared.max_size,
            idle: self.shared.idle().len(),
            in_use: self.shared.max_size.saturating_sub(available),
        }
    }

    /// Parameter marker expected by this pool's backend.
    pub fn param_style(&self) -> ParamStyle {
        self.shared.connector.param_style()
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool").field("status", &self.status()).finish()
    }
}

/// Destroy `pool` if one was ever created.
pub async fn destroy(pool: Option<&Pool>) {
    if let Some(pool) = pool {
        pool.destroy().await;
    }
}

// ---------------------------------------------------------------------------
// ScopedConnection
// ---------------------------------------------------------------------------

/// A connection borrowed from a [`Pool`].
///
/// Dropping it hands the connection back. If it is dropped while a statement
/// is still running (the task was cancelled) the connection is discarded
/// instead, and only the slot is returned.
pub struct ScopedConnection {
    pooled: Option<Pooled>,
    in_flight: bool,
    /// Set once a statement reports the connection lost.
    broken: bool,
    shared: Arc<Shared>,
    _permit: OwnedSemaphorePermit,
}

impl ScopedConnection {
    /// Pool-assigned connection id, stable across reuse.
    pub fn id(&self) -> u64 {
        self.pooled.as_ref().map_or(0, |p| p.id)
    }

    pub async fn fetch(
        &mut self,
        sql: &str,
        args: &[Value],
        limit: Option<usize>,
    ) -> Result<Vec<Row>, DriverError> {
        let Some(pooled) = self.pooled.as_mut() else {
            return Err(DriverError::Other("connection already released".into()));
        };
        self.in_flight = true;
        let result = pooled.conn.fetch(sql, args, limit).await;
        self.in_flight = false;
        self.note_failure(result.as_ref().err());
        result
    }

    pub async fn execute(&mut self, sql: &str, args: &[Value]) -> Result<u64, DriverError> {
        let Some(pooled) = self.pooled.as_mut() else {
            return Err(DriverError::Other("connection already released".into()));
        };
        self.in_flight = true;
        let result = pooled.conn.execute(sql, args).await;
        self.in_flight = false;
        self.note_failure(result.as_ref().err());
        result
    }

    fn note_failure(&mut self, error: Option<&DriverError>) {
        if error.is_some_and(DriverError::is_connection_lost) {
            self.broken = true;
        }
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        let Some(pooled) = self.pooled.take() else {
            return;
        };
        if self.in_flight {
            warn!(connection = pooled.id, "connection dropped mid-statement; discarding it");
            return;
        }
        if self.broken {
            warn!(connection = pooled.id, "connection lost; discarding it");
            return;
        }
        debug!(connection = pooled.id, "released connection");
        self.shared.idle().push(pooled);
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mock::MockConnector;

    fn config(min_size: usize, max_size: usize) -> PoolConfig {
        PoolConfig::new("root", "secret", "test").with_size(min_size, max_size)
    }

    #[tokio::test]
    async fn create_opens_min_size_connections() {
        let connector = MockConnector::new();
        let pool = Pool::create(&config(2, 5), connector.clone()).await.unwrap();

        assert_eq!(connector.opened(), 2);
        let status = pool.status();
        assert_eq!(status.state, PoolState::Created);
        assert_eq!((status.idle, status.in_use, status.max_size), (2, 0, 5));
    }

    #[tokio::test]
    async fn invalid_config_fails_before_connecting() {
        let connector = MockConnector::new();
        let mut bad = config(1, 1);
        bad.user = None;

        let err = Pool::create(&bad, connector.clone()).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidConfig(_)));
        assert_eq!(connector.opened(), 0);
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_pool_init_error() {
        let connector = MockConnector::new();
        connector.fail_connect("access denied for user 'root'");

        let err = Pool::create(&config(1, 2), connector).await.unwrap_err();
        assert!(matches!(err, DbError::PoolInit(_)));
        assert!(err.is_pool_init());
    }

    #[tokio::test]
    async fn partial_initialization_closes_opened_connections() {
        let connector = MockConnector::new();
        connector.fail_connect_after(2, "too many connections");

        let err = Pool::create(&config(3, 3), connector.clone()).await.unwrap_err();
        assert!(matches!(err, DbError::PoolInit(_)));
        assert_eq!(connector.opened(), 2);
        assert_eq!(connector.closed(), 2);
        assert_eq!(connector.discarded(), 0);
    }

    #[tokio::test]
    async fn lost_connection_is_replaced_on_next_acquire() {
        let connector = MockConnector::new();
        connector.push_disconnect("lost connection to server during query");
        let pool = Pool::create(&config(1, 1), connector.clone()).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let first = conn.id();
        let err = conn.execute("select 1", &[]).await.unwrap_err();
        assert!(err.is_connection_lost());
        drop(conn);

        assert_eq!(connector.discarded(), 1);
        assert_eq!(pool.status().idle, 0);

        for _ in 0..3 {
            let mut conn = pool.acquire().await.unwrap();
            assert_ne!(conn.id(), first);
            assert_eq!(conn.execute("select 1", &[]).await.unwrap(), 1);
        }
        assert_eq!(connector.opened(), 2);
    }

    #[tokio::test]
    async fn statement_errors_keep_the_connection() {
        let connector = MockConnector::new();
        connector.push_error("You have an error in your SQL syntax");
        let pool = Pool::create(&config(1, 1), connector.clone()).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let first = conn.id();
        assert!(conn.execute("selec 1", &[]).await.is_err());
        drop(conn);

        assert_eq!(pool.acquire().await.unwrap().id(), first);
        assert_eq!(connector.discarded(), 0);
    }

    #[tokio::test]
    async fn released_connection_is_reused() {
        let connector = MockConnector::new();
        let pool = Pool::create(&config(0, 3), connector.clone()).await.unwrap();

        let first = pool.acquire().await.unwrap().id();
        let second = pool.acquire().await.unwrap().id();

        assert_eq!(first, second);
        assert_eq!(connector.opened(), 1);
        assert_eq!(pool.status().idle, 1);
    }

    #[tokio::test]
    async fn acquisition_is_bounded_by_max_size() {
        let pool = Pool::create(&config(0, 2), MockConnector::new()).await.unwrap();

        let a = pool.acquire().await.unwrap();
        let _b = pool.acquire().await.unwrap();
        let a_id = a.id();

        let waiting = pool.clone();
        let waiter = tokio::spawn(async move { waiting.acquire().await.map(|c| c.id()) });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished(), "third acquisition should wait");
        assert_eq!(pool.status().in_use, 2);

        drop(a);
        let got = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be woken")
            .unwrap()
            .unwrap();
        assert_eq!(got, a_id, "waiter should take the released connection");
    }

    #[tokio::test]
    async fn waiters_are_served_in_fifo_order() {
        let pool = Pool::create(&config(1, 1), MockConnector::new()).await.unwrap();
        let held = pool.acquire().await.unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for label in ["first", "second", "third"] {
            let pool = pool.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let _conn = pool.acquire().await.unwrap();
                order.lock().unwrap().push(label);
            }));
            // Let the task enqueue before spawning the next one.
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        drop(held);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn cancelled_acquisition_does_not_leak_a_slot() {
        let pool = Pool::create(&config(1, 1), MockConnector::new()).await.unwrap();
        let held = pool.acquire().await.unwrap();

        let timed_out = tokio::time::timeout(Duration::from_millis(20), pool.acquire()).await;
        assert!(timed_out.is_err());

        drop(held);
        assert_eq!(pool.status().in_use, 0);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn cancelled_statement_discards_the_connection() {
        let connector = MockConnector::new();
        connector.set_latency(Duration::from_secs(5));
        let pool = Pool::create(&config(1, 1), connector.clone()).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), conn.execute("select 1", &[])).await;
        assert!(cancelled.is_err());
        drop(conn);

        assert_eq!(connector.discarded(), 1);
        let status = pool.status();
        assert_eq!((status.idle, status.in_use), (0, 0));
    }

    #[tokio::test]
    async fn destroy_waits_for_outstanding_connections() {
        let connector = MockConnector::new();
        let pool = Pool::create(&config(2, 2), connector.clone()).await.unwrap();
        let held = pool.acquire().await.unwrap();

        let closing = pool.clone();
        let destroyer = tokio::spawn(async move { closing.destroy().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!destroyer.is_finished(), "destroy must wait for the held connection");
        assert_eq!(pool.state(), PoolState::Draining);
        assert!(matches!(pool.acquire().await, Err(DbError::PoolClosed)));

        drop(held);
        destroyer.await.unwrap();
        assert_eq!(pool.state(), PoolState::Closed);
        assert_eq!(connector.closed(), 2);
    }

    #[tokio::test]
    async fn destroy_is_idempotent_and_optional() {
        let pool = Pool::create(&config(1, 1), MockConnector::new()).await.unwrap();
        pool.destroy().await;
        pool.destroy().await;
        assert_eq!(pool.state(), PoolState::Closed);

        destroy(None).await;
    }
}
