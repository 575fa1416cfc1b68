//! Failover session pool.
//!
//! One engine exists per configured replica. A selection sticks for 60
//! seconds to bound replica churn; a failed liveness probe clears the
//! sticky slot so the next selection re-randomizes. Acquisition retries
//! across fresh selections up to 10 times before reporting the replica
//! set unavailable.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use tokio_postgres::NoTls;
use tracing::{debug, error, warn};

use ballast_core::config::{DatabaseConfig, ReplicaConfig};

use crate::error::{DbError, DbResult};

/// How long a sticky engine selection is reused before re-randomizing.
const STICKY_WINDOW: Duration = Duration::from_secs(60);

/// Total acquisition attempts before reporting unavailable.
const ACQUIRE_ATTEMPTS: u32 = 10;

/// Opens a probed session against one replica. The seam exists so
/// selection and retry behavior is testable without a database server.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: Send;

    /// Connect and verify liveness; a session returned here is ready
    /// for queries.
    async fn connect(&self, conninfo: &str) -> DbResult<Self::Session>;
}

/// A live database session. Dropping it terminates the connection task.
pub struct PgSession {
    pub client: tokio_postgres::Client,
    connection: tokio::task::JoinHandle<()>,
}

impl Drop for PgSession {
    fn drop(&mut self) {
        self.connection.abort();
    }
}

/// Production connector: tokio-postgres plus a `SELECT 1` probe.
pub struct PgConnector;

#[async_trait]
impl Connector for PgConnector {
    type Session = PgSession;

    async fn connect(&self, conninfo: &str) -> DbResult<PgSession> {
        let (client, connection) = tokio_postgres::connect(conninfo, NoTls)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;
        let handle = tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "database connection closed");
            }
        });
        let session = PgSession {
            client,
            connection: handle,
        };
        session
            .client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;
        Ok(session)
    }
}

struct Sticky {
    index: usize,
    selected_at: Instant,
}

struct PoolState {
    /// Engine connection strings, built lazily on first selection.
    engines: Option<Vec<String>>,
    sticky: Option<Sticky>,
}

/// Failover-aware session pool. Constructed once and shared by
/// reference with every caller; there are no globals.
pub struct FailoverPool<C: Connector> {
    connector: C,
    replicas: Vec<ReplicaConfig>,
    sticky_window: Duration,
    state: Mutex<PoolState>,
}

impl<C: Connector> FailoverPool<C> {
    pub fn new(config: &DatabaseConfig, connector: C) -> Self {
        Self {
            connector,
            replicas: config.replicas.clone(),
            sticky_window: STICKY_WINDOW,
            state: Mutex::new(PoolState {
                engines: None,
                sticky: None,
            }),
        }
    }

    /// Override the sticky window (for testing).
    pub fn with_sticky_window(mut self, window: Duration) -> Self {
        self.sticky_window = window;
        self
    }

    /// The replica index currently cached as sticky (for diagnostics).
    pub fn sticky_replica(&self) -> Option<usize> {
        let state = self.state.lock().expect("pool state poisoned");
        state.sticky.as_ref().map(|s| s.index)
    }

    /// Clear the sticky slot so the next selection re-randomizes.
    pub fn invalidate(&self) {
        self.state.lock().expect("pool state poisoned").sticky = None;
    }

    /// Select an engine: reuse the sticky choice while it is fresh
    /// (refreshing its timestamp), otherwise pick uniformly at random.
    fn select(&self) -> DbResult<(usize, String)> {
        let mut guard = self.state.lock().expect("pool state poisoned");
        let state = &mut *guard;

        let engines = state
            .engines
            .get_or_insert_with(|| self.replicas.iter().map(|r| r.conninfo()).collect());
        if engines.is_empty() {
            return Err(DbError::NoReplicas);
        }

        let now = Instant::now();
        if let Some(sticky) = state.sticky.as_mut() {
            if now.duration_since(sticky.selected_at) < self.sticky_window {
                sticky.selected_at = now;
                return Ok((sticky.index, engines[sticky.index].clone()));
            }
        }

        let index = rand::rng().random_range(0..engines.len());
        state.sticky = Some(Sticky {
            index,
            selected_at: now,
        });
        Ok((index, engines[index].clone()))
    }

    /// Acquire a live session, failing over across replicas.
    ///
    /// The caller owns the returned session and is responsible for
    /// releasing it (dropping it) when done.
    pub async fn acquire(&self) -> DbResult<C::Session> {
        for attempt in 1..=ACQUIRE_ATTEMPTS {
            let (index, conninfo) = self.select()?;
            match self.connector.connect(&conninfo).await {
                Ok(session) => {
                    debug!(replica = index, attempt, "database session acquired");
                    return Ok(session);
                }
                Err(e) => {
                    warn!(replica = index, attempt, error = %e, "could not connect to replica");
                    self.invalidate();
                }
            }
        }
        error!(
            attempts = ACQUIRE_ATTEMPTS,
            "could not connect to any database replica"
        );
        Err(DbError::Unavailable(ACQUIRE_ATTEMPTS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn replica(host: &str) -> ReplicaConfig {
        ReplicaConfig {
            host: host.to_string(),
            port: 5432,
            username: "lbaas".to_string(),
            password: "secret".to_string(),
            schema: "lbaas".to_string(),
            params: None,
        }
    }

    fn config(hosts: &[&str]) -> DatabaseConfig {
        DatabaseConfig {
            replicas: hosts.iter().map(|h| replica(h)).collect(),
        }
    }

    /// Succeeds after a configurable number of failures, returning the
    /// conninfo it connected to.
    struct FakeConnector {
        fail_first: u32,
        attempts: AtomicU32,
    }

    impl FakeConnector {
        fn reliable() -> Self {
            Self {
                fail_first: 0,
                attempts: AtomicU32::new(0),
            }
        }

        fn failing_first(n: u32) -> Self {
            Self {
                fail_first: n,
                attempts: AtomicU32::new(0),
            }
        }

        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        type Session = String;

        async fn connect(&self, conninfo: &str) -> DbResult<String> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.fail_first {
                return Err(DbError::Connection("probe failed".to_string()));
            }
            Ok(conninfo.to_string())
        }
    }

    #[tokio::test]
    async fn empty_replica_set_is_an_error() {
        let pool = FailoverPool::new(&config(&[]), FakeConnector::reliable());
        assert!(matches!(pool.acquire().await, Err(DbError::NoReplicas)));
    }

    #[tokio::test]
    async fn acquisitions_within_the_window_stick_to_one_engine() {
        let pool = FailoverPool::new(&config(&["db1", "db2", "db3"]), FakeConnector::reliable());

        let first = pool.acquire().await.unwrap();
        for _ in 0..20 {
            let next = pool.acquire().await.unwrap();
            assert_eq!(next, first);
        }
    }

    #[tokio::test]
    async fn expired_window_re_randomizes() {
        let pool = FailoverPool::new(&config(&["db1", "db2"]), FakeConnector::reliable())
            .with_sticky_window(Duration::ZERO);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            seen.insert(pool.acquire().await.unwrap());
        }
        // With a zero window every selection re-randomizes, so both
        // replicas show up.
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn probe_failure_clears_the_sticky_choice() {
        let pool = FailoverPool::new(&config(&["db1", "db2"]), FakeConnector::failing_first(1));

        let session = pool.acquire().await.unwrap();
        assert!(session.starts_with("host=db"));
        // One failed probe plus one success.
        assert_eq!(pool.connector.attempts(), 2);
        assert!(pool.sticky_replica().is_some());
    }

    #[tokio::test]
    async fn invalidate_clears_sticky() {
        let pool = FailoverPool::new(&config(&["db1"]), FakeConnector::reliable());
        pool.acquire().await.unwrap();
        assert_eq!(pool.sticky_replica(), Some(0));
        pool.invalidate();
        assert_eq!(pool.sticky_replica(), None);
    }

    #[tokio::test]
    async fn ten_failures_report_unavailable() {
        let pool = FailoverPool::new(&config(&["db1", "db2"]), FakeConnector::failing_first(u32::MAX));
        match pool.acquire().await {
            Err(DbError::Unavailable(attempts)) => assert_eq!(attempts, 10),
            other => panic!("expected unavailable, got {other:?}"),
        }
        assert_eq!(pool.connector.attempts(), 10);
    }

    #[tokio::test]
    async fn retries_stop_at_first_success() {
        let pool = FailoverPool::new(&config(&["db1"]), FakeConnector::failing_first(3));
        assert!(pool.acquire().await.is_ok());
        assert_eq!(pool.connector.attempts(), 4);
    }
}
