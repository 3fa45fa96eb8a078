//! Redis store implementation.
//!
//! Every command goes through one shared `ConnectionManager`, created on
//! first use and cloned per call. Cloning is cheap: all clones multiplex
//! over the same connection, and the manager re-establishes it after a
//! drop. Subscriptions are the exception, since a connection in subscriber
//! mode cannot issue regular commands; each one opens its own (see
//! `pubsub.rs`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use tokio::sync::{broadcast, watch, OnceCell};
use tokio::task::JoinHandle;

use relaystore_core::store::{
    EventLog, HealthStatus, Result, SetStore, StoreBackend, StoreError,
};

use super::error::map_redis_error;
use super::health::run_health_supervisor;
use crate::config::StoreConfig;

/// State shared between the store handle and its background tasks.
pub(super) struct Shared {
    pub(super) client: redis::Client,
    conn: OnceCell<ConnectionManager>,
    pub(super) connect_timeout: Duration,
    pub(super) status_tx: watch::Sender<HealthStatus>,
    pub(super) shutdown_tx: broadcast::Sender<()>,
    closed: AtomicBool,
}

impl Shared {
    /// Acquires the shared connection, establishing it on first use.
    ///
    /// Each attempt is a single bounded dial: the manager does not retry
    /// on its own, so an outage surfaces as `ConnectionFailed` right away
    /// and the health supervisor owns the backoff. A failed attempt leaves
    /// the cell empty, so the next call dials again.
    pub(super) async fn connection(&self) -> Result<ConnectionManager> {
        self.ensure_open()?;
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let config = ConnectionManagerConfig::new()
                    .set_number_of_retries(0)
                    .set_connection_timeout(self.connect_timeout);
                let conn =
                    ConnectionManager::new_with_config(self.client.clone(), config).await?;
                tracing::info!("Connected to Redis database");
                Ok::<_, redis::RedisError>(conn)
            })
            .await
            .map_err(|e| {
                let err = map_redis_error(e);
                tracing::error!(error = %err, "Failed to connect to Redis");
                err
            })?;
        Ok(conn.clone())
    }

    pub(super) fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::ShutDown);
        }
        Ok(())
    }

    /// Marks the store closed and signals every background task.
    ///
    /// Returns false if the store was already closed.
    fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _ = self.shutdown_tx.send(());
        true
    }
}

/// Redis store backend using a lazily created connection manager.
pub struct RedisStore {
    pub(super) shared: Arc<Shared>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl RedisStore {
    /// Creates a Redis store and starts its health supervisor.
    ///
    /// No connection is made here; the first command (or the first health
    /// check, whichever comes first) establishes it. Must be called from
    /// within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ConnectionFailed` if the configured URL is invalid.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        Self::with_url(&config.redis_url(), config)
    }

    /// Creates a Redis store for `url`, taking timeouts and supervision
    /// settings from `config`.
    pub fn with_url(url: &str, config: &StoreConfig) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;
        let (status_tx, _) = watch::channel(HealthStatus::Connecting);
        let (shutdown_tx, _) = broadcast::channel(1);

        let shared = Arc::new(Shared {
            client,
            conn: OnceCell::new(),
            connect_timeout: config.connection_timeout(),
            status_tx,
            shutdown_tx,
            closed: AtomicBool::new(false),
        });

        let supervisor = tokio::spawn(run_health_supervisor(
            Arc::clone(&shared),
            config.health_check_interval(),
            config.backoff_policy(),
        ));

        tracing::debug!(url, "Created Redis store");
        Ok(Self {
            shared,
            supervisor: Mutex::new(Some(supervisor)),
        })
    }

    fn take_supervisor(&self) -> Option<JoinHandle<()>> {
        match self.supervisor.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

impl Drop for RedisStore {
    fn drop(&mut self) {
        if self.shared.close() {
            tracing::debug!("Redis store dropped without shutdown; stopping background tasks");
        }
    }
}

#[async_trait]
impl SetStore for RedisStore {
    async fn add_member(&self, set: &str, item: &str) -> Result<u64> {
        let mut conn = self.shared.connection().await?;
        conn.sadd(set, item).await.map_err(map_redis_error)
    }

    async fn is_member(&self, set: &str, item: &str) -> Result<bool> {
        let mut conn = self.shared.connection().await?;
        conn.sismember(set, item).await.map_err(map_redis_error)
    }

    async fn members(&self, set: &str) -> Result<Vec<String>> {
        let mut conn = self.shared.connection().await?;
        conn.smembers(set).await.map_err(map_redis_error)
    }

    async fn remove_member(&self, set: &str, item: &str) -> Result<u64> {
        let mut conn = self.shared.connection().await?;
        conn.srem(set, item).await.map_err(map_redis_error)
    }
}

#[async_trait]
impl EventLog for RedisStore {
    async fn push_with_ttl(&self, log: &str, entry: &str, ttl: Duration) -> Result<u64> {
        let mut conn = self.shared.connection().await?;
        let millis = expiry_millis(ttl);

        // MULTI/EXEC so the append and the expiry reset land together.
        // A zero lifetime deletes the log, like `EXPIRE key 0`.
        let (len, _applied): (u64, i64) = redis::pipe()
            .atomic()
            .lpush(log, entry)
            .pexpire(log, millis)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        Ok(len)
    }

    async fn index(&self, log: &str, index: isize) -> Result<Option<String>> {
        let mut conn = self.shared.connection().await?;
        conn.lindex(log, index).await.map_err(map_redis_error)
    }

    async fn range_all(&self, log: &str) -> Result<Vec<String>> {
        let mut conn = self.shared.connection().await?;
        conn.lrange(log, 0, -1).await.map_err(map_redis_error)
    }
}

/// Converts a log lifetime to the millisecond argument of `PEXPIRE`.
fn expiry_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl StoreBackend for RedisStore {
    fn health(&self) -> watch::Receiver<HealthStatus> {
        self.shared.status_tx.subscribe()
    }

    async fn shutdown(&self) {
        if !self.shared.close() {
            return;
        }
        if let Some(supervisor) = self.take_supervisor() {
            // The supervisor exits on the shutdown signal
            let _ = supervisor.await;
        }
        self.shared.status_tx.send_replace(HealthStatus::ShutDown);
        tracing::info!("Redis store shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Helper to get Redis URL from environment.
    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
    }

    /// Skip test if Redis not available.
    async fn get_test_store() -> Option<RedisStore> {
        let store = RedisStore::with_url(&redis_url(), &StoreConfig::default()).ok()?;
        tokio::time::timeout(Duration::from_secs(1), store.shared.connection())
            .await
            .ok()?
            .ok()?;
        Some(store)
    }

    /// URL of a local port nothing is listening on.
    fn closed_port_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("redis://127.0.0.1:{}/", port)
    }

    /// Generate a unique test key to avoid conflicts.
    fn test_key(suffix: &str) -> String {
        format!("test:redis_store:{}:{}", Uuid::new_v4(), suffix)
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let result = RedisStore::with_url("not a url", &StoreConfig::default());
        assert!(matches!(result, Err(StoreError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_fast_and_degrades() {
        let config = StoreConfig {
            connection_timeout_ms: 1_000,
            ..StoreConfig::default()
        };
        let store = RedisStore::with_url(&closed_port_url(), &config).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), store.add_member("set", "item"))
            .await
            .expect("command should fail instead of waiting on retries");
        assert!(matches!(result, Err(StoreError::ConnectionFailed(_))));

        let mut health = store.health();
        let degraded = tokio::time::timeout(
            Duration::from_secs(5),
            health.wait_for(|status| matches!(status, HealthStatus::Degraded { .. })),
        )
        .await
        .map(|changed| changed.is_ok())
        .unwrap_or(false);
        assert!(degraded, "health status should report the outage");

        store.shutdown().await;
        assert_eq!(*store.health().borrow(), HealthStatus::ShutDown);
    }

    #[test]
    fn test_expiry_millis() {
        assert_eq!(expiry_millis(Duration::ZERO), 0);
        assert_eq!(expiry_millis(Duration::from_millis(1_500)), 1_500);
        assert_eq!(expiry_millis(Duration::MAX), i64::MAX);
    }

    #[tokio::test]
    async fn test_redis_set_membership() {
        let Some(store) = get_test_store().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        let set = test_key("set");

        assert_eq!(store.add_member(&set, "alice").await.unwrap(), 1);
        assert_eq!(store.add_member(&set, "alice").await.unwrap(), 0);
        assert!(store.is_member(&set, "alice").await.unwrap());
        assert_eq!(store.members(&set).await.unwrap(), vec!["alice".to_string()]);

        assert_eq!(store.remove_member(&set, "alice").await.unwrap(), 1);
        assert!(!store.is_member(&set, "alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_redis_push_and_read_log() {
        let Some(store) = get_test_store().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        let log = test_key("log");
        let ttl = Duration::from_secs(60);

        assert_eq!(store.push_with_ttl(&log, "a", ttl).await.unwrap(), 1);
        assert_eq!(store.push_with_ttl(&log, "b", ttl).await.unwrap(), 2);

        assert_eq!(
            store.range_all(&log).await.unwrap(),
            vec!["b".to_string(), "a".to_string()]
        );
        assert_eq!(store.index(&log, -1).await.unwrap().as_deref(), Some("a"));
        assert_eq!(store.index(&log, -5).await.unwrap(), None);

        let mut conn = store.shared.connection().await.unwrap();
        conn.del::<_, ()>(&log).await.unwrap();
    }

    #[tokio::test]
    async fn test_redis_push_sets_ttl() {
        let Some(store) = get_test_store().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        let log = test_key("ttl");

        store
            .push_with_ttl(&log, "expiring", Duration::from_millis(500))
            .await
            .unwrap();
        assert_eq!(store.range_all(&log).await.unwrap().len(), 1);

        // Wait for expiration
        tokio::time::sleep(Duration::from_millis(800)).await;

        let mut conn = store.shared.connection().await.unwrap();
        let exists: bool = conn.exists(&log).await.unwrap();
        assert!(!exists);
    }

    #[tokio::test]
    async fn test_redis_zero_ttl_deletes_log() {
        let Some(store) = get_test_store().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        let log = test_key("zero_ttl");

        let len = store
            .push_with_ttl(&log, "gone", Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(len, 1);
        assert!(store.range_all(&log).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_redis_shutdown() {
        let Some(store) = get_test_store().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        let health = store.health();
        store.shutdown().await;

        assert_eq!(*health.borrow(), HealthStatus::ShutDown);
        assert_eq!(
            store.members(&test_key("closed")).await,
            Err(StoreError::ShutDown)
        );
    }
}
