//! In-memory store with lazy TTL expiry.
//!
//! Mirrors the Redis backend's observable behaviour so the façade can be
//! exercised without a running server:
//! - Sets hold unique members and report added/removed counts like `SADD`/`SREM`
//! - Logs grow at the head, and every append resets the whole log's expiry
//! - Negative log indices count from the tail, like `LINDEX`

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{broadcast, watch, RwLock};

use relaystore_core::store::{
    resolve_index, ChannelMessage, EventLog, HealthStatus, Result, SetStore, StoreBackend,
    StoreError,
};

/// A single log with its expiry deadline.
#[derive(Debug, Clone, Default)]
struct LogEntry {
    items: VecDeque<String>,
    expires_at: Option<Instant>,
}

impl LogEntry {
    /// Returns true if this log has expired.
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() >= exp)
    }
}

/// In-memory store backend.
///
/// Thread-safe store using `Arc<RwLock<..>>` maps. Expired logs are dropped
/// lazily: reads drop the key they touch, and every append sweeps all
/// expired logs, so abandoned channels do not accumulate.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    sets: Arc<RwLock<HashMap<String, HashSet<String>>>>,
    logs: Arc<RwLock<HashMap<String, LogEntry>>>,
    pub(super) channels: Arc<RwLock<HashMap<String, broadcast::Sender<ChannelMessage>>>>,
    pub(super) shutdown_tx: broadcast::Sender<()>,
    status_tx: Arc<watch::Sender<HealthStatus>>,
    closed: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Creates an empty store. It reports itself healthy immediately.
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let (status_tx, _) = watch::channel(HealthStatus::Healthy);
        Self {
            sets: Arc::new(RwLock::new(HashMap::new())),
            logs: Arc::new(RwLock::new(HashMap::new())),
            channels: Arc::new(RwLock::new(HashMap::new())),
            shutdown_tx,
            status_tx: Arc::new(status_tx),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(super) fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::ShutDown);
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SetStore for MemoryStore {
    async fn add_member(&self, set: &str, item: &str) -> Result<u64> {
        self.ensure_open()?;
        let mut sets = self.sets.write().await;
        let added = sets
            .entry(set.to_string())
            .or_default()
            .insert(item.to_string());
        Ok(u64::from(added))
    }

    async fn is_member(&self, set: &str, item: &str) -> Result<bool> {
        self.ensure_open()?;
        let sets = self.sets.read().await;
        Ok(sets.get(set).is_some_and(|members| members.contains(item)))
    }

    async fn members(&self, set: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        let sets = self.sets.read().await;
        Ok(sets
            .get(set)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn remove_member(&self, set: &str, item: &str) -> Result<u64> {
        self.ensure_open()?;
        let mut sets = self.sets.write().await;
        let Some(members) = sets.get_mut(set) else {
            return Ok(0);
        };
        let removed = members.remove(item);
        // Redis deletes a set once its last member is gone
        if members.is_empty() {
            sets.remove(set);
        }
        Ok(u64::from(removed))
    }
}

#[async_trait]
impl EventLog for MemoryStore {
    async fn push_with_ttl(&self, log: &str, entry: &str, ttl: Duration) -> Result<u64> {
        self.ensure_open()?;
        let mut logs = self.logs.write().await;
        logs.retain(|_, slot| !slot.is_expired());

        let slot = logs.entry(log.to_string()).or_default();
        slot.items.push_front(entry.to_string());
        slot.expires_at = Some(Instant::now() + ttl);

        Ok(slot.items.len() as u64)
    }

    async fn index(&self, log: &str, index: isize) -> Result<Option<String>> {
        self.ensure_open()?;
        let mut logs = self.logs.write().await;

        if logs.get(log).is_some_and(LogEntry::is_expired) {
            logs.remove(log);
            return Ok(None);
        }

        Ok(logs.get(log).and_then(|slot| {
            resolve_index(slot.items.len(), index)
                .and_then(|i| slot.items.get(i))
                .cloned()
        }))
    }

    async fn range_all(&self, log: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        let mut logs = self.logs.write().await;

        if logs.get(log).is_some_and(LogEntry::is_expired) {
            logs.remove(log);
            return Ok(Vec::new());
        }

        Ok(logs
            .get(log)
            .map(|slot| slot.items.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl StoreBackend for MemoryStore {
    fn health(&self) -> watch::Receiver<HealthStatus> {
        self.status_tx.subscribe()
    }

    async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.shutdown_tx.send(());
        self.status_tx.send_replace(HealthStatus::ShutDown);
        tracing::info!("In-memory store shut down");
    }
}
