use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};

use super::{CounterSnapshot, CounterStore};
use crate::error::StoreError;

/// Expired windows are swept once the map grows past this many keys.
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug)]
struct Window {
    count: u64,
    expires_at: Instant,
}

impl Window {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    fn ttl_seconds(&self, now: Instant) -> u64 {
        let left = self.expires_at.saturating_duration_since(now).as_millis() as u64;
        (left + 999) / 1000
    }
}

/// In-process fixed-window counters for single-node runs and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryCounterStore {
    windows: Arc<RwLock<HashMap<String, Window>>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn purge_expired(&self) {
        let now = Instant::now();
        self.windows.write().await.retain(|_, w| !w.is_expired(now));
    }

    pub async fn len(&self) -> usize {
        self.windows.read().await.len()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, window_seconds: u64) -> Result<CounterSnapshot, StoreError> {
        let now = Instant::now();
        let mut windows = self.windows.write().await;

        if windows.len() > SWEEP_THRESHOLD {
            windows.retain(|_, w| !w.is_expired(now));
        }

        let window = windows.entry(key.to_string()).or_insert_with(|| Window {
            count: 0,
            expires_at: now,
        });
        if window.is_expired(now) {
            window.count = 0;
            window.expires_at = now + Duration::from_secs(window_seconds);
        }
        window.count += 1;

        Ok(CounterSnapshot {
            count: window.count,
            ttl_seconds: window.ttl_seconds(now),
        })
    }
}
