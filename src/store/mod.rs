//! Counter stores backing the rate limiter.
//!
//! The store owns the atomicity of increment-with-expiry; the limiter only
//! reads the resulting count and remaining TTL.

mod memory;
mod redis_store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::config::RateLimitSettings;
use crate::error::StoreError;

pub use self::memory::MemoryCounterStore;
pub use self::redis_store::RedisCounterStore;

/// Counter value after an increment, plus seconds until its window closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub count: u64,
    pub ttl_seconds: u64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increments `key`, arming a `window_seconds` expiry when the key is new.
    async fn increment(&self, key: &str, window_seconds: u64) -> Result<CounterSnapshot, StoreError>;
}

pub fn from_settings(settings: &RateLimitSettings) -> Result<Arc<dyn CounterStore>, StoreError> {
    if settings.store_url.trim().is_empty() {
        warn!("no rate limit store configured; counters are local to this process");
        return Ok(Arc::new(MemoryCounterStore::new()));
    }

    let store = RedisCounterStore::open(
        &settings.store_url,
        settings.store_token.as_deref(),
        Duration::from_millis(settings.timeout_ms),
    )?;
    Ok(Arc::new(store))
}
