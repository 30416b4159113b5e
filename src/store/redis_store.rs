use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;

use super::{CounterSnapshot, CounterStore};
use crate::error::StoreError;

/// Redis-backed counters using `INCR` + `EXPIRE`.
///
/// The connection is opened lazily and dropped after any failure so the next
/// request reconnects. Every round trip is bounded by `timeout`.
pub struct RedisCounterStore {
    client: Client,
    conn: Mutex<Option<MultiplexedConnection>>,
    timeout: Duration,
}

impl RedisCounterStore {
    pub fn open(url: &str, token: Option<&str>, timeout: Duration) -> Result<Self, StoreError> {
        let url = connection_url(url, token)?;
        let client = Client::open(url.as_str())?;
        Ok(Self {
            client,
            conn: Mutex::new(None),
            timeout,
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        let mut slot = self.conn.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        let conn = timeout(self.timeout, self.client.get_multiplexed_async_connection())
            .await
            .map_err(|_| StoreError::Timeout(self.timeout_ms()))??;
        debug!("connected to rate limit store");
        *slot = Some(conn.clone());
        Ok(conn)
    }

    async fn reset(&self) {
        self.conn.lock().await.take();
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

async fn incr_with_ttl(
    mut conn: MultiplexedConnection,
    key: String,
    window_seconds: u64,
) -> redis::RedisResult<CounterSnapshot> {
    let count: u64 = redis::cmd("INCR").arg(&key).query_async(&mut conn).await?;
    if count == 1 {
        let _: () = redis::cmd("EXPIRE")
            .arg(&key)
            .arg(window_seconds)
            .query_async(&mut conn)
            .await?;
        return Ok(CounterSnapshot {
            count,
            ttl_seconds: window_seconds,
        });
    }

    let ttl: i64 = redis::cmd("TTL").arg(&key).query_async(&mut conn).await?;
    let ttl_seconds = if ttl < 0 {
        // The key outlived a lost EXPIRE; re-arm it so it cannot count forever.
        let _: () = redis::cmd("EXPIRE")
            .arg(&key)
            .arg(window_seconds)
            .query_async(&mut conn)
            .await?;
        window_seconds
    } else {
        ttl as u64
    };

    Ok(CounterSnapshot { count, ttl_seconds })
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str, window_seconds: u64) -> Result<CounterSnapshot, StoreError> {
        let conn = self.connection().await?;
        match timeout(self.timeout, incr_with_ttl(conn, key.to_string(), window_seconds)).await {
            Ok(Ok(snapshot)) => Ok(snapshot),
            Ok(Err(e)) => {
                warn!(error = %e, "rate limit store command failed");
                self.reset().await;
                Err(e.into())
            }
            Err(_) => {
                self.reset().await;
                Err(StoreError::Timeout(self.timeout_ms()))
            }
        }
    }
}

/// Folds an optional access token into the URL's password slot.
fn connection_url(url: &str, token: Option<&str>) -> Result<Url, StoreError> {
    let mut parsed = Url::parse(url)
        .map_err(|e| StoreError::InvalidConfig(format!("store url: {}", e)))?;
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        parsed
            .set_password(Some(token))
            .map_err(|_| StoreError::InvalidConfig("store url cannot carry a token".into()))?;
    }
    Ok(parsed)
}
