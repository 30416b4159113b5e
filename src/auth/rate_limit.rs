use std::sync::Arc;

use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse, HttpResponseBuilder};
use chrono::Utc;
use tracing::{debug, warn};

use crate::config::RateLimitSettings;
use crate::error::AuthError;
use crate::store::{CounterSnapshot, CounterStore};

pub const KEY_PREFIX: &str = "rate-limit:";
pub const X_RATELIMIT_LIMIT: &str = "X-RateLimit-Limit";
pub const X_RATELIMIT_REMAINING: &str = "X-RateLimit-Remaining";
pub const X_RATELIMIT_RESET: &str = "X-RateLimit-Reset";

/// A named limit; the scope keeps each policy's counters apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatePolicy {
    pub scope: &'static str,
    pub limit: u32,
    pub window_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub login: RatePolicy,
    pub register: RatePolicy,
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login: RatePolicy {
                scope: "login",
                limit: 5,
                window_seconds: 15 * 60,
            },
            register: RatePolicy {
                scope: "register",
                limit: 10,
                window_seconds: 60,
            },
            trust_forwarded_for: false,
        }
    }
}

impl RateLimitConfig {
    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        Self {
            login: RatePolicy {
                scope: "login",
                limit: settings.login_limit,
                window_seconds: settings.login_window_seconds,
            },
            register: RatePolicy {
                scope: "register",
                limit: settings.default_limit,
                window_seconds: settings.default_window_seconds,
            },
            trust_forwarded_for: settings.trust_forwarded_for,
        }
    }
}

/// State of one client's window after counting the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub limit: u32,
    pub count: u64,
    pub remaining: u32,
    pub retry_after: u64,
    pub reset_at: i64,
}

impl RateWindow {
    fn new(limit: u32, window_seconds: u64, snapshot: CounterSnapshot) -> Self {
        let ttl = if snapshot.ttl_seconds == 0 {
            window_seconds
        } else {
            snapshot.ttl_seconds
        };
        let remaining = u64::from(limit).saturating_sub(snapshot.count) as u32;
        Self {
            limit,
            count: snapshot.count,
            remaining,
            retry_after: ttl,
            reset_at: Utc::now().timestamp() + ttl as i64,
        }
    }

    pub fn apply_headers(&self, builder: &mut HttpResponseBuilder) {
        builder
            .insert_header((X_RATELIMIT_LIMIT, self.limit.to_string()))
            .insert_header((X_RATELIMIT_REMAINING, self.remaining.to_string()))
            .insert_header((X_RATELIMIT_RESET, self.reset_at.to_string()));
    }

    /// The 429 answer for a client over its limit.
    pub fn rejection(&self) -> HttpResponse {
        HttpResponse::TooManyRequests()
            .insert_header((header::RETRY_AFTER, self.retry_after.to_string()))
            .insert_header((X_RATELIMIT_LIMIT, self.limit.to_string()))
            .insert_header((X_RATELIMIT_REMAINING, "0"))
            .insert_header((X_RATELIMIT_RESET, self.reset_at.to_string()))
            .json(serde_json::json!({ "message": "Too Many Requests" }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed(RateWindow),
    Limited(RateWindow),
    /// The store could not be reached; the request is let through unmetered.
    Bypassed,
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, RateDecision::Limited(_))
    }

    pub fn remaining(&self) -> Option<u32> {
        match self {
            RateDecision::Allowed(w) | RateDecision::Limited(w) => Some(w.remaining),
            RateDecision::Bypassed => None,
        }
    }

    pub fn apply_headers(&self, builder: &mut HttpResponseBuilder) {
        if let RateDecision::Allowed(w) | RateDecision::Limited(w) = self {
            w.apply_headers(builder);
        }
    }
}

/// Fixed-window limiter over a shared counter store.
///
/// A window starts with the first request for a key and lasts
/// `window_seconds`. Counts reset only when the store expires the key, so a
/// burst straddling two windows can see up to twice the limit. Store failures
/// fail open.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// The identity `req` is counted under.
    pub fn client_key(&self, req: &HttpRequest) -> String {
        client_key(req, self.config.trust_forwarded_for)
    }

    pub async fn check(&self, client_key: &str, limit: u32, window_seconds: u64) -> RateDecision {
        let key = format!("{}{}", KEY_PREFIX, client_key);
        match self.store.increment(&key, window_seconds).await {
            Ok(snapshot) => {
                let window = RateWindow::new(limit, window_seconds, snapshot);
                if snapshot.count > u64::from(limit) {
                    debug!(key = %key, count = snapshot.count, limit, "rate limit exceeded");
                    RateDecision::Limited(window)
                } else {
                    RateDecision::Allowed(window)
                }
            }
            Err(e) => {
                warn!(key = %key, error = %e, "rate limit store unavailable, allowing request");
                RateDecision::Bypassed
            }
        }
    }

    /// Counts one request under `policy`, failing with a 429-bearing error
    /// once the client is over the limit.
    pub async fn enforce(&self, client: &str, policy: &RatePolicy) -> Result<RateDecision, AuthError> {
        let key = format!("{}:{}", policy.scope, client);
        match self.check(&key, policy.limit, policy.window_seconds).await {
            RateDecision::Limited(window) => Err(AuthError::RateLimitExceeded(window)),
            decision => Ok(decision),
        }
    }
}

/// Client identifier: the peer IP, or the first `X-Forwarded-For` hop when
/// the deployment sits behind a proxy that sets it.
pub fn client_key(req: &HttpRequest, trust_forwarded_for: bool) -> String {
    let forwarded = || {
        req.headers()
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string)
    };

    trust_forwarded_for
        .then(forwarded)
        .flatten()
        .or_else(|| req.peer_addr().map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "anonymous".to_string())
}
