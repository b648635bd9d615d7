//! Anti-abuse middleware for the store API
//!
//! - Optionally blocks CLI and crawler user agents
//! - Optionally requires the X-SayIt-Client header that app builds send
//! - Rate limits writes per player (X-SayIt-Player header or `player` query)

use axum::{
    body::Body,
    extract::State,
    http::{header, Method, Request, Response, StatusCode},
    middleware::Next,
    response::IntoResponse,
};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

use crate::state::AppState;

pub const CLIENT_HEADER: &str = "x-sayit-client";
pub const PLAYER_HEADER: &str = "x-sayit-player";

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter per key
#[derive(Debug, Clone)]
pub struct RateLimiter {
    windows: Arc<RwLock<HashMap<String, Window>>>,
    max_requests: u32,
    window: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(60, Duration::from_secs(10))
    }
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    /// Count one request for `key`; false once the window is used up
    pub async fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.write().await;
        let entry = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }
        if entry.count >= self.max_requests {
            return false;
        }
        entry.count += 1;
        true
    }

    /// Forget keys idle for more than two windows
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let horizon = self.window * 2;
        self.windows
            .write()
            .await
            .retain(|_, w| now.duration_since(w.started) < horizon);
    }

    pub async fn tracked_keys(&self) -> usize {
        self.windows.read().await.len()
    }
}

#[derive(Debug, Clone)]
pub struct AbuseConfig {
    pub block_user_agents: bool,
    pub require_client_header: bool,
    /// None = disabled
    pub rate_limiter: Option<RateLimiter>,
}

impl Default for AbuseConfig {
    fn default() -> Self {
        Self {
            block_user_agents: true,
            require_client_header: false,
            rate_limiter: Some(RateLimiter::default()),
        }
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => !matches!(v.trim().to_lowercase().as_str(), "0" | "false" | "off"),
        Err(_) => default,
    }
}

fn env_number<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl AbuseConfig {
    pub fn disabled() -> Self {
        Self {
            block_user_agents: false,
            require_client_header: false,
            rate_limiter: None,
        }
    }

    /// ABUSE_BLOCK_USER_AGENTS, ABUSE_REQUIRE_CLIENT_HEADER, ABUSE_RATE_LIMIT,
    /// ABUSE_RATE_LIMIT_MAX and ABUSE_RATE_LIMIT_WINDOW (seconds)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let config = Self {
            block_user_agents: env_flag("ABUSE_BLOCK_USER_AGENTS", defaults.block_user_agents),
            require_client_header: env_flag(
                "ABUSE_REQUIRE_CLIENT_HEADER",
                defaults.require_client_header,
            ),
            rate_limiter: env_flag("ABUSE_RATE_LIMIT", true).then(|| {
                RateLimiter::new(
                    env_number("ABUSE_RATE_LIMIT_MAX", 60),
                    Duration::from_secs(env_number("ABUSE_RATE_LIMIT_WINDOW", 10)),
                )
            }),
        };

        tracing::info!(
            block_user_agents = config.block_user_agents,
            require_client_header = config.require_client_header,
            rate_limit = config.rate_limiter.is_some(),
            "Anti-abuse config loaded"
        );
        config
    }
}

/// HTTP libraries and scrapers; app builds send their own agent
const BLOCKED_AGENT_MARKERS: &[&str] = &[
    "curl",
    "wget",
    "httpie",
    "python-requests",
    "python-urllib",
    "go-http-client",
    "bot/",
    "spider",
    "crawler",
];

fn is_blocked_user_agent(user_agent: &str) -> bool {
    let agent = user_agent.to_lowercase();
    agent.ends_with("bot") || BLOCKED_AGENT_MARKERS.iter().any(|m| agent.contains(m))
}

/// Player the request acts for, used as the rate-limit key
fn rate_limit_key(request: &Request<Body>) -> Option<String> {
    if let Some(player) = request
        .headers()
        .get(PLAYER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        return Some(format!("player:{}", player));
    }
    request.uri().query().and_then(|query| {
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix("player="))
            .filter(|player| !player.is_empty())
            .map(|player| format!("player:{}", player))
    })
}

fn forbidden() -> Response<Body> {
    (StatusCode::FORBIDDEN, "Access denied").into_response()
}

fn rate_limited() -> Response<Body> {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, "10")],
        "Rate limit exceeded. Please slow down.",
    )
        .into_response()
}

/// Anti-abuse checks for API and change-feed requests.
/// Only writes and socket upgrades count against the rate limit.
pub async fn abuse_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let config = &state.abuse;

    if config.block_user_agents {
        match request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|ua| ua.to_str().ok())
        {
            Some(ua) if is_blocked_user_agent(ua) => {
                tracing::warn!(user_agent = ua, "Blocked suspicious user agent");
                return forbidden();
            }
            Some(_) => {}
            None => {
                tracing::warn!("Blocked request with no User-Agent");
                return forbidden();
            }
        }
    }

    if config.require_client_header && !request.headers().contains_key(CLIENT_HEADER) {
        tracing::warn!(uri = %request.uri(), "Blocked request without client header");
        return forbidden();
    }

    let is_counted = request.method() != Method::GET || request.uri().path() == "/ws";
    if let (Some(rate_limiter), true) = (&config.rate_limiter, is_counted) {
        if let Some(key) = rate_limit_key(&request) {
            if !rate_limiter.check(&key).await {
                tracing::warn!(key, "Rate limited");
                return rate_limited();
            }
        }
    }

    next.run(request).await
}

/// Periodically forget stale rate-limit windows
pub fn spawn_rate_limiter_cleanup(config: Arc<AbuseConfig>) {
    let Some(rate_limiter) = config.rate_limiter.clone() else {
        return;
    };
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            rate_limiter.cleanup().await;
        }
    });
}
