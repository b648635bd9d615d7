//! HTTP Basic Authentication for the admin routes

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, Response, StatusCode},
    middleware::Next,
    response::IntoResponse,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;

use crate::state::AppState;

const REALM: &str = "Basic realm=\"Say It Admin\"";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

impl AdminCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    fn matches(&self, username: &str, password: &str) -> bool {
        let user_ok = constant_time_eq(self.username.as_bytes(), username.as_bytes());
        let pass_ok = constant_time_eq(self.password.as_bytes(), password.as_bytes());
        user_ok & pass_ok
    }
}

/// Admin access; `None` leaves the admin routes open
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub admin: Option<AdminCredentials>,
}

fn env_credential(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl AuthConfig {
    /// ADMIN_USERNAME and ADMIN_PASSWORD must both be set to enable auth
    pub fn from_env() -> Self {
        match (env_credential("ADMIN_USERNAME"), env_credential("ADMIN_PASSWORD")) {
            (Some(username), Some(password)) => {
                tracing::info!("Admin authentication enabled for {}", username);
                Self::with_admin(username, password)
            }
            (None, None) => {
                tracing::warn!("Admin authentication DISABLED, cleanup and reports are public");
                Self::disabled()
            }
            _ => {
                tracing::warn!("Only one of ADMIN_USERNAME / ADMIN_PASSWORD set, auth stays off");
                Self::disabled()
            }
        }
    }

    pub fn with_admin(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            admin: Some(AdminCredentials::new(username, password)),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.admin.is_some()
    }

    /// Check an `Authorization` header value; anything passes when disabled
    pub fn accepts_header(&self, value: Option<&str>) -> bool {
        let Some(admin) = &self.admin else {
            return true;
        };
        value
            .and_then(decode_basic)
            .is_some_and(|(username, password)| admin.matches(&username, &password))
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Split `Basic <base64(user:pass)>` into its credentials
fn decode_basic(value: &str) -> Option<(String, String)> {
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    decoded
        .split_once(':')
        .map(|(user, pass)| (user.to_string(), pass.to_string()))
}

/// Rejects admin requests without valid Basic credentials
pub async fn admin_auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    if state.auth.accepts_header(header_value) {
        return next.run(request).await;
    }

    tracing::warn!(uri = %request.uri(), "Rejected admin request");
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, REALM)],
        "Unauthorized",
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_accepts_anything() {
        let config = AuthConfig::disabled();
        assert!(!config.is_enabled());
        assert!(config.accepts_header(None));
        assert!(config.accepts_header(Some("Bearer nope")));
    }

    #[test]
    fn test_basic_header() {
        let config = AuthConfig::with_admin("admin", "secret");
        assert!(config.is_enabled());
        // "admin:secret"
        assert!(config.accepts_header(Some("Basic YWRtaW46c2VjcmV0")));
        // "user:pass"
        assert!(!config.accepts_header(Some("Basic dXNlcjpwYXNz")));
        assert!(!config.accepts_header(Some("Bearer YWRtaW46c2VjcmV0")));
        assert!(!config.accepts_header(Some("Basic !!!")));
        assert!(!config.accepts_header(None));
    }

    #[test]
    fn test_decode_basic() {
        assert_eq!(
            decode_basic("Basic dXNlcjpwYXNz"),
            Some(("user".to_string(), "pass".to_string()))
        );
        // "nocolon"
        assert_eq!(decode_basic("Basic bm9jb2xvbg=="), None);
    }

    #[test]
    fn test_credentials_match() {
        let admin = AdminCredentials::new("admin", "secret");
        assert!(admin.matches("admin", "secret"));
        assert!(!admin.matches("admin", "wrong"));
        assert!(!admin.matches("wrong", "secret"));
        assert!(!admin.matches("", ""));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"hello", b"hell"));
        assert!(constant_time_eq(b"", b""));
    }
}
