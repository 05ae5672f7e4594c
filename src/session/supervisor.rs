//! Session supervisor: owns one authentication-session lifecycle
//!
//! The supervisor creates transport contexts and drives login:
//! `Unauthenticated -> Authenticating -> Authenticated`. A session counts
//! as authenticated when either the modern session cookie is present with
//! acceptable remaining lifetime, or the legacy cookie pair is present.
//! Expiry or transport-level context loss sends the session back to
//! `Unauthenticated`; the orchestrator then asks for a rebuild.

use crate::config::SessionSection;
use crate::session::cookies::CookieJar;
use crate::session::resolver::{CodeResolver, StaticCodeResolver};
use crate::session::transport::SessionContext;
use crate::session::AuthError;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

/// Modern session cookie issued after a successful login handshake
const MODERN_SESSION_COOKIE: &str = "__Secure-session-token";

/// Pre-handshake cookie pair issued by the legacy login stack
const LEGACY_REQUIRED_COOKIES: [&str; 2] = ["travel_session", "aat"];

/// A modern session cookie expiring within this window is treated as
/// unauthenticated so a fresh login happens before the sweep, not mid-sweep
const MODERN_SESSION_MIN_TTL_HOURS: i64 = 6;

/// Transient anti-bot cookies never persisted to the state artifact
const STATE_FILTERED_COOKIES: [&str; 5] = ["ak_bmsc", "_abck", "bm_sv", "bm_sz", "bm_mi"];

const ACCOUNT_LOCK_TEXTS: [&str; 3] = [
    "account is temporarily locked",
    "we could not complete your request",
    "contact us for further assistance",
];

pub struct SessionSupervisor {
    session: SessionSection,
    resolver: Box<dyn CodeResolver>,
    debug_dir: PathBuf,
}

impl SessionSupervisor {
    pub fn new(session: SessionSection) -> Self {
        let resolver = Box::new(StaticCodeResolver::new(session.otp_code.clone()));
        Self::with_resolver(session, resolver)
    }

    pub fn with_resolver(session: SessionSection, resolver: Box<dyn CodeResolver>) -> Self {
        Self {
            session,
            resolver,
            debug_dir: PathBuf::from("data/logs/login_debug"),
        }
    }

    /// Builds a fresh transport context with an empty cookie jar
    pub fn new_context(&self) -> Result<SessionContext, crate::session::TransportError> {
        SessionContext::new(&self.session.base_url)
    }

    /// Logs into the travel site if necessary
    ///
    /// Tries stored-state reuse first; on a fresh login, submits
    /// credentials, resolves a verification challenge when one is issued,
    /// then waits (bounded) for the authentication cookie markers.
    pub async fn login(&self, ctx: &mut SessionContext) -> Result<(), AuthError> {
        if self.try_restore_state(ctx) {
            if self.try_reuse_existing_session(ctx).await {
                tracing::info!("Session restored from storage state");
                return Ok(());
            }
            tracing::info!("Stored session reuse failed; proceeding with fresh login flow");
        }

        let username = self
            .session
            .username
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or(AuthError::MissingCredentials)?;
        let password = self
            .session
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(AuthError::MissingCredentials)?;

        tracing::info!("Submitting credentials for user {}", mask_username(username));

        // Land on the login page first so pre-auth cookies get issued.
        let landing = ctx.get(ctx.endpoints.login_page()).await?;
        check_account_lock(&landing.body)?;

        let signin_url = ctx.endpoints.credentials_signin();
        let response = ctx
            .post_json(
                signin_url,
                &json!({ "username": username, "password": password }),
            )
            .await?;
        check_account_lock(&response.body)?;

        if challenge_requested(&response.body) {
            tracing::info!("Two-step verification challenge detected");
            let code = self.resolver.obtain_code().await?;
            let verify_url = ctx.endpoints.verify_code();
            let verify = ctx.post_json(verify_url, &json!({ "code": code })).await?;
            check_account_lock(&verify.body)?;
            if !verify.ok() {
                return Err(AuthError::Challenge(format!(
                    "verification endpoint returned HTTP {}",
                    verify.status
                )));
            }
        }

        if !self.await_authenticated(ctx).await? {
            self.capture_debug_artifacts(ctx, &response.body);
            return Err(AuthError::HandshakeTimeout(
                self.session.login_timeout_seconds,
            ));
        }

        self.save_storage_state(ctx);
        Ok(())
    }

    /// Loads persisted cookies into the context jar. Returns true when
    /// anything usable was restored.
    fn try_restore_state(&self, ctx: &mut SessionContext) -> bool {
        let Some(path) = self.storage_state_path() else {
            return false;
        };
        if !path.exists() {
            return false;
        }
        match CookieJar::load_persisted(&path, Utc::now()) {
            Ok(jar) if !jar.is_empty() => {
                tracing::info!(
                    "Loaded {} persisted session cookies from {}",
                    jar.len(),
                    path.display()
                );
                for name in jar.names() {
                    if let Some(cookie) = jar.get(name) {
                        ctx.cookies.insert(cookie.clone());
                    }
                }
                true
            }
            Ok(_) => false,
            Err(e) => {
                tracing::debug!("Failed to load storage state {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Probes the book root with restored cookies; a bounce back into the
    /// login flow means the stored session was rejected
    async fn try_reuse_existing_session(&self, ctx: &mut SessionContext) -> bool {
        let book_root = ctx.endpoints.book_root();
        let response = match ctx.get(book_root).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("Failed to load travel site using stored session: {}", e);
                return false;
            }
        };
        if ctx.endpoints.is_login_redirect(&response.final_url) {
            tracing::info!(
                "Stored session redirected to login ({}); fresh login required",
                response.final_url
            );
            return false;
        }
        is_authenticated(&ctx.cookies, Utc::now())
    }

    /// Polls for the authentication cookie markers within the configured
    /// bounded wait, probing the book root between checks so newly issued
    /// cookies are observed
    async fn await_authenticated(&self, ctx: &mut SessionContext) -> Result<bool, AuthError> {
        tracing::info!("Waiting for authentication cookies to be issued");
        let deadline =
            tokio::time::Instant::now() + std::time::Duration::from_secs(self.session.login_timeout_seconds);
        loop {
            if is_authenticated(&ctx.cookies, Utc::now()) {
                tracing::info!("Authentication cookies detected");
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::error!("Timed out waiting for authenticated session");
                return Ok(false);
            }
            let book_root = ctx.endpoints.book_root();
            match ctx.get(book_root).await {
                Ok(_) => {}
                Err(e) if e.is_context_lost() => return Err(e.into()),
                Err(e) => tracing::debug!("Session probe failed during login wait: {}", e),
            }
            tokio::time::sleep(std::time::Duration::from_secs(
                self.session.poll_interval_seconds,
            ))
            .await;
        }
    }

    /// Persists the filtered cookie state. Best-effort: failures are
    /// logged, never surfaced.
    fn save_storage_state(&self, ctx: &SessionContext) {
        let Some(path) = self.storage_state_path() else {
            return;
        };
        match ctx.cookies.persist_filtered(&path, &STATE_FILTERED_COOKIES) {
            Ok(true) => tracing::info!("Saved storage state to {}", path.display()),
            Ok(false) => {
                tracing::warn!("Filtered storage state contained no cookies; skipping persistence")
            }
            Err(e) => tracing::warn!("Failed to write storage state to {}: {}", path.display(), e),
        }
    }

    /// Captures a response body and cookie snapshot for post-mortem login
    /// diagnosis. Best-effort: must never mask the primary error.
    fn capture_debug_artifacts(&self, ctx: &SessionContext, last_body: &str) {
        let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
        if let Err(e) = std::fs::create_dir_all(&self.debug_dir) {
            tracing::debug!("Skipping login debug capture: {}", e);
            return;
        }

        let body_path = self.debug_dir.join(format!("login_timeout_{timestamp}.html"));
        match std::fs::write(&body_path, last_body) {
            Ok(()) => tracing::warn!("Saved login timeout snapshot to {}", body_path.display()),
            Err(e) => tracing::debug!("Failed to write login snapshot: {}", e),
        }

        let cookies_path = self.debug_dir.join(format!("cookies_{timestamp}.json"));
        let names = ctx.cookies.names();
        match serde_json::to_string_pretty(&names) {
            Ok(serialized) => match std::fs::write(&cookies_path, serialized) {
                Ok(()) => {
                    tracing::warn!("Saved cookie name snapshot to {}", cookies_path.display())
                }
                Err(e) => tracing::debug!("Failed to write cookie snapshot: {}", e),
            },
            Err(e) => tracing::debug!("Failed to serialize cookie snapshot: {}", e),
        }
    }

    fn storage_state_path(&self) -> Option<PathBuf> {
        self.session
            .storage_state_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(Path::new)
            .map(Path::to_path_buf)
    }
}

/// Authentication marker check: modern session cookie with acceptable
/// remaining lifetime, or the legacy cookie pair
pub(crate) fn is_authenticated(jar: &CookieJar, now: DateTime<Utc>) -> bool {
    if let Some(cookie) = jar.get(MODERN_SESSION_COOKIE) {
        match cookie.remaining(now) {
            Some(remaining) if remaining < Duration::hours(MODERN_SESSION_MIN_TTL_HOURS) => {
                tracing::info!("Session cookie expires soon; forcing login refresh");
            }
            _ => {
                tracing::info!("Detected session cookie; reusing existing authentication");
                return true;
            }
        }
    }
    if LEGACY_REQUIRED_COOKIES.iter().all(|name| jar.contains(name)) {
        tracing::info!("Detected legacy session cookies; reusing existing authentication");
        return true;
    }
    false
}

fn check_account_lock(body: &str) -> Result<(), AuthError> {
    let lowered = body.to_ascii_lowercase();
    if ACCOUNT_LOCK_TEXTS.iter().any(|text| lowered.contains(text)) {
        return Err(AuthError::AccountLocked);
    }
    Ok(())
}

/// The signin endpoint answers with a JSON body carrying
/// `"challenge": true` when a one-time code is required
fn challenge_requested(body: &str) -> bool {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("challenge").and_then(Value::as_bool))
        .unwrap_or(false)
}

fn mask_username(username: &str) -> String {
    if username.chars().count() <= 3 {
        "***".to_string()
    } else {
        let prefix: String = username.chars().take(3).collect();
        format!("{prefix}***")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::cookies::Cookie;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session_config(base_url: &str) -> SessionSection {
        SessionSection {
            base_url: base_url.to_string(),
            username: Some("user@example.com".to_string()),
            password: Some("secret".to_string()),
            otp_code: None,
            storage_state_path: None,
            login_timeout_seconds: 3,
            poll_interval_seconds: 1,
        }
    }

    fn now() -> DateTime<Utc> {
        "2026-01-15T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_modern_cookie_authenticates() {
        let mut jar = CookieJar::new();
        jar.insert(Cookie {
            name: MODERN_SESSION_COOKIE.to_string(),
            value: "token".to_string(),
            expires: Some(now() + Duration::days(2)),
        });
        assert!(is_authenticated(&jar, now()));
    }

    #[test]
    fn test_modern_cookie_expiring_soon_rejected() {
        let mut jar = CookieJar::new();
        jar.insert(Cookie {
            name: MODERN_SESSION_COOKIE.to_string(),
            value: "token".to_string(),
            expires: Some(now() + Duration::hours(1)),
        });
        assert!(!is_authenticated(&jar, now()));
    }

    #[test]
    fn test_legacy_pair_authenticates() {
        let mut jar = CookieJar::new();
        for name in LEGACY_REQUIRED_COOKIES {
            jar.insert(Cookie {
                name: name.to_string(),
                value: "x".to_string(),
                expires: None,
            });
        }
        assert!(is_authenticated(&jar, now()));

        let mut partial = CookieJar::new();
        partial.insert(Cookie {
            name: LEGACY_REQUIRED_COOKIES[0].to_string(),
            value: "x".to_string(),
            expires: None,
        });
        assert!(!is_authenticated(&partial, now()));
    }

    #[test]
    fn test_account_lock_detection() {
        assert!(check_account_lock("Your account is temporarily locked.").is_err());
        assert!(check_account_lock("welcome back").is_ok());
    }

    #[test]
    fn test_challenge_detection() {
        assert!(challenge_requested(r#"{"challenge": true}"#));
        assert!(!challenge_requested(r#"{"challenge": false}"#));
        assert!(!challenge_requested("<html>not json</html>"));
    }

    #[tokio::test]
    async fn test_login_happy_path_via_cookies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/en-us/account/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/en-us/account/api/auth/credentials-signin"))
            .and(body_partial_json(serde_json::json!({"username": "user@example.com"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(
                        "set-cookie",
                        "__Secure-session-token=tok; Max-Age=604800; Path=/",
                    )
                    .set_body_string(r#"{"ok": true}"#),
            )
            .mount(&server)
            .await;

        let supervisor = SessionSupervisor::new(session_config(&server.uri()));
        let mut ctx = supervisor.new_context().unwrap();
        supervisor.login(&mut ctx).await.unwrap();
        assert!(ctx.cookies.contains(MODERN_SESSION_COOKIE));
    }

    #[tokio::test]
    async fn test_login_account_locked_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/en-us/account/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/en-us/account/api/auth/credentials-signin"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("Your account is temporarily locked. Contact us."),
            )
            .mount(&server)
            .await;

        let supervisor = SessionSupervisor::new(session_config(&server.uri()));
        let mut ctx = supervisor.new_context().unwrap();
        let err = supervisor.login(&mut ctx).await.unwrap_err();
        assert!(matches!(err, AuthError::AccountLocked));
    }

    #[tokio::test]
    async fn test_login_without_credentials_errors() {
        let server = MockServer::start().await;
        let mut config = session_config(&server.uri());
        config.username = None;

        let supervisor = SessionSupervisor::new(config);
        let mut ctx = supervisor.new_context().unwrap();
        let err = supervisor.login(&mut ctx).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials));
    }

    #[tokio::test]
    async fn test_login_handshake_timeout_when_no_markers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/en-us/account/api/auth/credentials-signin"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok": true}"#))
            .mount(&server)
            .await;

        let supervisor = SessionSupervisor::new(session_config(&server.uri()));
        let mut ctx = supervisor.new_context().unwrap();
        let err = supervisor.login(&mut ctx).await.unwrap_err();
        assert!(matches!(err, AuthError::HandshakeTimeout(_)));
    }

    #[tokio::test]
    async fn test_challenge_resolved_with_static_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/en-us/account/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/en-us/account/api/auth/credentials-signin"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"challenge": true}"#))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/en-us/account/api/auth/verify-code"))
            .and(body_partial_json(serde_json::json!({"code": "123456"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(
                        "set-cookie",
                        "__Secure-session-token=tok; Max-Age=604800; Path=/",
                    )
                    .set_body_string(r#"{"ok": true}"#),
            )
            .mount(&server)
            .await;

        let mut config = session_config(&server.uri());
        config.otp_code = Some("123456".to_string());
        let supervisor = SessionSupervisor::new(config);
        let mut ctx = supervisor.new_context().unwrap();
        supervisor.login(&mut ctx).await.unwrap();
    }
}
