//! HTTP transport for one session context
//!
//! Redirects are handled manually so that cookies set on intermediate
//! responses (login handoffs, session refreshes) are captured into the jar.
//! Every failure leaving this module is classified into a `TransportError`
//! variant; callers branch on the classification, never on reqwest types.

use crate::session::cookies::CookieJar;
use chrono::Utc;
use reqwest::{header, redirect::Policy, Client, Method, StatusCode};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const MAX_REDIRECTS: usize = 10;

/// Classified transport-level failure
#[derive(Debug, Error)]
pub enum TransportError {
    /// The session context is unusable (connection-level loss); the
    /// orchestrator recovers by rebuilding the context and re-logging-in
    #[error("session context lost: {0}")]
    ContextLost(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("redirect loop detected at {0}")]
    RedirectLoop(String),

    #[error("too many redirects from {0}")]
    RedirectLimit(String),
}

impl TransportError {
    pub fn is_context_lost(&self) -> bool {
        matches!(self, Self::ContextLost(_))
    }
}

fn classify(err: reqwest::Error, url: &Url) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(format!("{url}: {err}"))
    } else if err.is_connect() {
        TransportError::ContextLost(format!("{url}: {err}"))
    } else {
        TransportError::Request(format!("{url}: {err}"))
    }
}

/// Well-known paths on the remote site, resolved against the base URL
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let base = Url::parse(base_url)
            .map_err(|e| TransportError::Request(format!("invalid base url {base_url}: {e}")))?;
        Ok(Self { base })
    }

    fn join(&self, path: &str) -> Url {
        // Paths are compile-time constants under the validated base.
        self.base
            .join(path)
            .unwrap_or_else(|_| self.base.clone())
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Landing page of the booking site; visiting it refreshes the travel
    /// session cookies
    pub fn book_root(&self) -> Url {
        self.join("/en-us/book/")
    }

    pub fn auth_session(&self) -> Url {
        self.join("/en-us/book/api/auth/session")
    }

    pub fn properties(&self) -> Url {
        self.join("/en-us/book/api/lxp/hotel/properties")
    }

    pub fn results_page(&self) -> Url {
        self.join("/en-us/book/accommodations/search-results")
    }

    pub fn login_page(&self) -> Url {
        self.join("/en-us/account/login")
    }

    pub fn credentials_signin(&self) -> Url {
        self.join("/en-us/account/api/auth/credentials-signin")
    }

    pub fn verify_code(&self) -> Url {
        self.join("/en-us/account/api/auth/verify-code")
    }

    /// True when a URL points back into the login flow (used to detect
    /// that a stored session was rejected)
    pub fn is_login_redirect(&self, url: &Url) -> bool {
        url.path().contains("/account/login") || url.path().contains("/account/api/auth")
    }
}

/// Final response of a (possibly redirected) request
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    /// URL the request chain landed on
    pub final_url: Url,
}

impl HttpResponse {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One transport context: HTTP client plus cookie jar
///
/// Exclusively owned by the currently-executing sweep; never shared.
pub struct SessionContext {
    client: Client,
    pub cookies: CookieJar,
    pub endpoints: Endpoints,
}

impl SessionContext {
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let endpoints = Endpoints::new(base_url)?;
        let client = Client::builder()
            .user_agent(concat!("ratesweep/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .redirect(Policy::none()) // redirects handled manually
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| TransportError::Request(format!("failed to build client: {e}")))?;
        Ok(Self {
            client,
            cookies: CookieJar::new(),
            endpoints,
        })
    }

    pub async fn get(&mut self, url: Url) -> Result<HttpResponse, TransportError> {
        self.request(Method::GET, url, None, &[]).await
    }

    pub async fn get_with_headers(
        &mut self,
        url: Url,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, TransportError> {
        self.request(Method::GET, url, None, headers).await
    }

    pub async fn post_json(
        &mut self,
        url: Url,
        payload: &Value,
    ) -> Result<HttpResponse, TransportError> {
        self.request(Method::POST, url, Some(payload.clone()), &[])
            .await
    }

    /// Issues one request, following redirects manually and folding every
    /// hop's cookies into the jar. Non-GET methods downgrade to GET after
    /// the first redirect, matching browser behavior for 302/303.
    async fn request(
        &mut self,
        method: Method,
        url: Url,
        json_body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, TransportError> {
        let origin = url.to_string();
        let mut current_method = method;
        let mut current_url = url;
        let mut current_body = json_body;
        let mut visited: HashSet<String> = HashSet::new();

        for _hop in 0..=MAX_REDIRECTS {
            if !visited.insert(format!("{} {}", current_method, current_url)) {
                return Err(TransportError::RedirectLoop(current_url.to_string()));
            }

            let mut request = self.client.request(current_method.clone(), current_url.clone());
            if let Some(cookie_header) = self.cookies.header_value(Utc::now()) {
                request = request.header(header::COOKIE, cookie_header);
            }
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            if let Some(body) = &current_body {
                request = request.json(body);
            }

            let response = request
                .send()
                .await
                .map_err(|e| classify(e, &current_url))?;

            let status = response.status();
            let set_cookies = response
                .headers()
                .get_all(header::SET_COOKIE)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .map(str::to_string)
                .collect::<Vec<_>>();
            self.cookies
                .store_response_cookies(set_cookies.iter().map(String::as_str), Utc::now());

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                let Some(location) = location else {
                    // Redirect without a target: surface it as the result.
                    let final_url = current_url;
                    let body = response.text().await.map_err(|e| classify(e, &final_url))?;
                    return Ok(HttpResponse {
                        status: status.as_u16(),
                        body,
                        final_url,
                    });
                };
                let next_url = current_url
                    .join(&location)
                    .map_err(|e| TransportError::Request(format!("bad redirect target {location}: {e}")))?;
                if current_method != Method::GET
                    && (status == StatusCode::FOUND || status == StatusCode::SEE_OTHER)
                {
                    current_method = Method::GET;
                    current_body = None;
                }
                current_url = next_url;
                continue;
            }

            let final_url = current_url;
            let body = response.text().await.map_err(|e| classify(e, &final_url))?;
            return Ok(HttpResponse {
                status: status.as_u16(),
                body,
                final_url,
            });
        }

        Err(TransportError::RedirectLimit(origin))
    }
}
