//! Session lifecycle against the remote travel site
//!
//! A `SessionContext` is one transport context: an HTTP client plus an
//! explicit cookie jar. The `SessionSupervisor` owns login and rebuilds
//! contexts after transport-level loss. Transport failures are classified
//! here, at the adapter boundary, so callers never depend on concrete HTTP
//! library error types.

mod cookies;
mod resolver;
mod supervisor;
mod transport;

pub use cookies::{Cookie, CookieJar};
pub use resolver::{CodeResolver, StaticCodeResolver};
pub use supervisor::SessionSupervisor;
pub use transport::{Endpoints, HttpResponse, SessionContext, TransportError};

use thiserror::Error;

/// Authentication-flow errors surfaced by the supervisor
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Username/password must be configured for login")]
    MissingCredentials,

    /// Fatal: retrying a locked account risks worsening the lockout
    #[error("Account is temporarily locked; not retrying")]
    AccountLocked,

    #[error("Login handshake incomplete after {0}s; no session cookies observed")]
    HandshakeTimeout(u64),

    #[error("Verification challenge failed: {0}")]
    Challenge(String),

    #[error("One-time code unavailable: {0}")]
    CodeUnavailable(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
