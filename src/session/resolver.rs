//! One-time-code resolution contract
//!
//! The supervisor delegates two-factor challenges here. How a code is
//! produced (TOTP derivation, mailbox polling) is an external concern; the
//! shipped implementation serves a pre-configured code.

use crate::session::AuthError;
use async_trait::async_trait;

/// Produces a one-time verification code during login
#[async_trait]
pub trait CodeResolver: Send + Sync {
    async fn obtain_code(&self) -> Result<String, AuthError>;
}

/// Serves a static code from configuration
pub struct StaticCodeResolver {
    code: Option<String>,
}

impl StaticCodeResolver {
    pub fn new(code: Option<String>) -> Self {
        Self { code }
    }
}

#[async_trait]
impl CodeResolver for StaticCodeResolver {
    async fn obtain_code(&self) -> Result<String, AuthError> {
        self.code
            .as_ref()
            .map(|code| code.trim().to_string())
            .filter(|code| !code.is_empty())
            .ok_or_else(|| {
                AuthError::CodeUnavailable(
                    "no one-time code configured (session.otp-code)".to_string(),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_resolver_returns_trimmed_code() {
        let resolver = StaticCodeResolver::new(Some(" 123456 ".to_string()));
        assert_eq!(resolver.obtain_code().await.unwrap(), "123456");
    }

    #[tokio::test]
    async fn test_static_resolver_without_code_errors() {
        let resolver = StaticCodeResolver::new(None);
        assert!(matches!(
            resolver.obtain_code().await.unwrap_err(),
            AuthError::CodeUnavailable(_)
        ));

        let blank = StaticCodeResolver::new(Some("  ".to_string()));
        assert!(blank.obtain_code().await.is_err());
    }
}
