// crates/server/src/auth.rs
//! Bearer-token authorization. Producer endpoints need a role token; read
//! endpoints authorize as `AuthRole::Any`.
//!
//! Tokens are fixed at startup. An unset (or empty) token never matches, so a
//! deployment without `ADMIN_TOKEN` simply has no admin.

use axum::http::{header, HeaderMap};

use crate::error::{ApiError, ApiResult};

/// Who may call an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRole {
    /// Job creator token or admin token.
    JobCreator,
    /// Status reporter token or admin token.
    StatusReporter,
    /// No token required.
    Any,
}

#[derive(Clone, Default)]
pub struct AuthTokens {
    job_creator: Option<String>,
    status_reporter: Option<String>,
    admin: Option<String>,
}

impl std::fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthTokens")
            .field("job_creator", &self.job_creator.is_some())
            .field("status_reporter", &self.status_reporter.is_some())
            .field("admin", &self.admin.is_some())
            .finish()
    }
}

impl AuthTokens {
    pub fn new(
        job_creator: Option<String>,
        status_reporter: Option<String>,
        admin: Option<String>,
    ) -> Self {
        let keep = |t: Option<String>| t.filter(|t| !t.is_empty());
        Self {
            job_creator: keep(job_creator),
            status_reporter: keep(status_reporter),
            admin: keep(admin),
        }
    }

    /// Check the request's bearer token against `role`.
    pub fn authorize(&self, role: AuthRole, headers: &HeaderMap) -> ApiResult<()> {
        let role_token = match role {
            AuthRole::Any => return Ok(()),
            AuthRole::JobCreator => &self.job_creator,
            AuthRole::StatusReporter => &self.status_reporter,
        };

        let received = bearer_token(headers);
        let is_match = |configured: &Option<String>| {
            matches!((configured, received), (Some(expected), Some(got)) if expected == got)
        };

        if is_match(role_token) || is_match(&self.admin) {
            Ok(())
        } else {
            tracing::debug!(?role, has_token = received.is_some(), "Rejected request token");
            Err(ApiError::Unauthorized)
        }
    }
}

/// The credentials of an `Authorization: Bearer <token>` header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(authorization: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(authorization).unwrap(),
        );
        headers
    }

    fn tokens() -> AuthTokens {
        AuthTokens::new(
            Some("creator".into()),
            Some("reporter".into()),
            Some("admin".into()),
        )
    }

    #[test]
    fn test_role_tokens() {
        let auth = tokens();
        assert!(auth.authorize(AuthRole::JobCreator, &headers("Bearer creator")).is_ok());
        assert!(auth.authorize(AuthRole::JobCreator, &headers("Bearer admin")).is_ok());
        assert!(auth.authorize(AuthRole::JobCreator, &headers("Bearer reporter")).is_err());

        assert!(auth.authorize(AuthRole::StatusReporter, &headers("Bearer reporter")).is_ok());
        assert!(auth.authorize(AuthRole::StatusReporter, &headers("Bearer admin")).is_ok());
        assert!(auth.authorize(AuthRole::StatusReporter, &headers("Bearer creator")).is_err());
    }

    #[test]
    fn test_any_role_needs_no_token() {
        let auth = AuthTokens::default();
        assert!(auth.authorize(AuthRole::Any, &HeaderMap::new()).is_ok());
    }

    #[test]
    fn test_missing_or_malformed_header() {
        let auth = tokens();
        assert!(matches!(
            auth.authorize(AuthRole::JobCreator, &HeaderMap::new()),
            Err(ApiError::Unauthorized)
        ));
        assert!(auth.authorize(AuthRole::JobCreator, &headers("creator")).is_err());
        assert!(auth.authorize(AuthRole::JobCreator, &headers("Basic creator")).is_err());
        assert!(auth.authorize(AuthRole::JobCreator, &headers("Bearer ")).is_err());
        assert!(auth.authorize(AuthRole::JobCreator, &headers("bearer creator")).is_ok());
    }

    #[test]
    fn test_unset_tokens_never_match() {
        let auth = AuthTokens::new(None, Some(String::new()), None);
        assert!(auth.authorize(AuthRole::JobCreator, &headers("Bearer ")).is_err());
        assert!(auth.authorize(AuthRole::StatusReporter, &headers("Bearer x")).is_err());
        assert!(auth.authorize(AuthRole::StatusReporter, &HeaderMap::new()).is_err());
    }

    #[test]
    fn test_debug_hides_token_values() {
        let rendered = format!("{:?}", tokens());
        assert!(!rendered.contains("creator\""));
        assert!(!rendered.contains("admin\""));
    }
}
