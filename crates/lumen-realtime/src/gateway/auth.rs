//! Session credentials and their verification.

use crate::error::GatewayError;
use axum::http::{
    header::{AUTHORIZATION, COOKIE},
    HeaderMap, Uri,
};
use lumen_core::OwnerId;
use lumen_security::TokenProvider;
use tracing::debug;

/// Query parameters checked for a token, in order.
const QUERY_KEYS: [&str; 2] = ["auth", "token"];

/// Finds the session token on a connection request.
///
/// Looks at the `auth` and `token` query parameters, then an
/// `Authorization: Bearer` header, then the named cookie. The first
/// non-empty value wins.
pub fn extract_credential(uri: &Uri, headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    from_query(uri)
        .or_else(|| from_bearer(headers))
        .or_else(|| from_cookie(headers, cookie_name))
}

fn from_query(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();

    QUERY_KEYS.iter().find_map(|key| {
        pairs
            .iter()
            .find(|(k, v)| k == key && !v.trim().is_empty())
            .map(|(_, v)| v.clone())
    })
}

fn from_bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn from_cookie(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Verifies a session credential and names the owner it belongs to.
pub trait SessionAuthenticator: Send + Sync {
    fn authenticate(&self, credential: &str) -> Result<OwnerId, GatewayError>;
}

/// Accepts tokens signed by the HTTP ingress.
#[derive(Debug, Clone)]
pub struct JwtSessionAuthenticator {
    tokens: TokenProvider,
}

impl JwtSessionAuthenticator {
    pub fn new(tokens: TokenProvider) -> Self {
        Self { tokens }
    }
}

impl SessionAuthenticator for JwtSessionAuthenticator {
    fn authenticate(&self, credential: &str) -> Result<OwnerId, GatewayError> {
        let owner = self.tokens.verify_owner(credential)?;
        debug!(owner_id = %owner, "Session authenticated");
        Ok(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use lumen_config::SecurityConfig;
    use std::sync::Arc;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_query_parameter_wins() {
        let h = headers(&[("authorization", "Bearer header-token"), ("cookie", "token=cookie-token")]);
        assert_eq!(
            extract_credential(&uri("/ws?token=query-token"), &h, "token").as_deref(),
            Some("query-token")
        );
        assert_eq!(
            extract_credential(&uri("/ws?auth=a&token=t"), &h, "token").as_deref(),
            Some("a")
        );
    }

    #[test]
    fn test_bearer_before_cookie() {
        let h = headers(&[("authorization", "Bearer header-token"), ("cookie", "token=cookie-token")]);
        assert_eq!(
            extract_credential(&uri("/ws"), &h, "token").as_deref(),
            Some("header-token")
        );
    }

    #[test]
    fn test_cookie_fallback() {
        let h = headers(&[("cookie", "theme=dark; token=cookie-token; lang=en")]);
        assert_eq!(
            extract_credential(&uri("/ws?token="), &h, "token").as_deref(),
            Some("cookie-token")
        );
    }

    #[test]
    fn test_no_credential() {
        let h = headers(&[("authorization", "Basic dXNlcjpwYXNz"), ("cookie", "session=x")]);
        assert!(extract_credential(&uri("/ws?other=1"), &h, "token").is_none());
    }

    #[test]
    fn test_jwt_authenticator() {
        let provider = TokenProvider::new(Arc::new(SecurityConfig::default()));
        let token = provider
            .generate_access_token(&OwnerId::from("u1"), None)
            .unwrap();
        let auth = JwtSessionAuthenticator::new(provider);

        assert_eq!(auth.authenticate(&token).unwrap(), OwnerId::from("u1"));
        assert!(matches!(
            auth.authenticate("not-a-jwt"),
            Err(GatewayError::InvalidCredential(_))
        ));
    }
}
