//! JWT token provider for creating and validating tokens.

use super::Claims;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use lumen_config::SecurityConfig;
use lumen_core::{LumenError, LumenResult, OwnerId};
use std::sync::Arc;
use tracing::{debug, warn};

/// JWT token provider service.
///
/// Verification is the hot path; issuing exists for local tooling and tests
/// since production tokens come from the HTTP ingress.
#[derive(Clone)]
pub struct TokenProvider {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    config: Arc<SecurityConfig>,
    validation: Validation,
}

impl TokenProvider {
    /// Creates a new token provider.
    #[must_use]
    pub fn new(config: Arc<SecurityConfig>) -> Self {
        let encoding_key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.jwt_issuer]);
        validation.set_audience(&[&config.jwt_audience]);
        validation.validate_exp = true;
        validation.validate_nbf = true;

        Self {
            encoding_key,
            decoding_key,
            config,
            validation,
        }
    }

    /// Generates an access token for an owner.
    pub fn generate_access_token(
        &self,
        owner_id: &OwnerId,
        username: Option<&str>,
    ) -> LumenResult<String> {
        let expires_at =
            Utc::now() + Duration::seconds(self.config.jwt_access_expiration_secs as i64);

        let claims = Claims::new_access(
            owner_id,
            username.map(str::to_string),
            self.config.jwt_issuer.clone(),
            self.config.jwt_audience.clone(),
            expires_at,
        );

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| LumenError::Internal(format!("Failed to generate access token: {}", e)))?;

        debug!(owner_id = %owner_id, "Generated access token");
        Ok(token)
    }

    /// Validates a token and returns the claims.
    pub fn validate_token(&self, token: &str) -> LumenResult<Claims> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                warn!("Token validation failed: {}", e);
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => LumenError::TokenExpired,
                    jsonwebtoken::errors::ErrorKind::InvalidToken
                    | jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                        LumenError::InvalidToken("Invalid token signature".to_string())
                    }
                    jsonwebtoken::errors::ErrorKind::InvalidIssuer => {
                        LumenError::InvalidToken("Invalid token issuer".to_string())
                    }
                    jsonwebtoken::errors::ErrorKind::InvalidAudience => {
                        LumenError::InvalidToken("Invalid token audience".to_string())
                    }
                    _ => LumenError::InvalidToken(e.to_string()),
                }
            })?;

        if token_data.claims.sub.trim().is_empty() {
            return Err(LumenError::InvalidToken("Token has no subject".to_string()));
        }

        Ok(token_data.claims)
    }

    /// Validates a token and returns the owner it identifies.
    pub fn verify_owner(&self, token: &str) -> LumenResult<OwnerId> {
        self.validate_token(token).map(|claims| claims.owner_id())
    }
}

impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenProvider")
            .field("issuer", &self.config.jwt_issuer)
            .field("audience", &self.config.jwt_audience)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SecurityConfig {
        SecurityConfig {
            jwt_secret: "test-secret-key-for-testing-only".to_string(),
            jwt_access_expiration_secs: 3600,
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            ..Default::default()
        }
    }

    fn create_test_provider() -> TokenProvider {
        TokenProvider::new(Arc::new(test_config()))
    }

    #[test]
    fn test_generate_and_validate_token() {
        let provider = create_test_provider();
        let owner = OwnerId::from("u1");

        let token = provider.generate_access_token(&owner, Some("alice")).unwrap();
        let claims = provider.validate_token(&token).unwrap();
        assert_eq!(claims.owner_id(), owner);
        assert_eq!(claims.username.as_deref(), Some("alice"));
        assert_eq!(provider.verify_owner(&token).unwrap(), owner);
    }

    #[test]
    fn test_invalid_token() {
        let provider = create_test_provider();
        let err = provider.validate_token("invalid-token").unwrap_err();
        assert!(err.is_auth_failure());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = create_test_provider()
            .generate_access_token(&OwnerId::from("u1"), None)
            .unwrap();

        let mut other = test_config();
        other.jwt_secret = "another-secret-key-for-testing-only".to_string();
        let err = TokenProvider::new(Arc::new(other))
            .validate_token(&token)
            .unwrap_err();
        assert!(matches!(err, LumenError::InvalidToken(_)));
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let token = create_test_provider()
            .generate_access_token(&OwnerId::from("u1"), None)
            .unwrap();

        let mut other = test_config();
        other.jwt_audience = "someone-else".to_string();
        let err = TokenProvider::new(Arc::new(other))
            .validate_token(&token)
            .unwrap_err();
        assert!(matches!(err, LumenError::InvalidToken(_)));
    }

    #[test]
    fn test_expired_token() {
        let provider = create_test_provider();
        let claims = Claims::new_access(
            &OwnerId::from("u1"),
            None,
            "test-issuer".to_string(),
            "test-audience".to_string(),
            Utc::now() - Duration::hours(1),
        );
        let token = encode(&Header::default(), &claims, &provider.encoding_key).unwrap();

        assert!(matches!(
            provider.validate_token(&token),
            Err(LumenError::TokenExpired)
        ));
    }
}
