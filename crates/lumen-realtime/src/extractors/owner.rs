//! Authenticated owner extractor.

use crate::error::GatewayError;
use crate::gateway::extract_credential;
use crate::state::AppState;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use lumen_core::OwnerId;

/// The owner named by the request's session token.
///
/// Reads the token from the same places the realtime gateway does, so HTTP
/// requests and realtime sessions share one trust boundary.
#[derive(Debug, Clone)]
pub struct AuthenticatedOwner(pub OwnerId);

impl std::ops::Deref for AuthenticatedOwner {
    type Target = OwnerId;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedOwner {
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let credential = extract_credential(&parts.uri, &parts.headers, &state.token_cookie);
        state
            .gateway
            .authenticate(credential.as_deref())
            .map(AuthenticatedOwner)
    }
}
