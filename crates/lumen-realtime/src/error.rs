//! Gateway error types.

use crate::responses::ApiResponse;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lumen_core::{ErrorResponse, LumenError};
use thiserror::Error;

/// Why a realtime connection was refused.
///
/// Both variants are answered with `401` before the upgrade, so the client
/// always learns that it was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Unauthorized: no token provided")]
    MissingCredential,

    #[error("Unauthorized: invalid token ({0})")]
    InvalidCredential(String),
}

impl GatewayError {
    /// Machine-readable error code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingCredential => "MISSING_CREDENTIAL",
            Self::InvalidCredential(_) => "INVALID_CREDENTIAL",
        }
    }
}

impl From<LumenError> for GatewayError {
    fn from(err: LumenError) -> Self {
        Self::InvalidCredential(err.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::<()>::error(body)),
        )
            .into_response()
    }
}
