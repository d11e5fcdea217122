//! Error responses for the authentication middleware.
//!
//! Every authentication failure produces the same response so a client
//! cannot tell a missing header from a forged, expired or replayed token.
//! The specific cause is only visible in logs.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthError;

const WWW_AUTHENTICATE_VALUE: &str = "Bearer realm=\"profiled\"";

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if self.is_server_error() {
            tracing::error!(error = %self, category = %self.category(), "Authentication failed internally");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error" })),
            )
                .into_response();
        }
        unauthorized_response()
    }
}

/// Builds the uniform 401 response.
#[must_use]
pub fn unauthorized_response() -> Response {
    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "unauthorized" })),
    )
        .into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static(WWW_AUTHENTICATE_VALUE),
    );
    response
}
