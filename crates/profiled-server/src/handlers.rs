use std::sync::LazyLock;

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use profiled_auth::{AuthError, Identity, ProfileUpdate, User, request_fingerprint};

use crate::server::AppState;
use crate::service::ServiceError;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("Invalid email regex")
});
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.{1,15}$").expect("Invalid name regex"));
static BIRTHDAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").expect("Invalid birthday regex"));
static DESCRIPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.{0,30}$").expect("Invalid description regex"));

// =============================================================================
// Errors
// =============================================================================

/// Handler-level error: request validation on top of service and auth errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(&'static str),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Service(e) => e.into_response(),
            ApiError::Auth(e) => e.into_response(),
        }
    }
}

// =============================================================================
// Payloads
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    #[serde(rename = "confirmPassword")]
    pub confirm_password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct EditRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub birthday: String,
    #[serde(default)]
    pub description: String,
}

/// Public view of a user. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileView {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub birthday: String,
    pub description: String,
    pub ctime: i64,
    pub utime: i64,
}

impl From<User> for ProfileView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            birthday: user.birthday,
            description: user.description,
            ctime: user.ctime,
            utime: user.utime,
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

pub async fn hello() -> &'static str {
    "hello, profiled"
}

pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.cache.stats().await;
    let redis = match state.cache.is_redis_available().await {
        true => "up",
        false if stats.mode == "redis" => "down",
        false => "disabled",
    };
    Json(json!({
        "status": "ok",
        "cache": { "mode": stats.mode, "entries": stats.local_entries, "redis": redis },
    }))
}

pub async fn sign_up(
    State(state): State<AppState>,
    Json(req): Json<SignUpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !EMAIL_RE.is_match(&req.email) {
        return Err(ApiError::Validation("invalid email format"));
    }
    if req.password != req.confirm_password {
        return Err(ApiError::Validation("passwords do not match"));
    }
    if req.password.is_empty() {
        return Err(ApiError::Validation("password must not be empty"));
    }

    let id = state.service.sign_up(&req.email, &req.password).await?;
    Ok(Json(json!({ "id": id })))
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.service.login(&req.email, &req.password).await?;

    let issued = state.auth.codec().issue(
        user.id,
        &request_fingerprint(&headers),
        state.auth.token_lifetime(),
    )
    .map_err(AuthError::from)?;
    let token = HeaderValue::from_str(&issued.token)
        .map_err(|e| AuthError::internal(format!("token is not a header value: {e}")))?;

    tracing::info!(subject_id = user.id, expires_at = issued.claims.exp, "user logged in");

    let mut response_headers = HeaderMap::new();
    response_headers.insert(state.auth.refresh_header().clone(), token);
    Ok((response_headers, Json(json!({ "id": user.id }))))
}

pub async fn edit(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<EditRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !NAME_RE.is_match(&req.name) {
        return Err(ApiError::Validation("invalid name"));
    }
    if !BIRTHDAY_RE.is_match(&req.birthday) {
        return Err(ApiError::Validation("invalid birthday"));
    }
    if !DESCRIPTION_RE.is_match(&req.description) {
        return Err(ApiError::Validation("invalid description"));
    }

    state
        .service
        .edit(&ProfileUpdate {
            id: identity.subject_id,
            name: req.name,
            birthday: req.birthday,
            description: req.description,
        })
        .await?;
    Ok(Json(json!({ "status": "updated" })))
}

pub async fn profile(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<ProfileView>, ApiError> {
    let user = state.service.profile(identity.subject_id).await?;
    Ok(Json(ProfileView::from(user)))
}
