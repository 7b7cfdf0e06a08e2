use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use tb_core::Tribute;
use utoipa::ToSchema;

use crate::{ApiError, ApiResult, AppState};

pub(crate) const SESSION_COOKIE: &str = "tb_admin_session";
const DELETED_MESSAGE: &str = "Tribute deleted successfully";

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub expires_at: i64,
}

#[derive(Serialize, ToSchema)]
pub struct AdminUser {
    pub username: String,
}

#[derive(Serialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Serialize, ToSchema)]
pub struct DeletedResponse {
    pub message: String,
}

/// Body of the legacy shared-secret delete.
#[derive(Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteTributeRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub auth_key: Option<String>,
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    WithRejection(Json(payload), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> ApiResult<(CookieJar, Json<LoginResponse>)> {
    let session = state.gate.login(&payload.username, &payload.password)?;

    let cookie = Cookie::build((SESSION_COOKIE, session.token.clone()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build();
    let jar = jar.add(cookie);

    Ok((
        jar,
        Json(LoginResponse {
            token: session.token,
            username: session.username,
            expires_at: session.expires_at,
        }),
    ))
}

/// Always answers with an expired session cookie, whether or not one was sent.
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<StatusResponse>) {
    let mut cookie = Cookie::build((SESSION_COOKIE, ""))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build();
    cookie.make_removal();
    let jar = jar.add(cookie);
    (
        jar,
        Json(StatusResponse {
            status: "ok".to_string(),
        }),
    )
}

pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> ApiResult<Json<AdminUser>> {
    let username = require_admin(&state, &headers, &jar)?;
    Ok(Json(AdminUser { username }))
}

pub async fn list_tributes(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> ApiResult<Json<Vec<Tribute>>> {
    require_admin(&state, &headers, &jar)?;
    let tributes = state.repository.list().await?;
    Ok(Json(tributes))
}

pub async fn delete_tribute(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    jar: CookieJar,
) -> ApiResult<Json<DeletedResponse>> {
    let username = require_admin(&state, &headers, &jar)?;
    let cleanup = state.repository.delete_existing(&id).await?;
    tracing::info!(id = %id, admin = %username, ?cleanup, "tribute deleted by admin");
    Ok(Json(DeletedResponse {
        message: DELETED_MESSAGE.to_string(),
    }))
}

/// `DELETE /api/deleteTribute`. The raw body is read so that a request with
/// the wrong key is refused before its payload is looked at.
pub async fn delete_with_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    body: Bytes,
) -> ApiResult<Json<DeletedResponse>> {
    let request: DeleteTributeRequest = serde_json::from_slice(&body).unwrap_or_default();

    let key_ok = request
        .auth_key
        .as_deref()
        .is_some_and(|key| state.gate.shared_secret_matches(key));
    if !key_ok && require_admin(&state, &headers, &jar).is_err() {
        tracing::warn!("deleteTribute rejected: bad auth key");
        return Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "Unauthorized",
        ));
    }

    let Some(id) = request.id.filter(|id| !id.trim().is_empty()) else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            "Missing tribute ID",
        ));
    };

    let cleanup = state
        .repository
        .delete(&id, request.photo_url.as_deref())
        .await?;
    tracing::info!(id = %id, ?cleanup, "tribute deleted via shared key");
    Ok(Json(DeletedResponse {
        message: DELETED_MESSAGE.to_string(),
    }))
}

pub(crate) fn require_admin(
    state: &AppState,
    headers: &HeaderMap,
    jar: &CookieJar,
) -> ApiResult<String> {
    let token = bearer_token(headers).or_else(|| {
        jar.get(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
    });
    let Some(token) = token else {
        return Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "AUTH_REQUIRED",
            "missing session",
        ));
    };
    Ok(state.gate.verify_session(&token)?)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}
