use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use tb_core::{PhotoUpload, Tribute, TributeError};
use utoipa::ToSchema;

use crate::{ApiError, ApiResult, AppState};

const DEFAULT_PHOTO_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Deserialize, ToSchema)]
pub struct CreateTributeRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct CreateTributeResponse {
    pub success: bool,
    pub id: String,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateTributeRequest {
    #[serde(default)]
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

pub async fn list_tributes(State(state): State<AppState>) -> ApiResult<Json<Vec<Tribute>>> {
    let tributes = state.repository.list().await?;
    Ok(Json(tributes))
}

pub async fn create_tribute(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<CreateTributeRequest>, ApiError>,
) -> ApiResult<Json<CreateTributeResponse>> {
    let id = state
        .repository
        .create(&payload.name, &payload.message, None)
        .await?;
    Ok(Json(CreateTributeResponse { success: true, id }))
}

pub async fn upload_tribute(
    State(state): State<AppState>,
    WithRejection(mut multipart, _): WithRejection<Multipart, ApiError>,
) -> ApiResult<Json<CreateTributeResponse>> {
    let mut name = String::new();
    let mut message = String::new();
    let mut photo = None;

    while let Some(field) = multipart.next_field().await.map_err(invalid_multipart)? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "name" => name = field.text().await.map_err(invalid_multipart)?,
            "message" => message = field.text().await.map_err(invalid_multipart)?,
            "photo" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or(DEFAULT_PHOTO_CONTENT_TYPE)
                    .to_string();
                let bytes = field.bytes().await.map_err(invalid_multipart)?;
                photo = Some(PhotoUpload::new(file_name, content_type, bytes));
            }
            other => tracing::debug!(field = other, "ignoring unknown upload field"),
        }
    }

    let id = state.repository.create(&name, &message, photo).await?;
    Ok(Json(CreateTributeResponse { success: true, id }))
}

pub async fn get_tribute(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Tribute>> {
    let tribute = state
        .repository
        .get(&id)
        .await?
        .ok_or_else(|| TributeError::not_found("tribute"))?;
    Ok(Json(tribute))
}

pub async fn update_tribute(
    State(state): State<AppState>,
    Path(id): Path<String>,
    WithRejection(Json(payload), _): WithRejection<Json<UpdateTributeRequest>, ApiError>,
) -> ApiResult<Json<SuccessResponse>> {
    state
        .repository
        .update_message(&id, &payload.message)
        .await?;
    Ok(Json(SuccessResponse {
        success: true,
        message: "Tribute updated successfully".to_string(),
    }))
}

pub async fn delete_tribute(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SuccessResponse>> {
    let cleanup = state.repository.delete_existing(&id).await?;
    tracing::debug!(id = %id, ?cleanup, "public delete finished");
    Ok(Json(SuccessResponse {
        success: true,
        message: "Tribute deleted successfully".to_string(),
    }))
}

fn invalid_multipart(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::new(
        StatusCode::BAD_REQUEST,
        "INVALID_UPLOAD",
        format!("invalid multipart body: {err}"),
    )
}
