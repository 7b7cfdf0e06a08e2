#![allow(dead_code)]

use axum::http::HeaderMap;
use tb_core::Tribute;
use utoipa::openapi::server::ServerBuilder;
use utoipa::OpenApi;

use crate::admin::{
    AdminUser, DeleteTributeRequest, DeletedResponse, LoginRequest, LoginResponse, StatusResponse,
};
use crate::tributes::{
    CreateTributeRequest, CreateTributeResponse, SuccessResponse, UpdateTributeRequest,
};
use crate::{ErrorResponse, HealthStatus};

#[derive(OpenApi)]
#[openapi(
    paths(
        healthz_doc,
        metrics_doc,
        openapi_doc,
        tributes_list_doc,
        tributes_create_doc,
        tributes_upload_doc,
        tributes_live_doc,
        tribute_get_doc,
        tribute_update_doc,
        tribute_delete_doc,
        delete_with_key_doc,
        admin_login_doc,
        admin_logout_doc,
        admin_me_doc,
        admin_tributes_list_doc,
        admin_tribute_delete_doc
    ),
    components(
        schemas(
            HealthStatus,
            ErrorResponse,
            Tribute,
            CreateTributeRequest,
            CreateTributeResponse,
            UpdateTributeRequest,
            SuccessResponse,
            DeleteTributeRequest,
            DeletedResponse,
            LoginRequest,
            LoginResponse,
            AdminUser,
            StatusResponse
        )
    ),
    tags(
        (name = "tributes", description = "Memorial tribute board API")
    )
)]
pub struct TributeApiDoc;

pub fn document(server_url: Option<&str>) -> utoipa::openapi::OpenApi {
    let mut doc = TributeApiDoc::openapi();
    if let Some(url) = server_url {
        doc.servers = Some(vec![ServerBuilder::new().url(url).build()]);
    }
    doc
}

pub fn infer_server_url(headers: &HeaderMap) -> Option<String> {
    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get("host"))
        .and_then(|value| value.to_str().ok())?;
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("http");
    Some(format!("{proto}://{host}"))
}

#[utoipa::path(
    get,
    path = "/healthz",
    responses((status = 200, body = HealthStatus), (status = 503, body = HealthStatus))
)]
fn healthz_doc() {}

#[utoipa::path(
    get,
    path = "/metrics",
    responses((status = 200, content_type = "text/plain", body = String))
)]
fn metrics_doc() {}

#[utoipa::path(
    get,
    path = "/api/openapi.json",
    responses((status = 200, body = serde_json::Value))
)]
fn openapi_doc() {}

#[utoipa::path(
    get,
    path = "/api/tributes",
    responses((status = 200, body = [Tribute]), (status = 500, body = ErrorResponse))
)]
fn tributes_list_doc() {}

#[utoipa::path(
    post,
    path = "/api/tributes",
    request_body = CreateTributeRequest,
    responses(
        (status = 200, body = CreateTributeResponse),
        (status = 400, body = ErrorResponse),
        (status = 500, body = ErrorResponse)
    )
)]
fn tributes_create_doc() {}

#[utoipa::path(
    post,
    path = "/api/tributes/upload",
    request_body(
        content = String,
        content_type = "multipart/form-data",
        description = "name, message and optional photo fields"
    ),
    responses(
        (status = 200, body = CreateTributeResponse),
        (status = 400, body = ErrorResponse),
        (status = 500, body = ErrorResponse)
    )
)]
fn tributes_upload_doc() {}

#[utoipa::path(
    get,
    path = "/api/tributes/live",
    responses((status = 101, description = "WebSocket of snapshot frames"))
)]
fn tributes_live_doc() {}

#[utoipa::path(
    get,
    path = "/api/{id}",
    params(("id" = String, Path, description = "Tribute identifier")),
    responses((status = 200, body = Tribute), (status = 404, body = ErrorResponse))
)]
fn tribute_get_doc() {}

#[utoipa::path(
    patch,
    path = "/api/{id}",
    params(("id" = String, Path, description = "Tribute identifier")),
    request_body = UpdateTributeRequest,
    responses(
        (status = 200, body = SuccessResponse),
        (status = 400, body = ErrorResponse),
        (status = 404, body = ErrorResponse)
    )
)]
fn tribute_update_doc() {}

#[utoipa::path(
    delete,
    path = "/api/{id}",
    params(("id" = String, Path, description = "Tribute identifier")),
    responses((status = 200, body = SuccessResponse), (status = 404, body = ErrorResponse))
)]
fn tribute_delete_doc() {}

#[utoipa::path(
    delete,
    path = "/api/deleteTribute",
    request_body = DeleteTributeRequest,
    responses(
        (status = 200, body = DeletedResponse),
        (status = 400, body = ErrorResponse),
        (status = 401, body = ErrorResponse),
        (status = 500, body = ErrorResponse)
    )
)]
fn delete_with_key_doc() {}

#[utoipa::path(
    post,
    path = "/api/admin/login",
    request_body = LoginRequest,
    responses((status = 200, body = LoginResponse), (status = 401, body = ErrorResponse))
)]
fn admin_login_doc() {}

#[utoipa::path(
    post,
    path = "/api/admin/logout",
    responses((status = 200, body = StatusResponse))
)]
fn admin_logout_doc() {}

#[utoipa::path(
    get,
    path = "/api/admin/me",
    responses((status = 200, body = AdminUser), (status = 401, body = ErrorResponse))
)]
fn admin_me_doc() {}

#[utoipa::path(
    get,
    path = "/api/admin/tributes",
    responses((status = 200, body = [Tribute]), (status = 401, body = ErrorResponse))
)]
fn admin_tributes_list_doc() {}

#[utoipa::path(
    delete,
    path = "/api/admin/tributes/{id}",
    params(("id" = String, Path, description = "Tribute identifier")),
    responses(
        (status = 200, body = DeletedResponse),
        (status = 401, body = ErrorResponse),
        (status = 404, body = ErrorResponse)
    )
)]
fn admin_tribute_delete_doc() {}
