use anyhow::Result;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tb_core::admin::AdminGate;
use tb_core::auth::JwtConfig;
use tb_core::blob::{BlobStore, MemoryBlobStore};
use tb_core::firebase::{self, FirebaseStorage, ServiceAccount, StorageConfig};
use tb_core::pg_store::PgTributeStore;
use tb_core::store::{MemoryTributeStore, TributeStore};
use tb_core::{config, db, http, logging, metrics, server};
use tb_core::{TributeError, TributeRepository};
use tokio::task::JoinHandle;
use utoipa::ToSchema;

mod admin;
mod live;
mod openapi;
mod pages;
mod tributes;


const SERVICE_NAME: &str = metrics::SERVICE_NAME;
const DEFAULT_SESSION_TTL_SECONDS: u64 = 86400;

#[derive(Clone)]
pub struct AppState {
    repository: Arc<TributeRepository>,
    gate: Arc<AdminGate>,
}

impl AppState {
    pub fn new(repository: Arc<TributeRepository>, gate: Arc<AdminGate>) -> Self {
        Self { repository, gate }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub(crate) struct ErrorResponse {
    error: String,
    code: String,
}

#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl From<TributeError> for ApiError {
    fn from(err: TributeError) -> Self {
        let status = match &err {
            TributeError::Validation(_) => StatusCode::BAD_REQUEST,
            TributeError::NotFound(_) => StatusCode::NOT_FOUND,
            TributeError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            TributeError::Backend(_) => {
                tracing::error!(error = %err, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        ApiError::new(status, err.code(), err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = rejection.body_text();
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::new(StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", message);
        }
        ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            rejection.body_text(),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let payload = ErrorResponse {
            error: self.message,
            code: self.code.to_string(),
        };
        (self.status, Json(payload)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize, ToSchema)]
pub(crate) struct HealthStatus {
    status: String,
}

pub enum BackendConfig {
    /// Process-local store and bucket; nothing survives a restart.
    InMemory,
    Hosted {
        database_url: String,
        storage: StorageConfig,
    },
}

pub struct AdminConfig {
    pub username: String,
    pub password_hash: String,
    pub shared_secret: String,
    pub session_secret: String,
    pub session_ttl_seconds: u64,
}

pub struct ApiConfig {
    pub addr: SocketAddr,
    pub backend: BackendConfig,
    pub admin: AdminConfig,
}

pub fn load_config(in_memory: bool) -> Result<ApiConfig> {
    let addr = config::socket_addr_from_env("TRIBUTES_API_ADDR", "0.0.0.0:8080")?;
    let backend = if in_memory {
        BackendConfig::InMemory
    } else {
        BackendConfig::Hosted {
            database_url: config::required_secret("DATABASE_URL")?,
            storage: load_storage_config()?,
        }
    };
    Ok(ApiConfig {
        addr,
        backend,
        admin: load_admin_config()?,
    })
}

fn load_storage_config() -> Result<StorageConfig> {
    let account = ServiceAccount {
        project_id: config::required_env("FIREBASE_PROJECT_ID")?,
        client_email: config::required_env("FIREBASE_CLIENT_EMAIL")?,
        private_key_pem: config::unescape_newlines(&config::required_secret(
            "FIREBASE_PRIVATE_KEY",
        )?),
    };
    Ok(StorageConfig {
        base_url: config::optional_env("FIREBASE_STORAGE_BASE_URL")
            .unwrap_or_else(|| firebase::DEFAULT_BASE_URL.to_string()),
        token_url: firebase::DEFAULT_TOKEN_URL.to_string(),
        bucket: config::required_env("FIREBASE_STORAGE_BUCKET")?,
        account,
    })
}

fn load_admin_config() -> Result<AdminConfig> {
    let shared_secret = config::required_secret("ADMIN_SECRET_KEY")?;
    let session_secret =
        config::optional_secret("ADMIN_SESSION_SECRET")?.unwrap_or_else(|| shared_secret.clone());
    Ok(AdminConfig {
        username: config::required_env("ADMIN_USERNAME")?,
        password_hash: config::required_secret("ADMIN_PASSWORD_HASH")?,
        shared_secret,
        session_secret,
        session_ttl_seconds: config::u64_from_env(
            "ADMIN_SESSION_TTL_SECONDS",
            DEFAULT_SESSION_TTL_SECONDS,
        )?,
    })
}

pub fn admin_gate(config: AdminConfig) -> Result<AdminGate> {
    AdminGate::new(
        config.username,
        config.password_hash,
        config.shared_secret,
        JwtConfig::admin_sessions(config.session_secret, config.session_ttl_seconds),
    )
}

pub async fn run(config: ApiConfig) -> Result<()> {
    logging::init(SERVICE_NAME);
    metrics::init(SERVICE_NAME);

    let mut listener: Option<JoinHandle<()>> = None;
    let (store, blobs): (Arc<dyn TributeStore>, Arc<dyn BlobStore>) = match config.backend {
        BackendConfig::InMemory => {
            tracing::warn!("using in-memory backends; tributes are lost on exit");
            let store: Arc<dyn TributeStore> = Arc::new(MemoryTributeStore::new());
            let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::default());
            (store, blobs)
        }
        BackendConfig::Hosted {
            database_url,
            storage,
        } => {
            let pool = db::connect(&database_url).await?;
            db::migrate(&pool).await?;
            let pg_store = PgTributeStore::new(pool);
            listener = Some(pg_store.spawn_change_listener());
            let store: Arc<dyn TributeStore> = Arc::new(pg_store);
            let blobs: Arc<dyn BlobStore> = Arc::new(FirebaseStorage::new(storage)?);
            (store, blobs)
        }
    };

    let repository = Arc::new(TributeRepository::new(store, blobs).await?);
    let gate = Arc::new(admin_gate(config.admin)?);
    let router = build_router(AppState::new(Arc::clone(&repository), gate));
    let router = http::apply_standard_layers(router, SERVICE_NAME);

    server::serve(config.addr, router, move || {
        repository.shutdown();
        if let Some(listener) = listener {
            listener.abort();
        }
    })
    .await
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(pages::home))
        .route("/tributes", get(pages::tributes))
        .route("/admin", get(pages::admin))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/openapi.json", get(openapi_json))
        .route(
            "/api/tributes",
            get(tributes::list_tributes).post(tributes::create_tribute),
        )
        .route(
            "/api/tributes/upload",
            post(tributes::upload_tribute).layer(DefaultBodyLimit::max(http::MAX_BODY_BYTES)),
        )
        .route("/api/tributes/live", get(live::live_feed))
        .route("/api/deleteTribute", delete(admin::delete_with_key))
        .route("/api/admin/login", post(admin::login))
        .route("/api/admin/logout", post(admin::logout))
        .route("/api/admin/me", get(admin::me))
        .route("/api/admin/tributes", get(admin::list_tributes))
        .route("/api/admin/tributes/:id", delete(admin::delete_tribute))
        .route(
            "/api/:id",
            get(tributes::get_tribute)
                .patch(tributes::update_tribute)
                .delete(tributes::delete_tribute),
        )
        .with_state(state)
}

async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    match state.repository.check_ready().await {
        Ok(_) => (StatusCode::OK, Json(HealthStatus { status: "ok".into() })),
        Err(err) => {
            tracing::warn!(error = %err, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthStatus {
                    status: "unavailable".into(),
                }),
            )
        }
    }
}

async fn metrics_endpoint() -> impl IntoResponse {
    metrics::metrics_response(SERVICE_NAME)
}

async fn openapi_json(headers: axum::http::HeaderMap) -> impl IntoResponse {
    let server_url = openapi::infer_server_url(&headers);
    Json(openapi::document(server_url.as_deref()))
}
