use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tb_core::admin::AdminSession;
use tb_core::{PhotoUpload, Result, Subscription, Tribute, TributeError};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::backend::{AdminBackend, BoardBackend, SnapshotCallback};

/// Client for the tribute board HTTP API.
#[derive(Clone)]
pub struct HttpClient {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct CreatedBody {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginBody {
    token: String,
    username: String,
    expires_at: i64,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum LiveFrame {
    Snapshot { tributes: Vec<Tribute> },
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            return Err(TributeError::validation("base url is empty"));
        }
        Ok(Self {
            base_url: trimmed.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        })
    }

    pub async fn list_tributes(&self) -> Result<Vec<Tribute>> {
        let resp = self.request(Method::GET, "/api/tributes").send().await?;
        decode(resp).await
    }

    pub async fn get_tribute(&self, id: &str) -> Result<Option<Tribute>> {
        let resp = self
            .request(Method::GET, &format!("/api/{}", encode_segment(id)))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(resp).await.map(Some)
    }

    pub async fn create_tribute(&self, name: &str, message: &str) -> Result<String> {
        let resp = self
            .request(Method::POST, "/api/tributes")
            .json(&json!({ "name": name, "message": message }))
            .send()
            .await?;
        let body: CreatedBody = decode(resp).await?;
        Ok(body.id)
    }

    pub async fn upload_tribute(
        &self,
        name: &str,
        message: &str,
        photo: PhotoUpload,
    ) -> Result<String> {
        let part = Part::bytes(photo.bytes.to_vec())
            .file_name(photo.file_name)
            .mime_str(&photo.content_type)?;
        let form = Form::new()
            .text("name", name.to_string())
            .text("message", message.to_string())
            .part("photo", part);
        let resp = self
            .request(Method::POST, "/api/tributes/upload")
            .multipart(form)
            .send()
            .await?;
        let body: CreatedBody = decode(resp).await?;
        Ok(body.id)
    }

    pub async fn update_message(&self, id: &str, message: &str) -> Result<()> {
        let resp = self
            .request(Method::PATCH, &format!("/api/{}", encode_segment(id)))
            .json(&json!({ "message": message }))
            .send()
            .await?;
        ensure_success(resp).await
    }

    pub async fn delete_tribute(&self, id: &str) -> Result<()> {
        let resp = self
            .request(Method::DELETE, &format!("/api/{}", encode_segment(id)))
            .send()
            .await?;
        ensure_success(resp).await
    }

    /// Shared-secret delete; `auth_key` must match the server's admin key.
    pub async fn delete_with_key(
        &self,
        id: &str,
        photo_url: Option<&str>,
        auth_key: &str,
    ) -> Result<()> {
        let resp = self
            .request(Method::DELETE, "/api/deleteTribute")
            .json(&json!({ "id": id, "photoUrl": photo_url, "authKey": auth_key }))
            .send()
            .await?;
        ensure_success(resp).await
    }

    pub async fn admin_login(&self, username: &str, password: &str) -> Result<AdminSession> {
        let resp = self
            .request(Method::POST, "/api/admin/login")
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;
        let body: LoginBody = decode(resp).await?;
        Ok(AdminSession {
            token: body.token,
            username: body.username,
            expires_at: body.expires_at,
        })
    }

    pub async fn admin_tributes(&self, token: &str) -> Result<Vec<Tribute>> {
        let resp = self
            .request(Method::GET, "/api/admin/tributes")
            .bearer_auth(token)
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn admin_delete(&self, token: &str, id: &str) -> Result<()> {
        let resp = self
            .request(
                Method::DELETE,
                &format!("/api/admin/tributes/{}", encode_segment(id)),
            )
            .bearer_auth(token)
            .send()
            .await?;
        ensure_success(resp).await
    }

    /// Opens the live feed. The first snapshot is the current list.
    pub async fn live(&self) -> Result<LiveStream> {
        let url = format!("{}/api/tributes/live", websocket_base(&self.base_url));
        let (socket, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|err| TributeError::backend(format!("live feed connect failed: {err}")))?;
        tracing::debug!(url = %url, "live feed connected");
        Ok(LiveStream { socket })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        self.http.request(method, url)
    }
}

/// Snapshots received over the live WebSocket.
pub struct LiveStream {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl LiveStream {
    /// `None` once the server closes the feed.
    pub async fn next(&mut self) -> Option<Result<Vec<Tribute>>> {
        while let Some(message) = self.socket.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    return Some(
                        serde_json::from_str::<LiveFrame>(&text)
                            .map(|LiveFrame::Snapshot { tributes }| tributes)
                            .map_err(TributeError::from),
                    );
                }
                Ok(Message::Close(_)) => return None,
                Ok(_) => {}
                Err(err) => return Some(Err(TributeError::backend(err.to_string()))),
            }
        }
        None
    }

    pub async fn close(mut self) {
        let _ = self.socket.close(None).await;
    }
}

#[async_trait]
impl BoardBackend for HttpClient {
    async fn create(
        &self,
        name: &str,
        message: &str,
        photo: Option<PhotoUpload>,
    ) -> Result<String> {
        match photo.filter(|photo| !photo.is_empty()) {
            Some(photo) => self.upload_tribute(name, message, photo).await,
            None => self.create_tribute(name, message).await,
        }
    }

    async fn update_message(&self, id: &str, message: &str) -> Result<()> {
        HttpClient::update_message(self, id, message).await
    }

    /// The server looks the photo up from the stored document.
    async fn delete(&self, id: &str, _photo_url: Option<&str>) -> Result<()> {
        self.delete_tribute(id).await
    }

    async fn subscribe(&self, mut on_change: SnapshotCallback) -> Result<Subscription> {
        let mut stream = self.live().await?;
        let initial = stream
            .next()
            .await
            .unwrap_or_else(|| Err(TributeError::backend("live feed closed before first snapshot")))?;
        on_change(Arc::new(initial));

        let task = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(tributes) => on_change(Arc::new(tributes)),
                    Err(err) => {
                        tracing::error!(error = %err, "live feed failed");
                        break;
                    }
                }
            }
            tracing::debug!("live feed ended");
        });
        Ok(Subscription::from_task(&task))
    }
}

#[async_trait]
impl AdminBackend for HttpClient {
    async fn login(&self, username: &str, password: &str) -> Result<AdminSession> {
        self.admin_login(username, password).await
    }

    async fn list(&self, token: &str) -> Result<Vec<Tribute>> {
        self.admin_tributes(token).await
    }

    async fn delete(&self, token: &str, id: &str) -> Result<()> {
        self.admin_delete(token, id).await
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(status_error(status, &body));
    }
    Ok(serde_json::from_str(&body)?)
}

async fn ensure_success(resp: reqwest::Response) -> Result<()> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let body = resp.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

fn status_error(status: StatusCode, body: &str) -> TributeError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|body| body.error)
        .unwrap_or_else(|_| format!("{status}: {body}"));
    match status {
        StatusCode::BAD_REQUEST => TributeError::validation(message),
        StatusCode::NOT_FOUND => {
            let what = message.strip_suffix(" not found").unwrap_or(&message);
            TributeError::not_found(what)
        }
        StatusCode::UNAUTHORIZED => TributeError::unauthorized(message),
        _ => TributeError::backend(message),
    }
}

fn websocket_base(base_url: &str) -> String {
    if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base_url.to_string()
    }
}

fn encode_segment(id: &str) -> String {
    tb_core::blob::encode_object_name(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ActionOutcome, AdminMode, AdminView, BoardView};
    use std::net::SocketAddr;
    use std::sync::OnceLock;
    use std::time::Duration;
    use tb_api::{build_router, AppState};
    use tb_core::admin::{hash_password, AdminGate};
    use tb_core::auth::JwtConfig;
    use tb_core::blob::MemoryBlobStore;
    use tb_core::store::MemoryTributeStore;
    use tb_core::TributeRepository;
    use tokio::net::TcpListener;
    use tokio::time::{sleep, timeout};

    const PASSWORD: &str = "munde@006";
    const SHARED_SECRET: &str = "shared-secret";

    fn password_hash() -> &'static str {
        static HASH: OnceLock<String> = OnceLock::new();
        HASH.get_or_init(|| hash_password(PASSWORD).expect("hash password"))
    }

    async fn spawn_server() -> (SocketAddr, Arc<TributeRepository>) {
        let repository = Arc::new(
            TributeRepository::new(
                Arc::new(MemoryTributeStore::new()),
                Arc::new(MemoryBlobStore::default()),
            )
            .await
            .expect("repository"),
        );
        let gate = AdminGate::new(
            "admin",
            password_hash(),
            SHARED_SECRET,
            JwtConfig::admin_sessions("session-secret", 3600),
        )
        .expect("gate");
        let app = build_router(AppState::new(Arc::clone(&repository), Arc::new(gate)));
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("server");
        });
        (addr, repository)
    }

    #[test]
    fn websocket_base_follows_scheme() {
        assert_eq!(websocket_base("http://localhost:8080"), "ws://localhost:8080");
        assert_eq!(websocket_base("https://tributes.example"), "wss://tributes.example");
    }

    #[test]
    fn error_bodies_map_to_error_kinds() {
        let body = r#"{"error":"tribute not found","code":"NOT_FOUND"}"#;
        assert_eq!(
            status_error(StatusCode::NOT_FOUND, body),
            TributeError::not_found("tribute")
        );
        assert_eq!(
            status_error(StatusCode::UNAUTHORIZED, r#"{"error":"Unauthorized"}"#),
            TributeError::unauthorized("Unauthorized")
        );
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "upstream"),
            TributeError::Backend(_)
        ));
    }

    #[test]
    fn empty_base_url_is_rejected() {
        assert!(HttpClient::new("  ").is_err());
    }

    #[tokio::test]
    async fn crud_round_trip_over_http() {
        let (addr, _repository) = spawn_server().await;
        let client = HttpClient::new(format!("http://{addr}")).expect("client");

        let id = client
            .create_tribute("Asha", "Rest well")
            .await
            .expect("create");
        let tribute = client.get_tribute(&id).await.expect("get").expect("exists");
        assert_eq!(tribute.name, "Asha");
        assert!(tribute.photo_url.is_none());

        client
            .update_message(&id, "Always")
            .await
            .expect("update");
        let list = client.list_tributes().await.expect("list");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].message, "Always");

        let err = client
            .create_tribute("", "x")
            .await
            .expect_err("validation");
        assert!(matches!(err, TributeError::Validation(_)));

        client.delete_tribute(&id).await.expect("delete");
        assert!(client.get_tribute(&id).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn upload_and_shared_key_delete() {
        let (addr, _repository) = spawn_server().await;
        let client = HttpClient::new(format!("http://{addr}")).expect("client");

        let id = client
            .upload_tribute(
                "Asha",
                "Rest well",
                PhotoUpload::new("asha.png", "image/png", &b"png"[..]),
            )
            .await
            .expect("upload");
        let tribute = client.get_tribute(&id).await.expect("get").expect("exists");
        let photo_url = tribute.photo_url.expect("photo url");

        let err = client
            .delete_with_key(&id, Some(&photo_url), "wrong")
            .await
            .expect_err("wrong key");
        assert!(matches!(err, TributeError::Unauthorized(_)));
        assert_eq!(client.list_tributes().await.expect("list").len(), 1);

        client
            .delete_with_key(&id, Some(&photo_url), SHARED_SECRET)
            .await
            .expect("delete");
        assert!(client.list_tributes().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn live_stream_starts_with_current_state() {
        let (addr, repository) = spawn_server().await;
        TributeRepository::create(&repository, "Asha", "Rest well", None)
            .await
            .expect("create");
        timeout(Duration::from_secs(5), async {
            while repository.current().is_empty() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("feed caught up");
        let client = HttpClient::new(format!("http://{addr}")).expect("client");

        let mut stream = client.live().await.expect("connect");
        let first = timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("first frame")
            .expect("open")
            .expect("decode");
        assert_eq!(first.len(), 1);

        TributeRepository::create(&repository, "Baraka", "Go well", None)
            .await
            .expect("create");
        let second = timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("second frame")
            .expect("open")
            .expect("decode");
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].name, "Baraka");
        stream.close().await;
    }

    #[tokio::test]
    async fn board_view_over_http() {
        let (addr, _repository) = spawn_server().await;
        let client = HttpClient::new(format!("http://{addr}")).expect("client");
        let view = BoardView::new(client);

        assert_eq!(view.mount().await, ActionOutcome::Completed);
        view.set_name("Asha");
        view.set_message("Rest well");
        assert_eq!(view.submit().await, ActionOutcome::Completed);

        timeout(Duration::from_secs(5), async {
            while view.tributes().is_empty() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("snapshot");
        assert_eq!(view.tributes()[0].name, "Asha");
        view.unmount();
    }

    #[tokio::test]
    async fn admin_view_over_http() {
        let (addr, repository) = spawn_server().await;
        TributeRepository::create(&repository, "Asha", "Rest well", None)
            .await
            .expect("create");
        let client = HttpClient::new(format!("http://{addr}")).expect("client");
        let view = AdminView::new(client);

        assert!(matches!(
            view.login("admin", "guess").await,
            ActionOutcome::Failed(TributeError::Unauthorized(_))
        ));
        assert_eq!(view.mode(), AdminMode::Login);

        assert_eq!(view.login("admin", PASSWORD).await, ActionOutcome::Completed);
        assert_eq!(view.mode(), AdminMode::Authenticated);
        let id = view.tributes()[0].id.clone();

        assert_eq!(view.delete(&id).await, ActionOutcome::Completed);
        assert!(view.tributes().is_empty());
    }
}
