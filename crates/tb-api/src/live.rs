use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tb_core::Tribute;

use crate::AppState;

/// Frames pushed to live clients. Every frame carries the full ordered list.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum LiveFrame<'a> {
    Snapshot { tributes: &'a [Tribute] },
}

pub async fn live_feed(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let mut feed = state.repository.listen();
    tracing::debug!("live feed client connected");

    loop {
        tokio::select! {
            snapshot = feed.next() => {
                let Some(snapshot) = snapshot else {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                };
                if let Err(err) = send_snapshot(&mut sender, &snapshot).await {
                    tracing::debug!(error = %err, "live feed client went away");
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::debug!("live feed client disconnected");
}

async fn send_snapshot(
    sender: &mut SplitSink<WebSocket, Message>,
    tributes: &[Tribute],
) -> anyhow::Result<()> {
    let text = serde_json::to_string(&LiveFrame::Snapshot { tributes })?;
    sender.send(Message::Text(text.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn snapshot_frames_are_tagged() {
        let tributes = vec![Tribute {
            id: "t1".to_string(),
            name: "Asha".to_string(),
            message: "Rest well".to_string(),
            photo_url: None,
            date: Utc.with_ymd_and_hms(2025, 10, 16, 8, 0, 0).unwrap(),
        }];
        let value = serde_json::to_value(LiveFrame::Snapshot {
            tributes: &tributes,
        })
        .unwrap();
        assert_eq!(value["type"], "snapshot");
        assert_eq!(value["tributes"][0]["name"], "Asha");
        assert!(value["tributes"][0].get("photoUrl").is_none());
    }
}
