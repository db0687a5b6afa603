//! WebSocket viewers of the live stream
//!
//! Each connection registers one viewer with the coordinator and forwards its
//! chunks as binary frames. Frames sent by the browser are ignored.

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use camrelay_core::stream::{CoordinatorHandle, ViewerSubscription, CLOSE_NOT_CONNECTED};
use camrelay_core::Error;

use crate::http::AppState;

/// GET /api/stream (WebSocket upgrade)
pub async fn stream_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_viewer(socket, state.coordinator))
}

async fn serve_viewer(mut socket: WebSocket, coordinator: CoordinatorHandle) {
    let subscription = match coordinator.register_viewer().await {
        Ok(subscription) => subscription,
        Err(e) => {
            let reason = match e {
                Error::NotConnected(_) => CLOSE_NOT_CONNECTED.to_string(),
                other => {
                    warn!(error = %other, "Could not register viewer");
                    "Internal server error".to_string()
                }
            };
            let _ = socket.send(close_frame(reason)).await;
            return;
        }
    };

    let ViewerSubscription {
        id,
        mut chunks,
        mut closed,
    } = subscription;
    info!(viewer_id = %id, "Viewer connected");

    let (mut sender, mut receiver) = socket.split();
    let reason = loop {
        tokio::select! {
            reason = &mut closed => break reason.ok(),
            chunk = chunks.recv() => match chunk {
                Some(chunk) => {
                    if let Err(e) = sender.send(Message::Binary(chunk)).await {
                        debug!(viewer_id = %id, error = %e, "Failed to send chunk");
                        break None;
                    }
                }
                // the handle is dropped right after a close reason is sent
                None => break closed.try_recv().ok(),
            },
            message = receiver.next() => match message {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break None,
                Some(Ok(_)) => {}
            },
        }
    };

    if let Some(reason) = reason {
        info!(viewer_id = %id, %reason, "Closing viewer");
        let _ = sender.send(close_frame(reason.as_str().to_string())).await;
    }
    coordinator.deregister_viewer(id.clone()).await;
    info!(viewer_id = %id, "Viewer disconnected");
}

fn close_frame(reason: String) -> Message {
    Message::Close(Some(CloseFrame {
        code: close_code::ERROR,
        reason: reason.into(),
    }))
}
