use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::info;

use crate::progress::ProgressHub;
use crate::AppContext;

pub fn progress_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/ws/progress", get(progress_ws))
        .with_state(ctx)
}

#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    pub task_id: String,
}

/// Upgrades to a WebSocket that observes one task's progress topic.
pub async fn progress_ws(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<ProgressQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| observe(socket, ctx.hub.clone(), query.task_id))
}

async fn observe(socket: WebSocket, hub: Arc<ProgressHub>, task_id: String) {
    let mut session = hub.subscribe(&task_id);
    let (mut sender, mut receiver) = socket.split();

    let welcome = format!("progress channel connected for {}", task_id);
    if sender.send(Message::Text(welcome)).await.is_err() {
        hub.unsubscribe(&session);
        return;
    }

    loop {
        tokio::select! {
            event = session.receiver.recv() => match event {
                Some(event) => {
                    if sender.send(Message::Text(event.text)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            // inbound frames are ignored; a close or transport error ends the session
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
        }
    }

    hub.unsubscribe(&session);
    info!("Progress observer for {} disconnected", task_id);
}
