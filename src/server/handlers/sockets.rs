//! Duplex socket endpoint for task-change notifications.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::Response;

use crate::notify::Publisher;
use crate::server::AppState;

/// Subscribe the socket to task-change notifications for one run.
/// The run id is the subscriber's filter; payloads are run ids as text.
pub async fn pipeline_run_tasks_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(run_id): Path<i64>,
) -> Response {
    let publisher = state.task_events.clone();
    ws.on_upgrade(move |socket| run_socket(socket, publisher, run_id.to_string()))
}

async fn run_socket(mut socket: WebSocket, publisher: Publisher, filter: String) {
    let mut subscription = publisher.subscribe(filter).await;

    loop {
        tokio::select! {
            payload = subscription.recv() => {
                match payload {
                    Some(payload) => {
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    // Removed by the publisher (e.g. backpressure prune).
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    // Graceful close and unexpected disconnect both land
                    // here and route through the same removal path.
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    subscription.close().await;
}
