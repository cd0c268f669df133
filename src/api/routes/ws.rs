//! WebSocket push channel.
//!
//! Clients send `{"action":"subscribe","jobId":"..."}` or
//! `{"action":"unsubscribe","jobId":"..."}` text frames and receive one JSON
//! [`JobFrame`] per job event. Each subscribed job starts with its current
//! state and ends with exactly one terminal frame. Errors are reported as
//! [`ApiError`] frames on the same socket.

use super::{parse_job_id, unknown_job};
use crate::MediaDownloader;
use crate::api::AppState;
use crate::error::{ApiError, Error, JobError};
use crate::notifications::Subscription;
use crate::types::{JobFrame, JobId};
use axum::{
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Outbound frames buffered per connection before forwarders wait
const OUTBOUND_BUFFER: usize = 64;

/// Query parameters for GET /ws
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct WsQuery {
    /// Job to subscribe to right after the upgrade
    #[serde(rename = "jobId")]
    pub job_id: Option<String>,
}

/// Text frames accepted from clients
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum ClientMessage {
    Subscribe {
        #[serde(rename = "jobId")]
        job_id: String,
    },
    Unsubscribe {
        #[serde(rename = "jobId")]
        job_id: String,
    },
}

/// GET /ws - Push channel for any number of jobs
#[utoipa::path(
    get,
    path = "/ws",
    tag = "events",
    params(WsQuery),
    responses(
        (status = 101, description = "Switching to WebSocket; frames are JSON JobFrame objects", body = crate::types::JobFrame),
        (status = 404, description = "Unknown job in `jobId`", body = crate::error::ApiError)
    )
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    let initial = match query.job_id.as_deref() {
        Some(raw) => match subscribe_raw(&state.downloader, raw) {
            Ok(subscription) => Some(subscription),
            Err(response) => return response,
        },
        None => None,
    };

    let downloader = state.downloader.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, downloader, initial, false))
}

/// GET /jobs/:id/ws - Push channel for a single job
///
/// The server closes the socket after the terminal frame.
#[utoipa::path(
    get,
    path = "/jobs/{id}/ws",
    tag = "events",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 101, description = "Switching to WebSocket; frames are JSON JobFrame objects", body = crate::types::JobFrame),
        (status = 404, description = "Unknown or evicted job", body = crate::error::ApiError)
    )
)]
pub async fn job_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Response {
    let subscription = match subscribe_raw(&state.downloader, &raw) {
        Ok(subscription) => subscription,
        Err(response) => return response,
    };

    let downloader = state.downloader.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, downloader, Some(subscription), true))
}

fn subscribe_raw(downloader: &MediaDownloader, raw: &str) -> Result<Subscription, Response> {
    let id = parse_job_id(raw)?;
    downloader.subscribe(id).map_err(IntoResponse::into_response)
}

/// Manage one upgraded connection
///
/// A sender task drains the outbound channel into the socket; every
/// subscribed job gets a forwarder task feeding that channel. Inbound frames
/// are handled on the current task.
async fn handle_socket(
    socket: WebSocket,
    downloader: Arc<MediaDownloader>,
    initial: Option<Subscription>,
    close_when_done: bool,
) {
    let conn_id = uuid::Uuid::new_v4();
    tracing::info!(conn_id = %conn_id, "WebSocket connected");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);

    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sink.send(message).await.is_err() {
                tracing::debug!(conn_id = %conn_id, "WebSocket sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let mut forwarders: HashMap<JobId, JoinHandle<()>> = HashMap::new();
    if let Some(subscription) = initial {
        let job_id = subscription.job_id();
        forwarders.insert(
            job_id,
            spawn_forwarder(subscription, tx.clone(), close_when_done),
        );
    }

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                handle_client_message(&text, &downloader, &tx, &mut forwarders, conn_id).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    for (_, forwarder) in forwarders.drain() {
        forwarder.abort();
    }
    drop(tx);
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}

async fn handle_client_message(
    text: &str,
    downloader: &MediaDownloader,
    tx: &mpsc::Sender<Message>,
    forwarders: &mut HashMap<JobId, JoinHandle<()>>,
    conn_id: uuid::Uuid,
) {
    forwarders.retain(|_, forwarder| !forwarder.is_finished());

    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(conn_id = %conn_id, error = %e, "unrecognized WebSocket message");
            let error = Error::Job(JobError::invalid(format!("unrecognized message: {e}")));
            send_error(tx, error.into()).await;
            return;
        }
    };

    match message {
        ClientMessage::Subscribe { job_id: raw } => {
            let Ok(job_id) = raw.parse::<JobId>() else {
                send_error(tx, unknown_job(&raw)).await;
                return;
            };
            if forwarders.contains_key(&job_id) {
                return;
            }
            match downloader.subscribe(job_id) {
                Ok(subscription) => {
                    tracing::debug!(conn_id = %conn_id, job_id = %job_id, "subscribed");
                    forwarders.insert(job_id, spawn_forwarder(subscription, tx.clone(), false));
                }
                Err(e) => send_error(tx, e.into()).await,
            }
        }
        ClientMessage::Unsubscribe { job_id: raw } => {
            let Ok(job_id) = raw.parse::<JobId>() else {
                return;
            };
            if let Some(forwarder) = forwarders.remove(&job_id) {
                forwarder.abort();
                tracing::debug!(conn_id = %conn_id, job_id = %job_id, "unsubscribed");
            }
        }
    }
}

/// Forward one job's events as JSON frames until its terminal frame
fn spawn_forwarder(
    mut subscription: Subscription,
    tx: mpsc::Sender<Message>,
    close_when_done: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            let frame = JobFrame::from(&event);
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(job_id = %frame.job_id, error = %e, "failed to serialize frame");
                    continue;
                }
            };
            if tx.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
        if close_when_done {
            let _ = tx.send(Message::Close(None)).await;
        }
    })
}

async fn send_error(tx: &mpsc::Sender<Message>, body: ApiError) {
    if let Ok(text) = serde_json::to_string(&body) {
        let _ = tx.send(Message::Text(text)).await;
    }
}
