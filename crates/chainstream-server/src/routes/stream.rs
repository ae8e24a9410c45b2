use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use chainstream::models::input::Input;
use futures::{stream::StreamExt, Stream};
use http::{header, HeaderValue};
use serde_json::{json, Map, Value};
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

/// Newline delimited JSON records, sent as they are produced
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> Response {
        let body = axum::body::Body::from_stream(self);

        let mut response = Response::new(body);
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/event-stream"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        response
    }
}

struct RecordFormatter;

impl RecordFormatter {
    fn format(record: &Value) -> String {
        format!("{}\n", record)
    }

    fn format_event(event: Map<String, Value>) -> String {
        Self::format(&Value::Object(event))
    }

    fn format_metadata(run_id: &str) -> String {
        Self::format(&json!({"event": "metadata", "data": {"run_id": run_id}}))
    }

    fn format_error(message: &str) -> String {
        Self::format(&json!({"event": "error", "data": {"message": message}}))
    }

    fn format_end() -> String {
        Self::format(&json!({"event": "end"}))
    }
}

async fn stream_handler(
    State(state): State<AppState>,
    Json(request): Json<Input>,
) -> SseResponse {
    // Create channel for streaming
    let (tx, rx) = mpsc::channel(100);
    let stream = ReceiverStream::new(rx);

    let run_id = Uuid::new_v4().to_string();
    tracing::info!(run_id = %run_id, messages = request.input.messages.len(), "streaming turn");

    // Spawn task to handle streaming
    tokio::spawn(async move {
        if tx.send(RecordFormatter::format_metadata(&run_id)).await.is_err() {
            return;
        }

        let mut events = state.chain.stream_events(request.input);

        loop {
            match timeout(Duration::from_millis(500), events.next()).await {
                Ok(Some(Ok(event))) => {
                    if let Err(e) = tx.send(RecordFormatter::format_event(event)).await {
                        tracing::error!(
                            run_id = %run_id,
                            "Error sending event through channel: {}",
                            e
                        );
                        return;
                    }
                }
                Ok(Some(Err(e))) => {
                    tracing::error!(run_id = %run_id, "Error streaming events: {:#}", e);
                    let _ = tx.send(RecordFormatter::format_error(&e.to_string())).await;
                    return;
                }
                Ok(None) => break,
                Err(_) => {
                    // Heartbeat, used to detect disconnected clients and stop pulling events
                    if tx.is_closed() {
                        tracing::info!(run_id = %run_id, "Client disconnected");
                        return;
                    }
                }
            }
        }

        let _ = tx.send(RecordFormatter::format_end()).await;
    });

    SseResponse::new(stream)
}

// Aggregate the whole turn into a single message, non streaming
async fn invoke_handler(
    State(state): State<AppState>,
    Json(request): Json<Input>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.chain.invoke(request.input).await {
        Ok(message) => Ok(Json(json!(message))),
        Err(e) => {
            tracing::error!("Error invoking chain: {:#}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            ))
        }
    }
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/stream_events", post(stream_handler))
        .route("/invoke", post(invoke_handler))
        .with_state(state)
}
