//! Ingress request handlers
//!
//! # Supported Endpoints
//!
//! * `POST /upload` - Queue the body under the `Name` header
//! * `GET /health` - Liveness plus current queue length
//! * `GET /dead-letters` - Entries the retry policy gave up on
//! * All other requests return 404 (405 for other methods on `/upload`)

use super::response::{empty_response, json_response, text_response};
use super::AppState;
use crate::metrics;
use crate::queue::{Entry, QueueError};
use bytes::{Bytes, BytesMut};
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::header::{ALLOW, RETRY_AFTER};
use hyper::{Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Header naming the uploaded file
pub const NAME_HEADER: &str = "name";

/// Suggested wait, in seconds, when the queue has no room
const RETRY_AFTER_SECS: &str = "5";

/// Route an ingress request
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (&method, path.as_str()) {
        (&Method::POST, "/upload") => upload(req, &state).await,
        (_, "/upload") => {
            let mut response = empty_response(StatusCode::METHOD_NOT_ALLOWED);
            response
                .headers_mut()
                .insert(ALLOW, hyper::header::HeaderValue::from_static("POST"));
            response
        }
        (&Method::GET, "/health") => json_response(
            StatusCode::OK,
            &serde_json::json!({ "status": "ok", "queued": state.queue.len() }),
        ),
        (&Method::GET, "/dead-letters") => {
            json_response(StatusCode::OK, &state.dead_letters.snapshot())
        }
        _ => text_response(StatusCode::NOT_FOUND, "text/plain", "Not Found"),
    };
    Ok(response)
}

/// Extract a usable file name from the `Name` header
fn upload_name<B>(req: &Request<B>) -> Option<String> {
    req.headers()
        .get(NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Read the whole body. On a read error, keep what arrived before it.
async fn read_body<B>(body: B) -> (Bytes, Option<String>)
where
    B: Body<Data = Bytes>,
    B::Error: Display,
{
    let mut body = std::pin::pin!(body);
    let mut buf = BytesMut::new();

    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                if let Ok(data) = frame.into_data() {
                    buf.extend_from_slice(&data);
                }
            }
            Err(e) => return (buf.freeze(), Some(e.to_string())),
        }
    }

    (buf.freeze(), None)
}

async fn upload<B>(req: Request<B>, state: &AppState) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Display,
{
    let Some(name) = upload_name(&req) else {
        warn!("Upload rejected: missing Name header");
        metrics::record_ingress_rejected("missing_name");
        return empty_response(StatusCode::BAD_REQUEST);
    };

    let (content, read_error) = read_body(req.into_body()).await;
    if let Some(e) = read_error {
        error!(name = %name, bytes_read = content.len(), "Error reading body, {}", e);
    }

    let entry = Entry::new(name, content);
    let (id, size) = (entry.id, entry.len());
    let name = entry.name.clone();

    let pushed = match state.enqueue_timeout {
        Some(timeout) => state.queue.push_timeout(entry, timeout).await,
        None => state.queue.push(entry).await,
    };

    match pushed {
        Ok(()) => {
            info!(entry.id = %id, "Queued file {} with size {}", name, size);
            metrics::record_entry_queued(size);
            metrics::set_queue_depth(state.queue.len());
            empty_response(StatusCode::OK)
        }
        Err(e) => {
            warn!(name = %name, error = %e, "Upload refused");
            metrics::record_ingress_rejected("queue_full");
            let mut response = text_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "text/plain",
                match e {
                    QueueError::Full(_) => "queue full, retry later",
                    QueueError::Closed => "shutting down",
                },
            );
            response
                .headers_mut()
                .insert(RETRY_AFTER, hyper::header::HeaderValue::from_static(RETRY_AFTER_SECS));
            response
        }
    }
}
