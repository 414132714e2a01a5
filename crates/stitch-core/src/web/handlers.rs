//! HTTP endpoint handlers.

#![allow(clippy::missing_errors_doc)]

use std::io;

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::access_log::{forwarded_client, AccessEntry};
use crate::error::Error;
use crate::protocol;
use crate::transfer::{AssembledArtifact, IngestReport, TransferSummary};

use super::error::{ApiError, ApiResult, IntoApiResult};
use super::state::AppState;

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Library version
    version: &'static str,
    /// Transfers still collecting or assembling
    active_transfers: usize,
    /// Finished transfers still remembered
    archived_transfers: usize,
    /// Access log lines dropped
    dropped_log_lines: u64,
    /// Seconds since start
    uptime_secs: u64,
}

/// Result of an append.
#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    /// Artifact name
    name: String,
    /// Size after the append
    size: u64,
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn artifact_name(headers: &HeaderMap) -> ApiResult<String> {
    let name = header_str(headers, protocol::FILENAME)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("missing {} header", protocol::FILENAME)))?;
    crate::file::validate_artifact_name(name).into_api_result()?;
    Ok(name.to_string())
}

fn sink_error(name: &str, err: io::Error) -> ApiError {
    match err.kind() {
        io::ErrorKind::NotFound => Error::ArtifactNotFound(name.to_string()).into(),
        io::ErrorKind::InvalidInput => Error::Validation(err.to_string()).into(),
        _ => err.into(),
    }
}

fn upload_response(report: &IngestReport) -> Response {
    let outcome = &report.outcome;
    let pairs = [
        (protocol::CHUNKS_RECEIVED, outcome.received_count.to_string()),
        (protocol::TOTAL_CHUNKS, outcome.total_chunks.to_string()),
        (protocol::TRANSFER_COMPLETE, report.is_complete().to_string()),
    ];

    let mut response = StatusCode::OK.into_response();
    for (name, value) in pairs {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name),
            HeaderValue::try_from(value),
        ) {
            response.headers_mut().insert(name, value);
        }
    }
    response
}

/// POST /upload - Ingest one chunk.
pub async fn upload(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let mut entry = AccessEntry::new("POST", protocol::UPLOAD_PATH);
    entry.client = header_str(&headers, "X-Forwarded-For").and_then(forwarded_client);
    entry.bytes = body.len();

    let chunk = protocol::parse_chunk_headers(
        |name| headers.get(name).map(HeaderValue::as_bytes),
        body.to_vec(),
    );
    let response = match chunk {
        Ok(chunk) => {
            entry.file_name = Some(chunk.file_name.clone());
            entry.chunk = Some((chunk.index, chunk.total_chunks));
            match state.collector.ingest(chunk).await {
                Ok(report) => upload_response(&report),
                Err(e) => ApiError::from(e).into_response(),
            }
        }
        Err(e) => {
            entry.file_name = header_str(&headers, protocol::FILENAME).map(str::to_string);
            ApiError::from(e).into_response()
        }
    };

    entry.status = response.status().as_u16();
    state.access_log.record(&entry);
    response
}

/// POST|PUT /update - Append the body to an assembled file.
pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<UpdateResponse>> {
    let name = artifact_name(&headers)?;
    let size = state
        .sink()
        .append(&name, body.to_vec())
        .await
        .map_err(|e| sink_error(&name, e))?;

    tracing::info!(file = %name, appended = body.len(), size, "Updated artifact");
    Ok(Json(UpdateResponse { name, size }))
}

/// POST|DELETE /delete - Delete an assembled file.
pub async fn delete(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<StatusCode> {
    let name = artifact_name(&headers)?;
    state
        .sink()
        .remove(&name)
        .await
        .map_err(|e| sink_error(&name, e))?;

    tracing::info!(file = %name, "Deleted artifact");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /files/{name} - Download an assembled file.
pub async fn get_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    crate::file::validate_artifact_name(&name).into_api_result()?;
    let bytes = state
        .sink()
        .read(&name)
        .await
        .map_err(|e| sink_error(&name, e))?;

    Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, bytes.len())
        .body(Body::from(bytes))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {e}")))
}

/// GET /transfers/{id} - Transfer summary.
pub async fn get_transfer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TransferSummary>> {
    state.collector.summary(&id).await.into_api_result().map(Json)
}

/// POST /transfers/{id}/assemble - Retry a failed assembly write.
pub async fn retry_assembly(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AssembledArtifact>> {
    state
        .collector
        .retry_assembly(&id)
        .await
        .into_api_result()
        .map(Json)
}

/// GET /status - Server counters.
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let registry = state.collector.registry();
    Json(StatusResponse {
        version: crate::VERSION,
        active_transfers: registry.active_count().await,
        archived_transfers: registry.archived_count().await,
        dropped_log_lines: state.access_log.dropped(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::Request;
    use axum::Router;
    use tower::ServiceExt;

    use super::*;
    use crate::access_log::AccessLog;
    use crate::config::TransferConfig;
    use crate::sink::MemorySink;
    use crate::transfer::Collector;

    fn setup() -> (Router, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let collector = Arc::new(Collector::new(sink.clone(), TransferConfig::default()));
        let state = AppState::new(collector, AccessLog::disabled());
        (crate::web::router(state, 1024), sink)
    }

    fn chunk_request(name: &str, index: &str, total: &str, body: &[u8]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(protocol::FILENAME, name)
            .header(protocol::CHUNK_NUMBER, index)
            .header(protocol::TOTAL_CHUNKS, total)
            .body(Body::from(body.to_vec()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_upload_sets_progress_headers() {
        let (router, sink) = setup();

        let response = router
            .clone()
            .oneshot(chunk_request("a.txt", "1", "2", b"B"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[protocol::CHUNKS_RECEIVED], "1");
        assert_eq!(response.headers()[protocol::TRANSFER_COMPLETE], "false");

        let response = router
            .oneshot(chunk_request("a.txt", "0", "2", b"A"))
            .await
            .unwrap();
        assert_eq!(response.headers()[protocol::TRANSFER_COMPLETE], "true");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(body.is_empty());
        assert_eq!(sink.get("a.txt").unwrap(), b"AB");
    }

    #[tokio::test]
    async fn test_upload_rejects_bad_metadata() {
        let (router, _sink) = setup();

        let response = router
            .clone()
            .oneshot(chunk_request("a.txt", "abc", "2", b"x"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "E001");

        let response = router
            .clone()
            .oneshot(chunk_request("../a.txt", "0", "1", b"x"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let missing = Request::builder()
            .method("POST")
            .uri("/upload")
            .body(Body::from("x"))
            .unwrap();
        let response = router.oneshot(missing).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_rejects_unreadable_transfer_id() {
        let (router, sink) = setup();

        let mut request = chunk_request("id.txt", "0", "1", b"x");
        request.headers_mut().insert(
            protocol::TRANSFER_ID,
            HeaderValue::from_bytes(b"\xffid").unwrap(),
        );
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "E001");
        assert!(sink.get("id.txt").is_none());

        let summary = Request::builder()
            .uri("/transfers/id.txt")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(summary).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upload_body_limit() {
        let (router, _sink) = setup();
        let response = router
            .oneshot(chunk_request("big.bin", "0", "1", &[0u8; 2048]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_update_delete_and_download() {
        let (router, sink) = setup();
        router
            .clone()
            .oneshot(chunk_request("log.txt", "0", "1", b"one"))
            .await
            .unwrap();

        let update = Request::builder()
            .method("PUT")
            .uri("/update")
            .header(protocol::FILENAME, "log.txt")
            .body(Body::from("two"))
            .unwrap();
        let response = router.clone().oneshot(update).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["size"], 6);
        assert_eq!(sink.get("log.txt").unwrap(), b"onetwo");

        let download = Request::builder()
            .uri("/files/log.txt")
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(download).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"onetwo");

        let delete = Request::builder()
            .method("DELETE")
            .uri("/delete")
            .header(protocol::FILENAME, "log.txt")
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(delete).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(sink.get("log.txt").is_none());

        let update_missing = Request::builder()
            .method("POST")
            .uri("/update")
            .header(protocol::FILENAME, "log.txt")
            .body(Body::from("x"))
            .unwrap();
        let response = router.oneshot(update_missing).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["code"], "E009");
    }

    #[tokio::test]
    async fn test_transfer_summary_and_status() {
        let (router, _sink) = setup();
        router
            .clone()
            .oneshot(chunk_request("part.bin", "0", "3", b"x"))
            .await
            .unwrap();

        let summary = Request::builder()
            .uri("/transfers/part.bin")
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(summary).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "collecting");
        assert_eq!(json["received_chunks"], 1);
        assert_eq!(json["total_chunks"], 3);

        let status = Request::builder()
            .uri("/status")
            .body(Body::empty())
            .unwrap();
        let json = json_body(router.clone().oneshot(status).await.unwrap()).await;
        assert_eq!(json["active_transfers"], 1);

        let unknown = Request::builder()
            .method("POST")
            .uri("/transfers/nope/assemble")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(unknown).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
