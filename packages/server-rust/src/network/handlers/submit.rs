//! Request submission endpoints.
//!
//! - `POST /submitRequest`: envelope-addressed, with remote fallback
//! - `POST /{operation}`: operation-addressed, always local; this is where
//!   other instances forward to

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use switchyard_core::{ErrorCode, ErrorEntry, Request};
use tower::ServiceExt;
use tracing::{debug, warn};

use super::AppState;
use crate::network::middleware::REQUEST_ID_HEADER;
use crate::service::{GatewayReply, ENVELOPE_VERSION};

impl IntoResponse for GatewayReply {
    fn into_response(self) -> Response {
        match self {
            Self::Local(envelope) => envelope_response(envelope),
            Self::Forwarded(reply) => {
                let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);
                let content_type = reply
                    .content_type
                    .and_then(|ct| HeaderValue::from_str(&ct).ok())
                    .unwrap_or(HeaderValue::from_static("application/json"));
                (status, [(header::CONTENT_TYPE, content_type)], reply.body).into_response()
            }
        }
    }
}

/// 200 for `ok`, 400 otherwise.
fn envelope_response(envelope: switchyard_core::Response) -> Response {
    let status = if envelope.ok {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(envelope)).into_response()
}

/// Unparseable bodies become an empty request, which the broker answers
/// with `MISSING_FIELD`. An empty `requestId` takes the HTTP request id.
fn prepare(body: Result<Json<Request>, JsonRejection>, headers: &HeaderMap) -> Request {
    let mut request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!(error = %rejection, "unreadable request body");
            Request::default()
        }
    };
    if request.request_id.is_empty() {
        request.request_id = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), ToString::to_string);
    }
    request
}

fn draining(request: &Request) -> Response {
    let envelope = switchyard_core::Response::error(
        request.request_id.clone(),
        ErrorEntry::new(ErrorCode::RemoteUnavailable, "server is shutting down"),
    )
    .for_call(&request.service, &request.operation)
    .with_version(ENVELOPE_VERSION);
    (StatusCode::SERVICE_UNAVAILABLE, Json(envelope)).into_response()
}

/// `POST /submitRequest`
pub async fn submit_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Request>, JsonRejection>,
) -> Response {
    let request = prepare(body, &headers);
    if !state.shutdown.is_accepting() {
        warn!(request_id = %request.request_id, "rejecting submission while not ready");
        return draining(&request);
    }
    let _guard = state.shutdown.in_flight_guard();
    state
        .dispatcher
        .oneshot(request)
        .await
        .unwrap_or_else(|never| match never {})
        .into_response()
}

/// `POST /{operation}`
pub async fn operation_handler(
    State(state): State<AppState>,
    Path(operation): Path<String>,
    headers: HeaderMap,
    body: Result<Json<Request>, JsonRejection>,
) -> Response {
    let mut request = prepare(body, &headers);
    request.operation = operation;
    if !state.shutdown.is_accepting() {
        return draining(&request);
    }
    let _guard = state.shutdown.in_flight_guard();
    envelope_response(state.gateway.dispatch_operation(request).await)
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use serde_json::{json, Value};

    use super::*;
    use crate::network::handlers::test_support::app_state;

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_body(value: Value) -> Result<Json<Request>, JsonRejection> {
        Ok(Json(serde_json::from_value(value).unwrap()))
    }

    #[tokio::test]
    async fn echo_round_trip() {
        let response = submit_handler(
            State(app_state()),
            HeaderMap::new(),
            json_body(json!({
                "service": "echoSvc",
                "operation": "echo",
                "params": {"msg": "hi"},
                "requestId": "t1"
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["data"], "hi");
        assert_eq!(body["requestId"], "t1");
        assert_eq!(body["errors"], json!([]));
    }

    #[tokio::test]
    async fn failures_are_400_envelopes() {
        let response = submit_handler(
            State(app_state()),
            HeaderMap::new(),
            json_body(json!({"operation": "echo"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["ok"], false);
        assert_eq!(body["errors"][0]["code"], "MISSING_FIELD");
    }

    #[tokio::test]
    async fn missing_request_id_is_assigned() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("from-header"));
        let response = submit_handler(
            State(app_state()),
            headers,
            json_body(json!({"service": "echoSvc", "operation": "echo", "params": {"msg": "x"}})),
        )
        .await;
        assert_eq!(body_json(response).await["requestId"], "from-header");

        let response = submit_handler(
            State(app_state()),
            HeaderMap::new(),
            json_body(json!({"service": "echoSvc", "operation": "echo", "params": {"msg": "x"}})),
        )
        .await;
        let id = body_json(response).await["requestId"].as_str().unwrap().to_string();
        assert!(uuid::Uuid::parse_str(&id).is_ok());
    }

    #[tokio::test]
    async fn draining_rejects_new_submissions() {
        let state = app_state();
        state.shutdown.begin_drain();
        let response = submit_handler(
            State(state),
            HeaderMap::new(),
            json_body(json!({"service": "echoSvc", "operation": "echo"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn operation_route_takes_operation_from_path() {
        let response = operation_handler(
            State(app_state()),
            Path("echo".to_string()),
            HeaderMap::new(),
            json_body(json!({"service": "files", "params": {"msg": "forwarded"}})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"], "forwarded");
    }

    #[tokio::test]
    async fn forwarded_replies_keep_status_and_body() {
        let reply = GatewayReply::Forwarded(crate::discovery::RemoteReply {
            status: 418,
            content_type: Some("application/json".to_string()),
            body: bytes::Bytes::from_static(b"{\"ok\":false}"),
        });
        let response = reply.into_response();
        assert_eq!(response.status().as_u16(), 418);
        assert_eq!(body_json(response).await, json!({"ok": false}));
    }
}
