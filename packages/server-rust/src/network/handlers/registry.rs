//! `/registry/*` endpoints over the in-process [`ServiceRegistry`].
//!
//! Misses answer 404 with a `REGISTRY_NOT_FOUND` error entry.
//!
//! [`ServiceRegistry`]: crate::registry::ServiceRegistry

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use switchyard_core::{ErrorCode, MessageBody, RegisterAck, RegisterPayload};

use super::{error_reply, AppState};

fn not_found(what: &str) -> Response {
    error_reply(StatusCode::NOT_FOUND, ErrorCode::RegistryNotFound, format!("{what} not found"))
}

fn missing_field(field: &str) -> Response {
    error_reply(
        StatusCode::BAD_REQUEST,
        ErrorCode::MissingField,
        format!("{field} is required"),
    )
}

/// `POST /registry/register`
pub async fn register_handler(
    State(state): State<AppState>,
    body: Result<Json<RegisterPayload>, JsonRejection>,
) -> Response {
    let payload = match body {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            return error_reply(
                StatusCode::BAD_REQUEST,
                ErrorCode::MissingField,
                format!("invalid registration: {}", rejection.body_text()),
            );
        }
    };
    if payload.service_name.trim().is_empty() {
        return missing_field("serviceName");
    }
    if payload.endpoint.trim().is_empty() {
        return missing_field("endpoint");
    }
    let registration = state.registry.register(payload);
    Json(RegisterAck {
        message: "Service registered successfully".to_string(),
        service_name: registration.service_name,
    })
    .into_response()
}

/// `POST /registry/heartbeat/{serviceName}`
pub async fn heartbeat_handler(
    State(state): State<AppState>,
    Path(service_name): Path<String>,
) -> Response {
    match state.registry.heartbeat(&service_name) {
        Ok(_) => Json(MessageBody::new("Heartbeat received")).into_response(),
        Err(_) => not_found(&format!("service {service_name}")),
    }
}

/// `POST /registry/deregister/{serviceName}`
pub async fn deregister_handler(
    State(state): State<AppState>,
    Path(service_name): Path<String>,
) -> Response {
    match state.registry.deregister(&service_name) {
        Some(_) => Json(MessageBody::new(format!("Service {service_name} deregistered"))).into_response(),
        None => not_found(&format!("service {service_name}")),
    }
}

/// `POST /registry/unhealthy/{serviceName}`
pub async fn mark_unhealthy_handler(
    State(state): State<AppState>,
    Path(service_name): Path<String>,
) -> Response {
    if state.registry.mark_unhealthy(&service_name) {
        Json(MessageBody::new(format!("Service {service_name} marked unhealthy"))).into_response()
    } else {
        not_found(&format!("service {service_name}"))
    }
}

/// `GET /registry/services/by-operation/{operation}`
pub async fn by_operation_handler(
    State(state): State<AppState>,
    Path(operation): Path<String>,
) -> Response {
    match state.registry.find_by_operation(&operation) {
        Some(registration) => Json(registration.details()).into_response(),
        None => not_found(&format!("operation {operation}")),
    }
}

/// `GET /registry/services/{serviceName}/details`
pub async fn details_handler(
    State(state): State<AppState>,
    Path(service_name): Path<String>,
) -> Response {
    match state.registry.find_by_service_name(&service_name) {
        Some(registration) => Json(registration.details()).into_response(),
        None => not_found(&format!("service {service_name}")),
    }
}

/// `GET /registry/services`
pub async fn all_services_handler(State(state): State<AppState>) -> Response {
    Json(state.registry.all_services()).into_response()
}

/// `GET /registry/services/{serviceName}/health`: active probe of the
/// service's health URL.
pub async fn service_health_handler(
    State(state): State<AppState>,
    Path(service_name): Path<String>,
) -> Response {
    Json(state.gateway.service_health(&service_name).await).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleQuery {
    threshold_secs: Option<u64>,
}

/// `GET /registry/stale?thresholdSecs=N`
pub async fn stale_services_handler(
    State(state): State<AppState>,
    Query(query): Query<StaleQuery>,
) -> Response {
    let threshold = query.threshold_secs.unwrap_or(state.stale_threshold_secs);
    Json(state.registry.stale_services(threshold)).into_response()
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

    fn payload(value: Value) -> Result<Json<RegisterPayload>, JsonRejection> {
        Ok(Json(serde_json::from_value(value).unwrap()))
    }

    #[tokio::test]
    async fn register_then_lookup() {
        let state = app_state();
        let response = register_handler(
            State(state.clone()),
            payload(json!({
                "serviceName": "files",
                "operations": ["ls", "mkdir"],
                "endpoint": "http://host:9:9090",
                "healthCheck": "/health"
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"message": "Service registered successfully", "serviceName": "files"})
        );

        let found = by_operation_handler(State(state.clone()), Path("ls".to_string())).await;
        assert_eq!(found.status(), StatusCode::OK);
        assert_eq!(body_json(found).await["serviceName"], "files");

        let details = details_handler(State(state), Path("files".to_string())).await;
        let body = body_json(details).await;
        assert_eq!(body["endpoint"], "http://host:9:9090");
        assert_eq!(body["healthCheck"], "/health");
        assert_eq!(body["operations"], json!(["ls", "mkdir"]));
    }

    #[tokio::test]
    async fn register_requires_name_and_endpoint() {
        let response = register_handler(
            State(app_state()),
            payload(json!({"serviceName": "files", "endpoint": ""})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "MISSING_FIELD");
    }

    #[tokio::test]
    async fn malformed_registration_reports_the_json_error() {
        use axum::body::Body;
        use axum::extract::FromRequest;

        let request = axum::http::Request::post("/registry/register")
            .header("content-type", "application/json")
            .body(Body::from(
                r#"{"serviceName": "files", "endpoint": "http://host:9:9090", "operations": "ls"}"#,
            ))
            .unwrap();
        let body = Json::<RegisterPayload>::from_request(request, &()).await;
        assert!(body.is_err());

        let response = register_handler(State(app_state()), body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "MISSING_FIELD");
        let message = body["message"].as_str().unwrap();
        assert!(message.starts_with("invalid registration:"), "{message}");
        assert!(message.contains("operations"), "{message}");
    }

    #[tokio::test]
    async fn unknown_names_are_404() {
        let state = app_state();
        for response in [
            heartbeat_handler(State(state.clone()), Path("ghost".to_string())).await,
            deregister_handler(State(state.clone()), Path("ghost".to_string())).await,
            mark_unhealthy_handler(State(state.clone()), Path("ghost".to_string())).await,
            by_operation_handler(State(state.clone()), Path("nope".to_string())).await,
            details_handler(State(state.clone()), Path("ghost".to_string())).await,
        ] {
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert_eq!(body_json(response).await["code"], "REGISTRY_NOT_FOUND");
        }
    }

    #[tokio::test]
    async fn heartbeat_and_deregister_known_service() {
        let state = app_state();
        state.registry.register(RegisterPayload {
            service_name: "files".to_string(),
            endpoint: "http://host:9090/".to_string(),
            ..RegisterPayload::default()
        });

        let hb = heartbeat_handler(State(state.clone()), Path("files".to_string())).await;
        assert_eq!(hb.status(), StatusCode::OK);

        let unhealthy = mark_unhealthy_handler(State(state.clone()), Path("files".to_string())).await;
        assert_eq!(unhealthy.status(), StatusCode::OK);
        let all = body_json(all_services_handler(State(state.clone())).await).await;
        assert_eq!(all[0]["status"], "UNHEALTHY");

        let gone = deregister_handler(State(state.clone()), Path("files".to_string())).await;
        assert_eq!(gone.status(), StatusCode::OK);
        assert!(state.registry.is_empty());
    }

    #[tokio::test]
    async fn stale_listing_uses_query_threshold() {
        let state = app_state();
        state.registry.register_at(
            RegisterPayload {
                service_name: "old".to_string(),
                endpoint: "http://old:1/".to_string(),
                ..RegisterPayload::default()
            },
            0,
        );
        state.registry.register(RegisterPayload {
            service_name: "fresh".to_string(),
            endpoint: "http://fresh:1/".to_string(),
            ..RegisterPayload::default()
        });
        let response = stale_services_handler(
            State(state),
            Query(StaleQuery {
                threshold_secs: Some(60),
            }),
        )
        .await;
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["serviceName"], "old");
    }

    #[tokio::test]
    async fn health_of_unregistered_service_is_false() {
        let response = service_health_handler(State(app_state()), Path("ghost".to_string())).await;
        assert_eq!(
            body_json(response).await,
            json!({"serviceName": "ghost", "healthy": false})
        );
    }
}
