// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP surface for atlas-services.
//!
//! Request and response bodies are JSON:API documents. The tenant travels in
//! the `TENANT_ID`, `REGION`, `MAJOR_VERSION` and `MINOR_VERSION` headers.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use atlas_core::tenant::Tenant;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::channel::ChannelRegistry;
use crate::error::Error;
use crate::handlers;
use crate::map_actions::MapActionProcessor;
use crate::party_quest::{PartyQuestDefinitions, RegistrationCode, RegistrationValidator};
use crate::storage::StorageService;
use crate::transport::TransportProcessor;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub channels: Arc<ChannelRegistry>,
    pub transport: Arc<TransportProcessor>,
    pub map_actions: Arc<MapActionProcessor>,
    pub definitions: Arc<PartyQuestDefinitions>,
    pub registrations: Arc<RegistrationValidator>,
    pub storage: Arc<StorageService>,
}

/// Error response in JSON:API `errors` form.
#[derive(Debug)]
pub struct HttpApiError {
    status: StatusCode,
    code: String,
    detail: String,
}

impl HttpApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", detail)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<Error> for HttpApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Validation(_) | Error::Json(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) | Error::RouteNotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) | Error::AlreadyInTransport(_) => StatusCode::CONFLICT,
            Error::PartyQuest {
                code: RegistrationCode::Unknown,
                ..
            }
            | Error::Http(_) => StatusCode::BAD_GATEWAY,
            Error::PartyQuest { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %err, "Request failed");
        }
        Self::new(status, err.error_code(), err.to_string())
    }
}

impl IntoResponse for HttpApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "errors": [{
                "status": self.status.as_u16().to_string(),
                "code": self.code,
                "detail": self.detail,
            }]
        });
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, HttpApiError>;

/// Tenant taken from the request headers.
#[derive(Debug, Clone)]
pub struct RequestTenant(pub Tenant);

impl<S: Send + Sync> FromRequestParts<S> for RequestTenant {
    type Rejection = HttpApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers: HashMap<String, String> = parts
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_uppercase(), v.to_string()))
            })
            .collect();
        Tenant::from_headers(&headers)
            .map(RequestTenant)
            .map_err(|e| HttpApiError::bad_request(e.to_string()))
    }
}

/// Incoming JSON:API document: `{"data": {"type", "attributes"}}`.
#[derive(Debug, Deserialize)]
pub struct InDocument<T> {
    pub data: InResource<T>,
}

#[derive(Debug, Deserialize)]
pub struct InResource<T> {
    pub attributes: T,
}

/// Render one resource object.
pub fn resource(kind: &str, id: impl ToString, attributes: impl Serialize) -> ApiResult<Value> {
    let attributes =
        serde_json::to_value(attributes).map_err(|e| HttpApiError::from(Error::from(e)))?;
    Ok(json!({ "type": kind, "id": id.to_string(), "attributes": attributes }))
}

/// Wrap primary data in a document.
pub fn document(data: Value) -> Json<Value> {
    Json(json!({ "data": data }))
}

/// Build the services router.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Channels
        .route(
            "/worlds/{world_id}/channels",
            get(handlers::list_channels).post(handlers::register_channel),
        )
        .route(
            "/worlds/{world_id}/channels/{channel_id}",
            get(handlers::get_channel),
        )
        // Storage
        .route(
            "/storage/accounts/{account_id}",
            get(handlers::get_storage).post(handlers::create_storage),
        )
        .route(
            "/storage/accounts/{account_id}/arrange",
            post(handlers::arrange_storage),
        )
        // Map actions
        .route(
            "/maps/actions",
            get(handlers::list_scripts).post(handlers::create_script),
        )
        .route("/maps/actions/seed", post(handlers::seed_scripts))
        .route(
            "/maps/actions/{id}",
            get(handlers::get_script)
                .patch(handlers::update_script)
                .delete(handlers::delete_script),
        )
        .route("/maps/{script_name}/actions", get(handlers::scripts_by_name))
        // Party quests
        .route(
            "/party-quests/definitions",
            get(handlers::list_definitions).post(handlers::create_definition),
        )
        .route("/party-quests/definitions/seed", post(handlers::seed_definitions))
        .route(
            "/party-quests/definitions/validate",
            post(handlers::validate_definitions),
        )
        .route(
            "/party-quests/definitions/quest/{quest_id}",
            get(handlers::definition_by_quest_id),
        )
        .route(
            "/party-quests/definitions/{id}",
            get(handlers::get_definition)
                .patch(handlers::update_definition)
                .delete(handlers::delete_definition),
        )
        .route(
            "/party-quests/registrations",
            post(handlers::register_party),
        )
        // Transports
        .route("/transports/instance-routes", get(handlers::list_routes))
        .route("/transports/instance-routes/{id}", get(handlers::get_route))
        .route(
            "/transports/instance-routes/{id}/status",
            get(handlers::route_status),
        )
        .route(
            "/transports/instance-routes/{id}/start",
            post(handlers::start_route),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` fires.
pub async fn serve(addr: SocketAddr, state: AppState, shutdown: Arc<Notify>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "HTTP server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.notified().await })
        .await
}
