// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP request handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::channel::ChannelRegistration;
use crate::field::Field;
use crate::map_actions::{MapActionScript, StoredScript};
use crate::party_quest::{PartyQuestDefinition, RegistrationRequest, StoredDefinition};
use crate::server::{
    ApiResult, AppState, HttpApiError, InDocument, RequestTenant, document, resource,
};
use crate::storage::{Compartment, CreateCompartment};
use crate::transport::TransportRoute;

const CHANNELS: &str = "channels";
const STORAGES: &str = "storages";
const SCRIPTS: &str = "map-actions";
const DEFINITIONS: &str = "definitions";
const ROUTES: &str = "instance-routes";

fn many<T>(items: &[T], render: impl Fn(&T) -> ApiResult<Value>) -> ApiResult<Json<Value>> {
    let data = items.iter().map(render).collect::<ApiResult<Vec<_>>>()?;
    Ok(document(Value::Array(data)))
}

// ============================================================================
// Channels
// ============================================================================

pub async fn list_channels(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
    Path(world_id): Path<u8>,
) -> ApiResult<Json<Value>> {
    let servers = state.channels.list(&tenant, world_id);
    many(&servers, |s| {
        resource(CHANNELS, format!("{}-{}", s.world_id, s.channel_id), s)
    })
}

pub async fn get_channel(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
    Path((world_id, channel_id)): Path<(u8, u8)>,
) -> ApiResult<Json<Value>> {
    let server = state
        .channels
        .get(&tenant, world_id, channel_id)
        .ok_or_else(|| HttpApiError::not_found(format!("channel {}-{}", world_id, channel_id)))?;
    Ok(document(resource(
        CHANNELS,
        format!("{}-{}", world_id, channel_id),
        &server,
    )?))
}

/// Accepts the registration and publishes it; the registry is updated when
/// the event comes back around.
pub async fn register_channel(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
    Path(world_id): Path<u8>,
    Json(body): Json<InDocument<ChannelRegistration>>,
) -> ApiResult<StatusCode> {
    state
        .channels
        .emit_started(&tenant, world_id, body.data.attributes)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldQuery {
    pub world_id: u8,
}

fn storage_resource(compartment: &Compartment) -> ApiResult<Value> {
    resource(STORAGES, compartment.id, compartment)
}

pub async fn get_storage(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
    Path(account_id): Path<u32>,
    Query(query): Query<WorldQuery>,
) -> ApiResult<Json<Value>> {
    let compartment = state.storage.get(&tenant, query.world_id, account_id).await?;
    Ok(document(storage_resource(&compartment)?))
}

pub async fn create_storage(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
    Path(account_id): Path<u32>,
    Json(body): Json<InDocument<CreateCompartment>>,
) -> ApiResult<impl IntoResponse> {
    let compartment = state
        .storage
        .create(&tenant, account_id, body.data.attributes)
        .await?;
    Ok((StatusCode::CREATED, document(storage_resource(&compartment)?)))
}

pub async fn arrange_storage(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
    Path(account_id): Path<u32>,
    Query(query): Query<WorldQuery>,
) -> ApiResult<Json<Value>> {
    let compartment = state
        .storage
        .arrange(&tenant, query.world_id, account_id)
        .await?;
    Ok(document(storage_resource(&compartment)?))
}

// ============================================================================
// Map actions
// ============================================================================

fn script_resource(script: &StoredScript) -> ApiResult<Value> {
    resource(SCRIPTS, script.id, &script.script)
}

pub async fn list_scripts(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
) -> ApiResult<Json<Value>> {
    let scripts = state.map_actions.store().list(&tenant).await?;
    many(&scripts, script_resource)
}

pub async fn get_script(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let script = state
        .map_actions
        .store()
        .get(&tenant, id)
        .await?
        .ok_or_else(|| HttpApiError::not_found(format!("map action script {}", id)))?;
    Ok(document(script_resource(&script)?))
}

pub async fn scripts_by_name(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
    Path(script_name): Path<String>,
) -> ApiResult<Json<Value>> {
    let scripts = state.map_actions.store().by_name(&tenant, &script_name).await?;
    many(&scripts, script_resource)
}

pub async fn create_script(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
    Json(body): Json<InDocument<MapActionScript>>,
) -> ApiResult<impl IntoResponse> {
    let script = state
        .map_actions
        .create(&tenant, body.data.attributes)
        .await?;
    Ok((StatusCode::CREATED, document(script_resource(&script)?)))
}

pub async fn update_script(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
    Path(id): Path<Uuid>,
    Json(body): Json<InDocument<MapActionScript>>,
) -> ApiResult<Json<Value>> {
    let script = state
        .map_actions
        .update(&tenant, id, body.data.attributes)
        .await?;
    Ok(document(script_resource(&script)?))
}

pub async fn delete_script(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.map_actions.store().delete(&tenant, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(HttpApiError::not_found(format!("map action script {}", id)))
    }
}

pub async fn seed_scripts(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
) -> ApiResult<Json<Value>> {
    let result = state.map_actions.seed(&tenant).await?;
    Ok(document(resource("seed-results", tenant.id, &result)?))
}

// ============================================================================
// Party-quest definitions
// ============================================================================

fn definition_resource(stored: &StoredDefinition) -> ApiResult<Value> {
    resource(DEFINITIONS, stored.id, &stored.definition)
}

pub async fn list_definitions(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
) -> ApiResult<Json<Value>> {
    let definitions = state.definitions.store().list(&tenant).await?;
    many(&definitions, definition_resource)
}

pub async fn get_definition(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let stored = state
        .definitions
        .store()
        .get(&tenant, id)
        .await?
        .ok_or_else(|| HttpApiError::not_found(format!("party quest definition {}", id)))?;
    Ok(document(definition_resource(&stored)?))
}

pub async fn definition_by_quest_id(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
    Path(quest_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let stored = state
        .definitions
        .store()
        .by_quest_id(&tenant, &quest_id)
        .await?
        .ok_or_else(|| HttpApiError::not_found(format!("party quest {}", quest_id)))?;
    Ok(document(definition_resource(&stored)?))
}

pub async fn create_definition(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
    Json(body): Json<InDocument<PartyQuestDefinition>>,
) -> ApiResult<impl IntoResponse> {
    let stored = state
        .definitions
        .create(&tenant, body.data.attributes)
        .await?;
    Ok((StatusCode::CREATED, document(definition_resource(&stored)?)))
}

pub async fn update_definition(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
    Path(id): Path<Uuid>,
    Json(body): Json<InDocument<PartyQuestDefinition>>,
) -> ApiResult<Json<Value>> {
    let stored = state
        .definitions
        .update(&tenant, id, body.data.attributes)
        .await?;
    Ok(document(definition_resource(&stored)?))
}

pub async fn delete_definition(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.definitions.store().delete(&tenant, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(HttpApiError::not_found(format!("party quest definition {}", id)))
    }
}

pub async fn seed_definitions(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
) -> ApiResult<Json<Value>> {
    let result = state.definitions.seed(&tenant).await?;
    Ok(document(resource("seed-results", tenant.id, &result)?))
}

pub async fn validate_definitions(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
) -> ApiResult<Json<Value>> {
    let reports = state.definitions.validate_all(&tenant).await?;
    many(&reports, |r| resource("validation-reports", &r.quest_id, r))
}

/// Validate a party-quest registration and, when it passes, send `REGISTER`.
pub async fn register_party(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
    Json(body): Json<InDocument<RegistrationRequest>>,
) -> ApiResult<impl IntoResponse> {
    let registered = state
        .registrations
        .register(&tenant, &body.data.attributes)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        document(resource("registrations", registered.party_id, &registered)?),
    ))
}

// ============================================================================
// Transports
// ============================================================================

fn route_resource(route: &TransportRoute) -> ApiResult<Value> {
    resource(ROUTES, route.id, route)
}

pub async fn list_routes(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
) -> ApiResult<Json<Value>> {
    let routes = state.transport.routes().list(&tenant);
    many(&routes, route_resource)
}

pub async fn get_route(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let route = state
        .transport
        .routes()
        .get(&tenant, id)
        .ok_or_else(|| HttpApiError::not_found(format!("route {}", id)))?;
    Ok(document(route_resource(&route)?))
}

pub async fn route_status(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let status = state.transport.route_status(&tenant, id)?;
    Ok(document(resource("instance-route-status", id, &status)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRoute {
    pub character_id: u32,
    pub world_id: u8,
    pub channel_id: u8,
}

pub async fn start_route(
    State(state): State<AppState>,
    RequestTenant(tenant): RequestTenant,
    Path(id): Path<Uuid>,
    Json(body): Json<InDocument<StartRoute>>,
) -> ApiResult<impl IntoResponse> {
    let start = body.data.attributes;
    let route = state
        .transport
        .routes()
        .get(&tenant, id)
        .ok_or_else(|| HttpApiError::not_found(format!("route {}", id)))?;
    let instance = state
        .transport
        .start_transport(
            &tenant,
            start.character_id,
            id,
            Field::new(start.world_id, start.channel_id, route.start_map_id),
        )
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        document(resource("transport-instances", instance.id, &instance)?),
    ))
}
