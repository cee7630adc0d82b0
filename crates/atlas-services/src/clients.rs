// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! REST collaborators.
//!
//! Every collaborator speaks JSON:API (`{"data": {"id", "attributes"}}`) and
//! receives the tenant as request headers. A 404 on a lookup means "absent",
//! any other non-success status is an error.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use atlas_core::saga::action::ConditionInput;
use atlas_core::tenant::Tenant;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::CollaboratorUrls;
use crate::error::{Error, Result};
use crate::field::Field;
use crate::map_actions::evaluator::CharacterValidator;
use crate::party_quest::registration::{PartiesClient, Party, PartyMember};
use crate::spawn::{FieldPopulation, MonsterSpawner, SpawnPoint, SpawnPointSource};
use crate::storage::merge::ItemTemplate;
use crate::storage::service::ItemDataSource;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct Document<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct Resource<A> {
    id: String,
    attributes: A,
}

impl<A> Resource<A> {
    fn numeric_id(&self) -> Result<u32> {
        self.id
            .parse()
            .map_err(|_| Error::Validation(format!("non-numeric resource id {}", self.id)))
    }
}

/// Shared HTTP client bound to one collaborator base URL.
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    base_url: String,
}

impl RestClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_tenant(request: RequestBuilder, tenant: &Tenant) -> RequestBuilder {
        tenant
            .to_headers()
            .into_iter()
            .fold(request, |request, (name, value)| request.header(name, value))
    }

    /// GET a JSON:API document; `None` on 404.
    pub async fn get<T: DeserializeOwned>(&self, tenant: &Tenant, path: &str) -> Result<Option<T>> {
        let response = Self::with_tenant(self.http.get(self.url(path)), tenant)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let document: Document<T> = response.error_for_status()?.json().await?;
        Ok(Some(document.data))
    }

    /// POST a JSON:API resource and decode the response document.
    pub async fn post<T: DeserializeOwned>(
        &self,
        tenant: &Tenant,
        path: &str,
        resource_type: &str,
        attributes: impl Serialize,
    ) -> Result<Option<T>> {
        let body = json!({ "data": { "type": resource_type, "attributes": attributes } });
        let response = Self::with_tenant(self.http.post(self.url(path)), tenant)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        if response.status() == StatusCode::NO_CONTENT || response.status() == StatusCode::ACCEPTED {
            return Ok(None);
        }
        let document: Document<T> = response.json().await?;
        Ok(Some(document.data))
    }
}

/// All REST collaborators of the services process.
#[derive(Clone)]
pub struct Collaborators {
    pub parties: RestClient,
    pub characters: RestClient,
    pub data: RestClient,
    pub maps: RestClient,
    pub monsters: RestClient,
}

impl Collaborators {
    pub fn new(urls: &CollaboratorUrls) -> Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            parties: RestClient::new(http.clone(), &urls.parties),
            characters: RestClient::new(http.clone(), &urls.characters),
            data: RestClient::new(http.clone(), &urls.data),
            maps: RestClient::new(http.clone(), &urls.maps),
            monsters: RestClient::new(http, &urls.monsters),
        })
    }
}

fn field_path(field: &Field) -> String {
    format!(
        "worlds/{}/channels/{}/maps/{}/instances/{}",
        field.world_id, field.channel_id, field.map_id, field.instance
    )
}

// ============================================================================
// Parties
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartyAttributes {
    leader_id: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemberAttributes {
    #[serde(default)]
    name: String,
    level: u16,
}

#[async_trait]
impl PartiesClient for RestClient {
    async fn party_of(&self, tenant: &Tenant, character_id: u32) -> Result<Option<Party>> {
        let path = format!("parties?filter[members.id]={}", character_id);
        let parties: Vec<Resource<PartyAttributes>> = self.get(tenant, &path).await?.unwrap_or_default();
        parties
            .first()
            .map(|p| -> Result<Party> {
                Ok(Party {
                    id: p.numeric_id()?,
                    leader_id: p.attributes.leader_id,
                })
            })
            .transpose()
    }

    async fn members(&self, tenant: &Tenant, party_id: u32) -> Result<Vec<PartyMember>> {
        let path = format!("parties/{}/members", party_id);
        let members: Vec<Resource<MemberAttributes>> = self.get(tenant, &path).await?.unwrap_or_default();
        members
            .into_iter()
            .map(|m| -> Result<PartyMember> {
                Ok(PartyMember {
                    id: m.numeric_id()?,
                    name: m.attributes.name,
                    level: m.attributes.level,
                })
            })
            .collect()
    }
}

// ============================================================================
// Character validation
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidationRequest<'a> {
    character_id: u32,
    conditions: &'a [ConditionInput],
}

#[derive(Debug, Deserialize)]
struct ValidationAttributes {
    passed: bool,
}

#[async_trait]
impl CharacterValidator for RestClient {
    async fn validate(&self, tenant: &Tenant, character_id: u32, conditions: &[ConditionInput]) -> Result<bool> {
        let result: Option<Resource<ValidationAttributes>> = self
            .post(
                tenant,
                "validations",
                "validations",
                ValidationRequest {
                    character_id,
                    conditions,
                },
            )
            .await?;
        Ok(result.is_some_and(|r| r.attributes.passed))
    }
}

// ============================================================================
// Game data
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpawnPointAttributes {
    template: u32,
    mob_time: i32,
    #[serde(default)]
    team: i8,
    x: i16,
    y: i16,
    #[serde(default)]
    fh: i16,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemAttributes {
    #[serde(default)]
    slot_max: u32,
    #[serde(default)]
    rechargeable: bool,
}

/// Data resource holding a template's item data.
fn item_path(template_id: u32) -> Option<String> {
    let collection = match template_id / 1_000_000 {
        2 => "consumables",
        3 => "setups",
        4 => "etcs",
        _ => return None,
    };
    Some(format!("data/{}/{}", collection, template_id))
}

#[async_trait]
impl SpawnPointSource for RestClient {
    async fn spawn_points(&self, tenant: &Tenant, map_id: u32) -> Result<Vec<SpawnPoint>> {
        let path = format!("data/maps/{}/monsters", map_id);
        let points: Vec<Resource<SpawnPointAttributes>> = self.get(tenant, &path).await?.unwrap_or_default();
        points
            .into_iter()
            .map(|p| -> Result<SpawnPoint> {
                Ok(SpawnPoint {
                    id: p.numeric_id()?,
                    template: p.attributes.template,
                    mob_time: p.attributes.mob_time,
                    team: p.attributes.team,
                    x: p.attributes.x,
                    y: p.attributes.y,
                    fh: p.attributes.fh,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ItemDataSource for RestClient {
    async fn templates(&self, tenant: &Tenant, template_ids: &[u32]) -> Result<HashMap<u32, ItemTemplate>> {
        let mut templates = HashMap::with_capacity(template_ids.len());
        for &template_id in template_ids {
            let Some(path) = item_path(template_id) else {
                continue;
            };
            let item: Option<Resource<ItemAttributes>> = self.get(tenant, &path).await?;
            if let Some(item) = item {
                templates.insert(
                    template_id,
                    ItemTemplate {
                        slot_max: item.attributes.slot_max,
                        rechargeable: item.attributes.rechargeable,
                    },
                );
            }
        }
        Ok(templates)
    }
}

// ============================================================================
// Map census and monsters
// ============================================================================

/// Population counts from the maps and monsters services.
pub struct RestFieldPopulation {
    maps: RestClient,
    monsters: RestClient,
}

impl RestFieldPopulation {
    pub fn new(maps: RestClient, monsters: RestClient) -> Self {
        Self { maps, monsters }
    }
}

#[async_trait]
impl FieldPopulation for RestFieldPopulation {
    async fn characters(&self, tenant: &Tenant, field: &Field) -> Result<usize> {
        let path = format!("{}/characters", field_path(field));
        let ids: Vec<Resource<serde_json::Value>> = self.maps.get(tenant, &path).await?.unwrap_or_default();
        Ok(ids.len())
    }

    async fn monsters(&self, tenant: &Tenant, field: &Field) -> Result<usize> {
        let path = format!("{}/monsters", field_path(field));
        let monsters: Vec<Resource<serde_json::Value>> =
            self.monsters.get(tenant, &path).await?.unwrap_or_default();
        Ok(monsters.len())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateMonster {
    monster_id: u32,
    x: i16,
    y: i16,
    fh: i16,
    team: i8,
}

#[async_trait]
impl MonsterSpawner for RestClient {
    async fn create(&self, tenant: &Tenant, field: &Field, point: &SpawnPoint) -> Result<()> {
        let path = format!("{}/monsters", field_path(field));
        let _: Option<Resource<serde_json::Value>> = self
            .post(
                tenant,
                &path,
                "monsters",
                CreateMonster {
                    monster_id: point.template,
                    x: point.x,
                    y: point.y,
                    fh: point.fh,
                    team: point.team,
                },
            )
            .await?;
        Ok(())
    }
}
