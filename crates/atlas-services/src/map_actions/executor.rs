// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Turns rule operations into one-step saga submissions.

use std::sync::Arc;

use atlas_core::bus::{MessageBuffer, Producer, TopicResolver};
use atlas_core::saga::action::{
    Action, CharacterEffectPayload, SendMessagePayload, SpawnMonsterPayload,
};
use atlas_core::saga::{Saga, SagaType, event};
use atlas_core::tenant::Tenant;
use atlas_core::topic;
use tracing::{debug, warn};

use super::model::Operation;
use crate::error::{Error, Result};
use crate::field::Field;

pub const DEFAULT_MESSAGE_TYPE: &str = "PINK_TEXT";

fn param<'a>(op: &'a Operation, name: &str) -> Result<&'a str> {
    op.params
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| Error::Validation(format!("{} operation missing {} parameter", op.kind, name)))
}

fn numeric<T: std::str::FromStr>(op: &Operation, name: &str) -> Result<Option<T>> {
    op.params
        .get(name)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|_| {
                Error::Validation(format!("{} operation has invalid {} '{}'", op.kind, name, raw))
            })
        })
        .transpose()
}

fn one_step(initiated_by: &str, step_id: String, action: Action) -> Result<Saga> {
    Ok(Saga::builder()
        .saga_type(SagaType::MapAction)
        .initiated_by(initiated_by)
        .add_step(step_id, action)
        .build()?)
}

/// The saga an operation runs as. `None` for operations with nothing to
/// dispatch, including unknown types.
pub fn saga_for(field: &Field, character_id: u32, op: &Operation) -> Result<Option<Saga>> {
    let effect = |path: &str| CharacterEffectPayload {
        character_id,
        world_id: field.world_id,
        channel_id: field.channel_id,
        path: path.to_string(),
    };

    let saga = match op.kind.as_str() {
        "field_effect" => one_step(
            "map-action-effect",
            format!("effect-{}", character_id),
            Action::FieldEffect(effect(param(op, "path")?)),
        )?,
        "show_intro" => one_step(
            "map-action-intro",
            format!("intro-{}", character_id),
            Action::ShowIntro(effect(param(op, "path")?)),
        )?,
        "spawn_monster" => {
            let monster_id: u32 = numeric(op, "monsterId")?.ok_or_else(|| {
                Error::Validation("spawn_monster operation missing monsterId parameter".to_string())
            })?;
            one_step(
                "map-action-spawn",
                format!("spawn-{}-{}", character_id, monster_id),
                Action::SpawnMonster(SpawnMonsterPayload {
                    character_id,
                    world_id: field.world_id,
                    channel_id: field.channel_id,
                    map_id: numeric(op, "mapId")?.unwrap_or(field.map_id),
                    instance: field.instance,
                    monster_id,
                    x: numeric(op, "x")?.unwrap_or(0),
                    y: numeric(op, "y")?.unwrap_or(0),
                    team: 0,
                    count: numeric(op, "count")?.unwrap_or(1),
                }),
            )?
        }
        "drop_message" => one_step(
            "map-action-message",
            format!("message-{}", character_id),
            Action::SendMessage(SendMessagePayload {
                character_id,
                world_id: field.world_id,
                channel_id: field.channel_id,
                message_type: op
                    .params
                    .get("messageType")
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_MESSAGE_TYPE.to_string()),
                message: param(op, "message")?.to_string(),
            }),
        )?,
        // The client unlocks itself once map entry processing finishes.
        "unlock_ui" => {
            debug!(character_id, "unlock_ui needs no dispatch");
            return Ok(None);
        }
        other => {
            warn!(operation = other, character_id, "Unknown map action operation, skipping");
            return Ok(None);
        }
    };
    Ok(Some(saga))
}

/// Submits operation sagas to the saga runtime.
pub struct OperationExecutor {
    producer: Arc<dyn Producer>,
    topics: TopicResolver,
}

impl OperationExecutor {
    pub fn new(producer: Arc<dyn Producer>, topics: TopicResolver) -> Self {
        Self { producer, topics }
    }

    /// Submit one saga per dispatching operation. Nothing is published if
    /// any operation is malformed.
    pub async fn execute(
        &self,
        tenant: &Tenant,
        field: &Field,
        character_id: u32,
        operations: &[Operation],
    ) -> Result<usize> {
        let mut buffer = MessageBuffer::new(tenant);
        let mut submitted = 0;
        for op in operations {
            if let Some(saga) = saga_for(field, character_id, op)? {
                buffer.put(
                    self.topics.resolve(topic::COMMAND_TOPIC_SAGA),
                    &event::submission(&saga, field.world_id, character_id),
                )?;
                submitted += 1;
            }
        }
        buffer.flush(self.producer.as_ref()).await?;
        Ok(submitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn op(value: serde_json::Value) -> Operation {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_spawn_monster_defaults_and_overrides() {
        let field = Field::new(0, 2, 100000000);
        let saga = saga_for(
            &field,
            42,
            &op(json!({"type": "spawn_monster", "params": {"monsterId": "9300018", "x": "-120", "mapId": "922010100"}})),
        )
        .unwrap()
        .unwrap();

        assert_eq!(saga.saga_type, SagaType::MapAction);
        assert_eq!(saga.steps[0].step_id, "spawn-42-9300018");
        let Action::SpawnMonster(payload) = &saga.steps[0].action else {
            panic!("expected spawn_monster");
        };
        assert_eq!(payload.map_id, 922010100);
        assert_eq!(payload.x, -120);
        assert_eq!(payload.y, 0);
        assert_eq!(payload.count, 1);
        assert_eq!(payload.instance, Uuid::nil());
    }

    #[test]
    fn test_spawn_monster_targets_the_field_instance() {
        let instance = Uuid::new_v4();
        let field = Field::new(0, 1, 922010100).with_instance(instance);
        let saga = saga_for(
            &field,
            42,
            &op(json!({"type": "spawn_monster", "params": {"monsterId": "9300018"}})),
        )
        .unwrap()
        .unwrap();

        let Action::SpawnMonster(payload) = &saga.steps[0].action else {
            panic!("expected spawn_monster");
        };
        assert_eq!(payload.instance, instance);
        assert_eq!(payload.map_id, 922010100);
    }

    #[test]
    fn test_drop_message_default_type() {
        let saga = saga_for(
            &Field::new(0, 1, 1),
            7,
            &op(json!({"type": "drop_message", "params": {"message": "Welcome"}})),
        )
        .unwrap()
        .unwrap();
        let Action::SendMessage(payload) = &saga.steps[0].action else {
            panic!("expected send_message");
        };
        assert_eq!(payload.message_type, DEFAULT_MESSAGE_TYPE);
        assert_eq!(saga.steps[0].step_id, "message-7");
    }

    #[test]
    fn test_missing_parameter_and_unknown_type() {
        let field = Field::new(0, 1, 1);
        assert!(saga_for(&field, 1, &op(json!({"type": "field_effect"}))).is_err());
        assert!(
            saga_for(&field, 1, &op(json!({"type": "teleport_party"})))
                .unwrap()
                .is_none()
        );
        assert!(
            saga_for(&field, 1, &op(json!({"type": "unlock_ui"})))
                .unwrap()
                .is_none()
        );
    }
}
