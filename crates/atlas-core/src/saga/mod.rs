// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Saga model.
//!
//! A saga is an ordered step vector. Every status change goes through
//! [`Saga::set_step_status`], which enforces the only legal moves:
//!
//! | From      | To        | When                                         |
//! |-----------|-----------|----------------------------------------------|
//! | Pending   | Completed | step is the earliest pending, saga not failing |
//! | Pending   | Failed    | step is the earliest pending, saga not failing |
//! | Completed | Failed    | saga is failing, step is the furthest completed |
//!
//! The last row is compensation: an undone step is marked Failed. Together
//! these keep every step vector of the shape `C* F* P*`, so the three derived
//! indices are cheap to compute and monotonic.

pub mod action;
pub mod event;
pub mod expansion;

pub use self::action::Action;
pub use self::event::{SagaStatusEvent, StepOutcome};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Step status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Not yet executed, or executing.
    Pending,
    /// Executed successfully.
    Completed,
    /// Failed, or undone by compensation.
    Failed,
}

impl StepStatus {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }

    /// Parse from string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(StepStatus::Pending),
            "completed" => Some(StepStatus::Completed),
            "failed" => Some(StepStatus::Failed),
            _ => None,
        }
    }

    // Position in the `C* F* P*` layout.
    fn rank(self) -> u8 {
        match self {
            StepStatus::Completed => 0,
            StepStatus::Failed => 1,
            StepStatus::Pending => 2,
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of business transaction a saga performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaType {
    InventoryTransaction,
    QuestReward,
    TradeTransaction,
    CharacterCreation,
    StorageOperation,
    CashShopOperation,
    CharacterRespawn,
    FieldEffectUse,
    QuestStart,
    QuestComplete,
    MapAction,
    InstanceTransport,
}

impl SagaType {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaType::InventoryTransaction => "inventory_transaction",
            SagaType::QuestReward => "quest_reward",
            SagaType::TradeTransaction => "trade_transaction",
            SagaType::CharacterCreation => "character_creation",
            SagaType::StorageOperation => "storage_operation",
            SagaType::CashShopOperation => "cash_shop_operation",
            SagaType::CharacterRespawn => "character_respawn",
            SagaType::FieldEffectUse => "field_effect_use",
            SagaType::QuestStart => "quest_start",
            SagaType::QuestComplete => "quest_complete",
            SagaType::MapAction => "map_action",
            SagaType::InstanceTransport => "instance_transport",
        }
    }

    /// Parse from string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inventory_transaction" => Some(SagaType::InventoryTransaction),
            "quest_reward" => Some(SagaType::QuestReward),
            "trade_transaction" => Some(SagaType::TradeTransaction),
            "character_creation" => Some(SagaType::CharacterCreation),
            "storage_operation" => Some(SagaType::StorageOperation),
            "cash_shop_operation" => Some(SagaType::CashShopOperation),
            "character_respawn" => Some(SagaType::CharacterRespawn),
            "field_effect_use" => Some(SagaType::FieldEffectUse),
            "quest_start" => Some(SagaType::QuestStart),
            "quest_complete" => Some(SagaType::QuestComplete),
            "map_action" => Some(SagaType::MapAction),
            "instance_transport" => Some(SagaType::InstanceTransport),
            _ => None,
        }
    }
}

/// A single unit of a saga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub step_id: String,
    pub status: StepStatus,
    pub action: Action,
    /// Outcome data reported by the service that executed the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Step {
    /// A new pending step.
    pub fn pending(step_id: impl Into<String>, action: Action, now: DateTime<Utc>) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Pending,
            action,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An ordered, durable, multi-step transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Saga {
    pub transaction_id: Uuid,
    pub saga_type: SagaType,
    pub initiated_by: String,
    pub steps: Vec<Step>,
}

impl Saga {
    /// Start building a saga.
    pub fn builder() -> SagaBuilder {
        SagaBuilder::default()
    }

    /// Whether any step failed; the saga is then compensating or terminal.
    pub fn failing(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Failed)
    }

    /// Whether every step completed.
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Completed)
    }

    /// Index of the first pending step.
    pub fn earliest_pending_index(&self) -> Option<usize> {
        self.steps
            .iter()
            .position(|s| s.status == StepStatus::Pending)
    }

    /// Index of the last completed step.
    pub fn furthest_completed_index(&self) -> Option<usize> {
        self.steps
            .iter()
            .rposition(|s| s.status == StepStatus::Completed)
    }

    /// Index of the first failed step.
    pub fn failed_index(&self) -> Option<usize> {
        self.steps
            .iter()
            .position(|s| s.status == StepStatus::Failed)
    }

    /// Index of the step with `step_id`.
    pub fn step_index(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.step_id == step_id)
    }

    /// Step with `step_id`.
    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    /// The step the runtime is currently waiting on in the forward phase.
    pub fn current_step(&self) -> Option<&Step> {
        if self.failing() {
            return None;
        }
        self.earliest_pending_index().map(|i| &self.steps[i])
    }

    /// Apply a status transition, enforcing the legal moves.
    pub fn set_step_status(
        &mut self,
        step_id: &str,
        status: StepStatus,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let index = self.step_index(step_id).ok_or_else(|| CoreError::ValidationError {
            field: "stepId".to_string(),
            message: format!("step '{}' not found", step_id),
        })?;
        let from = self.steps[index].status;

        let allowed = match (from, status) {
            (StepStatus::Pending, StepStatus::Completed | StepStatus::Failed) => {
                !self.failing() && self.earliest_pending_index() == Some(index)
            }
            (StepStatus::Completed, StepStatus::Failed) => {
                self.failing() && self.furthest_completed_index() == Some(index)
            }
            _ => false,
        };
        if !allowed {
            return Err(CoreError::InvalidTransition {
                step_id: step_id.to_string(),
                from: from.to_string(),
                to: status.to_string(),
            });
        }

        let step = &mut self.steps[index];
        step.status = status;
        step.updated_at = now;
        Ok(())
    }

    /// Replace the step at `index` with `replacement`, keeping ids unique.
    pub fn splice_step(&mut self, index: usize, replacement: Vec<Step>) -> Result<()> {
        if index >= self.steps.len() {
            return Err(CoreError::ValidationError {
                field: "index".to_string(),
                message: format!("step index {} out of range", index),
            });
        }
        let mut spliced = self.steps.clone();
        spliced.splice(index..=index, replacement);

        let candidate = Saga {
            steps: spliced,
            ..self.clone()
        };
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(CoreError::ValidationError {
                field: "steps".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        let mut seen = HashSet::with_capacity(self.steps.len());
        for step in &self.steps {
            if step.step_id.is_empty() {
                return Err(CoreError::ValidationError {
                    field: "stepId".to_string(),
                    message: "must not be empty".to_string(),
                });
            }
            if !seen.insert(step.step_id.as_str()) {
                return Err(CoreError::DuplicateStep {
                    step_id: step.step_id.clone(),
                });
            }
        }

        let ordered = self
            .steps
            .windows(2)
            .all(|w| w[0].status.rank() <= w[1].status.rank());
        if !ordered {
            return Err(CoreError::InconsistentSaga {
                transaction_id: self.transaction_id.to_string(),
                reason: "step statuses must read completed, then failed, then pending".to_string(),
            });
        }
        Ok(())
    }
}

/// Builder for [`Saga`]. Validation happens once, in [`SagaBuilder::build`].
#[derive(Debug, Default)]
pub struct SagaBuilder {
    transaction_id: Option<Uuid>,
    saga_type: Option<SagaType>,
    initiated_by: Option<String>,
    steps: Vec<Step>,
}

impl SagaBuilder {
    /// Set the transaction id. A random one is generated when unset.
    pub fn transaction_id(mut self, transaction_id: Uuid) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    /// Set the saga type.
    pub fn saga_type(mut self, saga_type: SagaType) -> Self {
        self.saga_type = Some(saga_type);
        self
    }

    /// Set the attribution string.
    pub fn initiated_by(mut self, initiated_by: impl Into<String>) -> Self {
        self.initiated_by = Some(initiated_by.into());
        self
    }

    /// Append a pending step.
    pub fn add_step(mut self, step_id: impl Into<String>, action: Action) -> Self {
        self.steps.push(Step::pending(step_id, action, Utc::now()));
        self
    }

    /// Append a prepared step.
    pub fn add(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Validate and produce the saga.
    pub fn build(self) -> Result<Saga> {
        let saga_type = self.saga_type.ok_or_else(|| CoreError::ValidationError {
            field: "sagaType".to_string(),
            message: "is required".to_string(),
        })?;
        let initiated_by = self
            .initiated_by
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CoreError::ValidationError {
                field: "initiatedBy".to_string(),
                message: "is required".to_string(),
            })?;

        let saga = Saga {
            transaction_id: self.transaction_id.unwrap_or_else(Uuid::new_v4),
            saga_type,
            initiated_by,
            steps: self.steps,
        };
        saga.validate()?;
        Ok(saga)
    }
}

#[cfg(test)]
mod tests {
    use super::action::{DestroyAssetPayload, FieldEffectWeatherPayload};
    use super::*;

    fn destroy() -> Action {
        Action::DestroyAsset(DestroyAssetPayload {
            character_id: 42,
            template_id: 5130000,
            quantity: 1,
            remove_all: false,
        })
    }

    fn weather() -> Action {
        Action::FieldEffectWeather(FieldEffectWeatherPayload {
            character_id: 42,
            world_id: 0,
            channel_id: 1,
            map_id: 100000000,
            instance: Uuid::nil(),
            item_id: 5130000,
            message: "snow".to_string(),
            duration: 20,
        })
    }

    fn two_step() -> Saga {
        Saga::builder()
            .saga_type(SagaType::FieldEffectUse)
            .initiated_by("test")
            .add_step("destroy", destroy())
            .add_step("weather", weather())
            .build()
            .unwrap()
    }

    #[test]
    fn test_status_as_str_and_parse() {
        for status in [StepStatus::Pending, StepStatus::Completed, StepStatus::Failed] {
            assert_eq!(StepStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(StepStatus::parse("running"), None);
        assert_eq!(SagaType::parse("field_effect_use"), Some(SagaType::FieldEffectUse));
        assert_eq!(SagaType::MapAction.as_str(), "map_action");
    }

    #[test]
    fn test_builder_requires_type_and_initiator() {
        let err = Saga::builder()
            .initiated_by("x")
            .add_step("a", destroy())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("sagaType"));

        let err = Saga::builder()
            .saga_type(SagaType::QuestReward)
            .add_step("a", destroy())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("initiatedBy"));
    }

    #[test]
    fn test_builder_rejects_duplicate_step_ids() {
        let err = Saga::builder()
            .saga_type(SagaType::QuestReward)
            .initiated_by("x")
            .add_step("a", destroy())
            .add_step("a", weather())
            .build()
            .unwrap_err();
        assert_eq!(err.error_code(), "DUPLICATE_STEP");
    }

    #[test]
    fn test_builder_rejects_completed_after_pending() {
        let now = Utc::now();
        let mut done = Step::pending("b", weather(), now);
        done.status = StepStatus::Completed;

        let err = Saga::builder()
            .saga_type(SagaType::QuestReward)
            .initiated_by("x")
            .add_step("a", destroy())
            .add(done)
            .build()
            .unwrap_err();
        assert_eq!(err.error_code(), "INCONSISTENT_SAGA");
    }

    #[test]
    fn test_forward_progress_indices() {
        let mut saga = two_step();
        let now = Utc::now();
        assert_eq!(saga.earliest_pending_index(), Some(0));
        assert_eq!(saga.furthest_completed_index(), None);

        saga.set_step_status("destroy", StepStatus::Completed, now).unwrap();
        assert_eq!(saga.earliest_pending_index(), Some(1));
        assert_eq!(saga.furthest_completed_index(), Some(0));
        assert_eq!(saga.current_step().unwrap().step_id, "weather");

        saga.set_step_status("weather", StepStatus::Completed, now).unwrap();
        assert!(saga.is_complete());
        assert!(saga.current_step().is_none());
    }

    #[test]
    fn test_out_of_order_completion_rejected() {
        let mut saga = two_step();
        let err = saga
            .set_step_status("weather", StepStatus::Completed, Utc::now())
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_TRANSITION");
    }

    #[test]
    fn test_completed_to_failed_only_while_compensating() {
        let mut saga = two_step();
        let now = Utc::now();
        saga.set_step_status("destroy", StepStatus::Completed, now).unwrap();

        // Not failing yet: forbidden.
        assert!(saga.set_step_status("destroy", StepStatus::Failed, now).is_err());

        saga.set_step_status("weather", StepStatus::Failed, now).unwrap();
        assert!(saga.failing());
        assert_eq!(saga.failed_index(), Some(1));
        assert!(saga.current_step().is_none());

        saga.set_step_status("destroy", StepStatus::Failed, now).unwrap();
        assert_eq!(saga.furthest_completed_index(), None);
        assert_eq!(saga.failed_index(), Some(0));
        saga.validate().unwrap();
    }

    #[test]
    fn test_completed_never_returns_to_pending() {
        let mut saga = two_step();
        let now = Utc::now();
        saga.set_step_status("destroy", StepStatus::Completed, now).unwrap();
        let err = saga
            .set_step_status("destroy", StepStatus::Pending, now)
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_TRANSITION");
    }

    #[test]
    fn test_splice_step_rejects_colliding_ids() {
        let mut saga = two_step();
        let now = Utc::now();
        let err = saga
            .splice_step(0, vec![Step::pending("weather", destroy(), now)])
            .unwrap_err();
        assert_eq!(err.error_code(), "DUPLICATE_STEP");
        assert_eq!(saga.steps.len(), 2);

        saga.splice_step(
            0,
            vec![
                Step::pending("destroy-a", destroy(), now),
                Step::pending("destroy-b", destroy(), now),
            ],
        )
        .unwrap();
        let ids: Vec<_> = saga.steps.iter().map(|s| s.step_id.as_str()).collect();
        assert_eq!(ids, vec!["destroy-a", "destroy-b", "weather"]);
    }

    #[test]
    fn test_saga_json_shape() {
        let saga = two_step();
        let value = serde_json::to_value(&saga).unwrap();
        assert_eq!(value["sagaType"], "field_effect_use");
        assert_eq!(value["steps"][0]["stepId"], "destroy");
        assert_eq!(value["steps"][0]["status"], "pending");
        assert_eq!(value["steps"][1]["action"]["type"], "field_effect_weather");

        let back: Saga = serde_json::from_value(value).unwrap();
        assert_eq!(back, saga);
    }
}
