// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Step outcome and saga status events.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{Saga, SagaType};
use crate::bus::Envelope;
use crate::error::{CoreError, Result};

/// Envelope type of a saga submission on the saga command topic.
pub const SAGA_CREATE: &str = "CREATE";
/// Envelope type of a successful step outcome.
pub const STEP_COMPLETED: &str = "STEP_COMPLETED";
/// Envelope type of a failed step outcome.
pub const STEP_FAILED: &str = "STEP_FAILED";
/// Envelope type of a completed saga.
pub const SAGA_COMPLETED: &str = "COMPLETED";
/// Envelope type of a failed saga.
pub const SAGA_FAILED: &str = "FAILED";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepOutcomeBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
}

/// Outcome of one step, reported by the service that executed it.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Saga the step belongs to.
    pub transaction_id: Uuid,
    /// Step the outcome is for. When absent the runtime uses the step it is
    /// currently waiting on.
    pub step_id: Option<String>,
    /// Whether the step succeeded.
    pub succeeded: bool,
    /// Failure reason.
    pub error: Option<String>,
    /// Service-provided data, e.g. an allocated asset id.
    pub result: Option<Value>,
}

impl StepOutcome {
    /// A success outcome.
    pub fn completed(transaction_id: Uuid, step_id: impl Into<String>) -> Self {
        Self {
            transaction_id,
            step_id: Some(step_id.into()),
            succeeded: true,
            error: None,
            result: None,
        }
    }

    /// A failure outcome.
    pub fn failed(
        transaction_id: Uuid,
        step_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            transaction_id,
            step_id: Some(step_id.into()),
            succeeded: false,
            error: Some(error.into()),
            result: None,
        }
    }

    /// Attach service-provided data.
    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    /// Render as a character-addressed envelope.
    pub fn into_envelope(self, world_id: u8, character_id: u32) -> Envelope<Value> {
        let kind = if self.succeeded {
            STEP_COMPLETED
        } else {
            STEP_FAILED
        };
        let body = StepOutcomeBody {
            step_id: self.step_id,
            error: self.error,
            result: self.result,
        };
        Envelope::for_character(
            world_id,
            character_id,
            kind,
            serde_json::to_value(body).unwrap_or(Value::Null),
        )
        .with_transaction(self.transaction_id)
    }

    /// Decode from an envelope received on the step outcome topic.
    pub fn from_envelope(envelope: Envelope<Value>) -> Result<Self> {
        let succeeded = match envelope.kind.as_str() {
            STEP_COMPLETED => true,
            STEP_FAILED => false,
            other => {
                return Err(CoreError::ValidationError {
                    field: "type".to_string(),
                    message: format!("'{}' is not a step outcome", other),
                });
            }
        };
        let transaction_id = envelope
            .transaction_id
            .ok_or_else(|| CoreError::ValidationError {
                field: "transactionId".to_string(),
                message: "is required on step outcomes".to_string(),
            })?;
        let body: StepOutcomeBody = if envelope.body.is_null() {
            StepOutcomeBody::default()
        } else {
            serde_json::from_value(envelope.body)?
        };

        Ok(Self {
            transaction_id,
            step_id: body.step_id,
            succeeded,
            error: body.error,
            result: body.result,
        })
    }
}

/// Submission envelope for `saga`, keyed by the character it concerns.
pub fn submission(saga: &Saga, world_id: u8, character_id: u32) -> Envelope<Saga> {
    Envelope::for_character(world_id, character_id, SAGA_CREATE, saga.clone())
        .with_transaction(saga.transaction_id)
}

/// Terminal status of a saga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaStatusEvent {
    pub saga_type: SagaType,
    pub initiated_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
}

impl SagaStatusEvent {
    /// `COMPLETED` envelope for `saga`.
    pub fn completed(saga: &Saga) -> Envelope<Self> {
        Self::envelope(saga, SAGA_COMPLETED, None, None)
    }

    /// `FAILED` envelope for `saga`.
    pub fn failed(saga: &Saga, reason: &str, failed_step: Option<&str>) -> Envelope<Self> {
        Self::envelope(
            saga,
            SAGA_FAILED,
            Some(reason.to_string()),
            failed_step.map(str::to_string),
        )
    }

    fn envelope(
        saga: &Saga,
        kind: &str,
        reason: Option<String>,
        failed_step: Option<String>,
    ) -> Envelope<Self> {
        Envelope {
            transaction_id: Some(saga.transaction_id),
            world_id: 0,
            character_id: None,
            account_id: None,
            kind: kind.to_string(),
            body: Self {
                saga_type: saga.saga_type,
                initiated_by: saga.initiated_by.clone(),
                reason,
                failed_step,
            },
        }
    }
}
