// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Saga runtime.
//!
//! [`SagaRuntime`] owns the step machine. Every entry point (submission, step
//! outcome, timeout) takes a per-transaction lock, loads the saga, applies one
//! input, then drives the saga forward until it must wait for an event or
//! reaches a terminal state:
//!
//! ```text
//!             outcome ok                     outcome failed / timeout
//!   ┌───────────────────────┐          ┌────────────────────────────────┐
//!   ▼                       │          │                                ▼
//! Active ── dispatch earliest pending ─┘                          Compensating
//!   │  (expand high-level steps first)                                  │
//!   │ no pending left                     undo furthest completed, wait │
//!   ▼                                     none left                     ▼
//! Completed                                                         Failed
//!                                         compensator failed → Stuck
//! ```
//!
//! State is persisted before commands are published, so a crash between the
//! two leaves the saga waiting and the timeout sweep compensates it. Commands
//! are never retried.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::bus::{Envelope, Message, MessageBuffer, Producer, TopicResolver};
use crate::clock::Clock;
use crate::compensation::{Compensation, compensation_for};
use crate::error::{CoreError, Result};
use crate::persistence::{Persistence, SagaRecord, SagaStatus};
use crate::saga::event::SAGA_CREATE;
use crate::saga::{Saga, SagaStatusEvent, SagaType, StepOutcome, StepStatus, expansion};
use crate::tenant::Tenant;
use crate::topic;

/// Saga runtime settings.
#[derive(Debug, Clone)]
pub struct SagaRuntimeConfig {
    /// Deadline for progress when no per-type override exists.
    pub default_timeout: Duration,
    /// Per saga type deadlines.
    pub type_timeouts: HashMap<SagaType, Duration>,
    /// Maximum sagas handled per timeout sweep.
    pub sweep_batch_size: i64,
}

impl Default for SagaRuntimeConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(300),
            type_timeouts: HashMap::new(),
            sweep_batch_size: 100,
        }
    }
}

impl SagaRuntimeConfig {
    /// Deadline applied to sagas of `saga_type`.
    pub fn timeout_for(&self, saga_type: SagaType) -> Duration {
        self.type_timeouts
            .get(&saga_type)
            .copied()
            .unwrap_or(self.default_timeout)
    }
}

/// What happened to an inbound step outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeDisposition {
    /// The outcome moved the saga.
    Applied,
    /// Duplicate, out of order, or for a finished saga. Nothing changed.
    Discarded,
}

type LockKey = (String, String);

/// Held per-transaction lock. Dropping it unlocks and removes the map entry
/// once no other task holds or waits on it.
struct TransactionLock<'a> {
    locks: &'a DashMap<LockKey, Arc<Mutex<()>>>,
    key: LockKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TransactionLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Durable per-transaction step machine.
pub struct SagaRuntime {
    persistence: Arc<dyn Persistence>,
    producer: Arc<dyn Producer>,
    topics: TopicResolver,
    clock: Arc<dyn Clock>,
    config: SagaRuntimeConfig,
    locks: DashMap<LockKey, Arc<Mutex<()>>>,
}

impl SagaRuntime {
    /// Create a runtime.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        producer: Arc<dyn Producer>,
        topics: TopicResolver,
        clock: Arc<dyn Clock>,
        config: SagaRuntimeConfig,
    ) -> Self {
        Self {
            persistence,
            producer,
            topics,
            clock,
            config,
            locks: DashMap::new(),
        }
    }

    /// Runtime settings.
    pub fn config(&self) -> &SagaRuntimeConfig {
        &self.config
    }

    /// Current stored state of a saga.
    pub async fn get(&self, tenant: &Tenant, transaction_id: Uuid) -> Result<Option<SagaRecord>> {
        self.persistence
            .get_saga(&tenant.key(), &transaction_id.to_string())
            .await
    }

    /// Most recent sagas of a tenant.
    pub async fn list(
        &self,
        tenant: &Tenant,
        status: Option<SagaStatus>,
        limit: i64,
    ) -> Result<Vec<SagaRecord>> {
        self.persistence
            .list_sagas(&tenant.key(), status.map(|s| s.as_str()), limit)
            .await
    }

    async fn lock_for(&self, tenant_id: &str, transaction_id: &str) -> TransactionLock<'_> {
        let key = (tenant_id.to_string(), transaction_id.to_string());
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        TransactionLock {
            locks: &self.locks,
            key,
            guard: Some(lock.lock_owned().await),
        }
    }

    fn deadline(&self, saga_type: SagaType, now: DateTime<Utc>) -> DateTime<Utc> {
        let timeout = chrono::Duration::from_std(self.config.timeout_for(saga_type))
            .unwrap_or_else(|_| chrono::Duration::days(365));
        now + timeout
    }

    /// Persist and start a new saga.
    #[instrument(skip(self, saga), fields(tenant_id = %tenant.id, transaction_id = %saga.transaction_id))]
    pub async fn submit(&self, tenant: &Tenant, saga: Saga) -> Result<()> {
        saga.validate()?;
        let now = self.clock.now();
        let mut record = SagaRecord::new(tenant, &saga, self.deadline(saga.saga_type, now), now)?;

        let _lock = self
            .lock_for(&record.tenant_id, &record.transaction_id)
            .await;

        self.persistence.insert_saga(&record).await?;
        info!(
            saga_type = saga.saga_type.as_str(),
            steps = saga.steps.len(),
            initiated_by = %saga.initiated_by,
            "Saga submitted"
        );

        let mut saga = saga;
        let mut buffer = MessageBuffer::new(tenant);
        self.drive(&mut record, &mut saga, &mut buffer, now)?;
        self.commit(&mut record, &saga, buffer, now).await?;
        Ok(())
    }

    /// Apply a step outcome reported by a service.
    #[instrument(skip(self, outcome), fields(tenant_id = %tenant.id, transaction_id = %outcome.transaction_id))]
    pub async fn handle_outcome(
        &self,
        tenant: &Tenant,
        outcome: StepOutcome,
    ) -> Result<OutcomeDisposition> {
        let tenant_id = tenant.key();
        let transaction_id = outcome.transaction_id.to_string();
        let _lock = self.lock_for(&tenant_id, &transaction_id).await;

        let Some(mut record) = self.persistence.get_saga(&tenant_id, &transaction_id).await? else {
            warn!("Discarding step outcome for unknown saga");
            return Ok(OutcomeDisposition::Discarded);
        };
        let status = record.lifecycle();
        if status.is_terminal() {
            warn!(status = status.as_str(), "Discarding step outcome for finished saga");
            return Ok(OutcomeDisposition::Discarded);
        }

        let now = self.clock.now();
        let mut saga = record.saga()?;

        // The step the saga is waiting on: earliest pending going forward,
        // furthest completed while compensating.
        let awaiting = match status {
            SagaStatus::Active => saga.earliest_pending_index(),
            _ => saga.furthest_completed_index(),
        };
        let Some(index) = awaiting else {
            warn!(status = status.as_str(), "Discarding step outcome: no step is awaiting one");
            return Ok(OutcomeDisposition::Discarded);
        };
        let step_id = saga.steps[index].step_id.clone();
        if let Some(reported) = outcome.step_id.as_deref()
            && reported != step_id
        {
            warn!(
                step_id = reported,
                awaiting = %step_id,
                "Discarding step outcome for a step that is not awaiting one"
            );
            return Ok(OutcomeDisposition::Discarded);
        }

        let mut buffer = MessageBuffer::new(tenant);
        match (status, outcome.succeeded) {
            (SagaStatus::Active, true) => {
                if let Some(result) = &outcome.result {
                    let step = &mut saga.steps[index];
                    step.result = Some(result.clone());
                    step.action.absorb_result(result);
                }
                saga.set_step_status(&step_id, StepStatus::Completed, now)?;
                debug!(step_id = %step_id, "Step completed");
            }
            (SagaStatus::Active, false) => {
                let reason = outcome.error.unwrap_or_else(|| "unspecified".to_string());
                saga.set_step_status(&step_id, StepStatus::Failed, now)?;
                self.fail_forward(&mut record, &saga, index, &reason, &mut buffer)?;
            }
            (_, true) => {
                saga.set_step_status(&step_id, StepStatus::Failed, now)?;
                info!(step_id = %step_id, "Step compensated");
            }
            (_, false) => {
                let err = CoreError::CompensationFailed {
                    transaction_id: transaction_id.clone(),
                    step_id: step_id.clone(),
                    reason: outcome.error.unwrap_or_else(|| "unspecified".to_string()),
                };
                error!(step_id = %step_id, error = %err, "Compensation failed; saga requires operator intervention");
                self.mark_stuck(&mut record, &saga, &err, &step_id, &mut buffer)?;
            }
        }

        self.drive(&mut record, &mut saga, &mut buffer, now)?;
        self.commit(&mut record, &saga, buffer, now).await?;
        Ok(OutcomeDisposition::Applied)
    }

    /// Force-fail sagas whose deadline passed. Returns how many were handled.
    pub async fn sweep_timeouts(&self) -> Result<usize> {
        let now = self.clock.now();
        let due = self
            .persistence
            .get_timed_out_sagas(now, self.config.sweep_batch_size)
            .await?;

        let mut handled = 0;
        for candidate in due {
            match self.time_out(&candidate, now).await {
                Ok(true) => handled += 1,
                Ok(false) => {}
                Err(e) => error!(
                    transaction_id = %candidate.transaction_id,
                    error = %e,
                    "Failed to time out saga"
                ),
            }
        }
        Ok(handled)
    }

    async fn time_out(&self, candidate: &SagaRecord, now: DateTime<Utc>) -> Result<bool> {
        let tenant = candidate.tenant()?;
        let _lock = self
            .lock_for(&candidate.tenant_id, &candidate.transaction_id)
            .await;

        // Re-read under the lock: an outcome may have landed since the query.
        let Some(mut record) = self
            .persistence
            .get_saga(&candidate.tenant_id, &candidate.transaction_id)
            .await?
        else {
            return Ok(false);
        };
        let status = record.lifecycle();
        if status.is_terminal() || record.timeout_at > now {
            return Ok(false);
        }

        let mut saga = record.saga()?;
        let mut buffer = MessageBuffer::new(&tenant);
        match status {
            SagaStatus::Active => {
                let Some(index) = saga.earliest_pending_index() else {
                    return Ok(false);
                };
                let step_id = saga.steps[index].step_id.clone();
                let err = CoreError::StepTimeout {
                    transaction_id: record.transaction_id.clone(),
                    step_id: step_id.clone(),
                };
                warn!(
                    tenant_id = %tenant.id,
                    transaction_id = %record.transaction_id,
                    step_id = %step_id,
                    "Saga step timed out"
                );
                saga.set_step_status(&step_id, StepStatus::Failed, now)?;
                self.fail_forward(&mut record, &saga, index, &err.to_string(), &mut buffer)?;
            }
            _ => {
                let step_id = saga
                    .furthest_completed_index()
                    .map(|i| saga.steps[i].step_id.clone())
                    .unwrap_or_default();
                let err = CoreError::CompensationFailed {
                    transaction_id: record.transaction_id.clone(),
                    step_id: step_id.clone(),
                    reason: "compensation timed out".to_string(),
                };
                error!(
                    tenant_id = %tenant.id,
                    transaction_id = %record.transaction_id,
                    error = %err,
                    "Compensation timed out; saga requires operator intervention"
                );
                self.mark_stuck(&mut record, &saga, &err, &step_id, &mut buffer)?;
            }
        }

        self.drive(&mut record, &mut saga, &mut buffer, now)?;
        self.commit(&mut record, &saga, buffer, now).await?;
        Ok(true)
    }

    /// Route a bus message to the matching entry point.
    pub async fn handle_message(&self, message: &Message) -> Result<()> {
        if message.topic == self.topics.resolve(topic::EVENT_TOPIC_SAGA_STEP) {
            let tenant = message.tenant()?;
            let outcome = StepOutcome::from_envelope(message.envelope()?)?;
            self.handle_outcome(&tenant, outcome).await?;
            return Ok(());
        }

        if message.topic == self.topics.resolve(topic::COMMAND_TOPIC_SAGA) {
            if message.kind() != Some(SAGA_CREATE) {
                debug!(kind = ?message.kind(), "Ignoring saga command");
                return Ok(());
            }
            let tenant = message.tenant()?;
            let envelope: Envelope<Saga> = message.envelope()?;
            return match self.submit(&tenant, envelope.body).await {
                Err(CoreError::SagaAlreadyExists { transaction_id }) => {
                    warn!(transaction_id = %transaction_id, "Ignoring duplicate saga submission");
                    Ok(())
                }
                other => other,
            };
        }

        debug!(topic = %message.topic, "Ignoring message on unrelated topic");
        Ok(())
    }

    // Forward failure at `index`: terminal for validation steps, otherwise
    // switch to compensation.
    fn fail_forward(
        &self,
        record: &mut SagaRecord,
        saga: &Saga,
        index: usize,
        reason: &str,
        buffer: &mut MessageBuffer,
    ) -> Result<()> {
        let step = &saga.steps[index];
        let reason = format!("step '{}' failed: {}", step.step_id, reason);

        if step.action.fails_terminally() {
            info!(step_id = %step.step_id, reason = %reason, "Saga failed without compensation");
            record.status = SagaStatus::Failed.as_str().to_string();
            record.failure_reason = Some(reason.clone());
            buffer.put(
                self.topics.resolve(topic::EVENT_TOPIC_SAGA_STATUS),
                &SagaStatusEvent::failed(saga, &reason, Some(&step.step_id)),
            )?;
            return Ok(());
        }

        info!(step_id = %step.step_id, reason = %reason, "Saga compensating");
        record.status = SagaStatus::Compensating.as_str().to_string();
        record.failure_reason = Some(reason);
        Ok(())
    }

    fn mark_stuck(
        &self,
        record: &mut SagaRecord,
        saga: &Saga,
        err: &CoreError,
        step_id: &str,
        buffer: &mut MessageBuffer,
    ) -> Result<()> {
        let reason = err.to_string();
        record.status = SagaStatus::Stuck.as_str().to_string();
        record.failure_reason = Some(reason.clone());
        buffer.put(
            self.topics.resolve(topic::EVENT_TOPIC_SAGA_STATUS),
            &SagaStatusEvent::failed(saga, &reason, Some(step_id)),
        )
    }

    // Advance until the saga must wait or is terminal. Pure apart from the buffer.
    fn drive(
        &self,
        record: &mut SagaRecord,
        saga: &mut Saga,
        buffer: &mut MessageBuffer,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let transaction_id = saga.transaction_id;
        loop {
            match record.lifecycle() {
                SagaStatus::Active => {
                    let Some(index) = saga.earliest_pending_index() else {
                        info!(transaction_id = %transaction_id, "Saga completed");
                        record.status = SagaStatus::Completed.as_str().to_string();
                        buffer.put(
                            self.topics.resolve(topic::EVENT_TOPIC_SAGA_STATUS),
                            &SagaStatusEvent::completed(saga),
                        )?;
                        return Ok(());
                    };

                    if expansion::expand_in_place(saga, index, now)? {
                        debug!(
                            transaction_id = %transaction_id,
                            index,
                            steps = saga.steps.len(),
                            "Expanded high-level step"
                        );
                        continue;
                    }

                    let step = &saga.steps[index];
                    match step.action.dispatch(transaction_id, &step.step_id)? {
                        Some(dispatch) => {
                            debug!(
                                transaction_id = %transaction_id,
                                step_id = %step.step_id,
                                action = step.action.name(),
                                "Dispatching step"
                            );
                            buffer.put(self.topics.resolve(dispatch.topic), &dispatch.envelope)?;
                        }
                        None => debug!(
                            transaction_id = %transaction_id,
                            step_id = %step.step_id,
                            "Awaiting correlated event"
                        ),
                    }
                    return Ok(());
                }
                SagaStatus::Compensating => {
                    let Some(index) = saga.furthest_completed_index() else {
                        let failed_step = saga
                            .steps
                            .iter()
                            .rposition(|s| s.status == StepStatus::Failed)
                            .map(|i| saga.steps[i].step_id.clone());
                        let reason = record
                            .failure_reason
                            .clone()
                            .unwrap_or_else(|| "compensated".to_string());
                        info!(transaction_id = %transaction_id, "Saga compensation finished");
                        record.status = SagaStatus::Failed.as_str().to_string();
                        buffer.put(
                            self.topics.resolve(topic::EVENT_TOPIC_SAGA_STATUS),
                            &SagaStatusEvent::failed(saga, &reason, failed_step.as_deref()),
                        )?;
                        return Ok(());
                    };

                    let step_id = saga.steps[index].step_id.clone();
                    let undo = match compensation_for(&saga.steps[index]) {
                        Compensation::Undo(action) => action.dispatch(transaction_id, &step_id)?,
                        Compensation::Nothing => None,
                    };
                    match undo {
                        Some(dispatch) => {
                            info!(
                                transaction_id = %transaction_id,
                                step_id = %step_id,
                                command = %dispatch.envelope.kind,
                                "Dispatching compensation"
                            );
                            buffer.put(self.topics.resolve(dispatch.topic), &dispatch.envelope)?;
                            return Ok(());
                        }
                        None => {
                            debug!(transaction_id = %transaction_id, step_id = %step_id, "Nothing to compensate");
                            saga.set_step_status(&step_id, StepStatus::Failed, now)?;
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    async fn commit(
        &self,
        record: &mut SagaRecord,
        saga: &Saga,
        buffer: MessageBuffer,
        now: DateTime<Utc>,
    ) -> Result<()> {
        record.set_saga(saga)?;
        record.updated_at = now;
        record.timeout_at = self.deadline(saga.saga_type, now);
        self.persistence.update_saga(record).await?;
        record.version += 1;

        buffer.flush(self.producer.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::RecordingProducer;
    use crate::clock::ManualClock;
    use crate::persistence::SqlitePersistence;
    use crate::saga::action::{
        Action, AwaitCharacterCreatedPayload, ConditionInput, DestroyAssetPayload,
        FieldEffectWeatherPayload, ValidateCharacterStatePayload,
    };
    use serde_json::json;

    struct Harness {
        runtime: SagaRuntime,
        producer: Arc<RecordingProducer>,
        clock: Arc<ManualClock>,
        tenant: Tenant,
    }

    async fn harness() -> Harness {
        let persistence = Arc::new(SqlitePersistence::in_memory().await.unwrap());
        let producer = Arc::new(RecordingProducer::new());
        let clock = Arc::new(ManualClock::starting_now());
        let runtime = SagaRuntime::new(
            persistence,
            producer.clone(),
            TopicResolver::default(),
            clock.clone(),
            SagaRuntimeConfig {
                default_timeout: Duration::from_secs(30),
                ..Default::default()
            },
        );
        Harness {
            runtime,
            producer,
            clock,
            tenant: Tenant::new(Uuid::new_v4(), "GMS", 83, 1),
        }
    }

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

    fn field_effect_saga() -> Saga {
        Saga::builder()
            .saga_type(SagaType::FieldEffectUse)
            .initiated_by("test")
            .add_step("destroy", destroy())
            .add_step("weather", weather())
            .build()
            .unwrap()
    }

    async fn status(h: &Harness, tx: Uuid) -> SagaStatus {
        h.runtime
            .get(&h.tenant, tx)
            .await
            .unwrap()
            .unwrap()
            .lifecycle()
    }

    #[tokio::test]
    async fn test_submit_dispatches_first_step_only() {
        let h = harness().await;
        let saga = field_effect_saga();
        h.runtime.submit(&h.tenant, saga.clone()).await.unwrap();

        let sent = h.producer.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, topic::COMMAND_TOPIC_COMPARTMENT);
        assert_eq!(sent[0].kind(), Some("DESTROY_ASSET"));
        assert_eq!(sent[0].key, "42");
        assert_eq!(status(&h, saga.transaction_id).await, SagaStatus::Active);
    }

    #[tokio::test]
    async fn test_duplicate_submission_rejected() {
        let h = harness().await;
        let saga = field_effect_saga();
        h.runtime.submit(&h.tenant, saga.clone()).await.unwrap();

        let err = h.runtime.submit(&h.tenant, saga).await.unwrap_err();
        assert_eq!(err.error_code(), "SAGA_ALREADY_EXISTS");
    }

    #[tokio::test]
    async fn test_outcomes_advance_to_completion() {
        let h = harness().await;
        let saga = field_effect_saga();
        let tx = saga.transaction_id;
        h.runtime.submit(&h.tenant, saga).await.unwrap();
        h.producer.take();

        let d = h
            .runtime
            .handle_outcome(&h.tenant, StepOutcome::completed(tx, "destroy"))
            .await
            .unwrap();
        assert_eq!(d, OutcomeDisposition::Applied);
        let sent = h.producer.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind(), Some("WEATHER_START"));

        h.runtime
            .handle_outcome(&h.tenant, StepOutcome::completed(tx, "weather"))
            .await
            .unwrap();
        let sent = h.producer.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, topic::EVENT_TOPIC_SAGA_STATUS);
        assert_eq!(sent[0].kind(), Some("COMPLETED"));
        assert_eq!(status(&h, tx).await, SagaStatus::Completed);
    }

    #[tokio::test]
    async fn test_duplicate_and_out_of_order_outcomes_are_discarded() {
        let h = harness().await;
        let saga = field_effect_saga();
        let tx = saga.transaction_id;
        h.runtime.submit(&h.tenant, saga).await.unwrap();

        // Out of order: weather before destroy.
        let d = h
            .runtime
            .handle_outcome(&h.tenant, StepOutcome::completed(tx, "weather"))
            .await
            .unwrap();
        assert_eq!(d, OutcomeDisposition::Discarded);

        h.runtime
            .handle_outcome(&h.tenant, StepOutcome::completed(tx, "destroy"))
            .await
            .unwrap();
        h.producer.take();

        // Duplicate for a step that already transitioned.
        let d = h
            .runtime
            .handle_outcome(&h.tenant, StepOutcome::completed(tx, "destroy"))
            .await
            .unwrap();
        assert_eq!(d, OutcomeDisposition::Discarded);
        assert!(h.producer.messages().is_empty());
    }

    #[tokio::test]
    async fn test_failure_compensates_completed_steps_in_reverse() {
        let h = harness().await;
        let saga = field_effect_saga();
        let tx = saga.transaction_id;
        h.runtime.submit(&h.tenant, saga).await.unwrap();
        h.runtime
            .handle_outcome(&h.tenant, StepOutcome::completed(tx, "destroy"))
            .await
            .unwrap();
        h.producer.take();

        h.runtime
            .handle_outcome(&h.tenant, StepOutcome::failed(tx, "weather", "map busy"))
            .await
            .unwrap();
        let sent = h.producer.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind(), Some("CREATE_ASSET"));
        assert_eq!(sent[0].value["body"]["item"]["templateId"], json!(5130000));
        assert_eq!(sent[0].value["body"]["stepId"], json!("destroy"));
        assert_eq!(status(&h, tx).await, SagaStatus::Compensating);

        h.runtime
            .handle_outcome(&h.tenant, StepOutcome::completed(tx, "destroy"))
            .await
            .unwrap();
        let sent = h.producer.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind(), Some("FAILED"));
        assert_eq!(sent[0].value["body"]["failedStep"], json!("weather"));

        let record = h.runtime.get(&h.tenant, tx).await.unwrap().unwrap();
        assert_eq!(record.lifecycle(), SagaStatus::Failed);
        let saga = record.saga().unwrap();
        assert!(saga.steps.iter().all(|s| s.status == StepStatus::Failed));
    }

    #[tokio::test]
    async fn test_compensation_failure_leaves_saga_stuck() {
        let h = harness().await;
        let saga = field_effect_saga();
        let tx = saga.transaction_id;
        h.runtime.submit(&h.tenant, saga).await.unwrap();
        h.runtime
            .handle_outcome(&h.tenant, StepOutcome::completed(tx, "destroy"))
            .await
            .unwrap();
        h.runtime
            .handle_outcome(&h.tenant, StepOutcome::failed(tx, "weather", "map busy"))
            .await
            .unwrap();
        h.producer.take();

        h.runtime
            .handle_outcome(&h.tenant, StepOutcome::failed(tx, "destroy", "inventory full"))
            .await
            .unwrap();

        let record = h.runtime.get(&h.tenant, tx).await.unwrap().unwrap();
        assert_eq!(record.lifecycle(), SagaStatus::Stuck);
        assert!(record.failure_reason.unwrap().contains("inventory full"));

        let sent = h.producer.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind(), Some("FAILED"));

        // Never retried: further outcomes are discarded.
        let d = h
            .runtime
            .handle_outcome(&h.tenant, StepOutcome::completed(tx, "destroy"))
            .await
            .unwrap();
        assert_eq!(d, OutcomeDisposition::Discarded);
    }

    #[tokio::test]
    async fn test_validation_failure_is_terminal_without_compensation() {
        let h = harness().await;
        let saga = Saga::builder()
            .saga_type(SagaType::QuestStart)
            .initiated_by("test")
            .add_step("destroy", destroy())
            .add_step(
                "validate",
                Action::ValidateCharacterState(ValidateCharacterStatePayload {
                    character_id: 42,
                    conditions: vec![ConditionInput {
                        kind: "level".to_string(),
                        operator: ">=".to_string(),
                        value: 30,
                        reference_id: None,
                    }],
                }),
            )
            .build()
            .unwrap();
        let tx = saga.transaction_id;
        h.runtime.submit(&h.tenant, saga).await.unwrap();
        h.runtime
            .handle_outcome(&h.tenant, StepOutcome::completed(tx, "destroy"))
            .await
            .unwrap();
        h.producer.take();

        h.runtime
            .handle_outcome(&h.tenant, StepOutcome::failed(tx, "validate", "level too low"))
            .await
            .unwrap();

        let sent = h.producer.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind(), Some("FAILED"));
        let record = h.runtime.get(&h.tenant, tx).await.unwrap().unwrap();
        assert_eq!(record.lifecycle(), SagaStatus::Failed);
        // The destroy step stays completed: nothing was undone.
        assert_eq!(
            record.saga().unwrap().steps[0].status,
            StepStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_awaiting_step_records_created_character() {
        let h = harness().await;
        let saga = Saga::builder()
            .saga_type(SagaType::CharacterCreation)
            .initiated_by("test")
            .add_step(
                "await",
                Action::AwaitCharacterCreated(AwaitCharacterCreatedPayload {
                    character_name: "Hero".to_string(),
                    follow_up_saga_id: None,
                    created_character_id: None,
                }),
            )
            .build()
            .unwrap();
        let tx = saga.transaction_id;
        h.runtime.submit(&h.tenant, saga).await.unwrap();
        assert!(h.producer.take().is_empty());

        let mut outcome = StepOutcome::completed(tx, "await").with_result(json!({"characterId": 9001}));
        outcome.step_id = None;
        h.runtime.handle_outcome(&h.tenant, outcome).await.unwrap();

        let saga = h.runtime.get(&h.tenant, tx).await.unwrap().unwrap().saga().unwrap();
        match &saga.steps[0].action {
            Action::AwaitCharacterCreated(p) => assert_eq!(p.created_character_id, Some(9001)),
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_sweep_fails_pending_step_and_compensates() {
        let h = harness().await;
        let saga = field_effect_saga();
        let tx = saga.transaction_id;
        h.runtime.submit(&h.tenant, saga).await.unwrap();
        h.runtime
            .handle_outcome(&h.tenant, StepOutcome::completed(tx, "destroy"))
            .await
            .unwrap();
        h.producer.take();

        h.clock.advance_secs(10);
        assert_eq!(h.runtime.sweep_timeouts().await.unwrap(), 0);

        h.clock.advance_secs(31);
        assert_eq!(h.runtime.sweep_timeouts().await.unwrap(), 1);

        let sent = h.producer.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind(), Some("CREATE_ASSET"));
        let record = h.runtime.get(&h.tenant, tx).await.unwrap().unwrap();
        assert_eq!(record.lifecycle(), SagaStatus::Compensating);
        assert!(record.failure_reason.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let h = harness().await;
        let saga = field_effect_saga();
        let tx = saga.transaction_id;
        h.runtime.submit(&h.tenant, saga).await.unwrap();

        let other = Tenant::new(Uuid::new_v4(), "GMS", 83, 1);
        assert!(h.runtime.get(&other, tx).await.unwrap().is_none());
        let d = h
            .runtime
            .handle_outcome(&other, StepOutcome::completed(tx, "destroy"))
            .await
            .unwrap();
        assert_eq!(d, OutcomeDisposition::Discarded);
    }

    #[tokio::test]
    async fn test_handle_message_routes_submission_and_outcome() {
        let h = harness().await;
        let saga = field_effect_saga();
        let tx = saga.transaction_id;

        let submission = crate::saga::event::submission(&saga, 0, 42);
        let message = Message {
            topic: topic::COMMAND_TOPIC_SAGA.to_string(),
            key: submission.partition_key(),
            headers: h.tenant.to_headers(),
            value: serde_json::to_value(&submission).unwrap(),
        };
        h.runtime.handle_message(&message).await.unwrap();
        // Redelivery is tolerated.
        h.runtime.handle_message(&message).await.unwrap();

        let outcome = StepOutcome::completed(tx, "destroy").into_envelope(0, 42);
        let message = Message {
            topic: topic::EVENT_TOPIC_SAGA_STEP.to_string(),
            key: "42".to_string(),
            headers: h.tenant.to_headers(),
            value: serde_json::to_value(&outcome).unwrap(),
        };
        h.runtime.handle_message(&message).await.unwrap();

        let saga = h.runtime.get(&h.tenant, tx).await.unwrap().unwrap().saga().unwrap();
        assert_eq!(saga.steps[0].status, StepStatus::Completed);
    }

    #[tokio::test]
    async fn test_transaction_locks_are_released_on_every_path() {
        let h = harness().await;

        let d = h
            .runtime
            .handle_outcome(&h.tenant, StepOutcome::completed(Uuid::new_v4(), "destroy"))
            .await
            .unwrap();
        assert_eq!(d, OutcomeDisposition::Discarded);
        assert!(h.runtime.locks.is_empty());

        // A saga still waiting on a step does not pin its lock either.
        let saga = field_effect_saga();
        let tx = saga.transaction_id;
        h.runtime.submit(&h.tenant, saga).await.unwrap();
        assert!(h.runtime.locks.is_empty());

        let d = h
            .runtime
            .handle_outcome(&h.tenant, StepOutcome::completed(tx, "weather"))
            .await
            .unwrap();
        assert_eq!(d, OutcomeDisposition::Discarded);
        assert!(h.runtime.locks.is_empty());
    }
}

