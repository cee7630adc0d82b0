// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Map-action rule engine.
//!
//! Scripts hold ordered rules. On map entry the rules are evaluated in order
//! and the first whose conditions all hold has its operations submitted as
//! one-step sagas; evaluation stops there.

pub mod evaluator;
pub mod executor;
pub mod model;
pub mod processor;
pub mod store;

pub use self::evaluator::{CharacterValidator, RuleEvaluator};
pub use self::executor::OperationExecutor;
pub use self::model::{MapActionScript, Operation, Rule, StoredScript};
pub use self::processor::{MapActionCommand, MapActionProcessor, ProcessResult};
pub use self::store::{MemoryScriptStore, ScriptStore};
