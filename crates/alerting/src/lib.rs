//! Alert scheduling and evaluation engine.
//!
//! This crate provides:
//! - A gapless one-second [`ticker::Ticker`] with send-side backpressure
//! - A [`scheduler::Scheduler`] that decides which rules are due on each tick
//! - A [`dispatcher::JobDispatcher`] running bounded-retry evaluation per job
//! - Condition folding ([`eval::DefaultEvalHandler`]) and the alert-state
//!   hysteresis state machine ([`eval::EvalContext`])
//! - Result persistence and per-notifier notification decisions
//! - Explicit condition and notifier registries injected at startup

pub mod conditions;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod eval;
pub mod model;
pub mod notification;
pub mod reader;
pub mod result;
pub mod rule;
pub mod scheduler;
pub mod store;
pub mod ticker;

#[cfg(test)]
pub(crate) mod testutil;

pub use conditions::{Condition, ConditionRegistry, ConditionResult, Operator, RuleCondition};
pub use dispatcher::JobDispatcher;
pub use engine::AlertEngine;
pub use error::{AlertingError, ConditionError};
pub use eval::{DefaultEvalHandler, EvalContext, EvalHandler, RuleTester};
pub use notification::{NotificationService, Notifier, NotifierRegistry, NotifyError};
pub use reader::{RuleReader, StoreRuleReader};
pub use result::{DefaultResultHandler, ResultHandler};
pub use rule::{Rule, RuleState};
pub use scheduler::{Job, Scheduler};
pub use store::{MemoryStore, ModelStore, StoreError};
pub use ticker::Ticker;
