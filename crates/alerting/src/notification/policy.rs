//! Ordered decision table for whether a notifier should fire.
//!
//! An evaluation is first classified into a [`Transition`]; [`should_notify`]
//! then walks the table top to bottom and the first matching row wins.

use chrono::{DateTime, Utc};
use cloudmon_core::AlertState;

use crate::model::{elapsed, NotificationRecord};

use super::traits::NotifierSettings;

/// What an evaluation did to a rule's state, as far as notifying cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Some series recovered; always worth telling.
    Recovered,
    /// Into `NoData`.
    ToNoData,
    /// Into `Pending`.
    ToPending,
    /// Into or staying in `Alerting`.
    ToAlerting { from: AlertState },
    /// Any other state held across the evaluation.
    Unchanged(AlertState),
    /// From `Unknown` or `Pending`, or `Ok` into `Ok`/`Pending`.
    Calming,
    /// Everything else, e.g. `Alerting` into `Ok`.
    Changed { to: AlertState },
}

impl Transition {
    pub fn classify(prev: AlertState, new: AlertState, recovered: bool) -> Self {
        if recovered {
            return Transition::Recovered;
        }
        match new {
            AlertState::NoData => return Transition::ToNoData,
            AlertState::Pending => return Transition::ToPending,
            AlertState::Alerting => return Transition::ToAlerting { from: prev },
            _ => {}
        }
        if prev == new {
            return Transition::Unchanged(new);
        }
        match (prev, new) {
            (AlertState::Unknown, _)
            | (AlertState::Pending, _)
            | (AlertState::Ok, AlertState::Ok | AlertState::Pending) => Transition::Calming,
            (_, to) => Transition::Changed { to },
        }
    }
}

/// Whether a notifier with `settings` and send `record` should fire for
/// `transition`.
///
/// `now` is the evaluation time and `episode_started` the moment the rule
/// entered its current state.
pub fn should_notify(
    transition: Transition,
    settings: &NotifierSettings,
    record: &NotificationRecord,
    now: DateTime<Utc>,
    episode_started: DateTime<Utc>,
) -> bool {
    match transition {
        Transition::Recovered => true,
        Transition::ToNoData | Transition::ToPending => false,
        Transition::ToAlerting { from: AlertState::Ok } => true,
        Transition::ToAlerting { .. } => {
            record.should_send_notification(now, episode_started, settings.reminder())
        }
        Transition::Unchanged(state) => match settings.reminder() {
            None => false,
            Some(frequency) => {
                let due = record
                    .updated_at
                    .map_or(true, |at| elapsed(at, now) >= frequency);
                due && !matches!(state, AlertState::Ok | AlertState::Pending)
            }
        },
        Transition::Calming => false,
        Transition::Changed { .. } if record.is_recently_pending(now) => false,
        Transition::Changed { to: AlertState::Ok } if settings.disable_resolve_message => false,
        Transition::Changed { .. } => true,
    }
}
