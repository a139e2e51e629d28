use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Alert state of a monitoring rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    #[default]
    Unknown,
    Ok,
    Pending,
    Alerting,
    NoData,
    /// Administrative state; never produced by evaluation.
    Paused,
}

impl AlertState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertState::Unknown => "unknown",
            AlertState::Ok => "ok",
            AlertState::Pending => "pending",
            AlertState::Alerting => "alerting",
            AlertState::NoData => "no_data",
            AlertState::Paused => "paused",
        }
    }
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(AlertState::Unknown),
            "ok" => Ok(AlertState::Ok),
            "pending" => Ok(AlertState::Pending),
            "alerting" => Ok(AlertState::Alerting),
            "no_data" => Ok(AlertState::NoData),
            "paused" => Ok(AlertState::Paused),
            other => Err(CoreError::UnknownAlertState(other.to_string())),
        }
    }
}

/// What a rule does when its conditions report no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NoDataOption {
    #[default]
    NoData,
    Alerting,
    Ok,
    KeepState,
}

impl NoDataOption {
    /// Alert state this option maps to. `KeepState` has no state of its own and
    /// maps to `Unknown`; callers resolve it against the previous state first.
    pub fn to_alert_state(self) -> AlertState {
        match self {
            NoDataOption::NoData => AlertState::NoData,
            NoDataOption::Alerting => AlertState::Alerting,
            NoDataOption::Ok => AlertState::Ok,
            NoDataOption::KeepState => AlertState::Unknown,
        }
    }
}

impl FromStr for NoDataOption {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no_data" => Ok(NoDataOption::NoData),
            "alerting" => Ok(NoDataOption::Alerting),
            "ok" => Ok(NoDataOption::Ok),
            "keep_state" => Ok(NoDataOption::KeepState),
            other => Err(CoreError::UnknownNoDataOption(other.to_string())),
        }
    }
}

/// What a rule does when evaluation keeps failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorOption {
    #[default]
    Alerting,
    KeepState,
}

impl ExecutionErrorOption {
    pub fn to_alert_state(self) -> AlertState {
        match self {
            ExecutionErrorOption::Alerting => AlertState::Alerting,
            ExecutionErrorOption::KeepState => AlertState::Unknown,
        }
    }
}

impl FromStr for ExecutionErrorOption {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alerting" => Ok(ExecutionErrorOption::Alerting),
            "keep_state" => Ok(ExecutionErrorOption::KeepState),
            other => Err(CoreError::UnknownExecutionErrorOption(other.to_string())),
        }
    }
}

/// One series that matched (or recovered from) a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EvalMatch {
    pub metric: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    /// Set on matches reported for a series that went back to normal.
    #[serde(default)]
    pub is_recovery: bool,
}

impl EvalMatch {
    pub fn new(metric: impl Into<String>, value: Option<f64>) -> Self {
        Self {
            metric: metric.into(),
            value,
            tags: HashMap::new(),
            is_recovery: false,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_state_round_trips_through_str() {
        for state in [
            AlertState::Unknown,
            AlertState::Ok,
            AlertState::Pending,
            AlertState::Alerting,
            AlertState::NoData,
            AlertState::Paused,
        ] {
            assert_eq!(state.as_str().parse::<AlertState>().unwrap(), state);
        }
        assert!("firing".parse::<AlertState>().is_err());
    }

    #[test]
    fn alert_state_serializes_snake_case() {
        let json = serde_json::to_string(&AlertState::NoData).unwrap();
        assert_eq!(json, "\"no_data\"");
    }

    #[test]
    fn no_data_option_maps_to_state() {
        assert_eq!(NoDataOption::NoData.to_alert_state(), AlertState::NoData);
        assert_eq!(NoDataOption::Alerting.to_alert_state(), AlertState::Alerting);
        assert_eq!(NoDataOption::Ok.to_alert_state(), AlertState::Ok);
    }

    #[test]
    fn execution_error_option_parses() {
        assert_eq!(
            "keep_state".parse::<ExecutionErrorOption>().unwrap(),
            ExecutionErrorOption::KeepState
        );
        assert!("ok".parse::<ExecutionErrorOption>().is_err());
    }
}
