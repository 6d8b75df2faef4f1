//! Supporting types shared by the Suggestion, Experiment and Trial CRDs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single `name=value` algorithm tuning knob
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct AlgorithmSetting {
    /// Setting name as understood by the algorithm service
    pub name: String,
    /// Setting value, always transported as a string
    #[serde(default)]
    pub value: String,
}

impl AlgorithmSetting {
    /// Create a setting from a name and value
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Algorithm selection for suggestion or early stopping
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmSpec {
    /// Name of the algorithm, used as the configuration lookup key
    pub algorithm_name: String,
    /// Free-form settings forwarded to the algorithm service
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub algorithm_settings: Vec<AlgorithmSetting>,
}

impl AlgorithmSpec {
    /// Create an algorithm spec without settings
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            algorithm_name: name.into(),
            algorithm_settings: Vec::new(),
        }
    }

    /// Add a setting
    pub fn setting(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.algorithm_settings.push(AlgorithmSetting::new(name, value));
        self
    }
}

/// What happens to the algorithm service once its Suggestion completes
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ResumePolicy {
    /// Keep the algorithm service running after completion
    LongRunning,
    /// Tear the algorithm service down; the run cannot be resumed
    #[default]
    Never,
    /// Tear the algorithm service down but keep its volume so a later run can resume
    FromVolume,
}

impl ResumePolicy {
    /// Whether the workload and endpoint are deleted once the Suggestion completes
    pub fn tears_down_on_completion(&self) -> bool {
        !matches!(self, Self::LongRunning)
    }

    /// Whether the algorithm service gets a persistent volume
    pub fn needs_volume(&self) -> bool {
        matches!(self, Self::FromVolume)
    }
}

impl std::fmt::Display for ResumePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LongRunning => write!(f, "LongRunning"),
            Self::Never => write!(f, "Never"),
            Self::FromVolume => write!(f, "FromVolume"),
        }
    }
}

/// One hyperparameter value in a trial assignment
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ParameterAssignment {
    /// Parameter name
    pub name: String,
    /// Parameter value
    pub value: String,
}

/// Comparison used by an early-stopping rule
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonType {
    /// Stop when the metric equals the value
    #[default]
    Equal,
    /// Stop when the metric is less than the value
    Less,
    /// Stop when the metric is greater than the value
    Greater,
}

/// Rule telling the trial's metrics collector when to stop the trial early
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EarlyStoppingRule {
    /// Metric name
    pub name: String,
    /// Threshold value
    pub value: String,
    /// How the metric is compared against the threshold
    pub comparison: ComparisonType,
    /// Number of reported steps before the rule applies
    #[serde(default)]
    pub start_step: i32,
}

/// A trial the algorithm asked for
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrialAssignment {
    /// Name the Trial will be created with
    pub name: String,
    /// Hyperparameter values
    #[serde(default)]
    pub parameter_assignments: Vec<ParameterAssignment>,
    /// Early-stopping rules, when early stopping is configured
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub early_stopping_rules: Vec<EarlyStoppingRule>,
    /// Labels the algorithm wants on the Trial
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Condition types reported on a Suggestion
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum SuggestionConditionType {
    /// The algorithm workload has been submitted (sticky)
    Created,
    /// The algorithm workload reports Available
    DeploymentReady,
    /// The algorithm service is serving assignments
    Running,
    /// The Suggestion finished successfully (sticky)
    Succeeded,
    /// The Suggestion failed (sticky)
    Failed,
}

impl std::fmt::Display for SuggestionConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "Created",
            Self::DeploymentReady => "DeploymentReady",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// A timestamped status condition
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionCondition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: SuggestionConditionType,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time status, reason or message changed
    pub last_update_time: DateTime<Utc>,

    /// Last time the status value flipped
    pub last_transition_time: DateTime<Utc>,
}

impl SuggestionCondition {
    /// Create a new condition stamped with `now`
    pub fn new(
        type_: SuggestionConditionType,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            type_,
            status,
            reason: reason.into(),
            message: message.into(),
            last_update_time: now,
            last_transition_time: now,
        }
    }

    /// Whether the condition is currently true
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}
