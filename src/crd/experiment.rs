//! Read-only views of the Experiment and Trial CRDs
//!
//! These resources belong to the upstream experiment controller. The operator only
//! reads them to build the request sent to the algorithm service, so the types model
//! the fields that request needs and tolerate everything else.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{AlgorithmSpec, ConditionStatus, ParameterAssignment};

/// Label carrying the owning experiment's name on Trials
pub const EXPERIMENT_LABEL: &str = "katib.kubeflow.org/experiment";

/// Search space and objective of a tuning experiment
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "kubeflow.org",
    version = "v1beta1",
    kind = "Experiment",
    plural = "experiments",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentSpec {
    /// Hyperparameters to search over
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,

    /// What the experiment optimises
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<ObjectiveSpec>,

    /// Suggestion algorithm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<AlgorithmSpec>,

    /// Early-stopping algorithm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub early_stopping: Option<AlgorithmSpec>,

    /// Trials allowed to run at once
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_trial_count: Option<i32>,

    /// Upper bound on trials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_trial_count: Option<i32>,

    /// Failed trials tolerated before the experiment fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_failed_trial_count: Option<i32>,
}

/// Kind of hyperparameter
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    /// Continuous value
    #[default]
    Double,
    /// Integer value
    Int,
    /// One of a fixed list of numbers
    Discrete,
    /// One of a fixed list of strings
    Categorical,
}

/// Range a hyperparameter is drawn from
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FeasibleSpace {
    /// Upper bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<String>,
    /// Lower bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<String>,
    /// Allowed values
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub list: Vec<String>,
    /// Step between values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    /// Sampling distribution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<String>,
}

/// One hyperparameter in the search space
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpec {
    /// Parameter name
    pub name: String,
    /// Parameter kind
    #[serde(default)]
    pub parameter_type: ParameterType,
    /// Allowed values
    #[serde(default)]
    pub feasible_space: FeasibleSpace,
}

/// Optimisation direction
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveType {
    /// Smaller is better
    #[default]
    Minimize,
    /// Larger is better
    Maximize,
}

/// Objective of an experiment or trial
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveSpec {
    /// Optimisation direction
    #[serde(rename = "type", default)]
    pub type_: ObjectiveType,
    /// Value at which the experiment succeeds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<f64>,
    /// Metric being optimised
    #[serde(default)]
    pub objective_metric_name: String,
    /// Other metrics to collect
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_metric_names: Vec<String>,
}

/// One evaluation of a point in the search space
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "kubeflow.org",
    version = "v1beta1",
    kind = "Trial",
    plural = "trials",
    status = "TrialStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TrialSpec {
    /// Objective copied from the experiment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<ObjectiveSpec>,

    /// Hyperparameter values under evaluation
    #[serde(default)]
    pub parameter_assignments: Vec<ParameterAssignment>,
}

/// Observed state of a Trial
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrialStatus {
    /// Trial conditions
    #[serde(default)]
    pub conditions: Vec<TrialCondition>,

    /// Metrics reported so far
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<Observation>,
}

impl TrialStatus {
    /// Type of the most recent true condition, if any
    pub fn current_condition(&self) -> Option<&str> {
        self.conditions
            .iter()
            .rev()
            .find(|c| c.status == ConditionStatus::True)
            .map(|c| c.type_.as_str())
    }
}

/// A Trial condition
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct TrialCondition {
    /// Condition type (Created, Running, Succeeded, ...)
    #[serde(rename = "type")]
    pub type_: String,
    /// Condition status
    #[serde(default)]
    pub status: ConditionStatus,
}

/// Metrics reported by a Trial
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct Observation {
    /// Observed metrics
    #[serde(default)]
    pub metrics: Vec<Metric>,
}

/// One observed metric
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct Metric {
    /// Metric name
    pub name: String,
    /// Smallest value seen
    #[serde(default)]
    pub min: String,
    /// Largest value seen
    #[serde(default)]
    pub max: String,
    /// Most recent value
    #[serde(default)]
    pub latest: String,
}
