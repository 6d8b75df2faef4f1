//! Wire messages of the `api.v1.beta1` algorithm service API
//!
//! Hand-maintained prost messages for the four unary calls the operator makes. Tags
//! match the upstream `api.proto`; only the fields the operator reads or writes are
//! declared, which prost tolerates because unknown fields are skipped on decode.

#![allow(missing_docs)]

use std::collections::HashMap;

use prost::Message;

/// Path of `Suggestion.GetSuggestions`
pub const GET_SUGGESTIONS: &str = "/api.v1.beta1.Suggestion/GetSuggestions";
/// Path of `Suggestion.ValidateAlgorithmSettings`
pub const VALIDATE_ALGORITHM_SETTINGS: &str = "/api.v1.beta1.Suggestion/ValidateAlgorithmSettings";
/// Path of `EarlyStopping.GetEarlyStoppingRules`
pub const GET_EARLY_STOPPING_RULES: &str = "/api.v1.beta1.EarlyStopping/GetEarlyStoppingRules";
/// Path of `EarlyStopping.ValidateEarlyStoppingSettings`
pub const VALIDATE_EARLY_STOPPING_SETTINGS: &str =
    "/api.v1.beta1.EarlyStopping/ValidateEarlyStoppingSettings";

#[derive(Clone, PartialEq, Message)]
pub struct Experiment {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub spec: Option<ExperimentSpec>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ExperimentSpec {
    #[prost(message, optional, tag = "1")]
    pub parameter_specs: Option<ParameterSpecs>,
    #[prost(message, optional, tag = "2")]
    pub objective: Option<ObjectiveSpec>,
    #[prost(message, optional, tag = "3")]
    pub algorithm: Option<AlgorithmSpec>,
    #[prost(message, optional, tag = "4")]
    pub early_stopping: Option<EarlyStoppingSpec>,
    #[prost(int32, tag = "5")]
    pub parallel_trial_count: i32,
    #[prost(int32, tag = "6")]
    pub max_trial_count: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ParameterSpecs {
    #[prost(message, repeated, tag = "1")]
    pub parameters: Vec<ParameterSpec>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ParameterSpec {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(int32, tag = "2")]
    pub parameter_type: i32,
    #[prost(message, optional, tag = "3")]
    pub feasible_space: Option<FeasibleSpace>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FeasibleSpace {
    #[prost(string, tag = "1")]
    pub max: String,
    #[prost(string, tag = "2")]
    pub min: String,
    #[prost(string, repeated, tag = "3")]
    pub list: Vec<String>,
    #[prost(string, tag = "4")]
    pub step: String,
    #[prost(int32, tag = "5")]
    pub distribution: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(i32)]
pub enum ParameterType {
    #[default]
    UnknownType = 0,
    Double = 1,
    Int = 2,
    Discrete = 3,
    Categorical = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(i32)]
pub enum Distribution {
    #[default]
    Uniform = 0,
    LogUniform = 1,
    Normal = 2,
    LogNormal = 3,
    Unknown = 4,
}

impl Distribution {
    /// Parse the CRD spelling (`logUniform`, ...)
    pub fn from_crd_name(name: &str) -> Self {
        match name {
            "uniform" => Self::Uniform,
            "logUniform" => Self::LogUniform,
            "normal" => Self::Normal,
            "logNormal" => Self::LogNormal,
            _ => Self::Unknown,
        }
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct ObjectiveSpec {
    #[prost(int32, tag = "1")]
    pub r#type: i32,
    #[prost(double, tag = "2")]
    pub goal: f64,
    #[prost(string, tag = "3")]
    pub objective_metric_name: String,
    #[prost(string, repeated, tag = "4")]
    pub additional_metric_names: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(i32)]
pub enum ObjectiveType {
    #[default]
    Unknown = 0,
    Minimize = 1,
    Maximize = 2,
}

#[derive(Clone, PartialEq, Message)]
pub struct AlgorithmSpec {
    #[prost(string, tag = "1")]
    pub algorithm_name: String,
    #[prost(message, repeated, tag = "2")]
    pub algorithm_settings: Vec<AlgorithmSetting>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AlgorithmSetting {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct EarlyStoppingSpec {
    #[prost(string, tag = "1")]
    pub algorithm_name: String,
    #[prost(message, repeated, tag = "2")]
    pub algorithm_settings: Vec<EarlyStoppingSetting>,
}

#[derive(Clone, PartialEq, Message)]
pub struct EarlyStoppingSetting {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct Trial {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub spec: Option<TrialSpec>,
    #[prost(message, optional, tag = "3")]
    pub status: Option<TrialStatus>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TrialSpec {
    #[prost(string, tag = "1")]
    pub experiment_name: String,
    #[prost(message, optional, tag = "2")]
    pub parameter_assignments: Option<ParameterAssignments>,
    #[prost(message, optional, tag = "3")]
    pub objective: Option<ObjectiveSpec>,
    #[prost(map = "string, string", tag = "4")]
    pub labels: HashMap<String, String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ParameterAssignments {
    #[prost(message, repeated, tag = "1")]
    pub assignments: Vec<ParameterAssignment>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ParameterAssignment {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct TrialStatus {
    #[prost(string, tag = "1")]
    pub start_time: String,
    #[prost(string, tag = "2")]
    pub completion_time: String,
    #[prost(int32, tag = "3")]
    pub condition: i32,
    #[prost(message, optional, tag = "4")]
    pub observation: Option<Observation>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(i32)]
pub enum TrialCondition {
    #[default]
    Created = 0,
    Running = 1,
    Succeeded = 2,
    Killed = 3,
    Failed = 4,
    EarlyStopped = 5,
    Unknown = 6,
}

impl TrialCondition {
    /// Map a Trial condition type as written on the Trial resource
    pub fn from_condition_type(type_: Option<&str>) -> Self {
        match type_ {
            Some("Created") => Self::Created,
            Some("Running") => Self::Running,
            Some("Succeeded") => Self::Succeeded,
            Some("Killed") => Self::Killed,
            Some("Failed") => Self::Failed,
            Some("EarlyStopped") => Self::EarlyStopped,
            _ => Self::Unknown,
        }
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct Observation {
    #[prost(message, repeated, tag = "1")]
    pub metrics: Vec<Metric>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Metric {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetSuggestionsRequest {
    #[prost(message, optional, tag = "1")]
    pub experiment: Option<Experiment>,
    #[prost(message, repeated, tag = "2")]
    pub trials: Vec<Trial>,
    #[prost(int32, tag = "3")]
    pub current_request_number: i32,
    #[prost(int32, tag = "4")]
    pub total_request_number: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetSuggestionsReply {
    #[prost(message, repeated, tag = "1")]
    pub parameter_assignments: Vec<get_suggestions_reply::ParameterAssignments>,
    #[prost(message, optional, tag = "2")]
    pub algorithm: Option<AlgorithmSpec>,
    #[prost(message, repeated, tag = "3")]
    pub early_stopping_rules: Vec<EarlyStoppingRule>,
}

pub mod get_suggestions_reply {
    use std::collections::HashMap;

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ParameterAssignments {
        #[prost(message, repeated, tag = "1")]
        pub assignments: Vec<super::ParameterAssignment>,
        #[prost(string, tag = "2")]
        pub trial_name: String,
        #[prost(map = "string, string", tag = "3")]
        pub labels: HashMap<String, String>,
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct ValidateAlgorithmSettingsRequest {
    #[prost(message, optional, tag = "1")]
    pub experiment: Option<Experiment>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ValidateAlgorithmSettingsReply {}

#[derive(Clone, PartialEq, Message)]
pub struct EarlyStoppingRule {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub value: String,
    #[prost(int32, tag = "3")]
    pub comparison: i32,
    #[prost(int32, tag = "4")]
    pub start_step: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(i32)]
pub enum ComparisonType {
    #[default]
    UnknownComparison = 0,
    Equal = 1,
    Less = 2,
    Greater = 3,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetEarlyStoppingRulesRequest {
    #[prost(message, optional, tag = "1")]
    pub experiment: Option<Experiment>,
    #[prost(message, repeated, tag = "2")]
    pub trials: Vec<Trial>,
    #[prost(string, tag = "3")]
    pub db_manager_address: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetEarlyStoppingRulesReply {
    #[prost(message, repeated, tag = "1")]
    pub early_stopping_rules: Vec<EarlyStoppingRule>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ValidateEarlyStoppingSettingsRequest {
    #[prost(message, optional, tag = "1")]
    pub early_stopping: Option<EarlyStoppingSpec>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ValidateEarlyStoppingSettingsReply {}
