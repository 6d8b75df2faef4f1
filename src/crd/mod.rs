//! Custom Resource Definitions used by the Suggestion operator
//!
//! `Suggestion` is owned and reconciled here. `Experiment` and `Trial` are read-only
//! inputs owned by the upstream experiment controller.

mod experiment;
mod suggestion;
mod types;

pub use experiment::{
    Experiment, ExperimentSpec, FeasibleSpace, Metric, ObjectiveSpec, ObjectiveType, Observation,
    ParameterSpec, ParameterType, Trial, TrialCondition, TrialSpec, TrialStatus, EXPERIMENT_LABEL,
};
pub use suggestion::{Suggestion, SuggestionSpec, SuggestionStatus};
pub use types::{
    AlgorithmSetting, AlgorithmSpec, ComparisonType, ConditionStatus, EarlyStoppingRule,
    ParameterAssignment, ResumePolicy, SuggestionCondition, SuggestionConditionType,
    TrialAssignment,
};
