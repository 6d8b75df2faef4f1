//! Suggestion Custom Resource Definition
//!
//! A Suggestion represents one running instance of a hyperparameter-suggestion
//! algorithm for an Experiment. The upstream experiment controller creates it and
//! raises `spec.requests`; this operator runs the algorithm service and records the
//! trial assignments it produces in the status.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    AlgorithmSetting, AlgorithmSpec, ResumePolicy, SuggestionCondition, TrialAssignment,
};

/// Specification for a Suggestion
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "kubeflow.org",
    version = "v1beta1",
    kind = "Suggestion",
    plural = "suggestions",
    shortname = "sug",
    status = "SuggestionStatus",
    namespaced,
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".status.conditions[-1:].type"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.conditions[-1:].status"}"#,
    printcolumn = r#"{"name":"Requested","type":"integer","jsonPath":".spec.requests"}"#,
    printcolumn = r#"{"name":"Assigned","type":"integer","jsonPath":".status.suggestionCount"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionSpec {
    /// Suggestion algorithm and its settings
    pub algorithm: AlgorithmSpec,

    /// Early-stopping algorithm and its settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub early_stopping: Option<AlgorithmSpec>,

    /// Total number of trial assignments requested so far
    #[serde(default)]
    pub requests: i32,

    /// What happens to the algorithm service after completion
    #[serde(default)]
    pub resume_policy: ResumePolicy,
}

impl SuggestionSpec {
    /// Validate the suggestion specification
    pub fn validate(&self) -> Result<(), crate::Error> {
        validate_algorithm_name("algorithm", &self.algorithm.algorithm_name)?;
        if let Some(es) = &self.early_stopping {
            validate_algorithm_name("earlyStopping", &es.algorithm_name)?;
        }
        if self.requests < 0 {
            return Err(crate::Error::validation(format!(
                "requests must not be negative, got {}",
                self.requests
            )));
        }
        Ok(())
    }
}

/// Algorithm names become part of object names, so they must be DNS-label safe.
fn validate_algorithm_name(field: &str, name: &str) -> Result<(), crate::Error> {
    if name.is_empty() {
        return Err(crate::Error::validation(format!(
            "{field}.algorithmName must not be empty"
        )));
    }
    let valid = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-');
    if !valid {
        return Err(crate::Error::validation(format!(
            "{field}.algorithmName '{name}' must consist of lowercase alphanumerics and '-'"
        )));
    }
    Ok(())
}

/// Observed state of a Suggestion
///
/// Status is written with a JSON merge patch, so every field is always serialized:
/// an unset field goes out as `null` and clears what the previous pass wrote.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionStatus {
    /// Condition history, one entry per condition type
    #[serde(default)]
    pub conditions: Vec<SuggestionCondition>,

    /// Number of trial assignments produced so far
    #[serde(default)]
    pub suggestion_count: i32,

    /// Trial assignments produced so far
    #[serde(default)]
    pub suggestions: Vec<TrialAssignment>,

    /// Algorithm settings as last reported by the algorithm service
    #[serde(default)]
    pub algorithm_settings: Vec<AlgorithmSetting>,

    /// When the Suggestion was first reconciled
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,

    /// When the Suggestion reached Succeeded or Failed
    #[serde(default)]
    pub completion_time: Option<DateTime<Utc>>,

    /// Generation whose algorithm settings the service accepted
    #[serde(default)]
    pub validated_generation: Option<i64>,

    /// Generation whose algorithm settings the service rejected
    #[serde(default)]
    pub rejected_generation: Option<i64>,

    /// Consecutive transient failures of the assignment sync call
    #[serde(default)]
    pub sync_failures: u32,
}
