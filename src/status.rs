//! Status state machine for Suggestions
//!
//! Conditions are kept as an append-or-replace-by-type list. The rules enforced here:
//!
//! - `Created` becomes true once and never reverts
//! - `Running`, `Succeeded` and `Failed` are mutually exclusive
//! - `Succeeded` and `Failed` are sticky; whichever is set first wins
//! - `lastTransitionTime` moves only when the status value flips
//!
//! All mutators take `now` explicitly so a pass stamps every change with one time and
//! tests can assert on exact timestamps.

use chrono::{DateTime, Utc};

use crate::crd::{
    ConditionStatus, SuggestionCondition, SuggestionConditionType as Type, SuggestionStatus,
};

/// Machine-readable condition reasons
pub mod reasons {
    /// Algorithm workload submitted
    pub const CREATED: &str = "SuggestionCreated";
    /// Algorithm workload reports Available
    pub const DEPLOYMENT_READY: &str = "DeploymentReady";
    /// Algorithm workload exists but is not Available
    pub const DEPLOYMENT_NOT_READY: &str = "DeploymentNotReady";
    /// Algorithm service is serving assignments
    pub const RUNNING: &str = "SuggestionRunning";
    /// Workload and endpoint removed after completion
    pub const COMPLETED: &str = "SuggestionCompleted";
    /// Algorithm service rejected the algorithm settings
    pub const VALIDATION_FAILED: &str = "AlgorithmSettingsValidationFailed";
    /// Early-stopping service rejected the early-stopping settings
    pub const EARLY_STOPPING_VALIDATION_FAILED: &str = "EarlyStoppingSettingsValidationFailed";
    /// Algorithm service returned a terminal error for the sync call
    pub const SYNC_FAILED: &str = "SuggestionSyncFailed";
    /// Too many consecutive transient sync failures
    pub const SYNC_RETRIES_EXHAUSTED: &str = "SyncRetriesExhausted";
    /// A new generation replaced rejected settings
    pub const SETTINGS_RESUBMITTED: &str = "SettingsResubmitted";
}

impl SuggestionStatus {
    /// Get the condition of the given type
    pub fn get_condition(&self, type_: Type) -> Option<&SuggestionCondition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    fn is_true(&self, type_: Type) -> bool {
        self.get_condition(type_).is_some_and(|c| c.is_true())
    }

    /// Whether the algorithm workload has ever been submitted
    pub fn is_created(&self) -> bool {
        self.is_true(Type::Created)
    }

    /// Whether the algorithm workload currently reports Available
    pub fn is_deployment_ready(&self) -> bool {
        self.is_true(Type::DeploymentReady)
    }

    /// Whether the algorithm service is serving assignments
    pub fn is_running(&self) -> bool {
        self.is_true(Type::Running)
    }

    /// Whether the Suggestion succeeded
    pub fn is_succeeded(&self) -> bool {
        self.is_true(Type::Succeeded)
    }

    /// Whether the Suggestion failed
    pub fn is_failed(&self) -> bool {
        self.is_true(Type::Failed)
    }

    /// Whether the Suggestion reached a terminal state
    pub fn is_completed(&self) -> bool {
        self.is_succeeded() || self.is_failed()
    }

    /// Set a condition, returning whether anything changed.
    ///
    /// Refuses to flip `Created` back from true. Callers wanting the phase rules
    /// should use the `mark_*` helpers.
    pub fn set_condition(
        &mut self,
        type_: Type,
        status: ConditionStatus,
        reason: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> bool {
        match self.conditions.iter_mut().find(|c| c.type_ == type_) {
            Some(existing) => {
                if type_ == Type::Created && existing.is_true() && status != ConditionStatus::True
                {
                    return false;
                }
                if existing.status == status
                    && existing.reason == reason
                    && existing.message == message
                {
                    return false;
                }
                if existing.status != status {
                    existing.status = status;
                    existing.last_transition_time = now;
                }
                existing.reason = reason.to_string();
                existing.message = message.to_string();
                existing.last_update_time = now;
                true
            }
            None => {
                self.conditions
                    .push(SuggestionCondition::new(type_, status, reason, message, now));
                true
            }
        }
    }

    /// Record that the algorithm workload was submitted
    pub fn mark_created(&mut self, message: &str, now: DateTime<Utc>) {
        if self.is_created() {
            return;
        }
        self.set_condition(Type::Created, ConditionStatus::True, reasons::CREATED, message, now);
        self.start_time.get_or_insert(now);
    }

    /// Record workload availability
    pub fn mark_deployment_ready(
        &mut self,
        ready: bool,
        reason: &str,
        message: &str,
        now: DateTime<Utc>,
    ) {
        self.set_condition(Type::DeploymentReady, ready.into(), reason, message, now);
    }

    /// Mark the algorithm service as serving; ignored once completed
    pub fn mark_running(&mut self, message: &str, now: DateTime<Utc>) {
        if self.is_completed() {
            return;
        }
        self.set_condition(Type::Running, ConditionStatus::True, reasons::RUNNING, message, now);
    }

    /// Flip an existing Running condition to false
    pub fn mark_not_running(&mut self, reason: &str, message: &str, now: DateTime<Utc>) {
        if self.get_condition(Type::Running).is_some() {
            self.set_condition(Type::Running, ConditionStatus::False, reason, message, now);
        }
    }

    /// Mark the Suggestion succeeded; ignored if it already failed
    pub fn mark_succeeded(&mut self, reason: &str, message: &str, now: DateTime<Utc>) {
        if self.is_failed() {
            return;
        }
        self.mark_not_running(reason, message, now);
        self.set_condition(Type::Succeeded, ConditionStatus::True, reason, message, now);
        self.completion_time.get_or_insert(now);
    }

    /// Mark the Suggestion failed; ignored if it already succeeded
    pub fn mark_failed(&mut self, reason: &str, message: &str, now: DateTime<Utc>) {
        if self.is_succeeded() {
            return;
        }
        self.mark_not_running(reason, message, now);
        self.set_condition(Type::Failed, ConditionStatus::True, reason, message, now);
        self.completion_time.get_or_insert(now);
    }

    /// Withdraw a Failed condition so a corrected spec can be retried
    pub fn clear_failure(&mut self, message: &str, now: DateTime<Utc>) {
        if !self.is_failed() {
            return;
        }
        self.set_condition(
            Type::Failed,
            ConditionStatus::False,
            reasons::SETTINGS_RESUBMITTED,
            message,
            now,
        );
        self.completion_time = None;
    }
}
