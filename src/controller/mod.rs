//! Suggestion controller
//!
//! Reconciliation follows the observe-diff-act loop: read the Suggestion, converge
//! its owned objects, talk to the algorithm service once it is available and record
//! the outcome in status.

mod owned;
mod suggestion;

pub use owned::{converge, teardown, Convergence};
pub use suggestion::{
    error_policy, reconcile, reconcile_suggestion, update_status, update_status_condition,
    Context, ContextBuilder, ControllerSettings, KubeClient, KubeClientImpl, FIELD_MANAGER,
};

#[cfg(test)]
pub use suggestion::MockKubeClient;
