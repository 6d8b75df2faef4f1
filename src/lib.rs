//! Suggestion controller - Kubernetes operator for hyperparameter-suggestion services
//!
//! A Suggestion is one running instance of a hyperparameter-suggestion algorithm for
//! an Experiment. The operator runs the algorithm as an owned Deployment behind a
//! Service, asks it for trial assignments over gRPC and records them in the
//! Suggestion's status.
//!
//! # Architecture
//!
//! Each reconciliation pass, in order:
//! - composes the desired owned objects from the spec and the algorithm configuration
//! - converges them against the cluster
//! - waits for the algorithm Deployment to report Available
//! - validates the algorithm settings once per generation
//! - fetches the assignments still missing and writes status
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (Suggestion, and read-only Experiment/Trial)
//! - [`controller`] - Reconciliation logic
//! - [`composer`] - Pure builder of the owned objects
//! - [`owned`] - Typed wrapper over the owned object kinds
//! - [`client`] - gRPC client for the algorithm service
//! - [`config`] - Algorithm configuration loaded from the cluster
//! - [`status`] - Condition state machine of the Suggestion status
//! - [`events`] - Kubernetes Event publishing
//! - [`retry`] - Backoff policy
//! - [`telemetry`] - Logging initialization
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod client;
pub mod composer;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod events;
pub mod owned;
pub mod retry;
pub mod status;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
