//! Integration tests for the Suggestion controller
//!
//! These tests require a Kubernetes cluster (kind) to run.
//!
//! # Test Organization
//!
//! - `crd_operations`: Stories about creating, reading and deleting Suggestion
//!   resources through the Kubernetes API
//!
//! - `reconcile`: Stories about reconciliation passes run against the real API
//!   server, with a stand-in algorithm service
//!
//! # Running These Tests
//!
//! ```bash
//! cargo test --test kind -- --ignored
//! ```

mod crd_operations;
mod helpers;
mod reconcile;
