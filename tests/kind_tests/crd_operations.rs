//! Integration tests for CRD operations
//!
//! These tests tell the story of how the experiment controller and users interact
//! with Suggestion resources through the Kubernetes API.

use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;

use suggestion_controller::crd::{AlgorithmSpec, ResumePolicy, Suggestion, SuggestionSpec};

use super::helpers::{ensure_namespace, ensure_test_cluster};

const NAMESPACE: &str = "suggestion-crd-tests";

fn sample_suggestion(name: &str) -> Suggestion {
    Suggestion::new(
        name,
        SuggestionSpec {
            algorithm: AlgorithmSpec::named("random").setting("random_state", "10"),
            early_stopping: Some(
                AlgorithmSpec::named("medianstop").setting("min_trials_required", "3"),
            ),
            requests: 3,
            resume_policy: ResumePolicy::FromVolume,
        },
    )
}

async fn cleanup_suggestion(client: &Client, name: &str) {
    let api: Api<Suggestion> = Api::namespaced(client.clone(), NAMESPACE);
    let _ = api.delete(name, &DeleteParams::default()).await;
}

/// Story: The experiment controller creates a Suggestion for a new Experiment
///
/// Expected behavior:
/// - The Suggestion is stored with its algorithm and early-stopping settings
/// - The resume policy round-trips through the API server unchanged
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_experiment_controller_creates_suggestion() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    ensure_namespace(&client, NAMESPACE)
        .await
        .expect("failed to create namespace");
    let api: Api<Suggestion> = Api::namespaced(client.clone(), NAMESPACE);
    let name = "crd-create";
    cleanup_suggestion(&client, name).await;

    let created = api
        .create(&PostParams::default(), &sample_suggestion(name))
        .await
        .expect("failed to create suggestion");
    assert_eq!(created.metadata.name.as_deref(), Some(name));
    assert_eq!(created.metadata.generation, Some(1));

    let fetched = api.get(name).await.expect("failed to get suggestion");
    assert_eq!(fetched.spec.requests, 3);
    assert_eq!(fetched.spec.resume_policy, ResumePolicy::FromVolume);
    assert_eq!(
        fetched.spec.early_stopping.unwrap().algorithm_settings[0].name,
        "min_trials_required"
    );
    assert!(fetched.status.is_none());

    cleanup_suggestion(&client, name).await;
}

/// Story: Raising requests bumps the generation the controller keys validation on
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_spec_changes_bump_generation() {
    use kube::api::{Patch, PatchParams};

    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    ensure_namespace(&client, NAMESPACE)
        .await
        .expect("failed to create namespace");
    let api: Api<Suggestion> = Api::namespaced(client.clone(), NAMESPACE);
    let name = "crd-generation";
    cleanup_suggestion(&client, name).await;

    api.create(&PostParams::default(), &sample_suggestion(name))
        .await
        .expect("failed to create suggestion");
    let patch = serde_json::json!({ "spec": { "requests": 5 } });
    let patched = api
        .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .expect("failed to patch suggestion");

    assert_eq!(patched.spec.requests, 5);
    assert_eq!(patched.metadata.generation, Some(2));

    cleanup_suggestion(&client, name).await;
}
