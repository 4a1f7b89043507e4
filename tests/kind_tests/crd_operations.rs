//! Integration tests for CRD operations
//!
//! These tests tell the story of how users interact with CustomOperator
//! resources through the Kubernetes API before any controller acts on them.

use kube::api::{Api, Patch, PatchParams, PostParams};

use custom_operator::crd::{CustomOperator, CustomOperatorPhase, CustomOperatorStatus};

use super::helpers::{cleanup_instance, ensure_test_cluster, sample_instance, TEST_NAMESPACE};

/// Story: a user applies a manifest with only `replicas` set
///
/// Expected behavior:
/// - The object is accepted and persisted
/// - Unset template fields stay unset and fall back to defaults when read
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_user_creates_custom_operator() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<CustomOperator> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "crd-create";
    cleanup_instance(&client, name).await;

    api.create(&PostParams::default(), &sample_instance(name, 3))
        .await
        .expect("failed to create CustomOperator");

    let stored = api.get(name).await.expect("failed to get CustomOperator");
    assert_eq!(stored.spec.replicas, 3);
    assert_eq!(stored.spec.image, None);
    assert_eq!(stored.spec.image(), "nginx:latest");
    assert!(stored.status.is_none(), "nothing has reconciled it yet");

    cleanup_instance(&client, name).await;
}

/// Story: the API server rejects a negative replica count
///
/// The schema carries `minimum: 0`, so the bad value never reaches the
/// controller.
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_schema_rejects_negative_replicas() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<CustomOperator> = Api::namespaced(client.clone(), TEST_NAMESPACE);

    let result = api
        .create(&PostParams::default(), &sample_instance("crd-negative", -1))
        .await;

    assert!(
        matches!(result, Err(kube::Error::Api(ref e)) if e.code == 422),
        "expected 422 Invalid, got {result:?}"
    );
}

/// Story: status lives in its own subresource
///
/// A status patch does not touch the spec and does not bump the generation.
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_status_is_a_subresource() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<CustomOperator> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "crd-status";
    cleanup_instance(&client, name).await;

    let created = api
        .create(&PostParams::default(), &sample_instance(name, 2))
        .await
        .expect("failed to create CustomOperator");

    let status = CustomOperatorStatus::with_phase(CustomOperatorPhase::Scaling).message("0/2 replicas ready");
    api.patch_status(
        name,
        &PatchParams::default(),
        &Patch::Merge(serde_json::json!({ "status": status })),
    )
    .await
    .expect("failed to patch status");

    let updated = api.get(name).await.expect("failed to get CustomOperator");
    assert_eq!(updated.status, Some(status));
    assert_eq!(updated.spec, created.spec);
    assert_eq!(updated.metadata.generation, created.metadata.generation);

    cleanup_instance(&client, name).await;
}
