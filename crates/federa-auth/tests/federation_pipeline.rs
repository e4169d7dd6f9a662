//! Federated logins through the full stage list.

mod common;

use common::{Harness, adfs_assertion};
use federa_auth::audit::AuditOutcome;
use federa_auth::backend::{ProviderBackend, turku_attributes};
use federa_auth::error::PipelineError;
use federa_auth::storage::IdentityStorage;
use serde_json::json;

#[tokio::test]
async fn test_student_portal_admits_students() {
    let harness = Harness::start().await;

    let user = harness
        .callback(
            "opas_student_adfs",
            adfs_assertion("s123", Some("s123@edu.turku.fi"), Some("student")),
        )
        .await
        .unwrap();

    assert_eq!(user.attributes["school_role"], "student");
    assert_eq!(user.first_name, "Eero");
    assert!(user.has_identity("opas_student_adfs", "s123"));
    assert_eq!(harness.audit.count(AuditOutcome::Success).await, 1);
}

#[tokio::test]
async fn test_student_portal_denies_teachers() {
    let harness = Harness::start().await;

    let err = harness
        .callback(
            "opas_student_adfs",
            adfs_assertion("t456", Some("t456@edu.turku.fi"), Some("teacher")),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::NotAllowed { ref backend } if backend == "opas_student_adfs"));
    assert_eq!(err.status_code(), 403);
    assert_eq!(harness.storage.user_count().await, 0);
    assert_eq!(harness.storage.identity_count().await, 0);

    let entries = harness.audit.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].identifier, "t456");
    assert_eq!(entries[0].reason.as_deref(), Some("not_allowed"));
}

#[tokio::test]
async fn test_student_portal_denies_missing_role() {
    let harness = Harness::start().await;

    let err = harness
        .callback("opas_student_adfs", adfs_assertion("x789", None, None))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::NotAllowed { .. }));
    assert_eq!(harness.storage.user_count().await, 0);
}

#[tokio::test]
async fn test_unrestricted_portal_admits_teachers() {
    let harness = Harness::start().await;

    let user = harness
        .callback(
            "opas_adfs",
            adfs_assertion("t456", Some("t456@edu.turku.fi"), Some("teacher")),
        )
        .await
        .unwrap();

    assert_eq!(user.attributes["school_role"], "teacher");
}

#[tokio::test]
async fn test_normalization_is_pure() {
    let harness = Harness::start().await;
    let backend = harness.pipeline.registry().get("opas_adfs").unwrap();
    let response = adfs_assertion("s123", Some("S123@Edu.Turku.fi"), Some("student"));
    let before = response.clone();

    let first = backend.details(&response).unwrap();
    let second = backend.details(&response).unwrap();

    assert_eq!(first, second);
    assert_eq!(response, before);
    assert_eq!(first.email(), Some("s123@edu.turku.fi"));
    assert_eq!(backend.provider_uid(&response).unwrap(), "s123");
    assert_eq!(harness.storage.user_count().await, 0);
}

#[tokio::test]
async fn test_missing_uid_aborts() {
    let harness = Harness::start().await;
    let response = json!({
        "attributes": {
            (turku_attributes::EMAIL): ["a@b.fi"],
        }
    });

    let err = harness.callback("turku_adfs", response).await.unwrap_err();

    assert!(err.is_missing_identifier());
    assert_eq!(err.code(), "missing_identifier");
    assert_eq!(harness.storage.user_count().await, 0);

    let entries = harness.audit.entries().await;
    assert_eq!(entries[0].identifier, "");
    assert_eq!(entries[0].outcome, AuditOutcome::Failure);
}

#[tokio::test]
async fn test_unknown_and_disabled_backends() {
    let harness = Harness::start().await;

    let err = harness.callback("nope", json!({})).await.unwrap_err();
    assert!(matches!(err, PipelineError::UnknownBackend(ref name) if name == "nope"));

    let err = harness.callback("retired", json!({ "sub": "1" })).await.unwrap_err();
    assert!(matches!(err, PipelineError::BackendDisabled(ref name) if name == "retired"));

    let entries = harness.audit.entries().await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].reason.as_deref(), Some("unknown_backend"));
    assert_eq!(entries[1].reason.as_deref(), Some("backend_disabled"));
    assert_eq!(harness.storage.user_count().await, 0);
}

#[tokio::test]
async fn test_provider_response_rejected_on_credential_backend() {
    let harness = Harness::start().await;

    let err = harness
        .callback("koha", json!({ "borrowernumber": 42 }))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::UnsupportedInput { ref backend, .. } if backend == "koha"));
    assert_eq!(harness.storage.user_count().await, 0);
    assert_eq!(harness.attempts("koha", "42").await, 0);
}

#[tokio::test]
async fn test_returning_identity_refreshes_details() {
    let harness = Harness::start().await;

    let first = harness
        .callback("turku_adfs", adfs_assertion("jdoe", Some("jdoe@turku.fi"), None))
        .await
        .unwrap();

    let mut response = adfs_assertion("jdoe", None, None);
    response["attributes"][turku_attributes::GIVEN_NAME] = json!(["Jussi"]);
    let second = harness.callback("turku_adfs", response).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.first_name, "Jussi");
    // An absent email never clears the stored one.
    assert_eq!(second.email.as_deref(), Some("jdoe@turku.fi"));
    assert_eq!(harness.storage.user_count().await, 1);

    let stored = harness.storage.find_by_id(first.id).await.unwrap().unwrap();
    assert_eq!(stored.first_name, "Jussi");
}

#[tokio::test]
async fn test_returning_identity_with_another_users_email() {
    let harness = Harness::start().await;

    harness
        .callback("turku_adfs", adfs_assertion("other", Some("taken@turku.fi"), None))
        .await
        .unwrap();
    harness
        .callback("turku_adfs", adfs_assertion("jdoe", Some("jdoe@turku.fi"), None))
        .await
        .unwrap();

    let err = harness
        .callback("turku_adfs", adfs_assertion("jdoe", Some("taken@turku.fi"), None))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::DuplicateEmail { .. }));
    let stored = harness
        .storage
        .find_by_identity("turku_adfs", "jdoe")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.email.as_deref(), Some("jdoe@turku.fi"));
}

#[tokio::test]
async fn test_groups_are_replaced() {
    let harness = Harness::start().await;

    let mut response = adfs_assertion("t456", None, Some("teacher"));
    response["attributes"][turku_attributes::GROUPS] = json!(["staff", "school-a"]);
    let user = harness.callback("opas_adfs", response).await.unwrap();
    assert_eq!(user.groups, vec!["staff", "school-a"]);

    let mut response = adfs_assertion("t456", None, Some("teacher"));
    response["attributes"][turku_attributes::GROUPS] = json!(["staff"]);
    let user = harness.callback("opas_adfs", response).await.unwrap();
    assert_eq!(user.groups, vec!["staff"]);

    // No group claim leaves the stored groups alone.
    let user = harness
        .callback("opas_adfs", adfs_assertion("t456", None, Some("teacher")))
        .await
        .unwrap();
    assert_eq!(user.groups, vec!["staff"]);
}

#[tokio::test]
async fn test_same_person_on_two_backends_links_by_email() {
    let harness = Harness::start().await;

    let adfs = harness
        .callback("turku_adfs", adfs_assertion("jdoe", Some("jdoe@turku.fi"), None))
        .await
        .unwrap();
    let google = harness
        .callback(
            "google",
            json!({ "sub": "g-1", "email": "JDOE@turku.fi", "name": "J Doe" }),
        )
        .await
        .unwrap();

    assert_eq!(adfs.id, google.id);
    assert_eq!(google.identities.len(), 2);
    assert_eq!(google.last_login_backend.as_deref(), Some("google"));
}
