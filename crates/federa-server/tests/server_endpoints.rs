use std::sync::Arc;

use federa_auth::config::{BackendConfig, BackendSettings, FederationPreset};
use federa_server::{AppConfig, AppState, build_app};
use serde_json::{Value, json};
use tokio::task::JoinHandle;

async fn start_server(cfg: AppConfig) -> (String, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    let state = AppState::from_config(&cfg).expect("state");
    let app = build_app(&cfg, &state);
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });
    (format!("http://{addr}"), tx, server)
}

fn turku_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.broker.backends.push(BackendConfig {
        name: "turku_adfs".into(),
        enabled: true,
        email_required: None,
        access: None,
        settings: BackendSettings::Federation {
            preset: Some(FederationPreset::TurkuAdfs),
            mapping: None,
            metadata_url: None,
        },
    });
    cfg
}

#[tokio::test]
async fn health_endpoint() {
    let (base, tx, handle) = start_server(AppConfig::default()).await;

    let res = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    let _ = tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn federated_callback_creates_user() {
    let (base, tx, handle) = start_server(turku_config()).await;
    let client = reqwest::Client::new();

    let assertion = json!({
        "attributes": {
            "http://schemas.microsoft.com/ws/2013/11/alternateloginid": ["jdoe"],
            "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/emailaddress": ["JDoe@Turku.fi"],
        }
    });
    let res = client
        .post(format!("{base}/auth/turku_adfs/complete"))
        .json(&assertion)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let first: Value = res.json().await.unwrap();
    assert_eq!(first["email"], "jdoe@turku.fi");
    assert_eq!(first["backend"], "turku_adfs");

    let second: Value = client
        .post(format!("{base}/auth/turku_adfs/complete"))
        .json(&assertion)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["user_id"], second["user_id"]);

    let _ = tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn unknown_backend_is_not_found() {
    let (base, tx, handle) = start_server(AppConfig::default()).await;

    let res = reqwest::Client::new()
        .post(format!("{base}/auth/nope/complete"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);

    let _ = tx.send(());
    let _ = handle.await;
}

#[test]
fn state_shares_one_pipeline() {
    let state = tokio_test::assert_ok!(AppState::from_config(&turku_config()));
    let cloned = state.clone();
    assert!(Arc::ptr_eq(&state.auth.pipeline, &cloned.auth.pipeline));
}

#[test]
fn invalid_backend_config_fails_state() {
    let mut cfg = turku_config();
    cfg.broker.backends.push(cfg.broker.backends[0].clone());
    assert!(AppState::from_config(&cfg).is_err());
}

#[test]
fn metadata_cache_starts_empty() {
    let state = AppState::from_config(&turku_config()).unwrap();
    assert!(tokio_test::block_on(state.auth.metadata.is_empty()));
}
