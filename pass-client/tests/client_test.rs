//! End-to-end tests: the client against a live service on a loopback port

use std::sync::Arc;

use pass_client::{ClientError, PassClient};
use pass_service::{api::create_router, clock::ManualClock, ledger::Ledger, AppState};
use shared::{
    config::{ClientConfig, DeviceIdMode, ServiceConfig},
    types::DeviceRegistrationRequest,
};

const OWNER: &str = "0x00000000000000000000000000000000000000a1";
const VIEWER: &str = "0x00000000000000000000000000000000000000b2";
const START: i64 = 1_700_000_000;

async fn spawn_service() -> (String, Arc<ManualClock>) {
    let mut config = ServiceConfig::default();
    config.ledger.id_mode = DeviceIdMode::Sequential;

    let clock = Arc::new(ManualClock::at_unix(START));
    let state = Arc::new(AppState::new(
        config,
        Arc::new(Ledger::new()),
        clock.clone(),
        None,
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind");
    let addr = listener.local_addr().expect("no local addr");

    tokio::spawn(async move {
        axum::serve(listener, create_router(state))
            .await
            .expect("server failed");
    });

    (format!("http://{}", addr), clock)
}

fn client(url: &str, caller: Option<&str>) -> PassClient {
    PassClient::new(&ClientConfig {
        service_url: url.to_string(),
        caller: caller.map(str::to_string),
    })
}

fn registration(did: &str, name: &str) -> DeviceRegistrationRequest {
    DeviceRegistrationRequest {
        did: did.to_string(),
        name: name.to_string(),
        location: "Greenhouse A".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_owner_and_viewer_flow() {
    let (url, clock) = spawn_service().await;
    let owner = client(&url, Some(OWNER));
    let viewer = owner.acting_as(VIEWER);

    let device_id = owner
        .register(&registration("did:iot:thermo-17", "Greenhouse sensor"))
        .await
        .unwrap();
    assert_eq!(device_id.as_str(), "1");
    assert_eq!(owner.count().await.unwrap(), 1);
    assert_eq!(owner.device_at(0).await.unwrap().device_id, device_id);

    owner.update("1", "Renamed", "Shed").await.unwrap();
    let device = owner.device("1").await.unwrap();
    assert_eq!(device.name, "Renamed");
    assert_eq!(device.location, "Shed");

    let expires_at = owner.grant("1", VIEWER, 3600).await.unwrap();
    assert_eq!(expires_at, START + 3600);

    let check = viewer.check("1", VIEWER).await.unwrap();
    assert!(check.has_access);
    assert_eq!(check.expires_at, START + 3600);

    assert_eq!(viewer.viewer_passes(VIEWER).await.unwrap().len(), 1);

    clock.advance_secs(3600);
    let check = viewer.check("1", VIEWER).await.unwrap();
    assert!(!check.has_access);

    let passes = owner.passes("1").await.unwrap();
    assert_eq!(passes.len(), 1);
    assert!(!passes[0].is_expired);
    clock.advance_secs(1);
    assert!(owner.passes("1").await.unwrap()[0].is_expired);

    let events = owner.events(0, None).await.unwrap();
    let names: Vec<_> = events.iter().map(|e| e.kind.name()).collect();
    assert_eq!(names, vec!["DeviceRegistered", "DeviceUpdated", "AccessGranted"]);
}

#[tokio::test]
async fn test_service_errors_surface_as_codes() {
    let (url, _clock) = spawn_service().await;
    let owner = client(&url, Some(OWNER));
    let viewer = owner.acting_as(VIEWER);

    owner
        .register(&registration("did:iot:cam-1", "Camera"))
        .await
        .unwrap();

    let err = viewer.toggle("1").await.unwrap_err();
    assert_eq!(err.code(), Some("AUTHORIZATION_ERROR"));

    let err = owner.grant("1", OWNER, 60).await.unwrap_err();
    assert_eq!(err.code(), Some("VALIDATION_ERROR"));

    let err = owner.device("missing").await.unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 404, .. }));

    let err = owner.device_at(5).await.unwrap_err();
    assert_eq!(err.code(), Some("INDEX_OUT_OF_RANGE"));
}

#[tokio::test]
async fn test_mutation_without_caller_fails_locally() {
    let (url, _clock) = spawn_service().await;
    let anonymous = client(&url, None);

    let err = anonymous
        .register(&registration("did:iot:x", "X"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::MissingCaller));

    assert_eq!(anonymous.count().await.unwrap(), 0);
    assert_eq!(anonymous.health().await.unwrap()["status"], "healthy");
}
