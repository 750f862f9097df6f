use std::time::Duration;

use cosa_thermostat::{
    Coordinator, CoordinatorConfig, CosaClient, Error, HvacMode, PidWindowOverrides, Preset,
    PresetChoice, Temperature,
};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DETAIL: &str = "/api/endpoints/getEndpoint";
const SET_OPTION: &str = "/api/endpoints/setOption";

fn endpoint_json(option: &str) -> Value {
    json!({
        "id": "e1",
        "name": "Living room",
        "temperature": 20.5,
        "mode": "manual",
        "option": option,
        "previousOption": "away",
        "targetTemperature": 22.0,
        "homeTemperature": 22.0,
        "awayTemperature": 16.0,
        "sleepTemperature": 18.0,
        "customTemperature": 20.0,
        "combiSettings": { "heating": true, "pidWindowLow": 0.2, "pidWindowHigh": 0.3 },
        "calibration": 0.0
    })
}

fn ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"ok": 1}))
}

fn detail(body: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"ok": 1, "endpoint": body}))
}

/// Serves the list and one detail response for the initial refresh.
/// Later detail fetches fall through to whatever the test mounts next.
async fn seeded(server: &MockServer, option: &str) -> Coordinator {
    Mock::given(method("POST"))
        .and(path("/api/endpoints/getEndpoints"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": 1,
            "endpoints": [{"id": "e1", "name": "Living room"}]
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(DETAIL))
        .respond_with(detail(endpoint_json(option)))
        .up_to_n_times(1)
        .mount(server)
        .await;

    let client = CosaClient::builder()
        .host(server.uri())
        .auth_token("tok")
        .build()
        .unwrap();
    let mut coordinator = Coordinator::new(client, CoordinatorConfig::default());
    coordinator.refresh().await.unwrap();
    coordinator
}

/// Make every reconcile refresh fail so the optimistic state stays visible.
async fn stale_reconcile(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(DETAIL))
        .respond_with(ResponseTemplate::new(500))
        .mount(server)
        .await;
}

async fn bodies(server: &MockServer, route: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == route)
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

#[tokio::test]
async fn select_preset_reads_back_server_truth() {
    let server = MockServer::start().await;
    let mut coordinator = seeded(&server, "away").await;
    Mock::given(method("POST"))
        .and(path(SET_OPTION))
        .and(body_json(json!({"endpoint": "e1", "option": "home"})))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(DETAIL))
        .respond_with(detail(endpoint_json("home")))
        .mount(&server)
        .await;

    assert!(coordinator.select_preset("e1", PresetChoice::Home).await.unwrap());

    let snapshot = coordinator.snapshot();
    let endpoint = snapshot.endpoint("e1").unwrap();
    assert_eq!(endpoint.option, Preset::Home);
    assert!(endpoint.is_preset_selected(PresetChoice::Home));
    assert!(coordinator.status().last_update_success);
}

#[tokio::test]
async fn select_off_freezes_and_remembers_previous_option() {
    let server = MockServer::start().await;
    let mut coordinator = seeded(&server, "home").await;
    Mock::given(method("POST"))
        .and(path(SET_OPTION))
        .and(body_json(json!({"endpoint": "e1", "option": "frozen"})))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;
    stale_reconcile(&server).await;

    let version = coordinator.snapshot().version;
    assert!(coordinator.select_preset("e1", PresetChoice::Off).await.unwrap());

    let snapshot = coordinator.snapshot();
    assert_eq!(snapshot.version, version + 1);
    let endpoint = snapshot.endpoint("e1").unwrap();
    assert_eq!(endpoint.option, Preset::Frozen);
    assert_eq!(endpoint.previous_option, Some(Preset::Home));
    assert_eq!(endpoint.target_temperature, Some(Temperature::from_celsius(5.0)));
    assert_eq!(endpoint.hvac_mode(), HvacMode::Off);

    // The failed reconcile is reported through status, not the action.
    assert!(!coordinator.status().last_update_success);
}

#[tokio::test]
async fn hvac_off_then_heat_restores_previous_option() {
    let server = MockServer::start().await;
    let mut coordinator = seeded(&server, "home").await;
    Mock::given(method("POST"))
        .and(path(SET_OPTION))
        .respond_with(ok())
        .mount(&server)
        .await;
    stale_reconcile(&server).await;

    coordinator.set_hvac_mode("e1", HvacMode::Off).await.unwrap();
    coordinator.set_hvac_mode("e1", HvacMode::Heat).await.unwrap();

    let sent = bodies(&server, SET_OPTION).await;
    assert_eq!(
        sent,
        vec![
            json!({"endpoint": "e1", "option": "frozen"}),
            json!({"endpoint": "e1", "option": "home"}),
        ]
    );
    let snapshot = coordinator.snapshot();
    assert_eq!(snapshot.endpoint("e1").unwrap().hvac_mode(), HvacMode::Heat);
}

#[tokio::test]
async fn hvac_heat_from_frozen_without_history_selects_home() {
    let server = MockServer::start().await;
    let mut fixture = endpoint_json("frozen");
    fixture["previousOption"] = json!("frozen");
    Mock::given(method("POST"))
        .and(path("/api/endpoints/getEndpoints"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"ok": 1, "endpoints": [{"id": "e1"}]})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(DETAIL))
        .respond_with(detail(fixture))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SET_OPTION))
        .and(body_json(json!({"endpoint": "e1", "option": "home"})))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;

    let client = CosaClient::builder()
        .host(server.uri())
        .auth_token("tok")
        .build()
        .unwrap();
    let mut coordinator = Coordinator::new(client, CoordinatorConfig::default());
    coordinator.refresh().await.unwrap();

    assert!(coordinator.set_hvac_mode("e1", HvacMode::Heat).await.unwrap());
}

#[tokio::test]
async fn target_temperature_updates_active_slot() {
    let server = MockServer::start().await;
    let mut coordinator = seeded(&server, "sleep").await;
    Mock::given(method("POST"))
        .and(path("/api/endpoints/setTargetTemperatures"))
        .and(body_json(json!({
            "endpoint": "e1",
            "targetTemperatures": { "away": 16.0, "custom": 20.0, "home": 22.0, "sleep": 19.5 }
        })))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;
    stale_reconcile(&server).await;

    let written = coordinator
        .set_target_temperature("e1", Temperature::from_celsius(19.46))
        .await
        .unwrap();
    assert!(written);

    let snapshot = coordinator.snapshot();
    let endpoint = snapshot.endpoint("e1").unwrap();
    assert_eq!(endpoint.sleep_temperature, Temperature::from_celsius(19.5));
    assert_eq!(endpoint.target_temperature, Some(Temperature::from_celsius(19.5)));
    assert_eq!(endpoint.home_temperature, Temperature::from_celsius(22.0));
}

#[tokio::test]
async fn target_temperature_is_noop_while_frozen() {
    let server = MockServer::start().await;
    let mut coordinator = seeded(&server, "frozen").await;
    Mock::given(method("POST"))
        .and(path("/api/endpoints/setTargetTemperatures"))
        .respond_with(ok())
        .expect(0)
        .mount(&server)
        .await;

    let version = coordinator.snapshot().version;
    let written = coordinator
        .set_target_temperature("e1", Temperature::from_celsius(21.0))
        .await
        .unwrap();
    assert!(!written);
    assert_eq!(coordinator.snapshot().version, version);
}

#[tokio::test]
async fn invalid_arguments_are_rejected_before_any_write() {
    let server = MockServer::start().await;
    let mut coordinator = seeded(&server, "home").await;
    let before = server.received_requests().await.unwrap().len();

    let err = coordinator
        .set_target_temperature("e1", Temperature::from_celsius(40.0))
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::OutOfRange { field: "temperature", .. }),
        "got {err:?}"
    );

    let err = coordinator
        .select_preset("missing", PresetChoice::Away)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownEndpoint(ref id) if id == "missing"));

    let err = coordinator.set_calibration("e1", 1.5).await.unwrap_err();
    assert!(matches!(err, Error::OutOfRange { field: "calibration", .. }));

    let err = coordinator
        .set_pid_window(
            "e1",
            PidWindowOverrides {
                high: Some(0.05),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::OutOfRange { field: "pidWindowHigh", .. }));

    assert_eq!(server.received_requests().await.unwrap().len(), before);
}

#[tokio::test]
async fn calibration_is_written_and_patched() {
    let server = MockServer::start().await;
    let mut coordinator = seeded(&server, "home").await;
    Mock::given(method("POST"))
        .and(path("/api/endpoints/setDeviceSettings"))
        .and(body_json(json!({"endpoint": "e1", "calibration": -0.5})))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;
    stale_reconcile(&server).await;

    assert!(coordinator.set_calibration("e1", -0.46).await.unwrap());
    assert_eq!(
        coordinator.snapshot().endpoint("e1").unwrap().calibration,
        Some(-0.5)
    );
}

#[tokio::test]
async fn pid_window_keeps_the_other_bound() {
    let server = MockServer::start().await;
    let mut coordinator = seeded(&server, "home").await;
    Mock::given(method("POST"))
        .and(path("/api/endpoints/setCombiSettings"))
        .and(body_json(json!({
            "endpoint": "e1",
            "combiSettings": { "heating": true, "pidWindowLow": 0.1, "pidWindowHigh": 0.3 }
        })))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;
    stale_reconcile(&server).await;

    let overrides = PidWindowOverrides {
        low: Some(0.14),
        ..Default::default()
    };
    assert!(coordinator.set_pid_window("e1", overrides).await.unwrap());

    let snapshot = coordinator.snapshot();
    let endpoint = snapshot.endpoint("e1").unwrap();
    assert_eq!(endpoint.pid_window_low(), Some(0.1));
    assert_eq!(endpoint.pid_window_high(), Some(0.3));
}

#[tokio::test]
async fn failed_write_still_reconciles() {
    let server = MockServer::start().await;
    let mut coordinator = seeded(&server, "home").await;
    Mock::given(method("POST"))
        .and(path(SET_OPTION))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(DETAIL))
        .respond_with(detail(endpoint_json("home")))
        .mount(&server)
        .await;

    let err = coordinator
        .select_preset("e1", PresetChoice::Away)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CannotConnect(_)), "got {err:?}");

    // Server truth replaces the optimistic patch.
    assert_eq!(bodies(&server, DETAIL).await.len(), 2);
    let snapshot = coordinator.snapshot();
    assert_eq!(snapshot.endpoint("e1").unwrap().option, Preset::Home);
}

#[tokio::test]
async fn rejected_session_on_write_halts_coordinator() {
    let server = MockServer::start().await;
    let mut coordinator = seeded(&server, "home").await;
    Mock::given(method("POST"))
        .and(path(SET_OPTION))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": 0, "code": 104})))
        .mount(&server)
        .await;

    let version = coordinator.snapshot().version;
    let err = coordinator
        .select_preset("e1", PresetChoice::Sleep)
        .await
        .unwrap_err();
    assert!(err.is_auth_failure(), "got {err:?}");
    assert!(coordinator.status().auth_required);
    assert_eq!(bodies(&server, DETAIL).await.len(), 1, "no reconcile after auth failure");

    // The rejected patch is rolled back under a fresh version.
    let snapshot = coordinator.snapshot();
    assert_eq!(snapshot.version, version + 2);
    assert_eq!(snapshot.endpoint("e1").unwrap().option, Preset::Home);

    let err = coordinator
        .select_preset("e1", PresetChoice::Home)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ApiAuth));
    assert_eq!(bodies(&server, SET_OPTION).await.len(), 1);
}

#[tokio::test]
async fn handle_routes_actions_to_running_coordinator() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/endpoints/getEndpoints"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"ok": 1, "endpoints": [{"id": "e1"}]})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(DETAIL))
        .respond_with(detail(endpoint_json("home")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SET_OPTION))
        .and(body_json(json!({"endpoint": "e1", "option": "custom"})))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;

    let client = CosaClient::builder()
        .host(server.uri())
        .auth_token("tok")
        .build()
        .unwrap();
    let mut coordinator = Coordinator::new(client, CoordinatorConfig::default());
    let handle = coordinator.handle();
    let mut updates = handle.subscribe();
    let task = tokio::spawn(async move { coordinator.run().await });

    tokio::time::timeout(Duration::from_secs(2), updates.changed())
        .await
        .expect("first poll should publish")
        .unwrap();
    assert_eq!(handle.snapshot().len(), 1);

    assert!(handle.select_preset("e1", PresetChoice::Custom).await.unwrap());
    assert!(handle.status().last_update_success);
    handle.request_refresh().await.unwrap();

    task.abort();
    let _ = task.await;
    let err = handle.set_calibration("e1", 0.0).await.unwrap_err();
    assert!(matches!(err, Error::Stopped), "got {err:?}");
}

#[tokio::test]
async fn handle_fails_fast_after_session_loss() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/endpoints/getEndpoints"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": 0, "code": 104})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SET_OPTION))
        .respond_with(ok())
        .expect(0)
        .mount(&server)
        .await;

    let client = CosaClient::builder()
        .host(server.uri())
        .auth_token("tok")
        .build()
        .unwrap();
    let mut coordinator = Coordinator::new(client, CoordinatorConfig::default());
    let handle = coordinator.handle();

    let ended = coordinator.run().await;
    assert!(ended.is_auth_failure(), "got {ended:?}");

    // The coordinator is still alive, waiting for a new token.
    let answer = tokio::time::timeout(
        Duration::from_secs(2),
        handle.select_preset("e1", PresetChoice::Home),
    )
    .await
    .expect("action must be answered while the session is lost");
    assert!(matches!(answer, Err(Error::ApiAuth)), "got {answer:?}");
}

#[tokio::test]
async fn actions_queued_before_session_loss_are_not_replayed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/endpoints/getEndpoints"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": 0, "code": 104})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SET_OPTION))
        .respond_with(ok())
        .expect(0)
        .mount(&server)
        .await;

    let client = CosaClient::builder()
        .host(server.uri())
        .auth_token("tok")
        .build()
        .unwrap();
    let mut coordinator = Coordinator::new(client, CoordinatorConfig::default());
    let handle = coordinator.handle();

    // Nothing is serving commands yet, so this one sits in the queue.
    let pending = tokio::spawn(async move { handle.select_preset("e1", PresetChoice::Away).await });
    tokio::task::yield_now().await;

    let err = coordinator.refresh().await.unwrap_err();
    assert!(err.is_auth_failure());
    coordinator.reauthenticate("renewed");

    let answer = tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .expect("queued action must be answered")
        .unwrap();
    assert!(matches!(answer, Err(Error::ApiAuth)), "got {answer:?}");
    assert!(!coordinator.status().auth_required);
}
