use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use camera_adapter::{
    drivers::dahua::login_hash, CameraAdapter, CameraError, ConnectionConfig, DahuaDriver,
    DriverOptions, PtzCommand, PtzDirection, VendorDriver,
};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::{net::TcpListener, task::JoinHandle};

const REALM: &str = "Login to 4M0123";
const RANDOM: &str = "1984756223";
const USERNAME: &str = "admin";
const PASSWORD: &str = "password123";

#[derive(Default)]
struct DeviceState {
    logins: usize,
    challenges: usize,
    valid_session: Option<String>,
    reject_all: bool,
    slow_login: bool,
    fail_logins: bool,
    /// When set, doFind pages through this many generated log entries.
    log_entries: Option<usize>,
    log_position: usize,
    cgi_calls: Vec<HashMap<String, String>>,
    login_bodies: Vec<Value>,
}

#[derive(Clone, Default)]
struct FakeDahua {
    state: Arc<Mutex<DeviceState>>,
}

async fn spawn_router(router: Router) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .await
            .expect("server failed");
    });
    Ok((addr, handle))
}

async fn challenge(
    State(device): State<FakeDahua>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let slow = {
        let mut state = device.state.lock().unwrap();
        state.challenges += 1;
        state.slow_login
    };
    if slow {
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
    if query.get("action").map(String::as_str) != Some("getChallenge")
        || query.get("userName").map(String::as_str) != Some(USERNAME)
    {
        return (StatusCode::BAD_REQUEST, "Error").into_response();
    }
    Json(json!({ "realm": REALM, "random": RANDOM, "session": 77 })).into_response()
}

async fn rpc2_login(State(device): State<FakeDahua>, Json(body): Json<Value>) -> Response {
    let mut state = device.state.lock().unwrap();
    state.login_bodies.push(body.clone());

    let expected = login_hash(USERNAME, PASSWORD, REALM, RANDOM);
    if state.fail_logins
        || body["params"]["password"] != json!(expected)
        || body["session"] != json!("77")
    {
        return Json(json!({ "result": false, "id": 2 })).into_response();
    }

    state.logins += 1;
    let session = format!("session-{}", state.logins);
    state.valid_session = Some(session.clone());
    Json(json!({ "result": true, "session": session, "id": 2 })).into_response()
}

impl FakeDahua {
    fn check_session(&self, headers: &HeaderMap, query: HashMap<String, String>) -> Option<Response> {
        let mut state = self.state.lock().unwrap();
        state.cgi_calls.push(query);

        let cookie = headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let authorized = match &state.valid_session {
            Some(session) => cookie == format!("DWebClientSessionID={}", session),
            None => false,
        };

        if state.reject_all || !authorized {
            return Some((StatusCode::UNAUTHORIZED, "Error\r\nInvalid Authority!\r\n").into_response());
        }
        None
    }

    fn expire_session(&self) {
        self.state.lock().unwrap().valid_session = None;
    }
}

async fn ptz(
    State(device): State<FakeDahua>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if let Some(denied) = device.check_session(&headers, query) {
        return denied;
    }
    (StatusCode::OK, "OK\r\n").into_response()
}

async fn magic_box(
    State(device): State<FakeDahua>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let action = query.get("action").cloned().unwrap_or_default();
    if let Some(denied) = device.check_session(&headers, query) {
        return denied;
    }
    match action.as_str() {
        "getSystemInfo" => (
            StatusCode::OK,
            "deviceType=IPC-HDW2431T\r\nprocessor=S2L\r\nserialNumber=4M0123PAZ\r\n",
        )
            .into_response(),
        "getSoftwareVersion" => (StatusCode::OK, "version=2.800.0000000.5.R\r\n").into_response(),
        _ => (StatusCode::BAD_REQUEST, "Error\r\nBad Request!\r\n").into_response(),
    }
}

async fn snapshot(
    State(device): State<FakeDahua>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if let Some(denied) = device.check_session(&headers, query) {
        return denied;
    }
    (StatusCode::OK, [(header::CONTENT_TYPE, "image/jpeg")], vec![0xFF, 0xD8]).into_response()
}

async fn config_manager(
    State(device): State<FakeDahua>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if let Some(denied) = device.check_session(&headers, query) {
        return denied;
    }
    (StatusCode::OK, "OK\r\n").into_response()
}

async fn log_cgi(
    State(device): State<FakeDahua>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let action = query.get("action").cloned().unwrap_or_default();
    let count: usize = query.get("count").and_then(|c| c.parse().ok()).unwrap_or(0);
    if let Some(denied) = device.check_session(&headers, query) {
        return denied;
    }

    if action == "doFind" {
        let mut state = device.state.lock().unwrap();
        if let Some(total) = state.log_entries {
            let start = state.log_position;
            let end = (start + count).min(total);
            state.log_position = end;
            let mut body = format!("found={}\r\n", end - start);
            for (n, entry) in (start..end).enumerate() {
                body.push_str(&format!(
                    "items[{n}].Time=2024-03-01 10:00:00\r\nitems[{n}].Type=Entry{entry}\r\n"
                ));
            }
            return (StatusCode::OK, body).into_response();
        }
    }

    match action.as_str() {
        "startFind" => (StatusCode::OK, "token=42\r\n").into_response(),
        "doFind" => (
            StatusCode::OK,
            "found=2\r\nitems[0].Time=2024-03-01 10:00:00\r\nitems[0].Type=VideoMotion\r\nitems[0].Detail.Content=Motion on channel 1\r\nitems[1].Time=2024-03-01 11:00:00\r\nitems[1].Type=Reboot\r\n",
        )
            .into_response(),
        "stopFind" => (StatusCode::OK, "OK\r\n").into_response(),
        _ => (StatusCode::BAD_REQUEST, "Error\r\n").into_response(),
    }
}

async fn spawn_device(device: FakeDahua) -> Result<(SocketAddr, JoinHandle<()>)> {
    let router = Router::new()
        .route("/cgi-bin/global.login", get(challenge))
        .route("/RPC2_Login", post(rpc2_login))
        .route("/cgi-bin/ptz.cgi", get(ptz))
        .route("/cgi-bin/magicBox.cgi", get(magic_box))
        .route("/cgi-bin/snapshot.cgi", get(snapshot))
        .route("/cgi-bin/configManager.cgi", get(config_manager))
        .route("/cgi-bin/log.cgi", get(log_cgi))
        .with_state(device);
    spawn_router(router).await
}

fn driver_for(addr: SocketAddr, password: &str) -> DahuaDriver {
    let config = ConnectionConfig::new(addr.ip().to_string(), addr.port(), USERNAME, password, "dahua").unwrap();
    DahuaDriver::new(config, &DriverOptions::default()).unwrap()
}

#[tokio::test]
async fn first_call_logs_in_and_sends_ptz_action() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();
    let device = FakeDahua::default();
    let (addr, task) = spawn_device(device.clone()).await?;
    let driver = driver_for(addr, PASSWORD);

    assert!(driver.session().await.is_none());
    driver.control_ptz(&PtzCommand::new(PtzDirection::Up, 5, 1)?).await?;

    let session = driver.session().await.unwrap();
    assert_eq!(session.session_id, "session-1");
    assert_eq!(session.realm, REALM);
    assert_eq!(session.random, RANDOM);

    driver.control_ptz(&PtzCommand::new(PtzDirection::Stop, 5, 1)?).await?;

    let state = device.state.lock().unwrap();
    assert_eq!(state.logins, 1);
    assert_eq!(state.cgi_calls.len(), 2);
    let first = &state.cgi_calls[0];
    assert_eq!(first.get("action").map(String::as_str), Some("Up"));
    assert_eq!(first.get("channel").map(String::as_str), Some("1"));
    assert_eq!(first.get("speed").map(String::as_str), Some("5"));
    assert_eq!(state.cgi_calls[1].get("action").map(String::as_str), Some("Stop"));
    assert_eq!(state.login_bodies[0]["method"], json!("global.login"));
    assert_eq!(state.login_bodies[0]["params"]["userName"], json!(USERNAME));
    drop(state);

    task.abort();
    Ok(())
}

#[tokio::test]
async fn expired_session_is_renewed_once_and_retried() -> Result<()> {
    let device = FakeDahua::default();
    let (addr, task) = spawn_device(device.clone()).await?;
    let driver = driver_for(addr, PASSWORD);

    driver.device_info().await?;
    device.expire_session();

    let info = driver.device_info().await?;
    assert_eq!(info.model.as_deref(), Some("IPC-HDW2431T"));
    assert_eq!(driver.session().await.map(|s| s.session_id), Some("session-2".to_string()));

    let state = device.state.lock().unwrap();
    assert_eq!(state.logins, 2);
    // 2 calls before expiry, then a rejected call, its retry and the version lookup.
    assert_eq!(state.cgi_calls.len(), 5);
    drop(state);

    task.abort();
    Ok(())
}

#[tokio::test]
async fn second_rejection_fails_with_session_error() -> Result<()> {
    let device = FakeDahua::default();
    device.state.lock().unwrap().reject_all = true;
    let (addr, task) = spawn_device(device.clone()).await?;
    let adapter = CameraAdapter::from_driver(Box::new(driver_for(addr, PASSWORD)));

    let err = adapter
        .control_ptz(&PtzCommand::new(PtzDirection::Right, 2, 1)?)
        .await
        .unwrap_err();
    assert!(matches!(err, CameraError::Session(_)), "got {err:?}");

    let state = device.state.lock().unwrap();
    assert_eq!(state.logins, 2);
    assert_eq!(state.cgi_calls.len(), 2);
    drop(state);

    task.abort();
    Ok(())
}

#[tokio::test]
async fn failed_renewal_is_an_authentication_error() -> Result<()> {
    let device = FakeDahua::default();
    let (addr, task) = spawn_device(device.clone()).await?;
    let driver = driver_for(addr, PASSWORD);

    driver.control_ptz(&PtzCommand::new(PtzDirection::Left, 3, 1)?).await?;
    {
        let mut state = device.state.lock().unwrap();
        state.valid_session = None;
        state.fail_logins = true;
    }

    let err = driver
        .control_ptz(&PtzCommand::new(PtzDirection::Stop, 3, 1)?)
        .await
        .unwrap_err();
    assert!(matches!(err, CameraError::Authentication(_)), "got {err:?}");
    assert!(driver.session().await.is_none());

    let state = device.state.lock().unwrap();
    assert_eq!(state.logins, 1);
    assert_eq!(state.login_bodies.len(), 2);
    // The first call, then the rejected one; no retry after the failed login.
    assert_eq!(state.cgi_calls.len(), 2);
    drop(state);

    task.abort();
    Ok(())
}

#[tokio::test]
async fn event_search_reads_every_page() -> Result<()> {
    let device = FakeDahua::default();
    device.state.lock().unwrap().log_entries = Some(105);
    let (addr, task) = spawn_device(device.clone()).await?;
    let driver = driver_for(addr, PASSWORD);

    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 3, 1, 23, 59, 59).unwrap();
    let events = driver.events(start, end).await?;

    assert_eq!(events.len(), 105);
    assert_eq!(events[0].kind, "Entry0");
    assert_eq!(events[100].kind, "Entry100");
    assert_eq!(events[104].kind, "Entry104");

    let state = device.state.lock().unwrap();
    let actions: Vec<&str> = state
        .cgi_calls
        .iter()
        .filter_map(|q| q.get("action").map(String::as_str))
        .collect();
    assert_eq!(actions, vec!["startFind", "doFind", "doFind", "stopFind"]);
    drop(state);

    task.abort();
    Ok(())
}

#[tokio::test]
async fn concurrent_callers_share_one_login() -> Result<()> {
    let device = FakeDahua::default();
    let (addr, task) = spawn_device(device.clone()).await?;
    let driver = Arc::new(driver_for(addr, PASSWORD));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let driver = Arc::clone(&driver);
        tasks.push(tokio::spawn(async move { driver.snapshot(1).await }));
    }
    for task in tasks {
        let snapshot = task.await??;
        assert_eq!(snapshot.data, vec![0xFF, 0xD8]);
    }

    assert_eq!(device.state.lock().unwrap().logins, 1);

    task.abort();
    Ok(())
}

#[tokio::test]
async fn concurrent_rejections_share_one_renewal() -> Result<()> {
    let device = FakeDahua::default();
    let (addr, task) = spawn_device(device.clone()).await?;
    let driver = Arc::new(driver_for(addr, PASSWORD));

    driver.ensure_session().await?;
    device.expire_session();

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let driver = Arc::clone(&driver);
        tasks.push(tokio::spawn(async move {
            driver.control_ptz(&PtzCommand::new(PtzDirection::Down, 1, 1)?).await
        }));
    }
    for task in tasks {
        task.await??;
    }

    assert_eq!(device.state.lock().unwrap().logins, 2);

    task.abort();
    Ok(())
}

#[tokio::test]
async fn wrong_password_is_an_authentication_error() -> Result<()> {
    let device = FakeDahua::default();
    let (addr, task) = spawn_device(device.clone()).await?;
    let driver = driver_for(addr, "wrong");

    let err = driver.login().await.unwrap_err();
    assert!(matches!(err, CameraError::Authentication(_)), "got {err:?}");

    let err = driver.snapshot(1).await.unwrap_err();
    assert!(matches!(err, CameraError::Authentication(_)), "got {err:?}");
    assert!(driver.session().await.is_none());
    assert!(device.state.lock().unwrap().cgi_calls.is_empty());

    task.abort();
    Ok(())
}

#[tokio::test]
async fn abandoned_login_does_not_leave_a_session() -> Result<()> {
    let device = FakeDahua::default();
    device.state.lock().unwrap().slow_login = true;
    let (addr, task) = spawn_device(device.clone()).await?;
    let driver = driver_for(addr, PASSWORD);

    let abandoned = tokio::time::timeout(Duration::from_millis(200), driver.ensure_session()).await;
    assert!(abandoned.is_err());
    assert!(driver.session().await.is_none());

    device.state.lock().unwrap().slow_login = false;
    let session_id = driver.ensure_session().await?;
    assert_eq!(session_id, "session-1");

    task.abort();
    Ok(())
}

#[tokio::test]
async fn recording_and_event_search() -> Result<()> {
    let device = FakeDahua::default();
    let (addr, task) = spawn_device(device.clone()).await?;
    let adapter = CameraAdapter::from_driver(Box::new(driver_for(addr, PASSWORD)));

    adapter.start_recording(1).await?;
    adapter.stop_recording(3).await?;

    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 3, 1, 23, 59, 59).unwrap();
    let events = adapter.get_events(start, end).await?;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, "VideoMotion");
    assert_eq!(events[0].time, "2024-03-01 10:00:00");
    assert_eq!(events[0].description.as_deref(), Some("Motion on channel 1"));
    assert_eq!(events[1].kind, "Reboot");

    let state = device.state.lock().unwrap();
    assert_eq!(state.cgi_calls[0].get("RecordMode[0].Mode").map(String::as_str), Some("1"));
    assert_eq!(state.cgi_calls[1].get("RecordMode[2].Mode").map(String::as_str), Some("2"));
    let start_find = &state.cgi_calls[2];
    assert_eq!(start_find.get("action").map(String::as_str), Some("startFind"));
    assert_eq!(
        start_find.get("condition.StartTime").map(String::as_str),
        Some("2024-03-01 00:00:00")
    );
    assert_eq!(state.cgi_calls[4].get("action").map(String::as_str), Some("stopFind"));
    assert_eq!(state.cgi_calls[4].get("token").map(String::as_str), Some("42"));
    drop(state);

    task.abort();
    Ok(())
}

#[tokio::test]
async fn device_info_merges_system_and_software_details() -> Result<()> {
    let device = FakeDahua::default();
    let (addr, task) = spawn_device(device).await?;
    let adapter = CameraAdapter::from_driver(Box::new(driver_for(addr, PASSWORD)));

    let info = adapter.test_connection().await?;
    assert_eq!(info.vendor, "dahua");
    assert_eq!(info.serial_number.as_deref(), Some("4M0123PAZ"));
    assert_eq!(info.firmware_version.as_deref(), Some("2.800.0000000.5.R"));
    assert_eq!(info.attributes.get("processor").map(String::as_str), Some("S2L"));

    task.abort();
    Ok(())
}
