use super::{ensure_success, read_snapshot, read_text, VendorDriver};
use crate::error::{CameraError, Result};
use crate::payload::{indexed_items, key_values};
use crate::types::{
    validate_channel, CameraEvent, ConnectionConfig, DeviceInfo, DriverOptions, PtzCommand,
    PtzDirection, Snapshot, StreamProfile, StreamRequest,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::COOKIE;
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const VENDOR: &str = "dahua";

const CLIENT_TYPE: &str = "Web3.0";
const SESSION_COOKIE: &str = "DWebClientSessionID";
const LOG_PAGE_SIZE: usize = 100;
const MAX_LOG_PAGES: usize = 100;
const DEVICE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Session issued by the device after a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DahuaSession {
    pub session_id: String,
    pub realm: String,
    pub random: String,
}

#[derive(Debug)]
enum SessionState {
    Unauthenticated,
    Authenticated(DahuaSession),
}

#[derive(Debug, Deserialize)]
struct LoginChallenge {
    realm: Option<String>,
    random: Option<String>,
    session: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct LoginReply {
    result: Option<bool>,
    session: Option<JsonValue>,
}

/// Devices return the session either as a string or as a bare number.
fn session_string(value: Option<&JsonValue>) -> Option<String> {
    match value? {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn md5_upper(input: &str) -> String {
    format!("{:X}", md5::compute(input.as_bytes()))
}

/// Dahua "Default" login hash:
/// `UPPER(MD5(user:random:UPPER(MD5(user:realm:password))))`.
pub fn login_hash(username: &str, password: &str, realm: &str, random: &str) -> String {
    let inner = md5_upper(&format!("{}:{}:{}", username, realm, password));
    md5_upper(&format!("{}:{}:{}", username, random, inner))
}

pub fn ptz_action(direction: PtzDirection) -> &'static str {
    match direction {
        PtzDirection::Up => "Up",
        PtzDirection::Down => "Down",
        PtzDirection::Left => "Left",
        PtzDirection::Right => "Right",
        PtzDirection::Stop => "Stop",
    }
}

/// Dahua CGI driver. Holds one renewable session; login and renewal are serialised
/// through the session lock so concurrent callers never log in twice.
pub struct DahuaDriver {
    config: ConnectionConfig,
    base_url: String,
    http_client: reqwest::Client,
    state: Mutex<SessionState>,
}

impl DahuaDriver {
    pub fn new(config: ConnectionConfig, options: &DriverOptions) -> Result<Self> {
        config.validate()?;
        let http_client = options.http_client()?;
        let base_url = config.base_url();

        Ok(Self {
            config,
            base_url,
            http_client,
            state: Mutex::new(SessionState::Unauthenticated),
        })
    }

    /// Currently held session, if any.
    pub async fn session(&self) -> Option<DahuaSession> {
        match &*self.state.lock().await {
            SessionState::Authenticated(session) => Some(session.clone()),
            SessionState::Unauthenticated => None,
        }
    }

    /// Run the challenge-response login. Does not touch the held session.
    pub async fn login(&self) -> Result<DahuaSession> {
        let result = self.perform_login().await;
        let outcome = if result.is_ok() { "success" } else { "failure" };
        telemetry::metrics::CAMERA_LOGINS
            .with_label_values(&[VENDOR, outcome])
            .inc();
        result
    }

    async fn perform_login(&self) -> Result<DahuaSession> {
        debug!(ip = %self.config.ip, "requesting dahua login challenge");

        let response = self
            .http_client
            .get(format!("{}/cgi-bin/global.login", self.base_url))
            .query(&[
                ("action", "getChallenge"),
                ("userName", self.config.username.as_str()),
                ("clientType", CLIENT_TYPE),
            ])
            .send()
            .await?;
        let challenge: LoginChallenge = Self::login_payload(response, "challenge").await?;

        let realm = challenge
            .realm
            .filter(|r| !r.is_empty())
            .ok_or_else(|| CameraError::authentication("login challenge missing realm"))?;
        let random = challenge
            .random
            .filter(|r| !r.is_empty())
            .ok_or_else(|| CameraError::authentication("login challenge missing random"))?;

        let mut body = json!({
            "method": "global.login",
            "params": {
                "userName": self.config.username,
                "password": login_hash(&self.config.username, &self.config.password, &realm, &random),
                "clientType": CLIENT_TYPE,
                "authorityType": "Default",
                "passwordType": "Default",
            },
            "id": 2,
        });
        if let Some(session) = session_string(challenge.session.as_ref()) {
            body["session"] = JsonValue::String(session);
        }

        let response = self
            .http_client
            .post(format!("{}/RPC2_Login", self.base_url))
            .json(&body)
            .send()
            .await?;
        let reply: LoginReply = Self::login_payload(response, "login").await?;

        if reply.result == Some(false) {
            return Err(CameraError::authentication("device rejected login credentials"));
        }
        let session_id = session_string(reply.session.as_ref())
            .ok_or_else(|| CameraError::authentication("login reply missing session"))?;

        info!(ip = %self.config.ip, realm = %realm, "dahua login succeeded");

        Ok(DahuaSession {
            session_id,
            realm,
            random,
        })
    }

    async fn login_payload<T: serde::de::DeserializeOwned>(response: Response, step: &str) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(CameraError::authentication(format!(
                "{} step failed with status {}",
                step, status
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CameraError::connection(format!("failed to read {} reply: {}", step, e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| CameraError::authentication(format!("malformed {} reply: {}", step, e)))
    }

    /// Returns the held session id, logging in first if there is none.
    pub async fn ensure_session(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        if let SessionState::Authenticated(session) = &*state {
            return Ok(session.session_id.clone());
        }

        // State is only written once login completes, so a dropped future leaves
        // the driver unauthenticated.
        let session = self.login().await?;
        let session_id = session.session_id.clone();
        *state = SessionState::Authenticated(session);
        Ok(session_id)
    }

    /// Replace a session the device rejected. If another caller already replaced it,
    /// the newer session is reused instead of logging in again.
    async fn renew_session(&self, rejected: &str) -> Result<String> {
        let mut state = self.state.lock().await;
        if let SessionState::Authenticated(session) = &*state {
            if session.session_id != rejected {
                return Ok(session.session_id.clone());
            }
        }

        *state = SessionState::Unauthenticated;
        telemetry::metrics::CAMERA_SESSION_RENEWALS
            .with_label_values(&[VENDOR])
            .inc();

        let session = self.login().await?;
        let session_id = session.session_id.clone();
        *state = SessionState::Authenticated(session);
        Ok(session_id)
    }

    async fn invalidate_session(&self, rejected: &str) {
        let mut state = self.state.lock().await;
        if let SessionState::Authenticated(session) = &*state {
            if session.session_id == rejected {
                *state = SessionState::Unauthenticated;
            }
        }
    }

    async fn send(
        &self,
        method: &Method,
        path: &str,
        params: &[(&str, String)],
        session_id: &str,
    ) -> Result<Response> {
        let response = self
            .http_client
            .request(method.clone(), format!("{}{}", self.base_url, path))
            .query(params)
            .header(COOKIE, format!("{}={}", SESSION_COOKIE, session_id))
            .send()
            .await?;
        Ok(response)
    }

    /// Authenticated CGI call. A 401 triggers one re-login and one retry; a second
    /// 401 fails with [`CameraError::Session`].
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Response> {
        let session_id = self.ensure_session().await?;
        debug!(ip = %self.config.ip, method = %method, path = %path, "sending CGI request");

        let response = self.send(&method, path, params, &session_id).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return ensure_success(response).await;
        }

        warn!(ip = %self.config.ip, path = %path, "dahua session rejected, renewing");
        let session_id = self.renew_session(&session_id).await?;

        let response = self.send(&method, path, params, &session_id).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            self.invalidate_session(&session_id).await;
            return Err(CameraError::session(format!(
                "session rejected after renewal for {}",
                path
            )));
        }

        ensure_success(response).await
    }

    async fn get_text(&self, path: &str, params: &[(&str, String)]) -> Result<String> {
        let response = self.request(Method::GET, path, params).await?;
        read_text(response).await
    }

    async fn set_record_mode(&self, channel: u32, mode: u8) -> Result<()> {
        validate_channel(channel)?;
        // RecordMode is indexed from zero; mode 1 is manual recording, 2 is off.
        let path = format!(
            "/cgi-bin/configManager.cgi?action=setConfig&RecordMode[{}].Mode={}",
            channel - 1,
            mode
        );
        self.request(Method::GET, &path, &[]).await?;
        Ok(())
    }

    /// Page through an open log search until the device returns a short or empty page.
    async fn find_logs(&self, token: &str) -> Result<Vec<CameraEvent>> {
        let mut events = Vec::new();

        for page in 0..MAX_LOG_PAGES {
            let body = self
                .get_text(
                    "/cgi-bin/log.cgi",
                    &[
                        ("action", "doFind".to_string()),
                        ("token", token.to_string()),
                        ("count", LOG_PAGE_SIZE.to_string()),
                    ],
                )
                .await?;

            let fields = key_values(&body);
            let items = indexed_items(&fields, "items");
            let found = fields
                .get("found")
                .and_then(|f| f.parse::<usize>().ok())
                .unwrap_or(items.len());

            debug!(ip = %self.config.ip, page, found, "dahua log page");

            let page_len = items.len();
            events.extend(items.into_iter().map(|item| CameraEvent {
                time: item.get("Time").cloned().unwrap_or_default(),
                kind: item.get("Type").cloned().unwrap_or_else(|| "unknown".to_string()),
                channel: item.get("Channel").and_then(|c| c.parse().ok()),
                description: item
                    .get("Detail.Content")
                    .or_else(|| item.get("Detail"))
                    .cloned(),
            }));

            if found == 0 || page_len < LOG_PAGE_SIZE {
                return Ok(events);
            }
        }

        warn!(
            ip = %self.config.ip,
            returned = events.len(),
            "dahua log search stopped at page limit"
        );
        Ok(events)
    }
}

#[async_trait]
impl VendorDriver for DahuaDriver {
    fn vendor(&self) -> &str {
        VENDOR
    }

    fn stream_url(&self, request: &StreamRequest) -> String {
        let subtype = match request.profile {
            StreamProfile::Main => 0,
            StreamProfile::Sub => 1,
        };
        format!(
            "{}/cam/realmonitor?channel={}&subtype={}",
            self.config.rtsp_base(),
            request.channel,
            subtype
        )
    }

    async fn control_ptz(&self, command: &PtzCommand) -> Result<()> {
        command.validate()?;
        let action = ptz_action(command.direction);

        debug!(
            ip = %self.config.ip,
            channel = command.channel,
            action = action,
            "dahua ptz move"
        );

        self.request(
            Method::GET,
            "/cgi-bin/ptz.cgi",
            &[
                ("action", action.to_string()),
                ("channel", command.channel.to_string()),
                ("speed", command.speed.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn snapshot(&self, channel: u32) -> Result<Snapshot> {
        validate_channel(channel)?;
        let response = self
            .request(
                Method::GET,
                "/cgi-bin/snapshot.cgi",
                &[("channel", channel.to_string())],
            )
            .await?;
        read_snapshot(response).await
    }

    async fn start_recording(&self, channel: u32) -> Result<()> {
        self.set_record_mode(channel, 1).await
    }

    async fn stop_recording(&self, channel: u32) -> Result<()> {
        self.set_record_mode(channel, 2).await
    }

    async fn events(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<CameraEvent>> {
        if end < start {
            return Err(CameraError::invalid_argument("event search end precedes start"));
        }

        let body = self
            .get_text(
                "/cgi-bin/log.cgi",
                &[
                    ("action", "startFind".to_string()),
                    ("condition.StartTime", start.format(DEVICE_TIME_FORMAT).to_string()),
                    ("condition.EndTime", end.format(DEVICE_TIME_FORMAT).to_string()),
                ],
            )
            .await?;
        let token = key_values(&body)
            .remove("token")
            .ok_or_else(|| CameraError::invalid_response("log search returned no token"))?;

        let events = self.find_logs(&token).await;

        if let Err(e) = self
            .request(
                Method::GET,
                "/cgi-bin/log.cgi",
                &[("action", "stopFind".to_string()), ("token", token.clone())],
            )
            .await
        {
            warn!(ip = %self.config.ip, error = %e, "failed to close dahua log search");
        }

        events
    }

    async fn device_info(&self) -> Result<DeviceInfo> {
        let body = self
            .get_text(
                "/cgi-bin/magicBox.cgi",
                &[("action", "getSystemInfo".to_string())],
            )
            .await?;
        let mut attributes = key_values(&body);

        match self
            .get_text(
                "/cgi-bin/magicBox.cgi",
                &[("action", "getSoftwareVersion".to_string())],
            )
            .await
        {
            Ok(body) => attributes.extend(key_values(&body)),
            Err(CameraError::Device { status, .. }) => {
                debug!(ip = %self.config.ip, status, "software version not available");
            }
            Err(e) => return Err(e),
        }

        Ok(DeviceInfo {
            vendor: VENDOR.to_string(),
            device_name: attributes.get("machineName").cloned(),
            model: attributes.get("deviceType").cloned(),
            serial_number: attributes.get("serialNumber").cloned(),
            firmware_version: attributes.get("version").cloned(),
            attributes,
        })
    }
}
