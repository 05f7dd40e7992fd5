//! Connection-parameter lookup.
//!
//! Resolves a room id into the relay host list and the auth token via
//! `GET {base}/xlive/web-room/v1/index/getDanmuInfo?id={room_id}`.

use serde::Deserialize;

use crate::error::{DanmakuError, Result};

/// Default lookup API host.
pub const DEFAULT_API_BASE: &str = "https://api.live.bilibili.com";

/// Lookup endpoint path.
pub const ROOM_INFO_PATH: &str = "/xlive/web-room/v1/index/getDanmuInfo";

/// One relay endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HostInfo {
    /// Host name.
    pub host: String,
    /// Raw TCP port.
    #[serde(default)]
    pub port: u16,
    /// Secure WebSocket port.
    #[serde(default)]
    pub wss_port: u16,
    /// Plain WebSocket port.
    #[serde(default)]
    pub ws_port: u16,
}

/// `data` object of the lookup response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoomInfoData {
    /// Auth token for the `key` field of the auth frame.
    pub token: String,
    /// Relay endpoints; the first one is used.
    #[serde(default)]
    pub host_list: Vec<HostInfo>,
    /// Client-side danmaku delay cap, in milliseconds.
    #[serde(default)]
    pub max_delay: i64,
    /// Suggested lookup refresh rate.
    #[serde(default)]
    pub refresh_rate: i64,
    /// Display refresh factor; unused by the client.
    #[serde(default)]
    pub refresh_row_factor: f64,
    /// Business line id, 0 for live rooms.
    #[serde(default)]
    pub business_id: i64,
    /// Service group, usually `"live"`.
    #[serde(default)]
    pub group: String,
}

/// Lookup response envelope.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoomInfo {
    /// 0 on success.
    pub code: i64,
    /// Status text accompanying `code`.
    #[serde(default)]
    pub message: String,
    /// Response cache hint from the API.
    #[serde(default)]
    pub ttl: i64,
    /// Absent on most error responses.
    pub data: Option<RoomInfoData>,
}

/// What a session needs to connect and authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Transport target, `wss://{host}:{wss_port}/sub`.
    pub url: String,
    /// Auth token.
    pub token: String,
}

impl ConnectionParams {
    /// Build params from an explicit URL and token.
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
        }
    }
}

impl RoomInfo {
    /// Select `host_list[0]` and build the transport target.
    ///
    /// # Errors
    ///
    /// `ConnectionInfoUnavailable` if `code` is non-zero, `data` is missing,
    /// or the host list is empty.
    pub fn connection_params(&self) -> Result<ConnectionParams> {
        if self.code != 0 {
            return Err(DanmakuError::ConnectionInfoUnavailable(format!(
                "code {}: {}",
                self.code, self.message
            )));
        }
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| DanmakuError::ConnectionInfoUnavailable("missing data".into()))?;
        let host = data
            .host_list
            .first()
            .ok_or_else(|| DanmakuError::ConnectionInfoUnavailable("empty host list".into()))?;

        Ok(ConnectionParams {
            url: format!("wss://{}:{}/sub", host.host, host.wss_port),
            token: data.token.clone(),
        })
    }
}

/// HTTP client for the connection-parameter lookup.
#[derive(Debug, Clone)]
pub struct RoomInfoClient {
    http: reqwest::Client,
    base_url: String,
}

impl RoomInfoClient {
    /// Client against [`DEFAULT_API_BASE`].
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_API_BASE)
    }

    /// Client against a custom API host (no trailing slash).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Look up connection parameters for `room_id`.
    ///
    /// # Errors
    ///
    /// `ConnectionInfoUnavailable` on HTTP failure, non-success status, an
    /// unparseable body, or a non-zero `code`.
    pub async fn fetch(&self, room_id: u64) -> Result<RoomInfo> {
        let url = format!("{}{}", self.base_url, ROOM_INFO_PATH);
        tracing::debug!(room_id, %url, "Fetching connection info");

        let response = self
            .http
            .get(&url)
            .query(&[("id", room_id)])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| DanmakuError::ConnectionInfoUnavailable(e.to_string()))?;

        let info: RoomInfo = response
            .json()
            .await
            .map_err(|e| DanmakuError::ConnectionInfoUnavailable(e.to_string()))?;

        if info.code != 0 {
            return Err(DanmakuError::ConnectionInfoUnavailable(format!(
                "code {}: {}",
                info.code, info.message
            )));
        }
        Ok(info)
    }

    /// Look up and resolve straight to [`ConnectionParams`].
    pub async fn connection_params(&self, room_id: u64) -> Result<ConnectionParams> {
        self.fetch(room_id).await?.connection_params()
    }
}

impl Default for RoomInfoClient {
    fn default() -> Self {
        Self::new()
    }
}
