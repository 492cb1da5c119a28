//! # Pass Service Client
//!
//! Thin typed wrapper over the REST API. Every mutating call sends the
//! configured caller identity in the `X-Caller-Identity` header; read calls
//! send it when present and never require it.

use reqwest::{Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use shared::{
    config::ClientConfig,
    constants::{API_VERSION, CALLER_HEADER},
    types::{
        AccessCheckResponse, AccessTargetRequest, Device, DeviceCountResponse, DeviceId,
        DeviceRegistrationRequest, DeviceRegistrationResponse, DeviceStatusResponse,
        DeviceUpdateRequest, ErrorResponse, GrantAccessRequest, GrantAccessResponse, LedgerEvent,
        OkResponse, PassView,
    },
};

use crate::error::{ClientError, ClientResult};

/// Client for the device pass service
#[derive(Debug, Clone)]
pub struct PassClient {
    /// Service base URL, without a trailing slash
    service_url: String,

    /// Identity sent on mutating calls
    caller: Option<String>,

    /// HTTP client
    http_client: reqwest::Client,
}

impl PassClient {
    /// Create a client from configuration
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            service_url: config.service_url.trim_end_matches('/').to_string(),
            caller: config.caller.clone(),
            http_client: reqwest::Client::new(),
        }
    }

    /// Identity this client acts as, if any
    pub fn caller(&self) -> Option<&str> {
        self.caller.as_deref()
    }

    /// Return a copy acting as a different identity
    pub fn acting_as(&self, caller: impl Into<String>) -> Self {
        Self {
            caller: Some(caller.into()),
            ..self.clone()
        }
    }

    // -------------------------------------------------------------------------
    // Devices
    // -------------------------------------------------------------------------

    /// Register a device owned by the caller
    pub async fn register(&self, request: &DeviceRegistrationRequest) -> ClientResult<DeviceId> {
        info!(did = %request.did, "Registering device");

        let response: DeviceRegistrationResponse = self
            .send_json(Method::POST, &self.api_url("devices"), Some(request), true)
            .await?;

        info!(device_id = %response.device_id, "Device registered");
        Ok(response.device_id)
    }

    /// Update name and location of a device the caller owns
    pub async fn update(&self, device_id: &str, name: &str, location: &str) -> ClientResult<()> {
        let request = DeviceUpdateRequest {
            name: name.to_string(),
            location: location.to_string(),
        };
        let _: OkResponse = self
            .send_json(
                Method::PUT,
                &self.device_url(device_id, None),
                Some(&request),
                true,
            )
            .await?;
        Ok(())
    }

    /// Flip the active flag of a device the caller owns
    pub async fn toggle(&self, device_id: &str) -> ClientResult<DeviceStatusResponse> {
        self.send_json::<(), _>(
            Method::POST,
            &self.device_url(device_id, Some("toggle")),
            None,
            true,
        )
        .await
    }

    /// Fetch one device
    pub async fn device(&self, device_id: &str) -> ClientResult<Device> {
        self.send_json::<(), _>(Method::GET, &self.device_url(device_id, None), None, false)
            .await
    }

    /// Number of registered devices
    pub async fn count(&self) -> ClientResult<u64> {
        let response: DeviceCountResponse = self
            .send_json::<(), _>(Method::GET, &self.api_url("devices"), None, false)
            .await?;
        Ok(response.count)
    }

    /// Device at a position in registration order
    pub async fn device_at(&self, index: u64) -> ClientResult<Device> {
        let url = format!("{}?index={}", self.api_url("devices"), index);
        self.send_json::<(), _>(Method::GET, &url, None, false).await
    }

    /// Devices registered by an owner
    pub async fn devices_of(&self, owner: &str) -> ClientResult<Vec<Device>> {
        let url = self.api_url(&format!(
            "owners/{}/devices",
            urlencoding::encode(owner)
        ));
        self.send_json::<(), _>(Method::GET, &url, None, false).await
    }

    // -------------------------------------------------------------------------
    // Access passes
    // -------------------------------------------------------------------------

    /// Grant a viewer access for `duration` seconds, returning the expiry
    pub async fn grant(&self, device_id: &str, viewer: &str, duration: u64) -> ClientResult<i64> {
        let request = GrantAccessRequest {
            device_id: DeviceId::from(device_id),
            viewer: viewer.to_string(),
            duration,
        };
        let response: GrantAccessResponse = self
            .send_json(
                Method::POST,
                &self.api_url("access/grant"),
                Some(&request),
                true,
            )
            .await?;

        info!(device_id, viewer, expires_at = response.expires_at, "Access granted");
        Ok(response.expires_at)
    }

    /// Revoke a viewer's access
    pub async fn revoke(&self, device_id: &str, viewer: &str) -> ClientResult<()> {
        let request = self.target(device_id, viewer);
        let _: OkResponse = self
            .send_json(
                Method::POST,
                &self.api_url("access/revoke"),
                Some(&request),
                true,
            )
            .await?;
        Ok(())
    }

    /// Whether a viewer currently has access, with the indexed expiry
    pub async fn check(&self, device_id: &str, viewer: &str) -> ClientResult<AccessCheckResponse> {
        let request = self.target(device_id, viewer);
        self.send_json(
            Method::POST,
            &self.api_url("access/check"),
            Some(&request),
            false,
        )
        .await
    }

    /// Every pass ever granted on a device
    pub async fn passes(&self, device_id: &str) -> ClientResult<Vec<PassView>> {
        self.send_json::<(), _>(
            Method::GET,
            &self.device_url(device_id, Some("passes")),
            None,
            false,
        )
        .await
    }

    /// Every pass ever granted to a viewer
    pub async fn viewer_passes(&self, viewer: &str) -> ClientResult<Vec<PassView>> {
        let url = self.api_url(&format!(
            "viewers/{}/passes",
            urlencoding::encode(viewer)
        ));
        self.send_json::<(), _>(Method::GET, &url, None, false).await
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    /// Events with a sequence number above `after`
    pub async fn events(&self, after: u64, limit: Option<usize>) -> ClientResult<Vec<LedgerEvent>> {
        let mut url = format!("{}?after={}", self.api_url("events"), after);
        if let Some(limit) = limit {
            url.push_str(&format!("&limit={}", limit));
        }
        self.send_json::<(), _>(Method::GET, &url, None, false).await
    }

    /// Service health document
    pub async fn health(&self) -> ClientResult<serde_json::Value> {
        let url = format!("{}/health", self.service_url);
        self.send_json::<(), _>(Method::GET, &url, None, false).await
    }

    // -------------------------------------------------------------------------
    // Plumbing
    // -------------------------------------------------------------------------

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}/{}", self.service_url, API_VERSION, path)
    }

    fn device_url(&self, device_id: &str, suffix: Option<&str>) -> String {
        let base = self.api_url(&format!("devices/{}", urlencoding::encode(device_id)));
        match suffix {
            Some(suffix) => format!("{}/{}", base, suffix),
            None => base,
        }
    }

    fn target(&self, device_id: &str, viewer: &str) -> AccessTargetRequest {
        AccessTargetRequest {
            device_id: DeviceId::from(device_id),
            viewer: viewer.to_string(),
        }
    }

    fn request(&self, method: Method, url: &str, needs_caller: bool) -> ClientResult<RequestBuilder> {
        let builder = self.http_client.request(method, url);
        match (&self.caller, needs_caller) {
            (Some(caller), _) => Ok(builder.header(CALLER_HEADER, caller)),
            (None, true) => Err(ClientError::MissingCaller),
            (None, false) => Ok(builder),
        }
    }

    async fn send_json<B, T>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
        needs_caller: bool,
    ) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(%method, url, "Calling pass service");

        let mut builder = self.request(method, url, needs_caller)?;
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| ClientError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        parse_response(response).await
    }
}

async fn parse_response<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

    if !status.is_success() {
        return Err(api_error(status.as_u16(), &body));
    }

    serde_json::from_str(&body).map_err(|e| ClientError::InvalidResponse(e.to_string()))
}

/// Turn a non-success body into a [`ClientError::Api`]
fn api_error(status: u16, body: &str) -> ClientError {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) => ClientError::Api {
            status,
            code: err.code,
            message: err.error,
        },
        Err(_) => ClientError::Api {
            status,
            code: "UNKNOWN".to_string(),
            message: body.to_string(),
        },
    }
}
