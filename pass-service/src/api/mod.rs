//! # REST API for the Device Pass Service
//!
//! Provides HTTP endpoints for:
//! - Device registration, update, status toggle and enumeration
//! - Granting, revoking and checking access passes
//! - Reading pass history and the ledger event log
//!
//! Mutating routes act as the identity in the `X-Caller-Identity` header.
//!
//! ## Endpoints
//!
//! - `POST /api/v1/devices` - Register a device
//! - `GET  /api/v1/devices?index=i` - Device count, or the i-th device
//! - `GET  /api/v1/devices/:device_id` - Get a device
//! - `PUT  /api/v1/devices/:device_id` - Rename/relocate a device
//! - `POST /api/v1/devices/:device_id/toggle` - Flip the active flag
//! - `GET  /api/v1/devices/:device_id/passes` - Pass history
//! - `GET  /api/v1/owners/:owner/devices` - Devices of an owner
//! - `GET  /api/v1/viewers/:viewer/passes` - Passes granted to a viewer
//! - `POST /api/v1/access/grant` - Grant a pass
//! - `POST /api/v1/access/revoke` - Revoke a viewer
//! - `POST /api/v1/access/check` - Check access
//! - `GET  /api/v1/events?after=n&limit=m` - Ledger events

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequestParts, Path, Query, State,
    },
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};

use shared::{
    constants::{CALLER_HEADER, DEFAULT_EVENT_PAGE},
    error::LedgerError,
    types::*,
};

use crate::AppState;

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let enable_cors = state.config.api.enable_cors;

    let router = Router::new()
        // Health check
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        // Devices
        .route("/api/v1/devices", post(register_device).get(device_count_or_index))
        .route("/api/v1/devices/:device_id", get(get_device).put(update_device))
        .route("/api/v1/devices/:device_id/toggle", post(toggle_device))
        .route("/api/v1/devices/:device_id/passes", get(list_device_passes))
        .route("/api/v1/owners/:owner/devices", get(list_owner_devices))
        // Access passes
        .route("/api/v1/access/grant", post(grant_access))
        .route("/api/v1/access/revoke", post(revoke_access))
        .route("/api/v1/access/check", post(check_access))
        .route("/api/v1/viewers/:viewer/passes", get(list_viewer_passes))
        // Audit trail
        .route("/api/v1/events", get(list_events))
        .with_state(state);

    if enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router.layer(cors)
    } else {
        router
    }
}

// =============================================================================
// CALLER IDENTITY
// =============================================================================

/// Identity acting on a mutating request, taken from `X-Caller-Identity`
#[derive(Debug, Clone)]
pub struct Caller(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(CALLER_HEADER)
            .ok_or_else(|| LedgerError::Validation(format!("missing {} header", CALLER_HEADER)))?
            .to_str()
            .map_err(|_| LedgerError::Validation(format!("{} header is not text", CALLER_HEADER)))?;

        Ok(Caller(Identity::parse(value)?))
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": shared::VERSION,
    }))
}

/// Get service metrics
async fn get_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "devices": state.registry.count(),
        "events": state.ledger.last_sequence(),
        "idMode": state.config.ledger.id_mode.to_string(),
        "persistence": state.snapshots.is_some(),
    }))
}

/// Register a new device owned by the caller
///
/// # Request Body
/// ```json
/// {
///   "did": "did:iot:thermo-17",
///   "name": "Greenhouse sensor",
///   "deviceType": "sensor",
///   "manufacturer": "Acme",
///   "model": "T-100",
///   "serialNumber": "SN-42",
///   "location": "Greenhouse A",
///   "publicKey": "0x04..."
/// }
/// ```
///
/// # Response
/// ```json
/// { "deviceId": "0x..." }
/// ```
async fn register_device(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    payload: Result<Json<DeviceRegistrationRequest>, JsonRejection>,
) -> Result<Json<DeviceRegistrationResponse>, ApiError> {
    let Json(request) = payload?;
    info!(did = %request.did, owner = %caller, "Device registration request received");

    let device_id = state.registry.register(&request, &caller)?;
    state.persist().await?;

    Ok(Json(DeviceRegistrationResponse { device_id }))
}

#[derive(Debug, Deserialize)]
struct DeviceIndexQuery {
    index: Option<u64>,
}

/// Device count, or the device at `?index=i`
async fn device_count_or_index(
    State(state): State<Arc<AppState>>,
    query: Result<Query<DeviceIndexQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;

    match query.index {
        Some(index) => {
            let device = state.registry.get_by_index(index)?;
            Ok(Json(device).into_response())
        }
        None => Ok(Json(DeviceCountResponse {
            count: state.registry.count(),
        })
        .into_response()),
    }
}

/// Get a device
async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<Json<Device>, ApiError> {
    let device_id = decode_device_id(&device_id)?;
    debug!(device_id = %device_id, "Device lookup");

    Ok(Json(state.registry.get(&device_id)?))
}

/// Rename/relocate a device (owner only)
async fn update_device(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    Caller(caller): Caller,
    payload: Result<Json<DeviceUpdateRequest>, JsonRejection>,
) -> Result<Json<OkResponse>, ApiError> {
    let device_id = decode_device_id(&device_id)?;
    let Json(request) = payload?;

    state
        .registry
        .update(&device_id, &request.name, &request.location, &caller)?;
    state.persist().await?;

    Ok(Json(OkResponse::ok()))
}

/// Flip a device's active flag (owner only)
async fn toggle_device(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    Caller(caller): Caller,
) -> Result<Json<DeviceStatusResponse>, ApiError> {
    let device_id = decode_device_id(&device_id)?;

    let is_active = state.registry.toggle_active(&device_id, &caller)?;
    state.persist().await?;

    Ok(Json(DeviceStatusResponse {
        device_id,
        is_active,
    }))
}

/// Devices registered by an owner
async fn list_owner_devices(
    State(state): State<Arc<AppState>>,
    Path(owner): Path<String>,
) -> Result<Json<Vec<Device>>, ApiError> {
    let owner = decode_identity(&owner)?;
    Ok(Json(state.registry.list_by_owner(&owner)))
}

/// Grant a viewer a pass (owner only)
///
/// # Request Body
/// ```json
/// { "deviceId": "0x...", "viewer": "0x...", "duration": 3600 }
/// ```
///
/// # Response
/// ```json
/// { "expiresAt": 1700003600 }
/// ```
async fn grant_access(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    payload: Result<Json<GrantAccessRequest>, JsonRejection>,
) -> Result<Json<GrantAccessResponse>, ApiError> {
    let Json(request) = payload?;
    let viewer = Identity::parse(&request.viewer)?;
    info!(
        device_id = %request.device_id,
        viewer = %viewer,
        duration = request.duration,
        "Access grant request"
    );

    let pass = state
        .passes
        .grant(&request.device_id, &viewer, request.duration, &caller)?;
    state.persist().await?;

    Ok(Json(GrantAccessResponse {
        expires_at: pass.expires_at.timestamp(),
    }))
}

/// Revoke a viewer's access (owner only)
async fn revoke_access(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    payload: Result<Json<AccessTargetRequest>, JsonRejection>,
) -> Result<Json<OkResponse>, ApiError> {
    let Json(request) = payload?;
    let viewer = Identity::parse(&request.viewer)?;
    info!(device_id = %request.device_id, viewer = %viewer, "Access revocation request");

    state.passes.revoke(&request.device_id, &viewer, &caller)?;
    state.persist().await?;

    Ok(Json(OkResponse::ok()))
}

/// Check whether a viewer currently has access
async fn check_access(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AccessTargetRequest>, JsonRejection>,
) -> Result<Json<AccessCheckResponse>, ApiError> {
    let Json(request) = payload?;
    let viewer = Identity::parse(&request.viewer)?;

    let has_access = state.passes.has_access(&request.device_id, &viewer);
    let expires_at = state.passes.expiration_of(&request.device_id, &viewer);
    debug!(device_id = %request.device_id, viewer = %viewer, has_access, "Access check");

    Ok(Json(AccessCheckResponse {
        has_access,
        expires_at,
    }))
}

/// Pass history of a device
async fn list_device_passes(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<Json<Vec<PassView>>, ApiError> {
    let device_id = decode_device_id(&device_id)?;
    Ok(Json(state.passes.list_passes(&device_id)?))
}

/// Passes granted to a viewer
async fn list_viewer_passes(
    State(state): State<Arc<AppState>>,
    Path(viewer): Path<String>,
) -> Result<Json<Vec<PassView>>, ApiError> {
    let viewer = decode_identity(&viewer)?;
    Ok(Json(state.passes.list_passes_for_viewer(&viewer)))
}

#[derive(Debug, Deserialize)]
struct EventQuery {
    after: Option<u64>,
    limit: Option<usize>,
}

/// Ledger events after a sequence number
async fn list_events(
    State(state): State<Arc<AppState>>,
    query: Result<Query<EventQuery>, QueryRejection>,
) -> Result<Json<Vec<LedgerEvent>>, ApiError> {
    let Query(query) = query?;
    let events = state.ledger.events_after(
        query.after.unwrap_or(0),
        query.limit.unwrap_or(DEFAULT_EVENT_PAGE),
    );
    Ok(Json(events))
}

// =============================================================================
// HELPERS
// =============================================================================

fn decode_device_id(raw: &str) -> Result<DeviceId, ApiError> {
    let decoded = urlencoding::decode(raw)
        .map_err(|_| LedgerError::Validation("Invalid device id encoding".into()))?;
    Ok(DeviceId::new(decoded.into_owned()))
}

fn decode_identity(raw: &str) -> Result<Identity, ApiError> {
    let decoded = urlencoding::decode(raw)
        .map_err(|_| LedgerError::Validation("Invalid identity encoding".into()))?;
    Ok(Identity::parse(&decoded)?)
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

/// API error type
#[derive(Debug)]
pub enum ApiError {
    BadRequest { code: &'static str, message: String },
    NotFound { code: &'static str, message: String },
    Internal(String),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let code = err.code();
        match err {
            LedgerError::Validation(_)
            | LedgerError::NameRequired
            | LedgerError::Authorization(_)
            | LedgerError::Collision(_) => ApiError::BadRequest {
                code,
                message: err.to_string(),
            },

            LedgerError::DeviceNotFound(_) | LedgerError::IndexOutOfRange { .. } => {
                ApiError::NotFound {
                    code,
                    message: err.to_string(),
                }
            }

            LedgerError::Storage(_)
            | LedgerError::Serialization(_)
            | LedgerError::Configuration(_)
            | LedgerError::Internal(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        LedgerError::Validation(rejection.body_text()).into()
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        LedgerError::Validation(rejection.body_text()).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest { code, message } => {
                warn!(code, error = %message, "Request rejected");
                (StatusCode::BAD_REQUEST, code, message)
            }
            ApiError::NotFound { code, message } => (StatusCode::NOT_FOUND, code, message),
            ApiError::Internal(msg) => {
                error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            code: code.to_string(),
            error: message,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_conversion() {
        let err: ApiError = LedgerError::Authorization("not owner".into()).into();
        assert!(matches!(err, ApiError::BadRequest { code: "AUTHORIZATION_ERROR", .. }));

        let err: ApiError = LedgerError::DeviceNotFound("0x1".into()).into();
        assert!(matches!(err, ApiError::NotFound { code: "NOT_FOUND", .. }));

        let err: ApiError = LedgerError::IndexOutOfRange { index: 4, count: 1 }.into();
        assert!(matches!(err, ApiError::NotFound { code: "INDEX_OUT_OF_RANGE", .. }));

        let err: ApiError = LedgerError::Storage("disk full at /var/lib".into()).into();
        assert!(matches!(err, ApiError::Internal(_)));
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let response = ApiError::Internal("disk full at /var/lib".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.code, "INTERNAL_ERROR");
        assert_eq!(body.error, "Internal server error");
    }

    #[test]
    fn test_decode_identity() {
        let id = decode_identity("0x00000000000000000000000000000000000000A1").unwrap();
        assert_eq!(id.as_str(), "0x00000000000000000000000000000000000000a1");
        assert!(decode_identity("nobody").is_err());
    }
}
