//! Beacon Registry REST API Handlers

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;

use beacon::{
    ClusterRegistrar, DiscoverError, DiscoverRequest, DiscoveryService, RegisterClusterRequest,
    RegisterError, RegisterOutcome,
};
use beacon::types::DiscoverResponse;

pub struct AppState {
    pub discovery: DiscoveryService,
    pub registrar: ClusterRegistrar,
}

// ==================== Error Handling ====================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// HTTP-mapped operation failure. The status/token pairing is the public
/// contract; internal components only signal the kind, this boundary does
/// the translation.
pub struct ApiError(pub StatusCode, pub Json<ErrorResponse>);

impl ApiError {
    fn new(status: StatusCode, token: &str) -> Self {
        ApiError(
            status,
            Json(ErrorResponse {
                error: token.to_string(),
            }),
        )
    }
}

impl From<DiscoverError> for ApiError {
    fn from(e: DiscoverError) -> Self {
        let status = match &e {
            DiscoverError::InvalidGuidFormat
            | DiscoverError::InvalidBase64
            | DiscoverError::InvalidNonceSize
            | DiscoverError::InvalidPayload => StatusCode::BAD_REQUEST,
            DiscoverError::SignatureVerificationFailed => StatusCode::UNAUTHORIZED,
            DiscoverError::ReplayAttackDetected => StatusCode::FORBIDDEN,
            DiscoverError::ClusterNotFound => StatusCode::NOT_FOUND,
            DiscoverError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            DiscoverError::Storage(detail) => {
                tracing::error!("discover failed on storage: {}", detail);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        ApiError::new(status, e.token())
    }
}

impl From<RegisterError> for ApiError {
    fn from(e: RegisterError) -> Self {
        let status = match &e {
            RegisterError::InvalidGuidFormat | RegisterError::InvalidPublicKey => {
                StatusCode::BAD_REQUEST
            }
            RegisterError::PublicKeyMismatch => StatusCode::CONFLICT,
            RegisterError::Storage(detail) => {
                tracing::error!("cluster registration failed on storage: {}", detail);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        ApiError::new(status, e.token())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

// ==================== Health Check ====================

pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ==================== Cluster Handlers ====================

/// Bind a signing key to a cluster id (first writer wins, idempotent on
/// byte-equal re-registration).
pub async fn register_cluster(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterClusterRequest>,
) -> Result<StatusCode, ApiError> {
    match state
        .registrar
        .register(&request.cluster_id, &request.public_key)
        .await?
    {
        RegisterOutcome::Created => Ok(StatusCode::CREATED),
        RegisterOutcome::AlreadyExists => Ok(StatusCode::OK),
    }
}

// ==================== Discovery Handlers ====================

/// Authenticate a discovery call, persist its encrypted blob, and return the
/// recent peer blobs of the caller's version group.
pub async fn discover(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DiscoverRequest>,
) -> Result<Json<DiscoverResponse>, ApiError> {
    let nodes = state.discovery.discover(&request).await?;
    Ok(Json(DiscoverResponse { nodes }))
}
