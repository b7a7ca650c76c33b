//! API request handlers

use axum::{
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

use crate::credential::guard::mask_key;
use crate::error::NotifyError;
use crate::fallback::DeliveryChannel;
use crate::service::{NotificationService, SendOutcome, SendRequest};

/// Header carrying the client's API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header carrying the admin token
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Shared application state
pub struct AppState {
    pub service: NotificationService,
    pub admin_token: Option<String>,
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub success: bool,
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: &str, msg: &str) -> Self {
        Self {
            success: false,
            error: msg.to_string(),
            code: code.to_string(),
            details: None,
        }
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

pub type ApiRejection = (StatusCode, Json<ApiError>);

/// HTTP status for each error kind
pub fn status_for(err: &NotifyError) -> StatusCode {
    match err {
        NotifyError::InvalidRecipient(_)
        | NotifyError::InvalidMessage(_)
        | NotifyError::MaliciousContent { .. } => StatusCode::BAD_REQUEST,
        NotifyError::InvalidApiKey
        | NotifyError::UnknownApiKey
        | NotifyError::Banned { .. }
        | NotifyError::Inactive
        | NotifyError::DailyQuotaExceeded { .. } => StatusCode::FORBIDDEN,
        NotifyError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        NotifyError::Conflict(_) => StatusCode::CONFLICT,
        NotifyError::RequestTooSoon { .. }
        | NotifyError::CapacityExceeded
        | NotifyError::RegistrationLimitReached { .. } => StatusCode::TOO_MANY_REQUESTS,
        NotifyError::Transport { .. } => StatusCode::BAD_GATEWAY,
        NotifyError::HandlerTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        NotifyError::QueueCleared => StatusCode::SERVICE_UNAVAILABLE,
        NotifyError::Io(_)
        | NotifyError::Config(_)
        | NotifyError::Storage(_)
        | NotifyError::Database(_)
        | NotifyError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<NotifyError> for ApiError {
    fn from(err: NotifyError) -> Self {
        if err.is_infrastructure() {
            error!("Request failed on backend: {}", err);
            // Backend details stay in the logs
            return ApiError::new(err.code(), "Internal server error");
        }

        let api_error = ApiError::new(err.code(), &err.to_string());
        match err {
            NotifyError::Banned {
                reason,
                banned_at,
                error_count,
            } => api_error.with_details(json!({
                "ban_reason": reason,
                "ban_date": banned_at,
                "error_count": error_count,
            })),
            NotifyError::MaliciousContent {
                attempt_count,
                attempts_remaining,
                threshold,
            } => api_error.with_details(json!({
                "warning": format!(
                    "This is malicious attempt {}/{}. After {} attempts, your API key will be banned.",
                    attempt_count, threshold, threshold
                ),
                "error_count": attempt_count,
                "attempts_remaining": attempts_remaining,
                "max_allowed_errors": threshold,
            })),
            NotifyError::DailyQuotaExceeded { used, limit } => api_error.with_details(json!({
                "current_usage": used,
                "max_allowed": limit,
            })),
            NotifyError::RequestTooSoon { retry_after_secs } => {
                api_error.with_details(json!({ "retry_after_seconds": retry_after_secs }))
            }
            NotifyError::RegistrationLimitReached { limit, reset_date } => {
                api_error.with_details(json!({ "limit": limit, "reset_date": reset_date }))
            }
            _ => api_error,
        }
    }
}

/// Convert a service error into a response
pub fn reject(err: NotifyError) -> ApiRejection {
    let status = status_for(&err);
    (status, Json(ApiError::from(err)))
}

/// API key taken from `x-api-key`
pub struct ApiKey(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for ApiKey
where
    S: Send + Sync,
{
    type Rejection = ApiRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(|key| ApiKey(key.to_string()))
            .ok_or((
                StatusCode::UNAUTHORIZED,
                Json(ApiError::new(
                    "unauthorized",
                    "Authorization token is required",
                )),
            ))
    }
}

/// Successful send
#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub outcome: SendOutcome,
}

fn send_summary(outcome: &SendOutcome) -> &'static str {
    match outcome.delivery.delivery_method {
        DeliveryChannel::Primary if outcome.queue.queued_messages > 0 => {
            "SMS sent successfully, more messages queued"
        }
        DeliveryChannel::Primary => "SMS sent successfully",
        DeliveryChannel::EmailFallback => {
            "System capacity has been reached. Message sent via email instead."
        }
        DeliveryChannel::WebPush => "System capacity limit reached. Message sent via web push.",
    }
}

/// Credential registration body
#[derive(Debug, Deserialize)]
pub struct IssueRequest {
    pub phone_number: String,
    pub email: Option<String>,
    pub project_name: String,
}

/// Newly issued credential
#[derive(Debug, Serialize)]
pub struct IssueResponse {
    pub success: bool,
    pub api_key: String,
    pub user_id: String,
    pub project_name: String,
    pub phone_number: String,
    pub daily_limit: u32,
}

/// GET /health - Liveness check
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "notify-rs",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /send/sms - Admit and deliver one message
pub async fn send_sms(
    State(state): State<Arc<AppState>>,
    ApiKey(api_key): ApiKey,
    Json(req): Json<SendRequest>,
) -> Result<Json<SendResponse>, ApiRejection> {
    let outcome = state.service.send(&api_key, req).await.map_err(|e| {
        warn!("Send rejected for {}: {}", mask_key(&api_key), e);
        reject(e)
    })?;

    Ok(Json(SendResponse {
        success: true,
        message: send_summary(&outcome).to_string(),
        outcome,
    }))
}

/// GET /queue/status - Queue depth and quota for the caller's key
pub async fn queue_status(
    State(state): State<Arc<AppState>>,
    ApiKey(api_key): ApiKey,
) -> Result<impl IntoResponse, ApiRejection> {
    let status = state.service.queue_status(&api_key).await.map_err(reject)?;

    Ok(Json(json!({
        "success": true,
        "status": status,
    })))
}

/// POST /send/api - Register a credential
pub async fn issue_key(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IssueRequest>,
) -> Result<impl IntoResponse, ApiRejection> {
    let record = state
        .service
        .issue_credential(&req.phone_number, req.email.as_deref(), &req.project_name)
        .await
        .map_err(reject)?;

    Ok((
        StatusCode::CREATED,
        Json(IssueResponse {
            success: true,
            api_key: record.api_key,
            user_id: record.user_id,
            project_name: record.project_name,
            phone_number: record.phone_number,
            daily_limit: state.service.per_key_daily(),
        }),
    ))
}

/// GET /admin/counters - Counter snapshots and active queues
pub async fn admin_counters(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiRejection> {
    let counters = state.service.counters().await.map_err(reject)?;

    let queues: Vec<_> = state
        .service
        .active_queues()
        .await
        .into_iter()
        .map(|(key, stats)| {
            json!({
                "key": mask_key(&key),
                "queued_count": stats.queued_count,
                "next_available_in_seconds": stats.next_available_in_seconds,
            })
        })
        .collect();

    Ok(Json(json!({
        "success": true,
        "counters": counters,
        "queues": queues,
    })))
}

/// DELETE /admin/queues/:key - Drop a key's waiting deliveries
pub async fn admin_clear_queue(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    let dropped = state.service.clear_queue(&key).await;
    Json(json!({
        "success": true,
        "dropped": dropped,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&NotifyError::CapacityExceeded),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_for(&NotifyError::DailyQuotaExceeded { used: 20, limit: 20 }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&NotifyError::InvalidMessage("empty".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&NotifyError::transport("sms", "502")),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_infrastructure_errors_are_redacted() {
        let api_error = ApiError::from(NotifyError::Storage("disk I/O error at /var/db".to_string()));
        assert_eq!(api_error.code, "storage_error");
        assert_eq!(api_error.error, "Internal server error");
    }

    #[test]
    fn test_malicious_details() {
        let api_error = ApiError::from(NotifyError::MaliciousContent {
            attempt_count: 1,
            attempts_remaining: 2,
            threshold: 3,
        });
        let details = api_error.details.unwrap();
        assert_eq!(details["attempts_remaining"], 2);
        assert_eq!(details["max_allowed_errors"], 3);
    }
}
