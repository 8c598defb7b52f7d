//! HTTP request handlers

pub mod health;
pub mod jobs;
pub mod packages;
pub mod removals;
pub mod session;
pub mod usage;

use actix_web::{http::StatusCode, HttpRequest, HttpResponse};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::api::middleware::{read_anonymous_data, IdentityExt};
use crate::session::{Session, SessionError};
use crate::AppState;

/// Error body shared by every endpoint
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Machine-readable code, e.g. `submission_failed`
    pub error: String,
    pub message: String,
}

pub fn error_response(status: StatusCode, error: &str, message: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(ErrorBody {
        error: error.to_string(),
        message: message.into(),
    })
}

pub fn sign_in_required() -> HttpResponse {
    error_response(StatusCode::UNAUTHORIZED, "sign_in_required", "Sign in to use this endpoint")
}

/// Open the request's session. Authenticated callers get their profile
/// provisioned first so the ledger never observes a missing profile.
pub async fn open_session(req: &HttpRequest, state: &AppState) -> Result<Session, HttpResponse> {
    let identity_state = req.identity_state();

    if let Some(identity) = identity_state.resolved().filter(|i| i.is_authenticated()) {
        if let Err(e) = state.provisioner.ensure_profile(&identity.id).await {
            error!(user_id = %identity.id, error = %e, "Failed to provision profile");
            return Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "store_error",
                "Failed to load profile",
            ));
        }
    }

    Session::open(
        &identity_state,
        read_anonymous_data(req),
        state.settings.quota.free_limit,
        state.profiles.as_ref(),
    )
    .await
    .map_err(|e| match e {
        SessionError::Unresolved => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "identity_unresolved",
            "Identity is not resolved yet",
        ),
        SessionError::Store(e) => {
            error!(error = %e, "Failed to open session");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "Failed to load usage")
        }
    })
}
