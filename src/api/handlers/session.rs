//! Session endpoints: who is calling and first-login provisioning

use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse};
use serde::Serialize;
use tracing::{error, info};
use utoipa::ToSchema;

use super::{error_response, open_session, sign_in_required, ErrorBody};
use crate::api::middleware::IdentityExt;
use crate::domain::{Identity, LedgerSnapshot};
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub identity: Identity,
    pub usage: LedgerSnapshot,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub identity: Identity,
    /// True only for the login that created the profile
    pub created: bool,
    pub usage: LedgerSnapshot,
}

/// GET /api/v1/session - Resolved identity and its ledger
#[utoipa::path(
    get,
    path = "/api/v1/session",
    tag = "session",
    responses(
        (status = 200, description = "Current session", body = SessionResponse),
        (status = 401, description = "Invalid session token", body = ErrorBody)
    )
)]
pub async fn get_session(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let session = match open_session(&req, &state).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    let response = SessionResponse {
        identity: session.identity().clone(),
        usage: session.ledger().snapshot(),
    };
    session.close();

    HttpResponse::Ok().json(response)
}

/// POST /api/v1/session/login - Provision the signed-in user's profile
///
/// Idempotent; the free package is assigned only when the profile is created.
#[utoipa::path(
    post,
    path = "/api/v1/session/login",
    tag = "session",
    responses(
        (status = 200, description = "Profile ready", body = LoginResponse),
        (status = 401, description = "Not signed in", body = ErrorBody)
    )
)]
pub async fn login(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let identity = match req.identity_state().resolved() {
        Some(identity) if identity.is_authenticated() => identity.clone(),
        _ => return sign_in_required(),
    };

    let created = match state.provisioner.ensure_profile(&identity.id).await {
        Ok(created) => created,
        Err(e) => {
            error!(user_id = %identity.id, error = %e, "Login provisioning failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string());
        }
    };

    let session = match open_session(&req, &state).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    let usage = session.ledger().snapshot();
    session.close();

    info!(user_id = %identity.id, created, "Login");
    HttpResponse::Ok().json(LoginResponse {
        identity,
        created,
        usage,
    })
}

#[cfg(test)]
mod tests {
    use crate::api::testing::{memory_state, USER_TOKEN};
    use crate::domain::{AnonymousData, IdentityKind};
    use crate::api::middleware::{ANONYMOUS_DATA_COOKIE, ANONYMOUS_ID_COOKIE};
    use actix_web::cookie::Cookie;
    use actix_web::http::{header::AUTHORIZATION, StatusCode};
    use actix_web::test;
    use serde_json::Value;

    #[actix_web::test]
    async fn test_anonymous_session_reads_cookie_record() {
        let (state, _, _) = memory_state();
        let app = test_app!(state);

        let req = test::TestRequest::get()
            .uri("/api/v1/session")
            .cookie(Cookie::new(ANONYMOUS_ID_COOKIE, uuid::Uuid::new_v4().to_string()))
            .cookie(Cookie::new(ANONYMOUS_DATA_COOKIE, crate::api::middleware::cookies::encode_anonymous_data(&AnonymousData { used: 4 })))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["identity"]["kind"], "anonymous");
        assert_eq!(body["usage"]["used"], 4);
        assert_eq!(body["usage"]["limit"], 100);
    }

    #[actix_web::test]
    async fn test_login_provisions_once() {
        let (state, store, _) = memory_state();
        let app = test_app!(state);

        let login = || {
            test::TestRequest::post()
                .uri("/api/v1/session/login")
                .insert_header((AUTHORIZATION, format!("Bearer {}", USER_TOKEN)))
                .to_request()
        };

        let first: Value = test::call_and_read_body_json(&app, login()).await;
        let second: Value = test::call_and_read_body_json(&app, login()).await;

        assert_eq!(first["created"], true);
        assert_eq!(second["created"], false);
        assert_eq!(first["identity"]["kind"], serde_json::to_value(IdentityKind::Authenticated).unwrap());
        assert_eq!(second["usage"]["package_id"], "free");
        assert_eq!(second["usage"]["used"], 0);
        assert_eq!(store.profile_count(), 1);
    }

    #[actix_web::test]
    async fn test_login_requires_bearer() {
        let (state, store, _) = memory_state();
        let app = test_app!(state);

        let req = test::TestRequest::post().uri("/api/v1/session/login").to_request();
        let res = test::call_service(&app, req).await;

        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(store.profile_count(), 0);
    }
}
