//! Background removal endpoint

use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use url::Url;
use utoipa::ToSchema;

use super::{error_response, open_session, ErrorBody};
use crate::api::middleware::anonymous_data_cookie;
use crate::domain::{AdmissionPrompt, Job, LedgerSnapshot};
use crate::session::{PollError, RemovalError, RemovalOutcome};
use crate::AppState;

/// Request body for a removal
#[derive(Debug, Deserialize, ToSchema)]
pub struct RemovalRequest {
    /// URL of the already uploaded image
    pub image: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RemovalResponse {
    pub job: Job,
    pub usage: LedgerSnapshot,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JobFailedResponse {
    pub error: String,
    pub message: String,
    pub job: Job,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdmissionDeniedResponse {
    pub error: String,
    /// `sign_in` for anonymous visitors, `purchase` for signed-in users
    pub prompt: AdmissionPrompt,
    pub usage: LedgerSnapshot,
}

fn validate_image(image: &str) -> Result<Url, String> {
    let url = Url::parse(image.trim()).map_err(|e| format!("Invalid image URL: {}", e))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("Unsupported image URL scheme: {}", other)),
    }
}

fn removal_error_response(err: RemovalError) -> HttpResponse {
    match err {
        RemovalError::AdmissionDenied { prompt, usage } => {
            HttpResponse::PaymentRequired().json(AdmissionDeniedResponse {
                error: "admission_denied".to_string(),
                prompt,
                usage,
            })
        }
        RemovalError::Submission(e) => error_response(StatusCode::BAD_GATEWAY, "submission_failed", e.message),
        RemovalError::Poll(e) => {
            let status = match &e {
                PollError::Rejected { .. } => StatusCode::BAD_GATEWAY,
                PollError::Unavailable { .. } | PollError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
                PollError::Exhausted { .. } => StatusCode::GATEWAY_TIMEOUT,
            };
            error_response(status, "poll_failed", e.to_string())
        }
        RemovalError::Store(e) => {
            error!(error = %e, "Usage store failed during removal");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "Usage store unavailable")
        }
    }
}

/// POST /api/v1/removals - Remove the background of an image
///
/// Checks the caller's credits, submits the job and waits for it to finish.
/// Anonymous callers receive their updated usage record as a cookie.
#[utoipa::path(
    post,
    path = "/api/v1/removals",
    tag = "removals",
    request_body = RemovalRequest,
    responses(
        (status = 200, description = "Job succeeded", body = RemovalResponse),
        (status = 400, description = "Invalid image URL", body = ErrorBody),
        (status = 402, description = "No credits left", body = AdmissionDeniedResponse),
        (status = 422, description = "Job failed", body = JobFailedResponse),
        (status = 502, description = "Processing service refused the job", body = ErrorBody),
        (status = 503, description = "Processing service unavailable", body = ErrorBody),
        (status = 504, description = "Job did not finish in time", body = ErrorBody)
    )
)]
pub async fn create_removal(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<RemovalRequest>,
) -> HttpResponse {
    let image = match validate_image(&body.image) {
        Ok(url) => url,
        Err(message) => {
            warn!(image = %body.image, "Rejected removal request");
            return error_response(StatusCode::BAD_REQUEST, "invalid_image", message);
        }
    };

    let session = match open_session(&req, &state).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    // Client disconnects drop this future; shutdown cancels explicitly
    let cancel = state.shutdown.child_token();
    let result = state.removals.run(&session, image.as_str(), &cancel).await;

    let response = match result {
        Ok(RemovalOutcome::Succeeded { job }) => {
            let usage = session.ledger().snapshot();
            info!(job_id = %job.id, used = usage.used, limit = usage.limit, "Removal succeeded");

            let mut builder = HttpResponse::Ok();
            if let Some(record) = session.anonymous_record() {
                builder.cookie(anonymous_data_cookie(&record, state.settings.quota.secure_cookies));
            }
            builder.json(RemovalResponse { job, usage })
        }
        Ok(RemovalOutcome::Failed { job }) => {
            let message = job.error.clone().unwrap_or_else(|| "Job failed".to_string());
            HttpResponse::UnprocessableEntity().json(JobFailedResponse {
                error: "job_failed".to_string(),
                message,
                job,
            })
        }
        Err(e) => removal_error_response(e),
    };

    session.close();
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::middleware::cookies::{decode_anonymous_data, encode_anonymous_data};
    use crate::api::middleware::{ANONYMOUS_DATA_COOKIE, ANONYMOUS_ID_COOKIE};
    use crate::api::testing::{memory_state, memory_state_with, USER_ID, USER_TOKEN};
    use crate::domain::{AnonymousData, JobStatus};
    use crate::providers::mock::{Reply, ScriptedJobService};
    use crate::store::ProfileStore;
    use actix_web::cookie::Cookie;
    use actix_web::http::header::AUTHORIZATION;
    use actix_web::test;
    use serde_json::{json, Value};
    use std::sync::Arc;

    const IMAGE: &str = "https://cdn.example.com/cat.png";

    fn anonymous_request(used: u32) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/api/v1/removals")
            .cookie(Cookie::new(ANONYMOUS_ID_COOKIE, uuid::Uuid::new_v4().to_string()))
            .cookie(Cookie::new(ANONYMOUS_DATA_COOKIE, encode_anonymous_data(&AnonymousData { used })))
            .set_json(json!({ "image": IMAGE }))
    }

    #[actix_web::test]
    async fn test_validate_image() {
        assert!(validate_image(IMAGE).is_ok());
        assert!(validate_image("not a url").is_err());
        assert!(validate_image("file:///etc/passwd").is_err());
    }

    #[actix_web::test]
    async fn test_anonymous_success_sets_usage_cookie() {
        let (state, _, service) = memory_state();
        let app = test_app!(state);

        let res = test::call_service(&app, anonymous_request(2).to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);

        let cookie = res
            .response()
            .cookies()
            .find(|c| c.name() == ANONYMOUS_DATA_COOKIE)
            .expect("usage cookie");
        assert_eq!(decode_anonymous_data(cookie.value()), AnonymousData { used: 3 });

        let body: Value = test::read_body_json(res).await;
        assert_eq!(body["job"]["status"], "succeeded");
        assert_eq!(body["job"]["input"], IMAGE);
        assert_eq!(body["usage"]["used"], 3);
        assert_eq!(service.fetch_calls(), 2);
    }

    #[actix_web::test]
    async fn test_anonymous_at_limit_gets_sign_in_prompt() {
        let (state, _, service) = memory_state();
        let app = test_app!(state);

        let res = test::call_service(&app, anonymous_request(100).to_request()).await;
        assert_eq!(res.status(), StatusCode::PAYMENT_REQUIRED);

        let body: Value = test::read_body_json(res).await;
        assert_eq!(body["error"], "admission_denied");
        assert_eq!(body["prompt"], "sign_in");
        assert_eq!(service.create_calls(), 0);
    }

    #[actix_web::test]
    async fn test_authenticated_success_meters_profile() {
        let (state, store, _) = memory_state();
        let app = test_app!(state);

        let req = test::TestRequest::post()
            .uri("/api/v1/removals")
            .insert_header((AUTHORIZATION, format!("Bearer {}", USER_TOKEN)))
            .set_json(json!({ "image": IMAGE }))
            .to_request();
        let res = test::call_service(&app, req).await;

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.response().cookies().count(), 0);
        assert_eq!(store.load_profile(USER_ID).await.unwrap().unwrap().used, 1);
        assert_eq!(store.job_history(USER_ID, 10).await.unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn test_submission_error_is_bad_gateway_with_detail() {
        let service = Arc::new(ScriptedJobService::new(Reply::error(500, "service unavailable"), vec![]));
        let (state, store) = memory_state_with(service);
        let app = test_app!(state);

        let req = test::TestRequest::post()
            .uri("/api/v1/removals")
            .insert_header((AUTHORIZATION, format!("Bearer {}", USER_TOKEN)))
            .set_json(json!({ "image": IMAGE }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);

        let body: Value = test::read_body_json(res).await;
        assert_eq!(body["error"], "submission_failed");
        assert_eq!(body["message"], "service unavailable");
        assert_eq!(store.load_profile(USER_ID).await.unwrap().unwrap().used, 0);
        assert_eq!(store.record_count(), 0);
    }

    #[actix_web::test]
    async fn test_failed_job_is_unprocessable() {
        let service = Arc::new(ScriptedJobService::new(
            Reply::status("job-9", JobStatus::Starting),
            vec![Reply::failed("job-9", "unsupported image")],
        ));
        let (state, _) = memory_state_with(service);
        let app = test_app!(state);

        let res = test::call_service(&app, anonymous_request(0).to_request()).await;
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(res.response().cookies().filter(|c| c.name() == ANONYMOUS_DATA_COOKIE).count(), 0);

        let body: Value = test::read_body_json(res).await;
        assert_eq!(body["error"], "job_failed");
        assert_eq!(body["message"], "unsupported image");
    }

    #[actix_web::test]
    async fn test_rejected_poll_is_bad_gateway() {
        let service = Arc::new(ScriptedJobService::new(
            Reply::status("job-9", JobStatus::Starting),
            vec![Reply::error(404, "job not found")],
        ));
        let (state, _) = memory_state_with(service);
        let app = test_app!(state);

        let res = test::call_service(&app, anonymous_request(0).to_request()).await;
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(body["error"], "poll_failed");
        assert_eq!(body["message"], "job not found");
    }

    #[actix_web::test]
    async fn test_bad_image_is_rejected_before_gate() {
        let (state, _, service) = memory_state();
        let app = test_app!(state);

        let req = test::TestRequest::post()
            .uri("/api/v1/removals")
            .set_json(json!({ "image": "ftp://example.com/cat.png" }))
            .to_request();
        let res = test::call_service(&app, req).await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(service.create_calls(), 0);
    }
}
