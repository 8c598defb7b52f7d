//! Job history endpoint

use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::{IntoParams, ToSchema};

use super::{error_response, sign_in_required, ErrorBody};
use crate::api::middleware::IdentityExt;
use crate::domain::JobRecord;
use crate::AppState;

const MAX_HISTORY: u32 = 100;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct JobsQuery {
    /// Entries to return (1-100, default 20)
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    20
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JobsResponse {
    pub jobs: Vec<JobRecord>,
}

/// GET /api/v1/jobs - Completed jobs of the signed-in user, newest first
#[utoipa::path(
    get,
    path = "/api/v1/jobs",
    tag = "jobs",
    params(JobsQuery),
    responses(
        (status = 200, description = "Job history", body = JobsResponse),
        (status = 401, description = "Not signed in", body = ErrorBody)
    )
)]
pub async fn list_jobs(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<JobsQuery>,
) -> HttpResponse {
    let user_id = match req.identity_state().resolved() {
        Some(identity) if identity.is_authenticated() => identity.id.clone(),
        _ => return sign_in_required(),
    };

    let limit = query.limit.clamp(1, MAX_HISTORY);
    match state.profiles.job_history(&user_id, limit).await {
        Ok(jobs) => HttpResponse::Ok().json(JobsResponse { jobs }),
        Err(e) => {
            error!(user_id = %user_id, error = %e, "Failed to load job history");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "Failed to load job history")
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::api::testing::{memory_state, USER_ID, USER_TOKEN};
    use crate::domain::{Job, JobRecord, JobStatus};
    use crate::store::ProfileStore;
    use actix_web::http::{header::AUTHORIZATION, StatusCode};
    use actix_web::test;
    use serde_json::Value;

    #[actix_web::test]
    async fn test_history_is_limited_and_newest_first() {
        let (state, store, _) = memory_state();
        for id in ["job-a", "job-b", "job-c"] {
            let job = Job {
                id: id.to_string(),
                status: JobStatus::Succeeded,
                input: "https://cdn.example.com/in.png".to_string(),
                output: Some("https://cdn.example.com/out.png".to_string()),
                error: None,
            };
            store.append_job_record(&JobRecord::from_job(USER_ID, &job)).await.unwrap();
        }
        let app = test_app!(state);

        let req = test::TestRequest::get()
            .uri("/api/v1/jobs?limit=2")
            .insert_header((AUTHORIZATION, format!("Bearer {}", USER_TOKEN)))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        let ids: Vec<&str> = body["jobs"].as_array().unwrap().iter().map(|j| j["job_id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["job-c", "job-b"]);
    }

    #[actix_web::test]
    async fn test_history_requires_sign_in() {
        let (state, _, _) = memory_state();
        let app = test_app!(state);

        let res = test::call_service(&app, test::TestRequest::get().uri("/api/v1/jobs").to_request()).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
