//! OpenAPI 3.0 specification definition

use utoipa::OpenApi;

use crate::api::handlers::{
    health::HealthResponse,
    jobs::JobsResponse,
    packages::{PackageView, PackagesResponse},
    removals::{AdmissionDeniedResponse, JobFailedResponse, RemovalRequest, RemovalResponse},
    session::{LoginResponse, SessionResponse},
    usage::UsageResponse,
    ErrorBody,
};
use crate::domain::{
    AdmissionPrompt, CreditPackage, Identity, IdentityKind, Job, JobRecord, JobStatus, LedgerSnapshot,
};
use crate::store::StoreMode;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Cutout Gateway API",
        version = "1.0.0",
        description = "Metered background removal: credit checks, job submission and status polling"
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    tags(
        (name = "system", description = "System health and status endpoints"),
        (name = "session", description = "Caller identity and first-login provisioning"),
        (name = "usage", description = "Credit usage for the usage bar"),
        (name = "packages", description = "Credit package catalog"),
        (name = "removals", description = "Background removal jobs"),
        (name = "jobs", description = "Job history")
    ),
    paths(
        crate::api::handlers::health::health_check,
        crate::api::handlers::session::get_session,
        crate::api::handlers::session::login,
        crate::api::handlers::usage::get_usage,
        crate::api::handlers::usage::usage_stream,
        crate::api::handlers::packages::list_packages,
        crate::api::handlers::removals::create_removal,
        crate::api::handlers::jobs::list_jobs,
    ),
    components(
        schemas(
            HealthResponse,
            StoreMode,
            ErrorBody,
            SessionResponse,
            LoginResponse,
            UsageResponse,
            PackagesResponse,
            PackageView,
            RemovalRequest,
            RemovalResponse,
            JobFailedResponse,
            AdmissionDeniedResponse,
            JobsResponse,
            // Domain schemas
            Identity,
            IdentityKind,
            LedgerSnapshot,
            AdmissionPrompt,
            CreditPackage,
            Job,
            JobStatus,
            JobRecord,
        )
    )
)]
pub struct ApiDoc;
