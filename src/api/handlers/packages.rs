//! Credit package catalog endpoint

use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use super::usage::UsageResponse;
use super::{error_response, open_session, ErrorBody};
use crate::domain::{admit, CreditPackage};
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct PackageView {
    pub id: String,
    pub price: f64,
    pub limit: u32,
    /// Package the caller currently holds
    pub active: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PackagesResponse {
    /// Ascending by price
    pub packages: Vec<PackageView>,
    /// Purchasing is offered only once the current quota is spent
    pub purchase_enabled: bool,
    pub usage: UsageResponse,
}

fn view(package: CreditPackage, active_id: Option<&str>) -> PackageView {
    PackageView {
        active: active_id == Some(package.id.as_str()),
        id: package.id,
        price: package.price,
        limit: package.limit,
    }
}

/// GET /api/v1/packages - Catalog with the caller's active package flagged
#[utoipa::path(
    get,
    path = "/api/v1/packages",
    tag = "packages",
    responses(
        (status = 200, description = "Package catalog", body = PackagesResponse),
        (status = 500, description = "Catalog unavailable", body = ErrorBody)
    )
)]
pub async fn list_packages(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let catalog = match state.catalog.list_packages().await {
        Ok(catalog) => catalog,
        Err(e) => {
            error!(error = %e, "Failed to load package catalog");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "Failed to load packages");
        }
    };

    let session = match open_session(&req, &state).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    let snapshot = session.ledger().snapshot();
    session.close();

    let active_id = snapshot.package_id.as_deref();
    HttpResponse::Ok().json(PackagesResponse {
        packages: catalog.into_iter().map(|p| view(p, active_id)).collect(),
        purchase_enabled: !admit(&snapshot),
        usage: UsageResponse::from(&snapshot),
    })
}
