//! Usage endpoints
//!
//! Snapshot for the usage bar, plus a server-sent event feed that pushes a
//! new snapshot whenever an authenticated profile changes.

use actix_web::{http::header::CACHE_CONTROL, web, HttpRequest, HttpResponse};
use futures::{future, stream, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use super::{open_session, ErrorBody};
use crate::domain::{admit, LedgerSnapshot};
use crate::session::UsageLedger;
use crate::AppState;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UsageResponse {
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
    pub package_id: Option<String>,
    /// Whole percent, rounded up
    pub usage_percent: u32,
    /// Whether a new job would currently be admitted
    pub admitted: bool,
}

impl From<&LedgerSnapshot> for UsageResponse {
    fn from(snapshot: &LedgerSnapshot) -> Self {
        Self {
            used: snapshot.used,
            limit: snapshot.limit,
            remaining: snapshot.remaining(),
            package_id: snapshot.package_id.clone(),
            usage_percent: snapshot.usage_percent(),
            admitted: admit(snapshot),
        }
    }
}

/// GET /api/v1/usage - Ledger snapshot for the caller
#[utoipa::path(
    get,
    path = "/api/v1/usage",
    tag = "usage",
    responses(
        (status = 200, description = "Current usage", body = UsageResponse),
        (status = 401, description = "Invalid session token", body = ErrorBody)
    )
)]
pub async fn get_usage(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let session = match open_session(&req, &state).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    let usage = UsageResponse::from(&session.ledger().snapshot());
    session.close();

    HttpResponse::Ok().json(usage)
}

fn sse_event(snapshot: &LedgerSnapshot) -> Result<web::Bytes, actix_web::Error> {
    let json = serde_json::to_string(&UsageResponse::from(snapshot))?;
    Ok(web::Bytes::from(format!("data: {}\n\n", json)))
}

/// Snapshots pushed after the initial one. Anonymous ledgers never change
/// server-side, so their feed ends immediately.
fn updates(
    ledger: UsageLedger,
    shutdown: CancellationToken,
) -> impl futures::Stream<Item = Result<web::Bytes, actix_web::Error>> {
    stream::unfold((ledger, shutdown), |(mut ledger, shutdown)| async move {
        let snapshot = match &mut ledger {
            UsageLedger::Subscribed(subscribed) => tokio::select! {
                _ = shutdown.cancelled() => None,
                snapshot = subscribed.changed() => snapshot,
            },
            UsageLedger::Local(_) => None,
        }?;
        Some((sse_event(&snapshot), (ledger, shutdown)))
    })
}

/// GET /api/v1/usage/stream - Live usage as server-sent events
#[utoipa::path(
    get,
    path = "/api/v1/usage/stream",
    tag = "usage",
    responses(
        (status = 200, description = "`data:` events carrying UsageResponse JSON", body = UsageResponse, content_type = "text/event-stream"),
        (status = 401, description = "Invalid session token", body = ErrorBody)
    )
)]
pub async fn usage_stream(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let session = match open_session(&req, &state).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    let first = sse_event(&session.ledger().snapshot());
    let feed = stream::once(future::ready(first))
        .chain(updates(session.into_ledger(), state.shutdown.child_token()));

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((CACHE_CONTROL, "no-cache"))
        .streaming(feed)
}
