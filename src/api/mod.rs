//! API module - HTTP routes and handlers

/// Service under test: application state, identity middleware and routes
#[cfg(test)]
macro_rules! test_app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data($state.clone())
                .wrap($crate::api::middleware::IdentityMiddleware::new($state.resolver.clone(), false))
                .configure($crate::api::configure_routes),
        )
        .await
    };
}

pub mod handlers;
pub mod middleware;
pub mod openapi;

use actix_web::web;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::openapi::ApiDoc;

/// Configure all API routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(
                web::scope("/session")
                    .route("", web::get().to(handlers::session::get_session))
                    .route("/login", web::post().to(handlers::session::login))
            )
            .service(
                web::scope("/usage")
                    .route("", web::get().to(handlers::usage::get_usage))
                    .route("/stream", web::get().to(handlers::usage::usage_stream))
            )
            .route("/packages", web::get().to(handlers::packages::list_packages))
            .route("/removals", web::post().to(handlers::removals::create_removal))
            .route("/jobs", web::get().to(handlers::jobs::list_jobs))
    )
    .route("/health", web::get().to(handlers::health::health_check))
    // Swagger UI and OpenAPI document
    .service(
        SwaggerUi::new("/swagger-ui/{_:.*}")
            .url("/api-docs/openapi.json", ApiDoc::openapi())
    );
}
