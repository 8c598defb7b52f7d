//! Identity middleware
//!
//! Resolves the caller before any handler runs and stores the resolved
//! `IdentityState` in request extensions. Mints and sets the
//! `anonymous_id` cookie for first-time visitors.

use actix_web::{
    body::{BoxBody, EitherBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, HttpMessage, HttpRequest, HttpResponse,
};
use futures::future::{ok, LocalBoxFuture, Ready};
use std::rc::Rc;
use tracing::{error, warn};

use super::cookies::{anonymous_id_cookie, ANONYMOUS_ID_COOKIE};
use crate::session::{IdentityError, IdentityResolver, IdentityState};

/// Extract the bearer session token, if any
pub fn extract_bearer(req: &ServiceRequest) -> Option<String> {
    let header = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Middleware factory resolving the caller's identity
pub struct IdentityMiddleware {
    resolver: IdentityResolver,
    secure_cookies: bool,
    /// Paths served without resolving an identity
    public_paths: Vec<String>,
}

impl IdentityMiddleware {
    pub fn new(resolver: IdentityResolver, secure_cookies: bool) -> Self {
        Self {
            resolver,
            secure_cookies,
            public_paths: vec![
                "/health".to_string(),
                "/swagger-ui".to_string(),
                "/api-docs".to_string(),
            ],
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for IdentityMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type Transform = IdentityMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(IdentityMiddlewareService {
            service: Rc::new(service),
            resolver: self.resolver.clone(),
            secure_cookies: self.secure_cookies,
            public_paths: self.public_paths.clone(),
        })
    }
}

pub struct IdentityMiddlewareService<S> {
    service: Rc<S>,
    resolver: IdentityResolver,
    secure_cookies: bool,
    public_paths: Vec<String>,
}

impl<S> IdentityMiddlewareService<S> {
    fn is_public_path(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| path.starts_with(p))
    }
}

impl<S, B> Service<ServiceRequest> for IdentityMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, ctx: &mut core::task::Context<'_>) -> core::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let resolver = self.resolver.clone();
        let secure_cookies = self.secure_cookies;
        let is_public = self.is_public_path(req.path());

        Box::pin(async move {
            if is_public {
                let res = service.call(req).await?;
                return Ok(res.map_into_left_body());
            }

            let bearer = extract_bearer(&req);
            let anonymous_id = req.cookie(ANONYMOUS_ID_COOKIE).map(|c| c.value().to_string());

            let resolution = match resolver.resolve(bearer.as_deref(), anonymous_id.as_deref()).await {
                Ok(resolution) => resolution,
                Err(IdentityError::InvalidToken) => {
                    warn!(path = %req.path(), "Rejected session token");
                    let response = HttpResponse::Unauthorized().json(serde_json::json!({
                        "error": "unauthorized",
                        "message": "Invalid or expired session token"
                    }));
                    return Ok(req.into_response(response).map_into_right_body());
                }
                Err(e) => {
                    error!(error = %e, "Identity resolution failed");
                    let response = HttpResponse::InternalServerError().json(serde_json::json!({
                        "error": "internal_error",
                        "message": "Identity resolution failed"
                    }));
                    return Ok(req.into_response(response).map_into_right_body());
                }
            };

            let minted = resolution.minted.then(|| resolution.identity.id.clone());
            req.extensions_mut().insert(IdentityState::Resolved(resolution.identity));

            let mut res = service.call(req).await?;

            if let Some(id) = minted {
                if let Err(e) = res.response_mut().add_cookie(&anonymous_id_cookie(&id, secure_cookies)) {
                    warn!(error = %e, "Failed to set anonymous id cookie");
                }
            }

            Ok(res.map_into_left_body())
        })
    }
}

/// Access to the resolved identity from handlers
pub trait IdentityExt {
    fn identity_state(&self) -> IdentityState;
}

impl IdentityExt for HttpRequest {
    fn identity_state(&self) -> IdentityState {
        self.extensions()
            .get::<IdentityState>()
            .cloned()
            .unwrap_or(IdentityState::Loading)
    }
}
