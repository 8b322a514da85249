/// JWT Authentication Middleware
///
/// Validates the access token from the `Authorization: Bearer` header (or the
/// plain `token` header) and injects the identity claims into request
/// extensions for route handlers.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::Capability;
use crate::error::{AppError, AuthError};
use crate::service::CredentialService;

/// Must wrap every route that requires authentication
pub struct JwtMiddleware {
    service: web::Data<CredentialService>,
}

impl JwtMiddleware {
    pub fn new(service: web::Data<CredentialService>) -> Self {
        Self { service }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            inner: Rc::new(service),
            credentials: self.service.clone(),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    inner: Rc<S>,
    credentials: web::Data<CredentialService>,
}

/// Token from `Authorization: Bearer <token>`, falling back to `token: <token>`
fn presented_token(req: &ServiceRequest) -> Option<String> {
    let headers = req.headers();

    let bearer = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    let plain = || headers.get("token").and_then(|h| h.to_str().ok());

    bearer
        .or_else(plain)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(inner);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let token = match presented_token(&req) {
            Some(token) => token,
            None => {
                tracing::warn!(path = %req.path(), "Missing authorization token");
                let err = AppError::Auth(AuthError::Unauthenticated);
                return Box::pin(async move { Err(err.into()) });
            }
        };

        match self.credentials.authorize(&token, Capability::Authenticated) {
            Ok(claims) => {
                tracing::debug!(
                    user_id = %claims.sub,
                    email = %claims.email,
                    "JWT validated successfully"
                );
                req.extensions_mut().insert(claims);

                let inner = self.inner.clone();
                Box::pin(async move { inner.call(req).await })
            }
            Err(err) => Box::pin(async move { Err(err.into()) }),
        }
    }
}
