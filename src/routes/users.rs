/// User Routes
///
/// Signup, signin, refresh-token redemption and per-user lookup.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{Capability, IdentityClaims};
use crate::error::{AppError, ErrorContext};
use crate::identity::Identity;
use crate::service::{CredentialService, SignupRequest};

/// Signup request body
#[derive(Deserialize)]
pub struct SignupBody {
    pub name: String,
    pub email: String,
    pub password: String,
    pub user_type: String,
}

/// Signin request body
#[derive(Deserialize)]
pub struct SigninBody {
    pub email: String,
    pub password: String,
}

/// Refresh request body
#[derive(Deserialize)]
pub struct RefreshBody {
    pub refresh_token: String,
}

/// Signup response: the new id, its token pair and the stored record
#[derive(Serialize)]
pub struct SignupResponse {
    pub id: Uuid,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: Identity,
}

/// Runs `result` through the operation's error context before returning it
fn logged<T>(context: &ErrorContext, result: Result<T, AppError>) -> Result<T, AppError> {
    if let Err(e) = &result {
        context.log_error(e);
    }
    result
}

/// POST /users/signup
///
/// # Errors
/// - 400: Validation errors, all violated constraints listed in `details`
/// - 409: Email already registered
/// - 500: Hashing or persistence failure
pub async fn signup(
    body: web::Json<SignupBody>,
    service: web::Data<CredentialService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("signup");
    let body = body.into_inner();

    let outcome = logged(
        &context,
        service
            .signup(SignupRequest {
                name: body.name,
                email: body.email,
                password: body.password,
                user_type: body.user_type,
            })
            .await,
    )?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %outcome.identity.id,
        "Signup completed"
    );

    Ok(HttpResponse::Ok().json(SignupResponse {
        id: outcome.identity.id,
        access_token: outcome.tokens.access_token,
        refresh_token: outcome.tokens.refresh_token,
        token_type: "Bearer",
        expires_in: service.tokens().access_lifetime().num_seconds(),
        user: outcome.identity,
    }))
}

/// POST /users/signin
///
/// Returns the identity record with its freshly rotated tokens.
///
/// # Errors
/// - 401: Unknown email or wrong password (same response for both)
/// - 500: Persistence failure
pub async fn signin(
    body: web::Json<SigninBody>,
    service: web::Data<CredentialService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("signin");

    let identity = logged(&context, service.signin(&body.email, &body.password).await)?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %identity.id,
        "Signin completed"
    );

    Ok(HttpResponse::Ok().json(identity))
}

/// POST /users/refresh
///
/// # Errors
/// - 401: Invalid, expired or superseded refresh token
/// - 500: Persistence failure
pub async fn refresh(
    body: web::Json<RefreshBody>,
    service: web::Data<CredentialService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");

    let identity = logged(&context, service.renew(&body.refresh_token).await)?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %identity.id,
        "Token refresh completed"
    );

    Ok(HttpResponse::Ok().json(identity))
}

/// GET /users/{id}
///
/// **Requires a valid access token**; claims are injected by the JWT
/// middleware. Only the identity itself or an admin may read a record.
///
/// # Errors
/// - 401: Missing or invalid token (handled by middleware)
/// - 403: Caller is neither the identity nor an admin
/// - 404: No identity with this id
pub async fn get_user(
    path: web::Path<Uuid>,
    claims: web::ReqData<IdentityClaims>,
    service: web::Data<CredentialService>,
) -> Result<HttpResponse, AppError> {
    let target = path.into_inner();
    let context = ErrorContext::new("get_user").with_user_id(claims.sub.to_string());

    logged(
        &context,
        Capability::SelfOrAdmin(target)
            .check(&claims)
            .map_err(AppError::from),
    )?;

    let identity = logged(&context, service.find_identity(target).await)?;
    Ok(HttpResponse::Ok().json(identity))
}
