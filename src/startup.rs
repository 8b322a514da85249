use actix_web::dev::Server;
use actix_web::error::{JsonPayloadError, PathError};
use actix_web::{middleware::Logger, web, App, HttpRequest, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{PasswordHasher, TokenCodec};
use crate::configuration::Settings;
use crate::error::{AppError, ValidationError};
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{get_user, health_check, refresh, signin, signup};
use crate::service::CredentialService;
use crate::store::IdentityStore;

/// Wire the credential service from settings and an identity store
pub fn build_service(settings: &Settings, store: Arc<dyn IdentityStore>) -> CredentialService {
    CredentialService::new(
        store,
        TokenCodec::from_settings(&settings.jwt),
        PasswordHasher::new(settings.hashing.cost, settings.hashing.max_concurrent),
        settings.application.store_timeout(),
    )
}

/// Undecodable JSON bodies get the same error shape as every other failure
fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::from(ValidationError::MalformedRequest(err.to_string())).into()
}

fn path_error(err: PathError, _req: &HttpRequest) -> actix_web::Error {
    AppError::from(ValidationError::MalformedRequest(err.to_string())).into()
}

pub fn run(listener: TcpListener, service: CredentialService) -> Result<Server, std::io::Error> {
    let service = web::Data::new(service);

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(Logger::default())
            .wrap(LoggerMiddleware)
            // Shared state
            .app_data(service.clone())
            // Extractor failures
            .app_data(web::JsonConfig::default().error_handler(json_error))
            .app_data(web::PathConfig::default().error_handler(path_error))
            // Public routes
            .route("/health_check", web::get().to(health_check))
            .route("/users/signup", web::post().to(signup))
            .route("/users/signin", web::post().to(signin))
            .route("/users/refresh", web::post().to(refresh))
            // Protected routes
            .service(
                web::scope("/users")
                    .wrap(JwtMiddleware::new(service.clone()))
                    .route("/{id}", web::get().to(get_user)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
