use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::StatusCode,
    Error,
};
use futures::future::LocalBoxFuture;
use log::Level;
use std::rc::Rc;
use std::time::Instant;

/// Request/response logging middleware
///
/// Logs one line per completed request at a level chosen by the status:
/// 5xx at `error`, 4xx at `warn`, everything else at `info`. Health checks
/// are logged at `debug`.
pub struct LoggerMiddleware;

impl<S, B> Transform<S, ServiceRequest> for LoggerMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = LoggerMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(LoggerMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct LoggerMiddlewareService<S> {
    service: Rc<S>,
}

fn level_for(path: &str, status: StatusCode) -> Level {
    if status.is_server_error() {
        Level::Error
    } else if status.is_client_error() {
        Level::Warn
    } else if path == "/health_check" {
        Level::Debug
    } else {
        Level::Info
    }
}

impl<S, B> Service<ServiceRequest> for LoggerMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let method = req.method().to_string();
        let path = req.path().to_string();

        let service = self.service.clone();

        Box::pin(async move {
            let result = service.call(req).await;
            let elapsed = start_time.elapsed().as_millis();

            match &result {
                Ok(res) => {
                    let status = res.status();
                    log::log!(
                        level_for(&path, status),
                        "{} {} -> {} ({}ms)",
                        method,
                        path,
                        status.as_u16(),
                        elapsed
                    );
                }
                Err(err) => {
                    let status = err.as_response_error().status_code();
                    log::log!(
                        level_for(&path, status),
                        "{} {} -> {} ({}ms): {}",
                        method,
                        path,
                        status.as_u16(),
                        elapsed,
                        err
                    );
                }
            }

            result
        })
    }
}
