//! Per-endpoint request metrics. Path parameters and per-connection noise
//! collapse into stable endpoint labels so the metrics map stays bounded no
//! matter how many sessions come and go.

use crate::state::AppState;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    time::Instant,
};

pub struct MetricsMiddleware;

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService { service }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: S,
}

/// Map a request path onto a bounded set of endpoint labels.
fn endpoint_label(method: &str, path: &str) -> String {
    let normalized = match path {
        "/health" | "/api/v1/health" => "/health",
        "/api/v1/metrics" => "/api/v1/metrics",
        "/api/v1/config" => "/api/v1/config",
        "/ws/interview" => "/ws/interview",
        _ => "other",
    };
    format!("{} {}", method, normalized)
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let endpoint = endpoint_label(req.method().as_str(), req.uri().path());

        if let Some(app_state) = req.app_data::<web::Data<AppState>>() {
            app_state.increment_request_count();
        }

        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            let duration_ms = start_time.elapsed().as_millis() as u64;

            let is_error = match &result {
                Ok(response) => {
                    response.status().is_client_error() || response.status().is_server_error()
                }
                Err(_) => true,
            };

            if let Ok(response) = &result {
                if let Some(app_state) = response.request().app_data::<web::Data<AppState>>() {
                    app_state.record_endpoint_request(&endpoint, duration_ms, is_error);

                    if is_error {
                        app_state.increment_error_count();
                    }
                }
            }

            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_labels_are_bounded() {
        assert_eq!(endpoint_label("GET", "/health"), "GET /health");
        assert_eq!(endpoint_label("GET", "/api/v1/health"), "GET /health");
        assert_eq!(endpoint_label("GET", "/ws/interview"), "GET /ws/interview");
        assert_eq!(endpoint_label("GET", "/favicon.ico"), "GET other");
        assert_eq!(endpoint_label("PUT", "/api/v1/config"), "PUT /api/v1/config");
    }
}
