use std::rc::Rc;

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{error::ErrorUnauthorized, Error};
use futures::future::{ready, LocalBoxFuture, Ready};

/// Gates every mutating route behind the configured submission key, accepted
/// either as `x-api-key` or `Authorization: Bearer`. A static-key comparison
/// rather than a session or JWT check, since there's no per-user identity here.
pub struct ApiKeyAuth {
    pub expected_key: Rc<String>,
}

impl ApiKeyAuth {
    pub fn new(expected_key: String) -> Self {
        ApiKeyAuth { expected_key: Rc::new(expected_key) }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ApiKeyAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = ApiKeyAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ApiKeyAuthMiddleware {
            service: Rc::new(service),
            expected_key: self.expected_key.clone(),
        }))
    }
}

pub struct ApiKeyAuthMiddleware<S> {
    service: Rc<S>,
    expected_key: Rc<String>,
}

impl<S, B> Service<ServiceRequest> for ApiKeyAuthMiddleware<S>
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
        let service = self.service.clone();
        let expected_key = self.expected_key.clone();

        let presented = req
            .headers()
            .get("x-api-key")
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string())
            .or_else(|| {
                req.headers()
                    .get("Authorization")
                    .and_then(|h| h.to_str().ok())
                    .and_then(|h| h.strip_prefix("Bearer "))
                    .map(|s| s.to_string())
            });

        Box::pin(async move {
            match presented {
                Some(key) if key == *expected_key => service.call(req).await,
                _ => Err(ErrorUnauthorized("missing or invalid API key")),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{test, web, App, HttpResponse};

    use super::*;

    async fn ok_handler() -> HttpResponse {
        HttpResponse::Ok().finish()
    }

    #[actix_web::test]
    async fn rejects_missing_key() {
        let app = test::init_service(
            App::new()
                .wrap(ApiKeyAuth::new("secret".to_string()))
                .route("/x", web::get().to(ok_handler)),
        )
        .await;
        let req = test::TestRequest::get().uri("/x").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
    }

    #[actix_web::test]
    async fn rejects_wrong_key() {
        let app = test::init_service(
            App::new()
                .wrap(ApiKeyAuth::new("secret".to_string()))
                .route("/x", web::get().to(ok_handler)),
        )
        .await;
        let req = test::TestRequest::get().uri("/x").insert_header(("x-api-key", "nope")).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
    }

    #[actix_web::test]
    async fn accepts_x_api_key_header() {
        let app = test::init_service(
            App::new()
                .wrap(ApiKeyAuth::new("secret".to_string()))
                .route("/x", web::get().to(ok_handler)),
        )
        .await;
        let req = test::TestRequest::get().uri("/x").insert_header(("x-api-key", "secret")).to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn accepts_bearer_token() {
        let app = test::init_service(
            App::new()
                .wrap(ApiKeyAuth::new("secret".to_string()))
                .route("/x", web::get().to(ok_handler)),
        )
        .await;
        let req = test::TestRequest::get()
            .uri("/x")
            .insert_header(("Authorization", "Bearer secret"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }
}
