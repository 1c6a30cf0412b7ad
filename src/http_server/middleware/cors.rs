//! Permissive CORS
//!
//! `CorsLayer` stamps the headers and answers preflights. Any other
//! `OPTIONS` request, whatever the path, gets an empty 200 from
//! [`options_ok`] instead of reaching the router.

use axum::{
    body::Body,
    extract::Request,
    http::{header, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use tower_http::cors::{Any, CorsLayer};

pub fn relay_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

pub async fn options_ok(request: Request, next: Next) -> Response {
    if request.method() != Method::OPTIONS {
        return next.run(request).await;
    }

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    response
}
