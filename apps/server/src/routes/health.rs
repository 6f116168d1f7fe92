use actix_web::{HttpResponse, Responder, get};
use serde_json::json;

macros_utils::routes! {
    route health_route,
}

/// Health check route
/// Answers as long as the process is serving requests.
#[get("/health")]
pub async fn health_route() -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}
