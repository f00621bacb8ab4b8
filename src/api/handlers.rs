// HTTP request handlers for the version cache

use crate::api::cache::VersionCache;
use actix_web::{web, HttpResponse};

/// Cache state: entry count, last refresh time and last error.
pub async fn health(cache: web::Data<VersionCache>) -> HttpResponse {
    HttpResponse::Ok().json(cache.status())
}

/// The cached JSON when the path names the configured resource.
pub async fn resource(path: web::Path<String>, cache: web::Data<VersionCache>) -> HttpResponse {
    let requested = path.into_inner();
    if requested == cache.resource() {
        HttpResponse::Ok().json(cache.snapshot())
    } else {
        tracing::debug!(path = %requested, "unknown resource");
        not_found().await
    }
}

pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound()
        .content_type("text/plain")
        .body("404 Not Found")
}
