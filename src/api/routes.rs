// Route configuration for the version cache

use crate::api::handlers;
use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health))
        .route("/{resource}", web::get().to(handlers::resource))
        .default_service(web::to(handlers::not_found));
}
