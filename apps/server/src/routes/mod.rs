mod health;
mod services;

use std::sync::Arc;

use actix_web::web;
use servprobe::config::ServiceConfig;
use servprobe::database::Database;

/// Shared, read-only handler state
pub struct AppState {
    pub store: Arc<dyn Database>,
    pub services: Vec<ServiceConfig>,
}

impl AppState {
    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|service| service.name == name)
    }
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .configure(health::routes)
            .configure(services::routes),
    );
}
