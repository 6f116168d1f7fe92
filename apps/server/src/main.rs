#![warn(clippy::all, clippy::pedantic)]

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use actix_web::dev::Service;
use actix_web::{App, HttpServer, web};
use servprobe::config::Config;
use servprobe::database::DatabaseImpl;
use tracing::info;

mod error;
mod routes;

use error::AppError;
use logger::init;
use routes::AppState;

const DEFAULT_BIND: &str = "127.0.0.1:8080";

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init();

    let config_path = env::var_os("SERVPROBE_CONFIG").map(PathBuf::from);
    let config = Config::from_config(config_path.as_deref())?;
    let store = DatabaseImpl::open(&config.storage.path).await?;

    let addr: SocketAddr = env::var("SERVPROBE_BIND")
        .unwrap_or_else(|_| DEFAULT_BIND.to_string())
        .parse()?;

    let state = web::Data::new(AppState {
        store: Arc::new(store),
        services: config.services,
    });

    run_server(addr, state).await
}

async fn run_server(addr: SocketAddr, state: web::Data<AppState>) -> Result<(), AppError> {
    info!(%addr, "Serving query API");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap_fn(|req, srv| {
                let method = req.method().clone();
                let path = req.path().to_string();
                let start = Instant::now();
                let response = srv.call(req);
                async move {
                    let response = response.await?;
                    info!(
                        %method,
                        path,
                        status = response.status().as_u16(),
                        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
                        "request"
                    );
                    Ok(response)
                }
            })
            .configure(routes::routes)
    })
    .bind(addr)?
    .run()
    .await?;

    Ok(())
}
