// src/main.rs
use actix_web::{App, HttpResponse, HttpServer, middleware, web};
use log::{info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

mod errors;
mod handlers;
mod models;
mod services;
mod session;

use crate::services::{ImageProcessor, LLMService, PlateAnalyzer};
use crate::session::Session;

#[derive(Clone)]
pub struct AppState {
    analyzer: Arc<dyn PlateAnalyzer>,
    image_processor: Arc<ImageProcessor>,
    session: Arc<Mutex<Session>>,
}

impl AppState {
    pub fn new(analyzer: Arc<dyn PlateAnalyzer>) -> Self {
        Self {
            analyzer,
            image_processor: Arc::new(ImageProcessor::new()),
            session: Arc::new(Mutex::new(Session::new())),
        }
    }

    pub fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting PlateCheck service...");

    let api_key = std::env::var("ANTHROPIC_API_KEY").ok();
    if api_key.is_none() {
        warn!("ANTHROPIC_API_KEY is not set; analysis requests will fail until it is configured");
    }

    let app_state = AppState::new(Arc::new(LLMService::new(api_key)));

    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("Starting HTTP server on 0.0.0.0:{port}");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::Logger::default())
            .configure(handlers::routes)
            .route("/health", web::get().to(health_check))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await?;

    Ok(())
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "platecheck",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
