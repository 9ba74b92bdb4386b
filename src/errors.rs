// src/errors.rs
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlateCheckError {
    #[error("API key not configured")]
    MissingApiKey,

    #[error("No image or food items provided")]
    EmptyRequest,

    /// The model said there is no food to score, either as an explicit
    /// `{"error": ...}` reply or detected from its free-text refusal.
    /// Carried verbatim for display.
    #[error("{0}")]
    NoFood(String),

    #[error("Failed to analyze image: {0}")]
    Upstream(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    SessionState(&'static str),
}

impl ResponseError for PlateCheckError {
    fn error_response(&self) -> HttpResponse {
        let body = serde_json::json!({ "error": self.to_string() });
        match self {
            // A food-free plate is a normal answer, not a failure.
            PlateCheckError::NoFood(_) => HttpResponse::Ok().json(body),
            PlateCheckError::EmptyRequest | PlateCheckError::Validation(_) => {
                HttpResponse::BadRequest().json(body)
            }
            PlateCheckError::SessionState(_) => HttpResponse::Conflict().json(body),
            PlateCheckError::MissingApiKey | PlateCheckError::Upstream(_) => {
                HttpResponse::InternalServerError().json(body)
            }
        }
    }
}
