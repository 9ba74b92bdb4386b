// src/handlers.rs
use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use base64::{Engine as _, engine::general_purpose};
use futures_util::TryStreamExt;

use crate::AppState;
use crate::errors::PlateCheckError;
use crate::models::{AnalysisRequest, AnalyzePlateRequest, FoodEdit};

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/analyze-plate", web::post().to(analyze_plate))
            .route("/plate", web::get().to(get_session))
            .route("/plate/image", web::post().to(upload_plate_image))
            .route("/plate/analyze", web::post().to(analyze_session))
            .route("/plate/foods", web::post().to(edit_food))
            .route("/plate/reanalyze", web::post().to(reanalyze_session))
            .route("/plate/reset", web::post().to(reset_session)),
    );
}

/// Stateless bridge endpoint: forwards either an encoded image or a food
/// list to the model and relays the outcome, without touching the session.
pub async fn analyze_plate(
    body: web::Json<AnalyzePlateRequest>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, PlateCheckError> {
    let body = body.into_inner();

    let request = if let Some(items) = body.food_items.filter(|items| !items.is_empty()) {
        AnalysisRequest::FoodList(items)
    } else if let Some(image) = body.image {
        let bytes = general_purpose::STANDARD
            .decode(image.as_bytes())
            .map_err(|e| PlateCheckError::Validation(format!("invalid base64 image: {e}")))?;
        let media_type = body
            .media_type
            .unwrap_or_else(|| "image/jpeg".to_string());
        log::debug!(
            "processing image: {}KB, type: {}",
            bytes.len() / 1024,
            media_type
        );
        AnalysisRequest::Image {
            data: bytes,
            media_type,
        }
    } else {
        return Err(PlateCheckError::EmptyRequest);
    };

    let outcome = data.analyzer.analyze(request).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// Multipart photo upload: normalizes the first file field and selects it
/// into the session.
pub async fn upload_plate_image(
    mut payload: Multipart,
    data: web::Data<AppState>,
) -> Result<HttpResponse, PlateCheckError> {
    let mut file: Option<(Vec<u8>, String)> = None;

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| PlateCheckError::Validation(e.to_string()))?
    {
        let content_type = field
            .content_type()
            .map(|ct| ct.to_string())
            .unwrap_or_else(|| "image/jpeg".to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .try_next()
            .await
            .map_err(|e| PlateCheckError::Validation(e.to_string()))?
        {
            bytes.extend_from_slice(&chunk);
        }

        if !bytes.is_empty() {
            file = Some((bytes, content_type));
            break;
        }
    }

    let (bytes, content_type) =
        file.ok_or_else(|| PlateCheckError::Validation("no file provided".to_string()))?;

    let encoded = data.image_processor.normalize(&bytes, &content_type);

    let mut session = data.lock_session();
    session.select(encoded)?;
    Ok(HttpResponse::Ok().json(session.view()))
}

/// Drives one full analysis round: begin, call the model, land the result.
/// The session lock is never held across the upstream await.
pub async fn analyze_session(
    data: web::Data<AppState>,
) -> Result<HttpResponse, PlateCheckError> {
    let request = { data.lock_session().begin_analysis()? };

    let outcome = data.analyzer.analyze(request).await;

    let mut session = data.lock_session();
    session.finish(outcome)?;
    Ok(HttpResponse::Ok().json(session.view()))
}

pub async fn edit_food(
    body: web::Json<FoodEdit>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, PlateCheckError> {
    let mut session = data.lock_session();
    session.edit_food(body.into_inner())?;
    Ok(HttpResponse::Ok().json(session.view()))
}

/// Re-scores the edited food list. With an empty list this is a no-op and
/// just returns the unchanged session.
pub async fn reanalyze_session(
    data: web::Data<AppState>,
) -> Result<HttpResponse, PlateCheckError> {
    let request = { data.lock_session().begin_reanalysis()? };

    let Some(request) = request else {
        return Ok(HttpResponse::Ok().json(data.lock_session().view()));
    };

    let outcome = data.analyzer.analyze(request).await;

    let mut session = data.lock_session();
    session.finish(outcome)?;
    Ok(HttpResponse::Ok().json(session.view()))
}

pub async fn reset_session(data: web::Data<AppState>) -> Result<HttpResponse, PlateCheckError> {
    let mut session = data.lock_session();
    session.reset();
    Ok(HttpResponse::Ok().json(session.view()))
}

pub async fn get_session(data: web::Data<AppState>) -> Result<HttpResponse, PlateCheckError> {
    Ok(HttpResponse::Ok().json(data.lock_session().view()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalysisOutcome, PlateReport};
    use crate::services::PlateAnalyzer;
    use actix_web::{App, test};
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Scripted stand-in for the hosted model.
    struct ScriptedAnalyzer {
        script: fn(AnalysisRequest) -> Result<AnalysisOutcome, PlateCheckError>,
    }

    #[async_trait]
    impl PlateAnalyzer for ScriptedAnalyzer {
        async fn analyze(
            &self,
            request: AnalysisRequest,
        ) -> Result<AnalysisOutcome, PlateCheckError> {
            (self.script)(request)
        }
    }

    fn echo_report(request: AnalysisRequest) -> Result<AnalysisOutcome, PlateCheckError> {
        let food_items = match request {
            AnalysisRequest::Image { .. } => {
                vec!["grilled chicken".to_string(), "broccoli".to_string()]
            }
            AnalysisRequest::FoodList(items) => items,
        };
        Ok(AnalysisOutcome::Report(PlateReport {
            food_items,
            ..PlateReport::default()
        }))
    }

    fn state_with(
        script: fn(AnalysisRequest) -> Result<AnalysisOutcome, PlateCheckError>,
    ) -> AppState {
        AppState::new(Arc::new(ScriptedAnalyzer { script }))
    }

    macro_rules! service {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state))
                    .configure(routes),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn analyze_plate_with_food_list_round_trips() {
        let app = service!(state_with(echo_report));

        let req = test::TestRequest::post()
            .uri("/api/v1/analyze-plate")
            .set_json(serde_json::json!({
                "foodItems": ["grilled chicken", "broccoli", "brown rice"]
            }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(
            body["foodItems"],
            serde_json::json!(["grilled chicken", "broccoli", "brown rice"])
        );
    }

    #[actix_web::test]
    async fn analyze_plate_without_payload_is_a_bad_request() {
        let app = service!(state_with(echo_report));

        let req = test::TestRequest::post()
            .uri("/api/v1/analyze-plate")
            .set_json(serde_json::json!({}))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "No image or food items provided");
    }

    #[actix_web::test]
    async fn analyze_plate_refusal_is_a_normal_response_with_error_body() {
        let app = service!(state_with(|_| {
            Err(PlateCheckError::NoFood(
                crate::services::llm_service::REFUSAL_MESSAGE.to_string(),
            ))
        }));

        let req = test::TestRequest::post()
            .uri("/api/v1/analyze-plate")
            .set_json(serde_json::json!({ "image": "", "mediaType": "image/jpeg" }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), actix_web::http::StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(
            body["error"],
            "Couldn't identify food in this image. Please try a clearer photo of your meal."
        );
    }

    #[actix_web::test]
    async fn analyze_plate_rejects_invalid_base64() {
        let app = service!(state_with(echo_report));

        let req = test::TestRequest::post()
            .uri("/api/v1/analyze-plate")
            .set_json(serde_json::json!({ "image": "!!not base64!!" }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn session_workflow_round_trip() {
        let state = state_with(echo_report);
        let app = service!(state.clone());

        // No image yet: analyzing is a conflict.
        let req = test::TestRequest::post()
            .uri("/api/v1/plate/analyze")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::CONFLICT);

        // Seed the session directly; the multipart upload wraps the same
        // select() the state machine tests cover.
        state
            .lock_session()
            .select(crate::models::EncodedImage {
                data: vec![1, 2, 3],
                media_type: "image/jpeg".to_string(),
                dimensions: Some((100, 100)),
            })
            .unwrap();

        let req = test::TestRequest::post()
            .uri("/api/v1/plate/analyze")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["phase"], "result");
        assert_eq!(
            body["foodItems"],
            serde_json::json!(["grilled chicken", "broccoli"])
        );
        assert_eq!(body["dirty"], false);

        // Edit the list: session goes dirty.
        let req = test::TestRequest::post()
            .uri("/api/v1/plate/foods")
            .set_json(serde_json::json!({ "op": "append", "value": "brown rice" }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["dirty"], true);

        // Re-analysis echoes the edited list back and clears dirty.
        let req = test::TestRequest::post()
            .uri("/api/v1/plate/reanalyze")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["phase"], "result");
        assert_eq!(
            body["foodItems"],
            serde_json::json!(["grilled chicken", "broccoli", "brown rice"])
        );
        assert_eq!(body["dirty"], false);

        // Reset drops back to an empty session.
        let req = test::TestRequest::post()
            .uri("/api/v1/plate/reset")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["phase"], "empty");
        assert!(body["foodItems"].as_array().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn failed_analysis_keeps_image_and_surfaces_error() {
        let state = state_with(|_| Err(PlateCheckError::Upstream("connection reset".to_string())));
        let app = service!(state.clone());

        state
            .lock_session()
            .select(crate::models::EncodedImage {
                data: vec![1],
                media_type: "image/jpeg".to_string(),
                dimensions: None,
            })
            .unwrap();

        let req = test::TestRequest::post()
            .uri("/api/v1/plate/analyze")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["phase"], "selected");
        assert!(
            body["error"]
                .as_str()
                .unwrap()
                .starts_with("Failed to analyze image")
        );
        assert!(body["image"].is_object());
    }
}
