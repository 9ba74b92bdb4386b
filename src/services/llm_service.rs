// src/services/llm_service.rs
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use reqwest::Client;
use serde_json::json;

use crate::errors::PlateCheckError;
use crate::models::{AnalysisOutcome, AnalysisRequest, PlateReport};

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MODEL: &str = "claude-sonnet-4-20250514";
const MAX_TOKENS: u32 = 1024;

/// Shown when the model's free text indicates it found nothing edible.
pub const REFUSAL_MESSAGE: &str =
    "Couldn't identify food in this image. Please try a clearer photo of your meal.";

/// Phrases that mark a non-JSON reply as "I can't score this photo".
const NEGATION_PHRASES: [&str; 4] = ["can't", "cannot", "unable", "don't see"];

const RUBRIC_PROMPT: &str = r#"You are a nutrition expert analyzing food based on the new 2025-2030 Dietary Guidelines for Americans (the "New Pyramid").

The New Pyramid prioritizes:
1. HIGH-QUALITY PROTEIN & HEALTHY FATS (top priority): Meat, fish, eggs, full-fat dairy, olive oil, avocados, nuts
2. VEGETABLES & FRUITS: Colorful, whole, minimally processed
3. WHOLE GRAINS (smallest portion): Oats, brown rice, quinoa - NOT refined carbs

IMPORTANT: Be flexible when identifying food! Even if the image is slightly blurry, at an angle, partially visible, or taken in low light, do your best to identify what foods are present. Look for ANY food items - meals, snacks, drinks, ingredients, etc. If you can make a reasonable guess about what food is shown, provide your analysis.

Respond in this exact JSON format (no markdown, just raw JSON):
{
  "foodItems": ["item1", "item2", "item3"],
  "macroEstimate": {
    "protein": 25,
    "carbs": 45,
    "fats": 30
  },
  "pyramidScore": {
    "overall": 75,
    "proteinQuality": "good",
    "vegetableScore": "needs improvement",
    "grainQuality": "good"
  },
  "feedback": {
    "strengths": ["Good protein source", "Healthy fats present"],
    "improvements": ["Add more colorful vegetables", "Consider whole grain option"]
  },
  "kidFriendlyScore": {
    "emoji": "🌟",
    "message": "Great Protein! Add some greens for superpowers!",
    "stars": 4
  }
}

Be encouraging but honest. The macro percentages should add up to 100. The overall score is 0-100. Stars are 1-5. Only respond with the JSON object, no other text."#;

const IMAGE_SUFFIX: &str = r#"Analyze this plate image. If the image doesn't show food, respond with: {"error": "Please upload a photo of food"}"#;

/// Boundary toward the hosted vision-language model. Behind a trait so the
/// HTTP handlers and the session flow can be exercised with a scripted
/// analyzer in tests.
#[async_trait]
pub trait PlateAnalyzer: Send + Sync {
    async fn analyze(&self, request: AnalysisRequest)
    -> Result<AnalysisOutcome, PlateCheckError>;
}

pub struct LLMService {
    api_key: Option<String>,
    client: Client,
}

impl LLMService {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            client: Client::new(),
        }
    }

    fn request_body(request: &AnalysisRequest) -> serde_json::Value {
        match request {
            AnalysisRequest::Image { data, media_type } => {
                let encoded = general_purpose::STANDARD.encode(data);
                json!({
                    "model": MODEL,
                    "max_tokens": MAX_TOKENS,
                    "messages": [{
                        "role": "user",
                        "content": [
                            {
                                "type": "image",
                                "source": {
                                    "type": "base64",
                                    "media_type": media_type,
                                    "data": encoded
                                }
                            },
                            {
                                "type": "text",
                                "text": format!("{RUBRIC_PROMPT}\n\n{IMAGE_SUFFIX}")
                            }
                        ]
                    }]
                })
            }
            AnalysisRequest::FoodList(items) => {
                let text = format!(
                    "{RUBRIC_PROMPT}\n\nAnalyze this list of foods on a plate: {}\n\nKeep the foodItems array exactly as provided. Estimate macros, score, and feedback based on these foods.",
                    items.join(", ")
                );
                json!({
                    "model": MODEL,
                    "max_tokens": MAX_TOKENS,
                    "messages": [{ "role": "user", "content": text }]
                })
            }
        }
    }
}

#[async_trait]
impl PlateAnalyzer for LLMService {
    async fn analyze(
        &self,
        request: AnalysisRequest,
    ) -> Result<AnalysisOutcome, PlateCheckError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(PlateCheckError::MissingApiKey)?;

        let response = self
            .client
            .post(ANTHROPIC_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&Self::request_body(&request))
            .send()
            .await
            .map_err(|e| PlateCheckError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PlateCheckError::Upstream(format!(
                "{status}: {error_text}"
            )));
        }

        let envelope: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PlateCheckError::Upstream(e.to_string()))?;

        let text = envelope["content"][0]["text"]
            .as_str()
            .ok_or_else(|| PlateCheckError::Upstream("no text content in response".to_string()))?;

        parse_outcome(text)
    }
}

/// Turns the model's reply text into an outcome.
///
/// The model is instructed to answer with raw JSON but sometimes wraps it
/// in a fenced code block or surrounds it with prose. A JSON object with an
/// `error` field is the model declining to score. Non-JSON text is scanned
/// for refusal phrasing; anything else is handed back unparsed instead of
/// being treated as a hard failure.
pub fn parse_outcome(text: &str) -> Result<AnalysisOutcome, PlateCheckError> {
    if let Some(value) = extract_json(text) {
        if let Some(message) = value.get("error").and_then(|e| e.as_str()) {
            return Err(PlateCheckError::NoFood(message.to_string()));
        }
        return match serde_json::from_value::<PlateReport>(value) {
            Ok(report) => Ok(AnalysisOutcome::Report(report)),
            Err(_) => Ok(AnalysisOutcome::Unstructured {
                raw_response: text.to_string(),
            }),
        };
    }

    let lowered = text.to_lowercase();
    if NEGATION_PHRASES.iter().any(|p| lowered.contains(p)) {
        return Err(PlateCheckError::NoFood(REFUSAL_MESSAGE.to_string()));
    }

    Ok(AnalysisOutcome::Unstructured {
        raw_response: text.to_string(),
    })
}

/// Fenced code block first, then the substring from the first `{` to the
/// last `}`.
fn extract_json(text: &str) -> Option<serde_json::Value> {
    if let Some(inner) = fenced_block(text) {
        if let Ok(value) = serde_json::from_str(inner) {
            return Some(value);
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if start >= end {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    // Skip the language tag line, if any.
    let body = &after[after.find('\n')? + 1..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}
