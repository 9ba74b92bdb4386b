// src/models.rs
use serde::{Deserialize, Serialize};

/// A photo after intake normalization, ready to be sent upstream.
///
/// `dimensions` is `None` when the original bytes could not be decoded and
/// were passed through unmodified.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub media_type: String,
    pub dimensions: Option<(u32, u32)>,
}

/// Macro percentages as asserted by the model. Stored verbatim; the model
/// claims they sum to 100 and we do not re-normalize.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MacroEstimate {
    pub protein: f32,
    pub carbs: f32,
    pub fats: f32,
}

/// Pyramid rubric grades. The quality labels are free text under the
/// model's control, so they stay opaque strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PyramidScore {
    pub overall: f32,
    pub protein_quality: String,
    pub vegetable_score: String,
    pub grain_quality: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Feedback {
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
}

/// Stars are intended to be 1-5 but arrive from the model unclamped.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KidFriendlyScore {
    pub emoji: String,
    pub message: String,
    pub stars: u8,
}

/// The structured scorecard the model is prompted to return. Every field
/// defaults when absent so a partial response still parses.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PlateReport {
    pub food_items: Vec<String>,
    pub macro_estimate: MacroEstimate,
    pub pyramid_score: PyramidScore,
    pub feedback: Feedback,
    pub kid_friendly_score: KidFriendlyScore,
}

/// What an analysis call produced: the expected scorecard, or the model's
/// raw text when it answered with something that is not the expected shape.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum AnalysisOutcome {
    Report(PlateReport),
    Unstructured {
        #[serde(rename = "rawResponse")]
        raw_response: String,
    },
}

/// One of the two mutually exclusive upstream request shapes.
#[derive(Debug, Clone)]
pub enum AnalysisRequest {
    Image { data: Vec<u8>, media_type: String },
    FoodList(Vec<String>),
}

/// Body of `POST /api/v1/analyze-plate`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyzePlateRequest {
    pub image: Option<String>,
    pub media_type: Option<String>,
    pub food_items: Option<Vec<String>>,
}

/// One edit to the session's food list.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FoodEdit {
    Rename { index: usize, value: String },
    Delete { index: usize },
    Append { value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plate_report_parses_full_response() {
        let report: PlateReport = serde_json::from_value(json!({
            "foodItems": ["grilled chicken", "broccoli", "brown rice"],
            "macroEstimate": { "protein": 40, "carbs": 35, "fats": 25 },
            "pyramidScore": {
                "overall": 82,
                "proteinQuality": "good",
                "vegetableScore": "needs improvement",
                "grainQuality": "good"
            },
            "feedback": {
                "strengths": ["Good protein source"],
                "improvements": ["Add more colorful vegetables"]
            },
            "kidFriendlyScore": {
                "emoji": "🌟",
                "message": "Great Protein!",
                "stars": 4
            }
        }))
        .unwrap();

        assert_eq!(
            report.food_items,
            vec!["grilled chicken", "broccoli", "brown rice"]
        );
        assert_eq!(report.macro_estimate.protein, 40.0);
        assert_eq!(report.macro_estimate.carbs, 35.0);
        assert_eq!(report.macro_estimate.fats, 25.0);
        assert_eq!(report.pyramid_score.overall, 82.0);
        assert_eq!(report.pyramid_score.vegetable_score, "needs improvement");
        assert_eq!(report.kid_friendly_score.stars, 4);
    }

    #[test]
    fn plate_report_defaults_missing_fields() {
        let report: PlateReport = serde_json::from_value(json!({
            "foodItems": ["toast"]
        }))
        .unwrap();

        assert_eq!(report.food_items, vec!["toast"]);
        assert_eq!(report.macro_estimate, MacroEstimate::default());
        assert_eq!(report.kid_friendly_score.stars, 0);
        assert!(report.feedback.strengths.is_empty());
    }

    #[test]
    fn outcome_serializes_flat_or_as_raw_response() {
        let report = AnalysisOutcome::Report(PlateReport {
            food_items: vec!["eggs".to_string()],
            ..PlateReport::default()
        });
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["foodItems"][0], "eggs");
        assert!(value.get("rawResponse").is_none());

        let raw = AnalysisOutcome::Unstructured {
            raw_response: "not json".to_string(),
        };
        let value = serde_json::to_value(&raw).unwrap();
        assert_eq!(value["rawResponse"], "not json");
    }

    #[test]
    fn food_edit_deserializes_tagged_ops() {
        let edit: FoodEdit =
            serde_json::from_value(json!({ "op": "rename", "index": 1, "value": "oatmeal" }))
                .unwrap();
        assert!(matches!(edit, FoodEdit::Rename { index: 1, .. }));

        let edit: FoodEdit = serde_json::from_value(json!({ "op": "delete", "index": 0 })).unwrap();
        assert!(matches!(edit, FoodEdit::Delete { index: 0 }));

        let edit: FoodEdit =
            serde_json::from_value(json!({ "op": "append", "value": "juice" })).unwrap();
        assert!(matches!(edit, FoodEdit::Append { .. }));
    }
}
