// src/session.rs
//
// The single-plate analysis workflow. All workflow state lives in one
// tagged enum so contradictory combinations (analyzing while editing,
// dirty without a result) cannot be represented.
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::PlateCheckError;
use crate::models::{AnalysisOutcome, AnalysisRequest, EncodedImage, FoodEdit};

#[derive(Debug)]
pub enum Phase {
    Empty,
    Selected {
        image: EncodedImage,
    },
    Analyzing {
        image: EncodedImage,
        resume: Resume,
    },
    Result {
        image: EncodedImage,
        outcome: AnalysisOutcome,
        foods: Vec<String>,
        dirty: bool,
    },
}

/// Where a failed upstream call falls back to.
#[derive(Debug)]
pub enum Resume {
    /// First analysis of a photo: fall back to `Selected`, keeping the
    /// image so the user can retry without re-picking it.
    Fresh,
    /// Re-analysis of an edited food list: fall back to the previous
    /// result with the edits still marked unsubmitted.
    Edited {
        outcome: AnalysisOutcome,
        foods: Vec<String>,
    },
}

#[derive(Debug)]
pub struct Session {
    id: Uuid,
    started_at: DateTime<Utc>,
    phase: Phase,
    error: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            phase: Phase::Empty,
            error: None,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        matches!(self.phase, Phase::Result { dirty: true, .. })
    }

    pub fn food_items(&self) -> &[String] {
        match &self.phase {
            Phase::Result { foods, .. } => foods,
            _ => &[],
        }
    }

    /// Stores a freshly normalized photo, replacing any prior image,
    /// result, and error. Rejected while an upstream call is outstanding.
    pub fn select(&mut self, image: EncodedImage) -> Result<(), PlateCheckError> {
        if matches!(self.phase, Phase::Analyzing { .. }) {
            return Err(PlateCheckError::SessionState("analysis in progress"));
        }
        self.phase = Phase::Selected { image };
        self.error = None;
        Ok(())
    }

    /// Moves `Selected` to `Analyzing` and yields the image request to
    /// send upstream. The caller is expected to come back with
    /// [`Session::finish`].
    pub fn begin_analysis(&mut self) -> Result<AnalysisRequest, PlateCheckError> {
        match std::mem::replace(&mut self.phase, Phase::Empty) {
            Phase::Selected { image } => {
                let request = AnalysisRequest::Image {
                    data: image.data.clone(),
                    media_type: image.media_type.clone(),
                };
                self.phase = Phase::Analyzing {
                    image,
                    resume: Resume::Fresh,
                };
                self.error = None;
                Ok(request)
            }
            other => {
                self.phase = other;
                Err(self.busy_or("no image selected"))
            }
        }
    }

    /// Moves `Result` to `Analyzing` with a food-list request. An empty
    /// food list is a guarded no-op: `Ok(None)`, nothing changes and no
    /// request is produced.
    pub fn begin_reanalysis(&mut self) -> Result<Option<AnalysisRequest>, PlateCheckError> {
        match std::mem::replace(&mut self.phase, Phase::Empty) {
            Phase::Result {
                image,
                outcome,
                foods,
                dirty,
            } => {
                if foods.is_empty() {
                    self.phase = Phase::Result {
                        image,
                        outcome,
                        foods,
                        dirty,
                    };
                    return Ok(None);
                }
                let request = AnalysisRequest::FoodList(foods.clone());
                self.phase = Phase::Analyzing {
                    image,
                    resume: Resume::Edited { outcome, foods },
                };
                self.error = None;
                Ok(Some(request))
            }
            other => {
                self.phase = other;
                Err(self.busy_or("no analysis to update"))
            }
        }
    }

    /// Lands the upstream result. On success the editable food list is
    /// reseeded from whatever list came back (falling back to the
    /// submitted list when a raw-text reply echoes nothing); on failure
    /// the session reverts to its pre-call phase and keeps the message
    /// for display.
    pub fn finish(
        &mut self,
        result: Result<AnalysisOutcome, PlateCheckError>,
    ) -> Result<(), PlateCheckError> {
        match std::mem::replace(&mut self.phase, Phase::Empty) {
            Phase::Analyzing { image, resume } => {
                match result {
                    Ok(outcome) => {
                        let foods = match (&outcome, resume) {
                            (AnalysisOutcome::Report(report), _) => report.food_items.clone(),
                            (AnalysisOutcome::Unstructured { .. }, Resume::Edited { foods, .. }) => {
                                foods
                            }
                            (AnalysisOutcome::Unstructured { .. }, Resume::Fresh) => Vec::new(),
                        };
                        self.phase = Phase::Result {
                            image,
                            outcome,
                            foods,
                            dirty: false,
                        };
                        self.error = None;
                    }
                    Err(e) => {
                        self.error = Some(e.to_string());
                        self.phase = match resume {
                            Resume::Fresh => Phase::Selected { image },
                            Resume::Edited { outcome, foods } => Phase::Result {
                                image,
                                outcome,
                                foods,
                                dirty: true,
                            },
                        };
                    }
                }
                Ok(())
            }
            other => {
                self.phase = other;
                Err(PlateCheckError::SessionState("no analysis in progress"))
            }
        }
    }

    /// Applies one food-list edit. Rename and append values are trimmed;
    /// blank values and out-of-range indexes are no-ops that leave the
    /// dirty flag alone. The stored report stays untouched until the list
    /// is re-submitted.
    pub fn edit_food(&mut self, edit: FoodEdit) -> Result<(), PlateCheckError> {
        match &mut self.phase {
            Phase::Result { foods, dirty, .. } => {
                let changed = match edit {
                    FoodEdit::Rename { index, value } => {
                        let value = value.trim();
                        match foods.get_mut(index) {
                            Some(slot) if !value.is_empty() => {
                                *slot = value.to_string();
                                true
                            }
                            _ => false,
                        }
                    }
                    FoodEdit::Delete { index } => {
                        if index < foods.len() {
                            foods.remove(index);
                            true
                        } else {
                            false
                        }
                    }
                    FoodEdit::Append { value } => {
                        let value = value.trim();
                        if value.is_empty() {
                            false
                        } else {
                            foods.push(value.to_string());
                            true
                        }
                    }
                };
                if changed {
                    *dirty = true;
                }
                Ok(())
            }
            Phase::Analyzing { .. } => Err(PlateCheckError::SessionState("analysis in progress")),
            _ => Err(PlateCheckError::SessionState("no analysis to edit")),
        }
    }

    /// Discards everything and starts a fresh session. Idempotent.
    pub fn reset(&mut self) {
        *self = Session::new();
    }

    pub fn view(&self) -> SessionView {
        let (phase, image, food_items, dirty, analysis) = match &self.phase {
            Phase::Empty => ("empty", None, Vec::new(), false, None),
            Phase::Selected { image } => ("selected", Some(image), Vec::new(), false, None),
            Phase::Analyzing { image, .. } => ("analyzing", Some(image), Vec::new(), false, None),
            Phase::Result {
                image,
                outcome,
                foods,
                dirty,
            } => ("result", Some(image), foods.clone(), *dirty, Some(outcome.clone())),
        };
        SessionView {
            id: self.id,
            started_at: self.started_at,
            phase,
            image: image.map(ImageInfo::from),
            food_items,
            dirty,
            analysis,
            error: self.error.clone(),
        }
    }

    fn busy_or(&self, message: &'static str) -> PlateCheckError {
        match self.phase {
            Phase::Analyzing { .. } => PlateCheckError::SessionState("analysis in progress"),
            _ => PlateCheckError::SessionState(message),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// What the HTTP surface exposes about the session.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub phase: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageInfo>,
    pub food_items: Vec<String>,
    pub dirty: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    pub media_type: String,
    pub size_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<(u32, u32)>,
}

impl From<&EncodedImage> for ImageInfo {
    fn from(image: &EncodedImage) -> Self {
        Self {
            media_type: image.media_type.clone(),
            size_bytes: image.data.len(),
            dimensions: image.dimensions,
        }
    }
}
