use crate::scorer::AcceptReason;
use crate::submit::SubmissionReport;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Decoded text of one captured image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub text: String,

    /// Mean of the per-step maximum class probability, in [0, 1]
    pub confidence: f32,

    /// Set when the confidence is below the configured threshold or the text is empty
    pub low_confidence: bool,
}

/// One line of the metadata store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRecord {
    /// Image file name inside the capture directory
    pub filename: String,
    pub url: String,
    pub page_title: String,
    pub timestamp: DateTime<Local>,

    /// Locator stage tag (`visible`, `scroll`, `consent`, `iframe:N`)
    pub stage: String,
    pub reason: AcceptReason,
    pub width: u32,
    pub height: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<Prediction>,

    /// Answer typed into the page, when one was submitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,

    /// Whether the page accepted `solution`; absent when the outcome was unclear
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

/// Outcome of a locate-and-capture visit
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VisitReport {
    Captured { url: String, record: CaptureRecord },
    NotFound { url: String },
    Failed { url: String, error: String },
}

impl VisitReport {
    pub fn url(&self) -> &str {
        match self {
            VisitReport::Captured { url, .. }
            | VisitReport::NotFound { url }
            | VisitReport::Failed { url, .. } => url,
        }
    }
}

/// Answer returned for a solve request
#[derive(Debug, Clone, Serialize)]
pub struct SolveReport {
    pub url: String,
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub low_confidence: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission: Option<SubmissionReport>,
    pub duration_secs: f64,
}

/// Counters over a sequential run of visits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub found: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn add(&mut self, report: &VisitReport) {
        self.processed += 1;
        match report {
            VisitReport::Captured { .. } => self.found += 1,
            VisitReport::NotFound { .. } => {}
            VisitReport::Failed { .. } => self.failed += 1,
        }
    }
}
