pub mod capture;
pub mod config;
pub mod decoder;
pub mod error;
pub mod locator;
pub mod pipeline;
pub mod results;
pub mod scorer;
pub mod submit;
pub mod utils;

// Re-export commonly used types for convenience
pub use config::AppConfig;
pub use decoder::{Decoder, DecoderArtifacts};
pub use locator::{LocateOutcome, Locator, Stage};
pub use pipeline::Pipeline;
pub use results::{BatchSummary, CaptureRecord, Prediction, SolveReport, VisitReport};
pub use scorer::{CandidateScorer, Verdict};
pub use submit::{SubmissionReport, Submitter};
