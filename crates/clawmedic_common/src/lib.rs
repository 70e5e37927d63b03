//! ClawMedic Common - diagnostic engine for OpenClaw installations
//!
//! Pattern rules first, optional AI pass second, one idempotent fix script out.

pub mod analysis;
pub mod augmentor;
pub mod catalog;
pub mod composer;
pub mod detector;
pub mod doctor;
pub mod error;
pub mod ledger;
pub mod payload;
pub mod redact;
pub mod store;

pub use analysis::{AnalysisResult, Feedback, KnownIssue};
pub use augmentor::{AiAnalysis, AugmentError, Augmentor, AugmentorConfig};
pub use catalog::{Catalog, IssueDefinition, Severity};
pub use detector::DetectionResult;
pub use doctor::Doctor;
pub use error::DoctorError;
pub use ledger::{FixLedger, IssueStats, SqliteLedger};
pub use payload::Payload;
pub use store::ResultStore;
