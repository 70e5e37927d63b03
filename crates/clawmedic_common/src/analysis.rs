//! Externally visible records: analysis results and fix feedback.

use crate::catalog::Severity;
use crate::detector::DetectionResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summary view of a detection (fix text stripped)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownIssue {
    pub id: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
}

impl From<&DetectionResult> for KnownIssue {
    fn from(r: &DetectionResult) -> Self {
        Self {
            id: r.id.clone(),
            severity: r.severity,
            title: r.title.clone(),
            description: r.description.clone(),
        }
    }
}

/// Result of one diagnose call. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub fix_id: String,
    pub timestamp: DateTime<Utc>,
    /// Catalog matches plus AI-reported issues
    pub issues_found: usize,
    pub known_issues: Vec<KnownIssue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ai_issues: Vec<String>,
    /// AI summary, or the pattern-only fallback
    pub analysis: String,
    pub fix_script: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_insights: Option<String>,
    /// Set when the AI pass degraded
    #[serde(default)]
    pub partial: bool,
}

impl AnalysisResult {
    pub fn issue_ids(&self) -> Vec<String> {
        self.known_issues.iter().map(|i| i.id.clone()).collect()
    }
}

/// User-reported outcome after running a fix script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub success: bool,
    #[serde(default)]
    pub remaining_issues: u32,
}
