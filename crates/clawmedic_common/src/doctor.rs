//! Doctor - the diagnose / retrieve / feedback pipeline
//!
//! `diagnose` flow:
//! 1. Validate the payload (`system` must be present). Rejection happens
//!    before any rule or the augmentor runs and stores nothing.
//! 2. Run the detector (synchronous, in memory).
//! 3. One augmentor call bounded by `ai_timeout`. Any failure degrades to
//!    the pattern-only summary.
//! 4. Compose the fix script, build the `AnalysisResult`.
//! 5. Insert into the Result Store, then write to the ledger (best effort).
//!
//! Only invalid input is ever returned as an error from `diagnose`.

use crate::analysis::{AnalysisResult, Feedback, KnownIssue};
use crate::augmentor::{AiAnalysis, AugmentError, Augmentor};
use crate::catalog::Catalog;
use crate::composer;
use crate::detector::{self, DetectionResult};
use crate::error::DoctorError;
use crate::ledger::{FixLedger, IssueStats};
use crate::payload::Payload;
use crate::store::ResultStore;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Default upper bound on the augmentor call
pub const DEFAULT_AI_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Doctor {
    catalog: Catalog,
    augmentor: Arc<dyn Augmentor>,
    store: Arc<RwLock<ResultStore>>,
    ledger: Option<Arc<dyn FixLedger>>,
    ai_timeout: Duration,
}

impl Doctor {
    /// Doctor with the standard catalog and no ledger
    pub fn new(augmentor: Arc<dyn Augmentor>, store: Arc<RwLock<ResultStore>>) -> Self {
        Self {
            catalog: Catalog::standard(),
            augmentor,
            store,
            ledger: None,
            ai_timeout: DEFAULT_AI_TIMEOUT,
        }
    }

    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn FixLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_ai_timeout(mut self, timeout: Duration) -> Self {
        self.ai_timeout = timeout;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<RwLock<ResultStore>> {
        &self.store
    }

    pub fn has_ledger(&self) -> bool {
        self.ledger.is_some()
    }

    // ========================================================================
    // Diagnose
    // ========================================================================

    pub async fn diagnose(&self, raw: Value) -> Result<AnalysisResult, DoctorError> {
        let payload = Payload::from_value(raw).map_err(|e| {
            info!("Rejected payload: {}", e);
            e
        })?;

        let detections = detector::detect(&self.catalog, &payload);
        let known_ids: Vec<String> = detections.iter().map(|d| d.id.clone()).collect();

        let (ai, partial) = self.augment(&payload, &known_ids).await;

        let fix_id = uuid::Uuid::new_v4().to_string();
        let result = build_result(fix_id, &detections, ai, partial);

        info!(
            "Diagnosis {}: {} known issue(s), {} AI issue(s){}",
            result.fix_id,
            result.known_issues.len(),
            result.ai_issues.len(),
            if result.partial { ", AI pass degraded" } else { "" }
        );

        if let Some(evicted) = self.store.write().await.insert(result.clone()) {
            debug!("Evicted {} from result store", evicted);
        }
        self.persist(&result).await;

        Ok(result)
    }

    /// Single best-effort augmentor call. Returns the analysis and whether it
    /// degraded because of a fault (a disabled augmentor is not a fault).
    async fn augment(&self, payload: &Payload, known_ids: &[String]) -> (AiAnalysis, bool) {
        let call = self.augmentor.analyze(payload, known_ids);

        match tokio::time::timeout(self.ai_timeout, call).await {
            Ok(Ok(analysis)) => (analysis, false),
            Ok(Err(AugmentError::Disabled)) => {
                debug!("AI augmentor disabled, using pattern-only summary");
                (AiAnalysis::degraded(known_ids.len()), false)
            }
            Ok(Err(e)) => {
                warn!("AI augmentor '{}' failed: {}", self.augmentor.name(), e);
                (AiAnalysis::degraded(known_ids.len()), true)
            }
            Err(_) => {
                warn!(
                    "AI augmentor '{}' timed out after {:?}",
                    self.augmentor.name(),
                    self.ai_timeout
                );
                (AiAnalysis::degraded(known_ids.len()), true)
            }
        }
    }

    async fn persist(&self, result: &AnalysisResult) {
        let Some(ledger) = self.ledger.clone() else {
            return;
        };
        let record = result.clone();

        match tokio::task::spawn_blocking(move || ledger.record_analysis(&record)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Ledger write failed for {}: {:#}", result.fix_id, e),
            Err(e) => error!("Ledger task failed for {}: {}", result.fix_id, e),
        }
    }

    // ========================================================================
    // Retrieval
    // ========================================================================

    /// Look up a stored result, falling back to the ledger on a cache miss
    pub async fn fetch(&self, fix_id: &str) -> Result<AnalysisResult, DoctorError> {
        if let Some(hit) = self.store.read().await.get(fix_id) {
            return Ok(hit.clone());
        }

        let Some(ledger) = self.ledger.clone() else {
            return Err(DoctorError::NotFound(fix_id.to_string()));
        };

        let id = fix_id.to_string();
        match tokio::task::spawn_blocking(move || ledger.find_analysis(&id)).await {
            Ok(Ok(Some(result))) => Ok(result),
            Ok(Ok(None)) => Err(DoctorError::NotFound(fix_id.to_string())),
            Ok(Err(e)) => {
                error!("Ledger lookup failed for {}: {:#}", fix_id, e);
                Err(DoctorError::Storage("ledger unavailable".to_string()))
            }
            Err(e) => {
                error!("Ledger task failed for {}: {}", fix_id, e);
                Err(DoctorError::Storage("ledger unavailable".to_string()))
            }
        }
    }

    // ========================================================================
    // Feedback and stats
    // ========================================================================

    pub async fn record_feedback(&self, fix_id: &str, feedback: Feedback) -> Result<(), DoctorError> {
        let cached = self.store.read().await.get(fix_id).cloned();

        let Some(ledger) = self.ledger.clone() else {
            return match cached {
                Some(_) => {
                    info!(
                        "Feedback for {} (success={}) not persisted: no ledger configured",
                        fix_id, feedback.success
                    );
                    Ok(())
                }
                None => Err(DoctorError::NotFound(fix_id.to_string())),
            };
        };

        let id = fix_id.to_string();
        let outcome = tokio::task::spawn_blocking(move || -> anyhow::Result<bool> {
            if ledger.record_feedback(&id, &feedback)? {
                return Ok(true);
            }
            // The analysis may have missed the ledger earlier; backfill it
            match cached {
                Some(result) => {
                    ledger.record_analysis(&result)?;
                    ledger.record_feedback(&id, &feedback)
                }
                None => Ok(false),
            }
        })
        .await;

        match outcome {
            Ok(Ok(true)) => {
                info!("Recorded feedback for {}: success={}", fix_id, feedback.success);
                Ok(())
            }
            Ok(Ok(false)) => Err(DoctorError::NotFound(fix_id.to_string())),
            Ok(Err(e)) => {
                error!("Ledger feedback write failed for {}: {:#}", fix_id, e);
                Err(DoctorError::Storage("ledger unavailable".to_string()))
            }
            Err(e) => {
                error!("Ledger task failed for {}: {}", fix_id, e);
                Err(DoctorError::Storage("ledger unavailable".to_string()))
            }
        }
    }

    /// Per-issue counters; empty without a ledger
    pub async fn issue_stats(&self) -> Result<Vec<IssueStats>, DoctorError> {
        let Some(ledger) = self.ledger.clone() else {
            return Ok(Vec::new());
        };

        match tokio::task::spawn_blocking(move || ledger.issue_stats()).await {
            Ok(Ok(stats)) => Ok(stats),
            Ok(Err(e)) => {
                error!("Ledger stats query failed: {:#}", e);
                Err(DoctorError::Storage("ledger unavailable".to_string()))
            }
            Err(e) => {
                error!("Ledger task failed: {}", e);
                Err(DoctorError::Storage("ledger unavailable".to_string()))
            }
        }
    }
}

/// Assemble the immutable result record
fn build_result(
    fix_id: String,
    detections: &[DetectionResult],
    ai: AiAnalysis,
    partial: bool,
) -> AnalysisResult {
    let timestamp = Utc::now();
    let fix_script = composer::compose(detections, &ai, &fix_id, timestamp);

    let insights = ai.insights.trim();
    let ai_insights = (!insights.is_empty()).then(|| insights.to_string());

    AnalysisResult {
        issues_found: detections.len() + ai.issues.len(),
        known_issues: detections.iter().map(KnownIssue::from).collect(),
        ai_issues: ai.issues,
        analysis: ai.summary,
        fix_script,
        ai_insights,
        partial,
        fix_id,
        timestamp,
    }
}
