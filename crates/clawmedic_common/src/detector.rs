//! Issue Detector - evaluates the catalog against one payload
//!
//! Every rule goes through [`evaluate_safely`]. A rule that returns a
//! `FieldError` or panics counts as "not detected" and never affects the
//! evaluation of its siblings. Output keeps catalog order; severity ordering
//! is not applied here.
//!
//! Pure read operation: no I/O, no shared state.

use crate::catalog::{Catalog, IssueDefinition, Severity};
use crate::payload::Payload;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

/// A matched issue definition, rendered for one payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub id: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub fix: String,
    #[serde(default)]
    pub touches_config: bool,
}

impl DetectionResult {
    fn from_rule(rule: &IssueDefinition, fix: String) -> Self {
        Self {
            id: rule.id.to_string(),
            severity: rule.severity,
            title: rule.title.to_string(),
            description: rule.description.to_string(),
            fix,
            touches_config: rule.touches_config,
        }
    }
}

/// Outcome of running a single rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    Matched,
    NotMatched,
    /// Predicate failed; treated as not matched
    Faulted,
}

/// Run `f`, mapping both `Err` and panics to `None`.
///
/// This is the single fault-isolation point for rule code.
fn guarded<T, E: std::fmt::Display>(
    rule_id: &str,
    stage: &str,
    f: impl FnOnce() -> Result<T, E>,
) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!("Rule {} {} fault: {}", rule_id, stage, e);
            None
        }
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic".to_string());
            warn!("Rule {} {} panicked: {}", rule_id, stage, msg);
            None
        }
    }
}

/// Evaluate one rule's predicate, defaulting to non-match on any failure
pub fn evaluate_safely(rule: &IssueDefinition, payload: &Payload) -> RuleOutcome {
    match guarded(rule.id, "predicate", || (rule.detect)(payload)) {
        Some(true) => RuleOutcome::Matched,
        Some(false) => RuleOutcome::NotMatched,
        None => RuleOutcome::Faulted,
    }
}

/// Evaluate the whole catalog in declaration order
pub fn detect(catalog: &Catalog, payload: &Payload) -> Vec<DetectionResult> {
    let mut results = Vec::new();
    let mut faulted = 0usize;

    for rule in catalog.iter() {
        match evaluate_safely(rule, payload) {
            RuleOutcome::Matched => {
                // A fix generator that fails drops the issue rather than
                // emitting a block with no body
                match guarded(rule.id, "fix", || Ok::<_, String>((rule.fix)())) {
                    Some(fix) => {
                        debug!("Rule {} matched", rule.id);
                        results.push(DetectionResult::from_rule(rule, fix));
                    }
                    None => faulted += 1,
                }
            }
            RuleOutcome::NotMatched => {}
            RuleOutcome::Faulted => faulted += 1,
        }
    }

    debug!(
        "Detection complete: {} matched, {} faulted, {} rules",
        results.len(),
        faulted,
        catalog.len()
    );
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldError;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> Payload {
        Payload::from_value(value).unwrap()
    }

    fn always(_: &Payload) -> Result<bool, FieldError> {
        Ok(true)
    }

    fn never(_: &Payload) -> Result<bool, FieldError> {
        Ok(false)
    }

    fn fails(_: &Payload) -> Result<bool, FieldError> {
        Err(FieldError {
            path: "config".to_string(),
            expected: "object",
            found: "string",
        })
    }

    fn explodes(_: &Payload) -> Result<bool, FieldError> {
        panic!("rule bug")
    }

    fn fix_text() -> String {
        "echo fix".to_string()
    }

    fn broken_fix() -> String {
        panic!("fix bug")
    }

    fn def(id: &'static str, severity: Severity, detect: crate::catalog::DetectFn) -> IssueDefinition {
        IssueDefinition {
            id,
            severity,
            title: "t",
            description: "d",
            detect,
            fix: fix_text,
            touches_config: false,
        }
    }

    #[test]
    fn test_evaluate_safely_outcomes() {
        let p = payload(json!({"system": {}}));
        assert_eq!(evaluate_safely(&def("a", Severity::Low, always), &p), RuleOutcome::Matched);
        assert_eq!(evaluate_safely(&def("b", Severity::Low, never), &p), RuleOutcome::NotMatched);
        assert_eq!(evaluate_safely(&def("c", Severity::Low, fails), &p), RuleOutcome::Faulted);
        assert_eq!(evaluate_safely(&def("d", Severity::Low, explodes), &p), RuleOutcome::Faulted);
    }

    #[test]
    fn test_faulty_rules_do_not_affect_siblings() {
        let p = payload(json!({"system": {}}));
        let with_faults = Catalog::new(vec![
            def("first", Severity::Low, always),
            def("boom", Severity::Critical, explodes),
            def("err", Severity::High, fails),
            def("last", Severity::Medium, always),
        ])
        .unwrap();
        let without = Catalog::new(vec![
            def("first", Severity::Low, always),
            def("last", Severity::Medium, always),
        ])
        .unwrap();

        assert_eq!(detect(&with_faults, &p), detect(&without, &p));
    }

    #[test]
    fn test_output_keeps_catalog_order_not_severity() {
        let p = payload(json!({"system": {}}));
        let catalog = Catalog::new(vec![
            def("low", Severity::Low, always),
            def("critical", Severity::Critical, always),
            def("medium", Severity::Medium, always),
        ])
        .unwrap();
        let ids: Vec<_> = detect(&catalog, &p).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["low", "critical", "medium"]);
    }

    #[test]
    fn test_panicking_fix_drops_only_that_issue() {
        let p = payload(json!({"system": {}}));
        let mut bad = def("bad-fix", Severity::High, always);
        bad.fix = broken_fix;
        let catalog = Catalog::new(vec![bad, def("ok", Severity::Low, always)]).unwrap();
        let results = detect(&catalog, &p);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "ok");
        assert_eq!(results[0].fix, "echo fix");
    }

    #[test]
    fn test_detection_is_deterministic() {
        let p = payload(json!({
            "system": {"nodeVersion": "v18.0.0"},
            "logs": {"errors": "EADDRINUSE"}
        }));
        let catalog = Catalog::standard();
        let first = detect(&catalog, &p);
        for _ in 0..5 {
            assert_eq!(detect(&catalog, &p), first);
        }
    }

    #[test]
    fn test_malformed_branch_only_silences_its_rules() {
        // `logs` is a string: every log-based rule faults, config rules still run
        let p = payload(json!({
            "system": {},
            "logs": "garbage",
            "config": {"plugins": {"entries": {"mem0": {"config": {"enableGraph": true}}}}}
        }));
        let ids: Vec<_> = detect(&Catalog::standard(), &p).into_iter().map(|r| r.id).collect();
        assert!(ids.contains(&"mem0-graph-free".to_string()));
        assert!(!ids.contains(&"port-conflict".to_string()));
        assert!(ids.contains(&"no-memory-flush".to_string()));
    }
}
