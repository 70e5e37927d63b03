//! One-shot CLI commands (everything except `serve`)

use crate::config::Config;
use crate::server::build_doctor;
use anyhow::{Context, Result};
use clawmedic_common::catalog::Catalog;
use clawmedic_common::ledger::{FixLedger, SqliteLedger};
use clawmedic_common::AnalysisResult;
use std::path::Path;

/// Diagnose a payload file offline. Nothing is written to the ledger.
pub async fn diagnose(mut config: Config, file: &Path, json: bool) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let raw: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;

    config.ledger.enabled = false;
    let doctor = build_doctor(&config)?;
    let result = doctor.diagnose(raw).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        eprintln!("{}", summary_line(&result));
        print!("{}", result.fix_script);
    }
    Ok(())
}

fn summary_line(result: &AnalysisResult) -> String {
    let ids = result.issue_ids();
    let listed = if ids.is_empty() {
        "none".to_string()
    } else {
        ids.join(", ")
    };
    format!(
        "Fix {}: {} issue(s) [{}]{}",
        result.fix_id,
        result.issues_found,
        listed,
        if result.partial { " (AI pass degraded)" } else { "" }
    )
}

/// Print the built-in catalog
pub fn catalog() -> Result<()> {
    let catalog = Catalog::standard();
    println!("{:<24} {:<9} {:<7} TITLE", "ID", "SEVERITY", "CONFIG");
    for def in catalog.iter() {
        println!(
            "{:<24} {:<9} {:<7} {}",
            def.id,
            def.severity,
            if def.touches_config { "yes" } else { "no" },
            def.title
        );
    }
    Ok(())
}

/// Print per-issue counters from the ledger
pub fn stats(config: &Config) -> Result<()> {
    let ledger = SqliteLedger::open_at(&config.ledger.path)?;
    let stats = ledger.issue_stats()?;

    if stats.is_empty() {
        println!("No analyses recorded in {}", config.ledger.path);
        return Ok(());
    }

    println!("{:<24} {:>9} {:>6}", "ISSUE", "DETECTED", "FIXED");
    for s in stats {
        println!("{:<24} {:>9} {:>6}", s.issue_id, s.times_detected, s.times_fixed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_summary_line() {
        let result = AnalysisResult {
            fix_id: "f1".into(),
            timestamp: Utc::now(),
            issues_found: 0,
            known_issues: vec![],
            ai_issues: vec![],
            analysis: String::new(),
            fix_script: String::new(),
            ai_insights: None,
            partial: true,
        };
        assert_eq!(summary_line(&result), "Fix f1: 0 issue(s) [none] (AI pass degraded)");
    }

    #[tokio::test]
    async fn test_offline_diagnose_rejects_missing_system() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("payload.json");
        std::fs::write(&path, r#"{"config": {}}"#).unwrap();

        let err = diagnose(Config::default(), &path, true).await.unwrap_err();
        assert!(err.to_string().contains("system"));
    }
}
