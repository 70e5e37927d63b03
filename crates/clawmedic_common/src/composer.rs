//! Fix Script Composer - merges detections and AI fixes into one script
//!
//! Block order:
//! 1. header + backup (always)
//! 2. one block per detection, in detector (catalog) order
//! 3. AI-suggested fixes (only when non-blank)
//! 4. gateway restart (only when some fix changes `openclaw.json`)
//! 5. completion banner with the fix id (always)
//!
//! The output is a function of its inputs only. The timestamp is passed in.

use crate::augmentor::AiAnalysis;
use crate::detector::DetectionResult;
use chrono::{DateTime, SecondsFormat, Utc};

/// Substrings that mark a fix body as mutating the persisted configuration.
///
/// Catalog fixes declare this with `touches_config`; AI text has no flag, so
/// it is matched against these markers instead.
pub const CONFIG_MARKERS: &[&str] = &["openclaw.json", "config_set ", "$CONFIG"];

const DESCRIPTION_WIDTH: usize = 76;

/// Kinds of block in a fix script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Header,
    Issue,
    AiFixes,
    Restart,
    Completion,
}

/// One contiguous section of the script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptBlock {
    pub kind: BlockKind,
    pub text: String,
}

impl ScriptBlock {
    fn new(kind: BlockKind, text: String) -> Self {
        Self { kind, text }
    }
}

/// Defines `config_set <dotted.path> <json-value> [--keep]`.
///
/// Sets a value in `$CONFIG` only when it differs; `--keep` leaves an
/// existing non-empty value alone. Missing config file or node is a no-op.
const CONFIG_HELPER: &str = r##"config_set() {
  if [ ! -f "$CONFIG" ]; then
    echo "  $CONFIG not found, skipping $1"
    return 0
  fi
  if ! command -v node >/dev/null 2>&1; then
    echo "  node not found; set $1 = $2 in $CONFIG by hand"
    return 0
  fi
  node -e '
const fs = require("fs");
const [file, path, raw, flag] = process.argv.slice(1);
const cfg = JSON.parse(fs.readFileSync(file, "utf8"));
const keys = path.split(".");
let node = cfg;
for (const k of keys.slice(0, -1)) {
  if (typeof node[k] !== "object" || node[k] === null) node[k] = {};
  node = node[k];
}
const last = keys[keys.length - 1];
const value = JSON.parse(raw);
const current = node[last];
if (flag === "--keep" && current !== undefined && current !== null && current !== "") {
  console.log("  " + path + " already set, kept");
} else if (JSON.stringify(current) === JSON.stringify(value)) {
  console.log("  " + path + " already up to date");
} else {
  node[last] = value;
  fs.writeFileSync(file, JSON.stringify(cfg, null, 2) + "\n");
  console.log("  set " + path);
}' "$CONFIG" "$1" "$2" "${3:-}" || echo "  could not update $1; edit $CONFIG by hand"
}"##;

/// Single-line, comment-safe text
fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Wrap `text` into `# `-prefixed comment lines
fn comment_lines(text: &str) -> String {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > DESCRIPTION_WIDTH {
            lines.push(format!("# {}", current));
            current.clear();
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(format!("# {}", current));
    }

    lines.join("\n")
}

fn header_block(results: &[DetectionResult], ai: &AiAnalysis, fix_id: &str, generated_at: DateTime<Utc>) -> ScriptBlock {
    let ai_note = if ai.has_additional_fixes() {
        " (plus AI-suggested fixes)"
    } else {
        ""
    };

    let text = format!(
        r#"#!/usr/bin/env bash
# ============================================================
# ClawMedic fix script
# Fix ID:    {fix_id}
# Generated: {generated}
# Issues:    {count} known{ai_note}
#
# Review every step before running it:
#   bash clawmedic-fix.sh
# Nothing here runs automatically. Re-running is safe.
# ============================================================

CONFIG="$HOME/.openclaw/openclaw.json"
WORKSPACE="$HOME/.openclaw/workspace"

{helper}

# ---- Backup ----
echo "==> Backing up configuration"
if [ -f "$CONFIG" ]; then
  BACKUP="$CONFIG.clawmedic-{fix_id}.bak"
  if [ ! -f "$BACKUP" ]; then
    cp "$CONFIG" "$BACKUP" && echo "  Saved $BACKUP"
  else
    echo "  Backup already exists: $BACKUP"
  fi
else
  echo "  No configuration at $CONFIG, nothing to back up"
fi
"#,
        fix_id = fix_id,
        generated = generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        count = results.len(),
        ai_note = ai_note,
        helper = CONFIG_HELPER,
    );

    ScriptBlock::new(BlockKind::Header, text)
}

fn issue_block(result: &DetectionResult) -> ScriptBlock {
    let mut text = format!(
        "\n# ---- [{}] {} ----\n# id: {}\n",
        result.severity.label(),
        one_line(&result.title),
        one_line(&result.id)
    );
    let description = comment_lines(&result.description);
    if !description.is_empty() {
        text.push_str(&description);
        text.push('\n');
    }
    text.push_str(result.fix.trim_end());
    text.push('\n');

    ScriptBlock::new(BlockKind::Issue, text)
}

fn ai_block(ai: &AiAnalysis) -> ScriptBlock {
    let text = format!(
        "\n# ---- AI-suggested fixes (not from the ClawMedic catalog) ----\n\
         # Generated by an AI model. Review these with extra care.\n\
         echo \"==> Applying AI-suggested fixes\"\n\
         {}\n",
        ai.additional_fixes.trim_end()
    );
    ScriptBlock::new(BlockKind::AiFixes, text)
}

fn restart_block() -> ScriptBlock {
    let text = r#"
# ---- Restart ----
echo "==> Restarting the gateway to load the new configuration"
if command -v openclaw >/dev/null 2>&1; then
  openclaw gateway restart || true
else
  echo "  openclaw is not on PATH; restart the gateway manually"
fi
"#
    .to_string();
    ScriptBlock::new(BlockKind::Restart, text)
}

fn completion_block(fix_id: &str) -> ScriptBlock {
    let text = format!(
        r#"
echo ""
echo "==> ClawMedic fix complete"
echo "    Fix ID: {}"
"#,
        fix_id
    );
    ScriptBlock::new(BlockKind::Completion, text)
}

/// True when a fix changes the persisted configuration
pub fn needs_restart(results: &[DetectionResult], ai: &AiAnalysis) -> bool {
    let marked = |text: &str| CONFIG_MARKERS.iter().any(|m| text.contains(m));

    results.iter().any(|r| r.touches_config || marked(&r.fix))
        || (ai.has_additional_fixes() && marked(&ai.additional_fixes))
}

/// Build the ordered script blocks
pub fn compose_blocks(
    results: &[DetectionResult],
    ai: &AiAnalysis,
    fix_id: &str,
    generated_at: DateTime<Utc>,
) -> Vec<ScriptBlock> {
    let mut blocks = Vec::with_capacity(results.len() + 4);

    blocks.push(header_block(results, ai, fix_id, generated_at));
    blocks.extend(results.iter().map(issue_block));

    if ai.has_additional_fixes() {
        blocks.push(ai_block(ai));
    }

    if needs_restart(results, ai) {
        blocks.push(restart_block());
    }

    blocks.push(completion_block(fix_id));
    blocks
}

/// Compose the full fix script text
pub fn compose(
    results: &[DetectionResult],
    ai: &AiAnalysis,
    fix_id: &str,
    generated_at: DateTime<Utc>,
) -> String {
    compose_blocks(results, ai, fix_id, generated_at)
        .into_iter()
        .map(|b| b.text)
        .collect()
}
