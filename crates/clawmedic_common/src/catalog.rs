//! Issue Catalog - known OpenClaw failure patterns as first-class data
//!
//! Each entry pairs a pure detection predicate with a pure fix generator.
//! Predicates only read the payload through the fallible accessors in
//! [`crate::payload`], so a malformed branch surfaces as a `FieldError`
//! instead of a panic. Fix generators never look at the payload: they are
//! parameterized only by the constants below, which keeps every fix
//! reviewable on its own.
//!
//! Fix bodies run inside the script produced by [`crate::composer`], which
//! defines `$CONFIG`, `$WORKSPACE` and the `config_set` helper. Every body
//! must be safe to run twice.
//!
//! Adding a rule means appending an entry to `STANDARD_RULES`; the detector
//! and composer need no changes.

use crate::error::FieldError;
use crate::payload::Payload;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;
use thiserror::Error;

// ============================================================================
// Recommended values
// ============================================================================

/// Default OpenClaw gateway port
pub const GATEWAY_PORT: u16 = 18789;

/// Oldest supported Node.js major version
pub const MIN_NODE_MAJOR: u64 = 22;

/// Memory directory size past which recall slows down noticeably
pub const MAX_MEMORY_FILES: u64 = 200;

/// Memory notes older than this are archived by the bloat fix
pub const MEMORY_ARCHIVE_AFTER_DAYS: u32 = 30;

/// Free disk space below which the gateway starts failing writes
pub const MIN_DISK_FREE_MB: u64 = 1024;

/// Gateway logs older than this are removed by the disk fix
pub const LOG_RETENTION_DAYS: u32 = 7;

/// Heartbeats more frequent than this burn tokens for little benefit
pub const MIN_HEARTBEAT_MINUTES: u64 = 15;

pub const RECOMMENDED_HEARTBEAT: &str = "30m";

pub const RECOMMENDED_PRUNING_TTL: &str = "1h";

pub const RECOMMENDED_MAX_CONCURRENT: u64 = 2;

// ============================================================================
// Types
// ============================================================================

/// Issue severity, ordered `Critical > High > Medium > Low`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Tag used in fix script headers
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::High => write!(f, "high"),
            Severity::Medium => write!(f, "medium"),
            Severity::Low => write!(f, "low"),
        }
    }
}

/// Detection predicate: pure, may fail on unexpected payload shapes
pub type DetectFn = fn(&Payload) -> Result<bool, FieldError>;

/// Fix generator: pure shell fragment producer
pub type FixFn = fn() -> String;

/// A catalog entry
#[derive(Clone, Copy)]
pub struct IssueDefinition {
    /// Stable key, unique across the catalog
    pub id: &'static str,
    pub severity: Severity,
    pub title: &'static str,
    /// Human-facing rationale
    pub description: &'static str,
    pub detect: DetectFn,
    pub fix: FixFn,
    /// Fix mutates the persisted `openclaw.json`, so the gateway must restart
    pub touches_config: bool,
}

impl std::fmt::Debug for IssueDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssueDefinition")
            .field("id", &self.id)
            .field("severity", &self.severity)
            .field("title", &self.title)
            .field("touches_config", &self.touches_config)
            .finish_non_exhaustive()
    }
}

/// Catalog construction errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("duplicate issue id '{0}'")]
    DuplicateId(String),

    #[error("issue id must not be empty")]
    EmptyId,
}

/// Ordered, immutable set of issue definitions
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<IssueDefinition>,
}

impl Catalog {
    /// Build a catalog, rejecting empty or duplicate ids. Order is kept.
    pub fn new(entries: Vec<IssueDefinition>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if entry.id.is_empty() {
                return Err(CatalogError::EmptyId);
            }
            if !seen.insert(entry.id) {
                return Err(CatalogError::DuplicateId(entry.id.to_string()));
            }
        }
        Ok(Self { entries })
    }

    /// The built-in OpenClaw rule set
    pub fn standard() -> Self {
        Self {
            entries: STANDARD_RULES.to_vec(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &IssueDefinition> {
        self.entries.iter()
    }

    pub fn get(&self, id: &str) -> Option<&IssueDefinition> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::standard()
    }
}

// ============================================================================
// Standard rules (declaration order is the tie-break priority)
// ============================================================================

pub static STANDARD_RULES: &[IssueDefinition] = &[
    IssueDefinition {
        id: "mem0-graph-free",
        severity: Severity::Critical,
        title: "mem0 graph memory enabled on a free plan",
        description: "Graph memory is a paid mem0 feature. With enableGraph set, every memory \
                      write is rejected and the agent silently stops remembering.",
        detect: detect_mem0_graph,
        fix: fix_mem0_graph,
        touches_config: true,
    },
    IssueDefinition {
        id: "port-conflict",
        severity: Severity::Critical,
        title: "Gateway port already in use",
        description: "The gateway failed to bind its port (EADDRINUSE). Usually a stale gateway \
                      process from an earlier run is still holding it.",
        detect: detect_port_conflict,
        fix: fix_port_conflict,
        touches_config: false,
    },
    IssueDefinition {
        id: "auth-invalid",
        severity: Severity::Critical,
        title: "Model provider rejected the API key",
        description: "Requests fail with an authentication error. The configured key is missing, \
                      revoked, or shadowed by a stale environment variable.",
        detect: detect_auth_invalid,
        fix: fix_auth_invalid,
        touches_config: false,
    },
    IssueDefinition {
        id: "gateway-down",
        severity: Severity::High,
        title: "Gateway process is not running",
        description: "The OpenClaw gateway is stopped, so no channel can reach the agent.",
        detect: detect_gateway_down,
        fix: fix_gateway_down,
        touches_config: false,
    },
    IssueDefinition {
        id: "no-context-pruning",
        severity: Severity::High,
        title: "Context pruning is not configured",
        description: "Without pruning, old tool results stay in context forever, inflating cost \
                      per turn and triggering early compaction.",
        detect: detect_no_context_pruning,
        fix: fix_no_context_pruning,
        touches_config: true,
    },
    IssueDefinition {
        id: "no-memory-flush",
        severity: Severity::High,
        title: "Memory flush before compaction is disabled",
        description: "When the session compacts, anything not yet written to memory files is \
                      lost. A pre-compaction flush saves durable notes first.",
        detect: detect_no_memory_flush,
        fix: fix_no_memory_flush,
        touches_config: true,
    },
    IssueDefinition {
        id: "node-outdated",
        severity: Severity::High,
        title: "Node.js version is too old",
        description: "OpenClaw requires a current Node.js LTS. Older runtimes crash on startup or \
                      fail inside plugins.",
        detect: detect_node_outdated,
        fix: fix_node_outdated,
        touches_config: false,
    },
    IssueDefinition {
        id: "gateway-exposed",
        severity: Severity::High,
        title: "Gateway reachable from the network without a token",
        description: "The gateway binds to a non-loopback address but has no auth token, so \
                      anyone on the network can drive the agent.",
        detect: detect_gateway_exposed,
        fix: fix_gateway_exposed,
        touches_config: true,
    },
    IssueDefinition {
        id: "missing-soul",
        severity: Severity::Medium,
        title: "Workspace has no SOUL.md",
        description: "SOUL.md carries the agent's persona and boundaries. Without it the agent \
                      falls back to a generic voice on every session.",
        detect: detect_missing_soul,
        fix: fix_missing_soul,
        touches_config: false,
    },
    IssueDefinition {
        id: "missing-memory",
        severity: Severity::Medium,
        title: "Workspace has no memory files",
        description: "No memory notes exist, so nothing learned in one session survives to the \
                      next.",
        detect: detect_missing_memory,
        fix: fix_missing_memory,
        touches_config: false,
    },
    IssueDefinition {
        id: "memory-bloat",
        severity: Severity::Medium,
        title: "Too many memory files",
        description: "The memory directory has grown large enough to slow recall and crowd the \
                      context window.",
        detect: detect_memory_bloat,
        fix: fix_memory_bloat,
        touches_config: false,
    },
    IssueDefinition {
        id: "rate-limited",
        severity: Severity::Medium,
        title: "Model provider is rate limiting requests",
        description: "The provider answered with HTTP 429. Too many concurrent agent runs share \
                      one key.",
        detect: detect_rate_limited,
        fix: fix_rate_limited,
        touches_config: true,
    },
    IssueDefinition {
        id: "disk-low",
        severity: Severity::High,
        title: "Low free disk space",
        description: "The disk holding the OpenClaw home is nearly full. Session transcripts and \
                      memory writes will start failing.",
        detect: detect_disk_low,
        fix: fix_disk_low,
        touches_config: false,
    },
    IssueDefinition {
        id: "heartbeat-too-frequent",
        severity: Severity::Low,
        title: "Heartbeat interval is very short",
        description: "Every heartbeat is a full model call. Very frequent heartbeats spend tokens \
                      without giving the agent anything new to do.",
        detect: detect_heartbeat_too_frequent,
        fix: fix_heartbeat_too_frequent,
        touches_config: true,
    },
];

// ============================================================================
// Shared predicate helpers
// ============================================================================

/// Error output the collection script captured (`logs.errors` + `logs.stderr`)
fn error_logs(payload: &Payload) -> Result<String, FieldError> {
    let mut text = payload.text_at("logs.errors")?;
    let stderr = payload.text_at("logs.stderr")?;
    if !stderr.is_empty() {
        text.push('\n');
        text.push_str(&stderr);
    }
    Ok(text)
}

static HTTP_429: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b429\b").expect("static regex"));

static DURATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*([smhd]?)\s*$").expect("static regex"));

/// Major version from strings like `v20.11.1` or `22.3.0`
fn node_major(version: &str, path: &str) -> Result<u64, FieldError> {
    version
        .trim()
        .trim_start_matches('v')
        .split('.')
        .next()
        .and_then(|major| major.parse().ok())
        .ok_or_else(|| FieldError {
            path: path.to_string(),
            expected: "semantic version",
            found: "string",
        })
}

/// Minutes in an interval like `30m`, `2h` or `45` (bare numbers are minutes).
/// Values that overflow `u64` minutes are rejected.
fn interval_minutes(raw: &str, path: &str) -> Result<u64, FieldError> {
    let invalid = || FieldError {
        path: path.to_string(),
        expected: "duration",
        found: "string",
    };
    let caps = DURATION.captures(raw).ok_or_else(invalid)?;
    let value: u64 = caps[1].parse().map_err(|_| invalid())?;
    let minutes = match &caps[2] {
        "s" => Some(value / 60),
        "h" => value.checked_mul(60),
        "d" => value.checked_mul(60 * 24),
        _ => Some(value),
    };
    minutes.ok_or_else(invalid)
}

// ============================================================================
// Predicates
// ============================================================================

fn detect_mem0_graph(p: &Payload) -> Result<bool, FieldError> {
    Ok(p.bool_at("config.plugins.entries.mem0.config.enableGraph")? == Some(true))
}

fn detect_port_conflict(p: &Payload) -> Result<bool, FieldError> {
    Ok(error_logs(p)?.contains("EADDRINUSE"))
}

fn detect_auth_invalid(p: &Payload) -> Result<bool, FieldError> {
    let logs = error_logs(p)?.to_lowercase();
    Ok(logs.contains("invalid x-api-key")
        || logs.contains("authentication_error")
        || logs.contains("401 unauthorized"))
}

fn detect_gateway_down(p: &Payload) -> Result<bool, FieldError> {
    Ok(p.bool_at("openclaw.running")? == Some(false))
}

fn detect_no_context_pruning(p: &Payload) -> Result<bool, FieldError> {
    Ok(matches!(
        p.str_at("config.agents.defaults.contextPruning.mode")?,
        None | Some("off")
    ))
}

fn detect_no_memory_flush(p: &Payload) -> Result<bool, FieldError> {
    Ok(p.bool_at("config.agents.defaults.compaction.memoryFlush.enabled")? != Some(true))
}

fn detect_node_outdated(p: &Payload) -> Result<bool, FieldError> {
    match p.str_at("system.nodeVersion")? {
        Some(version) => Ok(node_major(version, "system.nodeVersion")? < MIN_NODE_MAJOR),
        None => Ok(false),
    }
}

fn detect_gateway_exposed(p: &Payload) -> Result<bool, FieldError> {
    let exposed = matches!(
        p.str_at("config.gateway.bind")?,
        Some("lan") | Some("0.0.0.0") | Some("all")
    );
    if !exposed {
        return Ok(false);
    }
    let token = p.str_at("config.gateway.auth.token")?;
    Ok(token.map(|t| t.trim().is_empty()).unwrap_or(true))
}

fn detect_missing_soul(p: &Payload) -> Result<bool, FieldError> {
    Ok(p.bool_at("workspace.hasSoul")? != Some(true))
}

fn detect_missing_memory(p: &Payload) -> Result<bool, FieldError> {
    Ok(matches!(p.u64_at("workspace.memoryFiles")?, None | Some(0)))
}

fn detect_memory_bloat(p: &Payload) -> Result<bool, FieldError> {
    Ok(p.u64_at("workspace.memoryFiles")?.unwrap_or(0) > MAX_MEMORY_FILES)
}

fn detect_rate_limited(p: &Payload) -> Result<bool, FieldError> {
    let logs = error_logs(p)?;
    Ok(logs.contains("rate_limit_error") || HTTP_429.is_match(&logs))
}

fn detect_disk_low(p: &Payload) -> Result<bool, FieldError> {
    Ok(p
        .u64_at("system.diskFreeMb")?
        .map(|free| free < MIN_DISK_FREE_MB)
        .unwrap_or(false))
}

fn detect_heartbeat_too_frequent(p: &Payload) -> Result<bool, FieldError> {
    let path = "config.agents.defaults.heartbeat.every";
    match p.value_at(path)? {
        None => Ok(false),
        Some(serde_json::Value::String(raw)) => {
            Ok(interval_minutes(raw, path)? < MIN_HEARTBEAT_MINUTES)
        }
        Some(_) => Ok(p.u64_at(path)?.unwrap_or(u64::MAX) < MIN_HEARTBEAT_MINUTES),
    }
}

// ============================================================================
// Fix generators
// ============================================================================

fn fix_mem0_graph() -> String {
    [
        "echo \"==> Disabling mem0 graph memory (paid feature)\"",
        "config_set plugins.entries.mem0.config.enableGraph false",
    ]
    .join("\n")
}

fn fix_port_conflict() -> String {
    format!(
        r#"echo "==> Releasing gateway port {port}"
PIDS=$(lsof -ti tcp:{port} 2>/dev/null || true)
if [ -n "$PIDS" ]; then
  echo "  Port {port} held by: $PIDS"
  kill $PIDS 2>/dev/null || true
  sleep 2
fi
if command -v openclaw >/dev/null 2>&1; then
  openclaw gateway restart || openclaw gateway start || true
fi"#,
        port = GATEWAY_PORT
    )
}

fn fix_auth_invalid() -> String {
    r#"echo "==> The model provider rejected your API key"
echo "  Run 'openclaw configure' and paste a valid key."
if env | grep -qE '^(ANTHROPIC|OPENAI)_API_KEY='; then
  echo "  Note: an *_API_KEY environment variable is set and may override the configured key."
fi"#
    .to_string()
}

fn fix_gateway_down() -> String {
    r#"echo "==> Starting the OpenClaw gateway"
if command -v openclaw >/dev/null 2>&1; then
  openclaw gateway status >/dev/null 2>&1 || openclaw gateway start || true
else
  echo "  openclaw is not on PATH. Install it with: npm install -g openclaw@latest"
fi"#
    .to_string()
}

fn fix_no_context_pruning() -> String {
    format!(
        "echo \"==> Enabling context pruning\"\n\
         config_set agents.defaults.contextPruning '{{\"mode\":\"cache-ttl\",\"ttl\":\"{}\"}}'",
        RECOMMENDED_PRUNING_TTL
    )
}

fn fix_no_memory_flush() -> String {
    [
        "echo \"==> Enabling memory flush before compaction\"",
        "config_set agents.defaults.compaction.memoryFlush.enabled true",
    ]
    .join("\n")
}

fn fix_node_outdated() -> String {
    format!(
        r#"echo "==> Node.js {major} or newer is required (found: $(node --version 2>/dev/null || echo none))"
if [ -s "$HOME/.nvm/nvm.sh" ]; then
  . "$HOME/.nvm/nvm.sh"
  nvm install {major} && nvm alias default {major}
else
  echo "  Install Node.js {major} from https://nodejs.org or your package manager."
fi"#,
        major = MIN_NODE_MAJOR
    )
}

fn fix_gateway_exposed() -> String {
    r#"echo "==> Adding a gateway auth token"
TOKEN=$(openssl rand -hex 24 2>/dev/null || head -c 24 /dev/urandom | od -An -tx1 | tr -d ' \n')
config_set gateway.auth.token "\"$TOKEN\"" --keep
echo "  Use the token from $CONFIG (gateway.auth.token) when connecting clients."
unset TOKEN"#
        .to_string()
}

fn fix_missing_soul() -> String {
    r#"echo "==> Creating SOUL.md"
mkdir -p "$WORKSPACE"
if [ ! -f "$WORKSPACE/SOUL.md" ]; then
  cat > "$WORKSPACE/SOUL.md" <<'SOUL_EOF'
# SOUL.md

You are a helpful, direct assistant.

## Boundaries
- Ask before taking actions outside the workspace.
- Never share credentials or private files.
SOUL_EOF
  echo "  Created $WORKSPACE/SOUL.md. Edit it to give your agent its voice."
else
  echo "  SOUL.md already exists"
fi"#
        .to_string()
}

fn fix_missing_memory() -> String {
    r#"echo "==> Creating the memory directory"
mkdir -p "$WORKSPACE/memory"
if [ ! -f "$WORKSPACE/MEMORY.md" ]; then
  printf '# MEMORY.md\n\nLong-term notes the agent should keep across sessions.\n' > "$WORKSPACE/MEMORY.md"
  echo "  Created $WORKSPACE/MEMORY.md"
fi"#
        .to_string()
}

fn fix_memory_bloat() -> String {
    format!(
        r#"echo "==> Archiving memory notes older than {days} days"
mkdir -p "$WORKSPACE/memory/archive"
find "$WORKSPACE/memory" -maxdepth 1 -type f -name '*.md' -mtime +{days} -exec mv {{}} "$WORKSPACE/memory/archive/" \;
echo "  $(find "$WORKSPACE/memory" -maxdepth 1 -type f -name '*.md' | wc -l) active memory files remain (target: {max} or fewer)""#,
        days = MEMORY_ARCHIVE_AFTER_DAYS,
        max = MAX_MEMORY_FILES
    )
}

fn fix_rate_limited() -> String {
    format!(
        "echo \"==> Limiting concurrent agent runs to {n}\"\n\
         config_set agents.defaults.maxConcurrent {n}",
        n = RECOMMENDED_MAX_CONCURRENT
    )
}

fn fix_disk_low() -> String {
    format!(
        r#"echo "==> Freeing disk space"
if [ -d "$HOME/.openclaw/logs" ]; then
  find "$HOME/.openclaw/logs" -type f -name '*.log' -mtime +{days} -delete 2>/dev/null || true
fi
df -h "$HOME" | tail -1"#,
        days = LOG_RETENTION_DAYS
    )
}

fn fix_heartbeat_too_frequent() -> String {
    format!(
        "echo \"==> Setting heartbeat interval to {every}\"\n\
         config_set agents.defaults.heartbeat.every '\"{every}\"'",
        every = RECOMMENDED_HEARTBEAT
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> Payload {
        Payload::from_value(value).unwrap()
    }

    fn rule(id: &str) -> IssueDefinition {
        *Catalog::standard().get(id).unwrap()
    }

    #[test]
    fn test_standard_catalog_ids_are_unique() {
        let catalog = Catalog::new(STANDARD_RULES.to_vec()).unwrap();
        assert_eq!(catalog.len(), STANDARD_RULES.len());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut entries = STANDARD_RULES.to_vec();
        entries.push(STANDARD_RULES[0]);
        assert_eq!(
            Catalog::new(entries).unwrap_err(),
            CatalogError::DuplicateId("mem0-graph-free".to_string())
        );
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"critical\"");
    }

    #[test]
    fn test_mem0_graph_rule() {
        let r = rule("mem0-graph-free");
        let on = payload(json!({"system": {}, "config": {"plugins": {"entries": {"mem0": {"config": {"enableGraph": true}}}}}}));
        let off = payload(json!({"system": {}, "config": {"plugins": {"entries": {"mem0": {"config": {"enableGraph": false}}}}}}));
        assert!((r.detect)(&on).unwrap());
        assert!(!(r.detect)(&off).unwrap());
        assert!(!(r.detect)(&payload(json!({"system": {}}))).unwrap());
        assert!((r.fix)().contains("enableGraph false"));
    }

    #[test]
    fn test_port_conflict_rule() {
        let r = rule("port-conflict");
        let p = payload(json!({"system": {}, "logs": {"errors": "Error: listen EADDRINUSE: address already in use :::18789"}}));
        assert!((r.detect)(&p).unwrap());
        let fix = (r.fix)();
        assert!(fix.contains("lsof -ti tcp:18789"));
        assert!(fix.contains("openclaw gateway restart"));
    }

    #[test]
    fn test_auth_rule_is_case_insensitive() {
        let r = rule("auth-invalid");
        let p = payload(json!({"system": {}, "logs": {"stderr": "HTTP 401 Unauthorized from provider"}}));
        assert!((r.detect)(&p).unwrap());
    }

    #[test]
    fn test_gateway_down_needs_explicit_false() {
        let r = rule("gateway-down");
        assert!(!(r.detect)(&payload(json!({"system": {}}))).unwrap());
        assert!((r.detect)(&payload(json!({"system": {}, "openclaw": {"running": false}}))).unwrap());
    }

    #[test]
    fn test_context_pruning_rule() {
        let r = rule("no-context-pruning");
        assert!((r.detect)(&payload(json!({"system": {}}))).unwrap());
        let off = payload(json!({"system": {}, "config": {"agents": {"defaults": {"contextPruning": {"mode": "off"}}}}}));
        assert!((r.detect)(&off).unwrap());
        let on = payload(json!({"system": {}, "config": {"agents": {"defaults": {"contextPruning": {"mode": "cache-ttl"}}}}}));
        assert!(!(r.detect)(&on).unwrap());
        assert!((r.fix)().contains(r#"{"mode":"cache-ttl","ttl":"1h"}"#));
    }

    #[test]
    fn test_node_version_parsing() {
        assert_eq!(node_major("v20.11.1", "x").unwrap(), 20);
        assert_eq!(node_major("22.3.0", "x").unwrap(), 22);
        assert!(node_major("latest", "x").is_err());

        let r = rule("node-outdated");
        assert!((r.detect)(&payload(json!({"system": {"nodeVersion": "v18.19.0"}}))).unwrap());
        assert!(!(r.detect)(&payload(json!({"system": {"nodeVersion": "v22.1.0"}}))).unwrap());
        assert!(!(r.detect)(&payload(json!({"system": {}}))).unwrap());
    }

    #[test]
    fn test_gateway_exposed_rule() {
        let r = rule("gateway-exposed");
        let open = payload(json!({"system": {}, "config": {"gateway": {"bind": "lan"}}}));
        let guarded = payload(json!({"system": {}, "config": {"gateway": {"bind": "lan", "auth": {"token": "abc"}}}}));
        let local = payload(json!({"system": {}, "config": {"gateway": {"bind": "loopback"}}}));
        assert!((r.detect)(&open).unwrap());
        assert!(!(r.detect)(&guarded).unwrap());
        assert!(!(r.detect)(&local).unwrap());
        assert!((r.fix)().contains("--keep"));
    }

    #[test]
    fn test_memory_rules_are_mutually_exclusive() {
        let missing = rule("missing-memory");
        let bloat = rule("memory-bloat");
        for count in [0u64, 1, 200, 201, 5000] {
            let p = payload(json!({"system": {}, "workspace": {"memoryFiles": count}}));
            let both = (missing.detect)(&p).unwrap() && (bloat.detect)(&p).unwrap();
            assert!(!both, "count {}", count);
        }
        let p = payload(json!({"system": {}, "workspace": {"memoryFiles": 201}}));
        assert!((bloat.detect)(&p).unwrap());
    }

    #[test]
    fn test_rate_limit_requires_whole_status_code() {
        let r = rule("rate-limited");
        assert!((r.detect)(&payload(json!({"system": {}, "logs": {"errors": "status 429 Too Many Requests"}}))).unwrap());
        assert!(!(r.detect)(&payload(json!({"system": {}, "logs": {"errors": "request id 14290"}}))).unwrap());
    }

    #[test]
    fn test_disk_low_rule() {
        let r = rule("disk-low");
        assert!((r.detect)(&payload(json!({"system": {"diskFreeMb": 300}}))).unwrap());
        assert!(!(r.detect)(&payload(json!({"system": {"diskFreeMb": 50_000}}))).unwrap());
    }

    #[test]
    fn test_heartbeat_interval_parsing() {
        assert_eq!(interval_minutes("30m", "x").unwrap(), 30);
        assert_eq!(interval_minutes("2h", "x").unwrap(), 120);
        assert_eq!(interval_minutes("90s", "x").unwrap(), 1);
        assert_eq!(interval_minutes("45", "x").unwrap(), 45);
        assert!(interval_minutes("soon", "x").is_err());
        assert!(interval_minutes("307445734561825861h", "x").is_err());
        assert!(interval_minutes("12811906440076078d", "x").is_err());

        let r = rule("heartbeat-too-frequent");
        let fast = payload(json!({"system": {}, "config": {"agents": {"defaults": {"heartbeat": {"every": "5m"}}}}}));
        let slow = payload(json!({"system": {}, "config": {"agents": {"defaults": {"heartbeat": {"every": "1h"}}}}}));
        assert!((r.detect)(&fast).unwrap());
        assert!(!(r.detect)(&slow).unwrap());

        let huge = payload(json!({"system": {}, "config": {"agents": {"defaults": {"heartbeat": {"every": "307445734561825861h"}}}}}));
        assert!((r.detect)(&huge).is_err());
    }

    #[test]
    fn test_config_fixes_use_config_helper() {
        for entry in STANDARD_RULES {
            let fix = (entry.fix)();
            assert_eq!(
                entry.touches_config,
                fix.contains("config_set "),
                "{} touches_config flag disagrees with its fix body",
                entry.id
            );
        }
    }

    #[test]
    fn test_fix_bodies_are_guarded() {
        // Every file creation must be conditional so a second run is a no-op
        for entry in STANDARD_RULES {
            let fix = (entry.fix)();
            if fix.contains("cat >") || fix.contains("> \"$WORKSPACE") {
                assert!(fix.contains("if [ ! -f"), "{} writes files unconditionally", entry.id);
            }
            assert!(!fix.contains("rm -rf"), "{} uses rm -rf", entry.id);
        }
    }
}
