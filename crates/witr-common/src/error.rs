//! Error types for witr.
//!
//! Every failure that can reach the user carries:
//! - A stable error code for machine parsing
//! - A category for grouping
//! - A suggested action for scripts and agents
//! - A remediation hint for humans
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Target Not Found
//!   Reason: no process listening on port 8080
//!   Fix: Check the PID, port, name, or path and try again; run 'witr --help' for usage
//! ```
//!
//! # Agent-Facing Output
//!
//! ```json
//! {
//!   "code": 21,
//!   "category": "resolution",
//!   "message": "socket found but owning process not detected (port 80)",
//!   "recoverable": true,
//!   "suggested_action": "elevate",
//!   "context": { "port": 80 }
//! }
//! ```
//!
//! An ancestor that disappears halfway through an ancestry walk is not an
//! error: the walker keeps the partial chain and flags it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse grouping of [`Error`] variants, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad user input (malformed PID, port, or empty name).
    Input,
    /// The target could not be mapped to a process.
    Resolution,
    /// Reading process attributes or running OS tools failed.
    Collection,
    /// Configuration file errors.
    Config,
    /// Local file access or JSON encoding.
    Io,
    /// Feature not available on this platform.
    Platform,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Input => "input",
            ErrorCategory::Resolution => "resolution",
            ErrorCategory::Collection => "collection",
            ErrorCategory::Config => "config",
            ErrorCategory::Io => "io",
            ErrorCategory::Platform => "platform",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Suggested actions for callers to take in response to errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Retry the query (the process table may have changed).
    Retry,
    /// Fix the query arguments.
    FixInput,
    /// Pick one of the listed candidates.
    Disambiguate,
    /// Re-run with elevated privileges.
    Elevate,
    /// Fix or remove the configuration file.
    ResetConfig,
    /// Abort; nothing can be done on this platform.
    Abort,
    /// Needs a human to look at the system.
    ManualIntervention,
}

impl SuggestedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestedAction::Retry => "retry",
            SuggestedAction::FixInput => "fix_input",
            SuggestedAction::Disambiguate => "disambiguate",
            SuggestedAction::Elevate => "elevate",
            SuggestedAction::ResetConfig => "reset_config",
            SuggestedAction::Abort => "abort",
            SuggestedAction::ManualIntervention => "manual_intervention",
        }
    }
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for witr.
#[derive(Error, Debug)]
pub enum Error {
    // Input errors (10-19)
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    // Resolution errors (20-29)
    #[error("{0}")]
    NotFound(String),

    #[error("socket found but owning process not detected (port {port})")]
    OwnerNotDetected { port: u16 },

    #[error("multiple matching processes found: {}", join_pids(.pids))]
    AmbiguousMatch { pids: Vec<u32> },

    #[error("no process ancestry found for pid {pid}")]
    NoAncestry { pid: u32 },

    // Collection errors (30-39)
    #[error("process collection failed: {0}")]
    Collection(String),

    #[error("external tool failed: {0}")]
    Tool(String),

    // Configuration errors (40-49)
    #[error("configuration error: {0}")]
    Config(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Platform errors (70-79)
    #[error("unsupported: {0}")]
    Unsupported(String),
}

fn join_pids(pids: &[u32]) -> String {
    pids.iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Stable numeric code, grouped by category:
    /// - 10-19: Input errors
    /// - 20-29: Resolution errors
    /// - 30-39: Collection errors
    /// - 40-49: Configuration errors
    /// - 60-69: I/O errors
    /// - 70-79: Platform errors
    pub fn code(&self) -> u32 {
        match self {
            Error::InvalidTarget(_) => 10,
            Error::NotFound(_) => 20,
            Error::OwnerNotDetected { .. } => 21,
            Error::AmbiguousMatch { .. } => 22,
            Error::NoAncestry { .. } => 23,
            Error::Collection(_) => 30,
            Error::Tool(_) => 31,
            Error::Config(_) => 40,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
            Error::Unsupported(_) => 70,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidTarget(_) => ErrorCategory::Input,

            Error::NotFound(_)
            | Error::OwnerNotDetected { .. }
            | Error::AmbiguousMatch { .. }
            | Error::NoAncestry { .. } => ErrorCategory::Resolution,

            Error::Collection(_) | Error::Tool(_) => ErrorCategory::Collection,

            Error::Config(_) => ErrorCategory::Config,

            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,

            Error::Unsupported(_) => ErrorCategory::Platform,
        }
    }

    /// Returns whether a different invocation could succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::InvalidTarget(_) => true,
            Error::NotFound(_) => true,
            Error::OwnerNotDetected { .. } => true, // Can elevate
            Error::AmbiguousMatch { .. } => true,
            Error::NoAncestry { .. } => false, // Process is gone
            Error::Collection(_) => true,
            Error::Tool(_) => true,
            Error::Config(_) => true,
            Error::Io(_) => true,
            Error::Json(_) => false,
            Error::Unsupported(_) => false,
        }
    }

    /// Returns the suggested action for scripts and agents.
    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            Error::InvalidTarget(_) => SuggestedAction::FixInput,
            Error::NotFound(_) => SuggestedAction::FixInput,
            Error::OwnerNotDetected { .. } => SuggestedAction::Elevate,
            Error::AmbiguousMatch { .. } => SuggestedAction::Disambiguate,
            Error::NoAncestry { .. } => SuggestedAction::Retry,
            Error::Collection(_) => SuggestedAction::Retry,
            Error::Tool(_) => SuggestedAction::ManualIntervention,
            Error::Config(_) => SuggestedAction::ResetConfig,
            Error::Io(_) => SuggestedAction::Retry,
            Error::Json(_) => SuggestedAction::ManualIntervention,
            Error::Unsupported(_) => SuggestedAction::Abort,
        }
    }

    /// The "Fix:" line of human output.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::InvalidTarget(_) => {
                "Pass a positive PID with --pid, a port with --port, a path with --file, or a process name"
            }
            Error::NotFound(_) => {
                "No matching process or service found. Please check your query or try a different name/port/PID. For usage and options, run: witr --help"
            }
            Error::OwnerNotDetected { .. } => {
                "A socket was found for the port, but the owning process could not be detected. This may be due to insufficient permissions. Try running with sudo"
            }
            Error::AmbiguousMatch { .. } => "Re-run with: witr --pid <pid>",
            Error::NoAncestry { .. } => "The process exited before it could be read; try again",
            Error::Collection(_) => "Retry; the process table changed while it was being read",
            Error::Tool(_) => "Check that the required system tool is installed and on PATH",
            Error::Config(_) => "Fix or remove the witr config.json file",
            Error::Io(_) => "Check file permissions and try again",
            Error::Json(_) => "Report this as a bug",
            Error::Unsupported(_) => "This query is not available on this platform",
        }
    }

    pub fn headline(&self) -> &'static str {
        match self {
            Error::InvalidTarget(_) => "Invalid Target",
            Error::NotFound(_) => "Target Not Found",
            Error::OwnerNotDetected { .. } => "Socket Owner Not Detected",
            Error::AmbiguousMatch { .. } => "Ambiguous Match",
            Error::NoAncestry { .. } => "No Process Ancestry",
            Error::Collection(_) => "Collection Error",
            Error::Tool(_) => "System Tool Error",
            Error::Config(_) => "Configuration Error",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "Serialization Error",
            Error::Unsupported(_) => "Unsupported On This Platform",
        }
    }
}

/// Error document printed on stdout in JSON mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    pub code: u32,
    pub category: ErrorCategory,
    /// Same text as the `Display` impl.
    pub message: String,

    /// Whether a different invocation could succeed.
    pub recoverable: bool,

    pub suggested_action: SuggestedAction,

    /// Additional structured context (pid, port, candidates).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::OwnerNotDetected { port } => {
                context.insert("port".to_string(), serde_json::json!(port));
            }
            Error::AmbiguousMatch { pids } => {
                context.insert("pids".to_string(), serde_json::json!(pids));
            }
            Error::NoAncestry { pid } => {
                context.insert("pid".to_string(), serde_json::json!(pid));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            suggested_action: err.suggested_action(),
            context,
        }
    }
}

impl StructuredError {
    /// Pretty JSON. Serializing this struct cannot fail in practice; the
    /// fallback keeps the code field readable if it ever does.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self)
            .unwrap_or_else(|e| format!("{{\"code\":{},\"message\":\"{}\"}}", self.code, e))
    }
}

/// Three-line error block for stderr.
///
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        headline = err.headline(),
        message = err,
        remediation = err.remediation(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(Error::InvalidTarget("x".into()).code(), 10);
        assert_eq!(Error::OwnerNotDetected { port: 80 }.code(), 21);
        assert_eq!(Error::Unsupported("x".into()).code(), 70);
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            Error::NotFound("x".into()).category(),
            ErrorCategory::Resolution
        );
        assert_eq!(
            Error::Tool("lsof".into()).category(),
            ErrorCategory::Collection
        );
        assert_eq!(
            Error::Unsupported("x".into()).category(),
            ErrorCategory::Platform
        );
    }

    #[test]
    fn test_owner_not_detected_is_distinct_from_not_found() {
        let owner = Error::OwnerNotDetected { port: 80 };
        let missing = Error::NotFound("no process listening on port 80".into());
        assert_ne!(owner.code(), missing.code());
        assert_eq!(owner.suggested_action(), SuggestedAction::Elevate);
        assert_eq!(missing.suggested_action(), SuggestedAction::FixInput);
    }

    #[test]
    fn test_not_found_message_is_verbatim() {
        let err = Error::NotFound("no process listening on port 8080".into());
        assert_eq!(err.to_string(), "no process listening on port 8080");
    }

    #[test]
    fn test_ambiguous_message_lists_pids() {
        let err = Error::AmbiguousMatch {
            pids: vec![10, 20, 30],
        };
        assert_eq!(
            err.to_string(),
            "multiple matching processes found: 10, 20, 30"
        );
    }

    #[test]
    fn test_structured_error_from_error() {
        let err = Error::OwnerNotDetected { port: 443 };
        let structured = StructuredError::from(&err);
        assert_eq!(structured.code, 21);
        assert_eq!(structured.category, ErrorCategory::Resolution);
        assert!(structured.recoverable);
        assert_eq!(
            structured.context.get("port"),
            Some(&serde_json::json!(443))
        );
    }

    #[test]
    fn test_structured_error_json() {
        let err = Error::AmbiguousMatch { pids: vec![3, 9] };
        let v: serde_json::Value =
            serde_json::from_str(&StructuredError::from(&err).to_json_pretty()).unwrap();
        assert_eq!(v["code"], 22);
        assert_eq!(v["category"], "resolution");
        assert_eq!(v["suggested_action"], "disambiguate");
        assert_eq!(v["context"]["pids"], serde_json::json!([3, 9]));

        let v: serde_json::Value =
            serde_json::from_str(&StructuredError::from(&Error::Json(
                serde_json::from_str::<u8>("x").unwrap_err(),
            ))
            .to_json_pretty())
            .unwrap();
        assert!(v.get("context").is_none());
        assert_eq!(v["recoverable"], false);
    }

    #[test]
    fn test_format_error_human() {
        let err = Error::NotFound("no running process or service named \"nope\"".into());
        let output = format_error_human(&err, false);
        assert!(output.starts_with("✗ Target Not Found"));
        assert!(output.contains("Reason: no running process or service named \"nope\""));
        assert!(output.contains("Fix: No matching process or service found."));
    }

    #[test]
    fn test_format_error_human_color() {
        let err = Error::Unsupported("file handles".into());
        let output = format_error_human(&err, true);
        assert!(output.contains("\x1b[31m"));
        assert!(output.contains("\x1b[36m"));
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Resolution.to_string(), "resolution");
        assert_eq!(ErrorCategory::Platform.to_string(), "platform");
    }

    #[test]
    fn test_suggested_action_display() {
        assert_eq!(SuggestedAction::Elevate.to_string(), "elevate");
        assert_eq!(SuggestedAction::FixInput.to_string(), "fix_input");
    }
}
