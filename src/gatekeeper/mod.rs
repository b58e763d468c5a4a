//! Decision Gateway — the boundary to the external reasoning provider.
//!
//! The gatekeeper is a pure decision function from the service's point of
//! view: assembled context in, structured verdict out, no local state.
//! Default-deny is the safety property. A timeout, a transport error, a
//! non-2xx status, or a response body that does not parse all collapse to
//! `approved: false`; no failure mode here ever approves. One attempt per
//! request, no retries: a failed call is a denial and the user is free to
//! resubmit.

mod claude;
mod prompt;

pub use claude::ClaudeGatekeeper;
pub use prompt::build_user_message;

use crate::history::RequestRecord;
use crate::scope::ScopePattern;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::Deserialize;

/// The structured outcome of a reasoning call.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub approved: bool,
    pub scope: ScopePattern,
    pub duration_minutes: u32,
    pub message: String,
}

impl Verdict {
    /// A denial with an explanation. Every failure path produces one.
    pub fn deny(message: impl Into<String>) -> Self {
        Self {
            approved: false,
            scope: ScopePattern::unrestricted(),
            duration_minutes: 0,
            message: message.into(),
        }
    }
}

/// Everything the reasoning provider gets to see about one request.
#[derive(Debug, Clone)]
pub struct DecisionContext {
    pub url: String,
    pub reason: String,
    pub device_name: Option<String>,
    pub device_kind: Option<String>,
    /// Current room from the location collaborator, None when unavailable.
    pub room: Option<String>,
    pub request_count_today: u32,
    pub recent: Vec<RequestRecord>,
    pub now: DateTime<Local>,
}

/// Renders approve/deny verdicts for access requests.
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    /// Evaluate a request. Infallible by contract: providers map their own
    /// failures to a deny verdict rather than surfacing errors.
    async fn decide(&self, context: &DecisionContext) -> Verdict;
}

/// Wire shape of the provider's JSON verdict. Absent fields take the
/// conservative defaults the original gatekeeper used.
#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default)]
    approved: bool,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default = "default_duration")]
    duration_minutes: u32,
    #[serde(default)]
    message: String,
}

fn default_duration() -> u32 {
    15
}

/// Parse the provider's response text into a verdict.
///
/// Expects a JSON object but tolerates markdown code fences around it.
/// Anything that does not parse is a denial.
pub fn parse_verdict(raw_text: &str) -> Verdict {
    let text = raw_text.trim();

    if text.starts_with("```") {
        let stripped: Vec<&str> = text
            .lines()
            .filter(|line| !line.trim_start().starts_with("```"))
            .collect();
        return parse_verdict_inner(&stripped.join("\n"));
    }

    parse_verdict_inner(text)
}

fn parse_verdict_inner(text: &str) -> Verdict {
    match serde_json::from_str::<RawVerdict>(text.trim()) {
        Ok(raw) => Verdict {
            approved: raw.approved,
            scope: ScopePattern::parse(raw.scope.as_deref()),
            duration_minutes: raw.duration_minutes,
            message: raw.message,
        },
        Err(e) => {
            tracing::warn!(error = %e, "Unparseable verdict from reasoning provider");
            Verdict::deny(format!(
                "Could not parse the gatekeeper response. Defaulting to deny. Raw: {}",
                truncate(text, 200)
            ))
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
