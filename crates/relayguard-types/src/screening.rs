//! Screening verdict and failure policy types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The safety classifier's judgment for a piece of text.
///
/// The raw classifier payload is kept opaque and only used for logging;
/// verdicts are consumed immediately by the pipeline and never persisted.
#[derive(Debug, Clone)]
pub struct ScreeningVerdict {
    pub flagged: bool,
    pub raw: serde_json::Value,
}

impl ScreeningVerdict {
    /// Build a verdict from a classifier response payload.
    ///
    /// A missing or non-boolean `flagged` field is treated as not flagged.
    pub fn from_payload(raw: serde_json::Value) -> Self {
        let flagged = raw
            .get("flagged")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        Self { flagged, raw }
    }
}

/// How a screening stage responds when the classifier itself fails.
///
/// `FailOpen` treats a transport/timeout/decode failure as "not flagged"
/// and lets the request proceed; `FailClosed` treats it as flagged.
/// Both stages default to fail-open, matching the relay's deliberate
/// never-punish-the-user-for-an-outage posture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    FailOpen,
    FailClosed,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::FailOpen => write!(f, "fail_open"),
            FailurePolicy::FailClosed => write!(f, "fail_closed"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail_open" | "open" => Ok(FailurePolicy::FailOpen),
            "fail_closed" | "closed" => Ok(FailurePolicy::FailClosed),
            other => Err(format!("invalid failure policy: '{other}'")),
        }
    }
}
