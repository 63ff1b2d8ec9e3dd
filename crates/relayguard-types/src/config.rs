//! Runtime configuration, loaded from environment variables.
//!
//! All knobs are `RELAYGUARD_*` variables. The session signing secret is
//! required; the screening API key is optional but its absence is a
//! misconfiguration the caller should log loudly. Everything else has a
//! default matching the original deployment.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::screening::FailurePolicy;

/// Default screening endpoint.
pub const DEFAULT_GUARD_URL: &str = "https://api.lakera.ai/v2/guard";

/// Default completion endpoint.
pub const DEFAULT_COMPLETION_URL: &str = "http://localhost:8081/v1/completions";

/// Default completion model identifier.
pub const DEFAULT_MODEL: &str = "tinylama-rust-q4_k_m.gguf";

/// Runtime configuration for the relay.
#[derive(Debug)]
pub struct RelayConfig {
    /// Bearer credential for the screening service. `None` is a logged
    /// misconfiguration, not a startup failure.
    pub guard_api_key: Option<SecretString>,
    /// Project identifier sent with every screening request.
    pub guard_project_id: Option<String>,
    /// Screening endpoint URL.
    pub guard_url: String,
    /// Completion endpoint URL.
    pub completion_url: String,
    /// Secret used to sign session cookies.
    pub session_secret: SecretString,
    /// Bound on both upstream calls.
    pub request_timeout: Duration,
    /// What to do when pre-generation screening itself fails.
    pub input_fail_policy: FailurePolicy,
    /// What to do when post-generation screening itself fails.
    pub output_fail_policy: FailurePolicy,
    /// Completion model identifier.
    pub model: String,
    /// Max-token bound for a completion.
    pub max_tokens: u32,
    /// Context-window size sent to the completion service.
    pub n_ctx: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Stop sequence that truncates generation.
    pub stop_sequence: String,
    /// Artificial inter-fragment delay during delivery.
    pub pacing_delay: Duration,
}

impl RelayConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// The indirection keeps config parsing testable without mutating
    /// process-wide environment state.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let session_secret = lookup("RELAYGUARD_SESSION_SECRET")
            .ok_or(ConfigError::MissingVar("RELAYGUARD_SESSION_SECRET"))?;

        Ok(Self {
            guard_api_key: lookup("RELAYGUARD_GUARD_API_KEY").map(SecretString::from),
            guard_project_id: lookup("RELAYGUARD_GUARD_PROJECT_ID"),
            guard_url: lookup("RELAYGUARD_GUARD_URL")
                .unwrap_or_else(|| DEFAULT_GUARD_URL.to_string()),
            completion_url: lookup("RELAYGUARD_COMPLETION_URL")
                .unwrap_or_else(|| DEFAULT_COMPLETION_URL.to_string()),
            session_secret: SecretString::from(session_secret),
            request_timeout: Duration::from_secs(parse_var(
                &lookup,
                "RELAYGUARD_TIMEOUT_SECS",
                30u64,
            )?),
            input_fail_policy: parse_policy(&lookup, "RELAYGUARD_INPUT_FAIL_POLICY")?,
            output_fail_policy: parse_policy(&lookup, "RELAYGUARD_OUTPUT_FAIL_POLICY")?,
            model: lookup("RELAYGUARD_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: parse_var(&lookup, "RELAYGUARD_MAX_TOKENS", 250u32)?,
            n_ctx: parse_var(&lookup, "RELAYGUARD_N_CTX", 2048u32)?,
            temperature: parse_var(&lookup, "RELAYGUARD_TEMPERATURE", 0.1f64)?,
            stop_sequence: lookup("RELAYGUARD_STOP").unwrap_or_else(|| "\n".to_string()),
            pacing_delay: Duration::from_millis(parse_var(
                &lookup,
                "RELAYGUARD_PACING_MS",
                100u64,
            )?),
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidVar {
            name,
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_policy(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<FailurePolicy, ConfigError> {
    match lookup(name) {
        Some(raw) => raw.parse().map_err(|e: String| ConfigError::InvalidVar {
            name,
            message: e,
        }),
        None => Ok(FailurePolicy::FailOpen),
    }
}
