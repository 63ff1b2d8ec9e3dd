//! Screening service client.
//!
//! One synchronous call per screen: an ordered message list (the user
//! utterance, plus the candidate assistant reply for the output stage)
//! and a project identifier, sent with a bearer credential. The response
//! is parsed for a boolean `flagged` field; a missing field means not
//! flagged.
//!
//! This client reports failures as [`ScreeningError`] values; whether a
//! failure fails open or closed is the pipeline's decision, not ours.

use std::sync::Arc;

use secrecy::ExposeSecret;
use serde::Serialize;

use relayguard_core::screen::Screener;
use relayguard_types::config::RelayConfig;
use relayguard_types::error::ScreeningError;
use relayguard_types::screening::ScreeningVerdict;

/// One entry in the screening request's message list.
#[derive(Debug, Serialize)]
struct GuardMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Request body for the screening endpoint.
#[derive(Debug, Serialize)]
struct GuardRequest<'a> {
    messages: Vec<GuardMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    project_id: Option<&'a str>,
}

/// Stateless client for the external screening endpoint.
///
/// Does NOT derive Debug to avoid accidental exposure of the bearer
/// credential.
pub struct GuardClient {
    client: reqwest::Client,
    config: Arc<RelayConfig>,
}

impl GuardClient {
    /// Build a client from the relay configuration.
    pub fn new(config: Arc<RelayConfig>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }
}

/// Build the ordered message list for a screening request.
fn build_messages<'a>(input: &'a str, output: Option<&'a str>) -> Vec<GuardMessage<'a>> {
    let mut messages = vec![GuardMessage {
        role: "user",
        content: input,
    }];
    if let Some(candidate) = output {
        messages.push(GuardMessage {
            role: "assistant",
            content: candidate,
        });
    }
    messages
}

fn map_transport(e: reqwest::Error) -> ScreeningError {
    if e.is_timeout() {
        ScreeningError::Timeout
    } else if e.is_decode() {
        ScreeningError::Decode(e.to_string())
    } else {
        ScreeningError::Transport(e.to_string())
    }
}

impl Screener for GuardClient {
    async fn screen(
        &self,
        input: &str,
        output: Option<&str>,
    ) -> Result<ScreeningVerdict, ScreeningError> {
        let payload = GuardRequest {
            messages: build_messages(input, output),
            project_id: self.config.guard_project_id.as_deref(),
        };

        tracing::debug!(
            url = %self.config.guard_url,
            messages = payload.messages.len(),
            "sending screening request"
        );

        let mut request = self.client.post(&self.config.guard_url).json(&payload);
        if let Some(key) = &self.config.guard_api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(map_transport)?;

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ScreeningError::Decode(e.to_string()))?;

        let verdict = ScreeningVerdict::from_payload(raw);
        tracing::debug!(flagged = verdict.flagged, raw = %verdict.raw, "screening verdict received");
        Ok(verdict)
    }
}
