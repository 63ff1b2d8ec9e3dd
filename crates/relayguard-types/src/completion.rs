//! Wire shapes for the token-streaming completion endpoint.

use serde::{Deserialize, Serialize};

/// Request body for the completion endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub n_ctx: u32,
    pub temperature: f64,
    pub stop: String,
    pub stream: bool,
}

/// One decoded `data:` event from the completion stream.
///
/// Events may carry zero or more choices; each choice carries a text
/// increment (possibly empty).
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChunk {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
}

/// One choice entry inside a [`CompletionChunk`].
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChoice {
    #[serde(default)]
    pub text: String,
}
