//! Completion service client.
//!
//! Streams generated text from an OpenAI-style `/v1/completions`
//! endpoint. The upstream pushes event lines: blank lines and the
//! literal `[DONE]` marker are skipped, `data: `-prefixed lines are
//! JSON-decoded, and each decoded event carries zero or more choices
//! with a text increment.
//!
//! An increment containing the stop sequence is truncated to the text
//! before its first occurrence, emitted as the final fragment, and the
//! stream ends without consuming the rest of the upstream. Malformed
//! event payloads are logged and skipped. A transport failure ends the
//! stream with a single terminal `Err`; the pipeline downgrades that to
//! an empty reply rather than failing the request.

use std::sync::Arc;

use futures_util::StreamExt;

use relayguard_core::complete::{Completer, FragmentStream};
use relayguard_types::completion::{CompletionChunk, CompletionRequest};
use relayguard_types::config::RelayConfig;
use relayguard_types::error::CompletionError;

/// Prefix marking a data-carrying event line.
const DATA_PREFIX: &str = "data: ";

/// Literal end-of-stream marker.
const END_MARKER: &str = "[DONE]";

/// Stateless client for the streaming completion endpoint.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    client: reqwest::Client,
    config: Arc<RelayConfig>,
}

impl CompletionClient {
    /// Build a client from the relay configuration.
    pub fn new(config: Arc<RelayConfig>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    fn build_request(&self, question: &str) -> CompletionRequest {
        CompletionRequest {
            model: self.config.model.clone(),
            prompt: build_prompt(question),
            max_tokens: self.config.max_tokens,
            n_ctx: self.config.n_ctx,
            temperature: self.config.temperature,
            stop: self.config.stop_sequence.clone(),
            stream: true,
        }
    }
}

/// Wrap the raw question in the fixed instructional template.
fn build_prompt(question: &str) -> String {
    format!(
        "\nYou are a helpful assistant.\n\
         Answer the following question in **one sentence only**.\n\
         Do not add extra text, do not repeat the question, and do not generate any new questions.\n\n\
         Question: {question}\n\
         Answer:"
    )
}

/// Extract the text increments carried by one event line.
///
/// Returns an empty vector for blank lines, end markers, lines without
/// the data prefix, malformed JSON payloads (warned and skipped), and
/// events whose choices carry only empty text.
fn parse_event_line(line: &str) -> Vec<String> {
    let line = line.trim();
    if line.is_empty() || line == END_MARKER {
        return Vec::new();
    }
    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        return Vec::new();
    };
    if data.trim() == END_MARKER {
        return Vec::new();
    }
    match serde_json::from_str::<CompletionChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .map(|choice| choice.text)
            .filter(|text| !text.is_empty())
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, payload = %data, "skipping malformed completion event");
            Vec::new()
        }
    }
}

/// Truncate a text increment at the stop sequence.
///
/// Returns the text to emit and whether the stop sequence was hit (in
/// which case the stream must terminate after emitting it).
fn split_at_stop(text: &str, stop: &str) -> (String, bool) {
    if stop.is_empty() {
        return (text.to_string(), false);
    }
    match text.find(stop) {
        Some(idx) => (text[..idx].to_string(), true),
        None => (text.to_string(), false),
    }
}

fn map_transport(e: reqwest::Error) -> CompletionError {
    if e.is_timeout() {
        CompletionError::Timeout
    } else {
        CompletionError::Transport(e.to_string())
    }
}

impl Completer for CompletionClient {
    fn stream(&self, prompt: &str) -> FragmentStream {
        let request = self.build_request(prompt);
        let client = self.client.clone();
        let url = self.config.completion_url.clone();
        let stop = self.config.stop_sequence.clone();

        Box::pin(async_stream::stream! {
            tracing::info!(chars = request.prompt.len(), "sending completion request");

            let response = match client
                .post(&url)
                .json(&request)
                .send()
                .await
                .and_then(|r| r.error_for_status())
            {
                Ok(response) => response,
                Err(e) => {
                    yield Err(map_transport(e));
                    return;
                }
            };

            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(map_transport(e));
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buffer.find('\n') {
                    let line: String = buffer.drain(..=pos).collect();
                    for text in parse_event_line(line.trim_end_matches(['\n', '\r'])) {
                        let (fragment, stopped) = split_at_stop(&text, &stop);
                        if stopped {
                            tracing::debug!("stop sequence hit, ending completion stream");
                            yield Ok(fragment);
                            return;
                        }
                        yield Ok(fragment);
                    }
                }
            }

            // Trailing line without a final newline.
            for text in parse_event_line(buffer.trim_end_matches('\r')) {
                let (fragment, stopped) = split_at_stop(&text, &stop);
                yield Ok(fragment);
                if stopped {
                    return;
                }
            }
        })
    }
}
