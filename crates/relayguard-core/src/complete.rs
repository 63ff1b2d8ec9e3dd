//! Completer trait definition.
//!
//! Seam between the pipeline and the token-streaming completion
//! service. `stream` returns a boxed stream so the pipeline can hold it
//! without naming the concrete type; the reqwest-backed client lives in
//! `relayguard-infra`.

use std::pin::Pin;

use futures_util::Stream;

use relayguard_types::error::CompletionError;

/// A finite, lazily-produced sequence of generated text fragments.
///
/// Terminates on the upstream end marker, on a stop-sequence match, or
/// with a single terminal `Err` on transport failure. Not restartable;
/// each [`Completer::stream`] call opens a fresh upstream connection.
pub type FragmentStream =
    Pin<Box<dyn Stream<Item = Result<String, CompletionError>> + Send + 'static>>;

/// Stateless client for the streaming completion call.
pub trait Completer: Send + Sync {
    fn stream(&self, prompt: &str) -> FragmentStream;
}
