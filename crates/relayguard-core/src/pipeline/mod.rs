//! The message-processing pipeline.
//!
//! One execution per inbound request, stages strictly sequential:
//!
//! `Received -> PreScreening -> Generating -> PostScreening -> Delivering -> Done`
//!
//! The pipeline validates the prompt, screens it, fully drains the
//! completion stream into one buffered reply, re-screens that reply as a
//! whole, and only then releases it to the caller as a paced sequence of
//! re-chunked fragments. Nothing generated is forwarded before the
//! post-generation screen has seen all of it.
//!
//! No failure in here propagates as a fault to the caller: screening
//! failures resolve through the configured [`FailurePolicy`], and a dead
//! completion stream degrades to an empty reply.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};

use relayguard_types::chat::{SessionId, Turn};
use relayguard_types::screening::FailurePolicy;

use crate::complete::Completer;
use crate::screen::Screener;
use crate::session::SessionStore;

/// Fixed reply substituted when the user's message is flagged.
pub const INPUT_BLOCKED_MESSAGE: &str = "Guard identified a threat. No user was harmed by this \
     LLM. Your message has been flagged and was not processed.";

/// Fixed reply substituted when the generated output is flagged.
pub const OUTPUT_BLOCKED_MESSAGE: &str = "Guard blocked harmful LLM output. No user was harmed.";

/// Minimum delivery fragment size in bytes.
const MIN_FRAGMENT_BYTES: usize = 4;

/// Roughly how many fragments a delivered reply is split into.
const TARGET_FRAGMENT_COUNT: usize = 10;

/// Text fragments released to the caller, already paced.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = String> + Send + 'static>>;

/// Result of one pipeline execution.
pub enum ChatOutcome {
    /// The trimmed prompt was empty; nothing was recorded or generated.
    Empty,
    /// The reply (generated or blocked-message) as a fragment stream.
    Reply(DeliveryStream),
}

/// Pipeline behavior knobs, split out from the full relay config so the
/// pipeline stays independent of the environment layer.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub input_fail_policy: FailurePolicy,
    pub output_fail_policy: FailurePolicy,
    pub pacing_delay: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            input_fail_policy: FailurePolicy::FailOpen,
            output_fail_policy: FailurePolicy::FailOpen,
            pacing_delay: Duration::from_millis(100),
        }
    }
}

/// Orchestrates screening, generation, and delivery for one session.
pub struct ChatPipeline<S, C> {
    store: Arc<SessionStore>,
    screener: Arc<S>,
    completer: Arc<C>,
    options: PipelineOptions,
}

impl<S, C> ChatPipeline<S, C>
where
    S: Screener,
    C: Completer,
{
    pub fn new(
        store: Arc<SessionStore>,
        screener: Arc<S>,
        completer: Arc<C>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store,
            screener,
            completer,
            options,
        }
    }

    /// Run the full pipeline for one inbound message.
    pub async fn handle(&self, session_id: SessionId, prompt: &str) -> ChatOutcome {
        // Received
        let prompt = prompt.trim();
        if prompt.is_empty() {
            tracing::info!(session = %session_id, "rejecting empty prompt");
            return ChatOutcome::Empty;
        }

        let turns = self.store.get_or_create(&session_id);
        turns.lock().await.push(Turn::user(prompt));
        tracing::info!(session = %session_id, prompt = %prompt, "user message accepted");

        // PreScreening
        if self.is_flagged(&session_id, prompt, None).await {
            tracing::warn!(session = %session_id, "user message flagged, generation skipped");
            turns.lock().await.push(Turn::assistant(INPUT_BLOCKED_MESSAGE));
            return ChatOutcome::Reply(single_fragment(INPUT_BLOCKED_MESSAGE));
        }

        // Generating -- drain the whole stream before anything is released.
        let reply = self.collect_reply(&session_id, prompt).await;

        // PostScreening
        tracing::info!(session = %session_id, "screening generated reply");
        if self.is_flagged(&session_id, prompt, Some(&reply)).await {
            tracing::warn!(session = %session_id, "generated reply flagged, withholding it");
            turns
                .lock()
                .await
                .push(Turn::assistant(OUTPUT_BLOCKED_MESSAGE));
            return ChatOutcome::Reply(single_fragment(OUTPUT_BLOCKED_MESSAGE));
        }

        turns.lock().await.push(Turn::assistant(reply.clone()));
        tracing::info!(session = %session_id, reply = %reply, "reply approved");

        // Delivering
        ChatOutcome::Reply(paced(chunk_text(&reply), self.options.pacing_delay))
    }

    /// Screen one stage, resolving classifier failure via the stage's
    /// configured policy. `output` is `None` for the input stage.
    async fn is_flagged(&self, session_id: &SessionId, input: &str, output: Option<&str>) -> bool {
        let policy = if output.is_none() {
            self.options.input_fail_policy
        } else {
            self.options.output_fail_policy
        };

        match self.screener.screen(input, output).await {
            Ok(verdict) => {
                tracing::debug!(
                    session = %session_id,
                    flagged = verdict.flagged,
                    raw = %verdict.raw,
                    "screening verdict"
                );
                verdict.flagged
            }
            Err(e) => {
                tracing::error!(session = %session_id, error = %e, policy = %policy, "screening failed");
                policy == FailurePolicy::FailClosed
            }
        }
    }

    /// Drain the completion stream into one string.
    ///
    /// A transport error discards anything collected so far and yields
    /// an empty reply; post-screening then runs on empty text. Zero
    /// fragments is a valid degenerate outcome.
    async fn collect_reply(&self, session_id: &SessionId, prompt: &str) -> String {
        let mut reply = String::new();
        let mut stream = self.completer.stream(prompt);
        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => reply.push_str(&fragment),
                Err(e) => {
                    tracing::error!(session = %session_id, error = %e, "completion stream failed");
                    return String::new();
                }
            }
        }
        reply
    }
}

/// Re-chunk approved text into delivery fragments.
///
/// Fragment size is `max(4, len / 10)` bytes, so a reply yields roughly
/// ten fragments regardless of absolute length, with a floor that avoids
/// degenerate single-character fragments. Splits only on char
/// boundaries; concatenation of the fragments equals the input exactly.
pub fn chunk_text(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let target = std::cmp::max(MIN_FRAGMENT_BYTES, text.len() / TARGET_FRAGMENT_COUNT);

    let mut fragments = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if current.len() >= target {
            fragments.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        fragments.push(current);
    }
    fragments
}

/// Emit fragments in order with a fixed delay after each one, imitating
/// live generation even though the reply is already complete. Dropping
/// the stream (client disconnect) stops emission cleanly.
fn paced(fragments: Vec<String>, delay: Duration) -> DeliveryStream {
    Box::pin(async_stream::stream! {
        for fragment in fragments {
            yield fragment;
            tokio::time::sleep(delay).await;
        }
    })
}

/// A whole reply delivered as one unpaced fragment (blocked messages).
fn single_fragment(text: &str) -> DeliveryStream {
    Box::pin(futures_util::stream::iter([text.to_string()]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use relayguard_types::chat::Role;
    use relayguard_types::error::{CompletionError, ScreeningError};
    use relayguard_types::screening::ScreeningVerdict;

    /// Per-stage scripted verdict: Some(flagged) or None to fail the call.
    struct ScriptedScreener {
        input: Option<bool>,
        output: Option<bool>,
        input_calls: AtomicUsize,
        output_calls: AtomicUsize,
    }

    impl ScriptedScreener {
        fn new(input: Option<bool>, output: Option<bool>) -> Self {
            Self {
                input,
                output,
                input_calls: AtomicUsize::new(0),
                output_calls: AtomicUsize::new(0),
            }
        }

        fn allow_all() -> Self {
            Self::new(Some(false), Some(false))
        }
    }

    impl Screener for ScriptedScreener {
        async fn screen(
            &self,
            _input: &str,
            output: Option<&str>,
        ) -> Result<ScreeningVerdict, ScreeningError> {
            let verdict = if output.is_none() {
                self.input_calls.fetch_add(1, Ordering::SeqCst);
                self.input
            } else {
                self.output_calls.fetch_add(1, Ordering::SeqCst);
                self.output
            };
            match verdict {
                Some(flagged) => Ok(ScreeningVerdict::from_payload(
                    serde_json::json!({ "flagged": flagged }),
                )),
                None => Err(ScreeningError::Transport("connection refused".to_string())),
            }
        }
    }

    /// Replays a fixed fragment script; counts how often it is opened.
    struct ScriptedCompleter {
        fragments: Vec<Result<String, ()>>,
        calls: AtomicUsize,
    }

    impl ScriptedCompleter {
        fn of(fragments: &[&str]) -> Self {
            Self {
                fragments: fragments.iter().map(|f| Ok(f.to_string())).collect(),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing_after(fragments: &[&str]) -> Self {
            let mut script: Vec<Result<String, ()>> =
                fragments.iter().map(|f| Ok(f.to_string())).collect();
            script.push(Err(()));
            Self {
                fragments: script,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Completer for ScriptedCompleter {
        fn stream(&self, _prompt: &str) -> crate::complete::FragmentStream {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let items: Vec<Result<String, CompletionError>> = self
                .fragments
                .iter()
                .map(|item| match item {
                    Ok(text) => Ok(text.clone()),
                    Err(()) => Err(CompletionError::Transport("reset by peer".to_string())),
                })
                .collect();
            Box::pin(futures_util::stream::iter(items))
        }
    }

    fn pipeline(
        screener: ScriptedScreener,
        completer: ScriptedCompleter,
    ) -> (
        Arc<SessionStore>,
        Arc<ScriptedScreener>,
        Arc<ScriptedCompleter>,
        ChatPipeline<ScriptedScreener, ScriptedCompleter>,
    ) {
        let store = Arc::new(SessionStore::new());
        let screener = Arc::new(screener);
        let completer = Arc::new(completer);
        let options = PipelineOptions {
            pacing_delay: Duration::ZERO,
            ..PipelineOptions::default()
        };
        let p = ChatPipeline::new(
            Arc::clone(&store),
            Arc::clone(&screener),
            Arc::clone(&completer),
            options,
        );
        (store, screener, completer, p)
    }

    async fn delivered(outcome: ChatOutcome) -> Option<String> {
        match outcome {
            ChatOutcome::Empty => None,
            ChatOutcome::Reply(mut stream) => {
                let mut text = String::new();
                while let Some(fragment) = stream.next().await {
                    text.push_str(&fragment);
                }
                Some(text)
            }
        }
    }

    #[tokio::test]
    async fn test_empty_prompt_mutates_nothing() {
        let (store, screener, _, p) =
            pipeline(ScriptedScreener::allow_all(), ScriptedCompleter::of(&["4"]));
        let id = SessionId::new();

        let outcome = p.handle(id, "   ").await;
        assert!(matches!(outcome, ChatOutcome::Empty));
        assert!(store.transcript(&id).await.is_empty());
        assert_eq!(screener.input_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_happy_path_records_both_turns() {
        let (store, _, _, p) =
            pipeline(ScriptedScreener::allow_all(), ScriptedCompleter::of(&["4"]));
        let id = SessionId::new();

        let outcome = p.handle(id, "What is 2+2?").await;
        assert_eq!(delivered(outcome).await.as_deref(), Some("4"));

        let transcript = store.transcript(&id).await;
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0], Turn::user("What is 2+2?"));
        assert_eq!(transcript[1], Turn::assistant("4"));
    }

    #[tokio::test]
    async fn test_flagged_input_skips_generation() {
        let (store, screener, completer, p) = pipeline(
            ScriptedScreener::new(Some(true), Some(false)),
            ScriptedCompleter::of(&["never"]),
        );
        let id = SessionId::new();

        let outcome = p.handle(id, "do something bad").await;
        assert_eq!(
            delivered(outcome).await.as_deref(),
            Some(INPUT_BLOCKED_MESSAGE)
        );

        assert_eq!(completer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(screener.output_calls.load(Ordering::SeqCst), 0);

        let transcript = store.transcript(&id).await;
        assert_eq!(transcript[1], Turn::assistant(INPUT_BLOCKED_MESSAGE));
    }

    #[tokio::test]
    async fn test_flagged_output_is_withheld() {
        let (store, _, _, p) = pipeline(
            ScriptedScreener::new(Some(false), Some(true)),
            ScriptedCompleter::of(&["something ", "harmful"]),
        );
        let id = SessionId::new();

        let outcome = p.handle(id, "hi").await;
        assert_eq!(
            delivered(outcome).await.as_deref(),
            Some(OUTPUT_BLOCKED_MESSAGE)
        );

        // The raw generated text is never persisted or delivered.
        let transcript = store.transcript(&id).await;
        assert_eq!(transcript[1], Turn::assistant(OUTPUT_BLOCKED_MESSAGE));
    }

    #[tokio::test]
    async fn test_screening_failure_fails_open_by_default() {
        let (store, _, _, p) = pipeline(
            ScriptedScreener::new(None, None),
            ScriptedCompleter::of(&["fine"]),
        );
        let id = SessionId::new();

        let outcome = p.handle(id, "hello").await;
        assert_eq!(delivered(outcome).await.as_deref(), Some("fine"));
        assert_eq!(store.transcript(&id).await[1], Turn::assistant("fine"));
    }

    #[tokio::test]
    async fn test_input_screening_failure_fails_closed_when_configured() {
        let store = Arc::new(SessionStore::new());
        let screener = Arc::new(ScriptedScreener::new(None, Some(false)));
        let completer = Arc::new(ScriptedCompleter::of(&["never"]));
        let p = ChatPipeline::new(
            Arc::clone(&store),
            Arc::clone(&screener),
            Arc::clone(&completer),
            PipelineOptions {
                input_fail_policy: FailurePolicy::FailClosed,
                pacing_delay: Duration::ZERO,
                ..PipelineOptions::default()
            },
        );
        let id = SessionId::new();

        let outcome = p.handle(id, "hello").await;
        assert_eq!(
            delivered(outcome).await.as_deref(),
            Some(INPUT_BLOCKED_MESSAGE)
        );
        assert_eq!(completer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_output_screening_failure_fails_closed_when_configured() {
        let store = Arc::new(SessionStore::new());
        let screener = Arc::new(ScriptedScreener::new(Some(false), None));
        let completer = Arc::new(ScriptedCompleter::of(&["draft"]));
        let p = ChatPipeline::new(
            Arc::clone(&store),
            screener,
            completer,
            PipelineOptions {
                output_fail_policy: FailurePolicy::FailClosed,
                pacing_delay: Duration::ZERO,
                ..PipelineOptions::default()
            },
        );
        let id = SessionId::new();

        let outcome = p.handle(id, "hello").await;
        assert_eq!(
            delivered(outcome).await.as_deref(),
            Some(OUTPUT_BLOCKED_MESSAGE)
        );
        assert_eq!(
            store.transcript(&id).await[1],
            Turn::assistant(OUTPUT_BLOCKED_MESSAGE)
        );
    }

    #[tokio::test]
    async fn test_completion_failure_discards_partial_reply() {
        let (store, screener, _, p) = pipeline(
            ScriptedScreener::allow_all(),
            ScriptedCompleter::failing_after(&["par", "tial"]),
        );
        let id = SessionId::new();

        let outcome = p.handle(id, "hello").await;
        assert_eq!(delivered(outcome).await.as_deref(), Some(""));
        assert_eq!(store.transcript(&id).await[1], Turn::assistant(""));
        // Post-screening still ran, on the empty text.
        assert_eq!(screener.output_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dead_stream_yields_empty_reply() {
        let (store, screener, _, p) = pipeline(
            ScriptedScreener::allow_all(),
            ScriptedCompleter::failing_after(&[]),
        );
        let id = SessionId::new();

        let outcome = p.handle(id, "hello").await;
        assert_eq!(delivered(outcome).await.as_deref(), Some(""));

        // One user turn plus one (empty) assistant turn.
        let transcript = store.transcript(&id).await;
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].role, Role::Assistant);
        assert_eq!(transcript[1].content, "");
        assert_eq!(screener.output_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_delivery_reassembles_exactly() {
        let reply = "The quick brown fox jumps over the lazy dog, twice over.";
        let (_, _, _, p) = pipeline(
            ScriptedScreener::allow_all(),
            ScriptedCompleter::of(&[reply]),
        );

        let outcome = p.handle(SessionId::new(), "tell me").await;
        assert_eq!(delivered(outcome).await.as_deref(), Some(reply));
    }

    #[test]
    fn test_chunk_text_sizing() {
        // 100 bytes -> target 10 -> ten fragments.
        let text = "x".repeat(100);
        let fragments = chunk_text(&text);
        assert_eq!(fragments.len(), 10);
        assert!(fragments.iter().all(|f| f.len() == 10));
    }

    #[test]
    fn test_chunk_text_floor_for_short_replies() {
        let fragments = chunk_text("short");
        // Floor of 4 bytes: "shor" + "t".
        assert_eq!(fragments, vec!["shor".to_string(), "t".to_string()]);
    }

    #[test]
    fn test_chunk_text_empty() {
        assert!(chunk_text("").is_empty());
    }

    #[test]
    fn test_chunk_text_is_lossless() {
        for text in ["4", "tiny", "a somewhat longer reply with spaces", "héllo wörld émojis ✨✨✨"] {
            assert_eq!(chunk_text(text).concat(), text);
        }
    }

    #[test]
    fn test_chunk_text_respects_char_boundaries() {
        // Multi-byte chars must never be split mid-sequence.
        let text = "éééééééééé";
        for fragment in chunk_text(text) {
            assert!(fragment.is_char_boundary(fragment.len()));
            assert!(!fragment.is_empty());
        }
    }
}
