//! Screener trait definition.
//!
//! The single seam between the pipeline and the external content-safety
//! service. Uses native async fn in traits (RPITIT, Rust 2024 edition);
//! the concrete client lives in `relayguard-infra`.

use relayguard_types::error::ScreeningError;
use relayguard_types::screening::ScreeningVerdict;

/// Stateless client for the external screening call.
///
/// `output` distinguishes the two stages: `None` screens a user
/// utterance before generation, `Some(candidate)` re-screens the
/// generated reply together with the prompt that produced it.
///
/// Implementations return `Err` on transport, timeout, or decode
/// failure; the pipeline decides whether that fails open or closed.
pub trait Screener: Send + Sync {
    fn screen(
        &self,
        input: &str,
        output: Option<&str>,
    ) -> impl std::future::Future<Output = Result<ScreeningVerdict, ScreeningError>> + Send;
}
