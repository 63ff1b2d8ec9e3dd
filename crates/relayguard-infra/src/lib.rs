//! Infrastructure clients for Relayguard's two upstream services.
//!
//! [`guard::GuardClient`] wraps the content-safety screening endpoint;
//! [`llm::CompletionClient`] wraps the token-streaming completion
//! endpoint. Both implement the trait seams from `relayguard-core`.

pub mod guard;
pub mod llm;
