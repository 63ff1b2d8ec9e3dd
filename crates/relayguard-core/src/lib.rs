//! Domain logic for Relayguard.
//!
//! Holds the in-memory session store, the [`Screener`]/[`Completer`]
//! trait seams (implementations live in `relayguard-infra`), and the
//! [`ChatPipeline`] that orchestrates screening, generation, and paced
//! delivery.
//!
//! [`Screener`]: crate::screen::Screener
//! [`Completer`]: crate::complete::Completer
//! [`ChatPipeline`]: crate::pipeline::ChatPipeline

pub mod complete;
pub mod pipeline;
pub mod screen;
pub mod session;
