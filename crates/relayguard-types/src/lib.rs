//! Shared domain types for Relayguard.
//!
//! Plain data shapes with no I/O: chat transcript types, screening
//! verdicts, completion wire shapes, the error taxonomy, and the
//! environment-driven runtime configuration.

pub mod chat;
pub mod completion;
pub mod config;
pub mod error;
pub mod screening;
