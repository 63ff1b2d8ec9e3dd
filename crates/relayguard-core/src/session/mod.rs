//! Session-scoped chat history.

pub mod store;

pub use store::SessionStore;
