//! # convoflow-adapter-http-axum
//!
//! HTTP adapter built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - Accept **inbound trigger events** from channel gateways:
//!   messages, button clicks and per-automation webhooks
//! - Expose manual execution of an automation for a known contact
//! - Report queue statistics and stream engine events over SSE
//! - Map application results and errors into JSON responses
//!
//! Automation management (CRUD) is not exposed over HTTP.
//!
//! ## Dependency rule
//! Depends on `convoflow-app` (engine and port traits) and `convoflow-domain`
//! (for domain types used in request/response mapping). Never leaks axum types
//! into the domain.

pub mod api;
pub mod error;
pub mod router;
pub mod state;

#[cfg(test)]
mod test_support;
