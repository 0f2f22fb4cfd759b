//! # convoflow-adapter-webhook-reqwest
//!
//! HTTP client adapter for `webhook` actions, built on
//! [reqwest](https://docs.rs/reqwest).
//!
//! ## Responsibilities
//! - Implement the `WebhookClient` port defined in `convoflow-app::ports`
//! - Apply the per-request timeout and custom headers
//! - Send the body as JSON on every verb except `GET`
//!
//! ## Dependency rule
//! Depends on `convoflow-app` (for the port trait) and `convoflow-domain`.
//! The `app` and `domain` crates must never reference this adapter.

mod client;
mod error;

pub use client::ReqwestWebhookClient;
pub use error::WebhookError;
