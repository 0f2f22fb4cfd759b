//! # convoflow-app
//!
//! Application layer: the automation engine and the **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement:
//!   - `AutomationRepository`: CRUD for automation definitions
//!   - `ContactStore`: contact lookup, mutation and message log
//!   - `JobStore`: durable queue job records
//!   - `ChannelSender`, `TemplateRenderer`, `WebhookClient`, `AnalyticsSink`
//!   - `EventPublisher`: outbound engine notifications
//! - Run automations:
//!   - `AutomationRegistry`: compiled, active definitions indexed by trigger
//!   - `ActionExecutor`: walks an action chain for one contact
//!   - `QueueManager`: prioritized, delayed, retried background jobs
//!   - `AutomationEngine`: matches trigger events and resumes suspended walks
//! - Provide **in-process infrastructure** (event bus, in-memory job store)
//!
//! ## Dependency rule
//! Depends on `convoflow-domain` only (plus `tokio` for timers and tasks).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod config;
pub mod engine;
pub mod event_bus;
pub mod executor;
pub mod handlers;
pub mod job_store;
pub mod ports;
pub mod queue;
pub mod registry;
pub mod schedule;
pub mod services;

#[cfg(test)]
mod testing;
