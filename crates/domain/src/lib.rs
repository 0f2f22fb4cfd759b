//! # convoflow-domain
//!
//! Pure domain model for the convoflow conversation automation engine.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps and clocks
//! - Define **Contacts** (the people automations talk to, with tags and custom fields)
//! - Define **Trigger events** (inbound messages, button clicks, webhook calls, …)
//! - Define **Automations** (trigger → action-chain rules) and their load-time checks
//! - Define **Queue jobs** (deferred work with retry bookkeeping)
//! - Contain all invariant enforcement and domain logic
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod automation;
pub mod contact;
pub mod event;
pub mod job;
