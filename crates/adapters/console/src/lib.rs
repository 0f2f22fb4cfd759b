//! # convoflow-adapter-console
//!
//! Development collaborators for running the engine without real channel
//! gateways.
//!
//! | Collaborator | Port | Behaviour |
//! |--------------|------|-----------|
//! | [`LogChannelSender`] | `ChannelSender` | Logs each message and reports it delivered |
//! | [`PlaceholderRenderer`] | `TemplateRenderer` | Substitutes `{{placeholder}}` values from the contact and variables |
//!
//! ## Dependency rule
//!
//! Depends on `convoflow-app` (port traits) and `convoflow-domain` only.

mod channel;
mod templates;

pub use channel::LogChannelSender;
pub use templates::PlaceholderRenderer;
