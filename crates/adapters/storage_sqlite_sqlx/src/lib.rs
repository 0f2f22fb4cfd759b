//! # convoflow-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the store ports defined in `convoflow-app::ports`:
//!   automations, contacts (with the outbound message log), queue jobs and
//!   analytics records
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Map between domain types and database rows
//!
//! ## Dependency rule
//! Depends on `convoflow-app` (for port traits) and `convoflow-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

pub mod analytics;
pub mod automation_repo;
pub mod contact_store;
pub mod error;
pub mod job_store;
pub mod pool;
mod codec;

pub use analytics::SqliteAnalyticsSink;
pub use automation_repo::SqliteAutomationRepository;
pub use contact_store::SqliteContactStore;
pub use job_store::SqliteJobStore;
pub use pool::{Config, Database};
