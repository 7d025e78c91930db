//! # TaxDesk Shared Library
//!
//! Records, persistence and the consistency rules shared by the TaxDesk
//! services and the background worker.
//!
//! ## Module Organization
//!
//! - `models`: Client, TaskList, Task, Comment, File, Activity records and their SQL
//! - `store`: Document-store seam (`DocumentStore`, `StoreTransaction`) with
//!   PostgreSQL and in-memory implementations
//! - `cascade`: Transactional cascade deletion with post-commit disk cleanup
//! - `files`: Disk removal and the orphaned-file retry queue
//! - `notify`: Injected notification capability
//! - `services`: Task board flows that build the entity graph, and client reminders
//! - `db`: Connection pool and migrations

pub mod cascade;
pub mod db;
pub mod files;
pub mod models;
pub mod notify;
pub mod services;
pub mod store;

/// Current version of the TaxDesk shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
