//! # TaxDesk Worker Library
//!
//! Background maintenance for TaxDesk.
//!
//! ## Modules
//!
//! - `config`: Worker configuration from the environment
//! - `reminder`: Mails clients the tasks still waiting on them
//! - `sweeper`: Retries file removals that failed after a committed delete

pub mod config;
pub mod reminder;
pub mod sweeper;
