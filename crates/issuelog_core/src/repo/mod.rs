//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the version log and membership tracker contracts.
//! - Isolate SQLite query details from interception, reconstruction and
//!   revert orchestration.
//!
//! # Invariants
//! - Repositories append or close records; they never rewrite history.
//! - Repository APIs return semantic errors (`VersionNotFound`,
//!   `NotAttached`, ...) in addition to DB transport errors.

pub mod history;
pub mod membership_repo;
pub mod store;
pub mod version_repo;
