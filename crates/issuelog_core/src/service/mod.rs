//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into interception, reconstruction and
//!   revert operations.
//! - Keep callers decoupled from storage details.

pub mod engine;
pub mod error;
pub mod interceptor;
pub mod issue_service;
pub mod resolver;
pub mod revert;
