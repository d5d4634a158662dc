//! Temporal versioning and reconstruction for issue/thesis aggregates.
//!
//! Records every attribute and membership change as immutable history,
//! rebuilds an aggregate as of any instant, and reverts an aggregate by
//! writing new forward versions.

pub mod clock;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use config::{default_log_level, ConfigError, EngineConfig};
pub use logging::{flush_logging, init_logging, logging_status, LoggingError};
pub use model::aggregate::{
    AggregateView, ChildSnapshot, Inconsistency, InconsistencyKind, RevertedAggregate,
};
pub use model::entity::{Attributes, EntityId, EntityKind};
pub use model::issue::{AttributeError, Issue, Thesis, ThesisPosition};
pub use model::version::{MembershipInterval, Version, VersionEvent};
pub use repo::history::VersionHistory;
pub use repo::membership_repo::MembershipTracker;
pub use repo::store::{HistoryStore, RepoError, RepoResult, SqliteHistoryStore};
pub use repo::version_repo::VersionLog;
pub use service::engine::HistoryEngine;
pub use service::error::{EngineError, EngineResult};
pub use service::interceptor::{ChangeInterceptor, MembershipChange};
pub use service::issue_service::{
    IssueResult, IssueService, IssueServiceError, IssueSnapshot, ThesisSnapshot,
};
pub use service::resolver::PointInTimeResolver;
pub use service::revert::RevertEngine;

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
