//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `issuelog_core` linkage.
//! - Load an optional JSON `EngineConfig` (first argument), start file logging
//!   when it names a `log_dir`, and open its `db_path` or an in-memory store.
//! - Record a tiny issue history and print the reverted view, so the
//!   interceptor, resolver and revert paths are exercised end to end.

use issuelog_core::db::{open_db_in_memory, open_db_with_config};
use issuelog_core::{
    flush_logging, init_logging, EngineConfig, HistoryEngine, Issue, IssueService, ManualClock,
    SqliteHistoryStore, Thesis, ThesisPosition,
};
use std::error::Error;

fn load_config() -> Result<EngineConfig, Box<dyn Error>> {
    match std::env::args().nth(1) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .map_err(|err| format!("failed to read config `{path}`: {err}"))?;
            Ok(EngineConfig::from_json_str(&raw)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    println!("issuelog_core ping={}", issuelog_core::ping());
    println!("issuelog_core version={}", issuelog_core::core_version());

    let config = load_config()?;
    let logging = init_logging(&config)?;
    println!("issuelog_core logging={logging}");

    let conn = match config.db_path {
        Some(_) => open_db_with_config(&config)?,
        None => open_db_in_memory()?,
    };
    let store = SqliteHistoryStore::try_new(&conn)?;
    let clock = ManualClock::new(1_000);
    let service =
        IssueService::new(HistoryEngine::with_clock(store, clock.clone()).configured(&config));

    let issue_id = service.create_issue(&Issue::new("Smoke issue", "smoke run"), 1_000)?;
    let thesis_id = service.create_thesis_for_issue(
        issue_id,
        &Thesis::new("Original", ThesisPosition::For),
        1_100,
    )?;
    let checkpoint = service.version_count(issue_id)?;
    service.update_thesis(thesis_id, &Thesis::new("Revised", ThesisPosition::For), 1_200)?;

    clock.set(1_300);
    let reverted = service.revert_to(issue_id, checkpoint)?;
    println!(
        "issuelog_core revert target={} root_index={} updated_children={}",
        reverted.target_index,
        reverted.root_index,
        reverted.updated_children.len()
    );
    println!("{}", serde_json::to_string_pretty(&reverted.view)?);
    flush_logging();
    Ok(())
}
