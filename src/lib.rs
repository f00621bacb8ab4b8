pub mod api;
pub mod approval;
pub mod config;
pub mod destination;
pub mod diagnostics;
pub mod error;
pub mod fetch;
pub mod grouping;
pub mod http;
pub mod model;
pub mod normalization;
pub mod orchestrator;
pub mod providers;
pub mod reconcile;
pub mod retry;
pub mod snapshot;
pub mod summary;

pub mod util {
    pub mod env;
    pub mod logging;
}

pub use config::SyncConfig;
pub use orchestrator::SyncOrchestrator;
pub use summary::{RunSummary, SyncState};
