//! Data persistence layer for Recast
//!
//! This module provides SQLite-based storage for uploaded traces, replay
//! task records and analysis results.

mod analysis_store;
mod database;
mod migrations;
mod models;
mod task_store;
mod trace_store;

pub use analysis_store::AnalysisStore;
pub use database::{Database, DatabaseError};
pub use models::{AnalysisJob, AnalysisJobStatus, TraceFile};
pub use task_store::ReplayTaskStore;
pub use trace_store::TraceStore;
