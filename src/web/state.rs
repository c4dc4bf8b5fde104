//! Shared state for the recast web server.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::analysis::AnalysisManager;
use crate::config::Config;
use crate::data::TraceStore;
use crate::replay::ReplayManager;

/// State handed to every request handler. Cloning is cheap; all
/// components are shared.
#[derive(Clone)]
pub struct WebAppState {
    inner: Arc<AppShared>,
}

struct AppShared {
    config: Config,
    trace_store: Option<TraceStore>,
    replay: ReplayManager,
    analysis: AnalysisManager,
    uploads_dir: PathBuf,
}

impl WebAppState {
    pub fn new(
        config: Config,
        trace_store: Option<TraceStore>,
        replay: ReplayManager,
        analysis: AnalysisManager,
        uploads_dir: PathBuf,
    ) -> Self {
        Self {
            inner: Arc::new(AppShared {
                config,
                trace_store,
                replay,
                analysis,
                uploads_dir,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Trace library store, absent when the database could not be opened
    pub fn trace_store(&self) -> Option<&TraceStore> {
        self.inner.trace_store.as_ref()
    }

    pub fn replay(&self) -> &ReplayManager {
        &self.inner.replay
    }

    pub fn analysis(&self) -> &AnalysisManager {
        &self.inner.analysis
    }

    /// Directory holding uploaded trace payloads
    pub fn uploads_dir(&self) -> &Path {
        &self.inner.uploads_dir
    }
}
