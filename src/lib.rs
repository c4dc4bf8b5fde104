pub mod analysis;
pub mod config;
pub mod data;
pub mod replay;
pub mod sandbox;
pub mod trace;
pub mod util;
pub mod web;

pub use analysis::AnalysisManager;
pub use config::{Config, ReplaySettings, SandboxSettings, ServerSettings};
pub use data::{
    AnalysisJob, AnalysisJobStatus, AnalysisStore, Database, ReplayTaskStore, TraceFile,
    TraceStore,
};
pub use replay::{ReplayManager, ReplayTask, StartRequest, TaskState};
pub use sandbox::{DockerGateway, MockSandbox, SandboxGateway, SandboxHandle};
pub use trace::{analyze_file, read_info, FullAnalysis, TraceFormat, TraceInfo, TraceReader};
pub use web::{build_router, run_server, WebAppState};
