//! HTTP interface: REST API over the trace library, replay engine and
//! analysis jobs.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;

pub use server::{build_router, run_server};
pub use state::WebAppState;
