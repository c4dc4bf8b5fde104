//! HTTP request handlers for the recast web API.

pub mod analysis;
pub mod replay;
pub mod traces;
