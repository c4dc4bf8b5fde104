//! Route definitions for the recast web API.

pub mod api;
