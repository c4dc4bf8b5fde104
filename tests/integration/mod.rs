//! Integration tests for Recast
//!
//! These tests verify that multiple components work together correctly.

#[path = "../common/mod.rs"]
pub mod common;

pub mod cli;
pub mod replay_flow;
pub mod trace_analysis;
pub mod web_api;
