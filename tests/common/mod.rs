//! Shared test utilities for Recast
//!
//! This module provides common helpers for integration tests:
//! - Synthetic pcap/pcapng capture builders
//! - Frame builders for decodable ethernet/IPv4 traffic

pub mod captures;
