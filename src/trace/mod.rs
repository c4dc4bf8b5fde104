//! Capture file parsing and analysis

mod analyzer;
mod packet;
mod parser;

pub use analyzer::{
    analyze_file, trace_details, Analyzer, AttackPathGraph, FullAnalysis, Statistics,
    TimelineBucket, TraceDetails,
};
pub use packet::{decode, PacketSummary, Protocol};
#[cfg(test)]
pub(crate) use packet::build_ipv4_frame;
pub use parser::{
    has_capture_extension, read_info, PacketRecord, TraceError, TraceFormat, TraceInfo,
    TraceReader,
};
