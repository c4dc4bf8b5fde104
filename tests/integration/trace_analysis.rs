//! Integration tests for capture parsing and analysis
//!
//! Exercises the reader and analyzer end to end on synthetic captures,
//! plus robustness properties on malformed input.

use std::io::Cursor;

use super::common::captures;
use proptest::prelude::*;
use recast::trace::{
    analyze_file, decode, has_capture_extension, read_info, trace_details, TraceFormat,
    TraceReader,
};
use tempfile::TempDir;

#[test]
fn test_read_info_pcap() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = captures::write_capture(dir.path(), "attack.pcap", &captures::attack_capture());

    let info = read_info(&path).expect("capture should parse");
    assert_eq!(info.format, TraceFormat::Pcap);
    assert_eq!(info.link_type, 1);
    assert_eq!(info.total_packets, 10);
    assert_eq!(info.first_ts, Some(100.0));
    assert_eq!(info.last_ts, Some(109.0));
    assert_eq!(info.duration_secs, Some(9.0));
}

#[test]
fn test_read_info_pcapng() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let frames = [
        captures::udp_frame([10, 0, 0, 1], [10, 0, 0, 2], 5000, 53),
        captures::udp_frame([10, 0, 0, 2], [10, 0, 0, 1], 53, 5000),
        captures::tcp_frame([10, 0, 0, 1], [10, 0, 0, 3], 40000, 80),
    ];
    let bytes =
        captures::build_pcapng(&[frames[0].as_slice(), frames[1].as_slice(), frames[2].as_slice()]);
    let path = captures::write_capture(dir.path(), "modern.pcapng", &bytes);

    let info = read_info(&path).expect("pcapng capture should parse");
    assert_eq!(info.format, TraceFormat::PcapNg);
    assert_eq!(info.total_packets, 3);
    // Enhanced packet blocks carry microsecond timestamps one second apart
    assert_eq!(info.duration_secs, Some(2.0));
}

#[test]
fn test_reader_streams_packet_data() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = captures::write_capture(dir.path(), "small.pcap", &captures::minimal_capture());

    let mut reader = TraceReader::open(&path).expect("capture should open");
    let mut count = 0;
    while let Some(record) = reader.next_packet().expect("records should parse") {
        // Ethernet + IPv4 + the 8 byte transport stub
        assert_eq!(record.data.len(), 42);
        assert_eq!(record.orig_len as usize, record.data.len());
        assert!(record.ts.is_some());
        count += 1;
    }
    assert_eq!(count, 3);
}

#[test]
fn test_full_analysis_of_incident_capture() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = captures::write_capture(dir.path(), "incident.pcap", &captures::attack_capture());

    let analysis = analyze_file(&path).expect("analysis should succeed");

    let stats = &analysis.statistics;
    assert_eq!(stats.total_packets, 10);
    assert!((stats.duration - 9.0).abs() < 1e-9);
    // The scanner sends five of the ten packets
    assert_eq!(stats.top_talkers[0].ip, "192.168.1.50");
    assert_eq!(stats.top_talkers[0].packets, 5);

    let tcp = analysis
        .protocols
        .iter()
        .find(|p| p.name == "TCP")
        .expect("TCP bucket present");
    let udp = analysis
        .protocols
        .iter()
        .find(|p| p.name == "UDP")
        .expect("UDP bucket present");
    assert_eq!(tcp.value, 8);
    assert_eq!(udp.value, 2);

    // Flows aggregate by direction and protocol
    assert!(!analysis.flows.is_empty());
    assert_eq!(analysis.flows[0].packets, 2);

    // Every host that appears in a link is a node
    let graph = &analysis.attack_path;
    assert_eq!(graph.nodes.len(), 4);
    assert_eq!(graph.links.len(), 6);
    assert_eq!(graph.categories.len(), 3);
    for link in &graph.links {
        assert!(graph.nodes.iter().any(|n| n.id == link.source));
        assert!(graph.nodes.iter().any(|n| n.id == link.target));
    }

    // One bucket per active second, in order
    let timeline = &analysis.timeline;
    assert_eq!(timeline.len(), 7);
    assert_eq!(timeline[0].time, 100);
    assert_eq!(timeline[0].packets, 2);
    assert!(timeline.windows(2).all(|w| w[0].time < w[1].time));
}

#[test]
fn test_trace_details_breakdown() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = captures::write_capture(dir.path(), "detail.pcap", &captures::attack_capture());

    let details = trace_details(&path).expect("details should succeed");
    assert_eq!(details.total_packets, 10);
    assert_eq!(details.protocols.get("IP"), Some(&10));
    assert_eq!(details.protocols.get("TCP"), Some(&8));
    assert_eq!(details.protocols.get("UDP"), Some(&2));

    assert_eq!(details.top_src_ips[0].ip, "192.168.1.50");
    assert!(details.top_dst_ports.iter().any(|p| p.port == 80));
    assert!(details.top_dst_ports.iter().any(|p| p.port == 5432));
}

#[test]
fn test_capture_extension_filter() {
    assert!(has_capture_extension("trace.pcap"));
    assert!(has_capture_extension("trace.pcapng"));
    assert!(has_capture_extension("legacy.cap"));
    assert!(has_capture_extension("SHOUTY.PCAP"));
    assert!(!has_capture_extension("notes.txt"));
    assert!(!has_capture_extension("payload.exe"));
    assert!(!has_capture_extension("pcap"));
}

#[test]
fn test_junk_bytes_are_rejected() {
    let result = TraceReader::from_reader(Cursor::new(b"GIF89a definitely not a capture".to_vec()));
    assert!(result.is_err());
}

#[test]
fn test_empty_input_is_rejected() {
    let result = TraceReader::from_reader(Cursor::new(Vec::new()));
    assert!(result.is_err());
}

proptest! {
    /// Decoding never panics, whatever bytes the capture holds
    #[test]
    fn decode_survives_arbitrary_frames(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let summary = decode(1, &data);
        // A frame too short for ethernet plus a full IPv4 header cannot
        // yield addresses
        if data.len() < 34 {
            prop_assert!(summary.src.is_none());
            prop_assert!(summary.dst.is_none());
        }
    }

    /// A truncated capture errors or ends cleanly, never panics or hangs
    #[test]
    fn reader_survives_truncation(cut in 0usize..600) {
        let full = captures::attack_capture();
        let cut = cut.min(full.len());
        let truncated = full[..cut].to_vec();

        if let Ok(mut reader) = TraceReader::from_reader(Cursor::new(truncated)) {
            let mut steps = 0;
            loop {
                match reader.next_packet() {
                    Ok(Some(_)) => steps += 1,
                    Ok(None) | Err(_) => break,
                }
                prop_assert!(steps <= 10, "cannot yield more packets than the full file");
            }
        }
    }
}
