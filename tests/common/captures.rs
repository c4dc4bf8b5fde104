//! Synthetic capture builders
//!
//! Integration tests need byte-accurate pcap and pcapng files small
//! enough to assert exact packet counts and timings against. Everything
//! here is built by hand so the tests do not depend on fixture files.

use std::fs;
use std::path::{Path, PathBuf};

/// Ethernet frame carrying an IPv4 packet with the given protocol number
/// and an 8-byte transport header (enough for port extraction).
pub fn ipv4_frame(
    proto: u8,
    src: [u8; 4],
    dst: [u8; 4],
    src_port: u16,
    dst_port: u16,
) -> Vec<u8> {
    let mut frame = Vec::new();
    frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 1]); // dst mac
    frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 2]); // src mac
    frame.extend_from_slice(&0x0800u16.to_be_bytes());

    let mut ip = vec![0u8; 20];
    ip[0] = 0x45;
    ip[8] = 64; // ttl
    ip[9] = proto;
    ip[12..16].copy_from_slice(&src);
    ip[16..20].copy_from_slice(&dst);
    ip[2..4].copy_from_slice(&28u16.to_be_bytes());

    frame.extend_from_slice(&ip);
    frame.extend_from_slice(&src_port.to_be_bytes());
    frame.extend_from_slice(&dst_port.to_be_bytes());
    frame.extend_from_slice(&[0, 0, 0, 0]);
    frame
}

pub fn tcp_frame(src: [u8; 4], dst: [u8; 4], src_port: u16, dst_port: u16) -> Vec<u8> {
    ipv4_frame(6, src, dst, src_port, dst_port)
}

pub fn udp_frame(src: [u8; 4], dst: [u8; 4], src_port: u16, dst_port: u16) -> Vec<u8> {
    ipv4_frame(17, src, dst, src_port, dst_port)
}

/// Little-endian microsecond pcap holding the given (sec, usec, frame)
/// records.
pub fn build_pcap(packets: &[(u32, u32, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0xa1b2c3d4u32.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes()); // version major
    out.extend_from_slice(&4u16.to_le_bytes()); // version minor
    out.extend_from_slice(&0i32.to_le_bytes()); // thiszone
    out.extend_from_slice(&0u32.to_le_bytes()); // sigfigs
    out.extend_from_slice(&65535u32.to_le_bytes()); // snaplen
    out.extend_from_slice(&1u32.to_le_bytes()); // ethernet

    for (sec, usec, data) in packets {
        out.extend_from_slice(&sec.to_le_bytes());
        out.extend_from_slice(&usec.to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
    }
    out
}

/// Minimal little-endian pcapng with one section, one ethernet interface
/// and one enhanced packet block per frame, timestamps one second apart.
pub fn build_pcapng(packets: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();

    // Section header block
    out.extend_from_slice(&0x0a0d0d0au32.to_le_bytes());
    out.extend_from_slice(&28u32.to_le_bytes());
    out.extend_from_slice(&0x1a2b3c4du32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(-1i64).to_le_bytes());
    out.extend_from_slice(&28u32.to_le_bytes());

    // Interface description block
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&20u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&65535u32.to_le_bytes());
    out.extend_from_slice(&20u32.to_le_bytes());

    for (i, data) in packets.iter().enumerate() {
        let padded = (data.len() + 3) & !3;
        let total = 32 + padded as u32;
        let micros = 1_000_000u64 * (i as u64 + 1);

        out.extend_from_slice(&6u32.to_le_bytes());
        out.extend_from_slice(&total.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // interface id
        out.extend_from_slice(&((micros >> 32) as u32).to_le_bytes());
        out.extend_from_slice(&(micros as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
        out.resize(out.len() + (padded - data.len()), 0);
        out.extend_from_slice(&total.to_le_bytes());
    }
    out
}

/// A small incident capture: one host scanning two services over TCP
/// with a DNS lookup mixed in. Ten packets, nine seconds end to end.
pub fn attack_capture() -> Vec<u8> {
    let scanner = [192, 168, 1, 50];
    let web = [10, 0, 0, 10];
    let db = [10, 0, 0, 20];
    let resolver = [10, 0, 0, 53];

    let dns = udp_frame(scanner, resolver, 53012, 53);
    let dns_reply = udp_frame(resolver, scanner, 53, 53012);
    let syn_web = tcp_frame(scanner, web, 40001, 80);
    let ack_web = tcp_frame(web, scanner, 80, 40001);
    let syn_db = tcp_frame(scanner, db, 40002, 5432);
    let ack_db = tcp_frame(db, scanner, 5432, 40002);
    let push_web = tcp_frame(scanner, web, 40001, 80);
    let push_db = tcp_frame(scanner, db, 40002, 5432);
    let fin_web = tcp_frame(web, scanner, 80, 40001);
    let fin_db = tcp_frame(db, scanner, 5432, 40002);

    build_pcap(&[
        (100, 0, dns.as_slice()),
        (100, 500_000, dns_reply.as_slice()),
        (101, 0, syn_web.as_slice()),
        (101, 200_000, ack_web.as_slice()),
        (103, 0, syn_db.as_slice()),
        (103, 100_000, ack_db.as_slice()),
        (105, 0, push_web.as_slice()),
        (106, 0, push_db.as_slice()),
        (108, 0, fin_web.as_slice()),
        (109, 0, fin_db.as_slice()),
    ])
}

/// Three UDP packets in a one second window, the simplest valid input
/// for replay tests.
pub fn minimal_capture() -> Vec<u8> {
    let a = udp_frame([10, 0, 0, 1], [10, 0, 0, 2], 5000, 53);
    let b = udp_frame([10, 0, 0, 1], [10, 0, 0, 2], 5001, 53);
    let c = udp_frame([10, 0, 0, 2], [10, 0, 0, 1], 53, 5000);
    build_pcap(&[
        (10, 0, a.as_slice()),
        (10, 400_000, b.as_slice()),
        (11, 0, c.as_slice()),
    ])
}

/// Write capture bytes to `dir/name` and return the path
pub fn write_capture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).expect("Failed to write capture fixture");
    path
}
