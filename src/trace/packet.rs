//! Minimal link and network layer decoding for captured packets.
//!
//! Only the fields the analyzer aggregates are extracted: protocol,
//! IPv4 endpoints and TCP/UDP ports. Anything unrecognized still gets
//! a protocol bucket so totals always add up.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

// Link layer types as registered for capture files
pub const LINKTYPE_NULL: u16 = 0;
pub const LINKTYPE_ETHERNET: u16 = 1;
pub const LINKTYPE_RAW: u16 = 101;

/// Protocol bucket used by the analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Arp,
    Ipv6,
    /// IP packet with an unhandled protocol number
    Other,
    /// Not an IP packet at all (or link layer we cannot decode)
    NonIp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Icmp => "ICMP",
            Protocol::Arp => "ARP",
            Protocol::Ipv6 => "IPv6",
            Protocol::Other => "Other",
            Protocol::NonIp => "Non-IP",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Decoded fields of one packet
#[derive(Debug, Clone)]
pub struct PacketSummary {
    pub protocol: Protocol,
    pub src: Option<Ipv4Addr>,
    pub dst: Option<Ipv4Addr>,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
}

impl PacketSummary {
    fn non_ip() -> Self {
        Self {
            protocol: Protocol::NonIp,
            src: None,
            dst: None,
            src_port: None,
            dst_port: None,
        }
    }

    pub fn is_ip(&self) -> bool {
        self.src.is_some()
    }
}

/// Decode the captured bytes of one packet for the given link layer
pub fn decode(link_type: u16, data: &[u8]) -> PacketSummary {
    match link_type {
        LINKTYPE_ETHERNET => decode_ethernet(data),
        LINKTYPE_RAW => decode_ip_auto(data),
        LINKTYPE_NULL => {
            // 4-byte host-order address family header
            if data.len() < 4 {
                return PacketSummary::non_ip();
            }
            decode_ip_auto(&data[4..])
        }
        _ => PacketSummary::non_ip(),
    }
}

fn decode_ethernet(data: &[u8]) -> PacketSummary {
    if data.len() < 14 {
        return PacketSummary::non_ip();
    }
    let mut ethertype = u16::from_be_bytes([data[12], data[13]]);
    let mut payload = &data[14..];

    // Single 802.1Q tag
    if ethertype == 0x8100 {
        if payload.len() < 4 {
            return PacketSummary::non_ip();
        }
        ethertype = u16::from_be_bytes([payload[2], payload[3]]);
        payload = &payload[4..];
    }

    match ethertype {
        0x0800 => decode_ipv4(payload),
        0x0806 => PacketSummary {
            protocol: Protocol::Arp,
            src: None,
            dst: None,
            src_port: None,
            dst_port: None,
        },
        0x86dd => PacketSummary {
            protocol: Protocol::Ipv6,
            src: None,
            dst: None,
            src_port: None,
            dst_port: None,
        },
        _ => PacketSummary::non_ip(),
    }
}

/// Raw IP link layers carry the version in the first nibble
fn decode_ip_auto(data: &[u8]) -> PacketSummary {
    match data.first().map(|b| b >> 4) {
        Some(4) => decode_ipv4(data),
        Some(6) => PacketSummary {
            protocol: Protocol::Ipv6,
            src: None,
            dst: None,
            src_port: None,
            dst_port: None,
        },
        _ => PacketSummary::non_ip(),
    }
}

fn decode_ipv4(data: &[u8]) -> PacketSummary {
    if data.len() < 20 || data[0] >> 4 != 4 {
        return PacketSummary::non_ip();
    }

    let ihl = ((data[0] & 0x0f) as usize) * 4;
    if ihl < 20 || data.len() < ihl {
        return PacketSummary::non_ip();
    }

    let src = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
    let dst = Ipv4Addr::new(data[16], data[17], data[18], data[19]);
    let payload = &data[ihl..];

    let (protocol, src_port, dst_port) = match data[9] {
        6 => {
            let (sp, dp) = decode_ports(payload);
            (Protocol::Tcp, sp, dp)
        }
        17 => {
            let (sp, dp) = decode_ports(payload);
            (Protocol::Udp, sp, dp)
        }
        1 => (Protocol::Icmp, None, None),
        _ => (Protocol::Other, None, None),
    };

    PacketSummary {
        protocol,
        src: Some(src),
        dst: Some(dst),
        src_port,
        dst_port,
    }
}

fn decode_ports(payload: &[u8]) -> (Option<u16>, Option<u16>) {
    if payload.len() < 4 {
        return (None, None);
    }
    (
        Some(u16::from_be_bytes([payload[0], payload[1]])),
        Some(u16::from_be_bytes([payload[2], payload[3]])),
    )
}

/// Ethernet frame carrying an IPv4 packet with the given protocol number.
/// Shared by analyzer tests, which need realistic decodable frames.
#[cfg(test)]
pub(crate) fn build_ipv4_frame(
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

    let total_len = (20 + 8) as u16;
    ip[2..4].copy_from_slice(&total_len.to_be_bytes());

    frame.extend_from_slice(&ip);
    frame.extend_from_slice(&src_port.to_be_bytes());
    frame.extend_from_slice(&dst_port.to_be_bytes());
    frame.extend_from_slice(&[0, 0, 0, 0]);
    frame
}
