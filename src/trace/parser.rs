//! Streaming readers for classic pcap and pcapng capture files.
//!
//! Both readers work on any `Read` source, never buffer more than one packet,
//! and tolerate the endianness variants of each format. Corrupt input is
//! reported as an error instead of a panic so upload validation can reject it.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on a single captured packet; anything larger is corrupt input.
const MAX_CAPTURED_LEN: u32 = 256 * 1024 * 1024;

/// Default pcapng timestamp resolution (microseconds) when no if_tsresol
/// option is present.
const DEFAULT_TS_DIVISOR: f64 = 1_000_000.0;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("not a capture file (unrecognized magic {0:02x?})")]
    UnknownMagic([u8; 4]),
    #[error("corrupt capture: {0}")]
    Corrupt(String),
}

/// Capture file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceFormat {
    Pcap,
    PcapNg,
}

impl TraceFormat {
    /// String representation for storage
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceFormat::Pcap => "pcap",
            TraceFormat::PcapNg => "pcapng",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pcapng" => TraceFormat::PcapNg,
            _ => TraceFormat::Pcap,
        }
    }
}

impl std::fmt::Display for TraceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// File extensions accepted by the trace library
pub fn has_capture_extension(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    lower.ends_with(".pcap") || lower.ends_with(".pcapng") || lower.ends_with(".cap")
}

/// One captured packet as stored in the file
#[derive(Debug, Clone)]
pub struct PacketRecord {
    /// Capture timestamp in seconds since the epoch (absent for pcapng
    /// simple packet blocks, which carry no timestamp)
    pub ts: Option<f64>,
    /// Original wire length
    pub orig_len: u32,
    /// Captured bytes (may be shorter than orig_len when truncated by snaplen)
    pub data: Vec<u8>,
}

/// Summary produced by a full scan of a capture file
#[derive(Debug, Clone, Serialize)]
pub struct TraceInfo {
    pub format: TraceFormat,
    pub link_type: u16,
    pub total_packets: u64,
    pub first_ts: Option<f64>,
    pub last_ts: Option<f64>,
    pub duration_secs: Option<f64>,
}

#[derive(Clone, Copy, Debug)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn u16(self, b: [u8; 2]) -> u16 {
        match self {
            Endian::Little => u16::from_le_bytes(b),
            Endian::Big => u16::from_be_bytes(b),
        }
    }

    fn u32(self, b: [u8; 4]) -> u32 {
        match self {
            Endian::Little => u32::from_le_bytes(b),
            Endian::Big => u32::from_be_bytes(b),
        }
    }
}

/// Fill `buf`, returning false on a clean end-of-stream before any byte.
/// A partial fill is truncation and surfaces as UnexpectedEof.
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "capture ends inside a record",
            ));
        }
        filled += n;
    }
    Ok(true)
}

fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> Result<(), TraceError> {
    if !read_exact_or_eof(reader, buf)? {
        return Err(TraceError::Corrupt(format!("truncated {}", what)));
    }
    Ok(())
}

fn skip_bytes<R: Read>(reader: &mut R, n: u64, what: &str) -> Result<(), TraceError> {
    let copied = io::copy(&mut reader.by_ref().take(n), &mut io::sink())?;
    if copied != n {
        return Err(TraceError::Corrupt(format!("truncated {}", what)));
    }
    Ok(())
}

/// Streaming reader over either capture format
pub struct TraceReader<R: Read> {
    inner: Inner<R>,
}

enum Inner<R: Read> {
    Pcap(PcapReader<R>),
    PcapNg(PcapNgReader<R>),
}

impl TraceReader<BufReader<File>> {
    /// Open a capture file from disk
    pub fn open(path: &Path) -> Result<Self, TraceError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: Read> TraceReader<R> {
    /// Detect the format from the leading magic and build the right reader
    pub fn from_reader(mut reader: R) -> Result<Self, TraceError> {
        let mut magic = [0u8; 4];
        if !read_exact_or_eof(&mut reader, &mut magic)? {
            return Err(TraceError::Corrupt("empty capture file".to_string()));
        }

        let inner = match magic {
            // Classic pcap, microsecond and nanosecond variants
            [0xa1, 0xb2, 0xc3, 0xd4] => {
                Inner::Pcap(PcapReader::new(reader, Endian::Big, 1_000_000.0)?)
            }
            [0xd4, 0xc3, 0xb2, 0xa1] => {
                Inner::Pcap(PcapReader::new(reader, Endian::Little, 1_000_000.0)?)
            }
            [0xa1, 0xb2, 0x3c, 0x4d] => {
                Inner::Pcap(PcapReader::new(reader, Endian::Big, 1_000_000_000.0)?)
            }
            [0x4d, 0x3c, 0xb2, 0xa1] => {
                Inner::Pcap(PcapReader::new(reader, Endian::Little, 1_000_000_000.0)?)
            }
            // pcapng section header block
            [0x0a, 0x0d, 0x0d, 0x0a] => Inner::PcapNg(PcapNgReader::new(reader)?),
            other => return Err(TraceError::UnknownMagic(other)),
        };

        Ok(Self { inner })
    }

    pub fn format(&self) -> TraceFormat {
        match &self.inner {
            Inner::Pcap(_) => TraceFormat::Pcap,
            Inner::PcapNg(_) => TraceFormat::PcapNg,
        }
    }

    /// Link layer type: the file header value for pcap, the first interface
    /// description for pcapng (Ethernet assumed until one is seen)
    pub fn link_type(&self) -> u16 {
        match &self.inner {
            Inner::Pcap(r) => r.link_type,
            Inner::PcapNg(r) => r.interfaces.first().map(|i| i.link_type).unwrap_or(1),
        }
    }

    /// Read the next packet, or None at end of file
    pub fn next_packet(&mut self) -> Result<Option<PacketRecord>, TraceError> {
        match &mut self.inner {
            Inner::Pcap(r) => r.next_packet(),
            Inner::PcapNg(r) => r.next_packet(),
        }
    }
}

/// Classic pcap: 24-byte file header, 16-byte record headers
struct PcapReader<R> {
    reader: R,
    endian: Endian,
    ts_divisor: f64,
    link_type: u16,
}

impl<R: Read> PcapReader<R> {
    fn new(mut reader: R, endian: Endian, ts_divisor: f64) -> Result<Self, TraceError> {
        // Magic already consumed; the rest of the file header is 20 bytes:
        // version (2+2), thiszone (4), sigfigs (4), snaplen (4), network (4)
        let mut header = [0u8; 20];
        read_fully(&mut reader, &mut header, "pcap file header")?;

        let link_type = endian.u32([header[16], header[17], header[18], header[19]]) as u16;

        Ok(Self {
            reader,
            endian,
            ts_divisor,
            link_type,
        })
    }

    fn next_packet(&mut self) -> Result<Option<PacketRecord>, TraceError> {
        let mut header = [0u8; 16];
        if !read_exact_or_eof(&mut self.reader, &mut header)? {
            return Ok(None);
        }

        let e = self.endian;
        let ts_sec = e.u32([header[0], header[1], header[2], header[3]]);
        let ts_frac = e.u32([header[4], header[5], header[6], header[7]]);
        let incl_len = e.u32([header[8], header[9], header[10], header[11]]);
        let orig_len = e.u32([header[12], header[13], header[14], header[15]]);

        if incl_len > MAX_CAPTURED_LEN {
            return Err(TraceError::Corrupt(format!(
                "record claims {} captured bytes",
                incl_len
            )));
        }

        let mut data = vec![0u8; incl_len as usize];
        read_fully(&mut self.reader, &mut data, "pcap packet body")?;

        let ts = ts_sec as f64 + ts_frac as f64 / self.ts_divisor;
        Ok(Some(PacketRecord {
            ts: Some(ts),
            orig_len,
            data,
        }))
    }
}

// pcapng block types
const BLOCK_SHB: u32 = 0x0a0d_0d0a;
const BLOCK_IDB: u32 = 0x0000_0001;
const BLOCK_SPB: u32 = 0x0000_0003;
const BLOCK_EPB: u32 = 0x0000_0006;

const SHB_MAGIC_BYTES: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];

struct InterfaceDesc {
    link_type: u16,
    ts_divisor: f64,
}

/// pcapng: a stream of length-prefixed blocks, possibly multiple sections
struct PcapNgReader<R> {
    reader: R,
    endian: Endian,
    interfaces: Vec<InterfaceDesc>,
}

impl<R: Read> PcapNgReader<R> {
    fn new(mut reader: R) -> Result<Self, TraceError> {
        // Block type already consumed by format detection
        let mut len_bytes = [0u8; 4];
        read_fully(&mut reader, &mut len_bytes, "section header")?;
        let endian = Self::read_section_endian(&mut reader)?;
        let total_len = endian.u32(len_bytes);
        Self::check_block_len(total_len, 28)?;

        // Skip the remainder: version, section length, options, trailing length
        skip_bytes(&mut reader, total_len as u64 - 12, "section header")?;

        Ok(Self {
            reader,
            endian,
            interfaces: Vec::new(),
        })
    }

    /// The byte-order magic directly follows the block length
    fn read_section_endian(reader: &mut R) -> Result<Endian, TraceError> {
        let mut bom = [0u8; 4];
        read_fully(reader, &mut bom, "section header")?;
        match bom {
            [0x1a, 0x2b, 0x3c, 0x4d] => Ok(Endian::Big),
            [0x4d, 0x3c, 0x2b, 0x1a] => Ok(Endian::Little),
            other => Err(TraceError::Corrupt(format!(
                "bad byte-order magic {:02x?}",
                other
            ))),
        }
    }

    fn check_block_len(total_len: u32, min: u32) -> Result<(), TraceError> {
        if total_len < min || total_len % 4 != 0 {
            return Err(TraceError::Corrupt(format!(
                "bad block length {}",
                total_len
            )));
        }
        Ok(())
    }

    fn ts_divisor_for(&self, interface_id: u32) -> f64 {
        self.interfaces
            .get(interface_id as usize)
            .map(|i| i.ts_divisor)
            .unwrap_or(DEFAULT_TS_DIVISOR)
    }

    fn next_packet(&mut self) -> Result<Option<PacketRecord>, TraceError> {
        loop {
            let mut head = [0u8; 8];
            if !read_exact_or_eof(&mut self.reader, &mut head)? {
                return Ok(None);
            }

            // A new section header may switch endianness mid-file; its type
            // bytes are an endian-proof palindrome, so compare raw bytes.
            if head[0..4] == SHB_MAGIC_BYTES {
                let endian = Self::read_section_endian(&mut self.reader)?;
                self.endian = endian;
                let total_len = endian.u32([head[4], head[5], head[6], head[7]]);
                Self::check_block_len(total_len, 28)?;
                skip_bytes(&mut self.reader, total_len as u64 - 12, "section header")?;
                self.interfaces.clear();
                continue;
            }

            let e = self.endian;
            let block_type = e.u32([head[0], head[1], head[2], head[3]]);
            let total_len = e.u32([head[4], head[5], head[6], head[7]]);
            Self::check_block_len(total_len, 12)?;
            let body_len = total_len as u64 - 12;

            match block_type {
                BLOCK_EPB => return self.read_enhanced_packet(total_len).map(Some),
                BLOCK_SPB => return self.read_simple_packet(total_len).map(Some),
                BLOCK_IDB => self.read_interface_description(total_len)?,
                _ => skip_bytes(&mut self.reader, body_len + 4, "block")?,
            }
        }
    }

    fn read_enhanced_packet(&mut self, total_len: u32) -> Result<PacketRecord, TraceError> {
        Self::check_block_len(total_len, 32)?;

        let mut fixed = [0u8; 20];
        read_fully(&mut self.reader, &mut fixed, "enhanced packet block")?;

        let e = self.endian;
        let interface_id = e.u32([fixed[0], fixed[1], fixed[2], fixed[3]]);
        let ts_high = e.u32([fixed[4], fixed[5], fixed[6], fixed[7]]);
        let ts_low = e.u32([fixed[8], fixed[9], fixed[10], fixed[11]]);
        let captured_len = e.u32([fixed[12], fixed[13], fixed[14], fixed[15]]);
        let orig_len = e.u32([fixed[16], fixed[17], fixed[18], fixed[19]]);

        if captured_len > MAX_CAPTURED_LEN {
            return Err(TraceError::Corrupt(format!(
                "block claims {} captured bytes",
                captured_len
            )));
        }

        let mut data = vec![0u8; captured_len as usize];
        read_fully(&mut self.reader, &mut data, "enhanced packet block")?;

        // Options, padding and the trailing length copy
        let rest = (total_len as u64)
            .checked_sub(28 + captured_len as u64)
            .ok_or_else(|| TraceError::Corrupt("enhanced packet block too short".to_string()))?;
        skip_bytes(&mut self.reader, rest, "enhanced packet block")?;

        let ticks = ((ts_high as u64) << 32) | ts_low as u64;
        let ts = ticks as f64 / self.ts_divisor_for(interface_id);

        Ok(PacketRecord {
            ts: Some(ts),
            orig_len,
            data,
        })
    }

    fn read_simple_packet(&mut self, total_len: u32) -> Result<PacketRecord, TraceError> {
        Self::check_block_len(total_len, 20)?;

        let mut len_bytes = [0u8; 4];
        read_fully(&mut self.reader, &mut len_bytes, "simple packet block")?;
        let orig_len = self.endian.u32(len_bytes);

        // Everything between the original length and the trailing length copy
        // is padded packet data
        let data_area = total_len as u64 - 20;
        if data_area > MAX_CAPTURED_LEN as u64 {
            return Err(TraceError::Corrupt(format!(
                "block claims {} captured bytes",
                data_area
            )));
        }
        let mut data = vec![0u8; data_area as usize];
        read_fully(&mut self.reader, &mut data, "simple packet block")?;
        skip_bytes(&mut self.reader, 4, "simple packet block")?;

        if (orig_len as usize) < data.len() {
            data.truncate(orig_len as usize);
        }

        Ok(PacketRecord {
            ts: None,
            orig_len,
            data,
        })
    }

    fn read_interface_description(&mut self, total_len: u32) -> Result<(), TraceError> {
        Self::check_block_len(total_len, 20)?;

        let mut fixed = [0u8; 8];
        read_fully(&mut self.reader, &mut fixed, "interface description")?;
        let link_type = self.endian.u16([fixed[0], fixed[1]]);

        // Walk options looking for if_tsresol (code 9)
        let mut remaining = total_len as u64 - 20;
        let mut ts_divisor = DEFAULT_TS_DIVISOR;
        while remaining >= 4 {
            let mut opt_head = [0u8; 4];
            read_fully(&mut self.reader, &mut opt_head, "interface options")?;
            remaining -= 4;

            let code = self.endian.u16([opt_head[0], opt_head[1]]);
            let len = self.endian.u16([opt_head[2], opt_head[3]]) as u64;
            let padded = (len + 3) & !3;
            if code == 0 {
                break;
            }
            if padded > remaining {
                return Err(TraceError::Corrupt("interface options overrun".to_string()));
            }

            if code == 9 && len == 1 {
                let mut value = vec![0u8; padded as usize];
                read_fully(&mut self.reader, &mut value, "interface options")?;
                let raw = value[0];
                ts_divisor = if raw & 0x80 != 0 {
                    2f64.powi((raw & 0x7f) as i32)
                } else {
                    10f64.powi(raw as i32)
                };
            } else {
                skip_bytes(&mut self.reader, padded, "interface options")?;
            }
            remaining -= padded;
        }
        // Trailing length copy (and any unread option bytes)
        skip_bytes(&mut self.reader, remaining + 4, "interface description")?;

        self.interfaces.push(InterfaceDesc {
            link_type,
            ts_divisor,
        });
        Ok(())
    }
}

/// Scan a capture from start to finish, counting packets and collecting
/// the timestamp span. Bounded memory regardless of file size.
pub fn read_info(path: &Path) -> Result<TraceInfo, TraceError> {
    let mut reader = TraceReader::open(path)?;
    let format = reader.format();

    let mut total_packets = 0u64;
    let mut first_ts = None;
    let mut last_ts = None;

    while let Some(packet) = reader.next_packet()? {
        total_packets += 1;
        if let Some(ts) = packet.ts {
            if first_ts.is_none() {
                first_ts = Some(ts);
            }
            last_ts = Some(ts);
        }
    }

    let duration_secs = match (first_ts, last_ts) {
        (Some(first), Some(last)) if last >= first => Some(last - first),
        _ => None,
    };

    Ok(TraceInfo {
        format,
        link_type: reader.link_type(),
        total_packets,
        first_ts,
        last_ts,
        duration_secs,
    })
}
