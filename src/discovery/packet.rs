//! Discovery query and response parsing
//!
//! The query is a fixed multicast DNS PTR question for `_http._tcp.local`. Responses
//! are standard DNS messages; only A records (device address) and TXT records (whose
//! owner name carries the device name) are interpreted.

use std::net::Ipv4Addr;
use tracing::trace;

/// PTR query for `_http._tcp.local`, class IN
pub const DISCOVERY_QUERY: [u8; 34] = [
    // Header: id 0, standard query, 1 question, no records
    0x00, 0x00, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    // Question: _http._tcp.local PTR IN
    0x05, 0x5f, 0x68, 0x74, 0x74, 0x70, 0x04, 0x5f, 0x74, 0x63, 0x70, 0x05, 0x6c, 0x6f, 0x63,
    0x61, 0x6c, 0x00, 0x00, 0x0c, 0x00, 0x01,
];

/// Owner-name prefix of TXT records published by the Companion app
pub const DEVICE_NAME_PREFIX: &str = "PI monitor";

const HEADER_LEN: usize = 12;
const TYPE_A: u16 = 1;
const TYPE_TXT: u16 = 16;
const MAX_POINTER_JUMPS: usize = 16;

/// Interpreted resource record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    A { owner: String, address: Ipv4Addr },
    Txt { owner: String },
    Other { owner: String, kind: u16 },
}

/// What to do with one response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Named device matching the target
    Accept(Ipv4Addr),
    /// Address without a device name; confirm over HTTP first
    Probe(Ipv4Addr),
    /// No address, or a device with a different name
    Skip,
}

/// Parse every answer, authority and additional record of a response
///
/// Returns `None` for truncated or malformed packets.
pub fn parse_response(packet: &[u8]) -> Option<Vec<Record>> {
    if packet.len() < HEADER_LEN {
        return None;
    }
    let questions = read_u16(packet, 4)?;
    let records = [6, 8, 10]
        .iter()
        .map(|&offset| read_u16(packet, offset).map(usize::from))
        .sum::<Option<usize>>()?;

    let mut offset = HEADER_LEN;
    for _ in 0..questions {
        let (_, next) = read_name(packet, offset)?;
        offset = next + 4;
    }

    let mut parsed = Vec::with_capacity(records);
    for _ in 0..records {
        let (owner, next) = read_name(packet, offset)?;
        let kind = read_u16(packet, next)?;
        let rdlength = usize::from(read_u16(packet, next + 8)?);
        let rdata_start = next + 10;
        let rdata = packet.get(rdata_start..rdata_start + rdlength)?;
        offset = rdata_start + rdlength;

        parsed.push(match kind {
            TYPE_A if rdata.len() == 4 => {
                Record::A { owner, address: Ipv4Addr::new(rdata[0], rdata[1], rdata[2], rdata[3]) }
            }
            TYPE_TXT => Record::Txt { owner },
            _ => Record::Other { owner, kind },
        });
    }
    Some(parsed)
}

/// Decide on a parsed response
///
/// Records are applied in order: the last A record wins, and each TXT record
/// replaces the device name (a TXT record from something other than a Companion
/// app clears it).
pub fn evaluate(records: &[Record], target: &str) -> Verdict {
    let mut address = None;
    let mut device = None;

    for record in records {
        match record {
            Record::A { owner, address: a } => {
                trace!("A record {} -> {}", owner, a);
                address = Some(*a);
            }
            Record::Txt { owner } => {
                trace!("TXT record {}", owner);
                device = device_name(owner);
            }
            Record::Other { owner, kind } => trace!("Ignoring record type {} for {}", kind, owner),
        }
    }

    match (address, device) {
        (None, _) => Verdict::Skip,
        (Some(address), Some(name)) if name_matches(target, name) => Verdict::Accept(address),
        (Some(_), Some(_)) => Verdict::Skip,
        (Some(address), None) => Verdict::Probe(address),
    }
}

/// Device name from a Companion TXT owner such as
/// `PI monitor:Neon Companion:a95136f3304b9204`
pub fn device_name(owner: &str) -> Option<&str> {
    if !owner.starts_with(DEVICE_NAME_PREFIX) {
        return None;
    }
    owner.split(':').nth(1)
}

/// Empty target matches any device
pub fn name_matches(target: &str, device: &str) -> bool {
    target.is_empty() || target == device
}

fn read_u16(packet: &[u8], offset: usize) -> Option<u16> {
    let bytes = packet.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Read a possibly compressed name, returning it dot-joined with the offset after it
fn read_name(packet: &[u8], start: usize) -> Option<(String, usize)> {
    let mut labels = Vec::new();
    let mut offset = start;
    let mut resume = None;
    let mut jumps = 0;

    loop {
        let len = usize::from(*packet.get(offset)?);
        match len & 0xc0 {
            0x00 if len == 0 => {
                offset += 1;
                break;
            }
            0x00 => {
                let label = packet.get(offset + 1..offset + 1 + len)?;
                labels.push(String::from_utf8_lossy(label).into_owned());
                offset += 1 + len;
            }
            0xc0 => {
                let low = usize::from(*packet.get(offset + 1)?);
                resume.get_or_insert(offset + 2);
                jumps += 1;
                if jumps > MAX_POINTER_JUMPS {
                    return None;
                }
                offset = ((len & 0x3f) << 8) | low;
            }
            _ => return None,
        }
    }

    Some((labels.join("."), resume.unwrap_or(offset)))
}
