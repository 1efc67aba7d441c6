//! The on-wire segment format and its mod-256 checksum.
//!
//! Grounded on `protocols/utility.rs`'s `Checksum` (the same accumulate-
//! then-complement shape) and `protocols/udp/udp_parsing.rs`'s field-by-field
//! `from_bytes`/`build_header` pair. The checksum here is simpler than
//! either: a plain mod-256 sum rather than a 16-bit ones'-complement sum
//! with end-around carry, so no carry folding is needed — wrapping addition
//! over `u8` already does the job.

use crate::error::DemuxError;

/// Header length in bytes: two ports, two sequence numbers, a flags byte,
/// a length field, and the checksum byte.
pub const HEADER_LEN: usize = 2 + 2 + 4 + 4 + 1 + 2 + 1;

pub const FLAG_ACK: u8 = 0b001;
pub const FLAG_SYN: u8 = 0b010;
pub const FLAG_FIN: u8 = 0b100;

/// An accumulator for the segment checksum: the bitwise complement of the
/// mod-256 sum of every preceding byte.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Checksum(u8);

impl Checksum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_u8(&mut self, byte: u8) {
        self.0 = self.0.wrapping_add(byte);
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.add_u8(byte);
        }
    }

    pub fn as_u8(&self) -> u8 {
        !self.0
    }
}

/// A parsed RDT segment: header fields plus a borrowed or owned payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: u8,
    pub payload: Vec<u8>,
}

impl Segment {
    pub fn new(src_port: u16, dst_port: u16, seq: u32, ack: u32, flags: u8, payload: Vec<u8>) -> Self {
        Self {
            src_port,
            dst_port,
            seq,
            ack,
            flags,
            payload,
        }
    }

    pub fn is_ack(&self) -> bool {
        self.flags == FLAG_ACK
    }

    pub fn is_syn(&self) -> bool {
        self.flags == FLAG_SYN
    }

    pub fn is_syn_ack(&self) -> bool {
        self.flags == FLAG_SYN | FLAG_ACK
    }

    /// Serializes this segment, computing and inserting the checksum byte.
    pub fn encode(&self) -> Vec<u8> {
        let data_len = self.payload.len() as u16;
        let mut header = Vec::with_capacity(HEADER_LEN - 1);
        header.extend_from_slice(&self.src_port.to_be_bytes());
        header.extend_from_slice(&self.dst_port.to_be_bytes());
        header.extend_from_slice(&self.seq.to_be_bytes());
        header.extend_from_slice(&self.ack.to_be_bytes());
        header.push(self.flags);
        header.extend_from_slice(&data_len.to_be_bytes());

        let mut sum = Checksum::new();
        sum.add_bytes(&header);
        sum.add_bytes(&self.payload);

        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(&header);
        out.push(sum.as_u8());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parses a segment out of `bytes`, without checking the checksum.
    /// Callers that receive segments off the substrate should call
    /// [`verify`] on the raw bytes first.
    pub fn decode(bytes: &[u8]) -> Result<Self, DemuxError> {
        if bytes.len() < HEADER_LEN {
            return Err(DemuxError::MalformedSegment);
        }
        let src_port = u16::from_be_bytes([bytes[0], bytes[1]]);
        let dst_port = u16::from_be_bytes([bytes[2], bytes[3]]);
        let seq = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let ack = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let flags = bytes[12];
        let data_len = u16::from_be_bytes([bytes[13], bytes[14]]) as usize;
        // byte 15 is the checksum, already verified by `verify`.

        if bytes.len() < HEADER_LEN + data_len {
            return Err(DemuxError::MalformedSegment);
        }
        let payload = bytes[HEADER_LEN..HEADER_LEN + data_len].to_vec();

        Ok(Self {
            src_port,
            dst_port,
            seq,
            ack,
            flags,
            payload,
        })
    }

    /// Checks that `bytes` carries a consistent checksum: the mod-256 sum of
    /// every byte, including the checksum byte itself, must equal `0xFF`.
    pub fn verify(bytes: &[u8]) -> bool {
        if bytes.len() < HEADER_LEN {
            return false;
        }
        let mut sum = Checksum::new();
        sum.add_bytes(bytes);
        sum.0 == 0xFF
    }
}
