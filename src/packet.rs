//! Ethernet II / IPv4 frame codec.
//!
//! Frames arrive as raw link-layer bytes and keep them: decoding only adds a
//! parsed view of the Ethernet and IPv4 headers. An IPv4 ethertype whose
//! header cannot be parsed is kept as [`Payload::Raw`].

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use etherparse::{Ethernet2Header, Ipv4Header};
use thiserror::Error;

pub const ETHER_TYPE_IPV4: u16 = 0x0800;
pub const ETHER_TYPE_ARP: u16 = 0x0806;

const ETHERNET_HEADER_LEN: usize = 14;

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddr({})", self)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("malformed MAC address: {0}")]
pub struct ParseMacError(String);

impl FromStr for MacAddr {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(|c| c == ':' || c == '-');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(|| ParseMacError(s.into()))?;
            if part.len() != 2 {
                return Err(ParseMacError(s.into()));
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| ParseMacError(s.into()))?;
        }
        if parts.next().is_some() {
            return Err(ParseMacError(s.into()));
        }
        Ok(MacAddr(octets))
    }
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("frame of {0} bytes is shorter than an Ethernet header")]
    Truncated(usize),
    #[error("unreadable Ethernet header: {0:?}")]
    Ethernet(etherparse::ReadError),
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("failed to serialize IPv4 header: {0:?}")]
    Ipv4(etherparse::WriteError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    Ipv4 { header: Ipv4Header, data: Vec<u8> },
    /// Anything that is not a parsable IPv4 packet, kept verbatim.
    Raw(Vec<u8>),
}

/// A decoded link-layer frame.
///
/// The wire bytes are authoritative: the parsed headers are a read-only
/// view, and every mutator patches the bytes and the view together. A frame
/// nobody modified is re-sent exactly as it was received, including header
/// bits the parsed view has no field for.
#[derive(Clone, Debug)]
pub struct Frame {
    ethernet: Ethernet2Header,
    payload: Payload,
    bytes: Vec<u8>,
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for Frame {}

const IPV4_TTL_OFFSET: usize = 8;
const IPV4_CHECKSUM_OFFSET: usize = 10;

impl Frame {
    /// Serialize `ethernet` and `payload` into a new frame.
    pub fn from_parts(ethernet: Ethernet2Header, payload: Payload) -> Result<Frame, EncodeError> {
        let mut bytes = Vec::with_capacity(ETHERNET_HEADER_LEN + payload_len(&payload));
        bytes.extend_from_slice(&ethernet.to_bytes());
        match &payload {
            Payload::Ipv4 { header, data } => {
                header.write_raw(&mut bytes).map_err(EncodeError::Ipv4)?;
                bytes.extend_from_slice(data);
            }
            Payload::Raw(data) => bytes.extend_from_slice(data),
        }

        Ok(Frame {
            ethernet,
            payload,
            bytes,
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<Frame, DecodeError> {
        if bytes.len() < ETHERNET_HEADER_LEN {
            return Err(DecodeError::Truncated(bytes.len()));
        }

        let (ethernet, rest) = Ethernet2Header::from_slice(bytes).map_err(DecodeError::Ethernet)?;

        let payload = if ethernet.ether_type == ETHER_TYPE_IPV4 {
            match Ipv4Header::from_slice(rest) {
                Ok((header, data)) => Payload::Ipv4 {
                    header,
                    data: data.to_vec(),
                },
                Err(e) => {
                    log::debug!("keeping unparsable IPv4 payload as raw bytes: {:?}", e);
                    Payload::Raw(rest.to_vec())
                }
            }
        } else {
            Payload::Raw(rest.to_vec())
        };

        Ok(Frame {
            ethernet,
            payload,
            bytes: bytes.to_vec(),
        })
    }

    /// The frame as it goes on the wire.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn ether_type(&self) -> u16 {
        self.ethernet.ether_type
    }

    pub fn source(&self) -> MacAddr {
        MacAddr(self.ethernet.source)
    }

    pub fn destination(&self) -> MacAddr {
        MacAddr(self.ethernet.destination)
    }

    pub fn set_source(&mut self, mac: MacAddr) {
        self.ethernet.source = mac.octets();
        self.bytes[6..12].copy_from_slice(&mac.octets());
    }

    pub fn set_destination(&mut self, mac: MacAddr) {
        self.ethernet.destination = mac.octets();
        self.bytes[0..6].copy_from_slice(&mac.octets());
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Bytes after the network-layer header, or everything after the
    /// Ethernet header for non-IPv4 frames.
    pub fn payload_bytes(&self) -> &[u8] {
        match &self.payload {
            Payload::Ipv4 { data, .. } => data,
            Payload::Raw(data) => data,
        }
    }

    pub fn ipv4(&self) -> Option<&Ipv4Header> {
        match &self.payload {
            Payload::Ipv4 { header, .. } => Some(header),
            Payload::Raw(_) => None,
        }
    }

    pub fn ipv4_destination(&self) -> Option<Ipv4Addr> {
        self.ipv4().map(|h| Ipv4Addr::from(h.destination))
    }

    pub fn ttl(&self) -> Option<u8> {
        self.ipv4().map(|h| h.time_to_live)
    }

    /// Returns `false` if the frame carries no IPv4 header.
    pub fn set_ttl(&mut self, ttl: u8) -> bool {
        match &mut self.payload {
            Payload::Ipv4 { header, .. } => {
                header.time_to_live = ttl;
                self.bytes[ETHERNET_HEADER_LEN + IPV4_TTL_OFFSET] = ttl;
                true
            }
            Payload::Raw(_) => false,
        }
    }

    /// Whether the IPv4 header checksum matches the header as received.
    pub fn checksum_is_valid(&self) -> bool {
        match self.ipv4_header_bytes() {
            Some(header) => ones_complement_sum(header) == 0xffff,
            None => false,
        }
    }

    /// Rewrite the IPv4 header checksum to match the current header bytes.
    /// Returns `false` if the frame carries no IPv4 header.
    pub fn recompute_checksum(&mut self) -> bool {
        let header_len = match self.ipv4() {
            Some(header) => header.header_len(),
            None => return false,
        };

        let at = ETHERNET_HEADER_LEN + IPV4_CHECKSUM_OFFSET;
        self.bytes[at..at + 2].copy_from_slice(&[0, 0]);
        let header = &self.bytes[ETHERNET_HEADER_LEN..ETHERNET_HEADER_LEN + header_len];
        let checksum = !ones_complement_sum(header);
        self.bytes[at..at + 2].copy_from_slice(&checksum.to_be_bytes());

        if let Payload::Ipv4 { header, .. } = &mut self.payload {
            header.header_checksum = checksum;
        }
        true
    }

    fn ipv4_header_bytes(&self) -> Option<&[u8]> {
        let header_len = self.ipv4()?.header_len();
        self.bytes
            .get(ETHERNET_HEADER_LEN..ETHERNET_HEADER_LEN + header_len)
    }
}

fn payload_len(payload: &Payload) -> usize {
    match payload {
        Payload::Ipv4 { header, data } => header.header_len() + data.len(),
        Payload::Raw(data) => data.len(),
    }
}

/// RFC 1071 sum over big-endian 16-bit words, carries folded back in.
fn ones_complement_sum(bytes: &[u8]) -> u16 {
    let mut sum: u32 = bytes
        .chunks(2)
        .map(|word| u32::from(u16::from_be_bytes([word[0], *word.get(1).unwrap_or(&0)])))
        .sum();
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    sum as u16
}

#[derive(Default, Clone)]
pub struct FrameBuilder<'a> {
    src_mac: Option<MacAddr>,
    dst_mac: Option<MacAddr>,
    ether_type: Option<u16>,
    payload: Option<&'a [u8]>,
    ttl: Option<u8>,
    protocol: Option<u8>,
    src: Option<Ipv4Addr>,
    dst: Option<Ipv4Addr>,
}

#[derive(Debug)]
pub enum BuildError {
    NoPayload,
    NoSourceMac,
    NoDestinationMac,
    NoSourceAddress,
    NoDestinationAddress,
    PayloadTooLong,
    Encode(EncodeError),
}

impl<'a> FrameBuilder<'a> {
    pub fn with_src_mac(&mut self, mac: MacAddr) -> &mut Self {
        self.src_mac = Some(mac);
        self
    }

    pub fn with_dst_mac(&mut self, mac: MacAddr) -> &mut Self {
        self.dst_mac = Some(mac);
        self
    }

    /// Build a non-IPv4 frame carrying the payload as raw bytes.
    pub fn with_ether_type(&mut self, ether_type: u16) -> &mut Self {
        self.ether_type = Some(ether_type);
        self
    }

    pub fn with_payload(&mut self, payload: &'a [u8]) -> &mut Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_ttl(&mut self, ttl: u8) -> &mut Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_protocol(&mut self, protocol: u8) -> &mut Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn with_src(&mut self, src: Ipv4Addr) -> &mut Self {
        self.src = Some(src);
        self
    }

    pub fn with_dst(&mut self, dst: Ipv4Addr) -> &mut Self {
        self.dst = Some(dst);
        self
    }

    pub fn build(&self) -> Result<Frame, BuildError> {
        let payload = self.payload.ok_or(BuildError::NoPayload)?;
        let src_mac = self.src_mac.ok_or(BuildError::NoSourceMac)?;
        let dst_mac = self.dst_mac.ok_or(BuildError::NoDestinationMac)?;
        let ether_type = self.ether_type.unwrap_or(ETHER_TYPE_IPV4);

        let ethernet = Ethernet2Header {
            source: src_mac.octets(),
            destination: dst_mac.octets(),
            ether_type,
        };

        if ether_type != ETHER_TYPE_IPV4 {
            return Frame::from_parts(ethernet, Payload::Raw(payload.to_vec()))
                .map_err(BuildError::Encode);
        }

        let payload_len: u16 = payload
            .len()
            .try_into()
            .map_err(|_| BuildError::PayloadTooLong)?;
        let src = self.src.ok_or(BuildError::NoSourceAddress)?;
        let dst = self.dst.ok_or(BuildError::NoDestinationAddress)?;
        let ttl = self.ttl.unwrap_or_else(FrameBuilder::default_ttl);
        let protocol = self.protocol.unwrap_or(FrameBuilder::default_protocol());

        let header = Ipv4Header::new(payload_len, ttl, protocol, src.octets(), dst.octets());
        let mut frame = Frame::from_parts(
            ethernet,
            Payload::Ipv4 {
                header,
                data: payload.to_vec(),
            },
        )
        .map_err(BuildError::Encode)?;
        frame.recompute_checksum();

        Ok(frame)
    }

    fn default_ttl() -> u8 {
        64
    }

    fn default_protocol() -> u8 {
        // UDP
        17
    }
}
