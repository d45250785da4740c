use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::iface::{Iface, Interfaces};
use crate::link::Transmit;
use crate::packet::Frame;

/// Why a frame was not forwarded.
///
/// Drops are the normal outcome for these frames, not failures: they are
/// counted and logged, never reported to whoever handed the frame in.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum DropReason {
    NotIpv4,
    Malformed,
    BadChecksum,
    TtlExpired,
    LocalDestination,
    NoRoute,
    NoArpEntry,
}

const REASON_COUNT: usize = 7;

impl DropReason {
    pub const ALL: [DropReason; REASON_COUNT] = [
        DropReason::NotIpv4,
        DropReason::Malformed,
        DropReason::BadChecksum,
        DropReason::TtlExpired,
        DropReason::LocalDestination,
        DropReason::NoRoute,
        DropReason::NoArpEntry,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::NotIpv4 => "not-ipv4",
            DropReason::Malformed => "malformed",
            DropReason::BadChecksum => "bad-checksum",
            DropReason::TtlExpired => "ttl-expired",
            DropReason::LocalDestination => "local-destination",
            DropReason::NoRoute => "no-route",
            DropReason::NoArpEntry => "no-arp-entry",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a device did with a frame.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Decision {
    /// Sent out of exactly one interface.
    Forward { iface: String },
    /// Sent out of every listed interface.
    Flood { ifaces: Vec<String> },
    Drop(DropReason),
}

#[derive(Default)]
pub struct DropCounters {
    counts: [AtomicU64; REASON_COUNT],
}

impl DropCounters {
    pub fn record(&self, reason: DropReason) {
        self.counts[reason.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, reason: DropReason) -> u64 {
        self.counts[reason.index()].load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        DropReason::ALL.iter().map(|r| self.get(*r)).sum()
    }
}

impl fmt::Display for DropCounters {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        DropReason::ALL.iter().fold(Ok(()), |acc, reason| {
            acc.and_then(|_| writeln!(f, "{}\t{}", reason, self.get(*reason)))
        })
    }
}

/// Tables a device can print for the operator.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Table {
    Interfaces,
    Routes,
    Arp,
    Macs,
    Drops,
}

#[async_trait]
pub trait Device: 'static + Send + Sync {
    /// Process one frame received on `in_iface`, transmitting whatever the
    /// decision calls for.
    async fn handle_frame(&self, frame: Frame, in_iface: &str) -> Decision;

    fn interfaces(&self) -> &Interfaces;

    /// Render one of the device's tables, or `None` if the device has no
    /// such table.
    fn render(&self, table: Table) -> Option<String>;
}

/// Send a frame as-is; link failures are logged and swallowed.
pub(crate) async fn transmit(link: &dyn Transmit, iface: &Iface, frame: &Frame) {
    if let Err(e) = link.send_frame(iface, frame.as_bytes()).await {
        log::warn!("Error sending frame on {}: {}", iface.name, e);
    }
}
