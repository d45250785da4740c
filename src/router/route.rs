use core::fmt;
use std::{
    fs::File,
    io::{BufRead, BufReader},
    net::Ipv4Addr,
    path::Path,
};

use thiserror::Error;

use crate::iface::Interfaces;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteEntry {
    destination: Ipv4Addr,
    gateway: Ipv4Addr,
    mask: Ipv4Addr,
    iface: String,
}

impl RouteEntry {
    pub fn new<S: Into<String>>(
        destination: Ipv4Addr,
        gateway: Ipv4Addr,
        mask: Ipv4Addr,
        iface: S,
    ) -> Self {
        Self {
            destination,
            gateway,
            mask,
            iface: iface.into(),
        }
    }

    pub fn destination(&self) -> Ipv4Addr {
        self.destination
    }

    /// The next hop, or `0.0.0.0` for a directly connected network.
    pub fn gateway(&self) -> Ipv4Addr {
        self.gateway
    }

    pub fn mask(&self) -> Ipv4Addr {
        self.mask
    }

    pub fn iface(&self) -> &str {
        &self.iface
    }

    pub fn has_gateway(&self) -> bool {
        !self.gateway.is_unspecified()
    }

    pub fn matches(&self, ip: Ipv4Addr) -> bool {
        let mask = u32::from(self.mask);
        u32::from(self.destination) & mask == u32::from(ip) & mask
    }

    fn key(&self) -> (u32, u32) {
        network_key(self.destination, self.mask)
    }
}

fn network_key(destination: Ipv4Addr, mask: Ipv4Addr) -> (u32, u32) {
    let mask = u32::from(mask);
    (u32::from(destination) & mask, mask)
}

impl fmt::Display for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}",
            self.destination, self.gateway, self.mask, self.iface
        )
    }
}

/// Static routes, kept in insertion order.
#[derive(Default, Debug)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to open route table: {0}")]
    Open(std::io::Error),
    #[error("failed to read route table: {0}")]
    Read(std::io::Error),
    #[error("line {0}: missing {1}")]
    MissingField(usize, &'static str),
    #[error("line {0}: malformed address {1:?}")]
    MalformedAddress(usize, String),
    #[error("line {0}: unknown interface {1}")]
    UnknownInterface(usize, String),
    #[error("line {0}: duplicate route {1}")]
    Duplicate(usize, RouteEntry),
}

impl RouteTable {
    pub fn with_entries(entries: Vec<RouteEntry>) -> Self {
        let mut table = Self::default();
        for entry in entries {
            table.insert(entry);
        }
        table
    }

    /// Longest-prefix match. Among equally long matches the entry inserted
    /// first wins.
    pub fn lookup(&self, ip: Ipv4Addr) -> Option<&RouteEntry> {
        self.entries
            .iter()
            .filter(|e| e.matches(ip))
            .fold(None, |best: Option<&RouteEntry>, e| match best {
                Some(b) if u32::from(b.mask) >= u32::from(e.mask) => Some(b),
                _ => Some(e),
            })
    }

    /// Add an entry unless one for the same network and mask exists.
    pub fn insert(&mut self, entry: RouteEntry) -> bool {
        if self.find(entry.destination, entry.mask).is_some() {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn remove(&mut self, destination: Ipv4Addr, mask: Ipv4Addr) -> bool {
        let len_before = self.entries.len();
        let key = network_key(destination, mask);
        self.entries.retain(|e| e.key() != key);
        len_before != self.entries.len()
    }

    pub fn update<S: Into<String>>(
        &mut self,
        destination: Ipv4Addr,
        mask: Ipv4Addr,
        gateway: Ipv4Addr,
        iface: S,
    ) -> bool {
        let key = network_key(destination, mask);
        match self.entries.iter_mut().find(|e| e.key() == key) {
            Some(entry) => {
                let iface = iface.into();
                log::info!(
                    "Update route: old: {}, new gateway: {}, new interface: {}",
                    entry,
                    gateway,
                    iface
                );
                entry.gateway = gateway;
                entry.iface = iface;
                true
            }
            None => false,
        }
    }

    pub fn find(&self, destination: Ipv4Addr, mask: Ipv4Addr) -> Option<&RouteEntry> {
        let key = network_key(destination, mask);
        self.entries.iter().find(|e| e.key() == key)
    }

    pub fn entries(&self) -> &[RouteEntry] {
        self.entries.as_slice()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn load_from_path<P: AsRef<Path>>(
        path: P,
        interfaces: &Interfaces,
    ) -> Result<RouteTable, LoadError> {
        let br = BufReader::new(File::open(path).map_err(LoadError::Open)?);
        RouteTable::load(br, interfaces)
    }

    /// Parse one route per line: `<network> <gateway> <mask> <iface>`.
    pub fn load<B: BufRead>(reader: B, interfaces: &Interfaces) -> Result<RouteTable, LoadError> {
        let mut table = RouteTable::default();

        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.map_err(LoadError::Read)?;
            let mut fields = line.split_whitespace();

            let destination = match fields.next() {
                Some(raw) => parse_addr(line_no, raw)?,
                None => continue,
            };
            let gateway = parse_addr(
                line_no,
                fields
                    .next()
                    .ok_or(LoadError::MissingField(line_no, "gateway"))?,
            )?;
            let mask = parse_addr(
                line_no,
                fields
                    .next()
                    .ok_or(LoadError::MissingField(line_no, "mask"))?,
            )?;
            let iface = fields
                .next()
                .ok_or(LoadError::MissingField(line_no, "interface"))?;

            if !interfaces.contains(iface) {
                return Err(LoadError::UnknownInterface(line_no, iface.into()));
            }

            let entry = RouteEntry::new(destination, gateway, mask, iface);
            if !table.insert(entry.clone()) {
                return Err(LoadError::Duplicate(line_no, entry));
            }
        }

        Ok(table)
    }
}

fn parse_addr(line_no: usize, raw: &str) -> Result<Ipv4Addr, LoadError> {
    raw.parse()
        .map_err(|_| LoadError::MalformedAddress(line_no, raw.into()))
}

impl fmt::Display for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Destination\tGateway\t\tMask\t\tIface")?;
        self.entries
            .iter()
            .fold(Ok(()), |acc, entry| acc.and_then(|_| writeln!(f, "{}", entry)))
    }
}
