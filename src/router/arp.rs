use core::fmt;
use std::{
    collections::{hash_map::Entry, HashMap},
    fs::File,
    io::{BufRead, BufReader},
    net::Ipv4Addr,
    path::Path,
};

use thiserror::Error;

use crate::packet::MacAddr;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ArpEntry {
    pub ip: Ipv4Addr,
    pub mac: MacAddr,
}

impl ArpEntry {
    pub fn new(ip: Ipv4Addr, mac: MacAddr) -> Self {
        Self { ip, mac }
    }
}

impl fmt::Display for ArpEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}\t{}", self.ip, self.mac)
    }
}

/// Static IP to MAC resolution. Nothing is learned or expired.
#[derive(Default, Debug)]
pub struct ArpCache {
    entries: HashMap<Ipv4Addr, MacAddr>,
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to open ARP cache: {0}")]
    Open(std::io::Error),
    #[error("failed to read ARP cache: {0}")]
    Read(std::io::Error),
    #[error("line {0}: missing MAC address")]
    NoMac(usize),
    #[error("line {0}: malformed IP address {1:?}")]
    MalformedIp(usize, String),
    #[error("line {0}: {1}")]
    MalformedMac(usize, crate::packet::ParseMacError),
    #[error("line {0}: duplicate entry for {1}")]
    Duplicate(usize, Ipv4Addr),
}

impl ArpCache {
    pub fn with_entries(entries: Vec<ArpEntry>) -> Self {
        let mut cache = Self::default();
        for entry in entries {
            cache.insert(entry);
        }
        cache
    }

    pub fn lookup(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.entries.get(&ip).copied()
    }

    /// Add an entry unless the IP is already resolved.
    pub fn insert(&mut self, entry: ArpEntry) -> bool {
        match self.entries.entry(entry.ip) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(entry.mac);
                true
            }
        }
    }

    /// Entries ordered by IP.
    pub fn entries(&self) -> Vec<ArpEntry> {
        let mut entries: Vec<ArpEntry> = self
            .entries
            .iter()
            .map(|(ip, mac)| ArpEntry::new(*ip, *mac))
            .collect();
        entries.sort_by_key(|e| e.ip);
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<ArpCache, LoadError> {
        let br = BufReader::new(File::open(path).map_err(LoadError::Open)?);
        ArpCache::load(br)
    }

    /// Parse one entry per line: `<ip> <mac>`.
    pub fn load<B: BufRead>(reader: B) -> Result<ArpCache, LoadError> {
        let mut cache = ArpCache::default();

        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.map_err(LoadError::Read)?;
            let mut fields = line.split_whitespace();

            let raw_ip = match fields.next() {
                Some(raw) => raw,
                None => continue,
            };
            let ip: Ipv4Addr = raw_ip
                .parse()
                .map_err(|_| LoadError::MalformedIp(line_no, raw_ip.into()))?;
            let mac = fields
                .next()
                .ok_or(LoadError::NoMac(line_no))?
                .parse()
                .map_err(|e| LoadError::MalformedMac(line_no, e))?;

            if !cache.insert(ArpEntry::new(ip, mac)) {
                return Err(LoadError::Duplicate(line_no, ip));
            }
        }

        Ok(cache)
    }
}

impl fmt::Display for ArpCache {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "IP\t\tMAC")?;
        self.entries()
            .iter()
            .fold(Ok(()), |acc, entry| acc.and_then(|_| writeln!(f, "{}", entry)))
    }
}
