use std::fmt;
use std::net::Ipv4Addr;

use crate::link::{Args, LinkDefinition};
use crate::packet::MacAddr;

/// A named interface of a device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Iface {
    pub name: String,
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
}

impl Iface {
    pub fn new<S: Into<String>>(name: S, mac: MacAddr, ip: Ipv4Addr) -> Self {
        Self {
            name: name.into(),
            mac,
            ip,
        }
    }
}

impl From<&LinkDefinition> for Iface {
    fn from(def: &LinkDefinition) -> Self {
        Iface::new(def.name.clone(), def.mac, def.ip)
    }
}

impl fmt::Display for Iface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.name, self.mac, self.ip)
    }
}

/// The interfaces of a device, kept in configuration order.
///
/// Read-only once a device is built.
#[derive(Clone, Debug, Default)]
pub struct Interfaces {
    ifaces: Vec<Iface>,
}

impl Interfaces {
    pub fn new(ifaces: Vec<Iface>) -> Self {
        Self { ifaces }
    }

    pub fn get(&self, name: &str) -> Option<&Iface> {
        self.ifaces.iter().find(|i| i.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Whether `ip` is assigned to any interface of this device.
    pub fn is_my_addr(&self, ip: Ipv4Addr) -> bool {
        self.ifaces.iter().any(|i| i.ip == ip)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Iface> {
        self.ifaces.iter()
    }

    pub fn len(&self) -> usize {
        self.ifaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ifaces.is_empty()
    }
}

impl<'a> IntoIterator for &'a Interfaces {
    type Item = &'a Iface;
    type IntoIter = std::slice::Iter<'a, Iface>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl From<&Args> for Interfaces {
    fn from(args: &Args) -> Self {
        Interfaces::new(args.links.iter().map(Iface::from).collect())
    }
}

impl fmt::Display for Interfaces {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.ifaces
            .iter()
            .fold(Ok(()), |acc, iface| acc.and_then(|_| writeln!(f, "{}", iface)))
    }
}
