//! IPv4 router with a static route table and a static ARP cache.

pub mod arp;
pub mod route;

use std::sync::Arc;

use async_trait::async_trait;

use crate::device::{self, Decision, Device, DropCounters, DropReason, Table};
use crate::iface::Interfaces;
use crate::link::Transmit;
use crate::packet::{Frame, ETHER_TYPE_IPV4};

pub use arp::{ArpCache, ArpEntry};
pub use route::{RouteEntry, RouteTable};

pub struct Router {
    interfaces: Interfaces,
    routes: RouteTable,
    arp_cache: ArpCache,
    link: Arc<dyn Transmit>,
    drops: DropCounters,
}

impl Router {
    pub fn new(
        interfaces: Interfaces,
        routes: RouteTable,
        arp_cache: ArpCache,
        link: Arc<dyn Transmit>,
    ) -> Self {
        Self {
            interfaces,
            routes,
            arp_cache,
            link,
            drops: DropCounters::default(),
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn arp_cache(&self) -> &ArpCache {
        &self.arp_cache
    }

    pub fn drops(&self) -> &DropCounters {
        &self.drops
    }

    /// Run the forwarding pipeline over `frame`, rewriting it in place for
    /// the next hop. Returns the egress interface; nothing is sent.
    pub fn decide_packet(&self, frame: &mut Frame) -> Result<String, DropReason> {
        if frame.ether_type() != ETHER_TYPE_IPV4 {
            return Err(DropReason::NotIpv4);
        }

        let (dest, ttl) = match (frame.ipv4_destination(), frame.ttl()) {
            (Some(dest), Some(ttl)) => (dest, ttl),
            _ => return Err(DropReason::Malformed),
        };

        if !frame.checksum_is_valid() {
            log::debug!("packet header checksum invalid; dropping packet");
            return Err(DropReason::BadChecksum);
        }

        // 8-bit counter: a received TTL of 0 wraps to 255
        let ttl = ttl.wrapping_sub(1);
        if ttl == 0 {
            log::debug!("packet TTL expired; dropping packet");
            return Err(DropReason::TtlExpired);
        }

        if !(frame.set_ttl(ttl) && frame.recompute_checksum()) {
            return Err(DropReason::Malformed);
        }

        if self.interfaces.is_my_addr(dest) {
            log::debug!("packet addressed to {}, which is local; dropping packet", dest);
            return Err(DropReason::LocalDestination);
        }

        let route = match self.routes.lookup(dest) {
            Some(route) => route,
            None => {
                log::debug!("No route to {}, dropping packet", dest);
                return Err(DropReason::NoRoute);
            }
        };

        let egress = match self.interfaces.get(route.iface()) {
            Some(iface) => iface,
            None => {
                log::warn!(
                    "Route {} uses unknown interface {}, dropping packet",
                    route,
                    route.iface()
                );
                return Err(DropReason::NoRoute);
            }
        };

        let next_hop = if route.has_gateway() {
            route.gateway()
        } else {
            dest
        };

        let next_hop_mac = match self.arp_cache.lookup(next_hop) {
            Some(mac) => mac,
            None => {
                log::debug!("No ARP entry for next hop {}, dropping packet", next_hop);
                return Err(DropReason::NoArpEntry);
            }
        };

        frame.set_source(egress.mac);
        frame.set_destination(next_hop_mac);

        Ok(egress.name.clone())
    }
}

#[async_trait]
impl Device for Router {
    async fn handle_frame(&self, mut frame: Frame, _in_iface: &str) -> Decision {
        match self.decide_packet(&mut frame) {
            Ok(iface) => {
                if let Some(egress) = self.interfaces.get(&iface) {
                    device::transmit(self.link.as_ref(), egress, &frame).await;
                }
                Decision::Forward { iface }
            }
            Err(reason) => {
                self.drops.record(reason);
                Decision::Drop(reason)
            }
        }
    }

    fn interfaces(&self) -> &Interfaces {
        &self.interfaces
    }

    fn render(&self, table: Table) -> Option<String> {
        match table {
            Table::Interfaces => Some(self.interfaces.to_string()),
            Table::Routes => Some(self.routes.to_string()),
            Table::Arp => Some(self.arp_cache.to_string()),
            Table::Drops => Some(self.drops.to_string()),
            Table::Macs => None,
        }
    }
}
