//! Ethernet learning switch.

pub mod table;

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::device::{self, Decision, Device, Table};
use crate::iface::Interfaces;
use crate::link::Transmit;
use crate::packet::Frame;

pub use table::{LearnedEntry, LearningTable, Sweeper};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwitchConfig {
    /// How long a learned MAC stays valid without being seen again.
    pub lease: Duration,
    pub sweep_interval: Duration,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            lease: Duration::from_millis(15_000),
            sweep_interval: Duration::from_millis(1_000),
        }
    }
}

pub struct Switch {
    interfaces: Interfaces,
    table: Arc<LearningTable>,
    sweeper: Mutex<Option<Sweeper>>,
    link: Arc<dyn Transmit>,
}

impl Switch {
    /// Build a switch and start sweeping its MAC table. Must be called from
    /// within a tokio runtime.
    pub fn new(interfaces: Interfaces, link: Arc<dyn Transmit>, config: SwitchConfig) -> Self {
        let table = Arc::new(LearningTable::new(config.lease));
        let sweeper = Sweeper::spawn(table.clone(), config.sweep_interval);

        Self {
            interfaces,
            table,
            sweeper: Mutex::new(Some(sweeper)),
            link,
        }
    }

    pub fn table(&self) -> &LearningTable {
        &self.table
    }

    /// Stop the sweeper and wait for it. Calling this twice is a no-op.
    pub async fn shutdown(&self) {
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(sweeper) = sweeper {
            sweeper.shutdown().await;
        }
    }

    /// Every interface except the one the frame came in on.
    fn flood_set(&self, in_iface: &str) -> Vec<String> {
        self.interfaces
            .iter()
            .filter(|i| i.name != in_iface)
            .map(|i| i.name.clone())
            .collect()
    }
}

#[async_trait]
impl Device for Switch {
    /// Learn the sender, then relay the frame's bytes unchanged to the
    /// learned port or to every other port.
    async fn handle_frame(&self, frame: Frame, in_iface: &str) -> Decision {
        let known = self.table.learn_and_lookup(
            frame.source(),
            frame.destination(),
            in_iface,
            Instant::now(),
        );

        match known {
            Some(iface) => {
                if let Some(egress) = self.interfaces.get(&iface) {
                    device::transmit(self.link.as_ref(), egress, &frame).await;
                }
                Decision::Forward { iface }
            }
            None => {
                let ifaces = self.flood_set(in_iface);
                for egress in ifaces.iter().filter_map(|name| self.interfaces.get(name)) {
                    device::transmit(self.link.as_ref(), egress, &frame).await;
                }
                Decision::Flood { ifaces }
            }
        }
    }

    fn interfaces(&self) -> &Interfaces {
        &self.interfaces
    }

    fn render(&self, table: Table) -> Option<String> {
        match table {
            Table::Interfaces => Some(self.interfaces.to_string()),
            Table::Macs => Some(self.table.to_string()),
            Table::Routes | Table::Arp | Table::Drops => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::fixture::netlinks::{abc, host_mac};
    use crate::fixture::recorder::Recorder;
    use crate::packet::{FrameBuilder, MacAddr, ETHER_TYPE_ARP};

    fn make_switch() -> (Switch, Arc<Recorder>) {
        let link = Arc::new(Recorder::default());
        let switch = Switch::new(abc::interfaces(), link.clone(), SwitchConfig::default());
        (switch, link)
    }

    fn frame(src: MacAddr, dst: MacAddr) -> Frame {
        FrameBuilder::default()
            .with_src_mac(src)
            .with_dst_mac(dst)
            .with_src(Ipv4Addr::new(10, 0, 9, 1))
            .with_dst(Ipv4Addr::new(10, 0, 9, 2))
            .with_payload(b"hello")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn unknown_destination_floods_all_but_ingress() {
        let (switch, link) = make_switch();

        let decision = switch
            .handle_frame(frame(host_mac(1), host_mac(2)), "eth1")
            .await;

        assert_eq!(
            decision,
            Decision::Flood {
                ifaces: vec!["eth0".into(), "eth2".into()]
            }
        );
        assert_eq!(link.sent_ifaces(), vec!["eth0", "eth2"]);
    }

    #[tokio::test]
    async fn learned_destination_is_unicast() {
        let (switch, link) = make_switch();

        // host 2 talks first and gets learned on eth2, even though it floods
        switch
            .handle_frame(frame(host_mac(2), MacAddr::BROADCAST), "eth2")
            .await;
        assert_eq!(switch.table().lookup(host_mac(2), Instant::now()), Some("eth2".into()));
        link.clear();

        let sent = frame(host_mac(1), host_mac(2));
        let decision = switch.handle_frame(sent.clone(), "eth0").await;

        assert_eq!(decision, Decision::Forward { iface: "eth2".into() });
        let received = link.sent();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, "eth2");
        assert_eq!(received[0].1, sent);
    }

    #[tokio::test]
    async fn switch_relays_any_ether_type() {
        let (switch, link) = make_switch();
        let arp = FrameBuilder::default()
            .with_src_mac(host_mac(1))
            .with_dst_mac(MacAddr::BROADCAST)
            .with_ether_type(ETHER_TYPE_ARP)
            .with_payload(&[1; 28])
            .build()
            .unwrap();

        switch.handle_frame(arp.clone(), "eth0").await;

        let sent = link.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(_, f)| *f == arp));
    }

    #[tokio::test]
    async fn relayed_bytes_match_received_bytes() {
        let (switch, link) = make_switch();
        let mut bytes = frame(host_mac(1), host_mac(2)).as_bytes().to_vec();
        // reserved IPv4 flag bit, with the checksum left stale
        bytes[14 + 6] |= 0x80;

        let received = Frame::decode(&bytes).unwrap();
        switch.handle_frame(received, "eth0").await;

        let sent = link.sent_bytes();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(_, relayed)| *relayed == bytes));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_destination_floods_again() {
        let (switch, link) = make_switch();
        let config = SwitchConfig::default();

        switch
            .handle_frame(frame(host_mac(2), host_mac(1)), "eth2")
            .await;
        tokio::time::sleep(config.lease + config.sweep_interval).await;
        assert!(switch.table().is_empty());
        link.clear();

        let decision = switch
            .handle_frame(frame(host_mac(1), host_mac(2)), "eth0")
            .await;
        assert!(matches!(decision, Decision::Flood { .. }));
        assert_eq!(link.sent_ifaces(), vec!["eth1", "eth2"]);

        switch.shutdown().await;
        switch.shutdown().await;
    }

    #[tokio::test]
    async fn render_switch_tables() {
        let (switch, _link) = make_switch();
        switch
            .handle_frame(frame(host_mac(3), host_mac(4)), "eth1")
            .await;

        let macs = switch.render(Table::Macs).unwrap();
        assert!(macs.contains("02:00:00:00:bb:03\teth1"));
        assert!(switch.render(Table::Routes).is_none());
        assert!(switch.render(Table::Arp).is_none());
        assert!(switch.render(Table::Drops).is_none());
        assert_eq!(switch.render(Table::Interfaces).unwrap().lines().count(), 3);
    }
}
