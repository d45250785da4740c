use std::net::Ipv4Addr;

use crate::iface::{Iface, Interfaces};
use crate::link::localhost_with_port;
use crate::packet::MacAddr;

/// A device with three interfaces, `eth0`..`eth2`, on 10.0.{1,2,3}.0/24.
pub mod abc {
    use super::*;

    pub fn mac(iface_no: u8) -> MacAddr {
        MacAddr::new([0x02, 0, 0, 0, 0xaa, iface_no])
    }

    pub fn ip(iface_no: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, iface_no + 1, 1)
    }

    pub fn interfaces() -> Interfaces {
        Interfaces::new(
            (0..3)
                .map(|n| Iface::new(format!("eth{n}"), mac(n), ip(n)))
                .collect(),
        )
    }
}

/// MAC address of an end host attached somewhere behind a device.
pub fn host_mac(host_no: u8) -> MacAddr {
    MacAddr::new([0x02, 0, 0, 0, 0xbb, host_no])
}

/// A localhost UDP port that was free a moment ago.
pub fn free_port() -> u16 {
    let sock = std::net::UdpSocket::bind(localhost_with_port(0)).unwrap();
    sock.local_addr().unwrap().port()
}
