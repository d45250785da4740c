//! Virtual wires between devices.
//!
//! Every device binds one UDP socket on localhost. An interface is a
//! point-to-point link to a peer device's port, and each datagram carries
//! one raw Ethernet frame. A datagram's ingress interface is the link whose
//! peer port matches the datagram's source port.

mod args;

pub use args::{Args, ParseArgsError};

use core::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::{
    net::UdpSocket,
    sync::{
        broadcast::{self, Receiver, Sender},
        oneshot, Mutex,
    },
    task::JoinHandle,
};

use crate::iface::Iface;
use crate::packet::{MacAddr, ParseMacError};

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("no link for interface {0}")]
    LinkNotFound(String),
    #[error("failed to bind port {0}: {1}")]
    Bind(u16, std::io::Error),
    #[error("link i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// The "send this frame out of that interface" primitive devices use.
///
/// Transmission is fire-and-forget from a device's point of view: errors
/// are reported so they can be logged, never retried.
#[async_trait]
pub trait Transmit: 'static + Send + Sync {
    async fn send_frame(&self, iface: &Iface, frame: &[u8]) -> Result<()>;
}

/// A frame received on one of this device's interfaces.
#[derive(Clone, Debug)]
pub struct Received {
    pub iface: String,
    pub bytes: Vec<u8>,
}

pub struct VtLinkLayer {
    host_port: u16,
    sock: Arc<UdpSocket>,
    links: Vec<Link>,
    listener: Mutex<ListenerState>,
}

#[derive(Default)]
struct ListenerState {
    active: Option<Listener>,
    closed: bool,
}

/// The receive task feeding every subscriber.
struct Listener {
    tx: Sender<Received>,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl VtLinkLayer {
    pub async fn new(args: &Args) -> Result<Self> {
        let sock = Arc::new(
            UdpSocket::bind(localhost_with_port(args.host_port))
                .await
                .map_err(|e| Error::Bind(args.host_port, e))?,
        );

        let links = args
            .links
            .iter()
            .map(|l| l.clone().into_link(sock.clone()))
            .collect();

        Ok(Self {
            host_port: args.host_port,
            sock,
            links,
            listener: Mutex::new(ListenerState::default()),
        })
    }

    pub fn host_port(&self) -> u16 {
        self.host_port
    }

    pub fn iter_links(&self) -> std::slice::Iter<'_, Link> {
        self.links.iter()
    }

    pub fn find_link(&self, iface: &str) -> Option<&Link> {
        self.links.iter().find(|link| link.iface() == iface)
    }

    /// Subscribe to the stream of frames received by this device.
    ///
    /// Once the link layer is closed, the returned receiver yields
    /// `RecvError::Closed` right away.
    pub async fn listen(&self) -> Receiver<Received> {
        let mut state = self.listener.lock().await;
        if let Some(ref listener) = state.active {
            return listener.tx.subscribe();
        }
        if state.closed {
            let (_, rx) = broadcast::channel(1);
            return rx;
        }

        let sock = self.sock.clone();
        let peers: Vec<(u16, String)> = self
            .links
            .iter()
            .map(|l| (l.dest_port, l.iface().to_string()))
            .collect();

        let (tx, rx) = broadcast::channel(1024);
        let sender = tx.clone();
        let (stop, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut buf = vec![0; 65536];
            loop {
                let (sz, from) = tokio::select! {
                    recvd = sock.recv_from(&mut buf) => match recvd {
                        Ok(recvd) => recvd,
                        Err(e) => {
                            log::warn!("Failed to receive frame: {}", e);
                            break;
                        }
                    },
                    _ = &mut stop_rx => break,
                };

                let iface = match peers.iter().find(|(port, _)| *port == from.port()) {
                    Some((_, iface)) => iface.clone(),
                    None => {
                        log::debug!("Ignoring datagram from unknown peer {}", from);
                        continue;
                    }
                };
                let received = Received {
                    iface,
                    bytes: buf[..sz].into(),
                };
                if sender.send(received).is_err() {
                    log::error!("Failed to send frame to receiver");
                }
            }

            log::debug!("Link listener stopped");
        });

        state.active = Some(Listener { tx, stop, handle });
        rx
    }

    /// Stop receiving. Subscribers drain what is already queued and then see
    /// the channel close. Sending still works. Calling this twice is a no-op.
    pub async fn close(&self) {
        let listener = {
            let mut state = self.listener.lock().await;
            state.closed = true;
            state.active.take()
        };

        if let Some(Listener { tx, stop, handle }) = listener {
            let _ = stop.send(());
            drop(tx);
            if let Err(e) = handle.await {
                log::warn!("Link listener did not stop cleanly: {}", e);
            }
        }
    }
}

#[async_trait]
impl Transmit for VtLinkLayer {
    async fn send_frame(&self, iface: &Iface, frame: &[u8]) -> Result<()> {
        self.find_link(&iface.name)
            .ok_or_else(|| Error::LinkNotFound(iface.name.clone()))?
            .send(frame)
            .await
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkDefinition {
    /// Name of this device's interface.
    pub name: String,
    /// MAC address of this device's interface.
    pub mac: MacAddr,
    /// IP address of this device's interface.
    pub ip: Ipv4Addr,
    /// The port where the device on the other end of the wire runs.
    pub dest_port: u16,
}

#[derive(Error, Debug)]
pub enum ParseLinkError {
    #[error("missing interface name")]
    NoName,
    #[error("missing MAC address")]
    NoMac,
    #[error("missing IP address")]
    NoIp,
    #[error("missing peer port")]
    NoPort,
    #[error(transparent)]
    MalformedMac(ParseMacError),
    #[error("malformed IP address")]
    MalformedIp,
    #[error("malformed peer port")]
    MalformedPort,
}

impl LinkDefinition {
    pub fn try_parse(raw_link: &str) -> std::result::Result<Self, ParseLinkError> {
        let mut split = raw_link.split_whitespace();

        let name = split.next().ok_or(ParseLinkError::NoName)?.to_string();

        let mac = split
            .next()
            .ok_or(ParseLinkError::NoMac)?
            .parse()
            .map_err(ParseLinkError::MalformedMac)?;

        let ip = split
            .next()
            .ok_or(ParseLinkError::NoIp)?
            .parse()
            .map_err(|_| ParseLinkError::MalformedIp)?;

        let dest_port = split
            .next()
            .ok_or(ParseLinkError::NoPort)?
            .parse::<u16>()
            .map_err(|_| ParseLinkError::MalformedPort)?;

        Ok(LinkDefinition {
            name,
            mac,
            ip,
            dest_port,
        })
    }

    pub fn into_link(self, udp_socket: Arc<UdpSocket>) -> Link {
        Link {
            iface: self.name,
            dest_port: self.dest_port,
            sock: udp_socket,
        }
    }
}

pub struct Link {
    iface: String,
    dest_port: u16,
    sock: Arc<UdpSocket>,
}

impl Link {
    /// Put a raw frame on the wire.
    pub async fn send(&self, frame: &[u8]) -> Result<()> {
        self.sock
            .send_to(frame, localhost_with_port(self.dest_port))
            .await?;
        Ok(())
    }

    pub fn iface(&self) -> &str {
        &self.iface
    }

    pub fn dest_port(&self) -> u16 {
        self.dest_port
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.iface, self.dest_port)
    }
}

pub fn localhost_with_port(port: u16) -> SocketAddr {
    SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::netlinks::free_port;
    use std::time::Duration;
    use tokio::sync::broadcast::error::RecvError;

    #[test]
    fn parse_link_line() {
        let def = LinkDefinition::try_parse("eth2  0a:0b:0c:0d:0e:0f 192.168.0.3\t6000").unwrap();
        assert_eq!(def.name, "eth2");
        assert_eq!(def.mac, MacAddr::new([10, 11, 12, 13, 14, 15]));
        assert_eq!(def.ip, Ipv4Addr::new(192, 168, 0, 3));
        assert_eq!(def.dest_port, 6000);

        assert!(matches!(
            LinkDefinition::try_parse("eth2 0a:0b:0c:0d:0e 192.168.0.3 6000"),
            Err(ParseLinkError::MalformedMac(_))
        ));
        assert!(matches!(
            LinkDefinition::try_parse("eth2 0a:0b:0c:0d:0e:0f 192.168.0 6000"),
            Err(ParseLinkError::MalformedIp)
        ));
        assert!(matches!(
            LinkDefinition::try_parse("eth2 0a:0b:0c:0d:0e:0f 192.168.0.3 70000"),
            Err(ParseLinkError::MalformedPort)
        ));
    }

    fn args_for(host_port: u16, peer_port: u16, last: u8) -> Args {
        Args {
            host_port,
            links: vec![LinkDefinition {
                name: "eth0".into(),
                mac: MacAddr::new([2, 0, 0, 0, 0, last]),
                ip: Ipv4Addr::new(10, 0, 0, last),
                dest_port: peer_port,
            }],
        }
    }

    #[tokio::test]
    async fn frames_cross_a_virtual_wire() {
        let (a_port, b_port) = (free_port(), free_port());
        let a = VtLinkLayer::new(&args_for(a_port, b_port, 1)).await.unwrap();
        let b = VtLinkLayer::new(&args_for(b_port, a_port, 2)).await.unwrap();

        let mut rx = b.listen().await;
        let a_iface = Iface::new("eth0", MacAddr::new([2, 0, 0, 0, 0, 1]), Ipv4Addr::new(10, 0, 0, 1));
        a.send_frame(&a_iface, &[1, 2, 3]).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.iface, "eth0");
        assert_eq!(received.bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn sending_on_unknown_interface_fails() {
        let port = free_port();
        let layer = VtLinkLayer::new(&args_for(port, free_port(), 1)).await.unwrap();
        let stray = Iface::new("eth9", MacAddr::default(), Ipv4Addr::UNSPECIFIED);

        assert!(matches!(
            layer.send_frame(&stray, &[0]).await,
            Err(Error::LinkNotFound(name)) if name == "eth9"
        ));
    }

    #[tokio::test]
    async fn closing_ends_every_subscription() {
        let port = free_port();
        let layer = VtLinkLayer::new(&args_for(port, free_port(), 1)).await.unwrap();
        let mut first = layer.listen().await;
        let mut second = layer.listen().await;

        layer.close().await;
        layer.close().await;

        assert!(matches!(first.recv().await, Err(RecvError::Closed)));
        assert!(matches!(second.recv().await, Err(RecvError::Closed)));

        let mut late = layer.listen().await;
        assert!(matches!(late.recv().await, Err(RecvError::Closed)));
    }
}
