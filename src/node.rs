use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;

use crate::device::{Decision, Device};
use crate::iface::Interfaces;
use crate::link::{self, Args, Received, VtLinkLayer};
use crate::packet::Frame;
use crate::router::{ArpCache, RouteTable, Router};
use crate::switch::{Switch, SwitchConfig};

/// The kind of device a node runs, with whatever tables it needs.
pub enum Role {
    Router {
        routes: RouteTable,
        arp_cache: ArpCache,
    },
    Switch,
}

pub struct NodeBuilder<'a> {
    args: &'a Args,
    role: Role,
    switch_config: SwitchConfig,
}

impl<'a> NodeBuilder<'a> {
    pub fn new(args: &'a Args, role: Role) -> Self {
        Self {
            args,
            role,
            switch_config: SwitchConfig::default(),
        }
    }

    /// Set how long a switch remembers a MAC address it has not seen again.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.switch_config.lease = lease;
        self
    }

    /// Set how often a switch drops expired MAC addresses.
    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.switch_config.sweep_interval = sweep_interval;
        self
    }

    /// Bind the node's socket and start its device.
    pub async fn build(self) -> link::Result<Node> {
        let link = Arc::new(VtLinkLayer::new(self.args).await?);
        let interfaces = Interfaces::from(self.args);

        let (device, switch): (Arc<dyn Device>, _) = match self.role {
            Role::Router { routes, arp_cache } => (
                Arc::new(Router::new(interfaces, routes, arp_cache, link.clone())),
                None,
            ),
            Role::Switch => {
                let switch = Arc::new(Switch::new(interfaces, link.clone(), self.switch_config));
                (switch.clone(), Some(switch))
            }
        };

        Ok(Node {
            link,
            device,
            switch,
        })
    }
}

pub struct Node {
    link: Arc<VtLinkLayer>,
    device: Arc<dyn Device>,
    switch: Option<Arc<Switch>>,
}

impl Node {
    pub fn device(&self) -> Arc<dyn Device> {
        self.device.clone()
    }

    pub fn host_port(&self) -> u16 {
        self.link.host_port()
    }

    /// Receive frames until the link layer goes away, handing each one to
    /// the device on its own task.
    pub async fn run(&self) {
        let mut listener = self.link.listen().await;

        loop {
            match listener.recv().await {
                Ok(received) => self.dispatch(received),
                Err(RecvError::Lagged(missed)) => {
                    log::warn!("Listener fell behind, {} frames dropped", missed);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    fn dispatch(&self, received: Received) {
        let frame = match Frame::decode(&received.bytes) {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("Discarding datagram on {}: {}", received.iface, e);
                return;
            }
        };

        let device = self.device.clone();
        tokio::spawn(async move {
            match device.handle_frame(frame, &received.iface).await {
                Decision::Drop(reason) => {
                    log::debug!("Dropped frame from {}: {}", received.iface, reason)
                }
                decision => log::trace!("Frame from {}: {:?}", received.iface, decision),
            }
        });
    }

    /// Stop receiving and stop background work owned by the device. `run`
    /// returns once the frames already queued are dispatched.
    pub async fn shutdown(&self) {
        self.link.close().await;
        if let Some(switch) = &self.switch {
            switch.shutdown().await;
        }
    }
}
