use dhcp6relay_core::error::{Error, Result};
use dhcp6relay_core::types::PeerIdentity;
use pnet::datalink;
use std::net::{IpAddr, Ipv6Addr, SocketAddrV6};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Lifecycle notification for the managed link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// IPv6 is usable on the link; carries the identity of the peer.
    Up(PeerIdentity),
    Down,
}

/// fe80::/10
pub fn is_link_local(addr: &Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}

/// Find the link-local address of `interface`, scoped to its index.
pub fn discover_link_local(interface: &str) -> Result<SocketAddrV6> {
    let iface = datalink::interfaces()
        .into_iter()
        .find(|i| i.name == interface)
        .ok_or_else(|| Error::LinkLocalNotFound(interface.to_string()))?;

    iface
        .ips
        .iter()
        .find_map(|net| match net.ip() {
            IpAddr::V6(addr) if is_link_local(&addr) => Some(addr),
            _ => None,
        })
        .map(|addr| SocketAddrV6::new(addr, 0, 0, iface.index))
        .ok_or_else(|| Error::LinkLocalNotFound(interface.to_string()))
}

/// Watches the managed interface and reports link-up when it gains a
/// link-local address and link-down when it loses it.
pub struct LinkMonitor {
    interface: String,
    identity: PeerIdentity,
    poll_interval: Duration,
}

impl LinkMonitor {
    pub fn new(interface: &str, identity: PeerIdentity, poll_interval: Duration) -> Self {
        Self {
            interface: interface.to_string(),
            identity,
            poll_interval,
        }
    }

    pub async fn run(
        self,
        events: mpsc::Sender<LinkEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        info!(
            "link monitor started on {}, interval: {:?}",
            self.interface, self.poll_interval
        );

        let mut shutdown = shutdown;
        let mut interval = tokio::time::interval(self.poll_interval);
        let mut up = false;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let present = match discover_link_local(&self.interface) {
                        Ok(addr) => {
                            debug!(interface = %self.interface, %addr, "link-local address present");
                            true
                        }
                        Err(_) => false,
                    };
                    if let Some(event) = self.transition(&mut up, present) {
                        info!(interface = %self.interface, ?event, "link state changed");
                        if events.send(event).await.is_err() {
                            info!("link event receiver gone, stopping monitor");
                            break;
                        }
                    }
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        info!("link monitor shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    fn transition(&self, up: &mut bool, present: bool) -> Option<LinkEvent> {
        match (*up, present) {
            (false, true) => {
                *up = true;
                Some(LinkEvent::Up(self.identity.clone()))
            }
            (true, false) => {
                *up = false;
                Some(LinkEvent::Down)
            }
            _ => None,
        }
    }
}
