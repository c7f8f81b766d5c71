//! Host port reservation.
//!
//! Every container port gets a host port, starting at the container port
//! value and walking upwards. A candidate is taken when nothing listens on it
//! and this session has not handed it out already.

use crate::{Error, Result};
use async_net::{TcpListener, UdpSocket};
use playground_manifest::{Manifest, Protocol};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Candidates tried per container port
pub const MAX_PORT_ATTEMPTS: u32 = 1000;

/// Hands out free host ports for a session
#[derive(Debug, Default)]
pub struct PortReserver {
    bind_locally: bool,
    reserved: HashSet<(u16, Protocol)>,
}

impl PortReserver {
    /// Probe on all interfaces, or on 127.0.0.1 only
    pub fn new(bind_locally: bool) -> Self {
        Self { bind_locally, reserved: HashSet::new() }
    }

    /// Treat a port as taken without probing it
    pub fn mark_reserved(&mut self, port: u16, protocol: Protocol) {
        self.reserved.insert((port, protocol));
    }

    /// Whether a port was handed out by this reserver
    pub fn is_reserved(&self, port: u16, protocol: Protocol) -> bool {
        self.reserved.contains(&(port, protocol))
    }

    fn host(&self) -> &'static str {
        if self.bind_locally { "127.0.0.1" } else { "0.0.0.0" }
    }

    async fn is_free(&self, port: u16, protocol: Protocol) -> bool {
        if self.is_reserved(port, protocol) {
            return false;
        }
        let addr = format!("{}:{}", self.host(), port);
        match protocol {
            Protocol::Tcp => TcpListener::bind(addr.as_str()).await.is_ok(),
            Protocol::Udp => UdpSocket::bind(addr.as_str()).await.is_ok(),
        }
    }

    /// Reserve one host port free for every protocol in `protocols`
    pub async fn reserve(&mut self, container_port: u16, protocols: &[Protocol]) -> Result<u16> {
        for offset in 0..MAX_PORT_ATTEMPTS {
            let Ok(candidate) = u16::try_from(u32::from(container_port) + offset) else {
                break;
            };
            let mut free = true;
            for protocol in protocols {
                if !self.is_free(candidate, *protocol).await {
                    free = false;
                    break;
                }
            }
            if free {
                for protocol in protocols {
                    self.reserved.insert((candidate, *protocol));
                }
                return Ok(candidate);
            }
        }
        Err(Error::PortExhausted { port: container_port, attempts: MAX_PORT_ATTEMPTS })
    }

    /// Assign a host port to every port of every service.
    ///
    /// A label declared for both TCP and UDP on the same container port gets
    /// one host port serving both.
    pub async fn reserve_manifest(&mut self, manifest: &mut Manifest) -> Result<()> {
        for service in &mut manifest.services {
            let mut groups: BTreeMap<(String, u16), Vec<Protocol>> = BTreeMap::new();
            for port in &service.ports {
                groups
                    .entry((port.name.clone(), port.container_port))
                    .or_default()
                    .push(port.protocol);
            }

            for ((name, container_port), protocols) in groups {
                let host_port = self.reserve(container_port, &protocols).await?;
                debug!(
                    "Reserved host port {} for {}/{} ({})",
                    host_port, service.name, name, container_port
                );
                for port in service
                    .ports
                    .iter_mut()
                    .filter(|p| p.name == name && p.container_port == container_port)
                {
                    port.host_port = Some(host_port);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[smol_potat::test]
    async fn test_skips_reserved_ports() {
        let mut reserver = PortReserver::new(true);
        let first = reserver.reserve(38545, &[Protocol::Tcp]).await.unwrap();
        let second = reserver.reserve(38545, &[Protocol::Tcp]).await.unwrap();
        assert_ne!(first, second);
        assert!(second > first);
    }

    #[smol_potat::test]
    async fn test_skips_bound_ports() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let taken = listener.local_addr().unwrap().port();

        let mut reserver = PortReserver::new(true);
        let port = reserver.reserve(taken, &[Protocol::Tcp]).await.unwrap();
        assert_ne!(port, taken);
    }

    #[smol_potat::test]
    async fn test_exhaustion_fails_explicitly() {
        let mut reserver = PortReserver::new(true);
        for offset in 0..MAX_PORT_ATTEMPTS {
            reserver.mark_reserved(20000 + offset as u16, Protocol::Tcp);
        }
        let err = reserver.reserve(20000, &[Protocol::Tcp]).await.unwrap_err();
        assert!(matches!(err, Error::PortExhausted { port: 20000, attempts: 1000 }));
    }

    #[smol_potat::test]
    async fn test_tcp_and_udp_share_a_port() {
        let mut reserver = PortReserver::new(true);
        let port = reserver.reserve(40303, &[Protocol::Tcp, Protocol::Udp]).await.unwrap();
        assert!(reserver.is_reserved(port, Protocol::Tcp));
        assert!(reserver.is_reserved(port, Protocol::Udp));
    }
}
