//! Module discovery via UDP broadcast.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use log::debug;
use serde_json::Value;

use crate::errors::Error;
use crate::protocol::{ModuleInfo, Request, decode_reply, parse_result};
use crate::runtime::{self, AsyncUdpSocket, UdpSocket};
use crate::transport::MODULE_PORT;

type Result<T> = std::result::Result<T, Error>;

/// A lighting module that answered the discovery broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredModule {
    pub ip: Ipv4Addr,
    pub module_id: String,
    pub mac: String,
}

impl DiscoveredModule {
    /// Address to hand to [`crate::Controller::udp`].
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.ip), MODULE_PORT)
    }
}

/// Find lighting modules on the local network.
///
/// Broadcasts `getModuleInfo` and collects answers until
/// `discovery_timeout` has passed. Modules are deduplicated by MAC.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use cuehall_lights::discover_modules;
///
/// # async fn run() -> Result<(), cuehall_lights::Error> {
/// for module in discover_modules(Duration::from_secs(3)).await? {
///     println!("{} at {} ({})", module.module_id, module.ip, module.mac);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn discover_modules(discovery_timeout: Duration) -> Result<Vec<DiscoveredModule>> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .map_err(|e| Error::socket("bind", e))?;

    socket
        .set_broadcast(true)
        .map_err(|e| Error::socket("set_broadcast", e))?;

    let msg = serde_json::to_vec(&Request::GetModuleInfo).map_err(Error::JsonDump)?;
    let broadcast = SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), MODULE_PORT);
    socket
        .send_to(&msg, broadcast)
        .await
        .map_err(|e| Error::socket("send_to", e))?;

    let mut discovered: HashMap<String, DiscoveredModule> = HashMap::new();
    let start = Instant::now();
    let mut buffer = [0u8; 4096];
    let recv_timeout = Duration::from_millis(500);

    while start.elapsed() < discovery_timeout {
        let left = discovery_timeout.saturating_sub(start.elapsed());
        match runtime::timeout(recv_timeout.min(left), socket.recv_from(&mut buffer)).await {
            Ok(Ok((size, SocketAddr::V4(addr)))) => match parse_announcement(&buffer[..size]) {
                Some((module_id, mac)) => {
                    discovered.insert(
                        mac.clone(),
                        DiscoveredModule {
                            ip: *addr.ip(),
                            module_id,
                            mac,
                        },
                    );
                }
                None => debug!("ignoring non-module reply from {}", addr),
            },
            // recv window elapsed; check the overall deadline
            _ => continue,
        }
    }

    Ok(discovered.into_values().collect())
}

fn parse_announcement(datagram: &[u8]) -> Option<(String, String)> {
    let raw: Value = serde_json::from_slice(datagram).ok()?;
    let info: ModuleInfo = parse_result(decode_reply(raw).ok()?).ok()?;
    Some((info.module_id, info.mac?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_announcement() {
        let reply = br#"{"method":"getModuleInfo","result":{"moduleId":"ESP32-BILLIARD-001","mac":"a8032a1b2c3d"}}"#;
        assert_eq!(
            parse_announcement(reply),
            Some(("ESP32-BILLIARD-001".to_string(), "a8032a1b2c3d".to_string()))
        );
    }

    #[test]
    fn test_parse_announcement_rejects_noise() {
        assert!(parse_announcement(b"hello").is_none());
        assert!(parse_announcement(br#"{"method":"getModuleInfo","error":{"code":1}}"#).is_none());
        assert!(parse_announcement(br#"{"method":"getModuleInfo","result":{"moduleId":"X"}}"#).is_none());
    }

    #[test]
    fn test_module_addr() {
        let module = DiscoveredModule {
            ip: Ipv4Addr::new(192, 168, 1, 100),
            module_id: "ESP32-BILLIARD-001".into(),
            mac: "a8032a1b2c3d".into(),
        };
        assert_eq!(module.addr().to_string(), "192.168.1.100:38899");
    }
}
