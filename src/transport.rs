//! Byte-level exchange with the lighting module.

use std::net::{IpAddr, SocketAddr};

use serde_json::Value;

use crate::errors::Error;
use crate::protocol::Request;
use crate::runtime::{AsyncUdpSocket, BoxFuture, UdpSocket};

type Result<T> = std::result::Result<T, Error>;

/// UDP port the module firmware listens on.
pub const MODULE_PORT: u16 = 38899;

/// One request, one raw JSON reply.
///
/// Implementations do not retry and do not bound their own duration; the
/// link wraps every call in its request timeout and drops the future when it
/// expires.
pub trait Transport: Send + Sync {
    fn request<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Value>>;

    /// Address of the module, for display.
    fn peer(&self) -> Option<String> {
        None
    }
}

/// JSON over UDP, one ephemeral socket per exchange.
#[derive(Debug, Clone)]
pub struct UdpTransport {
    addr: SocketAddr,
}

impl UdpTransport {
    pub fn new(addr: SocketAddr) -> Self {
        UdpTransport { addr }
    }

    /// Talk to a module at `ip` on the default port.
    pub fn with_ip(ip: IpAddr) -> Self {
        Self::new(SocketAddr::new(ip, MODULE_PORT))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    async fn exchange(&self, request: &Request) -> Result<Value> {
        let msg = serde_json::to_vec(request).map_err(Error::JsonDump)?;

        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| Error::socket("bind", e))?;

        socket
            .connect(self.addr)
            .await
            .map_err(|e| Error::socket("connect", e))?;

        socket
            .send(&msg)
            .await
            .map_err(|e| Error::socket("send", e))?;

        let mut buffer = [0u8; 4096];
        let bytes = socket
            .recv(&mut buffer)
            .await
            .map_err(|e| Error::socket("receive", e))?;

        let reply = String::from_utf8(buffer[..bytes].to_vec()).map_err(Error::Utf8Decode)?;
        serde_json::from_str(&reply).map_err(Error::JsonLoad)
    }
}

impl Transport for UdpTransport {
    fn request<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Value>> {
        Box::pin(self.exchange(request))
    }

    fn peer(&self) -> Option<String> {
        Some(self.addr.ip().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_default_port() {
        let transport = UdpTransport::with_ip(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100)));
        assert_eq!(transport.addr().port(), MODULE_PORT);
        assert_eq!(transport.peer().as_deref(), Some("192.168.1.100"));
    }

    #[tokio::test]
    async fn test_exchange_over_loopback() {
        let module = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let transport = UdpTransport::new(module.local_addr().unwrap());

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            let (n, from) = module.recv_from(&mut buf).await.unwrap();
            let req: Value = serde_json::from_slice(&buf[..n]).unwrap();
            assert_eq!(req["method"], "getLights");
            module
                .send_to(br#"{"method":"getLights","result":{"lights":[]}}"#, from)
                .await
                .unwrap();
        });

        let reply = transport.request(&Request::GetLights).await.unwrap();
        assert_eq!(reply["result"]["lights"], serde_json::json!([]));
        responder.await.unwrap();
    }
}
