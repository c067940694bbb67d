use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::core::{Error, Result, TransportConfig, MAX_PACKET_SIZE};
use crate::protocol::Message;
use super::interface::NetworkInterface;
use super::{bind_with_retry, Inbound, ReplyPath, Via};

/// Unicast UDP socket of one interface
///
/// Also used to send multicast frames out of that interface.
pub(crate) struct UdpServer {
    iface: NetworkInterface,
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
}

fn unicast_socket(addr: SocketAddrV4) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_nonblocking(true)?;
    if !addr.ip().is_unspecified() {
        if let Err(e) = socket.set_multicast_if_v4(addr.ip()) {
            debug!("[UDP] set_multicast_if_v4({}) failed (non-fatal): {}", addr.ip(), e);
        }
    }
    socket.set_multicast_loop_v4(true)?;
    let _ = socket.set_multicast_ttl_v4(1);
    socket.bind(&SocketAddr::V4(addr).into())?;
    UdpSocket::from_std(socket.into())
}

impl UdpServer {
    /// Binds the interface address on the configured port
    pub(crate) async fn bind(iface: NetworkInterface, config: &TransportConfig) -> Result<Self> {
        let ip = iface.addr;
        let socket = bind_with_retry(config, config.port, true, move |port| async move {
            unicast_socket(SocketAddrV4::new(ip, port))
        })
        .await?;
        let local_addr = socket.local_addr()?;
        debug!("[UDP] unicast bound on {}", local_addr);

        Ok(UdpServer {
            iface,
            socket: Arc::new(socket),
            local_addr,
        })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub(crate) fn interface(&self) -> &NetworkInterface {
        &self.iface
    }

    pub(crate) async fn send_to(&self, bytes: &[u8], to: SocketAddr) -> Result<()> {
        trace!("[UDP] {} -> {}: {}", self.local_addr, to, hex::encode_upper(bytes));
        let sent = self
            .socket
            .send_to(bytes, to)
            .await
            .map_err(|e| Error::network(format!("send from {} to {} failed: {}", self.local_addr, to, e)))?;
        if sent != bytes.len() {
            return Err(Error::network(format!("short send to {}: {} of {} bytes", to, sent, bytes.len())));
        }
        Ok(())
    }

    pub(crate) fn spawn_receiver(
        &self,
        inbound: mpsc::Sender<Inbound>,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(receive_loop(self.socket.clone(), Via::Unicast, inbound, token))
    }
}

/// Reads datagrams until cancelled
///
/// A frame that fails to decode is logged and skipped; the loop keeps
/// listening.
pub(super) async fn receive_loop(
    socket: Arc<UdpSocket>,
    via: Via,
    inbound: mpsc::Sender<Inbound>,
    token: CancellationToken,
) {
    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    let local = socket
        .local_addr()
        .unwrap_or_else(|_| SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)));

    loop {
        let (len, from) = tokio::select! {
            _ = token.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok(received) => received,
                Err(e) if matches!(
                    e.kind(),
                    io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused | io::ErrorKind::Interrupted
                ) => {
                    debug!("[UDP] {} transient receive error: {}", local, e);
                    continue;
                }
                Err(e) => {
                    error!("[UDP] {} receive failed, closing: {}", local, e);
                    break;
                }
            },
        };

        let message = match Message::decode(&buf[..len]) {
            Ok(message) => message,
            Err(e) => {
                warn!("[UDP] {} dropping frame from {}: {}", local, from, e);
                continue;
            }
        };
        trace!("[UDP] {} <- {}: {}", local, from, message);

        let inbound_msg = Inbound {
            message,
            from,
            via,
            reply: ReplyPath::Udp,
        };
        if inbound.send(inbound_msg).await.is_err() {
            debug!("[UDP] {} inbound channel closed", local);
            break;
        }
    }
}
