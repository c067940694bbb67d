use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::{Result, TransportConfig, DEFAULT_PORT};
use super::interface::NetworkInterface;
use super::unicast::receive_loop;
use super::{bind_with_retry, Inbound, Via};

/// Multicast receive socket of one interface
pub(crate) struct MulticastServer {
    socket: Arc<UdpSocket>,
}

fn multicast_socket(group: Ipv4Addr, iface: Ipv4Addr, port: u16) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;

    // Binding the group keeps unicast traffic for the port off this socket
    #[cfg(unix)]
    let bind_ip = group;
    #[cfg(not(unix))]
    let bind_ip = Ipv4Addr::UNSPECIFIED;
    socket.bind(&SocketAddr::V4(SocketAddrV4::new(bind_ip, port)).into())?;

    match socket.join_multicast_v4(&group, &iface) {
        Ok(()) => debug!("[UDP] join_multicast_v4({}) on interface {}", group, iface),
        // EADDRINUSE: already joined on the same physical NIC
        Err(e) if e.raw_os_error() == Some(98) => {
            debug!("[UDP] join_multicast_v4({}) on {} - already joined", group, iface)
        }
        Err(e) => return Err(e),
    }
    socket.set_multicast_loop_v4(true)?;

    UdpSocket::from_std(socket.into())
}

impl MulticastServer {
    /// Binds the multicast port and joins the group on `iface`
    ///
    /// The port never steps: peers only multicast to the standard one.
    pub(crate) async fn bind(iface: NetworkInterface, config: &TransportConfig) -> Result<Self> {
        let group = config.multicast_group;
        let port = if config.port == 0 { DEFAULT_PORT } else { config.port };
        let addr = iface.addr;

        let socket = bind_with_retry(config, port, false, move |port| async move {
            multicast_socket(group, addr, port)
        })
        .await
        .map_err(|e| {
            warn!("[UDP] multicast on {} unavailable: {}", addr, e);
            e
        })?;

        Ok(MulticastServer {
            socket: Arc::new(socket),
        })
    }

    pub(crate) fn spawn_receiver(
        &self,
        inbound: mpsc::Sender<Inbound>,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(receive_loop(self.socket.clone(), Via::Multicast, inbound, token))
    }
}
