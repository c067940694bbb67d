//! Network transport module
//!
//! This module binds the per-interface multicast, unicast UDP and TCP
//! sockets, runs one receive task per socket and hands every decoded frame
//! to the node through a channel.

mod interface;
mod multicast;
mod tcp;
mod unicast;

pub use self::interface::{available_interfaces, select_interfaces, NetworkInterface};

use std::future::Future;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::{Error, Result, TransportConfig};
use crate::protocol::Message;
use self::multicast::MulticastServer;
use self::tcp::TcpServer;
use self::unicast::UdpServer;

/// Where the answer to an inbound frame has to go
#[derive(Debug, Clone)]
pub enum ReplyPath {
    /// Unicast UDP to the sender
    Udp,
    /// Back over the TCP connection the frame arrived on
    Tcp(mpsc::Sender<Message>),
}

/// Which kind of socket received a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Via {
    /// Per-interface multicast socket
    Multicast,
    /// Per-interface unicast UDP socket
    Unicast,
    /// Accepted TCP connection
    Tcp,
}

/// A decoded frame and its origin
#[derive(Debug, Clone)]
pub struct Inbound {
    /// Decoded frame
    pub message: Message,
    /// Sender endpoint
    pub from: SocketAddr,
    /// Receiving socket kind
    pub via: Via,
    /// Reply route
    pub reply: ReplyPath,
}

/// Runs `bind` under the configured retry policy
///
/// Each port is tried `bind_retry_count` times, `bind_retry_wait` apart.
/// With `step_ports` set and `auto_port_binding` enabled the following
/// ports are tried too.
pub(crate) async fn bind_with_retry<T, F, Fut>(
    config: &TransportConfig,
    port: u16,
    step_ports: bool,
    mut bind: F,
) -> Result<T>
where
    F: FnMut(u16) -> Fut,
    Fut: Future<Output = std::io::Result<T>>,
{
    let port_count = if step_ports && config.auto_port_binding && port != 0 {
        config.port_step_limit.max(1)
    } else {
        1
    };
    let attempts = config.bind_retry_count.max(1);

    let mut last_err = None;
    for step in 0..port_count {
        let Some(candidate) = port.checked_add(step) else {
            break;
        };
        for attempt in 1..=attempts {
            match bind(candidate).await {
                Ok(bound) => return Ok(bound),
                Err(e) => {
                    debug!("[NET] bind on port {} failed (attempt {}/{}): {}", candidate, attempt, attempts, e);
                    last_err = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(config.bind_retry_wait).await;
                    }
                }
            }
        }
    }

    Err(Error::network(format!(
        "failed to bind port {}: {}",
        port,
        last_err.map(|e| e.to_string()).unwrap_or_else(|| "no port available".into())
    )))
}

/// Owns every socket of a running node
pub struct TransportManager {
    config: TransportConfig,
    unicast: Vec<UdpServer>,
    multicast: Vec<MulticastServer>,
    tcp: Vec<TcpServer>,
    token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TransportManager {
    /// Binds all sockets and starts their receive tasks
    ///
    /// Every decoded frame is sent to `inbound`.
    pub async fn start(config: TransportConfig, inbound: mpsc::Sender<Inbound>) -> Result<Self> {
        let interfaces = select_interfaces(&config.interfaces)?;
        if interfaces.is_empty() {
            return Err(Error::network("no usable network interface"));
        }

        let token = CancellationToken::new();
        let mut manager = TransportManager {
            config: config.clone(),
            unicast: Vec::new(),
            multicast: Vec::new(),
            tcp: Vec::new(),
            token: token.clone(),
            tasks: Mutex::new(Vec::new()),
        };

        let mut tasks = Vec::new();
        for iface in &interfaces {
            if config.multicast_enabled {
                let server = MulticastServer::bind(iface.clone(), &config).await?;
                tasks.push(server.spawn_receiver(inbound.clone(), token.clone()));
                manager.multicast.push(server);
            }

            let server = UdpServer::bind(iface.clone(), &config).await?;
            let port = server.local_addr().port();
            tasks.push(server.spawn_receiver(inbound.clone(), token.clone()));
            manager.unicast.push(server);

            if config.tcp_enabled {
                let server = TcpServer::bind(iface.clone(), port, &config).await?;
                tasks.push(server.spawn_acceptor(inbound.clone(), token.clone()));
                manager.tcp.push(server);
            }
        }
        manager.tasks = Mutex::new(tasks);

        info!(
            "[NET] transport started: unicast {:?}, multicast on {} interface(s), tcp {}",
            manager.unicast_addrs(),
            manager.multicast.len(),
            manager.tcp.len()
        );
        Ok(manager)
    }

    /// Closes every socket and waits for the receive tasks to end
    pub async fn stop(&self) {
        self.token.cancel();
        let tasks = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for task in tasks {
            let _ = task.await;
        }
        debug!("[NET] transport stopped");
    }

    /// Returns the transport configuration
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Bound unicast UDP endpoints
    pub fn unicast_addrs(&self) -> Vec<SocketAddr> {
        self.unicast.iter().map(UdpServer::local_addr).collect()
    }

    /// Bound TCP listener endpoints
    pub fn tcp_addrs(&self) -> Vec<SocketAddr> {
        self.tcp.iter().map(TcpServer::local_addr).collect()
    }

    /// Returns true if `addr` is one of this node's sending endpoints
    pub fn is_own_endpoint(&self, addr: &SocketAddr) -> bool {
        self.unicast.iter().any(|server| server.local_addr() == *addr)
    }

    fn multicast_target(&self) -> SocketAddrV4 {
        let port = if self.config.port == 0 {
            crate::core::DEFAULT_PORT
        } else {
            self.config.port
        };
        SocketAddrV4::new(self.config.multicast_group, port)
    }

    /// Sends a frame to the multicast group on every interface
    pub async fn send_multicast(&self, message: &Message) -> Result<()> {
        let bytes = message.encode()?;
        let target = self.multicast_target();

        let mut sent = 0;
        let mut last_err = None;
        for server in &self.unicast {
            match server.send_to(&bytes, SocketAddr::V4(target)).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!("[NET] multicast via {} failed: {}", server.local_addr(), e);
                    last_err = Some(e);
                }
            }
        }

        match (sent, last_err) {
            (0, Some(e)) => Err(e),
            _ => Ok(()),
        }
    }

    /// Sends a frame to one endpoint from the socket of the matching interface
    pub async fn send_unicast(&self, message: &Message, to: SocketAddr) -> Result<()> {
        let bytes = message.encode()?;
        let server = self
            .select_unicast(&to)
            .ok_or_else(|| Error::network("transport has no unicast socket"))?;
        server.send_to(&bytes, to).await
    }

    /// Sends an answer back the way its request came in
    pub async fn reply(&self, message: &Message, to: SocketAddr, path: &ReplyPath) -> Result<()> {
        match path {
            ReplyPath::Udp => self.send_unicast(message, to).await,
            ReplyPath::Tcp(tx) => tx
                .send(message.clone())
                .await
                .map_err(|_| Error::network(format!("TCP connection to {} closed", to))),
        }
    }

    /// Sends a request over a dedicated TCP connection and waits for its
    /// response
    pub async fn post_tcp(&self, message: &Message, to: SocketAddr, wait: Duration) -> Result<Message> {
        tcp::request(to, message, self.config.tcp_connect_timeout, wait).await
    }

    fn select_unicast(&self, to: &SocketAddr) -> Option<&UdpServer> {
        let dest = match to {
            SocketAddr::V4(v4) => *v4.ip(),
            SocketAddr::V6(_) => return self.unicast.first(),
        };
        self.unicast
            .iter()
            .find(|server| server.interface().contains(dest))
            .or_else(|| self.unicast.first())
    }
}

impl Drop for TransportManager {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
