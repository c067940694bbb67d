use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::core::{Error, Result, TransportConfig};
use crate::protocol::{Message, MessageCodec};
use super::interface::NetworkInterface;
use super::{bind_with_retry, Inbound, ReplyPath, Via};

/// Pending replies per TCP connection
const REPLY_QUEUE: usize = 16;

/// TCP listener of one interface
pub(crate) struct TcpServer {
    listener: Arc<TcpListener>,
    local_addr: SocketAddr,
}

impl TcpServer {
    /// Listens on the interface address and the unicast UDP port
    pub(crate) async fn bind(iface: NetworkInterface, port: u16, config: &TransportConfig) -> Result<Self> {
        let ip = iface.addr;
        let listener = bind_with_retry(config, port, false, move |port| async move {
            let socket = TcpSocket::new_v4()?;
            socket.set_reuseaddr(true)?;
            socket.bind(SocketAddr::V4(SocketAddrV4::new(ip, port)))?;
            socket.listen(128)
        })
        .await?;
        let local_addr = listener.local_addr()?;
        debug!("[TCP] listening on {}", local_addr);
        Ok(TcpServer {
            listener: Arc::new(listener),
            local_addr,
        })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until cancelled, one task per connection
    pub(crate) fn spawn_acceptor(
        &self,
        inbound: mpsc::Sender<Inbound>,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let listener = self.listener.clone();
        let local_addr = self.local_addr;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            debug!("[TCP] {} accepted {}", local_addr, peer);
                            tokio::spawn(serve_connection(stream, peer, inbound.clone(), token.clone()));
                        }
                        Err(e) => warn!("[TCP] {} accept failed: {}", local_addr, e),
                    },
                }
            }
        })
    }
}

/// Reads frames from one accepted connection and writes back the replies
/// the node queues for it
///
/// A stream cannot resynchronise after a bad frame, so a decode error
/// closes the connection; the listener keeps running.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    inbound: mpsc::Sender<Inbound>,
    token: CancellationToken,
) {
    let (mut sink, mut frames) = Framed::new(stream, MessageCodec::new()).split();
    let (reply_tx, mut reply_rx) = mpsc::channel::<Message>(REPLY_QUEUE);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            frame = frames.next() => match frame {
                Some(Ok(message)) => {
                    trace!("[TCP] <- {}: {}", peer, message);
                    let inbound_msg = Inbound {
                        message,
                        from: peer,
                        via: Via::Tcp,
                        reply: ReplyPath::Tcp(reply_tx.clone()),
                    };
                    if inbound.send(inbound_msg).await.is_err() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!("[TCP] closing {} after bad frame: {}", peer, e);
                    break;
                }
                None => break,
            },
            Some(reply) = reply_rx.recv() => {
                trace!("[TCP] -> {}: {}", peer, reply);
                if let Err(e) = sink.send(reply).await {
                    warn!("[TCP] write to {} failed: {}", peer, e);
                    break;
                }
            }
        }
    }
    debug!("[TCP] connection {} closed", peer);
}

/// Sends `request` over a new connection and waits for the frame that
/// answers it
pub(crate) async fn request(
    to: SocketAddr,
    request: &Message,
    connect_timeout: Duration,
    wait: Duration,
) -> Result<Message> {
    let stream = timeout(connect_timeout, TcpStream::connect(to))
        .await
        .map_err(|_| Error::network(format!("TCP connect to {} timed out", to)))?
        .map_err(|e| Error::network(format!("TCP connect to {} failed: {}", to, e)))?;

    let mut framed = Framed::new(stream, MessageCodec::new());
    framed.send(request).await?;

    let response = async {
        while let Some(frame) = framed.next().await {
            let message = frame?;
            if message.is_response_to(request) {
                return Ok(message);
            }
        }
        Err(Error::network(format!("TCP connection to {} closed before the response", to)))
    };

    timeout(wait, response).await.map_err(|_| Error::Timeout(wait))?
}
