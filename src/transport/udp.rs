//! UDP transport for DNS queries.
//!
//! A single receive loop reads datagrams and spawns one task per query, so a
//! slow generation or an admission stall only holds up its own client.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::handler::{QueryAction, QueryHandler};

use super::{MAX_DNS_PACKET_SIZE, Protocol, QueryLogger};

/// UDP transport for the responder.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind the UDP listening socket.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);

        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Start the UDP transport.
    ///
    /// Spawns the receive loop; the returned handle finishes only if the loop dies.
    pub fn start(self, handler: Arc<QueryHandler>) -> JoinHandle<()> {
        tokio::spawn(run(self.socket, handler))
    }
}

/// Main receive loop for the UDP transport.
async fn run(socket: Arc<UdpSocket>, handler: Arc<QueryHandler>) {
    let mut buf = [0u8; MAX_DNS_PACKET_SIZE];

    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "UDP recv error");
                continue;
            }
        };

        // Runts go to the handler too, they count against admission before being ignored
        let query = buf[..len].to_vec();
        tokio::spawn(handle_datagram(
            socket.clone(),
            handler.clone(),
            query,
            src,
        ));
    }
}

/// Handle a single datagram and send the reply, if any, to its source.
async fn handle_datagram(
    socket: Arc<UdpSocket>,
    handler: Arc<QueryHandler>,
    query: Vec<u8>,
    src: SocketAddr,
) {
    let start_time = Instant::now();
    let action = handler.process_query(&query).await;

    if let QueryAction::Answer { response, .. } = &action {
        if let Err(e) = socket.send_to(response, src).await {
            warn!(client = %src, error = %e, "UDP response error");
        }
    }

    QueryLogger::new(Protocol::Udp).outcome(&action, start_time.elapsed().as_secs_f64() * 1000.0);
}
