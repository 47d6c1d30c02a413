//! TCP transport for DNS queries.
//!
//! Each client connection is handled independently. TCP DNS messages are
//! prefixed with a 2-byte length; a connection may carry several queries,
//! which are answered in order until the client closes.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::handler::{QueryAction, QueryHandler};

use super::{MAX_DNS_PACKET_SIZE, Protocol, QueryLogger};

/// TCP transport for the responder.
///
/// Binds to a local address and accepts connections from clients.
/// Each connection is handled in a separate task.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Bind a TCP listener for the transport.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Start the TCP transport.
    ///
    /// Spawns an accept loop that handles each connection in a separate task.
    pub fn start(self, handler: Arc<QueryHandler>) -> JoinHandle<()> {
        tokio::spawn(run_accept_loop(self.listener, handler))
    }
}

/// Accept loop - spawns a handler task for each incoming connection.
async fn run_accept_loop(listener: TcpListener, handler: Arc<QueryHandler>) {
    loop {
        match listener.accept().await {
            Ok((client, peer)) => {
                tokio::spawn(handle_connection(client, peer, handler.clone()));
            }
            Err(e) => {
                warn!(error = %e, "TCP accept error");
            }
        }
    }
}

/// Serve queries on one connection until the client closes it.
async fn handle_connection(mut client: TcpStream, peer: SocketAddr, handler: Arc<QueryHandler>) {
    let logger = QueryLogger::new(Protocol::Tcp);

    loop {
        let query = match read_dns_message(&mut client).await {
            Ok(Some(q)) => q,
            Ok(None) => return,
            Err(e) => {
                debug!(client = %peer, error = %e, "TCP read error");
                return;
            }
        };

        let start_time = Instant::now();
        let action = handler.process_query(&query).await;

        if let QueryAction::Answer { response, .. } = &action {
            if let Err(e) = write_dns_message(&mut client, response).await {
                debug!(client = %peer, error = %e, "TCP write error");
                return;
            }
        }

        logger.outcome(&action, start_time.elapsed().as_secs_f64() * 1000.0);
    }
}

/// Read one length-prefixed DNS message, without its prefix.
///
/// Returns `Ok(None)` when the peer closed the connection between messages.
async fn read_dns_message(stream: &mut TcpStream) -> io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 2];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let msg_len = u16::from_be_bytes(len_buf) as usize;
    if msg_len > MAX_DNS_PACKET_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message of {} bytes exceeds limit", msg_len),
        ));
    }

    let mut buf = vec![0u8; msg_len];
    stream.read_exact(&mut buf).await?;

    Ok(Some(buf))
}

/// Write one DNS message with its 2-byte length prefix.
async fn write_dns_message(stream: &mut TcpStream, message: &[u8]) -> io::Result<()> {
    let len = u16::try_from(message.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "reply too large for TCP"))?;

    let mut framed = Vec::with_capacity(2 + message.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(message);
    stream.write_all(&framed).await
}
