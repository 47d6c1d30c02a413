//! Transport layer implementations for the responder.
//!
//! Provides UDP and TCP transports that receive DNS queries from clients,
//! hand them to the [`QueryHandler`](crate::handler::QueryHandler) and write
//! back the reply.

pub mod tcp;
pub mod udp;

/// Maximum size of a DNS packet (with some headroom).
pub const MAX_DNS_PACKET_SIZE: usize = 4096;

use tracing::debug;

use crate::handler::QueryAction;

/// Transport protocol identifier for logging.
#[derive(Debug, Clone, Copy)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

/// Logger for query outcomes.
pub struct QueryLogger {
    protocol: Protocol,
}

impl QueryLogger {
    pub fn new(protocol: Protocol) -> Self {
        Self { protocol }
    }

    pub fn outcome(&self, action: &QueryAction, elapsed_ms: f64) {
        match action {
            QueryAction::Answer { name, response } => debug!(
                protocol = self.protocol.as_str(),
                query = %name,
                bytes = response.len(),
                total_ms = elapsed_ms,
                "ANSWERED"
            ),
            QueryAction::Dropped => debug!(
                protocol = self.protocol.as_str(),
                total_ms = elapsed_ms,
                "DROPPED"
            ),
            QueryAction::Ignore => debug!(
                protocol = self.protocol.as_str(),
                "IGNORED"
            ),
        }
    }
}
