//! Server orchestration.
//!
//! Binds transports and runs the responder.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, Either};
use tracing::{error, info};

use crate::admission::AdmissionController;
use crate::config::{GenerationParams, SystemPrompt};
use crate::handler::QueryHandler;
use crate::inference::InferenceClient;
use crate::transport::{tcp::TcpTransport, udp::UdpTransport};

/// Configuration for the responder.
pub struct ServerConfig {
    /// Local address to bind (e.g., 0.0.0.0:53). Port 0 picks a free port.
    pub bind_addr: SocketAddr,
    /// Base URL of the generation endpoint.
    pub llm_endpoint: String,
    /// Deadline for each generation request, `None` for no deadline.
    pub llm_timeout: Option<Duration>,
    pub params: GenerationParams,
    pub system_prompt: SystemPrompt,
    /// Admission limit per one-second window.
    pub rate_limit: u32,
}

/// Transports bound and ready to serve.
pub struct Server {
    udp: UdpTransport,
    tcp: TcpTransport,
    handler: Arc<QueryHandler>,
    local_addr: SocketAddr,
}

impl Server {
    /// Bind UDP and TCP on the same address.
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        let inference = InferenceClient::new(&config.llm_endpoint, config.llm_timeout)
            .map_err(io::Error::other)?;
        let handler = Arc::new(QueryHandler::new(
            AdmissionController::new(config.rate_limit),
            inference,
            config.params,
            config.system_prompt,
        ));

        let udp = UdpTransport::bind(config.bind_addr).await?;
        // Reuse the UDP port so an ephemeral bind serves both protocols
        let local_addr = udp.local_addr()?;
        let tcp = TcpTransport::bind(local_addr).await?;

        Ok(Self {
            udp,
            tcp,
            handler,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until one of the transports stops.
    pub async fn run(self) -> io::Result<()> {
        info!(
            addr = %self.local_addr,
            rate_limit = self.handler.rate_limit(),
            "DNS responder listening on UDP and TCP"
        );

        let udp = self.udp.start(self.handler.clone());
        let tcp = self.tcp.start(self.handler.clone());

        // Log stats every minute
        let handler = self.handler;
        let reporter = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            interval.tick().await; // Skip first immediate tick
            loop {
                interval.tick().await;
                let stats = handler.stats_snapshot_and_reset();
                info!(
                    requests = stats.requests,
                    txt = stats.answered_txt,
                    empty = stats.answered_empty,
                    dropped = stats.dropped,
                    inference_failures = stats.inference_failures,
                    avg_response_ms = %format!("{:.2}", stats.avg_response_ms),
                    "[stats]"
                );
            }
        });

        let (result, name) = match future::select(udp, tcp).await {
            Either::Left((result, _)) => (result, "UDP"),
            Either::Right((result, _)) => (result, "TCP"),
        };
        reporter.abort();

        let reason = match result {
            Ok(()) => "stopped".to_string(),
            Err(e) => e.to_string(),
        };
        error!(transport = name, reason = %reason, "Transport exited");
        Err(io::Error::other(format!("{} transport exited: {}", name, reason)))
    }
}
