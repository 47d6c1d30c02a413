//! Runtime settings shared by the handler and the server.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid listen address {addr:?}: {reason}")]
    InvalidListenAddress { addr: String, reason: String },
}

/// How the generation seed is chosen for each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedPolicy {
    /// Draw a fresh seed in `[0, 1000)` for every request.
    Random,
    Fixed(u64),
}

impl SeedPolicy {
    /// A configured seed of zero means "random".
    pub fn from_flag(seed: u64) -> Self {
        if seed == 0 {
            SeedPolicy::Random
        } else {
            SeedPolicy::Fixed(seed)
        }
    }

    pub fn next_seed(self) -> u64 {
        match self {
            SeedPolicy::Random => fastrand::u64(0..1000),
            SeedPolicy::Fixed(seed) => seed,
        }
    }
}

/// Sampling parameters sent with every generation request.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub stop: Vec<String>,
    pub seed: SeedPolicy,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 20,
            temperature: 1.0,
            top_k: 40,
            top_p: 0.2,
            stop: vec!["</s>".to_string()],
            seed: SeedPolicy::Random,
        }
    }
}

/// Parse a listen address, accepting the `:port` shorthand for all IPv4 interfaces.
pub fn parse_listen_addr(addr: &str) -> Result<SocketAddr, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidListenAddress {
        addr: addr.to_string(),
        reason,
    };

    if let Some(port) = addr.strip_prefix(':') {
        let port: u16 = port.parse().map_err(|e| invalid(format!("{}", e)))?;
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    }

    addr.parse().map_err(|e| invalid(format!("{}", e)))
}

/// Where the system preamble comes from.
#[derive(Debug, Clone)]
pub enum SystemPrompt {
    Fixed(String),
    /// Read again for every TXT query, so edits apply without a restart.
    File(PathBuf),
}

impl Default for SystemPrompt {
    fn default() -> Self {
        SystemPrompt::Fixed(String::new())
    }
}

impl SystemPrompt {
    /// Current preamble text.
    ///
    /// A missing or unreadable file is logged and yields an empty preamble.
    pub async fn load(&self) -> String {
        let path = match self {
            SystemPrompt::Fixed(text) => return text.clone(),
            SystemPrompt::File(path) => path,
        };

        match tokio::fs::read_to_string(path).await {
            Ok(preamble) => {
                debug!(path = %path.display(), bytes = preamble.len(), "Loaded system prompt");
                preamble
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Error reading system prompt");
                String::new()
            }
        }
    }
}
