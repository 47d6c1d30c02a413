use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use dumb_dns::config::{self, GenerationParams, SeedPolicy, SystemPrompt};
use dumb_dns::server::{Server, ServerConfig};

#[derive(Parser)]
#[command(name = "dumb-dns")]
#[command(about = "DNS responder that answers TXT queries with generated text", long_about = None)]
struct Args {
    /// DNS listening address
    #[arg(long, default_value = ":53")]
    dns_listening_address: String,

    /// Text generation endpoint base URL
    #[arg(long, default_value = "http://localhost:8080")]
    llm_endpoint: String,

    /// Maximum number of generated tokens
    #[arg(long, default_value_t = 20)]
    llm_max_new_tokens: u32,

    /// Sampling temperature
    #[arg(long, default_value_t = 1.0)]
    llm_temperature: f32,

    /// Top-k sampling
    #[arg(long, default_value_t = 40)]
    llm_top_k: u32,

    /// Top-p sampling
    #[arg(long, default_value_t = 0.2)]
    llm_top_p: f32,

    /// Stop sequence
    #[arg(long, default_value = "</s>")]
    llm_stop: String,

    /// Generation seed (0 picks a random seed per request)
    #[arg(long, default_value_t = 0)]
    llm_seed: u64,

    /// Generation request timeout in seconds (0 for none)
    #[arg(long, default_value_t = 0)]
    llm_timeout_secs: u64,

    /// Print verbose output
    #[arg(short, long)]
    verbose: bool,

    /// File holding the system prompt
    #[arg(long)]
    system_prompt: Option<PathBuf>,

    /// Rate limit in requests per second
    #[arg(long, default_value_t = 0)]
    rate_limit: u32,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .init();
}

async fn run(args: Args) -> io::Result<()> {
    let bind_addr = config::parse_listen_addr(&args.dns_listening_address)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let server_config = ServerConfig {
        bind_addr,
        llm_endpoint: args.llm_endpoint,
        llm_timeout: (args.llm_timeout_secs > 0).then(|| Duration::from_secs(args.llm_timeout_secs)),
        params: GenerationParams {
            max_new_tokens: args.llm_max_new_tokens,
            temperature: args.llm_temperature,
            top_k: args.llm_top_k,
            top_p: args.llm_top_p,
            stop: vec![args.llm_stop],
            seed: SeedPolicy::from_flag(args.llm_seed),
        },
        system_prompt: args.system_prompt.map(SystemPrompt::File).unwrap_or_default(),
        rate_limit: args.rate_limit,
    };

    tracing::info!(endpoint = %server_config.llm_endpoint, "Using generation endpoint");

    Server::bind(server_config).await?.run().await
}

fn main() -> io::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(run(args))
}
