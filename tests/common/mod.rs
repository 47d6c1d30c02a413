use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};

use dumb_dns::config::{GenerationParams, SeedPolicy, SystemPrompt};
use dumb_dns::dns::DnsResponse;
use dumb_dns::server::{Server, ServerConfig};

/// What the mock generation endpoint answers with.
#[derive(Clone)]
pub enum MockReply {
    Text(String),
    Status(StatusCode, Value),
}

#[derive(Clone)]
struct MockState {
    reply: MockReply,
    requests: Arc<Mutex<Vec<Value>>>,
}

/// A generation endpoint on an ephemeral port that records request bodies.
pub struct MockEndpoint {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl MockEndpoint {
    pub async fn start(reply: MockReply) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            reply,
            requests: requests.clone(),
        };

        let app = Router::new()
            .route("/generate", post(generate))
            .with_state(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{}", addr),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }
}

async fn generate(State(state): State<MockState>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    state.requests.lock().unwrap().push(body);
    match state.reply {
        MockReply::Text(text) => (StatusCode::OK, Json(json!({ "generated_text": text }))),
        MockReply::Status(status, body) => (status, Json(body)),
    }
}

/// Base URL where nothing is listening.
pub fn unreachable_endpoint() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// Start a responder on an ephemeral loopback port.
pub async fn start_server(llm_endpoint: String, preamble: &str, rate_limit: u32) -> SocketAddr {
    let config = ServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        llm_endpoint,
        llm_timeout: Some(Duration::from_secs(5)),
        params: GenerationParams {
            seed: SeedPolicy::Fixed(7),
            ..GenerationParams::default()
        },
        system_prompt: SystemPrompt::Fixed(preamble.to_string()),
        rate_limit,
    };

    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr();
    tokio::spawn(server.run());
    addr
}

pub fn build_query(id: u16, domain: &str, qtype: u16) -> Vec<u8> {
    let mut packet = Vec::with_capacity(512);
    packet.extend_from_slice(&id.to_be_bytes());
    packet.extend_from_slice(&[0x01, 0x00]); // Flags: standard query, RD
    packet.extend_from_slice(&[0x00, 0x01]); // Questions: 1
    packet.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    for label in domain.split('.').filter(|l| !l.is_empty()) {
        packet.push(label.len() as u8);
        packet.extend_from_slice(label.as_bytes());
    }
    packet.push(0x00);
    packet.extend_from_slice(&qtype.to_be_bytes());
    packet.extend_from_slice(&[0x00, 0x01]); // Class: IN
    packet
}

pub async fn udp_exchange(server: SocketAddr, query: &[u8]) -> DnsResponse {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(query, server).await.unwrap();

    let mut buf = vec![0u8; 65535];
    let (len, _) = tokio::time::timeout(Duration::from_secs(10), socket.recv_from(&mut buf))
        .await
        .expect("reply within timeout")
        .unwrap();
    DnsResponse::parse(&buf[..len]).expect("well-formed reply")
}

pub async fn tcp_send(stream: &mut TcpStream, query: &[u8]) {
    let mut framed = (query.len() as u16).to_be_bytes().to_vec();
    framed.extend_from_slice(query);
    stream.write_all(&framed).await.unwrap();
}

pub async fn tcp_recv(stream: &mut TcpStream) -> DnsResponse {
    let mut len_buf = [0u8; 2];
    tokio::time::timeout(Duration::from_secs(10), stream.read_exact(&mut len_buf))
        .await
        .expect("reply within timeout")
        .unwrap();
    let mut buf = vec![0u8; u16::from_be_bytes(len_buf) as usize];
    stream.read_exact(&mut buf).await.unwrap();
    DnsResponse::parse(&buf).expect("well-formed reply")
}
