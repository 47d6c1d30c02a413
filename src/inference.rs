//! Client for the text-generation endpoint.
//!
//! One `POST {endpoint}/generate` per query, JSON in and out. The response
//! must be an object carrying a `generated_text` string; anything else is a
//! protocol error.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::config::GenerationParams;

const USER_AGENT: &str = "Dumb DNS";

#[derive(Debug, Error)]
pub enum InferenceError {
    /// The endpoint could not be reached or the exchange was cut short.
    #[error("inference transport error: {0}")]
    Transport(String),

    /// The request could not be encoded or the response had the wrong shape.
    #[error("inference protocol error: {0}")]
    Protocol(String),
}

/// Body of a generation request.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub inputs: String,
    pub parameters: GenerationParameters,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationParameters {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub stop: Vec<String>,
    pub seed: u64,
}

impl GenerationRequest {
    /// Build a request for `prompt`, drawing the seed from `params`.
    pub fn new(prompt: String, params: &GenerationParams) -> Self {
        Self {
            inputs: prompt,
            parameters: GenerationParameters {
                max_new_tokens: params.max_new_tokens,
                temperature: params.temperature,
                top_k: params.top_k,
                top_p: params.top_p,
                stop: params.stop.clone(),
                seed: params.seed.next_seed(),
            },
        }
    }
}

/// HTTP client bound to one generation endpoint.
pub struct InferenceClient {
    http: reqwest::Client,
    generate_url: String,
}

impl InferenceClient {
    /// Create a client for the endpoint at `base_url`.
    ///
    /// `timeout` of `None` leaves requests without a deadline.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, InferenceError> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| InferenceError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            generate_url: format!("{}/generate", base_url.trim_end_matches('/')),
        })
    }

    pub fn generate_url(&self) -> &str {
        &self.generate_url
    }

    /// Run one generation and return the generated text verbatim.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<String, InferenceError> {
        let body = serde_json::to_vec(request)
            .map_err(|e| InferenceError::Protocol(format!("encoding request: {}", e)))?;

        debug!(
            url = %self.generate_url,
            seed = request.parameters.seed,
            body_len = body.len(),
            "Sending generation request"
        );

        let response = self
            .http
            .post(&self.generate_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| InferenceError::Transport(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| InferenceError::Transport(format!("reading response: {}", e)))?;

        let text = extract_generated_text(&bytes)?;
        debug!(status = status.as_u16(), text_len = text.len(), "Generation complete");
        Ok(text)
    }
}

/// Pull `generated_text` out of a response body.
pub fn extract_generated_text(body: &[u8]) -> Result<String, InferenceError> {
    let value: serde_json::Value = serde_json::from_slice(body).map_err(|e| {
        InferenceError::Protocol(format!(
            "parsing response: {} ({})",
            e,
            String::from_utf8_lossy(body)
        ))
    })?;

    match value.get("generated_text") {
        Some(serde_json::Value::String(text)) => Ok(text.clone()),
        Some(_) => Err(InferenceError::Protocol(
            "generated_text is not a string".to_string(),
        )),
        None => Err(InferenceError::Protocol(format!(
            "response has no generated_text: {}",
            value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeedPolicy;

    #[test]
    fn request_serializes_to_generate_schema() {
        let params = GenerationParams {
            seed: SeedPolicy::Fixed(7),
            ..GenerationParams::default()
        };
        let request = GenerationRequest::new("<|system|><|user|>hi </s>".to_string(), &params);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["inputs"], "<|system|><|user|>hi </s>");
        assert_eq!(json["parameters"]["max_new_tokens"], 20);
        assert_eq!(json["parameters"]["top_k"], 40);
        assert_eq!(json["parameters"]["stop"], serde_json::json!(["</s>"]));
        assert_eq!(json["parameters"]["seed"], 7);
        assert!(json["parameters"]["temperature"].is_number());
        assert!(json["parameters"]["top_p"].is_number());
    }

    #[test]
    fn extracts_generated_text() {
        let text = extract_generated_text(br#"{"generated_text":"hello\nworld"}"#).unwrap();
        assert_eq!(text, "hello\nworld");
    }

    #[test]
    fn rejects_wrong_shapes() {
        assert!(matches!(
            extract_generated_text(b"not json"),
            Err(InferenceError::Protocol(_))
        ));
        assert!(matches!(
            extract_generated_text(br#"{"error":"overloaded"}"#),
            Err(InferenceError::Protocol(_))
        ));
        assert!(matches!(
            extract_generated_text(br#"{"generated_text":42}"#),
            Err(InferenceError::Protocol(_))
        ));
        assert!(matches!(
            extract_generated_text(br#"[{"generated_text":"x"}]"#),
            Err(InferenceError::Protocol(_))
        ));
    }

    #[test]
    fn generate_url_joins_base() {
        let client = InferenceClient::new("http://localhost:8080/", None).unwrap();
        assert_eq!(client.generate_url(), "http://localhost:8080/generate");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = InferenceClient::new(&format!("http://{}", addr), None).unwrap();
        let params = GenerationParams::default();
        let request = GenerationRequest::new("x".to_string(), &params);

        let err = client.generate(&request).await.unwrap_err();
        assert!(matches!(err, InferenceError::Transport(_)));
    }
}
