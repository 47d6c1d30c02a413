//! Query processing pipeline.
//!
//! Handles one query from admission to the encoded reply:
//! 1. Admission (may stall, then drop)
//! 2. Name decomposition (diagnostics only)
//! 3. Prompt construction and generation, TXT queries only
//! 4. Cleaning and chunking of the completion into a TXT record
//!
//! Transports handle the actual I/O, the handler produces the bytes to send.

use std::time::Instant;

use tracing::{debug, warn};

use crate::admission::AdmissionController;
use crate::config::{GenerationParams, SystemPrompt};
use crate::dns::{DnsQuery, type_name};
use crate::domain::DomainParts;
use crate::encoder;
use crate::inference::{GenerationRequest, InferenceClient};
use crate::prompt;
use crate::stats::{Stats, StatsSnapshot};

/// TTL of every generated TXT record.
pub const ANSWER_TTL: u32 = 3600;

/// Action to take for a received message.
#[derive(Debug)]
pub enum QueryAction {
    /// Not a usable query, nothing is sent back.
    Ignore,
    /// Refused by admission control, nothing is sent back.
    Dropped,
    /// Send this reply.
    Answer { response: Vec<u8>, name: String },
}

/// Per-query orchestration shared by all transports.
pub struct QueryHandler {
    admission: AdmissionController,
    inference: InferenceClient,
    params: GenerationParams,
    system_prompt: SystemPrompt,
    stats: Stats,
}

impl QueryHandler {
    pub fn new(
        admission: AdmissionController,
        inference: InferenceClient,
        params: GenerationParams,
        system_prompt: SystemPrompt,
    ) -> Self {
        Self {
            admission,
            inference,
            params,
            system_prompt,
            stats: Stats::new(),
        }
    }

    /// Process a DNS message (without TCP length prefix) and decide what to send.
    ///
    /// Inference failures never surface here: the TXT record is still
    /// returned, carrying whatever text was obtained.
    pub async fn process_query(&self, message: &[u8]) -> QueryAction {
        let start = Instant::now();

        if self.admission.admit().await.is_dropped() {
            self.stats.record_dropped(elapsed_ms(start));
            return QueryAction::Dropped;
        }

        let Some(query) = DnsQuery::parse(message) else {
            debug!(len = message.len(), "Ignoring malformed DNS message");
            return QueryAction::Ignore;
        };

        let name = query.name();
        let parts = DomainParts::parse(&query.escaped_labels());
        debug!(
            query = %name,
            subdomain = %parts.subdomain,
            tld = %parts.tld,
            record_type = %type_name(query.qtype),
            "Received query"
        );

        let mut reply = query.reply();

        if !query.is_txt() {
            self.stats.record_empty(elapsed_ms(start));
            return QueryAction::Answer {
                response: reply.to_bytes(),
                name,
            };
        }

        let text = self.generate_text(&name).await;
        let chunks = encoder::encode(&text);
        debug!(query = %name, chunks = chunks.len(), "Encoded answer");

        reply.push_txt_answer(ANSWER_TTL, &chunks);
        self.stats.record_txt(elapsed_ms(start));

        QueryAction::Answer {
            response: reply.to_bytes(),
            name,
        }
    }

    /// Query the model, substituting empty text when generation fails.
    async fn generate_text(&self, name: &str) -> String {
        let preamble = self.system_prompt.load().await;
        let request = GenerationRequest::new(prompt::build(name, &preamble), &self.params);

        match self.inference.generate(&request).await {
            Ok(text) => text,
            Err(e) => {
                warn!(query = %name, error = %e, "Error querying generation endpoint, answering empty");
                self.stats.record_inference_failure();
                String::new()
            }
        }
    }

    pub fn stats_snapshot_and_reset(&self) -> StatsSnapshot {
        self.stats.snapshot_and_reset()
    }

    pub fn rate_limit(&self) -> u32 {
        self.admission.limit()
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
