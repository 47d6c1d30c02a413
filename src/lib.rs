//! Dumb DNS - answers TXT queries with text from a language model.
//!
//! The query name becomes the prompt, the completion becomes the TXT record.

pub mod admission;
pub mod config;
pub mod dns;
pub mod domain;
pub mod encoder;
pub mod handler;
pub mod inference;
pub mod prompt;
pub mod server;
pub mod stats;
pub mod transport;
