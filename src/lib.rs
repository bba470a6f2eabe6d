use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

/// Remote service a request was sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    OpenAi,
    Pinecone,
}

impl fmt::Display for Service {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => f.write_str("OpenAI"),
            Self::Pinecone => f.write_str("Pinecone"),
        }
    }
}

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{service} returned HTTP {status}: {message}")]
    Upstream {
        service: Service,
        status: u16,
        message: String,
    },

    #[error("Transport error talking to {service}: {message}")]
    Transport { service: Service, message: String },

    #[error("Unexpected response from {service}: {message}")]
    UnexpectedResponse { service: Service, message: String },

    #[error("Pinecone index '{name}' was not ready after {}s", .waited.as_secs())]
    IndexNotReady { name: String, waited: Duration },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Structured answer failed validation: {0}")]
    Validation(String),

    #[error("Model returned neither content nor tool calls")]
    EmptyCompletion,

    #[error("Agent exceeded {0} tool-call rounds without producing an answer")]
    ToolRoundsExceeded(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod agent;
pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod http;
pub mod llm;
pub mod pipeline;
pub mod retrieval;

pub use agent::{Agent, StructuredAnswer};
pub use pipeline::{Document, RagContext};
