// ── Core error types ──
//
// Errors surfaced by the ingestion pipeline and the read API. Store
// backends report `StoreError`; everything else is translated into a
// domain-level variant here so callers never see backend details.

use thiserror::Error;

use crate::store::StoreError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Input errors ─────────────────────────────────────────────────
    #[error("Invalid agent data: {message}")]
    InvalidAgentData { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Agent not registered: {agent_id}")]
    AgentNotRegistered { agent_id: String },

    // ── Persistence errors ───────────────────────────────────────────
    #[error("Store failure: {0}")]
    Store(#[from] StoreError),

    #[error("Malformed {collection} document {key}: {message}")]
    MalformedDocument {
        collection: String,
        key: String,
        message: String,
    },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Message safe to hand to viewers: no backend internals.
    pub fn public_message(&self) -> String {
        match self {
            Self::Store(_) | Self::MalformedDocument { .. } | Self::Internal(_) => {
                "Unable to read data from the store".into()
            }
            other => other.to_string(),
        }
    }
}
