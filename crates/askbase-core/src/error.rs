//! Error types for the askbase pipeline.
//!
//! Each I/O boundary has its own error so the orchestrator can decide,
//! per boundary, whether a failure is recovered in-band (embedding and
//! match errors), logged and swallowed (persistence), or converted into a
//! structured failure result (language model and composition errors).

use thiserror::Error;

/// The embedding provider could not turn text into a vector.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    /// Nothing to embed.
    #[error("cannot embed empty text")]
    EmptyInput,

    /// Provider is switched off in configuration.
    #[error("embedding provider is disabled")]
    Disabled,

    /// Provider could not be reached or kept failing after retries.
    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),

    /// Provider answered with something that is not a usable vector.
    #[error("malformed embedding response: {0}")]
    Malformed(String),

    /// Provider returned a vector of unexpected length.
    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// The similarity query against the store failed.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("similarity query failed: {0}")]
pub struct MatchQueryError(pub String);

/// A log or history write failed and was rolled back.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("failed to persist {what}: {message}")]
pub struct PersistError {
    /// What was being written (`"log entry"`, `"history turn"`).
    pub what: &'static str,
    pub message: String,
}

/// The language model call failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("language model unavailable: {0}")]
    Unavailable(String),

    #[error("language model rate limited: {0}")]
    RateLimited(String),

    #[error("malformed language model response: {0}")]
    MalformedResponse(String),
}

/// A template placeholder had no value.
///
/// This is a programming or configuration error: the orchestrator always
/// supplies every slot its built-in templates use.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("template `{template}` requires slot `{slot}` which was not provided")]
pub struct MissingSlotError {
    pub template: &'static str,
    pub slot: String,
}

/// A template body could not be parsed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    #[error("template `{template}` has an unclosed `{{` at byte {offset}")]
    Unclosed { template: &'static str, offset: usize },

    #[error("template `{template}` has a stray `}}` at byte {offset}")]
    StrayClose { template: &'static str, offset: usize },

    #[error("template `{template}` uses unknown slot `{slot}`")]
    UnknownSlot { template: &'static str, slot: String },

    #[error(transparent)]
    MissingSlot(#[from] MissingSlotError),
}
