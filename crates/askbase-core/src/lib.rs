//! # askbase core
//!
//! Runtime-agnostic logic for askbase: data models, the similarity
//! matcher, prompt templates, history windowing, and the traits that the
//! application crate implements for storage, embeddings, language models
//! and notifications.
//!
//! This crate contains no tokio, sqlx, or HTTP client dependencies. Every
//! I/O boundary is a trait ([`store::Store`], [`embedding::Embedder`],
//! [`llm::LanguageModel`], [`notify::Notifier`]) so the pipeline can be
//! exercised against in-memory fakes.

pub mod embedding;
pub mod error;
pub mod history;
pub mod language;
pub mod llm;
pub mod matcher;
pub mod models;
pub mod notify;
pub mod prompt;
pub mod store;
