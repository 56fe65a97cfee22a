//! # askbase
//!
//! Grounded, organization-scoped conversational question answering.
//!
//! A question is folded together with the session's recent history,
//! translated into the corpus language, embedded, and matched against the
//! organization's stored questions. The matched articles ground the final
//! answer; when nothing matches, the customer is pointed to support.
//! Every request is written to an audit log.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────────────────────┐   ┌──────────┐
//! │ CLI/HTTP │──▶│ ask pipeline                │──▶│  SQLite  │
//! │          │   │ history → summarize →       │   │ questions│
//! └──────────┘   │ translate → match → answer  │   │ articles │
//!                └──────┬───────────────┬──────┘   │ history  │
//!                       ▼               ▼          │ log      │
//!                  ┌──────────┐   ┌──────────┐     └──────────┘
//!                  │ Embedder │   │   LLM    │
//!                  └──────────┘   └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`ask`] | The `ask` pipeline |
//! | [`audit`] | Audit log writer and `logs` command |
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`embedding`] | Embedding providers |
//! | [`import`] | Knowledge-base seeding |
//! | [`llm`] | Language model providers |
//! | [`migrate`] | Schema migrations |
//! | [`notify`] | Webhook notifier |
//! | [`server`] | HTTP server |
//! | [`session_lock`] | Per-session request serialization |
//! | [`sqlite_store`] | SQLite `Store` implementation |

pub mod ask;
pub mod audit;
pub mod config;
pub mod db;
pub mod embedding;
mod http;
pub mod import;
pub mod llm;
pub mod migrate;
pub mod notify;
pub mod server;
pub mod session_lock;
pub mod sqlite_store;
