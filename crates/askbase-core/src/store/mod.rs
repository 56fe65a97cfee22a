//! Storage abstraction for askbase.
//!
//! The [`Store`] trait defines every storage operation the pipeline and
//! the seeding path need, so the orchestrator can run against SQLite in
//! production and an in-memory store in tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{
    Article, HistoryTurn, LogEntry, MatchRow, Organization, Question, QuestionArticleLink,
};

/// Model name and text hash recorded with a stored question embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingStamp {
    pub model: String,
    pub text_hash: String,
}

/// Outcome of a full link-set replacement.
///
/// When any referenced id is missing, nothing is written and the missing
/// ids are reported instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkReplaceReport {
    pub written: usize,
    pub missing_questions: Vec<i64>,
    pub missing_articles: Vec<i64>,
}

impl LinkReplaceReport {
    pub fn is_ok(&self) -> bool {
        self.missing_questions.is_empty() && self.missing_articles.is_empty()
    }
}

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_organization`](Store::upsert_organization) | Insert or rename an organization |
/// | [`upsert_article`](Store::upsert_article) | Insert or update an article by id |
/// | [`upsert_question`](Store::upsert_question) | Insert or update a question with its embedding |
/// | [`embedding_stamp`](Store::embedding_stamp) | Model/hash of a stored question embedding |
/// | [`replace_links`](Store::replace_links) | Full-replace the question/article link set |
/// | [`query_matches`](Store::query_matches) | Score every linked question of one organization |
/// | [`fetch_history`](Store::fetch_history) | Recent turns of a session, newest first |
/// | [`append_history`](Store::append_history) | Append one turn |
/// | [`append_log`](Store::append_log) | Append one audit entry |
/// | [`recent_logs`](Store::recent_logs) | Latest audit entries of an organization |
#[async_trait]
pub trait Store: Send + Sync {
    async fn upsert_organization(&self, org: &Organization) -> Result<()>;

    async fn upsert_article(&self, article: &Article) -> Result<()>;

    /// Store a question together with the embedding computed for its text.
    async fn upsert_question(
        &self,
        question: &Question,
        vector: &[f32],
        stamp: &EmbeddingStamp,
    ) -> Result<()>;

    /// Returns the stamp of the stored embedding, if the question exists.
    async fn embedding_stamp(&self, question_id: i64) -> Result<Option<EmbeddingStamp>>;

    /// Replace the entire link set. Validates ids first; writes nothing
    /// when any are missing.
    async fn replace_links(&self, links: &[QuestionArticleLink]) -> Result<LinkReplaceReport>;

    /// Score every question of `organization_id` that links to at least one
    /// article of the same organization. One row per (question, article).
    /// No threshold is applied here; rows come back in no particular order.
    async fn query_matches(&self, query_vec: &[f32], organization_id: i64) -> Result<Vec<MatchRow>>;

    /// Turns of one session newer than `since` (Unix seconds), newest
    /// first, at most `limit`.
    async fn fetch_history(
        &self,
        session_id: &str,
        organization_id: i64,
        since: i64,
        limit: i64,
    ) -> Result<Vec<HistoryTurn>>;

    async fn append_history(&self, turn: &HistoryTurn) -> Result<()>;

    async fn append_log(&self, entry: &LogEntry) -> Result<()>;

    /// Latest audit entries for an organization, newest first.
    async fn recent_logs(&self, organization_id: i64, limit: i64) -> Result<Vec<LogEntry>>;
}
