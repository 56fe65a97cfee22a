//! Core data models used throughout askbase.
//!
//! Timestamps are Unix seconds (`i64`), matching how they are stored.

use serde::{Deserialize, Serialize};

/// A tenant. Every question, article, history turn and log entry belongs
/// to exactly one organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: i64,
    pub name: String,
}

/// A knowledge-base article owned by an organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub organization_id: i64,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub author: Option<String>,
}

/// A canonical question. Its embedding is stored separately by the store
/// because it is computed at write time, never on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub text: String,
    pub organization_id: i64,
    #[serde(default = "default_status")]
    pub status: String,
}

fn default_status() -> String {
    "published".to_string()
}

/// Join entity between questions and articles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuestionArticleLink {
    pub question_id: i64,
    pub article_id: i64,
}

/// One question/response exchange within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub session_id: String,
    pub organization_id: i64,
    pub question: String,
    pub response: String,
    pub context: Option<String>,
    pub time: i64,
}

/// Audit record for one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub time: i64,
    pub organization_id: i64,
    pub session_id: String,
    pub question: String,
    pub similar_question: String,
    pub similarity: f64,
    pub context: String,
    pub system_instruction: String,
    pub response: String,
    pub summary: String,
    pub summary_vector: Vec<f32>,
    /// JSON array of `{id, title}` for the articles placed in the context.
    pub filtered_reference: String,
}

/// One raw row of the similarity query: a question of the organization
/// joined with one of its linked articles, scored against the query.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRow {
    pub question_id: i64,
    pub question: String,
    pub similarity: f64,
    pub article_id: i64,
    pub article_title: String,
    pub article_content: String,
}

/// Article payload carried by a [`MatchResult`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedArticle {
    pub id: i64,
    pub title: String,
    pub content: String,
}

/// A stored question that cleared the similarity threshold, with every
/// article linked to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub question_id: i64,
    pub matched_question_text: String,
    pub similarity_score: f64,
    pub articles: Vec<MatchedArticle>,
}

/// Which branch the final answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeTag {
    ArticleFound,
    NotFoundArticle,
}

impl OutcomeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeTag::ArticleFound => "ArticleFound",
            OutcomeTag::NotFoundArticle => "NotFoundArticle",
        }
    }
}

impl std::fmt::Display for OutcomeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
