//! Similarity matching of questions against an organization's corpus.
//!
//! The store scores every (question, article) row of one organization; this
//! module applies the threshold, picks rows according to the configured
//! [`MatchMode`], groups them by question and builds the de-duplicated
//! article context handed to the answer prompt.
//!
//! # Ordering
//!
//! Rows are ordered by similarity descending, then question id ascending,
//! then article id ascending, so a fixed query always yields the same
//! result regardless of the order the store returned rows in.
//!
//! # Failure policy
//!
//! Neither an embedding failure nor a store failure is returned as an
//! error. Both become a [`NotFound`] carrying an explanatory `content`
//! string, which keeps the orchestrator on its not-found branch instead of
//! aborting the request.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::embedding::Embedder;
use crate::error::{ConversionError, MatchQueryError};
use crate::models::{MatchResult, MatchRow, MatchedArticle};
use crate::store::Store;

/// Default similarity threshold.
pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// How matched rows are turned into results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMode {
    /// Only the best question at or above the threshold.
    #[default]
    SingleBest,
    /// Every question at or above the threshold, grouped by question id.
    ThresholdAll,
}

impl FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single-best" => Ok(MatchMode::SingleBest),
            "threshold-all" => Ok(MatchMode::ThresholdAll),
            other => Err(format!(
                "unknown match mode '{}'; use single-best or threshold-all",
                other
            )),
        }
    }
}

/// Why no article was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotFoundReason {
    /// The organization has no linked questions at all.
    EmptyCorpus,
    /// Best score was under the threshold.
    BelowThreshold,
    /// The query text could not be embedded.
    ConversionFailed,
    /// The store failed during the similarity query.
    QueryFailed,
}

/// A rejected match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotFound {
    pub reason: NotFoundReason,
    /// Apology or failure description, in-band.
    pub content: String,
    /// Best-scoring stored question, if any row was scored.
    pub best_question: Option<String>,
    pub best_score: f64,
}

/// Result of a match attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Found(Vec<MatchResult>),
    NotFound(NotFound),
}

impl MatchOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, MatchOutcome::Found(_))
    }
}

/// Threshold matcher.
#[derive(Debug, Clone)]
pub struct Matcher {
    pub threshold: f64,
    pub mode: MatchMode,
    /// Where unanswered users are redirected, used in the apology text.
    pub support_contact: String,
}

impl Matcher {
    pub fn new(threshold: f64, mode: MatchMode, support_contact: impl Into<String>) -> Self {
        Self {
            threshold,
            mode,
            support_contact: support_contact.into(),
        }
    }

    /// Embed `text` and match it. Also returns the query vector when
    /// embedding succeeded, so callers can record it.
    pub async fn match_text(
        &self,
        embedder: &dyn Embedder,
        store: &dyn Store,
        text: &str,
        organization_id: i64,
    ) -> (MatchOutcome, Option<Vec<f32>>) {
        let vector = match embedder.embed(text).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "query embedding failed");
                return (MatchOutcome::NotFound(self.conversion_failed(&e)), None);
            }
        };
        let outcome = self.match_vector(store, &vector, text, organization_id).await;
        (outcome, Some(vector))
    }

    /// Match an already-embedded query.
    pub async fn match_vector(
        &self,
        store: &dyn Store,
        query_vec: &[f32],
        query_text: &str,
        organization_id: i64,
    ) -> MatchOutcome {
        let rows = match store.query_matches(query_vec, organization_id).await {
            Ok(rows) => rows,
            Err(e) => {
                let err = MatchQueryError(format!("{:#}", e));
                tracing::warn!(error = %err, organization_id, "similarity query failed");
                return MatchOutcome::NotFound(NotFound {
                    reason: NotFoundReason::QueryFailed,
                    content: format!("Failed to query the knowledge base: {}", err.0),
                    best_question: None,
                    best_score: 0.0,
                });
            }
        };

        let outcome = self.select(rows, query_text);
        match &outcome {
            MatchOutcome::Found(results) => tracing::info!(
                organization_id,
                matched = results.len(),
                best_score = results[0].similarity_score,
                "article match found"
            ),
            MatchOutcome::NotFound(nf) => tracing::info!(
                organization_id,
                reason = ?nf.reason,
                best_score = nf.best_score,
                "no article above threshold"
            ),
        }
        outcome
    }

    /// Apply threshold and mode to scored rows.
    ///
    /// Rows with a non-finite score are ignored.
    pub fn select(&self, mut rows: Vec<MatchRow>, query_text: &str) -> MatchOutcome {
        rows.retain(|r| r.similarity.is_finite());
        sort_rows(&mut rows);

        let Some(best) = rows.first() else {
            return MatchOutcome::NotFound(NotFound {
                reason: NotFoundReason::EmptyCorpus,
                content: self.apology(query_text),
                best_question: None,
                best_score: 0.0,
            });
        };

        if best.similarity < self.threshold {
            return MatchOutcome::NotFound(NotFound {
                reason: NotFoundReason::BelowThreshold,
                content: self.apology(query_text),
                best_question: Some(best.question.clone()),
                best_score: best.similarity,
            });
        }

        let accepted = rows.iter().filter(|r| r.similarity >= self.threshold);
        let mut results = group_rows(accepted);

        match self.mode {
            MatchMode::SingleBest => results.truncate(1),
            MatchMode::ThresholdAll => {
                let combined = results
                    .iter()
                    .map(|r| r.matched_question_text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                for r in &mut results {
                    r.matched_question_text = combined.clone();
                }
            }
        }

        MatchOutcome::Found(results)
    }

    fn apology(&self, query_text: &str) -> String {
        format!(
            "Sorry, your question about \"{}\" cannot be answered yet. Please contact {}.",
            query_text.trim(),
            self.support_contact
        )
    }

    fn conversion_failed(&self, err: &ConversionError) -> NotFound {
        NotFound {
            reason: NotFoundReason::ConversionFailed,
            content: format!("Unable to convert the question into a vector: {}", err),
            best_question: None,
            best_score: 0.0,
        }
    }
}

fn sort_rows(rows: &mut [MatchRow]) {
    rows.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then(a.question_id.cmp(&b.question_id))
            .then(a.article_id.cmp(&b.article_id))
    });
}

/// Group sorted rows by question id in order of first occurrence. An
/// article already attached to an earlier group is not attached again.
fn group_rows<'a>(rows: impl Iterator<Item = &'a MatchRow>) -> Vec<MatchResult> {
    let mut results: Vec<MatchResult> = Vec::new();
    let mut seen_articles = HashSet::new();

    for row in rows {
        let idx = match results.iter().position(|r| r.question_id == row.question_id) {
            Some(idx) => idx,
            None => {
                results.push(MatchResult {
                    question_id: row.question_id,
                    matched_question_text: row.question.clone(),
                    similarity_score: row.similarity,
                    articles: Vec::new(),
                });
                results.len() - 1
            }
        };
        if seen_articles.insert(row.article_id) {
            results[idx].articles.push(MatchedArticle {
                id: row.article_id,
                title: row.article_title.clone(),
                content: row.article_content.clone(),
            });
        }
    }

    results
}

/// Reference to an article placed into an answer context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleRef {
    pub id: i64,
    pub title: String,
}

/// Concatenate the articles of every result into one context blob.
///
/// Each article id appears at most once, in order of first occurrence.
pub fn join_context(results: &[MatchResult]) -> (String, Vec<ArticleRef>) {
    let mut seen = HashSet::new();
    let mut parts = Vec::new();
    let mut refs = Vec::new();

    for result in results {
        for article in &result.articles {
            if seen.insert(article.id) {
                parts.push(format!("Title: {}\n{}", article.title, article.content));
                refs.push(ArticleRef {
                    id: article.id,
                    title: article.title.clone(),
                });
            }
        }
    }

    (parts.join("\n\n"), refs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(qid: i64, question: &str, sim: f64, aid: i64) -> MatchRow {
        MatchRow {
            question_id: qid,
            question: question.to_string(),
            similarity: sim,
            article_id: aid,
            article_title: format!("A{}", aid),
            article_content: format!("content of {}", aid),
        }
    }

    fn matcher(mode: MatchMode) -> Matcher {
        Matcher::new(0.7, mode, "support@example.com")
    }

    #[test]
    fn test_threshold_boundary_is_found() {
        let m = matcher(MatchMode::SingleBest);
        assert!(m.select(vec![row(1, "q", 0.70, 1)], "x").is_found());
        assert!(!m.select(vec![row(1, "q", 0.6999, 1)], "x").is_found());
    }

    #[test]
    fn test_empty_corpus_is_not_found_with_apology() {
        let m = matcher(MatchMode::SingleBest);
        match m.select(Vec::new(), "Where is my parcel?") {
            MatchOutcome::NotFound(nf) => {
                assert_eq!(nf.reason, NotFoundReason::EmptyCorpus);
                assert!(nf.content.contains("Where is my parcel?"));
                assert!(nf.content.contains("support@example.com"));
                assert!(nf.best_question.is_none());
            }
            other => panic!("expected not found, got {:?}", other),
        }
    }

    #[test]
    fn test_below_threshold_keeps_rejected_best() {
        let m = matcher(MatchMode::ThresholdAll);
        match m.select(vec![row(1, "low", 0.2, 1), row(2, "best", 0.3, 2)], "x") {
            MatchOutcome::NotFound(nf) => {
                assert_eq!(nf.reason, NotFoundReason::BelowThreshold);
                assert_eq!(nf.best_question.as_deref(), Some("best"));
                assert!((nf.best_score - 0.3).abs() < 1e-9);
            }
            other => panic!("expected not found, got {:?}", other),
        }
    }

    #[test]
    fn test_single_best_takes_top_question_with_all_articles() {
        let m = matcher(MatchMode::SingleBest);
        let rows = vec![
            row(2, "second", 0.8, 20),
            row(1, "first", 0.9, 10),
            row(1, "first", 0.9, 11),
        ];
        match m.select(rows, "x") {
            MatchOutcome::Found(results) => {
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].question_id, 1);
                let ids: Vec<i64> = results[0].articles.iter().map(|a| a.id).collect();
                assert_eq!(ids, vec![10, 11]);
            }
            other => panic!("expected found, got {:?}", other),
        }
    }

    #[test]
    fn test_threshold_all_groups_and_combines_questions() {
        let m = matcher(MatchMode::ThresholdAll);
        let rows = vec![
            row(1, "first", 0.9, 10),
            row(2, "second", 0.8, 10),
            row(2, "second", 0.8, 20),
            row(3, "third", 0.5, 30),
        ];
        match m.select(rows, "x") {
            MatchOutcome::Found(results) => {
                assert_eq!(results.len(), 2);
                assert_eq!(results[0].matched_question_text, "first\nsecond");
                assert_eq!(results[1].matched_question_text, "first\nsecond");
                // article 10 already belongs to question 1
                let second: Vec<i64> = results[1].articles.iter().map(|a| a.id).collect();
                assert_eq!(second, vec![20]);
            }
            other => panic!("expected found, got {:?}", other),
        }
    }

    #[test]
    fn test_ties_are_deterministic() {
        let m = matcher(MatchMode::SingleBest);
        let a = m.select(vec![row(7, "seven", 0.8, 1), row(3, "three", 0.8, 2)], "x");
        let b = m.select(vec![row(3, "three", 0.8, 2), row(7, "seven", 0.8, 1)], "x");
        assert_eq!(a, b);
        match a {
            MatchOutcome::Found(results) => assert_eq!(results[0].question_id, 3),
            other => panic!("expected found, got {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_scores_never_match() {
        let m = matcher(MatchMode::SingleBest);
        let outcome = m.select(vec![row(1, "q", f64::NAN, 1), row(2, "r", 0.4, 2)], "x");
        match outcome {
            MatchOutcome::NotFound(nf) => {
                assert_eq!(nf.reason, NotFoundReason::BelowThreshold);
                assert_eq!(nf.best_question.as_deref(), Some("r"));
            }
            MatchOutcome::Found(_) => panic!("NaN must not match"),
        }
        assert!(!m.select(vec![row(1, "q", f64::NAN, 1)], "x").is_found());
        assert!(m
            .select(vec![row(1, "q", f64::INFINITY, 1), row(2, "r", 0.8, 2)], "x")
            .is_found());
    }

    #[test]
    fn test_join_context_dedups_articles() {
        let results = vec![
            MatchResult {
                question_id: 1,
                matched_question_text: "a".to_string(),
                similarity_score: 0.9,
                articles: vec![
                    MatchedArticle {
                        id: 1,
                        title: "Refunds".to_string(),
                        content: "Refund body".to_string(),
                    },
                    MatchedArticle {
                        id: 2,
                        title: "Plans".to_string(),
                        content: "Plans body".to_string(),
                    },
                ],
            },
            MatchResult {
                question_id: 2,
                matched_question_text: "b".to_string(),
                similarity_score: 0.8,
                articles: vec![MatchedArticle {
                    id: 1,
                    title: "Refunds".to_string(),
                    content: "Refund body".to_string(),
                }],
            },
        ];
        let (context, refs) = join_context(&results);
        assert_eq!(context.matches("Refund body").count(), 1);
        assert_eq!(context, "Title: Refunds\nRefund body\n\nTitle: Plans\nPlans body");
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn test_match_mode_parse() {
        assert_eq!("single-best".parse::<MatchMode>(), Ok(MatchMode::SingleBest));
        assert_eq!(
            "threshold-all".parse::<MatchMode>(),
            Ok(MatchMode::ThresholdAll)
        );
        assert!("top-k".parse::<MatchMode>().is_err());
    }
}
