//! In-memory [`Store`] implementation for tests and embedded use.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Matching is
//! brute-force cosine similarity over every question of the organization.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::similarity_score;
use crate::models::{
    Article, HistoryTurn, LogEntry, MatchRow, Organization, Question, QuestionArticleLink,
};

use super::{EmbeddingStamp, LinkReplaceReport, Store};

struct StoredQuestion {
    question: Question,
    vector: Vec<f32>,
    stamp: EmbeddingStamp,
}

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    organizations: RwLock<HashMap<i64, Organization>>,
    articles: RwLock<BTreeMap<i64, Article>>,
    questions: RwLock<BTreeMap<i64, StoredQuestion>>,
    links: RwLock<Vec<QuestionArticleLink>>,
    history: RwLock<Vec<HistoryTurn>>,
    logs: RwLock<Vec<LogEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of audit entries written so far.
    pub fn log_count(&self) -> usize {
        self.logs.read().map(|l| l.len()).unwrap_or(0)
    }

    /// Number of history turns written so far, across all sessions.
    pub fn history_count(&self) -> usize {
        self.history.read().map(|h| h.len()).unwrap_or(0)
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_organization(&self, org: &Organization) -> Result<()> {
        write(&self.organizations)?.insert(org.id, org.clone());
        Ok(())
    }

    async fn upsert_article(&self, article: &Article) -> Result<()> {
        write(&self.articles)?.insert(article.id, article.clone());
        Ok(())
    }

    async fn upsert_question(
        &self,
        question: &Question,
        vector: &[f32],
        stamp: &EmbeddingStamp,
    ) -> Result<()> {
        write(&self.questions)?.insert(
            question.id,
            StoredQuestion {
                question: question.clone(),
                vector: vector.to_vec(),
                stamp: stamp.clone(),
            },
        );
        Ok(())
    }

    async fn embedding_stamp(&self, question_id: i64) -> Result<Option<EmbeddingStamp>> {
        Ok(read(&self.questions)?
            .get(&question_id)
            .map(|sq| sq.stamp.clone()))
    }

    async fn replace_links(&self, links: &[QuestionArticleLink]) -> Result<LinkReplaceReport> {
        let mut report = LinkReplaceReport::default();
        {
            let questions = read(&self.questions)?;
            let articles = read(&self.articles)?;
            let mut seen_q = HashSet::new();
            let mut seen_a = HashSet::new();
            for link in links {
                if !questions.contains_key(&link.question_id) && seen_q.insert(link.question_id) {
                    report.missing_questions.push(link.question_id);
                }
                if !articles.contains_key(&link.article_id) && seen_a.insert(link.article_id) {
                    report.missing_articles.push(link.article_id);
                }
            }
        }
        if !report.is_ok() {
            return Ok(report);
        }

        let mut stored = write(&self.links)?;
        stored.clear();
        let mut unique = HashSet::new();
        for link in links {
            if unique.insert(*link) {
                stored.push(*link);
            }
        }
        report.written = stored.len();
        Ok(report)
    }

    async fn query_matches(&self, query_vec: &[f32], organization_id: i64) -> Result<Vec<MatchRow>> {
        let questions = read(&self.questions)?;
        let articles = read(&self.articles)?;
        let links = read(&self.links)?;

        let mut rows = Vec::new();
        for link in links.iter() {
            let Some(sq) = questions.get(&link.question_id) else {
                continue;
            };
            let Some(article) = articles.get(&link.article_id) else {
                continue;
            };
            if sq.question.organization_id != organization_id
                || article.organization_id != organization_id
            {
                continue;
            }
            rows.push(MatchRow {
                question_id: sq.question.id,
                question: sq.question.text.clone(),
                similarity: similarity_score(query_vec, &sq.vector),
                article_id: article.id,
                article_title: article.title.clone(),
                article_content: article.content.clone(),
            });
        }
        Ok(rows)
    }

    async fn fetch_history(
        &self,
        session_id: &str,
        organization_id: i64,
        since: i64,
        limit: i64,
    ) -> Result<Vec<HistoryTurn>> {
        let history = read(&self.history)?;
        // Reverse insertion order first so that, within one timestamp, the
        // later write still comes first after the stable sort.
        let mut turns: Vec<HistoryTurn> = history
            .iter()
            .rev()
            .filter(|t| {
                t.session_id == session_id && t.organization_id == organization_id && t.time >= since
            })
            .cloned()
            .collect();
        turns.sort_by(|a, b| b.time.cmp(&a.time));
        turns.truncate(limit.max(0) as usize);
        Ok(turns)
    }

    async fn append_history(&self, turn: &HistoryTurn) -> Result<()> {
        write(&self.history)?.push(turn.clone());
        Ok(())
    }

    async fn append_log(&self, entry: &LogEntry) -> Result<()> {
        write(&self.logs)?.push(entry.clone());
        Ok(())
    }

    async fn recent_logs(&self, organization_id: i64, limit: i64) -> Result<Vec<LogEntry>> {
        let logs = read(&self.logs)?;
        let mut entries: Vec<LogEntry> = logs
            .iter()
            .rev()
            .filter(|e| e.organization_id == organization_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.time.cmp(&a.time));
        entries.truncate(limit.max(0) as usize);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp() -> EmbeddingStamp {
        EmbeddingStamp {
            model: "test".to_string(),
            text_hash: "h".to_string(),
        }
    }

    fn article(id: i64, org: i64) -> Article {
        Article {
            id,
            title: format!("Article {}", id),
            content: format!("Body {}", id),
            organization_id: org,
            status: "published".to_string(),
            author: None,
        }
    }

    fn question(id: i64, org: i64) -> Question {
        Question {
            id,
            text: format!("Question {}", id),
            organization_id: org,
            status: "published".to_string(),
        }
    }

    fn turn(session: &str, org: i64, time: i64) -> HistoryTurn {
        HistoryTurn {
            session_id: session.to_string(),
            organization_id: org,
            question: format!("q@{}", time),
            response: format!("r@{}", time),
            context: None,
            time,
        }
    }

    #[tokio::test]
    async fn test_replace_links_reports_missing_and_keeps_old_set() {
        let store = InMemoryStore::new();
        store.upsert_article(&article(1, 1)).await.unwrap();
        store
            .upsert_question(&question(10, 1), &[1.0, 0.0], &stamp())
            .await
            .unwrap();

        let ok = store
            .replace_links(&[QuestionArticleLink {
                question_id: 10,
                article_id: 1,
            }])
            .await
            .unwrap();
        assert!(ok.is_ok());
        assert_eq!(ok.written, 1);

        let bad = store
            .replace_links(&[
                QuestionArticleLink {
                    question_id: 11,
                    article_id: 1,
                },
                QuestionArticleLink {
                    question_id: 10,
                    article_id: 99,
                },
            ])
            .await
            .unwrap();
        assert_eq!(bad.missing_questions, vec![11]);
        assert_eq!(bad.missing_articles, vec![99]);

        let rows = store.query_matches(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(rows.len(), 1, "failed replace must not clear existing links");
    }

    #[tokio::test]
    async fn test_query_matches_is_scoped_to_organization() {
        let store = InMemoryStore::new();
        store.upsert_article(&article(1, 1)).await.unwrap();
        store.upsert_article(&article(2, 2)).await.unwrap();
        store
            .upsert_question(&question(10, 1), &[1.0, 0.0], &stamp())
            .await
            .unwrap();
        store
            .upsert_question(&question(20, 2), &[1.0, 0.0], &stamp())
            .await
            .unwrap();
        store
            .replace_links(&[
                QuestionArticleLink {
                    question_id: 10,
                    article_id: 1,
                },
                QuestionArticleLink {
                    question_id: 20,
                    article_id: 2,
                },
                // cross-tenant link must never surface
                QuestionArticleLink {
                    question_id: 10,
                    article_id: 2,
                },
            ])
            .await
            .unwrap();

        let rows = store.query_matches(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].article_id, 1);
    }

    #[tokio::test]
    async fn test_fetch_history_window_and_cap() {
        let store = InMemoryStore::new();
        for t in 0..15 {
            store.append_history(&turn("s", 1, 100 + t)).await.unwrap();
        }
        store.append_history(&turn("s", 2, 200)).await.unwrap();
        store.append_history(&turn("other", 1, 200)).await.unwrap();

        let turns = store.fetch_history("s", 1, 103, 10).await.unwrap();
        assert_eq!(turns.len(), 10);
        assert_eq!(turns[0].time, 114);
        assert!(turns.windows(2).all(|w| w[0].time >= w[1].time));

        let old = store.fetch_history("s", 1, 112, 10).await.unwrap();
        assert_eq!(old.len(), 3);
    }
}
