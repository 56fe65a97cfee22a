//! SQLite-backed [`Store`] implementation.
//!
//! Each query maps its rows through exactly one `row_to_*` helper. Writes
//! that make up a unit of work run in a transaction that commits on success
//! and rolls back when dropped on an error path.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use askbase_core::embedding::{blob_to_vec, similarity_score, vec_to_blob};
use askbase_core::models::{
    Article, HistoryTurn, LogEntry, MatchRow, Organization, Question, QuestionArticleLink,
};
use askbase_core::store::{EmbeddingStamp, LinkReplaceReport, Store};

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_history_turn(row: &SqliteRow) -> HistoryTurn {
    HistoryTurn {
        session_id: row.get("session_id"),
        organization_id: row.get("organization_id"),
        question: row.get("question"),
        response: row.get("response"),
        context: row.get("context"),
        time: row.get("time"),
    }
}

fn row_to_log_entry(row: &SqliteRow) -> LogEntry {
    let summary_vector: Option<Vec<u8>> = row.get("summary_vector");
    LogEntry {
        time: row.get("time"),
        organization_id: row.get("organization_id"),
        session_id: row.get("session_id"),
        question: row.get("question"),
        similar_question: row.get("similar_question"),
        similarity: row.get("similarity"),
        context: row.get("context"),
        system_instruction: row.get("system_instruction"),
        response: row.get("response"),
        summary: row.get("summary"),
        summary_vector: summary_vector.map(|b| blob_to_vec(&b)).unwrap_or_default(),
        filtered_reference: row.get("filtered_reference"),
    }
}

fn row_to_match_row(row: &SqliteRow, query_vec: &[f32]) -> MatchRow {
    let blob: Vec<u8> = row.get("embedding");
    MatchRow {
        question_id: row.get("question_id"),
        question: row.get("question"),
        similarity: similarity_score(query_vec, &blob_to_vec(&blob)),
        article_id: row.get("article_id"),
        article_title: row.get("article_title"),
        article_content: row.get("article_content"),
    }
}

fn row_to_embedding_stamp(row: &SqliteRow) -> EmbeddingStamp {
    EmbeddingStamp {
        model: row.get("model"),
        text_hash: row.get("text_hash"),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_organization(&self, org: &Organization) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO organizations (id, name) VALUES (?, ?)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name
            "#,
        )
        .bind(org.id)
        .bind(&org.name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_article(&self, article: &Article) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO articles (id, title, content, organization_id, status, author, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                organization_id = excluded.organization_id,
                status = excluded.status,
                author = excluded.author,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(article.id)
        .bind(&article.title)
        .bind(&article.content)
        .bind(article.organization_id)
        .bind(&article.status)
        .bind(&article.author)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_question(
        &self,
        question: &Question,
        vector: &[f32],
        stamp: &EmbeddingStamp,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO questions (id, text, organization_id, status, embedding, model, dims,
                                   text_hash, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                text = excluded.text,
                organization_id = excluded.organization_id,
                status = excluded.status,
                embedding = excluded.embedding,
                model = excluded.model,
                dims = excluded.dims,
                text_hash = excluded.text_hash,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(question.id)
        .bind(&question.text)
        .bind(question.organization_id)
        .bind(&question.status)
        .bind(vec_to_blob(vector))
        .bind(&stamp.model)
        .bind(vector.len() as i64)
        .bind(&stamp.text_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn embedding_stamp(&self, question_id: i64) -> Result<Option<EmbeddingStamp>> {
        let row = sqlx::query("SELECT model, text_hash FROM questions WHERE id = ?")
            .bind(question_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_embedding_stamp))
    }

    async fn replace_links(&self, links: &[QuestionArticleLink]) -> Result<LinkReplaceReport> {
        let mut report = LinkReplaceReport::default();
        let mut tx = self.pool.begin().await?;

        for link in links {
            let question: Option<i64> = sqlx::query_scalar("SELECT id FROM questions WHERE id = ?")
                .bind(link.question_id)
                .fetch_optional(&mut *tx)
                .await?;
            if question.is_none() && !report.missing_questions.contains(&link.question_id) {
                report.missing_questions.push(link.question_id);
            }
            let article: Option<i64> = sqlx::query_scalar("SELECT id FROM articles WHERE id = ?")
                .bind(link.article_id)
                .fetch_optional(&mut *tx)
                .await?;
            if article.is_none() && !report.missing_articles.contains(&link.article_id) {
                report.missing_articles.push(link.article_id);
            }
        }
        if !report.is_ok() {
            // Dropping the transaction rolls it back; nothing was written.
            return Ok(report);
        }

        sqlx::query("DELETE FROM question_articles")
            .execute(&mut *tx)
            .await?;
        for link in links {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO question_articles (question_id, article_id) VALUES (?, ?)",
            )
            .bind(link.question_id)
            .bind(link.article_id)
            .execute(&mut *tx)
            .await?;
            report.written += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(report)
    }

    async fn query_matches(&self, query_vec: &[f32], organization_id: i64) -> Result<Vec<MatchRow>> {
        let rows = sqlx::query(
            r#"
            SELECT q.id AS question_id, q.text AS question, q.embedding,
                   a.id AS article_id, a.title AS article_title, a.content AS article_content
            FROM questions q
            JOIN question_articles qa ON qa.question_id = q.id
            JOIN articles a ON a.id = qa.article_id
            WHERE q.organization_id = ? AND a.organization_id = ?
            "#,
        )
        .bind(organization_id)
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await
        .context("similarity query")?;

        Ok(rows
            .iter()
            .map(|row| row_to_match_row(row, query_vec))
            .collect())
    }

    async fn fetch_history(
        &self,
        session_id: &str,
        organization_id: i64,
        since: i64,
        limit: i64,
    ) -> Result<Vec<HistoryTurn>> {
        let rows = sqlx::query(
            r#"
            SELECT session_id, organization_id, question, response, context, time
            FROM history
            WHERE session_id = ? AND organization_id = ? AND time >= ?
            ORDER BY time DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(session_id)
        .bind(organization_id)
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_history_turn).collect())
    }

    async fn append_history(&self, turn: &HistoryTurn) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO history (session_id, organization_id, question, response, context, time)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&turn.session_id)
        .bind(turn.organization_id)
        .bind(&turn.question)
        .bind(&turn.response)
        .bind(&turn.context)
        .bind(turn.time)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn append_log(&self, entry: &LogEntry) -> Result<()> {
        let summary_vector = if entry.summary_vector.is_empty() {
            None
        } else {
            Some(vec_to_blob(&entry.summary_vector))
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO log (time, organization_id, session_id, question, similar_question,
                             similarity, context, system_instruction, response, summary,
                             summary_vector, filtered_reference)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.time)
        .bind(entry.organization_id)
        .bind(&entry.session_id)
        .bind(&entry.question)
        .bind(&entry.similar_question)
        .bind(entry.similarity)
        .bind(&entry.context)
        .bind(&entry.system_instruction)
        .bind(&entry.response)
        .bind(&entry.summary)
        .bind(summary_vector)
        .bind(&entry.filtered_reference)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn recent_logs(&self, organization_id: i64, limit: i64) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT time, organization_id, session_id, question, similar_question, similarity,
                   context, system_instruction, response, summary, summary_vector,
                   filtered_reference
            FROM log
            WHERE organization_id = ?
            ORDER BY time DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(organization_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_log_entry).collect())
    }
}
