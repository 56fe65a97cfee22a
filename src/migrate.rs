use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Open the configured database and create any missing tables.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Idempotent schema setup on an open pool.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // Create organizations table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS organizations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create organizations table")?;

    // Create articles table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS articles (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            organization_id INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'published',
            author TEXT,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create articles table")?;

    // Create questions table; embedding is little-endian f32
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS questions (
            id INTEGER PRIMARY KEY,
            text TEXT NOT NULL,
            organization_id INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'published',
            embedding BLOB NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            text_hash TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create questions table")?;

    // Create question/article join table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS question_articles (
            question_id INTEGER NOT NULL,
            article_id INTEGER NOT NULL,
            PRIMARY KEY (question_id, article_id),
            FOREIGN KEY (question_id) REFERENCES questions(id),
            FOREIGN KEY (article_id) REFERENCES articles(id)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create question_articles table")?;

    // Create history table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            organization_id INTEGER NOT NULL,
            question TEXT NOT NULL,
            response TEXT NOT NULL,
            context TEXT,
            time INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create history table")?;

    // Create audit log table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            time INTEGER NOT NULL,
            organization_id INTEGER NOT NULL,
            session_id TEXT NOT NULL,
            question TEXT NOT NULL,
            similar_question TEXT NOT NULL,
            similarity REAL NOT NULL,
            context TEXT NOT NULL,
            system_instruction TEXT NOT NULL,
            response TEXT NOT NULL,
            summary TEXT NOT NULL,
            summary_vector BLOB,
            filtered_reference TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create log table")?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_questions_org ON questions(organization_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_org ON articles(organization_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_history_session ON history(session_id, organization_id, time DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_log_org_time ON log(organization_id, time DESC)")
        .execute(pool)
        .await?;

    Ok(())
}
