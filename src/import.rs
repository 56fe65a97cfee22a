//! Knowledge-base seeding from a TOML file.
//!
//! ```toml
//! [[organizations]]
//! id = 1
//! name = "Acme"
//!
//! [[articles]]
//! id = 1
//! organization_id = 1
//! title = "Refund Policy"
//! content = "Refunds are accepted within 30 days."
//!
//! [[questions]]
//! id = 10
//! organization_id = 1
//! text = "What is your refund policy?"
//!
//! [[links]]
//! question_id = 10
//! article_id = 1
//! ```
//!
//! Question embeddings are computed here, at write time. A question whose
//! text hash and embedding model are unchanged keeps its stored vector
//! unless `--reembed` is given. When the file has a `[[links]]` section the
//! whole link set is replaced by it.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;

use askbase_core::embedding::Embedder;
use askbase_core::models::{Article, Organization, Question, QuestionArticleLink};
use askbase_core::store::{EmbeddingStamp, Store};

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Deserialize, Default)]
pub struct SeedFile {
    #[serde(default)]
    pub organizations: Vec<Organization>,
    #[serde(default)]
    pub articles: Vec<Article>,
    #[serde(default)]
    pub questions: Vec<Question>,
    /// `None` leaves the stored link set untouched.
    #[serde(default)]
    pub links: Option<Vec<QuestionArticleLink>>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub organizations: usize,
    pub articles: usize,
    pub questions_embedded: usize,
    pub questions_unchanged: usize,
    pub links: Option<usize>,
}

pub fn text_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn parse_seed(content: &str) -> Result<SeedFile> {
    let seed: SeedFile = toml::from_str(content).context("Failed to parse seed file")?;
    for q in &seed.questions {
        if q.text.trim().is_empty() {
            bail!("question {} has empty text", q.id);
        }
    }
    Ok(seed)
}

/// Write `seed` into `store`, embedding changed questions in batches.
pub async fn import_seed(
    store: &dyn Store,
    embedder: &dyn Embedder,
    seed: &SeedFile,
    batch_size: usize,
    reembed: bool,
) -> Result<ImportReport> {
    let mut report = ImportReport::default();

    for org in &seed.organizations {
        store.upsert_organization(org).await?;
        report.organizations += 1;
    }
    for article in &seed.articles {
        store.upsert_article(article).await?;
        report.articles += 1;
    }

    let model = embedder.model_name().to_string();
    let mut pending: Vec<(&Question, EmbeddingStamp)> = Vec::new();
    for question in &seed.questions {
        let stamp = EmbeddingStamp {
            model: model.clone(),
            text_hash: text_hash(&question.text),
        };
        let unchanged = store.embedding_stamp(question.id).await?.as_ref() == Some(&stamp);
        if unchanged && !reembed {
            report.questions_unchanged += 1;
            continue;
        }
        pending.push((question, stamp));
    }

    for batch in pending.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|(q, _)| q.text.clone()).collect();
        let vectors = embedder
            .embed_batch(&texts)
            .await
            .with_context(|| format!("Failed to embed {} question(s)", texts.len()))?;
        for ((question, stamp), vector) in batch.iter().zip(vectors.iter()) {
            store.upsert_question(question, vector, stamp).await?;
            report.questions_embedded += 1;
        }
        tracing::debug!(batch = texts.len(), "question batch embedded");
    }

    if let Some(links) = &seed.links {
        let result = store.replace_links(links).await?;
        if !result.is_ok() {
            bail!(
                "link replace rejected: missing questions {:?}, missing articles {:?}",
                result.missing_questions,
                result.missing_articles
            );
        }
        report.links = Some(result.written);
    }

    Ok(report)
}

/// `askbase import <file>`.
pub async fn run_import(config: &Config, path: &Path, reembed: bool) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file: {}", path.display()))?;
    let seed = parse_seed(&content)?;

    migrate::run_migrations(config).await?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let embedder = create_embedder(&config.embedding)?;

    let report = import_seed(
        &store,
        embedder.as_ref(),
        &seed,
        config.embedding.batch_size,
        reembed,
    )
    .await?;

    println!("import {}", path.display());
    println!("  organizations: {}", report.organizations);
    println!("  articles: {}", report.articles);
    println!("  questions embedded: {}", report.questions_embedded);
    println!("  questions unchanged: {}", report.questions_unchanged);
    if let Some(links) = report.links {
        println!("  links: {}", links);
    }
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use askbase_core::error::ConversionError;
    use askbase_core::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ConversionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    const SEED: &str = r#"
[[organizations]]
id = 1
name = "Acme"

[[articles]]
id = 1
organization_id = 1
title = "Refund Policy"
content = "Refunds are accepted within 30 days."

[[questions]]
id = 10
organization_id = 1
text = "What is your refund policy?"

[[questions]]
id = 11
organization_id = 1
text = "Can I get my money back?"

[[links]]
question_id = 10
article_id = 1

[[links]]
question_id = 11
article_id = 1
"#;

    #[tokio::test]
    async fn test_import_skips_unchanged_questions() {
        let store = InMemoryStore::new();
        let embedder = CountingEmbedder {
            calls: AtomicUsize::new(0),
        };
        let seed = parse_seed(SEED).unwrap();

        let first = import_seed(&store, &embedder, &seed, 1, false).await.unwrap();
        assert_eq!(first.questions_embedded, 2);
        assert_eq!(first.links, Some(2));

        let second = import_seed(&store, &embedder, &seed, 1, false).await.unwrap();
        assert_eq!(second.questions_embedded, 0);
        assert_eq!(second.questions_unchanged, 2);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);

        let forced = import_seed(&store, &embedder, &seed, 8, true).await.unwrap();
        assert_eq!(forced.questions_embedded, 2);
    }

    #[tokio::test]
    async fn test_import_rejects_dangling_links() {
        let store = InMemoryStore::new();
        let embedder = CountingEmbedder {
            calls: AtomicUsize::new(0),
        };
        let mut seed = parse_seed(SEED).unwrap();
        seed.links = Some(vec![QuestionArticleLink {
            question_id: 10,
            article_id: 99,
        }]);
        let err = import_seed(&store, &embedder, &seed, 4, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("99"));
    }

    #[test]
    fn test_text_hash_is_stable() {
        assert_eq!(text_hash("abc"), text_hash("abc"));
        assert_ne!(text_hash("abc"), text_hash("abd"));
        assert_eq!(text_hash("").len(), 64);
    }
}
