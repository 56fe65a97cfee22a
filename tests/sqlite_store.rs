use std::fs;

use askbase::config::load_config;
use askbase::db;
use askbase::migrate;
use askbase::sqlite_store::SqliteStore;
use askbase_core::models::{
    Article, HistoryTurn, LogEntry, Organization, Question, QuestionArticleLink,
};
use askbase_core::store::{EmbeddingStamp, Store};
use tempfile::TempDir;

async fn open_store() -> (TempDir, SqliteStore) {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("askbase.toml");
    fs::write(
        &config_path,
        format!("[db]\npath = \"{}/data/askbase.sqlite\"\n", tmp.path().display()),
    )
    .unwrap();
    let config = load_config(&config_path).unwrap();
    migrate::run_migrations(&config).await.unwrap();
    let pool = db::connect(&config).await.unwrap();
    (tmp, SqliteStore::new(pool))
}

fn stamp(text: &str) -> EmbeddingStamp {
    EmbeddingStamp {
        model: "test-model".to_string(),
        text_hash: format!("hash:{}", text),
    }
}

async fn seed(store: &SqliteStore) {
    for (id, name) in [(1, "Acme"), (2, "Globex")] {
        store
            .upsert_organization(&Organization {
                id,
                name: name.to_string(),
            })
            .await
            .unwrap();
    }
    for (id, org, title) in [(1, 1, "Acme Refunds"), (2, 2, "Globex Refunds")] {
        store
            .upsert_article(&Article {
                id,
                title: title.to_string(),
                content: format!("{} content", title),
                organization_id: org,
                status: "published".to_string(),
                author: None,
            })
            .await
            .unwrap();
    }
    for (id, org, text) in [(10, 1, "Acme refund?"), (20, 2, "Globex refund?")] {
        store
            .upsert_question(
                &Question {
                    id,
                    text: text.to_string(),
                    organization_id: org,
                    status: "published".to_string(),
                },
                &[1.0, 0.0],
                &stamp(text),
            )
            .await
            .unwrap();
    }
    let report = store
        .replace_links(&[
            QuestionArticleLink {
                question_id: 10,
                article_id: 1,
            },
            QuestionArticleLink {
                question_id: 20,
                article_id: 2,
            },
        ])
        .await
        .unwrap();
    assert_eq!(report.written, 2);
}

fn turn(question: &str, time: i64) -> HistoryTurn {
    HistoryTurn {
        session_id: "s1".to_string(),
        organization_id: 1,
        question: question.to_string(),
        response: format!("re: {}", question),
        context: None,
        time,
    }
}

#[tokio::test]
async fn test_matches_are_scoped_to_organization() {
    let (_tmp, store) = open_store().await;
    seed(&store).await;

    let rows = store.query_matches(&[1.0, 0.0], 1).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].question_id, 10);
    assert_eq!(rows[0].article_title, "Acme Refunds");
    assert!((rows[0].similarity - 1.0).abs() < 1e-6);

    assert!(store.query_matches(&[1.0, 0.0], 3).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cross_organization_link_is_not_matched() {
    let (_tmp, store) = open_store().await;
    seed(&store).await;
    store
        .replace_links(&[QuestionArticleLink {
            question_id: 10,
            article_id: 2,
        }])
        .await
        .unwrap();

    assert!(store.query_matches(&[1.0, 0.0], 1).await.unwrap().is_empty());
    assert!(store.query_matches(&[1.0, 0.0], 2).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_embedding_stamp_roundtrip() {
    let (_tmp, store) = open_store().await;
    seed(&store).await;

    assert_eq!(
        store.embedding_stamp(10).await.unwrap(),
        Some(stamp("Acme refund?"))
    );
    assert_eq!(store.embedding_stamp(99).await.unwrap(), None);
}

#[tokio::test]
async fn test_replace_links_with_missing_ids_writes_nothing() {
    let (_tmp, store) = open_store().await;
    seed(&store).await;

    let report = store
        .replace_links(&[
            QuestionArticleLink {
                question_id: 10,
                article_id: 1,
            },
            QuestionArticleLink {
                question_id: 77,
                article_id: 88,
            },
        ])
        .await
        .unwrap();
    assert!(!report.is_ok());
    assert_eq!(report.missing_questions, vec![77]);
    assert_eq!(report.missing_articles, vec![88]);

    // The previous link set is intact.
    assert_eq!(store.query_matches(&[1.0, 0.0], 2).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_history_newest_first_within_window() {
    let (_tmp, store) = open_store().await;
    store.append_history(&turn("too old", 100)).await.unwrap();
    store.append_history(&turn("first", 1_000)).await.unwrap();
    store.append_history(&turn("second", 2_000)).await.unwrap();
    store.append_history(&turn("third", 3_000)).await.unwrap();

    let turns = store.fetch_history("s1", 1, 500, 10).await.unwrap();
    let questions: Vec<&str> = turns.iter().map(|t| t.question.as_str()).collect();
    assert_eq!(questions, vec!["third", "second", "first"]);

    let capped = store.fetch_history("s1", 1, 0, 2).await.unwrap();
    assert_eq!(capped.len(), 2);
    assert_eq!(capped[0].question, "third");

    assert!(store.fetch_history("s1", 2, 0, 10).await.unwrap().is_empty());
    assert!(store.fetch_history("other", 1, 0, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_log_roundtrip() {
    let (_tmp, store) = open_store().await;
    let entry = LogEntry {
        time: 1_700_000_000,
        organization_id: 1,
        session_id: "s1".to_string(),
        question: "Refund?".to_string(),
        similar_question: "Acme refund?".to_string(),
        similarity: 0.92,
        context: "Title: Acme Refunds\nAcme Refunds content".to_string(),
        system_instruction: "You are Aria".to_string(),
        response: "Yes.".to_string(),
        summary: "First conversation turn".to_string(),
        summary_vector: vec![0.5, -0.25],
        filtered_reference: r#"[{"id":1,"title":"Acme Refunds"}]"#.to_string(),
    };
    store.append_log(&entry).await.unwrap();

    let logs = store.recent_logs(1, 10).await.unwrap();
    assert_eq!(logs, vec![entry]);
    assert!(store.recent_logs(2, 10).await.unwrap().is_empty());
}
