//! Audit log writer and the `logs` inspection command.

use anyhow::Result;

use askbase_core::error::PersistError;
use askbase_core::matcher::ArticleRef;
use askbase_core::models::LogEntry;
use askbase_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Append one audit entry, mapping store failures to [`PersistError`].
pub async fn append_log(store: &dyn Store, entry: &LogEntry) -> Result<(), PersistError> {
    store.append_log(entry).await.map_err(|e| PersistError {
        what: "log entry",
        message: format!("{:#}", e),
    })
}

/// JSON array of `{id, title}` for the `filtered_reference` column.
pub fn filtered_reference(refs: &[ArticleRef]) -> String {
    serde_json::to_string(refs).unwrap_or_else(|_| "[]".to_string())
}

fn format_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// `askbase logs`: print the latest audit entries of an organization.
pub async fn run_logs(config: &Config, organization_id: i64, limit: i64, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let entries = store.recent_logs(organization_id, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No log entries for organization {}.", organization_id);
        return Ok(());
    }

    for entry in &entries {
        println!(
            "{}  session={}  similarity={:.3}",
            format_ts(entry.time),
            entry.session_id,
            entry.similarity
        );
        println!("  question: {}", entry.question);
        println!("  matched:  {}", entry.similar_question.replace('\n', " | "));
        println!("  summary:  {}", entry.summary);
        println!("  refs:     {}", entry.filtered_reference);
        println!("  response: {}", entry.response.replace('\n', " "));
        println!();
    }
    Ok(())
}
