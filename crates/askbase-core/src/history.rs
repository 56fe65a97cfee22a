//! Session history: windowed fetch, chronological rendering and the
//! relevance gate for history-only answers.

use crate::error::PersistError;
use crate::language::overlap_ratio;
use crate::models::HistoryTurn;
use crate::store::Store;

/// Recency window and count cap for history lookups.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryWindow {
    pub window_hours: i64,
    pub max_turns: i64,
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self {
            window_hours: 24,
            max_turns: 10,
        }
    }
}

impl HistoryWindow {
    /// Oldest timestamp still inside the window.
    pub fn since(&self, now: i64) -> i64 {
        now - self.window_hours * 3600
    }

    /// Fetch the session's recent turns, oldest first.
    ///
    /// The store applies the window and the cap and returns newest first;
    /// the order is reversed here so prompts read chronologically.
    pub async fn fetch_recent(
        &self,
        store: &dyn Store,
        session_id: &str,
        organization_id: i64,
        now: i64,
    ) -> anyhow::Result<Vec<HistoryTurn>> {
        let mut turns = store
            .fetch_history(session_id, organization_id, self.since(now), self.max_turns)
            .await?;
        turns.reverse();
        Ok(turns)
    }
}

/// Append one turn, mapping store failures to [`PersistError`].
pub async fn append_turn(store: &dyn Store, turn: &HistoryTurn) -> Result<(), PersistError> {
    store.append_history(turn).await.map_err(|e| PersistError {
        what: "history turn",
        message: format!("{:#}", e),
    })
}

/// Render turns as prompt text, in the order given.
pub fn render_history(turns: &[HistoryTurn]) -> String {
    turns
        .iter()
        .map(|t| {
            let stamp = chrono::DateTime::from_timestamp(t.time, 0)
                .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| t.time.to_string());
            format!(
                "[{}] Customer: {}\nAssistant: {}",
                stamp,
                t.question.trim(),
                t.response.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Whether the history is about the same thing as `text`.
///
/// True when at least `min_overlap` of the content words of `text` occur
/// somewhere in the history questions or responses. `text` must be in the
/// language the history was written in; the overlap is purely lexical.
pub fn is_on_topic(text: &str, turns: &[HistoryTurn], min_overlap: f64) -> bool {
    if turns.is_empty() {
        return false;
    }
    let reference = turns
        .iter()
        .map(|t| format!("{} {}", t.question, t.response))
        .collect::<Vec<_>>()
        .join(" ");
    overlap_ratio(text, &reference) >= min_overlap
}
