//! Outcome notifications.
//!
//! Notifications are fire-and-forget: the orchestrator never waits on them
//! and a failing notifier never fails a request.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::OutcomeTag;

/// Payload sent after each completed `ask`.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub organization_id: i64,
    pub session_id: String,
    pub question: String,
    pub outcome: OutcomeTag,
    /// Unix seconds.
    pub time: i64,
}

impl Notification {
    /// Render the chat-style message body.
    pub fn render_text(&self) -> String {
        let date = chrono::DateTime::from_timestamp(self.time, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        let mut text = format!(
            "*---- askbase notification ----*\n\n\
             *Date:* {}\n\n\
             *Organization:* {}\n\n\
             *Session:* {}\n\n\
             *Question:* {}\n\n",
            date, self.organization_id, self.session_id, self.question
        );
        if self.outcome == OutcomeTag::NotFoundArticle {
            text.push_str("No article matched this question; the assistant could not answer it.");
        } else {
            text.push_str("Answered from the knowledge base.");
        }
        text
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Notifier that drops everything.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _notification: &Notification) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_text_mentions_unanswered() {
        let n = Notification {
            organization_id: 3,
            session_id: "s-1".to_string(),
            question: "Do you ship to Mars?".to_string(),
            outcome: OutcomeTag::NotFoundArticle,
            time: 1_700_000_000,
        };
        let text = n.render_text();
        assert!(text.contains("2023-11-14"));
        assert!(text.contains("Do you ship to Mars?"));
        assert!(text.contains("could not answer"));
    }
}
