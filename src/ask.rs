//! The `ask` pipeline.
//!
//! ```text
//! Start ─▶ history? ─yes─▶ summarize ─▶ translate ─▶ match ─found──▶ grounded answer ─┐
//!                  └─no──────────────▶ translate ─▶ match ─not found─▶ apology ───────┤
//!                                                                                     ▼
//!                                               final completion ─▶ log + history ─▶ notify
//! ```
//!
//! Embedding and similarity-query failures never abort a request: they
//! become a not-found outcome with a `retrieval_note`. Language model and
//! template failures end the request with a [`AskFailure`]. Log and history
//! writes happen only after the final answer exists; when they fail the
//! answer is still returned.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use thiserror::Error;
use tracing::Instrument;

use askbase_core::embedding::Embedder;
use askbase_core::error::{ModelError, TemplateError};
use askbase_core::history::{self, HistoryWindow};
use askbase_core::language::detect_language;
use askbase_core::llm::LanguageModel;
use askbase_core::matcher::{join_context, ArticleRef, MatchOutcome, Matcher, NotFoundReason};
use askbase_core::models::{HistoryTurn, LogEntry, OutcomeTag};
use askbase_core::notify::{Notification, Notifier};
use askbase_core::prompt::{Slots, TemplateId, TemplateRegistry};
use askbase_core::store::Store;

use crate::audit;
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::llm::create_model;
use crate::notify::create_notifier;
use crate::session_lock::{SessionGuard, SessionLocks};

/// Summary recorded for a turn without prior history.
pub const FIRST_TURN_MARKER: &str = "First conversation turn";

/// `similar_question` recorded in the log when nothing matched.
const NOT_FOUND_MARKER: &str = "Not Found";

const UNKNOWN_LANGUAGE: &str = "the same language as the customer's question";

#[derive(Debug, Clone, Serialize)]
pub struct AskSuccess {
    pub success: bool,
    pub request_id: String,
    pub answer: String,
    /// LLM summary when the session had history, else [`FIRST_TURN_MARKER`].
    /// A blank summary is recorded as the question itself.
    pub summary: String,
    pub outcome: OutcomeTag,
    /// Best stored question, accepted or not.
    pub similar_question: Option<String>,
    pub similarity: f64,
    /// Why retrieval could not run, when it could not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieval_note: Option<String>,
    pub references: Vec<ArticleRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskFailure {
    pub success: bool,
    pub request_id: String,
    pub message: String,
}

/// Outcome of one `ask` call. Serializes to the JSON returned by the CLI
/// and the HTTP server.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AskResult {
    Success(AskSuccess),
    Failure(AskFailure),
}

impl AskResult {
    pub fn is_success(&self) -> bool {
        matches!(self, AskResult::Success(_))
    }

    pub fn success(&self) -> Option<&AskSuccess> {
        match self {
            AskResult::Success(s) => Some(s),
            AskResult::Failure(_) => None,
        }
    }

    fn failure(request_id: &str, message: impl Into<String>) -> Self {
        AskResult::Failure(AskFailure {
            success: false,
            request_id: request_id.to_string(),
            message: message.into(),
        })
    }
}

/// Failures that end a request.
#[derive(Error, Debug)]
enum StageError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Tunables for a [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub templates: TemplateRegistry,
    pub matcher: Matcher,
    pub history: HistoryWindow,
    pub relevance_min_overlap: f64,
    pub temperature: f32,
    pub assistant_name: String,
    pub support_contact: String,
    pub canonical_language: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        let support_contact = "our customer support team".to_string();
        Self {
            templates: TemplateRegistry::builtin(),
            matcher: Matcher::new(
                askbase_core::matcher::DEFAULT_THRESHOLD,
                Default::default(),
                support_contact.clone(),
            ),
            history: HistoryWindow::default(),
            relevance_min_overlap: 0.3,
            temperature: 0.3,
            assistant_name: "the support assistant".to_string(),
            support_contact,
            canonical_language: "English".to_string(),
        }
    }
}

impl PipelineOptions {
    /// Options from a loaded config. Prompt override paths resolve against
    /// `base_dir`.
    pub fn from_config(config: &Config, base_dir: &Path) -> Result<Self> {
        Ok(Self {
            templates: config.template_registry(base_dir)?,
            matcher: Matcher::new(
                config.retrieval.threshold,
                config.retrieval.mode,
                config.assistant.support_contact.clone(),
            ),
            history: HistoryWindow {
                window_hours: config.history.window_hours,
                max_turns: config.history.max_turns,
            },
            relevance_min_overlap: config.history.relevance_min_overlap,
            temperature: config.llm.temperature,
            assistant_name: config.assistant.name.clone(),
            support_contact: config.assistant.support_contact.clone(),
            canonical_language: config.assistant.canonical_language.clone(),
        })
    }
}

/// Everything `ask` needs, shared across requests.
pub struct Pipeline {
    store: Arc<dyn Store>,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn LanguageModel>,
    notifier: Arc<dyn Notifier>,
    options: PipelineOptions,
    locks: SessionLocks,
}

/// A computed answer, before persistence.
struct Completed {
    answer: String,
    summary: String,
    outcome: OutcomeTag,
    similar_question: Option<String>,
    similarity: f64,
    retrieval_note: Option<String>,
    references: Vec<ArticleRef>,
    context: String,
    system_instruction: String,
    search_vector: Vec<f32>,
    found_context: Option<String>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
        notifier: Arc<dyn Notifier>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store,
            embedder,
            model,
            notifier,
            options,
            locks: SessionLocks::new(),
        }
    }

    /// Build providers from config around an existing store.
    pub fn from_config(config: &Config, base_dir: &Path, store: Arc<dyn Store>) -> Result<Self> {
        Ok(Self::new(
            store,
            create_embedder(&config.embedding)?,
            create_model(&config.llm)?,
            create_notifier(&config.notify)?,
            PipelineOptions::from_config(config, base_dir)?,
        ))
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Answer `question` for one session of one organization.
    ///
    /// Month and year for the prompts are taken from the local clock once
    /// the session lock is held.
    pub async fn ask(&self, question: &str, session_id: &str, organization_id: i64) -> AskResult {
        self.ask_inner(question, session_id, organization_id, None)
            .await
    }

    /// Like [`ask`](Self::ask) with a fixed clock.
    pub async fn ask_at(
        &self,
        question: &str,
        session_id: &str,
        organization_id: i64,
        now: DateTime<FixedOffset>,
    ) -> AskResult {
        self.ask_inner(question, session_id, organization_id, Some(now))
            .await
    }

    async fn ask_inner(
        &self,
        question: &str,
        session_id: &str,
        organization_id: i64,
        now: Option<DateTime<FixedOffset>>,
    ) -> AskResult {
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!(
            "ask",
            request_id = %request_id,
            session = %session_id,
            organization = organization_id
        );

        async move {
            if question.trim().is_empty() {
                return AskResult::failure(&request_id, "question must not be empty");
            }
            if session_id.trim().is_empty() {
                return AskResult::failure(&request_id, "session_id must not be empty");
            }

            let session = self.locks.acquire(organization_id, session_id).await;
            let now = now.unwrap_or_else(|| chrono::Local::now().fixed_offset());
            let time = now.timestamp();

            let turns = match self
                .options
                .history
                .fetch_recent(self.store.as_ref(), session_id, organization_id, time)
                .await
            {
                Ok(turns) => turns,
                Err(e) => {
                    tracing::warn!(error = %format!("{:#}", e), "history lookup failed; continuing without history");
                    Vec::new()
                }
            };
            tracing::info!(turns = turns.len(), "history loaded");

            match self
                .run(question, organization_id, &turns, &now)
                .await
            {
                Ok(done) => {
                    tracing::info!(outcome = %done.outcome, similarity = done.similarity, "answered");
                    let entry = log_entry(question, session_id, organization_id, time, &done);
                    let turn = HistoryTurn {
                        session_id: session_id.to_string(),
                        organization_id,
                        question: question.to_string(),
                        response: done.answer.clone(),
                        context: done.found_context.clone(),
                        time,
                    };
                    let notification = Notification {
                        organization_id,
                        session_id: session_id.to_string(),
                        question: question.to_string(),
                        outcome: done.outcome,
                        time,
                    };
                    self.persist_detached(session, entry, Some(turn), Some(notification))
                        .await;
                    AskResult::Success(AskSuccess {
                        success: true,
                        request_id,
                        answer: done.answer,
                        summary: done.summary,
                        outcome: done.outcome,
                        similar_question: done.similar_question,
                        similarity: done.similarity,
                        retrieval_note: done.retrieval_note,
                        references: done.references,
                    })
                }
                Err(e) => {
                    tracing::error!(error = %e, "ask failed");
                    let message = format!("Internal error: {}", e);
                    let entry =
                        failure_log_entry(question, session_id, organization_id, time, &message);
                    self.persist_detached(session, entry, None, None).await;
                    AskResult::failure(&request_id, message)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        self.model.complete(prompt, self.options.temperature).await
    }

    async fn run(
        &self,
        question: &str,
        organization_id: i64,
        turns: &[HistoryTurn],
        now: &DateTime<FixedOffset>,
    ) -> Result<Completed, StageError> {
        let opts = &self.options;
        let history_text = history::render_history(turns);

        // Summarize (history only), then translate.
        let summary = if turns.is_empty() {
            None
        } else {
            let prompt = opts.templates.compose(
                TemplateId::SummarizeFollowup,
                &Slots::new()
                    .set("history", history_text.as_str())
                    .set("question", question),
            )?;
            let summary = self.complete(&prompt).await?;
            tracing::debug!(summary = %summary, "follow-up summarized");
            Some(summary).filter(|s| !s.trim().is_empty())
        };
        let search_input = summary.as_deref().unwrap_or(question);

        let prompt = opts.templates.compose(
            TemplateId::TranslateToCanonicalLanguage,
            &Slots::new()
                .set("text", search_input)
                .set("canonical_language", opts.canonical_language.as_str()),
        )?;
        let translated = self.complete(&prompt).await?;
        let search_text = if translated.trim().is_empty() {
            search_input.to_string()
        } else {
            translated
        };
        tracing::debug!(search_text = %search_text, "search text ready");

        // Match.
        let (outcome, vector) = opts
            .matcher
            .match_text(
                self.embedder.as_ref(),
                self.store.as_ref(),
                &search_text,
                organization_id,
            )
            .await;

        let summary_text = match (&summary, turns.is_empty()) {
            (_, true) => FIRST_TURN_MARKER.to_string(),
            (Some(s), false) => s.clone(),
            (None, false) => question.to_string(),
        };
        let response_language = detect_language(question)
            .map(|l| l.name())
            .unwrap_or(UNKNOWN_LANGUAGE);
        let base = Slots::new()
            .set("assistant_name", opts.assistant_name.as_str())
            .set("support_contact", opts.support_contact.as_str())
            .set("month", now.format("%B").to_string())
            .set("year", now.format("%Y").to_string())
            .set("question", question)
            .set("response_language", response_language)
            .set("history", history_text.as_str())
            .set("summary", summary_text.as_str());

        let mut done = match outcome {
            MatchOutcome::Found(results) => {
                let (context, references) = join_context(&results);
                let template = if turns.is_empty() {
                    TemplateId::GroundedAnswerNoHistory
                } else {
                    TemplateId::GroundedAnswerWithHistory
                };
                let system_instruction = opts
                    .templates
                    .compose(template, &base.set("context", context.as_str()))?;
                Completed {
                    answer: String::new(),
                    summary: summary_text,
                    outcome: OutcomeTag::ArticleFound,
                    similar_question: Some(results[0].matched_question_text.clone()),
                    similarity: results[0].similarity_score,
                    retrieval_note: None,
                    references,
                    found_context: Some(context.clone()),
                    context,
                    system_instruction,
                    search_vector: vector.unwrap_or_default(),
                }
            }
            MatchOutcome::NotFound(nf) => {
                // Compared before translation, so both sides share the customer's language.
                let on_topic = history::is_on_topic(search_input, turns, opts.relevance_min_overlap);
                let template = if on_topic {
                    TemplateId::NotFoundWithHistory
                } else {
                    TemplateId::NotFoundNoHistory
                };
                if !turns.is_empty() && !on_topic {
                    tracing::info!("history is off-topic; not using it for the fallback answer");
                }
                let system_instruction = opts
                    .templates
                    .compose(template, &base.set("apology", nf.content.as_str()))?;
                let retrieval_note = match nf.reason {
                    NotFoundReason::ConversionFailed | NotFoundReason::QueryFailed => {
                        Some(nf.content.clone())
                    }
                    NotFoundReason::EmptyCorpus | NotFoundReason::BelowThreshold => None,
                };
                Completed {
                    answer: String::new(),
                    summary: summary_text,
                    outcome: OutcomeTag::NotFoundArticle,
                    similar_question: nf.best_question,
                    similarity: nf.best_score,
                    retrieval_note,
                    references: Vec::new(),
                    found_context: None,
                    context: nf.content,
                    system_instruction,
                    search_vector: vector.unwrap_or_default(),
                }
            }
        };

        done.answer = self.complete(&done.system_instruction).await?;
        Ok(done)
    }

    /// Write the log entry and history turn on a task of their own, then
    /// spawn the notification.
    ///
    /// Once started, dropping the request future does not interrupt the
    /// writes. The session lock moves into the task and is released only
    /// after both writes finished.
    async fn persist_detached(
        &self,
        session: SessionGuard,
        entry: LogEntry,
        turn: Option<HistoryTurn>,
        notification: Option<Notification>,
    ) {
        let store = self.store.clone();
        let notifier = self.notifier.clone();
        let task = tokio::spawn(
            async move {
                if let Err(e) = audit::append_log(store.as_ref(), &entry).await {
                    tracing::warn!(error = %e, "audit log write failed");
                }
                if let Some(turn) = turn {
                    if let Err(e) = history::append_turn(store.as_ref(), &turn).await {
                        tracing::warn!(error = %e, "history write failed");
                    }
                }
                drop(session);

                if let Some(notification) = notification {
                    tokio::spawn(
                        async move {
                            if let Err(e) = notifier.notify(&notification).await {
                                tracing::warn!(error = %format!("{:#}", e), "notification failed");
                            }
                        }
                        .in_current_span(),
                    );
                }
            }
            .in_current_span(),
        );
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "persistence task failed");
        }
    }
}

fn log_entry(
    question: &str,
    session_id: &str,
    organization_id: i64,
    time: i64,
    done: &Completed,
) -> LogEntry {
    LogEntry {
        time,
        organization_id,
        session_id: session_id.to_string(),
        question: question.to_string(),
        similar_question: match done.outcome {
            OutcomeTag::ArticleFound => done.similar_question.clone().unwrap_or_default(),
            OutcomeTag::NotFoundArticle => NOT_FOUND_MARKER.to_string(),
        },
        similarity: done.similarity,
        context: done.context.clone(),
        system_instruction: done.system_instruction.clone(),
        response: done.answer.clone(),
        summary: done.summary.clone(),
        summary_vector: done.search_vector.clone(),
        filtered_reference: audit::filtered_reference(&done.references),
    }
}

fn failure_log_entry(
    question: &str,
    session_id: &str,
    organization_id: i64,
    time: i64,
    message: &str,
) -> LogEntry {
    LogEntry {
        time,
        organization_id,
        session_id: session_id.to_string(),
        question: question.to_string(),
        similar_question: NOT_FOUND_MARKER.to_string(),
        similarity: 0.0,
        context: String::new(),
        system_instruction: String::new(),
        response: message.to_string(),
        summary: String::new(),
        summary_vector: Vec::new(),
        filtered_reference: "[]".to_string(),
    }
}

/// `askbase ask`: run one question and print the JSON result.
pub async fn run_ask(
    config: &Config,
    config_dir: &Path,
    question: &str,
    session_id: &str,
    organization_id: i64,
) -> Result<()> {
    crate::migrate::run_migrations(config).await?;
    let pool = crate::db::connect(config).await?;
    let store = Arc::new(crate::sqlite_store::SqliteStore::new(pool));
    let pipeline = Pipeline::from_config(config, config_dir, store)?;

    let result = pipeline.ask(question, session_id, organization_id).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
