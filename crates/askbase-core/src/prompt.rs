//! Prompt templates and composition.
//!
//! A [`TemplateRegistry`] maps each [`TemplateId`] to a template body.
//! Bodies use `{slot}` placeholders; `{{` and `}}` produce literal braces.
//! Composition is a pure function of the body and the supplied [`Slots`]:
//! it never reads the clock, so month and year are ordinary slots filled
//! in by the caller.
//!
//! ```
//! use askbase_core::prompt::{Slots, TemplateId, TemplateRegistry};
//!
//! let registry = TemplateRegistry::builtin();
//! let prompt = registry
//!     .compose(
//!         TemplateId::TranslateToCanonicalLanguage,
//!         &Slots::new().set("text", "Berapa harganya?").set("canonical_language", "English"),
//!     )
//!     .unwrap();
//! assert!(prompt.contains("Berapa harganya?"));
//! ```

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{MissingSlotError, TemplateError};

/// Every prompt the pipeline sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateId {
    SummarizeFollowup,
    TranslateToCanonicalLanguage,
    NotFoundWithHistory,
    NotFoundNoHistory,
    GroundedAnswerWithHistory,
    GroundedAnswerNoHistory,
}

const ANSWER_SLOTS: &[&str] = &[
    "assistant_name",
    "support_contact",
    "month",
    "year",
    "question",
    "response_language",
    "context",
];

const ANSWER_WITH_HISTORY_SLOTS: &[&str] = &[
    "assistant_name",
    "support_contact",
    "month",
    "year",
    "question",
    "response_language",
    "context",
    "history",
    "summary",
];

const NOT_FOUND_SLOTS: &[&str] = &[
    "assistant_name",
    "support_contact",
    "month",
    "year",
    "question",
    "response_language",
    "apology",
];

const NOT_FOUND_WITH_HISTORY_SLOTS: &[&str] = &[
    "assistant_name",
    "support_contact",
    "month",
    "year",
    "question",
    "response_language",
    "apology",
    "history",
    "summary",
];

impl TemplateId {
    pub const ALL: [TemplateId; 6] = [
        TemplateId::SummarizeFollowup,
        TemplateId::TranslateToCanonicalLanguage,
        TemplateId::NotFoundWithHistory,
        TemplateId::NotFoundNoHistory,
        TemplateId::GroundedAnswerWithHistory,
        TemplateId::GroundedAnswerNoHistory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateId::SummarizeFollowup => "summarize_followup",
            TemplateId::TranslateToCanonicalLanguage => "translate_to_canonical_language",
            TemplateId::NotFoundWithHistory => "not_found_with_history",
            TemplateId::NotFoundNoHistory => "not_found_no_history",
            TemplateId::GroundedAnswerWithHistory => "grounded_answer_with_history",
            TemplateId::GroundedAnswerNoHistory => "grounded_answer_no_history",
        }
    }

    /// Slots the orchestrator supplies for this template. A template body
    /// may use any subset of them.
    pub fn allowed_slots(&self) -> &'static [&'static str] {
        match self {
            TemplateId::SummarizeFollowup => &["history", "question"],
            TemplateId::TranslateToCanonicalLanguage => &["text", "canonical_language"],
            TemplateId::NotFoundWithHistory => NOT_FOUND_WITH_HISTORY_SLOTS,
            TemplateId::NotFoundNoHistory => NOT_FOUND_SLOTS,
            TemplateId::GroundedAnswerWithHistory => ANSWER_WITH_HISTORY_SLOTS,
            TemplateId::GroundedAnswerNoHistory => ANSWER_SLOTS,
        }
    }

    fn builtin_body(&self) -> &'static str {
        match self {
            TemplateId::SummarizeFollowup => SUMMARIZE_FOLLOWUP,
            TemplateId::TranslateToCanonicalLanguage => TRANSLATE,
            TemplateId::NotFoundWithHistory => NOT_FOUND_WITH_HISTORY,
            TemplateId::NotFoundNoHistory => NOT_FOUND_NO_HISTORY,
            TemplateId::GroundedAnswerWithHistory => GROUNDED_WITH_HISTORY,
            TemplateId::GroundedAnswerNoHistory => GROUNDED_NO_HISTORY,
        }
    }
}

impl std::fmt::Display for TemplateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TemplateId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TemplateId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| format!("unknown prompt template '{}'", s))
    }
}

const SUMMARIZE_FOLLOWUP: &str = "\
Below is a conversation between a customer and a support assistant, followed by the customer's new message.
Rewrite the new message as one standalone question that carries over every detail from the conversation it depends on.
Keep the customer's own language and wording. Reply with the question only.

Conversation:
{history}

New message:
{question}";

const TRANSLATE: &str = "\
Translate the text below into {canonical_language}. If it is already in {canonical_language}, return it unchanged.
Reply with the translated text only, without quotes or explanations.

Text:
{text}";

const GROUNDED_NO_HISTORY: &str = "\
You are {assistant_name}, a customer support assistant. The current month is {month} {year}.

Answer the customer's question using only the articles below. Do not invent facts that the articles do not state.
If the articles do not answer the question, say so and direct the customer to {support_contact}.

Respond in {response_language}. Translate any article content you use into that language before answering.

Articles:
{context}

Customer question:
{question}";

const GROUNDED_WITH_HISTORY: &str = "\
You are {assistant_name}, a customer support assistant. The current month is {month} {year}.

Answer the customer's latest message using only the articles below, and use the conversation so far to understand what the customer refers to.
Do not invent facts that the articles do not state.
If the articles do not answer the question, say so and direct the customer to {support_contact}.

Respond in {response_language}. Translate any article content you use into that language before answering.

Conversation so far:
{history}

The customer is asking: {summary}

Articles:
{context}

Customer's latest message:
{question}";

const NOT_FOUND_NO_HISTORY: &str = "\
You are {assistant_name}, a customer support assistant. The current month is {month} {year}.

No knowledge-base article answers the customer's question. Apologise briefly, do not guess an answer,
and ask the customer to contact {support_contact} for further help.

Reference apology:
{apology}

Respond in {response_language}.

Customer question:
{question}";

const NOT_FOUND_WITH_HISTORY: &str = "\
You are {assistant_name}, a customer support assistant. The current month is {month} {year}.

No knowledge-base article matches the customer's latest message, but the conversation so far is on the same topic.
Answer only if the conversation below already contains the answer, and never add facts the conversation does not state.
Otherwise apologise briefly and ask the customer to contact {support_contact} for further help.

Conversation so far:
{history}

The customer is asking: {summary}

Reference apology:
{apology}

Respond in {response_language}.

Customer's latest message:
{question}";

/// Named values for template placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slots {
    values: BTreeMap<String, String>,
}

impl Slots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: &str, value: impl Into<String>) -> Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Literal(&'a str),
    Brace(char),
    Slot(&'a str),
}

fn parse(template: TemplateId, body: &str) -> Result<Vec<Segment<'_>>, TemplateError> {
    let name = template.as_str();
    let bytes = body.as_bytes();
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' | b'}' if bytes.get(i + 1) == Some(&bytes[i]) => {
                if literal_start < i {
                    segments.push(Segment::Literal(&body[literal_start..i]));
                }
                segments.push(Segment::Brace(bytes[i] as char));
                i += 2;
                literal_start = i;
            }
            b'{' => {
                let close = body[i + 1..]
                    .find('}')
                    .map(|rel| i + 1 + rel)
                    .ok_or(TemplateError::Unclosed {
                        template: name,
                        offset: i,
                    })?;
                let slot = &body[i + 1..close];
                let valid = !slot.is_empty()
                    && slot
                        .bytes()
                        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
                if !valid {
                    return Err(TemplateError::Unclosed {
                        template: name,
                        offset: i,
                    });
                }
                if literal_start < i {
                    segments.push(Segment::Literal(&body[literal_start..i]));
                }
                segments.push(Segment::Slot(slot));
                i = close + 1;
                literal_start = i;
            }
            b'}' => {
                return Err(TemplateError::StrayClose {
                    template: name,
                    offset: i,
                })
            }
            _ => i += 1,
        }
    }
    if literal_start < bytes.len() {
        segments.push(Segment::Literal(&body[literal_start..]));
    }
    Ok(segments)
}

/// Template bodies keyed by [`TemplateId`]. Immutable once built.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    bodies: HashMap<TemplateId, String>,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateRegistry {
    /// Registry with the built-in English templates.
    pub fn builtin() -> Self {
        let bodies = TemplateId::ALL
            .into_iter()
            .map(|id| (id, id.builtin_body().to_string()))
            .collect();
        Self { bodies }
    }

    /// Replace one template body. Call [`validate`](Self::validate) after
    /// all overrides are applied.
    pub fn with_override(mut self, id: TemplateId, body: impl Into<String>) -> Self {
        self.bodies.insert(id, body.into());
        self
    }

    pub fn body(&self, id: TemplateId) -> &str {
        self.bodies
            .get(&id)
            .map(String::as_str)
            .unwrap_or_else(|| id.builtin_body())
    }

    /// Check that every body parses and only uses slots the pipeline
    /// supplies for it.
    pub fn validate(&self) -> Result<(), TemplateError> {
        for id in TemplateId::ALL {
            let allowed = id.allowed_slots();
            for segment in parse(id, self.body(id))? {
                if let Segment::Slot(slot) = segment {
                    if !allowed.contains(&slot) {
                        return Err(TemplateError::UnknownSlot {
                            template: id.as_str(),
                            slot: slot.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Render `id` with `slots`. Fails on the first placeholder without a
    /// value; extra slots are ignored.
    pub fn compose(&self, id: TemplateId, slots: &Slots) -> Result<String, TemplateError> {
        let body = self.body(id);
        let mut out = String::with_capacity(body.len() + 256);
        for segment in parse(id, body)? {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Brace(c) => out.push(c),
                Segment::Slot(slot) => {
                    let value = slots.get(slot).ok_or_else(|| MissingSlotError {
                        template: id.as_str(),
                        slot: slot.to_string(),
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}
