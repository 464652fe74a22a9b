//! Structured output of the scheduling agent.
//!
//! The language model is asked for a JSON object shaped like
//! [`ScheduleDraft`]. Nothing it returns is trusted: [`parse_schedule`]
//! rejects unknown shapes, and [`ScheduleDraft::resolve`] turns the local
//! day/time strings into instants, failing the whole draft on the first
//! bad item.

use std::sync::OnceLock;

use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// One block as written by the model, in the user's local time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScheduleItem {
    pub start_day: String,
    pub start_time: String,
    pub end_day: String,
    pub end_time: String,
    pub title: String,
    pub description: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleDraft {
    pub items: Vec<ScheduleItem>,
}

/// A validated event ready to be written to the Dagr calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedEvent {
    pub title: String,
    pub summary: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum AgentOutputError {
    #[error("agent output does not match the schedule schema: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("agent returned an empty schedule")]
    EmptySchedule,

    #[error("item {index}: title is blank")]
    MissingTitle { index: usize },

    #[error("item {index}: {field} '{value}' is not a YYYY-MM-DD date")]
    InvalidDate {
        index: usize,
        field: &'static str,
        value: String,
    },

    #[error("item {index}: {field} '{value}' is not an HH:MM time")]
    InvalidTime {
        index: usize,
        field: &'static str,
        value: String,
    },

    #[error("item {index}: {value} does not exist in the configured time zone")]
    NonexistentLocalTime {
        index: usize,
        value: NaiveDateTime,
    },

    #[error("item {index} ('{title}') must end after it starts")]
    InvalidInterval { index: usize, title: String },
}

fn code_fence_regex() -> &'static Regex {
    static CODE_FENCE_RE: OnceLock<Regex> = OnceLock::new();
    CODE_FENCE_RE.get_or_init(|| {
        Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$").expect("code fence regex should compile")
    })
}

fn clock_time_regex() -> &'static Regex {
    static CLOCK_TIME_RE: OnceLock<Regex> = OnceLock::new();
    CLOCK_TIME_RE.get_or_init(|| {
        Regex::new(r"^\s*(\d{1,2})[: ](\d{2})\s*$").expect("clock time regex should compile")
    })
}

/// Parse raw model output into a draft. A surrounding markdown code fence
/// is tolerated, anything else that is not the exact schema is not.
pub fn parse_schedule(raw: &str) -> Result<ScheduleDraft, AgentOutputError> {
    let body = code_fence_regex()
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw);

    let draft: ScheduleDraft = serde_json::from_str(body.trim())?;
    if draft.items.is_empty() {
        return Err(AgentOutputError::EmptySchedule);
    }
    Ok(draft)
}

/// Accepts `HH:MM` and `HH MM`.
fn parse_clock_time(value: &str) -> Option<NaiveTime> {
    let caps = clock_time_regex().captures(value)?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn parse_day(index: usize, field: &'static str, value: &str) -> Result<NaiveDate, AgentOutputError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| AgentOutputError::InvalidDate {
        index,
        field,
        value: value.to_string(),
    })
}

fn parse_time(index: usize, field: &'static str, value: &str) -> Result<NaiveTime, AgentOutputError> {
    parse_clock_time(value).ok_or_else(|| AgentOutputError::InvalidTime {
        index,
        field,
        value: value.to_string(),
    })
}

fn to_instant<Tz: TimeZone>(
    tz: &Tz,
    index: usize,
    local: NaiveDateTime,
) -> Result<DateTime<Utc>, AgentOutputError> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => Err(AgentOutputError::NonexistentLocalTime { index, value: local }),
    }
}

impl ScheduleItem {
    fn resolve<Tz: TimeZone>(&self, index: usize, tz: &Tz) -> Result<ProposedEvent, AgentOutputError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(AgentOutputError::MissingTitle { index });
        }

        let start_day = parse_day(index, "startDay", &self.start_day)?;
        let start_time = parse_time(index, "startTime", &self.start_time)?;
        let end_day = parse_day(index, "endDay", &self.end_day)?;
        let end_time = parse_time(index, "endTime", &self.end_time)?;

        let start = to_instant(tz, index, start_day.and_time(start_time))?;
        let end = to_instant(tz, index, end_day.and_time(end_time))?;
        if end <= start {
            return Err(AgentOutputError::InvalidInterval {
                index,
                title: title.to_string(),
            });
        }

        Ok(ProposedEvent {
            title: title.to_string(),
            summary: self.summary.trim().to_string(),
            description: self.description.trim().to_string(),
            start,
            end,
        })
    }
}

impl ScheduleDraft {
    /// Resolve every item in `tz`. Ambiguous local times (clocks going back)
    /// take the earlier instant; times skipped by a DST jump are an error.
    pub fn resolve<Tz: TimeZone>(&self, tz: &Tz) -> Result<Vec<ProposedEvent>, AgentOutputError> {
        if self.items.is_empty() {
            return Err(AgentOutputError::EmptySchedule);
        }
        self.items
            .iter()
            .enumerate()
            .map(|(index, item)| item.resolve(index, tz))
            .collect()
    }
}

/// JSON schema sent to the structuring model as its response format.
pub fn schedule_json_schema() -> Value {
    let text = json!({ "type": "string" });
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["items"],
        "properties": {
            "items": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": [
                        "startDay", "startTime", "endDay", "endTime",
                        "title", "description", "summary"
                    ],
                    "properties": {
                        "startDay": { "type": "string", "description": "YYYY-MM-DD" },
                        "startTime": { "type": "string", "description": "HH:MM, 24-hour" },
                        "endDay": { "type": "string", "description": "YYYY-MM-DD" },
                        "endTime": { "type": "string", "description": "HH:MM, 24-hour" },
                        "title": text,
                        "description": text,
                        "summary": text,
                    }
                }
            }
        }
    })
}
