//! In-memory stand-ins for Google Calendar and the model provider.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dagr_core::agent::ProposedEvent;
use dagr_core::CalendarListEntry;

use crate::calendar_client::{CalendarApi, RemoteEvent};
use crate::llm::{ChatModel, ChatRequest, LlmError};

/// Replays canned replies in order and records every request.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<String, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(LlmError::EmptyResponse))
    }
}

/// Structurer output with two blocks on Tuesday and Wednesday 2025-09-16/17.
pub fn schedule_json() -> String {
    r#"{"items":[
        {"startDay":"2025-09-16","startTime":"19:00","endDay":"2025-09-16","endTime":"20:00",
         "title":"Try painting","description":"Watercolor basics","summary":"Painting"},
        {"startDay":"2025-09-17","startTime":"21 00","endDay":"2025-09-17","endTime":"22:00",
         "title":"Side project","description":"Ship the parser","summary":"Coding"}
    ]}"#
    .to_string()
}

pub fn calendar_entry(id: &str, background_color: Option<&str>) -> CalendarListEntry {
    CalendarListEntry {
        id: id.to_string(),
        summary: id.to_string(),
        description: None,
        time_zone: Some("America/Los_Angeles".to_string()),
        color_id: None,
        background_color: background_color.map(str::to_string),
        foreground_color: None,
    }
}

pub fn remote_event(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> RemoteEvent {
    RemoteEvent {
        id: id.to_string(),
        summary: Some(id.to_string()),
        start: Some(start),
        end: Some(end),
    }
}

#[derive(Default)]
pub struct FakeCalendar {
    pub calendars: Vec<CalendarListEntry>,
    pub events: HashMap<String, Vec<RemoteEvent>>,
    /// Calendars whose event listing fails.
    pub failing_calendars: HashSet<String>,
    /// Event titles whose insertion fails.
    pub rejected_titles: HashSet<String>,
    pub created_calendars: Mutex<Vec<String>>,
    pub inserted: Mutex<Vec<(String, ProposedEvent)>>,
    pub list_calls: Mutex<Vec<(String, DateTime<Utc>, DateTime<Utc>, i32)>>,
}

#[async_trait]
impl CalendarApi for FakeCalendar {
    async fn list_calendars(&self) -> Result<Vec<CalendarListEntry>> {
        Ok(self.calendars.clone())
    }

    async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        max_results: i32,
    ) -> Result<Vec<RemoteEvent>> {
        self.list_calls
            .lock()
            .unwrap()
            .push((calendar_id.to_string(), time_min, time_max, max_results));

        if self.failing_calendars.contains(calendar_id) {
            return Err(anyhow!("Google API error: 403 Forbidden for {}", calendar_id));
        }
        Ok(self.events.get(calendar_id).cloned().unwrap_or_default())
    }

    async fn create_calendar(&self, summary: &str, _time_zone: &str) -> Result<String> {
        let mut created = self.created_calendars.lock().unwrap();
        let id = format!("{}-{}@group.calendar.google.com", summary.to_lowercase(), created.len());
        created.push(id.clone());
        Ok(id)
    }

    async fn insert_event(&self, calendar_id: &str, event: &ProposedEvent, _time_zone: &str) -> Result<String> {
        if self.rejected_titles.contains(&event.title) {
            return Err(anyhow!("Google API error: 400 Bad Request"));
        }
        let mut inserted = self.inserted.lock().unwrap();
        inserted.push((calendar_id.to_string(), event.clone()));
        Ok(format!("evt-{}", inserted.len()))
    }
}
