//! Types and pure logic shared by the Dagr server, CLI and any UI.
//!
//! Everything in this crate is synchronous and free of I/O so it can be
//! compiled for the browser as well as the server. The `diesel` feature
//! adds database derives for the persisted types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod agent;
#[cfg(feature = "diesel")]
pub mod json_wrapper;
pub mod layout;
pub mod prompt;

#[cfg(feature = "diesel")]
pub use json_wrapper::JsonWrapper;

/// Colour used for events whose calendar has no colour of its own.
pub const DEFAULT_EVENT_COLOR: &str = "pink";

// ============================================================================
// Calendar events
// ============================================================================

/// A displayable block on the weekly grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub color: String,
    pub readonly: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("event {id} must end after it starts ({start} .. {end})")]
    InvalidInterval {
        id: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl CalendarEvent {
    /// Build an event, rejecting intervals where `end <= start`.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        color: impl Into<String>,
        readonly: bool,
    ) -> Result<Self, EventError> {
        let id = id.into();
        if end <= start {
            return Err(EventError::InvalidInterval { id, start, end });
        }

        Ok(Self {
            id,
            title: title.into(),
            start,
            end,
            color: color.into(),
            readonly,
        })
    }

    /// True when the event does not describe a positive interval.
    pub fn is_degenerate(&self) -> bool {
        self.end <= self.start
    }

    /// Half-open interval intersection.
    pub fn overlaps(&self, other: &CalendarEvent) -> bool {
        self.start < other.end && self.end > other.start
    }
}

// ============================================================================
// Goals
// ============================================================================

/// Goal struct matching database column order exactly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "diesel", derive(diesel::Queryable))]
pub struct Goal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub progress: f64,
    pub priority: i32,
    pub completed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Goal {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Goals the planner should still schedule time for.
    pub fn is_open(&self) -> bool {
        !self.is_completed() && !self.is_deleted()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGoalRequest {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateGoalRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub progress: Option<f64>,
    pub priority: Option<i32>,
    pub completed: Option<bool>,
}

impl UpdateGoalRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.progress.is_none()
            && self.priority.is_none()
            && self.completed.is_none()
    }

    /// Reject values the database would happily store but that make no sense.
    pub fn validate(&self) -> Result<(), String> {
        if self.is_empty() {
            return Err("No fields to update".to_string());
        }
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err("Goal title cannot be empty".to_string());
            }
        }
        if let Some(progress) = self.progress {
            if !(0.0..=100.0).contains(&progress) {
                return Err(format!("Progress must be between 0 and 100, got {}", progress));
            }
        }
        Ok(())
    }
}

// ============================================================================
// User configuration
// ============================================================================

/// Free-text self description used to personalise plans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub user_persona: String,
    pub motivations: String,
}

/// One entry of the user's Google calendar list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarListEntry {
    pub id: String,
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub color_id: Option<String>,
    #[serde(default)]
    pub background_color: Option<String>,
    #[serde(default)]
    pub foreground_color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarList {
    pub items: Vec<CalendarListEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    pub id: Uuid,
    pub user_id: Uuid,
    pub preferences: Preferences,
    pub calendars: CalendarList,
    pub dagr_calendar_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserConfig {
    /// Calendars whose events are shown and fed to the planner.
    pub fn calendar_ids(&self) -> Vec<String> {
        self.calendars
            .items
            .iter()
            .map(|calendar| calendar.id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect()
    }

    pub fn calendar_color(&self, calendar_id: &str) -> &str {
        self.calendars
            .items
            .iter()
            .find(|calendar| calendar.id.trim() == calendar_id)
            .and_then(|calendar| calendar.background_color.as_deref())
            .unwrap_or(DEFAULT_EVENT_COLOR)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateUserConfigRequest {
    pub preferences: Option<Preferences>,
}

/// Fields left as `None` keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUserConfigRequest {
    pub preferences: Option<Preferences>,
    pub calendars: Option<CalendarList>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingStatus {
    pub complete: bool,
}

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginInitResponse {
    pub auth_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
}

// ============================================================================
// Calendar & planner API
// ============================================================================

/// Query string for week-scoped calendar endpoints. Defaults to the current week.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WeekQuery {
    pub week_of: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedEvent {
    pub id: Option<String>,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFailure {
    pub title: String,
    pub error: String,
}

/// Outcome of writing an agent plan back to the calendar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanResponse {
    pub created: Vec<PlannedEvent>,
    pub failed: Vec<PlanFailure>,
}
