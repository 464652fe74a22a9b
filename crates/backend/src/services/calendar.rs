//! Calendar reads and the Dagr calendar lifecycle.
//!
//! Nothing here touches the database; callers persist whatever changed.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use chrono_tz::Tz;
use dagr_core::layout::week_range;
use dagr_core::{CalendarEvent, CalendarList, UserConfig};
use futures::future::try_join_all;

use crate::calendar_client::{CalendarApi, RemoteEvent};

/// Name of the secondary calendar plans are written to.
pub const DAGR_CALENDAR_NAME: &str = "Dagr";
const UNTITLED_EVENT: &str = "(No title)";

/// The stored Dagr calendar id, ignoring surrounding whitespace.
fn dagr_calendar_id(config: &UserConfig) -> Option<&str> {
    config
        .dagr_calendar_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
}

/// Calendars whose events make up the user's week: every linked calendar
/// plus the Dagr calendar, which may not be in the synced list yet.
fn week_calendar_ids(config: &UserConfig) -> Vec<String> {
    let mut ids = config.calendar_ids();
    if let Some(dagr_id) = dagr_calendar_id(config) {
        if !ids.iter().any(|id| id == dagr_id) {
            ids.push(dagr_id.to_string());
        }
    }
    ids
}

fn to_calendar_event(remote: RemoteEvent, color: &str, readonly: bool) -> Option<CalendarEvent> {
    let (Some(start), Some(end)) = (remote.start, remote.end) else {
        tracing::debug!("Skipping all-day event {}", remote.id);
        return None;
    };

    let title = remote
        .summary
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| UNTITLED_EVENT.to_string());

    match CalendarEvent::new(remote.id, title, start, end, color, readonly) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!("Dropping calendar event: {}", e);
            None
        }
    }
}

/// Fetch the events of `week_of`'s week (Monday to Monday in `tz`) across
/// all of the user's calendars.
///
/// Calendars are queried concurrently and any single failure fails the
/// whole call. All-day events are dropped. Events on the Dagr calendar are
/// editable, everything else is read-only.
pub async fn list_week_events(
    api: &dyn CalendarApi,
    config: &UserConfig,
    week_of: NaiveDate,
    tz: &Tz,
    max_events: i32,
) -> Result<Vec<CalendarEvent>> {
    let (time_min, time_max) = week_range(week_of, tz);
    let calendar_ids = week_calendar_ids(config);
    let dagr_id = dagr_calendar_id(config);

    let fetches = calendar_ids.iter().map(|calendar_id| async move {
        api.list_events(calendar_id, time_min, time_max, max_events)
            .await
            .with_context(|| format!("Failed to fetch events of calendar {}", calendar_id))
            .map(|events| (calendar_id.as_str(), events))
    });
    let per_calendar = try_join_all(fetches).await?;

    let mut events: Vec<CalendarEvent> = per_calendar
        .into_iter()
        .flat_map(|(calendar_id, remote_events)| {
            let color = config.calendar_color(calendar_id).to_string();
            let readonly = dagr_id != Some(calendar_id);
            remote_events
                .into_iter()
                .filter_map(move |remote| to_calendar_event(remote, &color, readonly))
        })
        .collect();
    events.sort_by_key(|event| event.start);

    tracing::debug!(
        "Fetched {} events from {} calendars for week of {}",
        events.len(),
        calendar_ids.len(),
        week_of
    );
    Ok(events)
}

/// The user's calendar list as it should be stored in their config.
pub async fn fetch_calendar_list(api: &dyn CalendarApi) -> Result<CalendarList> {
    let items = api.list_calendars().await.context("Failed to sync calendar list")?;
    Ok(CalendarList { items })
}

/// Result of [`ensure_dagr_calendar`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DagrCalendar {
    pub id: String,
    /// True when the calendar was created by this call and its id still
    /// needs to be saved.
    pub created: bool,
}

/// Return the user's Dagr calendar, creating it on first use.
pub async fn ensure_dagr_calendar(
    api: &dyn CalendarApi,
    config: &UserConfig,
    time_zone: &str,
) -> Result<DagrCalendar> {
    if let Some(id) = dagr_calendar_id(config) {
        return Ok(DagrCalendar {
            id: id.to_string(),
            created: false,
        });
    }

    let id = api
        .create_calendar(DAGR_CALENDAR_NAME, time_zone)
        .await
        .context("Failed to create the Dagr calendar")?;
    tracing::info!(user_id = %config.user_id, "Created Dagr calendar {}", id);

    Ok(DagrCalendar { id, created: true })
}
