//! Google Calendar access.
//!
//! Services talk to the calendar through [`CalendarApi`] so they can be
//! exercised against an in-memory calendar. [`GoogleCalendarClient`] is the
//! real implementation, authorised with the refresh token stored at login.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dagr_core::agent::ProposedEvent;
use dagr_core::CalendarListEntry;
use google_calendar3::api::{Calendar, Event, EventDateTime};
use google_calendar3::hyper_rustls::HttpsConnector;
use google_calendar3::CalendarHub;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

/// An event as returned by the calendar. `start`/`end` are `None` for
/// all-day events, which only carry a date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEvent {
    pub id: String,
    pub summary: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait CalendarApi: Send + Sync {
    /// Calendars visible to the user.
    async fn list_calendars(&self) -> Result<Vec<CalendarListEntry>>;

    /// Events of one calendar intersecting `[time_min, time_max)`, recurring
    /// events expanded, at most `max_results`.
    async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        max_results: i32,
    ) -> Result<Vec<RemoteEvent>>;

    /// Create a secondary calendar and return its id.
    async fn create_calendar(&self, summary: &str, time_zone: &str) -> Result<String>;

    /// Insert an event and return its id.
    async fn insert_event(&self, calendar_id: &str, event: &ProposedEvent, time_zone: &str) -> Result<String>;
}

/// OAuth client credentials of this application.
#[derive(Clone)]
pub struct GoogleCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Client for interacting with Google Calendar API
pub struct GoogleCalendarClient {
    hub: CalendarHub<HttpsConnector<HttpConnector>>,
}

impl GoogleCalendarClient {
    /// Build a client acting as the user who granted `refresh_token`.
    pub async fn for_user(credentials: &GoogleCredentials, refresh_token: &str) -> Result<Self> {
        // Use the yup_oauth2 re-exported by google_calendar3 to avoid version mismatch
        let secret = google_calendar3::yup_oauth2::authorized_user::AuthorizedUserSecret {
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            refresh_token: refresh_token.to_string(),
            key_type: "authorized_user".to_string(),
        };

        let auth = google_calendar3::yup_oauth2::AuthorizedUserAuthenticator::builder(secret)
            .build()
            .await
            .context("Failed to build authenticator from refresh token")?;

        let connector = google_calendar3::hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .context("Failed to load native TLS roots")?
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(connector);
        let hub = CalendarHub::new(client, auth);

        Ok(Self { hub })
    }
}

fn to_remote_event(event: Event) -> Option<RemoteEvent> {
    let id = event.id?;
    Some(RemoteEvent {
        id,
        summary: event.summary,
        start: event.start.and_then(|s| s.date_time),
        end: event.end.and_then(|e| e.date_time),
    })
}

fn to_list_entry(entry: google_calendar3::api::CalendarListEntry) -> Option<CalendarListEntry> {
    Some(CalendarListEntry {
        id: entry.id?,
        summary: entry.summary_override.or(entry.summary).unwrap_or_default(),
        description: entry.description,
        time_zone: entry.time_zone,
        color_id: entry.color_id,
        background_color: entry.background_color,
        foreground_color: entry.foreground_color,
    })
}

fn event_time(at: DateTime<Utc>, time_zone: &str) -> EventDateTime {
    EventDateTime {
        date_time: Some(at),
        time_zone: Some(time_zone.to_string()),
        ..Default::default()
    }
}

#[async_trait]
impl CalendarApi for GoogleCalendarClient {
    async fn list_calendars(&self) -> Result<Vec<CalendarListEntry>> {
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut call = self.hub.calendar_list().list();
            if let Some(token) = &page_token {
                call = call.page_token(token);
            }
            let (_, page) = call.doit().await.context("Failed to list calendars")?;

            entries.extend(page.items.unwrap_or_default().into_iter().filter_map(to_list_entry));

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        tracing::debug!("Fetched {} calendars", entries.len());
        Ok(entries)
    }

    async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        max_results: i32,
    ) -> Result<Vec<RemoteEvent>> {
        let limit = usize::try_from(max_results).unwrap_or(0);
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        while events.len() < limit {
            let mut call = self
                .hub
                .events()
                .list(calendar_id)
                .time_min(time_min)
                .time_max(time_max)
                .single_events(true)
                .order_by("startTime")
                .max_results(max_results);
            if let Some(token) = &page_token {
                call = call.page_token(token);
            }

            let (_, page) = call
                .doit()
                .await
                .with_context(|| format!("Failed to list events of calendar {}", calendar_id))?;

            events.extend(page.items.unwrap_or_default().into_iter().filter_map(to_remote_event));

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        events.truncate(limit);
        Ok(events)
    }

    async fn create_calendar(&self, summary: &str, time_zone: &str) -> Result<String> {
        let calendar = Calendar {
            summary: Some(summary.to_string()),
            time_zone: Some(time_zone.to_string()),
            ..Default::default()
        };

        let (_, created) = self
            .hub
            .calendars()
            .insert(calendar)
            .doit()
            .await
            .context("Failed to create calendar")?;

        let id = created.id.context("Created calendar has no id")?;
        tracing::info!("Created calendar '{}' with ID: {}", summary, id);
        Ok(id)
    }

    async fn insert_event(&self, calendar_id: &str, event: &ProposedEvent, time_zone: &str) -> Result<String> {
        let google_event = Event {
            summary: Some(event.title.clone()),
            description: (!event.description.is_empty()).then(|| event.description.clone()),
            start: Some(event_time(event.start, time_zone)),
            end: Some(event_time(event.end, time_zone)),
            ..Default::default()
        };

        let (_, created) = self
            .hub
            .events()
            .insert(google_event, calendar_id)
            .doit()
            .await
            .context("Failed to create calendar event")?;

        let id = created.id.context("Created event has no id")?;
        tracing::info!("Created calendar event: {} (id: {})", event.title, id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    #[test]
    fn test_all_day_events_have_no_instants() {
        let all_day = Event {
            id: Some("holiday".to_string()),
            summary: Some("Labor Day".to_string()),
            start: Some(EventDateTime {
                date: NaiveDate::from_ymd_opt(2025, 9, 1),
                ..Default::default()
            }),
            end: Some(EventDateTime {
                date: NaiveDate::from_ymd_opt(2025, 9, 2),
                ..Default::default()
            }),
            ..Default::default()
        };

        let remote = to_remote_event(all_day).unwrap();
        assert_eq!(remote.start, None);
        assert_eq!(remote.end, None);
    }

    #[test]
    fn test_timed_event_keeps_instants() {
        let start = Utc.with_ymd_and_hms(2025, 9, 15, 16, 0, 0).unwrap();
        let timed = Event {
            id: Some("standup".to_string()),
            start: Some(event_time(start, "UTC")),
            end: Some(event_time(start + chrono::Duration::minutes(15), "UTC")),
            ..Default::default()
        };

        let remote = to_remote_event(timed).unwrap();
        assert_eq!(remote.start, Some(start));
        assert_eq!(remote.summary, None);

        assert_eq!(to_remote_event(Event::default()), None);
    }

    #[test]
    fn test_summary_override_wins() {
        let entry = google_calendar3::api::CalendarListEntry {
            id: Some("team@group.calendar.google.com".to_string()),
            summary: Some("Team".to_string()),
            summary_override: Some("My team".to_string()),
            background_color: Some("#9fe1e7".to_string()),
            ..Default::default()
        };

        let converted = to_list_entry(entry).unwrap();
        assert_eq!(converted.summary, "My team");
        assert_eq!(converted.background_color.as_deref(), Some("#9fe1e7"));
    }
}
