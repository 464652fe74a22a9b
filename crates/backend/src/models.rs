// Database models for Diesel
use chrono::{DateTime, Utc};
use dagr_core::{CalendarList, JsonWrapper, Preferences, UpdateGoalRequest, UserConfig};
use diesel::prelude::*;
use uuid::Uuid;

/// A signed-in account with the Google tokens granted at login.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub google_refresh_token: Option<String>,
    pub google_access_token: Option<String>,
    pub google_token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database representation of user_configs.
/// `preferences` and `calendars` are JSON stored as TEXT.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::user_configs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserConfigRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub preferences: JsonWrapper<Preferences>,
    pub calendars: JsonWrapper<CalendarList>,
    pub dagr_calendar_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserConfigRow> for UserConfig {
    fn from(row: UserConfigRow) -> Self {
        UserConfig {
            id: row.id,
            user_id: row.user_id,
            preferences: row.preferences.into_inner(),
            calendars: row.calendars.into_inner(),
            dagr_calendar_id: row.dagr_calendar_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::user_configs)]
pub struct NewUserConfig {
    pub user_id: Uuid,
    pub preferences: JsonWrapper<Preferences>,
    pub calendars: JsonWrapper<CalendarList>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::goals)]
pub struct NewGoal<'a> {
    pub user_id: Uuid,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub priority: i32,
}

/// Partial goal update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = crate::schema::goals)]
pub struct GoalChangeset<'a> {
    pub title: Option<&'a str>,
    pub description: Option<Option<&'a str>>,
    pub progress: Option<f64>,
    pub priority: Option<i32>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<'a> GoalChangeset<'a> {
    /// `completed: true` stamps `completed_at`, `completed: false` clears it.
    pub fn from_request(req: &'a UpdateGoalRequest, now: DateTime<Utc>) -> Self {
        Self {
            title: req.title.as_deref().map(str::trim),
            description: req.description.as_deref().map(Some),
            progress: req.progress,
            priority: req.priority,
            completed_at: req.completed.map(|done| done.then_some(now)),
            updated_at: Some(now),
        }
    }
}

/// Partial user config update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = crate::schema::user_configs)]
pub struct UserConfigChangeset {
    pub preferences: Option<JsonWrapper<Preferences>>,
    pub calendars: Option<JsonWrapper<CalendarList>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_goal_changeset_maps_completed_flag() {
        let now = Utc.with_ymd_and_hms(2025, 9, 17, 12, 0, 0).unwrap();

        let done = UpdateGoalRequest {
            completed: Some(true),
            ..Default::default()
        };
        assert_eq!(GoalChangeset::from_request(&done, now).completed_at, Some(Some(now)));

        let reopened = UpdateGoalRequest {
            completed: Some(false),
            ..Default::default()
        };
        assert_eq!(GoalChangeset::from_request(&reopened, now).completed_at, Some(None));

        let untouched = UpdateGoalRequest {
            title: Some("  Run a 10k ".to_string()),
            ..Default::default()
        };
        let changes = GoalChangeset::from_request(&untouched, now);
        assert_eq!(changes.completed_at, None);
        assert_eq!(changes.title, Some("Run a 10k"));
        assert_eq!(changes.updated_at, Some(now));
    }
}
