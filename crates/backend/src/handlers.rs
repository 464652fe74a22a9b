use axum::{
    extract::{Extension, Json, Path, Query, State},
    http::StatusCode,
};
use chrono::{NaiveDate, Utc};
use dagr_core::layout::{layout_week, supported_week_start, LayoutConfig, WeekLayout};
use dagr_core::{
    CalendarEvent, CreateGoalRequest, CreateUserConfigRequest, Goal, JsonWrapper,
    OnboardingStatus, PlanRequest, PlanResponse, UpdateGoalRequest, UpdateUserConfigRequest,
    UserConfig, WeekQuery,
};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::calendar_client::GoogleCalendarClient;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::{NewUserConfig, UserConfigChangeset};
use crate::repository::{Goals, Repository};
use crate::services::calendar::{fetch_calendar_list, list_week_events};
use crate::services::planner::{PlannerError, PlannerService};
use crate::AppState;

pub async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Build a calendar client acting as `user_id`.
async fn calendar_client(state: &AppState, user_id: Uuid) -> ApiResult<GoogleCalendarClient> {
    let user = {
        let mut conn = db::get_conn(&state.pool).await?;
        db::users::get_by_id(&mut conn, user_id).await?
    };

    let refresh_token = user.google_refresh_token.ok_or_else(|| {
        ApiError::Forbidden("Google Calendar access has not been granted, sign in again".to_string())
    })?;

    GoogleCalendarClient::for_user(&state.google, &refresh_token)
        .await
        .map_err(ApiError::upstream)
}

async fn require_user_config(state: &AppState, user_id: Uuid) -> ApiResult<UserConfig> {
    let mut conn = db::get_conn(&state.pool).await?;
    db::user_configs::get_by_user(&mut conn, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User config"))
}

// Goal handlers

pub async fn list_goals(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Goal>>> {
    let mut conn = db::get_conn(&state.pool).await?;
    let goals = Goals::list(&mut conn, user.id).await?;
    Ok(Json(goals))
}

pub async fn create_goal(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateGoalRequest>,
) -> ApiResult<(StatusCode, Json<Goal>)> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::bad_request("Goal title cannot be empty"));
    }

    let mut conn = db::get_conn(&state.pool).await?;
    let goal = Goals::create(&mut conn, user.id, payload).await?;
    tracing::info!(user_id = %user.id, goal_id = %goal.id, "Created goal");

    Ok((StatusCode::CREATED, Json(goal)))
}

pub async fn update_goal(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(goal_id): Path<Uuid>,
    Json(payload): Json<UpdateGoalRequest>,
) -> ApiResult<Json<Goal>> {
    payload.validate().map_err(ApiError::BadRequest)?;

    let mut conn = db::get_conn(&state.pool).await?;
    let goal = Goals::update(&mut conn, user.id, goal_id, payload)
        .await?
        .ok_or_else(|| ApiError::not_found("Goal"))?;

    Ok(Json(goal))
}

pub async fn delete_goal(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(goal_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let mut conn = db::get_conn(&state.pool).await?;
    if !Goals::delete(&mut conn, user.id, goal_id).await? {
        return Err(ApiError::not_found("Goal"));
    }

    tracing::info!(user_id = %user.id, goal_id = %goal_id, "Deleted goal");
    Ok(StatusCode::NO_CONTENT)
}

// User config handlers

pub async fn get_user_config(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<UserConfig>> {
    let config = require_user_config(&state, user.id).await?;
    Ok(Json(config))
}

/// Finish onboarding. The calendar list is filled in by a background sync.
pub async fn create_user_config(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateUserConfigRequest>,
) -> ApiResult<(StatusCode, Json<UserConfig>)> {
    let mut conn = db::get_conn(&state.pool).await?;
    let config = db::user_configs::create(
        &mut conn,
        NewUserConfig {
            user_id: user.id,
            preferences: JsonWrapper::new(payload.preferences.unwrap_or_default()),
            calendars: JsonWrapper::default(),
        },
    )
    .await?
    .ok_or_else(|| ApiError::conflict("User config already exists"))?;

    tracing::info!(user_id = %user.id, "User completed onboarding");

    let sync_state = state.clone();
    let user_id = user.id;
    tokio::spawn(async move {
        match sync_calendars_for(&sync_state, user_id).await {
            Ok(config) => tracing::info!(
                user_id = %user_id,
                "Background calendar sync found {} calendars",
                config.calendars.items.len()
            ),
            Err(e) => tracing::error!(user_id = %user_id, "Background calendar sync failed: {}", e),
        }
    });

    Ok((StatusCode::CREATED, Json(config)))
}

pub async fn update_user_config(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<UpdateUserConfigRequest>,
) -> ApiResult<Json<UserConfig>> {
    if payload.preferences.is_none() && payload.calendars.is_none() {
        return Err(ApiError::bad_request("No fields to update"));
    }

    let changes = UserConfigChangeset {
        preferences: payload.preferences.map(JsonWrapper::new),
        calendars: payload.calendars.map(JsonWrapper::new),
        ..Default::default()
    };

    let mut conn = db::get_conn(&state.pool).await?;
    let config = db::user_configs::update(&mut conn, user.id, changes)
        .await?
        .ok_or_else(|| ApiError::not_found("User config"))?;

    Ok(Json(config))
}

pub async fn sync_calendars(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<UserConfig>> {
    let config = sync_calendars_for(&state, user.id).await?;
    Ok(Json(config))
}

/// Replace the stored calendar list with the user's current Google list.
async fn sync_calendars_for(state: &AppState, user_id: Uuid) -> ApiResult<UserConfig> {
    let client = calendar_client(state, user_id).await?;
    let calendars = fetch_calendar_list(&client).await.map_err(ApiError::upstream)?;

    let changes = UserConfigChangeset {
        calendars: Some(JsonWrapper::new(calendars)),
        ..Default::default()
    };

    let mut conn = db::get_conn(&state.pool).await?;
    db::user_configs::update(&mut conn, user_id, changes)
        .await?
        .ok_or_else(|| ApiError::not_found("User config"))
}

pub async fn get_onboarding_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<OnboardingStatus>> {
    let mut conn = db::get_conn(&state.pool).await?;
    let complete = db::user_configs::exists(&mut conn, user.id).await?;
    Ok(Json(OnboardingStatus { complete }))
}

// Calendar handlers

async fn fetch_week(
    state: &AppState,
    user_id: Uuid,
    query: WeekQuery,
) -> ApiResult<(NaiveDate, Vec<CalendarEvent>)> {
    let tz = state.config.time_zone;
    let week_of = checked_week_of(
        query
            .week_of
            .unwrap_or_else(|| Utc::now().with_timezone(&tz).date_naive()),
    )?;

    let config = require_user_config(state, user_id).await?;
    let client = calendar_client(state, user_id).await?;
    let events = list_week_events(&client, &config, week_of, &tz, state.config.max_events)
        .await
        .map_err(ApiError::upstream)?;

    Ok((week_of, events))
}

fn checked_week_of(week_of: NaiveDate) -> ApiResult<NaiveDate> {
    supported_week_start(week_of)
        .map(|_| week_of)
        .ok_or_else(|| ApiError::bad_request(format!("week_of {} is out of range", week_of)))
}

pub async fn get_week_events(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<WeekQuery>,
) -> ApiResult<Json<Vec<CalendarEvent>>> {
    let (_, events) = fetch_week(&state, user.id, query).await?;
    Ok(Json(events))
}

pub async fn get_week_layout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<WeekQuery>,
) -> ApiResult<Json<WeekLayout>> {
    let (week_of, events) = fetch_week(&state, user.id, query).await?;
    let layout = layout_week(&events, week_of, &state.config.time_zone, &LayoutConfig::default());
    Ok(Json(layout))
}

// Planner handlers

pub async fn plan_week(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<PlanRequest>,
) -> ApiResult<Json<PlanResponse>> {
    let (config, goals) = {
        let mut conn = db::get_conn(&state.pool).await?;
        let config = db::user_configs::get_by_user(&mut conn, user.id).await?;
        let goals = Goals::list(&mut conn, user.id).await?;
        (config, goals)
    };
    let Some(config) = config else {
        return Err(PlannerError::MissingUserConfig.into());
    };

    let client = calendar_client(&state, user.id).await?;
    let planner = PlannerService {
        calendar: &client,
        agent: state.agent.as_ref(),
        max_events: state.config.max_events,
    };

    let now = Utc::now().with_timezone(&state.config.time_zone);
    let outcome = planner
        .plan_week(Some(&config), &goals, &payload.messages, now)
        .await?;

    if let Some(calendar_id) = outcome.new_dagr_calendar_id {
        let mut conn = db::get_conn(&state.pool).await?;
        // The events are already written, so report them even if this fails.
        match db::user_configs::set_dagr_calendar_if_unset(&mut conn, user.id, &calendar_id).await {
            Ok(true) => tracing::info!(user_id = %user.id, "Saved new Dagr calendar {}", calendar_id),
            Ok(false) => tracing::warn!(
                user_id = %user.id,
                "Dagr calendar {} is redundant, another request already saved one",
                calendar_id
            ),
            Err(e) => tracing::error!(user_id = %user.id, "Failed to save Dagr calendar id: {:#}", e),
        }
    }

    Ok(Json(outcome.response))
}
