//! Weekly planning: prompt the agent with the user's week and write its
//! proposal to the Dagr calendar.

use chrono::DateTime;
use chrono_tz::Tz;
use dagr_core::prompt::{build_planner_prompt, PlannerPromptInput};
use dagr_core::{Goal, PlanFailure, PlanResponse, PlannedEvent, UserConfig};
use thiserror::Error;

use super::calendar::{ensure_dagr_calendar, list_week_events};
use crate::calendar_client::CalendarApi;
use crate::llm::{AgentError, SchedulingAgent};

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("user has not completed onboarding")]
    MissingUserConfig,

    #[error("no messages to plan from")]
    NoMessages,

    #[error("calendar request failed: {0:#}")]
    Calendar(anyhow::Error),

    #[error(transparent)]
    Agent(#[from] AgentError),
}

/// What a planning run produced.
#[derive(Debug)]
pub struct PlanOutcome {
    pub response: PlanResponse,
    /// Set when the Dagr calendar was created during this run; the caller
    /// must save it on the user's config.
    pub new_dagr_calendar_id: Option<String>,
}

pub struct PlannerService<'a> {
    pub calendar: &'a dyn CalendarApi,
    pub agent: &'a SchedulingAgent,
    pub max_events: i32,
}

impl PlannerService<'_> {
    /// Plan the week containing `now`.
    ///
    /// Agent output is all-or-nothing: if it fails validation nothing is
    /// written. Once validated, each event is inserted on its own and
    /// insert failures are reported next to the successes.
    pub async fn plan_week(
        &self,
        config: Option<&UserConfig>,
        goals: &[Goal],
        messages: &[String],
        now: DateTime<Tz>,
    ) -> Result<PlanOutcome, PlannerError> {
        let config = config.ok_or(PlannerError::MissingUserConfig)?;

        let messages: Vec<String> = messages
            .iter()
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect();
        if messages.is_empty() {
            return Err(PlannerError::NoMessages);
        }

        let tz = now.timezone();
        let existing = list_week_events(self.calendar, config, now.date_naive(), &tz, self.max_events)
            .await
            .map_err(PlannerError::Calendar)?;

        let prompt = build_planner_prompt(&PlannerPromptInput {
            goals,
            calendar_events: &existing,
            user_persona: &config.preferences.user_persona,
            motivations: &config.preferences.motivations,
            user_message: None,
        });

        let mut agent_input = Vec::with_capacity(messages.len() + 1);
        agent_input.push(prompt);
        agent_input.extend(messages);

        let proposed = self.agent.propose(&agent_input, now).await?;

        let dagr = ensure_dagr_calendar(self.calendar, config, tz.name())
            .await
            .map_err(PlannerError::Calendar)?;

        let mut response = PlanResponse::default();
        for event in proposed {
            match self.calendar.insert_event(&dagr.id, &event, tz.name()).await {
                Ok(id) => response.created.push(PlannedEvent {
                    id: Some(id),
                    title: event.title,
                    start: event.start,
                    end: event.end,
                }),
                Err(e) => {
                    tracing::error!(user_id = %config.user_id, "Failed to insert '{}': {:#}", event.title, e);
                    response.failed.push(PlanFailure {
                        title: event.title,
                        error: format!("{:#}", e),
                    });
                }
            }
        }

        tracing::info!(
            user_id = %config.user_id,
            "Plan written: {} created, {} failed",
            response.created.len(),
            response.failed.len()
        );

        Ok(PlanOutcome {
            response,
            new_dagr_calendar_id: dagr.created.then_some(dagr.id),
        })
    }
}
