//! Two-stage scheduling agent.
//!
//! The analyzer turns the planner prompt into a free-text, day-by-day
//! schedule. The structurer rewrites that text as JSON, which is then
//! validated and resolved in the user's time zone.

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono_tz::Tz;
use dagr_core::agent::{parse_schedule, schedule_json_schema, AgentOutputError, ProposedEvent};
use thiserror::Error;

use super::{ChatMessage, ChatModel, ChatRequest, LlmError};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("scheduling model failed: {0}")]
    Model(#[from] LlmError),

    #[error(transparent)]
    Output(#[from] AgentOutputError),
}

fn analyzer_instructions(today: &str) -> String {
    format!(
        "You will be provided with a user's preferences, motivations, goals and current \
         calendar events for the upcoming week. Analyze this information and create a \
         personalized weekly schedule that makes room for their goals around their \
         existing commitments.\n\
         \n\
         Today is {today}\n\
         \n\
         Instructions:\n\
         - Review the user's stated preferences, motivations and goals\n\
         - Identify gaps in their current calendar\n\
         - Suggest specific time blocks for activities that move their goals forward\n\
         - Never overlap an existing calendar event\n\
         - Format your output as a day-by-day schedule\n\
         \n\
         Output Format:\n\
         [Monday: 5:00pm-6:00pm work on side project, 8:00pm-10:00pm gather visa evidence]\n\
         [Tuesday: 7:00pm-8:00pm try painting, 9:00pm-10:00pm work on side project]\n\
         [Wednesday: ...]",
        today = today
    )
}

fn structurer_instructions(today: &str) -> String {
    format!(
        "Today is {today}. You are an expert at taking unstructured text and converting it \
         into a structured JSON format. Use the dates of the current week for day names. \
         Reply with a single JSON object and nothing else.",
        today = today
    )
}

fn structurer_prompt(schedule_text: &str) -> String {
    format!(
        "Here is the unstructured schedule text:\n\n{}\n\n\
         Please convert this into a structured JSON format with the following fields for \
         each event: startDay (YYYY-MM-DD), startTime (HH:MM 24-hour), endDay (YYYY-MM-DD), \
         endTime (HH:MM 24-hour), title, description, summary.",
        schedule_text
    )
}

pub struct SchedulingAgent {
    model: Arc<dyn ChatModel>,
    max_retries: u32,
    backoff: Duration,
}

impl SchedulingAgent {
    pub fn new(model: Arc<dyn ChatModel>, max_retries: u32, backoff: Duration) -> Self {
        Self {
            model,
            max_retries,
            backoff,
        }
    }

    /// Run both stages and return validated events in `now`'s time zone.
    ///
    /// Each message becomes its own user turn for the analyzer.
    pub async fn propose(
        &self,
        messages: &[String],
        now: DateTime<Tz>,
    ) -> Result<Vec<ProposedEvent>, AgentError> {
        let today = now.format("%A, %B %-d, %Y %H:%M %Z").to_string();

        let mut analyzer_messages = vec![ChatMessage::system(analyzer_instructions(&today))];
        analyzer_messages.extend(messages.iter().map(|m| ChatMessage::user(m.as_str())));

        let schedule_text = self
            .complete_with_retries(
                "analyzer",
                &ChatRequest {
                    messages: analyzer_messages,
                    response_schema: None,
                },
            )
            .await?;
        tracing::debug!("Analyzer produced {} characters", schedule_text.len());

        let structured = self
            .complete_with_retries(
                "structurer",
                &ChatRequest {
                    messages: vec![
                        ChatMessage::system(structurer_instructions(&today)),
                        ChatMessage::user(structurer_prompt(&schedule_text)),
                    ],
                    response_schema: Some(schedule_json_schema()),
                },
            )
            .await?;

        let draft = parse_schedule(&structured)?;
        let events = draft.resolve(&now.timezone())?;

        tracing::info!("Scheduling agent proposed {} events", events.len());
        Ok(events)
    }

    async fn complete_with_retries(&self, stage: &str, request: &ChatRequest) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            match self.model.complete(request).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        "{} call failed (attempt {}/{}): {}",
                        stage,
                        attempt,
                        self.max_retries + 1,
                        e
                    );
                    tokio::time::sleep(self.backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
