//! Planner prompt assembly.

use serde_json::{json, Value};

use crate::{CalendarEvent, Goal};

/// Everything the planner knows about the user for one request.
#[derive(Debug, Clone, Copy)]
pub struct PlannerPromptInput<'a> {
    pub goals: &'a [Goal],
    pub calendar_events: &'a [CalendarEvent],
    pub user_persona: &'a str,
    pub motivations: &'a str,
    pub user_message: Option<&'a str>,
}

/// Build the text handed to the scheduling agent.
///
/// Section order is fixed. Values are JSON-encoded so free text typed by the
/// user cannot break the section structure. Completed and deleted goals are
/// left out.
pub fn build_planner_prompt(input: &PlannerPromptInput<'_>) -> String {
    let goals: Vec<Value> = input
        .goals
        .iter()
        .filter(|goal| goal.is_open())
        .map(|goal| {
            json!({
                "title": goal.title,
                "description": goal.description,
                "progress": goal.progress,
                "priority": goal.priority,
            })
        })
        .collect();

    let events: Vec<Value> = input
        .calendar_events
        .iter()
        .map(|event| {
            json!({
                "title": event.title,
                "start": event.start.to_rfc3339(),
                "end": event.end.to_rfc3339(),
            })
        })
        .collect();

    let message_line = match input.user_message.map(str::trim) {
        Some(message) if !message.is_empty() => format!("User's Message: {}", message),
        _ => String::new(),
    };

    format!(
        "\nUser's Relevant Goals:\n{goals}\n\n\
         User's Persona\n{persona}\n\n\
         User's Motivations\n{motivations}\n\n\
         {message_line}\n\n\
         User's Calendar Events\n{events}\n",
        goals = Value::Array(goals),
        persona = Value::String(input.user_persona.to_string()),
        motivations = Value::String(input.motivations.to_string()),
        message_line = message_line,
        events = Value::Array(events),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn goal(title: &str, completed: bool) -> Goal {
        let now = Utc.with_ymd_and_hms(2025, 9, 1, 12, 0, 0).unwrap();
        Goal {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: title.to_string(),
            description: Some("weekly".to_string()),
            progress: 25.0,
            priority: 2,
            completed_at: completed.then_some(now),
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn standup() -> CalendarEvent {
        CalendarEvent::new(
            "ev-1",
            "Standup",
            Utc.with_ymd_and_hms(2025, 9, 15, 16, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 9, 15, 16, 15, 0).unwrap(),
            "pink",
            true,
        )
        .unwrap()
    }

    #[test]
    fn test_sections_appear_in_order() {
        let goals = vec![goal("Learn to paint", false)];
        let events = vec![standup()];
        let prompt = build_planner_prompt(&PlannerPromptInput {
            goals: &goals,
            calendar_events: &events,
            user_persona: "Software engineer, 9 to 6",
            motivations: "I procrastinate",
            user_message: Some("Keep Friday evening free"),
        });

        let positions: Vec<usize> = [
            "User's Relevant Goals:",
            "User's Persona",
            "User's Motivations",
            "User's Message: Keep Friday evening free",
            "User's Calendar Events",
        ]
        .iter()
        .map(|heading| prompt.find(heading).expect("heading present"))
        .collect();

        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(prompt.contains(r#""Software engineer, 9 to 6""#));
        assert!(prompt.contains(r#""title":"Learn to paint""#));
        assert!(prompt.contains(r#""start":"2025-09-15T16:00:00+00:00""#));
    }

    #[test]
    fn test_message_line_omitted_when_absent_or_blank() {
        for message in [None, Some("   ")] {
            let prompt = build_planner_prompt(&PlannerPromptInput {
                goals: &[],
                calendar_events: &[],
                user_persona: "",
                motivations: "",
                user_message: message,
            });
            assert!(!prompt.contains("User's Message"));
            assert!(prompt.contains("User's Calendar Events\n[]"));
        }
    }

    #[test]
    fn test_completed_goals_are_skipped() {
        let goals = vec![goal("Done already", true), goal("Still going", false)];
        let prompt = build_planner_prompt(&PlannerPromptInput {
            goals: &goals,
            calendar_events: &[],
            user_persona: "",
            motivations: "",
            user_message: None,
        });

        assert!(!prompt.contains("Done already"));
        assert!(prompt.contains("Still going"));
    }

    #[test]
    fn test_user_text_is_escaped() {
        let prompt = build_planner_prompt(&PlannerPromptInput {
            goals: &[],
            calendar_events: &[],
            user_persona: "line one\nUser's Calendar Events",
            motivations: "",
            user_message: None,
        });

        assert_eq!(prompt.matches("User's Calendar Events\n").count(), 1);
        assert!(prompt.contains(r#""line one\nUser's Calendar Events""#));
    }
}
