use anyhow::Context;
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use dagr_core::layout::{layout_week, supported_week_start, LayoutConfig};
use dagr_core::{
    CalendarEvent, CreateGoalRequest, Goal, PlanRequest, PlanResponse, UpdateGoalRequest,
    UserConfig,
};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "dagr-cli")]
#[command(about = "CLI for the Dagr weekly planner")]
#[command(
    long_about = "A command-line interface for the Dagr backend server.\n\n\
    Manage goals, inspect your configuration and ask the planner to fill your week.\n\
    The layout command runs the calendar layout engine locally on a JSON file of events."
)]
struct Cli {
    /// Backend server URL to connect to.
    #[arg(
        short,
        long,
        default_value = "http://localhost:3000",
        env = "DAGR_API_URL"
    )]
    base_url: String,

    /// Session token, sent as a bearer token.
    ///
    /// Copy the value of the auth_token cookie after signing in through the browser.
    #[arg(short, long, env = "DAGR_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage goals - create, list, update and delete
    Goals {
        #[command(subcommand)]
        action: GoalAction,
    },
    /// Inspect your user configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Ask the planner to schedule this week
    ///
    /// Each message is passed to the scheduling agent as its own turn.
    /// Proposed events are written to your Dagr calendar.
    Plan {
        #[arg(required = true, value_name = "MESSAGE")]
        messages: Vec<String>,
    },
    /// Lay out a week of events locally and print the placements
    Layout {
        /// JSON file holding an array of calendar events.
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Any day of the week to lay out. Defaults to today.
        #[arg(short, long, value_name = "YYYY-MM-DD")]
        date: Option<NaiveDate>,

        /// IANA time zone the grid is drawn in.
        #[arg(
            long,
            default_value = "America/Los_Angeles",
            env = "DAGR_TIMEZONE"
        )]
        timezone: String,
    },
}

#[derive(Subcommand)]
enum GoalAction {
    /// List active goals, highest priority first
    List,

    /// Create a new goal
    Create {
        title: String,

        #[arg(short, long, value_name = "TEXT")]
        description: Option<String>,

        /// Higher numbers are scheduled first.
        #[arg(short, long)]
        priority: Option<i32>,
    },

    /// Update an existing goal. Only specified fields change.
    Update {
        id: Uuid,

        #[arg(short, long, value_name = "TEXT")]
        title: Option<String>,

        #[arg(short, long, value_name = "TEXT")]
        description: Option<String>,

        /// Progress between 0 and 100.
        #[arg(long)]
        progress: Option<f64>,

        #[arg(long)]
        priority: Option<i32>,

        /// Use --completed=true to mark as done, --completed=false to reopen.
        #[arg(short, long, value_name = "BOOL")]
        completed: Option<bool>,
    },

    /// Delete a goal
    Delete { id: Uuid },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print preferences and linked calendars
    Show,
}

struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

async fn send(builder: RequestBuilder) -> anyhow::Result<reqwest::Response> {
    let response = builder.send().await.context("Failed to reach the Dagr server")?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("Request failed with {}: {}", status, body);
    }
    Ok(response)
}

async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> anyhow::Result<T> {
    let response = send(builder).await?;
    response.json().await.context("Unexpected response body")
}

fn short_id(id: &Uuid) -> String {
    id.to_string()[..8].to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let api = ApiClient {
        client: Client::new(),
        base_url: cli.base_url,
        token: cli.token,
    };

    match cli.command {
        Commands::Goals { action } => handle_goals(&api, action).await?,
        Commands::Config { action } => handle_config(&api, action).await?,
        Commands::Plan { messages } => handle_plan(&api, messages).await?,
        Commands::Layout {
            file,
            date,
            timezone,
        } => handle_layout(&file, date, &timezone)?,
    }

    Ok(())
}

fn print_goal(goal: &Goal) {
    let status = if goal.is_completed() { "✓" } else { "○" };
    println!(
        "{} [{}] {} (priority {}, {:.0}%)",
        status,
        short_id(&goal.id),
        goal.title,
        goal.priority,
        goal.progress
    );
    if let Some(desc) = &goal.description {
        println!("    {}", desc);
    }
}

async fn handle_goals(api: &ApiClient, action: GoalAction) -> anyhow::Result<()> {
    match action {
        GoalAction::List => {
            let goals: Vec<Goal> = send_json(api.request(Method::GET, "/api/goals")).await?;
            if goals.is_empty() {
                println!("No goals found.");
            }
            for goal in &goals {
                print_goal(goal);
            }
        }
        GoalAction::Create {
            title,
            description,
            priority,
        } => {
            let req = CreateGoalRequest {
                title,
                description,
                priority,
            };
            let goal: Goal = send_json(api.request(Method::POST, "/api/goals").json(&req)).await?;
            println!("Created goal: [{}] {}", short_id(&goal.id), goal.title);
        }
        GoalAction::Update {
            id,
            title,
            description,
            progress,
            priority,
            completed,
        } => {
            let req = UpdateGoalRequest {
                title,
                description,
                progress,
                priority,
                completed,
            };
            let goal: Goal = send_json(
                api.request(Method::PUT, &format!("/api/goals/{}", id))
                    .json(&req),
            )
            .await?;
            print_goal(&goal);
        }
        GoalAction::Delete { id } => {
            send(api.request(Method::DELETE, &format!("/api/goals/{}", id))).await?;
            println!("Deleted goal: {}", id);
        }
    }

    Ok(())
}

async fn handle_config(api: &ApiClient, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config: UserConfig = send_json(api.request(Method::GET, "/api/user-config")).await?;
            println!("Persona:     {}", config.preferences.user_persona);
            println!("Motivations: {}", config.preferences.motivations);
            match &config.dagr_calendar_id {
                Some(id) => println!("Dagr calendar: {}", id),
                None => println!("Dagr calendar: not created yet"),
            }
            println!("Calendars:");
            for calendar in &config.calendars.items {
                println!(
                    "  {} ({}) color: {}",
                    calendar.summary,
                    calendar.id,
                    calendar.background_color.as_deref().unwrap_or("none")
                );
            }
        }
    }

    Ok(())
}

async fn handle_plan(api: &ApiClient, messages: Vec<String>) -> anyhow::Result<()> {
    let req = PlanRequest { messages };
    let plan: PlanResponse = send_json(api.request(Method::POST, "/api/planner").json(&req)).await?;

    println!("Created {} events:", plan.created.len());
    for event in &plan.created {
        println!(
            "  {} - {}  {}",
            event.start.format("%a %H:%M"),
            event.end.format("%a %H:%M"),
            event.title
        );
    }
    if !plan.failed.is_empty() {
        println!("Failed to create {} events:", plan.failed.len());
        for failure in &plan.failed {
            println!("  {}: {}", failure.title, failure.error);
        }
    }

    Ok(())
}

fn handle_layout(file: &Path, date: Option<NaiveDate>, timezone: &str) -> anyhow::Result<()> {
    let tz: Tz = timezone
        .parse()
        .map_err(|_| anyhow::anyhow!("'{}' is not an IANA time zone", timezone))?;

    let content = std::fs::read_to_string(file).context("Failed to read events file")?;
    let events: Vec<CalendarEvent> =
        serde_json::from_str(&content).context("Failed to parse events JSON")?;

    let date = date.unwrap_or_else(|| Utc::now().with_timezone(&tz).date_naive());
    if supported_week_start(date).is_none() {
        anyhow::bail!("{} is too close to the end of the calendar to lay out", date);
    }
    let layout = layout_week(&events, date, &tz, &LayoutConfig::default());

    println!("Week of {} ({})", layout.week_start, tz);
    for day in &layout.days {
        println!("{}", day.date.format("%A %Y-%m-%d"));
        if day.placements.is_empty() {
            println!("  (no events)");
        }
        for placement in &day.placements {
            let flag = if placement.degenerate { " [degenerate]" } else { "" };
            println!(
                "  {:<24} lane {}/{}  {}{}",
                placement.event_id,
                placement.lane + 1,
                placement.lanes,
                placement.css(),
                flag
            );
        }
    }

    Ok(())
}
