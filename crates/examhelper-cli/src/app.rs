//! Application state for one bootstrap of the examhelper shell.
//!
//! An `App` owns everything built at startup: config, session storage, the
//! API client and its session event subscription. When the server rejects
//! the session, the shell drops the whole `App` and bootstraps a new one.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use tokio::io::{BufReader, Lines, Stdin};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use examhelper_core::models::{
    format_duration, DEFAULT_DAILY_GOAL_HOURS, DEFAULT_IDIOM_PAGE_SIZE,
};
use examhelper_core::{
    ApiClient, AuthState, Config, Pipeline, Session, SessionEvent, SessionEvents, SessionStore,
};

use crate::commands::{Command, HELP};

pub type Input = Lines<BufReader<Stdin>>;

/// Why a shell run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Quit,
    /// The session was rejected; restart from bootstrap
    Reset,
}

pub struct App {
    config: Config,
    session: Session,
    api: ApiClient,
    events: SessionEvents,
    event_rx: broadcast::Receiver<SessionEvent>,
    /// Username of the session found at bootstrap or after login
    signed_in_as: Option<String>,
}

impl App {
    /// Build all application state from config and persisted storage
    pub fn bootstrap(config: Config) -> Result<Self> {
        debug!(base_url = %config.base_url, storage = ?config.storage, "Bootstrapping");

        let storage = config.open_storage()?;
        let session = Session::new(storage);
        let events = SessionEvents::new();
        let event_rx = events.subscribe();

        let store: Arc<dyn SessionStore> = Arc::new(session.clone());
        let api = ApiClient::from_config(&config, Pipeline::session_aware(store, events.clone()))?;

        let signed_in_as = match session.state() {
            AuthState::Authenticated => session
                .load()
                .map(|d| d.username.unwrap_or_else(|| "(unknown)".to_string())),
            AuthState::Anonymous => None,
        };
        info!(authenticated = signed_in_as.is_some(), "Bootstrap complete");

        Ok(Self {
            config,
            session,
            api,
            events,
            event_rx,
            signed_in_as,
        })
    }

    /// Interactive loop; returns when the user quits or the session is rejected
    pub async fn run(&mut self, input: &mut Input) -> Result<Exit> {
        match &self.signed_in_as {
            Some(name) => println!("Logged in as {}. Type 'help' for commands.", name),
            None => println!("Not logged in. Type 'login' to start, 'help' for commands."),
        }

        loop {
            if let Some(exit) = self.poll_reset() {
                return Ok(exit);
            }

            print!("examhelper> ");
            io::stdout().flush()?;

            tokio::select! {
                biased;
                event = self.event_rx.recv() => {
                    if let Some(exit) = self.on_event(event) {
                        return Ok(exit);
                    }
                }
                line = input.next_line() => {
                    let Some(line) = line.context("Failed to read input")? else {
                        println!();
                        return Ok(Exit::Quit);
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match line.parse::<Command>() {
                        Ok(Command::Quit) => return Ok(Exit::Quit),
                        Ok(command) => {
                            if let Err(e) = self.execute(command, input).await {
                                println!("Error: {:#}", e);
                            }
                        }
                        Err(e) => println!("{}", e),
                    }
                }
            }
        }
    }

    /// Run a single command outside the interactive loop
    pub async fn run_once(&mut self, command: Command, input: &mut Input) -> Result<Exit> {
        if command == Command::Quit {
            return Ok(Exit::Quit);
        }
        let result = self.execute(command, input).await;
        if let Some(exit) = self.poll_reset() {
            return Ok(exit);
        }
        result.map(|_| Exit::Quit)
    }

    fn poll_reset(&mut self) -> Option<Exit> {
        match self.event_rx.try_recv() {
            Ok(event) => self.on_event(Ok(event)),
            Err(_) => None,
        }
    }

    fn on_event(&mut self, event: Result<SessionEvent, RecvError>) -> Option<Exit> {
        match event {
            Ok(SessionEvent::Unauthenticated { status }) => {
                self.events.acknowledge();
                if self.signed_in_as.is_some() {
                    println!("\nYour session is no longer valid ({}). Restarting...", status);
                } else {
                    println!("\nThe server rejected the request ({}). Restarting...", status);
                }
                warn!(%status, "Session rejected, resetting application state");
                Some(Exit::Reset)
            }
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "Session events lagged");
                None
            }
            // Sender lives in self, so the channel can't close under us
            Err(RecvError::Closed) => None,
        }
    }

    async fn execute(&mut self, command: Command, input: &mut Input) -> Result<()> {
        match command {
            Command::Login { username } => self.login(username, input).await,
            Command::Logout => self.logout(),
            Command::Register { username } => self.register(&username).await,
            Command::WhoAmI => self.whoami().await,
            Command::Goal { hours } => self.set_goal(hours).await,
            Command::Tasks => self.list_tasks().await,
            Command::Add { name } => {
                let task = self.api.add_task(self.user_id()?, &name).await?;
                println!("Added task {} ({})", task.name, task.id);
                Ok(())
            }
            Command::Switch { task_id } => {
                self.api.switch_task(self.user_id()?, task_id).await?;
                println!("Switched to task {}", task_id);
                Ok(())
            }
            Command::Delete { task_id } => {
                self.api.delete_task(self.user_id()?, task_id).await?;
                println!("Deleted task {}", task_id);
                Ok(())
            }
            Command::Order { task_ids } => {
                self.api.update_task_order(self.user_id()?, &task_ids).await?;
                println!("Task order saved");
                Ok(())
            }
            Command::Settle => {
                self.api.settle_daily_task(self.user_id()?).await?;
                println!("Today's record settled");
                Ok(())
            }
            Command::CheckIn => self.checkin().await,
            Command::Stats { date } => self.stats(date).await,
            Command::Trend { start, end } => self.trend(start, end).await,
            Command::Rankings { start, end } => {
                let rankings = self.api.fetch_rankings(self.user_id()?, start, end).await?;
                for (key, value) in &rankings.fields {
                    println!("  {}: {}", key, value);
                }
                Ok(())
            }
            Command::Timeline { date } => self.timeline(date).await,
            Command::Idioms { count } => self.idioms(count).await,
            Command::Search { keyword, page } => self.search(&keyword, page).await,
            Command::Status => {
                self.status();
                Ok(())
            }
            Command::Help => {
                println!("{}", HELP);
                Ok(())
            }
            Command::Quit => Ok(()),
        }
    }

    fn user_id(&self) -> Result<i64> {
        match self.session.load().and_then(|d| d.id) {
            Some(id) if self.session.is_authenticated() => Ok(id),
            _ => bail!("Not logged in"),
        }
    }

    async fn login(&mut self, username: Option<String>, input: &mut Input) -> Result<()> {
        let username = match username {
            Some(name) => name,
            None => Self::prompt_username(self.config.last_username.as_deref(), input).await?,
        };
        if username.is_empty() {
            bail!("Username required");
        }
        let password = rpassword::prompt_password("Password: ")?;

        println!("Authenticating...");
        let data = self.api.login(&username, &password).await?;
        if data.bearer_token().is_none() {
            warn!(username = %username, "Server issued no token; requests stay anonymous");
        }
        self.session.save(&data)?;

        self.config.last_username = Some(username.clone());
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }

        info!(username = %username, "Login successful");
        println!("Login successful!");
        self.signed_in_as = Some(username);
        Ok(())
    }

    fn logout(&mut self) -> Result<()> {
        self.session.clear()?;
        self.signed_in_as = None;
        info!("Logged out");
        println!("Logged out.");
        Ok(())
    }

    async fn register(&self, username: &str) -> Result<()> {
        let password = rpassword::prompt_password("Choose a password: ")?;
        let confirm = rpassword::prompt_password("Repeat password: ")?;
        if password != confirm {
            bail!("Passwords do not match");
        }
        let user = self.api.register(username, &password).await?;
        println!("Registered {} (id {}). Use 'login' to sign in.", user.username, user.id);
        Ok(())
    }

    async fn whoami(&self) -> Result<()> {
        let user = self.api.fetch_user(self.user_id()?).await?;
        println!("{} (id {})", user.username, user.id);
        println!("  Daily goal: {}h", user.daily_goal_hours());
        if let Some(created) = user.created_at {
            println!("  Member since: {}", created.format("%Y-%m-%d"));
        }
        if let (Some(task_id), Some(started)) = (user.current_task_id, user.current_task_started_at()) {
            println!(
                "  Current task: {} since {}",
                task_id,
                started.with_timezone(&Local).format("%Y-%m-%d %H:%M")
            );
        }
        Ok(())
    }

    async fn set_goal(&self, hours: i32) -> Result<()> {
        if !(1..=24).contains(&hours) {
            bail!("Goal must be between 1 and 24 hours");
        }
        let user = self.api.update_daily_goal(self.user_id()?, hours).await?;
        println!("Daily goal set to {}h", user.daily_goal_hours());
        Ok(())
    }

    async fn list_tasks(&self) -> Result<()> {
        let tasks = self.api.fetch_tasks(self.user_id()?).await?;
        if tasks.is_empty() {
            println!("No tasks yet. Use 'add <name>' to create one.");
        }
        for task in tasks.iter().filter(|t| t.is_active()) {
            let kind = if task.is_system() { " [system]" } else { "" };
            println!("{:>5}  {}{}", task.id, task.name, kind);
        }
        Ok(())
    }

    async fn checkin(&self) -> Result<()> {
        let status = self.api.fetch_checkin_status(self.user_id()?).await?;
        let goal = status.daily_goal.unwrap_or(DEFAULT_DAILY_GOAL_HOURS);
        println!("Daily goal: {}h", goal);
        for day in &status.status_list {
            let mark = if day.met_goal { "✓" } else { " " };
            println!("  {} {}  {}", mark, day.date, day.duration_display());
        }
        let total: i64 = status.status_list.iter().map(|d| d.duration).sum();
        println!("Total: {}  Streak: {} day(s)", format_duration(total), status.streak());
        Ok(())
    }

    async fn stats(&self, date: Option<NaiveDate>) -> Result<()> {
        let chart = self.api.fetch_pie_chart(self.user_id()?, date).await?;
        if chart.data.is_empty() {
            println!("Nothing recorded.");
            return Ok(());
        }
        for slice in &chart.data {
            println!(
                "{:>10}  {:>5.1}%  {}",
                format_duration(slice.value),
                chart.share(slice) * 100.0,
                slice.name
            );
        }
        println!("{:>10}  total", format_duration(chart.total()));
        Ok(())
    }

    async fn trend(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<()> {
        let chart = self.api.fetch_line_chart(self.user_id()?, start, end).await?;
        for (date, ms) in chart.days() {
            println!("  {}  {}", date, format_duration(ms));
        }
        println!("Total: {}", format_duration(chart.total()));
        Ok(())
    }

    async fn timeline(&self, date: Option<NaiveDate>) -> Result<()> {
        let entries = self.api.fetch_timeline(self.user_id()?, date).await?;
        if entries.is_empty() {
            println!("Nothing recorded.");
        }
        let clock = |t: Option<DateTime<Utc>>| {
            t.map(|t| t.with_timezone(&Local).format("%H:%M").to_string())
                .unwrap_or_else(|| "--:--".to_string())
        };
        for entry in &entries {
            let kind = if entry.is_system { " [system]" } else { "" };
            println!(
                "  {} - {}  {:>9}  {}{}",
                clock(entry.started_at()),
                clock(entry.ended_at()),
                entry.duration_display(),
                entry.task_name,
                kind
            );
        }
        Ok(())
    }

    async fn search(&self, keyword: &str, page: u32) -> Result<()> {
        let results = self
            .api
            .search_idioms(Some(keyword), page, DEFAULT_IDIOM_PAGE_SIZE)
            .await?;
        for idiom in &results.content {
            println!("{}  {}", idiom.word, idiom.definition_display());
        }
        println!(
            "Page {} of {} ({} matches)",
            results.number + 1,
            results.total_pages.max(1),
            results.total_elements
        );
        if results.has_next() {
            println!("More: search {} {}", keyword, page + 1);
        }
        Ok(())
    }

    async fn idioms(&self, count: u32) -> Result<()> {
        for idiom in self.api.fetch_random_idioms(count).await? {
            println!("{}  {}", idiom.word, idiom.definition_display());
            if let Some(example) = idiom.example.as_deref().filter(|e| !e.is_empty()) {
                println!("    e.g. {}", example);
            }
        }
        Ok(())
    }

    fn status(&self) {
        println!("Server:  {}", self.api.base_url());
        println!("Storage: {:?}", self.config.storage);
        match self.session.state() {
            AuthState::Authenticated => println!(
                "Session: authenticated as {}",
                self.signed_in_as.as_deref().unwrap_or("(unknown)")
            ),
            AuthState::Anonymous => println!("Session: anonymous"),
        }
    }

    async fn prompt_username(last: Option<&str>, input: &mut Input) -> Result<String> {
        match last {
            Some(last) => print!("Username [{}]: ", last),
            None => print!("Username: "),
        }
        io::stdout().flush()?;

        let line = input.next_line().await?.unwrap_or_default();
        let line = line.trim();
        Ok(match (line.is_empty(), last) {
            (true, Some(last)) => last.to_string(),
            _ => line.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use examhelper_core::StorageBackend;
    use reqwest::StatusCode;
    use tokio::io::AsyncBufReadExt;

    fn app() -> App {
        App::bootstrap(Config {
            storage: StorageBackend::Memory,
            ..Config::default()
        })
        .unwrap()
    }

    fn stdin() -> Input {
        BufReader::new(tokio::io::stdin()).lines()
    }

    #[tokio::test]
    async fn test_rejected_session_ends_run_with_reset() {
        let mut app = app();
        assert_eq!(app.poll_reset(), None);

        assert!(app.events.request_reset(StatusCode::UNAUTHORIZED));
        assert_eq!(app.poll_reset(), Some(Exit::Reset));
        assert!(!app.events.is_reset_pending());
        assert_eq!(app.poll_reset(), None);
    }

    #[tokio::test]
    async fn test_one_shot_command_reports_reset() {
        let mut app = app();
        let mut input = stdin();
        assert_eq!(app.run_once(Command::Status, &mut input).await.unwrap(), Exit::Quit);

        app.events.request_reset(StatusCode::FORBIDDEN);
        assert_eq!(app.run_once(Command::Status, &mut input).await.unwrap(), Exit::Reset);
    }

    #[tokio::test]
    async fn test_lagged_events_do_not_reset() {
        let mut app = app();
        assert_eq!(app.on_event(Err(RecvError::Lagged(3))), None);
        assert_eq!(app.on_event(Err(RecvError::Closed)), None);
    }
}
