//! Shell command parsing.

use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use examhelper_core::api::DEFAULT_IDIOM_LIMIT;

pub const HELP: &str = "\
Commands:
  login [username]     Log in and store the session
  logout               Clear the stored session
  register <username>  Create an account
  whoami               Show the logged-in user
  goal <hours>         Set the daily study goal
  tasks                List tasks
  add <name>           Add a task
  switch <id>          Switch the current task
  delete <id>          Delete a task
  order <id>...        Set the task display order
  settle               Close today's running task record
  checkin              Show the last 7 days against the goal
  stats [date]         Time per task for a day (YYYY-MM-DD, default today)
  trend [start] [end]  Daily totals over a range (default last 7 days)
  rankings [start] [end]
                       Ranking summary
  timeline [date]      Work sessions for a day
  idioms [count]       Show random idioms
  search <word> [page] Search the idiom dictionary
  status               Show connection and session state
  help                 Show this help
  quit                 Exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { username: Option<String> },
    Logout,
    Register { username: String },
    WhoAmI,
    Goal { hours: i32 },
    Tasks,
    Add { name: String },
    Switch { task_id: i64 },
    Delete { task_id: i64 },
    Order { task_ids: Vec<i64> },
    Settle,
    CheckIn,
    Stats { date: Option<NaiveDate> },
    Trend { start: Option<NaiveDate>, end: Option<NaiveDate> },
    Rankings { start: Option<NaiveDate>, end: Option<NaiveDate> },
    Timeline { date: Option<NaiveDate> },
    Idioms { count: u32 },
    Search { keyword: String, page: u32 },
    Status,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "login" => Command::Login {
                username: (!rest.is_empty()).then(|| rest.to_string()),
            },
            "logout" => Command::Logout,
            "register" => Command::Register {
                username: required(rest, "register <username>")?.to_string(),
            },
            "whoami" => Command::WhoAmI,
            "goal" => Command::Goal {
                hours: parse_arg(rest, "goal <hours>")?,
            },
            "tasks" | "ls" => Command::Tasks,
            "add" => Command::Add {
                name: required(rest, "add <name>")?.to_string(),
            },
            "switch" => Command::Switch {
                task_id: parse_arg(rest, "switch <id>")?,
            },
            "delete" | "rm" => Command::Delete {
                task_id: parse_arg(rest, "delete <id>")?,
            },
            "order" => Command::Order {
                task_ids: parse_list(required(rest, "order <id>...")?, "order <id>...")?,
            },
            "settle" => Command::Settle,
            "checkin" => Command::CheckIn,
            "stats" => Command::Stats {
                date: parse_optional(rest, "stats [YYYY-MM-DD]")?,
            },
            "trend" => {
                let (start, end) = date_range(rest, "trend [start] [end]")?;
                Command::Trend { start, end }
            }
            "rankings" => {
                let (start, end) = date_range(rest, "rankings [start] [end]")?;
                Command::Rankings { start, end }
            }
            "timeline" => Command::Timeline {
                date: parse_optional(rest, "timeline [YYYY-MM-DD]")?,
            },
            "search" => {
                let rest = required(rest, "search <word> [page]")?;
                let (keyword, page) = match rest.rsplit_once(char::is_whitespace) {
                    Some((keyword, page)) => match page.parse() {
                        Ok(page) => (keyword.trim(), page),
                        Err(_) => (rest, 0),
                    },
                    None => (rest, 0),
                };
                Command::Search {
                    keyword: keyword.to_string(),
                    page,
                }
            }
            "idioms" => Command::Idioms {
                count: if rest.is_empty() {
                    DEFAULT_IDIOM_LIMIT
                } else {
                    parse_arg(rest, "idioms [count]")?
                },
            },
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            "" => bail!("Empty command"),
            other => bail!("Unknown command '{}' (try 'help')", other),
        };
        Ok(command)
    }
}

fn required<'a>(rest: &'a str, usage: &str) -> Result<&'a str> {
    if rest.is_empty() {
        Err(anyhow!("Usage: {}", usage))
    } else {
        Ok(rest)
    }
}

fn parse_arg<T: FromStr>(rest: &str, usage: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    required(rest, usage)?
        .parse()
        .with_context(|| format!("Usage: {}", usage))
}

fn parse_optional<T: FromStr>(rest: &str, usage: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if rest.is_empty() {
        Ok(None)
    } else {
        parse_arg(rest, usage).map(Some)
    }
}

fn parse_list<T: FromStr>(rest: &str, usage: &str) -> Result<Vec<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    rest.split_whitespace().map(|item| parse_arg(item, usage)).collect()
}

fn date_range(rest: &str, usage: &str) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
    let dates: Vec<NaiveDate> = parse_list(rest, usage)?;
    match dates[..] {
        [] => Ok((None, None)),
        [start] => Ok((Some(start), None)),
        [start, end] if start <= end => Ok((Some(start), Some(end))),
        [_, _] => bail!("Start date must not be after end date"),
        _ => bail!("Usage: {}", usage),
    }
}
