use serde::{Deserialize, Serialize};

const MS_PER_HOUR: i64 = 3_600_000;
const MS_PER_MINUTE: i64 = 60_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: i64,
    pub name: String,
    /// `None` (or 0) marks a system default task shared by all users
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl Task {
    pub fn is_system(&self) -> bool {
        matches!(self.user_id, None | Some(0))
    }

    pub fn is_active(&self) -> bool {
        self.is_active.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInStatus {
    pub daily_goal: Option<i32>,
    #[serde(default)]
    pub status_list: Vec<DayStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayStatus {
    pub date: String,
    /// Milliseconds studied that day
    pub duration: i64,
    pub met_goal: bool,
}

impl CheckInStatus {
    /// Consecutive days meeting the goal, counting back from the latest day
    pub fn streak(&self) -> usize {
        self.status_list
            .iter()
            .rev()
            .take_while(|day| day.met_goal)
            .count()
    }
}

impl DayStatus {
    pub fn duration_display(&self) -> String {
        format_duration(self.duration)
    }
}

/// Format a millisecond duration as "2h 05m" or "4m 30s"
pub fn format_duration(ms: i64) -> String {
    let ms = ms.max(0);
    let hours = ms / MS_PER_HOUR;
    let minutes = (ms % MS_PER_HOUR) / MS_PER_MINUTE;
    if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else {
        let seconds = (ms % MS_PER_MINUTE) / 1000;
        format!("{}m {:02}s", minutes, seconds)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AddTaskRequest<'a> {
    pub name: &'a str,
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SwitchTaskRequest {
    pub user_id: i64,
    pub task_id: i64,
}
