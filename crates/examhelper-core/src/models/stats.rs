use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::format_duration;

/// Per-task study time for one day
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PieChart {
    #[serde(default)]
    pub data: Vec<PieSlice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PieSlice {
    /// Task name
    pub name: String,
    /// Milliseconds
    pub value: i64,
    /// Server-side rendering of `value`
    #[serde(default)]
    pub formatted: Option<String>,
}

impl PieChart {
    pub fn total(&self) -> i64 {
        self.data.iter().map(|s| s.value).sum()
    }

    /// Share of the day's total, 0.0 when nothing was recorded
    pub fn share(&self, slice: &PieSlice) -> f64 {
        match self.total() {
            0 => 0.0,
            total => slice.value as f64 / total as f64,
        }
    }
}

/// Daily totals over a date range; `dates` and `durations` are parallel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineChart {
    #[serde(default)]
    pub dates: Vec<String>,
    /// Milliseconds per day
    #[serde(default)]
    pub durations: Vec<i64>,
}

impl LineChart {
    pub fn days(&self) -> impl Iterator<Item = (&str, i64)> {
        self.dates
            .iter()
            .map(String::as_str)
            .zip(self.durations.iter().copied())
    }

    pub fn total(&self) -> i64 {
        self.durations.iter().sum()
    }
}

/// One stretch of work on a task. The still-running task is reported with
/// `end_time` set to the moment of the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub task_name: String,
    /// Milliseconds since the epoch
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub duration: Option<i64>,
    #[serde(default)]
    pub is_system: bool,
}

impl TimelineEntry {
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(self.start_time)
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.end_time.and_then(DateTime::<Utc>::from_timestamp_millis)
    }

    pub fn duration_display(&self) -> String {
        let ms = self
            .duration
            .or_else(|| self.end_time.map(|end| end - self.start_time))
            .unwrap_or(0);
        format_duration(ms)
    }
}

/// Ranking summary. The server does not fix its shape, so fields are kept as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RankingStats {
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TaskOrderRequest<'a> {
    pub user_id: i64,
    pub task_ids: &'a [i64],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SettleRequest {
    pub user_id: i64,
}
