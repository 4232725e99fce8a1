use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default daily study goal in hours when the server omits it
pub const DEFAULT_DAILY_GOAL_HOURS: i32 = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub current_task_id: Option<i64>,
    /// Milliseconds since the epoch
    #[serde(default)]
    pub current_task_start_time: Option<i64>,
    #[serde(default)]
    pub daily_goal: Option<i32>,
}

impl User {
    pub fn daily_goal_hours(&self) -> i32 {
        self.daily_goal.unwrap_or(DEFAULT_DAILY_GOAL_HOURS)
    }

    pub fn current_task_started_at(&self) -> Option<DateTime<Utc>> {
        self.current_task_start_time
            .and_then(DateTime::<Utc>::from_timestamp_millis)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Credentials<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_response() {
        let json = r#"{"id":4,"username":"lin","password":"secret","createdAt":"2024-03-01T09:30:00.123456","currentTaskId":12,"currentTaskStartTime":1709285400000,"dailyGoal":6,"taskOrder":"[12,3]","token":"abc"}"#;
        let user: User = serde_json::from_str(json).expect("Failed to parse user JSON");

        assert_eq!(user.id, 4);
        assert_eq!(user.token.as_deref(), Some("abc"));
        assert_eq!(user.daily_goal_hours(), 6);
        assert_eq!(
            user.current_task_started_at().map(|t| t.timestamp()),
            Some(1_709_285_400)
        );
        assert!(user.created_at.is_some());
    }

    #[test]
    fn test_daily_goal_defaults() {
        let user: User = serde_json::from_str(r#"{"id":1,"username":"a"}"#).unwrap();
        assert_eq!(user.daily_goal_hours(), DEFAULT_DAILY_GOAL_HOURS);
        assert!(user.current_task_started_at().is_none());
    }
}
