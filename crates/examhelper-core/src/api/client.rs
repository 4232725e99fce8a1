//! API client for the exam helper REST backend.
//!
//! Every request goes through the client's [`Pipeline`], so call sites never
//! deal with bearer tokens or session invalidation themselves.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::auth::SessionData;
use crate::config::Config;
use crate::models::stats::{SettleRequest, TaskOrderRequest};
use crate::models::task::{AddTaskRequest, SwitchTaskRequest};
use crate::models::user::Credentials;
use crate::models::{
    CheckInStatus, Idiom, IdiomPage, LineChart, PieChart, RankingStats, Task, TimelineEntry, User,
};

use super::pipeline::Pipeline;
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Number of idioms fetched when the caller doesn't say.
pub const DEFAULT_IDIOM_LIMIT: u32 = 10;

/// API client for the exam helper backend.
/// Clone is cheap - reqwest::Client and the pipeline are reference counted.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    pipeline: Pipeline,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration, pipeline: Pipeline) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            pipeline,
        })
    }

    pub fn from_config(config: &Config, pipeline: Pipeline) -> Result<Self> {
        Self::new(&config.base_url, config.request_timeout(), pipeline)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ===== Transport =====

    /// Run a request through the pipeline and the network.
    ///
    /// Request middlewares run once; the response middlewares see only the
    /// final outcome after any rate-limit retries.
    async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let request = builder.build()?;
        let request = self.pipeline.apply_request(request)?;
        let outcome = self.transmit(request).await;
        self.pipeline.apply_response(outcome)
    }

    async fn transmit(&self, request: reqwest::Request) -> Result<Response, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;
        let mut pending = request;

        loop {
            let url = pending.url().to_string();
            let retry = pending.try_clone();
            let response = self.client.execute(pending).await?;
            let status = response.status();

            if status.is_success() {
                debug!(url = %url, %status, "Request succeeded");
                return Ok(response);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                retries += 1;
                match retry {
                    Some(next) if retries <= MAX_RATE_LIMIT_RETRIES => {
                        warn!(url = %url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                        backoff_ms *= 2; // Exponential backoff
                        pending = next;
                        continue;
                    }
                    _ => return Err(ApiError::RateLimited),
                }
            }

            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let url = response.url().to_string();
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", url, e)))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ApiError> {
        let response = self.send(self.client.get(self.url(path)).query(query)).await?;
        Self::decode(response).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let response = self.send(self.client.post(self.url(path)).json(body)).await?;
        Self::decode(response).await
    }

    /// POST whose response body is ignored
    async fn post_unit<B: Serialize>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        self.send(self.client.post(self.url(path)).json(body)).await?;
        Ok(())
    }

    // ===== Authentication =====

    /// Log in and return the session record to persist.
    ///
    /// The whole user record is kept so profile fields survive in the session.
    pub async fn login(&self, username: &str, password: &str) -> Result<SessionData, ApiError> {
        let session: SessionData = self
            .post("/api/auth/login", &Credentials { username, password })
            .await?;
        if session.bearer_token().is_none() {
            warn!(username = username, "Login response carried no token");
        }
        info!(username = username, "Login succeeded");
        Ok(session)
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<User, ApiError> {
        self.post("/api/auth/register", &Credentials { username, password })
            .await
    }

    pub async fn fetch_user(&self, user_id: i64) -> Result<User, ApiError> {
        self.get(&format!("/api/auth/user/{}", user_id), &[]).await
    }

    /// Update the daily study goal in hours
    pub async fn update_daily_goal(&self, user_id: i64, hours: i32) -> Result<User, ApiError> {
        self.post(
            &format!("/api/auth/user/{}/goal", user_id),
            &serde_json::json!({ "goal": hours }),
        )
        .await
    }

    // ===== Tasks =====

    pub async fn fetch_tasks(&self, user_id: i64) -> Result<Vec<Task>, ApiError> {
        self.get("/api/tasks", &[("userId", user_id.to_string())]).await
    }

    pub async fn add_task(&self, user_id: i64, name: &str) -> Result<Task, ApiError> {
        self.post("/api/tasks", &AddTaskRequest { name, user_id }).await
    }

    /// Make `task_id` the user's current task; the server closes the previous record
    pub async fn switch_task(&self, user_id: i64, task_id: i64) -> Result<(), ApiError> {
        self.post_unit("/api/tasks/switch", &SwitchTaskRequest { user_id, task_id })
            .await
    }

    pub async fn delete_task(&self, user_id: i64, task_id: i64) -> Result<(), ApiError> {
        let builder = self
            .client
            .delete(self.url(&format!("/api/tasks/{}", task_id)))
            .query(&[("userId", user_id)]);
        self.send(builder).await?;
        Ok(())
    }

    /// Persist the display order of the user's tasks
    pub async fn update_task_order(&self, user_id: i64, task_ids: &[i64]) -> Result<(), ApiError> {
        self.post_unit("/api/tasks/order", &TaskOrderRequest { user_id, task_ids })
            .await
    }

    /// Close the running task record so the day's totals are final
    pub async fn settle_daily_task(&self, user_id: i64) -> Result<(), ApiError> {
        self.post_unit("/api/tasks/settle", &SettleRequest { user_id })
            .await
    }

    pub async fn fetch_checkin_status(&self, user_id: i64) -> Result<CheckInStatus, ApiError> {
        self.get("/api/tasks/checkin", &[("userId", user_id.to_string())])
            .await
    }

    // ===== Statistics =====
    // Dates left as `None` are filled in by the server (today, or the last 7 days).

    pub async fn fetch_pie_chart(
        &self,
        user_id: i64,
        date: Option<NaiveDate>,
    ) -> Result<PieChart, ApiError> {
        let query = with_dates(user_id, &[("date", date)]);
        self.get("/api/tasks/stats/pie", &query).await
    }

    pub async fn fetch_line_chart(
        &self,
        user_id: i64,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<LineChart, ApiError> {
        let query = with_dates(user_id, &[("startDate", start), ("endDate", end)]);
        self.get("/api/tasks/stats/line", &query).await
    }

    pub async fn fetch_rankings(
        &self,
        user_id: i64,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<RankingStats, ApiError> {
        let query = with_dates(user_id, &[("startDate", start), ("endDate", end)]);
        self.get("/api/tasks/stats/rankings", &query).await
    }

    pub async fn fetch_timeline(
        &self,
        user_id: i64,
        date: Option<NaiveDate>,
    ) -> Result<Vec<TimelineEntry>, ApiError> {
        let query = with_dates(user_id, &[("date", date)]);
        self.get("/api/tasks/timeline", &query).await
    }

    // ===== Idioms =====

    pub async fn fetch_random_idioms(&self, limit: u32) -> Result<Vec<Idiom>, ApiError> {
        self.get("/api/idioms/random", &[("limit", limit.to_string())])
            .await
    }

    /// Page through the dictionary, filtered by `keyword` when given
    pub async fn search_idioms(
        &self,
        keyword: Option<&str>,
        page: u32,
        size: u32,
    ) -> Result<IdiomPage, ApiError> {
        let mut query = vec![("page", page.to_string()), ("size", size.to_string())];
        if let Some(keyword) = keyword.filter(|k| !k.is_empty()) {
            query.push(("keyword", keyword.to_string()));
        }
        self.get("/api/idioms", &query).await
    }
}

/// `userId` plus every date that is set, as `YYYY-MM-DD`
fn with_dates(
    user_id: i64,
    dates: &[(&'static str, Option<NaiveDate>)],
) -> Vec<(&'static str, String)> {
    let mut query = vec![("userId", user_id.to_string())];
    query.extend(
        dates
            .iter()
            .filter_map(|(name, date)| date.map(|d| (*name, d.format("%Y-%m-%d").to_string()))),
    );
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = ApiClient::new("http://localhost:8080/", Duration::from_secs(5), Pipeline::new())
            .unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.url("/api/tasks"), "http://localhost:8080/api/tasks");
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_swallowed() {
        let client = ApiClient::new("http://127.0.0.1:9", Duration::from_secs(5), Pipeline::new())
            .unwrap();
        let result = client.fetch_tasks(1).await;
        assert!(matches!(result, Err(ApiError::NetworkError(_))));
    }

    #[test]
    fn test_unset_dates_are_left_to_the_server() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1);
        let query = with_dates(7, &[("startDate", start), ("endDate", None)]);
        assert_eq!(
            query,
            vec![("userId", "7".to_string()), ("startDate", "2024-03-01".to_string())]
        );
    }
}
