//! Data models for exam helper backend entities.
//!
//! - `User`: account profile returned by the auth endpoints
//! - `Task`, `CheckInStatus`: study tasks and the weekly check-in summary
//! - `PieChart`, `LineChart`, `TimelineEntry`: study-time statistics
//! - `Idiom`, `IdiomPage`: dictionary entries used for daily practice

pub mod idiom;
pub mod stats;
pub mod task;
pub mod user;

pub use idiom::{Idiom, IdiomPage, DEFAULT_IDIOM_PAGE_SIZE};
pub use stats::{LineChart, PieChart, PieSlice, RankingStats, TimelineEntry};
pub use task::{format_duration, CheckInStatus, DayStatus, Task};
pub use user::{User, DEFAULT_DAILY_GOAL_HOURS};
