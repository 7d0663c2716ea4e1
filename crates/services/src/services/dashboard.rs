//! Aggregated numbers for the dashboard home screen and the weekly
//! visit schedule derived from each client's assigned day.

use chrono::{Datelike, Duration, Utc};
use db::models::{
    client::{Client, ClientStatus, VisitDay},
    product::Product,
    visit::Visit,
};
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use ts_rs::TS;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    pub active_clients: i64,
    pub pending_clients: i64,
    pub visits_completed_this_week: i64,
    pub low_stock_products: i64,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDay {
    pub day: VisitDay,
    pub clients: Vec<Client>,
}

#[derive(Clone)]
pub struct DashboardService {
    pool: SqlitePool,
}

impl DashboardService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn metrics(&self) -> Result<DashboardMetrics, DashboardError> {
        let active_clients = Client::count_by_status(&self.pool, ClientStatus::Active).await?;
        let pending_clients = Client::count_by_status(&self.pool, ClientStatus::Pending).await?;

        // week starts on Monday 00:00 UTC
        let now = Utc::now();
        let week_start = (now - Duration::days(now.weekday().num_days_from_monday() as i64))
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .and_utc();
        let visits_completed_this_week =
            Visit::count_completed_since(&self.pool, week_start).await?;

        let low_stock_products = Product::find_low_stock(&self.pool).await?.len() as i64;

        Ok(DashboardMetrics {
            active_clients,
            pending_clients,
            visits_completed_this_week,
            low_stock_products,
        })
    }

    /// Active clients grouped by their assigned visit day, Monday first.
    pub async fn weekly_schedule(&self) -> Result<Vec<ScheduleDay>, DashboardError> {
        let mut schedule = Vec::with_capacity(VisitDay::ALL.len());
        for day in VisitDay::ALL {
            let clients = Client::find_by_visit_day(&self.pool, day).await?;
            schedule.push(ScheduleDay { day, clients });
        }
        Ok(schedule)
    }
}
