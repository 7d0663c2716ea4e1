//! The aggregate visit record and its step records.
//!
//! A visit accumulates four step records (check-in, water parameters,
//! product applications, needs assessment) while a technician works
//! through the service workflow. Only completed visits are persisted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Sqlite, SqlitePool, Transaction, Type, types::Json};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Type, Serialize, Deserialize, PartialEq, TS, EnumString, Display, Default,
)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VisitStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

/// Measured water-chemistry parameter. Key names match the frontend forms.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    TS,
    EnumString,
    Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Parameter {
    Ph,
    Chlorine,
    Alkalinity,
    CalciumHardness,
    CyanuricAcid,
    Temperature,
}

impl Parameter {
    pub const ALL: [Parameter; 6] = [
        Parameter::Ph,
        Parameter::Chlorine,
        Parameter::Alkalinity,
        Parameter::CalciumHardness,
        Parameter::CyanuricAcid,
        Parameter::Temperature,
    ];
}

/// Display classification of a single reading. Only `Critical` values are
/// rejected at submission; `Warning` means outside the ideal band but
/// inside the valid band.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReadingStatus {
    Ideal,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct ParameterReading {
    pub value: f64,
    pub unit: String,
    pub status: ReadingStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct ParameterReadings {
    pub readings: BTreeMap<Parameter, ParameterReading>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct CheckInRecord {
    pub checked_in_at: DateTime<Utc>,
    pub note: Option<String>,
    pub technician: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct ApplicationEntry {
    pub id: Uuid,
    pub product_slug: String,
    pub product_name: String,
    pub unit: String,
    pub quantity: f64,
    pub reason: String,
    pub note: Option<String>,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RecommendationPriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct Recommendation {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: RecommendationPriority,
    pub estimated_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct AssessmentRecord {
    pub urgent_issues: Vec<String>,
    pub recommendations: Vec<Recommendation>,
    /// recommendation id -> client approved the work
    pub client_approval: BTreeMap<String, bool>,
    pub general_notes: Option<String>,
    pub next_visit_notes: Option<String>,
    pub total_approved_cost: f64,
    pub recorded_at: DateTime<Utc>,
}

/// The aggregate record owned by the workflow controller for the lifetime
/// of one visit. `ended_at >= started_at` once set; status only moves
/// forward (pending -> inprogress -> completed).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct VisitRecord {
    pub id: Uuid,
    pub client_id: Uuid,
    pub technician: String,
    pub status: VisitStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub check_in: Option<CheckInRecord>,
    pub water_parameters: Option<ParameterReadings>,
    pub product_applications: Vec<ApplicationEntry>,
    pub needs_assessment: Option<AssessmentRecord>,
}

impl VisitRecord {
    pub fn new(id: Uuid, client_id: Uuid, technician: String, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            client_id,
            technician,
            status: VisitStatus::Pending,
            started_at,
            ended_at: None,
            check_in: None,
            water_parameters: None,
            product_applications: Vec::new(),
            needs_assessment: None,
        }
    }
}

/// Persisted row for a completed visit. Step records are stored as JSON.
#[derive(Debug, Clone, FromRow)]
pub struct Visit {
    pub id: Uuid,
    pub client_id: Uuid,
    pub technician: String,
    pub status: VisitStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub check_in: Option<Json<CheckInRecord>>,
    pub water_parameters: Option<Json<ParameterReadings>>,
    pub product_applications: Json<Vec<ApplicationEntry>>,
    pub needs_assessment: Option<Json<AssessmentRecord>>,
    pub created_at: DateTime<Utc>,
}

const VISIT_COLUMNS: &str = "id, client_id, technician, status, started_at, ended_at, check_in, water_parameters, product_applications, needs_assessment, created_at";

impl Visit {
    pub fn into_record(self) -> VisitRecord {
        VisitRecord {
            id: self.id,
            client_id: self.client_id,
            technician: self.technician,
            status: self.status,
            started_at: self.started_at,
            ended_at: self.ended_at,
            check_in: self.check_in.map(|j| j.0),
            water_parameters: self.water_parameters.map(|j| j.0),
            product_applications: self.product_applications.0,
            needs_assessment: self.needs_assessment.map(|j| j.0),
        }
    }

    /// Insert a completed visit. Part of the save transaction so stock
    /// movements land atomically with the visit row.
    pub async fn insert(
        tx: &mut Transaction<'_, Sqlite>,
        record: &VisitRecord,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO visits (id, client_id, technician, status, started_at, ended_at, check_in, water_parameters, product_applications, needs_assessment)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(record.id)
        .bind(record.client_id)
        .bind(&record.technician)
        .bind(record.status.clone())
        .bind(record.started_at)
        .bind(record.ended_at)
        .bind(record.check_in.as_ref().map(|c| Json(c.clone())))
        .bind(record.water_parameters.as_ref().map(|w| Json(w.clone())))
        .bind(Json(record.product_applications.clone()))
        .bind(record.needs_assessment.as_ref().map(|a| Json(a.clone())))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Visit>(&format!("SELECT {VISIT_COLUMNS} FROM visits WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_client_id(
        pool: &SqlitePool,
        client_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Visit>(&format!(
            "SELECT {VISIT_COLUMNS} FROM visits WHERE client_id = $1 ORDER BY started_at DESC"
        ))
        .bind(client_id)
        .fetch_all(pool)
        .await
    }

    pub async fn count_completed_since(
        pool: &SqlitePool,
        since: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM visits WHERE status = 'completed' AND ended_at >= $1",
        )
        .bind(since)
        .fetch_one(pool)
        .await
    }
}
