use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Type, Serialize, Deserialize, PartialEq, TS, EnumString, Display, Default,
)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ClientStatus {
    #[default]
    Active,
    Pending,
    Inactive,
}

/// Weekday the client's pool is scheduled for service
#[derive(
    Debug,
    Clone,
    Copy,
    Type,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    TS,
    EnumString,
    Display,
)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VisitDay {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl VisitDay {
    pub const ALL: [VisitDay; 7] = [
        VisitDay::Monday,
        VisitDay::Tuesday,
        VisitDay::Wednesday,
        VisitDay::Thursday,
        VisitDay::Friday,
        VisitDay::Saturday,
        VisitDay::Sunday,
    ];
}

#[derive(
    Debug, Clone, Type, Serialize, Deserialize, PartialEq, TS, EnumString, Display, Default,
)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PoolType {
    #[default]
    Residential,
    Commercial,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: Option<String>,
    pub phone: String,
    pub email: Option<String>,
    pub visit_day: VisitDay,
    pub pool_type: PoolType,
    pub status: ClientStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateClient {
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: Option<String>,
    pub phone: String,
    pub email: Option<String>,
    pub visit_day: VisitDay,
    pub pool_type: Option<PoolType>,
    pub status: Option<ClientStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, TS)]
pub struct UpdateClient {
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub visit_day: Option<VisitDay>,
    pub pool_type: Option<PoolType>,
    pub status: Option<ClientStatus>,
    pub notes: Option<String>,
}

const CLIENT_COLUMNS: &str = "id, name, address, city, state, zip_code, phone, email, visit_day, pool_type, status, notes, created_at, updated_at";

impl Client {
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Client>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients ORDER BY name ASC"
        ))
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Client>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_visit_day(
        pool: &SqlitePool,
        visit_day: VisitDay,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Client>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE visit_day = $1 AND status = 'active' ORDER BY name ASC"
        ))
        .bind(visit_day)
        .fetch_all(pool)
        .await
    }

    pub async fn count_by_status(
        pool: &SqlitePool,
        status: ClientStatus,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM clients WHERE status = $1")
            .bind(status)
            .fetch_one(pool)
            .await
    }

    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        data: &CreateClient,
    ) -> Result<Self, sqlx::Error> {
        let pool_type = data.pool_type.clone().unwrap_or_default();
        let status = data.status.clone().unwrap_or_default();
        sqlx::query_as::<_, Client>(&format!(
            "INSERT INTO clients (id, name, address, city, state, zip_code, phone, email, visit_day, pool_type, status, notes)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING {CLIENT_COLUMNS}"
        ))
        .bind(id)
        .bind(&data.name)
        .bind(&data.address)
        .bind(&data.city)
        .bind(&data.state)
        .bind(&data.zip_code)
        .bind(&data.phone)
        .bind(&data.email)
        .bind(data.visit_day)
        .bind(pool_type)
        .bind(status)
        .bind(&data.notes)
        .fetch_one(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateClient,
    ) -> Result<Option<Self>, sqlx::Error> {
        let Some(existing) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };

        let updated = sqlx::query_as::<_, Client>(&format!(
            "UPDATE clients
             SET name = $2, address = $3, city = $4, state = $5, zip_code = $6, phone = $7,
                 email = $8, visit_day = $9, pool_type = $10, status = $11, notes = $12,
                 updated_at = CURRENT_TIMESTAMP
             WHERE id = $1
             RETURNING {CLIENT_COLUMNS}"
        ))
        .bind(id)
        .bind(data.name.as_ref().unwrap_or(&existing.name))
        .bind(data.address.as_ref().unwrap_or(&existing.address))
        .bind(data.city.as_ref().unwrap_or(&existing.city))
        .bind(data.state.as_ref().unwrap_or(&existing.state))
        .bind(data.zip_code.as_ref().or(existing.zip_code.as_ref()))
        .bind(data.phone.as_ref().unwrap_or(&existing.phone))
        .bind(data.email.as_ref().or(existing.email.as_ref()))
        .bind(data.visit_day.unwrap_or(existing.visit_day))
        .bind(data.pool_type.clone().unwrap_or(existing.pool_type))
        .bind(data.status.clone().unwrap_or(existing.status))
        .bind(data.notes.as_ref().or(existing.notes.as_ref()))
        .fetch_one(pool)
        .await?;

        Ok(Some(updated))
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
