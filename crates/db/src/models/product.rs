use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Sqlite, SqlitePool, Transaction, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

/// Why a product's stock level changed
#[derive(Debug, Clone, Type, Serialize, Deserialize, PartialEq, TS, EnumString, Display)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MovementKind {
    Restock,
    Application,
    Adjustment,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Product {
    pub id: Uuid,
    /// Stable handle used by visit application entries (e.g. "cloro-granulado")
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub unit: String,
    pub current_stock: f64,
    pub min_stock: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct StockMovement {
    pub id: Uuid,
    pub product_id: Uuid,
    pub visit_id: Option<Uuid>,
    pub kind: MovementKind,
    /// Positive for stock in, negative for stock out
    pub quantity: f64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateProduct {
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub unit: String,
    pub current_stock: Option<f64>,
    pub min_stock: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, TS)]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub min_stock: Option<f64>,
}

const PRODUCT_COLUMNS: &str =
    "id, slug, name, description, category, unit, current_stock, min_stock, created_at, updated_at";

impl Product {
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name ASC"
        ))
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_slug(pool: &SqlitePool, slug: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(pool)
        .await
    }

    /// Products at or below their minimum stock level
    pub async fn find_low_stock(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE current_stock <= min_stock ORDER BY current_stock / min_stock ASC"
        ))
        .fetch_all(pool)
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        data: &CreateProduct,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Product>(&format!(
            "INSERT INTO products (id, slug, name, description, category, unit, current_stock, min_stock)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(&data.slug)
        .bind(&data.name)
        .bind(&data.description)
        .bind(&data.category)
        .bind(&data.unit)
        .bind(data.current_stock.unwrap_or(0.0))
        .bind(data.min_stock.unwrap_or(0.0))
        .fetch_one(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateProduct,
    ) -> Result<Option<Self>, sqlx::Error> {
        let Some(existing) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };

        let updated = sqlx::query_as::<_, Product>(&format!(
            "UPDATE products
             SET name = $2, description = $3, category = $4, unit = $5, min_stock = $6,
                 updated_at = CURRENT_TIMESTAMP
             WHERE id = $1
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(data.name.as_ref().unwrap_or(&existing.name))
        .bind(data.description.as_ref().or(existing.description.as_ref()))
        .bind(data.category.as_ref().unwrap_or(&existing.category))
        .bind(data.unit.as_ref().unwrap_or(&existing.unit))
        .bind(data.min_stock.unwrap_or(existing.min_stock))
        .fetch_one(pool)
        .await?;

        Ok(Some(updated))
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Apply a stock delta and record the movement in one transaction step.
    /// Callers own the transaction so visit persistence can batch several
    /// movements atomically.
    pub async fn apply_movement(
        tx: &mut Transaction<'_, Sqlite>,
        product_id: Uuid,
        visit_id: Option<Uuid>,
        kind: MovementKind,
        quantity: f64,
        note: Option<String>,
    ) -> Result<StockMovement, sqlx::Error> {
        sqlx::query("UPDATE products SET current_stock = current_stock + $2, updated_at = CURRENT_TIMESTAMP WHERE id = $1")
            .bind(product_id)
            .bind(quantity)
            .execute(&mut **tx)
            .await?;

        let id = Uuid::new_v4();
        sqlx::query_as::<_, StockMovement>(
            "INSERT INTO stock_movements (id, product_id, visit_id, kind, quantity, note)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, product_id, visit_id, kind, quantity, note, created_at",
        )
        .bind(id)
        .bind(product_id)
        .bind(visit_id)
        .bind(kind)
        .bind(quantity)
        .bind(note)
        .fetch_one(&mut **tx)
        .await
    }
}

impl StockMovement {
    pub async fn find_by_product_id(
        pool: &SqlitePool,
        product_id: Uuid,
        limit: i32,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, StockMovement>(
            "SELECT id, product_id, visit_id, kind, quantity, note, created_at
             FROM stock_movements
             WHERE product_id = $1
             ORDER BY created_at DESC
             LIMIT $2",
        )
        .bind(product_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}
