//! Manual stock operations on the product inventory.
//!
//! Visit-driven deductions go through the visit save path; this service
//! covers everything a human does from the inventory screen: restocks,
//! corrections, movement history and the low-stock report.

use db::models::product::{MovementKind, Product, StockMovement};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("product not found: {0}")]
    ProductNotFound(Uuid),
    #[error("quantity must be a finite non-zero number (got {0})")]
    InvalidQuantity(f64),
}

#[derive(Clone)]
pub struct InventoryService {
    pool: SqlitePool,
}

impl InventoryService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Add stock. Quantity must be positive.
    pub async fn restock(
        &self,
        product_id: Uuid,
        quantity: f64,
        note: Option<String>,
    ) -> Result<StockMovement, InventoryError> {
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(InventoryError::InvalidQuantity(quantity));
        }
        self.record_movement(product_id, MovementKind::Restock, quantity, note)
            .await
    }

    /// Correct the stock level by a signed delta, e.g. after a physical
    /// count. Zero deltas are rejected as a no-op.
    pub async fn adjust(
        &self,
        product_id: Uuid,
        delta: f64,
        note: Option<String>,
    ) -> Result<StockMovement, InventoryError> {
        if !delta.is_finite() || delta == 0.0 {
            return Err(InventoryError::InvalidQuantity(delta));
        }
        self.record_movement(product_id, MovementKind::Adjustment, delta, note)
            .await
    }

    async fn record_movement(
        &self,
        product_id: Uuid,
        kind: MovementKind,
        quantity: f64,
        note: Option<String>,
    ) -> Result<StockMovement, InventoryError> {
        if Product::find_by_id(&self.pool, product_id).await?.is_none() {
            return Err(InventoryError::ProductNotFound(product_id));
        }

        let mut tx = self.pool.begin().await?;
        let movement =
            Product::apply_movement(&mut tx, product_id, None, kind.clone(), quantity, note)
                .await?;
        tx.commit().await?;

        info!(product_id = %product_id, kind = %kind, quantity, "Recorded stock movement");
        Ok(movement)
    }

    pub async fn movements(
        &self,
        product_id: Uuid,
        limit: i32,
    ) -> Result<Vec<StockMovement>, InventoryError> {
        if Product::find_by_id(&self.pool, product_id).await?.is_none() {
            return Err(InventoryError::ProductNotFound(product_id));
        }
        Ok(StockMovement::find_by_product_id(&self.pool, product_id, limit).await?)
    }

    pub async fn low_stock(&self) -> Result<Vec<Product>, InventoryError> {
        Ok(Product::find_low_stock(&self.pool).await?)
    }
}

#[cfg(test)]
mod tests {
    use db::DBService;
    use db::models::product::CreateProduct;

    use super::*;

    async fn setup() -> (InventoryService, Product) {
        let db = DBService::new_in_memory().await.unwrap();
        let product = Product::create(
            &db.pool,
            Uuid::new_v4(),
            &CreateProduct {
                slug: "barrilha".to_string(),
                name: "Barrilha Leve".to_string(),
                description: None,
                category: "Alcalinizante".to_string(),
                unit: "kg".to_string(),
                current_stock: Some(4.0),
                min_stock: Some(5.0),
            },
        )
        .await
        .unwrap();
        (InventoryService::new(db.pool.clone()), product)
    }

    #[tokio::test]
    async fn restock_raises_stock_and_records_movement() {
        let (inventory, product) = setup().await;

        let movement = inventory
            .restock(product.id, 10.0, Some("entrega semanal".to_string()))
            .await
            .unwrap();
        assert_eq!(movement.kind, MovementKind::Restock);
        assert_eq!(movement.quantity, 10.0);
        assert_eq!(movement.visit_id, None);

        let history = inventory.movements(product.id, 10).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn restock_rejects_non_positive_quantities() {
        let (inventory, product) = setup().await;
        for quantity in [0.0, -1.0, f64::NAN] {
            assert!(matches!(
                inventory.restock(product.id, quantity, None).await,
                Err(InventoryError::InvalidQuantity(_))
            ));
        }
    }

    #[tokio::test]
    async fn adjust_accepts_negative_deltas() {
        let (inventory, product) = setup().await;
        let movement = inventory
            .adjust(product.id, -1.5, Some("contagem física".to_string()))
            .await
            .unwrap();
        assert_eq!(movement.kind, MovementKind::Adjustment);
        assert_eq!(movement.quantity, -1.5);
    }

    #[tokio::test]
    async fn unknown_product_is_reported() {
        let (inventory, _) = setup().await;
        let missing = Uuid::new_v4();
        assert!(matches!(
            inventory.restock(missing, 1.0, None).await,
            Err(InventoryError::ProductNotFound(id)) if id == missing
        ));
    }

    #[tokio::test]
    async fn low_stock_lists_products_at_or_below_minimum() {
        let (inventory, product) = setup().await;

        let low = inventory.low_stock().await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].id, product.id);

        inventory.restock(product.id, 20.0, None).await.unwrap();
        assert!(inventory.low_stock().await.unwrap().is_empty());
    }
}
