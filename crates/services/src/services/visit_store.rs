//! Database-backed collaborators for the visit workflow.
//!
//! The workflow itself is storage-agnostic; this module wires its
//! [`ClientDirectory`], [`ProductCatalog`] and [`VisitSink`] seams to the
//! SQLite pool. Saving a completed visit writes the visit row and the
//! matching stock movements in one transaction.

use async_trait::async_trait;
use db::DBService;
use db::models::{
    client::Client,
    product::{MovementKind, Product},
    visit::{Visit, VisitRecord},
};
use tracing::info;
use uuid::Uuid;

use super::visit_workflow::{ClientDirectory, ProductCatalog, VisitSink};

#[async_trait]
impl ClientDirectory for DBService {
    async fn resolve_client(&self, client_id: Uuid) -> anyhow::Result<Option<Client>> {
        Ok(Client::find_by_id(&self.pool, client_id).await?)
    }
}

#[async_trait]
impl ProductCatalog for DBService {
    async fn resolve_product(&self, slug: &str) -> anyhow::Result<Option<Product>> {
        Ok(Product::find_by_slug(&self.pool, slug).await?)
    }
}

#[async_trait]
impl VisitSink for DBService {
    /// Persist the visit and deduct applied product quantities atomically.
    /// A missing product slug aborts the save before anything is written
    /// so stock and visit history never diverge.
    async fn save_completed_visit(&self, record: &VisitRecord) -> anyhow::Result<()> {
        // Resolve slugs before taking a connection for the transaction
        let mut movements = Vec::with_capacity(record.product_applications.len());
        for application in &record.product_applications {
            let product = Product::find_by_slug(&self.pool, &application.product_slug)
                .await?
                .ok_or_else(|| {
                    anyhow::anyhow!("unknown product '{}' in visit", application.product_slug)
                })?;
            movements.push((product.id, application));
        }

        let mut tx = self.pool.begin().await?;

        Visit::insert(&mut tx, record).await?;

        for (product_id, application) in movements {
            Product::apply_movement(
                &mut tx,
                product_id,
                Some(record.id),
                MovementKind::Application,
                -application.quantity,
                Some(application.reason.clone()),
            )
            .await?;
        }

        tx.commit().await?;
        info!(
            visit_id = %record.id,
            applications = record.product_applications.len(),
            "Saved completed visit"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use db::models::product::CreateProduct;
    use db::models::visit::{ApplicationEntry, VisitStatus};

    use super::*;

    async fn seeded_db() -> (DBService, Uuid, Product) {
        let db = DBService::new_in_memory().await.unwrap();

        let client = Client::create(
            &db.pool,
            Uuid::new_v4(),
            &db::models::client::CreateClient {
                name: "Carlos Mendes".to_string(),
                address: "Av. Paulista, 1000".to_string(),
                city: "São Paulo".to_string(),
                state: "SP".to_string(),
                zip_code: None,
                phone: "(11) 91234-5678".to_string(),
                email: None,
                visit_day: db::models::client::VisitDay::Wednesday,
                pool_type: None,
                status: None,
                notes: None,
            },
        )
        .await
        .unwrap();

        let product = Product::create(
            &db.pool,
            Uuid::new_v4(),
            &CreateProduct {
                slug: "cloro-granulado".to_string(),
                name: "Cloro Granulado".to_string(),
                description: None,
                category: "Sanitizante".to_string(),
                unit: "kg".to_string(),
                current_stock: Some(10.0),
                min_stock: Some(2.0),
            },
        )
        .await
        .unwrap();

        (db, client.id, product)
    }

    fn completed_record(client_id: Uuid, product: &Product, quantity: f64) -> VisitRecord {
        let mut record = VisitRecord::new(
            Uuid::new_v4(),
            client_id,
            "João Silva".to_string(),
            Utc::now(),
        );
        record.status = VisitStatus::Completed;
        record.ended_at = Some(Utc::now());
        record.product_applications.push(ApplicationEntry {
            id: Uuid::new_v4(),
            product_slug: product.slug.clone(),
            product_name: product.name.clone(),
            unit: product.unit.clone(),
            quantity,
            reason: "rotina".to_string(),
            note: None,
            applied_at: Utc::now(),
        });
        record
    }

    #[tokio::test]
    async fn save_writes_visit_row_and_deducts_stock() {
        let (db, client_id, product) = seeded_db().await;
        let record = completed_record(client_id, &product, 1.5);

        db.save_completed_visit(&record).await.unwrap();

        let stored = Visit::find_by_id(&db.pool, record.id)
            .await
            .unwrap()
            .unwrap()
            .into_record();
        assert_eq!(stored, record);

        let product = Product::find_by_id(&db.pool, product.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(product.current_stock, 8.5);

        let movements =
            db::models::product::StockMovement::find_by_product_id(&db.pool, product.id, 10)
                .await
                .unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].quantity, -1.5);
        assert_eq!(movements[0].visit_id, Some(record.id));
        assert_eq!(movements[0].kind, MovementKind::Application);
    }

    #[tokio::test]
    async fn unknown_product_aborts_the_save() {
        let (db, client_id, product) = seeded_db().await;
        let mut record = completed_record(client_id, &product, 1.0);
        record.product_applications[0].product_slug = "nao-existe".to_string();

        assert!(db.save_completed_visit(&record).await.is_err());
        assert!(
            Visit::find_by_id(&db.pool, record.id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn history_comes_back_most_recent_first() {
        let (db, client_id, product) = seeded_db().await;

        let mut older = completed_record(client_id, &product, 0.5);
        older.started_at = Utc::now() - chrono::Duration::days(7);
        let newer = completed_record(client_id, &product, 0.5);

        db.save_completed_visit(&older).await.unwrap();
        db.save_completed_visit(&newer).await.unwrap();

        let history = Visit::find_by_client_id(&db.pool, client_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, newer.id);
        assert_eq!(history[1].id, older.id);
    }
}
