use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{bson::{doc, oid::ObjectId}, Collection};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{config::MongoConfig, models::{Product, ProductFormData}};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("product {0} not found")]
    NotFound(ObjectId),
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Product persistence. Create and update take the whole form payload.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Product>, StoreError>;
    async fn get(&self, id: &ObjectId) -> Result<Option<Product>, StoreError>;
    async fn create(&self, data: &ProductFormData) -> Result<Product, StoreError>;
    async fn update(&self, id: &ObjectId, data: &ProductFormData) -> Result<Product, StoreError>;
    async fn delete(&self, id: &ObjectId) -> Result<(), StoreError>;
}

pub struct MongoProductStore {
    collection: Collection<Product>,
}

impl MongoProductStore {
    pub fn new(db: &MongoConfig) -> Self {
        MongoProductStore {
            collection: db.database.collection("products"),
        }
    }
}

#[async_trait]
impl ProductStore for MongoProductStore {
    async fn list(&self) -> Result<Vec<Product>, StoreError> {
        debug!("Fetching products");

        let mut products = Vec::new();
        let mut cursor = self.collection.find(None, None).await.map_err(|e| {
            error!("Failed to fetch products: {}", e);
            e
        })?;

        while let Some(product) = cursor.try_next().await.map_err(|e| {
            error!("Error while iterating products: {}", e);
            e
        })? {
            products.push(product);
        }

        info!("Retrieved {} products", products.len());
        Ok(products)
    }

    async fn get(&self, id: &ObjectId) -> Result<Option<Product>, StoreError> {
        debug!("Fetching product with ID: {}", id);

        let product = self.collection.find_one(doc! { "_id": *id }, None).await.map_err(|e| {
            error!("Failed to fetch product {}: {}", id, e);
            e
        })?;
        Ok(product)
    }

    async fn create(&self, data: &ProductFormData) -> Result<Product, StoreError> {
        debug!("Creating new product: {}", data.name);

        let mut product = Product::from_form_data(None, data.clone());
        let result = self.collection.insert_one(&product, None).await.map_err(|e| {
            error!("Failed to create product: {}", e);
            e
        })?;

        let id = result.inserted_id.as_object_id().ok_or_else(|| {
            StoreError::Unavailable(format!("unexpected inserted id: {}", result.inserted_id))
        })?;
        product.id = Some(id);

        info!("Product created successfully with ID: {}", id);
        Ok(product)
    }

    async fn update(&self, id: &ObjectId, data: &ProductFormData) -> Result<Product, StoreError> {
        debug!("Replacing product {}", id);

        let product = Product::from_form_data(Some(*id), data.clone());
        let result = self
            .collection
            .replace_one(doc! { "_id": *id }, &product, None)
            .await
            .map_err(|e| {
                error!("Failed to update product {}: {}", id, e);
                e
            })?;

        if result.matched_count == 0 {
            debug!("Product not found for update: {}", id);
            return Err(StoreError::NotFound(*id));
        }

        info!("Product updated successfully: {}", id);
        Ok(product)
    }

    async fn delete(&self, id: &ObjectId) -> Result<(), StoreError> {
        debug!("Deleting product: {}", id);

        let result = self.collection.delete_one(doc! { "_id": *id }, None).await.map_err(|e| {
            error!("Failed to delete product {}: {}", id, e);
            e
        })?;

        if result.deleted_count == 0 {
            debug!("Product not found for deletion: {}", id);
            return Err(StoreError::NotFound(*id));
        }

        info!("Product deleted successfully: {}", id);
        Ok(())
    }
}
