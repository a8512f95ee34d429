use serde::Serialize;

use crate::models::Product;
use crate::store::{ProductStore, StoreError};

/// One entry of the catalog list view.
#[derive(Debug, Serialize, PartialEq)]
pub struct ProductCard {
    pub id: Option<String>,
    pub name: String,
    pub category: String,
    pub image_url: Option<String>,
    pub price_label: String,
    pub original_price_label: Option<String>,
    pub on_sale: bool,
    pub is_active: bool,
    pub status_label: &'static str,
}

pub fn price_label(amount: f64) -> String {
    format!("R$ {:.2}", amount)
}

impl From<&Product> for ProductCard {
    fn from(product: &Product) -> Self {
        ProductCard {
            id: product.id.map(|id| id.to_hex()),
            name: product.name.clone(),
            category: product.category.label().to_string(),
            image_url: product.image_url.clone(),
            price_label: price_label(product.price),
            original_price_label: product.original_price.map(price_label),
            on_sale: product.original_price.is_some_and(|original| original > product.price),
            is_active: product.is_active,
            status_label: if product.is_active { "Ativo" } else { "Inativo" },
        }
    }
}

pub async fn list_cards(store: &dyn ProductStore) -> Result<Vec<ProductCard>, StoreError> {
    let products = store.list().await?;
    Ok(products.iter().map(ProductCard::from).collect())
}
