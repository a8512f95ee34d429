use std::fmt;

use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Deserializer, Serialize};
use validator::{Validate, ValidationError};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Acai,
    Combo,
    Milkshake,
    Vitamina,
    Sorvetes,
    Bebidas,
    Complementos,
    Sobremesas,
    Outros,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Acai => "acai",
            Category::Combo => "combo",
            Category::Milkshake => "milkshake",
            Category::Vitamina => "vitamina",
            Category::Sorvetes => "sorvetes",
            Category::Bebidas => "bebidas",
            Category::Complementos => "complementos",
            Category::Sobremesas => "sobremesas",
            Category::Outros => "outros",
        }
    }

    /// Label shown to operators in the catalog list.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Acai => "Açaí",
            Category::Combo => "Combo",
            Category::Milkshake => "Milkshake",
            Category::Vitamina => "Vitamina",
            Category::Sorvetes => "Sorvetes",
            Category::Bebidas => "Bebidas",
            Category::Complementos => "Complementos",
            Category::Sobremesas => "Sobremesas",
            Category::Outros => "Outros",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One selectable add-on. `price` is added to the base product price.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Validate)]
pub struct ComplementOption {
    pub name: String,
    #[validate(range(min = 0.0))]
    pub price: f64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Validate)]
#[validate(schema(function = "check_selection_bounds"))]
pub struct ComplementGroup {
    pub name: String,
    pub required: bool,
    pub min_items: u32,
    pub max_items: u32,
    #[serde(default)]
    #[validate]
    pub options: Vec<ComplementOption>,
}

fn check_selection_bounds(group: &ComplementGroup) -> Result<(), ValidationError> {
    if group.min_items > group.max_items {
        let mut err = ValidationError::new("min_items_exceeds_max_items");
        err.message = Some(format!("group '{}': min_items > max_items", group.name).into());
        return Err(err);
    }
    if group.required && group.min_items == 0 {
        let mut err = ValidationError::new("required_group_without_minimum");
        err.message = Some(format!("group '{}': required groups need min_items >= 1", group.name).into());
        return Err(err);
    }
    Ok(())
}

/// Payload of create/update: a whole product without its identifier.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Validate)]
#[validate(schema(function = "check_original_price"))]
pub struct ProductFormData {
    #[validate(length(min = 1))]
    pub name: String,
    pub category: Category,
    #[validate(range(min = 0.0))]
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0))]
    pub original_price: Option<f64>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub is_active: bool,
    pub is_weighable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0))]
    pub price_per_gram: Option<f64>,
    pub has_complements: bool,
    #[serde(default)]
    #[validate]
    pub complement_groups: Vec<ComplementGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sizes: Option<Vec<serde_json::Value>>,
}

fn check_original_price(data: &ProductFormData) -> Result<(), ValidationError> {
    match data.original_price {
        Some(original) if original < data.price => {
            let mut err = ValidationError::new("original_price_below_price");
            err.message = Some("original_price must be >= price".into());
            Err(err)
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Product {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub category: Category,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<f64>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub is_active: bool,
    pub is_weighable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_per_gram: Option<f64>,
    pub has_complements: bool,
    #[serde(default)]
    pub complement_groups: Vec<ComplementGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sizes: Option<Vec<serde_json::Value>>,
}

impl Product {
    pub fn from_form_data(id: Option<ObjectId>, data: ProductFormData) -> Self {
        Product {
            id,
            name: data.name,
            category: data.category,
            price: data.price,
            original_price: data.original_price,
            description: data.description,
            image_url: data.image_url,
            is_active: data.is_active,
            is_weighable: data.is_weighable,
            price_per_gram: data.price_per_gram,
            has_complements: data.has_complements,
            complement_groups: data.complement_groups,
            sizes: data.sizes,
        }
    }
}

/// Partial update of a product's own fields. `original_price` and
/// `price_per_gram` distinguish "absent" from an explicit `null` (clear).
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub category: Option<Category>,
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "double_option")]
    pub original_price: Option<Option<f64>>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub is_weighable: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub price_per_gram: Option<Option<f64>>,
    pub has_complements: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct GroupPatch {
    pub name: Option<String>,
    pub required: Option<bool>,
    pub min_items: Option<u32>,
    pub max_items: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct OptionPatch {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub description: Option<String>,
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
