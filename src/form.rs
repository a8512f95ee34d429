//! Product form-state: the working copy edited inside a session.
//!
//! Groups and options get a stable id when they enter the form. Every
//! operation addresses them by id; an unknown id is an error and leaves the
//! form untouched.

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::models::{
    Category, ComplementGroup, ComplementOption, GroupPatch, OptionPatch, Product,
    ProductFormData, ProductPatch,
};

pub const NEW_GROUP_NAME: &str = "Novo Grupo";

macro_rules! form_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(mongodb::bson::oid::ObjectId);

        impl $name {
            pub fn new() -> Self {
                $name(mongodb::bson::oid::ObjectId::new())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0.to_hex())
            }
        }

        impl std::str::FromStr for $name {
            type Err = mongodb::bson::oid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                mongodb::bson::oid::ObjectId::parse_str(s).map($name)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0.to_hex())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = <String as serde::Deserialize>::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use form_id;

form_id!(GroupId);
form_id!(OptionId);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("complement group {0} not found")]
    GroupNotFound(GroupId),
    #[error("option {option} not found in complement group {group}")]
    OptionNotFound { group: GroupId, option: OptionId },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormOption {
    pub id: OptionId,
    pub name: String,
    pub price: f64,
    pub description: String,
}

impl FormOption {
    fn from_option(option: ComplementOption) -> Self {
        FormOption {
            id: OptionId::new(),
            name: option.name,
            price: option.price,
            description: option.description,
        }
    }

    fn to_option(&self) -> ComplementOption {
        ComplementOption {
            name: self.name.clone(),
            price: self.price,
            description: self.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormGroup {
    pub id: GroupId,
    pub name: String,
    pub required: bool,
    pub min_items: u32,
    pub max_items: u32,
    pub options: Vec<FormOption>,
}

impl FormGroup {
    fn from_group(group: ComplementGroup) -> Self {
        FormGroup {
            id: GroupId::new(),
            name: group.name,
            required: group.required,
            min_items: group.min_items,
            max_items: group.max_items,
            options: group.options.into_iter().map(FormOption::from_option).collect(),
        }
    }

    fn to_group(&self) -> ComplementGroup {
        ComplementGroup {
            name: self.name.clone(),
            required: self.required,
            min_items: self.min_items,
            max_items: self.max_items,
            options: self.options.iter().map(FormOption::to_option).collect(),
        }
    }

    pub fn option_at(&self, index: usize) -> Option<&FormOption> {
        self.options.get(index)
    }

    fn option_position(&self, option: OptionId) -> Result<usize, FormError> {
        self.options
            .iter()
            .position(|o| o.id == option)
            .ok_or(FormError::OptionNotFound { group: self.id, option })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductForm {
    pub name: String,
    pub category: Category,
    pub price: f64,
    pub original_price: Option<f64>,
    pub description: String,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub is_weighable: bool,
    pub price_per_gram: Option<f64>,
    pub has_complements: bool,
    pub complement_groups: Vec<FormGroup>,
    pub sizes: Option<Vec<serde_json::Value>>,
}

impl Default for ProductForm {
    fn default() -> Self {
        ProductForm {
            name: String::new(),
            category: Category::Acai,
            price: 0.0,
            original_price: None,
            description: String::new(),
            image_url: None,
            is_active: true,
            is_weighable: false,
            price_per_gram: None,
            has_complements: false,
            complement_groups: Vec::new(),
            sizes: None,
        }
    }
}

impl ProductForm {
    /// Working copy of a persisted product. Groups and options get fresh ids.
    pub fn from_product(product: &Product) -> Self {
        ProductForm {
            name: product.name.clone(),
            category: product.category,
            price: product.price,
            original_price: product.original_price,
            description: product.description.clone(),
            image_url: product.image_url.clone(),
            is_active: product.is_active,
            is_weighable: product.is_weighable,
            price_per_gram: product.price_per_gram,
            has_complements: product.has_complements,
            complement_groups: product
                .complement_groups
                .iter()
                .cloned()
                .map(FormGroup::from_group)
                .collect(),
            sizes: product.sizes.clone(),
        }
    }

    /// Whole-tree payload for the persistence layer. Price per gram only
    /// travels with weighable products.
    pub fn to_form_data(&self) -> ProductFormData {
        ProductFormData {
            name: self.name.clone(),
            category: self.category,
            price: self.price,
            original_price: self.original_price,
            description: self.description.clone(),
            image_url: self.image_url.clone(),
            is_active: self.is_active,
            is_weighable: self.is_weighable,
            price_per_gram: if self.is_weighable { self.price_per_gram } else { None },
            has_complements: self.has_complements,
            complement_groups: self.complement_groups.iter().map(FormGroup::to_group).collect(),
            sizes: self.sizes.clone(),
        }
    }

    pub fn groups(&self) -> &[FormGroup] {
        &self.complement_groups
    }

    pub fn group(&self, id: GroupId) -> Result<&FormGroup, FormError> {
        self.complement_groups
            .iter()
            .find(|g| g.id == id)
            .ok_or(FormError::GroupNotFound(id))
    }

    pub fn group_at(&self, index: usize) -> Option<&FormGroup> {
        self.complement_groups.get(index)
    }

    fn group_mut(&mut self, id: GroupId) -> Result<&mut FormGroup, FormError> {
        self.complement_groups
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or(FormError::GroupNotFound(id))
    }

    pub fn apply_patch(&mut self, patch: ProductPatch) {
        debug!("Patching product fields: {:?}", patch);
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(original_price) = patch.original_price {
            self.original_price = original_price;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(is_active) = patch.is_active {
            self.is_active = is_active;
        }
        if let Some(is_weighable) = patch.is_weighable {
            self.is_weighable = is_weighable;
        }
        if let Some(price_per_gram) = patch.price_per_gram {
            self.price_per_gram = price_per_gram;
        }
        if let Some(has_complements) = patch.has_complements {
            self.has_complements = has_complements;
        }
    }

    pub fn set_image_url(&mut self, url: String) {
        self.image_url = Some(url);
    }

    /// Replaces every group with a fresh copy of `templates`. Not a merge.
    pub fn apply_default_groups(&mut self, templates: &[ComplementGroup]) {
        debug!("Applying {} default complement groups", templates.len());
        self.has_complements = true;
        self.complement_groups = templates.iter().cloned().map(FormGroup::from_group).collect();
    }

    pub fn add_group(&mut self) -> GroupId {
        let group = FormGroup {
            id: GroupId::new(),
            name: NEW_GROUP_NAME.to_string(),
            required: false,
            min_items: 0,
            max_items: 1,
            options: Vec::new(),
        };
        let id = group.id;
        debug!("Adding complement group {}", id);
        self.complement_groups.push(group);
        id
    }

    pub fn update_group(&mut self, id: GroupId, patch: GroupPatch) -> Result<(), FormError> {
        let group = self.group_mut(id)?;
        debug!("Updating complement group {}: {:?}", id, patch);
        if let Some(name) = patch.name {
            group.name = name;
        }
        if let Some(required) = patch.required {
            group.required = required;
        }
        if let Some(min_items) = patch.min_items {
            group.min_items = min_items;
        }
        if let Some(max_items) = patch.max_items {
            group.max_items = max_items;
        }
        Ok(())
    }

    pub fn remove_group(&mut self, id: GroupId) -> Result<(), FormError> {
        let index = self
            .complement_groups
            .iter()
            .position(|g| g.id == id)
            .ok_or(FormError::GroupNotFound(id))?;
        debug!("Removing complement group {} at position {}", id, index);
        self.complement_groups.remove(index);
        Ok(())
    }

    pub fn add_option(&mut self, group: GroupId) -> Result<OptionId, FormError> {
        let target = self.group_mut(group)?;
        let option = FormOption {
            id: OptionId::new(),
            name: String::new(),
            price: 0.0,
            description: String::new(),
        };
        let id = option.id;
        debug!("Adding option {} to complement group {}", id, group);
        target.options.push(option);
        Ok(id)
    }

    pub fn update_option(
        &mut self,
        group: GroupId,
        option: OptionId,
        patch: OptionPatch,
    ) -> Result<(), FormError> {
        let target = self.group_mut(group)?;
        let index = target.option_position(option)?;
        debug!("Updating option {} in complement group {}: {:?}", option, group, patch);
        let entry = &mut target.options[index];
        if let Some(name) = patch.name {
            entry.name = name;
        }
        if let Some(price) = patch.price {
            entry.price = price;
        }
        if let Some(description) = patch.description {
            entry.description = description;
        }
        Ok(())
    }

    pub fn remove_option(&mut self, group: GroupId, option: OptionId) -> Result<(), FormError> {
        let target = self.group_mut(group)?;
        let index = target.option_position(option)?;
        debug!("Removing option {} from complement group {}", option, group);
        target.options.remove(index);
        Ok(())
    }
}
