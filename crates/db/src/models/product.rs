//! Product entity and DTOs.

use autopost_core::rotation::Rotatable;
use autopost_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// A row from the `products` table.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: DbId,
    pub owner_id: DbId,
    pub name: String,
    pub description: String,
    pub image_urls: Vec<String>,
    pub last_posted_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Product {
    pub fn first_image(&self) -> Option<&str> {
        self.image_urls.first().map(String::as_str)
    }
}

impl Rotatable for Product {
    fn last_posted_at(&self) -> Option<Timestamp> {
        self.last_posted_at
    }
}

/// DTO for creating a product.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProduct {
    #[serde(default)]
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "description is required"))]
    pub description: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "at least one image is required"))]
    pub image_urls: Vec<String>,
}

/// DTO for a partial product update. `lastPostedAt` is not editable.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProduct {
    #[validate(length(min = 1, message = "name must not be empty"))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1, message = "at least one image is required"))]
    pub image_urls: Option<Vec<String>>,
}

impl UpdateProduct {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.image_urls.is_none()
    }
}

/// Insert struct for a validated product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub id: DbId,
    pub owner_id: DbId,
    pub name: String,
    pub description: String,
    pub image_urls: Vec<String>,
}
