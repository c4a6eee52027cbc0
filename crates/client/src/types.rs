//! Typed payloads for the products API

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A product as returned by single-entity reads and writes.
///
/// Only the four fields every such response carries are required; the rest
/// of the catalog attributes are optional, and anything else the server adds
/// is kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub price: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_percentage: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The full-detail contract of `GET /products/{id}`: all eleven fields present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetail {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub discount_percentage: f64,
    pub rating: f64,
    pub stock: i64,
    pub brand: String,
    pub category: String,
    pub thumbnail: String,
    pub images: Vec<String>,
}

impl ProductDetail {
    /// Field names of the full-detail contract, in wire form
    pub const FIELDS: [&'static str; 11] = [
        "id",
        "title",
        "description",
        "price",
        "discountPercentage",
        "rating",
        "stock",
        "brand",
        "category",
        "thumbnail",
        "images",
    ];
}

/// Paginated collection wrapper. The wire object has exactly these four keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductEnvelope {
    pub products: Vec<Product>,
    pub total: u64,
    pub skip: u64,
    pub limit: u64,
}

impl ProductEnvelope {
    pub const KEYS: [&'static str; 4] = ["products", "total", "skip", "limit"];

    pub fn titles(&self) -> Vec<&str> {
        self.products.iter().map(|p| p.title.as_str()).collect()
    }
}

/// Payload for `POST /products/add`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub title: String,
    pub price: f64,
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
}

/// Partial update for `PUT /products/{id}`; unset fields are not sent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<i64>,
}

impl ProductPatch {
    /// A patch that only changes the title
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Receipt returned by `DELETE /products/{id}`. The backend marks the product
/// deleted without removing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedProduct {
    pub id: u64,
    pub is_deleted: bool,
    pub deleted_on: String,

    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl DeletedProduct {
    /// `deletedOn` parsed as an RFC 3339 timestamp, when it is one
    pub fn deleted_at(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.deleted_on).ok()
    }
}

/// Result of a typed lookup where 404 is an expected answer
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Lookup::NotFound)
    }
}
