//! storecheck API client
//!
//! Typed access to the DummyJSON products API:
//! - [`gateway`]: the single HTTP choke-point with shared defaults
//! - [`products`]: one method per products endpoint
//! - [`types`]: typed request and response payloads

pub mod error;
pub mod gateway;
pub mod products;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use gateway::{ApiResponse, Delivery, Gateway, GatewayConfig, RequestOptions, TimeoutPolicy};
pub use products::{endpoints, ListQuery, ProductsApi, SortOrder};
pub use types::{
    DeletedProduct, Lookup, NewProduct, Product, ProductDetail, ProductEnvelope, ProductPatch,
};

/// Re-exported so callers can name HTTP methods without depending on reqwest
pub use reqwest::Method;
