//! Products API client
//!
//! One method per remote operation. Each one fills in an endpoint template and
//! hands the request to the [`Gateway`]; nothing is cached or retried.

use std::fmt::Display;

use futures::future::join_all;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::gateway::{ApiResponse, Gateway, RequestOptions};
use crate::types::{Lookup, NewProduct, Product, ProductPatch};

/// Endpoint templates
pub mod endpoints {
    use std::fmt::Display;

    pub const PRODUCTS: &str = "/products";
    pub const SEARCH: &str = "/products/search";
    pub const ADD: &str = "/products/add";

    /// `/products/{id}`, shared by get, update and delete
    pub fn product_by_id(id: impl Display) -> String {
        format!("{}/{}", PRODUCTS, id)
    }
}

/// Sort direction for list requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Pagination and sorting parameters for `GET /products`
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// Page size; `0` asks the server for the whole collection
    pub limit: Option<u32>,
    pub skip: Option<u32>,
    pub sort_by: Option<String>,
    pub order: Option<SortOrder>,
}

impl ListQuery {
    pub fn page(limit: u32, skip: u32) -> Self {
        Self {
            limit: Some(limit),
            skip: Some(skip),
            ..Default::default()
        }
    }

    pub fn sorted(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            sort_by: Some(field.into()),
            order: Some(order),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    fn apply(&self, mut options: RequestOptions) -> RequestOptions {
        if let Some(limit) = self.limit {
            options = options.query("limit", limit.to_string());
        }
        if let Some(skip) = self.skip {
            options = options.query("skip", skip.to_string());
        }
        if let Some(sort_by) = &self.sort_by {
            options = options.query("sortBy", sort_by.as_str());
        }
        if let Some(order) = self.order {
            options = options.query("order", order.as_str());
        }
        options
    }
}

/// Client for the products resource
#[derive(Debug, Clone)]
pub struct ProductsApi {
    gateway: Gateway,
}

impl ProductsApi {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Connect to `base_url` with default gateway settings
    pub fn connect(base_url: &str) -> ApiResult<Self> {
        Ok(Self::new(Gateway::new(base_url)?))
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// `GET /products`
    pub async fn list_products(
        &self,
        query: &ListQuery,
        options: RequestOptions,
    ) -> ApiResult<ApiResponse> {
        self.gateway
            .send(Method::GET, endpoints::PRODUCTS, None, query.apply(options))
            .await
    }

    /// `GET /products/{id}`. A 404 comes back as a normal response.
    pub async fn get_product(&self, id: u64) -> ApiResult<ApiResponse> {
        self.get_product_raw(id).await
    }

    /// `GET /products/{segment}` with an arbitrary id segment, for probing
    /// how the server answers malformed ids
    pub async fn get_product_raw(&self, segment: impl Display) -> ApiResult<ApiResponse> {
        self.gateway
            .send_resource(
                Method::GET,
                endpoints::PRODUCTS,
                &segment.to_string(),
                None,
                RequestOptions::default(),
            )
            .await
    }

    /// Typed read where an unknown id is an ordinary answer
    pub async fn find_product(&self, id: u64) -> ApiResult<Lookup<Product>> {
        let response = self.get_product(id).await?;
        match response.status {
            200 => Ok(Lookup::Found(response.decode()?)),
            404 => Ok(Lookup::NotFound),
            status => Err(ApiError::UnexpectedStatus {
                status,
                path: endpoints::product_by_id(id),
            }),
        }
    }

    /// `GET /products/search?q=`. An empty query is passed through as-is.
    pub async fn search_products(&self, query: &str) -> ApiResult<ApiResponse> {
        self.gateway
            .send(
                Method::GET,
                endpoints::SEARCH,
                None,
                RequestOptions::new().query("q", query),
            )
            .await
    }

    /// `POST /products/add`
    pub async fn add_product(&self, product: &NewProduct) -> ApiResult<ApiResponse> {
        let body = to_body(product)?;
        self.gateway
            .send(Method::POST, endpoints::ADD, Some(&body), RequestOptions::default())
            .await
    }

    /// `PUT /products/{id}`
    pub async fn update_product(&self, id: u64, patch: &ProductPatch) -> ApiResult<ApiResponse> {
        let body = to_body(patch)?;
        self.gateway
            .send_resource(
                Method::PUT,
                endpoints::PRODUCTS,
                &id.to_string(),
                Some(&body),
                RequestOptions::default(),
            )
            .await
    }

    /// `DELETE /products/{id}`
    pub async fn delete_product(&self, id: u64) -> ApiResult<ApiResponse> {
        self.gateway
            .send_resource(
                Method::DELETE,
                endpoints::PRODUCTS,
                &id.to_string(),
                None,
                RequestOptions::default(),
            )
            .await
    }

    /// Fetch several products concurrently and wait for all of them.
    /// Results come back in the order of `ids`.
    pub async fn get_many(&self, ids: &[u64]) -> Vec<ApiResult<ApiResponse>> {
        join_all(ids.iter().map(|id| self.get_product(*id))).await
    }
}

fn to_body<T: Serialize>(payload: &T) -> ApiResult<Value> {
    serde_json::to_value(payload).map_err(ApiError::from)
}
