//! The scenario suite
//!
//! A flat list of independent scenarios grouped by concern. Every scenario
//! gets the same read-only [`ScenarioContext`] and owns its own requests.

use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use storecheck_client::{
    endpoints, Delivery, ListQuery, Product, ProductPatch, ProductsApi, RequestOptions, SortOrder,
    TimeoutPolicy,
};
use tracing::info;

use crate::error::{ensure, E2eError, E2eResult};
use crate::fixtures::{EnvironmentProfile, Environments, TestData};
use crate::validate::{
    expect_field, expect_status, is_sorted_by_locale, sort_by_locale,
    validate_deleted, validate_entity_shape, validate_envelope_shape, validate_product_detail,
    validate_product_response, MINIMUM_FIELDS,
};

/// Ids read by the concurrent-load scenario
const CONCURRENT_IDS: [u64; 3] = [1, 2, 3];

/// How a passing test ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "note", rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    /// Passed under a tolerance policy; the note says what was tolerated
    Tolerated(String),
}

/// Concern a scenario belongs to; doubles as its primary tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Group {
    Crud,
    Pagination,
    Performance,
    Contract,
    Resilience,
    Environment,
}

impl Group {
    pub fn as_str(&self) -> &'static str {
        match self {
            Group::Crud => "crud",
            Group::Pagination => "pagination",
            Group::Performance => "performance",
            Group::Contract => "contract",
            Group::Resilience => "resilience",
            Group::Environment => "environment",
        }
    }
}

/// Shared, read-only inputs for a suite run
#[derive(Debug, Clone)]
pub struct ScenarioContext {
    pub api: ProductsApi,
    pub data: TestData,
    pub environment: String,
    pub environments: Environments,
    pub profile: EnvironmentProfile,
}

pub type ScenarioFn = for<'a> fn(&'a ScenarioContext) -> BoxFuture<'a, E2eResult<Outcome>>;

/// A named scenario
#[derive(Clone)]
pub struct Scenario {
    pub name: &'static str,
    pub group: Group,
    pub tags: Vec<&'static str>,
    /// Extra attempts after a failure
    pub retries: u32,
    run: ScenarioFn,
}

impl std::fmt::Debug for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field("group", &self.group)
            .field("tags", &self.tags)
            .field("retries", &self.retries)
            .finish()
    }
}

impl Scenario {
    pub fn new(name: &'static str, group: Group, run: ScenarioFn) -> Self {
        Self {
            name,
            group,
            tags: vec![group.as_str()],
            retries: 0,
            run,
        }
    }

    pub fn tagged(mut self, tag: &'static str) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn run<'a>(&self, ctx: &'a ScenarioContext) -> BoxFuture<'a, E2eResult<Outcome>> {
        (self.run)(ctx)
    }
}

/// Every scenario in suite order
pub fn all() -> Vec<Scenario> {
    vec![
        // CRUD
        Scenario::new("should fetch all products", Group::Crud, |ctx| {
            fetch_all_products(ctx).boxed()
        })
        .tagged("smoke"),
        Scenario::new("should fetch a single product by ID", Group::Crud, |ctx| {
            fetch_single_product(ctx).boxed()
        })
        .tagged("smoke"),
        Scenario::new("should search products via query parameter", Group::Crud, |ctx| {
            search_products(ctx).boxed()
        }),
        Scenario::new("should add a new product (mock)", Group::Crud, |ctx| {
            add_product(ctx).boxed()
        }),
        Scenario::new("should update an existing product (mock)", Group::Crud, |ctx| {
            update_product(ctx).boxed()
        }),
        Scenario::new("should delete a product (mock)", Group::Crud, |ctx| {
            delete_product(ctx).boxed()
        }),
        Scenario::new(
            "should perform CRUD operations using page object (mock API)",
            Group::Crud,
            |ctx| crud_flow(ctx).boxed(),
        ),
        Scenario::new("should return identical data for repeated reads", Group::Crud, |ctx| {
            repeated_reads_are_identical(ctx).boxed()
        }),
        Scenario::new("should accept repeated creates with fresh ids", Group::Crud, |ctx| {
            repeated_creates(ctx).boxed()
        }),
        // Pagination and sorting
        Scenario::new("should honour limit and skip", Group::Pagination, |ctx| {
            limit_and_skip(ctx).boxed()
        }),
        Scenario::new(
            "should fetch products sorted by title ascending",
            Group::Pagination,
            |ctx| sorted_by_title(ctx, SortOrder::Asc).boxed(),
        ),
        Scenario::new(
            "should fetch products sorted by title descending",
            Group::Pagination,
            |ctx| sorted_by_title(ctx, SortOrder::Desc).boxed(),
        ),
        Scenario::new(
            "should mirror ascending and descending title order",
            Group::Pagination,
            |ctx| mirrored_sort_orders(ctx).boxed(),
        ),
        // Performance
        Scenario::new("should measure response times", Group::Performance, |ctx| {
            measure_response_time(ctx).boxed()
        }),
        Scenario::new("should handle concurrent requests", Group::Performance, |ctx| {
            concurrent_requests(ctx).boxed()
        }),
        // Contract
        Scenario::new(
            "should validate API contract for product schema",
            Group::Contract,
            |ctx| product_schema_contract(ctx).boxed(),
        ),
        Scenario::new("should validate products list contract", Group::Contract, |ctx| {
            list_contract(ctx).boxed()
        }),
        // Resilience
        Scenario::new("should retry failed requests", Group::Resilience, |ctx| {
            retried_read(ctx).boxed()
        })
        .with_retries(3),
        Scenario::new("should handle timeout scenarios", Group::Resilience, |ctx| {
            short_timeout(ctx).boxed()
        }),
        // Environment
        Scenario::new("should adapt to different environments", Group::Environment, |ctx| {
            environment_profile(ctx).boxed()
        }),
    ]
}

fn require_product(product: Option<Product>, id: u64) -> E2eResult<Product> {
    product.ok_or_else(|| E2eError::AssertionFailed(format!("no product returned for id {}", id)))
}

fn field_number(body: &Value, field: &str) -> E2eResult<f64> {
    body.get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| E2eError::AssertionFailed(format!("`{}` is not a number", field)))
}

async fn fetch_all_products(ctx: &ScenarioContext) -> E2eResult<Outcome> {
    let response = ctx
        .api
        .list_products(&ListQuery::default(), RequestOptions::default())
        .await?;
    validate_envelope_shape(&response, 200)?;
    Ok(Outcome::Passed)
}

async fn fetch_single_product(ctx: &ScenarioContext) -> E2eResult<Outcome> {
    let id = ctx.data.valid_product_id;
    let response = ctx.api.get_product(id).await?;
    let product = require_product(validate_product_response(&response, 200)?, id)?;
    ensure(product.id == id, || {
        format!("requested id {} but received id {}", id, product.id)
    })?;
    Ok(Outcome::Passed)
}

async fn search_products(ctx: &ScenarioContext) -> E2eResult<Outcome> {
    let response = ctx.api.search_products(&ctx.data.search_query).await?;
    validate_envelope_shape(&response, 200)?;
    Ok(Outcome::Passed)
}

/// Create must answer 201 and echo the payload under a numeric id
async fn add_product(ctx: &ScenarioContext) -> E2eResult<Outcome> {
    let new_product = &ctx.data.new_product;
    let response = ctx.api.add_product(new_product).await?;
    expect_status(&response, 201)?;
    validate_entity_shape(&response.body, &MINIMUM_FIELDS)?;

    expect_field(&response.body, "title", &Value::from(new_product.title.as_str()))?;
    expect_field(
        &response.body,
        "description",
        &Value::from(new_product.description.as_str()),
    )?;
    let price = field_number(&response.body, "price")?;
    ensure(price == new_product.price, || {
        format!("price {} does not echo {}", price, new_product.price)
    })?;
    ensure(response.body["id"].is_number(), || {
        format!("id should be a number, got {}", response.body["id"])
    })?;
    Ok(Outcome::Passed)
}

async fn update_product(ctx: &ScenarioContext) -> E2eResult<Outcome> {
    let id = ctx.data.valid_product_id;
    let patch = &ctx.data.update_data;
    let response = ctx.api.update_product(id, patch).await?;
    let product = require_product(validate_product_response(&response, 200)?, id)?;

    if let Some(title) = &patch.title {
        ensure(&product.title == title, || {
            format!("title {:?} does not reflect update {:?}", product.title, title)
        })?;
    }
    ensure(product.id == id, || {
        format!("update of id {} returned id {}", id, product.id)
    })?;
    Ok(Outcome::Passed)
}

async fn delete_product(ctx: &ScenarioContext) -> E2eResult<Outcome> {
    let id = ctx.data.valid_product_id;
    let response = ctx.api.delete_product(id).await?;
    validate_deleted(&response, id)?;
    Ok(Outcome::Passed)
}

/// Create, read back, update, delete. The backend does not persist creates,
/// so reading the fabricated id answers 404; update and delete go to id 1.
async fn crud_flow(ctx: &ScenarioContext) -> E2eResult<Outcome> {
    let created = ctx.api.add_product(&ctx.data.new_product).await?;
    expect_status(&created, 201)?;
    validate_entity_shape(&created.body, &MINIMUM_FIELDS)?;
    let created_id = created.body["id"]
        .as_u64()
        .ok_or_else(|| E2eError::AssertionFailed("created product has no numeric id".into()))?;

    let read_back = ctx.api.get_product(created_id).await?;
    validate_product_response(&read_back, 404)?;

    let updated = ctx
        .api
        .update_product(1, &ProductPatch::title("Updated Title"))
        .await?;
    let product = require_product(validate_product_response(&updated, 200)?, 1)?;
    ensure(product.title == "Updated Title", || {
        format!("expected title \"Updated Title\", got {:?}", product.title)
    })?;

    let deleted = ctx.api.delete_product(1).await?;
    expect_status(&deleted, 200)?;
    expect_field(&deleted.body, "isDeleted", &Value::Bool(true))?;
    Ok(Outcome::Passed)
}

async fn repeated_reads_are_identical(ctx: &ScenarioContext) -> E2eResult<Outcome> {
    let id = ctx.data.valid_product_id;
    let first = require_product(
        validate_product_response(&ctx.api.get_product(id).await?, 200)?,
        id,
    )?;
    let second = require_product(
        validate_product_response(&ctx.api.get_product(id).await?, 200)?,
        id,
    )?;

    ensure(
        first.id == second.id && first.title == second.title && first.price == second.price,
        || format!("repeated reads differ: {:?} vs {:?}", first.title, second.title),
    )?;
    Ok(Outcome::Passed)
}

/// Creates are not idempotent; only shape is asserted, never id equality
async fn repeated_creates(ctx: &ScenarioContext) -> E2eResult<Outcome> {
    let mut ids = Vec::with_capacity(2);
    for _ in 0..2 {
        let response = ctx.api.add_product(&ctx.data.new_product).await?;
        expect_status(&response, 201)?;
        let id = response.body["id"]
            .as_u64()
            .ok_or_else(|| E2eError::AssertionFailed("created product has no numeric id".into()))?;
        ids.push(id);
    }
    info!(first = ids[0], second = ids[1], "ids minted by repeated creates");
    Ok(Outcome::Passed)
}

async fn limit_and_skip(ctx: &ScenarioContext) -> E2eResult<Outcome> {
    let (limit, skip) = (5, 10);
    let response = ctx
        .api
        .list_products(&ListQuery::page(limit, skip), RequestOptions::default())
        .await?;
    let envelope = validate_envelope_shape(&response, 200)?;

    ensure(envelope.limit == u64::from(limit), || {
        format!("limit {} was not honoured: {}", limit, envelope.limit)
    })?;
    ensure(envelope.skip == u64::from(skip), || {
        format!("skip {} was not honoured: {}", skip, envelope.skip)
    })?;
    ensure(envelope.products.len() <= limit as usize, || {
        format!("{} products exceed the page size {}", envelope.products.len(), limit)
    })?;
    ensure(envelope.total >= envelope.products.len() as u64, || {
        format!("total {} is below the page length", envelope.total)
    })?;
    Ok(Outcome::Passed)
}

fn lowercase_titles(products: &[Product]) -> Vec<String> {
    products.iter().map(|p| p.title.to_lowercase()).collect()
}

/// Request a server-side sort and check the page arrives in that order:
/// re-sorting it client-side must not move any title
async fn sorted_by_title(ctx: &ScenarioContext, order: SortOrder) -> E2eResult<Outcome> {
    let response = ctx
        .api
        .list_products(&ListQuery::sorted("title", order), RequestOptions::default())
        .await?;
    let envelope = validate_envelope_shape(&response, 200)?;

    let titles = envelope.titles();
    let sorted = sort_by_locale(&titles, order);
    ensure(titles == sorted, || {
        match titles.iter().zip(&sorted).find(|(got, want)| got != want) {
            Some((got, want)) => format!(
                "titles are not in {} order: found {:?} where {:?} belongs",
                order.as_str(),
                got,
                want
            ),
            None => format!("titles are not in {} order", order.as_str()),
        }
    })?;
    Ok(Outcome::Passed)
}

/// Ascending and descending orderings of the whole collection must be exact
/// reverses of each other
async fn mirrored_sort_orders(ctx: &ScenarioContext) -> E2eResult<Outcome> {
    let fetch = |order| {
        let query = ListQuery::sorted("title", order).with_limit(0);
        async move {
            let response = ctx.api.list_products(&query, RequestOptions::default()).await?;
            let envelope = validate_envelope_shape(&response, 200)?;
            E2eResult::Ok(lowercase_titles(&envelope.products))
        }
    };

    let ascending = fetch(SortOrder::Asc).await?;
    let mut descending = fetch(SortOrder::Desc).await?;

    ensure(is_sorted_by_locale(&ascending, SortOrder::Asc), || {
        "ascending titles are not in ascending order".to_string()
    })?;
    descending.reverse();
    ensure(ascending == descending, || {
        format!(
            "ascending and reversed descending orderings differ ({} vs {} titles)",
            ascending.len(),
            descending.len()
        )
    })?;
    Ok(Outcome::Passed)
}

async fn measure_response_time(ctx: &ScenarioContext) -> E2eResult<Outcome> {
    let budget = Duration::from_millis(ctx.profile.response_time_budget_ms);
    let start = Instant::now();
    let response = ctx
        .api
        .list_products(&ListQuery::default(), RequestOptions::default())
        .await?;
    let elapsed = start.elapsed();
    info!("Response time: {}ms", elapsed.as_millis());

    ensure(elapsed < budget, || {
        format!("response took {:?}, budget is {:?}", elapsed, budget)
    })?;
    validate_envelope_shape(&response, 200)?;
    Ok(Outcome::Passed)
}

/// Three independent reads in flight at once; all must succeed
async fn concurrent_requests(ctx: &ScenarioContext) -> E2eResult<Outcome> {
    let responses = ctx.api.get_many(&CONCURRENT_IDS).await;
    for (id, response) in CONCURRENT_IDS.iter().zip(responses) {
        let response = response?;
        let product = require_product(validate_product_response(&response, 200)?, *id)?;
        ensure(product.id == *id, || {
            format!("concurrent read of {} returned id {}", id, product.id)
        })?;
    }
    Ok(Outcome::Passed)
}

async fn product_schema_contract(ctx: &ScenarioContext) -> E2eResult<Outcome> {
    let response = ctx.api.get_product(ctx.data.valid_product_id).await?;
    expect_status(&response, 200)?;
    validate_product_detail(&response.body)?;
    Ok(Outcome::Passed)
}

async fn list_contract(ctx: &ScenarioContext) -> E2eResult<Outcome> {
    let response = ctx
        .api
        .list_products(&ListQuery::default(), RequestOptions::default())
        .await?;
    validate_envelope_shape(&response, 200)?;

    if let Some(first) = response.body["products"].as_array().and_then(|p| p.first()) {
        validate_product_detail(first)?;
    }
    Ok(Outcome::Passed)
}

async fn retried_read(ctx: &ScenarioContext) -> E2eResult<Outcome> {
    let id = ctx.data.valid_product_id;
    let response = ctx.api.get_product(id).await?;
    require_product(validate_product_response(&response, 200)?, id)?;
    Ok(Outcome::Passed)
}

/// A deliberately short timeout. Either the API answers in time and the
/// envelope is checked, or the timeout is tolerated and reported.
async fn short_timeout(ctx: &ScenarioContext) -> E2eResult<Outcome> {
    let timeout = Duration::from_millis(ctx.profile.short_timeout_ms);
    let result = ctx
        .api
        .list_products(&ListQuery::default(), RequestOptions::new().timeout(timeout))
        .await;

    match TimeoutPolicy::Tolerate.apply(result)? {
        Delivery::Delivered(response) => {
            validate_envelope_shape(&response, 200)?;
            Ok(Outcome::Passed)
        }
        Delivery::TimedOut { path, after } => Ok(Outcome::Tolerated(format!(
            "{} timed out after {}ms",
            path,
            after.as_millis()
        ))),
    }
}

async fn environment_profile(ctx: &ScenarioContext) -> E2eResult<Outcome> {
    let profile = ctx.environments.get(&ctx.environment)?;
    ensure(!profile.base_url.is_empty(), || {
        format!("environment {:?} has an empty baseUrl", ctx.environment)
    })?;
    ctx.api.gateway().endpoint(endpoints::PRODUCTS)?;
    Ok(Outcome::Passed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_scenario_names_are_unique() {
        let scenarios = all();
        let names: HashSet<&str> = scenarios.iter().map(|s| s.name).collect();
        assert_eq!(names.len(), scenarios.len());
    }

    #[test]
    fn test_group_is_first_tag() {
        for scenario in all() {
            assert_eq!(scenario.tags[0], scenario.group.as_str());
        }
    }

    #[test]
    fn test_only_the_retry_scenario_retries() {
        let retrying: Vec<&str> = all()
            .into_iter()
            .filter(|s| s.retries > 0)
            .map(|s| s.name)
            .collect();
        assert_eq!(retrying, vec!["should retry failed requests"]);
    }
}
