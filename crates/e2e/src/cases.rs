//! Fixture-driven case generation
//!
//! Generation and execution are separate phases: [`generate_cases`] turns the
//! descriptor table into a list of immutable [`CaseSpec`]s up front, each with
//! its row's values already bound, and the runner executes them later.

use serde::{Deserialize, Serialize};
use storecheck_client::ProductsApi;
use tracing::debug;

use crate::error::{ensure, E2eError, E2eResult};
use crate::fixtures::TestData;
use crate::scenarios::Outcome;
use crate::validate::{expect_status, validate_envelope_shape, validate_product_detail, validate_product_response};

pub const DATA_DRIVEN_TAG: &str = "data-driven";

/// What a generated case checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaseKind {
    /// Search for `query` and expect at least `expected_min_results` hits
    Search {
        query: String,
        expected_min_results: u64,
    },

    /// Read `id` and check it against the detail contract
    ProductById { id: u64 },

    /// Request the raw id segment and expect `expected_status`
    InvalidId { raw: String, expected_status: u16 },
}

/// One generated test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseSpec {
    pub name: String,
    pub tags: Vec<String>,
    pub kind: CaseKind,
}

impl CaseSpec {
    fn new(name: String, kind_tag: &str, kind: CaseKind) -> Self {
        Self {
            name,
            tags: vec![DATA_DRIVEN_TAG.to_string(), kind_tag.to_string()],
            kind,
        }
    }

    /// Execute the case against the API
    pub async fn execute(&self, api: &ProductsApi) -> E2eResult<Outcome> {
        debug!("Executing case: {}", self.name);

        match &self.kind {
            CaseKind::Search {
                query,
                expected_min_results,
            } => {
                let response = api.search_products(query).await?;
                let envelope = validate_envelope_shape(&response, 200)?;
                let found = envelope.products.len() as u64;
                ensure(found >= *expected_min_results, || {
                    format!(
                        "search for {:?} returned {} product(s), expected at least {}",
                        query, found, expected_min_results
                    )
                })?;
            }
            CaseKind::ProductById { id } => {
                let response = api.get_product(*id).await?;
                let product = validate_product_response(&response, 200)?
                    .ok_or_else(|| E2eError::AssertionFailed(format!("no product for id {}", id)))?;
                ensure(product.id == *id, || {
                    format!("requested id {} but received id {}", id, product.id)
                })?;
                validate_product_detail(&response.body)?;
            }
            CaseKind::InvalidId {
                raw,
                expected_status,
            } => {
                let response = api.get_product_raw(raw).await?;
                expect_status(&response, *expected_status)?;
            }
        }

        Ok(Outcome::Passed)
    }
}

fn malformed(row: String, reason: &str) -> E2eError {
    E2eError::Fixture {
        path: row,
        reason: reason.to_string(),
    }
}

/// Validate the descriptor table and produce one case per row.
///
/// A malformed row is fatal: nothing is generated.
pub fn generate_cases(data: &TestData) -> E2eResult<Vec<CaseSpec>> {
    let mut cases = Vec::with_capacity(
        data.search_queries.len() + data.product_ids.len() + data.invalid_ids.len(),
    );

    for (index, descriptor) in data.search_queries.iter().enumerate() {
        cases.push(CaseSpec::new(
            format!("Dynamic test {}: search for \"{}\"", index + 1, descriptor.query),
            "search",
            CaseKind::Search {
                query: descriptor.query.clone(),
                expected_min_results: descriptor.expected_min_results,
            },
        ));
    }

    for (index, id) in data.product_ids.iter().enumerate() {
        if *id == 0 {
            return Err(malformed(
                format!("test-data productIds[{}]", index),
                "product ids start at 1",
            ));
        }
        cases.push(CaseSpec::new(
            format!("product {} matches contract", id),
            "product-id",
            CaseKind::ProductById { id: *id },
        ));
    }

    for (index, descriptor) in data.invalid_ids.iter().enumerate() {
        let raw = descriptor.id.to_string();
        let row = || format!("test-data invalidIds[{}]", index);
        if raw.trim().is_empty() {
            return Err(malformed(row(), "id must not be empty"));
        }
        if raw.contains('/') || raw == "." || raw == ".." {
            return Err(malformed(row(), "id must be a single path segment"));
        }
        if !(400..500).contains(&descriptor.expected_status) {
            return Err(malformed(row(), "expectedStatus must be a 4xx status"));
        }
        cases.push(CaseSpec::new(
            format!("invalid id \"{}\" returns {}", raw, descriptor.expected_status),
            "invalid-id",
            CaseKind::InvalidId {
                raw,
                expected_status: descriptor.expected_status,
            },
        ));
    }

    Ok(cases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{InvalidIdDescriptor, RawId, SearchDescriptor};
    use storecheck_client::{NewProduct, ProductPatch};

    fn data() -> TestData {
        TestData {
            valid_product_id: 1,
            search_query: "phone".to_string(),
            new_product: NewProduct {
                title: "Test Product".to_string(),
                price: 19.99,
                description: "Sample".to_string(),
                category: None,
                brand: None,
            },
            update_data: ProductPatch::title("Updated Title"),
            product_ids: vec![1, 10],
            search_queries: vec![
                SearchDescriptor {
                    query: "phone".to_string(),
                    expected_min_results: 1,
                },
                SearchDescriptor {
                    query: "laptop".to_string(),
                    expected_min_results: 2,
                },
            ],
            invalid_ids: vec![InvalidIdDescriptor {
                id: RawId::Text("abc".to_string()),
                expected_status: 400,
            }],
        }
    }

    #[test]
    fn test_one_case_per_row_in_order() {
        let cases = generate_cases(&data()).unwrap();
        let names: Vec<&str> = cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Dynamic test 1: search for \"phone\"",
                "Dynamic test 2: search for \"laptop\"",
                "product 1 matches contract",
                "product 10 matches contract",
                "invalid id \"abc\" returns 400",
            ]
        );
        assert!(cases.iter().all(|c| c.tags[0] == DATA_DRIVEN_TAG));
    }

    #[test]
    fn test_values_are_bound_at_generation() {
        let mut table = data();
        let cases = generate_cases(&table).unwrap();
        table.search_queries[0].query = "changed".to_string();

        assert_eq!(
            cases[0].kind,
            CaseKind::Search {
                query: "phone".to_string(),
                expected_min_results: 1
            }
        );
    }

    #[test]
    fn test_empty_tables_generate_nothing() {
        let mut table = data();
        table.search_queries.clear();
        table.product_ids.clear();
        table.invalid_ids.clear();
        assert!(generate_cases(&table).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_rows_are_fatal() {
        let mut zero_id = data();
        zero_id.product_ids.push(0);
        assert!(matches!(
            generate_cases(&zero_id),
            Err(E2eError::Fixture { .. })
        ));

        let mut blank = data();
        blank.invalid_ids[0].id = RawId::Text("  ".to_string());
        assert!(generate_cases(&blank).is_err());

        let mut success_status = data();
        success_status.invalid_ids[0].expected_status = 200;
        assert!(generate_cases(&success_status).is_err());

        let mut nested = data();
        nested.invalid_ids[0].id = RawId::Text("1/2".to_string());
        assert!(generate_cases(&nested).is_err());
    }

    #[test]
    fn test_dot_segment_ids_are_fatal() {
        for raw in [".", ".."] {
            let mut table = data();
            table.invalid_ids[0].id = RawId::Text(raw.to_string());
            assert!(matches!(
                generate_cases(&table),
                Err(E2eError::Fixture { .. })
            ));
        }
    }

    #[test]
    fn test_query_like_ids_are_kept_verbatim() {
        let mut table = data();
        table.invalid_ids[0].id = RawId::Text("1?x=1".to_string());
        let cases = generate_cases(&table).unwrap();
        assert_eq!(
            cases.last().map(|c| &c.kind),
            Some(&CaseKind::InvalidId {
                raw: "1?x=1".to_string(),
                expected_status: 400
            })
        );
    }
}
