//! Fixture loading: environment profiles and test-data tables
//!
//! Fixtures live in one directory as `environments.{yaml,yml,json}` and
//! `test-data.{yaml,yml,json}`. They are read once, before any test runs; a
//! missing or malformed file stops the suite.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use storecheck_client::{NewProduct, ProductPatch};
use tracing::debug;

use crate::error::{E2eError, E2eResult};

pub const ENVIRONMENTS_STEM: &str = "environments";
pub const TEST_DATA_STEM: &str = "test-data";

/// Connection settings for one named environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentProfile {
    pub base_url: String,

    /// Default per-request timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Upper bound for the response-time check
    #[serde(default = "default_response_time_budget_ms")]
    pub response_time_budget_ms: u64,

    /// Timeout used by the timeout-tolerance scenario
    #[serde(default = "default_short_timeout_ms")]
    pub short_timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_response_time_budget_ms() -> u64 {
    5_000
}

fn default_short_timeout_ms() -> u64 {
    1_000
}

/// Environment profiles keyed by name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Environments(BTreeMap<String, EnvironmentProfile>);

impl Environments {
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        serde_yaml::from_str(yaml).map_err(E2eError::from)
    }

    pub fn get(&self, name: &str) -> E2eResult<&EnvironmentProfile> {
        self.0.get(name).ok_or_else(|| E2eError::UnknownEnvironment {
            name: name.to_string(),
            available: self.names().join(", "),
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}

/// One search-driven case: `query` must return at least
/// `expected_min_results` products
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDescriptor {
    pub query: String,
    pub expected_min_results: u64,
}

/// An id segment as written in the fixture: a number or arbitrary text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Number(i64),
    Text(String),
}

impl fmt::Display for RawId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawId::Number(n) => write!(f, "{}", n),
            RawId::Text(s) => f.write_str(s),
        }
    }
}

/// One negative case: requesting `id` must answer `expected_status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidIdDescriptor {
    pub id: RawId,

    #[serde(default = "default_invalid_status")]
    pub expected_status: u16,
}

fn default_invalid_status() -> u16 {
    404
}

/// The test-data table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestData {
    #[serde(default = "default_valid_product_id")]
    pub valid_product_id: u64,

    #[serde(default = "default_search_query")]
    pub search_query: String,

    pub new_product: NewProduct,

    pub update_data: ProductPatch,

    #[serde(default)]
    pub product_ids: Vec<u64>,

    #[serde(default)]
    pub search_queries: Vec<SearchDescriptor>,

    #[serde(default)]
    pub invalid_ids: Vec<InvalidIdDescriptor>,
}

fn default_valid_product_id() -> u64 {
    1
}

fn default_search_query() -> String {
    "phone".to_string()
}

impl TestData {
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        serde_yaml::from_str(yaml).map_err(E2eError::from)
    }
}

/// Everything read from the fixtures directory
#[derive(Debug, Clone)]
pub struct Fixtures {
    pub dir: PathBuf,
    pub environments: Environments,
    pub test_data: TestData,
}

impl Fixtures {
    /// Load both tables from `dir`
    pub fn load(dir: &Path) -> E2eResult<Self> {
        if !dir.is_dir() {
            return Err(E2eError::Fixture {
                path: dir.display().to_string(),
                reason: "fixtures directory does not exist".to_string(),
            });
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            environments: load_table(dir, ENVIRONMENTS_STEM)?,
            test_data: load_table(dir, TEST_DATA_STEM)?,
        })
    }
}

/// Find `<stem>.{yaml,yml,json}` directly inside `dir`
pub fn find_table(dir: &Path, stem: &str) -> Option<PathBuf> {
    walkdir::WalkDir::new(dir)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .find(|path| {
            path.is_file()
                && path.file_stem().map(|s| s == stem).unwrap_or(false)
                && path
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml" || ext == "json")
                    .unwrap_or(false)
        })
}

/// Locate and parse one fixture table. Any failure names the file.
pub fn load_table<T: DeserializeOwned>(dir: &Path, stem: &str) -> E2eResult<T> {
    let path = find_table(dir, stem).ok_or_else(|| E2eError::Fixture {
        path: dir.join(format!("{}.yaml", stem)).display().to_string(),
        reason: "fixture file not found".to_string(),
    })?;
    debug!("Loading fixture {}", path.display());

    let fixture_error = |reason: String| E2eError::Fixture {
        path: path.display().to_string(),
        reason,
    };

    let content = std::fs::read_to_string(&path).map_err(|e| fixture_error(e.to_string()))?;
    let is_json = path.extension().map(|ext| ext == "json").unwrap_or(false);
    if is_json {
        serde_json::from_str(&content).map_err(|e| fixture_error(e.to_string()))
    } else {
        serde_yaml::from_str(&content).map_err(|e| fixture_error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_DATA: &str = r#"
newProduct:
  title: Test Product
  price: 19.99
  description: Sample product
updateData:
  title: Updated Title
productIds: [1, 2, 3]
searchQueries:
  - query: phone
    expectedMinResults: 1
  - query: ""
    expectedMinResults: 0
invalidIds:
  - id: 99999
  - id: abc
    expectedStatus: 400
"#;

    #[test]
    fn test_parse_test_data() {
        let data = TestData::from_yaml(TEST_DATA).unwrap();
        assert_eq!(data.valid_product_id, 1);
        assert_eq!(data.search_query, "phone");
        assert_eq!(data.product_ids, vec![1, 2, 3]);
        assert_eq!(data.search_queries[1].query, "");
        assert_eq!(data.invalid_ids[0].id, RawId::Number(99999));
        assert_eq!(data.invalid_ids[0].expected_status, 404);
        assert_eq!(data.invalid_ids[1].id.to_string(), "abc");
        assert_eq!(data.update_data.title.as_deref(), Some("Updated Title"));
    }

    #[test]
    fn test_missing_new_product_is_an_error() {
        assert!(TestData::from_yaml("updateData: {}\n").is_err());
    }

    #[test]
    fn test_environment_defaults_and_lookup() {
        let envs = Environments::from_yaml(
            r#"
development:
  baseUrl: https://dummyjson.com
staging:
  baseUrl: https://staging.example.com
  responseTimeBudgetMs: 8000
"#,
        )
        .unwrap();

        let dev = envs.get("development").unwrap();
        assert_eq!(dev.timeout_ms, 30_000);
        assert_eq!(dev.response_time_budget_ms, 5_000);
        assert_eq!(dev.short_timeout_ms, 1_000);
        assert_eq!(envs.get("staging").unwrap().response_time_budget_ms, 8_000);

        match envs.get("production") {
            Err(E2eError::UnknownEnvironment { available, .. }) => {
                assert_eq!(available, "development, staging")
            }
            other => panic!("expected unknown environment, got {:?}", other),
        }
    }

    #[test]
    fn test_load_from_directory_mixed_formats() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("environments.json"),
            r#"{"development": {"baseUrl": "http://127.0.0.1:1"}}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("test-data.yml"), TEST_DATA).unwrap();

        let fixtures = Fixtures::load(dir.path()).unwrap();
        assert_eq!(fixtures.environments.names(), vec!["development"]);
        assert_eq!(fixtures.test_data.search_queries.len(), 2);
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("environments.yaml"), "development: [").unwrap();

        match Fixtures::load(dir.path()) {
            Err(E2eError::Fixture { path, .. }) => assert!(path.ends_with("environments.yaml")),
            other => panic!("expected fixture error, got {:?}", other),
        }

        std::fs::write(
            dir.path().join("environments.yaml"),
            "development:\n  baseUrl: http://x\n",
        )
        .unwrap();
        match Fixtures::load(dir.path()) {
            Err(E2eError::Fixture { reason, .. }) => assert_eq!(reason, "fixture file not found"),
            other => panic!("expected fixture error, got {:?}", other),
        }

        assert!(Fixtures::load(&dir.path().join("absent")).is_err());
    }
}
