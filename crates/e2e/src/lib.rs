//! storecheck e2e suite
//!
//! This crate runs the products API suite:
//! - Loads environment profiles and test-data tables from fixture files
//! - Generates one case per fixture descriptor
//! - Runs the scenario suite against the live API or an in-process stub
//! - Writes a JSON report of the results
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TestRunner                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  prepare()                                                   │
//! │    ├── Fixtures::load(dir)           environments, test data │
//! │    ├── generate_cases(&test_data) -> Vec<CaseSpec>           │
//! │    ├── StubServer::spawn()           offline runs only       │
//! │    └── scenarios::all() + cases   -> SuitePlan               │
//! │  run_plan(plan) -> TestSuiteResult                           │
//! │    └── per entry: execute, retry, record                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  validate: envelope, entity, detail, delete receipt          │
//! │  storecheck-client: Gateway -> ProductsApi                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod cases;
pub mod error;
pub mod fixtures;
pub mod runner;
pub mod scenarios;
pub mod server;
pub mod validate;

pub use error::{E2eError, E2eResult};
pub use runner::{RunnerConfig, TestRunner, TestSuiteResult};
pub use server::{StubConfig, StubServer};
