//! Main test runner that loads fixtures, builds the suite and executes it

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use storecheck_client::{Gateway, GatewayConfig, ProductsApi};
use tracing::{debug, error, info, warn};

use crate::cases::{generate_cases, CaseSpec, DATA_DRIVEN_TAG};
use crate::error::{E2eError, E2eResult};
use crate::fixtures::Fixtures;
use crate::scenarios::{self, Outcome, Scenario, ScenarioContext};
use crate::server::{StubConfig, StubServer};

/// Final state of one test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Passed,
    Tolerated,
    Failed,
}

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub group: String,
    pub status: Status,
    pub attempts: u32,
    pub duration_ms: u64,
    pub note: Option<String>,
    pub error: Option<String>,
}

impl TestResult {
    pub fn success(&self) -> bool {
        self.status != Status::Failed
    }
}

/// Result of running the whole suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub environment: String,
    pub base_url: String,
    pub total: usize,
    pub passed: usize,
    pub tolerated: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn find(&self, name: &str) -> Option<&TestResult> {
        self.results.iter().find(|r| r.name == name)
    }
}

/// One runnable entry: a hand-written scenario or a generated case
#[derive(Debug, Clone)]
pub enum SuiteEntry {
    Scenario(Scenario),
    Case(CaseSpec),
}

impl SuiteEntry {
    pub fn name(&self) -> &str {
        match self {
            SuiteEntry::Scenario(s) => s.name,
            SuiteEntry::Case(c) => &c.name,
        }
    }

    pub fn group(&self) -> &str {
        match self {
            SuiteEntry::Scenario(s) => s.group.as_str(),
            SuiteEntry::Case(c) => c.tags.first().map(String::as_str).unwrap_or(DATA_DRIVEN_TAG),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        match self {
            SuiteEntry::Scenario(s) => s.tags.iter().any(|t| *t == tag),
            SuiteEntry::Case(c) => c.tags.iter().any(|t| t == tag),
        }
    }

    fn retries(&self) -> u32 {
        match self {
            SuiteEntry::Scenario(s) => s.retries,
            SuiteEntry::Case(_) => 0,
        }
    }

    async fn execute(&self, ctx: &ScenarioContext) -> E2eResult<Outcome> {
        match self {
            SuiteEntry::Scenario(s) => s.run(ctx).await,
            SuiteEntry::Case(c) => c.execute(&ctx.api).await,
        }
    }
}

/// Keep the entries matching the name and tag filters. A name filter that
/// matches nothing is an error.
pub fn select(
    entries: Vec<SuiteEntry>,
    tag: Option<&str>,
    name: Option<&str>,
) -> E2eResult<Vec<SuiteEntry>> {
    let selected: Vec<SuiteEntry> = entries
        .into_iter()
        .filter(|e| tag.map(|t| e.has_tag(t)).unwrap_or(true))
        .filter(|e| name.map(|n| e.name() == n).unwrap_or(true))
        .collect();

    match name {
        Some(n) if selected.is_empty() => Err(E2eError::TestNotFound(n.to_string())),
        _ => Ok(selected),
    }
}

/// Configuration for the test runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Directory holding environments and test-data fixtures
    pub fixtures_dir: PathBuf,

    /// Environment profile to use
    pub environment: String,

    /// Overrides the profile's base URL
    pub base_url: Option<String>,

    /// Run against the in-process stub catalog instead of the network
    pub offline: bool,

    /// Stub settings for offline runs
    pub stub: StubConfig,

    /// Run only tests carrying this tag
    pub tag: Option<String>,

    /// Run only the test with this name
    pub name: Option<String>,

    /// Output directory for results
    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            fixtures_dir: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures")),
            environment: "development".to_string(),
            base_url: None,
            offline: false,
            stub: StubConfig::default(),
            tag: None,
            name: None,
            output_dir: PathBuf::from("test-results"),
        }
    }
}

/// The suite after the build phase: context plus the ordered entries
pub struct SuitePlan {
    pub context: ScenarioContext,
    pub entries: Vec<SuiteEntry>,
}

/// Main e2e test runner
pub struct TestRunner {
    config: RunnerConfig,

    /// Running stub (offline runs only)
    server: Option<StubServer>,
}

impl TestRunner {
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    pub fn with_config(config: RunnerConfig) -> Self {
        Self {
            config,
            server: None,
        }
    }

    /// Start the stub catalog and return its URL
    pub async fn start_server(&mut self) -> E2eResult<String> {
        if let Some(server) = &self.server {
            return Ok(server.base_url().to_string());
        }
        let server = StubServer::spawn(self.config.stub.clone()).await?;
        let url = server.base_url().to_string();
        self.server = Some(server);
        Ok(url)
    }

    pub fn stop_server(&mut self) {
        if let Some(mut server) = self.server.take() {
            server.stop();
        }
    }

    /// Build phase: load fixtures, resolve the environment, generate cases.
    /// Any failure here is fatal for the whole run.
    pub async fn prepare(&mut self) -> E2eResult<SuitePlan> {
        let fixtures = Fixtures::load(&self.config.fixtures_dir)?;
        let profile = fixtures.environments.get(&self.config.environment)?.clone();
        let cases = generate_cases(&fixtures.test_data)?;

        let base_url = if self.config.offline {
            self.start_server().await?
        } else {
            self.config
                .base_url
                .clone()
                .unwrap_or_else(|| profile.base_url.clone())
        };

        let gateway = Gateway::with_config(GatewayConfig {
            base_url,
            default_timeout: Duration::from_millis(profile.timeout_ms),
            ..Default::default()
        })?;

        let entries: Vec<SuiteEntry> = scenarios::all()
            .into_iter()
            .map(SuiteEntry::Scenario)
            .chain(cases.into_iter().map(SuiteEntry::Case))
            .collect();
        let entries = select(entries, self.config.tag.as_deref(), self.config.name.as_deref())?;

        info!(
            environment = %self.config.environment,
            base_url = gateway.base_url(),
            tests = entries.len(),
            "Suite prepared"
        );

        Ok(SuitePlan {
            context: ScenarioContext {
                api: ProductsApi::new(gateway),
                data: fixtures.test_data,
                environment: self.config.environment.clone(),
                environments: fixtures.environments,
                profile,
            },
            entries,
        })
    }

    /// Prepare and run everything the filters select
    pub async fn run_all(&mut self) -> E2eResult<TestSuiteResult> {
        let plan = self.prepare().await?;
        Ok(self.run_plan(&plan).await)
    }

    /// Run the entries of a prepared plan one after another
    pub async fn run_plan(&self, plan: &SuitePlan) -> TestSuiteResult {
        let start = Instant::now();
        let mut results = Vec::with_capacity(plan.entries.len());

        info!("Running {} test(s)...", plan.entries.len());

        for entry in &plan.entries {
            let result = self.run_entry(&plan.context, entry).await;
            match result.status {
                Status::Passed => info!("✓ {} ({} ms)", result.name, result.duration_ms),
                Status::Tolerated => warn!(
                    "~ {} - {}",
                    result.name,
                    result.note.as_deref().unwrap_or("tolerated")
                ),
                Status::Failed => error!(
                    "✗ {} - {}",
                    result.name,
                    result.error.as_deref().unwrap_or("unknown error")
                ),
            }
            results.push(result);
        }

        let count = |status: Status| results.iter().filter(|r| r.status == status).count();
        let passed = count(Status::Passed);
        let tolerated = count(Status::Tolerated);
        let failed = count(Status::Failed);
        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Test Results: {} passed, {} tolerated, {} failed ({} ms)",
            passed, tolerated, failed, duration_ms
        );

        TestSuiteResult {
            environment: plan.context.environment.clone(),
            base_url: plan.context.api.gateway().base_url().to_string(),
            total: results.len(),
            passed,
            tolerated,
            failed,
            duration_ms,
            results,
        }
    }

    /// Run one entry, retrying failures as many times as it allows
    async fn run_entry(&self, ctx: &ScenarioContext, entry: &SuiteEntry) -> TestResult {
        let start = Instant::now();
        let max_attempts = entry.retries() + 1;
        let mut attempts = 0;

        let outcome = loop {
            attempts += 1;
            debug!("Running test: {} (attempt {})", entry.name(), attempts);

            match entry.execute(ctx).await {
                Err(e) if attempts < max_attempts => {
                    warn!("{} failed on attempt {}: {}; retrying", entry.name(), attempts, e);
                }
                other => break other,
            }
        };

        let (status, note, error) = match outcome {
            Ok(Outcome::Passed) => (Status::Passed, None, None),
            Ok(Outcome::Tolerated(note)) => (Status::Tolerated, Some(note), None),
            Err(e) => (Status::Failed, None, Some(e.to_string())),
        };

        TestResult {
            name: entry.name().to_string(),
            group: entry.group().to_string(),
            status,
            attempts,
            duration_ms: start.elapsed().as_millis() as u64,
            note,
            error,
        }
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestRunner {
    fn drop(&mut self) {
        self.stop_server();
    }
}
