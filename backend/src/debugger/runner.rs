// Test Runner - scripted scenarios scored against debug sessions

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ticketflow_shared::WorkflowContext;
use tracing::{info, warn};
use uuid::Uuid;

use super::controller::DebugController;
use super::session::{Coverage, DebugSession, Performance, SessionStatus};
use crate::error::{WorkflowError, WorkflowResult};
use crate::workflows::conditions::{value_to_string, values_equal};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssertionType {
    Equals,
    NotEquals,
    /// Exact string equality of both sides, not a substring test.
    Contains,
    /// Not implemented; always fails.
    GreaterThan,
    Exists,
    NotExists,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assertion {
    #[serde(rename = "type")]
    pub assertion_type: AssertionType,
    pub field: String,
    #[serde(default)]
    pub expected: Value,
}

impl Assertion {
    pub fn new(assertion_type: AssertionType, field: impl Into<String>, expected: impl Into<Value>) -> Self {
        Self {
            assertion_type,
            field: field.into(),
            expected: expected.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestScenario {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub workflow_id: Uuid,
    #[serde(default)]
    pub test_data: WorkflowContext,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
}

impl TestScenario {
    pub fn new(name: impl Into<String>, workflow_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            workflow_id,
            test_data: WorkflowContext::new(),
            assertions: Vec::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.test_data.insert(key.into(), value.into());
        self
    }

    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionResult {
    pub assertion: Assertion,
    pub passed: bool,
    pub actual: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestFailure {
    pub field: String,
    pub message: String,
    pub expected: Value,
    pub actual: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub scenario_id: Uuid,
    pub scenario_name: String,
    pub session_id: Option<Uuid>,
    pub session_status: Option<SessionStatus>,
    pub passed: bool,
    pub total_assertions: usize,
    pub passed_assertions: usize,
    pub failed_assertions: usize,
    pub assertion_results: Vec<AssertionResult>,
    pub failures: Vec<TestFailure>,
    pub coverage: Coverage,
    pub performance: Performance,
    pub duration_ms: u64,
    pub timed_out: bool,
    pub error: Option<String>,
}

impl TestResult {
    fn empty(scenario: &TestScenario) -> Self {
        Self {
            scenario_id: scenario.id,
            scenario_name: scenario.name.clone(),
            session_id: None,
            session_status: None,
            passed: false,
            total_assertions: scenario.assertions.len(),
            passed_assertions: 0,
            failed_assertions: 0,
            assertion_results: Vec::new(),
            failures: Vec::new(),
            coverage: Coverage::default(),
            performance: Performance::default(),
            duration_ms: 0,
            timed_out: false,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<TestResult>,
    pub duration_ms: u64,
}

impl TestSuiteResult {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

pub struct TestRunner {
    controller: Arc<DebugController>,
    timeout: Duration,
}

impl TestRunner {
    pub fn new(controller: Arc<DebugController>) -> Self {
        let timeout = controller.config().test_timeout;
        Self { controller, timeout }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs one scenario through a debug session and scores its assertions
    /// against the final session variables.
    pub async fn run_test_scenario(&self, scenario: &TestScenario) -> WorkflowResult<TestResult> {
        let started = Instant::now();
        let mut result = TestResult::empty(scenario);

        let session_id = self
            .controller
            .start_debug_session(scenario.workflow_id, scenario.test_data.clone())
            .await?;
        result.session_id = Some(session_id);

        let session = match self
            .controller
            .wait_for_completion(session_id, self.timeout)
            .await?
        {
            Some(session) => session,
            None => {
                if let Err(e) = self.controller.stop(session_id).await {
                    warn!(%session_id, error = %e, "Failed to stop timed out session");
                }
                let snapshot = self.controller.get_debug_session(session_id).await?;
                warn!(scenario = %scenario.name, %session_id, "Test scenario timed out");

                result.timed_out = true;
                result.error = Some(format!("timed out after {}s", self.timeout.as_secs_f64()));
                result.session_status = Some(snapshot.status);
                result.coverage = snapshot.coverage;
                result.performance = snapshot.performance;
                result.duration_ms = started.elapsed().as_millis() as u64;
                return Ok(result);
            }
        };

        for assertion in &scenario.assertions {
            let actual = resolve_field(&session.variables, &assertion.field).cloned();
            let passed = evaluate_assertion(assertion, actual.as_ref());

            if !passed {
                result.failures.push(TestFailure {
                    field: assertion.field.clone(),
                    message: failure_message(assertion, actual.as_ref()),
                    expected: assertion.expected.clone(),
                    actual: actual.clone(),
                });
            }
            result.assertion_results.push(AssertionResult {
                assertion: assertion.clone(),
                passed,
                actual,
            });
        }

        result.passed_assertions = result.assertion_results.iter().filter(|r| r.passed).count();
        result.failed_assertions = result.total_assertions - result.passed_assertions;
        result.passed = result.failed_assertions == 0;
        finish(&mut result, session, started);

        info!(
            scenario = %scenario.name,
            passed = result.passed,
            failed_assertions = result.failed_assertions,
            "Test scenario finished"
        );
        Ok(result)
    }

    /// Runs scenarios one after another. A scenario that cannot start counts
    /// as failed with its error recorded.
    pub async fn run_test_suite(&self, scenarios: &[TestScenario]) -> TestSuiteResult {
        let started = Instant::now();
        let mut results = Vec::with_capacity(scenarios.len());

        for scenario in scenarios {
            let result = match self.run_test_scenario(scenario).await {
                Ok(result) => result,
                Err(e) => errored(scenario, &e),
            };
            results.push(result);
        }

        let passed = results.iter().filter(|r| r.passed).count();
        TestSuiteResult {
            total: results.len(),
            passed,
            failed: results.len() - passed,
            results,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

fn finish(result: &mut TestResult, session: DebugSession, started: Instant) {
    result.session_status = Some(session.status);
    result.error = session.error;
    result.coverage = session.coverage;
    result.performance = session.performance;
    result.duration_ms = started.elapsed().as_millis() as u64;
}

fn errored(scenario: &TestScenario, error: &WorkflowError) -> TestResult {
    let mut result = TestResult::empty(scenario);
    result.error = Some(error.to_string());
    result
}

/// Direct keys win over dot paths, so `a.b` finds a literal `"a.b"` key
/// before descending into `a`.
fn resolve_field<'a>(variables: &'a WorkflowContext, field: &str) -> Option<&'a Value> {
    if let Some(value) = variables.get(field) {
        return Some(value);
    }

    let mut parts = field.split('.');
    let mut current = variables.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

pub fn evaluate_assertion(assertion: &Assertion, actual: Option<&Value>) -> bool {
    let present = actual.filter(|v| !v.is_null());
    match assertion.assertion_type {
        AssertionType::Equals => present.is_some_and(|a| values_equal(a, &assertion.expected)),
        AssertionType::NotEquals => !present.is_some_and(|a| values_equal(a, &assertion.expected)),
        AssertionType::Contains => {
            present.is_some_and(|a| value_to_string(a) == value_to_string(&assertion.expected))
        }
        AssertionType::GreaterThan => false,
        AssertionType::Exists => present.is_some(),
        AssertionType::NotExists => present.is_none(),
        AssertionType::Unknown => false,
    }
}

fn failure_message(assertion: &Assertion, actual: Option<&Value>) -> String {
    let actual = actual.map(value_to_string).unwrap_or_else(|| "missing".to_string());
    match assertion.assertion_type {
        AssertionType::Exists => format!("expected '{}' to exist", assertion.field),
        AssertionType::NotExists => format!("expected '{}' not to exist, found {}", assertion.field, actual),
        AssertionType::GreaterThan => "greater_than assertions are not supported".to_string(),
        AssertionType::Unknown => "unknown assertion type".to_string(),
        _ => format!(
            "{:?} failed for '{}': expected {}, got {}",
            assertion.assertion_type,
            assertion.field,
            value_to_string(&assertion.expected),
            actual
        ),
    }
}
