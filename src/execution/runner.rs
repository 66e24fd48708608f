// The scheduler: iterates test cases in dependency order, runs their
// steps sequentially, skips dependents of failed cases transitively.
//
// Failure model: a validation fail marks the case and the run moves on
// (or stops entirely with stop_at_first_failure); a dispatch or internal
// error aborts the whole run.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result, anyhow};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::check::{ResponseChecker, ValidationFail};
use crate::config::test_cases::{Step, TestCase};
use crate::error::user_error;
use crate::grpc::client::ClientPool;
use crate::grpc::response::{GrpcResponse, StreamEvent};
use crate::variables::Variables;

/// Names of failed test cases, failed dependencies included.
#[derive(Debug, Default)]
struct FailedCases(HashSet<String>);

impl FailedCases {
    fn add(&mut self, name: &str) {
        self.0.insert(name.to_string());
    }

    fn failed_dependency<'a>(&self, depends_on: &'a [String]) -> Option<&'a str> {
        depends_on
            .iter()
            .find(|dependency| self.0.contains(*dependency))
            .map(String::as_str)
    }

    fn into_names(self) -> Vec<String> {
        let mut names: Vec<String> = self.0.into_iter().collect();
        names.sort();
        names
    }
}

#[derive(Debug)]
pub struct RunSummary {
    /// Failed case names, skipped dependents included.
    pub failed: Vec<String>,
}

impl RunSummary {
    pub fn all_passed(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Runner {
    test_cases: Vec<TestCase>,
    clients: ClientPool,
    checker: ResponseChecker,
    variables: Variables,
    stop_at_first_failure: bool,
}

impl Runner {
    pub fn new(
        test_cases: Vec<TestCase>,
        clients: ClientPool,
        checker: ResponseChecker,
        variables: Variables,
        stop_at_first_failure: bool,
    ) -> Self {
        Self {
            test_cases,
            clients,
            checker,
            variables,
            stop_at_first_failure,
        }
    }

    pub async fn run(mut self) -> Result<RunSummary> {
        let test_cases = std::mem::take(&mut self.test_cases);
        let mut failed = FailedCases::default();

        'cases: for test_case in &test_cases {
            if let Some(dependency) = failed.failed_dependency(&test_case.depends_on) {
                info!(
                    "test case {} skipped due to failed dependency {}",
                    test_case.name, dependency
                );
                failed.add(&test_case.name);
                continue;
            }

            for (i, step) in test_case.steps.iter().enumerate() {
                let fails = self
                    .run_step(step)
                    .await
                    .with_context(|| format!("for step {} of test case {}", i + 1, test_case.name))?;

                if !fails.is_empty() {
                    failed.add(&test_case.name);
                    self.report_fails(&test_case.name, i, &fails);
                    if self.stop_at_first_failure {
                        warn!("stopping the run after the first failed test case");
                        break 'cases;
                    }
                    continue 'cases;
                }
            }

            info!("test case {} was finished successfully", test_case.name);
        }

        Ok(RunSummary {
            failed: failed.into_names(),
        })
    }

    async fn run_step(&mut self, step: &Step) -> Result<Vec<ValidationFail>> {
        let (metadata, request) = prepare_request(&self.variables, step)?;
        let expected = prepare_expected(&self.variables, step)?;

        let full_name = step.method_full_name();
        let client = self
            .clients
            .get_mut(&step.service_name)
            .ok_or_else(|| anyhow!("no client for service {}", step.service_name))?;
        let mut response = client
            .invoke(&full_name, &request, &metadata)
            .await
            .with_context(|| format!("error on calling service {}", step.service_name))?;

        if response.is_stream() {
            self.check_stream(step, &mut response, expected.as_ref()).await
        } else {
            self.check_unary(step, &response, expected.as_ref())
        }
    }

    fn check_unary(
        &mut self,
        step: &Step,
        response: &GrpcResponse,
        expected: Option<&Map<String, Value>>,
    ) -> Result<Vec<ValidationFail>> {
        let status_fails = self
            .checker
            .check_status(Some(&response.status), step.status.as_ref());
        if !status_fails.is_empty() {
            return Ok(status_fails);
        }

        self.checker
            .check_body(&response.body, expected, &mut self.variables)
            .map_err(Into::into)
    }

    /// Consume frames until one satisfies the expectation or the stream
    /// ends. End-of-stream with no matching frame is a fail carrying the
    /// last evaluated fail set.
    async fn check_stream(
        &mut self,
        step: &Step,
        response: &mut GrpcResponse,
        expected: Option<&Map<String, Value>>,
    ) -> Result<Vec<ValidationFail>> {
        // `stream: [...]` lists per-frame expectations by index; any other
        // body is one expectation applied to every frame.
        let frames = expected.and_then(|map| map.get("stream")).and_then(Value::as_array);
        let uniform = if frames.is_none() { expected } else { None };

        let mut last_fails: Vec<ValidationFail> = Vec::new();
        let mut index = 0usize;
        loop {
            match response.receive().await? {
                StreamEvent::EndOfStream => {
                    if !last_fails.is_empty() {
                        return Ok(last_fails);
                    }
                    if index == 0
                        && let Some(expected) = expected
                    {
                        return Ok(vec![ValidationFail::new(
                            "stream",
                            "",
                            Value::Object(expected.clone()),
                            "end of stream",
                        )]);
                    }
                    return Ok(Vec::new());
                }
                StreamEvent::Frame => {
                    let status_fails = self
                        .checker
                        .check_status(Some(&response.status), step.status.as_ref());
                    if !status_fails.is_empty() {
                        return Ok(status_fails);
                    }

                    let frame_expected = match frames {
                        Some(frames) => frames.get(index).and_then(Value::as_object),
                        None => uniform,
                    };
                    let fails = self
                        .checker
                        .check_body(&response.body, frame_expected, &mut self.variables)
                        .with_context(|| format!("error checking stream message #{index}"))?;
                    if fails.is_empty() {
                        return Ok(Vec::new());
                    }
                    last_fails = fails;
                    index += 1;
                }
            }
        }
    }

    fn report_fails(&self, test_case: &str, step: usize, fails: &[ValidationFail]) {
        for fail in fails {
            warn!(
                field = %fail.path,
                predicate = %fail.predicate,
                expected = %fail.expected,
                actual = %fail.actual,
                "expectation did not hold"
            );
        }
        warn!(
            "test case {}, step {} finished with some fails",
            test_case,
            step + 1
        );
    }
}

/// Substitute variables in the step metadata, merge it over the service
/// defaults (step keys win), and substitute variables in the request text.
/// A step without a request body sends an empty message.
fn prepare_request(
    variables: &Variables,
    step: &Step,
) -> Result<(HashMap<String, String>, String)> {
    let mut merged = step.service.metadata.clone();
    merged.extend(step.metadata.clone());
    // Strict pass over the merged map: service defaults were materialized
    // leniently at startup, so run-captured variables resolve here.
    variables
        .substitute_map(&mut merged)
        .context("metadata build error")?;

    let request = match &step.request {
        Some(text) => variables
            .substitute(text)
            .context("error on replacing variables in request")?,
        None => "{}".to_string(),
    };

    Ok((merged, request))
}

/// Substitute variables in the expected response text and parse it; an
/// absent body means no body assertion.
fn prepare_expected(variables: &Variables, step: &Step) -> Result<Option<Map<String, Value>>> {
    let Some(text) = &step.response else {
        return Ok(None);
    };

    let replaced = variables
        .substitute(text)
        .context("error on replacing variables in response")?;
    let map: Map<String, Value> = serde_json::from_str(&replaced)
        .map_err(|err| user_error(format!("error parsing expected response: {err}")))?;
    Ok(Some(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::services::Service;

    fn step_with(
        request: Option<&str>,
        metadata: &[(&str, &str)],
        service_metadata: &[(&str, &str)],
    ) -> Step {
        Step {
            service_name: "cart".to_string(),
            method: "AddItem".to_string(),
            request: request.map(String::from),
            response: None,
            status: None,
            metadata: metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            store: HashMap::new(),
            stream: false,
            service: Service {
                address: "localhost:9000".to_string(),
                service: "shop.v1.Cart".to_string(),
                tls: None,
                metadata: service_metadata
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
        }
    }

    #[test]
    fn test_failed_dependency_lookup() {
        let mut failed = FailedCases::default();
        failed.add("login");

        let depends = vec!["other".to_string(), "login".to_string()];
        assert_eq!(failed.failed_dependency(&depends), Some("login"));
        assert_eq!(failed.failed_dependency(&["other".to_string()]), None);
    }

    #[test]
    fn test_prepare_request_substitutes_and_merges() {
        let mut variables = Variables::new();
        variables.store("auth", "token-1");
        variables.store("sku", "a-9");

        let step = step_with(
            Some(r#"{"sku": "$sku"}"#),
            &[("x-trace", "on"), ("authorization", "$auth")],
            &[("authorization", "default"), ("tenant", "acme")],
        );

        let (metadata, request) = prepare_request(&variables, &step).unwrap();
        assert_eq!(request, r#"{"sku": "a-9"}"#);
        // Step metadata overrides the service default; other defaults stay.
        assert_eq!(metadata["authorization"], "token-1");
        assert_eq!(metadata["tenant"], "acme");
        assert_eq!(metadata["x-trace"], "on");
    }

    #[test]
    fn test_service_metadata_token_resolves_from_stored_variable() {
        // Service defaults may carry tokens that only a previous step's
        // `store` fills in; the merged map resolves them strictly.
        let mut variables = Variables::new();
        variables.store("auth", "xyz");

        let step = step_with(None, &[], &[("authorization", "$auth")]);
        let (metadata, _) = prepare_request(&variables, &step).unwrap();
        assert_eq!(metadata["authorization"], "xyz");
    }

    #[test]
    fn test_prepare_request_defaults_to_empty_body() {
        let variables = Variables::new();
        let step = step_with(None, &[], &[]);
        let (_, request) = prepare_request(&variables, &step).unwrap();
        assert_eq!(request, "{}");
    }

    #[test]
    fn test_prepare_request_missing_variable() {
        let variables = Variables::new();
        let step = step_with(Some(r#"{"sku": "$ghost"}"#), &[], &[]);
        let err = prepare_request(&variables, &step).unwrap_err();
        assert!(crate::error::find_user_error(&err).is_some());
    }

    #[test]
    fn test_prepare_expected_parses_map() {
        let mut variables = Variables::new();
        variables.store("total", "3");

        let mut step = step_with(None, &[], &[]);
        step.response = Some(r#"{"total": $total}"#.to_string());

        let expected = prepare_expected(&variables, &step).unwrap().unwrap();
        assert_eq!(expected["total"], serde_json::json!(3));
    }

    #[test]
    fn test_prepare_expected_absent() {
        let variables = Variables::new();
        let step = step_with(None, &[], &[]);
        assert!(prepare_expected(&variables, &step).unwrap().is_none());
    }
}
