// Recursive matcher over decoded response bodies.
//
// The expectation tree drives the traversal: object keys are either
// predicate names or response fields, lists match order-independently via
// a greedy injective assignment, scalars compare with numeric widening.
// `store` is the only predicate with a side effect (it writes into the
// variable environment).

use serde_json::{Map, Value};

use crate::check::predicates::{Predicate, kind_name};
use crate::check::{CheckError, ValidationFail};
use crate::config::test_cases::StatusExpectation;
use crate::grpc::response::StatusInfo;
use crate::variables::Variables;

type Fails = Vec<ValidationFail>;

#[derive(Debug, Default)]
pub struct ResponseChecker;

impl ResponseChecker {
    pub fn new() -> Self {
        Self
    }

    /// Compare the transport status against the step expectation. An absent
    /// expectation means `{code: OK, message: ""}`; codes compare
    /// case-insensitively, messages exactly.
    pub fn check_status(
        &self,
        actual: Option<&StatusInfo>,
        expected: Option<&StatusExpectation>,
    ) -> Fails {
        let Some(actual) = actual else {
            return match expected {
                None => Vec::new(),
                Some(expected) => vec![ValidationFail::new(
                    "response.status",
                    "",
                    serde_json::to_value(expected.code.as_deref()).unwrap_or(Value::Null),
                    "no status",
                )],
            };
        };

        let default = StatusExpectation {
            code: Some("OK".to_string()),
            message: Some(String::new()),
        };
        let expected = expected.unwrap_or(&default);

        let mut fails = Vec::new();
        if let Some(code) = &expected.code
            && !code.eq_ignore_ascii_case(&actual.code)
        {
            fails.push(ValidationFail::new(
                "response.status.code",
                "",
                Value::String(code.clone()),
                actual.code.clone(),
            ));
        }
        if let Some(message) = &expected.message
            && *message != actual.message
        {
            fails.push(ValidationFail::new(
                "response.status.message",
                "",
                Value::String(message.clone()),
                actual.message.clone(),
            ));
        }

        fails
    }

    /// Walk the expectation tree against the decoded body. `Ok` carries the
    /// accumulated fails (empty means the body matched); `Err` means the
    /// expectation itself is malformed and the run must abort.
    pub fn check_body(
        &self,
        actual: &Value,
        expected: Option<&Map<String, Value>>,
        variables: &mut Variables,
    ) -> Result<Fails, CheckError> {
        match expected {
            None => Ok(Vec::new()),
            Some(expected) => self.check_object("", expected, actual, variables),
        }
    }

    fn check_object(
        &self,
        path: &str,
        expected: &Map<String, Value>,
        actual: &Value,
        variables: &mut Variables,
    ) -> Result<Fails, CheckError> {
        if actual.is_null() {
            return Ok(vec![ValidationFail::new(
                path,
                "",
                Value::Object(expected.clone()),
                "null",
            )]);
        }

        let mut fails = Vec::new();
        for (key, expectation) in expected {
            let key_path = format!("{path}.{key}");

            if let Some(predicate) = Predicate::lookup(key) {
                if !self.apply_predicate(predicate, expectation, actual, variables)? {
                    fails.push(ValidationFail::new(
                        key_path,
                        predicate.name(),
                        expectation.clone(),
                        stringify(actual),
                    ));
                }
                continue;
            }

            let field = actual
                .as_object()
                .and_then(|map| map.get(key))
                .ok_or(CheckError::UnknownField {
                    path: key_path.clone(),
                })?;
            fails.extend(self.check_value(&key_path, expectation, field, variables)?);
        }

        Ok(fails)
    }

    fn check_value(
        &self,
        path: &str,
        expectation: &Value,
        actual: &Value,
        variables: &mut Variables,
    ) -> Result<Fails, CheckError> {
        if let Some(condition) = expectation.as_object() {
            self.check_object(path, condition, actual, variables)
        } else if let Some(items) = actual.as_array() {
            self.check_slice(path, expectation, items, variables)
        } else {
            Ok(self.check_scalar(path, expectation, actual))
        }
    }

    fn check_scalar(&self, path: &str, expectation: &Value, actual: &Value) -> Fails {
        if scalar_equals(expectation, actual) {
            Vec::new()
        } else {
            vec![ValidationFail::new(
                path,
                "equal",
                expectation.clone(),
                stringify(actual),
            )]
        }
    }

    /// Order-independent list match: both lengths must be equal, and every
    /// expected pattern must claim a distinct actual item. Greedy: each
    /// pattern takes the first still-unclaimed item it matches.
    fn check_slice(
        &self,
        path: &str,
        expectation: &Value,
        actual: &[Value],
        variables: &mut Variables,
    ) -> Result<Fails, CheckError> {
        let expected = expectation.as_array().ok_or_else(|| {
            CheckError::Malformed(format!("expected value at {path} is not a list"))
        })?;

        if expected.len() != actual.len() {
            return Err(CheckError::LengthMismatch {
                path: path.to_string(),
                expected: expected.len(),
                actual: actual.len(),
            });
        }

        let mut claimed = vec![false; actual.len()];
        for pattern in expected {
            for (i, item) in actual.iter().enumerate() {
                if claimed[i] {
                    continue;
                }
                if self.check_value(path, pattern, item, variables)?.is_empty() {
                    claimed[i] = true;
                    break;
                }
            }
        }

        if claimed.iter().filter(|c| **c).count() != expected.len() {
            return Ok(vec![ValidationFail::new(
                path,
                "slice",
                expectation.clone(),
                stringify(&Value::Array(actual.to_vec())),
            )]);
        }

        Ok(Vec::new())
    }

    fn apply_predicate(
        &self,
        predicate: Predicate,
        expectation: &Value,
        actual: &Value,
        variables: &mut Variables,
    ) -> Result<bool, CheckError> {
        if !predicate.accepts_value(actual) {
            return Err(CheckError::UnsupportedKind {
                predicate: predicate.name(),
                kind: kind_name(actual),
            });
        }

        match predicate {
            Predicate::Len => self.check_len(expectation, actual, variables),
            Predicate::Gt => numeric_check(expectation, actual, |a, e| a > e),
            Predicate::Gte => numeric_check(expectation, actual, |a, e| a >= e),
            Predicate::Lt => numeric_check(expectation, actual, |a, e| a < e),
            Predicate::Lte => numeric_check(expectation, actual, |a, e| a <= e),
            Predicate::OneOf => self.check_one_of(expectation, actual, variables),
            Predicate::Any => self.check_any(expectation, actual, variables),
            Predicate::First => self.check_first(expectation, actual, variables),
            Predicate::All => self.check_all(expectation, actual, variables),
            Predicate::Store => self.check_store(expectation, actual, variables),
        }
    }

    /// `len` takes either an exact number or a nested map of numeric
    /// predicates evaluated against the length.
    fn check_len(
        &self,
        expectation: &Value,
        actual: &Value,
        variables: &mut Variables,
    ) -> Result<bool, CheckError> {
        let length = actual.as_array().map(|items| items.len()).unwrap_or(0);

        match expectation {
            Value::Number(n) => Ok(n.as_f64() == Some(length as f64)),
            Value::Object(nested) => {
                if nested.is_empty() {
                    return Err(CheckError::Malformed(
                        "no expectations given for len".to_string(),
                    ));
                }
                let length_value = Value::from(length as f64);
                for (name, nested_expectation) in nested {
                    let nested_predicate = Predicate::lookup(name)
                        .ok_or_else(|| CheckError::UnknownPredicate(name.clone()))?;
                    if !self.apply_predicate(
                        nested_predicate,
                        nested_expectation,
                        &length_value,
                        variables,
                    )? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            other => Err(CheckError::Malformed(format!(
                "unsupported expectation kind {} for len",
                kind_name(other)
            ))),
        }
    }

    /// `one_of` succeeds when the value matches any member; members run
    /// through the full matcher, so they may be predicate subtrees
    /// themselves. A member that errors simply does not match.
    fn check_one_of(
        &self,
        expectation: &Value,
        actual: &Value,
        variables: &mut Variables,
    ) -> Result<bool, CheckError> {
        let candidates = expectation
            .as_array()
            .ok_or_else(|| CheckError::Malformed("a list was expected for one_of".to_string()))?;

        for candidate in candidates {
            if let Ok(fails) = self.check_value("", candidate, actual, variables)
                && fails.is_empty()
            {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn check_any(
        &self,
        expectation: &Value,
        actual: &Value,
        variables: &mut Variables,
    ) -> Result<bool, CheckError> {
        let items = actual.as_array().expect("admission checked list");
        for item in items {
            if self.check_value("", expectation, item, variables)?.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn check_first(
        &self,
        expectation: &Value,
        actual: &Value,
        variables: &mut Variables,
    ) -> Result<bool, CheckError> {
        let items = actual.as_array().expect("admission checked list");
        match items.first() {
            None => Ok(false),
            Some(first) => Ok(self.check_value("", expectation, first, variables)?.is_empty()),
        }
    }

    fn check_all(
        &self,
        expectation: &Value,
        actual: &Value,
        variables: &mut Variables,
    ) -> Result<bool, CheckError> {
        let items = actual.as_array().expect("admission checked list");
        for item in items {
            if !self.check_value("", expectation, item, variables)?.is_empty() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Capture the value into the variable environment. Always matches.
    fn check_store(
        &self,
        expectation: &Value,
        actual: &Value,
        variables: &mut Variables,
    ) -> Result<bool, CheckError> {
        let name = expectation
            .as_str()
            .ok_or_else(|| CheckError::Malformed("a variable name was expected for store".to_string()))?;
        variables.store(name, stringify(actual));
        Ok(true)
    }
}

/// Scalar equality with numeric widening: integers and floats compare by
/// float value, everything else compares exactly.
fn scalar_equals(expectation: &Value, actual: &Value) -> bool {
    match (expectation, actual) {
        (Value::Number(e), Value::Number(a)) => e.as_f64() == a.as_f64(),
        _ => expectation == actual,
    }
}

fn numeric_check(
    expectation: &Value,
    actual: &Value,
    compare: fn(f64, f64) -> bool,
) -> Result<bool, CheckError> {
    let bound = expectation.as_f64().ok_or_else(|| {
        CheckError::Malformed(format!(
            "a number was expected, got {}",
            kind_name(expectation)
        ))
    })?;
    let value = actual.as_f64().expect("admission checked number");
    Ok(compare(value, bound))
}

/// Locale-independent rendering used for captures and diagnostics:
/// integers stay integral, floats use the shortest round-trip form,
/// strings come through verbatim.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                n.as_f64().unwrap_or_default().to_string()
            }
        }
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
