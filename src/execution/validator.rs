// Offline configuration check: every step's request must build against
// the method's input schema and every expected-response key must be a
// predicate or a field of the output schema. No RPCs are made.

use anyhow::{Context, Result};
use prost_reflect::{FieldDescriptor, Kind as FieldKind, MessageDescriptor};
use serde_json::{Map, Value};

use crate::check::Predicate;
use crate::config::test_cases::{Step, TestCase};
use crate::error::user_error;
use crate::grpc::client::build_message;
use crate::grpc::descriptors::DescriptorStore;

pub fn validate(test_cases: &[TestCase], descriptors: &DescriptorStore) -> Result<()> {
    for test_case in test_cases {
        for (i, step) in test_case.steps.iter().enumerate() {
            validate_step(step, descriptors)
                .with_context(|| format!("test case {}, step {}", test_case.name, i + 1))?;
        }
    }
    Ok(())
}

fn validate_step(step: &Step, descriptors: &DescriptorStore) -> Result<()> {
    let full_name = step.method_full_name();
    let method = descriptors
        .get(&full_name)
        .ok_or_else(|| user_error(format!("method {full_name} not found in sources")))?;

    if let Some(request) = &step.request {
        build_message(&method.input(), request).context("request")?;
    }

    if let Some(response) = &step.response {
        let map: Map<String, Value> = serde_json::from_str(response)
            .map_err(|err| user_error(format!("expected response is not a JSON object: {err}")))?;
        check_expectation_object(&method.output(), &map, method.is_server_streaming())
            .context("response")?;
    }

    Ok(())
}

fn check_expectation_object(
    message: &MessageDescriptor,
    map: &Map<String, Value>,
    stream_root: bool,
) -> Result<()> {
    for (key, value) in map {
        if stream_root
            && key == "stream"
            && let Some(frames) = value.as_array()
        {
            for frame in frames {
                if let Some(frame_map) = frame.as_object() {
                    check_expectation_object(message, frame_map, false)?;
                }
            }
            continue;
        }

        if Predicate::is_predicate(key) {
            continue;
        }

        let field = message
            .get_field_by_name(key)
            .or_else(|| message.get_field_by_json_name(key))
            .ok_or_else(|| {
                user_error(format!(
                    "unexpected key {key} in expected response of {}",
                    message.full_name()
                ))
            })?;
        check_expectation_value(&field, value)?;
    }

    Ok(())
}

fn check_expectation_value(field: &FieldDescriptor, value: &Value) -> Result<()> {
    match value {
        Value::Object(map) => {
            if let FieldKind::Message(nested) = field.kind() {
                check_expectation_object(&nested, map, false)
            } else {
                // A condition over a scalar field: every key must resolve
                // in the predicate registry.
                for key in map.keys() {
                    if !Predicate::is_predicate(key) {
                        return Err(user_error(format!(
                            "unknown predicate {key} on field {}",
                            field.name()
                        )));
                    }
                }
                Ok(())
            }
        }
        Value::Array(items) => {
            for item in items {
                check_expectation_value(field, item)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
