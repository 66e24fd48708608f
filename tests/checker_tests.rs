// End-to-end assertion scenarios exercised through the public API.

use grpcsuite::check::{CheckError, ResponseChecker};
use grpcsuite::config::StatusExpectation;
use grpcsuite::grpc::StatusInfo;
use grpcsuite::variables::Variables;
use serde_json::{Value, json};

fn check_body(actual: Value, expected: Value) -> Result<usize, CheckError> {
    let checker = ResponseChecker::new();
    let mut variables = Variables::new();
    checker
        .check_body(&actual, expected.as_object(), &mut variables)
        .map(|fails| fails.len())
}

#[test]
fn test_list_matcher_out_of_order() {
    // Actual {items: [{id:2},{id:1}]} against expected [{id:1},{id:2}].
    let fails = check_body(
        json!({"items": [{"id": 2}, {"id": 1}]}),
        json!({"items": [{"id": 1}, {"id": 2}]}),
    )
    .unwrap();
    assert_eq!(fails, 0);
}

#[test]
fn test_list_matcher_requires_injective_assignment() {
    // Two identical patterns cannot claim the same actual item.
    let fails = check_body(
        json!({"items": [{"id": 1}, {"id": 2}]}),
        json!({"items": [{"id": 1}, {"id": 1}]}),
    )
    .unwrap();
    assert_eq!(fails, 1);
}

#[test]
fn test_numeric_predicate_window() {
    assert_eq!(
        check_body(json!({"count": 7}), json!({"count": {"gte": 5, "lt": 10}})).unwrap(),
        0
    );
    assert_eq!(
        check_body(json!({"count": 7}), json!({"count": {"gte": 8}})).unwrap(),
        1
    );
}

#[test]
fn test_len_composed_with_gt() {
    assert_eq!(
        check_body(json!({"xs": [1, 2, 3]}), json!({"xs": {"len": {"gt": 2}}})).unwrap(),
        0
    );
}

#[test]
fn test_len_zero_boundary() {
    assert_eq!(check_body(json!({"xs": []}), json!({"xs": {"len": 0}})).unwrap(), 0);
    assert_eq!(check_body(json!({"xs": [1]}), json!({"xs": {"len": 0}})).unwrap(), 1);
}

#[test]
fn test_one_of_with_nested_predicate_maps() {
    let expected = json!({"n": {"one_of": [{"lt": 0}, {"gt": 10}]}});
    assert_eq!(check_body(json!({"n": -3}), expected.clone()).unwrap(), 0);
    assert_eq!(check_body(json!({"n": 11}), expected.clone()).unwrap(), 0);
    assert_eq!(check_body(json!({"n": 5}), expected).unwrap(), 1);
}

#[test]
fn test_store_then_reuse_via_substitution() {
    let checker = ResponseChecker::new();
    let mut variables = Variables::new();

    // Step one: login response stores the token.
    let login_expectation = json!({"token": {"store": "auth"}});
    let fails = checker
        .check_body(
            &json!({"token": "xyz"}),
            login_expectation.as_object(),
            &mut variables,
        )
        .unwrap();
    assert!(fails.is_empty());

    // Step two: service metadata referencing $auth materializes to xyz.
    let mut metadata = std::collections::HashMap::from([(
        "authorization".to_string(),
        "$auth".to_string(),
    )]);
    variables.substitute_map(&mut metadata).unwrap();
    assert_eq!(metadata["authorization"], "xyz");
}

#[test]
fn test_store_numeric_capture_is_decimal() {
    let checker = ResponseChecker::new();
    let mut variables = Variables::new();
    checker
        .check_body(
            &json!({"count": 12}),
            json!({"count": {"store": "seen"}}).as_object(),
            &mut variables,
        )
        .unwrap();
    assert_eq!(variables.get("seen"), Some("12"));
    assert_eq!(variables.substitute("total=$seen").unwrap(), "total=12");
}

#[test]
fn test_unknown_predicate_aborts_instead_of_failing() {
    let err = check_body(json!({"xs": [1]}), json!({"xs": {"len": {"near": 1}}})).unwrap_err();
    assert!(matches!(err, CheckError::UnknownPredicate(name) if name == "near"));
}

#[test]
fn test_status_defaults_to_ok() {
    let checker = ResponseChecker::new();

    let ok = StatusInfo::ok();
    assert!(checker.check_status(Some(&ok), None).is_empty());

    let failed = StatusInfo {
        code: "UNAVAILABLE".to_string(),
        message: "down".to_string(),
    };
    assert!(!checker.check_status(Some(&failed), None).is_empty());
}

#[test]
fn test_status_code_and_message_expectations() {
    let checker = ResponseChecker::new();
    let actual = StatusInfo {
        code: "NOT_FOUND".to_string(),
        message: "user missing".to_string(),
    };

    let expected = StatusExpectation {
        code: Some("not_found".to_string()),
        message: Some("user missing".to_string()),
    };
    assert!(checker.check_status(Some(&actual), Some(&expected)).is_empty());

    let wrong_message = StatusExpectation {
        code: Some("NOT_FOUND".to_string()),
        message: Some("other".to_string()),
    };
    let fails = checker.check_status(Some(&actual), Some(&wrong_message));
    assert_eq!(fails.len(), 1);
    assert_eq!(fails[0].path, "response.status.message");
}

#[test]
fn test_absent_fields_with_zero_values_match() {
    // Canonical decoding emits unpopulated fields; the matcher must treat
    // them as ordinary zero values.
    let actual = json!({
        "id": 0,
        "name": "",
        "active": false,
        "tags": [],
        "labels": {}
    });
    assert_eq!(
        check_body(actual, json!({"id": 0, "name": "", "active": false, "tags": {"len": 0}}))
            .unwrap(),
        0
    );
}
