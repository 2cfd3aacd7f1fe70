//! Unit tests for request validation.

use super::*;
use rstest::{fixture, rstest};
use serde_json::{Value, json};

#[fixture]
fn validator() -> RequestValidator {
    RequestValidator::new()
}

fn valid_body() -> Value {
    json!({
        "id": "vm-1",
        "resource_type": "VM",
        "cloud_provider": "AWS",
        "specification": "t2.micro",
        "status": "pending",
        "requested_by": "alice",
    })
}

fn body_with(field: &str, value: Value) -> Vec<u8> {
    let mut body = valid_body();
    if let Some(object) = body.as_object_mut() {
        object.insert(field.to_owned(), value);
    }
    serde_json::to_vec(&body).expect("serialize body")
}

fn body_without(field: &str) -> Vec<u8> {
    let mut body = valid_body();
    if let Some(object) = body.as_object_mut() {
        object.remove(field);
    }
    serde_json::to_vec(&body).expect("serialize body")
}

fn field_errors(result: Result<ProvisioningRequest, RequestRejection>) -> Vec<FieldError> {
    match result.expect_err("request should be rejected") {
        RequestRejection::ValidationFailed(errors) => errors,
        other @ RequestRejection::InvalidPayload { .. } => {
            panic!("expected field errors, got {other}")
        }
    }
}

#[rstest]
fn accepts_valid_request_without_transformation(validator: RequestValidator) {
    let body = serde_json::to_vec(&valid_body()).expect("serialize");
    let request = validator.validate(&body).expect("valid request");

    assert_eq!(
        request,
        ProvisioningRequest {
            id: String::from("vm-1"),
            resource_type: ResourceType::Vm,
            cloud_provider: CloudProvider::Aws,
            specification: String::from("t2.micro"),
            status: ProvisioningStatus::Pending,
            requested_by: String::from("alice"),
        }
    );
}

#[rstest]
fn reports_every_missing_field_in_declaration_order(validator: RequestValidator) {
    let errors = field_errors(validator.validate(b"{}"));

    let fields = errors
        .iter()
        .map(|error| error.field.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        fields,
        [
            "id",
            "resource_type",
            "cloud_provider",
            "specification",
            "status",
            "requested_by"
        ]
    );
    assert!(errors.iter().all(|error| error.message.ends_with("is required")));
    assert!(errors.iter().all(|error| error.value.is_none()));
}

#[rstest]
#[case("id")]
#[case("resource_type")]
#[case("cloud_provider")]
#[case("specification")]
#[case("status")]
#[case("requested_by")]
fn missing_single_field_yields_exactly_one_error(
    validator: RequestValidator,
    #[case] field: &str,
) {
    let errors = field_errors(validator.validate(&body_without(field)));

    assert_eq!(errors.len(), 1, "errors: {errors:?}");
    assert_eq!(
        errors.first().map(|error| error.field.as_str()),
        Some(field)
    );
}

#[rstest]
#[case("id")]
#[case("specification")]
#[case("requested_by")]
fn null_and_empty_text_are_both_required(validator: RequestValidator, #[case] field: &str) {
    let null_errors = field_errors(validator.validate(&body_with(field, Value::Null)));
    let empty_errors = field_errors(validator.validate(&body_with(field, json!(""))));

    assert_eq!(null_errors.len(), 1);
    assert_eq!(empty_errors.len(), 1);
    let expected = format!("{field} is required");
    assert_eq!(null_errors.first().map(|e| e.message.clone()), Some(expected.clone()));
    assert_eq!(empty_errors.first().map(|e| e.message.clone()), Some(expected));
}

#[rstest]
fn unknown_resource_type_names_canonical_set(validator: RequestValidator) {
    let errors = field_errors(validator.validate(&body_with("resource_type", json!("Mainframe"))));

    assert_eq!(
        errors,
        vec![FieldError {
            field: String::from("resource_type"),
            message: String::from("resource_type must be one of: VM RDS S3 Lambda VPC ELB"),
            value: Some(String::from("Mainframe")),
        }]
    );
}

#[rstest]
#[case("cloud_provider", "aws")]
#[case("cloud_provider", "Oracle")]
#[case("status", "Pending")]
#[case("status", "done")]
#[case("resource_type", "vm")]
fn enum_matching_is_exact(validator: RequestValidator, #[case] field: &str, #[case] raw: &str) {
    let errors = field_errors(validator.validate(&body_with(field, json!(raw))));

    assert_eq!(errors.len(), 1);
    let error = errors.first().expect("one error");
    assert_eq!(error.field, field);
    assert!(error.message.contains("must be one of"), "{}", error.message);
}

#[rstest]
#[case("id", 100)]
#[case("specification", 1000)]
#[case("requested_by", 100)]
fn length_limits_are_inclusive(
    validator: RequestValidator,
    #[case] field: &str,
    #[case] limit: usize,
) {
    let at_limit = "x".repeat(limit);
    assert!(validator.validate(&body_with(field, json!(at_limit))).is_ok());

    let over_limit = "x".repeat(limit + 1);
    let errors = field_errors(validator.validate(&body_with(field, json!(over_limit))));
    assert_eq!(
        errors.first().map(|error| error.message.clone()),
        Some(format!("{field} must be at most {limit} characters"))
    );
}

#[rstest]
fn lengths_count_characters_not_bytes(validator: RequestValidator) {
    let id = "é".repeat(100);
    assert!(id.len() > 100);

    let request = validator
        .validate(&body_with("id", json!(id)))
        .expect("100 characters is within the limit");
    assert_eq!(request.id.chars().count(), 100);
}

#[rstest]
fn collects_mixed_violations_in_one_rejection(validator: RequestValidator) {
    let body = json!({
        "id": "",
        "resource_type": "Mainframe",
        "cloud_provider": "AWS",
        "specification": "x".repeat(1001),
        "status": "pending",
    });
    let raw = serde_json::to_vec(&body).expect("serialize");

    let errors = field_errors(validator.validate(&raw));
    let fields = errors
        .iter()
        .map(|error| error.field.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        fields,
        ["id", "resource_type", "specification", "requested_by"]
    );
}

#[rstest]
#[case(b"invalid json".as_slice())]
#[case(b"[]".as_slice())]
#[case(b"\"vm-1\"".as_slice())]
#[case(b"{\"id\": 5}".as_slice())]
#[case(b"{\"id\": \"vm-1\"} trailing".as_slice())]
#[case(b"".as_slice())]
fn undecodable_payloads_are_invalid_json(validator: RequestValidator, #[case] raw: &[u8]) {
    let rejection = validator.validate(raw).expect_err("should be rejected");

    assert!(
        matches!(rejection, RequestRejection::InvalidPayload { .. }),
        "unexpected rejection: {rejection:?}"
    );
    assert_eq!(rejection.code(), INVALID_JSON);
    assert!(rejection.details().is_empty());
}

#[rstest]
fn unknown_fields_are_ignored(validator: RequestValidator) {
    let raw = body_with("priority", json!("high"));
    assert!(validator.validate(&raw).is_ok());
}

#[test]
fn custom_limits_are_honoured() {
    let validator = RequestValidator::with_limits(ValidationLimits {
        max_id_chars: 3,
        ..ValidationLimits::DEFAULT
    });

    let errors = field_errors(validator.validate(&body_with("id", json!("vm-1"))));
    assert_eq!(
        errors.first().map(|error| error.message.clone()),
        Some(String::from("id must be at most 3 characters"))
    );
}

#[test]
fn field_error_omits_absent_value_when_serialized() {
    let error = FieldError::required("id", None);
    let value = serde_json::to_value(&error).expect("serialize");

    assert_eq!(value, json!({"field": "id", "message": "id is required"}));
}
