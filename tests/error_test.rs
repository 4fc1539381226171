//! Tests for error types

use trueno_runboard::error::OPAQUE_FAILURE;
use trueno_runboard::service::error_response;
use trueno_runboard::Error;

#[test]
fn test_invalid_filter_syntax_error() {
    let error = Error::InvalidFilterSyntax("expected value at line 1 column 2".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid filter syntax"));
    assert!(error_str.contains("line 1 column 2"));
    assert!(error.is_client_error());
}

#[test]
fn test_invalid_parameter_error() {
    let error = Error::invalid_parameter("limit", "expected a non-negative integer");
    let error_str = format!("{error}");
    assert!(error_str.contains("`limit`"));
    assert!(error_str.contains("non-negative integer"));
    assert!(error.is_client_error());
    assert_eq!(error.public_message(), error_str);
}

#[test]
fn test_store_error_is_opaque() {
    let error = Error::Store("unsupported operator $regex".to_string());
    assert!(format!("{error}").contains("Store execution failed"));
    assert!(!error.is_client_error());
    assert_eq!(error.public_message(), OPAQUE_FAILURE);
}

#[test]
fn test_catalog_error_is_opaque() {
    let error = Error::Catalog("metric column #0 is malformed".to_string());
    assert!(format!("{error}").contains("Column catalog error"));
    assert_eq!(error.public_message(), OPAQUE_FAILURE);
}

#[test]
fn test_json_error_conversion() {
    let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let error: Error = json_error.into();
    assert!(format!("{error}").contains("JSON error"));
    assert!(!error.is_client_error());
}

#[test]
fn test_error_response_status() {
    let (status, body) = error_response(&Error::InvalidFilterSyntax("bad".to_string()));
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("bad"));

    let (status, body) = error_response(&Error::Store("disk full".to_string()));
    assert_eq!(status, 500);
    assert_eq!(body["error"], OPAQUE_FAILURE);
}

#[test]
fn test_error_debug() {
    let error = Error::Store("test".to_string());
    let debug_str = format!("{error:?}");
    assert!(debug_str.contains("Store"));
}
