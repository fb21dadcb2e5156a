use reqwest::header::{AUTHORIZATION, HeaderName};
use serde_json::{Map, Value};

use lxp_providers::chat::request_headers;

#[test]
fn bearer_header_is_marked_sensitive() {
	let headers = request_headers("secret", &Map::new()).expect("Failed to build headers.");
	let value = headers.get(AUTHORIZATION).expect("Missing authorization header.");

	assert_eq!(value, "Bearer secret");
	assert!(value.is_sensitive());
}

#[test]
fn extra_headers_are_added() {
	let mut extra = Map::new();

	extra.insert("x-org".to_string(), Value::from("acme"));

	let headers = request_headers("k", &extra).expect("Failed to build headers.");

	assert_eq!(headers.get(HeaderName::from_static("x-org")).expect("Missing header."), "acme");
	assert_eq!(headers.len(), 2);
}

#[test]
fn non_string_header_values_are_rejected() {
	let mut extra = Map::new();

	extra.insert("x-retries".to_string(), Value::from(3));

	assert!(request_headers("k", &extra).is_err());
}
