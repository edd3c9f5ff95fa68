//! Data verification against a PostgREST-compatible HTTP server

use mockito::Matcher;
use serde_json::{Value, json};

use live_app_tester::store::{LazyStore, PostgrestClient, Record, StoreClient, StoreError};
use live_app_tester::verify::{DataVerifier, NO_MATCH};

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => panic!("not an object"),
    }
}

#[test]
fn test_select_sends_filters_and_credentials() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/rest/v1/orders")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("select".into(), "*".into()),
            Matcher::UrlEncoded("id".into(), "eq.42".into()),
            Matcher::UrlEncoded("status".into(), "eq.paid".into()),
        ]))
        .match_header("apikey", "service-key")
        .match_header("authorization", "Bearer service-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"id": 42, "status": "paid", "total": 19.5}]"#)
        .create();

    let client = PostgrestClient::new(server.url(), "service-key").unwrap();
    let rows = client
        .select_eq("orders", &record(json!({"id": 42, "status": "paid"})))
        .unwrap();

    mock.assert();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["total"], json!(19.5));
}

#[test]
fn test_verifier_diffs_first_row() {
    let mut server = mockito::Server::new();
    let _mock = server
        .mock("GET", "/rest/v1/orders")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"[{"id": 42, "status": "pending"}, {"id": 42, "status": "paid"}]"#)
        .create();

    let verifier = DataVerifier::new(LazyStore::postgrest(Some(server.url().as_str()), Some("k")));
    let result = verifier.verify(
        "orders",
        &record(json!({"id": 42})),
        &record(json!({"status": "paid"})),
    );

    assert!(!result.success);
    let diff = result.diff.unwrap();
    assert_eq!(diff["status"].actual, Some(json!("pending")));
}

#[test]
fn test_verifier_reports_no_match() {
    let mut server = mockito::Server::new();
    let _mock = server
        .mock("GET", "/rest/v1/orders")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("[]")
        .create();

    let verifier = DataVerifier::new(LazyStore::postgrest(Some(server.url().as_str()), Some("k")));
    let result = verifier.verify("orders", &record(json!({"id": 1})), &Record::new());

    assert!(!result.success);
    assert!(result.actual.is_none());
    assert_eq!(result.error.as_deref(), Some(NO_MATCH));
}

#[test]
fn test_http_errors_become_failed_verification() {
    let mut server = mockito::Server::new();
    let _mock = server
        .mock("GET", "/rest/v1/orders")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body(r#"{"message":"Invalid API key"}"#)
        .create();

    let client = PostgrestClient::new(server.url(), "bad").unwrap();
    let err = client.select_eq("orders", &Record::new()).unwrap_err();
    assert!(matches!(err, StoreError::Status { status: 401, .. }));

    let verifier = DataVerifier::new(LazyStore::postgrest(Some(server.url().as_str()), Some("bad")));
    let result = verifier.verify("orders", &Record::new(), &Record::new());
    assert!(!result.success);
    assert!(result.error.unwrap().contains("401"));
}
