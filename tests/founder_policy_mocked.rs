/// Founder policy cases against a mocked backend
/// Covers the request each operation sends and how responses are classified
use rust_founder_probes::client::BackendClient;
use rust_founder_probes::fixtures::Fixtures;
use rust_founder_probes::models::FounderProfile;
use rust_founder_probes::probe::{
    anonymous_founder_matrix, Expectation, FounderProbe, Operation, ProbeCase, ProbeReport,
    Target,
};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const OWN_ID: &str = "10000000-0000-4000-8000-000000000001";
const OTHER_ID: &str = "10000000-0000-4000-8000-000000000002";
const HIDDEN_ID: &str = "10000000-0000-4000-8000-000000000003";
const OTHER_USER: &str = "20000000-0000-4000-8000-000000000002";
const LEAKED_ID: &str = "30000000-0000-4000-8000-000000000009";

fn row(id: &str, user_id: &str, visible: bool) -> Value {
    json!({
        "id": id,
        "user_id": user_id,
        "name": "Founder",
        "is_visible": visible,
        "created_at": "2024-05-01T10:00:00Z"
    })
}

fn own_row() -> Value {
    row(OWN_ID, "20000000-0000-4000-8000-000000000001", true)
}

fn other_row() -> Value {
    row(OTHER_ID, OTHER_USER, true)
}

fn hidden_row() -> Value {
    row(HIDDEN_ID, "20000000-0000-4000-8000-000000000003", false)
}

fn profile(value: Value) -> FounderProfile {
    serde_json::from_value(value).unwrap()
}

fn rls_refusal() -> ResponseTemplate {
    ResponseTemplate::new(401).set_body_json(json!({
        "code": "42501",
        "message": "new row violates row-level security policy for table \"founders\""
    }))
}

fn unique_violation() -> ResponseTemplate {
    ResponseTemplate::new(409).set_body_json(json!({
        "code": "23505",
        "message": "duplicate key value violates unique constraint \"founders_user_id_key\""
    }))
}

fn empty() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!([]))
}

fn client(server: &MockServer) -> BackendClient {
    BackendClient::with_keys(&server.uri(), "anon-key", None).unwrap()
}

fn as_member(server: &MockServer) -> FounderProbe {
    FounderProbe::new(
        client(server),
        Some(profile(own_row())),
        profile(other_row()),
        profile(hidden_row()),
    )
}

fn as_anonymous(server: &MockServer) -> FounderProbe {
    FounderProbe::new(
        client(server),
        None,
        profile(other_row()),
        profile(hidden_row()),
    )
}

#[tokio::test]
async fn test_each_operation_sends_its_verb_and_row_filter() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/founders"))
        .and(query_param("id", format!("eq.{}", OTHER_ID).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([other_row()])))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/founders"))
        .and(header("Prefer", "return=representation"))
        .and(body_partial_json(json!({
            "user_id": OTHER_USER,
            "name": "Impersonated by user A"
        })))
        .respond_with(rls_refusal())
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/founders"))
        .and(query_param("id", format!("eq.{}", OWN_ID).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([own_row()])))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/founders"))
        .and(query_param("id", format!("eq.{}", HIDDEN_ID).as_str()))
        .respond_with(empty())
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut runner = as_member(&mock_server);
    let select = runner.observe("user A", Operation::Select, Target::Other).await;
    let insert = runner.observe("user A", Operation::Insert, Target::Other).await;
    let update = runner.observe("user A", Operation::Update, Target::Own).await;
    let delete = runner.observe("user A", Operation::Delete, Target::Hidden).await;

    assert_eq!(select.outcome, Expectation::Allowed);
    assert_eq!(insert.outcome, Expectation::Denied);
    assert_eq!(update.outcome, Expectation::Allowed);
    assert_eq!(delete.outcome, Expectation::Denied);

    // Inserts carry no row filter
    let requests = mock_server.received_requests().await.unwrap();
    let insert_request = requests
        .iter()
        .find(|r| r.method.as_str() == "POST")
        .unwrap();
    assert!(!insert_request.url.query_pairs().any(|(k, _)| k == "id"));

    // The edit is tagged with the actor
    let patch_request = requests
        .iter()
        .find(|r| r.method.as_str() == "PATCH")
        .unwrap();
    let body: Value = serde_json::from_slice(&patch_request.body).unwrap();
    assert!(body["bio"].as_str().unwrap().starts_with("Edited by user A"));
}

#[tokio::test]
async fn test_insert_hitting_unique_constraint_fails_the_case() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/founders"))
        .respond_with(unique_violation())
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut runner = as_member(&mock_server);
    let mut report = ProbeReport::new("unique constraint");
    runner
        .run(
            &mut report,
            vec![ProbeCase::new(
                "user A",
                Operation::Insert,
                Target::Other,
                Expectation::Denied,
            )],
        )
        .await;

    assert_eq!(report.failed(), 1);
    assert_eq!(report.exit_code(), 1);
    let observed = &report.outcomes[0].observed;
    assert_eq!(observed.outcome, Expectation::Allowed);
    assert!(observed.detail.as_deref().unwrap().contains("RLS did not refuse"));
    assert!(runner.take_leaked().is_empty());
}

#[tokio::test]
async fn test_insert_refused_by_rls_passes_the_case() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/founders"))
        .respond_with(rls_refusal())
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut runner = as_member(&mock_server);
    let mut report = ProbeReport::new("rls refusal");
    runner
        .run(
            &mut report,
            vec![ProbeCase::new(
                "user A",
                Operation::Insert,
                Target::Hidden,
                Expectation::Denied,
            )],
        )
        .await;

    assert!(report.all_passed());
}

#[tokio::test]
async fn test_accepted_insert_is_collected_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/founders"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!([row(LEAKED_ID, OTHER_USER, true)])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut runner = as_member(&mock_server);
    let observed = runner
        .observe("user A", Operation::Insert, Target::Other)
        .await;
    assert_eq!(observed.outcome, Expectation::Allowed);

    let leaked = runner.take_leaked();
    assert_eq!(leaked.len(), 1);
    assert_eq!(leaked[0].to_string(), LEAKED_ID);
    assert!(runner.take_leaked().is_empty());
}

#[tokio::test]
async fn test_anonymous_own_row_is_denied_without_a_request() {
    let mock_server = MockServer::start().await;

    Mock::given(path("/rest/v1/founders"))
        .respond_with(empty())
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut runner = as_anonymous(&mock_server);
    for operation in [
        Operation::Select,
        Operation::Insert,
        Operation::Update,
        Operation::Delete,
    ] {
        let observed = runner.observe("anonymous", operation, Target::Own).await;
        assert_eq!(observed.outcome, Expectation::Denied);
        assert_eq!(observed.detail.as_deref(), Some("no row for this target"));
    }
    assert!(mock_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_anonymous_matrix_passes_against_enforcing_backend() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/founders"))
        .and(query_param("id", format!("eq.{}", HIDDEN_ID).as_str()))
        .respond_with(empty())
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/founders"))
        .and(body_partial_json(json!({"name": "Impersonated by anonymous"})))
        .respond_with(rls_refusal())
        .expect(1)
        .mount(&mock_server)
        .await;
    for verb in ["PATCH", "DELETE"] {
        Mock::given(method(verb))
            .and(path("/rest/v1/founders"))
            .and(query_param("id", format!("eq.{}", OTHER_ID).as_str()))
            .respond_with(empty())
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    let mut runner = as_anonymous(&mock_server);
    let mut report = ProbeReport::new("anonymous");
    runner.run(&mut report, anonymous_founder_matrix()).await;

    assert_eq!(report.outcomes.len(), 4);
    assert!(report.all_passed());
    assert_eq!(report.exit_code(), 0);
    assert!(runner.take_leaked().is_empty());
    assert!(runner.take_deleted().is_empty());
}

#[tokio::test]
async fn test_anonymous_matrix_fails_every_case_against_open_backend() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/founders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([hidden_row()])))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/founders"))
        .respond_with(unique_violation())
        .mount(&mock_server)
        .await;
    for verb in ["PATCH", "DELETE"] {
        Mock::given(method(verb))
            .and(path("/rest/v1/founders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([other_row()])))
            .mount(&mock_server)
            .await;
    }

    let mut runner = as_anonymous(&mock_server);
    let mut report = ProbeReport::new("anonymous, open");
    runner.run(&mut report, anonymous_founder_matrix()).await;

    assert_eq!(report.failed(), 4);
    let deleted = runner.take_deleted();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].to_string(), OTHER_ID);
}

#[tokio::test]
async fn test_leaked_row_cleanup_without_service_key_reports_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/founders"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!([row(LEAKED_ID, OTHER_USER, true)])),
        )
        .mount(&mock_server)
        .await;
    // The leaked row is not deletable by the role that created it
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/founders"))
        .and(query_param("id", format!("eq.{}", LEAKED_ID).as_str()))
        .and(header("apikey", "anon-key"))
        .respond_with(empty())
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut runner = as_anonymous(&mock_server);
    runner
        .observe("anonymous", Operation::Insert, Target::Other)
        .await;

    let mut fixtures = Fixtures::new(None);
    for id in runner.take_leaked() {
        fixtures.track_founder(id, runner.client());
    }
    assert_eq!(fixtures.tracked(), 1);
    assert_eq!(fixtures.cleanup().await, 1);
}
