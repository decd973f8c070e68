//! Integration tests for otcfetch-finra against a local mock of the FINRA API.

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use indicatif::ProgressBar;
use otcfetch_finra::{
    ApiError, Credentials, Endpoints, FetchConfig, FinraClient, OtcApi, Outcome, PageRequest,
    Token,
};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN_PATH: &str = "/fip/rest/ews/oauth2/access_token";
const DATA_PATH: &str = "/data/group/OTCMarket/name/";

/// Mock server plus the runtime it is driven from. The client under test is
/// blocking, so it runs on the test thread outside this runtime.
struct Harness {
    server: MockServer,
    rt: tokio::runtime::Runtime,
}

impl Harness {
    fn new() -> Self {
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        let server = rt.block_on(MockServer::start());
        Self { server, rt }
    }

    fn mount(&self, mock: Mock) {
        self.rt.block_on(mock.mount(&self.server));
    }

    fn endpoints(&self) -> Endpoints {
        Endpoints {
            token_url: format!("{}{TOKEN_PATH}", self.server.uri()),
            base_url: format!("{}{DATA_PATH}", self.server.uri()),
        }
    }

    fn mount_token(&self, token: &str) {
        self.mount(
            Mock::given(method("POST"))
                .and(path(TOKEN_PATH))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(json!({"access_token": token, "token_type": "Bearer"})),
                ),
        );
    }

    fn mount_page(&self, dataset: &str, offset: u64, records: serde_json::Value) {
        self.mount(
            Mock::given(method("GET"))
                .and(path(format!("{DATA_PATH}{dataset}")))
                .and(query_param("offset", offset.to_string()))
                .respond_with(ResponseTemplate::new(200).set_body_json(records)),
        );
    }

    /// Offsets of all data requests, in arrival order
    fn requested_offsets(&self, dataset: &str) -> Vec<u64> {
        let requests = self
            .rt
            .block_on(self.server.received_requests())
            .unwrap_or_default();
        requests
            .iter()
            .filter(|r| r.url.path().ends_with(dataset))
            .filter_map(|r| {
                r.url
                    .query_pairs()
                    .find(|(k, _)| k == "offset")
                    .and_then(|(_, v)| v.parse().ok())
            })
            .collect()
    }
}

fn credentials() -> Credentials {
    Credentials::new("user", "pass")
}

fn fetch_config(h: &Harness, dataset: &str, dir: &std::path::Path, limit: u64) -> FetchConfig {
    let mut config = FetchConfig::new(dataset, dir, credentials());
    config.endpoints = h.endpoints();
    config.limit = limit;
    config.retry_delay = Duration::ZERO;
    config
}

fn data_rows(path: &std::path::Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .skip(1)
        .map(String::from)
        .collect()
}

#[test]
fn token_request_uses_client_credentials() {
    let h = Harness::new();
    h.mount(
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(header("authorization", "Basic dXNlcjpwYXNz"))
            .and(header("accept", "application/json"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("apiclientid=user"))
            .and(body_string_contains("apiclientsecret=pass"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "abc"}))),
    );

    let client = FinraClient::new(h.endpoints());
    let token = client.request_token(&credentials()).unwrap();

    assert_eq!(token.secret(), "abc");
}

#[test]
fn token_response_without_access_token() {
    let h = Harness::new();
    h.mount(
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "denied"}))),
    );

    let client = FinraClient::new(h.endpoints());
    let err = client.request_token(&credentials()).unwrap_err();

    assert!(matches!(err, ApiError::MissingToken(_)));
}

#[test]
fn page_request_sends_bearer_and_paging_params() {
    let h = Harness::new();
    h.mount(
        Mock::given(method("GET"))
            .and(path(format!("{DATA_PATH}weeklySummary")))
            .and(header("authorization", "Bearer abc"))
            .and(query_param("limit", "2"))
            .and(query_param("offset", "4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}]))),
    );

    let client = FinraClient::new(h.endpoints());
    let records = client
        .fetch_page(
            &Token::new("abc"),
            "weeklySummary",
            PageRequest {
                offset: 4,
                limit: 2,
            },
        )
        .unwrap();

    assert_eq!(records, vec![json!({"id": 1})]);
}

#[test]
fn server_error_is_transport() {
    let h = Harness::new();
    h.mount(
        Mock::given(method("GET"))
            .and(path(format!("{DATA_PATH}weeklySummary")))
            .respond_with(ResponseTemplate::new(500)),
    );

    let client = FinraClient::new(h.endpoints());
    let err = client
        .fetch_page(
            &Token::new("abc"),
            "weeklySummary",
            PageRequest {
                offset: 0,
                limit: 10,
            },
        )
        .unwrap_err();

    assert!(err.is_transport());
    assert!(!err.is_unauthorized());
}

#[test]
fn full_run_writes_all_records_in_order() {
    let h = Harness::new();
    let dir = tempfile::tempdir().unwrap();
    h.mount_token("abc");
    h.mount_page("test", 0, json!([{"id": "A"}, {"id": "B"}]));
    h.mount_page("test", 2, json!([{"id": "C"}, {"id": "D"}]));
    h.mount_page("test", 4, json!([{"id": "E"}]));

    let client = FinraClient::new(h.endpoints());
    let config = fetch_config(&h, "test", dir.path(), 2);
    let summary = otcfetch_finra::run(
        &client,
        &config,
        &AtomicBool::new(false),
        &ProgressBar::hidden(),
    )
    .unwrap();

    assert_eq!(h.requested_offsets("test"), vec![0, 2, 4]);
    assert_eq!(summary.outcome, Outcome::Completed);
    assert_eq!(summary.records, 5);
    let file = dir.path().join("test_part1.csv");
    assert_eq!(summary.files, vec![file.clone()]);
    assert_eq!(data_rows(&file), vec!["A", "B", "C", "D", "E"]);
}

#[test]
fn run_survives_transient_server_error() {
    let h = Harness::new();
    let dir = tempfile::tempdir().unwrap();
    h.mount_token("abc");
    h.mount_page("test", 0, json!([{"id": "A"}, {"id": "B"}]));
    h.mount(
        Mock::given(method("GET"))
            .and(path(format!("{DATA_PATH}test")))
            .and(query_param("offset", "2"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .with_priority(1),
    );
    h.mount_page("test", 2, json!([{"id": "C"}]));

    let client = FinraClient::new(h.endpoints());
    let config = fetch_config(&h, "test", dir.path(), 2);
    let summary = otcfetch_finra::run(
        &client,
        &config,
        &AtomicBool::new(false),
        &ProgressBar::hidden(),
    )
    .unwrap();

    assert_eq!(h.requested_offsets("test"), vec![0, 2, 2]);
    assert_eq!(summary.transport_retries, 1);
    assert_eq!(
        data_rows(&dir.path().join("test_part1.csv")),
        vec!["A", "B", "C"]
    );
}
