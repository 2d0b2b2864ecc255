mod common;

use std::sync::Arc;

use bookhub_core::HarvestSettings;
use bookhub_engine::{
    ConvergenceController, FailureKind, HarvestSource, PagedHttpSource, ReqwestFetcher,
    RunOutcome, SourceErrorKind,
};
use common::init_logging;
use pretty_assertions::assert_eq;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings() -> HarvestSettings {
    HarvestSettings {
        idle_tolerance: 2,
        interval_ms: 0,
        ..HarvestSettings::default()
    }
}

fn page(identifiers: &[&str]) -> String {
    let items: String = identifiers
        .iter()
        .map(|id| format!(r#"<div data-asin="{id}"><p>Title {id}</p></div>"#))
        .collect();
    format!("<html><body>{items}</body></html>")
}

async fn mount_page(server: &MockServer, number: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/kindle-library"))
        .and(query_param("page", number))
        .respond_with(response)
        .mount(server)
        .await;
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8")
}

fn source(server: &MockServer) -> PagedHttpSource {
    let url = Url::parse(&format!("{}/kindle-library", server.uri())).unwrap();
    PagedHttpSource::new(url, Arc::new(ReqwestFetcher::default()))
}

#[tokio::test]
async fn pages_are_loaded_until_the_listing_ends() {
    init_logging();
    let server = MockServer::start().await;
    mount_page(&server, "1", html(page(&["B0PAGE1A01", "B0PAGE1B02"]))).await;
    mount_page(&server, "2", html(page(&["B0PAGE2A03", "B0PAGE1A01"]))).await;
    mount_page(&server, "3", ResponseTemplate::new(404)).await;
    let source = source(&server);

    let run = ConvergenceController::new(settings()).run(&source).await;

    assert_eq!(run.outcome, RunOutcome::Converged);
    assert_eq!(run.collection.len(), 3);
    assert_eq!(run.iterations, 4);
    assert_eq!(source.pages_loaded(), 2);
    assert!(source.is_exhausted());
    let identifiers: Vec<_> = run
        .collection
        .iter()
        .filter_map(|record| record.identifier.clone())
        .collect();
    assert_eq!(identifiers, vec!["B0PAGE1A01", "B0PAGE1B02", "B0PAGE2A03"]);
}

#[tokio::test]
async fn extent_is_the_number_of_decoded_bytes() {
    let server = MockServer::start().await;
    let body = page(&["B0PAGE1A01"]);
    let expected = body.len() as f64;
    mount_page(&server, "1", html(body)).await;
    let source = source(&server);

    assert_eq!(source.extent().await.unwrap(), 0.0);
    source.reveal_more().await.unwrap();
    assert_eq!(source.extent().await.unwrap(), expected);
    assert_eq!(source.extract().await.unwrap().len(), 1);
}

#[tokio::test]
async fn server_errors_fail_the_run() {
    let server = MockServer::start().await;
    mount_page(&server, "1", html(page(&["B0PAGE1A01"]))).await;
    mount_page(&server, "2", ResponseTemplate::new(503)).await;
    let source = source(&server);

    let run = ConvergenceController::new(settings()).run(&source).await;

    match run.outcome {
        RunOutcome::Failed(err) => {
            assert_eq!(err.kind, SourceErrorKind::Fetch(FailureKind::HttpStatus(503)))
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(run.collection.len(), 1);
}
