use mockito::{Matcher, Server};
use previsit::api::{ReportEvaluator, evaluate_or_message};
use previsit::catalog::CatalogCache;
use previsit::defaults::EVALUATION_ERROR_MESSAGE;
use previsit::{ApiClient, PrevisitError};
use serde_json::json;

const EVALUATE_PATH: &str = "/api/evaluate_report";
const CATALOG_PATH: &str = "/assets/patients_and_conditions.json";

#[tokio::test]
async fn evaluation_posts_report_and_strips_fence() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", EVALUATE_PATH)
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(
            json!({"report": "<h1>R2</h1>\n", "condition": "Flu"}),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"evaluation": "```html\n<h3 class=\"helpful\">Helpful</h3><p>Onset noted.</p>\n```"})
                .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let client = ApiClient::new(&server.url()).unwrap();

    let evaluation = client.evaluate("<h1>R2</h1>\n", "Flu").await.unwrap();
    assert_eq!(
        evaluation,
        "<h3 class=\"helpful\">Helpful</h3><p>Onset noted.</p>"
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn evaluation_error_is_reported() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", EVALUATE_PATH)
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(json!({"error": "Missing report or condition"}).to_string())
        .create_async()
        .await;
    let client = ApiClient::new(&server.url()).unwrap();

    match client.evaluate_report("", "Flu").await {
        Err(PrevisitError::HttpStatus {
            endpoint,
            status,
            message,
        }) => {
            assert_eq!(endpoint, EVALUATE_PATH);
            assert_eq!(status, 400);
            assert_eq!(message, "Missing report or condition");
        }
        other => panic!("expected an HTTP status error, got {other:?}"),
    }

    assert_eq!(
        evaluate_or_message(&client, "", "Flu").await,
        EVALUATION_ERROR_MESSAGE
    );
}

#[tokio::test]
async fn unreachable_backend_shows_message() {
    let client = ApiClient::new("http://127.0.0.1:9").unwrap();
    assert_eq!(
        evaluate_or_message(&client, "<p>x</p>", "Flu").await,
        EVALUATION_ERROR_MESSAGE
    );
}

#[tokio::test]
async fn catalog_is_fetched_once() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", CATALOG_PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "patients": [
                    {"name": "Jordan Carter", "age": 42, "gender": "female",
                     "existing_condition": "asthma", "voice": "Kore", "fhirFile": "jordan.json"},
                    {"name": "Alex Rivera", "age": "35", "gender": "male"}
                ],
                "conditions": ["Flu", {"name": "Migraine", "description": "Recurring headaches"}]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let client = ApiClient::new(&server.url()).unwrap();
    let cache = CatalogCache::new();

    let first = cache.get_or_fetch(&client).await.unwrap();
    let second = cache.get_or_fetch(&client).await.unwrap();

    assert_eq!(
        first.patient_names().collect::<Vec<_>>(),
        vec!["Jordan Carter", "Alex Rivera"]
    );
    assert_eq!(first.patient("Jordan Carter").unwrap().age.as_deref(), Some("42"));
    assert!(first.has_condition("Migraine"));
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    mock.assert_async().await;
}

#[tokio::test]
async fn failed_catalog_fetch_is_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", CATALOG_PATH)
        .with_status(404)
        .with_body(json!({"error": "not found"}).to_string())
        .expect(2)
        .create_async()
        .await;
    let client = ApiClient::new(&server.url()).unwrap();
    let cache = CatalogCache::new();

    assert!(cache.get_or_fetch(&client).await.is_err());
    assert!(cache.get_or_fetch(&client).await.is_err());
    assert!(cache.get().is_none());
    mock.assert_async().await;
}

#[tokio::test]
async fn relative_audio_resolves_against_server() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/audio/hello.wav")
        .with_status(200)
        .with_header("content-type", "audio/wav")
        .with_body(b"RIFF....WAVE")
        .create_async()
        .await;
    server
        .mock("GET", "/audio/missing.wav")
        .with_status(404)
        .create_async()
        .await;
    let client = ApiClient::new(&server.url()).unwrap();

    let bytes = client.fetch_audio("/audio/hello.wav").await.unwrap();
    assert_eq!(bytes, b"RIFF....WAVE");
    assert!(client.fetch_audio("/audio/missing.wav").await.is_err());
}
