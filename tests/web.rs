#![cfg(feature = "web")]

mod common;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use std::sync::Arc;
use tower::ServiceExt;

use common::{controller, empty_workbook, record_rows, workbook};
use tracker::app::{AppState, router};
use tracker::memory::MemoryWorkbook;

fn app(book: &MemoryWorkbook) -> Router {
    router(Arc::new(AppState::new(controller(book)).unwrap()))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn form_shows_saved_value() {
    let book = workbook();
    let (status, body) = send(
        app(&book),
        get("/?date=2024-01-01&student=Alice&assignment=Essay&lap=1"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Academic Monitoring Tool"));
    assert!(body.contains("Currently saved value: B"));
    assert!(body.contains(r#"value="B" checked"#));
    assert!(body.contains(r#"action="/save""#));
    assert!(body.contains(r#"<option value="Chen">Chen</option>"#));
}

#[tokio::test]
async fn form_halts_on_configuration_error() {
    let book = workbook();
    let (status, body) = send(
        app(&book),
        get("/?date=2024-01-01&student=Alice&assignment=Essay&lap=2"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("No allowed values defined for this assignment/lap combination."));
    assert!(!body.contains(r#"action="/save""#));
}

#[tokio::test]
async fn empty_sheet_warning_is_rendered() {
    let book = empty_workbook();
    let (_, body) = send(app(&book), get("/")).await;
    assert!(body.contains("Sheet is empty. First entry will create data."));
}

#[tokio::test]
async fn save_redirects_back_with_outcome() {
    let book = workbook();
    let request = Request::builder()
        .method("POST")
        .uri("/save")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(
            "date=2024-01-01&student_name=Alice&assignment=Essay&lap=1&value=A",
        ))
        .unwrap();

    let response = app(&book).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert_eq!(
        location,
        "/?date=2024-01-01&student=Alice&assignment=Essay&lap=1&saved=updated"
    );
    assert_eq!(record_rows(&book)[1][4], "A");
    assert_eq!(record_rows(&book).len(), 2);
}

#[tokio::test]
async fn save_encodes_names_in_redirect() {
    let book = workbook();
    let request = Request::builder()
        .method("POST")
        .uri("/save")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(
            "date=2024-01-01&student_name=Bob&assignment=Lab+Report&lap=2&value=Complete",
        ))
        .unwrap();

    let response = app(&book).oneshot(request).await.unwrap();

    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.contains("assignment=Lab%20Report"));
    assert!(location.ends_with("saved=inserted"));
    assert_eq!(record_rows(&book).len(), 3);
}

#[tokio::test]
async fn rejected_save_rerenders_form() {
    let book = workbook();
    let request = Request::builder()
        .method("POST")
        .uri("/save")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(
            "date=2024-01-01&student_name=Alice&assignment=Essay&lap=1&value=Z",
        ))
        .unwrap();

    let (status, body) = send(app(&book), request).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body.contains("is not allowed"));
    assert!(body.contains("Currently saved value: B"));
    assert!(book.writes().is_empty());
}

#[tokio::test]
async fn success_banner_follows_redirect() {
    let book = workbook();
    let (_, body) = send(
        app(&book),
        get("/?date=2024-01-01&student=Alice&assignment=Essay&lap=1&saved=inserted"),
    )
    .await;
    assert!(body.contains("Successfully inserted record."));
}

#[tokio::test]
async fn api_lists_options_and_values() {
    let book = workbook();

    let (status, body) = send(app(&book), get("/api/options")).await;
    assert_eq!(status, StatusCode::OK);
    let options: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(options["students"], serde_json::json!(["Alice", "Bob", "Chen"]));
    assert_eq!(options["laps"], serde_json::json!([1, 2, 3]));

    let (status, body) = send(app(&book), get("/api/values?assignment=Essay&lap=1")).await;
    assert_eq!(status, StatusCode::OK);
    let values: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(values[0]["value"], "A");
    assert_eq!(values[1]["value"], "B");
}

#[tokio::test]
async fn api_values_reports_configuration_error() {
    let book = workbook();
    let (status, body) = send(app(&book), get("/api/values?assignment=Essay&lap=9")).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let error: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(error["status"], "error");
    assert_eq!(
        error["message"],
        "No allowed values defined for this assignment/lap combination."
    );
}

#[tokio::test]
async fn api_upserts_records() {
    let book = workbook();
    let state = Arc::new(AppState::new(controller(&book)).unwrap());

    let post = |value: &str| {
        Request::builder()
            .method("POST")
            .uri("/api/records")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::json!({
                    "student_name": "Bob",
                    "date": "2024-01-05",
                    "assignment": "Essay",
                    "lap": 1,
                    "value": value,
                })
                .to_string(),
            ))
            .unwrap()
    };

    let (status, body) = send(router(state.clone()), post("B")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&body).unwrap(),
        serde_json::json!({"status": "ok", "result": "inserted"})
    );

    let (_, body) = send(router(state.clone()), post("A")).await;
    assert!(body.contains(r#""result":"updated""#));

    let (_, body) = send(router(state), get("/api/records")).await;
    let records: Vec<tracker::Record> = serde_json::from_str(&body).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].value, "A");
    assert_eq!(records[1].lap, 1);
}

#[tokio::test]
async fn backend_failure_is_bad_gateway() {
    let book = workbook();
    book.fail_sheet("records");

    let (status, body) = send(app(&book), get("/api/records")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.contains("injected failure"));

    let (status, _) = send(app(&book), get("/")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}
