//! HTTP adapter tests: every route and status mapping, driven in-process
//! through `tower::ServiceExt::oneshot`.

#![cfg(feature = "server")]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use edgequake_pdf2csv::server::{router, AppState};
use edgequake_pdf2csv::{ExtractionFailure, ServiceConfig, Table, TableExtractor};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "pdf2csv-test-boundary";

// ── Test helpers ─────────────────────────────────────────────────────────────

/// The test extractor keys its answer off a marker line in the document.
fn marker_extractor(pdf: &[u8]) -> Result<Vec<Table>, ExtractionFailure> {
    let text = String::from_utf8_lossy(pdf);
    if text.contains("SLOW") {
        std::thread::sleep(Duration::from_millis(1500));
        return Ok(vec![]);
    }
    if text.contains("BROKEN") {
        return Err(ExtractionFailure::new("PDF is corrupt or unsupported"));
    }
    let count = text.matches("TABLE").count();
    Ok((0..count)
        .map(|i| Table::from_rows([vec!["n".to_string(), i.to_string()]]))
        .collect())
}

fn pdf(marker: &str) -> Vec<u8> {
    format!("%PDF-1.7\n{marker}\n%%EOF\n").into_bytes()
}

struct App {
    _dir: TempDir,
    state: Arc<AppState>,
}

impl App {
    fn new(retrieval_wait_secs: u64) -> Self {
        let dir = TempDir::new().unwrap();
        let config = ServiceConfig::builder()
            .storage_dir(dir.path().join("csv"))
            .retrieval_wait_secs(retrieval_wait_secs)
            .max_upload_bytes(64 * 1024)
            .max_files_per_batch(4)
            .build()
            .unwrap();
        let extractor: Arc<dyn TableExtractor> = Arc::new(marker_extractor);
        let state = Arc::new(AppState::new(config, extractor).unwrap());
        Self { _dir: dir, state }
    }

    async fn send(&self, req: Request<Body>) -> Response {
        router(Arc::clone(&self.state)).oneshot(req).await.unwrap()
    }

    async fn upload(&self, files: &[(&str, Vec<u8>)]) -> Response {
        let parts: Vec<(&str, Option<&str>, Vec<u8>)> = files
            .iter()
            .map(|(name, bytes)| ("files", Some(*name), bytes.clone()))
            .collect();
        self.send(multipart_request(&parts)).await
    }

    async fn get(&self, uri: &str) -> Response {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn delete(&self, uri: &str) -> Response {
        self.send(Request::delete(uri).body(Body::empty()).unwrap())
            .await
    }

    /// Upload one file and return its identifier.
    async fn submit_one(&self, marker: &str) -> String {
        let resp = self.upload(&[("doc.pdf", pdf(marker))]).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        json["data"][0]["uid"].as_str().unwrap().to_string()
    }
}

fn multipart_request(parts: &[(&str, Option<&str>, Vec<u8>)]) -> Request<Body> {
    let mut body = Vec::new();
    for (field, filename, bytes) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match filename {
            Some(name) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{field}\"; filename=\"{name}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{field}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::post("/")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn body_bytes(resp: Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(resp: Response) -> Value {
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

// ── POST / ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn upload_returns_identifiers_per_file() {
    let app = App::new(10);
    let resp = app
        .upload(&[("a.pdf", pdf("TABLE")), ("my notes.pdf", pdf(""))])
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["file_name"], "a.pdf");
    assert_eq!(data[1]["file_name"], "my_notes.pdf");
    assert_ne!(data[0]["uid"], data[1]["uid"]);
}

#[tokio::test]
async fn missing_files_field_is_rejected() {
    let app = App::new(0);
    let resp = app
        .send(multipart_request(&[("comment", None, b"hello".to_vec())]))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "No files part in the request");
}

#[tokio::test]
async fn non_multipart_request_is_rejected() {
    let app = App::new(0);
    let req = Request::post("/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let resp = app.send(req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "No files part in the request");
}

#[tokio::test]
async fn empty_filename_means_nothing_selected() {
    let app = App::new(0);
    let resp = app.upload(&[("", Vec::new())]).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "No files selected for upload");
}

#[tokio::test]
async fn non_pdf_rejects_the_batch() {
    let app = App::new(0);
    let resp = app
        .upload(&[
            ("ok.pdf", pdf("TABLE")),
            ("fake.pdf", b"just some text".to_vec()),
        ])
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let json = body_json(resp).await;
    assert_eq!(json["message"], "All files should be PDFs");
    assert_eq!(json["rejected"][0], "fake.pdf");
    assert!(app.state.orchestrator.store().is_empty());
}

#[tokio::test]
async fn oversized_batch_is_rejected() {
    let app = App::new(0);
    let files: Vec<(&str, Vec<u8>)> = (0..5).map(|_| ("x.pdf", pdf(""))).collect();
    let resp = app.upload(&files).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(app.state.orchestrator.store().is_empty());
}

#[tokio::test]
async fn oversized_body_is_refused() {
    let app = App::new(0);
    let big = pdf(&"x".repeat(128 * 1024));
    let resp = app.upload(&[("big.pdf", big)]).await;
    assert!(resp.status().is_client_error(), "got {}", resp.status());
    assert!(app.state.orchestrator.store().is_empty());
}

#[tokio::test]
async fn oversized_extra_field_is_refused() {
    let app = App::new(0);
    let resp = app
        .send(multipart_request(&[
            ("comment", None, vec![b'x'; 128 * 1024]),
            ("files", Some("ok.pdf"), pdf("TABLE")),
        ]))
        .await;
    assert!(resp.status().is_client_error(), "got {}", resp.status());
    assert!(app.state.orchestrator.store().is_empty());
}

// ── GET /{uid} ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn single_table_downloads_as_csv() {
    let app = App::new(10);
    let uid = app.submit_one("TABLE").await;

    let resp = app.get(&format!("/{uid}")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/csv");
    let disposition = resp.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("table_1.csv"), "{disposition}");
    assert_eq!(body_bytes(resp).await, b"n,0\r\n");
}

#[tokio::test]
async fn several_tables_download_as_zip() {
    let app = App::new(10);
    let uid = app.submit_one("TABLE TABLE").await;

    let resp = app.get(&format!("/{uid}")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/zip");
    let bytes = body_bytes(resp).await;
    let zip = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    assert_eq!(zip.len(), 2);
}

#[tokio::test]
async fn no_tables_is_a_200_message() {
    let app = App::new(10);
    let uid = app.submit_one("nothing here").await;

    let resp = app.get(&format!("/{uid}")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["message"], "No tables found");
}

#[tokio::test]
async fn failed_job_is_422() {
    let app = App::new(10);
    let uid = app.submit_one("BROKEN").await;

    let resp = app.get(&format!("/{uid}")).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let reason = body_json(resp).await["error"].as_str().unwrap().to_string();
    assert!(reason.contains("corrupt"), "{reason}");
}

#[tokio::test]
async fn running_job_is_202() {
    let app = App::new(0);
    let uid = app.submit_one("SLOW").await;

    let resp = app.get(&format!("/{uid}")).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(resp).await["status"], "processing");
}

#[tokio::test]
async fn unknown_identifiers_are_404() {
    let app = App::new(0);
    for uri in ["/20000101_000000000000", "/not-an-id", "/20000101_000000000000/status"] {
        let resp = app.get(uri).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{uri}");
    }
}

// ── GET /{uid}/status, DELETE /{uid} ─────────────────────────────────────────

#[tokio::test]
async fn status_reports_the_job_record() {
    let app = App::new(10);
    let uid = app.submit_one("TABLE").await;
    // Wait for completion through the blocking retrieval.
    app.get(&format!("/{uid}")).await;

    let resp = app.get(&format!("/{uid}/status")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let job = body_json(resp).await;
    assert_eq!(job["id"], uid.as_str());
    assert_eq!(job["filename"], "doc.pdf");
    assert_eq!(job["status"]["state"], "completed_with_tables");
    assert_eq!(job["results"][0]["name"], "table_1.csv");
}

#[tokio::test]
async fn delete_finished_job() {
    let app = App::new(10);
    let uid = app.submit_one("TABLE").await;
    app.get(&format!("/{uid}")).await;

    let resp = app.delete(&format!("/{uid}")).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app.get(&format!("/{uid}")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let resp = app.delete(&format!("/{uid}")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_running_job_conflicts() {
    let app = App::new(0);
    let uid = app.submit_one("SLOW").await;

    let resp = app.delete(&format!("/{uid}")).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}
