use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use secure_upload::config::UploadConfig;
use secure_upload::models::StoredFile;
use secure_upload::services::analyzer::{ImageAnalyzer, NoOpAnalyzer};
use secure_upload::services::intake::IntakeService;
use secure_upload::services::storage::{LocalStorageService, StorageService};
use secure_upload::services::storage_lifecycle::StorageLifecycleService;
use secure_upload::{AppState, create_app};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "---------------------------123456789012345678901234567";
const JPEG_BYTES: &[u8] = b"\xFF\xD8\xFF\xE0\x00\x10JFIF\x00";

/// Records which files existed on disk while the analyzer held them.
struct RecordingAnalyzer {
    seen_on_disk: AtomicUsize,
}

#[async_trait]
impl ImageAnalyzer for RecordingAnalyzer {
    async fn analyze(&self, files: &[StoredFile], _custom_text: Option<&str>) -> anyhow::Result<Value> {
        let present = files.iter().filter(|f| f.absolute_path().exists()).count();
        self.seen_on_disk.store(present, Ordering::SeqCst);
        Ok(serde_json::json!({ "present": present }))
    }
}

struct FailingAnalyzer;

#[async_trait]
impl ImageAnalyzer for FailingAnalyzer {
    async fn analyze(&self, _files: &[StoredFile], _custom_text: Option<&str>) -> anyhow::Result<Value> {
        anyhow::bail!("upstream model rejected the request")
    }
}

struct SlowAnalyzer;

#[async_trait]
impl ImageAnalyzer for SlowAnalyzer {
    async fn analyze(&self, _files: &[StoredFile], _custom_text: Option<&str>) -> anyhow::Result<Value> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Value::Null)
    }
}

struct TestApp {
    app: Router,
    storage: Arc<LocalStorageService>,
    _tmp: TempDir,
}

fn setup_app(analyzer: Arc<dyn ImageAnalyzer>, config: UploadConfig) -> TestApp {
    let tmp = TempDir::new().unwrap();
    let storage = Arc::new(LocalStorageService::new(tmp.path().join("uploads")));
    let storage_dyn: Arc<dyn StorageService> = storage.clone();
    let lifecycle = Arc::new(StorageLifecycleService::new(storage_dyn.clone()));
    let intake = Arc::new(IntakeService::new(
        storage_dyn.clone(),
        lifecycle.clone(),
        analyzer,
        config.clone(),
    ));

    let state = AppState {
        storage: storage_dyn,
        lifecycle,
        intake,
        config,
    };

    TestApp {
        app: create_app(state),
        storage,
        _tmp: tmp,
    }
}

fn file_part(filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut part = format!(
        "--{BOUNDARY}\r\n\
        Content-Disposition: form-data; name=\"images\"; filename=\"{filename}\"\r\n\
        Content-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    part.extend_from_slice(data);
    part.extend_from_slice(b"\r\n");
    part
}

fn text_part(name: &str, value: &str) -> Vec<u8> {
    format!(
        "--{BOUNDARY}\r\n\
        Content-Disposition: form-data; name=\"{name}\"\r\n\r\n\
        {value}\r\n"
    )
    .into_bytes()
}

fn multipart_body(parts: Vec<Vec<u8>>) -> Vec<u8> {
    let mut body: Vec<u8> = parts.into_iter().flatten().collect();
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn post_analyze(app: &Router, body: Vec<u8>) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/analyze")
                .header(
                    "Content-Type",
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn files_on_disk(storage: &LocalStorageService) -> usize {
    storage.list_files().await.unwrap().len()
}

#[tokio::test]
async fn test_valid_upload_is_processed_and_removed() {
    let recorder = Arc::new(RecordingAnalyzer {
        seen_on_disk: AtomicUsize::new(0),
    });
    let t = setup_app(recorder.clone(), UploadConfig::default());

    let body = multipart_body(vec![
        file_part("test.jpg", "image/jpeg", JPEG_BYTES),
        text_part("custom_text", "what is in this picture?"),
    ]);
    let (status, json) = post_analyze(&t.app, body).await;

    assert_eq!(status, StatusCode::OK, "body: {json}");
    assert_eq!(json["file_count"], 1);
    assert_eq!(json["result"]["present"], 1);
    assert_eq!(recorder.seen_on_disk.load(Ordering::SeqCst), 1);
    assert_eq!(files_on_disk(&t.storage).await, 0);
}

#[tokio::test]
async fn test_multiple_files_are_all_removed() {
    let t = setup_app(Arc::new(NoOpAnalyzer), UploadConfig::default());

    let body = multipart_body(vec![
        file_part("a.jpg", "image/jpeg", JPEG_BYTES),
        file_part("b.png", "image/png", b"\x89PNG\r\n\x1a\n"),
        file_part("c.webp", "image/webp", b"RIFF\x00\x00\x00\x00WEBP"),
    ]);
    let (status, json) = post_analyze(&t.app, body).await;

    assert_eq!(status, StatusCode::OK, "body: {json}");
    assert_eq!(json["file_count"], 3);
    assert_eq!(files_on_disk(&t.storage).await, 0);
}

#[tokio::test]
async fn test_path_traversal_is_rejected_before_storage() {
    let t = setup_app(Arc::new(NoOpAnalyzer), UploadConfig::default());

    let body = multipart_body(vec![file_part("../../evil.png", "image/png", b"\x89PNG")]);
    let (status, json) = post_analyze(&t.app, body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_FILENAME_PATH");
    assert_eq!(json["files"][0]["filename"], "../../evil.png");
    assert_eq!(files_on_disk(&t.storage).await, 0);
}

#[tokio::test]
async fn test_double_extension_is_rejected() {
    let t = setup_app(Arc::new(NoOpAnalyzer), UploadConfig::default());

    let body = multipart_body(vec![
        file_part("holiday.jpg", "image/jpeg", JPEG_BYTES),
        file_part("shell.php.jpg", "image/jpeg", JPEG_BYTES),
    ]);
    let (status, json) = post_analyze(&t.app, body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "DANGEROUS_FILENAME");
    assert_eq!(json["files"].as_array().unwrap().len(), 1);
    assert_eq!(files_on_disk(&t.storage).await, 0);
}

#[tokio::test]
async fn test_wrong_mime_type_is_rejected() {
    let t = setup_app(Arc::new(NoOpAnalyzer), UploadConfig::default());

    let body = multipart_body(vec![file_part("notes.jpg", "text/plain", b"hello")]);
    let (status, json) = post_analyze(&t.app, body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_MIME_TYPE");
    assert!(json["error"].as_str().is_some());
}

#[tokio::test]
async fn test_too_many_files_persists_nothing() {
    let t = setup_app(Arc::new(NoOpAnalyzer), UploadConfig::default());

    let parts = (0..11)
        .map(|i| file_part(&format!("img{i}.jpg"), "image/jpeg", JPEG_BYTES))
        .collect();
    let (status, json) = post_analyze(&t.app, multipart_body(parts)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "TOO_MANY_FILES");
    assert_eq!(files_on_disk(&t.storage).await, 0);
}

#[tokio::test]
async fn test_oversized_file_is_rejected() {
    let config = UploadConfig {
        max_file_size: 1024,
        ..UploadConfig::default()
    };
    let t = setup_app(Arc::new(NoOpAnalyzer), config);

    let big = vec![0xFFu8; 4096];
    let body = multipart_body(vec![file_part("big.jpg", "image/jpeg", &big)]);
    let (status, json) = post_analyze(&t.app, body).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["code"], "FILE_TOO_LARGE");
    assert_eq!(files_on_disk(&t.storage).await, 0);
}

#[tokio::test]
async fn test_missing_files_is_rejected() {
    let t = setup_app(Arc::new(NoOpAnalyzer), UploadConfig::default());

    let body = multipart_body(vec![text_part("custom_text", "no pictures today")]);
    let (status, json) = post_analyze(&t.app, body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "NO_FILES");
}

#[tokio::test]
async fn test_long_custom_text_is_rejected() {
    let config = UploadConfig {
        max_text_length: 10,
        ..UploadConfig::default()
    };
    let t = setup_app(Arc::new(NoOpAnalyzer), config);

    let body = multipart_body(vec![
        file_part("ok.jpg", "image/jpeg", JPEG_BYTES),
        text_part("custom_text", "this text is far longer than ten characters"),
    ]);
    let (status, json) = post_analyze(&t.app, body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "FIELD_TOO_LONG");
    assert_eq!(files_on_disk(&t.storage).await, 0);
}

#[tokio::test]
async fn test_analyzer_failure_still_cleans_up() {
    let t = setup_app(Arc::new(FailingAnalyzer), UploadConfig::default());

    let body = multipart_body(vec![file_part("test.jpg", "image/jpeg", JPEG_BYTES)]);
    let (status, json) = post_analyze(&t.app, body).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "PROCESSING_ERROR");
    // Internal detail must not leak to the client
    assert!(!json.to_string().contains("upstream model"));
    assert_eq!(files_on_disk(&t.storage).await, 0);
}

#[tokio::test]
async fn test_analyzer_timeout_still_cleans_up() {
    let config = UploadConfig {
        processing_timeout_secs: 1,
        ..UploadConfig::default()
    };
    let t = setup_app(Arc::new(SlowAnalyzer), config);

    let body = multipart_body(vec![file_part("slow.jpg", "image/jpeg", JPEG_BYTES)]);
    let (status, json) = post_analyze(&t.app, body).await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(json["code"], "PROCESSING_TIMEOUT");
    assert_eq!(files_on_disk(&t.storage).await, 0);
}

#[tokio::test]
async fn test_truncated_multipart_is_rejected() {
    let t = setup_app(Arc::new(NoOpAnalyzer), UploadConfig::default());

    // Part is opened but the closing boundary never arrives
    let truncated = file_part("cut.jpg", "image/jpeg", JPEG_BYTES);
    let (status, json) = post_analyze(&t.app, truncated).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_MULTIPART");
}

#[tokio::test]
async fn test_body_over_request_limit_is_file_too_large() {
    let config = UploadConfig {
        max_file_size: 1024,
        max_files: 1,
        ..UploadConfig::default()
    };
    let t = setup_app(Arc::new(NoOpAnalyzer), config);

    let huge_text = "a".repeat(2 * 1024 * 1024);
    let body = multipart_body(vec![
        file_part("ok.jpg", "image/jpeg", JPEG_BYTES),
        text_part("custom_text", &huge_text),
    ]);
    let (status, json) = post_analyze(&t.app, body).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE, "body: {json}");
    assert_eq!(json["code"], "FILE_TOO_LARGE");
    assert_eq!(files_on_disk(&t.storage).await, 0);
}

#[tokio::test]
async fn test_too_many_fields_is_rejected() {
    let config = UploadConfig {
        max_fields: 3,
        ..UploadConfig::default()
    };
    let t = setup_app(Arc::new(NoOpAnalyzer), config);

    let body = multipart_body(vec![
        file_part("ok.jpg", "image/jpeg", JPEG_BYTES),
        text_part("note", "one"),
        text_part("note", "two"),
        text_part("note", "three"),
    ]);
    let (status, json) = post_analyze(&t.app, body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "TOO_MANY_FIELDS");
    assert_eq!(files_on_disk(&t.storage).await, 0);
}
