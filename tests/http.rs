//! HTTP queue and document store against a loopback server.
//!
//! The server answers one canned response per accepted connection and
//! records what it was sent, so the tests can check both directions of the
//! wire format without any external service.

use ocr_worker::{
    DocumentResult, DocumentStore, HttpQueue, HttpStore, TaskQueue, WorkerConfig, WorkerError,
    WorkerProgressCallback,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

// ── Loopback server ──────────────────────────────────────────────────────────

struct Canned {
    status: &'static str,
    content_type: &'static str,
    body: Vec<u8>,
    /// Accept the connection but never answer.
    stall: bool,
}

impl Canned {
    fn json(status: &'static str, body: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.as_bytes().to_vec(),
            stall: false,
        }
    }

    fn bytes(status: &'static str, body: &[u8]) -> Self {
        Self {
            status,
            content_type: "application/octet-stream",
            body: body.to_vec(),
            stall: false,
        }
    }

    fn stall() -> Self {
        Self {
            status: "200 OK",
            content_type: "application/json",
            body: Vec::new(),
            stall: true,
        }
    }
}

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    path: String,
    body: Vec<u8>,
}

async fn serve(responses: Vec<Canned>) -> (String, JoinHandle<Vec<Recorded>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let mut recorded = Vec::new();
        for canned in responses {
            let (mut stream, _) = listener.accept().await.unwrap();
            recorded.push(read_request(&mut stream).await);
            if canned.stall {
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
            let head = format!(
                "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                canned.status,
                canned.content_type,
                canned.body.len()
            );
            stream.write_all(head.as_bytes()).await.unwrap();
            stream.write_all(&canned.body).await.unwrap();
            stream.shutdown().await.ok();
        }
        recorded
    });

    (base, handle)
}

async fn read_request(stream: &mut TcpStream) -> Recorded {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed before sending headers");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let content_length = lines
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Recorded { method, path, body }
}

fn queue_for(base: &str) -> HttpQueue {
    let config = WorkerConfig::builder()
        .task_url(format!("{base}/next?apiKey=secret"))
        .result_url(format!("{base}/result"))
        .fetch_timeout_secs(1)
        .submit_timeout_secs(2)
        .build()
        .unwrap();
    HttpQueue::new(&config).unwrap()
}

// ── Queue ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fetch_parses_task() {
    let (base, server) = serve(vec![Canned::json(
        "200 OK",
        r#"{"id":42,"uri":"/files/42.pdf","expires":"2099-01-01T00:00:00Z"}"#,
    )])
    .await;

    let task = queue_for(&base).fetch_task().await.unwrap().expect("a task");
    assert_eq!(task.id, 42);
    assert_eq!(task.uri, "/files/42.pdf");
    assert!(task.expires.is_some());

    let recorded = server.await.unwrap();
    assert_eq!(recorded[0].method, "POST");
    assert_eq!(recorded[0].path, "/next?apiKey=secret");
}

#[tokio::test]
async fn fetch_no_content_means_no_task() {
    let (base, _server) = serve(vec![Canned::bytes("204 No Content", b"")]).await;
    assert!(queue_for(&base).fetch_task().await.unwrap().is_none());
}

#[tokio::test]
async fn fetch_server_error_is_transient() {
    let (base, _server) = serve(vec![Canned::json("500 Internal Server Error", "{}")]).await;
    let err = queue_for(&base).fetch_task().await.unwrap_err();
    match err {
        WorkerError::FetchFailed { url, reason } => {
            assert!(reason.contains("500"), "reason: {reason}");
            assert!(!url.contains("secret"), "api key leaked: {url}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn fetch_malformed_body_fails() {
    let (base, _server) = serve(vec![Canned::json("200 OK", r#"{"id":"x"}"#)]).await;
    let err = queue_for(&base).fetch_task().await.unwrap_err();
    assert!(matches!(err, WorkerError::FetchFailed { .. }), "got {err:?}");
}

#[tokio::test]
async fn fetch_times_out() {
    let (base, _server) = serve(vec![Canned::stall()]).await;
    let err = queue_for(&base).fetch_task().await.unwrap_err();
    assert!(
        matches!(err, WorkerError::FetchTimeout { secs: 1, .. }),
        "got {err:?}"
    );
}

fn result(id: i64) -> DocumentResult {
    let mut extra = BTreeMap::new();
    extra.insert("source".to_string(), serde_json::json!("rust-worker"));
    DocumentResult {
        id,
        text: vec!["first".into(), "second".into()],
        duration: 1500,
        extra,
    }
}

#[tokio::test]
async fn submit_posts_wire_json() {
    let (base, server) = serve(vec![Canned::json("200 OK", "{}")]).await;
    queue_for(&base).submit_result(&result(12)).await.unwrap();

    let recorded = server.await.unwrap();
    assert_eq!(recorded[0].method, "POST");
    assert_eq!(recorded[0].path, "/result");
    let body: serde_json::Value = serde_json::from_slice(&recorded[0].body).unwrap();
    assert_eq!(
        body,
        serde_json::json!({
            "id": 12,
            "tekstas": ["first", "second"],
            "duration": 1500,
            "source": "rust-worker"
        })
    );
}

#[tokio::test]
async fn submit_rejected_status_fails() {
    let (base, _server) = serve(vec![Canned::json("503 Service Unavailable", "{}")]).await;
    let err = queue_for(&base).submit_result(&result(3)).await.unwrap_err();
    assert!(
        matches!(err, WorkerError::SubmitFailed { task_id: 3, .. }),
        "got {err:?}"
    );
}

// ── Document store ───────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingProgress {
    events: Mutex<Vec<String>>,
}

impl WorkerProgressCallback for RecordingProgress {
    fn on_download_start(&self, task_id: i64, total_bytes: Option<u64>) {
        self.events
            .lock()
            .unwrap()
            .push(format!("start {task_id} {total_bytes:?}"));
    }

    fn on_download_complete(&self, task_id: i64, bytes: u64) {
        self.events
            .lock()
            .unwrap()
            .push(format!("complete {task_id} {bytes}"));
    }
}

#[tokio::test]
async fn download_writes_document_and_reports_progress() {
    let pdf = b"%PDF-1.7\n1 0 obj\n<<>>\nendobj\n%%EOF\n";
    let (base, server) = serve(vec![Canned::bytes("200 OK", pdf)]).await;
    let progress = Arc::new(RecordingProgress::default());
    let callback: ocr_worker::ProgressCallback = progress.clone();
    let store = HttpStore::new(format!("{base}/file/"), 5, Some(callback)).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("21.pdf");
    store.fetch_document(21, "/a/21.pdf", &dest).await.unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), pdf);
    let recorded = server.await.unwrap();
    assert_eq!(recorded[0].method, "GET");
    assert_eq!(recorded[0].path, "/file/a/21.pdf");

    let events = progress.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            format!("start 21 Some({})", pdf.len()),
            format!("complete 21 {}", pdf.len()),
        ]
    );
}

#[tokio::test]
async fn download_rejects_non_pdf() {
    let (base, _server) = serve(vec![Canned::bytes("200 OK", b"<html>not found</html>")]).await;
    let store = HttpStore::new(base, 5, None).unwrap();
    let dir = tempfile::tempdir().unwrap();

    let err = store
        .fetch_document(1, "/1.pdf", &dir.path().join("1.pdf"))
        .await
        .unwrap_err();
    match err {
        WorkerError::NotAPdf { magic, .. } => assert_eq!(&magic, b"<htm"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn download_http_error_fails() {
    let (base, _server) = serve(vec![Canned::bytes("404 Not Found", b"")]).await;
    let store = HttpStore::new(base, 5, None).unwrap();
    let dir = tempfile::tempdir().unwrap();

    let err = store
        .fetch_document(1, "/missing.pdf", &dir.path().join("1.pdf"))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::DownloadFailed { .. }), "got {err:?}");
    assert_eq!(err.kind(), ocr_worker::ErrorKind::Staging);
}
