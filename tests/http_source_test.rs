use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use multisource_fetch::source::http_source::HttpFetcher;
use multisource_fetch::source::traits::RemoteFetcher;

const TEST_SIZE: usize = 1024 * 1024; // 1 MB

fn body() -> Vec<u8> {
    (0..TEST_SIZE).map(|i| (i % 251) as u8).collect()
}

async fn serve_file(req: Request) -> impl IntoResponse {
    let body = body();
    let total = body.len() as u64;

    if let Some(range_val) = req.headers().get(header::RANGE) {
        let range_str = range_val.to_str().unwrap_or("");
        // Parse "bytes=START-END"
        if let Some(rest) = range_str.strip_prefix("bytes=") {
            let parts: Vec<&str> = rest.splitn(2, '-').collect();
            if parts.len() == 2 {
                let start: u64 = parts[0].parse().unwrap_or(0);
                let end: u64 = parts[1].parse().unwrap_or(total - 1);
                let end = end.min(total - 1);
                let slice = &body[start as usize..=end as usize];
                let content_range = format!("bytes {}-{}/{}", start, end, total);
                return (
                    StatusCode::PARTIAL_CONTENT,
                    [
                        (header::CONTENT_RANGE, content_range),
                        (header::CONTENT_LENGTH, slice.len().to_string()),
                    ],
                    slice.to_vec(),
                )
                    .into_response();
            }
        }
    }

    (StatusCode::OK, body).into_response()
}

/// Origin that ignores Range and always returns the whole resource.
async fn serve_whole(_req: Request) -> impl IntoResponse {
    (StatusCode::OK, body())
}

/// Origin that requires a token header.
async fn serve_authed(req: Request) -> axum::response::Response {
    match req.headers().get("x-token").and_then(|v| v.to_str().ok()) {
        Some("secret") => serve_file(req).await.into_response(),
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn start_server() -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let app = Router::new()
        .route("/file", get(serve_file))
        .route("/whole", get(serve_whole))
        .route("/authed", get(serve_authed));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, handle)
}

#[tokio::test]
async fn test_http_fetch_range() {
    let (addr, _handle) = start_server().await;
    let fetcher = HttpFetcher::new(HashMap::new());

    let data = fetcher
        .fetch(&format!("http://{}/file", addr), 1000, 100)
        .await
        .unwrap();
    assert_eq!(data.len(), 100);
    assert_eq!(&data[..], &body()[1000..1100]);
}

#[tokio::test]
async fn test_http_fetch_without_range_support() {
    let (addr, _handle) = start_server().await;
    let fetcher = HttpFetcher::default();

    let data = fetcher
        .fetch(&format!("http://{}/whole", addr), 500, 64)
        .await
        .unwrap();
    assert_eq!(&data[..], &body()[500..564]);
}

#[tokio::test]
async fn test_http_fetch_short_read_is_error() {
    let (addr, _handle) = start_server().await;
    let fetcher = HttpFetcher::default();

    // Range runs past the end of the resource; the origin answers with fewer bytes.
    let result = fetcher
        .fetch(&format!("http://{}/file", addr), TEST_SIZE as u64 - 10, 100)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_http_fetch_not_found_is_error() {
    let (addr, _handle) = start_server().await;
    let fetcher = HttpFetcher::default();

    let result = fetcher
        .fetch(&format!("http://{}/missing", addr), 0, 10)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_http_fetch_sends_configured_headers() {
    let (addr, _handle) = start_server().await;
    let url = format!("http://{}/authed", addr);

    assert!(HttpFetcher::default().fetch(&url, 0, 10).await.is_err());

    let fetcher = HttpFetcher::new(HashMap::from([(
        "x-token".to_string(),
        "secret".to_string(),
    )]));
    let data = fetcher.fetch(&url, 10, 20).await.unwrap();
    assert_eq!(&data[..], &body()[10..30]);
}
