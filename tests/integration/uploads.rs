//! Gemini resumable upload tests
//!
//! Drive the upload routes end to end: init, single-shot and chunked data
//! calls, completion statuses and metadata fetches.

use axum::http::StatusCode;
use bytes::Bytes;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use wiremock::{
    matchers::{header, method, path, query_param},
    Mock, ResponseTemplate,
};

use crate::common::{google_key, header as with_header, test_server};
use crate::mocks::{header_of, MockUpstream};

#[tokio::test]
async fn test_init_returns_session_url_and_headers_unmodified() {
    let upstream = MockUpstream::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/v1beta/files"))
        .and(header("x-goog-upload-protocol", "resumable"))
        .and(header("x-goog-upload-command", "start"))
        .and(header("x-goog-upload-header-content-length", "3145728"))
        .and(header("x-goog-upload-header-content-type", "video/mp4"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-goog-upload-url", "https://upload.example/session/abc")
                .insert_header("x-goog-upload-status", "active")
                .insert_header("location", "https://upload.example/session/abc")
                .set_body_json(json!({})),
        )
        .expect(1)
        .mount(upstream.server())
        .await;

    let server = test_server(&upstream.uri());
    let request = google_key(server.post("/google/upload/v1beta/files"));
    let request = with_header(request, "x-goog-upload-protocol", "resumable");
    let request = with_header(request, "x-goog-upload-command", "start");
    let request = with_header(request, "x-goog-upload-header-content-length", "3145728");
    let request = with_header(request, "x-goog-upload-header-content-type", "video/mp4");
    let response = request
        .json(&json!({"file": {"display_name": "clip.mp4"}}))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(
        headers.get("x-goog-upload-url").unwrap(),
        "https://upload.example/session/abc"
    );
    assert_eq!(
        headers.get("location").unwrap(),
        "https://upload.example/session/abc"
    );
    assert_eq!(headers.get("x-goog-upload-status").unwrap(), "active");

    let received = upstream.only_request().await;
    let metadata: Value = serde_json::from_slice(&received.body).unwrap();
    assert_eq!(metadata, json!({"file": {"display_name": "clip.mp4"}}));
}

#[tokio::test]
async fn test_init_without_metadata_sends_no_body() {
    let upstream = MockUpstream::start().await;
    upstream
        .mock_json("POST", "/upload/v1beta/files", 200, json!({}))
        .await;

    let server = test_server(&upstream.uri());
    let response = google_key(server.post("/google/upload/v1beta/files")).await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(upstream.only_request().await.body.is_empty());
}

#[tokio::test]
async fn test_middle_chunk_defaults_offset_and_returns_body_only() {
    let upstream = MockUpstream::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/v1beta/files/abc"))
        .and(header("x-goog-upload-command", "upload"))
        .and(header("x-goog-upload-offset", "0"))
        .and(header("content-length", "10"))
        .respond_with(ResponseTemplate::new(308).insert_header("x-goog-upload-size-received", "10"))
        .expect(1)
        .mount(upstream.server())
        .await;

    let server = test_server(&upstream.uri());
    let response = google_key(
        server
            .post("/google/upload/v1beta/files/abc")
            .add_query_param("chunk_index", "1")
            .add_query_param("total_chunks", "3"),
    )
    .bytes(Bytes::from_static(b"0123456789"))
    .await;

    // 308 means more data expected; the caller never sees a redirect
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body, json!(""));

    let received = upstream.only_request().await;
    assert_eq!(received.body, b"0123456789".to_vec());
    // Gateway addressing never reaches the provider
    assert_eq!(received.url.query(), None);
}

#[tokio::test]
async fn test_final_chunk_created_returns_envelope() {
    let upstream = MockUpstream::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/v1beta/files/abc"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("x-quota", "10")
                .set_body_json(json!({"fileId": "f1"})),
        )
        .expect(1)
        .mount(upstream.server())
        .await;

    let server = test_server(&upstream.uri());
    let request = google_key(
        server
            .post("/google/upload/v1beta/files/chunk/abc")
            .add_query_param("chunk_index", "2")
            .add_query_param("total_chunks", "3"),
    );
    let response = with_header(request, "x-goog-upload-offset", "20")
        .bytes(Bytes::from_static(b"tail"))
        .await;

    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["status"], 201);
    assert_eq!(body["headers"]["x-quota"], "10");
    assert_eq!(body["data"], json!({"fileId": "f1"}));

    let received = upstream.only_request().await;
    assert_eq!(header_of(&received, "x-goog-upload-command"), Some("upload, finalize"));
    assert_eq!(header_of(&received, "x-goog-upload-offset"), Some("20"));
}

#[tokio::test]
async fn test_single_shot_upload_finalizes_once() {
    let upstream = MockUpstream::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/v1beta/files/abc"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"file": {"uri": "files/abc"}})),
        )
        .expect(1)
        .mount(upstream.server())
        .await;

    let server = test_server(&upstream.uri());
    let response = google_key(server.post("/google/upload/v1beta/files/abc"))
        .bytes(Bytes::from_static(b"hello"))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body, json!({"file": {"uri": "files/abc"}}));

    let received = upstream.only_request().await;
    assert_eq!(header_of(&received, "x-goog-upload-command"), Some("upload, finalize"));
    assert_eq!(header_of(&received, "x-goog-upload-offset"), Some("0"));
    assert_eq!(header_of(&received, "content-length"), Some("5"));
}

#[tokio::test]
async fn test_every_chunked_upload_finalizes_exactly_once() {
    for total in 1..=4u32 {
        let upstream = MockUpstream::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/v1beta/files/abc"))
            .respond_with(ResponseTemplate::new(308))
            .mount(upstream.server())
            .await;

        let server = test_server(&upstream.uri());
        for index in 0..total {
            let response = google_key(
                server
                    .post("/google/upload/v1beta/files/chunk/abc")
                    .add_query_param("chunk_index", &index.to_string())
                    .add_query_param("total_chunks", &total.to_string()),
            )
            .bytes(Bytes::from_static(b"xy"))
            .await;
            assert_eq!(response.status_code(), StatusCode::OK);
        }

        let commands: Vec<String> = upstream
            .received()
            .await
            .iter()
            .map(|r| header_of(r, "x-goog-upload-command").unwrap_or_default().to_string())
            .collect();

        let mut expected = vec!["upload".to_string(); total as usize - 1];
        expected.push("upload, finalize".to_string());
        assert_eq!(commands, expected, "total_chunks = {}", total);
    }
}

#[tokio::test]
async fn test_session_url_data_call_on_collection_route() {
    let upstream = MockUpstream::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/v1beta/files"))
        .and(query_param("upload_id", "abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"file": {"name": "files/abc"}})))
        .expect(1)
        .mount(upstream.server())
        .await;

    let server = test_server(&upstream.uri());
    let response = google_key(
        server
            .post("/google/upload/v1beta/files")
            .add_query_param("upload_id", "abc")
            .add_query_param("upload_protocol", "resumable"),
    )
    .bytes(Bytes::from_static(b"%PDF-1.7"))
    .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let received = upstream.only_request().await;
    assert_eq!(received.body, b"%PDF-1.7".to_vec());
    assert_eq!(header_of(&received, "x-goog-upload-command"), Some("upload, finalize"));
}

#[tokio::test]
async fn test_chunk_index_out_of_range_is_bad_request() {
    let upstream = MockUpstream::start().await;
    upstream.expect_no_calls().await;

    let server = test_server(&upstream.uri());
    let response = google_key(
        server
            .post("/google/upload/v1beta/files/chunk/abc")
            .add_query_param("chunk_index", "3")
            .add_query_param("total_chunks", "3"),
    )
    .bytes(Bytes::from_static(b"x"))
    .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_rejected_chunk_surfaces_provider_error() {
    let upstream = MockUpstream::start().await;
    let error = "{\"error\":{\"code\":400,\"message\":\"Invalid offset\"}}";
    upstream.mock_error("/upload/v1beta/files/abc", 400, error).await;

    let server = test_server(&upstream.uri());
    let response = google_key(
        server
            .post("/google/upload/v1beta/files/abc")
            .add_query_param("chunk_index", "0")
            .add_query_param("total_chunks", "2"),
    )
    .bytes(Bytes::from_static(b"x"))
    .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text(), error);
}

#[tokio::test]
async fn test_file_metadata_fetch() {
    let upstream = MockUpstream::start().await;
    Mock::given(method("GET"))
        .and(path("/v1beta/files/abc"))
        .and(header("x-goog-api-key", "AIza-test"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"name": "files/abc", "state": "ACTIVE"})),
        )
        .expect(1)
        .mount(upstream.server())
        .await;

    let server = test_server(&upstream.uri());
    let response = google_key(server.get("/google/v1beta/files/abc")).await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["state"], "ACTIVE");
}
