//! End-to-end tests against an in-process S3 stub server.
//!
//! The stub implements just enough of the S3 REST surface for the client's
//! operations: path-style object PUT/GET, CreateBucket, ListObjectsV2 with
//! prefix/max-keys/continuation-token, and Multi-Object Delete. It also
//! records the headers and bodies it receives so tests can assert on the
//! wire format.

use std::{
    collections::BTreeMap,
    io::Write,
    net::SocketAddr,
    os::unix::fs::FileExt,
    sync::{Arc, Mutex},
    thread,
};

use axum::{
    Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::put,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use s3_client::{
    BackendKind, DeleteObject, ErrorKind, GetRange, ListObjectsRequest,
    S3Client, S3Config,
};
use serde::Deserialize;

// --- stub server --- //

#[derive(Clone, Default)]
struct Stub {
    /// `"bucket/key"` -> body.
    objects: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    buckets: Arc<Mutex<Vec<String>>>,
    last_headers: Arc<Mutex<Option<HeaderMap>>>,
    last_delete_body: Arc<Mutex<Option<Vec<u8>>>>,
}

impl Stub {
    fn insert(&self, bucket: &str, key: &str, body: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(format!("{bucket}/{key}"), body.to_vec());
    }

    fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&format!("{bucket}/{key}"))
            .cloned()
    }

    fn last_headers(&self) -> HeaderMap {
        self.last_headers.lock().unwrap().clone().expect("no request seen")
    }
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(rename = "list-type")]
    _list_type: Option<String>,
    prefix: Option<String>,
    #[serde(rename = "max-keys")]
    max_keys: Option<usize>,
    #[serde(rename = "continuation-token")]
    continuation_token: Option<String>,
    delete: Option<String>,
}

async fn put_object(
    State(stub): State<Stub>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    *stub.last_headers.lock().unwrap() = Some(headers);
    stub.insert(&bucket, &key, &body);
    StatusCode::OK
}

async fn get_object(
    State(stub): State<Stub>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    *stub.last_headers.lock().unwrap() = Some(headers);
    match stub.get(&bucket, &key) {
        Some(body) => (StatusCode::OK, body).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            "<Error><Code>NoSuchKey</Code></Error>".to_string(),
        )
            .into_response(),
    }
}

async fn create_bucket(
    State(stub): State<Stub>,
    Path(bucket): Path<String>,
    headers: HeaderMap,
) -> StatusCode {
    *stub.last_headers.lock().unwrap() = Some(headers);
    stub.buckets.lock().unwrap().push(bucket);
    StatusCode::OK
}

async fn list_objects(
    State(stub): State<Stub>,
    Path(bucket): Path<String>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
) -> Response {
    *stub.last_headers.lock().unwrap() = Some(headers);

    let prefix = params.prefix.unwrap_or_default();
    let want = format!("{bucket}/{prefix}");
    let keys: Vec<(String, usize)> = stub
        .objects
        .lock()
        .unwrap()
        .iter()
        .filter(|(path, _)| path.starts_with(&want))
        .map(|(path, body)| {
            (path[bucket.len() + 1..].to_string(), body.len())
        })
        .collect();

    let start: usize = params
        .continuation_token
        .and_then(|t| t.parse().ok())
        .unwrap_or(0);
    let page_len = params
        .max_keys
        .unwrap_or(usize::MAX)
        .min(keys.len().saturating_sub(start));
    let page = &keys[start..start + page_len];
    let truncated = start + page_len < keys.len();

    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<ListBucketResult>",
    );
    xml.push_str(&format!("<IsTruncated>{truncated}</IsTruncated>"));
    if truncated {
        xml.push_str(&format!(
            "<NextContinuationToken>{}</NextContinuationToken>",
            start + page_len
        ));
    }
    for (key, size) in page {
        xml.push_str(&format!(
            "<Contents><Key>{key}</Key><Size>{size}</Size>\
             <ETag>\"etag-{size}\"</ETag>\
             <LastModified>2024-05-01T12:00:00.000Z</LastModified>\
             <StorageClass>STANDARD</StorageClass></Contents>"
        ));
    }
    xml.push_str("</ListBucketResult>");

    (StatusCode::OK, xml).into_response()
}

async fn delete_objects(
    State(stub): State<Stub>,
    Path(_bucket): Path<String>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    assert!(params.delete.is_some(), "POST without ?delete");
    *stub.last_headers.lock().unwrap() = Some(headers);
    *stub.last_delete_body.lock().unwrap() = Some(body.to_vec());
    (StatusCode::OK, "<DeleteResult/>".to_string()).into_response()
}

fn spawn_stub() -> (Stub, SocketAddr) {
    let stub = Stub::default();
    let app = Router::new()
        .route(
            "/{bucket}",
            put(create_bucket).get(list_objects).post(delete_objects),
        )
        .route("/{bucket}/{*key}", put(put_object).get(get_object))
        .with_state(stub.clone());

    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    listener.set_nonblocking(true).expect("nonblocking");

    thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("stub runtime");
        runtime.block_on(async move {
            let listener =
                tokio::net::TcpListener::from_std(listener).expect("listener");
            axum::serve(listener, app).await.expect("serve");
        });
    });

    (stub, addr)
}

fn test_config(addr: SocketAddr, backend: BackendKind) -> S3Config {
    let mut config =
        S3Config::new(format!("http://{addr}"), "us-east-1", "user", "12345678");
    config.backend = backend;
    config.default_bucket = Some("b".to_string());
    config
}

fn test_client(addr: SocketAddr, backend: BackendKind) -> S3Client {
    S3Client::new(test_config(addr, backend)).expect("client")
}

// --- tests --- //

#[test]
fn round_trip_put_then_get_file() {
    let (stub, addr) = spawn_stub();
    let client = test_client(addr, BackendKind::Sync);

    const CONTENT: &[u8] = b"hello from s3-client";

    let mut src = tempfile::tempfile().expect("tempfile");
    src.write_all(CONTENT).expect("write");
    client
        .put_file(Some("b"), "k", &src, 0, CONTENT.len() as u64, Some("text/plain"))
        .expect("put_file");
    assert!(client.last_error().is_ok());
    assert_eq!(stub.get("b", "k").as_deref(), Some(CONTENT));
    assert_eq!(stub.last_headers().get("content-type").unwrap(), "text/plain");

    let dst = tempfile::tempfile().expect("tempfile");
    let written = client
        .get_file(Some("b"), "k", &dst, 0, 4096, None)
        .expect("get_file");
    assert_eq!(written, CONTENT.len() as u64);

    let mut out = vec![0u8; CONTENT.len()];
    dst.read_exact_at(&mut out, 0).expect("read back");
    assert_eq!(out, CONTENT);
}

#[test]
fn put_file_reads_at_offset() {
    let (stub, addr) = spawn_stub();
    let client = test_client(addr, BackendKind::Sync);

    let mut src = tempfile::tempfile().expect("tempfile");
    src.write_all(b"zzpayload").expect("write");
    client
        .put_file(Some("b"), "k", &src, 2, 7, None)
        .expect("put_file");
    assert_eq!(stub.get("b", "k").as_deref(), Some(b"payload".as_slice()));
}

#[test]
fn get_file_writes_at_offset() {
    let (stub, addr) = spawn_stub();
    let client = test_client(addr, BackendKind::Sync);
    stub.insert("b", "k", b"hello");

    let dst = tempfile::tempfile().expect("tempfile");
    let written = client
        .get_file(Some("b"), "k", &dst, 3, 0, None)
        .expect("get_file");
    assert_eq!(written, 5);

    let mut out = vec![0u8; 8];
    dst.read_exact_at(&mut out, 0).expect("read back");
    assert_eq!(&out, b"\0\0\0hello");
}

#[test]
fn get_missing_key_maps_to_not_found() {
    let (_stub, addr) = spawn_stub();
    let client = test_client(addr, BackendKind::Sync);

    let err = client.get_bytes(Some("b"), "absent", 0, None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(err.http_status, Some(404));

    let last = client.last_error();
    assert_eq!(last.kind, ErrorKind::NotFound);
    assert_eq!(last.http_status, Some(404));
}

#[test]
fn last_error_resets_on_success() {
    let (stub, addr) = spawn_stub();
    let client = test_client(addr, BackendKind::Sync);
    stub.insert("b", "k", b"data");

    assert!(client.get_bytes(Some("b"), "absent", 0, None).is_err());
    assert_eq!(client.last_error().kind, ErrorKind::NotFound);

    client.get_bytes(Some("b"), "k", 0, None).expect("get");
    assert!(client.last_error().is_ok());
}

#[test]
fn list_with_prefix_and_pagination() {
    let (stub, addr) = spawn_stub();
    let client = test_client(addr, BackendKind::Sync);
    stub.insert("b", "logs/a", b"aaa");
    stub.insert("b", "logs/b", b"bbbb");
    stub.insert("b", "logs/c", b"ccccc");
    stub.insert("b", "other/x", b"x");

    let first = client
        .list_objects(&ListObjectsRequest {
            bucket: Some("b".to_string()),
            prefix: Some("logs/".to_string()),
            max_keys: 2,
            continuation_token: None,
        })
        .expect("first page");
    assert_eq!(first.objects.len(), 2);
    assert!(first.is_truncated);
    let token = first.next_continuation_token.clone().expect("token");
    assert_eq!(first.objects[0].key, "logs/a");
    assert_eq!(first.objects[0].size, 3);
    assert_eq!(first.objects[0].etag.as_deref(), Some("etag-3"));
    assert_eq!(first.objects[1].key, "logs/b");

    let second = client
        .list_objects(&ListObjectsRequest {
            bucket: Some("b".to_string()),
            prefix: Some("logs/".to_string()),
            max_keys: 2,
            continuation_token: Some(token),
        })
        .expect("second page");
    assert_eq!(second.objects.len(), 1);
    assert_eq!(second.objects[0].key, "logs/c");
    assert!(!second.is_truncated);
    assert_eq!(second.next_continuation_token, None);
}

#[test]
fn delete_objects_body_and_content_md5() {
    let (stub, addr) = spawn_stub();
    let client = test_client(addr, BackendKind::Sync);

    let objects = vec![
        DeleteObject::new("a&b"),
        DeleteObject::with_version("c", "v1"),
    ];
    client
        .delete_objects(Some("b"), &objects, false)
        .expect("delete_objects");
    // The input is untouched.
    assert_eq!(objects[0].key, "a&b");

    let body = stub
        .last_delete_body
        .lock()
        .unwrap()
        .clone()
        .expect("delete body");
    assert_eq!(
        String::from_utf8(body.clone()).unwrap(),
        "<Delete xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\n  \
         <Object>\n    <Key>a&amp;b</Key>\n  </Object>\n  <Object>\n    \
         <Key>c</Key>\n    <VersionId>v1</VersionId>\n  </Object>\n</Delete>"
    );

    let headers = stub.last_headers();
    assert_eq!(headers.get("content-type").unwrap(), "application/xml");
    let expected_md5 = STANDARD.encode(md5::compute(&body).0);
    assert_eq!(
        headers.get("content-md5").unwrap().to_str().unwrap(),
        expected_md5
    );
}

#[test]
fn create_bucket_and_empty_validation() {
    let (stub, addr) = spawn_stub();
    let client = test_client(addr, BackendKind::Sync);

    client.create_bucket("new-bucket").expect("create_bucket");
    assert_eq!(stub.buckets.lock().unwrap().as_slice(), ["new-bucket"]);

    let err = client.create_bucket("").unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArg);
}

#[test]
fn invalid_configurations_are_rejected() {
    let mut config = S3Config::new("http://127.0.0.1:1", "", "user", "12345678");
    config.require_sigv4 = true;
    let err = S3Client::new(config).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArg);

    let config = S3Config::new("http://127.0.0.1:1", "us-east-1", "user", "");
    let err = S3Client::new(config).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArg);
}

#[test]
fn sigv4_headers_on_the_wire() {
    let (stub, addr) = spawn_stub();
    let mut config = test_config(addr, BackendKind::Sync);
    config.session_token = Some("session-token".to_string());
    let client = S3Client::new(config).expect("client");

    client
        .put_bytes(Some("b"), "k", b"data", None)
        .expect("put_bytes");

    let headers = stub.last_headers();
    let authorization = headers
        .get("authorization")
        .expect("authorization header")
        .to_str()
        .unwrap();
    assert!(authorization.starts_with("AWS4-HMAC-SHA256 Credential=user/"));
    assert!(authorization.contains("/us-east-1/s3/aws4_request"));
    assert!(authorization.contains("SignedHeaders="));
    assert!(authorization.contains("Signature="));
    assert!(headers.contains_key("x-amz-date"));
    assert!(headers.contains_key("x-amz-content-sha256"));
    assert_eq!(
        headers.get("x-amz-security-token").unwrap(),
        "session-token"
    );
}

#[test]
fn basic_auth_on_the_wire() {
    let (stub, addr) = spawn_stub();
    let mut config = test_config(addr, BackendKind::Sync);
    config.require_sigv4 = false;
    let client = S3Client::new(config).expect("client");

    client
        .put_bytes(Some("b"), "k", b"data", None)
        .expect("put_bytes");

    let headers = stub.last_headers();
    let expected = format!("Basic {}", STANDARD.encode("user:12345678"));
    assert_eq!(
        headers.get("authorization").unwrap().to_str().unwrap(),
        expected
    );
    assert!(!headers.contains_key("x-amz-date"));
}

#[test]
fn range_header_passthrough() {
    let (stub, addr) = spawn_stub();
    let client = test_client(addr, BackendKind::Sync);
    stub.insert("b", "k", b"0123456789");

    client
        .get_bytes(Some("b"), "k", 0, Some(GetRange { start: 0, end: Some(4) }))
        .expect("ranged get");
    assert_eq!(stub.last_headers().get("range").unwrap(), "bytes=0-4");
}

#[test]
fn get_bytes_size_limit_aborts() {
    let (stub, addr) = spawn_stub();
    let client = test_client(addr, BackendKind::Sync);
    stub.insert("b", "k", b"0123456789");

    let body = client.get_bytes(Some("b"), "k", 10, None).expect("exact fit");
    assert_eq!(body, b"0123456789");

    let err = client.get_bytes(Some("b"), "k", 4, None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Io);
}

#[test]
fn put_bytes_round_trip_on_multiplexed_backend() {
    let (stub, addr) = spawn_stub();
    let client = test_client(addr, BackendKind::Multiplexed);

    client
        .put_bytes(Some("b"), "k", b"multiplexed", None)
        .expect("put_bytes");
    assert_eq!(stub.get("b", "k").as_deref(), Some(b"multiplexed".as_slice()));

    let body = client.get_bytes(Some("b"), "k", 0, None).expect("get_bytes");
    assert_eq!(body, b"multiplexed");

    let err = client.get_bytes(Some("b"), "absent", 0, None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    // Dropping the client joins the worker thread.
    drop(client);
}

#[test]
fn multiplexed_concurrent_submitters() {
    let (stub, addr) = spawn_stub();
    let mut config = test_config(addr, BackendKind::Multiplexed);
    config.max_total_connections = 8;
    let client = Arc::new(S3Client::new(config).expect("client"));

    let mut handles = Vec::new();
    for i in 0..32 {
        let client = Arc::clone(&client);
        handles.push(thread::spawn(move || {
            let key = format!("obj-{i}");
            let body = format!("payload-{i}");
            client
                .put_bytes(Some("b"), &key, body.as_bytes(), None)
                .expect("concurrent put");
        }));
    }
    for handle in handles {
        handle.join().expect("submitter thread");
    }

    for i in 0..32 {
        let key = format!("obj-{i}");
        let expected = format!("payload-{i}");
        assert_eq!(
            stub.get("b", &key).as_deref(),
            Some(expected.as_bytes()),
            "missing {key}"
        );
        let body = client
            .get_bytes(Some("b"), &key, 0, None)
            .expect("read back");
        assert_eq!(body, expected.as_bytes());
    }
}

#[test]
fn connection_refused_maps_to_init() {
    // Port 1 on localhost is essentially guaranteed closed.
    let config = S3Config::new("http://127.0.0.1:1", "us-east-1", "user", "pw");
    let client = S3Client::new(config).expect("client");
    let err = client.get_bytes(Some("b"), "k", 0, None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Init);
}
