//! Prepared requests: URL construction, header assembly, authentication
//! material, and the per-operation factory.
//!
//! A [`PreparedRequest`] owns everything its execution needs (URL,
//! headers, body source, response sink, transfer counters) and has a
//! single linear owner at every moment: the factory builds it, the backend
//! owns it while it executes, and it comes back to the caller with the
//! outcome.

use std::{
    fs::File,
    mem,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use http::{
    HeaderMap, HeaderValue, Method,
    header::{CONTENT_LENGTH, CONTENT_TYPE, RANGE},
};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use url::Url;

use crate::{
    config::S3Config,
    error::S3Error,
    models::{DeleteObject, GetRange, ListObjectsRequest},
    sign,
    stream::{MemBuf, ReadSource, WriteSink},
    xml,
};

/// How a request authenticates.
pub(crate) enum AuthScheme {
    /// AWS Signature V4, applied when the request executes.
    SigV4 {
        region: String,
        access_key: String,
        secret_key: String,
        session_token: Option<String>,
    },
    /// HTTP Basic auth with `access_key:secret_key`.
    Basic {
        access_key: String,
        secret_key: String,
    },
}

/// An assembled, not-yet-executed request.
pub(crate) struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub auth: AuthScheme,
    /// Hex SHA-256 of the body, or [`sign::UNSIGNED_PAYLOAD`] for streamed
    /// uploads. Sent as `x-amz-content-sha256` when signing.
    pub payload_hash: String,
    pub read: ReadSource,
    pub write: WriteSink,
    /// Cap on accepted response bytes. `None` is unbounded.
    pub write_limit: Option<u64>,
    /// Request body bytes accepted so far. Shared with the body stream.
    pub read_bytes: Arc<AtomicU64>,
    /// Response body bytes accepted so far.
    pub write_bytes: u64,
}

impl std::fmt::Debug for PreparedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl PreparedRequest {
    fn new(config: &S3Config, method: Method, url: Url) -> Result<Self, S3Error> {
        Ok(Self {
            method,
            url,
            headers: HeaderMap::new(),
            auth: auth_from_config(config)?,
            payload_hash: sign::EMPTY_PAYLOAD_SHA256.to_string(),
            read: ReadSource::None,
            write: WriteSink::Discard,
            write_limit: None,
            read_bytes: Arc::new(AtomicU64::new(0)),
            write_bytes: 0,
        })
    }

    pub(crate) fn read_bytes_total(&self) -> u64 {
        self.read_bytes.load(Ordering::Relaxed)
    }

    /// Take the captured response body, if this request had a memory sink.
    pub(crate) fn take_response(&mut self) -> Vec<u8> {
        match &mut self.write {
            WriteSink::Mem { buf } => mem::take(buf).into_vec(),
            _ => Vec::new(),
        }
    }

    /// Borrow the captured response body, if any.
    pub(crate) fn response(&self) -> &[u8] {
        match &self.write {
            WriteSink::Mem { buf } => buf.as_slice(),
            _ => &[],
        }
    }
}

fn auth_from_config(config: &S3Config) -> Result<AuthScheme, S3Error> {
    if config.access_key.is_empty() || config.secret_key.is_empty() {
        return Err(S3Error::invalid_arg(
            "access_key and secret_key must be set",
        ));
    }
    if config.require_sigv4 {
        if config.region.is_empty() {
            return Err(S3Error::invalid_arg("region must be set for SigV4"));
        }
        Ok(AuthScheme::SigV4 {
            region: config.region.clone(),
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
            session_token: config.session_token.clone(),
        })
    } else {
        Ok(AuthScheme::Basic {
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
        })
    }
}

// --- URL building --- //

/// RFC 3986 unreserved characters stay literal; every other octet is
/// percent-encoded (uppercase hex).
const STRICT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Same set, but `/` stays literal for encoding whole paths.
const STRICT_PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

/// Percent-encode a query component (or, with `encode_slash == false`, a
/// path).
pub(crate) fn uri_encode(s: &str, encode_slash: bool) -> String {
    if encode_slash {
        utf8_percent_encode(s, STRICT_ENCODE_SET).to_string()
    } else {
        utf8_percent_encode(s, STRICT_PATH_ENCODE_SET).to_string()
    }
}

/// `{endpoint}/{bucket}[/{key}]`, path-style, with the endpoint's trailing
/// slash stripped. The key is spliced in verbatim; URL parsing normalizes
/// what it must, but no percent-encoding is applied here.
fn object_url(
    config: &S3Config,
    bucket: Option<&str>,
    key: Option<&str>,
) -> Result<Url, S3Error> {
    let bucket = config.bucket_or_default(bucket)?;

    let mut raw = String::with_capacity(
        config.endpoint.len() + 1 + bucket.len() + key.map_or(0, |k| 1 + k.len()),
    );
    raw.push_str(config.endpoint.trim_end_matches('/'));
    raw.push('/');
    raw.push_str(bucket);
    if let Some(key) = key {
        raw.push('/');
        raw.push_str(key);
    }

    Url::parse(&raw)
        .map_err(|e| S3Error::invalid_arg(format!("invalid request URL: {e}")))
}

fn list_url(
    config: &S3Config,
    request: &ListObjectsRequest,
) -> Result<Url, S3Error> {
    let mut url = object_url(config, request.bucket.as_deref(), None)?;

    let mut query = String::from("list-type=2");
    if let Some(prefix) = request.prefix.as_deref() {
        if !prefix.is_empty() {
            query.push_str("&prefix=");
            query.push_str(&uri_encode(prefix, true));
        }
    }
    if request.max_keys > 0 {
        query.push_str(&format!("&max-keys={}", request.max_keys));
    }
    if let Some(token) = request.continuation_token.as_deref() {
        if !token.is_empty() {
            query.push_str("&continuation-token=");
            query.push_str(&uri_encode(token, true));
        }
    }

    url.set_query(Some(&query));
    Ok(url)
}

// --- per-operation factories --- //

pub(crate) fn new_put_file(
    config: &S3Config,
    bucket: Option<&str>,
    key: &str,
    file: &File,
    offset: u64,
    size: u64,
    content_type: Option<&str>,
) -> Result<PreparedRequest, S3Error> {
    let url = object_url(config, bucket, Some(key))?;
    let mut request = PreparedRequest::new(config, Method::PUT, url)?;

    let file = file
        .try_clone()
        .map_err(|e| S3Error::io(format!("failed to duplicate file handle: {e}")))?;
    request.read = ReadSource::File {
        file: Arc::new(file),
        offset,
        len: size,
    };
    // Streamed uploads carry an explicit length so the transfer is not
    // chunked, which some S3-compatible servers reject for PUT.
    request.headers.insert(CONTENT_LENGTH, HeaderValue::from(size));
    request.payload_hash = sign::UNSIGNED_PAYLOAD.to_string();

    apply_content_type(&mut request, content_type)?;
    Ok(request)
}

pub(crate) fn new_put_bytes(
    config: &S3Config,
    bucket: Option<&str>,
    key: &str,
    body: Bytes,
    content_type: Option<&str>,
) -> Result<PreparedRequest, S3Error> {
    let url = object_url(config, bucket, Some(key))?;
    let mut request = PreparedRequest::new(config, Method::PUT, url)?;

    request.payload_hash = sign::sha256_hex(&body);
    request.read = ReadSource::Mem { buf: body };

    apply_content_type(&mut request, content_type)?;
    Ok(request)
}

pub(crate) fn new_get_file(
    config: &S3Config,
    bucket: Option<&str>,
    key: &str,
    file: &File,
    offset: u64,
    max_size: u64,
    range: Option<GetRange>,
) -> Result<PreparedRequest, S3Error> {
    let url = object_url(config, bucket, Some(key))?;
    let mut request = PreparedRequest::new(config, Method::GET, url)?;

    let file = file
        .try_clone()
        .map_err(|e| S3Error::io(format!("failed to duplicate file handle: {e}")))?;
    request.write = WriteSink::File {
        file: Arc::new(file),
        offset,
    };
    request.write_limit = (max_size > 0).then_some(max_size);

    apply_range(&mut request, range)?;
    Ok(request)
}

pub(crate) fn new_get_bytes(
    config: &S3Config,
    bucket: Option<&str>,
    key: &str,
    max_size: u64,
    range: Option<GetRange>,
) -> Result<PreparedRequest, S3Error> {
    let url = object_url(config, bucket, Some(key))?;
    let mut request = PreparedRequest::new(config, Method::GET, url)?;

    request.write = WriteSink::Mem { buf: MemBuf::default() };
    request.write_limit = (max_size > 0).then_some(max_size);

    apply_range(&mut request, range)?;
    Ok(request)
}

pub(crate) fn new_create_bucket(
    config: &S3Config,
    bucket: &str,
) -> Result<PreparedRequest, S3Error> {
    // PUT with an empty body; the executor sends a zero-length sized body
    // so the request carries `Content-Length: 0` rather than a chunked
    // encoding.
    let url = object_url(config, Some(bucket), None)?;
    PreparedRequest::new(config, Method::PUT, url)
}

pub(crate) fn new_list_objects(
    config: &S3Config,
    list: &ListObjectsRequest,
) -> Result<PreparedRequest, S3Error> {
    let url = list_url(config, list)?;
    let mut request = PreparedRequest::new(config, Method::GET, url)?;
    request.write = WriteSink::Mem { buf: MemBuf::default() };
    Ok(request)
}

pub(crate) fn new_delete_objects(
    config: &S3Config,
    bucket: Option<&str>,
    objects: &[DeleteObject],
    quiet: bool,
) -> Result<PreparedRequest, S3Error> {
    let body = xml::build_delete_body(objects, quiet)?;

    let mut url = object_url(config, bucket, None)?;
    url.set_query(Some("delete"));

    let mut request = PreparedRequest::new(config, Method::POST, url)?;
    request.headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/xml"),
    );
    request.headers.insert(
        http::header::HeaderName::from_static("content-md5"),
        header_value(&content_md5(body.as_bytes()))?,
    );

    request.payload_hash = sign::sha256_hex(body.as_bytes());
    request.read = ReadSource::Mem { buf: Bytes::from(body) };
    request.write = WriteSink::Mem { buf: MemBuf::default() };
    Ok(request)
}

// --- header helpers --- //

/// `base64(MD5(body))` for the `Content-MD5` header.
pub(crate) fn content_md5(body: &[u8]) -> String {
    STANDARD.encode(md5::compute(body).0)
}

fn apply_content_type(
    request: &mut PreparedRequest,
    content_type: Option<&str>,
) -> Result<(), S3Error> {
    if let Some(content_type) = content_type {
        request
            .headers
            .insert(CONTENT_TYPE, header_value(content_type)?);
    }
    Ok(())
}

fn apply_range(
    request: &mut PreparedRequest,
    range: Option<GetRange>,
) -> Result<(), S3Error> {
    if let Some(range) = range {
        request
            .headers
            .insert(RANGE, header_value(&range.to_string())?);
    }
    Ok(())
}

fn header_value(s: &str) -> Result<HeaderValue, S3Error> {
    HeaderValue::from_str(s).map_err(|_| {
        S3Error::invalid_arg(format!("value is not a valid header: {s:?}"))
    })
}
