//! A blocking client for S3-compatible object storage.
//!
//! The client issues PUT/GET object requests, CreateBucket, ListObjectsV2,
//! and Multi-Object Delete against a configured endpoint, signing each
//! request with AWS Signature V4 (or HTTP Basic auth for endpoints that
//! accept it). Request and response bodies stream between the network and
//! either in-memory buffers or [`std::fs::File`]s at explicit offsets;
//! positional I/O is used throughout, so the caller's file cursor is never
//! touched.
//!
//! ## Backends
//!
//! Two execution backends are available via [`BackendKind`]:
//!
//! - [`BackendKind::Sync`] executes one request at a time on the calling
//!   thread. Intended for one caller per client.
//! - [`BackendKind::Multiplexed`] owns a dedicated worker thread which
//!   drives many requests concurrently. Any number of threads may submit to
//!   the same client; each submitter blocks only until its own request
//!   completes.
//!
//! Every public operation blocks the calling thread. Cooperative hosts
//! (fiber or coroutine schedulers) should run calls on a worker thread,
//! e.g. via `spawn_blocking`, and suspend on their own primitives;
//! [`S3Client`] is `Send + Sync` so a single client can be shared across
//! such workers.
//!
//! ## Example
//!
//! ```no_run
//! use s3_client::{S3Client, S3Config};
//!
//! let mut config = S3Config::new(
//!     "http://127.0.0.1:9000",
//!     "us-east-1",
//!     "minioadmin",
//!     "minioadmin",
//! );
//! config.default_bucket = Some("backups".to_string());
//!
//! let client = S3Client::new(config)?;
//! client.put_bytes(None, "hello.txt", b"hello world", Some("text/plain"))?;
//! let body = client.get_bytes(None, "hello.txt", 0, None)?;
//! assert_eq!(body, b"hello world");
//! # Ok::<(), s3_client::S3Error>(())
//! ```
//!
//! ## Limitations
//!
//! - One attempt per call: no retries, no caller-level cancellation.
//!   Deadlines come from the configured connect/request timeouts.
//! - Object keys are not URL-encoded when building request paths beyond the
//!   minimal normalization URL parsing performs; keys containing characters
//!   that are invalid in a URL path may misbehave.
//! - The ListObjectsV2 response parser does not decode XML entities in text
//!   content and ignores namespaces.
//! - Multipart upload and object versioning (beyond passing `version_id`
//!   through Multi-Object Delete) are not supported.

/// Client facade and operation entry points.
pub mod client;
/// Client configuration.
pub mod config;
/// Error kinds and the populated error record.
pub mod error;
/// Request/response data types.
pub mod models;

/// Request execution backends.
pub(crate) mod backend;
/// Prepared requests, URL building, and the per-operation factory.
pub(crate) mod request;
/// AWS Signature V4.
pub(crate) mod sign;
/// Streaming adapters between bodies and files/buffers.
pub(crate) mod stream;
/// Transport execution on top of the HTTP client.
pub(crate) mod transport;
/// XML body building and response parsing.
pub(crate) mod xml;

pub use client::S3Client;
pub use config::{BackendKind, S3Config};
pub use error::{ErrorKind, S3Error};
pub use models::{
    DeleteObject, GetRange, ListObjectsRequest, ListObjectsResult, ObjectInfo,
};
