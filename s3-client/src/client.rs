//! The client facade: configuration validation, backend selection, the
//! operation entry points, and last-error recording.

use std::{
    fs::File,
    sync::{Mutex, PoisonError},
};

use bytes::Bytes;
use tracing::debug;

use crate::{
    backend::{Backend, Completion},
    config::S3Config,
    error::S3Error,
    models::{DeleteObject, GetRange, ListObjectsRequest, ListObjectsResult},
    request,
    xml,
};

/// Upper bound the Multi-Object Delete API accepts per call.
pub const MAX_DELETE_OBJECTS: usize = 1000;

/// A blocking client for one S3-compatible endpoint.
///
/// The client owns its configuration and backend; dropping it tears the
/// backend down (joining the worker thread of a multiplexed backend).
/// All operations take `&self`, and the client is `Send + Sync`: with the
/// multiplexed backend, any number of threads may call concurrently.
///
/// Every operation (success included) stores its outcome as the client's
/// last error, readable via [`S3Client::last_error`]. Under
/// concurrent submitters that slot is only meaningful to the thread that
/// just finished its own call.
pub struct S3Client {
    config: S3Config,
    backend: Backend,
    last_error: Mutex<S3Error>,
}

impl std::fmt::Debug for S3Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Client").finish_non_exhaustive()
    }
}

impl S3Client {
    /// Validate the configuration and construct the chosen backend.
    ///
    /// Requires `endpoint`, `region`, `access_key`, and `secret_key` to be
    /// non-empty and the endpoint to be a valid http(s) URL. A failure
    /// here leaves nothing behind.
    pub fn new(config: S3Config) -> Result<Self, S3Error> {
        config.validate()?;
        let backend = Backend::new(&config)?;
        debug!(endpoint = %config.endpoint, backend = ?config.backend, "client created");
        Ok(Self {
            config,
            backend,
            last_error: Mutex::new(S3Error::ok()),
        })
    }

    /// The outcome of the most recent operation on this client;
    /// kind [`Ok`](crate::ErrorKind::Ok) when it succeeded.
    pub fn last_error(&self) -> S3Error {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // --- operations --- //

    /// Upload `size` bytes read from `file` at positions
    /// `[offset, offset + size)`. The file's cursor is not used or moved.
    /// `bucket = None` uses the configured default bucket.
    pub fn put_file(
        &self,
        bucket: Option<&str>,
        key: &str,
        file: &File,
        offset: u64,
        size: u64,
        content_type: Option<&str>,
    ) -> Result<(), S3Error> {
        self.record(self.put_file_inner(bucket, key, file, offset, size, content_type))
    }

    fn put_file_inner(
        &self,
        bucket: Option<&str>,
        key: &str,
        file: &File,
        offset: u64,
        size: u64,
        content_type: Option<&str>,
    ) -> Result<(), S3Error> {
        check_key(key)?;
        if size == 0 {
            return Err(S3Error::invalid_arg("size must be non-zero for PUT"));
        }
        let prepared = request::new_put_file(
            &self.config,
            bucket,
            key,
            file,
            offset,
            size,
            content_type,
        )?;
        finish(self.backend.run(prepared)).map(drop)
    }

    /// Upload an in-memory body as one object.
    pub fn put_bytes(
        &self,
        bucket: Option<&str>,
        key: &str,
        body: &[u8],
        content_type: Option<&str>,
    ) -> Result<(), S3Error> {
        self.record(self.put_bytes_inner(bucket, key, body, content_type))
    }

    fn put_bytes_inner(
        &self,
        bucket: Option<&str>,
        key: &str,
        body: &[u8],
        content_type: Option<&str>,
    ) -> Result<(), S3Error> {
        check_key(key)?;
        if body.is_empty() {
            return Err(S3Error::invalid_arg("body must be non-empty for PUT"));
        }
        let prepared = request::new_put_bytes(
            &self.config,
            bucket,
            key,
            Bytes::copy_from_slice(body),
            content_type,
        )?;
        finish(self.backend.run(prepared)).map(drop)
    }

    /// Download an object into `file` with positional writes starting at
    /// `offset`. Returns the number of bytes written.
    ///
    /// `max_size` caps the accepted body (`0` means unbounded); a body
    /// exceeding the cap fails the call with [`ErrorKind::Io`] after
    /// exactly `max_size` bytes have been written. `range` requests a
    /// server-side byte range.
    ///
    /// [`ErrorKind::Io`]: crate::ErrorKind::Io
    pub fn get_file(
        &self,
        bucket: Option<&str>,
        key: &str,
        file: &File,
        offset: u64,
        max_size: u64,
        range: Option<GetRange>,
    ) -> Result<u64, S3Error> {
        self.record(self.get_file_inner(bucket, key, file, offset, max_size, range))
    }

    fn get_file_inner(
        &self,
        bucket: Option<&str>,
        key: &str,
        file: &File,
        offset: u64,
        max_size: u64,
        range: Option<GetRange>,
    ) -> Result<u64, S3Error> {
        check_key(key)?;
        let prepared = request::new_get_file(
            &self.config,
            bucket,
            key,
            file,
            offset,
            max_size,
            range,
        )?;
        let completion = finish(self.backend.run(prepared))?;
        Ok(completion.request.write_bytes)
    }

    /// Download an object into memory. Semantics match [`S3Client::get_file`].
    pub fn get_bytes(
        &self,
        bucket: Option<&str>,
        key: &str,
        max_size: u64,
        range: Option<GetRange>,
    ) -> Result<Vec<u8>, S3Error> {
        self.record(self.get_bytes_inner(bucket, key, max_size, range))
    }

    fn get_bytes_inner(
        &self,
        bucket: Option<&str>,
        key: &str,
        max_size: u64,
        range: Option<GetRange>,
    ) -> Result<Vec<u8>, S3Error> {
        check_key(key)?;
        let prepared =
            request::new_get_bytes(&self.config, bucket, key, max_size, range)?;
        let mut completion = finish(self.backend.run(prepared))?;
        Ok(completion.request.take_response())
    }

    /// Create a bucket. The bucket name is required here; the default
    /// bucket does not apply.
    pub fn create_bucket(&self, bucket: &str) -> Result<(), S3Error> {
        self.record(self.create_bucket_inner(bucket))
    }

    fn create_bucket_inner(&self, bucket: &str) -> Result<(), S3Error> {
        if bucket.is_empty() {
            return Err(S3Error::invalid_arg("bucket name is empty"));
        }
        let prepared = request::new_create_bucket(&self.config, bucket)?;
        finish(self.backend.run(prepared)).map(drop)
    }

    /// List objects with ListObjectsV2. Drive pagination by feeding
    /// [`ListObjectsResult::next_continuation_token`] back into the next
    /// request while [`ListObjectsResult::is_truncated`] is set.
    pub fn list_objects(
        &self,
        list: &ListObjectsRequest,
    ) -> Result<ListObjectsResult, S3Error> {
        self.record(self.list_objects_inner(list))
    }

    fn list_objects_inner(
        &self,
        list: &ListObjectsRequest,
    ) -> Result<ListObjectsResult, S3Error> {
        let prepared = request::new_list_objects(&self.config, list)?;
        let mut completion = finish(self.backend.run(prepared))?;
        let body = completion.request.take_response();
        Ok(xml::parse_list_response(&String::from_utf8_lossy(&body)))
    }

    /// Delete up to [`MAX_DELETE_OBJECTS`] objects in one call. The
    /// response body is captured for diagnostics but per-key outcomes are
    /// not interpreted; with `quiet` the server omits per-object success
    /// entries.
    pub fn delete_objects(
        &self,
        bucket: Option<&str>,
        objects: &[DeleteObject],
        quiet: bool,
    ) -> Result<(), S3Error> {
        self.record(self.delete_objects_inner(bucket, objects, quiet))
    }

    fn delete_objects_inner(
        &self,
        bucket: Option<&str>,
        objects: &[DeleteObject],
        quiet: bool,
    ) -> Result<(), S3Error> {
        if objects.is_empty() {
            return Err(S3Error::invalid_arg("delete_objects: no objects given"));
        }
        if objects.len() > MAX_DELETE_OBJECTS {
            return Err(S3Error::invalid_arg(format!(
                "delete_objects accepts at most {MAX_DELETE_OBJECTS} objects, \
                 got {}",
                objects.len()
            )));
        }
        let prepared =
            request::new_delete_objects(&self.config, bucket, objects, quiet)?;
        let completion = self.backend.run(prepared);
        if !matches!(completion.result, Ok(200..=299)) {
            let body = completion.request.response();
            if !body.is_empty() {
                debug!(
                    "delete_objects response body: {}",
                    String::from_utf8_lossy(body)
                );
            }
        }
        finish(completion).map(drop)
    }

    // --- helpers --- //

    /// Store the operation's outcome as the client's last error and pass
    /// the result through.
    fn record<T>(&self, result: Result<T, S3Error>) -> Result<T, S3Error> {
        let mut slot = self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = match &result {
            Ok(_) => S3Error::ok(),
            Err(err) => err.clone(),
        };
        drop(slot);
        result
    }
}

/// Turn a completion into the operation outcome: transport errors pass
/// through, non-2xx statuses map onto the error taxonomy.
fn finish(completion: Completion) -> Result<Completion, S3Error> {
    let status = match &completion.result {
        Ok(status) => *status,
        Err(err) => return Err(err.clone()),
    };
    match S3Error::check_http_status(status) {
        None => Ok(completion),
        Some(err) => Err(err),
    }
}

fn check_key(key: &str) -> Result<(), S3Error> {
    if key.is_empty() {
        return Err(S3Error::invalid_arg("object key is empty"));
    }
    Ok(())
}
