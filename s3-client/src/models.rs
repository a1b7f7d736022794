use std::fmt;

/// One object to remove in a Multi-Object Delete call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeleteObject {
    pub key: String,
    /// Specific version to remove. `None` (or empty) removes the current
    /// version.
    pub version_id: Option<String>,
}

impl DeleteObject {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version_id: None,
        }
    }

    pub fn with_version(key: impl Into<String>, version_id: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version_id: Some(version_id.into()),
        }
    }
}

/// An inclusive byte range for GET requests, rendered as an HTTP `Range`
/// header. `end: None` requests everything from `start` to the end of the
/// object.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct GetRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl fmt::Display for GetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "bytes={}-{}", self.start, end),
            None => write!(f, "bytes={}-", self.start),
        }
    }
}

/// Parameters for a ListObjectsV2 call.
#[derive(Clone, Debug, Default)]
pub struct ListObjectsRequest {
    /// Bucket to list; `None` uses the client's default bucket.
    pub bucket: Option<String>,
    /// Only keys beginning with this prefix are returned.
    pub prefix: Option<String>,
    /// Page size cap. `0` leaves the page size to the server.
    pub max_keys: u32,
    /// Continuation token from a previous truncated result.
    pub continuation_token: Option<String>,
}

/// One object entry from a ListObjectsV2 response.
///
/// Fields other than `key` and `size` are optional because S3-compatible
/// servers vary in which ones they emit.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    /// Entity tag with the surrounding double quotes stripped.
    pub etag: Option<String>,
    /// Last-modified timestamp, verbatim from the server.
    pub last_modified: Option<String>,
    pub storage_class: Option<String>,
}

/// A (possibly partial) ListObjectsV2 result page.
#[derive(Clone, Debug, Default)]
pub struct ListObjectsResult {
    pub objects: Vec<ObjectInfo>,
    /// Whether more keys remain. When true on a well-formed response,
    /// `next_continuation_token` is present.
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}
