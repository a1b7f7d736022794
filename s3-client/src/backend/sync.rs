//! The synchronous backend: one request at a time on the calling thread.

use tokio::runtime;

use crate::{
    backend::Completion,
    config::S3Config,
    error::S3Error,
    request::PreparedRequest,
    transport,
};

/// Executes each request with a `block_on` on the calling thread. Keeps no
/// state between calls beyond the HTTP client's connection pool.
///
/// Intended for one caller per client; concurrent callers serialize on the
/// runtime rather than erroring, but get no parallelism.
pub(crate) struct SyncBackend {
    runtime: runtime::Runtime,
    client: reqwest::Client,
}

impl SyncBackend {
    pub(crate) fn new(config: &S3Config) -> Result<Self, S3Error> {
        let runtime = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                S3Error::init(format!("failed to build sync runtime: {e}"))
            })?;
        let client = transport::build_client(config)?;
        Ok(Self { runtime, client })
    }

    pub(crate) fn run(&self, mut request: PreparedRequest) -> Completion {
        let result = self
            .runtime
            .block_on(transport::execute(&self.client, &mut request));
        Completion { request, result }
    }
}
