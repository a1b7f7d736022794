//! Request execution backends.
//!
//! Both backends take ownership of a prepared request for the duration of
//! its execution and hand it back together with the outcome, so callers
//! can read transfer counters and captured response bodies afterwards.

use crate::{
    config::{BackendKind, S3Config},
    error::S3Error,
    request::PreparedRequest,
};

pub(crate) mod multi;
pub(crate) mod sync;

/// A finished request: the request itself (with counters and any captured
/// response body) plus the transport outcome. `Ok` carries the final HTTP
/// status, which the facade still has to interrogate.
pub(crate) struct Completion {
    pub request: PreparedRequest,
    pub result: Result<u16, S3Error>,
}

/// The two execution strategies behind one dispatch surface.
pub(crate) enum Backend {
    Sync(sync::SyncBackend),
    Multiplexed(multi::MultiBackend),
}

impl Backend {
    pub(crate) fn new(config: &S3Config) -> Result<Self, S3Error> {
        match config.backend {
            BackendKind::Sync => sync::SyncBackend::new(config).map(Self::Sync),
            BackendKind::Multiplexed =>
                multi::MultiBackend::new(config).map(Self::Multiplexed),
        }
    }

    /// Execute one prepared request to completion, blocking the caller.
    pub(crate) fn run(&self, request: PreparedRequest) -> Completion {
        match self {
            Self::Sync(backend) => backend.run(request),
            Self::Multiplexed(backend) => backend.run(request),
        }
    }
}
