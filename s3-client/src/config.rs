use std::{env, path::PathBuf, time::Duration};

use url::Url;

use crate::error::S3Error;

/// Which execution backend a client uses.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum BackendKind {
    /// One request at a time, executed on the calling thread.
    #[default]
    Sync,
    /// A dedicated worker thread drives many concurrent requests; callers
    /// block only until their own request completes.
    Multiplexed,
}

/// Client configuration.
///
/// [`S3Config::new`] fills every optional field with its default; callers
/// then override individual fields before passing the config to
/// [`S3Client::new`](crate::S3Client::new), which validates it and takes
/// ownership.
#[derive(Clone, Debug)]
pub struct S3Config {
    /// Base HTTP(S) address of the service, e.g. `http://127.0.0.1:9000`.
    /// A trailing slash is tolerated and stripped when building URLs.
    pub endpoint: String,
    /// Signing region, e.g. `us-east-1`. Required even for endpoints that
    /// ignore it.
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    /// STS session token, sent as `x-amz-security-token` when set.
    pub session_token: Option<String>,
    /// Bucket used by operations whose `bucket` argument is `None`.
    pub default_bucket: Option<String>,
    /// Sign requests with AWS Signature V4 (default). When false, requests
    /// carry HTTP Basic auth with `access_key:secret_key` instead, which
    /// some S3-compatible gateways accept.
    pub require_sigv4: bool,
    /// Connection establishment deadline. Default 5 s.
    pub connect_timeout: Duration,
    /// Whole-request deadline, covering the response body. Default 30 s.
    pub request_timeout: Duration,
    /// Upper bound on concurrently executing requests in the multiplexed
    /// backend. Default 64.
    pub max_total_connections: usize,
    /// Idle connections retained per host in the connection pool.
    /// Default 16.
    pub max_connections_per_host: usize,
    /// How long the multiplexed worker parks between completion harvests
    /// while requests are in flight. Default 50 ms.
    pub multi_idle_timeout: Duration,
    /// PEM bundle with additional trusted root certificates.
    pub ca_file: Option<PathBuf>,
    /// Directory of PEM files with additional trusted root certificates.
    pub ca_path: Option<PathBuf>,
    /// Proxy URL applied to all requests.
    pub proxy: Option<String>,
    /// Skip TLS certificate verification. Testing only.
    pub danger_accept_invalid_certs: bool,
    /// Skip TLS hostname verification. On the rustls stack this cannot be
    /// done separately from certificate verification, so setting it implies
    /// `danger_accept_invalid_certs`. Testing only.
    pub danger_accept_invalid_hostnames: bool,
    /// Address objects as `{endpoint}/{bucket}/{key}` rather than
    /// virtual-hosted style. Always on; the field is accepted for
    /// compatibility with configs that spell it out.
    pub force_path_style: bool,
    pub backend: BackendKind,
}

// --- defaults --- //

pub(crate) const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);
pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(30_000);
pub(crate) const DEFAULT_MAX_TOTAL_CONNECTIONS: usize = 64;
pub(crate) const DEFAULT_MAX_CONNECTIONS_PER_HOST: usize = 16;
pub(crate) const DEFAULT_MULTI_IDLE_TIMEOUT: Duration = Duration::from_millis(50);

impl S3Config {
    /// A config with the four required fields set and defaults everywhere
    /// else.
    pub fn new(
        endpoint: impl Into<String>,
        region: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            region: region.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            session_token: None,
            default_bucket: None,
            require_sigv4: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_total_connections: DEFAULT_MAX_TOTAL_CONNECTIONS,
            max_connections_per_host: DEFAULT_MAX_CONNECTIONS_PER_HOST,
            multi_idle_timeout: DEFAULT_MULTI_IDLE_TIMEOUT,
            ca_file: None,
            ca_path: None,
            proxy: None,
            danger_accept_invalid_certs: false,
            danger_accept_invalid_hostnames: false,
            force_path_style: true,
            backend: BackendKind::default(),
        }
    }

    /// Build a config from environment variables: `S3_ENDPOINT`,
    /// `S3_REGION`, `S3_ACCESS_KEY`, and `S3_SECRET_KEY` are required;
    /// `S3_SESSION_TOKEN` and `S3_BUCKET` are optional.
    pub fn from_env() -> Result<Self, S3Error> {
        fn required(name: &str) -> Result<String, S3Error> {
            env::var(name).map_err(|_| {
                S3Error::invalid_arg(format!("{name} must be set"))
            })
        }

        let mut config = Self::new(
            required("S3_ENDPOINT")?,
            required("S3_REGION")?,
            required("S3_ACCESS_KEY")?,
            required("S3_SECRET_KEY")?,
        );
        config.session_token = env::var("S3_SESSION_TOKEN").ok();
        config.default_bucket = env::var("S3_BUCKET").ok();
        Ok(config)
    }

    /// Check the required fields before a client is built.
    pub(crate) fn validate(&self) -> Result<(), S3Error> {
        if self.endpoint.is_empty()
            || self.region.is_empty()
            || self.access_key.is_empty()
            || self.secret_key.is_empty()
        {
            return Err(S3Error::invalid_arg(
                "endpoint, region, access_key and secret_key must be set",
            ));
        }

        let url = Url::parse(&self.endpoint).map_err(|e| {
            S3Error::invalid_arg(format!(
                "endpoint is not a valid URL: {e}"
            ))
        })?;
        match url.scheme() {
            "http" | "https" => (),
            other => {
                return Err(S3Error::invalid_arg(format!(
                    "endpoint scheme must be http or https, got {other}"
                )));
            }
        }

        Ok(())
    }

    /// Resolve an operation's bucket argument against the default bucket.
    pub(crate) fn bucket_or_default<'a>(
        &'a self,
        bucket: Option<&'a str>,
    ) -> Result<&'a str, S3Error> {
        bucket
            .or(self.default_bucket.as_deref())
            .filter(|b| !b.is_empty())
            .ok_or_else(|| S3Error::invalid_arg("bucket must be set"))
    }
}
