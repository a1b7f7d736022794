//! Execution of prepared requests over a shared HTTP client.
//!
//! Each backend owns one [`reqwest::Client`] built from the configuration
//! (timeouts, TLS, CA roots, proxy, connection pooling) and drives
//! [`execute`] futures over it. Building the client is the per-backend
//! equivalent of a process-wide transport init; rustls needs no global
//! setup.

use std::{fs, mem, sync::atomic::Ordering};

use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::{
    config::S3Config,
    error::S3Error,
    request::{AuthScheme, PreparedRequest},
    sign,
    stream::{self, ReadSource},
};

/// Build the shared HTTP client for a backend.
pub(crate) fn build_client(config: &S3Config) -> Result<reqwest::Client, S3Error> {
    let mut builder = reqwest::Client::builder()
        .user_agent(concat!("s3-client/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .pool_max_idle_per_host(config.max_connections_per_host);

    // Hostname-only verification skip is not expressible on the rustls
    // stack, so the hostname flag implies the certificate flag.
    if config.danger_accept_invalid_certs || config.danger_accept_invalid_hostnames {
        builder = builder.danger_accept_invalid_certs(true);
    }

    if let Some(ca_file) = &config.ca_file {
        for cert in load_pem_bundle(ca_file)? {
            builder = builder.add_root_certificate(cert);
        }
    }
    if let Some(ca_path) = &config.ca_path {
        let entries = fs::read_dir(ca_path).map_err(|e| {
            S3Error::init(format!("cannot read ca_path {}: {e}", ca_path.display()))
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| {
                S3Error::init(format!("cannot read ca_path entry: {e}"))
            })?;
            let path = entry.path();
            let is_pem = path
                .extension()
                .is_some_and(|ext| ext == "pem" || ext == "crt");
            if !is_pem {
                continue;
            }
            for cert in load_pem_bundle(&path)? {
                builder = builder.add_root_certificate(cert);
            }
        }
    }

    if let Some(proxy) = &config.proxy {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| S3Error::init(format!("invalid proxy {proxy}: {e}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| S3Error::init(format!("failed to build HTTP client: {e}")))
}

fn load_pem_bundle(
    path: &std::path::Path,
) -> Result<Vec<reqwest::Certificate>, S3Error> {
    let pem = fs::read(path).map_err(|e| {
        S3Error::init(format!("cannot read CA bundle {}: {e}", path.display()))
    })?;
    reqwest::Certificate::from_pem_bundle(&pem).map_err(|e| {
        S3Error::init(format!("invalid CA bundle {}: {e}", path.display()))
    })
}

/// Execute one prepared request to completion.
///
/// Signs (SigV4 mode), streams the request body from the read source,
/// drains the response body into the write sink (for error statuses too,
/// mirroring what the transport delivers), and returns the final HTTP
/// status. The caller interrogates the status; transport and I/O failures
/// come back as `Err`.
pub(crate) async fn execute(
    client: &reqwest::Client,
    request: &mut PreparedRequest,
) -> Result<u16, S3Error> {
    sign::sign_request(request, OffsetDateTime::now_utc())?;

    let read = mem::replace(&mut request.read, ReadSource::None);
    // For sized bodies the transfer count is only known good once the
    // request has gone out; streamed bodies count per chunk instead.
    let mut sized_len = None;

    let mut builder = client
        .request(request.method.clone(), request.url.clone())
        .headers(request.headers.clone());

    match read {
        ReadSource::None => {
            sized_len = Some(0);
            // An explicit empty body makes PUTs carry `Content-Length: 0`.
            if request.method != http::Method::GET {
                builder = builder.body(Vec::<u8>::new());
            }
        }
        ReadSource::Mem { buf } => {
            sized_len = Some(buf.len() as u64);
            builder = builder.body(buf);
        }
        ReadSource::File { file, offset, len } => {
            let chunks = stream::file_chunks(
                file,
                offset,
                len,
                request.read_bytes.clone(),
            );
            builder = builder.body(reqwest::Body::wrap_stream(chunks));
        }
    }

    if let AuthScheme::Basic {
        access_key,
        secret_key,
    } = &request.auth
    {
        builder = builder.basic_auth(access_key, Some(secret_key));
    }

    debug!(method = %request.method, url = %request.url, "sending request");

    let response = builder.send().await.map_err(|e| {
        let err = S3Error::from_transport(&e);
        warn!(url = %request.url, "request failed while sending: {err}");
        err
    })?;

    if let Some(len) = sized_len {
        request.read_bytes.store(len, Ordering::Relaxed);
    }

    let status = response.status().as_u16();
    drain_response(response, request).await?;

    debug!(
        %status,
        read_bytes = request.read_bytes_total(),
        write_bytes = request.write_bytes,
        "request complete"
    );
    Ok(status)
}

/// Feed the response body into the request's write sink, chunk by chunk,
/// honoring the write limit.
async fn drain_response(
    mut response: reqwest::Response,
    request: &mut PreparedRequest,
) -> Result<(), S3Error> {
    loop {
        let chunk = match response.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => return Ok(()),
            Err(e) => {
                let err = S3Error::from_transport(&e);
                warn!(
                    url = %request.url,
                    "request failed while receiving body: {err}"
                );
                return Err(err);
            }
        };

        let remaining = match request.write_limit {
            Some(limit) => limit.saturating_sub(request.write_bytes),
            None => u64::MAX,
        };
        let take = (chunk.len() as u64).min(remaining) as usize;

        if take > 0 {
            request
                .write
                .accept(chunk.slice(..take), request.write_bytes)
                .await
                .map_err(|e| {
                    S3Error::io(format!("failed to store response body: {e}"))
                })?;
            request.write_bytes += take as u64;
        }

        if take < chunk.len() {
            return Err(S3Error::io(
                "response body exceeds the configured size limit",
            ));
        }
    }
}
