//! AWS Signature V4 request signing.
//!
//! Requests are signed with the `s3` service name and the configured
//! region: the canonical request is hashed into a string-to-sign, which is
//! then MACed with a key derived from the secret key and the credential
//! scope `{date}/{region}/s3/aws4_request`.
//!
//! In-memory bodies sign their real SHA-256; streamed file uploads sign
//! `UNSIGNED-PAYLOAD`, which S3-compatible servers accept over TLS (and
//! which avoids reading the file twice).

use hmac::{Hmac, Mac};
use http::{
    HeaderMap, HeaderName, HeaderValue,
    header::{AUTHORIZATION, HOST},
};
use sha2::{Digest, Sha256};
use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};
use url::Url;

use crate::{
    error::{ErrorKind, S3Error},
    request::{AuthScheme, PreparedRequest, uri_encode},
};

pub(crate) const X_AMZ_CONTENT_SHA256: HeaderName =
    HeaderName::from_static("x-amz-content-sha256");
pub(crate) const X_AMZ_DATE: HeaderName = HeaderName::from_static("x-amz-date");
pub(crate) const X_AMZ_SECURITY_TOKEN: HeaderName =
    HeaderName::from_static("x-amz-security-token");

/// Payload hash placeholder for streamed bodies.
pub(crate) const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// `hex(sha256(""))`, the payload hash of body-less requests.
pub(crate) const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

const LONG_DATETIME: &[FormatItem<'static>] =
    format_description!("[year][month][day]T[hour][minute][second]Z");
const SHORT_DATE: &[FormatItem<'static>] =
    format_description!("[year][month][day]");

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Sign a prepared request in place at time `now`.
///
/// Inserts `host`, `x-amz-content-sha256`, `x-amz-date` (plus
/// `x-amz-security-token` when a session token is configured) and the
/// computed `authorization` header. All headers present on the request at
/// this point are signed. No-op for requests using Basic auth.
pub(crate) fn sign_request(
    request: &mut PreparedRequest,
    now: OffsetDateTime,
) -> Result<(), S3Error> {
    let AuthScheme::SigV4 {
        region,
        access_key,
        secret_key,
        session_token,
    } = &request.auth
    else {
        return Ok(());
    };

    if region.is_empty() {
        return Err(S3Error::invalid_arg("region must be set for SigV4"));
    }
    if access_key.is_empty() || secret_key.is_empty() {
        return Err(S3Error::invalid_arg(
            "access_key and secret_key must be set for SigV4",
        ));
    }

    let amz_date = format_time(&now, LONG_DATETIME)?;

    request
        .headers
        .insert(HOST, host_header_value(&request.url)?);
    request.headers.insert(
        X_AMZ_CONTENT_SHA256,
        header_value(&request.payload_hash)?,
    );
    request.headers.insert(X_AMZ_DATE, header_value(&amz_date)?);
    if let Some(token) = session_token.as_deref() {
        request
            .headers
            .insert(X_AMZ_SECURITY_TOKEN, header_value(token)?);
    }

    let canonical = canonical_request(
        request.method.as_str(),
        &request.url,
        &request.headers,
        &request.payload_hash,
    );
    let to_sign = string_to_sign(&now, region, &canonical)?;
    let key = signing_key(&now, secret_key, region, "s3")?;
    let signature = hex::encode(hmac_sha256(&key, to_sign.as_bytes())?);
    let authorization = authorization_header(
        access_key,
        &now,
        region,
        &signed_header_string(&request.headers),
        &signature,
    )?;
    request
        .headers
        .insert(AUTHORIZATION, header_value(&authorization)?);

    Ok(())
}

// --- canonicalization --- //

fn canonical_request(
    method: &str,
    url: &Url,
    headers: &HeaderMap,
    payload_hash: &str,
) -> String {
    format!(
        "{method}\n{uri}\n{query}\n{headers}\n\n{signed}\n{payload_hash}",
        uri = url.path(),
        query = canonical_query_string(url),
        headers = canonical_header_string(headers),
        signed = signed_header_string(headers),
    )
}

/// Query pairs re-encoded with the strict unreserved set, sorted, and
/// re-joined. A key with no value canonicalizes as `key=`.
fn canonical_query_string(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (uri_encode(&k, true), uri_encode(&v, true)))
        .collect();
    pairs.sort();
    let encoded: Vec<String> = pairs
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    encoded.join("&")
}

/// `name:value` lines, lowercased and sorted by name, joined by newlines.
fn canonical_header_string(headers: &HeaderMap) -> String {
    let mut entries: Vec<String> = headers
        .iter()
        .map(|(name, value)| {
            format!(
                "{}:{}",
                name.as_str(),
                value.to_str().unwrap_or_default().trim()
            )
        })
        .collect();
    entries.sort();
    entries.join("\n")
}

/// The sorted, `;`-joined list of signed header names.
fn signed_header_string(headers: &HeaderMap) -> String {
    let mut names: Vec<&str> =
        headers.keys().map(HeaderName::as_str).collect();
    names.sort_unstable();
    names.join(";")
}

fn string_to_sign(
    now: &OffsetDateTime,
    region: &str,
    canonical_request: &str,
) -> Result<String, S3Error> {
    Ok(format!(
        "AWS4-HMAC-SHA256\n{}\n{}/{region}/s3/aws4_request\n{}",
        format_time(now, LONG_DATETIME)?,
        format_time(now, SHORT_DATE)?,
        sha256_hex(canonical_request.as_bytes()),
    ))
}

/// Derive the per-day signing key:
/// `HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")`.
fn signing_key(
    now: &OffsetDateTime,
    secret_key: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, S3Error> {
    let date_key = hmac_sha256(
        format!("AWS4{secret_key}").as_bytes(),
        format_time(now, SHORT_DATE)?.as_bytes(),
    )?;
    let region_key = hmac_sha256(&date_key, region.as_bytes())?;
    let service_key = hmac_sha256(&region_key, service.as_bytes())?;
    hmac_sha256(&service_key, b"aws4_request")
}

fn authorization_header(
    access_key: &str,
    now: &OffsetDateTime,
    region: &str,
    signed_headers: &str,
    signature: &str,
) -> Result<String, S3Error> {
    Ok(format!(
        "AWS4-HMAC-SHA256 Credential={access_key}/{}/{region}/s3/aws4_request,\
         SignedHeaders={signed_headers},Signature={signature}",
        format_time(now, SHORT_DATE)?,
    ))
}

// --- small helpers --- //

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, S3Error> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(|e| {
        S3Error::new(ErrorKind::SigV4, format!("bad HMAC key: {e}"))
    })?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn format_time(
    now: &OffsetDateTime,
    format: &[FormatItem<'_>],
) -> Result<String, S3Error> {
    now.format(format).map_err(|e| {
        S3Error::new(ErrorKind::SigV4, format!("timestamp formatting: {e}"))
    })
}

/// `host` or `host:port`; the port appears only when it is not the
/// scheme's default.
fn host_header_value(url: &Url) -> Result<HeaderValue, S3Error> {
    let host = url
        .host_str()
        .ok_or_else(|| S3Error::invalid_arg("endpoint URL has no host"))?;
    let value = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    header_value(&value)
}

fn header_value(s: &str) -> Result<HeaderValue, S3Error> {
    HeaderValue::from_str(s).map_err(|_| {
        S3Error::invalid_arg(format!("value is not a valid header: {s:?}"))
    })
}
