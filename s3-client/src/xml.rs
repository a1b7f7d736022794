//! XML assembly for Multi-Object Delete and parsing of ListObjectsV2
//! responses.
//!
//! The parser is a bounded substring scan rather than a real XML parser:
//! it extracts exactly the fields the client exposes, takes the first
//! match of each tag within a `<Contents>` block, performs no entity
//! decoding on text content, and ignores namespaces. This matches what
//! MinIO and AWS emit for well-formed responses; responses from other
//! servers are handled best-effort.

use crate::{
    error::S3Error,
    models::{DeleteObject, ListObjectsResult, ObjectInfo},
};

// --- Multi-Object Delete body --- //

/// Escape `&`, `<`, `>`, and `"` for XML text content, appending to `out`.
fn append_escaped(out: &mut String, s: &str) {
    let mut rest = s;
    while let Some(i) = rest.find(['&', '<', '>', '"']) {
        out.push_str(&rest[..i]);
        match rest.as_bytes()[i] {
            b'&' => out.push_str("&amp;"),
            b'<' => out.push_str("&lt;"),
            b'>' => out.push_str("&gt;"),
            b'"' => out.push_str("&quot;"),
            _ => unreachable!(),
        }
        rest = &rest[i + 1..];
    }
    out.push_str(rest);
}

/// Serialize the request body for a Multi-Object Delete call.
///
/// Object keys and version ids are escaped; an empty key is rejected
/// before any bytes go on the wire. An empty `version_id` is treated the
/// same as an absent one.
pub(crate) fn build_delete_body(
    objects: &[DeleteObject],
    quiet: bool,
) -> Result<String, S3Error> {
    if objects.is_empty() {
        return Err(S3Error::invalid_arg("delete_objects: no objects given"));
    }

    let mut body = String::with_capacity(128 + objects.len() * 64);
    body.push_str("<Delete xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\n");

    if quiet {
        body.push_str("  <Quiet>true</Quiet>\n");
    }

    for object in objects {
        if object.key.is_empty() {
            return Err(S3Error::invalid_arg(
                "delete_objects: object key is empty",
            ));
        }

        body.push_str("  <Object>\n    <Key>");
        append_escaped(&mut body, &object.key);
        body.push_str("</Key>\n");

        if let Some(version_id) = object.version_id.as_deref() {
            if !version_id.is_empty() {
                body.push_str("    <VersionId>");
                append_escaped(&mut body, version_id);
                body.push_str("</VersionId>\n");
            }
        }

        body.push_str("  </Object>\n");
    }

    body.push_str("</Delete>");
    Ok(body)
}

// --- ListObjectsV2 response --- //

/// The text between the first occurrence of `open` and the following
/// `close`, or `None` when either tag is missing.
fn text_between<'a>(hay: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = hay.find(open)? + open.len();
    let len = hay[start..].find(close)?;
    Some(&hay[start..start + len])
}

/// Extract the fields of a ListObjectsV2 response.
///
/// An empty response yields an empty result. Missing or malformed fields
/// degrade to their defaults rather than failing the call; `<Size>` parses
/// leading decimal digits and otherwise reads as zero.
pub(crate) fn parse_list_response(xml: &str) -> ListObjectsResult {
    let mut out = ListObjectsResult::default();
    if xml.is_empty() {
        return out;
    }

    out.is_truncated = matches!(
        text_between(xml, "<IsTruncated>", "</IsTruncated>"),
        Some("true" | "True")
    );
    out.next_continuation_token = text_between(
        xml,
        "<NextContinuationToken>",
        "</NextContinuationToken>",
    )
    .map(str::to_string);

    let mut objects = Vec::with_capacity(16);
    let mut rest = xml;
    while let Some(start) = rest.find("<Contents>") {
        let block_start = &rest[start..];
        let Some(end) = block_start.find("</Contents>") else {
            break;
        };
        let block = &block_start[..end];

        let mut object = ObjectInfo {
            key: text_between(block, "<Key>", "</Key>")
                .unwrap_or_default()
                .to_string(),
            size: 0,
            etag: text_between(block, "<ETag>", "</ETag>")
                .map(strip_quotes)
                .map(str::to_string),
            last_modified: text_between(block, "<LastModified>", "</LastModified>")
                .map(str::to_string),
            storage_class: text_between(block, "<StorageClass>", "</StorageClass>")
                .map(str::to_string),
        };
        if let Some(size) = text_between(block, "<Size>", "</Size>") {
            object.size = parse_decimal_prefix(size);
        }
        objects.push(object);

        rest = &block_start[end + "</Contents>".len()..];
    }

    out.objects = objects;
    out
}

/// Strip one pair of surrounding double quotes, as servers usually send
/// `<ETag>"abc"</ETag>`.
fn strip_quotes(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

/// Parse the leading run of decimal digits; garbage reads as zero.
fn parse_decimal_prefix(s: &str) -> u64 {
    let digits = s
        .as_bytes()
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();
    s[..digits].parse().unwrap_or(0)
}
