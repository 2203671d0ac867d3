//! Canonicalization functionality for presigning and token parsing.
//!
//! This includes the RFC 3986 query encoding rules, header value normalization, and the ability to create
//! the AWS SigV4 canonical request for a proof request.
//!
//! **Stability of this module is not guaranteed except for items exposed at the crate root**.
//! The functions and types are subject to change in minor/patch versions. This is exposed for
//! testing purposes only.

use {
    crate::{
        constants::*,
        crypto::sha256,
        request::ProofRequest,
        ProofError,
    },
    log::trace,
    percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC},
    qualifier_attr::qualifiers,
    std::fmt::{Debug, Formatter, Result as FmtResult},
};

/// Error message: `"Illegal hex character in escape % pattern: %"`
const MSG_ILLEGAL_HEX_CHAR: &str = "Illegal hex character in escape % pattern: %";

/// Error message: `"Incomplete trailing escape % sequence"`
const MSG_INCOMPLETE_TRAILING_ESCAPE: &str = "Incomplete trailing escape % sequence";

/// Everything except the RFC 3986 unreserved characters is escaped.
const RFC3986_ESCAPED: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// A canonicalized proof request for AWS SigV4.
///
/// Built by the signer; exposed so tests can inspect the exact bytes that get hashed.
///
/// **The stability of this struct is not guaranteed.** The fields and methods are subject to
/// change in minor/patch versions.

#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
#[derive(Clone)]
struct CanonicalRequest {
    /// The HTTP method for the request.
    request_method: String,

    /// The canonicalized path. This is guaranteed to be ASCII.
    canonical_path: String,

    /// Query parameters, already RFC 3986 encoded, in the order they were added.
    query_parameters: Vec<(String, String)>,

    /// Signed headers as lowercase names and normalized values, sorted by name.
    headers: Vec<(String, String)>,

    /// The SHA-256 hash of the body.
    body_sha256: String,
}

impl CanonicalRequest {
    /// Create a canonical request from a proof request and the raw (unencoded) presigning parameters.
    ///
    /// The proof request's own `Action` and `Version` parameters are always included.

    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    fn from_proof_request(request: &ProofRequest, presign_parameters: &[(&str, &str)]) -> Self {
        let mut query_parameters = Vec::with_capacity(presign_parameters.len() + 2);
        for (key, value) in request.parameters().iter().chain(presign_parameters.iter()) {
            query_parameters.push((uri_encode(key), uri_encode(value)));
        }

        let mut headers: Vec<(String, String)> = request
            .headers()
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), normalize_header_value(&value)))
            .collect();
        headers.sort();

        Self {
            request_method: request.method().to_string(),
            canonical_path: request.path().to_string(),
            query_parameters,
            headers,
            body_sha256: SHA256_EMPTY.to_string(),
        }
    }

    /// The request method, always `POST` for a proof request.

    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    #[inline(always)]
    fn request_method(&self) -> &str {
        &self.request_method
    }

    /// Retrieve the canonicalized URI path.

    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    #[inline(always)]
    fn canonical_path(&self) -> &str {
        &self.canonical_path
    }

    /// Hex SHA-256 of the (empty) body.

    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    #[inline(always)]
    fn body_sha256(&self) -> &str {
        &self.body_sha256
    }

    /// The `;`-joined list of signed header names.

    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    fn signed_headers(&self) -> String {
        self.headers.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>().join(";")
    }

    /// The sorted, encoded query string that is covered by the signature.

    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    fn canonical_query_string(&self) -> String {
        canonicalize_query_to_string(&self.query_parameters)
    }

    /// Get the [canonical request to hash][canonical-request] for the request.
    ///
    /// [canonical-request]: https://docs.aws.amazon.com/general/latest/gr/sigv4-create-canonical-request.html

    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    fn canonical_request(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(1024);
        result.extend(self.request_method().as_bytes());
        result.push(b'\n');
        result.extend(self.canonical_path().as_bytes());
        result.push(b'\n');
        result.extend(self.canonical_query_string().as_bytes());
        result.push(b'\n');

        for (name, value) in self.headers.iter() {
            result.extend(name.as_bytes());
            result.push(b':');
            result.extend(value.as_bytes());
            result.push(b'\n');
        }

        result.push(b'\n');
        result.extend(self.signed_headers().as_bytes());
        result.push(b'\n');
        result.extend(self.body_sha256().as_bytes());

        trace!("Canonical request:\n{}", String::from_utf8_lossy(&result));

        result
    }

    /// Get the SHA-256 hash of the [canonical request][canonical-request].
    ///
    /// [canonical-request]: https://docs.aws.amazon.com/general/latest/gr/sigv4-create-canonical-request.html

    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    fn canonical_request_sha256(&self) -> [u8; SHA256_OUTPUT_LEN] {
        sha256(&self.canonical_request())
    }
}

impl Debug for CanonicalRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("CanonicalRequest")
            .field("request_method", &self.request_method)
            .field("canonical_path", &self.canonical_path)
            .field("query_parameters", &self.query_parameters)
            .field("headers", &self.headers)
            .field("body_sha256", &self.body_sha256)
            .finish()
    }
}

/// Convert a list of encoded query parameters to a string for the canonical request.
///
/// Pairs are sorted by key and then by value; the signature itself is never included.

#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn canonicalize_query_to_string(query_parameters: &[(String, String)]) -> String {
    let mut pairs: Vec<&(String, String)> =
        query_parameters.iter().filter(|(key, _)| key != QP_X_AMZ_SIGNATURE).collect();
    pairs.sort();
    pairs.iter().map(|(key, value)| format!("{}={}", key, value)).collect::<Vec<_>>().join("&")
}

/// Whether a byte may appear in a query element without percent-encoding (RFC 3986 unreserved).

#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
#[inline(always)]
fn is_rfc3986_unreserved(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'-' || c == b'.' || c == b'_' || c == b'~'
}

/// Normalize a header value: strip leading and trailing spaces and squash runs of spaces.

#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn normalize_header_value(value: &str) -> String {
    value.split(' ').filter(|part| !part.is_empty()).collect::<Vec<_>>().join(" ")
}

/// Normalize a single element (key or value from key=value) of a query string according to RFC 3986:
/// * Unreserved characters are left alone.
/// * Other characters are percent-encoded with upper-case hex digits.
/// * Percent-encoded unreserved characters are decoded.
/// * `+` is treated as an encoded space.
///
/// If a percent encoding is incomplete or not hex, an error is returned.

#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn normalize_query_string_element(element: &str) -> Result<String, ProofError> {
    let bytes = element.as_bytes();
    let mut result = String::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];

        if is_rfc3986_unreserved(c) {
            result.push(c as char);
            i += 1;
        } else if c == b'%' {
            if i + 2 >= bytes.len() {
                return Err(ProofError::MalformedSignedRequest(MSG_INCOMPLETE_TRAILING_ESCAPE.to_string()));
            }

            let hex_digits = &bytes[i + 1..i + 3];
            match hex::decode(hex_digits) {
                Ok(value) => {
                    let c = value[0];
                    if is_rfc3986_unreserved(c) {
                        result.push(c as char);
                    } else {
                        result.push_str(&format!("%{:02X}", c));
                    }
                    i += 3;
                }
                Err(_) => {
                    return Err(ProofError::MalformedSignedRequest(format!(
                        "{}{}{}",
                        MSG_ILLEGAL_HEX_CHAR, hex_digits[0] as char, hex_digits[1] as char
                    )));
                }
            }
        } else if c == b'+' {
            result.push_str("%20");
            i += 1;
        } else {
            result.push_str(&format!("%{:02X}", c));
            i += 1;
        }
    }

    Ok(result)
}

/// Split a query string into normalized key/value pairs, preserving their order and any duplicates.
///
/// Empty components (`a=1&&b=2`) are skipped; a component without `=` has an empty value.

#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn query_string_to_normalized_pairs(query_string: &str) -> Result<Vec<(String, String)>, ProofError> {
    let mut result = Vec::new();

    for component in query_string.split('&') {
        if component.is_empty() {
            continue;
        }

        let (key, value) = match component.split_once('=') {
            Some((key, value)) => (key, value),
            None => (component, ""),
        };

        result.push((normalize_query_string_element(key)?, normalize_query_string_element(value)?));
    }

    Ok(result)
}

/// Decode a normalized (RFC 3986 encoded) query element back to its raw value.
///
/// # Errors
/// Returns [`ProofError::MalformedSignedRequest`] if the decoded bytes are not UTF-8.

#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn unescape_uri_encoding(s: &str) -> Result<String, ProofError> {
    percent_decode_str(s)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| ProofError::MalformedSignedRequest("query parameter is not valid UTF-8".to_string()))
}

/// Encode a raw value using the SigV4 (RFC 3986) rules: everything except `A-Z a-z 0-9 - . _ ~` is
/// percent-encoded with upper-case hex digits, including `/`, `=` and `+`.

#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn uri_encode(value: &str) -> String {
    utf8_percent_encode(value, RFC3986_ESCAPED).to_string()
}
