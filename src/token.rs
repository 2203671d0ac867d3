//! The two halves of a presigned proof request.
//!
//! A signed proof URL is `FixedPrefix` + `&` + `ProofToken`. The prefix is public and derivable from the region
//! alone, so only the token travels; the relying party rebuilds the prefix itself. Both halves are kept as
//! separate typed values from the moment of signing and are only joined when a URL is needed.

use {
    crate::{
        canonical::{query_string_to_normalized_pairs, unescape_uri_encoding, uri_encode},
        constants::*,
        request::Region,
        ProofError,
    },
    chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, Utc},
    lazy_static::lazy_static,
    regex::Regex,
    reqwest::Url,
    std::{
        fmt::{Debug, Display, Formatter, Result as FmtResult},
        str::FromStr,
    },
};

lazy_static! {
    /// A hex-encoded SHA-256 HMAC.
    static ref SIGNATURE_RE: Regex = Regex::new(r"^[0-9a-f]{64}$").unwrap();
}

/// The public part of a signed proof URL:
/// `https://sts.{region}.amazonaws.com/?Action=GetCallerIdentity&Version=2011-06-15`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct FixedPrefix {
    /// Scheme and authority, without a trailing slash.
    base_url: String,
}

impl FixedPrefix {
    /// The prefix for the regional STS endpoint of `region`.
    pub fn for_region(region: &Region) -> Self {
        Self {
            base_url: format!("https://{}", region.sts_host()),
        }
    }

    /// A prefix rooted at an arbitrary endpoint, e.g. a VPC endpoint or a test server.
    pub fn for_endpoint(endpoint: &str) -> Self {
        Self {
            base_url: endpoint.trim_end_matches('/').to_string(),
        }
    }

    /// Scheme and authority of the endpoint.
    #[inline]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether the endpoint is a bare HTTPS STS host in an AWS partition: no port, path, query or credentials.
    pub fn is_aws_endpoint(&self) -> bool {
        let Ok(url) = Url::parse(&self.base_url) else {
            return false;
        };

        let Some(host) = url.host_str() else {
            return false;
        };

        let bare = url.username().is_empty()
            && url.password().is_none()
            && url.port().is_none()
            && url.path() == "/"
            && url.query().is_none()
            && url.fragment().is_none();

        let sts_host = (host.starts_with("sts.") || host.starts_with("sts-fips."))
            && (host.ends_with(&format!(".{}", DNS_SUFFIX_AWS)) || host.ends_with(&format!(".{}", DNS_SUFFIX_AWS_CN)));

        url.scheme() == "https" && bare && sts_host
    }

    /// Join this prefix with a token to produce the full signed URL.
    pub fn join(&self, token: &ProofToken) -> String {
        format!("{}&{}", self, token.as_str())
    }
}

impl Display for FixedPrefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}/?{}={}&{}={}", self.base_url, QP_ACTION, ACTION_GET_CALLER_IDENTITY, QP_VERSION, STS_API_VERSION)
    }
}

/// The credential scope of a signature: `YYYYMMDD/region/service/aws4_request`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CredentialScope {
    date: NaiveDate,
    region: String,
    service: String,
}

impl CredentialScope {
    /// Create a new credential scope.
    pub fn new<R: Into<String>, S: Into<String>>(date: NaiveDate, region: R, service: S) -> Self {
        Self {
            date,
            region: region.into(),
            service: service.into(),
        }
    }

    /// The signing date.
    #[inline]
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// The region the signature is scoped to.
    #[inline]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// The service the signature is scoped to.
    #[inline]
    pub fn service(&self) -> &str {
        &self.service
    }
}

impl Display for CredentialScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}/{}/{}/{}", self.date.format(ISO8601_DATE_FORMAT), self.region, self.service, AWS4_REQUEST)
    }
}

impl FromStr for CredentialScope {
    type Err = ProofError;

    fn from_str(s: &str) -> Result<Self, ProofError> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() != 4 || parts[3] != AWS4_REQUEST || parts[1].is_empty() || parts[2].is_empty() {
            return Err(ProofError::MalformedSignedRequest(format!("invalid credential scope: {}", s)));
        }

        let date = NaiveDate::parse_from_str(parts[0], ISO8601_DATE_FORMAT)
            .map_err(|_| ProofError::MalformedSignedRequest(format!("invalid credential scope date: {}", parts[0])))?;

        Ok(Self::new(date, parts[1], parts[2]))
    }
}

/// The signature-bearing parameters of a presigned proof request.
#[derive(Clone, Eq, PartialEq)]
pub struct SignatureBlock {
    pub(crate) access_key_id: String,
    pub(crate) scope: CredentialScope,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) expires: u64,
    pub(crate) security_token: Option<String>,
    pub(crate) signed_headers: String,
    pub(crate) signature: String,
}

impl SignatureBlock {
    /// The access key id that produced the signature.
    #[inline]
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// The credential scope of the signature.
    #[inline]
    pub fn scope(&self) -> &CredentialScope {
        &self.scope
    }

    /// The signing time.
    #[inline]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Validity in seconds from the signing time.
    #[inline]
    pub fn expires(&self) -> u64 {
        self.expires
    }

    /// Whether the signature was made with temporary credentials.
    #[inline]
    pub fn has_security_token(&self) -> bool {
        self.security_token.is_some()
    }

    /// The `;`-joined signed header names.
    #[inline]
    pub fn signed_headers(&self) -> &str {
        &self.signed_headers
    }

    /// The hex-encoded signature.
    #[inline]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// The time after which the signed request is no longer accepted.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.timestamp + ChronoDuration::seconds(self.expires as i64)
    }

    /// The encoded query string, in canonical order with the signature last.
    fn to_query_string(&self) -> String {
        let credential = format!("{}/{}", self.access_key_id, self.scope);
        let date = self.timestamp.format(ISO8601_COMPACT_FORMAT).to_string();
        let expires = self.expires.to_string();

        let mut parts: Vec<(&str, &str)> = vec![
            (QP_X_AMZ_ALGORITHM, AWS4_HMAC_SHA256),
            (QP_X_AMZ_CREDENTIAL, &credential),
            (QP_X_AMZ_DATE, &date),
            (QP_X_AMZ_EXPIRES, &expires),
        ];

        if let Some(token) = &self.security_token {
            parts.push((QP_X_AMZ_SECURITY_TOKEN, token));
        }

        parts.push((QP_X_AMZ_SIGNED_HEADERS, &self.signed_headers));
        parts.push((QP_X_AMZ_SIGNATURE, &self.signature));

        parts.iter().map(|(k, v)| format!("{}={}", k, uri_encode(v))).collect::<Vec<_>>().join("&")
    }

    /// Parse the signature block out of a token's query string.
    fn from_query_string(token: &str) -> Result<Self, ProofError> {
        let mut algorithm = None;
        let mut credential = None;
        let mut date = None;
        let mut expires = None;
        let mut security_token = None;
        let mut signed_headers = None;
        let mut signature = None;

        for (key, value) in query_string_to_normalized_pairs(token)? {
            if key.eq_ignore_ascii_case(QP_ACTION) || key.eq_ignore_ascii_case(QP_VERSION) {
                return Err(ProofError::MalformedSignedRequest(format!("token must not carry {}", key)));
            }

            if key.eq_ignore_ascii_case(QP_REDIRECT) {
                return Err(ProofError::MalformedSignedRequest("token must not carry a redirect".to_string()));
            }

            let slot = match key.as_str() {
                QP_X_AMZ_ALGORITHM => &mut algorithm,
                QP_X_AMZ_CREDENTIAL => &mut credential,
                QP_X_AMZ_DATE => &mut date,
                QP_X_AMZ_EXPIRES => &mut expires,
                QP_X_AMZ_SECURITY_TOKEN => &mut security_token,
                QP_X_AMZ_SIGNED_HEADERS => &mut signed_headers,
                QP_X_AMZ_SIGNATURE => &mut signature,
                _ => return Err(ProofError::MalformedSignedRequest(format!("unexpected parameter {}", key))),
            };

            if slot.is_some() {
                return Err(ProofError::MalformedSignedRequest(format!("duplicate parameter {}", key)));
            }

            *slot = Some(unescape_uri_encoding(&value)?);
        }

        let missing = |name: &str| ProofError::MalformedSignedRequest(format!("missing parameter {}", name));

        let algorithm = algorithm.ok_or_else(|| missing(QP_X_AMZ_ALGORITHM))?;
        if algorithm != AWS4_HMAC_SHA256 {
            return Err(ProofError::MalformedSignedRequest(format!("unsupported algorithm {}", algorithm)));
        }

        let credential = credential.ok_or_else(|| missing(QP_X_AMZ_CREDENTIAL))?;
        let (access_key_id, scope) = credential
            .split_once('/')
            .ok_or_else(|| ProofError::MalformedSignedRequest(format!("invalid credential: {}", credential)))?;
        if access_key_id.is_empty() {
            return Err(ProofError::MalformedSignedRequest("credential has no access key".to_string()));
        }
        let scope = CredentialScope::from_str(scope)?;

        let date = date.ok_or_else(|| missing(QP_X_AMZ_DATE))?;
        let timestamp = NaiveDateTime::parse_from_str(&date, ISO8601_COMPACT_FORMAT)
            .map_err(|_| ProofError::MalformedSignedRequest(format!("invalid date: {}", date)))?
            .and_utc();
        if timestamp.date_naive() != scope.date() {
            return Err(ProofError::MalformedSignedRequest("date does not match the credential scope".to_string()));
        }

        let expires = expires.ok_or_else(|| missing(QP_X_AMZ_EXPIRES))?;
        let expires: u64 = expires
            .parse()
            .ok()
            .filter(|e| *e >= 1 && *e <= MAX_EXPIRES_SECS as u64)
            .ok_or_else(|| ProofError::MalformedSignedRequest(format!("invalid expiry: {}", expires)))?;

        let signed_headers = signed_headers.ok_or_else(|| missing(QP_X_AMZ_SIGNED_HEADERS))?;
        if !signed_headers.split(';').any(|h| h == HDR_HOST) {
            return Err(ProofError::MalformedSignedRequest("host must be a signed header".to_string()));
        }

        let signature = signature.ok_or_else(|| missing(QP_X_AMZ_SIGNATURE))?;
        if !SIGNATURE_RE.is_match(&signature) {
            return Err(ProofError::MalformedSignedRequest("invalid signature".to_string()));
        }

        Ok(Self {
            access_key_id: access_key_id.to_string(),
            scope,
            timestamp,
            expires,
            security_token,
            signed_headers,
            signature,
        })
    }
}

impl Debug for SignatureBlock {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("SignatureBlock")
            .field("access_key_id", &self.access_key_id)
            .field("scope", &self.scope.to_string())
            .field("timestamp", &self.timestamp)
            .field("expires", &self.expires)
            .field("security_token", &self.security_token.as_ref().map(|_| "<redacted>"))
            .field("signed_headers", &self.signed_headers)
            .field("signature", &"<redacted>")
            .finish()
    }
}

/// A presigned proof request, kept as its public prefix and its signature block.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignedProofRequest {
    pub(crate) prefix: FixedPrefix,
    pub(crate) block: SignatureBlock,
}

impl SignedProofRequest {
    /// The public prefix this request was signed for.
    #[inline]
    pub fn prefix(&self) -> &FixedPrefix {
        &self.prefix
    }

    /// The signature-bearing parameters.
    #[inline]
    pub fn block(&self) -> &SignatureBlock {
        &self.block
    }

    /// The full presigned URL.
    pub fn url(&self) -> String {
        format!("{}&{}", self.prefix, self.block.to_query_string())
    }
}

/// The bearer credential handed to the secret store: the signature-bearing suffix of a presigned
/// `GetCallerIdentity` URL.
///
/// The token carries no secret key material but replaying it proves the signer's identity until it expires, so
/// `Debug` does not print it.
#[derive(Clone, Eq, PartialEq)]
pub struct ProofToken {
    raw: String,
    block: SignatureBlock,
}

impl ProofToken {
    /// Parse a token received from a client.
    ///
    /// The token must be a bare query string made only of the `X-Amz-*` presigning parameters: it must not be
    /// a URL, must not contain `@`, `?` or `/`, and must not carry `Action`, `Version` or `Redirect`
    /// parameters that would change what the relying party's rebuilt request does.
    ///
    /// # Errors
    /// Returns [`ProofError::MalformedSignedRequest`] if any of these checks fail or a required parameter is
    /// missing or invalid.
    pub fn parse(token: &str) -> Result<Self, ProofError> {
        if token.is_empty() {
            return Err(ProofError::MalformedSignedRequest("token is empty".to_string()));
        }

        if token.len() >= 4 && token.as_bytes()[..4].eq_ignore_ascii_case(b"http") {
            return Err(ProofError::MalformedSignedRequest("token must not be a URL".to_string()));
        }

        if token.contains(['@', '?', '/']) {
            return Err(ProofError::MalformedSignedRequest("token contains a forbidden character".to_string()));
        }

        Ok(Self {
            raw: token.to_string(),
            block: SignatureBlock::from_query_string(token)?,
        })
    }

    /// The token as sent on the wire.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The signature-bearing parameters.
    #[inline]
    pub fn block(&self) -> &SignatureBlock {
        &self.block
    }

    /// The time after which the token is no longer accepted.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.block.expires_at()
    }

    /// Rebuild the full signed URL from a prefix. This is the exact inverse of [`extract`].
    pub fn reconstruct(&self, prefix: &FixedPrefix) -> String {
        prefix.join(self)
    }
}

impl Debug for ProofToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ProofToken").field("block", &self.block).finish()
    }
}

impl FromStr for ProofToken {
    type Err = ProofError;

    fn from_str(s: &str) -> Result<Self, ProofError> {
        Self::parse(s)
    }
}

/// Extract the token from a signed proof request.
///
/// # Errors
/// Returns [`ProofError::MalformedSignedRequest`] if the request was not signed for `expected` (for example it
/// was signed for a different region).
pub fn extract(signed: &SignedProofRequest, expected: &FixedPrefix) -> Result<ProofToken, ProofError> {
    if signed.prefix != *expected {
        return Err(ProofError::MalformedSignedRequest(format!(
            "signed request prefix {} does not match the expected prefix {}",
            signed.prefix, expected
        )));
    }

    Ok(ProofToken {
        raw: signed.block.to_query_string(),
        block: signed.block.clone(),
    })
}
