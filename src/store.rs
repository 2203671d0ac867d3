//! Client for the secret store: presents a proof token and receives the secret bound to the caller's identity.

use {
    crate::{
        config::{validate_base_url, ClientConfig},
        constants::*,
        token::ProofToken,
        ProofError,
    },
    http::{header::HeaderValue, StatusCode},
    lazy_static::lazy_static,
    log::{debug, warn},
    regex::Regex,
    reqwest::Client,
    serde::{de::DeserializeOwned, Deserialize, Serialize},
    std::{
        fmt::{Debug, Display, Formatter, Result as FmtResult},
        str::FromStr,
        time::Duration,
    },
    zeroize::{Zeroize, ZeroizeOnDrop},
};

lazy_static! {
    /// A single path segment of a stored resource.
    static ref SEGMENT_RE: Regex = Regex::new(r"^[A-Za-z0-9_.\-]+$").unwrap();
}

/// The name of a stored secret: `name`, or `unique_id/name` for secrets namespaced by an owner id.
///
/// Segments are limited to ASCII letters, digits, `_`, `.` and `-`, and may not be `.` or `..`, so a path can
/// be appended to the store URL without escaping and cannot climb out of the `/get/` route.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ResourcePath(String);

impl ResourcePath {
    /// Validate a resource path.
    ///
    /// # Errors
    /// Returns [`ProofError::InvalidResourcePath`] if the path is empty, has more than two segments, or a segment
    /// contains a disallowed character.
    pub fn new(path: &str) -> Result<Self, ProofError> {
        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() > 2 {
            return Err(ProofError::InvalidResourcePath(format!("too many segments: {:?}", path)));
        }

        for segment in segments.iter() {
            if !SEGMENT_RE.is_match(segment) || *segment == "." || *segment == ".." {
                return Err(ProofError::InvalidResourcePath(format!("invalid segment {:?} in {:?}", segment, path)));
            }
        }

        Ok(Self(path.to_string()))
    }

    /// A path namespaced by an owner id: `unique_id/name`.
    ///
    /// # Errors
    /// Returns [`ProofError::InvalidResourcePath`] if either segment is invalid.
    pub fn scoped(unique_id: &str, name: &str) -> Result<Self, ProofError> {
        if unique_id.contains('/') || name.contains('/') {
            return Err(ProofError::InvalidResourcePath(format!("invalid segment in {:?}/{:?}", unique_id, name)));
        }

        Self::new(&format!("{}/{}", unique_id, name))
    }

    /// The path as it appears in the store URL.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The owner id, if the path is namespaced.
    pub fn unique_id(&self) -> Option<&str> {
        self.0.split_once('/').map(|(unique_id, _)| unique_id)
    }

    /// The secret's name.
    pub fn name(&self) -> &str {
        self.0.split_once('/').map(|(_, name)| name).unwrap_or(&self.0)
    }
}

impl Display for ResourcePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

impl FromStr for ResourcePath {
    type Err = ProofError;

    fn from_str(s: &str) -> Result<Self, ProofError> {
        Self::new(s)
    }
}

/// The body of a successful store response. The bytes are wiped when the secret is dropped.
#[derive(Clone, Eq, PartialEq, Zeroize, ZeroizeOnDrop)]
pub struct Secret(Vec<u8>);

impl Secret {
    /// Wrap raw secret bytes.
    pub fn new<B: Into<Vec<u8>>>(bytes: B) -> Self {
        Self(bytes.into())
    }

    /// The raw bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Take the raw bytes. Wiping them becomes the caller's job.
    #[inline]
    pub fn into_bytes(mut self) -> Vec<u8> {
        std::mem::take(&mut self.0)
    }

    /// The length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the secret is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode the secret as JSON.
    ///
    /// # Errors
    /// Returns [`ProofError::InvalidResponse`] if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ProofError> {
        serde_json::from_slice(&self.0).map_err(|e| ProofError::InvalidResponse(format!("cannot decode secret: {}", e)))
    }
}

impl Debug for Secret {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Secret({} bytes)", self.0.len())
    }
}

/// Connection data for a Lightning node, the payload the store keeps for each node.
#[derive(Clone, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct NodeData {
    /// The node's public key.
    pub pubkey: String,

    /// Hex-encoded macaroon granting access to the node.
    #[serde(default)]
    pub macaroon_hex: String,

    /// Base64-encoded TLS certificate of the node.
    #[serde(default)]
    pub certificate_base64: String,

    /// `host:port` of the node's API.
    #[serde(default)]
    pub endpoint: String,

    /// Comma-separated tags.
    #[serde(default)]
    pub tags: String,

    /// Which node API the endpoint speaks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_type: Option<i32>,

    /// How the node's certificate should be verified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_verification_type: Option<i32>,
}

impl Debug for NodeData {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("NodeData")
            .field("pubkey", &self.pubkey)
            .field("macaroon_hex", &"<redacted>")
            .field("certificate_base64", &format!("<{} bytes>", self.certificate_base64.len()))
            .field("endpoint", &self.endpoint)
            .field("tags", &self.tags)
            .field("api_type", &self.api_type)
            .field("cert_verification_type", &self.cert_verification_type)
            .finish()
    }
}

/// Client for the secret store's `GET {base}/get/{path}` route.
#[derive(Clone, Debug)]
pub struct SecretStoreClient {
    base_url: String,
    timeout: Duration,
    client: Client,
}

impl SecretStoreClient {
    /// Create a client for the store at `base_url`.
    ///
    /// # Errors
    /// Returns [`ProofError::InvalidConfiguration`] if the URL is not an `http` or `https` URL or the HTTP client
    /// cannot be created.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProofError> {
        Self::with_user_agent(base_url, timeout, DEFAULT_USER_AGENT)
    }

    /// Create a client from a [`ClientConfig`].
    ///
    /// # Errors
    /// Returns [`ProofError::InvalidConfiguration`] if the HTTP client cannot be created.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ProofError> {
        Self::with_user_agent(config.store_url(), config.timeout(), config.user_agent())
    }

    fn with_user_agent(base_url: &str, timeout: Duration, user_agent: &str) -> Result<Self, ProofError> {
        validate_base_url(base_url).map_err(ProofError::InvalidConfiguration)?;

        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| ProofError::InvalidConfiguration(format!("cannot create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            client,
        })
    }

    /// The URL a resource is fetched from.
    pub fn url_for(&self, path: &ResourcePath) -> String {
        format!("{}/{}/{}", self.base_url, STORE_GET_PATH, path)
    }

    /// Present `token` and fetch the secret at `path`.
    ///
    /// # Errors
    /// * [`ProofError::AuthDenied`] if the store answers 401 or 403.
    /// * [`ProofError::NotFound`] if the store answers 404.
    /// * [`ProofError::Unreachable`] on any other status, a transport failure, or a timeout.
    pub async fn fetch(&self, token: &ProofToken, path: &ResourcePath) -> Result<Secret, ProofError> {
        let url = self.url_for(path);

        let mut header = HeaderValue::from_str(token.as_str())
            .map_err(|_| ProofError::MalformedSignedRequest("token is not a valid header value".to_string()))?;
        header.set_sensitive(true);

        debug!("Fetching {} from the secret store", path);
        let response = self
            .client
            .get(&url)
            .header(HDR_PRESIGNED_GET_CALLER_IDENTITY, header)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                let secret = Secret::new(response.bytes().await?.to_vec());
                debug!("Received {} bytes for {}", secret.len(), path);
                Ok(secret)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!("Secret store denied access to {}: HTTP {}", path, status.as_u16());
                Err(ProofError::AuthDenied(format!("secret store answered HTTP {}", status.as_u16())))
            }
            StatusCode::NOT_FOUND => Err(ProofError::NotFound(path.to_string())),
            _ => {
                warn!("Secret store answered HTTP {} for {}", status.as_u16(), path);
                Err(ProofError::unreachable(format!("secret store answered HTTP {}", status.as_u16())))
            }
        }
    }
}
