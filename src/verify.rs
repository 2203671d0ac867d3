//! The relying party's half of the exchange: replay a received proof token against STS and learn who signed it.

use {
    crate::{
        constants::*,
        request::Region,
        token::{FixedPrefix, ProofToken},
        ProofError,
    },
    chrono::{DateTime, Duration as ChronoDuration, Utc},
    http::header::CONTENT_TYPE,
    log::{debug, warn},
    reqwest::Client,
    serde::Deserialize,
    std::{
        collections::HashMap,
        sync::{Arc, Mutex},
        time::Duration,
    },
    tokio::time::sleep,
};

/// The identity STS reports for the signer of a proof token.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CallerIdentity {
    arn: String,

    #[serde(default)]
    user_id: String,

    #[serde(default)]
    account: String,
}

impl CallerIdentity {
    /// Create a caller identity.
    pub fn new<A: Into<String>, U: Into<String>, C: Into<String>>(arn: A, user_id: U, account: C) -> Self {
        Self {
            arn: arn.into(),
            user_id: user_id.into(),
            account: account.into(),
        }
    }

    /// The ARN of the signer, e.g. `arn:aws:sts::123456789012:assumed-role/node-role/i-0abc`.
    #[inline]
    pub fn arn(&self) -> &str {
        &self.arn
    }

    /// The unique id of the signer.
    #[inline]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The account the signer belongs to.
    #[inline]
    pub fn account(&self) -> &str {
        &self.account
    }
}

#[derive(Deserialize)]
struct GetCallerIdentityResponse {
    #[serde(rename = "GetCallerIdentityResult")]
    result: CallerIdentity,
}

/// Parse the body of a successful `GetCallerIdentity` response.
pub(crate) fn parse_caller_identity(body: &str) -> Result<CallerIdentity, ProofError> {
    let response: GetCallerIdentityResponse = quick_xml::de::from_str(body)
        .map_err(|e| ProofError::InvalidResponse(format!("cannot decode GetCallerIdentity response: {}", e)))?;

    if response.result.arn.is_empty() {
        return Err(ProofError::AuthDenied("STS returned no caller ARN".to_string()));
    }

    Ok(response.result)
}

/// A verified identity and when it was verified.
#[derive(Clone, Debug)]
struct CachedIdentity {
    identity: CallerIdentity,
    verified_at: DateTime<Utc>,
}

/// Verifies proof tokens by replaying them against the STS endpoint of a single region.
///
/// The verifier never uses the URL a client might suggest: it rebuilds the signed request from its own
/// [`FixedPrefix`] and the token's signature block only.
///
/// Identities are cached per token for two minutes, so a client presenting the same token to several resources
/// costs one STS round trip. Transport failures and STS server errors are retried with exponential backoff for
/// up to three seconds in total. Clones share the cache.
#[derive(Clone, Debug)]
pub struct IdentityVerifier {
    region: Region,
    prefix: FixedPrefix,
    timeout: Duration,
    cache_ttl: Duration,
    retry_budget: Duration,
    cache: Arc<Mutex<HashMap<String, CachedIdentity>>>,
    client: Client,
}

impl IdentityVerifier {
    /// Create a verifier for tokens scoped to `region`.
    ///
    /// # Errors
    /// Returns [`ProofError::InvalidRegion`] if the region name is invalid, or
    /// [`ProofError::InvalidConfiguration`] if the HTTP client cannot be created.
    pub fn new(region: &str) -> Result<Self, ProofError> {
        let region = Region::new(region)?;
        let client = Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|e| ProofError::InvalidConfiguration(format!("cannot create HTTP client: {}", e)))?;

        Ok(Self {
            prefix: FixedPrefix::for_region(&region),
            region,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            cache_ttl: Duration::from_secs(VERIFY_CACHE_TTL_SECS),
            retry_budget: Duration::from_millis(VERIFY_RETRY_BUDGET_MS),
            cache: Arc::new(Mutex::new(HashMap::new())),
            client,
        })
    }

    /// Replay tokens against a different STS endpoint, e.g. a FIPS endpoint.
    ///
    /// # Errors
    /// Returns [`ProofError::InvalidConfiguration`] unless the endpoint is a bare `https://sts.` host in an
    /// AWS partition.
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self, ProofError> {
        let prefix = FixedPrefix::for_endpoint(endpoint);
        if !prefix.is_aws_endpoint() {
            return Err(ProofError::InvalidConfiguration(format!("{:?} is not an AWS STS endpoint", endpoint)));
        }

        self.prefix = prefix;
        Ok(self)
    }

    /// Replay tokens against any endpoint, such as a local test server.
    #[cfg(any(test, feature = "unstable"))]
    pub fn with_test_endpoint(mut self, endpoint: &str) -> Self {
        warn!("Verifying proof tokens against unchecked endpoint {}", endpoint);
        self.prefix = FixedPrefix::for_endpoint(endpoint);
        self
    }

    /// Set the deadline for each STS round trip.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how long a verified identity is reused for the same token. Zero disables the cache.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the total backoff allowed across retries of a failed STS round trip. Zero disables retries.
    pub fn with_retry_budget(mut self, budget: Duration) -> Self {
        self.retry_budget = budget;
        self
    }

    /// The region tokens must be scoped to.
    #[inline]
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// The prefix tokens are joined to.
    #[inline]
    pub fn prefix(&self) -> &FixedPrefix {
        &self.prefix
    }

    /// Verify a token received in the `X-Amazon-Presigned-Getcalleridentity` header.
    ///
    /// # Errors
    /// * [`ProofError::MalformedSignedRequest`] if the token is malformed or scoped to another region or service.
    /// * [`ProofError::AuthDenied`] if the token has expired or STS rejects it.
    /// * [`ProofError::InvalidResponse`] if STS answers with a body that cannot be decoded.
    /// * [`ProofError::Unreachable`] if STS cannot be reached or answers with a server error after retrying.
    pub async fn verify(&self, header_value: &str) -> Result<CallerIdentity, ProofError> {
        self.verify_at(header_value, Utc::now()).await
    }

    /// Verify a token as of the given time.
    ///
    /// # Errors
    /// See [`verify`](Self::verify).
    pub async fn verify_at(&self, header_value: &str, now: DateTime<Utc>) -> Result<CallerIdentity, ProofError> {
        let token = ProofToken::parse(header_value.trim())?;
        let scope = token.block().scope();

        if scope.region() != self.region.as_str() {
            return Err(ProofError::MalformedSignedRequest(format!(
                "token is scoped to region {}, expected {}",
                scope.region(),
                self.region
            )));
        }

        if scope.service() != SERVICE_STS {
            return Err(ProofError::MalformedSignedRequest(format!(
                "token is scoped to service {}, expected {}",
                scope.service(),
                SERVICE_STS
            )));
        }

        if now > token.expires_at() {
            return Err(ProofError::AuthDenied(format!("token expired at {}", token.expires_at())));
        }

        if let Some(identity) = self.cached(&token, now) {
            debug!("Proof token for {} verified from cache", identity.arn());
            return Ok(identity);
        }

        let identity = self.replay_with_retry(&token).await?;
        self.remember(&token, &identity, now);
        Ok(identity)
    }

    fn cache_ttl(&self) -> Option<ChronoDuration> {
        if self.cache_ttl.is_zero() {
            return None;
        }

        ChronoDuration::from_std(self.cache_ttl).ok()
    }

    fn cached(&self, token: &ProofToken, now: DateTime<Utc>) -> Option<CallerIdentity> {
        let ttl = self.cache_ttl()?;
        let cache = self.cache.lock().ok()?;
        let entry = cache.get(token.as_str())?;
        (now < entry.verified_at + ttl).then(|| entry.identity.clone())
    }

    fn remember(&self, token: &ProofToken, identity: &CallerIdentity, now: DateTime<Utc>) {
        let Some(ttl) = self.cache_ttl() else {
            return;
        };

        if let Ok(mut cache) = self.cache.lock() {
            cache.retain(|_, entry| now < entry.verified_at + ttl);
            cache.insert(
                token.as_str().to_string(),
                CachedIdentity {
                    identity: identity.clone(),
                    verified_at: now,
                },
            );
        }
    }

    async fn replay_with_retry(&self, token: &ProofToken) -> Result<CallerIdentity, ProofError> {
        let mut delay = Duration::from_millis(VERIFY_RETRY_INITIAL_DELAY_MS);
        let mut waited = Duration::ZERO;

        loop {
            match self.replay(token).await {
                Err(e) if e.is_retryable() && waited + delay <= self.retry_budget => {
                    debug!("Retrying STS in {} ms after: {}", delay.as_millis(), e);
                    sleep(delay).await;
                    waited += delay;
                    delay *= 2;
                }
                result => return result,
            }
        }
    }

    async fn replay(&self, token: &ProofToken) -> Result<CallerIdentity, ProofError> {
        debug!("Verifying proof token for {} against {}", token.block().access_key_id(), self.prefix.base_url());
        let response = self
            .client
            .post(token.reconstruct(&self.prefix))
            .header(CONTENT_TYPE, APPLICATION_X_WWW_FORM_URLENCODED)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let body = response.text().await?;
            let identity = parse_caller_identity(&body)?;
            debug!("Verified proof token for {}", identity.arn());
            Ok(identity)
        } else if status.is_client_error() {
            warn!("STS rejected proof token for {}: HTTP {}", token.block().access_key_id(), status.as_u16());
            Err(ProofError::AuthDenied(format!("STS answered HTTP {}", status.as_u16())))
        } else {
            warn!("STS answered HTTP {} while verifying a proof token", status.as_u16());
            Err(ProofError::unreachable(format!("STS answered HTTP {}", status.as_u16())))
        }
    }
}
