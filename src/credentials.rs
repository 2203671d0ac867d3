//! AWS credentials and the sources that resolve them.
//!
//! A [`CredentialSource`] yields a frozen snapshot of credentials. Sources are tried in order by a
//! [`CredentialChain`]; the first usable snapshot wins.

use {
    crate::{
        config::Environment,
        constants::*,
        providers::{ContainerSource, EnvironmentSource, InstanceMetadataSource, ProfileSource, WebIdentitySource},
        ProofError,
    },
    async_trait::async_trait,
    chrono::{DateTime, Duration as ChronoDuration, Utc},
    log::{debug, trace},
    std::{
        fmt::{Debug, Formatter, Result as FmtResult},
        sync::Arc,
    },
    zeroize::{Zeroize, ZeroizeOnDrop},
};

/// AWS credentials used to sign a proof request.
///
/// The secret key and session token are wiped from memory when the credentials are dropped and are never
/// printed by `Debug`.
#[derive(Clone, Eq, PartialEq, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,

    #[zeroize(skip)]
    expiration: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Create a new set of credentials.
    pub fn new<A, S>(access_key_id: A, secret_access_key: S, session_token: Option<String>) -> Self
    where
        A: Into<String>,
        S: Into<String>,
    {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
            expiration: None,
        }
    }

    /// Attach an expiration time (temporary credentials).
    pub fn with_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// The access key id.
    #[inline]
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// The secret access key.
    #[inline]
    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    /// The session token, for temporary credentials.
    #[inline]
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// When these credentials expire, if they are temporary.
    #[inline]
    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }

    /// Whether these credentials are expired, or close enough to it that a proof signed now would not survive
    /// the round trip.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiration {
            Some(expiration) => expiration <= now + ChronoDuration::seconds(CREDENTIAL_EXPIRY_MARGIN_SECS),
            None => false,
        }
    }

    /// Return these credentials if they are still usable at `now`.
    ///
    /// # Errors
    /// Returns [`ProofError::CredentialUnavailable`] if the credentials are expired.
    pub fn ensure_fresh(self, now: DateTime<Utc>) -> Result<Self, ProofError> {
        if self.is_expired_at(now) {
            return Err(ProofError::CredentialUnavailable(format!(
                "credentials for {} expired at {}",
                self.access_key_id,
                self.expiration.map(|e| e.to_rfc3339()).unwrap_or_default()
            )));
        }

        Ok(self)
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// A provider of AWS credentials.
#[async_trait]
pub trait CredentialSource: Debug + Send + Sync {
    /// Resolve a snapshot of the credentials.
    ///
    /// # Errors
    /// Returns [`ProofError::CredentialUnavailable`] if this source has no credentials to offer.
    async fn resolve(&self) -> Result<Credentials, ProofError>;

    /// A short name for this source, used in logs and errors.
    fn name(&self) -> &'static str;
}

/// Credentials fixed at construction.
#[derive(Clone, Debug)]
pub struct StaticSource {
    credentials: Credentials,
}

impl StaticSource {
    /// Create a source that always returns `credentials`.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
        }
    }
}

#[async_trait]
impl CredentialSource for StaticSource {
    async fn resolve(&self) -> Result<Credentials, ProofError> {
        Ok(self.credentials.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// An ordered list of credential sources; the first that yields unexpired credentials wins.
#[derive(Clone, Debug)]
pub struct CredentialChain {
    sources: Vec<Arc<dyn CredentialSource>>,
}

impl CredentialChain {
    /// Create a chain from the given sources, tried in order.
    pub fn new(sources: Vec<Arc<dyn CredentialSource>>) -> Self {
        Self {
            sources,
        }
    }

    /// The conventional chain over the process environment: environment variables, the shared config and
    /// credentials files, web identity federation, the container credentials endpoint, then the instance
    /// metadata service.
    pub fn default_chain() -> Self {
        Self::default_chain_with(Environment::process())
    }

    /// The conventional chain over the given environment.
    pub fn default_chain_with(env: Environment) -> Self {
        Self::new(vec![
            Arc::new(EnvironmentSource::with_environment(env.clone())),
            Arc::new(ProfileSource::with_environment(env.clone())),
            Arc::new(WebIdentitySource::with_environment(env.clone())),
            Arc::new(ContainerSource::with_environment(env.clone())),
            Arc::new(InstanceMetadataSource::with_environment(env)),
        ])
    }

    /// Append a source to the end of the chain.
    pub fn push<S: CredentialSource + 'static>(&mut self, source: S) {
        self.sources.push(Arc::new(source));
    }
}

#[async_trait]
impl CredentialSource for CredentialChain {
    async fn resolve(&self) -> Result<Credentials, ProofError> {
        let mut failures = Vec::with_capacity(self.sources.len());

        for source in self.sources.iter() {
            match source.resolve().await.and_then(|c| c.ensure_fresh(Utc::now())) {
                Ok(credentials) => {
                    debug!("Resolved credentials for {} from {}", credentials.access_key_id(), source.name());
                    return Ok(credentials);
                }
                Err(e) => {
                    trace!("Credential source {} failed: {}", source.name(), e);
                    failures.push(format!("{}: {}", source.name(), e));
                }
            }
        }

        if failures.is_empty() {
            return Err(ProofError::CredentialUnavailable("no credential sources configured".to_string()));
        }

        Err(ProofError::CredentialUnavailable(failures.join("; ")))
    }

    fn name(&self) -> &'static str {
        "chain"
    }
}

#[cfg(test)]
mod tests {
    use {super::*, chrono::TimeZone};

    fn creds() -> Credentials {
        Credentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY", Some("token".to_string()))
    }

    #[derive(Debug)]
    struct FailingSource;

    #[async_trait]
    impl CredentialSource for FailingSource {
        async fn resolve(&self) -> Result<Credentials, ProofError> {
            Err(ProofError::CredentialUnavailable("nothing here".to_string()))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[test_log::test]
    fn test_debug_is_redacted() {
        let debug = format!("{:?}", creds());
        assert!(debug.contains("AKIDEXAMPLE"));
        assert!(!debug.contains("wJalr"));
        assert!(!debug.contains("\"token\""));
        assert!(debug.contains("<redacted>"));
    }

    #[test_log::test]
    fn test_expiry_margin() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert!(!creds().is_expired_at(now));

        let c = creds().with_expiration(now + ChronoDuration::seconds(30));
        assert!(c.is_expired_at(now));
        let e = c.ensure_fresh(now).unwrap_err();
        assert_eq!(e.error_code(), "CredentialUnavailable");

        let c = creds().with_expiration(now + ChronoDuration::minutes(15));
        assert!(!c.is_expired_at(now));
        assert_eq!(c.clone().ensure_fresh(now).unwrap(), c);
        assert_eq!(c.expiration(), Some(now + ChronoDuration::minutes(15)));
    }

    #[test_log::test(tokio::test)]
    async fn test_chain_fallback() {
        let mut chain = CredentialChain::new(vec![Arc::new(FailingSource)]);
        chain.push(StaticSource::new(creds()));
        let c = chain.resolve().await.unwrap();
        assert_eq!(c.access_key_id(), "AKIDEXAMPLE");
        assert_eq!(chain.name(), "chain");
    }

    #[test_log::test(tokio::test)]
    async fn test_chain_skips_expired() {
        let expired = creds().with_expiration(Utc::now() - ChronoDuration::minutes(1));
        let fresh = Credentials::new("AKIDFRESH", "secret", None);
        let chain =
            CredentialChain::new(vec![Arc::new(StaticSource::new(expired)), Arc::new(StaticSource::new(fresh))]);
        assert_eq!(chain.resolve().await.unwrap().access_key_id(), "AKIDFRESH");
    }

    #[test_log::test(tokio::test)]
    async fn test_chain_aggregates_errors() {
        let chain = CredentialChain::new(vec![Arc::new(FailingSource), Arc::new(FailingSource)]);
        let e = chain.resolve().await.unwrap_err();
        assert_eq!(
            e.to_string(),
            concat!(
                "Credentials unavailable: failing: Credentials unavailable: nothing here; ",
                "failing: Credentials unavailable: nothing here"
            )
        );

        let e = CredentialChain::new(vec![]).resolve().await.unwrap_err();
        assert_eq!(e.to_string(), "Credentials unavailable: no credential sources configured");
    }

    #[test_log::test(tokio::test)]
    async fn test_default_chain_without_anything() {
        let env = Environment::from_map([("AWS_EC2_METADATA_DISABLED", "true")]);
        let e = CredentialChain::default_chain_with(env).resolve().await.unwrap_err();
        let message = e.to_string();
        assert!(message.contains("environment: "), "{}", message);
        assert!(message.contains("profile: "), "{}", message);
        assert!(message.contains("web-identity: "), "{}", message);
        assert!(message.contains("container: "), "{}", message);
        assert!(message.contains("instance-metadata: "), "{}", message);
    }
}
