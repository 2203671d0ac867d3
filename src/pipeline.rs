//! The client entry point: resolve credentials, build and sign the proof request, extract the token, and
//! present it to the secret store.

use {
    crate::{
        config::{ClientConfig, Environment},
        credentials::{CredentialChain, CredentialSource},
        request::ProofRequest,
        signer::sign,
        store::{ResourcePath, Secret, SecretStoreClient},
        token::{extract, FixedPrefix, ProofToken},
        ProofError,
    },
    chrono::{DateTime, Utc},
    log::{debug, trace},
    std::sync::Arc,
};

/// Fetches secrets from the store by proving the caller's AWS identity.
///
/// Each call runs the whole exchange from scratch: credentials are resolved, used to sign one proof request,
/// and dropped before anything is sent. Nothing is cached between calls, so a `ProofClient` can be cloned or
/// shared across tasks freely.
#[derive(Clone, Debug)]
pub struct ProofClient {
    config: ClientConfig,
    source: Arc<dyn CredentialSource>,
    store: SecretStoreClient,
}

impl ProofClient {
    /// Create a client with the given configuration and credential source.
    ///
    /// # Errors
    /// Returns [`ProofError::InvalidConfiguration`] if the HTTP client cannot be created.
    pub fn new<S: CredentialSource + 'static>(config: ClientConfig, source: S) -> Result<Self, ProofError> {
        Self::with_source(config, Arc::new(source))
    }

    /// Create a client with a shared credential source.
    ///
    /// # Errors
    /// Returns [`ProofError::InvalidConfiguration`] if the HTTP client cannot be created.
    pub fn with_source(config: ClientConfig, source: Arc<dyn CredentialSource>) -> Result<Self, ProofError> {
        let store = SecretStoreClient::from_config(&config)?;
        Ok(Self {
            config,
            source,
            store,
        })
    }

    /// Create a client from the process environment, using the default credential chain.
    ///
    /// # Errors
    /// See [`ClientConfig::from_env`].
    pub fn from_env() -> Result<Self, ProofError> {
        Self::from_environment(Environment::process())
    }

    /// Create a client from the given environment, using the default credential chain over it.
    ///
    /// # Errors
    /// See [`ClientConfig::from_env`].
    pub fn from_environment(env: Environment) -> Result<Self, ProofError> {
        let config = ClientConfig::from_env(&env)?;
        Self::new(config, CredentialChain::default_chain_with(env))
    }

    /// The configuration this client was created with.
    #[inline]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The secret store client.
    #[inline]
    pub fn store(&self) -> &SecretStoreClient {
        &self.store
    }

    /// Produce a fresh proof token signed now.
    ///
    /// # Errors
    /// * [`ProofError::CredentialUnavailable`] if no usable credentials can be resolved.
    /// * [`ProofError::SigningError`] if the credentials or configured expiry cannot be used to sign.
    pub async fn issue_token(&self) -> Result<ProofToken, ProofError> {
        self.issue_token_at(Utc::now()).await
    }

    /// Produce a fresh proof token signed at `now`.
    ///
    /// # Errors
    /// See [`issue_token`](Self::issue_token).
    pub async fn issue_token_at(&self, now: DateTime<Utc>) -> Result<ProofToken, ProofError> {
        let credentials = self.source.resolve().await?.ensure_fresh(now)?;
        trace!("Credentials ready from {}", self.source.name());

        let request = ProofRequest::for_region(self.config.region().clone(), now);
        trace!("Proof request built for {}", request.host());

        let signed = sign(request, &credentials, self.config.expiry())?;
        drop(credentials);

        let token = extract(&signed, &FixedPrefix::for_region(self.config.region()))?;
        debug!("Issued proof token for {} expiring at {}", token.block().access_key_id(), token.expires_at());
        Ok(token)
    }

    /// Prove the caller's identity to the store and fetch the secret at `path`.
    ///
    /// # Errors
    /// Any error from [`issue_token`](Self::issue_token) or [`SecretStoreClient::fetch`]; use
    /// [`ProofError::stage`] to tell where the exchange stopped.
    pub async fn fetch(&self, path: &ResourcePath) -> Result<Secret, ProofError> {
        let token = self.issue_token().await?;
        self.store.fetch(&token, path).await
    }
}
