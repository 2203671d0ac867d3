//! Client configuration and environment access.
//!
//! The environment is only read at the edge: [`ClientConfig::from_env`] and the credential sources take an
//! [`Environment`], which tests replace with a fixed map.

use {
    crate::{constants::*, request::Region, ProofError},
    aws_types::os_shim_internal::Env,
    derive_builder::Builder,
    log::debug,
    reqwest::Url,
    std::{
        collections::HashMap,
        fmt::{Debug, Formatter, Result as FmtResult},
        sync::Arc,
        time::Duration,
    },
};

/// A source of environment variables.
///
/// Empty values are treated as unset.
#[derive(Clone, Default)]
pub struct Environment {
    vars: Option<Arc<HashMap<String, String>>>,
}

impl Environment {
    /// The process environment.
    pub fn process() -> Self {
        Self::default()
    }

    /// A fixed set of variables.
    pub fn from_map<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: Some(Arc::new(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect())),
        }
    }

    /// Look up a variable.
    pub fn get(&self, name: &str) -> Option<String> {
        let value = match &self.vars {
            None => std::env::var(name).ok(),
            Some(vars) => vars.get(name).cloned(),
        };
        value.filter(|value| !value.is_empty())
    }

    /// A copy of this environment with one variable replaced. The process environment is snapshotted first.
    pub fn with_var<K: Into<String>, V: Into<String>>(self, name: K, value: V) -> Self {
        let mut vars = match self.vars {
            None => std::env::vars().collect(),
            Some(vars) => (*vars).clone(),
        };
        vars.insert(name.into(), value.into());
        Self {
            vars: Some(Arc::new(vars)),
        }
    }

    /// The same variables in the form the AWS SDK providers read.
    pub(crate) fn to_sdk_env(&self) -> Env {
        match &self.vars {
            None => Env::real(),
            Some(vars) => Env::from((**vars).clone()),
        }
    }
}

impl Debug for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("Environment")
    }
}

/// Configuration for a [`ProofClient`][crate::ProofClient].
///
/// ClientConfig structs are immutable. Use [`ClientConfigBuilder`] to programmatically construct one, or
/// [`ClientConfig::from_env`] to read the conventional environment variables.
#[derive(Builder, Clone, Debug, Eq, PartialEq)]
#[builder(build_fn(validate = "Self::validate"))]
#[non_exhaustive]
pub struct ClientConfig {
    /// The region whose STS endpoint the proof is addressed to.
    #[builder(default)]
    region: Region,

    /// Base URL of the secret store, e.g. `https://vault.example.com`.
    #[builder(setter(into))]
    store_url: String,

    /// How long a proof token stays valid.
    #[builder(default = "Duration::from_secs(DEFAULT_VALIDITY_SECS as u64)")]
    expiry: Duration,

    /// Deadline for each request to the secret store.
    #[builder(default = "Duration::from_secs(DEFAULT_TIMEOUT_SECS)")]
    timeout: Duration,

    /// User agent sent with outbound requests.
    #[builder(setter(into), default = "DEFAULT_USER_AGENT.to_string()")]
    user_agent: String,
}

impl ClientConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(store_url) = &self.store_url {
            validate_base_url(store_url)?;
        }

        if let Some(timeout) = &self.timeout {
            if timeout.is_zero() {
                return Err("timeout must be greater than zero".to_string());
            }
        }

        Ok(())
    }
}

impl ClientConfig {
    /// Create a [ClientConfigBuilder] to construct a [ClientConfig].
    #[inline]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Read the configuration from `AWS_DEFAULT_REGION`, `MACAROON_STORAGE_URL` and `TIMEOUT` (seconds).
    ///
    /// # Errors
    /// Returns [`ProofError::InvalidConfiguration`] if the store URL is missing or a value does not parse, or
    /// [`ProofError::InvalidRegion`] if the region is malformed.
    pub fn from_env(env: &Environment) -> Result<Self, ProofError> {
        let mut builder = Self::builder();

        if let Some(region) = env.get(ENV_AWS_DEFAULT_REGION) {
            builder.region(Region::new(&region)?);
        }

        let store_url = env
            .get(ENV_MACAROON_STORAGE_URL)
            .ok_or_else(|| ProofError::InvalidConfiguration(format!("{} is not set", ENV_MACAROON_STORAGE_URL)))?;
        builder.store_url(store_url);

        if let Some(timeout) = env.get(ENV_TIMEOUT) {
            let secs: u64 = timeout.trim().parse().map_err(|_| {
                ProofError::InvalidConfiguration(format!("{} is not a number of seconds: {:?}", ENV_TIMEOUT, timeout))
            })?;
            builder.timeout(Duration::from_secs(secs));
        }

        let config = builder.build().map_err(|e| ProofError::InvalidConfiguration(e.to_string()))?;
        debug!("Configuration from environment: region={} store_url={}", config.region, config.store_url);
        Ok(config)
    }

    /// The region whose STS endpoint the proof is addressed to.
    #[inline]
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Base URL of the secret store, without a trailing slash.
    #[inline]
    pub fn store_url(&self) -> &str {
        self.store_url.trim_end_matches('/')
    }

    /// How long a proof token stays valid.
    #[inline]
    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Deadline for each request to the secret store.
    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// User agent sent with outbound requests.
    #[inline]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

/// Check that a base URL is an absolute `http` or `https` URL without a query or fragment.
pub(crate) fn validate_base_url(url: &str) -> Result<(), String> {
    let parsed = Url::parse(url).map_err(|e| format!("invalid URL {:?}: {}", url, e))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(format!("URL must use http or https: {:?}", url));
    }

    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(format!("URL must not have a query or fragment: {:?}", url));
    }

    Ok(())
}
