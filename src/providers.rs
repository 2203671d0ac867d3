//! Credential sources backed by the AWS SDK's credential providers.
//!
//! Each source wraps one `aws-config` provider and turns what it yields into [`Credentials`]. The providers
//! read the [`Environment`] they are built with, so a fixed map can stand in for the process environment.
//! Profile handling (assume-role chains, `credential_process`, SSO), web identity federation and the
//! metadata endpoint rules all come from the SDK.

use {
    crate::{
        config::Environment,
        constants::*,
        credentials::{CredentialSource, Credentials},
        ProofError,
    },
    async_trait::async_trait,
    aws_config::{
        ecs::EcsCredentialsProvider, environment::EnvironmentVariableCredentialsProvider,
        imds::credentials::ImdsCredentialsProvider, profile::ProfileFileCredentialsProvider,
        provider_config::ProviderConfig, web_identity_token::WebIdentityTokenCredentialsProvider,
    },
    aws_credential_types::provider::{error::CredentialsError, ProvideCredentials},
    aws_types::region::Region as SdkRegion,
    chrono::{DateTime, Utc},
    log::trace,
    std::{
        error::Error,
        fmt::{Debug, Formatter, Result as FmtResult},
        path::PathBuf,
    },
};

/// The SDK providers hold the environment they read, secrets included, so only the source name is printed.
macro_rules! opaque_debug {
    ($ty:ident) => {
        impl Debug for $ty {
            fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
                f.write_str(stringify!($ty))
            }
        }
    };
}

impl From<aws_credential_types::Credentials> for Credentials {
    fn from(sdk: aws_credential_types::Credentials) -> Self {
        let credentials = Credentials::new(
            sdk.access_key_id(),
            sdk.secret_access_key(),
            sdk.session_token().map(str::to_string),
        );

        match sdk.expiry() {
            Some(expiry) => credentials.with_expiration(DateTime::<Utc>::from(expiry)),
            None => credentials,
        }
    }
}

/// Provider configuration reading from `env`, with the region the SDK needs for STS-backed providers.
fn provider_config(env: &Environment) -> ProviderConfig {
    let region = env.get(ENV_AWS_REGION).or_else(|| env.get(ENV_AWS_DEFAULT_REGION)).map(SdkRegion::new);
    ProviderConfig::without_region().with_env(env.to_sdk_env()).with_region(region)
}

/// Flatten a provider error and its causes into one line.
fn unavailable(err: CredentialsError) -> ProofError {
    let mut message = err.to_string();
    let mut cause = err.source();
    while let Some(e) = cause {
        message.push_str(": ");
        message.push_str(&e.to_string());
        cause = e.source();
    }

    ProofError::CredentialUnavailable(message)
}

async fn provide<P>(name: &str, provider: &P) -> Result<Credentials, ProofError>
where
    P: ProvideCredentials,
{
    match provider.provide_credentials().await {
        Ok(sdk) => {
            trace!("Credential provider {} yielded {}", name, sdk.access_key_id());
            Ok(sdk.into())
        }
        Err(e) => Err(unavailable(e)),
    }
}

/// Credentials from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and `AWS_SESSION_TOKEN`.
pub struct EnvironmentSource {
    provider: EnvironmentVariableCredentialsProvider,
}

impl EnvironmentSource {
    /// Read from the process environment.
    pub fn new() -> Self {
        Self::with_environment(Environment::process())
    }

    /// Read from the given environment.
    pub fn with_environment(env: Environment) -> Self {
        Self {
            provider: EnvironmentVariableCredentialsProvider::new_with_env(env.to_sdk_env()),
        }
    }
}

opaque_debug!(EnvironmentSource);

impl Default for EnvironmentSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialSource for EnvironmentSource {
    async fn resolve(&self) -> Result<Credentials, ProofError> {
        provide(self.name(), &self.provider).await
    }

    fn name(&self) -> &'static str {
        "environment"
    }
}

/// Credentials from the shared config and credentials files.
///
/// The files are `AWS_CONFIG_FILE` and `AWS_SHARED_CREDENTIALS_FILE` if set, otherwise `~/.aws/config` and
/// `~/.aws/credentials`; the profile is `AWS_PROFILE` if set, otherwise `default`. Static keys,
/// `role_arn`/`source_profile` chains, `credential_process` and SSO profiles are all resolved.
#[derive(Clone, Debug, Default)]
pub struct ProfileSource {
    env: Environment,
}

impl ProfileSource {
    /// Read the files and profile named by the process environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the files and profile named by the given environment.
    pub fn with_environment(env: Environment) -> Self {
        Self {
            env,
        }
    }

    /// Read a specific shared credentials file.
    pub fn path<P: Into<PathBuf>>(self, path: P) -> Self {
        let path = path.into();
        Self {
            env: self.env.with_var(ENV_AWS_SHARED_CREDENTIALS_FILE, path.to_string_lossy()),
        }
    }

    /// Use a specific profile.
    pub fn profile<S: Into<String>>(self, profile: S) -> Self {
        Self {
            env: self.env.with_var(ENV_AWS_PROFILE, profile),
        }
    }
}

#[async_trait]
impl CredentialSource for ProfileSource {
    async fn resolve(&self) -> Result<Credentials, ProofError> {
        let provider = ProfileFileCredentialsProvider::builder().configure(&provider_config(&self.env)).build();
        provide(self.name(), &provider).await
    }

    fn name(&self) -> &'static str {
        "profile"
    }
}

/// Credentials from an OIDC web identity token exchanged through STS `AssumeRoleWithWebIdentity`.
///
/// Configured by `AWS_WEB_IDENTITY_TOKEN_FILE`, `AWS_ROLE_ARN` and the optional `AWS_ROLE_SESSION_NAME`, as
/// set by EKS service-account roles.
pub struct WebIdentitySource {
    provider: WebIdentityTokenCredentialsProvider,
}

impl WebIdentitySource {
    /// Read the token configuration from the process environment.
    pub fn new() -> Self {
        Self::with_environment(Environment::process())
    }

    /// Read the token configuration from the given environment.
    pub fn with_environment(env: Environment) -> Self {
        Self {
            provider: WebIdentityTokenCredentialsProvider::builder().configure(&provider_config(&env)).build(),
        }
    }
}

opaque_debug!(WebIdentitySource);

impl Default for WebIdentitySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialSource for WebIdentitySource {
    async fn resolve(&self) -> Result<Credentials, ProofError> {
        provide(self.name(), &self.provider).await
    }

    fn name(&self) -> &'static str {
        "web-identity"
    }
}

/// ECS/EKS container credentials from `AWS_CONTAINER_CREDENTIALS_RELATIVE_URI` or
/// `AWS_CONTAINER_CREDENTIALS_FULL_URI`.
///
/// A full URI must use https or point at a loopback or container-agent address before the
/// `AWS_CONTAINER_AUTHORIZATION_TOKEN` is sent to it.
pub struct ContainerSource {
    provider: EcsCredentialsProvider,
}

impl ContainerSource {
    /// Read the endpoint from the process environment.
    pub fn new() -> Self {
        Self::with_environment(Environment::process())
    }

    /// Read the endpoint from the given environment.
    pub fn with_environment(env: Environment) -> Self {
        Self {
            provider: EcsCredentialsProvider::builder().configure(&provider_config(&env)).build(),
        }
    }
}

opaque_debug!(ContainerSource);

impl Default for ContainerSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialSource for ContainerSource {
    async fn resolve(&self) -> Result<Credentials, ProofError> {
        provide(self.name(), &self.provider).await
    }

    fn name(&self) -> &'static str {
        "container"
    }
}

/// EC2 instance role credentials from the instance metadata service.
///
/// Disabled when `AWS_EC2_METADATA_DISABLED` is `true`. The endpoint can be moved with
/// `AWS_EC2_METADATA_SERVICE_ENDPOINT` or [`InstanceMetadataSource::with_endpoint`].
pub struct InstanceMetadataSource {
    env: Environment,
    provider: ImdsCredentialsProvider,
}

impl InstanceMetadataSource {
    /// Use the process environment.
    pub fn new() -> Self {
        Self::with_environment(Environment::process())
    }

    /// Use the given environment.
    pub fn with_environment(env: Environment) -> Self {
        let provider = ImdsCredentialsProvider::builder().configure(&provider_config(&env)).build();
        Self {
            env,
            provider,
        }
    }

    /// Talk to a different metadata endpoint.
    pub fn with_endpoint<S: Into<String>>(self, endpoint: S) -> Self {
        Self::with_environment(self.env.with_var(ENV_AWS_EC2_METADATA_SERVICE_ENDPOINT, endpoint))
    }
}

opaque_debug!(InstanceMetadataSource);

impl Default for InstanceMetadataSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialSource for InstanceMetadataSource {
    async fn resolve(&self) -> Result<Credentials, ProofError> {
        provide(self.name(), &self.provider).await
    }

    fn name(&self) -> &'static str {
        "instance-metadata"
    }
}
