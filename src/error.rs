use {
    crate::constants::*,
    http::status::StatusCode,
    scratchstack_errors::ServiceError,
    std::{
        error::Error,
        fmt::{Display, Formatter, Result as FmtResult},
    },
};

/// The pipeline stage in which an error arose.
///
/// A proof exchange runs `Unresolved → CredentialsReady → RequestBuilt → Signed → TokenExtracted → Sent`
/// and ends in a secret or an error; this names the transition that failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    /// Reading configuration before the pipeline starts.
    Configuration,

    /// Resolving ambient credentials.
    CredentialResolution,

    /// Building the fixed proof request.
    RequestBuild,

    /// Signing the proof request.
    Signing,

    /// Turning the signed request into a token (or parsing a received token).
    TokenExtraction,

    /// Talking to the secret store or to STS.
    Exchange,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        f.write_str(match self {
            Self::Configuration => "configuration",
            Self::CredentialResolution => "credential resolution",
            Self::RequestBuild => "request build",
            Self::Signing => "signing",
            Self::TokenExtraction => "token extraction",
            Self::Exchange => "exchange",
        })
    }
}

/// Error returned when an identity proof cannot be produced, delivered, or verified.
#[derive(Debug)]
#[non_exhaustive]
pub enum ProofError {
    /// No credential source yielded a usable, unexpired credential set.
    CredentialUnavailable(/* message */ String),

    /// The region name is not a valid AWS region identifier.
    InvalidRegion(/* message */ String),

    /// The credentials or the requested expiry cannot be used to sign a proof request.
    SigningError(/* message */ String),

    /// The signed request does not match the expected fixed prefix, or a received token is not a well-formed
    /// signature block.
    MalformedSignedRequest(/* message */ String),

    /// The resource path contains characters that cannot appear in a store route.
    InvalidResourcePath(/* message */ String),

    /// A configuration value is missing or unparseable.
    InvalidConfiguration(/* message */ String),

    /// The remote side could not be reached in time, or answered with a status that says nothing about the
    /// identity (5xx, unexpected codes).
    Unreachable(Box<dyn Error + Send + Sync>),

    /// The identity proof was rejected.
    AuthDenied(/* message */ String),

    /// The identity is valid but nothing is stored at the requested path.
    NotFound(/* message */ String),

    /// The remote side answered with a body that cannot be decoded.
    InvalidResponse(/* message */ String),
}

impl ProofError {
    /// The stable error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::CredentialUnavailable(_) => ERR_CODE_CREDENTIAL_UNAVAILABLE,
            Self::InvalidRegion(_) => ERR_CODE_INVALID_REGION,
            Self::SigningError(_) => ERR_CODE_SIGNING_ERROR,
            Self::MalformedSignedRequest(_) => ERR_CODE_MALFORMED_SIGNED_REQUEST,
            Self::InvalidResourcePath(_) => ERR_CODE_INVALID_RESOURCE_PATH,
            Self::InvalidConfiguration(_) => ERR_CODE_INVALID_CONFIGURATION,
            Self::Unreachable(_) => ERR_CODE_UNREACHABLE,
            Self::AuthDenied(_) => ERR_CODE_AUTH_DENIED,
            Self::NotFound(_) => ERR_CODE_NOT_FOUND,
            Self::InvalidResponse(_) => ERR_CODE_INVALID_RESPONSE,
        }
    }

    /// The HTTP status a relying party should answer with when this error ends a verification.
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::MalformedSignedRequest(_) | Self::InvalidResourcePath(_) => StatusCode::BAD_REQUEST,
            Self::AuthDenied(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unreachable(_) | Self::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The pipeline stage that produced this error.
    pub fn stage(&self) -> Stage {
        match self {
            Self::InvalidConfiguration(_) | Self::InvalidResourcePath(_) => Stage::Configuration,
            Self::CredentialUnavailable(_) => Stage::CredentialResolution,
            Self::InvalidRegion(_) => Stage::RequestBuild,
            Self::SigningError(_) => Stage::Signing,
            Self::MalformedSignedRequest(_) => Stage::TokenExtraction,
            Self::Unreachable(_) | Self::AuthDenied(_) | Self::NotFound(_) | Self::InvalidResponse(_) => {
                Stage::Exchange
            }
        }
    }

    /// Whether another attempt (with a freshly signed token) might succeed.
    ///
    /// Only transport failures qualify; a denial will be repeated for the same identity.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }

    pub(crate) fn unreachable<S: Into<String>>(message: S) -> Self {
        let message: String = message.into();
        Self::Unreachable(message.into())
    }
}

impl ServiceError for ProofError {
    fn error_code(&self) -> &'static str {
        ProofError::error_code(self)
    }

    fn http_status(&self) -> StatusCode {
        ProofError::http_status(self)
    }
}

impl Display for ProofError {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::CredentialUnavailable(msg) => write!(f, "Credentials unavailable: {}", msg),
            Self::InvalidRegion(msg) => write!(f, "Invalid region: {}", msg),
            Self::SigningError(msg) => write!(f, "Unable to sign proof request: {}", msg),
            Self::MalformedSignedRequest(msg) => write!(f, "Malformed signed request: {}", msg),
            Self::InvalidResourcePath(msg) => write!(f, "Invalid resource path: {}", msg),
            Self::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
            Self::Unreachable(ref e) => write!(f, "Remote unreachable: {}", e),
            Self::AuthDenied(msg) => write!(f, "Authentication denied: {}", msg),
            Self::NotFound(msg) => write!(f, "Not found: {}", msg),
            Self::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
        }
    }
}

impl Error for ProofError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Unreachable(ref e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProofError {
    fn from(e: reqwest::Error) -> ProofError {
        ProofError::Unreachable(Box::new(e))
    }
}
