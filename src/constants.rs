//! Common constants used throughout the crate.
//!
//! Every protocol string lives here so the client and the verifying side agree on them. If a value
//! is spelled incorrectly, at least it can be fixed in one spot.
//!
//! Tests that are testing the content of an error code or message should not use these constants;
//! they should use hard-coded strings so the tests are also testing for misspellings.
//!
//! Please keep this file organized alphabetically. (This can be a bit hard with comments, etc.)

/// The only action a proof request may carry.
pub(crate) const ACTION_GET_CALLER_IDENTITY: &str = "GetCallerIdentity";

/// Content-Type string for HTML forms
pub(crate) const APPLICATION_X_WWW_FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Algorithm for AWS SigV4
pub(crate) const AWS4_HMAC_SHA256: &str = "AWS4-HMAC-SHA256";

/// String included at the end of the AWS SigV4 credential scope
pub(crate) const AWS4_REQUEST: &str = "aws4_request";

/// Margin before a credential's expiration at which it is no longer handed out.
pub(crate) const CREDENTIAL_EXPIRY_MARGIN_SECS: i64 = 60;

/// Default region when none is configured.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default store request timeout in seconds.
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default user agent for outbound requests.
pub(crate) const DEFAULT_USER_AGENT: &str = concat!("scratchstack-identity-proof/", env!("CARGO_PKG_VERSION"));

/// Default validity of a proof token in seconds.
pub(crate) const DEFAULT_VALIDITY_SECS: i64 = 300;

/// DNS suffix of the standard AWS partition.
pub(crate) const DNS_SUFFIX_AWS: &str = "amazonaws.com";

/// DNS suffix of the AWS China partition.
pub(crate) const DNS_SUFFIX_AWS_CN: &str = "amazonaws.com.cn";

/// Environment variable: region.
pub(crate) const ENV_AWS_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";

/// Environment variable: moves the instance metadata service endpoint.
pub(crate) const ENV_AWS_EC2_METADATA_SERVICE_ENDPOINT: &str = "AWS_EC2_METADATA_SERVICE_ENDPOINT";

/// Environment variable: profile name.
pub(crate) const ENV_AWS_PROFILE: &str = "AWS_PROFILE";

/// Environment variable: region, preferred over `AWS_DEFAULT_REGION` by the SDK providers.
pub(crate) const ENV_AWS_REGION: &str = "AWS_REGION";

/// Environment variable: shared credentials file.
pub(crate) const ENV_AWS_SHARED_CREDENTIALS_FILE: &str = "AWS_SHARED_CREDENTIALS_FILE";

/// Environment variable: base URL of the secret store.
pub(crate) const ENV_MACAROON_STORAGE_URL: &str = "MACAROON_STORAGE_URL";

/// Environment variable: store request timeout in seconds.
pub(crate) const ENV_TIMEOUT: &str = "TIMEOUT";

/// Error code: AuthDenied
pub(crate) const ERR_CODE_AUTH_DENIED: &str = "AuthDenied";

/// Error code: CredentialUnavailable
pub(crate) const ERR_CODE_CREDENTIAL_UNAVAILABLE: &str = "CredentialUnavailable";

/// Error code: InvalidConfiguration
pub(crate) const ERR_CODE_INVALID_CONFIGURATION: &str = "InvalidConfiguration";

/// Error code: InvalidRegion
pub(crate) const ERR_CODE_INVALID_REGION: &str = "InvalidRegion";

/// Error code: InvalidResourcePath
pub(crate) const ERR_CODE_INVALID_RESOURCE_PATH: &str = "InvalidResourcePath";

/// Error code: InvalidResponse
pub(crate) const ERR_CODE_INVALID_RESPONSE: &str = "InvalidResponse";

/// Error code: MalformedSignedRequest
pub(crate) const ERR_CODE_MALFORMED_SIGNED_REQUEST: &str = "MalformedSignedRequest";

/// Error code: NotFound
pub(crate) const ERR_CODE_NOT_FOUND: &str = "NotFound";

/// Error code: SigningError
pub(crate) const ERR_CODE_SIGNING_ERROR: &str = "SigningError";

/// Error code: Unreachable
pub(crate) const ERR_CODE_UNREACHABLE: &str = "Unreachable";

/// Header for `content-type`
pub(crate) const HDR_CONTENT_TYPE: &str = "content-type";

/// Header for `host`
pub(crate) const HDR_HOST: &str = "host";

/// Header carrying the proof token to the secret store.
pub const HDR_PRESIGNED_GET_CALLER_IDENTITY: &str = "x-amazon-presigned-getcalleridentity";

/// Compact ISO8601 format used for the string to sign.
pub(crate) const ISO8601_COMPACT_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Short date format
pub(crate) const ISO8601_DATE_FORMAT: &str = "%Y%m%d";

/// Longest validity SigV4 allows for a presigned request, in seconds.
pub(crate) const MAX_EXPIRES_SECS: i64 = 604_800;

/// Query parameter for the action
pub(crate) const QP_ACTION: &str = "Action";

/// Query parameter that must never appear in a token.
pub(crate) const QP_REDIRECT: &str = "Redirect";

/// Query parameter for the API version
pub(crate) const QP_VERSION: &str = "Version";

/// Query parameter for the signature algorithm
pub(crate) const QP_X_AMZ_ALGORITHM: &str = "X-Amz-Algorithm";

/// Query parameter for delivering the access key
pub(crate) const QP_X_AMZ_CREDENTIAL: &str = "X-Amz-Credential";

/// Query parameter for delivering the date
pub(crate) const QP_X_AMZ_DATE: &str = "X-Amz-Date";

/// Query parameter for delivering the expiration time of a presigned URL
pub(crate) const QP_X_AMZ_EXPIRES: &str = "X-Amz-Expires";

/// Query parameter for delivering the session token
pub(crate) const QP_X_AMZ_SECURITY_TOKEN: &str = "X-Amz-Security-Token";

/// Query parameter for delivering the signature
pub(crate) const QP_X_AMZ_SIGNATURE: &str = "X-Amz-Signature";

/// Query parameter specifying the signed headers
pub(crate) const QP_X_AMZ_SIGNED_HEADERS: &str = "X-Amz-SignedHeaders";

/// Service name used in the credential scope.
pub(crate) const SERVICE_STS: &str = "sts";

/// SHA-256 of an empty string.
pub(crate) const SHA256_EMPTY: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// The length of a SHA-256 digest in bytes.
pub(crate) const SHA256_OUTPUT_LEN: usize = 32;

/// Path prefix of the secret retrieval route.
pub(crate) const STORE_GET_PATH: &str = "get";

/// The STS API version the proof request is pinned to.
pub(crate) const STS_API_VERSION: &str = "2011-06-15";

/// How long a verified identity is reused for the same token, in seconds.
pub(crate) const VERIFY_CACHE_TTL_SECS: u64 = 120;

/// First backoff delay when retrying an STS round trip, in milliseconds.
pub(crate) const VERIFY_RETRY_INITIAL_DELAY_MS: u64 = 100;

/// Total backoff allowed across retries of one STS round trip, in milliseconds.
pub(crate) const VERIFY_RETRY_BUDGET_MS: u64 = 3_000;
