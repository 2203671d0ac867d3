//! AWS SigV4 query presigning of a proof request.

use {
    crate::{
        canonical::CanonicalRequest,
        constants::*,
        credentials::Credentials,
        request::ProofRequest,
        signing_key::KSecretKey,
        token::{CredentialScope, SignatureBlock, SignedProofRequest},
        ProofError,
    },
    log::{debug, trace},
    std::time::Duration,
};

/// The validity used when none is configured: five minutes.
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(DEFAULT_VALIDITY_SECS as u64);

/// Presign a proof request with the given credentials.
///
/// The signature covers the method, path, `Action` and `Version` parameters, the `content-type` and `host`
/// headers, and the hash of the empty body, scoped to `YYYYMMDD/{region}/sts/aws4_request`. Signing is
/// deterministic: the same request, credentials and expiry always produce the same signature.
///
/// # Errors
/// Returns [`ProofError::SigningError`] if the access key id or secret access key is empty, the access key id
/// contains `/`, or the expiry is not between one second and seven days.
pub fn sign(
    request: ProofRequest,
    credentials: &Credentials,
    expiry: Duration,
) -> Result<SignedProofRequest, ProofError> {
    let access_key_id = credentials.access_key_id();
    if access_key_id.is_empty() {
        return Err(ProofError::SigningError("access key id is empty".to_string()));
    }

    if access_key_id.contains('/') {
        return Err(ProofError::SigningError("access key id contains '/'".to_string()));
    }

    if credentials.secret_access_key().is_empty() {
        return Err(ProofError::SigningError("secret access key is empty".to_string()));
    }

    let expires = expiry.as_secs();
    if expires < 1 || expires > MAX_EXPIRES_SECS as u64 {
        return Err(ProofError::SigningError(format!(
            "expiry must be between 1 and {} seconds, got {}",
            MAX_EXPIRES_SECS, expires
        )));
    }

    let timestamp = request.timestamp();
    let date = timestamp.date_naive();
    let amz_date = timestamp.format(ISO8601_COMPACT_FORMAT).to_string();
    let scope = CredentialScope::new(date, request.region().as_str(), SERVICE_STS);
    let credential = format!("{}/{}", access_key_id, scope);
    let expires_str = expires.to_string();
    let signed_headers = request.headers().iter().map(|(name, _)| *name).collect::<Vec<_>>().join(";");

    let canonical = {
        let mut presign: Vec<(&str, &str)> = vec![
            (QP_X_AMZ_ALGORITHM, AWS4_HMAC_SHA256),
            (QP_X_AMZ_CREDENTIAL, &credential),
            (QP_X_AMZ_DATE, &amz_date),
            (QP_X_AMZ_EXPIRES, &expires_str),
        ];

        if let Some(token) = credentials.session_token() {
            presign.push((QP_X_AMZ_SECURITY_TOKEN, token));
        }

        presign.push((QP_X_AMZ_SIGNED_HEADERS, &signed_headers));
        CanonicalRequest::from_proof_request(&request, &presign)
    };

    let string_to_sign =
        format!("{}\n{}\n{}\n{}", AWS4_HMAC_SHA256, amz_date, scope, hex::encode(canonical.canonical_request_sha256()));
    trace!("String to sign:\n{}", string_to_sign);

    let signing_key = KSecretKey::new(credentials.secret_access_key()).to_ksigning(date, scope.region(), SERVICE_STS);
    let signature = signing_key.sign(string_to_sign.as_bytes());

    debug!("Signed proof request for {} in {} valid for {}s", access_key_id, scope.region(), expires);

    Ok(SignedProofRequest {
        prefix: request.fixed_prefix(),
        block: SignatureBlock {
            access_key_id: access_key_id.to_string(),
            scope,
            timestamp,
            expires,
            security_token: credentials.session_token().map(str::to_string),
            signed_headers,
            signature,
        },
    })
}
