mod common;

use {
    common::{refused_url, MockResponse, MockServer},
    scratchstack_identity_proof::{
        extract, sign, CallerIdentity, Credentials, FixedPrefix, IdentityVerifier, ProofError, ProofRequest,
        ProofToken, Region, DEFAULT_EXPIRY,
    },
    std::time::Duration,
};

const IDENTITY_XML: &str = r#"<GetCallerIdentityResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <GetCallerIdentityResult>
    <Arn>arn:aws:sts::123456789012:assumed-role/node-role/i-0123456789abcdef0</Arn>
    <UserId>AROAEXAMPLEID:i-0123456789abcdef0</UserId>
    <Account>123456789012</Account>
  </GetCallerIdentityResult>
  <ResponseMetadata>
    <RequestId>c6104cbe-af31-11e0-8154-cbc7ccf896c7</RequestId>
  </ResponseMetadata>
</GetCallerIdentityResponse>
"#;

const DENIED_XML: &str = r#"<ErrorResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <Error>
    <Type>Sender</Type>
    <Code>SignatureDoesNotMatch</Code>
    <Message>The request signature we calculated does not match the signature you provided.</Message>
  </Error>
</ErrorResponse>
"#;

fn fresh_token(region: &str) -> ProofToken {
    let creds = Credentials::new("ASIAEXAMPLE", "secret", Some("FwoGZXIvYXdzEBYaDH+/session=".to_string()));
    let signed = sign(ProofRequest::build(region).unwrap(), &creds, DEFAULT_EXPIRY).unwrap();
    extract(&signed, &FixedPrefix::for_region(&Region::new(region).unwrap())).unwrap()
}

fn verifier(url: &str) -> IdentityVerifier {
    IdentityVerifier::new("us-east-1").unwrap().with_test_endpoint(url).with_timeout(Duration::from_secs(5))
}

#[test_log::test(tokio::test)]
async fn test_verify_replays_token() {
    let server = MockServer::respond_with(MockResponse::xml(200, IDENTITY_XML)).await;
    let token = fresh_token("us-east-1");

    let identity = verifier(&server.url()).verify(token.as_str()).await.unwrap();
    assert_eq!(
        identity,
        CallerIdentity::new(
            "arn:aws:sts::123456789012:assumed-role/node-role/i-0123456789abcdef0",
            "AROAEXAMPLEID:i-0123456789abcdef0",
            "123456789012"
        )
    );

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.target, format!("/?Action=GetCallerIdentity&Version=2011-06-15&{}", token.as_str()));
    assert_eq!(request.header("content-type"), Some("application/x-www-form-urlencoded"));
    assert!(request.body.is_empty());
}

#[test_log::test(tokio::test)]
async fn test_verify_status_mapping() {
    let server = MockServer::respond_with(MockResponse::xml(403, DENIED_XML)).await;
    let e = verifier(&server.url()).verify(fresh_token("us-east-1").as_str()).await.unwrap_err();
    assert!(matches!(e, ProofError::AuthDenied(_)), "{:?}", e);
    assert_eq!(e.http_status(), 403);

    let server = MockServer::respond_with(MockResponse::xml(500, "<ErrorResponse/>")).await;
    let e = verifier(&server.url())
        .with_retry_budget(Duration::ZERO)
        .verify(fresh_token("us-east-1").as_str())
        .await
        .unwrap_err();
    assert!(matches!(e, ProofError::Unreachable(_)), "{:?}", e);
    assert_eq!(server.requests().len(), 1);

    let server = MockServer::respond_with(MockResponse::new(200, "hello")).await;
    let e = verifier(&server.url()).verify(fresh_token("us-east-1").as_str()).await.unwrap_err();
    assert_eq!(e.error_code(), "InvalidResponse");

    let e = verifier(&refused_url().await)
        .with_retry_budget(Duration::ZERO)
        .verify(fresh_token("us-east-1").as_str())
        .await
        .unwrap_err();
    assert!(e.is_retryable(), "{:?}", e);
}

#[test_log::test(tokio::test)]
async fn test_verify_caches_identity_per_token() {
    let server = MockServer::respond_with(MockResponse::xml(200, IDENTITY_XML)).await;
    let verifier = verifier(&server.url());
    let token = fresh_token("us-east-1");

    let first = verifier.verify(token.as_str()).await.unwrap();
    let second = verifier.clone().verify(token.as_str()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(server.requests().len(), 1);

    verifier.verify(fresh_token("us-east-1").as_str()).await.unwrap();
    assert_eq!(server.requests().len(), 2);

    let uncached = verifier.with_cache_ttl(Duration::ZERO);
    uncached.verify(token.as_str()).await.unwrap();
    uncached.verify(token.as_str()).await.unwrap();
    assert_eq!(server.requests().len(), 4);
}

#[test_log::test(tokio::test)]
async fn test_verify_retries_server_errors() {
    let server = MockServer::sequence(vec![
        MockResponse::xml(503, "<ErrorResponse/>"),
        MockResponse::xml(500, "<ErrorResponse/>"),
        MockResponse::xml(200, IDENTITY_XML),
    ])
    .await;

    let identity = verifier(&server.url()).verify(fresh_token("us-east-1").as_str()).await.unwrap();
    assert_eq!(identity.account(), "123456789012");
    assert_eq!(server.requests().len(), 3);
}

#[test_log::test(tokio::test)]
async fn test_verify_retry_is_bounded() {
    let server = MockServer::respond_with(MockResponse::xml(500, "<ErrorResponse/>")).await;
    let e = verifier(&server.url())
        .with_retry_budget(Duration::from_millis(350))
        .verify(fresh_token("us-east-1").as_str())
        .await
        .unwrap_err();
    assert!(matches!(e, ProofError::Unreachable(_)), "{:?}", e);

    // Backoff of 100 ms and 200 ms fits the budget; the next 400 ms does not.
    assert_eq!(server.requests().len(), 3);
}

#[test_log::test(tokio::test)]
async fn test_verify_does_not_retry_denials() {
    let server = MockServer::respond_with(MockResponse::xml(403, DENIED_XML)).await;
    let e = verifier(&server.url()).verify(fresh_token("us-east-1").as_str()).await.unwrap_err();
    assert_eq!(e.error_code(), "AuthDenied");
    assert_eq!(server.requests().len(), 1);
}

#[test_log::test]
fn test_endpoint_override_is_checked() {
    let verifier = IdentityVerifier::new("us-east-1").unwrap();
    let e = verifier.clone().with_endpoint("https://sts.amazonaws.com.evil.example").unwrap_err();
    assert_eq!(e.error_code(), "InvalidConfiguration");

    let verifier = verifier.with_endpoint("https://sts.us-east-1.amazonaws.com").unwrap();
    assert!(verifier.prefix().is_aws_endpoint());
}

#[test_log::test(tokio::test)]
async fn test_verify_rejects_without_calling_sts() {
    let server = MockServer::respond_with(MockResponse::xml(200, IDENTITY_XML)).await;
    let verifier = verifier(&server.url());

    let token = fresh_token("us-west-2");
    let e = verifier.verify(token.as_str()).await.unwrap_err();
    assert_eq!(e.error_code(), "MalformedSignedRequest");

    let token = fresh_token("us-east-1");
    let url = token.reconstruct(&FixedPrefix::for_endpoint(&server.url()));
    let e = verifier.verify(&url).await.unwrap_err();
    assert_eq!(e.error_code(), "MalformedSignedRequest");

    let e = verifier.verify(&format!("{}&Action=AssumeRole", token.as_str())).await.unwrap_err();
    assert_eq!(e.error_code(), "MalformedSignedRequest");

    assert!(server.requests().is_empty());
}
