mod common;

use {
    async_trait::async_trait,
    chrono::Utc,
    common::{refused_url, MockResponse, MockServer},
    scratchstack_identity_proof::{
        ClientConfig, CredentialSource, Credentials, NodeData, ProofClient, ProofError, ProofToken, ResourcePath,
        SecretStoreClient, Stage, StaticSource,
    },
    std::{
        collections::HashSet,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    },
};

const NODE_DATA: &str = r#"{
    "pubkey": "0327f763c849bfd218910e41eef74f5a737989358ab3565f185e1a61bb7df445b8",
    "macaroon_hex": "0201036c6e640224030a10",
    "certificate_base64": "LS0tLS1CRUdJTg==",
    "endpoint": "10.0.0.5:10009",
    "tags": "dummy,66",
    "api_type": 1
}"#;

fn static_source() -> StaticSource {
    StaticSource::new(Credentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY", None))
}

fn client_for(url: &str, timeout: Duration) -> ProofClient {
    let config = ClientConfig::builder().store_url(url).timeout(timeout).build().unwrap();
    ProofClient::new(config, static_source()).unwrap()
}

fn path(p: &str) -> ResourcePath {
    ResourcePath::new(p).unwrap()
}

#[test_log::test(tokio::test)]
async fn test_fetch_secret() {
    let server = MockServer::respond_with(MockResponse::json(NODE_DATA)).await;
    let client = client_for(&format!("{}/", server.url()), Duration::from_secs(5));

    let secret = client.fetch(&path("lnd1")).await.unwrap();
    let node: NodeData = secret.json().unwrap();
    assert_eq!(node.pubkey, "0327f763c849bfd218910e41eef74f5a737989358ab3565f185e1a61bb7df445b8");
    assert_eq!(node.endpoint, "10.0.0.5:10009");
    assert_eq!(node.api_type, Some(1));

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.method, "GET");
    assert_eq!(request.target, "/get/lnd1");

    let header = request.header("X-Amazon-Presigned-Getcalleridentity").unwrap();
    let token = ProofToken::parse(header).unwrap();
    assert_eq!(token.block().access_key_id(), "AKIDEXAMPLE");
    assert_eq!(token.block().scope().region(), "us-east-1");
    assert_eq!(token.block().scope().service(), "sts");
    assert_eq!(token.block().expires(), 300);
    assert!(token.expires_at() > Utc::now());
    assert!(!header.contains("wJalrXUtnFEMI"));
}

#[test_log::test(tokio::test)]
async fn test_fetch_scoped_path() {
    let server = MockServer::respond_with(MockResponse::json(NODE_DATA)).await;
    let client = client_for(&server.url(), Duration::from_secs(5));

    client.fetch(&ResourcePath::scoped("0a1b2c", "lnd1").unwrap()).await.unwrap();
    assert_eq!(server.requests()[0].target, "/get/0a1b2c/lnd1");
}

#[test_log::test(tokio::test)]
async fn test_status_mapping() {
    let cases: [(u16, &str); 6] = [
        (401, "AuthDenied"),
        (403, "AuthDenied"),
        (404, "NotFound"),
        (400, "Unreachable"),
        (500, "Unreachable"),
        (503, "Unreachable"),
    ];

    for (status, code) in cases {
        let server = MockServer::respond_with(MockResponse::new(status, "nope")).await;
        let client = client_for(&server.url(), Duration::from_secs(5));
        let e = client.fetch(&path("lnd1")).await.unwrap_err();
        assert_eq!(e.error_code(), code, "HTTP {} -> {:?}", status, e);
        assert_eq!(e.stage(), Stage::Exchange);
    }
}

#[test_log::test(tokio::test)]
async fn test_forbidden_is_not_retryable() {
    let server = MockServer::respond_with(MockResponse::new(403, "got unauthorized")).await;
    let client = client_for(&server.url(), Duration::from_secs(5));
    let e = client.fetch(&path("lnd1")).await.unwrap_err();
    assert!(matches!(e, ProofError::AuthDenied(_)));
    assert!(!e.is_retryable());
    assert_eq!(e.to_string(), "Authentication denied: secret store answered HTTP 403");
}

#[test_log::test(tokio::test)]
async fn test_not_found() {
    let server = MockServer::respond_with(MockResponse::new(404, "")).await;
    let client = client_for(&server.url(), Duration::from_secs(5));
    let e = client.fetch(&path("u1/missing")).await.unwrap_err();
    assert_eq!(e.to_string(), "Not found: u1/missing");
}

#[test_log::test(tokio::test)]
async fn test_connection_refused() {
    let client = client_for(&refused_url().await, Duration::from_secs(5));
    let e = client.fetch(&path("lnd1")).await.unwrap_err();
    assert!(matches!(e, ProofError::Unreachable(_)), "{:?}", e);
    assert!(e.is_retryable());
    assert_eq!(e.stage(), Stage::Exchange);
}

#[test_log::test(tokio::test)]
async fn test_timeout_is_unreachable() {
    let server =
        MockServer::respond_with(MockResponse::json(NODE_DATA).delayed(Duration::from_secs(3))).await;
    let client = client_for(&server.url(), Duration::from_millis(200));
    let e = client.fetch(&path("lnd1")).await.unwrap_err();
    assert!(matches!(e, ProofError::Unreachable(_)), "{:?}", e);
}

#[test_log::test(tokio::test)]
async fn test_same_token_for_every_path() {
    let server = MockServer::respond_with(MockResponse::json(NODE_DATA)).await;
    let client = client_for(&server.url(), Duration::from_secs(5));
    let store = SecretStoreClient::new(&server.url(), Duration::from_secs(5)).unwrap();

    let token = client.issue_token().await.unwrap();
    store.fetch(&token, &path("lnd1")).await.unwrap();
    store.fetch(&token, &path("acme/lnd2")).await.unwrap();

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].path(), "/get/lnd1");
    assert_eq!(requests[1].path(), "/get/acme/lnd2");
    assert_eq!(requests[0].header("x-amazon-presigned-getcalleridentity"), Some(token.as_str()));
    assert_eq!(requests[1].header("x-amazon-presigned-getcalleridentity"), Some(token.as_str()));
}

/// Hands out a different access key on every resolution.
#[derive(Debug, Default)]
struct RotatingSource {
    calls: AtomicUsize,
}

#[async_trait]
impl CredentialSource for RotatingSource {
    async fn resolve(&self) -> Result<Credentials, ProofError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Credentials::new(format!("AKIDEXAMPLE{}", n), format!("secret{}", n), None))
    }

    fn name(&self) -> &'static str {
        "rotating"
    }
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_concurrent_fetches_sign_independently() {
    let server = MockServer::respond_with(MockResponse::json(NODE_DATA)).await;
    let config = ClientConfig::builder().store_url(server.url()).build().unwrap();
    let client = Arc::new(ProofClient::new(config, RotatingSource::default()).unwrap());

    let a = {
        let client = client.clone();
        tokio::spawn(async move { client.fetch(&path("lnd1")).await })
    };
    let b = {
        let client = client.clone();
        tokio::spawn(async move { client.fetch(&path("lnd2")).await })
    };

    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let requests = server.requests();
    assert_eq!(requests.len(), 2);

    let keys: HashSet<String> = requests
        .iter()
        .map(|r| {
            let token = ProofToken::parse(r.header("x-amazon-presigned-getcalleridentity").unwrap()).unwrap();
            token.block().access_key_id().to_string()
        })
        .collect();
    assert_eq!(keys, HashSet::from(["AKIDEXAMPLE0".to_string(), "AKIDEXAMPLE1".to_string()]));
}

#[test_log::test(tokio::test)]
async fn test_credential_failure_stops_before_the_store() {
    let server = MockServer::respond_with(MockResponse::json(NODE_DATA)).await;
    let config = ClientConfig::builder().store_url(server.url()).build().unwrap();
    let client = ProofClient::new(config, StaticSource::new(Credentials::new("AKIDEXAMPLE", "", None))).unwrap();

    let e = client.fetch(&path("lnd1")).await.unwrap_err();
    assert_eq!(e.stage(), Stage::Signing);
    assert!(server.requests().is_empty());
}
