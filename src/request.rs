//! Construction of the fixed STS `GetCallerIdentity` proof request.
//!
//! A proof request carries nothing the caller can influence: the action, API version, method, path and
//! content type are constants, and the only input is the region that selects the STS host. The relying party
//! can therefore rebuild everything except the signature on its own.

use {
    crate::{constants::*, token::FixedPrefix, ProofError},
    chrono::{DateTime, SubsecRound, Utc},
    http::Method,
    lazy_static::lazy_static,
    regex::Regex,
    std::{
        fmt::{Display, Formatter, Result as FmtResult},
        str::FromStr,
    },
};

lazy_static! {
    /// Region names: a two-letter area, one or more location words, and a number (`us-gov-west-1`).
    static ref REGION_RE: Regex = Regex::new(r"^[a-z]{2}(?:-[a-z]+)+-[0-9]+$").unwrap();
}

/// A validated AWS region name.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Region(String);

impl Region {
    /// Validate a region name.
    ///
    /// # Errors
    /// Returns [`ProofError::InvalidRegion`] if the name is not of the form `us-east-1`.
    pub fn new(name: &str) -> Result<Self, ProofError> {
        if !REGION_RE.is_match(name) {
            return Err(ProofError::InvalidRegion(format!("'{}' is not a valid AWS region name", name)));
        }

        Ok(Self(name.to_string()))
    }

    /// The region name.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The DNS suffix of the partition this region belongs to.
    pub fn dns_suffix(&self) -> &'static str {
        if self.0.starts_with("cn-") {
            DNS_SUFFIX_AWS_CN
        } else {
            DNS_SUFFIX_AWS
        }
    }

    /// The regional STS endpoint host, e.g. `sts.us-east-1.amazonaws.com`.
    pub fn sts_host(&self) -> String {
        format!("{}.{}.{}", SERVICE_STS, self.0, self.dns_suffix())
    }
}

impl Default for Region {
    fn default() -> Self {
        Self(DEFAULT_REGION.to_string())
    }
}

impl AsRef<str> for Region {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

impl FromStr for Region {
    type Err = ProofError;

    fn from_str(s: &str) -> Result<Self, ProofError> {
        Self::new(s)
    }
}

/// An unsigned "prove my identity" request: `POST https://sts.{region}.amazonaws.com/` with
/// `Action=GetCallerIdentity&Version=2011-06-15` and a form content type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProofRequest {
    /// The region selecting the STS endpoint.
    region: Region,

    /// The signing timestamp, truncated to whole seconds.
    timestamp: DateTime<Utc>,
}

impl ProofRequest {
    /// Build a proof request for `region`, timestamped now.
    ///
    /// # Errors
    /// Returns [`ProofError::InvalidRegion`] if the region name is malformed.
    pub fn build(region: &str) -> Result<Self, ProofError> {
        Self::build_at(region, Utc::now())
    }

    /// Build a proof request for `region` with an explicit timestamp.
    ///
    /// # Errors
    /// Returns [`ProofError::InvalidRegion`] if the region name is malformed.
    pub fn build_at(region: &str, timestamp: DateTime<Utc>) -> Result<Self, ProofError> {
        Ok(Self::for_region(Region::new(region)?, timestamp))
    }

    /// Build a proof request for an already validated region.
    pub fn for_region(region: Region, timestamp: DateTime<Utc>) -> Self {
        Self {
            region,
            timestamp: timestamp.trunc_subsecs(0),
        }
    }

    /// The HTTP method; always `POST`.
    #[inline]
    pub fn method(&self) -> Method {
        Method::POST
    }

    /// The URI path; always `/`.
    #[inline]
    pub fn path(&self) -> &'static str {
        "/"
    }

    /// The region this request is addressed to.
    #[inline]
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// The STS host this request is addressed to.
    #[inline]
    pub fn host(&self) -> String {
        self.region.sts_host()
    }

    /// The signing timestamp.
    #[inline]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The fixed query parameters, in canonical order.
    pub fn parameters(&self) -> [(&'static str, &'static str); 2] {
        [(QP_ACTION, ACTION_GET_CALLER_IDENTITY), (QP_VERSION, STS_API_VERSION)]
    }

    /// The headers covered by the signature, lowercase and sorted.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![(HDR_CONTENT_TYPE, APPLICATION_X_WWW_FORM_URLENCODED.to_string()), (HDR_HOST, self.host())]
    }

    /// The public, reconstructible part of the signed URL for this request.
    pub fn fixed_prefix(&self) -> FixedPrefix {
        FixedPrefix::for_region(&self.region)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{ProofRequest, Region},
        crate::ProofError,
        chrono::{TimeZone, Timelike, Utc},
        std::str::FromStr,
    };

    #[test_log::test]
    fn test_region_validation() {
        let valid = ["us-east-1", "eu-west-2", "ap-southeast-1", "us-gov-west-1", "cn-northwest-1", "il-central-1"];
        for name in valid {
            assert_eq!(Region::new(name).unwrap().as_str(), name);
        }

        // Region numbers are not capped at two digits.
        assert_eq!(Region::new("ap-southeast-100").unwrap().sts_host(), "sts.ap-southeast-100.amazonaws.com");

        for name in ["", "us-east", "US-EAST-1", "us_east_1", "us-east-1.evil.com", "us-east-1/", "x-1", "us-east-1a"] {
            let e = Region::new(name).unwrap_err();
            assert!(matches!(e, ProofError::InvalidRegion(_)), "{} -> {:?}", name, e);
        }

        assert!(Region::from_str("us-east-1@attacker").is_err());
        assert_eq!(Region::default().as_str(), "us-east-1");
    }

    #[test_log::test]
    fn test_partition_hosts() {
        assert_eq!(Region::new("us-east-1").unwrap().sts_host(), "sts.us-east-1.amazonaws.com");
        assert_eq!(Region::new("cn-north-1").unwrap().sts_host(), "sts.cn-north-1.amazonaws.com.cn");
        assert_eq!(format!("{}", Region::new("eu-central-1").unwrap()), "eu-central-1");
    }

    #[test_log::test]
    fn test_request_is_fixed() {
        let ts = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();
        let a = ProofRequest::build_at("us-east-1", ts).unwrap();
        let b = ProofRequest::build_at("us-east-1", ts).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.method(), http::Method::POST);
        assert_eq!(a.path(), "/");
        assert_eq!(a.parameters(), [("Action", "GetCallerIdentity"), ("Version", "2011-06-15")]);
        assert_eq!(
            a.headers(),
            vec![
                ("content-type", "application/x-www-form-urlencoded".to_string()),
                ("host", "sts.us-east-1.amazonaws.com".to_string())
            ]
        );

        let other = ProofRequest::build_at("eu-west-1", ts).unwrap();
        assert_eq!(other.parameters(), a.parameters());
        assert_eq!(other.host(), "sts.eu-west-1.amazonaws.com");
    }

    #[test_log::test]
    fn test_subseconds_truncated() {
        let ts = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap().with_nanosecond(999_999_999).unwrap();
        let req = ProofRequest::build_at("us-east-1", ts).unwrap();
        assert_eq!(req.timestamp().nanosecond(), 0);
        assert_eq!(req.timestamp(), Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap());
    }

    #[test_log::test]
    fn test_invalid_region_rejected() {
        let e = ProofRequest::build("not a region").unwrap_err();
        assert_eq!(e.error_code(), "InvalidRegion");
    }
}
