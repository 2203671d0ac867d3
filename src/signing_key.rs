//! The SigV4 signing key chain. Every intermediate key is wiped when dropped and never printed.

use {
    crate::{constants::*, crypto::hmac_sha256},
    chrono::NaiveDate,
    std::fmt::{Debug, Display, Formatter, Result as FmtResult},
    zeroize::{Zeroize, ZeroizeOnDrop},
};

macro_rules! redacted_fmt {
    ($ty:ident) => {
        impl Debug for $ty {
            fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
                f.write_str(stringify!($ty))
            }
        }

        impl Display for $ty {
            fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
                f.write_str(stringify!($ty))
            }
        }
    };
}

macro_rules! derived_key {
    ($(#[$doc:meta])* $ty:ident) => {
        $(#[$doc])*
        #[derive(Clone, Eq, PartialEq, Zeroize, ZeroizeOnDrop)]
        pub struct $ty {
            key: [u8; SHA256_OUTPUT_LEN],
        }

        impl AsRef<[u8; SHA256_OUTPUT_LEN]> for $ty {
            fn as_ref(&self) -> &[u8; SHA256_OUTPUT_LEN] {
                &self.key
            }
        }

        redacted_fmt!($ty);
    };
}

/// A raw AWS secret access key (`kSecret`), held with its `AWS4` prefix.
#[derive(Clone, Eq, PartialEq, Zeroize, ZeroizeOnDrop)]
pub struct KSecretKey {
    prefixed_key: Vec<u8>,
}

redacted_fmt!(KSecretKey);

derived_key!(
    /// `kDate = HMAC("AWS4" + kSecret, YYYYMMDD)`
    KDateKey
);

derived_key!(
    /// `kRegion = HMAC(kDate, region)`
    KRegionKey
);

derived_key!(
    /// `kService = HMAC(kRegion, service)`
    KServiceKey
);

derived_key!(
    /// `kSigning = HMAC(kService, "aws4_request")`, the key that signs the string to sign.
    KSigningKey
);

impl AsRef<[u8]> for KSecretKey {
    fn as_ref(&self) -> &[u8] {
        &self.prefixed_key[4..]
    }
}

impl KSecretKey {
    /// Wrap a secret access key. Any length is accepted; signing rejects empty keys separately.
    pub fn new(raw: &str) -> Self {
        let mut prefixed_key = Vec::with_capacity(raw.len() + 4);
        prefixed_key.extend_from_slice(b"AWS4");
        prefixed_key.extend_from_slice(raw.as_bytes());
        Self {
            prefixed_key,
        }
    }

    /// Derive the key for a signing date.
    pub fn to_kdate(&self, date: NaiveDate) -> KDateKey {
        let date = date.format(ISO8601_DATE_FORMAT).to_string();
        KDateKey {
            key: hmac_sha256(&self.prefixed_key, date.as_bytes()),
        }
    }

    /// Walk the whole chain down to the signing key for a credential scope.
    pub fn to_ksigning(&self, date: NaiveDate, region: &str, service: &str) -> KSigningKey {
        self.to_kdate(date).to_kregion(region).to_kservice(service).to_ksigning()
    }
}

impl KDateKey {
    /// Derive the key for a region.
    pub fn to_kregion(&self, region: &str) -> KRegionKey {
        KRegionKey {
            key: hmac_sha256(&self.key, region.as_bytes()),
        }
    }
}

impl KRegionKey {
    /// Derive the key for a service.
    pub fn to_kservice(&self, service: &str) -> KServiceKey {
        KServiceKey {
            key: hmac_sha256(&self.key, service.as_bytes()),
        }
    }
}

impl KServiceKey {
    /// Derive the final signing key.
    pub fn to_ksigning(&self) -> KSigningKey {
        KSigningKey {
            key: hmac_sha256(&self.key, AWS4_REQUEST.as_bytes()),
        }
    }
}

impl KSigningKey {
    /// Sign a string to sign, returning the lowercase hex signature.
    pub fn sign(&self, string_to_sign: &[u8]) -> String {
        hex::encode(hmac_sha256(&self.key, string_to_sign))
    }
}
