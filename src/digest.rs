use std::{fmt, str::FromStr};

use sha2::Digest as _;

/// Algorithm used to compute a content digest.
///
/// See [`Digest`] for an example.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum DigestAlgorithm {
    SHA256,
    SHA384,
    SHA512,
}

impl DigestAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::SHA256 => "sha256",
            DigestAlgorithm::SHA384 => "sha384",
            DigestAlgorithm::SHA512 => "sha512",
        }
    }

    /// Length of the hex-encoded value.
    fn hex_len(&self) -> usize {
        match self {
            DigestAlgorithm::SHA256 => 256 / 8 * 2,
            DigestAlgorithm::SHA384 => 384 / 8 * 2,
            DigestAlgorithm::SHA512 => 512 / 8 * 2,
        }
    }
}

/// A content-addressable identifier, like `sha256:<hex>`.
///
/// # Examples
///
/// ```
/// # use oci_registry_client::*;
/// const HASH: &str = "123456789012345678901234567890123456789012345678901234567890abcd";
///
/// let digest = Digest::try_from(format!("sha256:{}", HASH)).unwrap();
/// assert_eq!(digest.algorithm(), DigestAlgorithm::SHA256);
/// assert_eq!(digest.hash_value(), HASH);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest {
    hash: String,
    algorithm: DigestAlgorithm,
}

/// Errors from the digest parser.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum DigestError {
    #[error("Empty digest.")]
    Empty,

    #[error("Invalid digest format.")]
    InvalidFormat,

    #[error("Unsupported digest algorithm.")]
    InvalidAlgorithm,

    #[error("Invalid digest value.")]
    InvalidValue,
}

impl Digest {
    /// Compute the SHA256 digest of `data`.
    pub fn from_bytes(data: impl AsRef<[u8]>) -> Digest {
        let hash = format!("sha256:{}", HexString(sha2::Sha256::digest(data.as_ref())));
        Digest {
            hash,
            algorithm: DigestAlgorithm::SHA256,
        }
    }

    /// Original string to build this instance (`algorithm:hash_value`).
    pub fn as_str(&self) -> &str {
        &self.hash
    }

    pub fn hash_value(&self) -> &str {
        self.hash
            .split_once(':')
            .map(|(_, h)| h)
            .unwrap_or_default()
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }
}

impl TryFrom<String> for Digest {
    type Error = DigestError;

    fn try_from(hash: String) -> Result<Self, Self::Error> {
        if hash.is_empty() {
            return Err(DigestError::Empty);
        }

        let (algorithm, value) = hash.split_once(':').ok_or(DigestError::InvalidFormat)?;

        let algorithm = match algorithm {
            "sha256" => DigestAlgorithm::SHA256,
            "sha384" => DigestAlgorithm::SHA384,
            "sha512" => DigestAlgorithm::SHA512,
            "" => return Err(DigestError::InvalidFormat),
            _ => return Err(DigestError::InvalidAlgorithm),
        };

        // Only lowercase hex is canonical.
        let valid = value.len() == algorithm.hex_len()
            && value
                .bytes()
                .all(|c| c.is_ascii_digit() || (b'a'..=b'f').contains(&c));

        if valid {
            Ok(Digest { hash, algorithm })
        } else {
            Err(DigestError::InvalidValue)
        }
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Digest::try_from(s.to_owned())
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> String {
        digest.hash
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hash)
    }
}

/// Encode a byte buffer as hex string.
pub(crate) struct HexString<T>(pub T);

impl<T: AsRef<[u8]>> fmt::Display for HexString<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0
            .as_ref()
            .iter()
            .try_for_each(|byte| write!(f, "{:02x}", byte))
    }
}

#[test]
fn encode_hex_bytes() {
    assert_eq!(HexString(b"\x01\x20\xf0").to_string(), "0120f0");
}

#[test]
fn digest_of_bytes() {
    let digest = Digest::from_bytes("abc");
    assert_eq!(
        digest.as_str(),
        "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
    assert_eq!(digest.algorithm(), DigestAlgorithm::SHA256);
}

#[test]
fn parse_digests() {
    let sha384 = format!("sha384:{:096}", 7);
    assert_eq!(
        Digest::from_str(&sha384).map(|d| d.algorithm()),
        Ok(DigestAlgorithm::SHA384)
    );

    assert_eq!(Digest::from_str(""), Err(DigestError::Empty));
    assert_eq!(Digest::from_str("invaliddigest"), Err(DigestError::InvalidFormat));
    assert_eq!(Digest::from_str(":0000"), Err(DigestError::InvalidFormat));
    assert_eq!(Digest::from_str("md5:0000"), Err(DigestError::InvalidAlgorithm));
    assert_eq!(Digest::from_str("sha256:0000"), Err(DigestError::InvalidValue));

    // Uppercase hex is rejected.
    let upper = format!("sha256:{}", "AB".repeat(32));
    assert_eq!(Digest::from_str(&upper), Err(DigestError::InvalidValue));
}

#[test]
fn digest_in_json() {
    #[derive(serde::Deserialize, Debug)]
    struct Example {
        digest: Digest,
    }

    let json = format!(r#"{{"digest": "sha512:{}"}}"#, "0f".repeat(64));
    let example: Example = serde_json::from_str(&json).unwrap();
    assert_eq!(example.digest.algorithm(), DigestAlgorithm::SHA512);

    assert!(serde_json::from_str::<Example>(r#"{"digest": "sha256:xyz"}"#).is_err());
}
