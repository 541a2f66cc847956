//! Archive digests in `algorithm:hex` form.

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModuleError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub algorithm: ChecksumAlgorithm,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Sha256,
    Sha384,
    Sha512,
    Blake3,
}

impl Checksum {
    /// Verify the checksum against the provided data
    pub fn verify(&self, data: &[u8]) -> bool {
        self.algorithm.calculate(data) == self.value.to_lowercase()
    }

    /// Verify, mapping a mismatch to [`ModuleError::ChecksumMismatch`].
    pub fn ensure(&self, data: &[u8]) -> Result<(), ModuleError> {
        let actual = self.algorithm.calculate(data);
        if actual == self.value.to_lowercase() {
            Ok(())
        } else {
            Err(ModuleError::ChecksumMismatch {
                expected: self.to_string(),
                actual: format!("{}:{}", self.algorithm, actual),
            })
        }
    }

    pub fn from_data(algorithm: ChecksumAlgorithm, data: &[u8]) -> Self {
        Self {
            value: algorithm.calculate(data),
            algorithm,
        }
    }
}

impl ChecksumAlgorithm {
    pub fn calculate(&self, data: &[u8]) -> String {
        use sha2::{Digest, Sha256, Sha384, Sha512};

        match self {
            ChecksumAlgorithm::Sha256 => format!("{:x}", Sha256::digest(data)),
            ChecksumAlgorithm::Sha384 => format!("{:x}", Sha384::digest(data)),
            ChecksumAlgorithm::Sha512 => format!("{:x}", Sha512::digest(data)),
            ChecksumAlgorithm::Blake3 => blake3::hash(data).to_hex().to_string(),
        }
    }
}

impl Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.value)
    }
}

impl Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChecksumAlgorithm::Sha256 => write!(f, "sha256"),
            ChecksumAlgorithm::Sha384 => write!(f, "sha384"),
            ChecksumAlgorithm::Sha512 => write!(f, "sha512"),
            ChecksumAlgorithm::Blake3 => write!(f, "blake3"),
        }
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sha256" => Ok(ChecksumAlgorithm::Sha256),
            "sha384" => Ok(ChecksumAlgorithm::Sha384),
            "sha512" => Ok(ChecksumAlgorithm::Sha512),
            "blake3" => Ok(ChecksumAlgorithm::Blake3),
            _ => Err("Unsupported checksum algorithm"),
        }
    }
}

impl FromStr for Checksum {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algorithm, value) = s
            .split_once(':')
            .ok_or("Invalid checksum format, expected 'algorithm:checksum'")?;
        if value.is_empty() || !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err("Checksum value must be hexadecimal");
        }
        Ok(Checksum {
            algorithm: algorithm.parse()?,
            value: value.to_string(),
        })
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let string = String::deserialize(deserializer)?;
        string.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for Checksum {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_verifies_sha256() {
        let data = b"module archive";
        let digest = ChecksumAlgorithm::Sha256.calculate(data);
        let checksum: Checksum = format!("sha256:{}", digest.to_uppercase()).parse().unwrap();

        assert!(checksum.verify(data));
        assert!(checksum.ensure(data).is_ok());
        assert!(!checksum.verify(b"tampered"));
    }

    #[test]
    fn mismatch_reports_both_digests() {
        let checksum = Checksum::from_data(ChecksumAlgorithm::Blake3, b"a");
        match checksum.ensure(b"b") {
            Err(ModuleError::ChecksumMismatch { expected, actual }) => {
                assert!(expected.starts_with("blake3:"));
                assert!(actual.starts_with("blake3:"));
                assert_ne!(expected, actual);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_strings() {
        assert!("sha256".parse::<Checksum>().is_err());
        assert!("md5:abcd".parse::<Checksum>().is_err());
        assert!("sha512:not-hex".parse::<Checksum>().is_err());
        assert!(serde_json::from_str::<Checksum>("\"sha512:\"").is_err());
    }
}
