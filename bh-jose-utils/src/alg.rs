// Copyright (C) 2020-2026  The Blockhouse Technology Limited (TBTL).
//
// This program is free software: you can redistribute it and/or modify it
// under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public
// License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Registries for the JOSE key management and content encryption algorithms, mapping the
//! registered `"alg"` / `"enc"` names onto their scheme parameters.
//!
//! The registries are total over the names we recognize; which entries are actually available for
//! encryption and decryption is decided by the [`jwe`](crate::jwe) module.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SignatureError;

/// The digest used inside a key derivation or key encryption scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeDigest {
    /// SHA-1 (legacy, `RSA-OAEP` without a suffix only)
    Sha1,
    /// SHA-256
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

/// JWE key management algorithms (the `"alg"` header of a JWE), as registered in
/// [RFC 7518, section 4][1].
///
/// [1]: <https://datatracker.ietf.org/doc/html/rfc7518#section-4.1>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyManagementAlgorithm {
    /// ECDH-ES direct key agreement using the Concat KDF
    #[serde(rename = "ECDH-ES")]
    EcdhEs,
    /// ECDH-ES key agreement wrapping a generated CEK with AES-128 key wrap
    #[serde(rename = "ECDH-ES+A128KW")]
    EcdhEsA128Kw,
    /// ECDH-ES key agreement wrapping a generated CEK with AES-192 key wrap
    #[serde(rename = "ECDH-ES+A192KW")]
    EcdhEsA192Kw,
    /// ECDH-ES key agreement wrapping a generated CEK with AES-256 key wrap
    #[serde(rename = "ECDH-ES+A256KW")]
    EcdhEsA256Kw,
    /// RSAES-OAEP with SHA-1 and MGF1 with SHA-1
    #[serde(rename = "RSA-OAEP")]
    RsaOaep,
    /// RSAES-OAEP with SHA-256 and MGF1 with SHA-256
    #[serde(rename = "RSA-OAEP-256")]
    RsaOaep256,
    /// RSAES-OAEP with SHA-384 and MGF1 with SHA-384
    #[serde(rename = "RSA-OAEP-384")]
    RsaOaep384,
    /// RSAES-OAEP with SHA-512 and MGF1 with SHA-512
    #[serde(rename = "RSA-OAEP-512")]
    RsaOaep512,
    /// AES-128 key wrap with a pre-shared KEK
    #[serde(rename = "A128KW")]
    A128Kw,
    /// AES-192 key wrap with a pre-shared KEK
    #[serde(rename = "A192KW")]
    A192Kw,
    /// AES-256 key wrap with a pre-shared KEK
    #[serde(rename = "A256KW")]
    A256Kw,
    /// AES-128 GCM key wrap with a pre-shared KEK
    #[serde(rename = "A128GCMKW")]
    A128GcmKw,
    /// AES-192 GCM key wrap with a pre-shared KEK
    #[serde(rename = "A192GCMKW")]
    A192GcmKw,
    /// AES-256 GCM key wrap with a pre-shared KEK
    #[serde(rename = "A256GCMKW")]
    A256GcmKw,
}

impl KeyManagementAlgorithm {
    /// The registered JOSE name of this algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EcdhEs => "ECDH-ES",
            Self::EcdhEsA128Kw => "ECDH-ES+A128KW",
            Self::EcdhEsA192Kw => "ECDH-ES+A192KW",
            Self::EcdhEsA256Kw => "ECDH-ES+A256KW",
            Self::RsaOaep => "RSA-OAEP",
            Self::RsaOaep256 => "RSA-OAEP-256",
            Self::RsaOaep384 => "RSA-OAEP-384",
            Self::RsaOaep512 => "RSA-OAEP-512",
            Self::A128Kw => "A128KW",
            Self::A192Kw => "A192KW",
            Self::A256Kw => "A256KW",
            Self::A128GcmKw => "A128GCMKW",
            Self::A192GcmKw => "A192GCMKW",
            Self::A256GcmKw => "A256GCMKW",
        }
    }

    /// The digest this scheme uses, where one applies (the OAEP mask generation digest).
    pub fn scheme_digest(&self) -> Option<SchemeDigest> {
        match self {
            Self::RsaOaep => Some(SchemeDigest::Sha1),
            Self::RsaOaep256 => Some(SchemeDigest::Sha256),
            Self::RsaOaep384 => Some(SchemeDigest::Sha384),
            Self::RsaOaep512 => Some(SchemeDigest::Sha512),
            _ => None,
        }
    }

    /// The size in bits of the key-wrapping key, for the schemes which wrap the CEK.
    ///
    /// The length is taken from the algorithm name.  Direct key agreement (`ECDH-ES`) and the
    /// RSA schemes return [`None`].
    pub fn key_wrap_bits(&self) -> Option<u32> {
        match self {
            Self::EcdhEsA128Kw | Self::A128Kw | Self::A128GcmKw => Some(128),
            Self::EcdhEsA192Kw | Self::A192Kw | Self::A192GcmKw => Some(192),
            Self::EcdhEsA256Kw | Self::A256Kw | Self::A256GcmKw => Some(256),
            _ => None,
        }
    }

    /// Whether the scheme derives the key via an ECDH key agreement.
    pub fn is_ecdh(&self) -> bool {
        matches!(
            self,
            Self::EcdhEs | Self::EcdhEsA128Kw | Self::EcdhEsA192Kw | Self::EcdhEsA256Kw
        )
    }
}

impl FromStr for KeyManagementAlgorithm {
    type Err = bherror::Error<SignatureError>;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "ECDH-ES" => Self::EcdhEs,
            "ECDH-ES+A128KW" => Self::EcdhEsA128Kw,
            "ECDH-ES+A192KW" => Self::EcdhEsA192Kw,
            "ECDH-ES+A256KW" => Self::EcdhEsA256Kw,
            "RSA-OAEP" => Self::RsaOaep,
            "RSA-OAEP-256" => Self::RsaOaep256,
            "RSA-OAEP-384" => Self::RsaOaep384,
            "RSA-OAEP-512" => Self::RsaOaep512,
            "A128KW" => Self::A128Kw,
            "A192KW" => Self::A192Kw,
            "A256KW" => Self::A256Kw,
            "A128GCMKW" => Self::A128GcmKw,
            "A192GCMKW" => Self::A192GcmKw,
            "A256GCMKW" => Self::A256GcmKw,
            _ => {
                return Err(bherror::Error::root(
                    SignatureError::InvalidSigningAlgorithm(value.to_string()),
                ))
            }
        })
    }
}

impl std::fmt::Display for KeyManagementAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// JWE content encryption algorithms (the `"enc"` header of a JWE), as registered in
/// [RFC 7518, section 5][1].
///
/// [1]: <https://datatracker.ietf.org/doc/html/rfc7518#section-5.1>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentEncryptionAlgorithm {
    /// AES GCM with a 128-bit key
    #[serde(rename = "A128GCM")]
    A128Gcm,
    /// AES GCM with a 192-bit key
    #[serde(rename = "A192GCM")]
    A192Gcm,
    /// AES GCM with a 256-bit key
    #[serde(rename = "A256GCM")]
    A256Gcm,
    /// AES-128 CBC with HMAC SHA-256 authentication
    #[serde(rename = "A128CBC-HS256")]
    A128CbcHs256,
    /// AES-192 CBC with HMAC SHA-384 authentication
    #[serde(rename = "A192CBC-HS384")]
    A192CbcHs384,
    /// AES-256 CBC with HMAC SHA-512 authentication
    #[serde(rename = "A256CBC-HS512")]
    A256CbcHs512,
}

impl ContentEncryptionAlgorithm {
    /// The registered JOSE name of this algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A128Gcm => "A128GCM",
            Self::A192Gcm => "A192GCM",
            Self::A256Gcm => "A256GCM",
            Self::A128CbcHs256 => "A128CBC-HS256",
            Self::A192CbcHs384 => "A192CBC-HS384",
            Self::A256CbcHs512 => "A256CBC-HS512",
        }
    }

    /// The size in bits of the content encryption key, taken from the algorithm name.
    ///
    /// Note that for the CBC-HMAC composites the key is split evenly between the
    /// encryption and the MAC halves.
    pub fn key_bits(&self) -> u32 {
        match self {
            Self::A128Gcm => 128,
            Self::A192Gcm => 192,
            Self::A256Gcm => 256,
            Self::A128CbcHs256 => 256,
            Self::A192CbcHs384 => 384,
            Self::A256CbcHs512 => 512,
        }
    }
}

impl FromStr for ContentEncryptionAlgorithm {
    type Err = bherror::Error<SignatureError>;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "A128GCM" => Self::A128Gcm,
            "A192GCM" => Self::A192Gcm,
            "A256GCM" => Self::A256Gcm,
            "A128CBC-HS256" => Self::A128CbcHs256,
            "A192CBC-HS384" => Self::A192CbcHs384,
            "A256CBC-HS512" => Self::A256CbcHs512,
            _ => {
                return Err(bherror::Error::root(
                    SignatureError::InvalidSigningAlgorithm(value.to_string()),
                ))
            }
        })
    }
}

impl std::fmt::Display for ContentEncryptionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use super::*;

    #[test]
    fn key_management_names_round_trip() {
        let algorithms = [
            KeyManagementAlgorithm::EcdhEs,
            KeyManagementAlgorithm::EcdhEsA128Kw,
            KeyManagementAlgorithm::EcdhEsA192Kw,
            KeyManagementAlgorithm::EcdhEsA256Kw,
            KeyManagementAlgorithm::RsaOaep,
            KeyManagementAlgorithm::RsaOaep256,
            KeyManagementAlgorithm::RsaOaep384,
            KeyManagementAlgorithm::RsaOaep512,
            KeyManagementAlgorithm::A128Kw,
            KeyManagementAlgorithm::A192Kw,
            KeyManagementAlgorithm::A256Kw,
            KeyManagementAlgorithm::A128GcmKw,
            KeyManagementAlgorithm::A192GcmKw,
            KeyManagementAlgorithm::A256GcmKw,
        ];

        for alg in algorithms {
            assert_eq!(alg, KeyManagementAlgorithm::from_str(alg.as_str()).unwrap());
            assert_eq!(
                serde_json::to_string(&alg).unwrap(),
                format!("\"{}\"", alg.as_str())
            );
        }
    }

    #[test]
    fn key_lengths_follow_names() {
        assert_eq!(KeyManagementAlgorithm::EcdhEsA128Kw.key_wrap_bits(), Some(128));
        assert_eq!(KeyManagementAlgorithm::A256GcmKw.key_wrap_bits(), Some(256));
        assert_eq!(KeyManagementAlgorithm::EcdhEs.key_wrap_bits(), None);

        assert_eq!(ContentEncryptionAlgorithm::A128Gcm.key_bits(), 128);
        assert_eq!(ContentEncryptionAlgorithm::A256Gcm.key_bits(), 256);
        assert_eq!(ContentEncryptionAlgorithm::A256CbcHs512.key_bits(), 512);
    }

    #[test]
    fn oaep_digests_follow_names() {
        assert_eq!(
            KeyManagementAlgorithm::RsaOaep.scheme_digest(),
            Some(SchemeDigest::Sha1)
        );
        assert_eq!(
            KeyManagementAlgorithm::RsaOaep512.scheme_digest(),
            Some(SchemeDigest::Sha512)
        );
        assert_eq!(KeyManagementAlgorithm::EcdhEs.scheme_digest(), None);
    }

    #[test]
    fn unknown_names_fail() {
        assert!(KeyManagementAlgorithm::from_str("ECDH-SS").is_err());
        assert!(ContentEncryptionAlgorithm::from_str("A512GCM").is_err());
    }
}
