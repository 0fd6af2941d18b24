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

//! JWE compact serialization as specified in [RFC 7516][1].
//!
//! For now only the profile used for encrypted OpenID4VP authorization responses is available
//! for encryption and decryption: `ECDH-ES` direct key agreement (with the Concat KDF of
//! [RFC 7518, section 4.6][2]) combined with AES-GCM content encryption.  The other registered
//! algorithms are recognized by the [`alg`](crate::alg) registries but rejected here.
//!
//! [1]: <https://datatracker.ietf.org/doc/html/rfc7516>
//! [2]: <https://datatracker.ietf.org/doc/html/rfc7518#section-4.6>

use std::str::FromStr;

use bherror::{
    traits::{ErrorContext as _, ForeignError as _, PropagateError as _},
    Error, Result,
};
use openssl::{sha::Sha256, symm::Cipher};
use serde::{Deserialize, Serialize};

use crate::{
    ecdh_shared_secret,
    keys::{public_pkey_from_jwk, EcKeyPair},
    utils::{base64_url_decode, base64_url_encode},
    ContentEncryptionAlgorithm, CryptoError, JwkPublic, KeyManagementAlgorithm,
};

/// The length of an AES-GCM initialization vector in bytes.
const GCM_IV_LENGTH: usize = 12;

/// The protected header of a [`Jwe`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JweHeader {
    /// The key management algorithm (`"alg"`).
    pub alg: KeyManagementAlgorithm,
    /// The content encryption algorithm (`"enc"`).
    pub enc: ContentEncryptionAlgorithm,
    /// The identifier of the recipient key the sender encrypted to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// The ephemeral public key of an ECDH key agreement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epk: Option<JwkPublic>,
    /// Key agreement `PartyUInfo`, base64url encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apu: Option<String>,
    /// Key agreement `PartyVInfo`, base64url encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apv: Option<String>,
}

/// A parsed JWE in the compact serialization.
///
/// The five base64url segments are kept verbatim alongside the parsed protected header, since
/// the first segment doubles as the additional authenticated data of the content encryption and
/// must therefore survive bit-exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct Jwe {
    protected_b64: String,
    header: JweHeader,
    encrypted_key_b64: String,
    iv_b64: String,
    ciphertext_b64: String,
    tag_b64: String,
}

impl Jwe {
    /// The parsed protected header.
    pub fn header(&self) -> &JweHeader {
        &self.header
    }

    /// The `kid` of the protected header, if any.
    pub fn kid(&self) -> Option<&str> {
        self.header.kid.as_deref()
    }
}

impl FromStr for Jwe {
    type Err = Error<CryptoError>;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let segments: Vec<&str> = value.split('.').collect();

        let [protected, encrypted_key, iv, ciphertext, tag] = segments.as_slice() else {
            return Err(Error::root(CryptoError::DecryptionFailed)
                .ctx("a compact JWE must consist of five segments"));
        };

        let header_bytes = base64_url_decode(protected)
            .foreign_err(|| CryptoError::DecryptionFailed)
            .ctx(|| "invalid base64 in the protected header")?;

        let header: JweHeader = serde_json::from_slice(&header_bytes)
            .foreign_err(|| CryptoError::DecryptionFailed)
            .ctx(|| "invalid JWE protected header")?;

        Ok(Self {
            protected_b64: (*protected).to_owned(),
            header,
            encrypted_key_b64: (*encrypted_key).to_owned(),
            iv_b64: (*iv).to_owned(),
            ciphertext_b64: (*ciphertext).to_owned(),
            tag_b64: (*tag).to_owned(),
        })
    }
}

impl std::fmt::Display for Jwe {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}.{}",
            self.protected_b64,
            self.encrypted_key_b64,
            self.iv_b64,
            self.ciphertext_b64,
            self.tag_b64
        )
    }
}

/// Encrypts the `plaintext` to the `recipient` public JWK and returns the compact JWE.
///
/// The key agreement is `ECDH-ES` in direct mode, so the JWE encrypted key segment is empty.
/// The `kid` is placed into the protected header so that the recipient can resolve its
/// decryption key.
pub fn encrypt_compact(
    plaintext: &[u8],
    recipient: &JwkPublic,
    enc: ContentEncryptionAlgorithm,
    kid: Option<&str>,
) -> Result<String, CryptoError> {
    let cipher = gcm_cipher(&enc)?;

    let ephemeral = EcKeyPair::generate()?;

    let recipient_key = public_pkey_from_jwk(recipient)
        .with_err(|| CryptoError::EncryptionFailed)
        .ctx(|| "invalid recipient JWK")?;

    let shared_secret = ecdh_shared_secret(
        ephemeral.private_pkey()?.as_ref(),
        recipient_key.as_ref(),
    )?;

    let cek = concat_kdf_sha256(&shared_secret, enc.as_str(), enc.key_bits());

    let header = JweHeader {
        alg: KeyManagementAlgorithm::EcdhEs,
        enc,
        kid: kid.map(str::to_owned),
        epk: Some(ephemeral.public_jwk()?),
        apu: None,
        apv: None,
    };

    let header_json =
        serde_json::to_vec(&header).foreign_err(|| CryptoError::EncryptionFailed)?;
    let protected_b64 = base64_url_encode(header_json);

    let mut iv = [0u8; GCM_IV_LENGTH];
    openssl::rand::rand_bytes(&mut iv).foreign_err(|| CryptoError::CryptoBackend)?;

    let mut tag = [0u8; 16];
    let ciphertext = openssl::symm::encrypt_aead(
        cipher,
        &cek,
        Some(&iv),
        protected_b64.as_bytes(),
        plaintext,
        &mut tag,
    )
    .foreign_err(|| CryptoError::EncryptionFailed)?;

    Ok(format!(
        "{}..{}.{}.{}",
        protected_b64,
        base64_url_encode(iv),
        base64_url_encode(ciphertext),
        base64_url_encode(tag)
    ))
}

/// Decrypts the JWE with the recipient's key pair and returns the plaintext.
///
/// Only `ECDH-ES` direct key agreement with AES-GCM content encryption is supported; for other
/// algorithms [`CryptoError::Unsupported`] is returned.
pub fn decrypt_compact(jwe: &Jwe, recipient: &EcKeyPair) -> Result<Vec<u8>, CryptoError> {
    if jwe.header.alg != KeyManagementAlgorithm::EcdhEs {
        return Err(Error::root(CryptoError::Unsupported(format!(
            "JWE key management algorithm {}",
            jwe.header.alg
        ))));
    }

    let cipher = gcm_cipher(&jwe.header.enc)?;

    let epk = jwe
        .header
        .epk
        .as_ref()
        .ok_or_else(|| Error::root(CryptoError::DecryptionFailed).ctx("missing `epk` header"))?;

    let sender_key = public_pkey_from_jwk(epk)
        .with_err(|| CryptoError::DecryptionFailed)
        .ctx(|| "invalid ephemeral public key")?;

    let shared_secret =
        ecdh_shared_secret(recipient.private_pkey()?.as_ref(), sender_key.as_ref())?;

    let cek = concat_kdf_sha256(&shared_secret, jwe.header.enc.as_str(), jwe.header.enc.key_bits());

    let decode = |segment: &str, what: &'static str| {
        base64_url_decode(segment)
            .foreign_err(|| CryptoError::DecryptionFailed)
            .ctx(|| format!("invalid base64 in the {what} segment"))
    };

    let iv = decode(&jwe.iv_b64, "initialization vector")?;
    let ciphertext = decode(&jwe.ciphertext_b64, "ciphertext")?;
    let tag = decode(&jwe.tag_b64, "authentication tag")?;

    openssl::symm::decrypt_aead(
        cipher,
        &cek,
        Some(&iv),
        jwe.protected_b64.as_bytes(),
        &ciphertext,
        &tag,
    )
    .foreign_err(|| CryptoError::DecryptionFailed)
    .ctx(|| "authenticated decryption failed")
}

/// Returns the AES-GCM cipher for the given content encryption algorithm.
fn gcm_cipher(enc: &ContentEncryptionAlgorithm) -> Result<Cipher, CryptoError> {
    Ok(match enc {
        ContentEncryptionAlgorithm::A128Gcm => Cipher::aes_128_gcm(),
        ContentEncryptionAlgorithm::A192Gcm => Cipher::aes_192_gcm(),
        ContentEncryptionAlgorithm::A256Gcm => Cipher::aes_256_gcm(),
        other => {
            return Err(Error::root(CryptoError::Unsupported(format!(
                "JWE content encryption algorithm {other}"
            ))))
        }
    })
}

/// The Concat KDF of [RFC 7518, section 4.6][1] with SHA-256, for `ECDH-ES` in direct mode.
///
/// `AlgorithmID` is the `"enc"` value since the agreed key is used directly as the content
/// encryption key; `PartyUInfo` and `PartyVInfo` are empty.
///
/// [1]: <https://datatracker.ietf.org/doc/html/rfc7518#section-4.6>
fn concat_kdf_sha256(shared_secret: &[u8], algorithm_id: &str, key_bits: u32) -> Vec<u8> {
    let key_len = (key_bits / 8) as usize;

    let mut output = Vec::with_capacity(key_len);
    let mut round = 1u32;

    while output.len() < key_len {
        let mut hasher = Sha256::new();
        hasher.update(&round.to_be_bytes());
        hasher.update(shared_secret);
        // AlgorithmID
        hasher.update(&(algorithm_id.len() as u32).to_be_bytes());
        hasher.update(algorithm_id.as_bytes());
        // PartyUInfo and PartyVInfo, both empty
        hasher.update(&0u32.to_be_bytes());
        hasher.update(&0u32.to_be_bytes());
        // SuppPubInfo: the key length in bits
        hasher.update(&key_bits.to_be_bytes());

        output.extend_from_slice(&hasher.finish());
        round += 1;
    }

    output.truncate(key_len);
    output
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let recipient = EcKeyPair::generate().unwrap().with_kid("enc-key".to_owned());
        let plaintext = br#"{"vp_token":"...","state":"abc"}"#;

        let compact = encrypt_compact(
            plaintext,
            &recipient.public_jwk().unwrap(),
            ContentEncryptionAlgorithm::A256Gcm,
            Some("enc-key"),
        )
        .unwrap();

        let jwe: Jwe = compact.parse().unwrap();
        assert_eq!(jwe.kid(), Some("enc-key"));
        assert_eq!(jwe.header().alg, KeyManagementAlgorithm::EcdhEs);

        let decrypted = decrypt_compact(&jwe, &recipient).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn decrypt_with_wrong_key_fails() {
        let recipient = EcKeyPair::generate().unwrap();
        let wrong = EcKeyPair::generate().unwrap();

        let compact = encrypt_compact(
            b"secret",
            &recipient.public_jwk().unwrap(),
            ContentEncryptionAlgorithm::A128Gcm,
            None,
        )
        .unwrap();

        let jwe: Jwe = compact.parse().unwrap();
        let err = decrypt_compact(&jwe, &wrong).unwrap_err();

        assert_matches!(err.error, CryptoError::DecryptionFailed);
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let recipient = EcKeyPair::generate().unwrap();

        let compact = encrypt_compact(
            b"secret",
            &recipient.public_jwk().unwrap(),
            ContentEncryptionAlgorithm::A256Gcm,
            None,
        )
        .unwrap();

        let mut jwe: Jwe = compact.parse().unwrap();
        // flip a character inside the ciphertext segment
        let flipped = if jwe.ciphertext_b64.starts_with('A') { "B" } else { "A" };
        jwe.ciphertext_b64.replace_range(0..1, flipped);

        let err = decrypt_compact(&jwe, &recipient).unwrap_err();

        assert_matches!(err.error, CryptoError::DecryptionFailed);
    }

    #[test]
    fn segment_count_is_enforced() {
        let err = "a.b.c".parse::<Jwe>().unwrap_err();

        assert_matches!(err.error, CryptoError::DecryptionFailed);
    }

    #[test]
    fn round_trip_preserves_compact_form() {
        let recipient = EcKeyPair::generate().unwrap();

        let compact = encrypt_compact(
            b"payload",
            &recipient.public_jwk().unwrap(),
            ContentEncryptionAlgorithm::A256Gcm,
            None,
        )
        .unwrap();

        let jwe: Jwe = compact.parse().unwrap();

        assert_eq!(jwe.to_string(), compact);
    }
}
