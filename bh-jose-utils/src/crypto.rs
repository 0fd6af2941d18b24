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

//! Shared-secret derivation helpers built on the OpenSSL backend.
//!
//! The central piece is [`calculate_ephemeral_mac_key`], the `EMacKey` derivation of
//! [ISO/IEC 18013-5:2021][1] section `9.1.3.5`: an ECDH key agreement followed by
//! HKDF-SHA-256 with the session transcript hash as the salt.
//!
//! [1]: <https://www.iso.org/standard/69084.html>

use bherror::{
    traits::{ErrorContext as _, ForeignError as _},
    Result,
};
use openssl::{
    derive::Deriver,
    hash::MessageDigest,
    pkey::{HasPrivate, HasPublic, PKeyRef},
    sha::sha256,
    sign::Signer as OpensslSigner,
};

use crate::CryptoError;

/// The HKDF `info` string of the `EMacKey` derivation, as specified in the section `9.1.3.5`
/// of [ISO/IEC 18013-5:2021][1].
///
/// [1]: <https://www.iso.org/standard/69084.html>
const EMAC_KEY_INFO: &[u8] = b"EMacKey";

/// The length of the derived `EMacKey` in bytes.
const EMAC_KEY_LENGTH: usize = 32;

/// Computes the HMAC-SHA-256 of `data` under `key`.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let pkey = openssl::pkey::PKey::hmac(key).foreign_err(|| CryptoError::CryptoBackend)?;

    let mut signer = OpensslSigner::new(MessageDigest::sha256(), &pkey)
        .foreign_err(|| CryptoError::CryptoBackend)?;

    signer
        .sign_oneshot_to_vec(data)
        .foreign_err(|| CryptoError::CryptoBackend)
}

/// Computes the ECDH shared secret between the `private` and the `public` key.
///
/// The keys **MUST BE** on the same curve.
pub fn ecdh_shared_secret<A: HasPrivate, B: HasPublic>(
    private: &PKeyRef<A>,
    public: &PKeyRef<B>,
) -> Result<Vec<u8>, CryptoError> {
    let mut deriver = Deriver::new(private)
        .foreign_err(|| CryptoError::CryptoBackend)
        .ctx(|| "unable to set up the key agreement")?;

    deriver
        .set_peer(public)
        .foreign_err(|| CryptoError::KeyTypeMismatch)
        .ctx(|| "the peer key does not match the private key type")?;

    deriver
        .derive_to_vec()
        .foreign_err(|| CryptoError::CryptoBackend)
        .ctx(|| "key agreement failed")
}

/// HKDF-SHA-256 as specified in [RFC 5869][1].
///
/// [1]: <https://datatracker.ietf.org/doc/html/rfc5869>
pub fn hkdf_sha256(
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
    length: usize,
) -> Result<Vec<u8>, CryptoError> {
    // RFC 5869 limits the output to 255 blocks.
    if length > 255 * 32 {
        return Err(bherror::Error::root(CryptoError::Unsupported(
            "HKDF output length too large".to_string(),
        )));
    }

    // extract
    let prk = hmac_sha256(salt, ikm)?;

    // expand
    let mut okm = Vec::with_capacity(length);
    let mut block: Vec<u8> = Vec::new();
    let mut counter = 1u8;

    while okm.len() < length {
        let mut data = block.clone();
        data.extend_from_slice(info);
        data.push(counter);

        block = hmac_sha256(&prk, &data)?;
        okm.extend_from_slice(&block);
        counter += 1;
    }

    okm.truncate(length);
    Ok(okm)
}

/// Derives the ephemeral MAC key (`EMacKey`) binding a device authentication MAC to a
/// session, as specified in the section `9.1.3.5` of [ISO/IEC 18013-5:2021][1].
///
/// The key is derived with HKDF-SHA-256 from the ECDH shared secret of the two parties,
/// using the SHA-256 hash of the session transcript bytes as the salt and `"EMacKey"` as
/// the info string.
///
/// The device calls this with its own private key and the reader's ephemeral public key;
/// the reader calls it with its ephemeral private key and the device public key signed
/// into the credential.  Both derive the same 32-byte key.
///
/// [1]: <https://www.iso.org/standard/69084.html>
pub fn calculate_ephemeral_mac_key<A: HasPrivate, B: HasPublic>(
    private: &PKeyRef<A>,
    public: &PKeyRef<B>,
    session_transcript_bytes: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let shared_secret = ecdh_shared_secret(private, public)?;

    let salt = sha256(session_transcript_bytes);

    hkdf_sha256(&shared_secret, &salt, EMAC_KEY_INFO, EMAC_KEY_LENGTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::EcKeyPair;

    #[test]
    fn hkdf_sha256_rfc5869_test_case_1() {
        // https://datatracker.ietf.org/doc/html/rfc5869#appendix-A.1
        let ikm = hex::decode("0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b").unwrap();
        let salt = hex::decode("000102030405060708090a0b0c").unwrap();
        let info = hex::decode("f0f1f2f3f4f5f6f7f8f9").unwrap();

        let okm = hkdf_sha256(&ikm, &salt, &info, 42).unwrap();

        assert_eq!(
            hex::encode(okm),
            "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865"
        );
    }

    #[test]
    fn both_parties_derive_the_same_mac_key() {
        let device = EcKeyPair::generate().unwrap();
        let reader = EcKeyPair::generate().unwrap();

        let transcript = b"dummy session transcript bytes";

        let device_side = calculate_ephemeral_mac_key(
            device.private_pkey().unwrap().as_ref(),
            reader.public_pkey().unwrap().as_ref(),
            transcript,
        )
        .unwrap();

        let reader_side = calculate_ephemeral_mac_key(
            reader.private_pkey().unwrap().as_ref(),
            device.public_pkey().unwrap().as_ref(),
            transcript,
        )
        .unwrap();

        assert_eq!(device_side, reader_side);
        assert_eq!(device_side.len(), 32);
    }

    #[test]
    fn different_transcripts_derive_different_keys() {
        let device = EcKeyPair::generate().unwrap();
        let reader = EcKeyPair::generate().unwrap();

        let first = calculate_ephemeral_mac_key(
            device.private_pkey().unwrap().as_ref(),
            reader.public_pkey().unwrap().as_ref(),
            b"transcript A",
        )
        .unwrap();

        let second = calculate_ephemeral_mac_key(
            device.private_pkey().unwrap().as_ref(),
            reader.public_pkey().unwrap().as_ref(),
            b"transcript B",
        )
        .unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn hmac_sha256_rfc4231_test_case_2() {
        // https://datatracker.ietf.org/doc/html/rfc4231#section-4.3
        let mac = hmac_sha256(b"Jefe", b"what do ya want for nothing?").unwrap();

        assert_eq!(
            hex::encode(mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }
}
