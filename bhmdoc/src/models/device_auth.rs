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

//! The device authentication of the section `9.1.3` of the [ISO/IEC 18013-5:2021][1] standard.
//!
//! A presented document is authenticated by the Device either with a signature
//! (`COSE_Sign1`) or with a MAC (`COSE_Mac0` under the ECDH-derived `EMacKey`), in both cases
//! over the detached `DeviceAuthenticationBytes` payload binding the disclosed claims to the
//! session transcript.
//!
//! [1]: <https://www.iso.org/standard/69084.html>

use bh_jose_utils::{
    calculate_ephemeral_mac_key, hmac_sha256, keys::public_pkey_from_jwk, keys::EcKeyPair,
    JwkPublic, SignatureVerifier, Signer, SigningAlgorithm,
};
use bherror::traits::{ErrorContext as _, ForeignBoxed as _, PropagateError as _};
use coset::{Algorithm, Header, RegisteredLabelWithPrivate};
use serde::{Deserialize, Serialize};

use super::{
    common::DocType,
    issuer_auth::DeviceKey,
    response::DeviceNameSpacesBytes,
    transcript::SessionTranscript,
    BytesCbor,
};
use crate::{
    utils::coset::{
        coset_alg_to_jws_alg, deserialize_coset, jws_alg_to_coset_alg, serialize_coset,
    },
    MdocError, Result,
};

/// The COSE algorithm required for a device MAC: `HMAC 256/256`, i.e. algorithm `5` of
/// [RFC 9053, section 3.1][1].
///
/// [1]: <https://datatracker.ietf.org/doc/html/rfc9053#section-3.1>
const DEVICE_MAC_ALGORITHM: coset::iana::Algorithm = coset::iana::Algorithm::HMAC_256_256;

/// [`DeviceAuth`] as defined in the section `8.3.2.1.2.2` of the [ISO/IEC 18013-5:2021][1]
/// standard.
///
/// Exactly one of the two authentication forms is present, which the enum representation
/// enforces by construction.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceAuth {
    /// Authentication with the Device's signature.
    DeviceSignature(DeviceSignature),
    /// Authentication with a MAC under the ECDH-derived session key.
    DeviceMac(DeviceMac),
}

impl DeviceAuth {
    /// Creates the signature variant over the detached `payload`.
    ///
    /// The signing algorithm of the protected header is taken from the `signer`; the `kid` of
    /// the signer's JWK, if any, is placed into the unprotected header.
    pub(crate) fn new_signature(payload: &[u8], signer: &dyn Signer) -> Result<Self> {
        let protected = Header {
            alg: Some(Algorithm::Assigned(jws_alg_to_coset_alg(
                &signer.algorithm(),
            ))),
            ..Default::default()
        };

        let kid = signer
            .public_jwk()
            .foreign_boxed_err(|| MdocError::Signing)
            .ctx(|| "unable to fetch the signer JWK")?
            .get("kid")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned);

        let unprotected = match kid {
            Some(kid) => Header {
                key_id: kid.into_bytes(),
                ..Default::default()
            },
            None => Header::default(),
        };

        let cose_sign1 = coset::CoseSign1Builder::new()
            .protected(protected)
            .unprotected(unprotected)
            .try_create_detached_signature(payload, &[], |data| signer.sign(data))
            .foreign_boxed_err(|| MdocError::Signing)?
            .build();

        Ok(Self::DeviceSignature(DeviceSignature(cose_sign1)))
    }

    /// Creates the MAC variant over the detached `payload`.
    ///
    /// The `EMacKey` is derived from the Device private key and the reader's ephemeral public
    /// key, salted with the hash of the session transcript, and the tag is computed with
    /// `HMAC 256/256`.
    pub(crate) fn new_mac(
        payload: &[u8],
        device_key: &EcKeyPair,
        reader_public: &JwkPublic,
        session_transcript_bytes: &[u8],
    ) -> Result<Self> {
        let reader_key = public_pkey_from_jwk(reader_public)
            .with_err(|| MdocError::Signing)
            .ctx(|| "invalid reader ephemeral key")?;

        let mac_key = calculate_ephemeral_mac_key(
            device_key
                .private_pkey()
                .with_err(|| MdocError::Signing)?
                .as_ref(),
            reader_key.as_ref(),
            session_transcript_bytes,
        )
        .with_err(|| MdocError::Signing)
        .ctx(|| "unable to derive the EMacKey")?;

        let protected = Header {
            alg: Some(Algorithm::Assigned(DEVICE_MAC_ALGORITHM)),
            ..Default::default()
        };

        let mut cose_mac0 = coset::CoseMac0Builder::new()
            .protected(protected)
            .payload(payload.to_vec())
            .try_create_tag(&[], |data| {
                hmac_sha256(&mac_key, data).map_err(|error| error.to_string())
            })
            .map_err(|error| bherror::Error::root(MdocError::Signing).ctx(error))?
            .build();
        cose_mac0.payload = None;

        Ok(Self::DeviceMac(DeviceMac(cose_mac0)))
    }

    /// Verifies the Device signature over the detached `payload` with the [`DeviceKey`] signed
    /// into the credential.
    ///
    /// Fails with [`MdocError::InvalidMac`] when called on the MAC variant.
    pub(crate) fn verify_signature<'a>(
        &self,
        payload: &[u8],
        device_key: &DeviceKey,
        get_signature_verifier: impl Fn(SigningAlgorithm) -> Option<&'a dyn SignatureVerifier>,
    ) -> Result<()> {
        let Self::DeviceSignature(DeviceSignature(cose_sign1)) = self else {
            return Err(bherror::Error::root(MdocError::InvalidMac)
                .ctx("expected a device signature, found a MAC"));
        };

        let alg = signing_algorithm(&cose_sign1.protected.header)
            .ok_or_else(|| bherror::Error::root(MdocError::MissingSigningAlgorithm))
            .ctx(|| "device authentication")?;

        let jwk = device_key.as_jwk()?;

        let signature_verifier = get_signature_verifier(alg)
            .ok_or_else(|| bherror::Error::root(MdocError::MissingSignatureVerifier(alg)))?;

        cose_sign1.verify_detached_signature(payload, &[], |sig, data| {
            let verified = signature_verifier
                .verify(data, sig, &jwk)
                .foreign_boxed_err(|| MdocError::InvalidSignature)
                .ctx(|| "error while verifying signature")?;

            if !verified {
                return Err(bherror::Error::root(MdocError::InvalidSignature)
                    .ctx("the device signature is not valid"));
            }

            Ok(())
        })
    }

    /// Verifies the Device MAC over the detached `payload`, re-deriving the `EMacKey` from the
    /// reader's ephemeral private key and the [`DeviceKey`] signed into the credential.
    ///
    /// Fails with [`MdocError::InvalidSignature`] when called on the signature variant.
    pub(crate) fn verify_mac(
        &self,
        payload: &[u8],
        device_key: &DeviceKey,
        reader_ephemeral_key: &EcKeyPair,
        session_transcript_bytes: &[u8],
    ) -> Result<()> {
        let Self::DeviceMac(device_mac) = self else {
            return Err(bherror::Error::root(MdocError::InvalidSignature)
                .ctx("expected a device MAC, found a signature"));
        };

        if !device_mac.has_required_algorithm() {
            return Err(bherror::Error::root(MdocError::InvalidMac)
                .ctx("Device MAC must use alg 5 (HMAC 256/256)"));
        }

        let device_public = public_pkey_from_jwk(&device_key.as_jwk()?)
            .with_err(|| MdocError::InvalidMac)
            .ctx(|| "invalid signed device key")?;

        let mac_key = calculate_ephemeral_mac_key(
            reader_ephemeral_key
                .private_pkey()
                .with_err(|| MdocError::InvalidMac)?
                .as_ref(),
            device_public.as_ref(),
            session_transcript_bytes,
        )
        .with_err(|| MdocError::InvalidMac)
        .ctx(|| "unable to derive the EMacKey")?;

        let mut mac0_with_payload = device_mac.0.clone();
        mac0_with_payload.payload = Some(payload.to_vec());

        mac0_with_payload.verify_tag(&[], |tag, data| {
            let computed = hmac_sha256(&mac_key, data).with_err(|| MdocError::InvalidMac)?;

            if computed.len() != tag.len() || !openssl::memcmp::eq(&computed, tag) {
                return Err(
                    bherror::Error::root(MdocError::InvalidMac).ctx("the MAC tag is not valid")
                );
            }

            Ok(())
        })
    }

    /// Whether this is the MAC variant.
    pub fn is_mac(&self) -> bool {
        matches!(self, Self::DeviceMac(_))
    }

    /// Whether the MAC variant carries the required `HMAC 256/256` algorithm.
    ///
    /// Returns [`None`] for the signature variant.
    pub fn mac_has_required_algorithm(&self) -> Option<bool> {
        match self {
            Self::DeviceMac(mac) => Some(mac.has_required_algorithm()),
            Self::DeviceSignature(_) => None,
        }
    }
}

/// The Device signature, a `COSE_Sign1` with a detached payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSignature(
    #[serde(
        serialize_with = "serialize_coset",
        deserialize_with = "deserialize_coset"
    )]
    pub(crate) coset::CoseSign1,
);

/// The Device MAC, a `COSE_Mac0` with a detached payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceMac(
    #[serde(
        serialize_with = "serialize_coset",
        deserialize_with = "deserialize_coset"
    )]
    pub(crate) coset::CoseMac0,
);

impl DeviceMac {
    /// Whether the protected header carries the required `HMAC 256/256` algorithm.
    fn has_required_algorithm(&self) -> bool {
        self.0.protected.header.alg
            == Some(Algorithm::Assigned(DEVICE_MAC_ALGORITHM))
    }
}

/// Extracts the supported [`SigningAlgorithm`] of a COSE header, if present.
fn signing_algorithm(header: &Header) -> Option<SigningAlgorithm> {
    let RegisteredLabelWithPrivate::Assigned(alg) = header.alg.as_ref()? else {
        return None;
    };

    coset_alg_to_jws_alg(alg)
}

/// [`DeviceAuthentication`] as defined in the section `9.1.3.4` of the [ISO/IEC 18013-5:2021][1]
/// standard.
///
/// Its tagged `bstr .cbor` encoding (`DeviceAuthenticationBytes`) is the detached payload of
/// both device authentication forms.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceAuthentication(String, SessionTranscript, DocType, DeviceNameSpacesBytes);

impl DeviceAuthentication {
    const CONTEXT: &'static str = "DeviceAuthentication";

    pub(crate) fn new(
        session_transcript: SessionTranscript,
        doc_type: DocType,
        name_spaces: DeviceNameSpacesBytes,
    ) -> Self {
        Self(
            Self::CONTEXT.to_owned(),
            session_transcript,
            doc_type,
            name_spaces,
        )
    }

    /// Serializes `self` into the `DeviceAuthenticationBytes` used as the detached COSE payload.
    pub(crate) fn to_detached_payload(&self) -> Result<Vec<u8>> {
        BytesCbor::from(self.clone())
            .to_tagged_bytes()
            .map_err(|error| {
                bherror::Error::root(MdocError::DeviceAuthentication).ctx(error.to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use bh_jose_utils::Es256Verifier;

    use super::*;
    use crate::{
        models::response::DeviceNameSpaces,
        utils::test::{device_signer, dummy_device_key},
    };

    fn detached_payload() -> Vec<u8> {
        let transcript = SessionTranscript::oid4vp("client", "uri", "nonce", "m1").unwrap();

        DeviceAuthentication::new(
            transcript,
            "org.iso.18013.5.1.mDL".into(),
            DeviceNameSpaces::default().into(),
        )
        .to_detached_payload()
        .unwrap()
    }

    #[test]
    fn signature_round_trip() {
        let (signer, device_key) = dummy_device_key();
        let payload = detached_payload();

        let auth = DeviceAuth::new_signature(&payload, &signer).unwrap();

        auth.verify_signature(&payload, &device_key, |_| Some(&Es256Verifier))
            .unwrap();
    }

    #[test]
    fn signature_with_wrong_payload_fails() {
        let (signer, device_key) = dummy_device_key();
        let payload = detached_payload();

        let auth = DeviceAuth::new_signature(&payload, &signer).unwrap();

        let err = auth
            .verify_signature(b"other payload", &device_key, |_| Some(&Es256Verifier))
            .unwrap_err();

        assert_matches!(err.error, MdocError::InvalidSignature);
    }

    #[test]
    fn mac_round_trip() {
        let device = device_signer();
        let device_key = DeviceKey::from_jwk(&device.public_jwk().unwrap()).unwrap();
        let device_pair = crate::utils::test::device_key_pair();
        let reader = EcKeyPair::generate().unwrap();

        let transcript = SessionTranscript::oid4vp("client", "uri", "nonce", "m1").unwrap();
        let transcript_bytes = transcript.to_tagged_cbor_bytes().unwrap();
        let payload = detached_payload();

        let auth = DeviceAuth::new_mac(
            &payload,
            &device_pair,
            &reader.public_jwk().unwrap(),
            &transcript_bytes,
        )
        .unwrap();

        assert!(auth.is_mac());
        assert_eq!(auth.mac_has_required_algorithm(), Some(true));

        auth.verify_mac(&payload, &device_key, &reader, &transcript_bytes)
            .unwrap();
    }

    #[test]
    fn mac_with_wrong_reader_key_fails() {
        let device = device_signer();
        let device_key = DeviceKey::from_jwk(&device.public_jwk().unwrap()).unwrap();
        let device_pair = crate::utils::test::device_key_pair();
        let reader = EcKeyPair::generate().unwrap();
        let wrong_reader = EcKeyPair::generate().unwrap();

        let transcript = SessionTranscript::oid4vp("client", "uri", "nonce", "m1").unwrap();
        let transcript_bytes = transcript.to_tagged_cbor_bytes().unwrap();
        let payload = detached_payload();

        let auth = DeviceAuth::new_mac(
            &payload,
            &device_pair,
            &reader.public_jwk().unwrap(),
            &transcript_bytes,
        )
        .unwrap();

        let err = auth
            .verify_mac(&payload, &device_key, &wrong_reader, &transcript_bytes)
            .unwrap_err();

        assert_matches!(err.error, MdocError::InvalidMac);
    }
}
