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

//! This module defines a [`Device`] type that holds an issued Credential, and the
//! [`DeviceResponseBuilder`] creating Verifiable Presentations of it.

use std::collections::HashMap;

use bh_jose_utils::{keys::EcKeyPair, JwkPublic, SignatureVerifier, Signer, SigningAlgorithm};
use bherror::traits::{ErrorContext as _, ForeignBoxed as _, PropagateError as _};

use crate::{
    models::{
        common::{BorrowedClaims, Claims, DataElementIdentifier, DocType, NameSpace},
        device_auth::{DeviceAuth, DeviceAuthentication},
        issuer_auth::{DeviceKey, ValidityInfo},
        presentation::{self, PresentationDefinition},
        response::{
            DeviceNameSpacesBytes, DeviceResponse, DeviceSigned, Document, IssuerNameSpaces,
            IssuerSigned,
        },
        transcript::SessionTranscript,
    },
    MdocError, Result,
};

/// This represents an `mDoc` device.
///
/// The device accepts an issued credential ([`Device::verify_issued`]), exposes its claims, and
/// creates selectively disclosed presentations of it through [`Device::response`].
#[derive(Debug)]
pub struct Device {
    doc_type: DocType,
    issuer_signed: IssuerSigned,
}

impl Device {
    /// Return the document type.
    ///
    /// In the context of OpenID for [Verifiable Presentations][1] and [Verifiable Credential
    /// Issuance][2] this identifies the type of the Credential.
    ///
    /// [1]: <https://openid.net/specs/openid-4-verifiable-presentations-1_0.html>
    /// [2]: <https://openid.net/specs/openid-4-verifiable-credential-issuance-1_0.html>
    pub fn doc_type(&self) -> &DocType {
        &self.doc_type
    }

    /// Accepts the issued `mDoc` (param. `issuer_signed`) after performing all the necessary
    /// validations.
    ///
    /// The provided credential **MUST BE** a _CBOR_-serialized and _base64url_-encoded (**without
    /// padding**) string.
    ///
    /// The following validations are performed.
    ///
    /// - The Issuer's signature must verify successfully.
    /// - The Credential must not be expired.
    /// - The provided `doc_type` must match the signed one.
    /// - The hashes of the provided claims must be signed.
    pub fn verify_issued<'a>(
        issuer_signed: &str,
        doc_type: DocType,
        current_time: u64,
        get_signature_verifier: impl Fn(SigningAlgorithm) -> Option<&'a dyn SignatureVerifier>,
    ) -> Result<Self> {
        let issuer_signed = IssuerSigned::from_base64_url(issuer_signed)?;

        // the Device does not verify the Issuer's authenticity against trust anchors
        issuer_signed.verify_signature(get_signature_verifier)?;

        issuer_signed.validate_device(current_time, &doc_type)?;

        Ok(Self {
            doc_type,
            issuer_signed,
        })
    }

    /// Starts building a Verifiable Presentation of the owned Credential.
    pub fn response(&self) -> DeviceResponseBuilder<'_> {
        DeviceResponseBuilder {
            device: self,
            presentation_definition: None,
            session_transcript: None,
            auth: None,
        }
    }

    /// Consumes `self` to extract and return the [`Claims`].
    pub fn into_claims(self) -> (DocType, Claims) {
        (self.doc_type, self.issuer_signed.into_claims())
    }

    /// Extracts and returns the [`BorrowedClaims`].
    pub fn claims(&self) -> (&DocType, BorrowedClaims<'_>) {
        (&self.doc_type, self.issuer_signed.claims())
    }

    /// Returns the [`ValidityInfo`] of the underlying credential.
    pub fn validity_info(&self) -> Result<ValidityInfo> {
        self.issuer_signed.issuer_auth().validity_info()
    }

    /// Verify that the [`DeviceKey`] signed by the `mdoc` Issuer matches the provided public
    /// JWK.
    fn check_device_key(&self, jwk: &JwkPublic) -> Result<()> {
        let signed_key = self.issuer_signed.device_key()?.as_jwk()?;
        let provided_key = DeviceKey::from_jwk(jwk)?.as_jwk()?;

        if signed_key != provided_key {
            return Err(bherror::Error::root(MdocError::InvalidDeviceSigner(
                "public key does not match the signed one".to_owned(),
            )));
        }

        Ok(())
    }
}

/// The device authentication chosen for a presentation.
enum ResponseAuth<'a> {
    /// Sign the device authentication payload with the Device private key.
    Signature(&'a dyn Signer),
    /// MAC the device authentication payload under the `EMacKey` agreed with the reader.
    Mac {
        device_key: &'a EcKeyPair,
        reader_key: &'a JwkPublic,
    },
}

/// A consuming builder assembling a selectively disclosed [`DeviceResponse`].
///
/// The requested claims are taken from a [`PresentationDefinition`], the session binding from a
/// [`SessionTranscript`], and the device authentication from either a signing key or an
/// ECDH-derived MAC key.  All required inputs are checked when [`sign`][Self::sign] is called.
pub struct DeviceResponseBuilder<'a> {
    device: &'a Device,
    presentation_definition: Option<PresentationDefinition>,
    session_transcript: Option<SessionTranscript>,
    auth: Option<ResponseAuth<'a>>,
}

impl<'a> DeviceResponseBuilder<'a> {
    /// Sets the [`PresentationDefinition`] selecting the claims to disclose.
    pub fn with_presentation_definition(mut self, definition: PresentationDefinition) -> Self {
        self.presentation_definition = Some(definition);
        self
    }

    /// Sets the [`SessionTranscript`] binding the presentation to the session.
    pub fn with_session_transcript(mut self, session_transcript: SessionTranscript) -> Self {
        self.session_transcript = Some(session_transcript);
        self
    }

    /// Authenticate the presentation with the Device's signature.
    pub fn authenticate_with_signature(mut self, signer: &'a dyn Signer) -> Self {
        self.auth = Some(ResponseAuth::Signature(signer));
        self
    }

    /// Authenticate the presentation with a MAC under the key agreed between the Device private
    /// key and the reader's ephemeral public key.
    pub fn authenticate_with_mac(
        mut self,
        device_key: &'a EcKeyPair,
        reader_key: &'a JwkPublic,
    ) -> Self {
        self.auth = Some(ResponseAuth::Mac {
            device_key,
            reader_key,
        });
        self
    }

    /// Builds the [`DeviceResponse`], checking all required inputs.
    ///
    /// # Errors
    ///
    /// - [`EmptyPresentationDefinition`][MdocError::EmptyPresentationDefinition] if no
    ///   definition was provided or it contains no Input Descriptors,
    /// - [`DuplicateInputDescriptorId`][MdocError::DuplicateInputDescriptorId] if the definition
    ///   repeats a descriptor identifier,
    /// - [`DocTypeNotFound`][MdocError::DocTypeNotFound] if a descriptor requests a `doc_type`
    ///   the Device does not hold,
    /// - [`HandoverNotSet`][MdocError::HandoverNotSet] if no session transcript was provided,
    /// - [`KeyNotSet`][MdocError::KeyNotSet] if no device authentication key was provided,
    /// - [`InvalidDeviceSigner`][MdocError::InvalidDeviceSigner] if the provided key does not
    ///   match the Device public key signed into the credential.
    pub fn sign(self) -> Result<DeviceResponse> {
        let definition = self
            .presentation_definition
            .ok_or_else(|| bherror::Error::root(MdocError::EmptyPresentationDefinition))?;
        definition.validate()?;

        let session_transcript = self
            .session_transcript
            .ok_or_else(|| bherror::Error::root(MdocError::HandoverNotSet))?;

        let auth = self
            .auth
            .ok_or_else(|| bherror::Error::root(MdocError::KeyNotSet))?;

        // the provided key must match the signed device public key
        match &auth {
            ResponseAuth::Signature(signer) => {
                let jwk = signer.public_jwk().foreign_boxed_err(|| {
                    MdocError::InvalidDeviceSigner("unable to fetch public JWK".to_owned())
                })?;
                self.device.check_device_key(&jwk)?;
            }
            ResponseAuth::Mac { device_key, .. } => {
                let jwk = device_key
                    .public_jwk()
                    .with_err(|| MdocError::KeyNotSet)
                    .ctx(|| "unable to export the device key")?;
                self.device.check_device_key(&jwk)?;
            }
        }

        // every descriptor must be answerable by the held credential
        let mut requested: HashMap<NameSpace, Vec<DataElementIdentifier>> = HashMap::new();
        for descriptor in &definition.input_descriptors {
            if descriptor.id != self.device.doc_type.0 {
                return Err(bherror::Error::root(MdocError::DocTypeNotFound(
                    descriptor.id.as_str().into(),
                )));
            }

            for (name_space, mut elements) in descriptor.requested_elements()? {
                requested.entry(name_space).or_default().append(&mut elements);
            }
        }

        // disclose the matching items verbatim
        let disclosed = self
            .device
            .issuer_signed
            .name_spaces
            .as_ref()
            .and_then(|name_spaces| presentation::disclose(name_spaces, &requested));

        let issuer_signed = IssuerSigned {
            name_spaces: disclosed.clone(),
            issuer_auth: self.device.issuer_signed.issuer_auth.clone(),
        };

        // the disclosed claims are also signed by the Device
        let device_name_spaces: DeviceNameSpacesBytes = disclosed
            .as_ref()
            .map(IssuerNameSpaces::to_device_name_spaces)
            .unwrap_or_default()
            .into();

        let payload = DeviceAuthentication::new(
            session_transcript.clone(),
            self.device.doc_type.clone(),
            device_name_spaces.clone(),
        )
        .to_detached_payload()?;

        let device_auth = match auth {
            ResponseAuth::Signature(signer) => DeviceAuth::new_signature(&payload, signer)?,
            ResponseAuth::Mac {
                device_key,
                reader_key,
            } => DeviceAuth::new_mac(
                &payload,
                device_key,
                reader_key,
                &session_transcript.to_tagged_cbor_bytes()?,
            )?,
        };

        let document = Document::new(
            self.device.doc_type.clone(),
            issuer_signed,
            Some(DeviceSigned::new(device_name_spaces, device_auth)),
        );

        Ok(DeviceResponse::new(vec![document]))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use bh_jose_utils::Es256Verifier;

    use super::*;
    use crate::{
        models::mdl::{MDL_DOCUMENT_TYPE, MDL_NAMESPACE},
        utils::test::{
            device_signer, dummy_presentation_definition, issue_dummy_mdoc,
            issue_dummy_mdoc_to_device, issuer_signer, test_session_transcript,
        },
        MdocError,
    };

    #[test]
    fn test_verify_issued_success() {
        let issued = issue_dummy_mdoc(100);

        let device = Device::verify_issued(
            &issued.serialize_issuer_signed().unwrap(),
            MDL_DOCUMENT_TYPE.into(),
            105,
            |_| Some(&Es256Verifier),
        )
        .unwrap();

        let (doc_type, claims) = device.into_claims();

        assert_eq!(DocType::from(MDL_DOCUMENT_TYPE), doc_type);

        let mdl_claims = claims.0.get(&MDL_NAMESPACE.into()).unwrap();
        assert_eq!(mdl_claims.get(&"family_name".into()), Some(&"Doe".into()));
        assert_eq!(mdl_claims.get(&"given_name".into()), Some(&"John".into()));
    }

    #[test]
    fn test_verify_issued_parse_fail() {
        let err = Device::verify_issued("<INVALID-MDOC>", MDL_DOCUMENT_TYPE.into(), 100, |_| None)
            .unwrap_err();

        assert_matches!(err.error, MdocError::IssuerSignedParse);
    }

    #[test]
    fn test_verify_issued_expired_fails() {
        let issued = issue_dummy_mdoc(100);

        let err = Device::verify_issued(
            &issued.serialize_issuer_signed().unwrap(),
            MDL_DOCUMENT_TYPE.into(),
            100 + 400 * 24 * 60 * 60, // 400 days after issuance
            |_| Some(&Es256Verifier),
        )
        .unwrap_err();

        assert_matches!(err.error, MdocError::DocumentExpired(_));
    }

    #[test]
    fn test_verify_issued_not_yet_valid_success() {
        let issued = issue_dummy_mdoc(100);

        let _device = Device::verify_issued(
            &issued.serialize_issuer_signed().unwrap(),
            MDL_DOCUMENT_TYPE.into(),
            40, // 1 minute before issuance
            |_| Some(&Es256Verifier),
        )
        .unwrap();
    }

    #[test]
    fn test_verify_issued_invalid_doc_type_fails() {
        let issued = issue_dummy_mdoc(100);

        let err = Device::verify_issued(
            &issued.serialize_issuer_signed().unwrap(),
            "<INVALID-DOC-TYPE>".into(),
            100,
            |_| Some(&Es256Verifier),
        )
        .unwrap_err();

        assert_matches!(
            err.error,
            MdocError::InvalidDocType(expected, actual)
                if expected == "<INVALID-DOC-TYPE>".into() && actual == MDL_DOCUMENT_TYPE.into()
        );
    }

    #[test]
    fn test_sign_selectively_discloses() {
        let device = issue_dummy_mdoc_to_device(100);
        let signer = device_signer();

        let response = device
            .response()
            .with_presentation_definition(dummy_presentation_definition(&["family_name"]))
            .with_session_transcript(test_session_transcript())
            .authenticate_with_signature(&signer)
            .sign()
            .unwrap();

        let documents = response.into_documents().unwrap();
        assert_eq!(1, documents.len());
        let document = documents.into_iter().next().unwrap();

        let issuer_claims = document.issuer_signed.into_claims().0;
        let mdl_claims = issuer_claims.get(&MDL_NAMESPACE.into()).unwrap();

        assert_eq!(mdl_claims.len(), 1);
        assert_eq!(mdl_claims.get(&"family_name".into()), Some(&"Doe".into()));
    }

    #[test]
    fn test_sign_without_presentation_definition_fails() {
        let device = issue_dummy_mdoc_to_device(100);
        let signer = device_signer();

        let err = device
            .response()
            .with_session_transcript(test_session_transcript())
            .authenticate_with_signature(&signer)
            .sign()
            .unwrap_err();

        assert_matches!(err.error, MdocError::EmptyPresentationDefinition);
    }

    #[test]
    fn test_sign_without_transcript_fails() {
        let device = issue_dummy_mdoc_to_device(100);
        let signer = device_signer();

        let err = device
            .response()
            .with_presentation_definition(dummy_presentation_definition(&["family_name"]))
            .authenticate_with_signature(&signer)
            .sign()
            .unwrap_err();

        assert_matches!(err.error, MdocError::HandoverNotSet);
    }

    #[test]
    fn test_sign_without_key_fails() {
        let device = issue_dummy_mdoc_to_device(100);

        let err = device
            .response()
            .with_presentation_definition(dummy_presentation_definition(&["family_name"]))
            .with_session_transcript(test_session_transcript())
            .sign()
            .unwrap_err();

        assert_matches!(err.error, MdocError::KeyNotSet);
    }

    #[test]
    fn test_sign_with_unknown_doc_type_fails() {
        let device = issue_dummy_mdoc_to_device(100);
        let signer = device_signer();

        let mut definition = dummy_presentation_definition(&["family_name"]);
        definition.input_descriptors[0].id = "org.example.other".to_owned();

        let err = device
            .response()
            .with_presentation_definition(definition)
            .with_session_transcript(test_session_transcript())
            .authenticate_with_signature(&signer)
            .sign()
            .unwrap_err();

        assert_matches!(
            err.error,
            MdocError::DocTypeNotFound(doc_type) if doc_type == "org.example.other".into()
        );
    }

    #[test]
    fn test_sign_with_wrong_signer_fails() {
        let device = issue_dummy_mdoc_to_device(100);
        // the issuer key is not the signed device key
        let (wrong_signer, _) = issuer_signer("US", None);

        let err = device
            .response()
            .with_presentation_definition(dummy_presentation_definition(&["family_name"]))
            .with_session_transcript(test_session_transcript())
            .authenticate_with_signature(&wrong_signer)
            .sign()
            .unwrap_err();

        assert_matches!(
            err.error,
            MdocError::InvalidDeviceSigner(s) if s == "public key does not match the signed one"
        );
    }

    #[test]
    fn test_sign_non_existent_claims_ignored() {
        let device = issue_dummy_mdoc_to_device(100);
        let signer = device_signer();

        let response = device
            .response()
            .with_presentation_definition(dummy_presentation_definition(&[
                "family_name",
                "non_existent_claim",
            ]))
            .with_session_transcript(test_session_transcript())
            .authenticate_with_signature(&signer)
            .sign()
            .unwrap();

        let documents = response.into_documents().unwrap();
        let document = documents.into_iter().next().unwrap();

        let issuer_claims = document.issuer_signed.into_claims().0;
        let mdl_claims = issuer_claims.get(&MDL_NAMESPACE.into()).unwrap();

        assert_eq!(mdl_claims.len(), 1);
        assert!(mdl_claims.contains_key(&"family_name".into()));
    }
}
