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

//! This module defines the data model described in the section "8.3.2.1.2.2 Device retrieval mdoc
//! response" of the [ISO/IEC 18013-5:2021][1] standard.
//!
//! [1]: <https://www.iso.org/standard/69084.html>
use std::collections::HashMap;

use bherror::traits::{ErrorContext as _, ForeignError as _};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::issuer_auth::{DigestAlgorithm, IssuerAuth, ValidityInfo};
use crate::{
    models::{
        common::{BorrowedClaims, Claims, DataElementIdentifier, DataElementValue, DocType, NameSpace},
        device_auth::DeviceAuth,
        issuer_auth::DeviceKey,
        Bytes, BytesCbor,
    },
    utils::{
        base64::{base64_url_decode, base64_url_encode},
        digest,
    },
    MdocError, Result,
};

/// The version of the [`DeviceResponse`] structure.
///
/// The value is currently specified in the section `8.3.2.1.2.2` of the [ISO/IEC 18013-5:2021][1].
///
/// [1]: <https://www.iso.org/standard/69084.html>
pub(crate) const DEVICE_RESPONSE_VERSION: &str = "1.0";

/// [`DeviceResponse`] as defined in the section `8.3.2.1.2.2` of the [ISO/IEC 18013-5:2021][1]
/// standard.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceResponse {
    pub(crate) version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) documents: Option<Vec<Document>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) document_errors: Option<Vec<DocumentError>>,
    pub(crate) status: u64,
}

impl DeviceResponse {
    pub(crate) fn new(documents: Vec<Document>) -> Self {
        Self {
            version: DEVICE_RESPONSE_VERSION.to_owned(),
            // set to `None` if no `Document`s are present
            documents: (!documents.is_empty()).then_some(documents),
            document_errors: None,
            status: 0,
        }
    }

    /// Parses the provided _CBOR_ bytes into a [`DeviceResponse`].
    pub fn from_cbor_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes)
            .foreign_err(|| MdocError::DeviceResponseParse("invalid CBOR".to_owned()))
    }

    /// Serializes the [`DeviceResponse`] into _CBOR_ bytes.
    pub fn to_cbor_bytes(&self) -> Result<Vec<u8>> {
        let mut cbor = Vec::new();
        ciborium::into_writer(self, &mut cbor).foreign_err(|| {
            MdocError::DeviceResponseParse("serialization to CBOR failed".to_owned())
        })?;

        Ok(cbor)
    }

    /// Parses the provided `base64url`-encoded (**without padding**) `string` of _CBOR_ data into
    /// [`DeviceResponse`], as per `Table B.6` of [ISO/IEC TS 18013-7:2024][1].
    ///
    /// [1]: <https://www.iso.org/standard/82772.html>
    pub fn from_base64_cbor(value: &str) -> Result<Self> {
        let decoded = base64_url_decode(value)
            .foreign_err(|| MdocError::DeviceResponseParse("invalid base64".to_owned()))?;

        Self::from_cbor_bytes(&decoded)
    }

    /// Serializes the [`DeviceResponse`] to `base64url`-encoded (**without padding**) `string` of
    /// _CBOR_ data, as per `Table B.6` of [ISO/IEC TS 18013-7:2024][1].
    ///
    /// [1]: <https://www.iso.org/standard/82772.html>
    pub fn to_base64_cbor(&self) -> Result<String> {
        Ok(base64_url_encode(self.to_cbor_bytes()?))
    }

    /// The `version` of the response.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Borrows the underlying [`Document`]s.
    pub fn documents(&self) -> &[Document] {
        self.documents.as_deref().unwrap_or_default()
    }

    /// Consumes the [`DeviceResponse`] and returns the underlying
    /// [`Document`]s.
    pub fn into_documents(self) -> Option<Vec<Document>> {
        self.documents
    }
}

/// [`Document`] as defined in the section `8.3.2.1.2.2` of the [ISO/IEC 18013-5:2021][1] standard.
///
/// Unlike the standard, which distinguishes issuer-signed from device-signed documents by
/// nesting, the device-signed part here is simply optional.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub(crate) doc_type: DocType,
    pub(crate) issuer_signed: IssuerSigned,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) device_signed: Option<DeviceSigned>,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Errors>,
}

impl Document {
    pub(crate) fn new(
        doc_type: DocType,
        issuer_signed: IssuerSigned,
        device_signed: Option<DeviceSigned>,
    ) -> Self {
        Self {
            doc_type,
            issuer_signed,
            device_signed,
            errors: None,
        }
    }

    /// The document type of this [`Document`].
    pub fn doc_type(&self) -> &DocType {
        &self.doc_type
    }

    /// The issuer-signed part of this [`Document`].
    pub fn issuer_signed(&self) -> &IssuerSigned {
        &self.issuer_signed
    }

    /// The device-signed part of this [`Document`], if present.
    pub fn device_signed(&self) -> Option<&DeviceSigned> {
        self.device_signed.as_ref()
    }

    /// Extracts and returns only the data elements.
    pub fn into_claims(self) -> Claims {
        self.issuer_signed.into_claims()
    }
}

/// [`DocumentError`] as defined in the section `8.3.2.1.2.2` of the [ISO/IEC 18013-5:2021][1]
/// standard.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentError(DocType, ErrorCode);

/// [`IssuerSigned`] as defined in the section `8.3.2.1.2.2` of the [ISO/IEC 18013-5:2021][1]
/// standard.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSigned {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) name_spaces: Option<IssuerNameSpaces>,
    pub(crate) issuer_auth: IssuerAuth,
}

impl IssuerSigned {
    /// Creates a new `IssuerSigned` with freshly salted items and the signed
    /// [`MobileSecurityObject`][crate::models::issuer_auth::MobileSecurityObject] covering their
    /// digests.
    pub(crate) fn new<Signer: bh_jose_utils::Signer + bh_jose_utils::HasX5Chain, R: Rng + ?Sized>(
        doc_type: DocType,
        name_spaces: Claims,
        device_key: DeviceKey,
        signer: &Signer,
        rng: &mut R,
        validity_info: ValidityInfo,
        digest_algorithm: DigestAlgorithm,
    ) -> Result<Self> {
        let name_spaces = IssuerNameSpaces(
            name_spaces
                .0
                .into_iter()
                .map(|(name_space, items)| {
                    let items = items
                        .into_iter()
                        .enumerate()
                        .map(|(digest_id, (element_identifier, element_value))| {
                            IssuerSignedItem {
                                digest_id: digest_id.into(),
                                random: Bytes::random_salt(rng),
                                element_identifier,
                                element_value,
                            }
                            .into()
                        })
                        .collect();

                    (name_space, items)
                })
                .collect(),
        );

        let issuer_auth = IssuerAuth::new(
            doc_type,
            &name_spaces,
            device_key,
            signer,
            validity_info,
            digest_algorithm,
        )?;

        Ok(Self {
            name_spaces: Some(name_spaces),
            issuer_auth,
        })
    }

    /// Deserializes the provided _CBOR_-serialized and _base64url_-encoded (**without padding**)
    /// string into the [`IssuerSigned`].
    pub(crate) fn from_base64_url(base64_url: &str) -> Result<Self> {
        let decoded = base64_url_decode(base64_url)
            .foreign_err(|| MdocError::IssuerSignedParse)
            .ctx(|| "invalid base64-url payload")?;

        ciborium::from_reader(decoded.as_slice())
            .foreign_err(|| MdocError::IssuerSignedParse)
            .ctx(|| "invalid CBOR payload")
    }

    /// Serializes the [`IssuerSigned`] into the _CBOR_-serialized and _base64url_-encoded
    /// (**without padding**) string.
    pub(crate) fn to_base64_url(&self) -> Result<String> {
        let mut cbor = Vec::new();
        ciborium::into_writer(self, &mut cbor)
            .foreign_err(|| MdocError::IssuerSignedParse)
            .ctx(|| "serialization to CBOR failed")?;

        Ok(base64_url_encode(cbor))
    }

    /// Extracts and returns only the data elements.
    pub fn into_claims(self) -> Claims {
        self.name_spaces
            .map(IssuerNameSpaces::into_claims)
            .unwrap_or_else(|| Claims(HashMap::new()))
    }

    /// Extracts and returns the [`BorrowedClaims`].
    pub fn claims(&self) -> BorrowedClaims<'_> {
        self.name_spaces
            .as_ref()
            .map(IssuerNameSpaces::claims)
            .unwrap_or_else(|| BorrowedClaims(HashMap::new()))
    }

    /// The issuer authentication structure.
    pub fn issuer_auth(&self) -> &IssuerAuth {
        &self.issuer_auth
    }

    /// Returns the signed [`DeviceKey`] of the respective `mdoc` Device the
    /// credential is issued to.
    pub fn device_key(&self) -> Result<DeviceKey> {
        self.issuer_auth.device_key()
    }

    /// Verifies the issuer's signature of the underlying [`IssuerAuth`].
    pub(crate) fn verify_signature<'a>(
        &self,
        get_signature_verifier: impl Fn(
            bh_jose_utils::SigningAlgorithm,
        ) -> Option<&'a dyn bh_jose_utils::SignatureVerifier>,
    ) -> Result<()> {
        self.issuer_auth.verify_signature(get_signature_verifier)
    }

    /// Validates the claims of the underlying [`IssuerAuth`].
    ///
    /// Unlike the Verifier, this does not reject _not-yet-valid_ credentials.
    ///
    /// **Note**: this is intended to be used only by the `mDoc` Device.
    pub(crate) fn validate_device(&self, current_time: u64, doc_type: &DocType) -> Result<()> {
        self.issuer_auth
            .validate_device(current_time, doc_type, self.name_spaces.as_ref())
    }
}

/// [`IssuerNameSpaces`] as defined in the section `8.3.2.1.2.2` of the [ISO/IEC 18013-5:2021][1]
/// standard.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IssuerNameSpaces(pub(crate) HashMap<NameSpace, Vec<IssuerSignedItemBytes>>);

impl IssuerNameSpaces {
    /// Extracts and returns only the data elements.
    pub fn into_claims(self) -> Claims {
        Claims(
            self.0
                .into_iter()
                .map(|(k, vs)| {
                    let vs_map = vs
                        .into_iter()
                        .map(|item| {
                            let item = IssuerSignedItem::from(item);
                            (item.element_identifier, item.element_value)
                        })
                        .collect();

                    (k, vs_map)
                })
                .collect(),
        )
    }

    /// Extracts and returns the [`BorrowedClaims`].
    fn claims(&self) -> BorrowedClaims<'_> {
        BorrowedClaims(
            self.0
                .iter()
                .map(|(k, vs)| {
                    let vs_map = vs
                        .iter()
                        .map(|item| {
                            (
                                &item.0.inner.element_identifier,
                                &item.0.inner.element_value,
                            )
                        })
                        .collect();

                    (k, vs_map)
                })
                .collect(),
        )
    }

    /// Converts the Issuer-signed claims to the format to be signed by the
    /// Device.
    pub(crate) fn to_device_name_spaces(&self) -> DeviceNameSpaces {
        DeviceNameSpaces(
            self.0
                .iter()
                .map(|(name_space, issuer_signed_items)| {
                    let device_signed_items = DeviceSignedItems(
                        issuer_signed_items
                            .iter()
                            .map(|item| {
                                (
                                    item.0.inner.element_identifier.clone(),
                                    item.0.inner.element_value.clone(),
                                )
                            })
                            .collect(),
                    );

                    (name_space.clone(), device_signed_items)
                })
                .collect(),
        )
    }
}

impl From<HashMap<NameSpace, Vec<IssuerSignedItemBytes>>> for IssuerNameSpaces {
    fn from(value: HashMap<NameSpace, Vec<IssuerSignedItemBytes>>) -> Self {
        Self(value)
    }
}

/// [`IssuerSignedItemBytes`] as defined in the section `8.3.2.1.2.2` of the [ISO/IEC
/// 18013-5:2021][1] standard.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IssuerSignedItemBytes(pub(crate) BytesCbor<IssuerSignedItem>);

impl IssuerSignedItemBytes {
    /// Computes the digest of the serialized `self`.
    ///
    /// The encoding received off the wire is digested verbatim, so that the digest stays stable
    /// across serialization round trips.
    pub fn digest(&self, alg: &DigestAlgorithm) -> Result<Vec<u8>> {
        let payload = self
            .0
            .to_tagged_bytes()
            .foreign_err(|| MdocError::IssuerAuth)
            .ctx(|| "unable to serialize `IssuerSignedItemBytes`")?;

        Ok(digest::digest(alg, payload))
    }

    /// The identifier of the wrapped data element.
    pub fn element_identifier(&self) -> &DataElementIdentifier {
        &self.0.inner.element_identifier
    }

    /// The value of the wrapped data element.
    pub fn element_value(&self) -> &DataElementValue {
        &self.0.inner.element_value
    }
}

impl From<IssuerSignedItem> for IssuerSignedItemBytes {
    fn from(value: IssuerSignedItem) -> Self {
        Self(value.into())
    }
}

impl From<IssuerSignedItemBytes> for IssuerSignedItem {
    fn from(value: IssuerSignedItemBytes) -> Self {
        value.0.inner
    }
}

/// [`IssuerSignedItem`] as defined in the section `8.3.2.1.2.2` of the [ISO/IEC 18013-5:2021][1]
/// standard.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSignedItem {
    pub(crate) random: Bytes,
    #[serde(rename = "digestID")]
    pub(crate) digest_id: DigestID,
    pub(crate) element_value: DataElementValue,
    pub(crate) element_identifier: DataElementIdentifier,
}

/// Digest ID for issuer data authentication.
#[derive(
    Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct DigestID(u64);

impl std::fmt::Display for DigestID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for DigestID {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<usize> for DigestID {
    fn from(value: usize) -> Self {
        Self(value as u64)
    }
}

/// [`DeviceSigned`] as defined in the section `8.3.2.1.2.2` of the [ISO/IEC 18013-5:2021][1]
/// standard.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSigned {
    pub(crate) name_spaces: DeviceNameSpacesBytes,
    pub(crate) device_auth: DeviceAuth,
}

impl DeviceSigned {
    pub(crate) fn new(name_spaces: DeviceNameSpacesBytes, device_auth: DeviceAuth) -> Self {
        Self {
            name_spaces,
            device_auth,
        }
    }

    /// The device authentication of this [`DeviceSigned`].
    pub fn device_auth(&self) -> &DeviceAuth {
        &self.device_auth
    }

    /// Extracts and returns only the data elements.
    pub fn into_claims(self) -> Claims {
        self.name_spaces.0.inner.into_claims()
    }
}

/// [`DeviceNameSpacesBytes`] as defined in the section `8.3.2.1.2.2` of the [ISO/IEC
/// 18013-5:2021][1] standard.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceNameSpacesBytes(pub(crate) BytesCbor<DeviceNameSpaces>);

impl From<DeviceNameSpaces> for DeviceNameSpacesBytes {
    fn from(value: DeviceNameSpaces) -> Self {
        Self(value.into())
    }
}

/// [`DeviceNameSpaces`] as defined in the section `8.3.2.1.2.2` of the [ISO/IEC 18013-5:2021][1]
/// standard.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceNameSpaces(pub(crate) HashMap<NameSpace, DeviceSignedItems>);

impl DeviceNameSpaces {
    /// Extracts and returns only the data elements.
    pub fn into_claims(self) -> Claims {
        Claims(self.0.into_iter().map(|(k, vs)| (k, vs.0)).collect())
    }
}

impl From<HashMap<NameSpace, DeviceSignedItems>> for DeviceNameSpaces {
    fn from(value: HashMap<NameSpace, DeviceSignedItems>) -> Self {
        Self(value)
    }
}

/// [`DeviceSignedItems`] as defined in the section `8.3.2.1.2.2` of the [ISO/IEC 18013-5:2021][1]
/// standard.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSignedItems(pub(crate) HashMap<DataElementIdentifier, DataElementValue>);

/// [`Errors`] as defined in the section `8.3.2.1.2.2` of the [ISO/IEC 18013-5:2021][1] standard.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Errors(HashMap<NameSpace, ErrorItems>);

/// [`ErrorItems`] as defined in the section `8.3.2.1.2.2` of the [ISO/IEC 18013-5:2021][1]
/// standard.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorItems(HashMap<DataElementIdentifier, ErrorCode>);

/// [`ErrorCode`] as defined in the section `8.3.2.1.2.2` of the [ISO/IEC 18013-5:2021][1]
/// standard.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorCode(i64);
