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

//! The session transcript binding a device authentication to a concrete retrieval session, as
//! defined in the section `9.1.5.1` of the [ISO/IEC 18013-5:2021][1] standard, with the
//! `OID4VPHandover` profile of [ISO/IEC TS 18013-7:2024][2] for presentations over OpenID4VP.
//!
//! [1]: <https://www.iso.org/standard/69084.html>
//! [2]: <https://www.iso.org/standard/82772.html>

use bherror::traits::ForeignError as _;
use ciborium::Value;
use serde::{Deserialize, Serialize};

use crate::{
    models::{Bytes, BytesCbor},
    utils::digest::sha256,
    MdocError, Result,
};

/// [`SessionTranscript`] as defined in the section `9.1.5.1` of the [ISO/IEC 18013-5:2021][1]
/// standard.
///
/// The first two elements carry the device engagement and the reader key of the NFC/BLE device
/// retrieval flows; for presentations over OpenID4VP both are `null` and the binding lives
/// entirely in the handover element.
///
/// [1]: <https://www.iso.org/standard/69084.html>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTranscript(Option<Bytes>, Option<Bytes>, Value);

impl SessionTranscript {
    /// Creates a [`SessionTranscript`] from its three elements.
    pub fn new(
        device_engagement_bytes: Option<Bytes>,
        e_reader_key_bytes: Option<Bytes>,
        handover: Value,
    ) -> Self {
        Self(device_engagement_bytes, e_reader_key_bytes, handover)
    }

    /// Creates the [`SessionTranscript`] with the `OID4VPHandover` as specified in the `Annex B`
    /// of [ISO/IEC TS 18013-7:2024][1].
    ///
    /// The handover consists of the hashes binding the presentation to the Verifier
    /// (`client_id`, `response_uri`, its `nonce`) and to the `mdoc_generated_nonce` chosen by
    /// the Device.
    ///
    /// [1]: <https://www.iso.org/standard/82772.html>
    pub fn oid4vp(
        client_id: &str,
        response_uri: &str,
        nonce: &str,
        mdoc_generated_nonce: &str,
    ) -> Result<Self> {
        let client_id_hash = oid4vp_hash(client_id, mdoc_generated_nonce)?;
        let response_uri_hash = oid4vp_hash(response_uri, mdoc_generated_nonce)?;

        let handover = Value::Array(vec![
            Value::Bytes(client_id_hash),
            Value::Bytes(response_uri_hash),
            Value::Text(nonce.to_owned()),
        ]);

        Ok(Self(None, None, handover))
    }

    /// Serializes `self` into the `SessionTranscriptBytes`, i.e. the tagged `bstr .cbor` form
    /// the device authentication payload and the `EMacKey` derivation are computed over.
    pub fn to_tagged_cbor_bytes(&self) -> Result<Vec<u8>> {
        BytesCbor::from(self.clone())
            .to_tagged_bytes()
            .foreign_err(|| MdocError::DeviceAuthentication)
    }
}

/// The SHA-256 hash over the _CBOR_ array `[value, mdocGeneratedNonce]`, as used by the
/// `OID4VPHandover` elements.
fn oid4vp_hash(value: &str, mdoc_generated_nonce: &str) -> Result<Vec<u8>> {
    let pair = Value::Array(vec![
        Value::Text(value.to_owned()),
        Value::Text(mdoc_generated_nonce.to_owned()),
    ]);

    let mut encoded = Vec::new();
    ciborium::into_writer(&pair, &mut encoded).foreign_err(|| MdocError::DeviceAuthentication)?;

    Ok(sha256(encoded).to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oid4vp_transcript_has_null_engagement_elements() {
        let transcript =
            SessionTranscript::oid4vp("client", "https://uri", "nonce", "mdoc-nonce").unwrap();

        let mut encoded = Vec::new();
        ciborium::into_writer(&transcript, &mut encoded).unwrap();

        let value: Value = ciborium::from_reader(encoded.as_slice()).unwrap();
        let elements = value.as_array().unwrap();

        assert_eq!(elements.len(), 3);
        assert!(elements[0].is_null());
        assert!(elements[1].is_null());

        let handover = elements[2].as_array().unwrap();
        assert_eq!(handover.len(), 3);
        assert_eq!(handover[0].as_bytes().unwrap().len(), 32);
        assert_eq!(handover[1].as_bytes().unwrap().len(), 32);
        assert_eq!(handover[2].as_text().unwrap(), "nonce");
    }

    #[test]
    fn transcript_binds_all_inputs() {
        let transcript = SessionTranscript::oid4vp("client", "uri", "nonce", "m1").unwrap();

        for (client, uri, nonce, mdoc_nonce) in [
            ("other", "uri", "nonce", "m1"),
            ("client", "other", "nonce", "m1"),
            ("client", "uri", "other", "m1"),
            ("client", "uri", "nonce", "m2"),
        ] {
            let other = SessionTranscript::oid4vp(client, uri, nonce, mdoc_nonce).unwrap();
            assert_ne!(transcript, other);
        }
    }

    #[test]
    fn tagged_bytes_round_trip() {
        let transcript = SessionTranscript::oid4vp("client", "uri", "nonce", "m1").unwrap();

        let tagged = transcript.to_tagged_cbor_bytes().unwrap();

        // tag 24 wrapping a byte string
        assert_eq!(tagged[0], 0xd8);
        assert_eq!(tagged[1], 0x18);
    }
}
