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

//! This module provides the [`Verifier`] type which is used to verify presented `mDoc`
//! Credentials.
//!
//! Verification runs a fixed sequence of checks grouped into four categories (document format,
//! issuer authentication, device authentication, data integrity).  Each check reports a
//! [`VerificationAssessment`] to a caller-provided sink; an individual failed check never aborts
//! the run, so the caller receives the complete audit trail.  Only parse-level faults surface as
//! errors.

use bh_jose_utils::{keys::EcKeyPair, SignatureVerifier, SigningAlgorithm};
use bhx5chain::X509Trust;

use crate::{
    models::{
        device_auth::DeviceAuthentication,
        mdl::MDL_NAMESPACE,
        response::{DeviceResponse, Document, IssuerSignedItemBytes, DEVICE_RESPONSE_VERSION},
        transcript::SessionTranscript,
        NameSpace,
    },
    Result,
};

/// The categories the verification checks are grouped into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationCategory {
    /// Structural checks over the [`DeviceResponse`] itself.
    DocumentFormat,
    /// Authentication of the Issuer and its certificate.
    IssuerAuth,
    /// Authentication of the Device holding the credential.
    DeviceAuth,
    /// Integrity of the individually disclosed data elements.
    DataIntegrity,
}

impl std::fmt::Display for VerificationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::DocumentFormat => "DOCUMENT_FORMAT",
            Self::IssuerAuth => "ISSUER_AUTH",
            Self::DeviceAuth => "DEVICE_AUTH",
            Self::DataIntegrity => "DATA_INTEGRITY",
        };
        f.write_str(name)
    }
}

/// The verdict of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    /// The check passed.
    Passed,
    /// The check failed; the assessment carries the reason.
    Failed,
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// The outcome of a single verification check.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationAssessment {
    /// The category the check belongs to.
    pub category: VerificationCategory,
    /// A short description of the check performed.
    pub check: String,
    /// The verdict.
    pub status: VerificationStatus,
    /// The reason for a failed verdict.
    pub reason: Option<String>,
}

impl VerificationAssessment {
    fn passed(category: VerificationCategory, check: impl Into<String>) -> Self {
        Self {
            category,
            check: check.into(),
            status: VerificationStatus::Passed,
            reason: None,
        }
    }

    fn failed(
        category: VerificationCategory,
        check: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            category,
            check: check.into(),
            status: VerificationStatus::Failed,
            reason: Some(reason.into()),
        }
    }
}

/// The per-session inputs of a verification run.
pub struct VerificationParams<'a> {
    /// The time of verification as a unix timestamp in seconds.
    pub current_time: u64,
    /// The session transcript the device authentication is computed over.
    pub session_transcript: &'a SessionTranscript,
    /// The reader's ephemeral key pair, required to verify a device MAC.
    pub reader_ephemeral_key: Option<&'a EcKeyPair>,
}

/// Verifier of presented `mDoc` Credentials.
///
/// When constructed with trust anchors, the Issuer's certificate chain is validated against
/// them; without trust anchors the Issuer's authenticity **IS NOT** verified.
pub struct Verifier {
    trust: Option<X509Trust>,
}

impl Verifier {
    /// Creates a new [`Verifier`] with the given trust anchors.
    pub fn new(trust: Option<X509Trust>) -> Self {
        Self { trust }
    }

    /// Verifies the provided [`DeviceResponse`], reporting every check to `emit`.
    ///
    /// The four check categories run sequentially for every [`Document`]; within a category the
    /// assessments are emitted in check order.  Failed checks are recorded, not returned as
    /// errors.
    ///
    /// # Error
    ///
    /// An error is returned only for parse-level faults, e.g. an undecodable
    /// `MobileSecurityObject` or device authentication payload.
    pub fn verify<'a>(
        &self,
        response: &DeviceResponse,
        params: &VerificationParams<'_>,
        get_signature_verifier: &impl Fn(SigningAlgorithm) -> Option<&'a dyn SignatureVerifier>,
        emit: &mut dyn FnMut(VerificationAssessment),
    ) -> Result<()> {
        self.check_document_format(response, emit);

        for document in response.documents() {
            self.verify_document(document, params, get_signature_verifier, emit)?;
        }

        Ok(())
    }

    /// Verifies the provided [`DeviceResponse`], collecting the assessments into a vector.
    pub fn verify_to_vec<'a>(
        &self,
        response: &DeviceResponse,
        params: &VerificationParams<'_>,
        get_signature_verifier: &impl Fn(SigningAlgorithm) -> Option<&'a dyn SignatureVerifier>,
    ) -> Result<Vec<VerificationAssessment>> {
        let mut assessments = Vec::new();
        self.verify(response, params, get_signature_verifier, &mut |assessment| {
            assessments.push(assessment)
        })?;
        Ok(assessments)
    }

    /// Structural checks over the [`DeviceResponse`].
    fn check_document_format(
        &self,
        response: &DeviceResponse,
        emit: &mut dyn FnMut(VerificationAssessment),
    ) {
        let category = VerificationCategory::DocumentFormat;

        emit(if response.version().is_empty() {
            VerificationAssessment::failed(category, "version present", "the version is empty")
        } else {
            VerificationAssessment::passed(category, "version present")
        });

        emit(
            if version_at_least(response.version(), DEVICE_RESPONSE_VERSION) {
                VerificationAssessment::passed(category, "version supported")
            } else {
                VerificationAssessment::failed(
                    category,
                    "version supported",
                    format!(
                        "version {} is older than {}",
                        response.version(),
                        DEVICE_RESPONSE_VERSION
                    ),
                )
            },
        );

        emit(if response.documents().is_empty() {
            VerificationAssessment::failed(
                category,
                "documents present",
                "the response contains no documents",
            )
        } else {
            VerificationAssessment::passed(category, "documents present")
        });
    }

    /// Runs the issuer authentication, device authentication and data integrity checks of a
    /// single [`Document`].
    pub fn verify_document<'a>(
        &self,
        document: &Document,
        params: &VerificationParams<'_>,
        get_signature_verifier: &impl Fn(SigningAlgorithm) -> Option<&'a dyn SignatureVerifier>,
        emit: &mut dyn FnMut(VerificationAssessment),
    ) -> Result<()> {
        self.check_issuer_auth(document, params, get_signature_verifier, emit)?;
        self.check_device_auth(document, params, get_signature_verifier, emit)?;
        self.check_data_integrity(document, emit)?;

        Ok(())
    }

    fn check_issuer_auth<'a>(
        &self,
        document: &Document,
        params: &VerificationParams<'_>,
        get_signature_verifier: &impl Fn(SigningAlgorithm) -> Option<&'a dyn SignatureVerifier>,
        emit: &mut dyn FnMut(VerificationAssessment),
    ) -> Result<()> {
        let category = VerificationCategory::IssuerAuth;
        let issuer_auth = document.issuer_signed().issuer_auth();

        let x5chain = match issuer_auth.x5chain() {
            Ok(x5chain) => {
                emit(VerificationAssessment::passed(category, "x5chain present"));
                x5chain
            }
            Err(error) => {
                emit(VerificationAssessment::failed(
                    category,
                    "x5chain present",
                    format!("{error:?}"),
                ));
                // the remaining issuer checks all depend on the DS certificate
                return Ok(());
            }
        };

        if issuer_auth.signing_algorithm().is_none() {
            emit(VerificationAssessment::failed(
                category,
                "signing algorithm supported",
                "the signing algorithm is missing or unsupported",
            ));
            return Ok(());
        }
        emit(VerificationAssessment::passed(
            category,
            "signing algorithm supported",
        ));

        if let Some(trust) = &self.trust {
            emit(match issuer_auth.verify_x5chain(trust) {
                Ok(()) => VerificationAssessment::passed(category, "issuer trusted"),
                Err(error) => VerificationAssessment::failed(
                    category,
                    "issuer trusted",
                    format!("{error:?}"),
                ),
            });
        }

        emit(
            match issuer_auth.verify_signature(get_signature_verifier) {
                Ok(()) => VerificationAssessment::passed(category, "issuer signature valid"),
                Err(error) => VerificationAssessment::failed(
                    category,
                    "issuer signature valid",
                    format!("{error:?}"),
                ),
            },
        );

        // parse-level faults below this point propagate as errors
        let validity_info = issuer_auth.mso()?.validity_info().clone();

        match x5chain.leaf_validity_window() {
            Ok((not_before, not_after)) => {
                let signed = validity_info.signed().timestamp();
                emit(if (not_before..=not_after).contains(&signed) {
                    VerificationAssessment::passed(category, "signed within certificate validity")
                } else {
                    VerificationAssessment::failed(
                        category,
                        "signed within certificate validity",
                        format!(
                            "signed at {signed}, certificate valid from {not_before} until {not_after}"
                        ),
                    )
                });
            }
            Err(error) => emit(VerificationAssessment::failed(
                category,
                "signed within certificate validity",
                format!("{error:?}"),
            )),
        }

        emit(
            match validity_info.validate_verifier(params.current_time) {
                Ok(()) => VerificationAssessment::passed(category, "credential validity window"),
                Err(error) => VerificationAssessment::failed(
                    category,
                    "credential validity window",
                    format!("{error:?}"),
                ),
            },
        );

        emit(match x5chain.leaf_subject_country() {
            Some(_) => {
                VerificationAssessment::passed(category, "issuer certificate subject country")
            }
            None => VerificationAssessment::failed(
                category,
                "issuer certificate subject country",
                "the certificate subject carries no countryName",
            ),
        });

        Ok(())
    }

    fn check_device_auth<'a>(
        &self,
        document: &Document,
        params: &VerificationParams<'_>,
        get_signature_verifier: &impl Fn(SigningAlgorithm) -> Option<&'a dyn SignatureVerifier>,
        emit: &mut dyn FnMut(VerificationAssessment),
    ) -> Result<()> {
        let category = VerificationCategory::DeviceAuth;

        let Some(device_signed) = document.device_signed() else {
            emit(VerificationAssessment::failed(
                category,
                "device auth present",
                "the document carries no device authentication",
            ));
            return Ok(());
        };

        emit(VerificationAssessment::passed(category, "device auth present"));

        let payload = DeviceAuthentication::new(
            params.session_transcript.clone(),
            document.doc_type().clone(),
            device_signed.name_spaces.clone(),
        )
        .to_detached_payload()?;

        let device_key = document.issuer_signed().device_key()?;
        let device_auth = device_signed.device_auth();

        if !device_auth.is_mac() {
            emit(
                match device_auth.verify_signature(&payload, &device_key, get_signature_verifier) {
                    Ok(()) => VerificationAssessment::passed(category, "device signature valid"),
                    Err(error) => VerificationAssessment::failed(
                        category,
                        "device signature valid",
                        format!("{error:?}"),
                    ),
                },
            );
            return Ok(());
        }

        if device_auth.mac_has_required_algorithm() == Some(false) {
            emit(VerificationAssessment::failed(
                category,
                "device MAC algorithm",
                "Device MAC must use alg 5 (HMAC 256/256)",
            ));
            return Ok(());
        }
        emit(VerificationAssessment::passed(category, "device MAC algorithm"));

        let Some(reader_ephemeral_key) = params.reader_ephemeral_key else {
            emit(VerificationAssessment::failed(
                category,
                "device MAC valid",
                "the reader ephemeral key is required to verify a device MAC",
            ));
            return Ok(());
        };

        let session_transcript_bytes = params.session_transcript.to_tagged_cbor_bytes()?;

        emit(
            match device_auth.verify_mac(
                &payload,
                &device_key,
                reader_ephemeral_key,
                &session_transcript_bytes,
            ) {
                Ok(()) => VerificationAssessment::passed(category, "device MAC valid"),
                Err(error) => VerificationAssessment::failed(
                    category,
                    "device MAC valid",
                    format!("{error:?}"),
                ),
            },
        );

        Ok(())
    }

    fn check_data_integrity(
        &self,
        document: &Document,
        emit: &mut dyn FnMut(VerificationAssessment),
    ) -> Result<()> {
        let category = VerificationCategory::DataIntegrity;

        let mso = document.issuer_signed().issuer_auth().mso()?;

        // decoding the MSO already constrains the digest algorithm to the supported set
        emit(VerificationAssessment::passed(
            category,
            "digest algorithm supported",
        ));

        let Some(name_spaces) = &document.issuer_signed().name_spaces else {
            return Ok(());
        };

        for (name_space, items) in &name_spaces.0 {
            let Some(mso_digests) = mso.digests_for(name_space) else {
                emit(VerificationAssessment::failed(
                    category,
                    format!("digests present for namespace \"{name_space}\""),
                    "the Mobile Security Object carries no digests for the namespace",
                ));
                continue;
            };

            for item in items {
                let check = format!(
                    "digest of \"{}\" in \"{}\"",
                    item.element_identifier().0, name_space
                );

                emit(
                    match mso.validate_item_digest(name_space, mso_digests, item) {
                        Ok(()) => VerificationAssessment::passed(category, check),
                        Err(error) => {
                            VerificationAssessment::failed(category, check, format!("{error:?}"))
                        }
                    },
                );
            }
        }

        self.check_certificate_subject_coupling(document, emit);

        Ok(())
    }

    /// For the mDL namespace, the disclosed issuing authority attributes must match the subject
    /// of the DS certificate.
    fn check_certificate_subject_coupling(
        &self,
        document: &Document,
        emit: &mut dyn FnMut(VerificationAssessment),
    ) {
        let category = VerificationCategory::DataIntegrity;

        let Some(name_spaces) = &document.issuer_signed().name_spaces else {
            return;
        };

        let Some(items) = name_spaces.0.get(&NameSpace(MDL_NAMESPACE.to_owned())) else {
            return;
        };

        let Ok(x5chain) = document.issuer_signed().issuer_auth().x5chain() else {
            // already reported under ISSUER_AUTH
            return;
        };

        if let Some(disclosed) = find_text_element(items, "issuing_country") {
            let country = x5chain.leaf_subject_country();
            emit(if country.as_deref() == Some(disclosed.as_str()) {
                VerificationAssessment::passed(category, "issuing_country matches certificate")
            } else {
                VerificationAssessment::failed(
                    category,
                    "issuing_country matches certificate",
                    format!(
                        "disclosed issuing_country \"{disclosed}\" does not match the certificate countryName {country:?}"
                    ),
                )
            });
        }

        if let Some(disclosed) = find_text_element(items, "issuing_jurisdiction") {
            let state = x5chain.leaf_subject_state_or_province();
            emit(if state.as_deref() == Some(disclosed.as_str()) {
                VerificationAssessment::passed(category, "issuing_jurisdiction matches certificate")
            } else {
                VerificationAssessment::failed(
                    category,
                    "issuing_jurisdiction matches certificate",
                    format!(
                        "disclosed issuing_jurisdiction \"{disclosed}\" does not match the certificate stateOrProvinceName {state:?}"
                    ),
                )
            });
        }
    }
}

/// Finds a disclosed text element by identifier.
fn find_text_element(items: &[IssuerSignedItemBytes], identifier: &str) -> Option<String> {
    items
        .iter()
        .find(|item| item.element_identifier().0 == identifier)
        .and_then(|item| item.element_value().0.as_text().map(str::to_owned))
}

/// Compares two dotted version strings segment by segment.
fn version_at_least(version: &str, minimum: &str) -> bool {
    version.split('.').ge(minimum.split('.'))
}

#[cfg(test)]
mod tests {
    use bh_jose_utils::Es256Verifier;

    use super::*;
    use crate::utils::test::{
        issuer_trust, present_dummy_mdoc, present_dummy_mdoc_with_mac, test_session_transcript,
    };

    fn params(transcript: &SessionTranscript) -> VerificationParams<'_> {
        VerificationParams {
            current_time: 105,
            session_transcript: transcript,
            reader_ephemeral_key: None,
        }
    }

    fn assert_all_passed(assessments: &[VerificationAssessment], category: VerificationCategory) {
        let of_category: Vec<_> = assessments
            .iter()
            .filter(|assessment| assessment.category == category)
            .collect();

        assert!(!of_category.is_empty(), "no {category} assessments");
        for assessment in of_category {
            assert_eq!(
                assessment.status,
                VerificationStatus::Passed,
                "{} failed: {:?}",
                assessment.check,
                assessment.reason
            );
        }
    }

    #[test]
    fn freshly_presented_credential_passes_all_checks() {
        let transcript = test_session_transcript();
        let response = present_dummy_mdoc(100);

        let verifier = Verifier::new(Some(issuer_trust()));

        let assessments = verifier
            .verify_to_vec(&response, &params(&transcript), &|_| {
                Some(&Es256Verifier as &dyn SignatureVerifier)
            })
            .unwrap();

        assert_all_passed(&assessments, VerificationCategory::DocumentFormat);
        assert_all_passed(&assessments, VerificationCategory::IssuerAuth);
        assert_all_passed(&assessments, VerificationCategory::DeviceAuth);
        assert_all_passed(&assessments, VerificationCategory::DataIntegrity);
    }

    #[test]
    fn empty_response_fails_document_format() {
        let response = DeviceResponse::new(Vec::new());
        let transcript = test_session_transcript();

        let verifier = Verifier::new(None);
        let assessments = verifier
            .verify_to_vec(&response, &params(&transcript), &|_| {
                Some(&Es256Verifier as &dyn SignatureVerifier)
            })
            .unwrap();

        let documents_check = assessments
            .iter()
            .find(|assessment| assessment.check == "documents present")
            .unwrap();

        assert_eq!(documents_check.status, VerificationStatus::Failed);
    }

    #[test]
    fn untrusted_issuer_fails_issuer_auth_only() {
        let transcript = test_session_transcript();
        let response = present_dummy_mdoc(100);

        // an unrelated trust anchor
        let verifier = Verifier::new(Some(crate::utils::test::unrelated_trust()));

        let assessments = verifier
            .verify_to_vec(&response, &params(&transcript), &|_| {
                Some(&Es256Verifier as &dyn SignatureVerifier)
            })
            .unwrap();

        let trusted = assessments
            .iter()
            .find(|assessment| assessment.check == "issuer trusted")
            .unwrap();
        assert_eq!(trusted.status, VerificationStatus::Failed);

        // signatures and digests still verify
        assert_all_passed(&assessments, VerificationCategory::DeviceAuth);
        assert_all_passed(&assessments, VerificationCategory::DataIntegrity);
    }

    #[test]
    fn tampered_item_fails_exactly_its_digest_check() {
        let transcript = test_session_transcript();
        let mut response = present_dummy_mdoc(100);

        crate::utils::test::tamper_first_item(&mut response, "family_name");

        let verifier = Verifier::new(None);
        let assessments = verifier
            .verify_to_vec(&response, &params(&transcript), &|_| {
                Some(&Es256Verifier as &dyn SignatureVerifier)
            })
            .unwrap();

        let integrity: Vec<_> = assessments
            .iter()
            .filter(|assessment| {
                assessment.category == VerificationCategory::DataIntegrity
                    && assessment.check.starts_with("digest of")
            })
            .collect();

        let failed: Vec<_> = integrity
            .iter()
            .filter(|assessment| assessment.status == VerificationStatus::Failed)
            .collect();

        assert_eq!(failed.len(), 1);
        assert!(failed[0].check.contains("family_name"));
    }

    #[test]
    fn altered_issuing_country_fails_integrity_and_coupling() {
        let transcript = test_session_transcript();
        let mut response = present_dummy_mdoc(100);

        crate::utils::test::tamper_first_item(&mut response, "issuing_country");

        let verifier = Verifier::new(None);
        let assessments = verifier
            .verify_to_vec(&response, &params(&transcript), &|_| {
                Some(&Es256Verifier as &dyn SignatureVerifier)
            })
            .unwrap();

        let digest_check = assessments
            .iter()
            .find(|assessment| assessment.check.contains("issuing_country") && assessment.check.starts_with("digest of"))
            .unwrap();
        assert_eq!(digest_check.status, VerificationStatus::Failed);

        let coupling_check = assessments
            .iter()
            .find(|assessment| assessment.check == "issuing_country matches certificate")
            .unwrap();
        assert_eq!(coupling_check.status, VerificationStatus::Failed);
    }

    #[test]
    fn device_mac_with_wrong_algorithm_fails() {
        use crate::models::device_auth::DeviceAuth;

        let transcript = test_session_transcript();
        let (mut response, reader_key) = present_dummy_mdoc_with_mac(100);

        // rewrite the protected algorithm of the MAC
        let documents = response.documents.as_mut().unwrap();
        let device_signed = documents[0].device_signed.as_mut().unwrap();
        if let DeviceAuth::DeviceMac(mac) = &mut device_signed.device_auth {
            mac.0.protected.original_data = None;
            mac.0.protected.header.alg = Some(coset::Algorithm::Assigned(
                coset::iana::Algorithm::HMAC_384_384,
            ));
        }

        let verifier = Verifier::new(None);
        let params = VerificationParams {
            current_time: 105,
            session_transcript: &transcript,
            reader_ephemeral_key: Some(&reader_key),
        };

        let assessments = verifier
            .verify_to_vec(&response, &params, &|_| {
                Some(&Es256Verifier as &dyn SignatureVerifier)
            })
            .unwrap();

        let alg_check = assessments
            .iter()
            .find(|assessment| assessment.check == "device MAC algorithm")
            .unwrap();

        assert_eq!(alg_check.status, VerificationStatus::Failed);
        assert_eq!(
            alg_check.reason.as_deref(),
            Some("Device MAC must use alg 5 (HMAC 256/256)")
        );
    }

    #[test]
    fn mac_authenticated_presentation_verifies() {
        let transcript = test_session_transcript();
        let (response, reader_key) = present_dummy_mdoc_with_mac(100);

        let verifier = Verifier::new(None);
        let params = VerificationParams {
            current_time: 105,
            session_transcript: &transcript,
            reader_ephemeral_key: Some(&reader_key),
        };

        let assessments = verifier
            .verify_to_vec(&response, &params, &|_| {
                Some(&Es256Verifier as &dyn SignatureVerifier)
            })
            .unwrap();

        assert_all_passed(&assessments, VerificationCategory::DeviceAuth);
    }

    #[test]
    fn mac_without_reader_key_fails_device_auth() {
        let transcript = test_session_transcript();
        let (response, _reader_key) = present_dummy_mdoc_with_mac(100);

        let verifier = Verifier::new(None);

        let assessments = verifier
            .verify_to_vec(&response, &params(&transcript), &|_| {
                Some(&Es256Verifier as &dyn SignatureVerifier)
            })
            .unwrap();

        let mac_check = assessments
            .iter()
            .find(|assessment| assessment.check == "device MAC valid")
            .unwrap();

        assert_eq!(mac_check.status, VerificationStatus::Failed);
    }

    #[test]
    fn version_compare_is_lexicographic_per_segment() {
        assert!(version_at_least("1.0", "1.0"));
        assert!(version_at_least("1.1", "1.0"));
        assert!(version_at_least("2.0", "1.0"));
        assert!(!version_at_least("0.9", "1.0"));
    }
}
