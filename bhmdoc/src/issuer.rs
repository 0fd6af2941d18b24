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

//! This module defines the [`Issuer`] type, which is responsible for issuing `mDL` & other
//! `mso_mdoc` Credentials in the context of [OpenID for Verifiable Credential Issuance][1].
//!
//! [1]: <https://openid.net/specs/openid-4-verifiable-credential-issuance-1_0.html>

use std::collections::HashMap;

use rand::Rng;

use crate::{
    models::{
        common::{Claims, DocType},
        issuer_auth::{DigestAlgorithm, ValidityInfo},
        mdl::{MDL, MDL_DOCUMENT_TYPE, MDL_NAMESPACE},
        response::IssuerSigned,
    },
    DeviceKey, Result,
};

/// The [`Issuer`] is responsible for issuing `mDL` & other `mso_mdoc` Credentials in the
/// context of [OpenID for Verifiable Credential Issuance][1].
///
/// The type provides two methods.
///
///   * [`Issuer::issue`] for issuing any type of `mso_mdoc` Credentials.
///   * [`Issuer::issue_mdl`] for issuing `mDL` (mobile driving license) documents as defined
///     in the [ISO/IEC 18013-5:2021][2] standard.
///
/// [1]: <https://openid.net/specs/openid-4-verifiable-credential-issuance-1_0.html>
/// [2]: <https://www.iso.org/standard/69084.html>
pub struct Issuer;

impl Issuer {
    /// Issue a new `mso_mdoc` Credential.
    ///
    /// The claims are salted with randoms drawn from `rng`, their digests are computed under
    /// the given `digest_algorithm`, and the resulting Mobile Security Object is signed with
    /// the `signer`, whose certificate chain ends up in the credential for verification.
    ///
    /// The issued credential is bound to the Device through its public `device_key`.
    #[allow(clippy::too_many_arguments)]
    pub fn issue<Signer, R>(
        &self,
        doc_type: DocType,
        claims: Claims,
        device_key: DeviceKey,
        signer: &Signer,
        rng: &mut R,
        validity_info: ValidityInfo,
        digest_algorithm: DigestAlgorithm,
    ) -> Result<IssuedDocument>
    where
        Signer: bh_jose_utils::Signer + bh_jose_utils::HasX5Chain,
        R: Rng + ?Sized,
    {
        let issuer_signed = IssuerSigned::new(
            doc_type.clone(),
            claims,
            device_key,
            signer,
            rng,
            validity_info,
            digest_algorithm,
        )?;

        Ok(IssuedDocument {
            doc_type,
            issuer_signed,
        })
    }

    /// Issue a new `mDL` Credential.
    #[allow(clippy::too_many_arguments)]
    pub fn issue_mdl<Signer, R>(
        &self,
        mdl: MDL,
        device_key: DeviceKey,
        signer: &Signer,
        rng: &mut R,
        validity_info: ValidityInfo,
        digest_algorithm: DigestAlgorithm,
    ) -> Result<IssuedDocument>
    where
        Signer: bh_jose_utils::Signer + bh_jose_utils::HasX5Chain,
        R: Rng + ?Sized,
    {
        let mut name_spaces = HashMap::new();
        name_spaces.insert(MDL_NAMESPACE.into(), mdl.into());

        self.issue(
            MDL_DOCUMENT_TYPE.into(),
            Claims(name_spaces),
            device_key,
            signer,
            rng,
            validity_info,
            digest_algorithm,
        )
    }
}

/// An issued, immutable `mso_mdoc` Credential, ready for transport to the Device.
#[derive(Debug)]
pub struct IssuedDocument {
    doc_type: DocType,
    issuer_signed: IssuerSigned,
}

impl IssuedDocument {
    /// The document type of the issued credential.
    pub fn doc_type(&self) -> &DocType {
        &self.doc_type
    }

    /// Serializes the issuer-signed part as the _CBOR_-serialized and _base64url_-encoded
    /// (**without padding**) string used for OpenID4VCI transport.
    pub fn serialize_issuer_signed(&self) -> Result<String> {
        self.issuer_signed.to_base64_url()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use bh_jose_utils::Es256Verifier;
    use rand::thread_rng;

    use super::*;
    use crate::{
        models::{
            common::{DataElementIdentifier, DataElementValue},
            mdl::MDLMandatory,
            FullDate,
        },
        utils::test::{dummy_device_key, issuer_signer, validity_info},
        Device,
    };

    #[test]
    fn test_issue() {
        let mut rng = thread_rng();
        let (signer, _) = issuer_signer("US", None);
        let (_, device_key) = dummy_device_key();

        let claims = Claims(HashMap::from([(
            MDL_NAMESPACE.into(),
            HashMap::<DataElementIdentifier, DataElementValue>::from([(
                "name".into(),
                "John".into(),
            )]),
        )]));

        let issued = Issuer
            .issue(
                MDL_DOCUMENT_TYPE.into(),
                claims,
                device_key,
                &signer,
                &mut rng,
                validity_info(100),
                crate::models::issuer_auth::DigestAlgorithm::Sha256,
            )
            .unwrap();

        assert_eq!(issued.doc_type(), &MDL_DOCUMENT_TYPE.into());
        assert!(!issued.serialize_issuer_signed().unwrap().is_empty());
    }

    #[test]
    fn test_issue_mdl_with_sha512_digests() {
        let mut rng = thread_rng();
        let (signer, _) = issuer_signer("US", None);
        let (_, device_key) = dummy_device_key();

        let mdl_mandatory = MDLMandatory {
            family_name: "Doe".to_owned(),
            given_name: "John".to_owned(),
            birth_date: "2007-03-25".parse().unwrap(),
            issue_date: FullDate::from_str("2023-10-24").unwrap().into(),
            expiry_date: FullDate::from_str("2050-10-24").unwrap().into(),
            issuing_authority: "DMV".to_owned(),
            issuing_country: "US".to_owned(),
            document_number: "1234".to_owned(),
            portrait: vec![1u8, 2, 3].into(),
            driving_privileges: 7,
            un_distinguishing_sign: "USA".to_owned(),
        };

        let mut mdl = MDL::new(mdl_mandatory);
        mdl.set_age_attestations(&"2028-03-25".parse().unwrap());

        let issued = Issuer
            .issue_mdl(
                mdl,
                device_key,
                &signer,
                &mut rng,
                validity_info(1_698_105_600), // 2023-10-24
                crate::models::issuer_auth::DigestAlgorithm::Sha512,
            )
            .unwrap();

        // the holder accepts the issued credential and sees the attestations
        let device = Device::verify_issued(
            &issued.serialize_issuer_signed().unwrap(),
            MDL_DOCUMENT_TYPE.into(),
            1_698_105_700,
            |_| Some(&Es256Verifier),
        )
        .unwrap();

        let validity = device.validity_info().unwrap();
        assert_eq!(validity.signed().timestamp(), 1_698_105_600);

        let (_, claims) = device.into_claims();
        let mdl_claims = claims.0.get(&MDL_NAMESPACE.into()).unwrap();

        assert_eq!(
            mdl_claims.get(&"age_over_21".into()),
            Some(&true.into())
        );
        assert_eq!(
            mdl_claims.get(&"family_name".into()),
            Some(&"Doe".into())
        );
    }
}
