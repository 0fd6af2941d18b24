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

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! This crate provides the functionality for issuing, presenting and verifying mobile driving
//! licenses (mDLs) and other `mso_mdoc` Credentials in compliance with the
//! [ISO/IEC 18013-5:2021][1] & [ISO/IEC TS 18013-7:2024][2] standards, adapted to presentations
//! over OpenID for [Verifiable Presentations][3].
//!
//! [1]: <https://www.iso.org/standard/69084.html>
//! [2]: <https://www.iso.org/standard/82772.html>
//! [3]: <https://openid.net/specs/openid-4-verifiable-presentations-1_0.html>
//!
//! # Details
//!
//! The crate defines multiple modules, which can be roughly divided as follows.
//!
//!   * High-level modules: [`issuer`], [`device`] and [`verifier`].
//!   * The [`error`] module describing the error values.
//!   * Low-level data model -- [`models`].
//!
//! A typical user of this crate is expected to care only about the high-level modules.  The lower
//! level data model is exposed for advanced users wishing to adapt the crate to their `mso_mdoc`
//! use case.
//!
//! # Examples
//!
//! ## Issuing a Mobile Driving License (mDL)
//!
//! ```ignore
//! use bhmdoc::models::{mdl::*, issuer_auth::DigestAlgorithm, FullDate};
//!
//! let mut rng = rand::thread_rng();
//! let issuer_signer = _; // Implementation of [`bh_jose_utils::Signer`] + [`bh_jose_utils::HasX5Chain`]
//! let device_key = _; // Instance of [`bhmdoc::DeviceKey`].
//! let validity_info = _; // Instance of [`bhmdoc::models::issuer_auth::ValidityInfo`].
//!
//! let mdl = MDL::new(MDLMandatory {
//!     family_name: "Doe".to_owned(),
//!     given_name: "John".to_owned(),
//!     birth_date: "1980-01-02".parse().unwrap(),
//!     issue_date: FullDate::from_str("2024-01-01").unwrap().into(),
//!     expiry_date: FullDate::from_str("2029-01-01").unwrap().into(),
//!     issuing_authority: "DMV".to_owned(),
//!     issuing_country: "US".to_owned(),
//!     document_number: "1234".to_owned(),
//!     portrait: vec![1u8, 2, 3].into(),
//!     driving_privileges: 7,
//!     un_distinguishing_sign: "USA".to_owned(),
//! });
//!
//! let issued = bhmdoc::Issuer
//!     .issue_mdl(mdl, device_key, &issuer_signer, &mut rng, validity_info, DigestAlgorithm::Sha256)
//!     .unwrap();
//! ```
//!
//! ## Presenting a Credential
//!
//! ```ignore
//! let device = bhmdoc::Device::verify_issued(
//!     issued_credential_base64,
//!     "org.iso.18013.5.1.mDL".into(),
//!     current_time,
//!     |_| Some(&bh_jose_utils::Es256Verifier),
//! )?;
//!
//! let response = device
//!     .response()
//!     .with_presentation_definition(presentation_definition)
//!     .with_session_transcript(session_transcript)
//!     .authenticate_with_signature(&device_signer)
//!     .sign()?;
//! ```
//!
//! ## Verifying a Presented Credential
//!
//! ```ignore
//! let verifier = bhmdoc::Verifier::new(Some(trust_anchors));
//!
//! let assessments = verifier.verify_to_vec(
//!     &device_response,
//!     &verification_params,
//!     &|_| Some(&bh_jose_utils::Es256Verifier),
//! )?;
//! ```

pub mod device;
pub mod error;
pub mod issuer;
pub mod models;
mod utils;
pub mod verifier;

pub use device::{Device, DeviceResponseBuilder};
pub use error::{MdocError, Result};
pub use issuer::{IssuedDocument, Issuer};
pub use models::issuer_auth::DeviceKey;
pub use utils::{json::json_to_cbor, rand::generate_nonce};
pub use verifier::{
    VerificationAssessment, VerificationCategory, VerificationParams, VerificationStatus, Verifier,
};
