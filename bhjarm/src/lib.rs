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

//! This crate validates authorization responses secured with [JARM][1] (JWT-Secured
//! Authorization Response Mode), as used by OpenID for [Verifiable Presentations][2] to
//! transport a presentation back to the relying party.
//!
//! [1]: <https://openid.net/specs/oauth-v2-jarm.html>
//! [2]: <https://openid.net/specs/openid-4-verifiable-presentations-1_0.html>
//!
//! # Details
//!
//! A response arrives as a single string which may be signed, encrypted, or both (a signed JWT
//! nested inside a JWE).  The [`JarmVerifier`] detects the form, decrypts and/or verifies the
//! layers with the relying party's [`JarmKeys`], enforces the response parameter schema, and
//! binds the response back to the original authorization request through the
//! [`AuthRequestStore`] capability, keyed by the response `state`.
//!
//! # Examples
//!
//! ```ignore
//! let verifier = bhjarm::JarmVerifier::new(auth_request_store);
//!
//! let keys = bhjarm::JarmKeys {
//!     signer_jwk: Some(&wallet_public_jwk),
//!     decryption_keys: &[&rp_encryption_key],
//! };
//!
//! let validation = verifier.validate(&response, &keys, current_time, |_| {
//!     Some(&bh_jose_utils::Es256Verifier)
//! })?;
//!
//! println!("received a {} response", validation.response_type);
//! ```

mod error;
mod response;

pub use error::*;
pub use response::*;
