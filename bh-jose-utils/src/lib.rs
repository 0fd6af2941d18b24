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

//! This crate provides functions and types for working with [JSON Web Signatures (JWS)][1],
//! [JSON Web Encryption (JWE)][2] and the JOSE key material both build upon.
//!
//! [1]: <https://datatracker.ietf.org/doc/html/rfc7515>
//! [2]: <https://datatracker.ietf.org/doc/html/rfc7516>
//!
//! # Details
//!
//! Signing and signature verification go through the [`Signer`] and [`SignatureVerifier`]
//! capability traits, so that hosts can substitute their own cryptographic backends.  A default
//! [`openssl`] backed implementation is available as [`Es256Signer`] / [`Es256Verifier`].  JWTs
//! are handled through the [`JwtSigner`] and [`JwtVerifier`] extension traits which drive the
//! [`jwt`] crate.
//!
//! Key material enters the system through the import helpers in the [`keys`] module (PEM, SPKI,
//! PKCS#8 and X.509 sources), and leaves it as public JWKs ([`JwkPublic`]).  The algorithm
//! registries ([`SigningAlgorithm`], [`KeyManagementAlgorithm`], [`ContentEncryptionAlgorithm`])
//! map JOSE algorithm names onto their scheme parameters.
//!
//! The [`jwe`] module implements the JWE compact serialization with ECDH-ES key agreement and
//! AES-GCM content encryption, which is the profile used for encrypted OpenID4VP authorization
//! responses.
//!
//! # Examples
//!
//! ## Sign and verify a JWT
//!
//! ```
//! use bh_jose_utils::{json_object, Es256Signer, Es256Verifier, JwtSigner, JwtVerifier};
//!
//! // Construct a new signer
//! let signer = Es256Signer::generate("dummy-kid".to_string()).unwrap();
//!
//! // Construct a JWT
//! let dummy_jwt = json_object!({
//!    "sub": "1234567890",
//!    "name": "John Doe",
//!    "iat": 1516239022
//! });
//!
//! // Sign the JWT
//! let signed_jwt: String = signer.sign_jwt(dummy_jwt).unwrap();
//!
//! // Get the public JWK for verification
//! let public_jwk = signer.public_jwk().unwrap();
//!
//! // Verify the JWT
//! let _token: serde_json::Value = Es256Verifier
//!     .verify_jwt_signature(signed_jwt.as_str(), &public_jwk)
//!     .unwrap();
//! ```

mod openssl_impl;

mod alg;
mod crypto;
mod error;
pub mod jwe;
mod jwk;
pub mod keys;
mod traits;
mod utils;

pub use alg::*;
pub use crypto::*;
pub use error::*;
pub use jwk::*;
// Re-export the `jwt` crate
pub use jwt;
pub use openssl_impl::*;
pub use traits::*;
pub use utils::*;

/// Helper macro with the same syntax as [`serde_json::json`] specialized for
/// constructing JSON objects.
///
/// It will construct a more specific type ([`serde_json::Map<String,Value>`])
/// than just [`serde_json::Value`] when constructing an object, and panic if
/// the syntax is valid JSON but not an object.
#[macro_export]
macro_rules! json_object {
    ($stuff:tt) => {
        match ::serde_json::json!($stuff) {
            ::serde_json::Value::Object(o) => o,
            _ => unreachable!("JSON literal wasn't an object"),
        }
    };
}
