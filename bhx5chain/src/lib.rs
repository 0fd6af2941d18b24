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

//! This crate provides functions and types for working with an ordered array of X.509 certificates
//! (`x5chain`) as defined in [RFC 9360][1].
//!
//! [1]: <https://www.rfc-editor.org/rfc/rfc9360.html#section-2-5.4.1>
//!
//! # Details
//!
//! The primary API this crate offers is the [`X5Chain`] struct, an ordered, leaf-first certificate
//! chain.  A chain can be validated against a set of trusted root certificates ([`X509Trust`]),
//! and exposes the data of its leaf certificate needed by document verifiers: the public key, the
//! validity window and selected subject attributes.
//!
//! # Examples
//!
//! ```ignore
//! let x5chain = bhx5chain::X5Chain::new(vec![issuer_certificate, intermediary_certificate])
//!     .expect("valid x5chain");
//!
//! let trust = bhx5chain::X509Trust::new(vec![trusted_root_certificate]);
//!
//! x5chain
//!     .verify_against_trusted_roots(&trust)
//!     .expect("trusted x5chain");
//! ```

mod error;
mod x5chain;

pub use error::*;
pub use x5chain::*;
