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

//! This module defines the error values returned by the crate API.

use bh_jose_utils::SigningAlgorithm;

/// Error type used across the crate API.
#[derive(strum_macros::Display, Debug, PartialEq, Clone)]
pub enum JarmError {
    /// Error when a response is neither a JWS nor a JWE, nor decrypts to a JWS.
    #[strum(to_string = "The authorization response is neither signed nor encrypted")]
    NotSignedOrEncrypted,
    /// Error when the `state` of the response does not match the `state` of the original
    /// authorization request.
    #[strum(to_string = "The authorization response `state` does not match the request")]
    StateMismatch,
    /// Error when the response carries OAuth error parameters instead of a result.
    #[strum(to_string = "Received an error authorization response: {0}")]
    ReceivedErrorResponse(String),
    /// Error when an encrypted response carries no `kid` in its protected header.
    #[strum(to_string = "The encrypted response carries no `kid` header")]
    MissingKid,
    /// Error when no decryption key matches the `kid` of an encrypted response.
    #[strum(to_string = "No decryption key available for kid \"{0}\"")]
    MissingDecryptionKey(String),
    /// Error when a signed response is received but no verification key is configured.
    #[strum(to_string = "No verification key available for the signed response")]
    MissingVerificationKey,
    /// Error when we are missing an appropriate signature verification implementation.
    #[strum(to_string = "Signature verifier for the {0} is missing")]
    MissingSignatureVerifier(SigningAlgorithm),
    /// Error when a required response parameter is absent.
    #[strum(to_string = "The authorization response is missing the \"{0}\" parameter")]
    MissingParameter(&'static str),
    /// Error when the response JWT has expired.
    #[strum(to_string = "The authorization response expired at {0}")]
    ResponseExpired(i64),
    /// Error when the response can not be decrypted, parsed or its signature verified.
    #[strum(to_string = "Invalid authorization response: {0}")]
    InvalidResponse(String),
    /// Error when the original authorization request parameters can not be fetched.
    #[strum(to_string = "Unable to fetch the original authorization request")]
    AuthRequestLookup,
}

impl bherror::BhError for JarmError {}

/// Type alias for [`bherror::Result`] types returned by the crate's API.
pub type Result<T> = bherror::Result<T, JarmError>;
