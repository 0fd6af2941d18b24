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

//! The decrypt-then-verify state machine over a JARM authorization response.
//!
//! A response arrives as a single string whose form is detected from its segments: five
//! base64url segments form a JWE, three form a JWS, and plain JSON is only acceptable as the
//! decrypted content of a JWE.  An encrypted response may in turn contain a signed one, in
//! which case both layers are processed.

use bh_jose_utils::{
    jwe::{decrypt_compact, Jwe},
    jwt,
    keys::EcKeyPair,
    JwkPublic, JwtVerifier as _, SignatureVerifier, SigningAlgorithm,
};
use bherror::traits::{
    ErrorContext as _, ForeignBoxed as _, ForeignError as _, PropagateError as _,
};

use crate::{JarmError, Result};

/// The parameters of an authorization request or response, as a JSON object.
pub type JarmParams = serde_json::Map<String, serde_json::Value>;

/// The form of a validated JARM response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JarmResponseType {
    /// The response was a signed JWT.
    Signed,
    /// The response was an encrypted JWT carrying plain parameters.
    Encrypted,
    /// The response was a signed JWT nested inside an encrypted one.
    SignedEncrypted,
}

impl std::fmt::Display for JarmResponseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Signed => "signed",
            Self::Encrypted => "encrypted",
            Self::SignedEncrypted => "signed encrypted",
        };
        f.write_str(name)
    }
}

/// The outcome of a successful JARM validation.
#[derive(Debug, Clone, PartialEq)]
pub struct JarmValidation {
    /// The parameters of the original authorization request, as fetched through the
    /// [`AuthRequestStore`].
    pub auth_request_params: JarmParams,
    /// The parameters carried by the authorization response.
    pub auth_response_params: JarmParams,
    /// The envelope form the response arrived in.
    pub response_type: JarmResponseType,
}

/// Capability for re-fetching the parameters of the original authorization request belonging
/// to a response, keyed by the response `state`.
pub trait AuthRequestStore {
    /// Returns the parameters of the authorization request the `response_params` answer.
    fn get_params(&self, response_params: &JarmParams) -> Result<JarmParams>;
}

/// The relying party key material available for processing a response.
#[derive(Default)]
pub struct JarmKeys<'a> {
    /// The wallet's public JWK used to verify signed responses.
    pub signer_jwk: Option<&'a JwkPublic>,
    /// The decryption keys of the relying party, resolved by their `kid`.
    pub decryption_keys: &'a [&'a EcKeyPair],
}

impl JarmKeys<'_> {
    fn decryption_key(&self, kid: &str) -> Option<&EcKeyPair> {
        self.decryption_keys
            .iter()
            .find(|key| key.kid() == Some(kid))
            .copied()
    }
}

/// Validator of JARM authorization responses.
///
/// The validator owns the [`AuthRequestStore`] capability; the per-response key material and
/// signature verifiers are provided per call.
pub struct JarmVerifier<Store> {
    auth_requests: Store,
}

impl<Store: AuthRequestStore> JarmVerifier<Store> {
    /// Creates a new [`JarmVerifier`] over the given request store.
    pub fn new(auth_requests: Store) -> Self {
        Self { auth_requests }
    }

    /// Validates the received authorization `response`.
    ///
    /// The response is decrypted and/or its signature verified according to its envelope form,
    /// its parameters are checked (carried OAuth error parameters surface as
    /// [`JarmError::ReceivedErrorResponse`]; signed responses must carry `iss`, `aud` and a
    /// non-expired `exp`), and its `state` is matched against the original authorization
    /// request fetched through the [`AuthRequestStore`].
    pub fn validate<'a>(
        &self,
        response: &str,
        keys: &JarmKeys<'_>,
        current_time: u64,
        get_signature_verifier: impl Fn(SigningAlgorithm) -> Option<&'a dyn SignatureVerifier>,
    ) -> Result<JarmValidation> {
        let (auth_response_params, response_type) = if looks_like_jwe(response) {
            let jwe: Jwe = response
                .parse()
                .with_err(|| JarmError::InvalidResponse("undecodable JWE".to_owned()))?;

            let kid = jwe
                .kid()
                .ok_or_else(|| bherror::Error::root(JarmError::MissingKid))?;

            let key = keys
                .decryption_key(kid)
                .ok_or_else(|| {
                    bherror::Error::root(JarmError::MissingDecryptionKey(kid.to_owned()))
                })?;

            let plaintext = decrypt_compact(&jwe, key)
                .with_err(|| JarmError::InvalidResponse("JWE decryption failed".to_owned()))?;

            let plaintext = String::from_utf8(plaintext).foreign_err(|| {
                JarmError::InvalidResponse("the decrypted content is not text".to_owned())
            })?;

            if looks_like_jws(&plaintext) {
                let params =
                    self.verify_jws(&plaintext, keys, current_time, &get_signature_verifier)?;
                (params, JarmResponseType::SignedEncrypted)
            } else {
                let params = parse_params(&plaintext)?;
                (params, JarmResponseType::Encrypted)
            }
        } else if looks_like_jws(response) {
            let params = self.verify_jws(response, keys, current_time, &get_signature_verifier)?;
            (params, JarmResponseType::Signed)
        } else {
            return Err(bherror::Error::root(JarmError::NotSignedOrEncrypted));
        };

        let auth_request_params = self
            .auth_requests
            .get_params(&auth_response_params)
            .ctx(|| "resolving the original authorization request")?;

        check_state_binding(&auth_request_params, &auth_response_params)?;

        Ok(JarmValidation {
            auth_request_params,
            auth_response_params,
            response_type,
        })
    }

    /// Verifies a signed response and returns its parameters.
    ///
    /// Signed responses are subject to the strict parameter schema: `iss`, `aud` and `exp` are
    /// required, and `exp` must not be in the past.
    fn verify_jws<'a>(
        &self,
        jws: &str,
        keys: &JarmKeys<'_>,
        current_time: u64,
        get_signature_verifier: &impl Fn(SigningAlgorithm) -> Option<&'a dyn SignatureVerifier>,
    ) -> Result<JarmParams> {
        let signer_jwk = keys
            .signer_jwk
            .ok_or_else(|| bherror::Error::root(JarmError::MissingVerificationKey))?;

        // parse the token (without verification) to learn the algorithm
        let unverified: jwt::Token<jwt::Header, JarmParams, _> = jwt::Token::parse_unverified(jws)
            .foreign_err(|| JarmError::InvalidResponse("undecodable JWS".to_owned()))?;

        let alg = signing_algorithm(unverified.header().algorithm).ok_or_else(|| {
            bherror::Error::root(JarmError::InvalidResponse(
                "unsupported JWS algorithm".to_owned(),
            ))
        })?;

        let verifier = get_signature_verifier(alg)
            .ok_or_else(|| bherror::Error::root(JarmError::MissingSignatureVerifier(alg)))?;

        let verified: jwt::Token<jwt::Header, JarmParams, _> = verifier
            .verify_jwt_signature(unverified, signer_jwk)
            .foreign_boxed_err(|| {
                JarmError::InvalidResponse("JWS signature verification failed".to_owned())
            })?;

        let params = verified.claims().clone();

        check_error_params(&params)?;

        for required in ["iss", "aud", "exp"] {
            if !params.contains_key(required) {
                return Err(bherror::Error::root(JarmError::MissingParameter(required)));
            }
        }

        if let Some(exp) = params.get("exp").and_then(serde_json::Value::as_i64) {
            if exp < current_time as i64 {
                return Err(bherror::Error::root(JarmError::ResponseExpired(exp)));
            }
        }

        Ok(params)
    }
}

/// Parses decrypted plain-JSON response parameters.
fn parse_params(plaintext: &str) -> Result<JarmParams> {
    let params: JarmParams = serde_json::from_str(plaintext).foreign_err(|| {
        JarmError::InvalidResponse("the decrypted content is not a JSON object".to_owned())
    })?;

    check_error_params(&params)?;

    Ok(params)
}

/// Surfaces carried OAuth error parameters before any structural checks.
fn check_error_params(params: &JarmParams) -> Result<()> {
    if let Some(error) = params.get("error") {
        let description = params
            .get("error_description")
            .and_then(serde_json::Value::as_str)
            .map(|description| format!(" ({description})"))
            .unwrap_or_default();

        return Err(bherror::Error::root(JarmError::ReceivedErrorResponse(
            format!("{error}{description}"),
        )));
    }

    Ok(())
}

/// Enforces that the response `state` matches the original request `state`.
fn check_state_binding(request: &JarmParams, response: &JarmParams) -> Result<()> {
    let request_state = request.get("state").and_then(serde_json::Value::as_str);
    let response_state = response.get("state").and_then(serde_json::Value::as_str);

    if request_state != response_state {
        return Err(bherror::Error::root(JarmError::StateMismatch).ctx(format!(
            "request state {request_state:?}, response state {response_state:?}"
        )));
    }

    Ok(())
}

/// Whether the string has the five-segment shape of a compact JWE.
fn looks_like_jwe(value: &str) -> bool {
    let segments: Vec<&str> = value.split('.').collect();

    // the encrypted-key segment is empty for direct key agreement
    segments.len() == 5
        && segments
            .iter()
            .enumerate()
            .all(|(i, segment)| (i == 1 && segment.is_empty()) || is_base64_url(segment))
}

/// Whether the string has the three-segment shape of a compact JWS.
fn looks_like_jws(value: &str) -> bool {
    let segments: Vec<&str> = value.split('.').collect();

    segments.len() == 3 && segments.iter().all(|segment| is_base64_url(segment))
}

fn is_base64_url(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Maps the `jwt` crate algorithm registry onto [`SigningAlgorithm`].
fn signing_algorithm(alg: jwt::AlgorithmType) -> Option<SigningAlgorithm> {
    Some(match alg {
        jwt::AlgorithmType::Es256 => SigningAlgorithm::Es256,
        jwt::AlgorithmType::Es384 => SigningAlgorithm::Es384,
        jwt::AlgorithmType::Es512 => SigningAlgorithm::Es512,
        jwt::AlgorithmType::Ps256 => SigningAlgorithm::Ps256,
        jwt::AlgorithmType::Ps384 => SigningAlgorithm::Ps384,
        jwt::AlgorithmType::Ps512 => SigningAlgorithm::Ps512,
        jwt::AlgorithmType::Rs256 => SigningAlgorithm::Rs256,
        jwt::AlgorithmType::Rs384 => SigningAlgorithm::Rs384,
        jwt::AlgorithmType::Rs512 => SigningAlgorithm::Rs512,
        jwt::AlgorithmType::Hs256 => SigningAlgorithm::Hs256,
        jwt::AlgorithmType::Hs384 => SigningAlgorithm::Hs384,
        jwt::AlgorithmType::Hs512 => SigningAlgorithm::Hs512,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use bh_jose_utils::{
        jwe::encrypt_compact, json_object, ContentEncryptionAlgorithm, Es256Signer, Es256Verifier,
        JwtSigner as _,
    };

    use super::*;

    const CURRENT_TIME: u64 = 1_700_000_000;

    /// A request store returning a fixed set of request parameters.
    struct InMemoryStore(JarmParams);

    impl AuthRequestStore for InMemoryStore {
        fn get_params(&self, _response_params: &JarmParams) -> Result<JarmParams> {
            Ok(self.0.clone())
        }
    }

    fn request_params(state: &str) -> JarmParams {
        json_object!({
            "client_id": "verifier",
            "response_uri": "https://verifier.example/direct_post",
            "state": state,
        })
    }

    fn response_params(state: &str) -> JarmParams {
        json_object!({
            "iss": "https://wallet.example",
            "aud": "verifier",
            "exp": CURRENT_TIME + 600,
            "state": state,
            "vp_token": "opaque-vp-token",
            "presentation_submission": { "id": "submission-1" },
        })
    }

    fn wallet() -> Es256Signer {
        Es256Signer::generate("wallet-key".to_owned()).unwrap()
    }

    #[test]
    fn signed_response_validates() {
        let wallet = wallet();
        let response: String = wallet.sign_jwt(response_params("state-1")).unwrap();

        let verifier = JarmVerifier::new(InMemoryStore(request_params("state-1")));
        let wallet_jwk = wallet.public_jwk().unwrap();
        let keys = JarmKeys {
            signer_jwk: Some(&wallet_jwk),
            decryption_keys: &[],
        };

        let validation = verifier
            .validate(&response, &keys, CURRENT_TIME, |_| Some(&Es256Verifier))
            .unwrap();

        assert_eq!(validation.response_type, JarmResponseType::Signed);
        assert_eq!(validation.response_type.to_string(), "signed");
        assert_eq!(validation.auth_response_params, response_params("state-1"));
        assert_eq!(validation.auth_request_params, request_params("state-1"));
    }

    #[test]
    fn signed_response_with_mismatched_state_fails() {
        let wallet = wallet();
        let response: String = wallet.sign_jwt(response_params("state-2")).unwrap();

        let verifier = JarmVerifier::new(InMemoryStore(request_params("state-1")));
        let wallet_jwk = wallet.public_jwk().unwrap();
        let keys = JarmKeys {
            signer_jwk: Some(&wallet_jwk),
            decryption_keys: &[],
        };

        let err = verifier
            .validate(&response, &keys, CURRENT_TIME, |_| Some(&Es256Verifier))
            .unwrap_err();

        assert_matches!(err.error, JarmError::StateMismatch);
    }

    #[test]
    fn encrypted_response_validates() {
        let recipient = EcKeyPair::generate().unwrap().with_kid("rp-enc".to_owned());

        let params = response_params("state-1");
        let response = encrypt_compact(
            serde_json::to_string(&params).unwrap().as_bytes(),
            &recipient.public_jwk().unwrap(),
            ContentEncryptionAlgorithm::A256Gcm,
            Some("rp-enc"),
        )
        .unwrap();

        let verifier = JarmVerifier::new(InMemoryStore(request_params("state-1")));
        let keys = JarmKeys {
            signer_jwk: None,
            decryption_keys: &[&recipient],
        };

        let validation = verifier
            .validate(&response, &keys, CURRENT_TIME, |_| Some(&Es256Verifier))
            .unwrap();

        assert_eq!(validation.response_type, JarmResponseType::Encrypted);
        assert_eq!(validation.response_type.to_string(), "encrypted");
        assert_eq!(validation.auth_response_params, params);
    }

    #[test]
    fn signed_and_encrypted_response_validates() {
        let wallet = wallet();
        let recipient = EcKeyPair::generate().unwrap().with_kid("rp-enc".to_owned());

        let signed: String = wallet.sign_jwt(response_params("state-1")).unwrap();
        let response = encrypt_compact(
            signed.as_bytes(),
            &recipient.public_jwk().unwrap(),
            ContentEncryptionAlgorithm::A256Gcm,
            Some("rp-enc"),
        )
        .unwrap();

        let verifier = JarmVerifier::new(InMemoryStore(request_params("state-1")));
        let wallet_jwk = wallet.public_jwk().unwrap();
        let keys = JarmKeys {
            signer_jwk: Some(&wallet_jwk),
            decryption_keys: &[&recipient],
        };

        let validation = verifier
            .validate(&response, &keys, CURRENT_TIME, |_| Some(&Es256Verifier))
            .unwrap();

        assert_eq!(validation.response_type, JarmResponseType::SignedEncrypted);
        assert_eq!(validation.response_type.to_string(), "signed encrypted");
        assert_eq!(validation.auth_response_params, response_params("state-1"));
    }

    #[test]
    fn plain_response_is_rejected() {
        let verifier = JarmVerifier::new(InMemoryStore(request_params("state-1")));

        let err = verifier
            .validate(
                r#"{"state":"state-1"}"#,
                &JarmKeys::default(),
                CURRENT_TIME,
                |_| Some(&Es256Verifier),
            )
            .unwrap_err();

        assert_matches!(err.error, JarmError::NotSignedOrEncrypted);
    }

    #[test]
    fn error_response_surfaces_before_schema_checks() {
        let wallet = wallet();
        // no iss/aud/exp, but the carried error must win
        let response: String = wallet
            .sign_jwt(json_object!({
                "state": "state-1",
                "error": "access_denied",
                "error_description": "user declined",
            }))
            .unwrap();

        let verifier = JarmVerifier::new(InMemoryStore(request_params("state-1")));
        let wallet_jwk = wallet.public_jwk().unwrap();
        let keys = JarmKeys {
            signer_jwk: Some(&wallet_jwk),
            decryption_keys: &[],
        };

        let err = verifier
            .validate(&response, &keys, CURRENT_TIME, |_| Some(&Es256Verifier))
            .unwrap_err();

        assert_matches!(
            err.error,
            JarmError::ReceivedErrorResponse(message) if message.contains("access_denied")
        );
    }

    #[test]
    fn signed_response_without_aud_fails() {
        let wallet = wallet();
        let mut params = response_params("state-1");
        params.remove("aud");

        let response: String = wallet.sign_jwt(params).unwrap();

        let verifier = JarmVerifier::new(InMemoryStore(request_params("state-1")));
        let wallet_jwk = wallet.public_jwk().unwrap();
        let keys = JarmKeys {
            signer_jwk: Some(&wallet_jwk),
            decryption_keys: &[],
        };

        let err = verifier
            .validate(&response, &keys, CURRENT_TIME, |_| Some(&Es256Verifier))
            .unwrap_err();

        assert_matches!(err.error, JarmError::MissingParameter("aud"));
    }

    #[test]
    fn expired_signed_response_fails() {
        let wallet = wallet();
        let mut params = response_params("state-1");
        params.insert("exp".to_owned(), serde_json::json!(CURRENT_TIME - 10));

        let response: String = wallet.sign_jwt(params).unwrap();

        let verifier = JarmVerifier::new(InMemoryStore(request_params("state-1")));
        let wallet_jwk = wallet.public_jwk().unwrap();
        let keys = JarmKeys {
            signer_jwk: Some(&wallet_jwk),
            decryption_keys: &[],
        };

        let err = verifier
            .validate(&response, &keys, CURRENT_TIME, |_| Some(&Es256Verifier))
            .unwrap_err();

        assert_matches!(err.error, JarmError::ResponseExpired(_));
    }

    #[test]
    fn encrypted_response_without_kid_fails() {
        let recipient = EcKeyPair::generate().unwrap().with_kid("rp-enc".to_owned());

        let response = encrypt_compact(
            br#"{"state":"state-1"}"#,
            &recipient.public_jwk().unwrap(),
            ContentEncryptionAlgorithm::A256Gcm,
            None,
        )
        .unwrap();

        let verifier = JarmVerifier::new(InMemoryStore(request_params("state-1")));
        let keys = JarmKeys {
            signer_jwk: None,
            decryption_keys: &[&recipient],
        };

        let err = verifier
            .validate(&response, &keys, CURRENT_TIME, |_| Some(&Es256Verifier))
            .unwrap_err();

        assert_matches!(err.error, JarmError::MissingKid);
    }

    #[test]
    fn encrypted_response_with_unknown_kid_fails() {
        let recipient = EcKeyPair::generate().unwrap().with_kid("rp-enc".to_owned());

        let response = encrypt_compact(
            br#"{"state":"state-1"}"#,
            &recipient.public_jwk().unwrap(),
            ContentEncryptionAlgorithm::A256Gcm,
            Some("other-kid"),
        )
        .unwrap();

        let verifier = JarmVerifier::new(InMemoryStore(request_params("state-1")));
        let keys = JarmKeys {
            signer_jwk: None,
            decryption_keys: &[&recipient],
        };

        let err = verifier
            .validate(&response, &keys, CURRENT_TIME, |_| Some(&Es256Verifier))
            .unwrap_err();

        assert_matches!(err.error, JarmError::MissingDecryptionKey(kid) if kid == "other-kid");
    }

    #[test]
    fn signed_response_without_verification_key_fails() {
        let wallet = wallet();
        let response: String = wallet.sign_jwt(response_params("state-1")).unwrap();

        let verifier = JarmVerifier::new(InMemoryStore(request_params("state-1")));

        let err = verifier
            .validate(&response, &JarmKeys::default(), CURRENT_TIME, |_| {
                Some(&Es256Verifier)
            })
            .unwrap_err();

        assert_matches!(err.error, JarmError::MissingVerificationKey);
    }
}
