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

use std::result::Result as StdResult;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use bherror::{
    traits::{ErrorContext, ForeignError, PropagateError as _},
    Error, Result,
};
use openssl::{
    bn::{BigNum, BigNumContext},
    ec::{EcGroup, EcGroupRef, EcKey, EcPointRef},
    ecdsa::EcdsaSig,
    nid::Nid,
    pkey::{Private, Public},
    sha::sha256,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{utils, HasJwkKid, HasX5Chain, SignatureVerifier, Signer, SigningAlgorithm};
use crate::{
    error::{CryptoError, FormatError},
    json_object, BoxError, JwkPublic,
};

type EcPrivate = EcKey<Private>;
type EcPublic = EcKey<Public>;

/// A 32-byte coordinate for the elliptic curve.
pub type Coordinate = [u8; 32];

// X9_62_PRIME256V1 is basically an alias for secp256r1
//
// ------------------------------------------
//           Curve names chosen by
//      different standards organizations
// ------------+---------------+-------------
// SECG        |  ANSI X9.62   |  NIST
// ------------+---------------+-------------
// secp256r1   |  prime256v1   |   NIST P-256
//
// source: https://tools.ietf.org/search/rfc4492#appendix-A
pub(crate) const ELLIPTIC_CURVE_NID: Nid = Nid::X9_62_PRIME256V1;

/// [`Signer`] implementation supporting the `ES256` algorithm (ECDSA using the
/// P-256 curve and the SHA-256 hash function).
#[derive(Serialize, Deserialize)]
pub struct Es256Signer {
    #[serde(serialize_with = "serialize_key")]
    #[serde(deserialize_with = "deserialize_key")]
    pub(crate) private_key: EcPrivate,
    kid: String,
}

const CRV: &str = "P-256";
const ALG: &str = "ES256";
const KTY: &str = "EC";

/// Returns the affine coordinates of the public key.
///
/// The intended use case for this method is when serializing the public key
/// in formats other than the explicitly supported ones.
pub(crate) fn to_affine_coords(
    point: &EcPointRef,
    group: &EcGroupRef,
) -> Result<(Box<Coordinate>, Box<Coordinate>), CryptoError> {
    let mut x = BigNum::new().foreign_err(|| CryptoError::CryptoBackend)?;
    let mut y = BigNum::new().foreign_err(|| CryptoError::CryptoBackend)?;
    let mut ctx = BigNumContext::new().foreign_err(|| CryptoError::CryptoBackend)?;
    point
        .affine_coordinates(group, &mut x, &mut y, &mut ctx)
        .foreign_err(|| CryptoError::CryptoBackend)?;

    // The unwraps are safe, as we choose the length correctly
    let x = x
        .to_vec_padded(32)
        .foreign_err(|| CryptoError::CryptoBackend)?
        .try_into()
        .unwrap();
    let y = y
        .to_vec_padded(32)
        .foreign_err(|| CryptoError::CryptoBackend)?
        .try_into()
        .unwrap();
    Ok((x, y))
}

impl Es256Signer {
    /// Generate a fresh `ES256` key with the given `kid` field when presented as a JWK.
    pub fn generate(kid: String) -> Result<Self, CryptoError> {
        let ec_group = EcGroup::from_curve_name(ELLIPTIC_CURVE_NID)
            .foreign_err(|| CryptoError::CryptoBackend)?;
        let private_key = EcKey::<Private>::generate(ec_group.as_ref())
            .foreign_err(|| CryptoError::KeyGenerationFailed)?;

        Ok(Self { private_key, kid })
    }

    /// Create a `ES256` signer from a private key in the PEM format.
    ///
    /// Both the SEC1 (`BEGIN EC PRIVATE KEY`) and the PKCS#8 (`BEGIN PRIVATE KEY`) encodings are
    /// accepted.
    pub fn from_private_key_pem(kid: String, private_key_pem: &[u8]) -> Result<Self, CryptoError> {
        let private_key = EcPrivate::private_key_from_pem(private_key_pem)
            .foreign_err(|| CryptoError::CryptoBackend)?;

        Ok(Self { private_key, kid })
    }

    /// Serialize the private key as PKCS#8 PEM.
    // TODO: extend to non-EC keys once another `Signer` backend lands.
    pub fn private_key_to_pkcs8_pem(&self) -> Result<Vec<u8>, CryptoError> {
        openssl::pkey::PKey::from_ec_key(self.private_key.clone())
            .and_then(|pkey| pkey.private_key_to_pem_pkcs8())
            .foreign_err(|| CryptoError::CryptoBackend)
    }

    /// Construct a JWK JSON object for the public counterpart of this key. It
    /// will use the `kid` field set at construction.
    pub fn public_jwk(&self) -> Result<JwkPublic, CryptoError> {
        let (x_bytes, y_bytes) =
            to_affine_coords(self.private_key.public_key(), self.private_key.group())?;

        Ok(ec_public_affine_coords_to_jwk(
            &x_bytes,
            &y_bytes,
            Some(&self.kid),
        ))
    }
}

/// Construct a JWK JSON object for this public key.
/// **Note**: only ECDSA keys using P-256 curve are supported!
pub fn openssl_ec_pub_key_to_jwk(
    key: &EcKey<Public>,
    kid: Option<&str>,
) -> Result<JwkPublic, CryptoError> {
    let (x_bytes, y_bytes) = to_affine_coords(key.public_key(), key.group())?;
    Ok(ec_public_affine_coords_to_jwk(&x_bytes, &y_bytes, kid))
}

/// Constructs the JWK from the coordinates of the public ECDSA key using P-256
/// curve.
///
/// **Note**: this function **DOES NOT** check that the coordinates are valid.
pub fn ec_public_affine_coords_to_jwk(
    x_bytes: &[u8; 32],
    y_bytes: &[u8; 32],
    kid: Option<&str>,
) -> JwkPublic {
    let x = utils::base64_url_encode(x_bytes);
    let y = utils::base64_url_encode(y_bytes);

    let mut jwk = json_object!({
        "kty": KTY,
        "alg": ALG,
        "use": "sig",
        "crv": CRV,
        "x": x,
        "y": y,
    });

    if let Some(kid) = kid {
        jwk.insert("kid".to_owned(), serde_json::Value::String(kid.to_owned()));
    }

    jwk
}

impl Signer for Es256Signer {
    fn algorithm(&self) -> SigningAlgorithm {
        SigningAlgorithm::Es256
    }

    fn sign(&self, message: &[u8]) -> StdResult<Vec<u8>, BoxError> {
        let digest = sha256(message);
        let signature = EcdsaSig::sign(&digest, self.private_key.as_ref())?;

        // The unwraps are safe, as we've requested a vector of the exact same size as the array
        let r: Box<[u8; 32]> = signature.r().to_vec_padded(32)?.try_into().unwrap();
        let s: Box<[u8; 32]> = signature.s().to_vec_padded(32)?.try_into().unwrap();
        let mut jws = (r as Box<[_]>).into_vec();
        jws.extend_from_slice(&*s);
        Ok(jws)
    }

    fn public_jwk(&self) -> StdResult<JwkPublic, BoxError> {
        Ok(self.public_jwk()?)
    }
}

impl HasJwkKid for Es256Signer {
    fn jwk_kid(&self) -> &str {
        &self.kid
    }
}

/// An [`Es256Signer`] paired with the certificate chain certifying its key, as needed by
/// credential issuers.
pub struct Es256SignerWithChain {
    signer: Es256Signer,
    x5chain: bhx5chain::X5Chain,
}

impl Es256SignerWithChain {
    /// Pair the `signer` with the `x5chain` certifying its public key.
    ///
    /// Fails with [`CryptoError::InvalidPublicKey`] when the leaf certificate does not carry the
    /// signer's public key.
    pub fn new(signer: Es256Signer, x5chain: bhx5chain::X5Chain) -> Result<Self, CryptoError> {
        let leaf_key = x5chain
            .leaf_certificate_key()
            .with_err(|| CryptoError::InvalidX5Chain)?;

        let leaf_ec = leaf_key
            .ec_key()
            .foreign_err(|| CryptoError::KeyTypeMismatch)
            .ctx(|| "leaf certificate key is not an EC key")?;

        let leaf_coords = to_affine_coords(leaf_ec.public_key(), leaf_ec.group())?;
        let signer_coords =
            to_affine_coords(signer.private_key.public_key(), signer.private_key.group())?;

        if leaf_coords != signer_coords {
            return Err(Error::root(CryptoError::InvalidPublicKey)
                .ctx("x5chain leaf does not certify the signing key"));
        }

        Ok(Self { signer, x5chain })
    }
}

impl Signer for Es256SignerWithChain {
    fn algorithm(&self) -> SigningAlgorithm {
        self.signer.algorithm()
    }

    fn sign(&self, message: &[u8]) -> StdResult<Vec<u8>, BoxError> {
        self.signer.sign(message)
    }

    fn public_jwk(&self) -> StdResult<JwkPublic, BoxError> {
        Signer::public_jwk(&self.signer)
    }
}

impl HasJwkKid for Es256SignerWithChain {
    fn jwk_kid(&self) -> &str {
        self.signer.jwk_kid()
    }
}

impl HasX5Chain for Es256SignerWithChain {
    fn x5chain(&self) -> bhx5chain::X5Chain {
        self.x5chain.clone()
    }
}

/// [`SignatureVerifier`] implementation supporting the `ES256` algorithm (ECDSA
/// using the P-256 curve and the SHA-256 hash function).
#[derive(Default)]
pub struct Es256Verifier;

impl SignatureVerifier for Es256Verifier {
    fn algorithm(&self) -> SigningAlgorithm {
        SigningAlgorithm::Es256
    }

    fn verify(
        &self,
        message: &[u8],
        signature: &[u8],
        public_key: &JwkPublic,
    ) -> StdResult<bool, BoxError> {
        let public_key = public_key_from_jwk_es256(public_key)?;
        let jws_bytes = <&[u8; 64]>::try_from(signature)?;
        let (r, s) = jws_bytes.split_at(32);
        let r = BigNum::from_slice(r)?;
        let s = BigNum::from_slice(s)?;
        let ecdsa_sig = EcdsaSig::from_private_components(r, s)?;

        let digest = sha256(message);

        Ok(ecdsa_sig.verify(&digest, public_key.as_ref())?)
    }
}

pub(crate) fn public_key_from_jwk_es256(public_key: &JwkPublic) -> Result<EcPublic, FormatError> {
    check_jwk_field(public_key, "kty", KTY)?;
    check_jwk_field(public_key, "crv", CRV)?;

    let x = parse_coord(public_key, "x")?;
    let x = BigNum::from_slice(check_len(&x)?)
        .foreign_err(|| FormatError::JwkParsingFailed("Failed to construct BigNum".to_string()))?;
    let y = parse_coord(public_key, "y")?;
    let y = BigNum::from_slice(check_len(&y)?)
        .foreign_err(|| FormatError::JwkParsingFailed("Failed to construct BigNum".to_string()))?;

    // The unwrap is safe because we always use the same curve.
    let group = EcGroup::from_curve_name(ELLIPTIC_CURVE_NID).unwrap();
    let public_key =
        EcPublic::from_public_key_affine_coordinates(group.as_ref(), x.as_ref(), y.as_ref())
            .foreign_err(|| {
                FormatError::JwkParsingFailed("coordinate construction failed".to_string())
            })?;
    Ok(public_key)
}

fn check_len(coord: &[u8]) -> Result<&[u8; 32], FormatError> {
    <&[u8; 32]>::try_from(coord)
        .foreign_err(|| FormatError::JwkParsingFailed("parsing coord failed".to_string()))
        .ctx(|| format!("check len of {:?} failed", coord))
}

fn check_jwk_field(
    public_key: &JwkPublic,
    field: &str,
    expected_value: &str,
) -> Result<(), FormatError> {
    let error = |message| Error::root(FormatError::JwkParsingFailed(message));

    let value = public_key
        .get(field)
        .ok_or_else(|| error(format!("missing \"{}\" field", field)))?;

    if value == expected_value {
        return Ok(());
    }

    Err(error(format!("incorrect value on \"{}\" field", field))).ctx(|| {
        format!(
            "value on field \"{}\" was {}, expected {}",
            field, value, expected_value
        )
    })
}

fn parse_coord(public_key: &JwkPublic, coord: &str) -> Result<Vec<u8>, FormatError> {
    let error = |message| bherror::Error::root(FormatError::JwkParsingFailed(message));

    let coord = public_key
        .get(coord)
        .ok_or_else(|| error(format!("fetching coordinate {} failed", coord)))?;
    let base64_coord = coord
        .as_str()
        .ok_or_else(|| error("coord not str".to_string()))
        .ctx(|| format!("coord {0} as str failed", coord))?;
    URL_SAFE_NO_PAD
        .decode(base64_coord)
        .foreign_err(|| FormatError::JwkParsingFailed("decoding coord failed".to_string()))
        .ctx(|| format!("decoding coord {0} failed", base64_coord))
}

/// Serialize the private key to PEM format.
fn serialize_key<S>(key: &EcPrivate, serializer: S) -> StdResult<S::Ok, S::Error>
where
    S: Serializer,
{
    let pem = key
        .private_key_to_pem()
        .map_err(serde::ser::Error::custom)?;

    serializer.serialize_bytes(&pem)
}

/// Deserialize the private key from PEM format.
fn deserialize_key<'de, D>(deserializer: D) -> StdResult<EcPrivate, D::Error>
where
    D: Deserializer<'de>,
{
    let pem = Vec::<u8>::deserialize(deserializer)?;

    EcPrivate::private_key_from_pem(&pem).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let signer = Es256Signer::generate("kid-1".to_owned()).unwrap();
        let message = b"some signing input";

        let signature = Signer::sign(&signer, message).unwrap();
        assert_eq!(signature.len(), 64);

        let jwk = signer.public_jwk().unwrap();

        assert!(Es256Verifier.verify(message, &signature, &jwk).unwrap());
        assert!(!Es256Verifier
            .verify(b"another message", &signature, &jwk)
            .unwrap());
    }

    #[test]
    fn verify_with_wrong_key_fails() {
        let signer = Es256Signer::generate("kid-1".to_owned()).unwrap();
        let other = Es256Signer::generate("kid-2".to_owned()).unwrap();

        let message = b"some signing input";
        let signature = Signer::sign(&signer, message).unwrap();

        assert!(!Es256Verifier
            .verify(message, &signature, &other.public_jwk().unwrap())
            .unwrap());
    }

    #[test]
    fn public_jwk_has_expected_shape() {
        let signer = Es256Signer::generate("my-kid".to_owned()).unwrap();
        let jwk = signer.public_jwk().unwrap();

        assert_eq!(jwk.get("kty").unwrap(), "EC");
        assert_eq!(jwk.get("crv").unwrap(), "P-256");
        assert_eq!(jwk.get("kid").unwrap(), "my-kid");
        assert!(jwk.contains_key("x"));
        assert!(jwk.contains_key("y"));
    }

    #[test]
    fn jwk_round_trips_through_openssl_key() {
        let signer = Es256Signer::generate("kid".to_owned()).unwrap();
        let jwk = signer.public_jwk().unwrap();

        let key = public_key_from_jwk_es256(&jwk).unwrap();
        let jwk_again = openssl_ec_pub_key_to_jwk(&key, Some("kid")).unwrap();

        assert_eq!(jwk, jwk_again);
    }
}
