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

//! Import, generation and export of JOSE key material.
//!
//! Keys enter the system as PEM documents (SEC1, PKCS#8, SPKI or X.509 certificates) and leave
//! it as public JWKs or raw key bytes.  Parsing of the DER structures inside the PEM bodies is
//! delegated to OpenSSL, which uniformly covers multi-byte tags, long-form lengths and v1
//! certificates without the explicit version tag.

use bherror::{
    traits::{ErrorContext as _, ForeignError as _},
    Error, Result,
};
use openssl::{
    bn::BigNumContext,
    ec::{EcGroup, EcKey, PointConversionForm},
    pkey::{PKey, Private, Public},
    rsa::Rsa,
    x509::X509,
};

use crate::{
    json_object,
    openssl_impl::{public_key_from_jwk_es256, to_affine_coords, ELLIPTIC_CURVE_NID},
    utils::base64_url_decode,
    CryptoError, FormatError, JwkPublic, SigningAlgorithm,
};

/// The smallest RSA modulus accepted for key generation, in bits.
const RSA_MIN_MODULUS_BITS: u32 = 2048;

/// A P-256 key pair used as an ECDH party, e.g. the reader's ephemeral key of an mdoc
/// presentation or the recipient key of an ECDH-ES encrypted response.
pub struct EcKeyPair {
    key: EcKey<Private>,
    kid: Option<String>,
}

impl EcKeyPair {
    /// Generate a fresh P-256 key pair.
    pub fn generate() -> Result<Self, CryptoError> {
        let group = EcGroup::from_curve_name(ELLIPTIC_CURVE_NID)
            .foreign_err(|| CryptoError::CryptoBackend)?;
        let key = EcKey::generate(group.as_ref()).foreign_err(|| CryptoError::KeyGenerationFailed)?;

        Ok(Self { key, kid: None })
    }

    /// Create a key pair from a private key in the PEM format (SEC1 or PKCS#8).
    pub fn from_private_key_pem(pem: &[u8]) -> Result<Self, CryptoError> {
        let key = EcKey::private_key_from_pem(pem)
            .foreign_err(|| CryptoError::CryptoBackend)
            .ctx(|| "invalid EC private key PEM")?;

        Ok(Self { key, kid: None })
    }

    /// Assign the `kid` under which the public JWK of this key is published.
    pub fn with_kid(mut self, kid: String) -> Self {
        self.kid = Some(kid);
        self
    }

    /// The `kid` of this key, if any.
    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    /// The public half as a JWK JSON object (`kty`, `crv`, `x`, `y` and the `kid` if set).
    pub fn public_jwk(&self) -> Result<JwkPublic, CryptoError> {
        let (x, y) = to_affine_coords(self.key.public_key(), self.key.group())?;

        let mut jwk = json_object!({
            "kty": "EC",
            "crv": "P-256",
            "x": crate::utils::base64_url_encode(&*x),
            "y": crate::utils::base64_url_encode(&*y),
        });

        if let Some(kid) = &self.kid {
            jwk.insert("kid".to_owned(), serde_json::Value::String(kid.clone()));
        }

        Ok(jwk)
    }

    /// The private half as an OpenSSL [`PKey`], for key agreement.
    pub fn private_pkey(&self) -> Result<PKey<Private>, CryptoError> {
        PKey::from_ec_key(self.key.clone()).foreign_err(|| CryptoError::CryptoBackend)
    }

    /// The public half as an OpenSSL [`PKey`], for key agreement.
    pub fn public_pkey(&self) -> Result<PKey<Public>, CryptoError> {
        let group = self.key.group();
        let public = EcKey::from_public_key(group, self.key.public_key())
            .foreign_err(|| CryptoError::CryptoBackend)?;

        PKey::from_ec_key(public).foreign_err(|| CryptoError::CryptoBackend)
    }

    /// The public half as an uncompressed SEC1 point, `0x04 || X || Y`.
    pub fn to_raw_public(&self) -> Result<Vec<u8>, CryptoError> {
        let mut ctx = BigNumContext::new().foreign_err(|| CryptoError::CryptoBackend)?;

        self.key
            .public_key()
            .to_bytes(self.key.group(), PointConversionForm::UNCOMPRESSED, &mut ctx)
            .foreign_err(|| CryptoError::CryptoBackend)
    }
}

/// Converts a public JWK into an OpenSSL [`PKey`], for key agreement or signature
/// verification.
///
/// Currently only `EC` keys on the `P-256` curve are supported.
pub fn public_pkey_from_jwk(jwk: &JwkPublic) -> Result<PKey<Public>, FormatError> {
    let ec = public_key_from_jwk_es256(jwk)?;

    PKey::from_ec_key(ec)
        .foreign_err(|| FormatError::JwkParsingFailed("EC key conversion failed".to_string()))
}

/// Extracts the raw key bytes of a public JWK, as consumed by an ECDH implementation.
///
/// For `EC` keys this is the uncompressed SEC1 point `0x04 || X || Y`; for `OKP` keys it is the
/// raw public key bytes themselves.
pub fn raw_public_key_from_jwk(jwk: &JwkPublic) -> Result<Vec<u8>, FormatError> {
    let error = |message: String| Error::root(FormatError::JwkParsingFailed(message));

    let kty = jwk
        .get("kty")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| error("missing \"kty\" field".to_string()))?;

    let coord = |name: &str| -> Result<Vec<u8>, FormatError> {
        let value = jwk
            .get(name)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| error(format!("missing \"{name}\" coordinate")))?;

        base64_url_decode(value)
            .foreign_err(|| FormatError::JwkParsingFailed(format!("invalid \"{name}\" coordinate")))
    };

    match kty {
        "EC" => {
            let x = coord("x")?;
            let y = coord("y")?;

            let mut point = Vec::with_capacity(1 + x.len() + y.len());
            point.push(0x04);
            point.extend_from_slice(&x);
            point.extend_from_slice(&y);

            Ok(point)
        }
        "OKP" => coord("x"),
        other => Err(error(format!("unsupported key type \"{other}\""))),
    }
}

/// Imports a public key from a PEM encoded SubjectPublicKeyInfo document and returns it as a
/// JWK under the given signature algorithm.
///
/// Currently only `Es256` keys are supported.
pub fn import_public_key_pem(
    pem: &[u8],
    alg: &SigningAlgorithm,
    kid: Option<&str>,
) -> Result<JwkPublic, CryptoError> {
    let pkey = PKey::public_key_from_pem(pem)
        .foreign_err(|| CryptoError::InvalidPublicKey)
        .ctx(|| "invalid SPKI PEM")?;

    jwk_from_pkey(&pkey, alg, kid)
}

/// Imports the SubjectPublicKeyInfo of a PEM encoded X.509 certificate and returns it as a JWK
/// under the given signature algorithm.
pub fn import_x509_public_key_pem(
    pem: &[u8],
    alg: &SigningAlgorithm,
    kid: Option<&str>,
) -> Result<JwkPublic, CryptoError> {
    let certificate = X509::from_pem(pem)
        .foreign_err(|| CryptoError::InvalidPublicKey)
        .ctx(|| "invalid X509 PEM")?;

    let pkey = certificate
        .public_key()
        .foreign_err(|| CryptoError::InvalidPublicKey)
        .ctx(|| "unable to extract the certificate public key")?;

    jwk_from_pkey(&pkey, alg, kid)
}

fn jwk_from_pkey(
    pkey: &PKey<Public>,
    alg: &SigningAlgorithm,
    kid: Option<&str>,
) -> Result<JwkPublic, CryptoError> {
    match (alg, pkey.id()) {
        (SigningAlgorithm::Es256, openssl::pkey::Id::EC) => {
            let ec = pkey
                .ec_key()
                .foreign_err(|| CryptoError::KeyTypeMismatch)?;

            crate::openssl_impl::openssl_ec_pub_key_to_jwk(&ec, kid)
        }
        (SigningAlgorithm::Es256, _) => Err(Error::root(CryptoError::KeyTypeMismatch)
            .ctx("the key is not an EC key")),
        _ => Err(Error::root(CryptoError::Unsupported(format!(
            "import of {alg} keys is not supported"
        )))),
    }
}

/// Generates a fresh RSA key with the given modulus length in bits.
///
/// Moduli below 2048 bits are rejected with [`CryptoError::InvalidModulusLength`].
pub fn generate_rsa_key(modulus_bits: u32) -> Result<PKey<Private>, CryptoError> {
    if modulus_bits < RSA_MIN_MODULUS_BITS {
        return Err(Error::root(CryptoError::InvalidModulusLength(modulus_bits)));
    }

    let rsa = Rsa::generate(modulus_bits).foreign_err(|| CryptoError::KeyGenerationFailed)?;

    PKey::from_rsa(rsa).foreign_err(|| CryptoError::CryptoBackend)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn raw_public_key_is_uncompressed_point() {
        let pair = EcKeyPair::generate().unwrap();

        let raw = pair.to_raw_public().unwrap();

        assert_eq!(raw.len(), 65);
        assert_eq!(raw[0], 0x04);

        // the raw export and the JWK coordinates agree
        let jwk = pair.public_jwk().unwrap();
        let from_jwk = raw_public_key_from_jwk(&jwk).unwrap();
        assert_eq!(raw, from_jwk);
    }

    #[test]
    fn okp_jwk_raw_key_is_x_coordinate() {
        let jwk = json_object!({
            "kty": "OKP",
            "crv": "X25519",
            "x": crate::utils::base64_url_encode([7u8; 32]),
        });

        assert_eq!(raw_public_key_from_jwk(&jwk).unwrap(), vec![7u8; 32]);
    }

    #[test]
    fn jwk_round_trips_through_pkey() {
        let pair = EcKeyPair::generate().unwrap().with_kid("enc-1".to_owned());
        let jwk = pair.public_jwk().unwrap();

        assert_eq!(jwk.get("kid").unwrap(), "enc-1");
        public_pkey_from_jwk(&jwk).unwrap();
    }

    #[test]
    fn short_rsa_modulus_is_rejected() {
        let err = generate_rsa_key(1024).unwrap_err();

        assert_matches!(err.error, CryptoError::InvalidModulusLength(1024));
    }

    #[test]
    fn private_key_pem_round_trip() {
        let pair = EcKeyPair::generate().unwrap();
        let pem = pair.key.private_key_to_pem().unwrap();

        let restored = EcKeyPair::from_private_key_pem(&pem).unwrap();

        assert_eq!(
            pair.to_raw_public().unwrap(),
            restored.to_raw_public().unwrap()
        );
    }
}
