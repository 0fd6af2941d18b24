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

//! Util code over the `coset` crate, including the `COSE_Key` ↔ JWK mapping.

use bh_jose_utils::SigningAlgorithm;
use bherror::traits::ForeignError as _;
use coset::{
    iana::{Algorithm, Ec2KeyParameter, EllipticCurve, OkpKeyParameter},
    AsCborValue, CoseKeyBuilder, KeyType, Label,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::base64::{base64_url_decode, base64_url_encode};
use crate::error::{MdocError, Result};

/// The default `kid` value of the Device's public key.
const DEFAULT_DEVICE_KID: &str = "device_kid";

/// The `EC` curves supported by the `COSE_Key` ↔ JWK mapping: the JOSE curve name, the COSE
/// curve registry entry, and the length of a single coordinate in bytes.
const EC_CURVES: [(&str, EllipticCurve, usize); 3] = [
    ("P-256", EllipticCurve::P_256, 32),
    ("P-384", EllipticCurve::P_384, 48),
    ("P-521", EllipticCurve::P_521, 66),
];

/// The `OKP` curves supported by the `COSE_Key` ↔ JWK mapping.
const OKP_CURVES: [(&str, EllipticCurve, usize); 2] = [
    ("Ed25519", EllipticCurve::Ed25519, 32),
    ("X25519", EllipticCurve::X25519, 32),
];

pub(crate) fn serialize_coset<T, S>(
    cose_value: &T,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    T: AsCborValue + Clone,
    S: Serializer,
{
    let cbor_value = cose_value
        .clone()
        .to_cbor_value()
        .map_err(serde::ser::Error::custom)?;

    cbor_value.serialize(serializer)
}

pub(crate) fn deserialize_coset<'de, T, D>(deserializer: D) -> std::result::Result<T, D::Error>
where
    T: AsCborValue,
    D: Deserializer<'de>,
{
    let cbor_value = ciborium::Value::deserialize(deserializer)?;

    T::from_cbor_value(cbor_value).map_err(serde::de::Error::custom)
}

/// Converts a JWK into a `COSE_Key`.
///
/// `EC` keys on the P-256, P-384 and P-521 curves and `OKP` keys on Ed25519 and X25519 are
/// supported.  For more details on the `COSE_Key` structure see [RFC 9052, section 7][1].
///
/// [1]: <https://datatracker.ietf.org/doc/html/rfc9052#section-7>
pub fn cose_key_from_jwk(
    jwk: &serde_json::Map<String, serde_json::Value>,
) -> Result<coset::CoseKey> {
    let kty = string_field(jwk, "kty")?;
    let crv = string_field(jwk, "crv")?;

    match kty {
        "EC" => {
            let (_, curve, coord_len) = EC_CURVES
                .iter()
                .find(|(name, _, _)| *name == crv)
                .ok_or_else(|| unsupported_curve(crv))?;

            let x = extract_coord(jwk, "x", *coord_len)?;
            let y = extract_coord(jwk, "y", *coord_len)?;

            Ok(CoseKeyBuilder::new_ec2_pub_key(*curve, x, y).build())
        }
        "OKP" => {
            let (_, curve, coord_len) = OKP_CURVES
                .iter()
                .find(|(name, _, _)| *name == crv)
                .ok_or_else(|| unsupported_curve(crv))?;

            let x = extract_coord(jwk, "x", *coord_len)?;

            Ok(coset::CoseKey {
                kty: KeyType::Assigned(coset::iana::KeyType::OKP),
                params: vec![
                    (
                        Label::Int(OkpKeyParameter::Crv as i64),
                        ciborium::Value::from(*curve as u64),
                    ),
                    (
                        Label::Int(OkpKeyParameter::X as i64),
                        ciborium::Value::Bytes(x),
                    ),
                ],
                ..Default::default()
            })
        }
        other => Err(bherror::Error::root(MdocError::JwkToCoseKey(format!(
            "unsupported key type \"{other}\""
        )))),
    }
}

fn unsupported_curve(crv: &str) -> bherror::Error<MdocError> {
    bherror::Error::root(MdocError::JwkToCoseKey(format!(
        "unsupported curve \"{crv}\""
    )))
}

/// Returns the string value of a JWK field.
fn string_field<'a>(
    jwk: &'a serde_json::Map<String, serde_json::Value>,
    key: &'static str,
) -> Result<&'a str> {
    jwk.get(key).and_then(|value| value.as_str()).ok_or_else(|| {
        bherror::Error::root(MdocError::JwkToCoseKey(format!(
            "missing field {key} of type String"
        )))
    })
}

/// Extract a coordinate of the expected length from a JWK.
fn extract_coord(
    jwk: &serde_json::Map<String, serde_json::Value>,
    coord_key: &'static str,
    expected_len: usize,
) -> Result<Vec<u8>> {
    let coord = jwk
        .get(coord_key)
        .and_then(|coord| coord.as_str())
        .ok_or_else(|| {
            bherror::Error::root(MdocError::JwkToCoseKey(format!(
                "Missing coordinate {coord_key} of type String"
            )))
        })?;

    let coord = base64_url_decode(coord).foreign_err(|| {
        MdocError::JwkToCoseKey(format!("Failed to decode coordinate {coord_key}"))
    })?;

    if coord.len() != expected_len {
        return Err(bherror::Error::root(MdocError::JwkToCoseKey(format!(
            "coordinate {coord_key} MUST have {expected_len} bytes"
        ))));
    }

    Ok(coord)
}

/// Converts a `COSE_Key` into a JWK.
///
/// The inverse of [`cose_key_from_jwk`]; the same key types and curves are supported.
pub fn cose_key_to_jwk(
    cose_key: &coset::CoseKey,
) -> Result<serde_json::Map<String, serde_json::Value>> {
    let mut jwk = serde_json::Map::new();

    match cose_key.kty {
        KeyType::Assigned(coset::iana::KeyType::EC2) => {
            let curve = get_cose_key_param(cose_key, &Label::Int(Ec2KeyParameter::Crv as i64))?;
            let (name, _, coord_len) = EC_CURVES
                .iter()
                .find(|(_, cose_crv, _)| curve == &ciborium::Value::from(*cose_crv as u64))
                .ok_or_else(|| {
                    bherror::Error::root(MdocError::CoseKeyToJwk(
                        "unsupported EC curve".to_owned(),
                    ))
                })?;

            let x = get_key_coord(cose_key, Ec2KeyParameter::X as i64, *coord_len)?;
            let y = get_key_coord(cose_key, Ec2KeyParameter::Y as i64, *coord_len)?;

            jwk.insert("kty".to_owned(), "EC".into());
            jwk.insert("crv".to_owned(), (*name).into());
            jwk.insert("x".to_owned(), base64_url_encode(x).into());
            jwk.insert("y".to_owned(), base64_url_encode(y).into());
        }
        KeyType::Assigned(coset::iana::KeyType::OKP) => {
            let curve = get_cose_key_param(cose_key, &Label::Int(OkpKeyParameter::Crv as i64))?;
            let (name, _, coord_len) = OKP_CURVES
                .iter()
                .find(|(_, cose_crv, _)| curve == &ciborium::Value::from(*cose_crv as u64))
                .ok_or_else(|| {
                    bherror::Error::root(MdocError::CoseKeyToJwk(
                        "unsupported OKP curve".to_owned(),
                    ))
                })?;

            let x = get_key_coord(cose_key, OkpKeyParameter::X as i64, *coord_len)?;

            jwk.insert("kty".to_owned(), "OKP".into());
            jwk.insert("crv".to_owned(), (*name).into());
            jwk.insert("x".to_owned(), base64_url_encode(x).into());
        }
        _ => {
            return Err(bherror::Error::root(MdocError::CoseKeyToJwk(
                "only EC and OKP keys are supported".to_owned(),
            )))
        }
    }

    jwk.insert("kid".to_owned(), DEFAULT_DEVICE_KID.into());

    Ok(jwk)
}

/// Extracts the raw public key bytes of a `COSE_Key`, as consumed by an ECDH implementation.
///
/// For `EC2` keys this is the uncompressed SEC1 point `0x04 || X || Y`; for `OKP` keys it is
/// the raw public key bytes themselves.
pub fn cose_key_to_raw(cose_key: &coset::CoseKey) -> Result<Vec<u8>> {
    match cose_key.kty {
        KeyType::Assigned(coset::iana::KeyType::EC2) => {
            let curve = get_cose_key_param(cose_key, &Label::Int(Ec2KeyParameter::Crv as i64))?;
            let (_, _, coord_len) = EC_CURVES
                .iter()
                .find(|(_, cose_crv, _)| curve == &ciborium::Value::from(*cose_crv as u64))
                .ok_or_else(|| {
                    bherror::Error::root(MdocError::CoseKeyToJwk(
                        "unsupported EC curve".to_owned(),
                    ))
                })?;

            let x = get_key_coord(cose_key, Ec2KeyParameter::X as i64, *coord_len)?;
            let y = get_key_coord(cose_key, Ec2KeyParameter::Y as i64, *coord_len)?;

            let mut point = Vec::with_capacity(1 + x.len() + y.len());
            point.push(0x04);
            point.extend_from_slice(x);
            point.extend_from_slice(y);

            Ok(point)
        }
        KeyType::Assigned(coset::iana::KeyType::OKP) => {
            let curve = get_cose_key_param(cose_key, &Label::Int(OkpKeyParameter::Crv as i64))?;
            let (_, _, coord_len) = OKP_CURVES
                .iter()
                .find(|(_, cose_crv, _)| curve == &ciborium::Value::from(*cose_crv as u64))
                .ok_or_else(|| {
                    bherror::Error::root(MdocError::CoseKeyToJwk(
                        "unsupported OKP curve".to_owned(),
                    ))
                })?;

            Ok(get_key_coord(cose_key, OkpKeyParameter::X as i64, *coord_len)?.to_vec())
        }
        _ => Err(bherror::Error::root(MdocError::CoseKeyToJwk(
            "only EC and OKP keys are supported".to_owned(),
        ))),
    }
}

/// Returns a key coordinate from the `params` attribute of the provided `COSE_Key`.
///
/// Its value **MUST BE** a byte string of the given length.
fn get_key_coord(cose_key: &coset::CoseKey, param: i64, expected_len: usize) -> Result<&[u8]> {
    let ciborium::Value::Bytes(value) = get_cose_key_param(cose_key, &Label::Int(param))? else {
        return Err(bherror::Error::root(MdocError::CoseKeyToJwk(format!(
            "key parameter {param} MUST BE bytes"
        ))));
    };

    if value.len() != expected_len {
        return Err(bherror::Error::root(MdocError::CoseKeyToJwk(format!(
            "key parameter {param} MUST HAVE {expected_len} bytes"
        ))));
    }

    Ok(value)
}

/// Returns the param with the given [`Label`] from the `params` attribute of
/// the provided `COSE_Key`.
///
/// If there are multiple entries with the given [`Label`], only the first-one
/// is returned.
fn get_cose_key_param<'a>(
    cose_key: &'a coset::CoseKey,
    label: &Label,
) -> Result<&'a ciborium::Value> {
    cose_key
        .params
        .iter()
        .find_map(|(l, v)| (l == label).then_some(v))
        .ok_or_else(|| {
            bherror::Error::root(MdocError::CoseKeyToJwk(format!(
                "key param {:?} not found",
                label
            )))
        })
}

/// Maps the [`Algorithm`] to the [`SigningAlgorithm`].
///
/// If the [`Algorithm`] is not supported, [`None`] is returned.
pub(crate) fn coset_alg_to_jws_alg(alg: &Algorithm) -> Option<SigningAlgorithm> {
    Some(match alg {
        Algorithm::ES256 => SigningAlgorithm::Es256,
        Algorithm::ES384 => SigningAlgorithm::Es384,
        Algorithm::ES512 => SigningAlgorithm::Es512,
        Algorithm::PS256 => SigningAlgorithm::Ps256,
        Algorithm::PS384 => SigningAlgorithm::Ps384,
        Algorithm::PS512 => SigningAlgorithm::Ps512,
        Algorithm::RS256 => SigningAlgorithm::Rs256,
        Algorithm::RS384 => SigningAlgorithm::Rs384,
        Algorithm::RS512 => SigningAlgorithm::Rs512,
        Algorithm::EdDSA => SigningAlgorithm::EdDsa,
        Algorithm::HMAC_256_256 => SigningAlgorithm::Hs256,
        Algorithm::HMAC_384_384 => SigningAlgorithm::Hs384,
        Algorithm::HMAC_512_512 => SigningAlgorithm::Hs512,
        _ => return None,
    })
}

/// Maps the [`SigningAlgorithm`] to the [`Algorithm`].
pub(crate) fn jws_alg_to_coset_alg(alg: &SigningAlgorithm) -> Algorithm {
    match alg {
        SigningAlgorithm::Es256 => Algorithm::ES256,
        SigningAlgorithm::Es384 => Algorithm::ES384,
        SigningAlgorithm::Es512 => Algorithm::ES512,
        SigningAlgorithm::Ps256 => Algorithm::PS256,
        SigningAlgorithm::Ps384 => Algorithm::PS384,
        SigningAlgorithm::Ps512 => Algorithm::PS512,
        SigningAlgorithm::Rs256 => Algorithm::RS256,
        SigningAlgorithm::Rs384 => Algorithm::RS384,
        SigningAlgorithm::Rs512 => Algorithm::RS512,
        SigningAlgorithm::EdDsa => Algorithm::EdDSA,
        SigningAlgorithm::Hs256 => Algorithm::HMAC_256_256,
        SigningAlgorithm::Hs384 => Algorithm::HMAC_384_384,
        SigningAlgorithm::Hs512 => Algorithm::HMAC_512_512,
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::MdocError;

    fn p256_jwk() -> serde_json::Map<String, serde_json::Value> {
        serde_json::json!({
            "kty":"EC",
            "crv":"P-256",
            "x":"MKBCTNIcKUSDii11ySs3526iDZ8AiTo7Tu6KPAqv7D4",
            "y":"4Etl6SRW2YiLUrN5vfvVHuhp7x8PxltmWWlbbM4IFyM",
            "use":"enc",
            "kid":"1",
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn cose_key_from_ec_jwk() {
        assert_matches!(cose_key_from_jwk(&p256_jwk()), Ok(_));
    }

    #[test]
    fn ec_jwk_cose_round_trip() {
        let jwk = p256_jwk();

        let cose_key = cose_key_from_jwk(&jwk).unwrap();
        let jwk_again = cose_key_to_jwk(&cose_key).unwrap();

        assert_eq!(jwk.get("kty"), jwk_again.get("kty"));
        assert_eq!(jwk.get("crv"), jwk_again.get("crv"));
        assert_eq!(jwk.get("x"), jwk_again.get("x"));
        assert_eq!(jwk.get("y"), jwk_again.get("y"));

        let cose_key_again = cose_key_from_jwk(&jwk_again).unwrap();
        assert_eq!(cose_key, cose_key_again);
    }

    #[test]
    fn okp_jwk_cose_round_trip() {
        let jwk = serde_json::json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "x": "11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo",
        })
        .as_object()
        .cloned()
        .unwrap();

        let cose_key = cose_key_from_jwk(&jwk).unwrap();
        let jwk_again = cose_key_to_jwk(&cose_key).unwrap();

        assert_eq!(jwk.get("crv"), jwk_again.get("crv"));
        assert_eq!(jwk.get("x"), jwk_again.get("x"));

        let cose_key_again = cose_key_from_jwk(&jwk_again).unwrap();
        assert_eq!(cose_key, cose_key_again);
    }

    #[test]
    fn raw_key_of_ec2_is_uncompressed_point() {
        let jwk = p256_jwk();
        let cose_key = cose_key_from_jwk(&jwk).unwrap();

        let raw = cose_key_to_raw(&cose_key).unwrap();

        assert_eq!(raw.len(), 65);
        assert_eq!(raw[0], 0x04);
    }

    #[test]
    fn cose_key_from_rsa_jwk_fails() {
        let jwk = serde_json::json!({
            "kty":"RSA",
            "n": "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx",
            "e":"AQAB",
            "alg":"RS256",
            "kid":"2011-04-29"
        })
        .as_object()
        .cloned()
        .unwrap();

        assert_matches!(
            cose_key_from_jwk(&jwk).unwrap_err().error,
            MdocError::JwkToCoseKey(msg) if msg == "unsupported key type \"RSA\""
        );
    }

    #[test]
    fn wrong_coordinate_length_fails() {
        let jwk = serde_json::json!({
            "kty":"EC",
            "crv":"P-384",
            "x":"MKBCTNIcKUSDii11ySs3526iDZ8AiTo7Tu6KPAqv7D4",
            "y":"4Etl6SRW2YiLUrN5vfvVHuhp7x8PxltmWWlbbM4IFyM",
        })
        .as_object()
        .cloned()
        .unwrap();

        assert_matches!(
            cose_key_from_jwk(&jwk).unwrap_err().error,
            MdocError::JwkToCoseKey(_)
        );
    }
}
