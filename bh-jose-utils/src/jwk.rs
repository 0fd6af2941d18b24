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

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A JSON object meant to represent a public JWK.
///
/// Since this is a type alias, no aspects of the schema are enforced; this is
/// left to any end-consumers of the public key, such as
/// [`SignatureVerifier`](crate::SignatureVerifier).
pub type JwkPublic = Map<String, Value>;

/// Models a JWK Set, i.e. a JSON object representing a set of JWKs.
///
/// If any JWK in the set carries a `kid` parameter then all of them must, and
/// the `kid` values must be pairwise distinct.  This is what makes the set
/// usable for `kid`-based key resolution, e.g. when picking the decryption key
/// for an encrypted authorization response.
///
/// For more details see [RFC 7517, section 5][RFC].
///
/// [RFC]: <https://datatracker.ietf.org/doc/html/rfc7517#section-5>
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(try_from = "JwkSetUnverified")]
pub struct JwkSet {
    /// Underlying representation of the JWK Set.
    pub keys: Vec<JwkPublic>,
}

impl JwkSet {
    /// Create an empty `JwkSet`.
    pub fn empty() -> Self {
        JwkSet { keys: vec![] }
    }

    /// Returns the first JWK in the set with the given `kid` value, if any.
    pub fn find_by_kid(&self, kid: &str) -> Option<&JwkPublic> {
        self.keys
            .iter()
            .find(|jwk| jwk.get("kid").and_then(Value::as_str) == Some(kid))
    }
}

/// A "shadow" type used solely to validate a deserialized [`JwkSet`] without a
/// hand-written `Deserialize` impl, by (mis)using `TryFrom`.  See this
/// [github issue].
///
/// [github issue]: <https://github.com/serde-rs/serde/issues/642>
#[derive(Deserialize, Debug)]
struct JwkSetUnverified {
    keys: Vec<JwkPublic>,
}

impl TryFrom<JwkSetUnverified> for JwkSet {
    type Error = &'static str;

    fn try_from(value: JwkSetUnverified) -> std::result::Result<Self, Self::Error> {
        let keys = value.keys;

        let kids = keys
            .iter()
            .map(|jwk| match jwk.get("kid") {
                None => Ok(None),
                Some(kid) => kid
                    .as_str()
                    .map(Some)
                    .ok_or("JWK contains a `kid` parameter that is not a string"),
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let with_kid = kids.iter().flatten().count();

        if with_kid != 0 {
            if with_kid != keys.len() {
                return Err("Some of the provided JWKs contain kid parameter values and some don't");
            }

            let unique: HashSet<_> = kids.iter().flatten().collect();
            if unique.len() != keys.len() {
                return Err("Provided JWKs contain duplicate kid parameter values");
            }
        }

        Ok(JwkSet { keys })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use serde_json::json;

    use crate::JwkSet;

    #[test]
    fn jwk_set_round_trips() {
        // https://datatracker.ietf.org/doc/html/rfc7517#appendix-A.1
        let jwk_set = json!({"keys":
          [
            {"kty":"EC",
             "crv":"P-256",
             "x":"MKBCTNIcKUSDii11ySs3526iDZ8AiTo7Tu6KPAqv7D4",
             "y":"4Etl6SRW2YiLUrN5vfvVHuhp7x8PxltmWWlbbM4IFyM",
             "use":"enc",
             "kid":"1"},

            {"kty":"RSA",
             "n": "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx",
             "e":"AQAB",
             "alg":"RS256",
             "kid":"2011-04-29"}
          ]
        });

        let deserialized = serde_json::from_str::<JwkSet>(jwk_set.to_string().as_str()).unwrap();
        let serialized = serde_json::to_string(&deserialized).unwrap();

        assert_eq!(serialized, jwk_set.to_string().as_str());

        assert!(deserialized.find_by_kid("1").is_some());
        assert!(deserialized.find_by_kid("2011-04-29").is_some());
        assert!(deserialized.find_by_kid("missing").is_none());
    }

    #[test]
    fn invalid_jwk_set_duplicate_kid() {
        let jwk_set = json!({"keys":
          [
            { "kid": "1" },
            { "kid": "1" }
          ]
        });

        let error = serde_json::from_str::<JwkSet>(jwk_set.to_string().as_str());

        assert_eq!(
            error.unwrap_err().to_string(),
            "Provided JWKs contain duplicate kid parameter values"
        );
    }

    #[test]
    fn jwk_set_without_kids_is_valid() {
        let jwk_set = json!({"keys":
          [
            { "key": "1" },
            { "key": "2" }
          ]
        });

        let keys = serde_json::from_str::<JwkSet>(jwk_set.to_string().as_str())
            .unwrap()
            .keys;

        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn invalid_jwk_set_mixed_kid_presence() {
        let jwk_set = json!({"keys":
          [
            { "kid": "1" },
            { "key": "1" }
          ]
        });

        let error = serde_json::from_str::<JwkSet>(jwk_set.to_string().as_str());

        assert_eq!(
            error.unwrap_err().to_string(),
            "Some of the provided JWKs contain kid parameter values and some don't"
        );
    }
}
