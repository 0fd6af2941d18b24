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

//! The [Presentation Exchange][1] subset used to request an mdoc presentation over OpenID4VP,
//! and the selective disclosure it drives.
//!
//! An [`InputDescriptor`] selects a credential by its `doc_type`, and its constraint fields name
//! the requested data elements in the bracketed JSONPath form `$['<namespace>']['<element>']`.
//! Age attestation requests (`age_over_NN`) are resolved against the attestations actually
//! present in the credential, preferring the least revealing one able to answer the query.
//!
//! [1]: <https://identity.foundation/presentation-exchange/spec/v2.0.0/>

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::{
    common::{DataElementIdentifier, NameSpace},
    response::{IssuerNameSpaces, IssuerSignedItemBytes},
};
use crate::{MdocError, Result};

/// A Presentation Definition, as defined in [Presentation Exchange][1].
///
/// [1]: <https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-definition>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentationDefinition {
    /// The identifier of this definition.
    pub id: String,
    /// The requested credentials, one descriptor per `doc_type`.
    pub input_descriptors: Vec<InputDescriptor>,
}

impl PresentationDefinition {
    /// Validates the structural requirements of the definition.
    ///
    /// The definition **MUST** contain at least one [`InputDescriptor`], and the descriptor
    /// identifiers **MUST BE** pairwise distinct.
    pub fn validate(&self) -> Result<()> {
        if self.input_descriptors.is_empty() {
            return Err(bherror::Error::root(MdocError::EmptyPresentationDefinition));
        }

        let mut seen = HashSet::new();
        for descriptor in &self.input_descriptors {
            if !seen.insert(descriptor.id.as_str()) {
                return Err(bherror::Error::root(MdocError::DuplicateInputDescriptorId(
                    descriptor.id.clone(),
                )));
            }
        }

        Ok(())
    }
}

/// An Input Descriptor selecting a single credential and its data elements.
///
/// In the mdoc profile the descriptor `id` carries the requested `doc_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputDescriptor {
    /// The requested `doc_type`.
    pub id: String,
    /// The constraints naming the requested data elements.
    #[serde(default)]
    pub constraints: Constraints,
}

impl InputDescriptor {
    /// Resolves the constraint fields into the requested data elements per namespace.
    pub(crate) fn requested_elements(
        &self,
    ) -> Result<HashMap<NameSpace, Vec<DataElementIdentifier>>> {
        let mut requested: HashMap<NameSpace, Vec<DataElementIdentifier>> = HashMap::new();

        for field in &self.constraints.fields {
            // alternative paths beyond the first are not used by the mdoc profile
            let path = field.path.first().ok_or_else(|| {
                bherror::Error::root(MdocError::InvalidFieldPath(String::new()))
                    .ctx("a constraint field carries no path")
            })?;

            let (name_space, element) = parse_field_path(path)?;

            requested.entry(name_space).or_default().push(element);
        }

        Ok(requested)
    }
}

/// The constraints of an [`InputDescriptor`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    /// The requested data elements.
    #[serde(default)]
    pub fields: Vec<Field>,
}

/// A single constraint field of an [`InputDescriptor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// The JSONPath expressions selecting the data element, e.g. `$['org.iso.18013.5.1']['age_over_21']`.
    pub path: Vec<String>,
    /// Whether the Verifier intends to retain the disclosed value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_to_retain: Option<bool>,
}

/// Parses a bracketed JSONPath of the form `$['<namespace>']['<element>']`.
pub(crate) fn parse_field_path(path: &str) -> Result<(NameSpace, DataElementIdentifier)> {
    let invalid = || bherror::Error::root(MdocError::InvalidFieldPath(path.to_owned()));

    let inner = path
        .strip_prefix("$['")
        .and_then(|rest| rest.strip_suffix("']"))
        .ok_or_else(invalid)?;

    let (name_space, element) = inner.split_once("']['").ok_or_else(invalid)?;

    if name_space.is_empty() || element.is_empty() || element.contains("']['") {
        return Err(invalid());
    }

    Ok((name_space.into(), element.into()))
}

/// Selectively discloses the requested data elements out of the Issuer-signed namespaces.
///
/// The matched items are emitted verbatim, preserving their original encodings, so that the
/// signed digests keep verifying.  If nothing is disclosed, [`None`] is returned.
pub(crate) fn disclose(
    name_spaces: &IssuerNameSpaces,
    requested: &HashMap<NameSpace, Vec<DataElementIdentifier>>,
) -> Option<IssuerNameSpaces> {
    let mut disclosed = HashMap::new();

    for (name_space, elements) in requested {
        let Some(items) = name_spaces.0.get(name_space) else {
            // no claims from this namespace exist
            continue;
        };

        let mut selected: Vec<IssuerSignedItemBytes> = Vec::new();
        let mut selected_identifiers = HashSet::new();

        for element in elements {
            let Some(item) = select_item(items, element) else {
                // non-existent claims are ignored
                continue;
            };

            // two queries may resolve to the same attestation; disclose it once
            if selected_identifiers.insert(item.element_identifier().clone()) {
                selected.push(item.clone());
            }
        }

        if !selected.is_empty() {
            disclosed.insert(name_space.clone(), selected);
        }
    }

    if disclosed.is_empty() {
        return None;
    }

    Some(IssuerNameSpaces(disclosed))
}

/// Selects the item answering the requested data element, if any.
///
/// Plain requests match by identifier.  An `age_over_NN` request is answered by the least
/// revealing age attestation: the smallest `age_over_k` with `k >= NN` valued `true`, or
/// failing that the largest `age_over_k` with `k <= NN` valued `false`.
fn select_item<'a>(
    items: &'a [IssuerSignedItemBytes],
    requested: &DataElementIdentifier,
) -> Option<&'a IssuerSignedItemBytes> {
    let Some(threshold) = age_over_threshold(requested) else {
        return items
            .iter()
            .find(|item| item.element_identifier() == requested);
    };

    let attestations = || {
        items.iter().filter_map(|item| {
            let age = age_over_threshold(item.element_identifier())?;
            let value = item.element_value().0.as_bool()?;
            Some((age, value, item))
        })
    };

    attestations()
        .filter(|(age, value, _)| *age >= threshold && *value)
        .min_by_key(|(age, _, _)| *age)
        .or_else(|| {
            attestations()
                .filter(|(age, value, _)| *age <= threshold && !*value)
                .max_by_key(|(age, _, _)| *age)
        })
        .map(|(_, _, item)| item)
}

/// Parses the `NN` of an `age_over_NN` data element identifier.
fn age_over_threshold(identifier: &DataElementIdentifier) -> Option<u32> {
    let digits = identifier.0.strip_prefix("age_over_")?;

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::models::response::IssuerSignedItem;

    fn items(entries: &[(&str, ciborium::Value)]) -> Vec<IssuerSignedItemBytes> {
        entries
            .iter()
            .enumerate()
            .map(|(i, (identifier, value))| {
                IssuerSignedItem {
                    digest_id: i.into(),
                    random: "f4b65b3379407aa9a0390309b792344c".parse().unwrap(),
                    element_identifier: (*identifier).into(),
                    element_value: value.clone().into(),
                }
                .into()
            })
            .collect()
    }

    #[test]
    fn parse_bracketed_path() {
        let (name_space, element) =
            parse_field_path("$['org.iso.18013.5.1']['family_name']").unwrap();

        assert_eq!(name_space, "org.iso.18013.5.1".into());
        assert_eq!(element, "family_name".into());
    }

    #[test]
    fn parse_invalid_paths_fail() {
        for path in [
            "$.org.iso.18013.5.1.family_name",
            "$['only-one-group']",
            "$['ns']['a']['b']",
            "['ns']['a']",
            "$['']['a']",
        ] {
            let err = parse_field_path(path).unwrap_err();
            assert_matches!(err.error, MdocError::InvalidFieldPath(_), "{path}");
        }
    }

    #[test]
    fn validate_rejects_empty_definition() {
        let definition = PresentationDefinition {
            id: "pd-1".to_owned(),
            input_descriptors: vec![],
        };

        let err = definition.validate().unwrap_err();
        assert_matches!(err.error, MdocError::EmptyPresentationDefinition);
    }

    #[test]
    fn validate_rejects_duplicate_descriptor_ids() {
        let descriptor = InputDescriptor {
            id: "org.iso.18013.5.1.mDL".to_owned(),
            constraints: Constraints::default(),
        };

        let definition = PresentationDefinition {
            id: "pd-1".to_owned(),
            input_descriptors: vec![descriptor.clone(), descriptor],
        };

        let err = definition.validate().unwrap_err();
        assert_matches!(
            err.error,
            MdocError::DuplicateInputDescriptorId(id) if id == "org.iso.18013.5.1.mDL"
        );
    }

    #[test]
    fn plain_request_matches_by_identifier() {
        let items = items(&[
            ("family_name", "Doe".into()),
            ("given_name", "John".into()),
        ]);

        let item = select_item(&items, &"given_name".into()).unwrap();
        assert_eq!(item.element_identifier(), &"given_name".into());

        assert!(select_item(&items, &"missing".into()).is_none());
    }

    #[test]
    fn age_over_prefers_smallest_true_at_or_above() {
        let items = items(&[
            ("age_over_18", true.into()),
            ("age_over_21", true.into()),
            ("age_over_65", false.into()),
        ]);

        // exact hit
        let item = select_item(&items, &"age_over_21".into()).unwrap();
        assert_eq!(item.element_identifier(), &"age_over_21".into());

        // nearest attestation above the query
        let item = select_item(&items, &"age_over_20".into()).unwrap();
        assert_eq!(item.element_identifier(), &"age_over_21".into());
    }

    #[test]
    fn age_over_falls_back_to_largest_false_at_or_below() {
        let items = items(&[
            ("age_over_18", false.into()),
            ("age_over_21", false.into()),
        ]);

        let item = select_item(&items, &"age_over_25".into()).unwrap();
        assert_eq!(item.element_identifier(), &"age_over_21".into());
    }

    #[test]
    fn age_over_with_no_usable_attestation_is_omitted() {
        let items = items(&[("age_over_65", true.into()), ("age_over_18", false.into())]);

        // a higher `true` attestation still answers the query
        assert!(select_item(&items, &"age_over_21".into()).is_some());

        // with only attestations strictly between the bounds nothing is disclosed
        let items = items_without_answers();
        assert!(select_item(&items, &"age_over_21".into()).is_none());
    }

    fn items_without_answers() -> Vec<IssuerSignedItemBytes> {
        items(&[("age_over_18", true.into()), ("age_over_25", false.into())])
    }

    #[test]
    fn non_boolean_age_attestations_are_ignored() {
        let items = items(&[("age_over_21", ciborium::Value::Text("yes".to_owned()))]);

        assert!(select_item(&items, &"age_over_21".into()).is_none());
    }
}
