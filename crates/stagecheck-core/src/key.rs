//! Validation keys: the coordinates identifying one processing unit
//!
//! A key is an ordered mapping of coordinate names to values, e.g.
//! `{visit: 903334, detector: 16}` for one exposure or
//! `{tract: 0, patch: 69, filter: "HSC-I"}` for one sky patch. The empty key
//! addresses store-global datasets such as the package manifest.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Coordinates whose textual values are always coerced to integers.
pub const NUMERIC_COORDINATES: &[&str] =
    &["visit", "ccd", "detector", "exposure", "tract", "patch"];

/// Separator for alternative values inside one `KEY=VALUE` token.
const ALTERNATIVE_SEPARATOR: char = '^';

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyValue {
    Int(i64),
    Text(String),
}

impl KeyValue {
    /// Interpret a textual value for the given coordinate name.
    ///
    /// Names in [`NUMERIC_COORDINATES`] must parse as integers; everything
    /// else is kept as text.
    pub fn coerce(name: &str, raw: &str) -> Result<Self, CoreError> {
        if NUMERIC_COORDINATES.contains(&name) {
            raw.trim()
                .parse::<i64>()
                .map(KeyValue::Int)
                .map_err(|_| CoreError::NonIntegerCoordinate {
                    name: name.to_string(),
                    value: raw.to_string(),
                })
        } else {
            Ok(KeyValue::Text(raw.to_string()))
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            KeyValue::Int(v) => Some(*v),
            KeyValue::Text(_) => None,
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(v) => write!(f, "{}", v),
            KeyValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        KeyValue::Int(v)
    }
}

impl From<i32> for KeyValue {
    fn from(v: i32) -> Self {
        KeyValue::Int(v as i64)
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        KeyValue::Text(v.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(v: String) -> Self {
        KeyValue::Text(v)
    }
}

/// Immutable, ordered set of named coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationKey {
    coords: IndexMap<String, KeyValue>,
}

impl ValidationKey {
    /// The empty key, used for store-global checks.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> ValidationKeyBuilder {
        ValidationKeyBuilder::default()
    }

    /// Build a key from `(name, value)` pairs, rejecting repeated names.
    pub fn from_pairs<I, N, V>(pairs: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<KeyValue>,
    {
        let mut builder = Self::builder();
        for (name, value) in pairs {
            builder = builder.try_coord(name, value)?;
        }
        Ok(builder.build())
    }

    /// Parse the tokens of one `--id` argument (`visit=903334 ccd=16`).
    ///
    /// Values may list alternatives separated by `^`; the result is the
    /// cartesian product of all alternatives, in token order.
    pub fn parse_tokens<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<Self>, CoreError> {
        let mut seen: Vec<String> = Vec::new();
        let mut keys = vec![Self::builder()];

        for token in tokens {
            let token = token.as_ref();
            let (name, raw) = token
                .split_once('=')
                .filter(|(name, raw)| !name.trim().is_empty() && !raw.is_empty())
                .ok_or_else(|| CoreError::MalformedToken(token.to_string()))?;
            let name = name.trim();

            if seen.iter().any(|s| s == name) {
                return Err(CoreError::DuplicateCoordinate(name.to_string()));
            }
            seen.push(name.to_string());

            let alternatives = raw
                .split(ALTERNATIVE_SEPARATOR)
                .map(|alt| KeyValue::coerce(name, alt))
                .collect::<Result<Vec<_>, _>>()?;

            let mut expanded = Vec::with_capacity(keys.len() * alternatives.len());
            for partial in &keys {
                for value in &alternatives {
                    expanded.push(partial.clone().try_coord(name, value.clone())?);
                }
            }
            keys = expanded;
        }

        Ok(keys.into_iter().map(ValidationKeyBuilder::build).collect())
    }

    pub fn get(&self, name: &str) -> Option<&KeyValue> {
        self.coords.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &KeyValue)> {
        self.coords.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Order-independent textual form: `name=value` pairs sorted by name and
    /// joined with `,`. Empty for the empty key.
    pub fn canonical(&self) -> String {
        let mut pairs: Vec<(&String, &KeyValue)> = self.coords.iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        pairs
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Restrict the key to the given dimensions, in the order given.
    ///
    /// Returns the first missing dimension name on failure.
    pub fn project(&self, dimensions: &[String]) -> Result<Self, String> {
        let mut coords = IndexMap::with_capacity(dimensions.len());
        for dim in dimensions {
            let value = self.coords.get(dim).ok_or_else(|| dim.clone())?;
            coords.insert(dim.clone(), value.clone());
        }
        Ok(Self { coords })
    }
}

impl fmt::Display for ValidationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.coords.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match value {
                KeyValue::Int(v) => write!(f, "{}: {}", name, v)?,
                KeyValue::Text(s) => write!(f, "{}: {:?}", name, s)?,
            }
        }
        write!(f, "}}")
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationKeyBuilder {
    coords: IndexMap<String, KeyValue>,
}

impl ValidationKeyBuilder {
    /// Add a coordinate; a repeated name replaces the previous value.
    pub fn coord(mut self, name: impl Into<String>, value: impl Into<KeyValue>) -> Self {
        self.coords.insert(name.into(), value.into());
        self
    }

    /// Add a coordinate, failing if the name is already present.
    pub fn try_coord(
        mut self,
        name: impl Into<String>,
        value: impl Into<KeyValue>,
    ) -> Result<Self, CoreError> {
        let name = name.into();
        if self.coords.contains_key(&name) {
            return Err(CoreError::DuplicateCoordinate(name));
        }
        self.coords.insert(name, value.into());
        Ok(self)
    }

    pub fn build(self) -> ValidationKey {
        ValidationKey {
            coords: self.coords,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_coerces_known_numeric_coordinates() {
        let keys = ValidationKey::parse_tokens(&["visit=903334", "ccd=16", "filter=HSC-I"]).unwrap();
        assert_eq!(keys.len(), 1);
        let key = &keys[0];
        assert_eq!(key.get("visit"), Some(&KeyValue::Int(903334)));
        assert_eq!(key.get("ccd"), Some(&KeyValue::Int(16)));
        assert_eq!(key.get("filter"), Some(&KeyValue::Text("HSC-I".to_string())));
    }

    #[test]
    fn test_parse_preserves_token_order() {
        let keys = ValidationKey::parse_tokens(&["tract=0", "patch=69", "filter=HSC-R"]).unwrap();
        let names: Vec<&str> = keys[0].iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["tract", "patch", "filter"]);
    }

    #[test]
    fn test_parse_rejects_duplicate_coordinate() {
        let err = ValidationKey::parse_tokens(&["visit=1", "visit=2"]).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateCoordinate(name) if name == "visit"));
    }

    #[test]
    fn test_parse_rejects_non_integer_numeric_coordinate() {
        let err = ValidationKey::parse_tokens(&["patch=5,4"]).unwrap_err();
        assert!(matches!(err, CoreError::NonIntegerCoordinate { .. }));
    }

    #[test]
    fn test_parse_rejects_malformed_token() {
        assert!(matches!(
            ValidationKey::parse_tokens(&["visit"]).unwrap_err(),
            CoreError::MalformedToken(_)
        ));
        assert!(matches!(
            ValidationKey::parse_tokens(&["=3"]).unwrap_err(),
            CoreError::MalformedToken(_)
        ));
    }

    #[test]
    fn test_parse_expands_alternatives() {
        let keys = ValidationKey::parse_tokens(&["visit=903334^903336", "ccd=16^22"]).unwrap();
        let rendered: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "{visit: 903334, ccd: 16}",
                "{visit: 903334, ccd: 22}",
                "{visit: 903336, ccd: 16}",
                "{visit: 903336, ccd: 22}",
            ]
        );
    }

    #[test]
    fn test_empty_key_display() {
        assert_eq!(ValidationKey::empty().to_string(), "{}");
        assert!(ValidationKey::empty().is_empty());
    }

    #[test]
    fn test_text_values_are_quoted_in_display() {
        let key = ValidationKey::builder()
            .coord("tract", 0)
            .coord("filter", "HSC-I")
            .build();
        assert_eq!(key.to_string(), "{tract: 0, filter: \"HSC-I\"}");
    }

    #[test]
    fn test_project_onto_dimensions() {
        let key = ValidationKey::builder()
            .coord("tract", 0)
            .coord("patch", 69)
            .coord("filter", "HSC-I")
            .build();
        let projected = key.project(&["tract".to_string()]).unwrap();
        assert_eq!(projected.to_string(), "{tract: 0}");
        assert_eq!(key.project(&["skymap".to_string()]).unwrap_err(), "skymap");
    }

    #[test]
    fn test_canonical_form_ignores_insertion_order() {
        let a = ValidationKey::builder().coord("visit", 1).coord("ccd", 2).build();
        let b = ValidationKey::builder().coord("ccd", 2).coord("visit", 1).build();
        assert_eq!(a.canonical(), "ccd=2,visit=1");
        assert_eq!(a.canonical(), b.canonical());
        assert_eq!(ValidationKey::empty().canonical(), "");
    }

    #[test]
    fn test_from_pairs_rejects_duplicates() {
        let err = ValidationKey::from_pairs([("visit", 1), ("visit", 2)]).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateCoordinate(_)));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn numeric_coordinates_round_trip(visit in 0i64..10_000_000, detector in 0i64..200) {
                let tokens = vec![format!("visit={}", visit), format!("detector={}", detector)];
                let keys = ValidationKey::parse_tokens(&tokens).unwrap();
                prop_assert_eq!(keys.len(), 1);
                prop_assert_eq!(keys[0].get("visit").and_then(KeyValue::as_int), Some(visit));
                prop_assert_eq!(
                    keys[0].to_string(),
                    format!("{{visit: {}, detector: {}}}", visit, detector)
                );
            }

            #[test]
            fn alternatives_expand_to_product(a in 1usize..4, b in 1usize..4) {
                let visits: Vec<String> = (0..a).map(|i| i.to_string()).collect();
                let ccds: Vec<String> = (0..b).map(|i| (i + 100).to_string()).collect();
                let tokens = vec![
                    format!("visit={}", visits.join("^")),
                    format!("ccd={}", ccds.join("^")),
                ];
                let keys = ValidationKey::parse_tokens(&tokens).unwrap();
                prop_assert_eq!(keys.len(), a * b);
            }
        }
    }
}
