//! Accounting dimension keys
//!
//! Closing balances are kept per combination of accounting dimensions. The
//! dimension list is fixed for a run: the three standard dimensions followed by
//! the organization's custom ones, always in the same order, so that two rows
//! with the same values produce the same key.
//!
//! Keys are persisted as their components joined by a comma, an absent value
//! being written as the empty string. A comma or backslash inside a value is
//! escaped with a backslash, so any value survives the round trip.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::error::ClosingError;

/// Dimensions every ledger row carries
pub const STANDARD_DIMENSIONS: [&str; 3] = ["cost_center", "finance_book", "project"];

/// Separator between key components in the persisted form
pub const KEY_DELIMITER: char = ',';

/// Escapes a delimiter or itself inside a persisted component
pub const KEY_ESCAPE: char = '\\';

/// Dimension values of a single ledger row, by dimension name
pub type DimensionValues = BTreeMap<String, String>;

/// Anything that can report its value for a named dimension
pub trait DimensionSource {
    /// Returns the row's value for `dimension`, if it has one
    fn dimension_value(&self, dimension: &str) -> Option<&str>;
}

impl DimensionSource for DimensionValues {
    fn dimension_value(&self, dimension: &str) -> Option<&str> {
        self.get(dimension).map(String::as_str)
    }
}

/// The ordered list of dimensions balances are grouped by
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionSet {
    names: Vec<String>,
}

impl DimensionSet {
    /// The standard dimensions only
    pub fn standard() -> Self {
        Self {
            names: STANDARD_DIMENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// The standard dimensions followed by the given custom dimensions
    ///
    /// # Errors
    ///
    /// Returns `ClosingError::InvalidDimensions` if a name is blank or listed twice
    pub fn with_custom<I, S>(custom: I) -> Result<Self, ClosingError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::standard();
        let mut seen: HashSet<String> = set.names.iter().cloned().collect();

        for name in custom {
            let name = name.into().trim().to_string();
            if name.is_empty() {
                return Err(ClosingError::InvalidDimensions(
                    "dimension names must not be blank".to_string(),
                ));
            }
            if !seen.insert(name.clone()) {
                return Err(ClosingError::InvalidDimensions(format!(
                    "dimension '{}' is listed more than once",
                    name
                )));
            }
            set.names.push(name);
        }

        Ok(set)
    }

    /// Dimension names in key order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of components in every key built from this set
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Builds the grouping key for a row
    ///
    /// Values are taken as they are; an empty value is treated as absent.
    pub fn key_for<R>(&self, row: &R) -> DimensionKey
    where
        R: DimensionSource + ?Sized,
    {
        DimensionKey(
            self.names
                .iter()
                .map(|name| {
                    row.dimension_value(name)
                        .filter(|v| !v.is_empty())
                        .map(str::to_string)
                })
                .collect(),
        )
    }

    /// Parses a persisted key and checks it has one component per dimension
    pub fn decode_key(&self, encoded: &str) -> Result<DimensionKey, ClosingError> {
        let key = DimensionKey::decode(encoded);
        self.check_arity(&key)?;
        Ok(key)
    }

    /// Checks that a key has one component per dimension
    pub fn check_arity(&self, key: &DimensionKey) -> Result<(), ClosingError> {
        if key.len() != self.names.len() {
            return Err(ClosingError::InvalidDimensionKey {
                key: key.encode(),
                expected: self.names.len(),
                found: key.len(),
            });
        }
        Ok(())
    }

    /// Pairs each dimension name with the key's value for it
    pub fn values_of(&self, key: &DimensionKey) -> DimensionValues {
        self.names
            .iter()
            .zip(key.values())
            .filter_map(|(name, value)| value.as_ref().map(|v| (name.clone(), v.clone())))
            .collect()
    }
}

impl Default for DimensionSet {
    fn default() -> Self {
        Self::standard()
    }
}

/// An ordered tuple of dimension values used as a grouping key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DimensionKey(Vec<Option<String>>);

impl DimensionKey {
    /// Creates a key from raw components
    pub fn new(values: Vec<Option<String>>) -> Self {
        Self(values)
    }

    /// Key components in dimension order
    pub fn values(&self) -> &[Option<String>] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Joins the components with the delimiter, absent values as empty strings
    pub fn encode(&self) -> String {
        let mut encoded = String::new();
        for (index, value) in self.0.iter().enumerate() {
            if index > 0 {
                encoded.push(KEY_DELIMITER);
            }
            for c in value.as_deref().unwrap_or("").chars() {
                if c == KEY_DELIMITER || c == KEY_ESCAPE {
                    encoded.push(KEY_ESCAPE);
                }
                encoded.push(c);
            }
        }
        encoded
    }

    /// Splits a persisted key on unescaped delimiters
    pub fn decode(encoded: &str) -> Self {
        let mut components = Vec::new();
        let mut current = String::new();
        let mut chars = encoded.chars();
        while let Some(c) = chars.next() {
            match c {
                KEY_ESCAPE => {
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                }
                KEY_DELIMITER => components.push(std::mem::take(&mut current)),
                _ => current.push(c),
            }
        }
        components.push(current);

        Self(
            components
                .into_iter()
                .map(|part| if part.is_empty() { None } else { Some(part) })
                .collect(),
        )
    }
}

impl fmt::Display for DimensionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl Serialize for DimensionKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for DimensionKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        Ok(DimensionKey::decode(&encoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> DimensionValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_key_follows_dimension_order() {
        let dims = DimensionSet::with_custom(["region"]).unwrap();
        let key = dims
            .key_for(&row(&[("region", "EMEA"), ("cost_center", "Main - AC")]));

        assert_eq!(
            key.values(),
            &[
                Some("Main - AC".to_string()),
                None,
                None,
                Some("EMEA".to_string())
            ]
        );
        assert_eq!(key.encode(), "Main - AC,,,EMEA");
    }

    #[test]
    fn test_empty_value_is_absent() {
        let dims = DimensionSet::standard();
        let empty = dims.key_for(&row(&[("project", "")]));
        let missing = dims.key_for(&row(&[]));
        assert_eq!(empty, missing);
    }

    #[test]
    fn test_values_are_kept_verbatim() {
        let dims = DimensionSet::standard();
        let key = dims.key_for(&row(&[("cost_center", " Main ")]));
        assert_eq!(key.values()[0].as_deref(), Some(" Main "));
        assert_eq!(dims.values_of(&key).get("cost_center").map(String::as_str), Some(" Main "));
    }

    #[test]
    fn test_delimiter_in_value_is_escaped() {
        let dims = DimensionSet::standard();
        let key = dims.key_for(&row(&[("cost_center", "North, East"), ("project", "C:\\tmp")]));

        let encoded = key.encode();
        assert_eq!(encoded, "North\\, East,,C:\\\\tmp");
        assert_eq!(dims.decode_key(&encoded).unwrap(), key);
    }

    #[test]
    fn test_decode_checks_arity() {
        let dims = DimensionSet::standard();
        assert!(dims.decode_key("a,b,c").is_ok());
        assert!(matches!(
            dims.decode_key("a,b"),
            Err(ClosingError::InvalidDimensionKey { expected: 3, found: 2, .. })
        ));
    }

    #[test]
    fn test_duplicate_custom_dimension_rejected() {
        assert!(DimensionSet::with_custom(["project"]).is_err());
        assert!(DimensionSet::with_custom(["region", "region"]).is_err());
        assert!(DimensionSet::with_custom([" "]).is_err());
    }

    #[test]
    fn test_values_of_skips_absent() {
        let dims = DimensionSet::standard();
        let key = DimensionKey::new(vec![Some("Main".into()), None, Some("P1".into())]);
        let values = dims.values_of(&key);
        assert_eq!(values.len(), 2);
        assert_eq!(values.get("project").map(String::as_str), Some("P1"));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn component() -> impl Strategy<Value = Option<String>> {
        proptest::option::of("[A-Za-z0-9 ,_\\\\-]{1,12}")
    }

    proptest! {
        #[test]
        fn encode_decode_roundtrip(values in proptest::collection::vec(component(), 3..6)) {
            let key = DimensionKey::new(values);
            prop_assert_eq!(DimensionKey::decode(&key.encode()), key);
        }

        #[test]
        fn equal_dimension_values_give_equal_keys(
            values in proptest::collection::vec(component(), 3..=3),
            noise in "[a-z]{1,8}"
        ) {
            let dims = DimensionSet::standard();
            let mut first = DimensionValues::new();
            for (name, value) in dims.names().iter().zip(&values) {
                if let Some(v) = value {
                    first.insert(name.clone(), v.clone());
                }
            }
            // Values outside the dimension list must not influence the key
            let mut second = first.clone();
            second.insert("remarks".to_string(), noise);

            prop_assert_eq!(dims.key_for(&first), dims.key_for(&second));
        }
    }
}
