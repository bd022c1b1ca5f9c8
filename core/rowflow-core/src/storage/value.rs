//! Scalar values and records — the row model shared by every stream.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// A single field value as produced by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Numeric view used by aggregators. Text and NULL have none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Integer(v) => Some(*v as f64),
            ScalarValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ScalarValue::Null => "NULL",
            ScalarValue::Integer(_) => "INTEGER",
            ScalarValue::Float(_) => "FLOAT",
            ScalarValue::Text(_) => "TEXT",
        }
    }

    /// SQL 비교: NULL은 어떤 값과도 비교 불가 (None)
    ///
    /// Integer and Float compare numerically; Text compares lexically.
    pub fn sql_cmp(&self, other: &ScalarValue) -> Option<Ordering> {
        match (self, other) {
            (ScalarValue::Null, _) | (_, ScalarValue::Null) => None,
            (ScalarValue::Integer(a), ScalarValue::Integer(b)) => Some(a.cmp(b)),
            (ScalarValue::Text(a), ScalarValue::Text(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }

    /// Total order used by ORDER BY: NULLs first, then numbers, then text.
    pub fn sort_cmp(&self, other: &ScalarValue) -> Ordering {
        fn rank(v: &ScalarValue) -> u8 {
            match v {
                ScalarValue::Null => 0,
                ScalarValue::Integer(_) | ScalarValue::Float(_) => 1,
                ScalarValue::Text(_) => 2,
            }
        }
        self.sql_cmp(other)
            .unwrap_or_else(|| rank(self).cmp(&rank(other)))
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL"),
            ScalarValue::Integer(v) => write!(f, "{v}"),
            ScalarValue::Float(v) => write!(f, "{v}"),
            ScalarValue::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Integer(v)
    }
}

impl From<i32> for ScalarValue {
    fn from(v: i32) -> Self {
        ScalarValue::Integer(v as i64)
    }
}

impl From<usize> for ScalarValue {
    fn from(v: usize) -> Self {
        ScalarValue::Integer(v as i64)
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::Float(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::Text(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        ScalarValue::Text(v)
    }
}

impl<T: Into<ScalarValue>> From<Option<T>> for ScalarValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(ScalarValue::Null, Into::into)
    }
}

/// One store row: field names in result-set order paired with values.
///
/// All records of one result set share the same column list.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<ScalarValue>,
}

impl Record {
    pub(crate) fn new(columns: Arc<[String]>, values: Vec<ScalarValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Builds a record from `(name, value)` pairs, keeping their order.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<ScalarValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        let (columns, values): (Vec<String>, Vec<ScalarValue>) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self {
            columns: columns.into(),
            values,
        }
    }

    /// Field lookup by name.
    pub fn get(&self, name: &str) -> Option<&ScalarValue> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|idx| &self.values[idx])
    }

    /// Field lookup by position.
    pub fn value(&self, idx: usize) -> Option<&ScalarValue> {
        self.values.get(idx)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[ScalarValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScalarValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> Record {
        Record::from_pairs([
            ("user_id", ScalarValue::from("u-1")),
            ("name", ScalarValue::from("Alice")),
            ("age", ScalarValue::from(28)),
        ])
    }

    #[test]
    fn test_record_lookup_by_name_and_position() {
        let rec = user();
        assert_eq!(rec.get("name"), Some(&ScalarValue::Text("Alice".into())));
        assert_eq!(rec.value(2), Some(&ScalarValue::Integer(28)));
        assert_eq!(rec.get("email"), None);
        assert_eq!(rec.len(), 3);
    }

    #[test]
    fn test_record_serializes_in_column_order() {
        let json = serde_json::to_string(&user()).unwrap();
        assert_eq!(json, r#"{"user_id":"u-1","name":"Alice","age":28}"#);
    }

    #[test]
    fn test_sql_cmp_mixes_int_and_float() {
        let a = ScalarValue::Integer(3);
        let b = ScalarValue::Float(3.5);
        assert_eq!(a.sql_cmp(&b), Some(Ordering::Less));
        assert_eq!(ScalarValue::Null.sql_cmp(&a), None);
        assert_eq!(ScalarValue::Text("a".into()).sql_cmp(&a), None);
    }

    #[test]
    fn test_sort_cmp_places_nulls_first() {
        let mut vals = vec![
            ScalarValue::Integer(2),
            ScalarValue::Null,
            ScalarValue::Integer(1),
        ];
        vals.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(vals[0], ScalarValue::Null);
        assert_eq!(vals[1], ScalarValue::Integer(1));
    }

    #[test]
    fn test_option_into_scalar() {
        let none: Option<i64> = None;
        assert!(ScalarValue::from(none).is_null());
        assert_eq!(ScalarValue::from(Some(5i64)), ScalarValue::Integer(5));
    }
}
