//! Record keys.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Identifier of a record within a bucket.
///
/// Keys arrive as JSON numbers, JSON strings, or URL path segments. Two keys
/// are equal when their canonical string forms are equal, so `7` and `"7"`
/// address the same record. Serialization preserves the form the key was
/// created with.
#[derive(Debug, Clone)]
pub struct Key {
    repr: String,
    numeric: bool,
}

impl Key {
    /// Create a string key.
    pub fn string(key: impl Into<String>) -> Self {
        Self {
            repr: key.into(),
            numeric: false,
        }
    }

    /// Create an integer key.
    pub fn number(key: i64) -> Self {
        Self {
            repr: key.to_string(),
            numeric: true,
        }
    }

    /// Parse a URL path segment. Integer-looking segments become numeric keys.
    pub fn parse(segment: &str) -> Self {
        match segment.parse::<i64>() {
            Ok(n) => Self::number(n),
            Err(_) => Self::string(segment),
        }
    }

    /// Build a key from a JSON value. Only strings and numbers are keys.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::string(s.clone())),
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => Self::number(i),
                None => Self::string(n.to_string()),
            }),
            _ => None,
        }
    }

    /// Canonical string form.
    pub fn as_str(&self) -> &str {
        &self.repr
    }

    /// Whether this key was created from an integer.
    pub fn is_numeric(&self) -> bool {
        self.numeric
    }

    /// Convert back to the JSON value the key was created from.
    pub fn to_value(&self) -> Value {
        if self.numeric {
            if let Ok(n) = self.repr.parse::<i64>() {
                return Value::from(n);
            }
        }
        Value::String(self.repr.clone())
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.repr == other.repr
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.repr.hash(state);
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.repr.parse::<i64>(), other.repr.parse::<i64>()) {
            (Ok(a), Ok(b)) => a.cmp(&b).then_with(|| self.repr.cmp(&other.repr)),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => self.repr.cmp(&other.repr),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr)
    }
}

impl From<i64> for Key {
    fn from(key: i64) -> Self {
        Self::number(key)
    }
}

impl From<i32> for Key {
    fn from(key: i32) -> Self {
        Self::number(key.into())
    }
}

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        Self::string(key)
    }
}

impl From<String> for Key {
    fn from(key: String) -> Self {
        Self::string(key)
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Key::from_value(&value)
            .ok_or_else(|| D::Error::custom("key must be a string or a number"))
    }
}
