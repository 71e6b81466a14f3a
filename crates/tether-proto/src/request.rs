//! Store requests issued by clients.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::key::Key;
use crate::notification::ChangeAction;

/// A record: a JSON object of field values.
pub type Record = serde_json::Map<String, Value>;

/// Named parameters substituted into a conditions expression.
pub type Parameters = serde_json::Map<String, Value>;

/// Field used as primary key when a request does not name one.
pub const DEFAULT_PRIMARY_KEY: &str = "key";

/// The operation a store request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    /// Fetch all records of a bucket, optionally filtered by conditions.
    Fetch,
    /// Re-read a single record.
    Refresh,
    /// Create a record.
    Create,
    /// Update an existing record.
    Update,
    /// Delete an existing record.
    Delete,
}

impl Operation {
    /// Lowercase name used in logs and error replies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Fetch => "fetch",
            Operation::Refresh => "refresh",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    /// Whether this operation requires a record key.
    pub fn requires_key(&self) -> bool {
        matches!(
            self,
            Operation::Refresh | Operation::Update | Operation::Delete
        )
    }

    /// Whether this operation requires record data.
    pub fn requires_record(&self) -> bool {
        matches!(
            self,
            Operation::Create | Operation::Update | Operation::Delete
        )
    }

    /// The change this operation commits, if it writes.
    pub fn change_action(&self) -> Option<ChangeAction> {
        match self {
            Operation::Fetch | Operation::Refresh => None,
            Operation::Create => Some(ChangeAction::Create),
            Operation::Update => Some(ChangeAction::Update),
            Operation::Delete => Some(ChangeAction::Delete),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cardinality of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationKind {
    /// The property holds a single related key.
    ToOne,
    /// The property holds a list of related keys.
    ToMany,
}

/// A relation carried alongside a write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    /// Bucket of the related records.
    pub bucket: String,
    /// Relation cardinality.
    #[serde(rename = "type")]
    pub kind: RelationKind,
    /// Property on the record that holds the related key(s).
    pub property_name: String,
    /// Related keys. A single key is accepted for to-one relations.
    #[serde(default, deserialize_with = "one_or_many")]
    pub keys: Vec<Key>,
}

impl Relation {
    /// Create a to-one relation.
    pub fn to_one(
        bucket: impl Into<String>,
        property_name: impl Into<String>,
        key: Option<Key>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            kind: RelationKind::ToOne,
            property_name: property_name.into(),
            keys: key.into_iter().collect(),
        }
    }

    /// Create a to-many relation.
    pub fn to_many(
        bucket: impl Into<String>,
        property_name: impl Into<String>,
        keys: Vec<Key>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            kind: RelationKind::ToMany,
            property_name: property_name.into(),
            keys,
        }
    }

    /// The value this relation contributes to its record.
    pub fn property_value(&self) -> Value {
        match self.kind {
            RelationKind::ToOne => self
                .keys
                .first()
                .map(Key::to_value)
                .unwrap_or(Value::Null),
            RelationKind::ToMany => Value::Array(self.keys.iter().map(Key::to_value).collect()),
        }
    }
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Key>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<Key>),
        One(Key),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::Many(keys)) => keys,
        Some(OneOrMany::One(key)) => vec![key],
    })
}

/// Property names, given as strings or as `{"key": name}` objects.
fn property_names<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Property {
        Name(String),
        Keyed { key: String },
    }

    Ok(Option::<Vec<Property>>::deserialize(deserializer)?
        .unwrap_or_default()
        .into_iter()
        .map(|p| match p {
            Property::Name(name) | Property::Keyed { key: name } => name,
        })
        .collect())
}

/// A request against a bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreRequest {
    /// Target bucket.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    /// Target record key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<Key>,
    /// Record data. For deletes this is the snapshot of the record being removed.
    #[serde(alias = "recordData", skip_serializing_if = "Option::is_none")]
    pub record: Option<Record>,
    /// Conditions expression restricting a fetch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<String>,
    /// Parameters referenced by the conditions expression.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub parameters: Parameters,
    /// Fields to return from a fetch or refresh. Empty returns whole records.
    #[serde(
        default,
        deserialize_with = "property_names",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub properties: Vec<String>,
    /// Relations to apply alongside a write.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relations: Vec<Relation>,
    /// Name of the primary key field, if not [`DEFAULT_PRIMARY_KEY`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    /// Opaque client token echoed on the reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_data: Option<Value>,
}

impl StoreRequest {
    /// Create a request against a bucket.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: Some(bucket.into()),
            ..Self::default()
        }
    }

    /// Set the record key.
    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set the record data.
    pub fn with_record(mut self, record: Record) -> Self {
        self.record = Some(record);
        self
    }

    /// Restrict a fetch with a conditions expression.
    pub fn with_conditions(
        mut self,
        conditions: impl Into<String>,
        parameters: Parameters,
    ) -> Self {
        self.conditions = Some(conditions.into());
        self.parameters = parameters;
        self
    }

    /// Return only the named fields, plus the primary key.
    pub fn with_properties<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.properties = properties.into_iter().map(Into::into).collect();
        self
    }

    /// Add a relation.
    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    /// Override the primary key field name.
    pub fn with_primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key = Some(field.into());
        self
    }

    /// Set the token echoed on the reply.
    pub fn with_return_data(mut self, data: Value) -> Self {
        self.return_data = Some(data);
        self
    }

    /// The bucket name, if present and non-empty.
    pub fn bucket_name(&self) -> Option<&str> {
        self.bucket.as_deref().filter(|b| !b.is_empty())
    }

    /// The primary key field name.
    pub fn primary_key_field(&self) -> &str {
        self.primary_key.as_deref().unwrap_or(DEFAULT_PRIMARY_KEY)
    }

    /// The key addressed by this request: the explicit key, or the primary
    /// key field of the record data.
    pub fn record_key(&self) -> Option<Key> {
        self.key.clone().or_else(|| {
            self.record
                .as_ref()
                .and_then(|r| r.get(self.primary_key_field()))
                .and_then(Key::from_value)
        })
    }

    /// Narrow a record to the requested properties. The primary key field is
    /// always kept. Missing properties come back as `null`.
    pub fn project(&self, record: Record) -> Record {
        if self.properties.is_empty() {
            return record;
        }

        let key_field = self.primary_key_field();
        let mut projected = Record::new();
        if let Some(key) = record.get(key_field) {
            projected.insert(key_field.to_string(), key.clone());
        }
        for name in &self.properties {
            let value = record.get(name).cloned().unwrap_or(Value::Null);
            projected.insert(name.clone(), value);
        }
        projected
    }

    /// Key of a record returned by storage, falling back to the request key.
    pub fn key_of(&self, record: &Record) -> Option<Key> {
        record
            .get(self.primary_key_field())
            .and_then(Key::from_value)
            .or_else(|| self.key.clone())
    }
}
