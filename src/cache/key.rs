use serde::{Deserialize, Serialize};
use std::fmt;

const SEPARATOR: char = '|';
const ESCAPE: char = '\\';

/// A primitive field value that can take part in an index key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl FieldValue {
    /// Sequence numbers must be positive integers.
    pub fn as_seq(&self) -> Option<u64> {
        match self {
            FieldValue::Int(n) if *n > 0 => Some(*n as u64),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Int(n) => write!(f, "{n}"),
            FieldValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Str(s)
    }
}

impl From<&String> for FieldValue {
    fn from(s: &String) -> Self {
        FieldValue::Str(s.clone())
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Int(n)
    }
}

impl From<u64> for FieldValue {
    fn from(n: u64) -> Self {
        FieldValue::Int(n as i64)
    }
}

impl From<u32> for FieldValue {
    fn from(n: u32) -> Self {
        FieldValue::Int(n.into())
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// Something the cache can hold. Field names are the wire names used in
/// criteria, e.g. `"streamId"`.
pub trait Entity: Clone + Send + Sync + 'static {
    fn id(&self) -> String;

    fn field(&self, name: &str) -> Option<FieldValue>;
}

/// Ordered `(field, value)` pairs identifying a key in one index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Criteria(Vec<(&'static str, FieldValue)>);

impl Criteria {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with(mut self, field: &'static str, value: impl Into<FieldValue>) -> Self {
        self.0.push((field, value.into()));
        self
    }

    pub fn fields(&self) -> Vec<&'static str> {
        self.0.iter().map(|(f, _)| *f).collect()
    }

    pub fn values(&self) -> Vec<FieldValue> {
        self.0.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn value(&self, field: &str) -> Option<&FieldValue> {
        self.0.iter().find(|(f, _)| *f == field).map(|(_, v)| v)
    }

    pub fn encoded_fields(&self) -> String {
        encode_fields(&self.fields())
    }

    pub fn encoded_values(&self) -> String {
        encode_key(&self.values())
    }
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{field}={value}")?;
        }
        Ok(())
    }
}

/// Join values into one key. Separator and escape characters inside a value
/// are escaped so distinct tuples never collide.
pub fn encode_key(values: &[FieldValue]) -> String {
    let mut key = String::new();
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            key.push(SEPARATOR);
        }
        for c in value.to_string().chars() {
            if c == SEPARATOR || c == ESCAPE {
                key.push(ESCAPE);
            }
            key.push(c);
        }
    }
    key
}

pub fn encode_fields(fields: &[&str]) -> String {
    let values: Vec<FieldValue> = fields.iter().map(|f| FieldValue::from(*f)).collect();
    encode_key(&values)
}

/// Split a key produced by [`encode_key`] back into its string parts.
pub fn decode_key(key: &str) -> Vec<String> {
    let mut parts = vec![String::new()];
    let mut chars = key.chars();
    while let Some(c) = chars.next() {
        match c {
            ESCAPE => {
                if let Some(next) = chars.next() {
                    if let Some(last) = parts.last_mut() {
                        last.push(next);
                    }
                }
            }
            SEPARATOR => parts.push(String::new()),
            _ => {
                if let Some(last) = parts.last_mut() {
                    last.push(c);
                }
            }
        }
    }
    parts
}

/// Key of `entity` in an index over `fields`; `None` unless every field is set.
pub fn entity_key<T: Entity>(entity: &T, fields: &[&'static str]) -> Option<String> {
    let values = fields
        .iter()
        .map(|f| entity.field(f))
        .collect::<Option<Vec<_>>>()?;
    Some(encode_key(&values))
}
