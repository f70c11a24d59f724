//! Comparable resource fields and change sets
//!
//! A resource describes itself as an ordered list of named [`Field`]s. The
//! same description is produced for the desired value and for the actual value
//! returned by lookup; [`diff`](crate::diff::diff) compares the two field by field.
//!
//! A field with no value means "no requirement": it never produces a change.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Value of a single field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Bool(bool),
    Tags(BTreeMap<String, String>),
    /// Resolved identifier of a referenced resource; `None` when unset
    Ref(Option<String>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{:?}", s),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Tags(tags) => {
                f.write_str("{")?;
                for (i, (k, v)) in tags.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}={}", k, v)?;
                }
                f.write_str("}")
            }
            FieldValue::Ref(Some(id)) => f.write_str(id),
            FieldValue::Ref(None) => f.write_str("<none>"),
        }
    }
}

/// How a desired value is compared against the actual one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Equality {
    #[default]
    Exact,
    /// Every desired entry must be present in the actual value; extra actual
    /// entries are allowed (used for tags)
    Subset,
}

impl Equality {
    /// Whether `actual` satisfies `desired`
    pub fn satisfied(self, actual: &FieldValue, desired: &FieldValue) -> bool {
        match (self, actual, desired) {
            (Equality::Subset, FieldValue::Tags(have), FieldValue::Tags(want)) => {
                want.iter().all(|(k, v)| have.get(k) == Some(v))
            }
            _ => actual == desired,
        }
    }
}

/// One named field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub value: Option<FieldValue>,
    pub equality: Equality,
}

/// Ordered field description of a resource value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    fields: Vec<Field>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field with an explicit value and equality
    pub fn field(mut self, name: &'static str, value: Option<FieldValue>, equality: Equality) -> Self {
        self.fields.retain(|f| f.name != name);
        self.fields.push(Field { name, value, equality });
        self
    }

    pub fn text(self, name: &'static str, value: Option<impl Into<String>>) -> Self {
        self.field(name, value.map(|v| FieldValue::Text(v.into())), Equality::Exact)
    }

    pub fn bool(self, name: &'static str, value: Option<bool>) -> Self {
        self.field(name, value.map(FieldValue::Bool), Equality::Exact)
    }

    /// Tags compared as a subset; an empty map carries no requirement
    pub fn tags(self, name: &'static str, tags: &BTreeMap<String, String>) -> Self {
        let value = (!tags.is_empty()).then(|| FieldValue::Tags(tags.clone()));
        self.field(name, value, Equality::Subset)
    }

    /// Reference field; `None` is a real value ("not set"), not "don't care"
    pub fn reference(self, name: &'static str, id: Option<String>) -> Self {
        self.field(name, Some(FieldValue::Ref(id)), Equality::Exact)
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.get(name).and_then(|f| f.value.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }
}

/// One field whose actual value does not satisfy the desired one
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: &'static str,
    pub actual: Option<FieldValue>,
    pub desired: FieldValue,
}

/// Fields that must change, in field order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChangeSet {
    changes: Vec<FieldChange>,
}

impl ChangeSet {
    pub(crate) fn push(&mut self, change: FieldChange) {
        self.changes.push(change);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.changes.iter().find(|c| c.field == field)
    }

    /// Names of the changed fields, in field order
    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.changes.iter().map(|c| c.field)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldChange> {
        self.changes.iter()
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, change) in self.changes.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match &change.actual {
                Some(actual) => write!(f, "{}: {} -> {}", change.field, actual, change.desired)?,
                None => write!(f, "{}: -> {}", change.field, change.desired)?,
            }
        }
        Ok(())
    }
}
