use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldNames {
    pub flag: String,
    pub set: String,
    pub unset: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            flag: "isProxy".to_string(),
            set: "profileIds".to_string(),
            unset: "deleted".to_string(),
        }
    }
}

impl FieldNames {
    pub fn validate(&self) -> Result<(), String> {
        for (label, name) in [("flag", &self.flag), ("set", &self.set), ("unset", &self.unset)] {
            if name.trim().is_empty() {
                return Err(format!("{} field name cannot be empty", label));
            }
        }
        if self.flag == self.set || self.flag == self.unset || self.set == self.unset {
            return Err(format!(
                "field names must be distinct (flag={}, set={}, unset={})",
                self.flag, self.set, self.unset
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    pub fn bool_field(&self, field: &str) -> Option<bool> {
        self.fields.get(field).and_then(Value::as_bool)
    }

    pub fn set_contains(&self, field: &str, member: &str) -> bool {
        match self.fields.get(field) {
            Some(Value::Array(items)) => items.iter().any(|v| v.as_str() == Some(member)),
            _ => false,
        }
    }

    /// Applies a mutation with document-store semantics: `unset` removes,
    /// `set` overwrites, `add_to_set` appends only when the member is absent.
    /// Nothing is modified if any `add_to_set` target holds a non-array.
    pub fn apply(&mut self, mutation: &Mutation) -> Result<(), StoreError> {
        for field in mutation.add_to_set.keys() {
            match self.fields.get(field) {
                None | Some(Value::Array(_)) => {}
                Some(_) => {
                    return Err(StoreError::NotAnArray {
                        field: field.clone(),
                    })
                }
            }
        }
        for field in &mutation.unset {
            self.fields.remove(field);
        }
        for (field, value) in &mutation.set {
            self.fields.insert(field.clone(), value.clone());
        }
        for (field, member) in &mutation.add_to_set {
            let entry = self
                .fields
                .entry(field.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(items) = entry {
                if !items.contains(member) {
                    items.push(member.clone());
                }
            }
        }
        Ok(())
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unset: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub set: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub add_to_set: BTreeMap<String, Value>,
}

impl Mutation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flag(fields: &FieldNames, value: bool) -> Self {
        Self::new()
            .unset(&fields.unset)
            .set(&fields.flag, Value::Bool(value))
    }

    pub fn add_member(fields: &FieldNames, member: &str) -> Self {
        Self::new().add_to_set(&fields.set, Value::String(member.to_string()))
    }

    pub fn unset(mut self, field: &str) -> Self {
        if !self.unset.iter().any(|f| f == field) {
            self.unset.push(field.to_string());
        }
        self
    }

    pub fn set(mut self, field: &str, value: Value) -> Self {
        self.set.insert(field.to_string(), value);
        self
    }

    pub fn add_to_set(mut self, field: &str, member: Value) -> Self {
        self.add_to_set.insert(field.to_string(), member);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.unset.is_empty() && self.set.is_empty() && self.add_to_set.is_empty()
    }
}
