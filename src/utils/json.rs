use serde::de::DeserializeOwned;
use serde_json::Value;

/// A field of a partial update: absent, explicitly `null`, or a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Nullable<T> {
    Omitted,
    Null,
    Value(T),
}

impl<T> Nullable<T> {
    pub fn is_omitted(&self) -> bool {
        matches!(self, Nullable::Omitted)
    }
}

pub fn classify_nullable<T: DeserializeOwned>(
    field: &str,
    optional_value: Option<&Value>,
) -> Result<Nullable<T>, String> {
    match optional_value {
        None => Ok(Nullable::Omitted),
        Some(Value::Null) => Ok(Nullable::Null),
        Some(other) => serde_json::from_value(other.clone())
            .map(Nullable::Value)
            .map_err(|err| format!("invalid value for {field}: {err}")),
    }
}
