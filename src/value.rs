//! Conversions between Rust values and [`ConstValue`].

use async_graphql_value::{ConstValue, Name};
use indexmap::IndexMap;

pub trait ToConstValue {
    fn to_const_value(&self) -> ConstValue;
}

pub trait FromConstValue: Sized {
    fn from_const_value(value: &ConstValue) -> Result<Self, String>;
}

/// Builds a `ConstValue::Object` from `(field, value)` pairs, keeping their order.
pub fn object<I, K>(fields: I) -> ConstValue
where
    I: IntoIterator<Item = (K, ConstValue)>,
    K: AsRef<str>,
{
    ConstValue::Object(
        fields
            .into_iter()
            .map(|(k, v)| (Name::new(k), v))
            .collect::<IndexMap<_, _>>(),
    )
}

/// Reads a required field out of an object value.
pub fn field<T: FromConstValue>(value: &ConstValue, name: &str) -> Result<T, String> {
    match value {
        ConstValue::Object(obj) => match obj.get(name) {
            Some(v) => T::from_const_value(v).map_err(|e| format!("{}: {}", name, e)),
            None => T::from_const_value(&ConstValue::Null)
                .map_err(|_| format!("Missing field '{}'", name)),
        },
        _ => Err("Expected object".to_string()),
    }
}

/// Short description of a value's kind, used in type mismatch messages.
pub fn kind_of(value: &ConstValue) -> &'static str {
    match value {
        ConstValue::Null => "null",
        ConstValue::Number(n) if n.is_f64() => "float",
        ConstValue::Number(_) => "integer",
        ConstValue::String(_) => "string",
        ConstValue::Boolean(_) => "boolean",
        ConstValue::Binary(_) => "binary",
        ConstValue::Enum(_) => "enum",
        ConstValue::List(_) => "list",
        ConstValue::Object(_) => "object",
    }
}

impl ToConstValue for ConstValue {
    fn to_const_value(&self) -> ConstValue {
        self.clone()
    }
}

impl FromConstValue for ConstValue {
    fn from_const_value(value: &ConstValue) -> Result<Self, String> {
        Ok(value.clone())
    }
}

impl ToConstValue for i32 {
    fn to_const_value(&self) -> ConstValue {
        ConstValue::Number((*self as i64).into())
    }
}

impl FromConstValue for i32 {
    fn from_const_value(value: &ConstValue) -> Result<Self, String> {
        match value {
            ConstValue::Number(n) => n
                .as_i64()
                .and_then(|n| i32::try_from(n).ok())
                .ok_or_else(|| "Expected i32".to_string()),
            _ => Err("Expected number".to_string()),
        }
    }
}

impl ToConstValue for i64 {
    fn to_const_value(&self) -> ConstValue {
        ConstValue::Number((*self).into())
    }
}

impl FromConstValue for i64 {
    fn from_const_value(value: &ConstValue) -> Result<Self, String> {
        match value {
            ConstValue::Number(n) => n.as_i64().ok_or_else(|| "Expected i64".to_string()),
            _ => Err("Expected number".to_string()),
        }
    }
}

impl ToConstValue for f64 {
    fn to_const_value(&self) -> ConstValue {
        serde_json::Number::from_f64(*self)
            .map(ConstValue::Number)
            .unwrap_or(ConstValue::Null)
    }
}

impl FromConstValue for f64 {
    fn from_const_value(value: &ConstValue) -> Result<Self, String> {
        match value {
            ConstValue::Number(n) => n.as_f64().ok_or_else(|| "Expected f64".to_string()),
            _ => Err("Expected number".to_string()),
        }
    }
}

impl ToConstValue for bool {
    fn to_const_value(&self) -> ConstValue {
        ConstValue::Boolean(*self)
    }
}

impl FromConstValue for bool {
    fn from_const_value(value: &ConstValue) -> Result<Self, String> {
        match value {
            ConstValue::Boolean(b) => Ok(*b),
            _ => Err("Expected boolean".to_string()),
        }
    }
}

impl ToConstValue for String {
    fn to_const_value(&self) -> ConstValue {
        ConstValue::String(self.clone())
    }
}

impl ToConstValue for &str {
    fn to_const_value(&self) -> ConstValue {
        ConstValue::String((*self).to_string())
    }
}

impl FromConstValue for String {
    fn from_const_value(value: &ConstValue) -> Result<Self, String> {
        match value {
            ConstValue::String(s) => Ok(s.clone()),
            _ => Err("Expected string".to_string()),
        }
    }
}

impl<T: ToConstValue> ToConstValue for Option<T> {
    fn to_const_value(&self) -> ConstValue {
        match self {
            Some(v) => v.to_const_value(),
            None => ConstValue::Null,
        }
    }
}

impl<T: FromConstValue> FromConstValue for Option<T> {
    fn from_const_value(value: &ConstValue) -> Result<Self, String> {
        match value {
            ConstValue::Null => Ok(None),
            v => T::from_const_value(v).map(Some),
        }
    }
}

impl<T: ToConstValue> ToConstValue for Vec<T> {
    fn to_const_value(&self) -> ConstValue {
        ConstValue::List(self.iter().map(|v| v.to_const_value()).collect())
    }
}

impl<T: FromConstValue> FromConstValue for Vec<T> {
    fn from_const_value(value: &ConstValue) -> Result<Self, String> {
        match value {
            ConstValue::List(items) => items.iter().map(T::from_const_value).collect(),
            _ => Err("Expected list".to_string()),
        }
    }
}
