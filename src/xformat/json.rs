//! Conversions between [`Value`] and `serde_json::Value`.
//!
//! JSON → xformat accepts objects, arrays, strings and integers in the i32
//! range.  Floats, booleans and null have no xformat kind and are rejected.
//! Object keys keep document order in both directions.
//!
//! xformat → JSON renders bytes as lowercase hex strings and requires map
//! keys to be text or integers (integers become their decimal string).

use serde_json::{Map as JsonMap, Number, Value as Json};

use super::{Value, XFormatError};

impl TryFrom<&Json> for Value {
    type Error = XFormatError;

    fn try_from(json: &Json) -> Result<Self, Self::Error> {
        Ok(match json {
            Json::String(s) => Value::Text(s.clone()),
            Json::Number(n) => {
                let value = n.as_i64()
                    .ok_or_else(|| XFormatError::UnsupportedJson(format!("non-integer number {n}")))?;
                if i32::try_from(value).is_err() {
                    return Err(XFormatError::IntegerOverflow { value: value as i128 });
                }
                Value::Int(value)
            }
            Json::Array(items) => Value::List(
                items.iter().map(Value::try_from).collect::<Result<_, _>>()?,
            ),
            Json::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| -> Result<(Value, Value), XFormatError> {
                        Ok((Value::Text(k.clone()), Value::try_from(v)?))
                    })
                    .collect::<Result<_, _>>()?,
            ),
            Json::Bool(_) => return Err(XFormatError::UnsupportedJson("boolean".into())),
            Json::Null    => return Err(XFormatError::UnsupportedJson("null".into())),
        })
    }
}

impl Value {
    pub fn to_json(&self) -> Result<Json, XFormatError> {
        Ok(match self {
            Value::Bytes(b) => Json::String(hex::encode(b)),
            Value::Int(n)   => Json::Number(Number::from(*n)),
            Value::Text(s)  => Json::String(s.clone()),
            Value::List(items) => Json::Array(
                items.iter().map(Value::to_json).collect::<Result<_, _>>()?,
            ),
            Value::Map(entries) => {
                let mut map = JsonMap::new();
                for (k, v) in entries {
                    let key = match k {
                        Value::Text(s) => s.clone(),
                        Value::Int(n)  => n.to_string(),
                        other => {
                            return Err(XFormatError::UnsupportedJson(format!(
                                "{} map key",
                                other.tag().name()
                            )));
                        }
                    };
                    map.insert(key, v.to_json()?);
                }
                Json::Object(map)
            }
        })
    }
}
