//! Conversions between [`Value`] and `serde_json`.
//!
//! Initial scope data usually arrives as JSON or as a `Serialize` type; both
//! go through `serde_json::Value`.

use serde::Serialize;

use crate::Value;

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl Value {
    /// Convert any serializable value.
    pub fn from_serialize<T: Serialize>(data: &T) -> Result<Value, serde_json::Error> {
        serde_json::to_value(data).map(Value::from)
    }

    /// Render as JSON for diagnostics.
    ///
    /// `Undefined`, non-finite numbers and scope references become `null`;
    /// host objects render as their coerced primitive when they have one.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null | Value::Scope(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(arr) => {
                serde_json::Value::Array(arr.borrow().iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Host(host) => host
                .coerce()
                .map_or(serde_json::Value::Null, |primitive| primitive.to_json()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use serde_json::json;

    #[derive(Serialize)]
    struct Settings {
        theme: String,
        retries: u32,
        tags: Vec<String>,
    }

    #[test]
    fn json_objects_become_maps() {
        let value = Value::from(json!({"name": "Alice", "age": 30, "admin": true}));
        assert_eq!(value.get_key("name"), Value::from("Alice"));
        assert_eq!(value.get_key("age"), Value::Number(30.0));
        assert_eq!(value.get_key("admin"), Value::Bool(true));
    }

    #[test]
    fn serializable_structs_convert() {
        let settings = Settings {
            theme: "dark".into(),
            retries: 3,
            tags: vec!["a".into()],
        };
        let value = Value::from_serialize(&settings).unwrap();
        assert_eq!(value.get_key("theme"), Value::from("dark"));
        assert_eq!(value.get_key("tags").get_key("0"), Value::from("a"));
    }

    #[test]
    fn to_json_maps_engine_only_values_to_null() {
        let value = Value::from(vec![Value::Undefined, Value::Number(f64::NAN), Value::from(1)]);
        assert_eq!(value.to_json(), json!([null, null, 1.0]));
    }
}
