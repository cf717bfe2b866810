//! Serde helpers for wire-document encodings.
//!
//! These modules provide custom serialization for fields whose JSON shape
//! carries more information than the default derive can express.

/// Serialize `Option<Option<T>>` so that an absent key and an explicit `null`
/// stay distinguishable.
///
/// Pair with `#[serde(default, skip_serializing_if = "Option::is_none")]`:
/// `None` means the key was absent, `Some(None)` means it was `null`.
pub mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            None | Some(None) => serializer.serialize_none(),
            Some(Some(v)) => v.serialize(serializer),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        // Only called when the key is present; absence is handled by `default`.
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

/// Accept identifiers written either as JSON strings or JSON numbers.
///
/// Numbers are stringified on read; ids always serialize as strings.
pub mod lenient_id {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S>(value: &str, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(serde::de::Error::invalid_type(
                unexpected(&other),
                &"a string or number identifier",
            )),
        }
    }

    /// Same as the parent module, for optional ids (`null` reads as `None`).
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use serde_json::Value;

        pub fn serialize<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(id) => serializer.serialize_str(id),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Value::deserialize(deserializer)? {
                Value::Null => Ok(None),
                Value::String(s) => Ok(Some(s)),
                Value::Number(n) => Ok(Some(n.to_string())),
                other => Err(serde::de::Error::invalid_type(
                    super::unexpected(&other),
                    &"a string or number identifier",
                )),
            }
        }
    }

    pub(super) fn unexpected(value: &Value) -> serde::de::Unexpected<'_> {
        use serde::de::Unexpected;
        match value {
            Value::Null => Unexpected::Unit,
            Value::Bool(b) => Unexpected::Bool(*b),
            Value::Number(_) => Unexpected::Other("number"),
            Value::String(s) => Unexpected::Str(s),
            Value::Array(_) => Unexpected::Seq,
            Value::Object(_) => Unexpected::Map,
        }
    }
}
