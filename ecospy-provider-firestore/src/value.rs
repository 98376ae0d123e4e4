//! Firestore's typed JSON value encoding.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single field value, tagged with its Firestore type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum Value {
    NullValue(()),
    BooleanValue(bool),
    /// 64-bit integers travel as strings.
    IntegerValue(String),
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(LatLng),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct LatLng {
    #[serde(default)]
    latitude: f64,
    #[serde(default)]
    longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub(crate) struct ArrayValue {
    #[serde(default)]
    values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub(crate) struct MapValue {
    #[serde(default)]
    fields: HashMap<String, Value>,
}

impl Value {
    pub(crate) fn array<I: IntoIterator<Item = Self>>(values: I) -> Self {
        Self::ArrayValue(ArrayValue {
            values: values.into_iter().collect(),
        })
    }

    /// Numeric value of an integer or double field.
    pub(crate) fn as_f64(&self) -> Option<f64> {
        match self {
            Self::DoubleValue(number) => Some(*number),
            Self::IntegerValue(raw) => raw.parse::<f64>().ok(),
            _ => None,
        }
    }

    pub(crate) fn as_str(&self) -> Option<&str> {
        match self {
            Self::StringValue(text) => Some(text),
            _ => None,
        }
    }
}

/// A document as returned by GET/list/query, or sent with PATCH.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default)]
    fields: HashMap<String, Value>,
}

impl Document {
    pub(crate) fn with_fields(fields: HashMap<String, Value>) -> Self {
        Self { name: None, fields }
    }

    /// Last segment of the resource name.
    pub(crate) fn id(&self) -> Option<&str> {
        self.name
            .as_deref()
            .and_then(|name| name.rsplit('/').next())
            .filter(|id| !id.is_empty())
    }

    pub(crate) fn number(&self, field: &str) -> Option<f64> {
        self.fields.get(field).and_then(Value::as_f64)
    }

    pub(crate) fn string(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}
