//! Wire types for the error catalog.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One row of the error dictionary served by the catalog endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Numeric error identifier.
    #[serde(default, deserialize_with = "deserialize_code")]
    pub code: Option<i64>,

    /// Symbolic error identifier, the alternate lookup axis.
    #[serde(default, rename = "errorKey")]
    pub error_key: Option<String>,

    /// Localized, user-facing text.
    #[serde(default)]
    pub message: Option<String>,

    /// Informational only; a single active locale is assumed.
    #[serde(default)]
    pub locale: Option<String>,
}

impl CatalogEntry {
    /// Create an entry indexed by code.
    pub fn with_code(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            error_key: None,
            message: Some(message.into()),
            locale: None,
        }
    }

    /// Create an entry indexed by key.
    pub fn with_key(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: None,
            error_key: Some(key.into()),
            message: Some(message.into()),
            locale: None,
        }
    }

    /// Set the key on an existing entry.
    pub fn and_key(mut self, key: impl Into<String>) -> Self {
        self.error_key = Some(key.into());
        self
    }

    /// The message, if present and non-empty.
    pub fn display_message(&self) -> Option<&str> {
        self.message.as_deref().filter(|m| !m.is_empty())
    }
}

/// Read an error code from a JSON value.
///
/// The backend is not consistent about sending codes as numbers, so integral
/// numbers and numeric strings are both accepted.
pub fn code_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn deserialize_code<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(code_from_value))
}
