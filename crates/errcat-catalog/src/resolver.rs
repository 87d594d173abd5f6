//! Message resolution.
//!
//! Turns a backend error payload into the text shown to the user:
//!
//! 1. Connectivity sentinel (`code == -1`) → fixed connectivity message
//! 2. Catalog entry by code
//! 3. Catalog entry by key
//! 4. The payload's own message
//! 5. The caller's fallback
//! 6. Fixed default message
//!
//! Resolution never fails. A catalog that cannot be loaded only removes
//! steps 2 and 3.

use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::ErrorCatalog;
use crate::types::code_from_value;

/// Code the backend uses for "could not reach the server".
pub const CONNECTIVITY_ERROR_CODE: i64 = -1;

/// Shown for [`CONNECTIVITY_ERROR_CODE`].
pub const CONNECTIVITY_MESSAGE: &str =
    "Unable to reach the server. Please check your connection and try again.";

/// Shown when nothing better is available.
pub const DEFAULT_MESSAGE: &str = "Something went wrong. Please try again.";

const EXCEPTION_FIELD: &str = "digitalMessageException";
const EXCEPTION_MARKERS: &[&str] = &["code", "errorCode", "errorKey", "message"];

/// Identifiers read from an exception object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionFields {
    pub code: Option<i64>,
    pub error_key: Option<String>,
    pub message: Option<String>,
}

impl ExceptionFields {
    pub fn with_code(code: i64) -> Self {
        Self {
            code: Some(code),
            ..Self::default()
        }
    }

    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            error_key: Some(key.into()),
            ..Self::default()
        }
    }
}

/// Where the exception object was found in a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExceptionPayload {
    /// `{data: {digitalMessageException: {...}}}`
    DoublyWrapped(ExceptionFields),
    /// `{digitalMessageException: {...}}`
    Wrapped(ExceptionFields),
    /// `{code, errorCode, errorKey, message}`
    Bare(ExceptionFields),
    /// No exception-shaped object.
    Missing,
}

impl ExceptionPayload {
    pub fn fields(&self) -> Option<&ExceptionFields> {
        match self {
            Self::DoublyWrapped(fields) | Self::Wrapped(fields) | Self::Bare(fields) => {
                Some(fields)
            }
            Self::Missing => None,
        }
    }

    fn shape(&self) -> &'static str {
        match self {
            Self::DoublyWrapped(_) => "doubly-wrapped",
            Self::Wrapped(_) => "wrapped",
            Self::Bare(_) => "bare",
            Self::Missing => "missing",
        }
    }
}

/// Find the exception object in a payload, outermost wrapper first.
pub fn extract_exception(payload: &Value) -> ExceptionPayload {
    if let Some(fields) = payload
        .get("data")
        .and_then(|data| data.get(EXCEPTION_FIELD))
        .and_then(exception_fields)
    {
        return ExceptionPayload::DoublyWrapped(fields);
    }
    if let Some(fields) = payload.get(EXCEPTION_FIELD).and_then(exception_fields) {
        return ExceptionPayload::Wrapped(fields);
    }
    match exception_fields(payload) {
        Some(fields) => ExceptionPayload::Bare(fields),
        None => ExceptionPayload::Missing,
    }
}

fn exception_fields(value: &Value) -> Option<ExceptionFields> {
    let object = value.as_object()?;
    if !EXCEPTION_MARKERS.iter().any(|field| object.contains_key(*field)) {
        return None;
    }

    let text = |field: &str| {
        object
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };

    Some(ExceptionFields {
        code: object
            .get("code")
            .and_then(code_from_value)
            .or_else(|| object.get("errorCode").and_then(code_from_value)),
        error_key: text("errorKey"),
        message: text("message"),
    })
}

/// Fixed texts used outside the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverMessages {
    pub connectivity: String,
    pub default: String,
}

impl Default for ResolverMessages {
    fn default() -> Self {
        Self {
            connectivity: CONNECTIVITY_MESSAGE.to_string(),
            default: DEFAULT_MESSAGE.to_string(),
        }
    }
}

/// Resolves error payloads to display text.
#[derive(Debug, Clone)]
pub struct MessageResolver {
    catalog: ErrorCatalog,
    messages: ResolverMessages,
}

impl MessageResolver {
    pub fn new(catalog: ErrorCatalog) -> Self {
        Self {
            catalog,
            messages: ResolverMessages::default(),
        }
    }

    /// Override the connectivity and default texts.
    pub fn with_messages(mut self, messages: ResolverMessages) -> Self {
        self.messages = messages;
        self
    }

    pub fn catalog(&self) -> &ErrorCatalog {
        &self.catalog
    }

    /// Resolve an exception-like JSON payload.
    pub async fn resolve_message(&self, exception: &Value, fallback: Option<&str>) -> String {
        let payload = extract_exception(exception);
        debug!(shape = payload.shape(), "resolving error message");

        match payload.fields() {
            Some(fields) => self.resolve_fields(fields, fallback).await,
            None => self.resolve_fields(&ExceptionFields::default(), fallback).await,
        }
    }

    /// Resolve a raw response body. Bodies that are not JSON carry no exception.
    pub async fn resolve_body(&self, body: &str, fallback: Option<&str>) -> String {
        let payload = serde_json::from_str::<Value>(body).unwrap_or(Value::Null);
        self.resolve_message(&payload, fallback).await
    }

    /// Resolve already-extracted identifiers.
    pub async fn resolve_fields(&self, fields: &ExceptionFields, fallback: Option<&str>) -> String {
        if fields.code == Some(CONNECTIVITY_ERROR_CODE) {
            return self.messages.connectivity.clone();
        }

        if let Err(e) = self.catalog.init_catalog(false).await {
            warn!(error = %e, "error catalog unavailable, resolving without it");
        }

        if let Some(message) = fields
            .code
            .and_then(|code| self.catalog.by_code(code))
            .and_then(|entry| entry.display_message().map(String::from))
        {
            return message;
        }

        if let Some(message) = fields
            .error_key
            .as_deref()
            .and_then(|key| self.catalog.by_key(key))
            .and_then(|entry| entry.display_message().map(String::from))
        {
            return message;
        }

        fields
            .message
            .clone()
            .or_else(|| fallback.filter(|f| !f.is_empty()).map(String::from))
            .unwrap_or_else(|| self.messages.default.clone())
    }
}
