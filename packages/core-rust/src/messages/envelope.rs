//! Request and response envelope for broker dispatch.
//!
//! Every dispatch, local or forwarded, answers with a [`Response`]. The
//! envelope keeps one invariant: `ok == true` implies `errors` is empty, and
//! `ok == false` implies `data` is absent and `errors` is non-empty. The
//! constructors here are the only intended way to build one.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::types::now_millis;

// ---------------------------------------------------------------------------
// Null-as-empty helper
// ---------------------------------------------------------------------------

/// Deserializes a parameter bag that may be absent, `null`, or an object.
///
/// Absent is handled by `#[serde(default)]`; this covers the explicit `null`
/// that some callers send instead of omitting the field.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Machine-readable error codes carried in `Response.errors`.
///
/// Variant names serialize in `SCREAMING_SNAKE_CASE` to match the wire format
/// the rest of the mesh expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MissingField,
    ServiceNotFound,
    OperationNotExposed,
    MissingParameter,
    ParamConversionError,
    ValidationError,
    InvocationError,
    RemoteUnavailable,
    RegistryNotFound,
}

impl ErrorCode {
    /// Returns the wire representation of the code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingField => "MISSING_FIELD",
            Self::ServiceNotFound => "SERVICE_NOT_FOUND",
            Self::OperationNotExposed => "OPERATION_NOT_EXPOSED",
            Self::MissingParameter => "MISSING_PARAMETER",
            Self::ParamConversionError => "PARAM_CONVERSION_ERROR",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::InvocationError => "INVOCATION_ERROR",
            Self::RemoteUnavailable => "REMOTE_UNAVAILABLE",
            Self::RegistryNotFound => "REGISTRY_NOT_FOUND",
        }
    }
}

/// A single entry in `Response.errors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub field: Option<String>,
    pub message: String,
}

impl ErrorEntry {
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            field: None,
            message: message.into(),
        }
    }

    /// Attaches the offending field or parameter name.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A named `(service, operation)` call with an untyped parameter bag.
///
/// Every field defaults so that a body missing `service` still decodes and
/// the broker can answer with `MISSING_FIELD` instead of a decode failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Request {
    pub service: String,
    pub operation: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub params: Map<String, Value>,
    pub request_id: String,
    pub encrypt: bool,
}

impl Request {
    #[must_use]
    pub fn new(service: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
            ..Self::default()
        }
    }

    /// Adds a single parameter to the bag, replacing any previous value.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Uniform response envelope returned for every dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub encrypt: bool,
}

impl Response {
    /// Builds a success envelope carrying `data`.
    #[must_use]
    pub fn success(request_id: impl Into<String>, data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            errors: Vec::new(),
            request_id: request_id.into(),
            timestamp: now_millis(),
            service: None,
            operation: None,
            version: String::new(),
            encrypt: false,
        }
    }

    /// Builds a failure envelope.
    ///
    /// An empty `errors` list would break the envelope invariant, so it is
    /// replaced by a single `INVOCATION_ERROR` describing the misuse.
    #[must_use]
    pub fn failure(request_id: impl Into<String>, mut errors: Vec<ErrorEntry>) -> Self {
        if errors.is_empty() {
            errors.push(ErrorEntry::new(
                ErrorCode::InvocationError,
                "failure reported without error details",
            ));
        }
        Self {
            ok: false,
            data: None,
            errors,
            request_id: request_id.into(),
            timestamp: now_millis(),
            service: None,
            operation: None,
            version: String::new(),
            encrypt: false,
        }
    }

    /// Shorthand for a failure with one error entry.
    #[must_use]
    pub fn error(request_id: impl Into<String>, entry: ErrorEntry) -> Self {
        Self::failure(request_id, vec![entry])
    }

    /// Stamps the service and operation the envelope answers for.
    ///
    /// Empty names are left unset.
    #[must_use]
    pub fn for_call(mut self, service: &str, operation: &str) -> Self {
        self.service = (!service.is_empty()).then(|| service.to_string());
        self.operation = (!operation.is_empty()).then(|| operation.to_string());
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    #[must_use]
    pub fn with_encrypt(mut self, encrypt: bool) -> Self {
        self.encrypt = encrypt;
        self
    }

    /// Returns `true` if any error entry carries the given code.
    #[must_use]
    pub fn has_code(&self, code: ErrorCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }

    /// Returns the code of the first error entry, if any.
    #[must_use]
    pub fn first_code(&self) -> Option<ErrorCode> {
        self.errors.first().map(|e| e.code)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_without_params_decodes_to_empty_bag() {
        let req: Request =
            serde_json::from_value(json!({"service": "echoSvc", "operation": "echo"})).unwrap();
        assert!(req.params.is_empty());
        assert_eq!(req.request_id, "");
        assert!(!req.encrypt);
    }

    #[test]
    fn request_with_null_params_decodes_to_empty_bag() {
        let req: Request = serde_json::from_value(json!({
            "service": "echoSvc",
            "operation": "echo",
            "params": null,
            "requestId": "r9"
        }))
        .unwrap();
        assert!(req.params.is_empty());
        assert_eq!(req.request_id, "r9");
    }

    #[test]
    fn request_missing_service_still_decodes() {
        let req: Request = serde_json::from_value(json!({"operation": "echo"})).unwrap();
        assert_eq!(req.service, "");
    }

    #[test]
    fn success_envelope_has_no_errors() {
        let resp = Response::success("r1", json!("hi"));
        assert!(resp.ok);
        assert!(resp.errors.is_empty());
        assert_eq!(resp.data, Some(json!("hi")));
        assert_eq!(resp.request_id, "r1");
        assert!(resp.timestamp > 0);
    }

    #[test]
    fn failure_envelope_drops_data_and_keeps_errors() {
        let resp = Response::error(
            "r2",
            ErrorEntry::new(ErrorCode::MissingField, "service is required").with_field("service"),
        );
        assert!(!resp.ok);
        assert!(resp.data.is_none());
        assert_eq!(resp.first_code(), Some(ErrorCode::MissingField));
        assert_eq!(resp.errors[0].field.as_deref(), Some("service"));
    }

    #[test]
    fn failure_with_no_entries_is_repaired() {
        let resp = Response::failure("r3", Vec::new());
        assert!(!resp.ok);
        assert_eq!(resp.errors.len(), 1);
        assert!(resp.has_code(ErrorCode::InvocationError));
    }

    #[test]
    fn error_codes_serialize_screaming_snake_case() {
        let value = serde_json::to_value(ErrorCode::OperationNotExposed).unwrap();
        assert_eq!(value, json!("OPERATION_NOT_EXPOSED"));
        assert_eq!(ErrorCode::RemoteUnavailable.as_str(), "REMOTE_UNAVAILABLE");
    }

    #[test]
    fn response_serializes_camel_case_and_skips_absent_data() {
        let resp = Response::error("r4", ErrorEntry::new(ErrorCode::ServiceNotFound, "nope"))
            .for_call("files", "ls");
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["requestId"], "r4");
        assert_eq!(value["service"], "files");
        assert_eq!(value["errors"][0]["code"], "SERVICE_NOT_FOUND");
        assert!(value.get("data").is_none());
        assert!(value["errors"][0].get("field").is_none());
    }

    #[test]
    fn for_call_leaves_empty_names_unset() {
        let resp = Response::success("r5", json!(1)).for_call("", "");
        assert!(resp.service.is_none());
        assert!(resp.operation.is_none());
    }

    const ALL_CODES: [ErrorCode; 9] = [
        ErrorCode::MissingField,
        ErrorCode::ServiceNotFound,
        ErrorCode::OperationNotExposed,
        ErrorCode::MissingParameter,
        ErrorCode::ParamConversionError,
        ErrorCode::ValidationError,
        ErrorCode::InvocationError,
        ErrorCode::RemoteUnavailable,
        ErrorCode::RegistryNotFound,
    ];

    proptest::proptest! {
        #[test]
        fn failure_envelopes_are_never_ok(
            request_id in "[a-z0-9-]{0,12}",
            picks in proptest::collection::vec(0usize..9, 0..5),
        ) {
            let errors: Vec<ErrorEntry> = picks
                .iter()
                .map(|&i| ErrorEntry::new(ALL_CODES[i], "boom"))
                .collect();
            let resp = Response::failure(request_id.clone(), errors);
            proptest::prop_assert!(!resp.ok);
            proptest::prop_assert!(resp.data.is_none());
            proptest::prop_assert!(!resp.errors.is_empty());
            proptest::prop_assert_eq!(resp.request_id, request_id);
        }

        #[test]
        fn wire_code_matches_as_str(i in 0usize..9) {
            let code = ALL_CODES[i];
            let value = serde_json::to_value(code).unwrap();
            proptest::prop_assert_eq!(value.as_str(), Some(code.as_str()));
        }
    }
}
