//! Operation descriptors, per-handler operation tables, and dispatch errors.
//!
//! A handler is a named [`OperationTable`]: a map of exposed operation name
//! to [`OperationDescriptor`] (ordered parameter specs plus the function to
//! invoke). Tables are built once at startup through
//! [`OperationTableBuilder`] and never mutated afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use switchyard_core::{ErrorCode, ErrorEntry, Response};

use super::binder::ParamSpec;

// ---------------------------------------------------------------------------
// Args
// ---------------------------------------------------------------------------

/// Bound, validated arguments handed to an operation function.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    values: Vec<(String, Value)>,
}

impl Args {
    pub(crate) fn from_pairs(values: Vec<(String, Value)>) -> Self {
        Self { values }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    fn require(&self, name: &str) -> anyhow::Result<&Value> {
        self.get(name)
            .ok_or_else(|| anyhow::anyhow!("parameter `{name}` is not declared"))
    }

    /// Returns a bound string parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameter is undeclared or not a string.
    pub fn str(&self, name: &str) -> anyhow::Result<&str> {
        self.require(name)?
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("parameter `{name}` is not a string"))
    }

    /// Returns a bound integer parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameter is undeclared or not an integer.
    pub fn i64(&self, name: &str) -> anyhow::Result<i64> {
        self.require(name)?
            .as_i64()
            .ok_or_else(|| anyhow::anyhow!("parameter `{name}` is not an integer"))
    }

    /// Returns a bound numeric parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameter is undeclared or not a number.
    pub fn f64(&self, name: &str) -> anyhow::Result<f64> {
        self.require(name)?
            .as_f64()
            .ok_or_else(|| anyhow::anyhow!("parameter `{name}` is not a number"))
    }

    /// Returns a bound boolean parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameter is undeclared or not a boolean.
    pub fn bool(&self, name: &str) -> anyhow::Result<bool> {
        self.require(name)?
            .as_bool()
            .ok_or_else(|| anyhow::anyhow!("parameter `{name}` is not a boolean"))
    }

    /// Returns a bound list parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameter is undeclared or not a list.
    pub fn list(&self, name: &str) -> anyhow::Result<&[Value]> {
        self.require(name)?
            .as_array()
            .map(Vec::as_slice)
            .ok_or_else(|| anyhow::anyhow!("parameter `{name}` is not a list"))
    }

    /// Deserializes a bound parameter into a typed value.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameter is undeclared or does not fit `T`.
    pub fn decode<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        let value = self.require(name)?.clone();
        serde_json::from_value(value)
            .map_err(|e| anyhow::anyhow!("parameter `{name}` does not decode: {e}"))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Reply
// ---------------------------------------------------------------------------

/// What an operation function returns.
///
/// `Value` is wrapped by the broker into a success envelope. `Envelope` is a
/// full response that the broker passes through unchanged, letting the
/// handler control its own `ok`/error semantics.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Value(Value),
    Envelope(Response),
}

impl Reply {
    /// Serializes any value into a plain reply.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be represented as JSON.
    pub fn value<T: Serialize>(value: &T) -> anyhow::Result<Self> {
        Ok(Self::Value(serde_json::to_value(value)?))
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Self::Envelope(response)
    }
}

/// Operation body. Errors and panics become `INVOCATION_ERROR`.
pub type OperationFn = Arc<dyn Fn(&Args) -> anyhow::Result<Reply> + Send + Sync>;

// ---------------------------------------------------------------------------
// OperationDescriptor
// ---------------------------------------------------------------------------

/// One exposed operation: its name, ordered parameters, and body.
#[derive(Clone)]
pub struct OperationDescriptor {
    handler: String,
    name: String,
    params: Vec<ParamSpec>,
    invoke: OperationFn,
}

impl fmt::Debug for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationDescriptor")
            .field("handler", &self.handler)
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl OperationDescriptor {
    /// Declares an operation under an explicit name.
    pub fn named<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Args) -> anyhow::Result<Reply> + Send + Sync + 'static,
    {
        Self {
            handler: String::new(),
            name: name.into(),
            params: Vec::new(),
            invoke: Arc::new(f),
        }
    }

    /// Declares an operation named after the function item `f`.
    ///
    /// `implicit(list_files)` exposes `list_files`. Closures have no name;
    /// the table builder rejects them with `TableError::UnnamedOperation`.
    pub fn implicit<F>(f: F) -> Self
    where
        F: Fn(&Args) -> anyhow::Result<Reply> + Send + Sync + 'static,
    {
        Self::named(implicit_name::<F>(), f)
    }

    /// Appends a parameter. Declaration order is binding order.
    #[must_use]
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// Key of the handler table this operation belongs to.
    #[must_use]
    pub fn handler(&self) -> &str {
        &self.handler
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub(crate) fn invoke(&self, args: &Args) -> anyhow::Result<Reply> {
        (self.invoke)(args)
    }
}

/// Last path segment of a function item's type name, or empty for closures.
///
/// `type_name` output is best-effort, but for plain fn items it is the full
/// path of the function.
fn implicit_name<F>() -> String {
    let full = std::any::type_name::<F>();
    if full.contains("{{closure}}") {
        return String::new();
    }
    full.rsplit("::").next().unwrap_or(full).to_string()
}

// ---------------------------------------------------------------------------
// OperationTable
// ---------------------------------------------------------------------------

/// Errors raised while building an operation table.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TableError {
    #[error("handler {handler}: operation has no name (closures need an explicit name)")]
    UnnamedOperation { handler: String },
    #[error("handler {handler}: operation {operation} declared twice")]
    DuplicateOperation { handler: String, operation: String },
}

/// Immutable map of operation name to descriptor for one handler.
#[derive(Debug)]
pub struct OperationTable {
    handler: String,
    operations: HashMap<String, Arc<OperationDescriptor>>,
}

impl OperationTable {
    /// Starts a table for the handler registered under `handler`.
    #[must_use]
    pub fn builder(handler: impl Into<String>) -> OperationTableBuilder {
        OperationTableBuilder {
            handler: handler.into(),
            operations: Vec::new(),
        }
    }

    #[must_use]
    pub fn handler(&self) -> &str {
        &self.handler
    }

    /// Case-sensitive lookup by declared name.
    #[must_use]
    pub fn get(&self, operation: &str) -> Option<&Arc<OperationDescriptor>> {
        self.operations.get(operation)
    }

    #[must_use]
    pub fn contains(&self, operation: &str) -> bool {
        self.operations.contains_key(operation)
    }

    /// Exposed operation names, sorted.
    #[must_use]
    pub fn operation_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.operations.keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Collects descriptors for one handler and checks name uniqueness.
pub struct OperationTableBuilder {
    handler: String,
    operations: Vec<OperationDescriptor>,
}

impl OperationTableBuilder {
    #[must_use]
    pub fn operation(mut self, descriptor: OperationDescriptor) -> Self {
        self.operations.push(descriptor);
        self
    }

    /// Freezes the table.
    ///
    /// # Errors
    ///
    /// Returns `TableError::UnnamedOperation` for a nameless descriptor and
    /// `TableError::DuplicateOperation` when two descriptors share a name.
    pub fn build(self) -> Result<OperationTable, TableError> {
        let mut operations = HashMap::with_capacity(self.operations.len());
        for mut descriptor in self.operations {
            if descriptor.name.is_empty() {
                return Err(TableError::UnnamedOperation {
                    handler: self.handler,
                });
            }
            if operations.contains_key(&descriptor.name) {
                return Err(TableError::DuplicateOperation {
                    handler: self.handler,
                    operation: descriptor.name,
                });
            }
            descriptor.handler.clone_from(&self.handler);
            operations.insert(descriptor.name.clone(), Arc::new(descriptor));
        }
        Ok(OperationTable {
            handler: self.handler,
            operations,
        })
    }
}

// ---------------------------------------------------------------------------
// DispatchError
// ---------------------------------------------------------------------------

/// A single constraint violation on one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

/// Every way a local dispatch can fail. Each variant maps to one `ErrorCode`.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("{field} is required")]
    MissingField { field: &'static str },
    #[error("service not found: {service}")]
    ServiceNotFound { service: String },
    #[error("operation {operation} is not exposed by {service}")]
    OperationNotExposed { service: String, operation: String },
    #[error("missing required parameter: {name}")]
    MissingParameter { name: String },
    #[error("cannot convert parameter {name}: {message}")]
    ParamConversion { name: String, message: String },
    #[error("validation failed on {} field(s)", .0.len())]
    Validation(Vec<Violation>),
    #[error("invocation failed: {message}")]
    Invocation { message: String },
}

impl DispatchError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MissingField { .. } => ErrorCode::MissingField,
            Self::ServiceNotFound { .. } => ErrorCode::ServiceNotFound,
            Self::OperationNotExposed { .. } => ErrorCode::OperationNotExposed,
            Self::MissingParameter { .. } => ErrorCode::MissingParameter,
            Self::ParamConversion { .. } => ErrorCode::ParamConversionError,
            Self::Validation(_) => ErrorCode::ValidationError,
            Self::Invocation { .. } => ErrorCode::InvocationError,
        }
    }

    /// Converts into envelope error entries: one per violated field for
    /// validation failures, one otherwise.
    #[must_use]
    pub fn into_entries(self) -> Vec<ErrorEntry> {
        let code = self.code();
        match self {
            Self::Validation(violations) => violations
                .into_iter()
                .map(|v| ErrorEntry::new(code, format!("{}: {}", v.field, v.message)).with_field(v.field))
                .collect(),
            Self::MissingField { field } => {
                vec![ErrorEntry::new(code, self.to_string()).with_field(field)]
            }
            Self::MissingParameter { ref name } | Self::ParamConversion { ref name, .. } => {
                let field = name.clone();
                vec![ErrorEntry::new(code, self.to_string()).with_field(field)]
            }
            other => vec![ErrorEntry::new(code, other.to_string())],
        }
    }
}
