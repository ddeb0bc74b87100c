//! Parameter specs and the binder that turns an untyped parameter bag into
//! bound, validated arguments.
//!
//! Every [`ParamSpec`] carries its own decoder function. The built-in
//! constructors install structural decoders (numbers stringify into strings,
//! numeric strings parse into numbers, and so on); [`ParamSpec::custom`]
//! accepts any decoder. Conversion failures are a first-class error path,
//! reported as `PARAM_CONVERSION_ERROR`.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde_json::{Map, Number, Value};

use super::operation::{Args, DispatchError, Violation};

/// Converts one raw JSON value into the declared parameter type.
///
/// The error string becomes the message of the conversion error.
pub type Decoder = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

// ---------------------------------------------------------------------------
// ParamKind
// ---------------------------------------------------------------------------

/// Declared type of an operation parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    List,
    Object,
    Any,
}

impl ParamKind {
    /// Value bound to an absent optional parameter.
    #[must_use]
    pub fn zero_value(self) -> Value {
        match self {
            Self::String => Value::String(String::new()),
            Self::Integer | Self::Number => Value::from(0),
            Self::Boolean => Value::Bool(false),
            Self::List => Value::Array(Vec::new()),
            Self::Object => Value::Object(Map::new()),
            Self::Any => Value::Null,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::List => "list",
            Self::Object => "object",
            Self::Any => "any",
        }
    }

    fn decoder(self) -> Decoder {
        match self {
            Self::String => Arc::new(decode_string),
            Self::Integer => Arc::new(decode_integer),
            Self::Number => Arc::new(decode_number),
            Self::Boolean => Arc::new(decode_boolean),
            Self::List => Arc::new(decode_list),
            Self::Object => Arc::new(decode_object),
            Self::Any => Arc::new(|v: &Value| Ok(v.clone())),
        }
    }
}

// ---------------------------------------------------------------------------
// Constraint
// ---------------------------------------------------------------------------

/// Declarative validation rule evaluated on a bound value.
///
/// Rules that do not apply to the value's shape (e.g. `Min` on a string)
/// are skipped.
#[derive(Debug, Clone)]
pub enum Constraint {
    /// Minimum length: characters for strings, elements for lists/objects.
    MinLength(usize),
    /// Maximum length: characters for strings, elements for lists/objects.
    MaxLength(usize),
    Min(f64),
    Max(f64),
    /// The whole string must match. Build with [`Constraint::pattern`] so
    /// `anchored` is the source wrapped in `\A(?:...)\z`.
    Pattern { source: String, anchored: Regex },
    NotBlank,
}

impl Constraint {
    /// Full-match constraint for `re`.
    #[must_use]
    pub fn pattern(re: &Regex) -> Self {
        // Wrapping a pattern that already compiled can only trip the size limit.
        let anchored =
            Regex::new(&format!(r"\A(?:{})\z", re.as_str())).unwrap_or_else(|_| re.clone());
        Self::Pattern {
            source: re.as_str().to_string(),
            anchored,
        }
    }

    /// Returns a violation message, or `None` if the value satisfies the rule.
    #[must_use]
    pub fn check(&self, value: &Value) -> Option<String> {
        match self {
            Self::MinLength(min) => match length_of(value) {
                Some(len) if len < *min => Some(format!("length must be at least {min}")),
                _ => None,
            },
            Self::MaxLength(max) => match length_of(value) {
                Some(len) if len > *max => Some(format!("length must be at most {max}")),
                _ => None,
            },
            Self::Min(min) => match value.as_f64() {
                Some(n) if n < *min => Some(format!("must be greater than or equal to {min}")),
                _ => None,
            },
            Self::Max(max) => match value.as_f64() {
                Some(n) if n > *max => Some(format!("must be less than or equal to {max}")),
                _ => None,
            },
            Self::Pattern { source, anchored } => match value.as_str() {
                Some(s) if !anchored.is_match(s) => Some(format!("must match pattern {source}")),
                _ => None,
            },
            Self::NotBlank => match value.as_str() {
                Some(s) if s.trim().is_empty() => Some("must not be blank".to_string()),
                _ => None,
            },
        }
    }
}

fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        Value::Object(map) => Some(map.len()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// ParamSpec
// ---------------------------------------------------------------------------

/// One declared parameter of an operation: name, type, decoder, constraints.
#[derive(Clone)]
pub struct ParamSpec {
    name: String,
    kind: ParamKind,
    required: bool,
    constraints: Vec<Constraint>,
    decoder: Decoder,
}

impl fmt::Debug for ParamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("required", &self.required)
            .field("constraints", &self.constraints)
            .finish_non_exhaustive()
    }
}

impl ParamSpec {
    fn with_kind(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            constraints: Vec::new(),
            decoder: kind.decoder(),
        }
    }

    #[must_use]
    pub fn string(name: impl Into<String>) -> Self {
        Self::with_kind(name, ParamKind::String)
    }

    #[must_use]
    pub fn integer(name: impl Into<String>) -> Self {
        Self::with_kind(name, ParamKind::Integer)
    }

    #[must_use]
    pub fn number(name: impl Into<String>) -> Self {
        Self::with_kind(name, ParamKind::Number)
    }

    #[must_use]
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::with_kind(name, ParamKind::Boolean)
    }

    #[must_use]
    pub fn list(name: impl Into<String>) -> Self {
        Self::with_kind(name, ParamKind::List)
    }

    #[must_use]
    pub fn object(name: impl Into<String>) -> Self {
        Self::with_kind(name, ParamKind::Object)
    }

    #[must_use]
    pub fn any(name: impl Into<String>) -> Self {
        Self::with_kind(name, ParamKind::Any)
    }

    /// A parameter with a caller-supplied decoder. `kind` only determines
    /// the zero value bound when the parameter is optional and absent.
    pub fn custom<F>(name: impl Into<String>, kind: ParamKind, decoder: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            decoder: Arc::new(decoder),
            ..Self::with_kind(name, kind)
        }
    }

    /// Marks the parameter optional: absent or `null` binds the zero value.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    #[must_use]
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    #[must_use]
    pub fn min_length(self, min: usize) -> Self {
        self.constraint(Constraint::MinLength(min))
    }

    #[must_use]
    pub fn max_length(self, max: usize) -> Self {
        self.constraint(Constraint::MaxLength(max))
    }

    #[must_use]
    pub fn min(self, min: f64) -> Self {
        self.constraint(Constraint::Min(min))
    }

    #[must_use]
    pub fn max(self, max: f64) -> Self {
        self.constraint(Constraint::Max(max))
    }

    #[must_use]
    pub fn pattern(self, re: &Regex) -> Self {
        self.constraint(Constraint::pattern(re))
    }

    #[must_use]
    pub fn not_blank(self) -> Self {
        self.constraint(Constraint::NotBlank)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    #[must_use]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }
}

// ---------------------------------------------------------------------------
// ParameterBinder
// ---------------------------------------------------------------------------

/// Binds a request's parameter bag against an operation's declared params.
///
/// Binding is two-phase: every parameter is located and decoded first
/// (failing fast on a missing or unconvertible value), then all constraints
/// run and every violation is collected.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterBinder;

impl ParameterBinder {
    /// Binds `bag` against `specs`, in declaration order.
    ///
    /// # Errors
    ///
    /// - `DispatchError::MissingParameter` for a required parameter that is
    ///   absent or `null`
    /// - `DispatchError::ParamConversion` when a decoder rejects a value
    /// - `DispatchError::Validation` with one violation per offending field
    pub fn bind(specs: &[ParamSpec], bag: &Map<String, Value>) -> Result<Args, DispatchError> {
        let mut bound = Vec::with_capacity(specs.len());
        // Defaulted optionals are skipped by validation.
        let mut defaulted = Vec::with_capacity(specs.len());

        for spec in specs {
            match bag.get(&spec.name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(DispatchError::MissingParameter {
                        name: spec.name.clone(),
                    });
                }
                None | Some(Value::Null) => {
                    bound.push((spec.name.clone(), spec.kind.zero_value()));
                    defaulted.push(true);
                }
                Some(raw) => {
                    let value =
                        (spec.decoder)(raw).map_err(|message| DispatchError::ParamConversion {
                            name: spec.name.clone(),
                            message,
                        })?;
                    bound.push((spec.name.clone(), value));
                    defaulted.push(false);
                }
            }
        }

        let mut violations = Vec::new();
        for ((spec, (_, value)), was_defaulted) in specs.iter().zip(&bound).zip(&defaulted) {
            if *was_defaulted {
                continue;
            }
            let messages: Vec<String> = spec
                .constraints
                .iter()
                .filter_map(|c| c.check(value))
                .collect();
            if !messages.is_empty() {
                violations.push(Violation {
                    field: spec.name.clone(),
                    message: messages.join("; "),
                });
            }
        }

        if violations.is_empty() {
            Ok(Args::from_pairs(bound))
        } else {
            Err(DispatchError::Validation(violations))
        }
    }
}

// ---------------------------------------------------------------------------
// Built-in structural decoders
// ---------------------------------------------------------------------------

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn decode_string(value: &Value) -> Result<Value, String> {
    match value {
        Value::String(_) => Ok(value.clone()),
        Value::Number(n) => Ok(Value::String(n.to_string())),
        Value::Bool(b) => Ok(Value::String(b.to_string())),
        other => Err(format!("cannot convert {} to string", json_type(other))),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn decode_integer(value: &Value) -> Result<Value, String> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(Value::from(i));
            }
            match n.as_f64() {
                // i64::MAX as f64 rounds up to 2^63, which is out of range.
                Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                    Ok(Value::from(f as i64))
                }
                _ => Err(format!("{n} is not an integer")),
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| format!("cannot parse \"{s}\" as integer: {e}")),
        other => Err(format!("cannot convert {} to integer", json_type(other))),
    }
}

fn decode_number(value: &Value) -> Result<Value, String> {
    match value {
        Value::Number(_) => Ok(value.clone()),
        Value::String(s) => {
            let parsed = s
                .trim()
                .parse::<f64>()
                .map_err(|e| format!("cannot parse \"{s}\" as number: {e}"))?;
            Number::from_f64(parsed)
                .map(Value::Number)
                .ok_or_else(|| format!("\"{s}\" is not a finite number"))
        }
        other => Err(format!("cannot convert {} to number", json_type(other))),
    }
}

fn decode_boolean(value: &Value) -> Result<Value, String> {
    match value {
        Value::Bool(_) => Ok(value.clone()),
        Value::String(s) if s.trim().eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
        Value::String(s) if s.trim().eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(Value::Bool(false)),
            Some(1) => Ok(Value::Bool(true)),
            _ => Err(format!("{n} is not a boolean")),
        },
        Value::String(s) => Err(format!("\"{s}\" is not a boolean")),
        other => Err(format!("cannot convert {} to boolean", json_type(other))),
    }
}

fn decode_list(value: &Value) -> Result<Value, String> {
    match value {
        Value::Array(_) => Ok(value.clone()),
        other => Err(format!("cannot convert {} to list", json_type(other))),
    }
}

fn decode_object(value: &Value) -> Result<Value, String> {
    match value {
        Value::Object(_) => Ok(value.clone()),
        other => Err(format!("cannot convert {} to object", json_type(other))),
    }
}
