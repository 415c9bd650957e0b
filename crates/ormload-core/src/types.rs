//! Column types and conversion between storage and host values.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use ormload_proto::Value;
use std::fmt;

/// Logical column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// Boolean value.
    Bool,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit floating point.
    Float32,
    /// 64-bit floating point.
    Float64,
    /// Fixed-precision decimal, hydrated as a 64-bit float.
    Decimal {
        /// Total number of digits.
        precision: u8,
        /// Number of digits after decimal point.
        scale: u8,
    },
    /// Short UTF-8 string.
    String,
    /// Long UTF-8 text.
    Text,
    /// Binary data.
    Bytes,
    /// Date, time or timestamp.
    Timestamp,
    /// UUID, hydrated as its string form.
    Uuid,
}

impl ScalarType {
    /// Check if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ScalarType::Int32
                | ScalarType::Int64
                | ScalarType::Float32
                | ScalarType::Float64
                | ScalarType::Decimal { .. }
        )
    }

    /// Check if this type is an integer type.
    pub fn is_integer(&self) -> bool {
        matches!(self, ScalarType::Int32 | ScalarType::Int64)
    }

    /// Canonical type name.
    pub fn name(&self) -> &'static str {
        match self {
            ScalarType::Bool => "boolean",
            ScalarType::Int32 => "integer",
            ScalarType::Int64 => "biginteger",
            ScalarType::Float32 => "float",
            ScalarType::Float64 => "double",
            ScalarType::Decimal { .. } => "decimal",
            ScalarType::String => "string",
            ScalarType::Text => "text",
            ScalarType::Bytes => "binary",
            ScalarType::Timestamp => "timestamp",
            ScalarType::Uuid => "uuid",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarType::Decimal { precision, scale } => {
                write!(f, "decimal({}, {})", precision, scale)
            }
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Converts scalars between the storage and host representations.
///
/// The hydrator calls [`TypeConverter::to_host`] once per column of every
/// row whose column type is declared; the planner calls
/// [`TypeConverter::to_database`] on condition values compared against
/// declared columns.
pub trait TypeConverter: Send + Sync {
    /// Convert a raw value read from storage.
    fn to_host(&self, column_type: ScalarType, raw: Value) -> Result<Value>;

    /// Convert a host value for binding as a statement parameter.
    fn to_database(&self, column_type: ScalarType, value: Value) -> Value;
}

/// Cast-based conversion for the built-in scalar types.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicTypeConverter;

impl TypeConverter for BasicTypeConverter {
    fn to_host(&self, column_type: ScalarType, raw: Value) -> Result<Value> {
        if raw.is_null() {
            return Ok(Value::Null);
        }
        match column_type {
            ScalarType::Bool => to_bool(raw).map(Value::Bool),
            ScalarType::Int32 => {
                let i = to_i64(column_type, raw)?;
                i32::try_from(i)
                    .map(Value::Int32)
                    .map_err(|_| conversion_error(column_type, &Value::Int64(i)))
            }
            ScalarType::Int64 => to_i64(column_type, raw).map(Value::Int64),
            ScalarType::Float32 => to_f64(column_type, raw).map(|f| Value::Float32(f as f32)),
            ScalarType::Float64 | ScalarType::Decimal { .. } => {
                to_f64(column_type, raw).map(Value::Float64)
            }
            ScalarType::String | ScalarType::Text | ScalarType::Uuid => {
                to_string(column_type, raw).map(Value::String)
            }
            ScalarType::Bytes => match raw {
                Value::String(s) => Ok(Value::Bytes(s.into_bytes())),
                other => Ok(other),
            },
            ScalarType::Timestamp => match raw {
                Value::Int64(t) => Ok(Value::Timestamp(t)),
                Value::Int32(t) => Ok(Value::Timestamp(t as i64)),
                other => Ok(other),
            },
        }
    }

    fn to_database(&self, column_type: ScalarType, value: Value) -> Value {
        match (column_type, value) {
            (_, Value::Null) => Value::Null,
            (ScalarType::Bool, Value::Bool(b)) => Value::Int64(b as i64),
            (ScalarType::Int32 | ScalarType::Int64, Value::Int32(i)) => Value::Int64(i as i64),
            (ScalarType::Timestamp, Value::Timestamp(t)) => Value::Int64(t),
            (ScalarType::String | ScalarType::Text | ScalarType::Uuid, Value::Uuid(u)) => {
                Value::Uuid(u).to_string().into()
            }
            (_, other) => other,
        }
    }
}

fn conversion_error(column_type: ScalarType, value: &Value) -> Error {
    Error::Conversion {
        column_type: column_type.to_string(),
        value: value.to_string(),
    }
}

fn to_bool(raw: Value) -> Result<bool> {
    match raw {
        Value::Bool(b) => Ok(b),
        Value::Int32(i) => Ok(i != 0),
        Value::Int64(i) => Ok(i != 0),
        Value::Float32(f) => Ok(f != 0.0),
        Value::Float64(f) => Ok(f != 0.0),
        Value::String(ref s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "t" | "y" | "yes" => Ok(true),
            "false" | "0" | "f" | "n" | "no" | "" => Ok(false),
            _ => Err(conversion_error(ScalarType::Bool, &raw)),
        },
        other => Err(conversion_error(ScalarType::Bool, &other)),
    }
}

fn to_i64(column_type: ScalarType, raw: Value) -> Result<i64> {
    match raw {
        Value::Bool(b) => Ok(b as i64),
        Value::Int32(i) => Ok(i as i64),
        Value::Int64(i) | Value::Timestamp(i) => Ok(i),
        Value::Float32(f) => Ok(f.trunc() as i64),
        Value::Float64(f) => Ok(f.trunc() as i64),
        Value::String(ref s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .or_else(|_| trimmed.parse::<f64>().map(|f| f.trunc() as i64))
                .map_err(|_| conversion_error(column_type, &raw))
        }
        other => Err(conversion_error(column_type, &other)),
    }
}

fn to_f64(column_type: ScalarType, raw: Value) -> Result<f64> {
    match raw {
        Value::Bool(b) => Ok(if b { 1.0 } else { 0.0 }),
        Value::Int32(i) => Ok(i as f64),
        Value::Int64(i) => Ok(i as f64),
        Value::Float32(f) => Ok(f as f64),
        Value::Float64(f) => Ok(f),
        Value::String(ref s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| conversion_error(column_type, &raw)),
        other => Err(conversion_error(column_type, &other)),
    }
}

fn to_string(column_type: ScalarType, raw: Value) -> Result<String> {
    match raw {
        Value::String(s) => Ok(s),
        Value::Bool(b) => Ok(if b { "1".into() } else { "".into() }),
        Value::Int32(i) => Ok(i.to_string()),
        Value::Int64(i) => Ok(i.to_string()),
        Value::Float32(f) => Ok(f.to_string()),
        Value::Float64(f) => Ok(f.to_string()),
        Value::Uuid(u) => Ok(Value::Uuid(u).to_string()),
        Value::Bytes(b) => {
            String::from_utf8(b).map_err(|e| Error::Conversion {
                column_type: column_type.to_string(),
                value: format!("<{} invalid utf-8 bytes>", e.as_bytes().len()),
            })
        }
        other => Err(conversion_error(column_type, &other)),
    }
}

/// Registry of named column types.
///
/// Resolves the type names used in schema files and database declarations
/// to [`ScalarType`]s.
#[derive(Debug, Clone)]
pub struct TypeMap {
    types: IndexMap<String, ScalarType>,
}

impl TypeMap {
    /// Create a map holding the built-in type names.
    pub fn new() -> Self {
        let mut map = Self {
            types: IndexMap::new(),
        };
        map.register_builtins();
        map
    }

    fn register_builtins(&mut self) {
        let builtins = [
            ("boolean", ScalarType::Bool),
            ("integer", ScalarType::Int32),
            ("biginteger", ScalarType::Int64),
            ("float", ScalarType::Float32),
            ("double", ScalarType::Float64),
            (
                "decimal",
                ScalarType::Decimal {
                    precision: 10,
                    scale: 2,
                },
            ),
            ("string", ScalarType::String),
            ("text", ScalarType::Text),
            ("binary", ScalarType::Bytes),
            ("date", ScalarType::Timestamp),
            ("datetime", ScalarType::Timestamp),
            ("timestamp", ScalarType::Timestamp),
            ("time", ScalarType::Timestamp),
            ("uuid", ScalarType::Uuid),
        ];
        for (name, ty) in builtins {
            self.types.insert(name.to_string(), ty);
        }
    }

    /// Map a name to a type, replacing any previous mapping.
    pub fn map(&mut self, name: impl Into<String>, column_type: ScalarType) {
        self.types.insert(name.into().to_ascii_lowercase(), column_type);
    }

    /// Resolve a type name.
    pub fn build(&self, name: &str) -> Result<ScalarType> {
        self.types
            .get(&name.trim().to_ascii_lowercase())
            .copied()
            .ok_or_else(|| Error::invalid_option("type", format!("unknown column type '{}'", name)))
    }

    /// Resolve a type name, `None` if unknown.
    pub fn get(&self, name: &str) -> Option<ScalarType> {
        self.types.get(&name.trim().to_ascii_lowercase()).copied()
    }

    /// Remove every mapping, built-ins included.
    pub fn clear(&mut self) {
        self.types.clear();
    }

    /// Restore the built-in mappings after a [`TypeMap::clear`].
    pub fn reset(&mut self) {
        self.types.clear();
        self.register_builtins();
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

impl Default for TypeMap {
    fn default() -> Self {
        Self::new()
    }
}
