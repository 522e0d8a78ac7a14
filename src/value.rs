//! The dynamic runtime value type shared by the formula and skeleton layers.
//!
//! `Value` is a tagged union covering everything a formula can produce or a
//! skeleton can interpolate: scalars, strings, ordered vectors, and
//! insertion-ordered maps, plus two control-flow sentinels consumed by
//! enclosing loops.

use std::fmt;

/// The engine's dynamic value.
///
/// `Map` is an association list rather than a hash map: iteration order must
/// match insertion order and be observable through `keys`/`values`/`items`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Date(Date),
    Vector(Vec<Value>),
    Map(Vec<(Value, Value)>),
    /// Produced only by `#break`, consumed only by an enclosing loop.
    Break,
    /// Produced only by `#continue`, consumed only by an enclosing loop.
    Continue,
}

/// A proleptic-Gregorian calendar date, for hosts that inject dates into
/// global scope. The formula grammar has no literal syntax for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Date {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl Date {
    pub fn new(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }

    pub fn quarter(&self) -> Option<u32> {
        match self.month {
            1..=3 => Some(1),
            4..=6 => Some(2),
            7..=9 => Some(3),
            10..=12 => Some(4),
            _ => None,
        }
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Vector(_) => "vector",
            Value::Map(_) => "map",
            Value::Break => "break",
            Value::Continue => "continue",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_break(&self) -> bool {
        matches!(self, Value::Break)
    }

    pub fn is_continue(&self) -> bool {
        matches!(self, Value::Continue)
    }

    /// A value used as a boolean: `Null`/`Undefined`/zero/empty → false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Integer(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Date(_) => true,
            Value::Vector(v) => !v.is_empty(),
            Value::Map(m) => !m.is_empty(),
            Value::Break | Value::Continue => true,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Float(f) => Some(*f as i64),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(*b as i64 as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[Value]> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vector_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut Vec<(Value, Value)>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Length for string (bytes), vector, and map; `None` for other types.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.len()),
            Value::Vector(v) => Some(v.len()),
            Value::Map(m) => Some(m.len()),
            _ => None,
        }
    }

    pub fn keys(&self) -> Option<Vec<Value>> {
        self.as_map().map(|m| m.iter().map(|(k, _)| k.clone()).collect())
    }

    pub fn values(&self) -> Option<Vec<Value>> {
        self.as_map().map(|m| m.iter().map(|(_, v)| v.clone()).collect())
    }

    pub fn items(&self) -> Option<Vec<Value>> {
        self.as_map().map(|m| {
            m.iter()
                .map(|(k, v)| Value::Vector(vec![k.clone(), v.clone()]))
                .collect()
        })
    }

    pub fn contains(&self, needle: &Value) -> Option<bool> {
        match self {
            Value::Map(m) => Some(m.iter().any(|(k, _)| k == needle)),
            Value::Vector(v) => Some(v.iter().any(|item| item == needle)),
            _ => None,
        }
    }

    pub fn map_get(&self, key: &Value) -> Value {
        match self {
            Value::Map(m) => m
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap_or(Value::Undefined),
            _ => Value::Undefined,
        }
    }

    pub fn map_insert(&mut self, key: Value, value: Value) {
        if let Value::Map(m) = self {
            if let Some(slot) = m.iter_mut().find(|(k, _)| *k == key) {
                slot.1 = value;
            } else {
                m.push((key, value));
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Vector(a), Value::Vector(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Break, Value::Break) => true,
            (Value::Continue, Value::Continue) => true,
            _ => false,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            (Value::Vector(a), Value::Vector(b)) => a.partial_cmp(b),
            (Value::Date(a), Value::Date(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, ""),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Date(d) => write!(f, "{:04}-{:02}-{:02}", d.year, d.month, d.day),
            Value::Vector(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Break => write!(f, "<break>"),
            Value::Continue => write!(f, "<continue>"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_spec() {
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Integer(0).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(!Value::Vector(vec![]).is_truthy());
        assert!(!Value::Map(vec![]).is_truthy());
        assert!(Value::Integer(1).is_truthy());
        assert!(Value::String("x".into()).is_truthy());
    }

    #[test]
    fn map_preserves_insertion_order() {
        let mut m = Value::Map(vec![]);
        m.map_insert(Value::from("b"), Value::Integer(2));
        m.map_insert(Value::from("a"), Value::Integer(1));
        assert_eq!(
            m.keys().unwrap(),
            vec![Value::from("b"), Value::from("a")]
        );
    }

    #[test]
    fn integer_float_equality_promotes() {
        assert_eq!(Value::Integer(2), Value::Float(2.0));
    }
}
