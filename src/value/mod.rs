//! The dynamic value model templates compute with.
//!
//! [`Value`] covers the scalar kinds the operator widening rules distinguish
//! (32/64-bit integers, single/double floats, exact decimals), text in two flavours
//! (plain and [`Value::SafeString`], which escaping leaves alone), shared
//! collections, host objects behind the [`Object`] capability trait, and one-shot
//! iterators.
//!
//! Every variant is cheap to clone (collections and text are `Arc`-backed) and
//! `Send + Sync`, so a context can be copied into a `parallel` region.

mod object;
pub mod ops;

pub use object::{
    FieldDescriptor, MethodDescriptor, Object, ParamKind, TypeDescriptor, TypeDescriptorBuilder,
};

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use rust_decimal::Decimal;

/// Ordered mapping used for map literals and host-supplied maps.
pub type ValueMap = IndexMap<Value, Value>;

/// A template value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    String(Arc<str>),
    /// Text that must not be escaped again
    SafeString(Arc<str>),
    List(Arc<Vec<Value>>),
    Map(Arc<ValueMap>),
    Object(Arc<dyn Object>),
    Iterator(SharedIterator),
}

/// A one-shot iterator shared by every clone of the value that holds it.
#[derive(Clone)]
pub struct SharedIterator(Arc<Mutex<Box<dyn Iterator<Item = Value> + Send>>>);

impl SharedIterator {
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = Value> + Send + 'static,
    {
        Self(Arc::new(Mutex::new(Box::new(iter))))
    }

    /// Pull the next item. A poisoned iterator behaves as exhausted.
    pub fn next_value(&self) -> Option<Value> {
        self.0.lock().ok().and_then(|mut iter| iter.next())
    }

    fn ptr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl Value {
    /// Text that escaping leaves untouched.
    pub fn safe(text: impl Into<Arc<str>>) -> Self {
        Value::SafeString(text.into())
    }

    pub fn object<O: Object>(object: O) -> Self {
        Value::Object(Arc::new(object))
    }

    pub fn iterator<I>(iter: I) -> Self
    where
        I: Iterator<Item = Value> + Send + 'static,
    {
        Value::Iterator(SharedIterator::new(iter))
    }

    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::List(Arc::new(items.into_iter().map(Into::into).collect()))
    }

    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Into<Value>,
    {
        Value::Map(Arc::new(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(
            self,
            Value::Int(_) | Value::Long(_) | Value::Float(_) | Value::Double(_) | Value::Decimal(_)
        )
    }

    /// True for plain and safe strings.
    pub fn is_text(&self) -> bool {
        matches!(self, Value::String(_) | Value::SafeString(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::SafeString(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integral view of a number; fractional values are truncated.
    pub fn as_i64(&self) -> Option<i64> {
        use rust_decimal::prelude::ToPrimitive;
        match self {
            Value::Int(i) => Some(i64::from(*i)),
            Value::Long(l) => Some(*l),
            Value::Float(f) => Some(*f as i64),
            Value::Double(d) => Some(*d as i64),
            Value::Decimal(d) => d.to_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        use rust_decimal::prelude::ToPrimitive;
        match self {
            Value::Int(i) => Some(f64::from(*i)),
            Value::Long(l) => Some(*l as f64),
            Value::Float(f) => Some(f64::from(*f)),
            Value::Double(d) => Some(*d),
            Value::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    /// Boolean view used by `and`, `or`, `not` and the ternary operator.
    ///
    /// Null, `false`, zero, and empty text or collections are false; host objects
    /// and iterators are true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::String(s) | Value::SafeString(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Object(_) | Value::Iterator(_) => true,
            number => number.as_f64().is_some_and(|n| n != 0.0),
        }
    }

    /// Condition view used by `if`: only booleans, numbers and text qualify.
    pub fn as_condition(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::String(s) | Value::SafeString(s) => Some(!s.is_empty()),
            number if number.is_number() => number.as_f64().map(|n| n != 0.0),
            _ => None,
        }
    }

    /// Short name of the value's kind, used in error messages.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "Boolean",
            Value::Int(_) => "Integer",
            Value::Long(_) => "Long",
            Value::Float(_) => "Float",
            Value::Double(_) => "Double",
            Value::Decimal(_) => "Decimal",
            Value::String(_) => "String",
            Value::SafeString(_) => "SafeString",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Object(o) => o.type_name(),
            Value::Iterator(_) => "Iterator",
        }
    }

    /// Text written by a print node. Null prints as nothing.
    pub fn to_output_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// Java-style rendering of doubles: `3.0`, `2.5`, `1.0E10`.
pub(crate) fn format_double(d: f64) -> String {
    if d.is_nan() {
        return "NaN".to_string();
    }
    if d.is_infinite() {
        return if d > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let abs = d.abs();
    if abs != 0.0 && !(1e-3..1e7).contains(&abs) {
        let formatted = format!("{:E}", d);
        return match formatted.split_once('E') {
            Some((mantissa, exponent)) if !mantissa.contains('.') => {
                format!("{}.0E{}", mantissa, exponent)
            }
            _ => formatted,
        };
    }
    if d.fract() == 0.0 {
        format!("{:.1}", d)
    } else {
        format!("{}", d)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Long(l) => write!(f, "{}", l),
            Value::Float(x) => f.write_str(&format_double(f64::from(*x))),
            Value::Double(d) => f.write_str(&format_double(*d)),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::String(s) | Value::SafeString(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}={}", k, v)?;
                }
                f.write_str("}")
            }
            Value::Object(o) => f.write_str(&o.display()),
            Value::Iterator(_) => f.write_str("<iterator>"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::SafeString(s) => write!(f, "SafeString({:?})", s),
            Value::List(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Map(map) => f.debug_map().entries(map.iter()).finish(),
            Value::Object(o) => write!(f, "Object({})", o.type_name()),
            other => write!(f, "{}({})", other.type_name(), other),
        }
    }
}

/// Structural equality, used for map keys. Template `==` goes through
/// [`ops::equals`], which also compares numbers across representations.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::SafeString(a), Value::SafeString(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Iterator(a), Value::Iterator(b)) => a.ptr() == b.ptr(),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Long(l) => l.hash(state),
            Value::Float(x) => x.to_bits().hash(state),
            Value::Double(d) => d.to_bits().hash(state),
            Value::Decimal(d) => d.hash(state),
            Value::String(s) | Value::SafeString(s) => s.hash(state),
            Value::List(items) => items.hash(state),
            // maps compare without regard to order, so only the size is hashed
            Value::Map(map) => map.len().hash(state),
            Value::Object(o) => (Arc::as_ptr(o) as *const () as usize).hash(state),
            Value::Iterator(it) => (it.ptr() as usize).hash(state),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<i64> for Value {
    fn from(l: i64) -> Self {
        Value::Long(l)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Long(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Value::Float(x)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::list(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(option: Option<T>) -> Self {
        option.map_or(Value::Null, Into::into)
    }
}

impl From<ValueMap> for Value {
    fn from(map: ValueMap) -> Self {
        Value::Map(Arc::new(map))
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(l) = n.as_i64() {
                    Value::Long(l)
                } else {
                    n.as_f64().map_or(Value::Null, Value::Double)
                }
            }
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => Value::list(items),
            serde_json::Value::Object(map) => Value::map(map),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_follows_template_conventions() {
        assert_eq!(Value::Double(2.5).to_string(), "2.5");
        assert_eq!(Value::Double(3.0).to_string(), "3.0");
        assert_eq!(Value::Double(1e10).to_string(), "1.0E10");
        assert_eq!(Value::Long(14).to_string(), "14");
        assert_eq!(Value::list(vec![1i64, 2]).to_string(), "[1, 2]");
        assert_eq!(Value::map(vec![("a", 1i64)]).to_string(), "{a=1}");
        assert_eq!(Value::Null.to_output_string(), "");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(!Value::Long(0).is_truthy());
        assert!(Value::Double(0.5).is_truthy());
        assert!(!Value::list(Vec::<Value>::new()).is_truthy());
    }

    #[test]
    fn test_condition_rejects_collections() {
        assert_eq!(Value::Long(2).as_condition(), Some(true));
        assert_eq!(Value::from("").as_condition(), Some(false));
        assert_eq!(Value::list(vec![1i64]).as_condition(), None);
    }

    #[test]
    fn test_map_keys_are_typed() {
        let map: ValueMap = vec![(Value::Long(1), Value::from("one"))].into_iter().collect();
        assert!(map.contains_key(&Value::Long(1)));
        assert!(!map.contains_key(&Value::Int(1)), "keys compare structurally");
    }

    #[test]
    fn test_from_json() {
        let value = Value::from(json!({"name": "Ada", "tags": ["a", "b"], "score": 1.5, "n": 3}));
        let Value::Map(map) = value else {
            panic!("expected a map");
        };
        assert_eq!(map.get(&Value::from("name")), Some(&Value::from("Ada")));
        assert_eq!(map.get(&Value::from("score")), Some(&Value::Double(1.5)));
        assert_eq!(map.get(&Value::from("n")), Some(&Value::Long(3)));
        assert_eq!(map.keys().next(), Some(&Value::from("name")), "object order is kept");
    }

    #[test]
    fn test_shared_iterator_is_one_shot() {
        let value = Value::iterator(vec![Value::Long(1), Value::Long(2)].into_iter());
        let copy = value.clone();
        let Value::Iterator(a) = value else {
            panic!("expected iterator");
        };
        let Value::Iterator(b) = copy else {
            panic!("expected iterator");
        };
        assert_eq!(a.next_value(), Some(Value::Long(1)));
        assert_eq!(b.next_value(), Some(Value::Long(2)));
        assert_eq!(a.next_value(), None);
    }
}
