//! Operator semantics over [`Value`]s.
//!
//! Arithmetic and comparison widen both operands to the widest representation
//! present, in the order 32-bit int < 64-bit int < single float < double < decimal,
//! and compute in that representation. Integer arithmetic wraps on overflow.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use rust_decimal::Decimal;

use super::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arithmetic {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,
}

impl fmt::Display for Arithmetic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Arithmetic::Add => "ADD",
            Arithmetic::Subtract => "SUBTRACT",
            Arithmetic::Multiply => "MULTIPLICATION",
            Arithmetic::Divide => "DIVISION",
            Arithmetic::Modulus => "MODULUS",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Comparison::Greater => "GREATER_THAN",
            Comparison::GreaterEqual => "GREATER_THAN_EQUALS",
            Comparison::Less => "LESS_THAN",
            Comparison::LessEqual => "LESS_THAN_EQUALS",
        })
    }
}

/// Numeric operands converted to a common representation.
enum Widened {
    Int(i32, i32),
    Long(i64, i64),
    Float(f32, f32),
    Double(f64, f64),
    Decimal(Decimal, Decimal),
}

fn rank(value: &Value) -> Option<u8> {
    match value {
        Value::Int(_) => Some(0),
        Value::Long(_) => Some(1),
        Value::Float(_) => Some(2),
        Value::Double(_) => Some(3),
        Value::Decimal(_) => Some(4),
        _ => None,
    }
}

fn to_decimal(value: &Value) -> Result<Decimal> {
    match value {
        Value::Int(i) => Ok(Decimal::from(*i)),
        Value::Long(l) => Ok(Decimal::from(*l)),
        Value::Float(f) => Decimal::try_from(*f).map_err(|e| anyhow!("{f} is not a decimal: {e}")),
        Value::Double(d) => Decimal::try_from(*d).map_err(|e| anyhow!("{d} is not a decimal: {e}")),
        Value::Decimal(d) => Ok(*d),
        other => bail!("{} is not a number", other.type_name()),
    }
}

fn widen(left: &Value, right: &Value) -> Option<Result<Widened>> {
    let widest = rank(left)?.max(rank(right)?);
    Some(match widest {
        0 => match (left, right) {
            (Value::Int(a), Value::Int(b)) => Ok(Widened::Int(*a, *b)),
            _ => unreachable_rank(),
        },
        1 => match (left.as_i64(), right.as_i64()) {
            (Some(a), Some(b)) => Ok(Widened::Long(a, b)),
            _ => unreachable_rank(),
        },
        2 => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Ok(Widened::Float(a as f32, b as f32)),
            _ => unreachable_rank(),
        },
        3 => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Ok(Widened::Double(a, b)),
            _ => unreachable_rank(),
        },
        _ => to_decimal(left).and_then(|a| Ok(Widened::Decimal(a, to_decimal(right)?))),
    })
}

fn unreachable_rank() -> Result<Widened> {
    Err(anyhow!("Numeric operands could not be widened"))
}

/// Apply an arithmetic operator.
///
/// `+` concatenates when either side is text and appends to a list on the left;
/// `-` removes from a list on the left.
pub fn arithmetic(operation: Arithmetic, left: &Value, right: &Value) -> Result<Value> {
    match (operation, left) {
        (Arithmetic::Add, _) if left.is_text() || right.is_text() => {
            return Ok(Value::from(format!("{}{}", left, right)));
        }
        (Arithmetic::Add, Value::List(items)) => {
            let mut items = items.as_ref().clone();
            match right {
                Value::List(more) => items.extend(more.iter().cloned()),
                other => items.push(other.clone()),
            }
            return Ok(Value::List(Arc::new(items)));
        }
        (Arithmetic::Subtract, Value::List(items)) => {
            let remove: Vec<&Value> = match right {
                Value::List(more) => more.iter().collect(),
                other => vec![other],
            };
            let kept = items.iter().filter(|item| !remove.iter().any(|r| equals(item, r)));
            return Ok(Value::List(Arc::new(kept.cloned().collect())));
        }
        _ => {}
    }

    let widened = widen(left, right)
        .ok_or_else(|| anyhow!("invalid operands for mathematical operation [{}]", operation))??;
    match widened {
        Widened::Int(a, b) => {
            let result = match operation {
                Arithmetic::Add => Some(a.wrapping_add(b)),
                Arithmetic::Subtract => Some(a.wrapping_sub(b)),
                Arithmetic::Multiply => Some(a.wrapping_mul(b)),
                Arithmetic::Divide => a.checked_div(b),
                Arithmetic::Modulus => a.checked_rem(b),
            };
            result.map(Value::Int).ok_or_else(|| anyhow!("/ by zero"))
        }
        Widened::Long(a, b) => {
            let result = match operation {
                Arithmetic::Add => Some(a.wrapping_add(b)),
                Arithmetic::Subtract => Some(a.wrapping_sub(b)),
                Arithmetic::Multiply => Some(a.wrapping_mul(b)),
                Arithmetic::Divide => a.checked_div(b),
                Arithmetic::Modulus => a.checked_rem(b),
            };
            result.map(Value::Long).ok_or_else(|| anyhow!("/ by zero"))
        }
        Widened::Float(a, b) => Ok(Value::Float(match operation {
            Arithmetic::Add => a + b,
            Arithmetic::Subtract => a - b,
            Arithmetic::Multiply => a * b,
            Arithmetic::Divide => a / b,
            Arithmetic::Modulus => a % b,
        })),
        Widened::Double(a, b) => Ok(Value::Double(match operation {
            Arithmetic::Add => a + b,
            Arithmetic::Subtract => a - b,
            Arithmetic::Multiply => a * b,
            Arithmetic::Divide => a / b,
            Arithmetic::Modulus => a % b,
        })),
        Widened::Decimal(a, b) => {
            let result = match operation {
                Arithmetic::Add => a.checked_add(b),
                Arithmetic::Subtract => a.checked_sub(b),
                Arithmetic::Multiply => a.checked_mul(b),
                Arithmetic::Divide => a.checked_div(b),
                Arithmetic::Modulus => a.checked_rem(b),
            };
            result
                .map(Value::Decimal)
                .ok_or_else(|| anyhow!("Decimal {} overflowed or divided by zero", operation))
        }
    }
}

/// Ordering comparison. Null on either side compares false.
pub fn compare(comparison: Comparison, left: &Value, right: &Value) -> Result<bool> {
    if left.is_null() || right.is_null() {
        return Ok(false);
    }
    let widened = widen(left, right)
        .ok_or_else(|| anyhow!("invalid operands for mathematical comparison [{}]", comparison))??;
    let ordering = match widened {
        Widened::Int(a, b) => Some(a.cmp(&b)),
        Widened::Long(a, b) => Some(a.cmp(&b)),
        Widened::Float(a, b) => a.partial_cmp(&b),
        Widened::Double(a, b) => a.partial_cmp(&b),
        Widened::Decimal(a, b) => Some(a.cmp(&b)),
    };
    Ok(match (comparison, ordering) {
        (_, None) => false,
        (Comparison::Greater, Some(o)) => o == Ordering::Greater,
        (Comparison::GreaterEqual, Some(o)) => o != Ordering::Less,
        (Comparison::Less, Some(o)) => o == Ordering::Less,
        (Comparison::LessEqual, Some(o)) => o != Ordering::Greater,
    })
}

/// Template `==`.
///
/// Numbers compare by value across representations, a named constant equals the
/// string of its name, and plain and safe strings compare by content.
pub fn equals(left: &Value, right: &Value) -> bool {
    if left.is_number() && right.is_number() {
        return match widen(left, right) {
            Some(Ok(Widened::Int(a, b))) => a == b,
            Some(Ok(Widened::Long(a, b))) => a == b,
            Some(Ok(Widened::Float(a, b))) => a == b,
            Some(Ok(Widened::Double(a, b))) => a == b,
            Some(Ok(Widened::Decimal(a, b))) => a == b,
            _ => false,
        };
    }
    match (left, right) {
        (Value::Object(object), text) | (text, Value::Object(object)) if text.is_text() => {
            object.constant_name().is_some_and(|name| Some(name) == text.as_str())
        }
        (a, b) if a.is_text() && b.is_text() => a.as_str() == b.as_str(),
        (a, b) => a == b,
    }
}

/// The `contains` operator.
pub fn contains(container: &Value, item: &Value) -> Result<bool> {
    let in_list = |items: &[Value], needle: &Value| items.iter().any(|i| equals(i, needle));
    match container {
        Value::Null => Ok(false),
        Value::List(items) => Ok(match item {
            Value::List(needles) => needles.iter().all(|n| in_list(items, n)),
            needle => in_list(items, needle),
        }),
        Value::Map(map) => Ok(map.keys().any(|k| equals(k, item))),
        Value::String(s) | Value::SafeString(s) => Ok(s.contains(item.to_string().as_str())),
        Value::Object(object) => match object.iter_values() {
            Some(items) => Ok(in_list(&items, item)),
            None => bail!(
                "Contains operator can only be used on Collections, Maps and arrays. Actual type was: {}",
                object.type_name()
            ),
        },
        other => bail!(
            "Contains operator can only be used on Collections, Maps and arrays. Actual type was: {}",
            other.type_name()
        ),
    }
}

/// Unary minus.
pub fn negate(value: &Value) -> Result<Value> {
    arithmetic(Arithmetic::Multiply, &Value::Int(-1), value)
}

/// Unary plus: checks the operand is numeric.
pub fn positive(value: &Value) -> Result<Value> {
    arithmetic(Arithmetic::Multiply, &Value::Int(1), value)
}

/// Inclusive range over integers or single characters.
///
/// Backs both the `..` operator and the `range` function.
pub fn range(start: &Value, end: &Value, increment: Option<&Value>) -> Result<Value> {
    let step = match increment {
        None | Some(Value::Null) => 1,
        Some(v) => v
            .as_i64()
            .ok_or_else(|| anyhow!("The increment of the range function must be a number {}", v))?,
    };
    if step == 0 {
        bail!("The increment of the range function must be different than 0");
    }

    let numbers = |from: i64, to: i64| -> Vec<i64> {
        let mut out = Vec::new();
        let mut i = from;
        while (step > 0 && i <= to) || (step < 0 && i >= to) {
            out.push(i);
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
        out
    };

    if start.is_number() && end.is_number() {
        let (from, to) = (start.as_i64().unwrap_or_default(), end.as_i64().unwrap_or_default());
        return Ok(Value::list(numbers(from, to)));
    }

    let single = |v: &Value| -> Option<char> {
        let s = v.as_str()?;
        let mut chars = s.chars();
        let c = chars.next()?;
        chars.next().is_none().then_some(c)
    };
    match (single(start), single(end)) {
        (Some(from), Some(to)) => Ok(Value::list(
            numbers(i64::from(u32::from(from)), i64::from(u32::from(to)))
                .into_iter()
                .filter_map(|code| u32::try_from(code).ok().and_then(char::from_u32))
                .map(|c| Value::from(c.to_string())),
        )),
        _ => bail!("Arguments of range function must be of type Number or String with a length of 1"),
    }
}
