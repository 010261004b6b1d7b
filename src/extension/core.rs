//! Built-in operators, filters, tests and functions.

use std::sync::Arc;

use anyhow::{Result, bail};
use sha2::{Digest, Sha256};

use super::{
    Args, BinaryOperator, BinaryOperatorKind, CallContext, Extension, Filter, Function, Test,
    UnaryOperator,
};
use crate::node::{BinaryOp, UnaryOp};
use crate::value::ops::{self, Comparison};
use crate::value::Value;

/// The operator table and the standard collaborators every engine installs.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreExtension;

impl Extension for CoreExtension {
    fn unary_operators(&self) -> Vec<UnaryOperator> {
        [("not", UnaryOp::Not), ("+", UnaryOp::Plus), ("-", UnaryOp::Minus)]
            .into_iter()
            .map(|(symbol, operator)| UnaryOperator {
                symbol: symbol.to_string(),
                precedence: 500,
                operator,
            })
            .collect()
    }

    fn binary_operators(&self) -> Vec<BinaryOperator> {
        use BinaryOperatorKind::Expression as E;
        vec![
            BinaryOperator::new("or", 10, E(BinaryOp::Or)),
            BinaryOperator::new("and", 15, E(BinaryOp::And)),
            BinaryOperator::new("is", 20, BinaryOperatorKind::Test {
                negated: false,
            }),
            BinaryOperator::new("is not", 20, BinaryOperatorKind::Test {
                negated: true,
            }),
            BinaryOperator::new("contains", 20, E(BinaryOp::Contains)),
            BinaryOperator::new("==", 30, E(BinaryOp::Equals)),
            BinaryOperator::new("equals", 30, E(BinaryOp::Equals)),
            BinaryOperator::new("!=", 30, E(BinaryOp::NotEquals)),
            BinaryOperator::new(">", 30, E(BinaryOp::Greater)),
            BinaryOperator::new("<", 30, E(BinaryOp::Less)),
            BinaryOperator::new(">=", 30, E(BinaryOp::GreaterEqual)),
            BinaryOperator::new("<=", 30, E(BinaryOp::LessEqual)),
            BinaryOperator::new("+", 40, E(BinaryOp::Add)),
            BinaryOperator::new("-", 40, E(BinaryOp::Subtract)),
            BinaryOperator::new("*", 60, E(BinaryOp::Multiply)),
            BinaryOperator::new("/", 60, E(BinaryOp::Divide)),
            BinaryOperator::new("%", 60, E(BinaryOp::Modulus)),
            BinaryOperator::new("|", 100, BinaryOperatorKind::Filter),
            BinaryOperator::new("~", 110, E(BinaryOp::Concatenate)),
            BinaryOperator::new("..", 120, E(BinaryOp::Range)),
        ]
    }

    fn filters(&self) -> Vec<(String, Arc<dyn Filter>)> {
        vec![
            filter_entry("upper", TextFilter(|s| s.to_uppercase())),
            filter_entry("lower", TextFilter(|s| s.to_lowercase())),
            filter_entry("trim", TextFilter(|s| s.trim().to_string())),
            filter_entry("title", TextFilter(title_case)),
            filter_entry("sha256", TextFilter(sha256_hex)),
            filter_entry("length", LengthFilter),
            filter_entry("default", DefaultFilter),
            filter_entry("join", JoinFilter),
            filter_entry("first", EndFilter {
                last: false,
            }),
            filter_entry("last", EndFilter {
                last: true,
            }),
            filter_entry("reverse", ReverseFilter),
            filter_entry("abs", AbsFilter),
        ]
    }

    fn tests(&self) -> Vec<(String, Arc<dyn Test>)> {
        vec![
            test_entry("null", PredicateTest(|v| Ok(v.is_null()))),
            test_entry("empty", PredicateTest(|v| Ok(is_empty(v)))),
            test_entry("even", PredicateTest(|v| parity("even", v).map(|odd| !odd))),
            test_entry("odd", PredicateTest(|v| parity("odd", v))),
            test_entry("map", PredicateTest(|v| Ok(matches!(v, Value::Map(_))))),
            test_entry("iterable", PredicateTest(|v| Ok(is_iterable(v)))),
            test_entry("defined", DefinedTest),
        ]
    }

    fn functions(&self) -> Vec<(String, Arc<dyn Function>)> {
        vec![
            function_entry("range", RangeFunction),
            function_entry("min", ExtremeFunction(Comparison::Less)),
            function_entry("max", ExtremeFunction(Comparison::Greater)),
        ]
    }
}

fn filter_entry(name: &str, filter: impl Filter + 'static) -> (String, Arc<dyn Filter>) {
    (name.to_string(), Arc::new(filter))
}

fn test_entry(name: &str, test: impl Test + 'static) -> (String, Arc<dyn Test>) {
    (name.to_string(), Arc::new(test))
}

fn function_entry(name: &str, function: impl Function + 'static) -> (String, Arc<dyn Function>) {
    (name.to_string(), Arc::new(function))
}

/// Items of a sequence-like value. Draining a shared iterator consumes it.
pub(crate) fn collect_items(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::List(items) => Some(items.as_ref().clone()),
        Value::Iterator(iter) => Some(std::iter::from_fn(|| iter.next_value()).collect()),
        Value::Object(object) => object.iter_values(),
        _ => None,
    }
}

fn is_iterable(value: &Value) -> bool {
    match value {
        Value::List(_) | Value::Iterator(_) => true,
        Value::Object(object) => object.iter_values().is_some(),
        _ => false,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) | Value::SafeString(s) => s.trim().is_empty(),
        Value::List(items) => items.is_empty(),
        Value::Map(map) => map.is_empty(),
        Value::Object(object) => object.iter_values().is_some_and(|items| items.is_empty()),
        _ => false,
    }
}

fn parity(test: &str, value: &Value) -> Result<bool> {
    if value.is_null() {
        bail!("Can not pass null value to \"{}\" test.", test);
    }
    match value.as_i64() {
        Some(n) => Ok(n % 2 != 0),
        None => bail!("Test \"{}\" expects a number, got {}", test, value.type_name()),
    }
}

fn title_case(input: &str) -> String {
    let mut capitalize = true;
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if c.is_whitespace() {
            capitalize = true;
            out.push(c);
        } else if capitalize {
            out.extend(c.to_uppercase());
            capitalize = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// A filter mapping text to text; null passes through.
struct TextFilter(fn(&str) -> String);

impl Filter for TextFilter {
    fn apply(&self, input: &Value, _: &Args, _: &CallContext<'_>) -> Result<Value> {
        if input.is_null() {
            return Ok(Value::Null);
        }
        Ok(Value::from((self.0)(&input.to_string())))
    }
}

struct LengthFilter;

impl Filter for LengthFilter {
    fn apply(&self, input: &Value, _: &Args, _: &CallContext<'_>) -> Result<Value> {
        let length = match input {
            Value::Null => 0,
            Value::String(s) | Value::SafeString(s) => s.chars().count(),
            Value::Map(map) => map.len(),
            other => collect_items(other).map_or(0, |items| items.len()),
        };
        Ok(Value::from(length))
    }
}

struct DefaultFilter;

impl Filter for DefaultFilter {
    fn argument_names(&self) -> Option<Vec<String>> {
        Some(vec!["default".to_string()])
    }

    fn apply(&self, input: &Value, args: &Args, _: &CallContext<'_>) -> Result<Value> {
        if is_empty(input) {
            return Ok(args.get("default").cloned().unwrap_or_default());
        }
        Ok(input.clone())
    }

    fn tolerates_missing_input(&self) -> bool {
        true
    }
}

struct JoinFilter;

impl Filter for JoinFilter {
    fn argument_names(&self) -> Option<Vec<String>> {
        Some(vec!["separator".to_string()])
    }

    fn apply(&self, input: &Value, args: &Args, _: &CallContext<'_>) -> Result<Value> {
        let Some(items) = collect_items(input) else {
            return Ok(Value::Null);
        };
        let separator = args.get("separator").map(Value::to_output_string).unwrap_or_default();
        let joined: Vec<String> = items.iter().map(Value::to_output_string).collect();
        Ok(Value::from(joined.join(&separator)))
    }
}

struct EndFilter {
    last: bool,
}

impl Filter for EndFilter {
    fn apply(&self, input: &Value, _: &Args, _: &CallContext<'_>) -> Result<Value> {
        if let Some(s) = input.as_str() {
            let c = if self.last {
                s.chars().next_back()
            } else {
                s.chars().next()
            };
            return Ok(c.map(|c| Value::from(c.to_string())).unwrap_or_default());
        }
        let Some(items) = collect_items(input) else {
            return Ok(Value::Null);
        };
        let item = if self.last {
            items.last()
        } else {
            items.first()
        };
        Ok(item.cloned().unwrap_or_default())
    }
}

struct ReverseFilter;

impl Filter for ReverseFilter {
    fn apply(&self, input: &Value, _: &Args, _: &CallContext<'_>) -> Result<Value> {
        if let Some(s) = input.as_str() {
            return Ok(Value::from(s.chars().rev().collect::<String>()));
        }
        match collect_items(input) {
            Some(mut items) => {
                items.reverse();
                Ok(Value::list(items))
            }
            None => Ok(Value::Null),
        }
    }
}

struct AbsFilter;

impl Filter for AbsFilter {
    fn apply(&self, input: &Value, _: &Args, _: &CallContext<'_>) -> Result<Value> {
        Ok(match input {
            Value::Int(i) => Value::Int(i.wrapping_abs()),
            Value::Long(l) => Value::Long(l.wrapping_abs()),
            Value::Float(f) => Value::Float(f.abs()),
            Value::Double(d) => Value::Double(d.abs()),
            Value::Decimal(d) => Value::Decimal(d.abs()),
            Value::Null => Value::Null,
            other => bail!("abs filter expects a number, got {}", other.type_name()),
        })
    }
}

struct PredicateTest(fn(&Value) -> Result<bool>);

impl Test for PredicateTest {
    fn apply(&self, input: &Value, _: &Args, _: &CallContext<'_>) -> Result<bool> {
        (self.0)(input)
    }
}

struct DefinedTest;

impl Test for DefinedTest {
    fn apply(&self, input: &Value, _: &Args, _: &CallContext<'_>) -> Result<bool> {
        Ok(!input.is_null())
    }

    fn tolerates_missing_input(&self) -> bool {
        true
    }
}

struct RangeFunction;

impl Function for RangeFunction {
    fn argument_names(&self) -> Option<Vec<String>> {
        Some(vec!["start".to_string(), "end".to_string(), "increment".to_string()])
    }

    fn call(&self, args: &Args, _: &CallContext<'_>) -> Result<Value> {
        let start = args.get("start").cloned().unwrap_or_default();
        let end = args.get("end").cloned().unwrap_or_default();
        ops::range(&start, &end, args.get("increment"))
    }
}

/// `min` / `max` over any number of arguments.
struct ExtremeFunction(Comparison);

impl Function for ExtremeFunction {
    fn call(&self, args: &Args, _: &CallContext<'_>) -> Result<Value> {
        let mut best: Option<&Value> = None;
        for candidate in args.values() {
            best = match best {
                Some(current) if !ops::compare(self.0, candidate, current)? => Some(current),
                _ => Some(candidate),
            };
        }
        Ok(best.cloned().unwrap_or_default())
    }
}
