//! Named operations templates can call, and the registry that collects them.
//!
//! An [`Extension`] contributes filters, tests, functions, operators, escaping
//! strategies and global variables. The engine merges every installed extension
//! into one [`ExtensionRegistry`]; later extensions override earlier ones with the
//! same name. The operator symbols of the registry drive both the lexer and the
//! expression parser.

pub mod core;
pub mod escaper;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::node::{BinaryOp, UnaryOp};
use crate::value::Value;

pub use self::core::CoreExtension;
pub use self::escaper::{EscaperExtension, EscapingStrategy};

/// Where a collaborator is being invoked from.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    pub template: &'a str,
    pub line: usize,
    pub locale: &'a str,
    pub strict_variables: bool,
}

/// Arguments bound to an invocable's declared names.
///
/// Invocables that declare no names receive their positional arguments under the
/// keys `"0"`, `"1"`, ...
#[derive(Debug, Clone, Default)]
pub struct Args {
    values: IndexMap<String, Value>,
}

impl Args {
    /// Bind evaluated call-site arguments to `names`.
    ///
    /// # Errors
    ///
    /// Returns a message when too many positional arguments are given or a named
    /// argument is not declared.
    pub fn bind(
        names: Option<&[String]>,
        positional: Vec<Value>,
        named: Vec<(String, Value)>,
    ) -> Result<Self, String> {
        let mut values = IndexMap::new();
        let Some(names) = names else {
            for (i, value) in positional.into_iter().enumerate() {
                values.insert(i.to_string(), value);
            }
            return Ok(Self {
                values,
            });
        };

        for (i, value) in positional.into_iter().enumerate() {
            let Some(name) = names.get(i) else {
                return Err(format!(
                    "The argument at position {} is not allowed. Only {} argument(s) are allowed.",
                    i + 1,
                    names.len()
                ));
            };
            values.insert(name.clone(), value);
        }
        for (name, value) in named {
            if !names.contains(&name) {
                return Err(format!("The following named argument does not exist: {}", name));
            }
            values.insert(name, value);
        }
        Ok(Self {
            values,
        })
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// The `index`-th bound value in binding order.
    pub fn positional(&self, index: usize) -> Option<&Value> {
        self.values.get_index(index).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.values()
    }

    /// Names and values in binding order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }
}

/// `input | name(args)`
pub trait Filter: Send + Sync {
    fn argument_names(&self) -> Option<Vec<String>> {
        None
    }

    fn apply(&self, input: &Value, args: &Args, context: &CallContext<'_>) -> anyhow::Result<Value>;

    /// Evaluate the input leniently: a missing variable becomes null even in strict mode.
    fn tolerates_missing_input(&self) -> bool {
        false
    }
}

/// `input is name(args)`
pub trait Test: Send + Sync {
    fn argument_names(&self) -> Option<Vec<String>> {
        None
    }

    fn apply(&self, input: &Value, args: &Args, context: &CallContext<'_>) -> anyhow::Result<bool>;

    /// Evaluate the input leniently: a missing variable becomes null even in strict mode.
    fn tolerates_missing_input(&self) -> bool {
        false
    }
}

/// `name(args)`
pub trait Function: Send + Sync {
    fn argument_names(&self) -> Option<Vec<String>> {
        None
    }

    fn call(&self, args: &Args, context: &CallContext<'_>) -> anyhow::Result<Value>;
}

/// Semantics of an operator contributed by an extension.
pub trait BinaryOperation: Send + Sync {
    fn apply(&self, left: &Value, right: &Value) -> anyhow::Result<Value>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
}

/// How the parser treats the right-hand side of a binary operator.
#[derive(Debug, Clone)]
pub enum BinaryOperatorKind {
    /// Right side is an ordinary expression
    Expression(BinaryOp),
    /// `|`: right side names a filter
    Filter,
    /// `is` / `is not`: right side names a test
    Test {
        negated: bool,
    },
}

#[derive(Debug, Clone)]
pub struct BinaryOperator {
    pub symbol: String,
    pub precedence: u32,
    pub associativity: Associativity,
    pub kind: BinaryOperatorKind,
}

impl BinaryOperator {
    pub fn new(symbol: &str, precedence: u32, kind: BinaryOperatorKind) -> Self {
        Self {
            symbol: symbol.to_string(),
            precedence,
            associativity: Associativity::Left,
            kind,
        }
    }

    /// An operator whose semantics live in `operation`.
    pub fn custom(
        symbol: &str,
        precedence: u32,
        associativity: Associativity,
        operation: Arc<dyn BinaryOperation>,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            precedence,
            associativity,
            kind: BinaryOperatorKind::Expression(BinaryOp::Custom {
                symbol: symbol.to_string(),
                operation,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UnaryOperator {
    pub symbol: String,
    pub precedence: u32,
    pub operator: UnaryOp,
}

/// A bundle of template collaborators.
pub trait Extension: Send + Sync {
    fn filters(&self) -> Vec<(String, Arc<dyn Filter>)> {
        Vec::new()
    }

    fn tests(&self) -> Vec<(String, Arc<dyn Test>)> {
        Vec::new()
    }

    fn functions(&self) -> Vec<(String, Arc<dyn Function>)> {
        Vec::new()
    }

    fn binary_operators(&self) -> Vec<BinaryOperator> {
        Vec::new()
    }

    fn unary_operators(&self) -> Vec<UnaryOperator> {
        Vec::new()
    }

    /// Variables visible to every render, below the caller's variables.
    fn global_variables(&self) -> Vec<(String, Value)> {
        Vec::new()
    }
}

/// Merged view of every installed extension.
#[derive(Default)]
pub struct ExtensionRegistry {
    filters: HashMap<String, Arc<dyn Filter>>,
    tests: HashMap<String, Arc<dyn Test>>,
    functions: HashMap<String, Arc<dyn Function>>,
    binary_operators: HashMap<String, BinaryOperator>,
    unary_operators: HashMap<String, UnaryOperator>,
    globals: Vec<(String, Value)>,
}

impl ExtensionRegistry {
    pub fn new(extensions: &[Arc<dyn Extension>]) -> Self {
        let mut registry = Self::default();
        for extension in extensions {
            registry.filters.extend(extension.filters());
            registry.tests.extend(extension.tests());
            registry.functions.extend(extension.functions());
            for operator in extension.binary_operators() {
                registry.binary_operators.insert(operator.symbol.clone(), operator);
            }
            for operator in extension.unary_operators() {
                registry.unary_operators.insert(operator.symbol.clone(), operator);
            }
            registry.globals.extend(extension.global_variables());
        }
        registry
    }

    pub fn filter(&self, name: &str) -> Option<&Arc<dyn Filter>> {
        self.filters.get(name)
    }

    pub fn test(&self, name: &str) -> Option<&Arc<dyn Test>> {
        self.tests.get(name)
    }

    pub fn function(&self, name: &str) -> Option<&Arc<dyn Function>> {
        self.functions.get(name)
    }

    pub fn binary_operator(&self, symbol: &str) -> Option<&BinaryOperator> {
        self.binary_operators.get(symbol)
    }

    pub fn unary_operator(&self, symbol: &str) -> Option<&UnaryOperator> {
        self.unary_operators.get(symbol)
    }

    pub fn global_variables(&self) -> &[(String, Value)] {
        &self.globals
    }

    /// Every operator symbol, for the lexer.
    pub fn operator_symbols(&self) -> Vec<String> {
        self.binary_operators.keys().chain(self.unary_operators.keys()).cloned().collect()
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut filters: Vec<_> = self.filters.keys().collect();
        filters.sort();
        let mut operators: Vec<_> = self.binary_operators.keys().collect();
        operators.sort();
        f.debug_struct("ExtensionRegistry")
            .field("filters", &filters)
            .field("tests", &self.tests.len())
            .field("functions", &self.functions.len())
            .field("binary_operators", &operators)
            .finish()
    }
}
