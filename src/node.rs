//! The compiled form of a template.
//!
//! Two tagged enums make up the tree: [`Expression`] for everything that produces a
//! value and [`Node`] for everything that writes output. Both are immutable once the
//! parser returns them and are shared read-only across concurrent renders.
//!
//! Cross-template references (extends, include, import, embed) are expressions that
//! evaluate to a template name; the tree never points at another template directly.

use std::fmt;
use std::sync::Arc;

use crate::extension::BinaryOperation;
use crate::value::Value;

/// A value-producing node.
#[derive(Debug, Clone)]
pub enum Expression {
    /// `true`, `42`, `1.5`, `'text'`, `null`
    Literal {
        value: Value,
        line: usize,
    },
    /// A name looked up in the scope chain
    Variable {
        name: String,
        line: usize,
    },
    /// Pieces of an interpolated string
    Concatenate {
        left: Box<Expression>,
        right: Box<Expression>,
        line: usize,
    },
    Binary {
        operator: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
        line: usize,
    },
    Unary {
        operator: UnaryOp,
        child: Box<Expression>,
        line: usize,
    },
    Ternary {
        condition: Box<Expression>,
        if_true: Box<Expression>,
        if_false: Box<Expression>,
        line: usize,
    },
    Array {
        elements: Vec<Expression>,
        line: usize,
    },
    Map {
        entries: Vec<(Expression, Expression)>,
        line: usize,
    },
    /// `a.b`, `a.b(args)`, `a[expr]`
    GetAttribute {
        object: Box<Expression>,
        attribute: Box<Expression>,
        args: Option<Arguments>,
        line: usize,
    },
    /// A registered function, or failing that a macro
    FunctionCall {
        name: String,
        args: Arguments,
        line: usize,
    },
    /// `input | name(args)`
    Filter {
        input: Box<Expression>,
        filter: Invocation,
        line: usize,
    },
    /// `input is name(args)` / `input is not name(args)`
    Test {
        input: Box<Expression>,
        test: Invocation,
        negated: bool,
        line: usize,
    },
    /// `parent()` inside the named block
    Parent {
        block: Option<String>,
        line: usize,
    },
    /// `block("name")`
    BlockCall {
        args: Arguments,
        line: usize,
    },
    /// The rendered output of a body, used by the `filter` tag
    Renderable {
        body: Arc<Body>,
        line: usize,
    },
}

impl Expression {
    pub fn line(&self) -> usize {
        match self {
            Expression::Literal {
                line,
                ..
            }
            | Expression::Variable {
                line,
                ..
            }
            | Expression::Concatenate {
                line,
                ..
            }
            | Expression::Binary {
                line,
                ..
            }
            | Expression::Unary {
                line,
                ..
            }
            | Expression::Ternary {
                line,
                ..
            }
            | Expression::Array {
                line,
                ..
            }
            | Expression::Map {
                line,
                ..
            }
            | Expression::GetAttribute {
                line,
                ..
            }
            | Expression::FunctionCall {
                line,
                ..
            }
            | Expression::Filter {
                line,
                ..
            }
            | Expression::Test {
                line,
                ..
            }
            | Expression::Parent {
                line,
                ..
            }
            | Expression::BlockCall {
                line,
                ..
            }
            | Expression::Renderable {
                line,
                ..
            } => *line,
        }
    }

    /// True for a plain string literal.
    pub fn is_string_literal(&self) -> bool {
        matches!(
            self,
            Expression::Literal {
                value: Value::String(_),
                ..
            }
        )
    }
}

/// Binary operators after the filter and test operators have been split off.
#[derive(Clone)]
pub enum BinaryOp {
    Or,
    And,
    Contains,
    Equals,
    NotEquals,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,
    Concatenate,
    Range,
    /// Operator contributed by an extension
    Custom {
        symbol: String,
        operation: Arc<dyn BinaryOperation>,
    },
}

impl fmt::Debug for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Custom {
                symbol,
                ..
            } => write!(f, "Custom({symbol})"),
            BinaryOp::Or => f.write_str("Or"),
            BinaryOp::And => f.write_str("And"),
            BinaryOp::Contains => f.write_str("Contains"),
            BinaryOp::Equals => f.write_str("Equals"),
            BinaryOp::NotEquals => f.write_str("NotEquals"),
            BinaryOp::Greater => f.write_str("Greater"),
            BinaryOp::Less => f.write_str("Less"),
            BinaryOp::GreaterEqual => f.write_str("GreaterEqual"),
            BinaryOp::LessEqual => f.write_str("LessEqual"),
            BinaryOp::Add => f.write_str("Add"),
            BinaryOp::Subtract => f.write_str("Subtract"),
            BinaryOp::Multiply => f.write_str("Multiply"),
            BinaryOp::Divide => f.write_str("Divide"),
            BinaryOp::Modulus => f.write_str("Modulus"),
            BinaryOp::Concatenate => f.write_str("Concatenate"),
            BinaryOp::Range => f.write_str("Range"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Plus,
    Minus,
}

/// A filter or test name with its arguments.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub name: String,
    pub args: Arguments,
    pub line: usize,
}

/// Call-site or definition-site arguments.
///
/// Positional arguments always precede named ones. At a macro definition every
/// parameter is "named" and the expression is its optional default.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    pub positional: Vec<Expression>,
    pub named: Vec<NamedArgument>,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct NamedArgument {
    pub name: String,
    pub value: Option<Expression>,
}

impl Arguments {
    pub fn empty(line: usize) -> Self {
        Self {
            positional: Vec::new(),
            named: Vec::new(),
            line,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

/// A sequence of nodes.
///
/// The root body of a template only renders `set` and `import` children once the
/// template has declared a parent, so the ancestor provides the output.
#[derive(Debug, Clone, Default)]
pub struct Body {
    pub children: Vec<Node>,
    pub only_inheritance_safe: bool,
    pub line: usize,
}

impl Body {
    pub fn new(children: Vec<Node>, line: usize) -> Self {
        Self {
            children,
            only_inheritance_safe: false,
            line,
        }
    }
}

/// A named overridable region.
#[derive(Debug)]
pub struct BlockDefinition {
    pub name: String,
    pub body: Body,
    pub line: usize,
}

/// A callable template fragment.
#[derive(Debug)]
pub struct MacroDefinition {
    pub name: String,
    /// Parameters in declaration order with optional default values
    pub params: Vec<NamedArgument>,
    pub body: Body,
    pub line: usize,
}

impl MacroDefinition {
    pub fn param_names(&self) -> Vec<String> {
        self.params.iter().map(|p| p.name.clone()).collect()
    }
}

/// An output-producing node.
#[derive(Debug, Clone)]
pub enum Node {
    Text(String),
    Print {
        expression: Expression,
        line: usize,
    },
    If {
        branches: Vec<(Expression, Body)>,
        else_body: Option<Body>,
        line: usize,
    },
    For {
        variable: String,
        iterable: Expression,
        body: Body,
        else_body: Option<Body>,
        line: usize,
    },
    /// Renders the named block through the hierarchy
    Block {
        name: String,
        line: usize,
    },
    Set {
        name: String,
        value: Expression,
        line: usize,
    },
    Include {
        template: Expression,
        variables: Option<Expression>,
        line: usize,
    },
    Embed {
        template: Expression,
        variables: Option<Expression>,
        blocks: Vec<Arc<BlockDefinition>>,
        line: usize,
    },
    Extends {
        parent: Expression,
        line: usize,
    },
    Import {
        template: Expression,
        alias: Option<String>,
        line: usize,
    },
    /// `from "x" import a as b, c`: (macro name, alias) pairs
    From {
        template: Expression,
        macros: Vec<(String, String)>,
        line: usize,
    },
    AutoEscape {
        body: Body,
        line: usize,
    },
    /// Output cached under (template, tag ordinal, evaluated name, locale)
    Cache {
        /// Template the tag was compiled in
        template: String,
        /// Position among the template's `cache` tags
        id: usize,
        name: Expression,
        body: Body,
        line: usize,
    },
    Flush {
        line: usize,
    },
    Parallel {
        body: Arc<Body>,
        line: usize,
    },
}

impl Node {
    /// Nodes that still render in a template that extends another one.
    pub fn is_inheritance_safe(&self) -> bool {
        matches!(self, Node::Set { .. } | Node::Import { .. } | Node::From { .. })
    }
}
