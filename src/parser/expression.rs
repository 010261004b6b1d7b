//! Precedence-climbing expression parser.
//!
//! Binary operators come from the extension registry. `|` and `is`/`is not` are
//! binary operators whose right side is an invocation rather than an expression.
//! The conditional `a ? b : c` is only recognized at the outermost level.

use super::ParseRun;
use crate::constants::RESERVED_WORDS;
use crate::core::CobbleError;
use crate::extension::{Associativity, BinaryOperatorKind};
use crate::lexer::{Token, TokenKind};
use crate::node::{Arguments, Expression, Invocation, NamedArgument};
use crate::value::Value;

impl ParseRun<'_> {
    /// Parse a full expression, including a trailing conditional.
    pub(crate) fn parse_expression(&mut self) -> Result<Expression, CobbleError> {
        self.parse_expression_with(0)
    }

    fn parse_expression_with(&mut self, min_precedence: u32) -> Result<Expression, CobbleError> {
        let token = self.stream().current().clone();

        let mut expression = if let Some(operator) = self.unary_operator(&token) {
            self.stream().advance();
            let child = self.parse_expression_with(operator.precedence)?;
            Expression::Unary {
                operator: operator.operator,
                child: Box::new(child),
                line: token.line,
            }
        } else if token.is_value(TokenKind::Punctuation, "(") {
            self.stream().advance();
            let inner = self.parse_expression()?;
            self.stream().expect_value(TokenKind::Punctuation, ")")?;
            self.parse_postfix(inner)?
        } else {
            self.parse_primary()?
        };

        loop {
            let token = self.stream().current().clone();
            if !token.is(TokenKind::Operator) {
                break;
            }
            let Some(operator) = self.registry().binary_operator(&token.value).cloned() else {
                break;
            };
            if operator.precedence < min_precedence {
                break;
            }
            self.stream().advance();

            expression = match operator.kind {
                BinaryOperatorKind::Filter => {
                    let filter = self.parse_invocation()?;
                    Expression::Filter {
                        input: Box::new(expression),
                        filter,
                        line: token.line,
                    }
                }
                BinaryOperatorKind::Test {
                    negated,
                } => {
                    let test = self.parse_invocation()?;
                    Expression::Test {
                        input: Box::new(expression),
                        test,
                        negated,
                        line: token.line,
                    }
                }
                BinaryOperatorKind::Expression(op) => {
                    let next = match operator.associativity {
                        Associativity::Left => operator.precedence + 1,
                        Associativity::Right => operator.precedence,
                    };
                    let right = self.parse_expression_with(next)?;
                    Expression::Binary {
                        operator: op,
                        left: Box::new(expression),
                        right: Box::new(right),
                        line: token.line,
                    }
                }
            };
        }

        if min_precedence == 0 {
            expression = self.parse_ternary(expression)?;
        }
        Ok(expression)
    }

    fn unary_operator(&self, token: &Token) -> Option<crate::extension::UnaryOperator> {
        if !token.is(TokenKind::Operator) {
            return None;
        }
        self.registry().unary_operator(&token.value).cloned()
    }

    fn parse_ternary(&mut self, condition: Expression) -> Result<Expression, CobbleError> {
        if !self.stream().current().is_value(TokenKind::Punctuation, "?") {
            return Ok(condition);
        }
        let line = self.stream().advance().line;
        let if_true = self.parse_expression()?;
        self.stream().expect_value(TokenKind::Punctuation, ":")?;
        let if_false = self.parse_expression()?;
        Ok(Expression::Ternary {
            condition: Box::new(condition),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
            line,
        })
    }

    /// A literal, name, call, array or map, followed by any `.x` / `[x]` accessors.
    fn parse_primary(&mut self) -> Result<Expression, CobbleError> {
        let token = self.stream().current().clone();
        let line = token.line;

        let expression = match token.kind {
            TokenKind::Name => {
                self.stream().advance();
                let is_call = self.stream().current().is_value(TokenKind::Punctuation, "(");
                match token.value.as_str() {
                    "true" | "TRUE" => Expression::Literal {
                        value: Value::Bool(true),
                        line,
                    },
                    "false" | "FALSE" => Expression::Literal {
                        value: Value::Bool(false),
                        line,
                    },
                    "null" | "NULL" | "none" | "NONE" => Expression::Literal {
                        value: Value::Null,
                        line,
                    },
                    name if is_call => {
                        self.parse_function_call(name.to_string(), line)?
                    }
                    name => Expression::Variable {
                        name: name.to_string(),
                        line,
                    },
                }
            }
            TokenKind::Number => {
                self.stream().advance();
                Expression::Literal {
                    value: self.number_literal(&token)?,
                    line,
                }
            }
            TokenKind::Long => {
                self.stream().advance();
                let value = token.value.parse::<i64>().map_err(|_| {
                    self.error(format!("Invalid number literal \"{}\"", token.value), line)
                })?;
                Expression::Literal {
                    value: Value::Long(value),
                    line,
                }
            }
            TokenKind::String | TokenKind::StringInterpolationStart => self.parse_string()?,
            TokenKind::Punctuation if token.value == "[" => self.parse_array()?,
            TokenKind::Punctuation if token.value == "{" => self.parse_map()?,
            _ => {
                return Err(self.error(
                    format!("Unexpected token \"{}\" of value \"{}\"", token.kind, token.value),
                    line,
                ));
            }
        };
        self.parse_postfix(expression)
    }

    fn number_literal(&self, token: &Token) -> Result<Value, CobbleError> {
        let invalid = || self.error(format!("Invalid number literal \"{}\"", token.value), token.line);
        if token.value.contains('.') {
            return token.value.parse::<f64>().map(Value::Double).map_err(|_| invalid());
        }
        if self.options().literal_decimals_treated_as_integers {
            token.value.parse::<i32>().map(Value::Int).map_err(|_| invalid())
        } else {
            token.value.parse::<i64>().map(Value::Long).map_err(|_| invalid())
        }
    }

    fn parse_function_call(&mut self, name: String, line: usize) -> Result<Expression, CobbleError> {
        let args = self.parse_arguments(false)?;
        Ok(match name.as_str() {
            "parent" => Expression::Parent {
                block: self.current_block().map(str::to_string),
                line,
            },
            "block" => Expression::BlockCall {
                args,
                line,
            },
            _ => Expression::FunctionCall {
                name,
                args,
                line,
            },
        })
    }

    fn parse_postfix(&mut self, mut expression: Expression) -> Result<Expression, CobbleError> {
        loop {
            let token = self.stream().current().clone();
            if token.is_value(TokenKind::Punctuation, ".") {
                self.stream().advance();
                expression = self.parse_member_access(expression, token.line)?;
            } else if token.is_value(TokenKind::Punctuation, "[") {
                self.stream().advance();
                let attribute = self.parse_expression()?;
                self.stream().expect_value(TokenKind::Punctuation, "]")?;
                expression = Expression::GetAttribute {
                    object: Box::new(expression),
                    attribute: Box::new(attribute),
                    args: None,
                    line: token.line,
                };
            } else {
                return Ok(expression);
            }
        }
    }

    /// `.name`, `.0` or `.name(args)` after an expression.
    fn parse_member_access(&mut self, object: Expression, line: usize) -> Result<Expression, CobbleError> {
        let token = self.stream().advance();
        let attribute = match token.kind {
            TokenKind::Name => Value::from(token.value.as_str()),
            TokenKind::Number | TokenKind::Long => Value::from(token.value.as_str()),
            _ => {
                return Err(self.error(
                    format!("Unexpected token \"{}\" of value \"{}\"", token.kind, token.value),
                    token.line,
                ));
            }
        };

        let args = if self.stream().current().is_value(TokenKind::Punctuation, "(") {
            let args = self.parse_arguments(false)?;
            if !args.named.is_empty() {
                return Err(self.error("Can not use named arguments when calling a bean method", line));
            }
            Some(args)
        } else {
            None
        };

        Ok(Expression::GetAttribute {
            object: Box::new(object),
            attribute: Box::new(Expression::Literal {
                value: attribute,
                line: token.line,
            }),
            args,
            line,
        })
    }

    /// A filter or test name with optional arguments.
    pub(crate) fn parse_invocation(&mut self) -> Result<Invocation, CobbleError> {
        let token = self.stream().expect(TokenKind::Name)?;
        let args = if self.stream().current().is_value(TokenKind::Punctuation, "(") {
            self.parse_arguments(false)?
        } else {
            Arguments::empty(token.line)
        };
        Ok(Invocation {
            name: token.value,
            args,
            line: token.line,
        })
    }

    /// `( ... )` at a call site, or at a macro definition when `definition` is set.
    ///
    /// At a definition every parameter is a name with an optional `= default`. At a
    /// call site `name = value` arguments must follow all positional ones.
    pub(crate) fn parse_arguments(&mut self, definition: bool) -> Result<Arguments, CobbleError> {
        let open = self.stream().expect_value(TokenKind::Punctuation, "(")?;
        let mut args = Arguments::empty(open.line);

        while !self.stream().current().is_value(TokenKind::Punctuation, ")") {
            if !args.is_empty() {
                self.stream().expect_value(TokenKind::Punctuation, ",")?;
            }

            if definition {
                let name = self.parse_new_variable_name()?;
                let default = if self.stream().current().is_value(TokenKind::Punctuation, "=") {
                    self.stream().advance();
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                args.named.push(NamedArgument {
                    name,
                    value: default,
                });
                continue;
            }

            let name = if self.stream().peek(1).is_value(TokenKind::Punctuation, "=") {
                let name = self.parse_new_variable_name()?;
                self.stream().expect_value(TokenKind::Punctuation, "=")?;
                Some(name)
            } else {
                None
            };
            let line = self.stream().current().line;
            let value = self.parse_expression()?;
            match name {
                Some(name) => args.named.push(NamedArgument {
                    name,
                    value: Some(value),
                }),
                None if !args.named.is_empty() => {
                    return Err(
                        self.error("Positional arguments must be declared before any named arguments.", line)
                    );
                }
                None => args.positional.push(value),
            }
        }

        self.stream().expect_value(TokenKind::Punctuation, ")")?;
        Ok(args)
    }

    /// A name about to be bound: loop variables, `set` targets, macro parameters.
    pub(crate) fn parse_new_variable_name(&mut self) -> Result<String, CobbleError> {
        let token = self.stream().expect(TokenKind::Name)?;
        if RESERVED_WORDS.contains(&token.value.as_str()) {
            return Err(self.error(format!("Can not assign a value to {}", token.value), token.line));
        }
        Ok(token.value)
    }

    /// Adjacent string pieces and interpolations folded into one expression.
    fn parse_string(&mut self) -> Result<Expression, CobbleError> {
        let line = self.stream().current().line;
        let mut pieces = Vec::new();
        loop {
            let token = self.stream().current().clone();
            match token.kind {
                TokenKind::String => {
                    self.stream().advance();
                    pieces.push(Expression::Literal {
                        value: Value::from(token.value.as_str()),
                        line: token.line,
                    });
                }
                TokenKind::StringInterpolationStart => {
                    self.stream().advance();
                    pieces.push(self.parse_expression()?);
                    self.stream().expect(TokenKind::StringInterpolationEnd)?;
                }
                _ => break,
            }
        }

        let mut pieces = pieces.into_iter();
        let first = pieces.next().unwrap_or(Expression::Literal {
            value: Value::from(""),
            line,
        });
        Ok(pieces.fold(first, |left, right| Expression::Concatenate {
            left: Box::new(left),
            right: Box::new(right),
            line,
        }))
    }

    fn parse_array(&mut self) -> Result<Expression, CobbleError> {
        let open = self.stream().expect_value(TokenKind::Punctuation, "[")?;
        let mut elements = Vec::new();
        while !self.stream().current().is_value(TokenKind::Punctuation, "]") {
            if !elements.is_empty() {
                self.stream().expect_value(TokenKind::Punctuation, ",")?;
            }
            elements.push(self.parse_expression()?);
        }
        self.stream().expect_value(TokenKind::Punctuation, "]")?;
        Ok(Expression::Array {
            elements,
            line: open.line,
        })
    }

    fn parse_map(&mut self) -> Result<Expression, CobbleError> {
        let open = self.stream().expect_value(TokenKind::Punctuation, "{")?;
        let mut entries = Vec::new();
        while !self.stream().current().is_value(TokenKind::Punctuation, "}") {
            if !entries.is_empty() {
                self.stream().expect_value(TokenKind::Punctuation, ",")?;
            }
            let key = self.parse_expression()?;
            self.stream().expect_value(TokenKind::Punctuation, ":")?;
            let value = self.parse_expression()?;
            entries.push((key, value));
        }
        self.stream().expect_value(TokenKind::Punctuation, "}")?;
        Ok(Expression::Map {
            entries,
            line: open.line,
        })
    }
}
