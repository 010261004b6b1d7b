//! Statement parser.
//!
//! [`Parser::parse`] drives the text / print / execute loop over a [`TokenStream`].
//! Execute regions dispatch on their leading name through a table of tag parse
//! functions (see [`tags`]); a tag that owns a body calls back into
//! [`ParseRun::subparse`] with a stop predicate such as "stop at `elseif`, `else`
//! or `endif`".
//!
//! Blocks and macros are collected while parsing, so the compiled template is
//! complete and immutable once this returns. Autoescaping is applied here too:
//! print expressions are wrapped in the `escape` filter according to the
//! `autoescape` tags that enclose them.

mod expression;
mod tags;

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::CobbleError;
use crate::extension::ExtensionRegistry;
use crate::lexer::{Token, TokenKind, TokenStream};
use crate::node::{
    Arguments, BinaryOp, BlockDefinition, Body, Expression, Invocation, MacroDefinition, Node,
};
use crate::value::Value;

/// Options that change how source is compiled.
#[derive(Debug, Clone)]
pub struct ParserOptions {
    /// Unsuffixed integer literals become 32-bit
    pub literal_decimals_treated_as_integers: bool,
    /// Autoescaping state at the top of every template
    pub auto_escaping: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            literal_decimals_treated_as_integers: false,
            auto_escaping: true,
        }
    }
}

/// Output of a successful parse.
#[derive(Debug)]
pub struct ParsedTemplate {
    pub body: Body,
    pub blocks: HashMap<String, Arc<BlockDefinition>>,
    pub macros: HashMap<String, Arc<MacroDefinition>>,
}

/// Compiles token streams into node trees.
pub struct Parser {
    registry: Arc<ExtensionRegistry>,
    options: ParserOptions,
    tags: HashMap<&'static str, tags::TagParseFn>,
}

impl Parser {
    pub fn new(registry: Arc<ExtensionRegistry>, options: ParserOptions) -> Self {
        Self {
            registry,
            options,
            tags: tags::core_tags(),
        }
    }

    /// Parse a whole template.
    ///
    /// # Errors
    ///
    /// [`CobbleError::Parse`] on an unexpected token, an unknown tag, malformed
    /// arguments, a reserved word used as a variable name, an unterminated body or a
    /// duplicate macro.
    pub fn parse(&self, stream: TokenStream) -> Result<ParsedTemplate, CobbleError> {
        tracing::trace!(target: "cobble::parser", template = stream.filename(), "parsing");
        let mut run = ParseRun {
            parser: self,
            stream,
            block_stack: Vec::new(),
            escape_stack: vec![EscapeState {
                active: self.options.auto_escaping,
                strategy: None,
            }],
            blocks: HashMap::new(),
            macros: HashMap::new(),
            cache_tags: 0,
        };
        let mut body = run.subparse(None)?;
        body.only_inheritance_safe = true;
        Ok(ParsedTemplate {
            body,
            blocks: run.blocks,
            macros: run.macros,
        })
    }
}

/// Autoescaping in force at a point of the template.
#[derive(Debug, Clone)]
struct EscapeState {
    active: bool,
    /// `None` defers to the escape filter's default strategy
    strategy: Option<String>,
}

/// Predicate a tag parser hands to [`ParseRun::subparse`] to find its end.
pub(crate) type StopCondition<'s> = &'s dyn Fn(&Token) -> bool;

/// Mutable state of one parse.
pub(crate) struct ParseRun<'p> {
    parser: &'p Parser,
    stream: TokenStream,
    /// Names of the blocks enclosing the current position, for `parent()`
    block_stack: Vec<String>,
    escape_stack: Vec<EscapeState>,
    blocks: HashMap<String, Arc<BlockDefinition>>,
    macros: HashMap<String, Arc<MacroDefinition>>,
    /// `cache` tags seen so far, in source order
    cache_tags: usize,
}

impl<'p> ParseRun<'p> {
    pub(crate) fn stream(&mut self) -> &mut TokenStream {
        &mut self.stream
    }

    pub(crate) fn registry(&self) -> &ExtensionRegistry {
        &self.parser.registry
    }

    pub(crate) fn options(&self) -> &ParserOptions {
        &self.parser.options
    }

    /// Ordinal of the next `cache` tag in this template.
    pub(crate) fn next_cache_tag(&mut self) -> usize {
        let ordinal = self.cache_tags;
        self.cache_tags += 1;
        ordinal
    }

    pub(crate) fn error(&self, message: impl Into<String>, line: usize) -> CobbleError {
        CobbleError::parse(message, self.stream.filename(), line)
    }

    /// Parse nodes until end of input or until `stop` matches the name opening an
    /// execute region. The stop token is left as the current token.
    pub(crate) fn subparse(&mut self, stop: Option<StopCondition<'_>>) -> Result<Body, CobbleError> {
        let line = self.stream.current().line;
        let mut children = Vec::new();

        while !self.stream.is_eof() {
            let token = self.stream.current().clone();
            match token.kind {
                TokenKind::Text => {
                    self.stream.advance();
                    children.push(Node::Text(token.value));
                }
                TokenKind::PrintStart => {
                    self.stream.advance();
                    let expression = self.parse_expression()?;
                    self.stream.expect(TokenKind::PrintEnd)?;
                    let expression = self.escape_print(expression);
                    children.push(Node::Print {
                        expression,
                        line: token.line,
                    });
                }
                TokenKind::ExecuteStart => {
                    self.stream.advance();
                    let name = self.stream.current().clone();
                    if !name.is(TokenKind::Name) {
                        return Err(self.error("A block must start with a tag name.", name.line));
                    }
                    if stop.is_some_and(|stop| stop(&name)) {
                        return Ok(Body::new(children, line));
                    }
                    let Some(parse_tag) = self.parser.tags.get(name.value.as_str()).copied() else {
                        return Err(self.error(
                            format!("Unexpected tag name \"{}\"", name.value),
                            name.line,
                        ));
                    };
                    tracing::trace!(target: "cobble::parser", tag = %name.value, line = name.line, "dispatching tag");
                    if let Some(node) = parse_tag(self, name)? {
                        children.push(node);
                    }
                }
                _ => {
                    return Err(self.error("Parser ended in undefined state.", token.line));
                }
            }
        }
        Ok(Body::new(children, line))
    }

    /// Error for a body that ran into end of input; `opened_at` is the line of the opening tag.
    pub(crate) fn unclosed(&self, tag: &str, opened_at: usize) -> CobbleError {
        self.error(
            format!(
                "Unexpected end of template. Tag \"{}\" opened on line {} was never closed with \"end{}\"",
                tag, opened_at, tag
            ),
            self.stream.current().line,
        )
    }

    /// Consume `{% end<tag>` after a body; the closing `%}` is left to the caller.
    pub(crate) fn expect_end_tag(&mut self, tag: &str, opened_at: usize) -> Result<(), CobbleError> {
        if self.stream.is_eof() {
            return Err(self.unclosed(tag, opened_at));
        }
        self.stream.expect_value(TokenKind::Name, &format!("end{}", tag))?;
        Ok(())
    }

    pub(crate) fn push_block(&mut self, name: &str) {
        self.block_stack.push(name.to_string());
    }

    pub(crate) fn pop_block(&mut self) {
        self.block_stack.pop();
    }

    pub(crate) fn current_block(&self) -> Option<&str> {
        self.block_stack.last().map(String::as_str)
    }

    pub(crate) fn register_block(&mut self, block: Arc<BlockDefinition>) {
        self.blocks.insert(block.name.clone(), block);
    }

    pub(crate) fn register_macro(&mut self, definition: MacroDefinition) -> Result<(), CobbleError> {
        if self.macros.contains_key(&definition.name) {
            return Err(self.error(
                format!("More than one macro can not share the same name: {}", definition.name),
                definition.line,
            ));
        }
        self.macros.insert(definition.name.clone(), Arc::new(definition));
        Ok(())
    }

    /// Parse `body` under an `autoescape` setting.
    pub(crate) fn with_escaping<T>(
        &mut self,
        active: bool,
        strategy: Option<String>,
        parse: impl FnOnce(&mut Self) -> Result<T, CobbleError>,
    ) -> Result<T, CobbleError> {
        self.escape_stack.push(EscapeState {
            active,
            strategy,
        });
        let result = parse(self);
        self.escape_stack.pop();
        result
    }

    /// Wrap a print expression in the `escape` filter unless it is known to be safe.
    fn escape_print(&self, expression: Expression) -> Expression {
        let Some(state) = self.escape_stack.last() else {
            return expression;
        };
        if !state.active {
            return expression;
        }
        escape_expression(expression, state)
    }
}

fn escape_expression(expression: Expression, state: &EscapeState) -> Expression {
    match expression {
        Expression::Ternary {
            condition,
            if_true,
            if_false,
            line,
        } => Expression::Ternary {
            condition,
            if_true: Box::new(escape_expression(*if_true, state)),
            if_false: Box::new(escape_expression(*if_false, state)),
            line,
        },
        expression if is_safe(&expression) => expression,
        expression => {
            let line = expression.line();
            let mut args = Arguments::empty(line);
            if let Some(strategy) = &state.strategy {
                args.positional.push(Expression::Literal {
                    value: Value::from(strategy.as_str()),
                    line,
                });
            }
            Expression::Filter {
                input: Box::new(expression),
                filter: Invocation {
                    name: "escape".to_string(),
                    args,
                    line,
                },
                line,
            }
        }
    }
}

/// Output known not to need escaping.
fn is_safe(expression: &Expression) -> bool {
    match expression {
        Expression::Literal {
            value: Value::String(_),
            ..
        }
        | Expression::Parent { .. }
        | Expression::BlockCall { .. } => true,
        Expression::Concatenate {
            left,
            right,
            ..
        }
        | Expression::Binary {
            operator: BinaryOp::Concatenate,
            left,
            right,
            ..
        } => left.is_string_literal() && right.is_string_literal(),
        _ => false,
    }
}
