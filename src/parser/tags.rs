//! Parse functions for the built-in tags.
//!
//! Each function receives the run positioned on the tag's name token and returns
//! the node to append, or `None` for tags that only register something (macros).

use std::collections::HashMap;
use std::sync::Arc;

use super::ParseRun;
use crate::core::CobbleError;
use crate::lexer::{Token, TokenKind};
use crate::node::{BlockDefinition, Expression, MacroDefinition, Node};

pub(crate) type TagParseFn = fn(&mut ParseRun<'_>, Token) -> Result<Option<Node>, CobbleError>;

pub(crate) fn core_tags() -> HashMap<&'static str, TagParseFn> {
    let mut tags: HashMap<&'static str, TagParseFn> = HashMap::new();
    tags.insert("autoescape", parse_autoescape);
    tags.insert("block", parse_block);
    tags.insert("cache", parse_cache);
    tags.insert("embed", parse_embed);
    tags.insert("extends", parse_extends);
    tags.insert("filter", parse_filter);
    tags.insert("flush", parse_flush);
    tags.insert("for", parse_for);
    tags.insert("from", parse_from);
    tags.insert("if", parse_if);
    tags.insert("import", parse_import);
    tags.insert("include", parse_include);
    tags.insert("macro", parse_macro);
    tags.insert("parallel", parse_parallel);
    tags.insert("set", parse_set);
    tags
}

fn stop_at<'a>(names: &'a [&'a str]) -> impl Fn(&Token) -> bool + 'a {
    move |token: &Token| names.contains(&token.value.as_str())
}

fn parse_block(run: &mut ParseRun<'_>, token: Token) -> Result<Option<Node>, CobbleError> {
    let block = Arc::new(parse_block_definition(run, token)?);
    let node = Node::Block {
        name: block.name.clone(),
        line: block.line,
    };
    run.register_block(block);
    Ok(Some(node))
}

/// `block name %} ... {% endblock [name] %}`
fn parse_block_definition(run: &mut ParseRun<'_>, token: Token) -> Result<BlockDefinition, CobbleError> {
    run.stream().advance();
    let name_token = run.stream().advance();
    if !matches!(name_token.kind, TokenKind::Name | TokenKind::String) {
        return Err(run.error(
            format!("Unexpected token \"{}\" of value \"{}\"", name_token.kind, name_token.value),
            name_token.line,
        ));
    }
    let name = name_token.value;
    run.stream().expect(TokenKind::ExecuteEnd)?;

    run.push_block(&name);
    let body = run.subparse(Some(&stop_at(&["endblock"])));
    run.pop_block();
    let body = body?;

    run.expect_end_tag("block", token.line)?;
    let closing = run.stream().current().clone();
    if matches!(closing.kind, TokenKind::Name | TokenKind::String) {
        if closing.value != name {
            return Err(run.error(
                format!(
                    "endblock tag should be followed by \"{}\" to match the block opened on line {}, found \"{}\"",
                    name, token.line, closing.value
                ),
                closing.line,
            ));
        }
        run.stream().advance();
    }
    run.stream().expect(TokenKind::ExecuteEnd)?;

    Ok(BlockDefinition {
        name,
        body,
        line: token.line,
    })
}

fn parse_for(run: &mut ParseRun<'_>, token: Token) -> Result<Option<Node>, CobbleError> {
    run.stream().advance();
    let variable = run.parse_new_variable_name()?;
    run.stream().expect_value(TokenKind::Name, "in")?;
    let iterable = run.parse_expression()?;
    run.stream().expect(TokenKind::ExecuteEnd)?;

    let body = run.subparse(Some(&stop_at(&["else", "endfor"])))?;
    let mut else_body = None;
    if run.stream().current().is_value(TokenKind::Name, "else") {
        run.stream().advance();
        run.stream().expect(TokenKind::ExecuteEnd)?;
        else_body = Some(run.subparse(Some(&stop_at(&["endfor"])))?);
    }
    run.expect_end_tag("for", token.line)?;
    run.stream().expect(TokenKind::ExecuteEnd)?;

    Ok(Some(Node::For {
        variable,
        iterable,
        body,
        else_body,
        line: token.line,
    }))
}

fn parse_if(run: &mut ParseRun<'_>, token: Token) -> Result<Option<Node>, CobbleError> {
    run.stream().advance();
    let stop = stop_at(&["elseif", "else", "endif"]);
    let mut branches = Vec::new();
    let mut else_body = None;

    let condition = run.parse_expression()?;
    run.stream().expect(TokenKind::ExecuteEnd)?;
    branches.push((condition, run.subparse(Some(&stop))?));

    loop {
        if run.stream().is_eof() {
            return Err(run.unclosed("if", token.line));
        }
        let tag = run.stream().advance();
        match tag.value.as_str() {
            "elseif" => {
                let condition = run.parse_expression()?;
                run.stream().expect(TokenKind::ExecuteEnd)?;
                branches.push((condition, run.subparse(Some(&stop))?));
            }
            "else" => {
                run.stream().expect(TokenKind::ExecuteEnd)?;
                else_body = Some(run.subparse(Some(&stop_at(&["endif"])))?);
                run.expect_end_tag("if", token.line)?;
                break;
            }
            _ => break,
        }
    }
    run.stream().expect(TokenKind::ExecuteEnd)?;

    Ok(Some(Node::If {
        branches,
        else_body,
        line: token.line,
    }))
}

fn parse_set(run: &mut ParseRun<'_>, token: Token) -> Result<Option<Node>, CobbleError> {
    run.stream().advance();
    let name = run.parse_new_variable_name()?;
    run.stream().expect_value(TokenKind::Punctuation, "=")?;
    let value = run.parse_expression()?;
    run.stream().expect(TokenKind::ExecuteEnd)?;
    Ok(Some(Node::Set {
        name,
        value,
        line: token.line,
    }))
}

/// Optional `with <expression>` after an include or embed target.
fn parse_with(run: &mut ParseRun<'_>) -> Result<Option<Expression>, CobbleError> {
    if !run.stream().current().is_value(TokenKind::Name, "with") {
        return Ok(None);
    }
    run.stream().advance();
    Ok(Some(run.parse_expression()?))
}

fn parse_include(run: &mut ParseRun<'_>, token: Token) -> Result<Option<Node>, CobbleError> {
    run.stream().advance();
    let template = run.parse_expression()?;
    let variables = parse_with(run)?;
    run.stream().expect(TokenKind::ExecuteEnd)?;
    Ok(Some(Node::Include {
        template,
        variables,
        line: token.line,
    }))
}

fn parse_embed(run: &mut ParseRun<'_>, token: Token) -> Result<Option<Node>, CobbleError> {
    run.stream().advance();
    let template = run.parse_expression()?;
    let variables = parse_with(run)?;
    if let Some(variables) = &variables {
        if !matches!(variables, Expression::Map { .. }) {
            return Err(run.error("Unexpected expression. Expected a map after \"with\".", variables.line()));
        }
    }
    run.stream().expect(TokenKind::ExecuteEnd)?;

    let mut blocks = Vec::new();
    loop {
        let current = run.stream().current().clone();
        match current.kind {
            TokenKind::Eof => return Err(run.unclosed("embed", token.line)),
            TokenKind::Text if current.value.trim().is_empty() => {
                run.stream().advance();
            }
            TokenKind::ExecuteStart => {
                run.stream().advance();
                let name = run.stream().current().clone();
                if name.is_value(TokenKind::Name, "endembed") {
                    run.stream().advance();
                    run.stream().expect(TokenKind::ExecuteEnd)?;
                    break;
                }
                if !name.is_value(TokenKind::Name, "block") {
                    return Err(run.error(format!("Unexpected tag name \"{}\"", name.value), name.line));
                }
                blocks.push(Arc::new(parse_block_definition(run, name)?));
            }
            _ => {
                return Err(run.error(
                    "A template that extends another one cannot include content outside blocks. \
                     Did you forget to put the content inside a {% block %} tag?",
                    current.line,
                ));
            }
        }
    }

    Ok(Some(Node::Embed {
        template,
        variables,
        blocks,
        line: token.line,
    }))
}

fn parse_extends(run: &mut ParseRun<'_>, token: Token) -> Result<Option<Node>, CobbleError> {
    run.stream().advance();
    let parent = run.parse_expression()?;
    run.stream().expect(TokenKind::ExecuteEnd)?;
    Ok(Some(Node::Extends {
        parent,
        line: token.line,
    }))
}

fn parse_import(run: &mut ParseRun<'_>, token: Token) -> Result<Option<Node>, CobbleError> {
    run.stream().advance();
    let template = run.parse_expression()?;
    let alias = if run.stream().current().is_value(TokenKind::Name, "as") {
        run.stream().advance();
        Some(run.parse_new_variable_name()?)
    } else {
        None
    };
    run.stream().expect(TokenKind::ExecuteEnd)?;
    Ok(Some(Node::Import {
        template,
        alias,
        line: token.line,
    }))
}

/// `from <template> import a, b as c`
fn parse_from(run: &mut ParseRun<'_>, token: Token) -> Result<Option<Node>, CobbleError> {
    run.stream().advance();
    let template = run.parse_expression()?;
    run.stream().expect_value(TokenKind::Name, "import")?;

    let mut macros = Vec::new();
    loop {
        let name = run.stream().expect(TokenKind::Name)?.value;
        let alias = if run.stream().current().is_value(TokenKind::Name, "as") {
            run.stream().advance();
            run.parse_new_variable_name()?
        } else {
            name.clone()
        };
        macros.push((name, alias));

        let next = run.stream().current().clone();
        if next.is(TokenKind::ExecuteEnd) {
            run.stream().advance();
            break;
        }
        if !next.is_value(TokenKind::Punctuation, ",") {
            return Err(run.error(
                format!(
                    "Unexpected token of value \"{}\" and type {}, expected token of type EXECUTE_END or ','",
                    next.value, next.kind
                ),
                next.line,
            ));
        }
        run.stream().advance();
    }

    Ok(Some(Node::From {
        template,
        macros,
        line: token.line,
    }))
}

fn parse_macro(run: &mut ParseRun<'_>, token: Token) -> Result<Option<Node>, CobbleError> {
    run.stream().advance();
    let name = run.stream().expect(TokenKind::Name)?.value;
    let params = run.parse_arguments(true)?.named;
    run.stream().expect(TokenKind::ExecuteEnd)?;

    let body = run.subparse(Some(&stop_at(&["endmacro"])))?;
    run.expect_end_tag("macro", token.line)?;
    run.stream().expect(TokenKind::ExecuteEnd)?;

    run.register_macro(MacroDefinition {
        name,
        params,
        body,
        line: token.line,
    })?;
    Ok(None)
}

/// `autoescape [true|false] ['strategy']`
fn parse_autoescape(run: &mut ParseRun<'_>, token: Token) -> Result<Option<Node>, CobbleError> {
    run.stream().advance();
    let mut active = true;
    let mut strategy = None;
    if run.stream().current().is(TokenKind::Name) {
        active = run.stream().advance().value.eq_ignore_ascii_case("true");
    }
    if run.stream().current().is(TokenKind::String) {
        strategy = Some(run.stream().advance().value);
    }
    run.stream().expect(TokenKind::ExecuteEnd)?;

    let body = run.with_escaping(active, strategy, |run| run.subparse(Some(&stop_at(&["endautoescape"]))))?;
    run.expect_end_tag("autoescape", token.line)?;
    run.stream().expect(TokenKind::ExecuteEnd)?;

    Ok(Some(Node::AutoEscape {
        body,
        line: token.line,
    }))
}

/// `filter a | b(args) %} ... {% endfilter %}`, rendered as the body piped through the chain.
fn parse_filter(run: &mut ParseRun<'_>, token: Token) -> Result<Option<Node>, CobbleError> {
    run.stream().advance();
    let mut filters = vec![run.parse_invocation()?];
    while run.stream().current().is_value(TokenKind::Operator, "|") {
        run.stream().advance();
        filters.push(run.parse_invocation()?);
    }
    run.stream().expect(TokenKind::ExecuteEnd)?;

    let body = run.subparse(Some(&stop_at(&["endfilter"])))?;
    run.expect_end_tag("filter", token.line)?;
    run.stream().expect(TokenKind::ExecuteEnd)?;

    let mut expression = Expression::Renderable {
        body: Arc::new(body),
        line: token.line,
    };
    for filter in filters {
        expression = Expression::Filter {
            input: Box::new(expression),
            line: filter.line,
            filter,
        };
    }
    let expression = run.escape_print(expression);
    Ok(Some(Node::Print {
        expression,
        line: token.line,
    }))
}

/// `cache name %} ... {% endcache [name] %}`
fn parse_cache(run: &mut ParseRun<'_>, token: Token) -> Result<Option<Node>, CobbleError> {
    run.stream().advance();
    let (name, opening) = parse_expression_tokens(run)?;
    run.stream().expect(TokenKind::ExecuteEnd)?;

    let body = run.subparse(Some(&stop_at(&["endcache"])))?;
    run.expect_end_tag("cache", token.line)?;
    if !run.stream().current().is(TokenKind::ExecuteEnd) {
        let line = run.stream().current().line;
        let (_, closing) = parse_expression_tokens(run)?;
        if closing != opening {
            return Err(run.error(
                format!(
                    "endcache tag should be followed by \"{}\" to match the cache opened on line {}, found \"{}\"",
                    source_text(&opening),
                    token.line,
                    source_text(&closing)
                ),
                line,
            ));
        }
    }
    run.stream().expect(TokenKind::ExecuteEnd)?;

    Ok(Some(Node::Cache {
        template: run.stream().filename().to_string(),
        id: run.next_cache_tag(),
        name,
        body,
        line: token.line,
    }))
}

/// Parse an expression along with the (kind, value) of the tokens it spans.
fn parse_expression_tokens(run: &mut ParseRun<'_>) -> Result<(Expression, Vec<(TokenKind, String)>), CobbleError> {
    let start = run.stream().position();
    let expression = run.parse_expression()?;
    let end = run.stream().position();
    let tokens = run.stream().tokens()[start..end].iter().map(|t| (t.kind, t.value.clone())).collect();
    Ok((expression, tokens))
}

fn source_text(tokens: &[(TokenKind, String)]) -> String {
    tokens
        .iter()
        .map(|(kind, value)| match kind {
            TokenKind::String => format!("'{}'", value),
            _ => value.clone(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_flush(run: &mut ParseRun<'_>, token: Token) -> Result<Option<Node>, CobbleError> {
    run.stream().advance();
    run.stream().expect(TokenKind::ExecuteEnd)?;
    Ok(Some(Node::Flush {
        line: token.line,
    }))
}

fn parse_parallel(run: &mut ParseRun<'_>, token: Token) -> Result<Option<Node>, CobbleError> {
    run.stream().advance();
    run.stream().expect(TokenKind::ExecuteEnd)?;
    let body = run.subparse(Some(&stop_at(&["endparallel"])))?;
    run.expect_end_tag("parallel", token.line)?;
    run.stream().expect(TokenKind::ExecuteEnd)?;
    Ok(Some(Node::Parallel {
        body: Arc::new(body),
        line: token.line,
    }))
}
