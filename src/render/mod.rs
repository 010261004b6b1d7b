//! Tree-walking evaluation of compiled templates.
//!
//! Rendering is a set of methods on [`EvaluationContext`]: each node writes to an
//! [`OrderedWriter`] and each expression produces a [`Value`]. The template a node
//! belongs to travels alongside as `template`; it is the anchor for relative
//! template names, error locations and own-block lookups.
//!
//! # Inheritance
//!
//! A render starts from the template at the bottom of its [`Hierarchy`]. An
//! `extends` node records the parent and, from then on, the root body only runs
//! `set`, `import` and `from` nodes; once the root body is done, evaluation moves
//! up to the parent, whose `block` nodes resolve from the bottom of the hierarchy
//! upwards, so the most derived override wins.

mod context;
mod expression;
mod hierarchy;
mod iteration;
mod scope;

pub use context::EvaluationContext;
pub use hierarchy::Hierarchy;
pub use iteration::{LoopCursor, LoopMeta};
pub use scope::ScopeChain;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::cache::TagCacheKey;
use crate::constants::LOOP_VARIABLE;
use crate::core::CobbleError;
use crate::extension::Args;
use crate::node::{Body, Expression, MacroDefinition, Node};
use crate::template::Template;
use crate::value::Value;
use crate::writer::{OrderedWriter, pending_output};

/// Evaluated call-site arguments of a macro.
#[derive(Debug, Clone, Default)]
pub(crate) struct CallArgs {
    pub positional: Vec<Value>,
    pub named: Vec<(String, Value)>,
}

impl EvaluationContext {
    /// Render `template` and then every ancestor it declares.
    pub(crate) fn evaluate_template(
        &mut self,
        template: &Arc<Template>,
        out: &mut OrderedWriter<'_>,
    ) -> Result<(), CobbleError> {
        let mut current = template.clone();
        loop {
            self.render_nodes(&current, current.body(), current.filters_root(), out)?;
            let Some(parent) = self.hierarchy.parent().cloned() else {
                return Ok(());
            };
            self.hierarchy.ascend();
            current = parent;
        }
    }

    pub(crate) fn render_body(
        &mut self,
        template: &Arc<Template>,
        body: &Body,
        out: &mut OrderedWriter<'_>,
    ) -> Result<(), CobbleError> {
        self.render_nodes(template, body, body.only_inheritance_safe, out)
    }

    fn render_nodes(
        &mut self,
        template: &Arc<Template>,
        body: &Body,
        inheritance_filtered: bool,
        out: &mut OrderedWriter<'_>,
    ) -> Result<(), CobbleError> {
        for node in &body.children {
            if inheritance_filtered && !node.is_inheritance_safe() && self.hierarchy.parent().is_some() {
                continue;
            }
            self.render_node(template, node, out)?;
        }
        Ok(())
    }

    fn render_node(
        &mut self,
        template: &Arc<Template>,
        node: &Node,
        out: &mut OrderedWriter<'_>,
    ) -> Result<(), CobbleError> {
        match node {
            Node::Text(text) => out.write_str(text),
            Node::Print {
                expression,
                ..
            } => {
                let value = self.evaluate(template, expression)?;
                out.write_str(&value.to_output_string())
            }
            Node::If {
                branches,
                else_body,
                ..
            } => {
                for (condition, body) in branches {
                    let value = self.evaluate(template, condition)?;
                    if self.is_satisfied(template, &value, condition.line())? {
                        return self.render_body(template, body, out);
                    }
                }
                match else_body {
                    Some(body) => self.render_body(template, body, out),
                    None => Ok(()),
                }
            }
            Node::For {
                variable,
                iterable,
                body,
                else_body,
                line,
            } => self.render_for(template, variable, iterable, body, else_body.as_ref(), *line, out),
            Node::Block {
                name,
                ..
            } => self.render_block(template, name, false, out),
            Node::Set {
                name,
                value,
                ..
            } => {
                let value = self.evaluate(template, value)?;
                self.scope.set(name, value);
                Ok(())
            }
            Node::Include {
                template: name,
                variables,
                line,
            } => {
                let name = self.template_name(template, name, "an include", *line)?;
                let variables = self.with_variables(template, variables.as_ref(), *line)?;
                let included = self.load_related(template, &name)?;
                self.isolated(Hierarchy::new(included.clone()), variables, |ctx| {
                    ctx.evaluate_template(&included, out)
                })
            }
            Node::Embed {
                template: name,
                variables,
                blocks,
                line,
            } => {
                let name = self.template_name(template, name, "an embed", *line)?;
                let variables = self.with_variables(template, variables.as_ref(), *line)?;
                let embedded = self.load_related(template, &name)?;
                let copy = Arc::new(embedded.with_overrides(blocks));
                let root = Arc::new(embedded.as_embed_root());
                self.isolated(Hierarchy::with_parent(copy.clone(), root), variables, |ctx| {
                    ctx.evaluate_template(&copy, out)
                })
            }
            Node::Extends {
                parent,
                line,
            } => {
                let name = self.template_name(template, parent, "an extends", *line)?;
                let parent = self.load_related(template, &name)?;
                self.hierarchy.push_ancestor(parent);
                Ok(())
            }
            Node::Import {
                template: name,
                alias,
                line,
            } => {
                let name = self.template_name(template, name, "an import", *line)?;
                let imported = self.load_related(template, &name)?;
                match alias {
                    Some(alias) => {
                        self.aliases.insert(alias.clone(), imported);
                    }
                    None => self.imports.push(imported),
                }
                Ok(())
            }
            Node::From {
                template: name,
                macros,
                line,
            } => {
                let name = self.template_name(template, name, "a from", *line)?;
                let imported = self.load_related(template, &name)?;
                for (macro_name, alias) in macros {
                    if !imported.has_macro(macro_name) {
                        return Err(CobbleError::render(
                            format!("Function or Macro [{}] does not exist in template [{}].", macro_name, imported.name()),
                            template.name(),
                            *line,
                        ));
                    }
                    self.from_macros.insert(alias.clone(), (imported.clone(), macro_name.clone()));
                }
                Ok(())
            }
            Node::AutoEscape {
                body,
                ..
            } => self.render_body(template, body, out),
            Node::Cache {
                template: origin,
                id,
                name,
                body,
                line,
            } => {
                let key = TagCacheKey {
                    template: origin.clone(),
                    tag: *id,
                    name: self.evaluate(template, name)?,
                    locale: self.locale.clone(),
                };
                self.render_cached(template, key, body, *line, out)
            }
            Node::Flush {
                ..
            } => out.flush(),
            Node::Parallel {
                body,
                ..
            } => self.render_parallel(template, body, out),
        }
    }

    /// Condition of an `if` branch.
    fn is_satisfied(&self, template: &Template, value: &Value, line: usize) -> Result<bool, CobbleError> {
        match value {
            Value::Null if self.strict_variables => Err(CobbleError::render(
                "null value given to if statement and strict variables is set to true",
                template.name(),
                line,
            )),
            Value::Null => Ok(false),
            other => other.as_condition().ok_or_else(|| {
                CobbleError::render(
                    format!(
                        "Unsupported value type {}. Expected Boolean, String, Number in \"if\" statement",
                        other.type_name()
                    ),
                    template.name(),
                    line,
                )
            }),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn render_for(
        &mut self,
        template: &Arc<Template>,
        variable: &str,
        iterable: &Expression,
        body: &Body,
        else_body: Option<&Body>,
        line: usize,
        out: &mut OrderedWriter<'_>,
    ) -> Result<(), CobbleError> {
        let value = self.evaluate(template, iterable)?;
        if value.is_null() {
            return Ok(());
        }
        let Some(cursor) = LoopCursor::over(&value) else {
            return Err(CobbleError::render(
                format!("Not an iterable object. Value = [{}]", value),
                template.name(),
                line,
            ));
        };
        let cursor = Arc::new(cursor);
        if !cursor.has_next() {
            return match else_body {
                Some(body) => self.render_body(template, body, out),
                None => Ok(()),
            };
        }

        self.scope.push_scope(HashMap::new());
        let mut result = Ok(());
        let mut index = 0;
        while let Some(item) = cursor.next_item() {
            let last = !cursor.has_next();
            self.scope.put(LOOP_VARIABLE, Value::object(LoopMeta::new(index, last, cursor.clone())));
            self.scope.put(variable, item);
            result = self.render_body(template, body, out);
            if result.is_err() {
                break;
            }
            index += 1;
        }
        self.scope.pop_scope();
        result
    }

    /// Render block `name` as seen from `template`: the most derived override
    /// first unless `ignore_overridden`, then `template`'s own definition, then
    /// its ancestors'. A block nobody defines renders nothing.
    pub(crate) fn render_block(
        &mut self,
        template: &Arc<Template>,
        name: &str,
        ignore_overridden: bool,
        out: &mut OrderedWriter<'_>,
    ) -> Result<(), CobbleError> {
        if !ignore_overridden {
            if let Some(child) = self.hierarchy.child().cloned() {
                self.hierarchy.descend();
                let result = self.render_block(&child, name, false, out);
                self.hierarchy.ascend();
                return result;
            }
        }
        if let Some(block) = template.block(name) {
            return self.render_body(template, &block.body, out);
        }
        if let Some(parent) = self.hierarchy.parent().cloned() {
            self.hierarchy.ascend();
            let result = self.render_block(&parent, name, true, out);
            self.hierarchy.descend();
            return result;
        }
        Ok(())
    }

    /// Call macro `name` as seen from `template`: overrides in descendants, then
    /// `template` itself, then unaliased imports, then ancestors.
    pub(crate) fn call_macro_by_name(
        &mut self,
        template: &Arc<Template>,
        name: &str,
        ignore_overridden: bool,
        args: CallArgs,
        line: usize,
    ) -> Result<Value, CobbleError> {
        if !ignore_overridden {
            if let Some(child) = self.hierarchy.child().cloned() {
                self.hierarchy.descend();
                let result = self.call_macro_by_name(&child, name, false, args, line);
                self.hierarchy.ascend();
                return result;
            }
        }
        if let Some(definition) = template.macro_definition(name).cloned() {
            return self.call_macro(template, &definition, args, line);
        }
        let imported = self.imports.iter().find(|t| t.has_macro(name)).cloned();
        if let Some(imported) = imported {
            if let Some(definition) = imported.macro_definition(name).cloned() {
                return self.call_macro(&imported, &definition, args, line);
            }
        }
        if let Some(parent) = self.hierarchy.parent().cloned() {
            self.hierarchy.ascend();
            let result = self.call_macro_by_name(&parent, name, true, args, line);
            self.hierarchy.descend();
            return result;
        }
        Err(CobbleError::render(format!("Function or Macro [{}] does not exist.", name), template.name(), line))
    }

    /// Run a macro body against its arguments and return its output as safe text.
    ///
    /// Defaults are bound in a local scope that hides the caller's variables;
    /// the caller's arguments sit in a scope above it.
    pub(crate) fn call_macro(
        &mut self,
        template: &Arc<Template>,
        definition: &MacroDefinition,
        args: CallArgs,
        line: usize,
    ) -> Result<Value, CobbleError> {
        let names = definition.param_names();
        let bound = Args::bind(Some(&names), args.positional, args.named)
            .map_err(|message| CobbleError::render(message, template.name(), line))?;
        let bound: HashMap<String, Value> =
            bound.iter().map(|(name, value)| (name.to_string(), value.clone())).collect();

        self.scope.push_local_scope(HashMap::new());
        let result = self.render_macro_body(template, definition, bound);
        self.scope.pop_scope();
        result.map(Value::safe)
    }

    fn render_macro_body(
        &mut self,
        template: &Arc<Template>,
        definition: &MacroDefinition,
        bound: HashMap<String, Value>,
    ) -> Result<String, CobbleError> {
        for param in &definition.params {
            let value = match &param.value {
                Some(default) => self.evaluate(template, default)?,
                None => Value::Null,
            };
            self.scope.put(param.name.clone(), value);
        }
        self.scope.push_scope(bound);
        let mut buffer = OrderedWriter::buffer(self.budget.clone());
        let result = self.render_body(template, &definition.body, &mut buffer).and_then(|()| buffer.into_string());
        self.scope.pop_scope();
        result
    }

    fn render_cached(
        &mut self,
        template: &Arc<Template>,
        key: TagCacheKey,
        body: &Body,
        line: usize,
        out: &mut OrderedWriter<'_>,
    ) -> Result<(), CobbleError> {
        // the enclosing computation of this key would wait for itself
        if self.computing.contains(&key) {
            return Err(CobbleError::render(
                format!("Recursive computation of cache key [{}] in template [{}]", key.name, key.template),
                template.name(),
                line,
            ));
        }
        let cache = self.engine.tag_cache.clone();
        let output = cache.compute_if_absent(&key, &mut || {
            self.computing.push(key.clone());
            let mut buffer = OrderedWriter::buffer(self.budget.clone());
            let result = self.render_body(template, body, &mut buffer).and_then(|()| buffer.into_string());
            self.computing.pop();
            result
        })?;
        out.write_str(&output)
    }

    /// Hand `body` to the executor with a snapshot of this context, leaving a
    /// placeholder in `out`. Without an executor the body renders in place.
    fn render_parallel(
        &mut self,
        template: &Arc<Template>,
        body: &Arc<Body>,
        out: &mut OrderedWriter<'_>,
    ) -> Result<(), CobbleError> {
        let Some(executor) = self.engine.executor.clone() else {
            if !self.engine.parallel_warned.swap(true, Ordering::Relaxed) {
                tracing::info!(
                    target: "cobble::render",
                    "Parallel tag was used but no executor was configured; rendering inline"
                );
            }
            return self.render_body(template, body, out);
        };

        let mut region = self.clone();
        let template = template.clone();
        let body = body.clone();
        let (completer, pending) = pending_output();
        executor.execute(Box::new(move || {
            let mut buffer = OrderedWriter::buffer(region.budget.clone());
            let output = region.render_body(&template, &body, &mut buffer).and_then(|()| buffer.into_string());
            completer.complete(output);
        }));
        out.push_pending(pending)
    }

    /// Evaluate the name of a referenced template.
    fn template_name(
        &mut self,
        template: &Arc<Template>,
        expression: &Expression,
        tag: &str,
        line: usize,
    ) -> Result<String, CobbleError> {
        let value = self.evaluate(template, expression)?;
        if value.is_null() {
            return Err(CobbleError::render(
                format!(
                    "The template name in {} tag evaluated to NULL. If the template name is static, make sure to wrap it in quotes.",
                    tag
                ),
                template.name(),
                line,
            ));
        }
        Ok(value.to_string())
    }

    /// Evaluate the `with` map of an include or embed.
    fn with_variables(
        &mut self,
        template: &Arc<Template>,
        expression: Option<&Expression>,
        line: usize,
    ) -> Result<HashMap<String, Value>, CobbleError> {
        let Some(expression) = expression else {
            return Ok(HashMap::new());
        };
        match self.evaluate(template, expression)? {
            Value::Null => Ok(HashMap::new()),
            Value::Map(map) => Ok(map.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()),
            other => Err(CobbleError::render(
                format!("The \"with\" argument must evaluate to a map, got {}", other.type_name()),
                template.name(),
                line,
            )),
        }
    }
}
