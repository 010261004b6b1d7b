//! Expression evaluation.

use std::sync::Arc;

use super::CallArgs;
use super::context::EvaluationContext;
use crate::attributes::AttributeRequest;
use crate::core::CobbleError;
use crate::extension::Args;
use crate::node::{Arguments, BinaryOp, Expression, Invocation, UnaryOp};
use crate::template::Template;
use crate::value::ops::{self, Arithmetic, Comparison};
use crate::value::{Value, ValueMap};
use crate::writer::OrderedWriter;

impl EvaluationContext {
    /// Evaluate `expression` as part of `template`.
    pub(crate) fn evaluate(&mut self, template: &Arc<Template>, expression: &Expression) -> Result<Value, CobbleError> {
        match expression {
            Expression::Literal {
                value,
                ..
            } => Ok(value.clone()),
            Expression::Variable {
                name,
                line,
            } => self.variable(template, name, *line),
            Expression::Concatenate {
                left,
                right,
                ..
            } => {
                let left = self.evaluate(template, left)?;
                let right = self.evaluate(template, right)?;
                Ok(concatenate(&left, &right))
            }
            Expression::Binary {
                operator,
                left,
                right,
                line,
            } => self.binary(template, operator, left, right, *line),
            Expression::Unary {
                operator,
                child,
                line,
            } => {
                let value = self.evaluate(template, child)?;
                let result = match operator {
                    UnaryOp::Not => return Ok(Value::Bool(!value.is_truthy())),
                    UnaryOp::Plus => ops::positive(&value),
                    UnaryOp::Minus => ops::negate(&value),
                };
                result.map_err(|e| CobbleError::render(e.to_string(), template.name(), *line))
            }
            Expression::Ternary {
                condition,
                if_true,
                if_false,
                ..
            } => {
                if self.evaluate(template, condition)?.is_truthy() {
                    self.evaluate(template, if_true)
                } else {
                    self.evaluate(template, if_false)
                }
            }
            Expression::Array {
                elements,
                ..
            } => {
                let items =
                    elements.iter().map(|element| self.evaluate(template, element)).collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(Arc::new(items)))
            }
            Expression::Map {
                entries,
                ..
            } => {
                let mut map = ValueMap::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = self.evaluate(template, key)?;
                    let value = self.evaluate(template, value)?;
                    map.insert(key, value);
                }
                Ok(Value::Map(Arc::new(map)))
            }
            Expression::GetAttribute {
                object,
                attribute,
                args,
                line,
            } => self.get_attribute(template, object, attribute, args.as_ref(), *line),
            Expression::FunctionCall {
                name,
                args,
                line,
            } => self.function_call(template, name, args, *line),
            Expression::Filter {
                input,
                filter,
                line,
            } => self.apply_filter(template, input, filter, *line),
            Expression::Test {
                input,
                test,
                negated,
                line,
            } => self.apply_test(template, input, test, *negated, *line),
            Expression::Parent {
                block,
                line,
            } => self.parent_block(template, block.as_deref(), *line),
            Expression::BlockCall {
                args,
                line,
            } => {
                let args = self.evaluate_call_args(template, args)?;
                let name = match args.positional.first() {
                    Some(name) if !name.is_null() => name.to_string(),
                    _ => {
                        return Err(CobbleError::render(
                            "The block function requires the name of a block",
                            template.name(),
                            *line,
                        ));
                    }
                };
                let mut buffer = OrderedWriter::buffer(self.budget.clone());
                self.render_block(template, &name, false, &mut buffer)?;
                Ok(Value::safe(buffer.into_string()?))
            }
            Expression::Renderable {
                body,
                ..
            } => {
                let mut buffer = OrderedWriter::buffer(self.budget.clone());
                self.render_body(template, body, &mut buffer)?;
                Ok(Value::from(buffer.into_string()?))
            }
        }
    }

    fn variable(&self, template: &Template, name: &str, line: usize) -> Result<Value, CobbleError> {
        if let Some(value) = self.scope.get(name) {
            return Ok(value.clone());
        }
        if self.strict_variables {
            return Err(CobbleError::attribute_not_found(
                name,
                format!(
                    "Root attribute [{}] does not exist or can not be accessed and strict variables is set to true.",
                    name
                ),
                &self.scope.visible_names(),
                template.name(),
                line,
            ));
        }
        Ok(Value::Null)
    }

    /// Evaluate `expression`, turning a missing variable or attribute into null.
    fn evaluate_lenient(&mut self, template: &Arc<Template>, expression: &Expression) -> Result<Value, CobbleError> {
        match self.evaluate(template, expression) {
            Err(e) if e.is_attribute_not_found() => Ok(Value::Null),
            other => other,
        }
    }

    pub(crate) fn evaluate_call_args(
        &mut self,
        template: &Arc<Template>,
        args: &Arguments,
    ) -> Result<CallArgs, CobbleError> {
        let positional =
            args.positional.iter().map(|arg| self.evaluate(template, arg)).collect::<Result<Vec<_>, _>>()?;
        let mut named = Vec::with_capacity(args.named.len());
        for arg in &args.named {
            let value = match &arg.value {
                Some(expression) => self.evaluate(template, expression)?,
                None => Value::Null,
            };
            named.push((arg.name.clone(), value));
        }
        Ok(CallArgs {
            positional,
            named,
        })
    }

    fn binary(
        &mut self,
        template: &Arc<Template>,
        operator: &BinaryOp,
        left: &Expression,
        right: &Expression,
        line: usize,
    ) -> Result<Value, CobbleError> {
        match operator {
            BinaryOp::Or => {
                let result = self.evaluate(template, left)?.is_truthy() || self.evaluate(template, right)?.is_truthy();
                Ok(Value::Bool(result))
            }
            BinaryOp::And => {
                let result = self.evaluate(template, left)?.is_truthy() && self.evaluate(template, right)?.is_truthy();
                Ok(Value::Bool(result))
            }
            BinaryOp::Custom {
                symbol,
                operation,
            } => {
                let left = self.evaluate(template, left)?;
                let right = self.evaluate(template, right)?;
                operation.apply(&left, &right).map_err(|e| {
                    let message = format!("Operator [{}] failed: {}", symbol, e);
                    CobbleError::wrap(e, message, template.name(), line)
                })
            }
            builtin => {
                let left = self.evaluate(template, left)?;
                let right = self.evaluate(template, right)?;
                apply_builtin(builtin, &left, &right)
                    .map_err(|e| CobbleError::render(e.to_string(), template.name(), line))
            }
        }
    }

    fn get_attribute(
        &mut self,
        template: &Arc<Template>,
        object: &Expression,
        attribute: &Expression,
        args: Option<&Arguments>,
        line: usize,
    ) -> Result<Value, CobbleError> {
        // `alias.macro(...)` calls into an aliased import
        if let (
            Expression::Variable {
                name,
                ..
            },
            Some(args),
        ) = (object, args)
        {
            if let Some(imported) = self.aliases.get(name).cloned() {
                let macro_name = self.evaluate(template, attribute)?.to_string();
                let Some(definition) = imported.macro_definition(&macro_name).cloned() else {
                    return Err(CobbleError::render(
                        format!("Function or Macro [{}] does not exist.", macro_name),
                        template.name(),
                        line,
                    ));
                };
                let args = self.evaluate_call_args(template, args)?;
                return self.call_macro(&imported, &definition, args, line);
            }
        }

        let instance = self.evaluate(template, object)?;
        let attribute = self.evaluate(template, attribute)?;
        let positional = match args {
            Some(args) => Some(self.evaluate_call_args(template, args)?.positional),
            None => None,
        };

        if instance.is_null() {
            if !self.strict_variables {
                return Ok(Value::Null);
            }
            return Err(match object {
                Expression::Variable {
                    name,
                    ..
                } => CobbleError::attribute_not_found(
                    name.as_str(),
                    format!(
                        "Root attribute [{}] does not exist or can not be accessed and strict variables is set to true.",
                        name
                    ),
                    &self.scope.visible_names(),
                    template.name(),
                    line,
                ),
                _ => CobbleError::attribute_not_found(
                    attribute.to_string(),
                    "Attempt to get attribute of null object and strict variables is set to true.",
                    &[],
                    template.name(),
                    line,
                ),
            });
        }

        let request = AttributeRequest {
            instance: &instance,
            attribute: &attribute,
            args: positional.as_deref(),
            strict_variables: self.strict_variables,
            template: template.name(),
            line,
        };
        match self.engine.resolvers.resolve(&request)? {
            Some(value) => Ok(value),
            None if self.strict_variables => {
                let available: Vec<String> = match &instance {
                    Value::Map(map) => map.keys().map(Value::to_string).collect(),
                    _ => Vec::new(),
                };
                Err(CobbleError::attribute_not_found(
                    attribute.to_string(),
                    format!(
                        "Attribute [{}] of [{}] does not exist or can not be accessed and strict variables is set to true.",
                        attribute,
                        instance.type_name()
                    ),
                    &available,
                    template.name(),
                    line,
                ))
            }
            None => Ok(Value::Null),
        }
    }

    fn function_call(
        &mut self,
        template: &Arc<Template>,
        name: &str,
        args: &Arguments,
        line: usize,
    ) -> Result<Value, CobbleError> {
        if let Some(function) = self.engine.registry.function(name).cloned() {
            let call = self.evaluate_call_args(template, args)?;
            let names = function.argument_names();
            let bound = Args::bind(names.as_deref(), call.positional, call.named)
                .map_err(|message| CobbleError::render(message, template.name(), line))?;
            let context = self.call_context(template, line);
            return function.call(&bound, &context).map_err(|e| {
                let message = format!("Function [{}] failed: {}", name, e);
                CobbleError::wrap(e, message, template.name(), line)
            });
        }

        let call = self.evaluate_call_args(template, args)?;
        if let Some((imported, macro_name)) = self.from_macros.get(name).cloned() {
            if let Some(definition) = imported.macro_definition(&macro_name).cloned() {
                return self.call_macro(&imported, &definition, call, line);
            }
        }
        self.call_macro_by_name(template, name, false, call, line)
    }

    fn apply_filter(
        &mut self,
        template: &Arc<Template>,
        input: &Expression,
        invocation: &Invocation,
        line: usize,
    ) -> Result<Value, CobbleError> {
        let Some(filter) = self.engine.registry.filter(&invocation.name).cloned() else {
            return Err(CobbleError::render(
                format!("Filter [{}] does not exist.", invocation.name),
                template.name(),
                line,
            ));
        };
        let input = if filter.tolerates_missing_input() {
            self.evaluate_lenient(template, input)?
        } else {
            self.evaluate(template, input)?
        };
        let call = self.evaluate_call_args(template, &invocation.args)?;
        let names = filter.argument_names();
        let args = Args::bind(names.as_deref(), call.positional, call.named)
            .map_err(|message| CobbleError::render(message, template.name(), line))?;
        let context = self.call_context(template, line);
        filter.apply(&input, &args, &context).map_err(|e| {
            let message = format!("Filter [{}] failed: {}", invocation.name, e);
            CobbleError::wrap(e, message, template.name(), line)
        })
    }

    fn apply_test(
        &mut self,
        template: &Arc<Template>,
        input: &Expression,
        invocation: &Invocation,
        negated: bool,
        line: usize,
    ) -> Result<Value, CobbleError> {
        let Some(test) = self.engine.registry.test(&invocation.name).cloned() else {
            return Err(CobbleError::render(
                format!("Test [{}] does not exist.", invocation.name),
                template.name(),
                line,
            ));
        };
        let input = if test.tolerates_missing_input() {
            self.evaluate_lenient(template, input)?
        } else {
            self.evaluate(template, input)?
        };
        let call = self.evaluate_call_args(template, &invocation.args)?;
        let names = test.argument_names();
        let args = Args::bind(names.as_deref(), call.positional, call.named)
            .map_err(|message| CobbleError::render(message, template.name(), line))?;
        let context = self.call_context(template, line);
        let passed = test.apply(&input, &args, &context).map_err(|e| {
            let message = format!("Test [{}] failed: {}", invocation.name, e);
            CobbleError::wrap(e, message, template.name(), line)
        })?;
        Ok(Value::Bool(passed != negated))
    }

    /// `parent()`: the enclosing block as the next ancestor defines it.
    fn parent_block(
        &mut self,
        template: &Arc<Template>,
        block: Option<&str>,
        line: usize,
    ) -> Result<Value, CobbleError> {
        let Some(parent) = self.hierarchy.parent().cloned() else {
            return Err(CobbleError::render(
                "Can not use parent function if template does not extend another template.",
                template.name(),
                line,
            ));
        };
        let Some(block) = block else {
            return Err(CobbleError::render(
                "The parent function can only be used inside a block.",
                template.name(),
                line,
            ));
        };
        let mut buffer = OrderedWriter::buffer(self.budget.clone());
        self.hierarchy.ascend();
        let result = self.render_block(&parent, block, true, &mut buffer);
        self.hierarchy.descend();
        result?;
        Ok(Value::safe(buffer.into_string()?))
    }
}

fn apply_builtin(operator: &BinaryOp, left: &Value, right: &Value) -> anyhow::Result<Value> {
    match operator {
        BinaryOp::Or => Ok(Value::Bool(left.is_truthy() || right.is_truthy())),
        BinaryOp::And => Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
        BinaryOp::Equals => Ok(Value::Bool(ops::equals(left, right))),
        BinaryOp::NotEquals => Ok(Value::Bool(!ops::equals(left, right))),
        BinaryOp::Contains => ops::contains(left, right).map(Value::Bool),
        BinaryOp::Greater => ops::compare(Comparison::Greater, left, right).map(Value::Bool),
        BinaryOp::GreaterEqual => ops::compare(Comparison::GreaterEqual, left, right).map(Value::Bool),
        BinaryOp::Less => ops::compare(Comparison::Less, left, right).map(Value::Bool),
        BinaryOp::LessEqual => ops::compare(Comparison::LessEqual, left, right).map(Value::Bool),
        BinaryOp::Add => ops::arithmetic(Arithmetic::Add, left, right),
        BinaryOp::Subtract => ops::arithmetic(Arithmetic::Subtract, left, right),
        BinaryOp::Multiply => ops::arithmetic(Arithmetic::Multiply, left, right),
        BinaryOp::Divide => ops::arithmetic(Arithmetic::Divide, left, right),
        BinaryOp::Modulus => ops::arithmetic(Arithmetic::Modulus, left, right),
        BinaryOp::Range => ops::range(left, right, None),
        BinaryOp::Concatenate => Ok(concatenate(left, right)),
        BinaryOp::Custom {
            operation,
            ..
        } => operation.apply(left, right),
    }
}

fn concatenate(left: &Value, right: &Value) -> Value {
    let mut text = left.to_output_string();
    text.push_str(&right.to_output_string());
    Value::from(text)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::Engine;
    use crate::loader::MemoryLoader;
    use crate::template::Variables;

    fn render(source: &str, variables: Variables) -> Result<String, CobbleError> {
        let engine = Engine::builder().build()?;
        engine.get_literal_template(source)?.render(variables)
    }

    #[test]
    fn test_short_circuit_skips_failing_operand() -> anyhow::Result<()> {
        let engine = Engine::builder().strict_variables(true).build()?;
        let template = engine.get_literal_template("{{ false and missing }}|{{ true or missing }}")?;
        assert_eq!(template.render(Variables::new())?, "false|true");
        Ok(())
    }

    #[test]
    fn test_arithmetic_and_concatenation() -> anyhow::Result<()> {
        assert_eq!(render("{{ 1 + 2 * 3 }}~{{ 'a' ~ 1 }}", Variables::new())?, "7~a1");
        assert_eq!(render("{{ 10 / 4 }} {{ 7 % 4 }}", Variables::new())?, "2 3");
        Ok(())
    }

    #[test]
    fn test_ternary_and_unary() -> anyhow::Result<()> {
        let variables = Variables::new().with("flag", true).with("n", 3i64);
        assert_eq!(render("{{ flag ? 'y' : 'n' }}{{ -n }}{{ not flag }}", variables)?, "y-3false");
        Ok(())
    }

    #[test]
    fn test_collection_literals() -> anyhow::Result<()> {
        assert_eq!(render("{{ [1, 2][1] }}{{ {'a': 'x'}.a }}", Variables::new())?, "2x");
        assert_eq!(render("{{ [1, 2] contains 2 }}", Variables::new())?, "true");
        Ok(())
    }

    #[test]
    fn test_missing_attribute_of_null_is_null_in_lenient_mode() -> anyhow::Result<()> {
        assert_eq!(render("[{{ user.name.first }}]", Variables::new())?, "[]");
        Ok(())
    }

    #[test]
    fn test_strict_root_lookup_suggests_names() -> anyhow::Result<()> {
        let engine = Engine::builder().strict_variables(true).build()?;
        let template = engine.get_literal_template("{{ usr }}")?;
        let err = template.render(Variables::new().with("user", "Ada"));
        match err {
            Err(CobbleError::AttributeNotFound {
                attribute,
                suggestions,
                ..
            }) => {
                assert_eq!(attribute, "usr");
                assert!(suggestions.contains(&"user".to_string()));
            }
            other => panic!("expected AttributeNotFound, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_unknown_filter_and_test() -> anyhow::Result<()> {
        let err = render("{{ 'x' | nope }}", Variables::new()).err().map(|e| e.to_string());
        assert!(err.as_deref().is_some_and(|e| e.starts_with("Filter [nope] does not exist.")), "got {err:?}");
        let err = render("{{ 'x' is nope }}", Variables::new()).err().map(|e| e.to_string());
        assert!(err.as_deref().is_some_and(|e| e.starts_with("Test [nope] does not exist.")), "got {err:?}");
        Ok(())
    }

    #[test]
    fn test_aliased_import_call() -> anyhow::Result<()> {
        let engine = Engine::builder()
            .loader(
                MemoryLoader::new()
                    .with_template("forms", "{% macro input(name, type='text') %}<input name=\"{{ name }}\" type=\"{{ type }}\">{% endmacro %}")
                    .with_template("page", "{% import \"forms\" as f %}{{ f.input('q') }}"),
            )
            .build()?;
        assert_eq!(engine.get_template("page")?.render(Variables::new())?, "<input name=\"q\" type=\"text\">");
        Ok(())
    }

    #[test]
    fn test_block_function() -> anyhow::Result<()> {
        let output = render("{% block title %}T{% endblock %}|{{ block('title') }}", Variables::new())?;
        assert_eq!(output, "T|T");
        Ok(())
    }

    #[test]
    fn test_parent_without_extends_fails() {
        let err = render("{% block a %}{{ parent() }}{% endblock %}", Variables::new());
        assert!(matches!(err, Err(CobbleError::Render { .. })));
    }

    #[test]
    fn test_variables_from_hashmap() -> anyhow::Result<()> {
        let mut variables = HashMap::new();
        variables.insert("n".to_string(), Value::Long(1));
        assert_eq!(render("{{ n + 1 }}", Variables::from(variables))?, "2");
        Ok(())
    }
}
