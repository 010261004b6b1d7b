//! Compiled templates and the public rendering API.
//!
//! A [`Template`] is immutable once compiled and is shared through `Arc` by the
//! template cache, by every render that uses it, and by templates that extend,
//! include, import or embed it. All per-render state lives in an
//! [`EvaluationContext`], so concurrent renders of the same template never
//! interfere.
//!
//! # Examples
//!
//! ```rust,no_run
//! use cobble::{Engine, MemoryLoader, Variables};
//!
//! # fn main() -> cobble::Result<()> {
//! let engine = Engine::builder()
//!     .loader(
//!         MemoryLoader::new()
//!             .with_template("base", "<title>{% block title %}Site{% endblock %}</title>")
//!             .with_template("page", "{% extends \"base\" %}{% block title %}{{ name }}{% endblock %}"),
//!     )
//!     .build()?;
//!
//! let page = engine.get_template("page")?;
//! let html = page.render(Variables::new().with("name", "Home"))?;
//! assert_eq!(html, "<title>Home</title>");
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::core::{CobbleError, ErrorLocation};
use crate::engine::EngineInner;
use crate::node::{BlockDefinition, Body, MacroDefinition};
use crate::parser::ParsedTemplate;
use crate::render::EvaluationContext;
use crate::value::Value;
use crate::writer::{OrderedWriter, OutputBudget};

/// Variables supplied by the caller of a render.
#[derive(Debug, Clone, Default)]
pub struct Variables(HashMap<String, Value>);

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn into_inner(self) -> HashMap<String, Value> {
        self.0
    }
}

impl From<HashMap<String, Value>> for Variables {
    fn from(variables: HashMap<String, Value>) -> Self {
        Self(variables)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Variables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A JSON object becomes one variable per member.
impl TryFrom<serde_json::Value> for Variables {
    type Error = CobbleError;

    fn try_from(json: serde_json::Value) -> Result<Self, Self::Error> {
        match json {
            serde_json::Value::Object(members) => Ok(members.into_iter().collect()),
            serde_json::Value::Null => Ok(Self::default()),
            other => Err(CobbleError::Render {
                message: format!("Template variables must be a JSON object, got {}", other),
                location: Box::new(ErrorLocation::unknown()),
                source: None,
            }),
        }
    }
}

/// A compiled template.
#[derive(Clone)]
pub struct Template {
    name: String,
    body: Arc<Body>,
    blocks: HashMap<String, Arc<BlockDefinition>>,
    macros: HashMap<String, Arc<MacroDefinition>>,
    engine: Weak<EngineInner>,
    /// Stand-in parent of an embedded template; its root body renders in full
    embed_root: bool,
}

impl Template {
    pub(crate) fn compiled(name: &str, parsed: ParsedTemplate, engine: Weak<EngineInner>) -> Self {
        Self {
            name: name.to_string(),
            body: Arc::new(parsed.body),
            blocks: parsed.blocks,
            macros: parsed.macros,
            engine,
            embed_root: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_block(&self, name: &str) -> bool {
        self.blocks.contains_key(name)
    }

    pub fn has_macro(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    /// Names of the blocks this template defines itself, sorted.
    pub fn block_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.blocks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub(crate) fn body(&self) -> &Body {
        &self.body
    }

    pub(crate) fn block(&self, name: &str) -> Option<&Arc<BlockDefinition>> {
        self.blocks.get(name)
    }

    pub(crate) fn macro_definition(&self, name: &str) -> Option<&Arc<MacroDefinition>> {
        self.macros.get(name)
    }

    /// Whether the root body skips output once a parent has been declared.
    pub(crate) fn filters_root(&self) -> bool {
        self.body.only_inheritance_safe && !self.embed_root
    }

    /// A copy with `overrides` replacing same-named blocks, leaving `self` untouched.
    pub(crate) fn with_overrides(&self, overrides: &[Arc<BlockDefinition>]) -> Self {
        let mut copy = self.clone();
        for block in overrides {
            copy.blocks.insert(block.name.clone(), block.clone());
        }
        copy
    }

    /// The stand-in parent an embed renders its overrides against.
    pub(crate) fn as_embed_root(&self) -> Self {
        Self {
            embed_root: true,
            ..self.clone()
        }
    }

    fn engine(&self) -> Result<Arc<EngineInner>, CobbleError> {
        self.engine.upgrade().ok_or_else(|| CobbleError::Render {
            message: format!("The engine that compiled template [{}] has been dropped", self.name),
            location: Box::new(ErrorLocation::template(&self.name)),
            source: None,
        })
    }

    fn context(self: &Arc<Self>, variables: Variables, locale: Option<&str>) -> Result<EvaluationContext, CobbleError> {
        let engine = self.engine()?;
        let locale = locale.unwrap_or(engine.options.default_locale.as_str()).to_string();
        let globals: HashMap<String, Value> = engine.registry.global_variables().iter().cloned().collect();
        let mut context = EvaluationContext::new(engine, self.clone(), locale.clone());
        context.scope.push_scope(HashMap::from([("locale".to_string(), Value::from(locale))]));
        context.scope.push_scope(globals);
        context.scope.push_scope(variables.into_inner());
        Ok(context)
    }

    /// Render into `writer`.
    ///
    /// # Errors
    ///
    /// Any evaluation error, [`CobbleError::OutputBudgetExceeded`] when the output
    /// grows past the configured maximum, or [`CobbleError::Write`] when `writer`
    /// refuses output.
    pub fn evaluate(
        self: &Arc<Self>,
        writer: &mut dyn fmt::Write,
        variables: Variables,
        locale: Option<&str>,
    ) -> Result<(), CobbleError> {
        let mut context = self.context(variables, locale)?;
        let mut out = OrderedWriter::new(writer, context.budget.clone());
        context.evaluate_template(self, &mut out)?;
        out.close()
    }

    /// Render a single block into `writer`.
    ///
    /// The template is evaluated first with its output discarded, so `extends`,
    /// `import` and `set` at the top level take effect; then the block is resolved
    /// from this template through its ancestors.
    pub fn evaluate_block(
        self: &Arc<Self>,
        block: &str,
        writer: &mut dyn fmt::Write,
        variables: Variables,
        locale: Option<&str>,
    ) -> Result<(), CobbleError> {
        let mut context = self.context(variables, locale)?;
        let budget = std::mem::replace(&mut context.budget, Arc::new(OutputBudget::unlimited()));
        let mut discard = OrderedWriter::discard(context.budget.clone());
        context.evaluate_template(self, &mut discard)?;
        discard.close()?;

        context.budget = budget;
        context.hierarchy.reset();
        let mut out = OrderedWriter::new(writer, context.budget.clone());
        context.render_block(self, block, false, &mut out)?;
        out.close()
    }

    pub fn render(self: &Arc<Self>, variables: Variables) -> Result<String, CobbleError> {
        let mut output = String::new();
        self.evaluate(&mut output, variables, None)?;
        Ok(output)
    }

    pub fn render_with_locale(self: &Arc<Self>, variables: Variables, locale: &str) -> Result<String, CobbleError> {
        let mut output = String::new();
        self.evaluate(&mut output, variables, Some(locale))?;
        Ok(output)
    }

    pub fn render_block(self: &Arc<Self>, block: &str, variables: Variables) -> Result<String, CobbleError> {
        let mut output = String::new();
        self.evaluate_block(block, &mut output, variables, None)?;
        Ok(output)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("blocks", &self.block_names())
            .field("macros", &self.macros.len())
            .finish()
    }
}
