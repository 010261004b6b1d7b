//! Per-render mutable state.

use std::collections::HashMap;
use std::sync::Arc;

use super::hierarchy::Hierarchy;
use super::scope::ScopeChain;
use crate::cache::TagCacheKey;
use crate::core::CobbleError;
use crate::engine::EngineInner;
use crate::extension::CallContext;
use crate::template::Template;
use crate::writer::OutputBudget;

/// Everything one `evaluate` call mutates.
///
/// The context is cloned into each `parallel` region, so a region sees the
/// variables as they were when it started and its own bindings stay local to it.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    pub(crate) engine: Arc<EngineInner>,
    pub(crate) scope: ScopeChain,
    pub(crate) hierarchy: Hierarchy,
    pub(crate) strict_variables: bool,
    pub(crate) locale: String,
    pub(crate) budget: Arc<OutputBudget>,
    /// Templates imported without an alias, searched for macros
    pub(crate) imports: Vec<Arc<Template>>,
    /// `import "x" as alias`
    pub(crate) aliases: HashMap<String, Arc<Template>>,
    /// `from "x" import m as alias`: alias to (template, macro name)
    pub(crate) from_macros: HashMap<String, (Arc<Template>, String)>,
    /// `cache` keys whose bodies are being rendered by this context or the one it was cloned from
    pub(crate) computing: Vec<TagCacheKey>,
}

impl EvaluationContext {
    pub(crate) fn new(engine: Arc<EngineInner>, root: Arc<Template>, locale: String) -> Self {
        let strict_variables = engine.options.strict_variables;
        let budget = Arc::new(OutputBudget::new(engine.options.max_rendered_size));
        Self {
            engine,
            scope: ScopeChain::new(),
            hierarchy: Hierarchy::new(root),
            strict_variables,
            locale,
            budget,
            imports: Vec::new(),
            aliases: HashMap::new(),
            from_macros: HashMap::new(),
            computing: Vec::new(),
        }
    }

    pub fn strict_variables(&self) -> bool {
        self.strict_variables
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub(crate) fn call_context<'a>(&'a self, template: &'a Template, line: usize) -> CallContext<'a> {
        CallContext {
            template: template.name(),
            line,
            locale: &self.locale,
            strict_variables: self.strict_variables,
        }
    }

    /// Load a template referenced from `from`, resolving relative names.
    pub(crate) fn load_related(&self, from: &Template, name: &str) -> Result<Arc<Template>, CobbleError> {
        let resolved = self.engine.loader.resolve_relative_path(name, from.name());
        self.engine.load_template(resolved.as_deref().unwrap_or(name))
    }

    /// Run `render` with a fresh hierarchy rooted at `hierarchy` and fresh import
    /// tables, sharing the scope chain. `variables` are bound in a scope pushed for
    /// the duration.
    pub(crate) fn isolated<T>(
        &mut self,
        hierarchy: Hierarchy,
        variables: HashMap<String, crate::value::Value>,
        render: impl FnOnce(&mut Self) -> Result<T, CobbleError>,
    ) -> Result<T, CobbleError> {
        let saved_hierarchy = std::mem::replace(&mut self.hierarchy, hierarchy);
        let saved_imports = std::mem::take(&mut self.imports);
        let saved_aliases = std::mem::take(&mut self.aliases);
        let saved_from = std::mem::take(&mut self.from_macros);
        self.scope.push_scope(variables);

        let result = render(self);

        self.scope.pop_scope();
        self.hierarchy = saved_hierarchy;
        self.imports = saved_imports;
        self.aliases = saved_aliases;
        self.from_macros = saved_from;
        result
    }
}
