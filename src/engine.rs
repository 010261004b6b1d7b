//! The engine: compilation pipeline, caches and collaborators.
//!
//! An [`Engine`] is built once through [`EngineBuilder`] and then shared freely;
//! cloning it is cheap and every clone sees the same caches. Loading a template
//! runs loader, lexer and parser once per cache key, then hands out the same
//! `Arc<Template>` to every caller.
//!
//! # Examples
//!
//! ```rust,no_run
//! use cobble::{Engine, EngineConfig, MemoryLoader, Variables};
//!
//! # fn main() -> cobble::Result<()> {
//! let config = EngineConfig::from_toml_str("strict_variables = true")?;
//! let engine = Engine::builder()
//!     .from_config(config)
//!     .loader(MemoryLoader::new().with_template("hello", "Hello {{ name }}!"))
//!     .build()?;
//!
//! let output = engine.get_template("hello")?.render(Variables::new().with("name", "world"))?;
//! assert_eq!(output, "Hello world!");
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::attributes::{
    AttributeResolver, AttributeResolverChain, BlacklistMethodAccessValidator, MemberCache, MemberResolver,
    MethodAccessValidator, NoOpMethodAccessValidator,
};
use crate::cache::{ComputeCache, ConcurrentCache, NoOpCache, TagCacheKey, TemplateCacheKey};
use crate::config::EngineConfig;
use crate::core::CobbleError;
use crate::executor::Executor;
use crate::extension::{CoreExtension, EscaperExtension, Extension, ExtensionRegistry};
use crate::lexer::{Lexer, Syntax};
use crate::loader::{Loader, MemoryLoader};
use crate::parser::{Parser, ParserOptions};
use crate::template::Template;

/// Render-time settings copied out of the configuration.
#[derive(Debug, Clone)]
pub(crate) struct EngineOptions {
    pub strict_variables: bool,
    pub default_locale: String,
    pub max_rendered_size: i64,
}

/// State shared by an engine, its templates and every render.
pub(crate) struct EngineInner {
    pub lexer: Lexer,
    pub parser: Parser,
    pub registry: Arc<ExtensionRegistry>,
    pub resolvers: AttributeResolverChain,
    pub member_cache: Arc<MemberCache>,
    pub loader: Arc<dyn Loader>,
    pub template_cache: Arc<dyn ComputeCache<TemplateCacheKey, Arc<Template>>>,
    pub tag_cache: Arc<dyn ComputeCache<TagCacheKey, String>>,
    pub executor: Option<Arc<dyn Executor>>,
    pub options: EngineOptions,
    /// Whether the missing-executor notice has been logged
    pub parallel_warned: AtomicBool,
}

impl EngineInner {
    /// Load, compile and cache `name`.
    pub fn load_template(self: &Arc<Self>, name: &str) -> Result<Arc<Template>, CobbleError> {
        let key = TemplateCacheKey::Named(self.loader.cache_key(name));
        self.template_cache.compute_if_absent(&key, &mut || {
            let source = self.loader.load(name)?;
            self.compile(name, &source).map(Arc::new)
        })
    }

    pub fn compile(self: &Arc<Self>, name: &str, source: &str) -> Result<Template, CobbleError> {
        tracing::debug!(target: "cobble::engine", template = name, "compiling template");
        let stream = self.lexer.tokenize(source, name)?;
        let parsed = self.parser.parse(stream)?;
        Ok(Template::compiled(name, parsed, Arc::downgrade(self)))
    }
}

impl fmt::Debug for EngineInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineInner")
            .field("registry", &self.registry)
            .field("options", &self.options)
            .field("cached_templates", &self.template_cache.len())
            .field("parallel", &self.executor.is_some())
            .finish()
    }
}

/// A configured template engine.
#[derive(Debug, Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// The compiled template named `name`, loading it on first use.
    ///
    /// # Errors
    ///
    /// [`CobbleError::TemplateNotFound`] when the loader has no such template,
    /// [`CobbleError::Lex`] or [`CobbleError::Parse`] when it does not compile.
    pub fn get_template(&self, name: &str) -> Result<Arc<Template>, CobbleError> {
        self.inner.load_template(name)
    }

    /// Compile `source` itself, bypassing the loader. The source doubles as the
    /// template's name.
    pub fn get_literal_template(&self, source: &str) -> Result<Arc<Template>, CobbleError> {
        let key = TemplateCacheKey::Literal(source.to_string());
        self.inner.template_cache.compute_if_absent(&key, &mut || self.inner.compile(source, source).map(Arc::new))
    }

    pub fn template_cache(&self) -> &Arc<dyn ComputeCache<TemplateCacheKey, Arc<Template>>> {
        &self.inner.template_cache
    }

    pub fn tag_cache(&self) -> &Arc<dyn ComputeCache<TagCacheKey, String>> {
        &self.inner.tag_cache
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.inner.registry
    }

    /// Member lookups memoised by the attribute resolver.
    pub fn member_cache(&self) -> &Arc<MemberCache> {
        &self.inner.member_cache
    }
}

/// Assembles an [`Engine`].
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    loader: Option<Arc<dyn Loader>>,
    extensions: Vec<Arc<dyn Extension>>,
    escaper: Option<EscaperExtension>,
    executor: Option<Arc<dyn Executor>>,
    template_cache: Option<Arc<dyn ComputeCache<TemplateCacheKey, Arc<Template>>>>,
    tag_cache: Option<Arc<dyn ComputeCache<TagCacheKey, String>>>,
    validator: Option<Arc<dyn MethodAccessValidator>>,
    resolvers: Vec<Arc<dyn AttributeResolver>>,
}

impl EngineBuilder {
    /// Replace every data setting with `config`. Collaborators are kept.
    pub fn from_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn loader(mut self, loader: impl Loader + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    pub fn shared_loader(mut self, loader: Arc<dyn Loader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Install `extension` after the built-in ones; its names override theirs.
    pub fn extension(mut self, extension: impl Extension + 'static) -> Self {
        self.extensions.push(Arc::new(extension));
        self
    }

    /// Replace the default `escape` / `raw` extension, e.g. to add strategies.
    pub fn escaper(mut self, escaper: EscaperExtension) -> Self {
        self.escaper = Some(escaper);
        self
    }

    pub fn executor(mut self, executor: impl Executor + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    pub fn template_cache(mut self, cache: Arc<dyn ComputeCache<TemplateCacheKey, Arc<Template>>>) -> Self {
        self.template_cache = Some(cache);
        self
    }

    pub fn tag_cache(mut self, cache: Arc<dyn ComputeCache<TagCacheKey, String>>) -> Self {
        self.tag_cache = Some(cache);
        self
    }

    pub fn method_access_validator(mut self, validator: impl MethodAccessValidator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Put `resolver` ahead of the built-in attribute resolvers. Later calls go
    /// further ahead.
    pub fn attribute_resolver(mut self, resolver: impl AttributeResolver + 'static) -> Self {
        self.resolvers.push(Arc::new(resolver));
        self
    }

    pub fn strict_variables(mut self, strict: bool) -> Self {
        self.config.strict_variables = strict;
        self
    }

    pub fn default_locale(mut self, locale: impl Into<String>) -> Self {
        self.config.default_locale = locale.into();
        self
    }

    pub fn max_rendered_size(mut self, max: i64) -> Self {
        self.config.max_rendered_size = max;
        self
    }

    pub fn greedy_match_method(mut self, greedy: bool) -> Self {
        self.config.greedy_match_method = greedy;
        self
    }

    pub fn allow_unsafe_methods(mut self, allow: bool) -> Self {
        self.config.allow_unsafe_methods = allow;
        self
    }

    pub fn cache_active(mut self, active: bool) -> Self {
        self.config.cache_active = active;
        self
    }

    pub fn new_line_trimming(mut self, trim: bool) -> Self {
        self.config.new_line_trimming = trim;
        self
    }

    pub fn auto_escaping(mut self, escape: bool) -> Self {
        self.config.auto_escaping = escape;
        self
    }

    pub fn default_escaping_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.config.default_escaping_strategy = strategy.into();
        self
    }

    pub fn literal_decimals_treated_as_integers(mut self, enabled: bool) -> Self {
        self.config.literal_decimals_treated_as_integers = enabled;
        self
    }

    pub fn syntax(mut self, syntax: crate::config::SyntaxConfig) -> Self {
        self.config.syntax = syntax;
        self
    }

    /// # Errors
    ///
    /// [`CobbleError::Config`] when the delimiters are empty or ambiguous.
    pub fn build(self) -> Result<Engine, CobbleError> {
        let config = self.config;
        let syntax = Arc::new(Syntax::new(&config.syntax, config.new_line_trimming)?);

        let escaper = self.escaper.unwrap_or_else(|| EscaperExtension::new(config.default_escaping_strategy.clone()));
        let mut extensions: Vec<Arc<dyn Extension>> = vec![Arc::new(CoreExtension), Arc::new(escaper)];
        extensions.extend(self.extensions);
        let registry = Arc::new(ExtensionRegistry::new(&extensions));

        let lexer = Lexer::new(syntax, registry.operator_symbols());
        let parser = Parser::new(
            registry.clone(),
            ParserOptions {
                literal_decimals_treated_as_integers: config.literal_decimals_treated_as_integers,
                auto_escaping: config.auto_escaping,
            },
        );

        let validator: Arc<dyn MethodAccessValidator> = match self.validator {
            Some(validator) => validator,
            None if config.allow_unsafe_methods => Arc::new(NoOpMethodAccessValidator),
            None => Arc::new(BlacklistMethodAccessValidator::default()),
        };
        let member = MemberResolver::new(validator, config.greedy_match_method);
        let member_cache = member.cache().clone();
        let mut resolvers = AttributeResolverChain::standard(member);
        for resolver in self.resolvers {
            resolvers.prepend(resolver);
        }

        let template_cache: Arc<dyn ComputeCache<TemplateCacheKey, Arc<Template>>> = match self.template_cache {
            Some(cache) => cache,
            None if config.cache_active => Arc::new(ConcurrentCache::new("templates")),
            None => Arc::new(NoOpCache::new()),
        };
        let tag_cache: Arc<dyn ComputeCache<TagCacheKey, String>> = match self.tag_cache {
            Some(cache) => cache,
            None if config.cache_active => Arc::new(ConcurrentCache::new("tags")),
            None => Arc::new(NoOpCache::new()),
        };

        tracing::debug!(
            target: "cobble::engine",
            strict_variables = config.strict_variables,
            cache_active = config.cache_active,
            parallel = self.executor.is_some(),
            "engine built"
        );

        Ok(Engine {
            inner: Arc::new(EngineInner {
                lexer,
                parser,
                registry,
                resolvers,
                member_cache,
                loader: self.loader.unwrap_or_else(|| Arc::new(MemoryLoader::new())),
                template_cache,
                tag_cache,
                executor: self.executor,
                options: EngineOptions {
                    strict_variables: config.strict_variables,
                    default_locale: config.default_locale,
                    max_rendered_size: config.max_rendered_size,
                },
                parallel_warned: AtomicBool::new(false),
            }),
        })
    }
}

impl fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .field("extensions", &self.extensions.len())
            .field("executor", &self.executor.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Variables;

    #[test]
    fn test_templates_are_cached_by_name() -> anyhow::Result<()> {
        let engine = Engine::builder().loader(MemoryLoader::new().with_template("a", "A")).build()?;
        let first = engine.get_template("a")?;
        let second = engine.get_template("a")?;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(engine.template_cache().stats().computes, 1);
        Ok(())
    }

    #[test]
    fn test_cache_inactive_recompiles() -> anyhow::Result<()> {
        let engine =
            Engine::builder().cache_active(false).loader(MemoryLoader::new().with_template("a", "A")).build()?;
        let first = engine.get_template("a")?;
        let second = engine.get_template("a")?;
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(engine.template_cache().is_empty());
        Ok(())
    }

    #[test]
    fn test_missing_template() -> anyhow::Result<()> {
        let engine = Engine::builder().build()?;
        let err = engine.get_template("nope");
        assert!(matches!(err, Err(CobbleError::TemplateNotFound { ref name }) if name == "nope"));
        Ok(())
    }

    #[test]
    fn test_literal_template_is_named_by_source() -> anyhow::Result<()> {
        let engine = Engine::builder().build()?;
        let template = engine.get_literal_template("{{ 'x' | upper }}")?;
        assert_eq!(template.name(), "{{ 'x' | upper }}");
        assert_eq!(template.render(Variables::new())?, "X");
        Ok(())
    }

    #[test]
    fn test_invalid_syntax_is_rejected() {
        let syntax = crate::config::SyntaxConfig {
            print_open: String::new(),
            ..Default::default()
        };
        assert!(matches!(Engine::builder().syntax(syntax).build(), Err(CobbleError::Config { .. })));
    }

    #[test]
    fn test_template_outlives_engine_handle() -> anyhow::Result<()> {
        let template = {
            let engine = Engine::builder().build()?;
            engine.get_literal_template("hi")?
        };
        assert!(matches!(template.render(Variables::new()), Err(CobbleError::Render { .. })));
        Ok(())
    }
}
