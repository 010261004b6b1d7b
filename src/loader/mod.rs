//! Template sources.
//!
//! A [`Loader`] turns a template name into source text and a cache key. The engine
//! resolves `./x` and `../x` names against the name of the template that refers to
//! them before asking the loader.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::core::CobbleError;

/// Supplies template source by name.
pub trait Loader: Send + Sync {
    /// Read the source of `name`.
    ///
    /// # Errors
    ///
    /// [`CobbleError::TemplateNotFound`] when this loader has no such template.
    fn load(&self, name: &str) -> Result<String, CobbleError>;

    /// Key the compiled template is cached under.
    fn cache_key(&self, name: &str) -> String {
        name.to_string()
    }

    /// Resolve a relative reference made from inside `anchor`. `None` leaves
    /// `relative` as it is.
    fn resolve_relative_path(&self, relative: &str, anchor: &str) -> Option<String> {
        resolve_relative(relative, anchor)
    }
}

/// Resolve `./x` and `../x` against the directory part of `anchor`.
pub fn resolve_relative(relative: &str, anchor: &str) -> Option<String> {
    if !relative.starts_with("./") && !relative.starts_with("../") {
        return None;
    }
    let mut segments: Vec<&str> = match anchor.rfind('/') {
        Some(end) => anchor[..end].split('/').filter(|s| !s.is_empty()).collect(),
        None => Vec::new(),
    };
    for segment in relative.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    let resolved = segments.join("/");
    Some(if anchor.starts_with('/') {
        format!("/{}", resolved)
    } else {
        resolved
    })
}

/// Templates held in memory, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    templates: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.templates.insert(name.into(), source.into());
    }
}

impl Loader for MemoryLoader {
    fn load(&self, name: &str) -> Result<String, CobbleError> {
        self.templates.get(name).cloned().ok_or_else(|| CobbleError::TemplateNotFound {
            name: name.to_string(),
        })
    }
}

/// Treats the name itself as the template source.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringLoader;

impl Loader for StringLoader {
    fn load(&self, name: &str) -> Result<String, CobbleError> {
        Ok(name.to_string())
    }

    fn resolve_relative_path(&self, _relative: &str, _anchor: &str) -> Option<String> {
        None
    }
}

/// Tries several loaders in order; the first that has the template wins.
#[derive(Clone, Default)]
pub struct DelegatingLoader {
    loaders: Vec<Arc<dyn Loader>>,
}

impl DelegatingLoader {
    pub fn new(loaders: Vec<Arc<dyn Loader>>) -> Self {
        Self {
            loaders,
        }
    }

    pub fn with_loader(mut self, loader: impl Loader + 'static) -> Self {
        self.loaders.push(Arc::new(loader));
        self
    }
}

impl Loader for DelegatingLoader {
    fn load(&self, name: &str) -> Result<String, CobbleError> {
        for loader in &self.loaders {
            match loader.load(name) {
                Err(CobbleError::TemplateNotFound {
                    ..
                }) => continue,
                other => return other,
            }
        }
        Err(CobbleError::TemplateNotFound {
            name: name.to_string(),
        })
    }

    /// Combines every delegate's key, since any of them may end up serving `name`.
    fn cache_key(&self, name: &str) -> String {
        self.loaders.iter().map(|l| l.cache_key(name)).collect::<Vec<_>>().join("\u{1f}")
    }

    fn resolve_relative_path(&self, relative: &str, anchor: &str) -> Option<String> {
        self.loaders.iter().find_map(|l| l.resolve_relative_path(relative, anchor))
    }
}

impl fmt::Debug for DelegatingLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatingLoader").field("loaders", &self.loaders.len()).finish()
    }
}
