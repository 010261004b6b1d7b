//! Resolution of `a.b`, `a[b]` and `a.b(args)`.
//!
//! Resolvers form an ordered chain and the first one that applies wins. Each
//! resolver answers `Ok(None)` when the instance is not its concern, so the next
//! resolver gets a turn; `Ok(Some(..))` ends the search, even when the resolved value
//! is null. The default chain is:
//!
//! 1. [`IndexedResolver`]: integer index into a list
//! 2. [`MapResolver`]: key lookup, coercing numeric keys to the map's key type
//! 3. [`DynamicResolver`]: host objects that answer for names themselves
//! 4. [`MemberResolver`]: methods and fields registered in a host type's
//!    [`TypeDescriptor`](crate::value::TypeDescriptor)
//!
//! Calls through an imported macro alias (`forms.input(...)`) never reach the chain;
//! the evaluator resolves them against the import table first.

mod member;

use std::fmt;
use std::sync::Arc;

use crate::core::CobbleError;
use crate::value::Value;

pub use member::{
    BlacklistMethodAccessValidator, MemberCache, MemberResolver, MethodAccessValidator,
    NoOpMethodAccessValidator,
};

/// A lookup as seen by one resolver.
#[derive(Debug, Clone, Copy)]
pub struct AttributeRequest<'a> {
    pub instance: &'a Value,
    pub attribute: &'a Value,
    /// `None` for `a.b` / `a[b]`, `Some` for `a.b(...)`
    pub args: Option<&'a [Value]>,
    pub strict_variables: bool,
    pub template: &'a str,
    pub line: usize,
}

impl AttributeRequest<'_> {
    /// The attribute as a member name.
    pub fn name(&self) -> String {
        self.attribute.to_string()
    }

    fn not_found(&self, message: impl Into<String>) -> CobbleError {
        CobbleError::attribute_not_found(self.name(), message, &[], self.template, self.line)
    }
}

/// The outcome of a successful lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAttribute(pub Value);

/// One link of the chain.
pub trait AttributeResolver: Send + Sync {
    /// `Ok(None)` when this resolver does not apply to the request.
    fn resolve(&self, request: &AttributeRequest<'_>) -> Result<Option<ResolvedAttribute>, CobbleError>;
}

/// Ordered resolvers, first applicable wins.
#[derive(Clone)]
pub struct AttributeResolverChain {
    resolvers: Vec<Arc<dyn AttributeResolver>>,
}

impl AttributeResolverChain {
    pub fn new(resolvers: Vec<Arc<dyn AttributeResolver>>) -> Self {
        Self {
            resolvers,
        }
    }

    /// The default chain around a member resolver.
    pub fn standard(member: MemberResolver) -> Self {
        Self::new(vec![
            Arc::new(IndexedResolver),
            Arc::new(MapResolver),
            Arc::new(DynamicResolver),
            Arc::new(member),
        ])
    }

    /// Put `resolver` ahead of the default ones.
    pub fn prepend(&mut self, resolver: Arc<dyn AttributeResolver>) {
        self.resolvers.insert(0, resolver);
    }

    pub fn resolve(&self, request: &AttributeRequest<'_>) -> Result<Option<Value>, CobbleError> {
        if request.instance.is_null() {
            return Ok(None);
        }
        for resolver in &self.resolvers {
            if let Some(ResolvedAttribute(value)) = resolver.resolve(request)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

impl fmt::Debug for AttributeResolverChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeResolverChain").field("resolvers", &self.resolvers.len()).finish()
    }
}

/// Integer index into a list.
pub struct IndexedResolver;

impl AttributeResolver for IndexedResolver {
    fn resolve(&self, request: &AttributeRequest<'_>) -> Result<Option<ResolvedAttribute>, CobbleError> {
        let Value::List(items) = request.instance else {
            return Ok(None);
        };
        if request.args.is_some() {
            return Ok(None);
        }
        let index = match request.attribute {
            Value::String(s) | Value::SafeString(s) => match s.parse::<i64>() {
                Ok(index) => index,
                Err(_) => return Ok(None),
            },
            other => match other.as_i64() {
                Some(index) if other.is_number() => index,
                _ => return Ok(None),
            },
        };

        let item = usize::try_from(index).ok().and_then(|i| items.get(i));
        match item {
            Some(item) => Ok(Some(ResolvedAttribute(item.clone()))),
            None if request.strict_variables => {
                Err(request.not_found(format!(
                    "Index out of bounds while accessing array with strict variables on. Index [{}], size [{}]",
                    index,
                    items.len()
                )))
            }
            None => Ok(Some(ResolvedAttribute(Value::Null))),
        }
    }
}

/// Key lookup in a map.
pub struct MapResolver;

impl AttributeResolver for MapResolver {
    fn resolve(&self, request: &AttributeRequest<'_>) -> Result<Option<ResolvedAttribute>, CobbleError> {
        let Value::Map(map) = request.instance else {
            return Ok(None);
        };
        if request.args.is_some() {
            return Ok(None);
        }
        if map.is_empty() && !request.strict_variables {
            return Ok(Some(ResolvedAttribute(Value::Null)));
        }

        let key = match map.keys().next() {
            Some(sample) if request.attribute.is_number() => coerce_key(request.attribute, sample),
            _ => request.attribute.clone(),
        };
        match map.get(&key) {
            Some(value) => Ok(Some(ResolvedAttribute(value.clone()))),
            None if request.strict_variables => Err(request.not_found(format!(
                "Attribute [{}] of [{}] does not exist or can not be accessed and strict variables is set to true.",
                request.attribute,
                request.instance.type_name()
            ))),
            None => Ok(Some(ResolvedAttribute(Value::Null))),
        }
    }
}

/// Convert a numeric key to the numeric representation the map's keys use.
fn coerce_key(key: &Value, sample: &Value) -> Value {
    match sample {
        Value::Int(_) => key.as_i64().and_then(|k| i32::try_from(k).ok()).map_or_else(|| key.clone(), Value::Int),
        Value::Long(_) => key.as_i64().map_or_else(|| key.clone(), Value::Long),
        Value::Float(_) => key.as_f64().map_or_else(|| key.clone(), |k| Value::Float(k as f32)),
        Value::Double(_) => key.as_f64().map_or_else(|| key.clone(), Value::Double),
        _ => key.clone(),
    }
}

/// Host objects that answer for names themselves.
pub struct DynamicResolver;

impl AttributeResolver for DynamicResolver {
    fn resolve(&self, request: &AttributeRequest<'_>) -> Result<Option<ResolvedAttribute>, CobbleError> {
        let Value::Object(object) = request.instance else {
            return Ok(None);
        };
        if !object.has_dynamic_attribute(request.attribute) {
            return Ok(None);
        }
        let args = request.args.unwrap_or(&[]);
        object
            .dynamic_attribute(request.attribute, args)
            .map(|value| Some(ResolvedAttribute(value)))
            .map_err(|e| {
                CobbleError::wrap(
                    e,
                    format!("Failed to resolve [{}] of [{}]", request.attribute, object.type_name()),
                    request.template,
                    request.line,
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueMap;

    fn request<'a>(instance: &'a Value, attribute: &'a Value, strict: bool) -> AttributeRequest<'a> {
        AttributeRequest {
            instance,
            attribute,
            args: None,
            strict_variables: strict,
            template: "test",
            line: 1,
        }
    }

    fn chain() -> AttributeResolverChain {
        AttributeResolverChain::standard(MemberResolver::default())
    }

    #[test]
    fn test_list_index() -> anyhow::Result<()> {
        let list = Value::list(["a", "b"]);
        assert_eq!(chain().resolve(&request(&list, &Value::Long(1), false))?, Some(Value::from("b")));
        assert_eq!(chain().resolve(&request(&list, &Value::from("0"), false))?, Some(Value::from("a")));
        assert_eq!(chain().resolve(&request(&list, &Value::Long(5), false))?, Some(Value::Null));
        let err = chain().resolve(&request(&list, &Value::Long(5), true));
        assert!(matches!(err, Err(CobbleError::AttributeNotFound { .. })));
        Ok(())
    }

    #[test]
    fn test_map_numeric_key_coercion() -> anyhow::Result<()> {
        let mut map = ValueMap::new();
        map.insert(Value::Int(1), Value::from("one"));
        let map = Value::from(map);
        assert_eq!(chain().resolve(&request(&map, &Value::Long(1), true))?, Some(Value::from("one")));
        Ok(())
    }

    #[test]
    fn test_map_absent_key() -> anyhow::Result<()> {
        let map = Value::map([("name", "Ada")]);
        assert_eq!(chain().resolve(&request(&map, &Value::from("age"), false))?, Some(Value::Null));
        let err = chain().resolve(&request(&map, &Value::from("age"), true)).err().map(|e| e.to_string());
        assert!(
            err.as_deref().is_some_and(|e| e.starts_with("Attribute [age] of [Map] does not exist")),
            "got: {err:?}"
        );
        Ok(())
    }

    #[test]
    fn test_null_instance_is_unresolved() -> anyhow::Result<()> {
        assert_eq!(chain().resolve(&request(&Value::Null, &Value::from("x"), true))?, None);
        Ok(())
    }

    #[test]
    fn test_dynamic_provider() -> anyhow::Result<()> {
        #[derive(Debug)]
        struct Env;
        impl crate::value::Object for Env {
            fn type_name(&self) -> &str {
                "Env"
            }
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
            fn has_dynamic_attribute(&self, name: &Value) -> bool {
                name.as_str().is_some_and(|n| n.starts_with("VAR_"))
            }
            fn dynamic_attribute(&self, name: &Value, _: &[Value]) -> anyhow::Result<Value> {
                Ok(Value::from(format!("value of {}", name)))
            }
        }
        let env = Value::object(Env);
        assert_eq!(
            chain().resolve(&request(&env, &Value::from("VAR_HOME"), false))?,
            Some(Value::from("value of VAR_HOME"))
        );
        assert_eq!(chain().resolve(&request(&env, &Value::from("other"), false))?, None);
        Ok(())
    }
}
