//! Nested variable scopes.
//!
//! Lookup walks from the innermost scope outwards. A *local* scope (macro bodies)
//! stops the walk, so a macro sees only its own arguments. A key explicitly bound
//! to null also stops the walk, which lets an inner `set x = null` shadow an outer
//! `x`.

use std::collections::HashMap;

use crate::value::Value;

#[derive(Debug, Clone, Default)]
struct Scope {
    variables: HashMap<String, Value>,
    local: bool,
}

/// Stack of name to value mappings; pushes and pops nest strictly.
#[derive(Debug, Clone, Default)]
pub struct ScopeChain {
    scopes: Vec<Scope>,
}

impl ScopeChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a scope that inherits lookups from the ones below it.
    pub fn push_scope(&mut self, variables: HashMap<String, Value>) {
        self.scopes.push(Scope {
            variables,
            local: false,
        });
    }

    /// Push a scope that hides everything below it.
    pub fn push_local_scope(&mut self, variables: HashMap<String, Value>) {
        self.scopes.push(Scope {
            variables,
            local: true,
        });
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(value) = scope.variables.get(name) {
                return Some(value);
            }
            if scope.local {
                break;
            }
        }
        None
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Bind in the innermost scope.
    pub fn put(&mut self, name: impl Into<String>, value: Value) {
        if self.scopes.is_empty() {
            self.push_scope(HashMap::new());
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.variables.insert(name.into(), value);
        }
    }

    /// Rebind `name` where it already lives, stopping at the first local scope;
    /// otherwise bind it in the innermost scope.
    pub fn set(&mut self, name: &str, value: Value) {
        for scope in self.scopes.iter_mut().rev() {
            if scope.local || scope.variables.contains_key(name) {
                scope.variables.insert(name.to_string(), value);
                return;
            }
        }
        self.put(name, value);
    }

    /// Every name visible from the innermost scope, for error suggestions.
    pub fn visible_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for scope in self.scopes.iter().rev() {
            for name in scope.variables.keys() {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            if scope.local {
                break;
            }
        }
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_inner_scope_shadows_outer() {
        let mut chain = ScopeChain::new();
        chain.push_scope(vars(&[("a", Value::Long(1)), ("b", Value::Long(2))]));
        chain.push_scope(vars(&[("a", Value::Long(10))]));
        assert_eq!(chain.get("a"), Some(&Value::Long(10)));
        assert_eq!(chain.get("b"), Some(&Value::Long(2)));
        chain.pop_scope();
        assert_eq!(chain.get("a"), Some(&Value::Long(1)));
    }

    #[test]
    fn test_local_scope_hides_outer() {
        let mut chain = ScopeChain::new();
        chain.push_scope(vars(&[("outer", Value::Long(1))]));
        chain.push_local_scope(vars(&[("param", Value::Null)]));
        assert_eq!(chain.get("outer"), None);
        assert_eq!(chain.get("param"), Some(&Value::Null));
        assert!(!chain.contains_key("outer"));
    }

    #[test]
    fn test_set_updates_existing_binding() {
        let mut chain = ScopeChain::new();
        chain.push_scope(vars(&[("count", Value::Long(0))]));
        chain.push_scope(HashMap::new());
        chain.set("count", Value::Long(5));
        chain.set("fresh", Value::Long(1));
        chain.pop_scope();
        assert_eq!(chain.get("count"), Some(&Value::Long(5)), "outer binding should be updated");
        assert_eq!(chain.get("fresh"), None, "new names live in the inner scope");
    }

    #[test]
    fn test_set_stops_at_local_scope() {
        let mut chain = ScopeChain::new();
        chain.push_scope(vars(&[("x", Value::Long(1))]));
        chain.push_local_scope(HashMap::new());
        chain.set("x", Value::Long(2));
        chain.pop_scope();
        assert_eq!(chain.get("x"), Some(&Value::Long(1)));
    }

    #[test]
    fn test_visible_names() {
        let mut chain = ScopeChain::new();
        chain.push_scope(vars(&[("title", Value::Null)]));
        chain.push_scope(vars(&[("name", Value::Null)]));
        assert_eq!(chain.visible_names(), vec!["name".to_string(), "title".to_string()]);
    }
}
