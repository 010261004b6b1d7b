//! Member lookup on host objects and built-in values.
//!
//! For an attribute `name` the resolver tries, case-insensitively, the methods
//! `get<Name>`, `is<Name>`, `has<Name>` and `name` whose arity matches the call,
//! then a field called `name`. The match is cached per (host type, name, argument
//! kinds), so repeated lookups on same-shaped values skip the search. Races on the
//! cache only duplicate the search.

use std::any::TypeId;
use std::sync::Arc;

use dashmap::DashMap;
use rust_decimal::Decimal;

use super::{AttributeRequest, AttributeResolver, ResolvedAttribute};
use crate::core::{CobbleError, ErrorLocation};
use crate::value::{ParamKind, TypeDescriptor, Value, ops};

/// Decides whether templates may touch a member of a host type.
pub trait MethodAccessValidator: Send + Sync {
    fn is_allowed(&self, descriptor: &TypeDescriptor, member: &str) -> bool;
}

/// Denies lifecycle and reflection members and every type marked internal.
#[derive(Debug, Clone)]
pub struct BlacklistMethodAccessValidator {
    denied: Vec<String>,
}

impl Default for BlacklistMethodAccessValidator {
    fn default() -> Self {
        Self {
            denied: ["getClass", "wait", "notify", "notifyAll", "finalize", "clone", "hashCode"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

impl BlacklistMethodAccessValidator {
    /// Also deny `member` on every type.
    pub fn deny(mut self, member: impl Into<String>) -> Self {
        self.denied.push(member.into());
        self
    }
}

impl MethodAccessValidator for BlacklistMethodAccessValidator {
    fn is_allowed(&self, descriptor: &TypeDescriptor, member: &str) -> bool {
        !descriptor.is_internal() && !self.denied.iter().any(|d| d.eq_ignore_ascii_case(member))
    }
}

/// Allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMethodAccessValidator;

impl MethodAccessValidator for NoOpMethodAccessValidator {
    fn is_allowed(&self, _: &TypeDescriptor, _: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemberKey {
    type_id: TypeId,
    name: String,
    args: Vec<Option<ParamKind>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Member {
    Method(usize),
    Field(usize),
}

/// Matches found per host type, shared by every render of an engine.
#[derive(Debug, Default)]
pub struct MemberCache {
    members: DashMap<MemberKey, Member>,
}

impl MemberCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn clear(&self) {
        self.members.clear();
    }
}

/// Resolves methods and fields of host objects, plus a few members of lists, maps
/// and strings (`size`, `isEmpty`, `contains`, ...).
pub struct MemberResolver {
    cache: Arc<MemberCache>,
    validator: Arc<dyn MethodAccessValidator>,
    greedy: bool,
}

impl Default for MemberResolver {
    fn default() -> Self {
        Self::new(Arc::new(BlacklistMethodAccessValidator::default()), false)
    }
}

impl MemberResolver {
    /// With `greedy`, any numeric argument matches any numeric parameter.
    pub fn new(validator: Arc<dyn MethodAccessValidator>, greedy: bool) -> Self {
        Self {
            cache: Arc::new(MemberCache::new()),
            validator,
            greedy,
        }
    }

    pub fn cache(&self) -> &Arc<MemberCache> {
        &self.cache
    }

    fn find(&self, descriptor: &TypeDescriptor, name: &str, args: &[Value]) -> Option<Member> {
        let kinds: Vec<Option<ParamKind>> = args.iter().map(ParamKind::of).collect();
        let key = MemberKey {
            type_id: descriptor.type_id(),
            name: name.to_string(),
            args: kinds.clone(),
        };
        if let Some(member) = self.cache.members.get(&key) {
            return Some(*member);
        }

        let member = candidate_names(name)
            .iter()
            .find_map(|candidate| self.find_method(descriptor, candidate, &kinds).map(Member::Method))
            .or_else(|| {
                if !args.is_empty() {
                    return None;
                }
                descriptor.fields().iter().position(|f| f.name == name).map(Member::Field)
            })?;
        self.cache.members.insert(key, member);
        Some(member)
    }

    /// Best overload of `name`: exact kinds first, then the least widening, then
    /// (greedy only) any numeric coercion.
    fn find_method(&self, descriptor: &TypeDescriptor, name: &str, kinds: &[Option<ParamKind>]) -> Option<usize> {
        let candidates: Vec<(usize, &[ParamKind])> = descriptor
            .methods()
            .iter()
            .enumerate()
            .filter(|(_, m)| m.name.eq_ignore_ascii_case(name) && m.params.len() == kinds.len())
            .map(|(i, m)| (i, m.params.as_slice()))
            .collect();

        let best = candidates
            .iter()
            .filter_map(|(i, params)| widening_cost(params, kinds).map(|cost| (cost, *i)))
            .min_by_key(|(cost, _)| *cost)
            .map(|(_, i)| i);
        if best.is_some() || !self.greedy {
            return best;
        }
        candidates
            .iter()
            .find(|(_, params)| {
                params.iter().zip(kinds).all(|(param, kind)| match kind {
                    None => !param.is_primitive(),
                    Some(kind) => {
                        *param == ParamKind::Any
                            || param == kind
                            || (param.numeric_rank().is_some() && kind.numeric_rank().is_some())
                    }
                })
            })
            .map(|(i, _)| *i)
    }

    fn resolve_object(
        &self,
        request: &AttributeRequest<'_>,
        object: &dyn crate::value::Object,
    ) -> Result<Option<ResolvedAttribute>, CobbleError> {
        let Some(descriptor) = object.descriptor() else {
            return Ok(None);
        };
        let name = request.name();
        if name.is_empty() {
            return Ok(None);
        }
        let args = request.args.unwrap_or(&[]);
        let Some(member) = self.find(&descriptor, &name, args) else {
            return Ok(None);
        };

        let member_name = match member {
            Member::Method(i) => descriptor.methods()[i].name.as_str(),
            Member::Field(i) => descriptor.fields()[i].name.as_str(),
        };
        if !self.validator.is_allowed(&descriptor, member_name) {
            return Err(CobbleError::AccessDenied {
                member: member_name.to_string(),
                type_name: descriptor.name().to_string(),
                location: Box::new(ErrorLocation::new(request.template, request.line)),
            });
        }

        let result = match member {
            Member::Method(i) => {
                let method = &descriptor.methods()[i];
                let converted: Vec<Value> =
                    args.iter().zip(&method.params).map(|(value, kind)| convert(value, *kind)).collect();
                method.invoke(object.as_any(), &converted)
            }
            Member::Field(i) => descriptor.fields()[i].get(object.as_any()),
        };
        result.map(|value| Some(ResolvedAttribute(value))).map_err(|e| {
            CobbleError::wrap(
                e,
                format!("Failed to access [{}] of [{}]", member_name, descriptor.name()),
                request.template,
                request.line,
            )
        })
    }
}

impl AttributeResolver for MemberResolver {
    fn resolve(&self, request: &AttributeRequest<'_>) -> Result<Option<ResolvedAttribute>, CobbleError> {
        if let Value::Object(object) = request.instance {
            return self.resolve_object(request, object.as_ref());
        }
        let name = request.name();
        let args = request.args.unwrap_or(&[]);
        let builtin = candidate_names(&name).iter().find_map(|candidate| builtin_member(request.instance, candidate, args));
        match builtin {
            Some(Ok(value)) => Ok(Some(ResolvedAttribute(value))),
            Some(Err(e)) => Err(CobbleError::wrap(
                e,
                format!("Failed to access [{}] of [{}]", name, request.instance.type_name()),
                request.template,
                request.line,
            )),
            None => Ok(None),
        }
    }
}

/// `get<Name>`, `is<Name>`, `has<Name>`, `name`.
fn candidate_names(name: &str) -> [String; 4] {
    let mut chars = name.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    [
        format!("get{}", capitalized),
        format!("is{}", capitalized),
        format!("has{}", capitalized),
        name.to_string(),
    ]
}

/// Sum of widening steps needed to pass `kinds` as `params`, `None` if incompatible.
fn widening_cost(params: &[ParamKind], kinds: &[Option<ParamKind>]) -> Option<u32> {
    let mut cost = 0;
    for (param, kind) in params.iter().zip(kinds) {
        let Some(kind) = kind else {
            if param.is_primitive() {
                return None;
            }
            continue;
        };
        if param == kind {
            continue;
        }
        if *param == ParamKind::Any {
            cost += 10;
            continue;
        }
        match (kind.numeric_rank(), param.numeric_rank()) {
            (Some(from), Some(to)) if from <= to => cost += u32::from(to - from),
            _ => return None,
        }
    }
    Some(cost)
}

/// Convert an argument to the representation a parameter declares.
fn convert(value: &Value, kind: ParamKind) -> Value {
    match kind {
        ParamKind::Int => value.as_i64().map_or_else(|| value.clone(), |n| Value::Int(n as i32)),
        ParamKind::Long => value.as_i64().map_or_else(|| value.clone(), Value::Long),
        ParamKind::Float => value.as_f64().map_or_else(|| value.clone(), |n| Value::Float(n as f32)),
        ParamKind::Double => value.as_f64().map_or_else(|| value.clone(), Value::Double),
        ParamKind::Decimal => match value {
            Value::Int(i) => Value::Decimal(Decimal::from(*i)),
            Value::Long(l) => Value::Decimal(Decimal::from(*l)),
            Value::Float(_) | Value::Double(_) => value
                .as_f64()
                .and_then(|n| Decimal::try_from(n).ok())
                .map_or_else(|| value.clone(), Value::Decimal),
            _ => value.clone(),
        },
        _ => value.clone(),
    }
}

/// Members of lists, maps and strings.
fn builtin_member(instance: &Value, name: &str, args: &[Value]) -> Option<anyhow::Result<Value>> {
    let name = name.to_ascii_lowercase();
    let result = match (instance, name.as_str(), args) {
        (Value::List(items), "size" | "getsize" | "length" | "getlength", []) => Ok(Value::Long(items.len() as i64)),
        (Value::List(items), "isempty", []) => Ok(Value::Bool(items.is_empty())),
        (Value::List(items), "get", [index]) => Ok(index
            .as_i64()
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| items.get(i).cloned())
            .unwrap_or_default()),
        (Value::List(_), "contains", [item]) => ops::contains(instance, item).map(Value::Bool),
        (Value::Map(map), "size" | "getsize", []) => Ok(Value::Long(map.len() as i64)),
        (Value::Map(map), "isempty", []) => Ok(Value::Bool(map.is_empty())),
        (Value::Map(map), "containskey", [key]) => Ok(Value::Bool(map.contains_key(key))),
        (Value::Map(map), "get", [key]) => Ok(map.get(key).cloned().unwrap_or_default()),
        (Value::Map(map), "keys" | "getkeys" | "keyset", []) => Ok(Value::list(map.keys().cloned())),
        (Value::Map(map), "values" | "getvalues", []) => Ok(Value::list(map.values().cloned())),
        (Value::String(s) | Value::SafeString(s), "length" | "getlength" | "size", []) => {
            Ok(Value::Long(s.chars().count() as i64))
        }
        (Value::String(s) | Value::SafeString(s), "isempty", []) => Ok(Value::Bool(s.is_empty())),
        (Value::String(s) | Value::SafeString(s), "touppercase", []) => Ok(Value::from(s.to_uppercase())),
        (Value::String(s) | Value::SafeString(s), "tolowercase", []) => Ok(Value::from(s.to_lowercase())),
        (Value::String(s) | Value::SafeString(s), "trim", []) => Ok(Value::from(s.trim())),
        (Value::String(s) | Value::SafeString(s), "startswith", [prefix]) => {
            Ok(Value::Bool(s.starts_with(prefix.to_string().as_str())))
        }
        (Value::String(s) | Value::SafeString(s), "endswith", [suffix]) => {
            Ok(Value::Bool(s.ends_with(suffix.to_string().as_str())))
        }
        (Value::String(_) | Value::SafeString(_), "contains", [item]) => {
            ops::contains(instance, item).map(Value::Bool)
        }
        _ => return None,
    };
    Some(result)
}
