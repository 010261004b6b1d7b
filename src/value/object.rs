//! Host objects and the accessor tables that expose their members.
//!
//! Rust has no runtime reflection, so a host type makes itself visible to templates
//! by implementing [`Object`] and, for member access, returning a [`TypeDescriptor`]
//! that lists its methods and fields with typed accessor closures.
//!
//! ```rust
//! use std::any::Any;
//! use std::sync::{Arc, LazyLock};
//! use cobble::value::{Object, ParamKind, TypeDescriptor, Value};
//!
//! #[derive(Debug)]
//! struct User {
//!     name: String,
//! }
//!
//! static USER: LazyLock<Arc<TypeDescriptor>> = LazyLock::new(|| {
//!     TypeDescriptor::builder::<User>("User")
//!         .method("getName", &[], |user, _| Ok(Value::from(user.name.as_str())))
//!         .method("greet", &[ParamKind::String], |user, args| {
//!             Ok(Value::from(format!("{} greets {}", user.name, args[0])))
//!         })
//!         .build()
//! });
//!
//! impl Object for User {
//!     fn type_name(&self) -> &str {
//!         "User"
//!     }
//!     fn as_any(&self) -> &dyn Any {
//!         self
//!     }
//!     fn descriptor(&self) -> Option<Arc<TypeDescriptor>> {
//!         Some(USER.clone())
//!     }
//! }
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;

use super::Value;

/// Capability interface implemented by host values placed in a template context.
pub trait Object: Send + Sync + fmt::Debug + 'static {
    /// Name used in error messages and by the access policy.
    fn type_name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;

    /// Accessor table for member lookup. `None` hides every member.
    fn descriptor(&self) -> Option<Arc<TypeDescriptor>> {
        None
    }

    /// Whether [`Object::dynamic_attribute`] answers for `name`.
    fn has_dynamic_attribute(&self, _name: &Value) -> bool {
        false
    }

    /// Per-instance attribute lookup, tried before member lookup.
    fn dynamic_attribute(&self, _name: &Value, _args: &[Value]) -> anyhow::Result<Value> {
        Ok(Value::Null)
    }

    /// For enum-like values: the constant name `==` compares against strings.
    fn constant_name(&self) -> Option<&str> {
        None
    }

    /// Items produced when the object is iterated by `for`.
    fn iter_values(&self) -> Option<Vec<Value>> {
        None
    }

    /// Text written when the object is printed.
    fn display(&self) -> String {
        self.type_name().to_string()
    }
}

/// Parameter type of a host method, used to pick an overload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// Accepts any value unchanged
    Any,
    Bool,
    Int,
    Long,
    Float,
    Double,
    Decimal,
    String,
    List,
    Map,
    Object,
}

impl ParamKind {
    /// Rank in the numeric widening order, `None` for non-numeric kinds.
    pub(crate) fn numeric_rank(self) -> Option<u8> {
        match self {
            ParamKind::Int => Some(0),
            ParamKind::Long => Some(1),
            ParamKind::Float => Some(2),
            ParamKind::Double => Some(3),
            ParamKind::Decimal => Some(4),
            _ => None,
        }
    }

    /// Kinds that cannot hold null.
    pub(crate) fn is_primitive(self) -> bool {
        matches!(
            self,
            ParamKind::Bool | ParamKind::Int | ParamKind::Long | ParamKind::Float | ParamKind::Double
        )
    }

    /// The kind of an argument value; `None` for null.
    pub(crate) fn of(value: &Value) -> Option<ParamKind> {
        Some(match value {
            Value::Null => return None,
            Value::Bool(_) => ParamKind::Bool,
            Value::Int(_) => ParamKind::Int,
            Value::Long(_) => ParamKind::Long,
            Value::Float(_) => ParamKind::Float,
            Value::Double(_) => ParamKind::Double,
            Value::Decimal(_) => ParamKind::Decimal,
            Value::String(_) | Value::SafeString(_) => ParamKind::String,
            Value::List(_) | Value::Iterator(_) => ParamKind::List,
            Value::Map(_) => ParamKind::Map,
            Value::Object(_) => ParamKind::Object,
        })
    }
}

type MethodFn = dyn Fn(&dyn Any, &[Value]) -> anyhow::Result<Value> + Send + Sync;
type FieldFn = dyn Fn(&dyn Any) -> anyhow::Result<Value> + Send + Sync;

/// A callable member.
#[derive(Clone)]
pub struct MethodDescriptor {
    pub name: String,
    pub params: Vec<ParamKind>,
    invoke: Arc<MethodFn>,
}

impl MethodDescriptor {
    pub fn invoke(&self, receiver: &dyn Any, args: &[Value]) -> anyhow::Result<Value> {
        (self.invoke)(receiver, args)
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

/// A readable member.
#[derive(Clone)]
pub struct FieldDescriptor {
    pub name: String,
    get: Arc<FieldFn>,
}

impl FieldDescriptor {
    pub fn get(&self, receiver: &dyn Any) -> anyhow::Result<Value> {
        (self.get)(receiver)
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor").field("name", &self.name).finish()
    }
}

/// Registered accessor table of one host type.
#[derive(Debug)]
pub struct TypeDescriptor {
    name: String,
    type_id: TypeId,
    internal: bool,
    methods: Vec<MethodDescriptor>,
    fields: Vec<FieldDescriptor>,
}

impl TypeDescriptor {
    pub fn builder<T: Any + Send + Sync>(name: impl Into<String>) -> TypeDescriptorBuilder<T> {
        TypeDescriptorBuilder {
            descriptor: TypeDescriptor {
                name: name.into(),
                type_id: TypeId::of::<T>(),
                internal: false,
                methods: Vec::new(),
                fields: Vec::new(),
            },
            _marker: std::marker::PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Runtime-internal types are denied by the default access policy.
    pub fn is_internal(&self) -> bool {
        self.internal
    }

    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }
}

/// Typed builder for a [`TypeDescriptor`].
pub struct TypeDescriptorBuilder<T> {
    descriptor: TypeDescriptor,
    _marker: std::marker::PhantomData<fn(&T)>,
}

impl<T: Any + Send + Sync> TypeDescriptorBuilder<T> {
    /// Register a method. Arguments arrive already converted to `params`.
    pub fn method<F>(mut self, name: impl Into<String>, params: &[ParamKind], f: F) -> Self
    where
        F: Fn(&T, &[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let type_name = self.descriptor.name.clone();
        self.descriptor.methods.push(MethodDescriptor {
            name: name.into(),
            params: params.to_vec(),
            invoke: Arc::new(move |receiver: &dyn Any, args: &[Value]| {
                let receiver = receiver
                    .downcast_ref::<T>()
                    .ok_or_else(|| anyhow!("Receiver is not a [{}]", type_name))?;
                f(receiver, args)
            }),
        });
        self
    }

    /// Register a public field.
    pub fn field<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        let type_name = self.descriptor.name.clone();
        self.descriptor.fields.push(FieldDescriptor {
            name: name.into(),
            get: Arc::new(move |receiver: &dyn Any| {
                receiver
                    .downcast_ref::<T>()
                    .map(&f)
                    .ok_or_else(|| anyhow!("Receiver is not a [{}]", type_name))
            }),
        });
        self
    }

    pub fn internal(mut self) -> Self {
        self.descriptor.internal = true;
        self
    }

    pub fn build(self) -> Arc<TypeDescriptor> {
        Arc::new(self.descriptor)
    }
}
