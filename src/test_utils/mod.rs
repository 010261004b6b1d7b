//! Test utilities for cobble
//!
//! Helpers shared by unit tests and the integration suite: logging setup, engines
//! backed by in-memory templates, a loader that counts how often it is asked for
//! source, and a small host object with registered members.
//!
//! # Example
//!
//! ```rust,no_run
//! use cobble::test_utils::{init_test_logging, memory_engine};
//! use cobble::Variables;
//!
//! # fn main() -> cobble::Result<()> {
//! init_test_logging(None);
//! let engine = memory_engine(&[("page", "Hi {{ name }}")])?;
//! let output = engine.get_template("page")?.render(Variables::new().with("name", "Ada"))?;
//! assert_eq!(output, "Hi Ada");
//! # Ok(())
//! # }
//! ```

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Once};

use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::core::CobbleError;
use crate::engine::{Engine, EngineBuilder};
use crate::loader::{Loader, MemoryLoader};
use crate::value::{Object, ParamKind, TypeDescriptor, Value};

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. With `level` unset, `RUST_LOG` decides; with
/// neither, logging stays off.
///
/// ```bash
/// RUST_LOG=cobble::cache=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(true)
            .try_init();
    });
}

/// A builder whose loader serves `templates` from memory.
pub fn memory_builder(templates: &[(&str, &str)]) -> EngineBuilder {
    let mut loader = MemoryLoader::new();
    for (name, source) in templates {
        loader.insert(*name, *source);
    }
    Engine::builder().loader(loader)
}

/// An engine with default settings serving `templates` from memory.
pub fn memory_engine(templates: &[(&str, &str)]) -> Result<Engine, CobbleError> {
    memory_builder(templates).build()
}

/// Wraps a loader and counts successful loads.
#[derive(Default)]
pub struct CountingLoader {
    inner: MemoryLoader,
    loads: AtomicUsize,
}

impl CountingLoader {
    pub fn new(templates: &[(&str, &str)]) -> Self {
        let mut inner = MemoryLoader::new();
        for (name, source) in templates {
            inner.insert(*name, *source);
        }
        Self {
            inner,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl Loader for CountingLoader {
    fn load(&self, name: &str) -> Result<String, CobbleError> {
        let source = self.inner.load(name)?;
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(source)
    }
}

/// A host object with a getter, a field, an overloaded method and a denied member.
#[derive(Debug, Clone)]
pub struct Person {
    pub name: String,
    pub age: i64,
}

static PERSON: LazyLock<Arc<TypeDescriptor>> = LazyLock::new(|| {
    TypeDescriptor::builder::<Person>("Person")
        .method("getName", &[], |p, _| Ok(Value::from(p.name.as_str())))
        .method("isAdult", &[], |p, _| Ok(Value::Bool(p.age >= 18)))
        .method("greet", &[ParamKind::String], |p, args| {
            Ok(Value::from(format!("{} greets {}", p.name, args[0])))
        })
        .method("greet", &[ParamKind::Long], |p, args| {
            Ok(Value::from(format!("{} greets {} people", p.name, args[0])))
        })
        .method("getClass", &[], |_, _| Ok(Value::from("Person")))
        .field("age", |p| Value::Long(p.age))
        .build()
});

impl Person {
    pub fn new(name: &str, age: i64) -> Self {
        Self {
            name: name.to_string(),
            age,
        }
    }

    pub fn value(name: &str, age: i64) -> Value {
        Value::object(Self::new(name, age))
    }
}

impl Object for Person {
    fn type_name(&self) -> &str {
        "Person"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn descriptor(&self) -> Option<Arc<TypeDescriptor>> {
        Some(PERSON.clone())
    }

    fn display(&self) -> String {
        self.name.clone()
    }
}
