//! Template cache and `cache` tag behavior under concurrency.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use cobble::cache::TemplateCacheKey;
use cobble::extension::{Args, CallContext, Extension, Function};
use cobble::test_utils::{CountingLoader, init_test_logging, memory_builder};
use cobble::{CobbleError, Engine, Loader, Value, Variables};

/// `tick()` returns how many times it has been called.
struct Tick(Arc<AtomicUsize>);

impl Function for Tick {
    fn call(&self, _: &Args, _: &CallContext<'_>) -> anyhow::Result<Value> {
        Ok(Value::from(self.0.fetch_add(1, Ordering::SeqCst) + 1))
    }
}

struct TickExtension(Arc<AtomicUsize>);

impl Extension for TickExtension {
    fn functions(&self) -> Vec<(String, Arc<dyn Function>)> {
        vec![("tick".to_string(), Arc::new(Tick(self.0.clone())))]
    }
}

#[test]
fn test_concurrent_get_template_compiles_once() -> Result<()> {
    init_test_logging(None);
    const THREADS: usize = 8;
    let loader = Arc::new(CountingLoader::new(&[("page", "{% for i in 1..3 %}{{ i }}{% endfor %}")]));
    let engine = Engine::builder().shared_loader(loader.clone() as Arc<dyn Loader>).build()?;
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let engine = engine.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                engine.get_template("page")
            })
        })
        .collect();

    let mut templates = Vec::new();
    for handle in handles {
        templates.push(handle.join().map_err(|_| anyhow::anyhow!("worker panicked"))??);
    }
    assert_eq!(loader.loads(), 1, "source must be loaded exactly once");
    assert!(templates.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert_eq!(templates[0].render(Variables::new())?, "123");
    Ok(())
}

#[test]
fn test_concurrent_renders_share_template() -> Result<()> {
    let engine = memory_builder(&[("greet", "Hello {{ name }}")]).build()?;
    let template = engine.get_template("greet")?;

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let template = template.clone();
            thread::spawn(move || template.render(Variables::new().with("name", format!("user{i}"))))
        })
        .collect();
    for (i, handle) in handles.into_iter().enumerate() {
        let output = handle.join().map_err(|_| anyhow::anyhow!("worker panicked"))??;
        assert_eq!(output, format!("Hello user{i}"));
    }
    Ok(())
}

#[test]
fn test_failed_compilation_is_not_cached() -> Result<()> {
    let loader = Arc::new(CountingLoader::new(&[("bad", "{{ 1 + }}")]));
    let engine = Engine::builder().shared_loader(loader.clone() as Arc<dyn Loader>).build()?;

    assert!(matches!(engine.get_template("bad"), Err(CobbleError::Parse { .. })));
    assert!(engine.get_template("bad").is_err());
    assert_eq!(loader.loads(), 2);
    assert!(engine.template_cache().get(&TemplateCacheKey::Named("bad".to_string())).is_none());
    Ok(())
}

#[test]
fn test_invalidate_template_cache() -> Result<()> {
    let loader = Arc::new(CountingLoader::new(&[("page", "x")]));
    let engine = Engine::builder().shared_loader(loader.clone() as Arc<dyn Loader>).build()?;

    let first = engine.get_template("page")?;
    engine.template_cache().invalidate(&TemplateCacheKey::Named("page".to_string()));
    let second = engine.get_template("page")?;
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(loader.loads(), 2);
    Ok(())
}

#[test]
fn test_cache_tag_reuses_output() -> Result<()> {
    let counter = Arc::new(AtomicUsize::new(0));
    let engine = memory_builder(&[("t", "{% cache 'k' %}{{ tick() }}{% endcache %}")])
        .extension(TickExtension(counter.clone()))
        .build()?;
    let template = engine.get_template("t")?;

    assert_eq!(template.render(Variables::new())?, "1");
    assert_eq!(template.render(Variables::new())?, "1");
    assert_eq!(template.render_with_locale(Variables::new(), "fr")?, "2", "locale is part of the key");

    engine.tag_cache().invalidate_all();
    assert_eq!(template.render(Variables::new())?, "3");
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    Ok(())
}

#[test]
fn test_cache_tag_keyed_by_name_and_tag() -> Result<()> {
    let counter = Arc::new(AtomicUsize::new(0));
    let engine = memory_builder(&[(
        "t",
        "{% cache name %}{{ tick() }}{% endcache %}|{% cache name %}{{ tick() }}{% endcache %}",
    )])
    .extension(TickExtension(counter))
    .build()?;
    let template = engine.get_template("t")?;

    assert_eq!(template.render(Variables::new().with("name", "a"))?, "1|2");
    assert_eq!(template.render(Variables::new().with("name", "a"))?, "1|2");
    assert_eq!(template.render(Variables::new().with("name", "b"))?, "3|4");
    Ok(())
}

#[test]
fn test_inactive_cache_recomputes_tags() -> Result<()> {
    let counter = Arc::new(AtomicUsize::new(0));
    let engine = memory_builder(&[("t", "{% cache 'k' %}{{ tick() }}{% endcache %}")])
        .extension(TickExtension(counter))
        .cache_active(false)
        .build()?;
    let template = engine.get_template("t")?;
    assert_eq!(template.render(Variables::new())?, "1");
    assert_eq!(template.render(Variables::new())?, "2");
    Ok(())
}

#[test]
fn test_recursive_cache_tag_fails() -> Result<()> {
    let engine = memory_builder(&[(
        "t",
        "{% macro m(n) %}{% cache 'k' %}{{ n }}{% if n > 0 %}{{ m(n - 1) }}{% endif %}{% endcache %}{% endmacro %}{{ m(2) }}",
    )])
    .build()?;
    let template = engine.get_template("t")?;

    let (done, finished) = std::sync::mpsc::channel();
    thread::spawn(move || {
        let _ = done.send(template.render(Variables::new()));
    });
    let result = finished.recv_timeout(Duration::from_secs(10)).map_err(|_| anyhow::anyhow!("render hung"))?;
    match result {
        Err(err @ CobbleError::Render { .. }) => {
            assert!(err.to_string().starts_with("Recursive computation of cache key [k]"), "got {err}");
        }
        other => panic!("expected a render error, got {other:?}"),
    }
    assert!(engine.tag_cache().is_empty(), "nothing was cached");
    Ok(())
}

#[test]
fn test_recursive_cache_tag_under_parallel_fails() -> Result<()> {
    let engine = memory_builder(&[(
        "t",
        "{% macro m(n) %}{% cache 'k' %}{% parallel %}{% if n > 0 %}{{ m(n - 1) }}{% endif %}{% endparallel %}{% endcache %}{% endmacro %}{{ m(1) }}",
    )])
    .executor(cobble::ThreadExecutor)
    .build()?;
    let template = engine.get_template("t")?;

    let (done, finished) = std::sync::mpsc::channel();
    thread::spawn(move || {
        let _ = done.send(template.render(Variables::new()));
    });
    let result = finished.recv_timeout(Duration::from_secs(10)).map_err(|_| anyhow::anyhow!("render hung"))?;
    assert!(matches!(result, Err(CobbleError::Render { .. })), "got {result:?}");
    Ok(())
}

#[test]
fn test_cache_tag_survives_recompile() -> Result<()> {
    let counter = Arc::new(AtomicUsize::new(0));
    let engine = memory_builder(&[("t", "{% cache 'k' %}{{ tick() }}{% endcache %}")])
        .extension(TickExtension(counter.clone()))
        .build()?;

    assert_eq!(engine.get_template("t")?.render(Variables::new())?, "1");
    engine.template_cache().invalidate(&TemplateCacheKey::Named("t".to_string()));
    assert_eq!(engine.get_template("t")?.render(Variables::new())?, "1");
    assert_eq!(engine.tag_cache().len(), 1);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_cache_tags_in_different_templates_stay_apart() -> Result<()> {
    let counter = Arc::new(AtomicUsize::new(0));
    let engine = memory_builder(&[
        ("a", "{% cache 'k' %}a{{ tick() }}{% endcache %}"),
        ("b", "{% cache 'k' %}b{{ tick() }}{% endcache %}"),
    ])
    .extension(TickExtension(counter))
    .build()?;
    assert_eq!(engine.get_template("a")?.render(Variables::new())?, "a1");
    assert_eq!(engine.get_template("b")?.render(Variables::new())?, "b2");
    Ok(())
}
