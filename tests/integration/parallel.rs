//! `parallel` regions on an executor.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use cobble::extension::{Args, CallContext, Extension, Function};
use cobble::test_utils::{init_test_logging, memory_builder};
use cobble::{ThreadExecutor, Value, Variables};

/// `work(label, ms)` sleeps, records `label` as finished and returns it.
struct Work(Arc<Mutex<Vec<String>>>);

impl Function for Work {
    fn argument_names(&self) -> Option<Vec<String>> {
        Some(vec!["label".to_string(), "ms".to_string()])
    }

    fn call(&self, args: &Args, _: &CallContext<'_>) -> anyhow::Result<Value> {
        let label = args.get("label").map(Value::to_string).unwrap_or_default();
        let ms = match args.get("ms") {
            Some(Value::Long(ms)) => u64::try_from(*ms)?,
            _ => 0,
        };
        std::thread::sleep(Duration::from_millis(ms));
        self.0.lock().map_err(|_| anyhow::anyhow!("poisoned"))?.push(label.clone());
        Ok(Value::from(label))
    }
}

struct WorkExtension(Arc<Mutex<Vec<String>>>);

impl Extension for WorkExtension {
    fn functions(&self) -> Vec<(String, Arc<dyn Function>)> {
        vec![("work".to_string(), Arc::new(Work(self.0.clone())))]
    }
}

const REGIONS: &str = "<{% parallel %}{{ work('a', 300) }}{% endparallel %}\
-{% parallel %}{{ work('b', 0) }}{% endparallel %}\
-{% parallel %}{{ work('c', 0) }}{% endparallel %}>";

fn finished() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

#[test]
fn test_parallel_output_keeps_document_order() -> Result<()> {
    init_test_logging(None);
    let runtime = tokio::runtime::Builder::new_multi_thread().worker_threads(2).enable_all().build()?;
    let order = finished();
    let engine = memory_builder(&[("t", REGIONS)])
        .extension(WorkExtension(order.clone()))
        .executor(runtime.handle().clone())
        .build()?;

    let output = engine.get_template("t")?.render(Variables::new())?;
    assert_eq!(output, "<a-b-c>");

    let order = order.lock().map_err(|_| anyhow::anyhow!("poisoned"))?.clone();
    assert_eq!(order.len(), 3);
    assert_eq!(order.last().map(String::as_str), Some("a"), "the slow region finishes last");
    Ok(())
}

#[test]
fn test_parallel_with_thread_executor() -> Result<()> {
    let order = finished();
    let engine = memory_builder(&[("t", REGIONS)])
        .extension(WorkExtension(order))
        .executor(ThreadExecutor)
        .build()?;
    assert_eq!(engine.get_template("t")?.render(Variables::new())?, "<a-b-c>");
    Ok(())
}

#[test]
fn test_parallel_sees_enclosing_variables() -> Result<()> {
    let engine = memory_builder(&[("t", "{% for i in items %}{% parallel %}[{{ i }}]{% endparallel %}{% endfor %}")])
        .executor(ThreadExecutor)
        .build()?;
    let output = engine.get_template("t")?.render(Variables::new().with("items", vec![1, 2, 3]))?;
    assert_eq!(output, "[1][2][3]");
    Ok(())
}

#[test]
fn test_parallel_without_executor_renders_inline() -> Result<()> {
    let order = finished();
    let engine = memory_builder(&[("t", REGIONS)]).extension(WorkExtension(order.clone())).build()?;
    assert_eq!(engine.get_template("t")?.render(Variables::new())?, "<a-b-c>");
    let order = order.lock().map_err(|_| anyhow::anyhow!("poisoned"))?.clone();
    assert_eq!(order, vec!["a", "b", "c"], "inline regions run in document order");
    Ok(())
}

#[test]
fn test_parallel_error_propagates() -> Result<()> {
    let engine = memory_builder(&[("t", "{% parallel %}{{ 'x' | nope }}{% endparallel %}")])
        .executor(ThreadExecutor)
        .build()?;
    let result = engine.get_template("t").and_then(|template| template.render(Variables::new()));
    assert!(result.is_err());
    Ok(())
}
