//! Error kinds, locations and formatting.

use std::sync::Arc;

use anyhow::Result;
use cobble::extension::{Args, CallContext, Extension, Filter};
use cobble::test_utils::{memory_builder, memory_engine};
use cobble::{CobbleError, Value, Variables};

#[test]
fn test_lex_error_reports_opening_line() -> Result<()> {
    let engine = memory_engine(&[("t", "first\n{{ (a\n+ b")])?;
    match engine.get_template("t") {
        Err(err @ CobbleError::Lex { .. }) => {
            assert!(err.to_string().contains("Unclosed \"(\""), "got {err}");
            assert_eq!(err.line(), Some(2));
        }
        other => panic!("expected a lex error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_unknown_tag() -> Result<()> {
    let engine = memory_engine(&[("t", "ok\n{% frobnicate %}")])?;
    match engine.get_template("t") {
        Err(err @ CobbleError::Parse { .. }) => {
            assert!(err.to_string().contains("Unexpected tag name \"frobnicate\""), "got {err}");
            assert_eq!(err.line(), Some(2));
            assert_eq!(err.location().and_then(|l| l.template.as_deref()), Some("t"));
        }
        other => panic!("expected a parse error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_missing_template() -> Result<()> {
    let engine = memory_engine(&[("t", "{% include \"nowhere\" %}")])?;
    assert!(matches!(
        engine.get_template("absent"),
        Err(CobbleError::TemplateNotFound { ref name }) if name == "absent"
    ));
    let err = engine.get_template("t")?.render(Variables::new());
    assert!(matches!(err, Err(CobbleError::TemplateNotFound { .. })), "got {err:?}");
    Ok(())
}

struct Explode;

impl Filter for Explode {
    fn apply(&self, _: &Value, _: &Args, _: &CallContext<'_>) -> anyhow::Result<Value> {
        anyhow::bail!("boom")
    }
}

struct ExplodeExtension;

impl Extension for ExplodeExtension {
    fn filters(&self) -> Vec<(String, Arc<dyn Filter>)> {
        vec![("explode".to_string(), Arc::new(Explode))]
    }
}

#[test]
fn test_filter_failure_is_wrapped() -> Result<()> {
    let engine = memory_builder(&[("t", "\n{{ 'x' | explode }}")]).extension(ExplodeExtension).build()?;
    match engine.get_template("t")?.render(Variables::new()) {
        Err(err @ CobbleError::Render { .. }) => {
            assert!(err.to_string().starts_with("Filter [explode] failed"), "got {err}");
            assert_eq!(err.line(), Some(2));
            assert!(err.format_with_context().contains("Caused by: boom"));
        }
        other => panic!("expected a render error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_format_with_context() -> Result<()> {
    let engine = memory_builder(&[("page", "line one\n{{ usr.name }}")])
        .strict_variables(true)
        .build()?;
    let err = match engine.get_template("page")?.render(Variables::new().with("user", "ada")) {
        Err(err) => err,
        Ok(output) => panic!("expected an error, rendered {output:?}"),
    };

    let report = err.format_with_context();
    assert!(report.starts_with("ERROR: Template Variable Not Found"), "got {report}");
    assert!(report.contains("Template: page"));
    assert!(report.contains("Line: 2"));
    assert!(report.contains("Did you mean:\n  - user"), "got {report}");
    Ok(())
}

#[test]
fn test_render_error_location() -> Result<()> {
    let engine = memory_engine(&[("t", "a\nb\n{{ nope() }}")])?;
    let err = engine.get_template("t")?.render(Variables::new()).err();
    assert_eq!(err.as_ref().and_then(CobbleError::line), Some(3));
    Ok(())
}

#[test]
fn test_mismatched_endcache_name() -> Result<()> {
    let engine = memory_engine(&[])?;
    match engine.get_literal_template("{% cache 'a' %}x\n{% endcache 'b' %}") {
        Err(err @ CobbleError::Parse { .. }) => {
            assert!(err.to_string().contains("endcache tag should be followed by \"'a'\""), "got {err}");
            assert_eq!(err.line(), Some(2));
        }
        other => panic!("expected a parse error, got {other:?}"),
    }
    assert_eq!(engine.get_literal_template("{% cache 'a' %}x{% endcache 'a' %}")?.render(Variables::new())?, "x");
    Ok(())
}
