//! Macros, import and from-import.

use anyhow::Result;
use cobble::test_utils::memory_engine;
use cobble::{CobbleError, Variables};

const FORMS: &str = "{% macro input(name, type='text', value) %}<input type=\"{{ type }}\" name=\"{{ name }}\" value=\"{{ value }}\">{% endmacro %}\
{% macro label(text) %}<label>{{ text }}</label>{% endmacro %}";

#[test]
fn test_local_macro_with_defaults_and_named_args() -> Result<()> {
    let engine = memory_engine(&[(
        "t",
        "{% macro greet(name, greeting='Hello') %}{{ greeting }}, {{ name }}{% endmacro %}{{ greet('Ada') }}|{{ greet('Bob', greeting='Hi') }}",
    )])?;
    assert_eq!(engine.get_template("t")?.render(Variables::new())?, "Hello, Ada|Hi, Bob");
    Ok(())
}

#[test]
fn test_macro_cannot_see_caller_variables() -> Result<()> {
    let engine = memory_engine(&[("t", "{% macro show() %}[{{ secret }}]{% endmacro %}{{ show() }}")])?;
    let output = engine.get_template("t")?.render(Variables::new().with("secret", "leak"))?;
    assert_eq!(output, "[]");
    Ok(())
}

#[test]
fn test_macro_output_is_not_escaped_twice() -> Result<()> {
    let engine = memory_engine(&[("t", "{% macro b(x) %}<b>{{ x }}</b>{% endmacro %}{{ b(v) }}")])?;
    let output = engine.get_template("t")?.render(Variables::new().with("v", "<i>"))?;
    assert_eq!(output, "<b>&lt;i&gt;</b>");
    Ok(())
}

#[test]
fn test_import_with_alias() -> Result<()> {
    let engine = memory_engine(&[
        ("forms", FORMS),
        ("page", "{% import \"forms\" as f %}{{ f.label('Name') }}{{ f.input('name', 'text', 'x') }}"),
    ])?;
    let output = engine.get_template("page")?.render(Variables::new())?;
    assert_eq!(output, "<label>Name</label><input type=\"text\" name=\"name\" value=\"x\">");
    Ok(())
}

#[test]
fn test_import_without_alias() -> Result<()> {
    let engine = memory_engine(&[("forms", FORMS), ("page", "{% import \"forms\" %}{{ label('Plain') }}")])?;
    assert_eq!(engine.get_template("page")?.render(Variables::new())?, "<label>Plain</label>");
    Ok(())
}

#[test]
fn test_from_import() -> Result<()> {
    let engine = memory_engine(&[
        ("forms", FORMS),
        ("page", "{% from \"forms\" import input as field, label %}{{ label('L') }}{{ field('q', 'search') }}"),
    ])?;
    let output = engine.get_template("page")?.render(Variables::new())?;
    assert_eq!(output, "<label>L</label><input type=\"search\" name=\"q\" value=\"\">");
    Ok(())
}

#[test]
fn test_from_import_of_missing_macro() -> Result<()> {
    let engine = memory_engine(&[("forms", FORMS), ("page", "{% from \"forms\" import nope %}")])?;
    let err = engine.get_template("page")?.render(Variables::new());
    assert!(matches!(err, Err(CobbleError::Render { .. })), "got {err:?}");
    Ok(())
}

#[test]
fn test_child_calls_macro_defined_in_parent() -> Result<()> {
    let engine = memory_engine(&[
        ("base", "{% macro star(x) %}*{{ x }}*{% endmacro %}{% block b %}{% endblock %}"),
        ("child", "{% extends \"base\" %}{% block b %}{{ star('hi') }}{% endblock %}"),
    ])?;
    assert_eq!(engine.get_template("child")?.render(Variables::new())?, "*hi*");
    Ok(())
}

#[test]
fn test_unknown_macro() -> Result<()> {
    let engine = memory_engine(&[("t", "{{ nothing(1) }}")])?;
    let err = engine.get_template("t")?.render(Variables::new()).err().map(|e| e.to_string());
    assert!(
        err.as_deref().is_some_and(|e| e.starts_with("Function or Macro [nothing] does not exist.")),
        "got {err:?}"
    );
    Ok(())
}

#[test]
fn test_too_many_macro_arguments() -> Result<()> {
    let engine = memory_engine(&[("t", "{% macro one(a) %}{{ a }}{% endmacro %}{{ one(1, 2) }}")])?;
    let err = engine.get_template("t")?.render(Variables::new());
    assert!(matches!(err, Err(CobbleError::Render { .. })));
    Ok(())
}

#[test]
fn test_recursive_macro_is_bounded_by_budget() -> Result<()> {
    let source = "{% macro bomb(n) %}{{ 'xxxxxxxxxx' }}{% if n > 0 %}{{ bomb(n - 1) }}{{ bomb(n - 1) }}{% endif %}{% endmacro %}{{ bomb(20) }}";
    let limited = cobble::test_utils::memory_builder(&[("bomb", source)]).max_rendered_size(10_000).build()?;
    let err = limited.get_template("bomb")?.render(Variables::new());
    assert!(matches!(err, Err(CobbleError::OutputBudgetExceeded { limit: 10_000 })), "got {err:?}");
    Ok(())
}
