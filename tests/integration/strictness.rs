//! Strict variables and host object member access.

use anyhow::Result;
use cobble::test_utils::{Person, memory_builder, memory_engine};
use cobble::{CobbleError, Variables};

#[test]
fn test_missing_variable_lenient_vs_strict() -> Result<()> {
    let lenient = memory_engine(&[("t", "[{{ missing }}]")])?;
    assert_eq!(lenient.get_template("t")?.render(Variables::new())?, "[]");

    let strict = memory_builder(&[("t", "[{{ missing }}]")]).strict_variables(true).build()?;
    let err = strict.get_template("t")?.render(Variables::new().with("missng", 1));
    match err {
        Err(err @ CobbleError::AttributeNotFound { .. }) => {
            let message = err.to_string();
            assert!(message.contains("Root attribute [missing] does not exist"), "got {message}");
        }
        other => panic!("expected AttributeNotFound, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_strict_mode_tolerates_default_filter() -> Result<()> {
    let engine = memory_builder(&[("t", "{{ missing | default('fallback') }}|{{ missing is defined }}")])
        .strict_variables(true)
        .build()?;
    assert_eq!(engine.get_template("t")?.render(Variables::new())?, "fallback|false");
    Ok(())
}

#[test]
fn test_strict_null_if_condition() -> Result<()> {
    let engine = memory_builder(&[("t", "{% if value %}yes{% endif %}")]).strict_variables(true).build()?;
    let err = engine.get_template("t")?.render(Variables::new().with("value", cobble::Value::Null));
    assert!(matches!(err, Err(CobbleError::Render { .. })), "got {err:?}");

    let lenient = memory_engine(&[("t", "{% if value %}yes{% else %}no{% endif %}")])?;
    assert_eq!(lenient.get_template("t")?.render(Variables::new())?, "no");
    Ok(())
}

#[test]
fn test_strict_missing_map_key() -> Result<()> {
    let template = "{{ user.nmae }}";
    let vars = || Variables::new().with("user", serde_json::json!({"name": "Ada"}));

    let lenient = memory_engine(&[("t", template)])?;
    assert_eq!(lenient.get_template("t")?.render(vars())?, "");

    let strict = memory_builder(&[("t", template)]).strict_variables(true).build()?;
    let message = strict.get_template("t")?.render(vars()).err().map(|e| e.to_string()).unwrap_or_default();
    assert!(message.starts_with("Attribute [nmae] of [Map] does not exist"), "got {message}");
    Ok(())
}

#[test]
fn test_host_object_members() -> Result<()> {
    let engine = memory_engine(&[(
        "t",
        "{{ p.name }}|{{ p.adult }}|{{ p.age }}|{{ p.greet('Bob') }}|{{ p.greet(3) }}|{{ p }}",
    )])?;
    let output = engine.get_template("t")?.render(Variables::new().with("p", Person::value("Ada", 36)))?;
    assert_eq!(output, "Ada|true|36|Ada greets Bob|Ada greets 3 people|Ada");
    Ok(())
}

#[test]
fn test_member_lookup_is_case_insensitive() -> Result<()> {
    let engine = memory_engine(&[("t", "{{ p.NAME }}{{ p.getname() }}")])?;
    let output = engine.get_template("t")?.render(Variables::new().with("p", Person::value("Ada", 1)))?;
    assert_eq!(output, "AdaAda");
    Ok(())
}

#[test]
fn test_denied_member_access() -> Result<()> {
    let engine = memory_engine(&[("t", "{{ p.class }}")])?;
    let err = engine.get_template("t")?.render(Variables::new().with("p", Person::value("Ada", 1)));
    assert!(
        matches!(err, Err(CobbleError::AccessDenied { ref member, ref type_name, .. }) if member == "getClass" && type_name == "Person"),
        "got {err:?}"
    );

    let unsafe_engine = memory_builder(&[("t", "{{ p.class }}")]).allow_unsafe_methods(true).build()?;
    let output = unsafe_engine.get_template("t")?.render(Variables::new().with("p", Person::value("Ada", 1)))?;
    assert_eq!(output, "Person");
    Ok(())
}

#[test]
fn test_unknown_member_of_host_object() -> Result<()> {
    let engine = memory_engine(&[("t", "[{{ p.salary }}]")])?;
    let output = engine.get_template("t")?.render(Variables::new().with("p", Person::value("Ada", 1)))?;
    assert_eq!(output, "[]");

    let strict = memory_builder(&[("t", "{{ p.salary }}")]).strict_variables(true).build()?;
    let err = strict.get_template("t")?.render(Variables::new().with("p", Person::value("Ada", 1)));
    assert!(matches!(err, Err(CobbleError::AttributeNotFound { .. })), "got {err:?}");
    Ok(())
}
