//! Engines built from TOML configuration.

use anyhow::Result;
use cobble::test_utils::memory_builder;
use cobble::{CobbleError, EngineConfig, Variables};

#[test]
fn test_load_config_file() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let path = temp.path().join("cobble.toml");
    std::fs::write(
        &path,
        r#"
strict_variables = true
default_locale = "de"

[syntax]
print_open = "[["
print_close = "]]"
"#,
    )?;

    let config = EngineConfig::load(&path)?;
    assert!(config.strict_variables);
    assert_eq!(config.syntax.print_open, "[[");
    assert_eq!(config.syntax.execute_open, "{%", "unlisted delimiters keep their defaults");

    let engine = memory_builder(&[("t", "[[ locale ]] {{ literal }} {% if true %}ok{% endif %}")])
        .from_config(config)
        .build()?;
    assert_eq!(engine.get_template("t")?.render(Variables::new())?, "de {{ literal }} ok");
    Ok(())
}

#[test]
fn test_strictness_from_config() -> Result<()> {
    let config = EngineConfig::from_toml_str("strict_variables = true")?;
    let engine = memory_builder(&[("t", "{{ nope }}")]).from_config(config).build()?;
    let err = engine.get_template("t")?.render(Variables::new());
    assert!(matches!(err, Err(CobbleError::AttributeNotFound { .. })), "got {err:?}");
    Ok(())
}

#[test]
fn test_autoescape_disabled_from_config() -> Result<()> {
    let config = EngineConfig::from_toml_str("auto_escaping = false")?;
    let engine = memory_builder(&[("t", "{{ html }}")]).from_config(config).build()?;
    let output = engine.get_template("t")?.render(Variables::new().with("html", "<b>"))?;
    assert_eq!(output, "<b>");
    Ok(())
}

#[test]
fn test_max_rendered_size() -> Result<()> {
    let config = EngineConfig::from_toml_str("max_rendered_size = 5")?;
    let engine = memory_builder(&[("small", "abcde"), ("large", "{% for i in 1..10 %}{{ i }}{% endfor %}")])
        .from_config(config)
        .build()?;

    assert_eq!(engine.get_template("small")?.render(Variables::new())?, "abcde");
    let err = engine.get_template("large")?.render(Variables::new());
    assert!(matches!(err, Err(CobbleError::OutputBudgetExceeded { limit: 5 })), "got {err:?}");
    Ok(())
}

#[test]
fn test_new_line_trimming_from_config() -> Result<()> {
    let source = "{% if true %}\nyes\n{% endif %}\n";
    let trimmed = memory_builder(&[("t", source)]).build()?;
    assert_eq!(trimmed.get_template("t")?.render(Variables::new())?, "yes\n");

    let config = EngineConfig::from_toml_str("new_line_trimming = false")?;
    let kept = memory_builder(&[("t", source)]).from_config(config).build()?;
    assert_eq!(kept.get_template("t")?.render(Variables::new())?, "\nyes\n\n");
    Ok(())
}

#[test]
fn test_invalid_config() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let path = temp.path().join("broken.toml");
    std::fs::write(&path, "strict_variables = \"maybe\"")?;
    assert!(matches!(EngineConfig::load(&path), Err(CobbleError::Config { .. })));
    assert!(matches!(
        EngineConfig::load(&temp.path().join("missing.toml")),
        Err(CobbleError::Config { .. })
    ));
    Ok(())
}
