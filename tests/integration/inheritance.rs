//! Template inheritance, include and embed.

use anyhow::Result;
use cobble::test_utils::memory_engine;
use cobble::{CobbleError, Variables};

const BASE: &str = "<html>{% block title %}Base{% endblock %}|{% block body %}base body{% endblock %}</html>";

#[test]
fn test_child_overrides_block() -> Result<()> {
    let engine = memory_engine(&[
        ("A", "before {% block x %}parent{% endblock %} after"),
        ("child", "{% extends \"A\" %}{% block x %}child{% endblock %}"),
    ])?;
    assert_eq!(engine.get_template("child")?.render(Variables::new())?, "before child after");
    Ok(())
}

#[test]
fn test_parent_function() -> Result<()> {
    let engine = memory_engine(&[
        ("A", "{% block x %}parent{% endblock %}"),
        ("child", "{% extends \"A\" %}{% block x %}[{{ parent() }}]{% endblock %}"),
    ])?;
    assert_eq!(engine.get_template("child")?.render(Variables::new())?, "[parent]");
    Ok(())
}

#[test]
fn test_three_level_chain() -> Result<()> {
    let engine = memory_engine(&[
        ("base", BASE),
        ("section", "{% extends \"base\" %}{% block title %}Section{% endblock %}{% block body %}section body{% endblock %}"),
        ("page", "{% extends \"section\" %}{% block body %}page > {{ parent() }}{% endblock %}"),
    ])?;
    let output = engine.get_template("page")?.render(Variables::new())?;
    assert_eq!(output, "<html>Section|page > section body</html>");
    Ok(())
}

#[test]
fn test_child_root_only_runs_set_and_import() -> Result<()> {
    let engine = memory_engine(&[
        ("base", "{% block title %}{{ title }}{% endblock %}"),
        ("child", "ignored text{% extends \"base\" %}{% set title = 'From child' %}more ignored"),
    ])?;
    // text before the extends tag still renders: the parent is not known yet
    assert_eq!(engine.get_template("child")?.render(Variables::new())?, "ignored textFrom child");
    Ok(())
}

#[test]
fn test_dynamic_parent_name() -> Result<()> {
    let engine = memory_engine(&[
        ("light", "light:{% block c %}{% endblock %}"),
        ("dark", "dark:{% block c %}{% endblock %}"),
        ("page", "{% extends theme %}{% block c %}content{% endblock %}"),
    ])?;
    let page = engine.get_template("page")?;
    assert_eq!(page.render(Variables::new().with("theme", "dark"))?, "dark:content");
    assert_eq!(page.render(Variables::new().with("theme", "light"))?, "light:content");
    let err = page.render(Variables::new());
    assert!(
        err.as_ref().err().is_some_and(|e| e.to_string().contains("evaluated to NULL")),
        "null parent name must be reported, got {err:?}"
    );
    Ok(())
}

#[test]
fn test_include_with_variables_and_relative_path() -> Result<()> {
    let engine = memory_engine(&[
        ("pages/index", "{% include \"./partials/header\" with {'title': 'Home'} %}|{{ title }}"),
        ("pages/partials/header", "<h1>{{ title }}</h1>{% include \"../footer\" %}"),
        ("pages/footer", "<footer/>"),
    ])?;
    let output = engine.get_template("pages/index")?.render(Variables::new().with("title", "outer"))?;
    assert_eq!(output, "<h1>Home</h1><footer/>|outer", "with-variables do not leak out of the include");
    Ok(())
}

#[test]
fn test_embed_overrides_blocks_without_touching_original() -> Result<()> {
    let engine = memory_engine(&[
        ("card", "<div>{% block header %}default header{% endblock %}:{% block content %}default{% endblock %}</div>"),
        (
            "page",
            "{% embed \"card\" with {'n': 1} %}{% block content %}custom {{ n }}{% endblock %}{% endembed %}|{% include \"card\" %}",
        ),
    ])?;
    let output = engine.get_template("page")?.render(Variables::new())?;
    assert_eq!(output, "<div>default header:custom 1</div>|<div>default header:default</div>");
    Ok(())
}

#[test]
fn test_evaluate_block() -> Result<()> {
    let engine = memory_engine(&[
        ("base", BASE),
        ("page", "{% extends \"base\" %}{% set who = 'page' %}{% block title %}Title of {{ who }}{% endblock %}"),
    ])?;
    let page = engine.get_template("page")?;
    assert_eq!(page.render_block("title", Variables::new())?, "Title of page");
    assert_eq!(page.render_block("body", Variables::new())?, "base body", "inherited blocks resolve through the parent");
    assert_eq!(page.render_block("nope", Variables::new())?, "");
    Ok(())
}

#[test]
fn test_missing_parent_template() -> Result<()> {
    let engine = memory_engine(&[("child", "{% extends \"ghost\" %}")])?;
    let err = engine.get_template("child")?.render(Variables::new());
    assert!(matches!(err, Err(CobbleError::TemplateNotFound { ref name }) if name == "ghost"));
    Ok(())
}

#[test]
fn test_block_names_are_introspectable() -> Result<()> {
    let engine = memory_engine(&[("base", BASE)])?;
    let base = engine.get_template("base")?;
    assert_eq!(base.block_names(), vec!["body", "title"]);
    assert!(base.has_block("title"));
    Ok(())
}
