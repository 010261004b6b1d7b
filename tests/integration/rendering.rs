//! Printing, control flow and loops.

use anyhow::Result;
use cobble::test_utils::{init_test_logging, memory_engine};
use cobble::{Engine, Value, Variables};

fn render(source: &str, variables: Variables) -> Result<String> {
    let engine = Engine::builder().build()?;
    Ok(engine.get_literal_template(source)?.render(variables)?)
}

#[test]
fn test_precedence_and_widening() -> Result<()> {
    init_test_logging(None);
    assert_eq!(render("{{ 2 + 3 * 4 }}", Variables::new())?, "14");
    assert_eq!(render("{{ 1 + 1.5 }}", Variables::new())?, "2.5");
    assert_eq!(render("{{ 'a' + 1 }}", Variables::new())?, "a1");
    assert_eq!(render("{{ true or false and false }}", Variables::new())?, "true");
    Ok(())
}

#[test]
fn test_loop_metadata() -> Result<()> {
    let output = render(
        "{% for i in [10,20,30] %}{{loop.index}}:{{loop.first}}:{{loop.last}} {% endfor %}",
        Variables::new(),
    )?;
    assert_eq!(output, "0:true:false 1:false:false 2:false:true ");
    Ok(())
}

#[test]
fn test_loop_length_and_else() -> Result<()> {
    let template = "{% for x in items %}{{ x }}/{{ loop.length }}/{{ loop.revindex }} {% else %}empty{% endfor %}";
    assert_eq!(render(template, Variables::new().with("items", vec!["a", "b"]))?, "a/2/1 b/2/0 ");
    assert_eq!(render(template, Variables::new().with("items", Vec::<Value>::new()))?, "empty");
    assert_eq!(render(template, Variables::new())?, "", "a null iterable renders nothing, not the else body");
    Ok(())
}

#[test]
fn test_loop_over_map_and_range() -> Result<()> {
    let variables = Variables::new().with("m", Value::map([("a", 1i64), ("b", 2i64)]));
    assert_eq!(render("{% for e in m %}{{ e.key }}={{ e.value }};{% endfor %}", variables)?, "a=1;b=2;");
    assert_eq!(render("{% for i in 1..3 %}{{ i }}{% endfor %}", Variables::new())?, "123");
    Ok(())
}

#[test]
fn test_loop_over_iterator_is_one_shot() -> Result<()> {
    let variables = Variables::new().with("it", Value::iterator((1..=3i64).map(Value::Long)));
    let output = render("{% for i in it %}{{ i }}{% if loop.last %}({{ loop.length }}){% endif %}{% endfor %}", variables)?;
    assert_eq!(output, "123(3)");
    Ok(())
}

#[test]
fn test_if_elseif_else() -> Result<()> {
    let template = "{% if n > 10 %}big{% elseif n > 5 %}medium{% else %}small{% endif %}";
    assert_eq!(render(template, Variables::new().with("n", 12i64))?, "big");
    assert_eq!(render(template, Variables::new().with("n", 7i64))?, "medium");
    assert_eq!(render(template, Variables::new().with("n", 1i64))?, "small");
    Ok(())
}

#[test]
fn test_set_and_scoping() -> Result<()> {
    let output = render(
        "{% set total = 0 %}{% for i in [1, 2, 3] %}{% set total = total + i %}{% endfor %}{{ total }}",
        Variables::new(),
    )?;
    assert_eq!(output, "6", "set inside a loop updates the enclosing variable");
    Ok(())
}

#[test]
fn test_autoescape() -> Result<()> {
    let variables = Variables::new().with("html", "<b>");
    assert_eq!(render("{{ html }}", variables.clone())?, "&lt;b&gt;");
    assert_eq!(render("{{ html | raw }}", variables.clone())?, "<b>");
    assert_eq!(render("{% autoescape false %}{{ html }}{% endautoescape %}", variables.clone())?, "<b>");
    assert_eq!(render("{{ '<i>' }}", variables)?, "<i>", "string literals are trusted");
    Ok(())
}

#[test]
fn test_filter_tag_and_chains() -> Result<()> {
    assert_eq!(render("{% filter upper %}hello {{ name }}{% endfilter %}", Variables::new().with("name", "ada"))?, "HELLO ADA");
    assert_eq!(render("{{ ['a', 'b'] | join(', ') | upper }}", Variables::new())?, "A, B");
    assert_eq!(render("{{ missing | default('none') }}", Variables::new())?, "none");
    Ok(())
}

#[test]
fn test_tests() -> Result<()> {
    assert_eq!(render("{{ 4 is even }} {{ 3 is not even }} {{ x is null }}", Variables::new())?, "true true true");
    assert_eq!(render("{{ [] is empty }}", Variables::new())?, "true");
    Ok(())
}

#[test]
fn test_interpolation_and_whitespace_control() -> Result<()> {
    assert_eq!(render("{{ \"Hi #{name}!\" }}", Variables::new().with("name", "Ada"))?, "Hi Ada!");
    assert_eq!(render("a   {{- 'b' -}}   c", Variables::new())?, "abc");
    assert_eq!(render("{% if true %}\nyes\n{% endif %}\n", Variables::new())?, "yes\n");
    Ok(())
}

#[test]
fn test_verbatim() -> Result<()> {
    assert_eq!(render("{% verbatim %}{{ not parsed }}{% endverbatim %}", Variables::new())?, "{{ not parsed }}");
    Ok(())
}

#[test]
fn test_rendering_is_idempotent() -> Result<()> {
    let engine = memory_engine(&[("t", "{% for i in items %}{{ i | upper }}{% endfor %}")])?;
    let template = engine.get_template("t")?;
    let variables = Variables::new().with("items", vec!["x", "y"]);
    let first = template.render(variables.clone())?;
    let second = template.render(variables)?;
    assert_eq!(first, second);
    assert_eq!(first, "XY");
    Ok(())
}

#[test]
fn test_json_context_and_locale() -> Result<()> {
    let engine = Engine::builder().default_locale("de").build()?;
    let template = engine.get_literal_template("{{ user.name }} {{ user.tags[1] }} {{ locale }}")?;
    let variables = Variables::try_from(serde_json::json!({"user": {"name": "Ada", "tags": ["a", "b"]}}))?;
    assert_eq!(template.render(variables.clone())?, "Ada b de");
    assert_eq!(template.render_with_locale(variables, "fr")?, "Ada b fr");
    Ok(())
}

#[test]
fn test_unicode_names_starting_with_word_operators() -> Result<()> {
    let output = render("{% set notä = 1 %}{% set orß = 2 %}{{ notä + orß }}{{ not false }}", Variables::new())?;
    assert_eq!(output, "3true");
    Ok(())
}
