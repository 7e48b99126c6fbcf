mod common;

use common::{decide, prefixed_config};
use php_prefixer::{PrefixerConfig, SymbolKind, replace_in_string};

fn rewrite_twice(symbols: &php_prefixer::DiscoveredSymbols, input: &str) -> String {
    let once = replace_in_string(symbols, input).unwrap();
    let twice = replace_in_string(symbols, &once).unwrap();
    assert_eq!(once, twice, "second rewrite changed the output");
    once
}

// ─── End-to-end scenarios ───────────────────────────────────────────────────

#[test]
fn test_namespaced_class_file() {
    let config = PrefixerConfig {
        namespace_prefix: Some("Strauss\\".to_string()),
        ..PrefixerConfig::default()
    };
    let input = "namespace Foo\\Bar; class Baz {}";
    let symbols = decide(&config, &[("foo/bar/src/Baz.php", input)]);

    let changed: Vec<(SymbolKind, &str, &str)> = symbols
        .changed()
        .filter(|s| s.kind() == SymbolKind::Namespace)
        .map(|s| (s.kind(), s.original_symbol(), s.replacement().unwrap()))
        .collect();
    assert_eq!(
        changed,
        vec![(SymbolKind::Namespace, "Foo\\Bar", "Strauss\\Foo\\Bar")]
    );

    assert_eq!(
        rewrite_twice(&symbols, input),
        "namespace Strauss\\Foo\\Bar; class Baz {}"
    );
}

#[test]
fn test_function_exists_guard() {
    let config = PrefixerConfig {
        functions_prefix: Some("pfx_".to_string()),
        ..PrefixerConfig::default()
    };
    let input = "<?php\nif (!function_exists('collect')) {\n    function collect($v=null){}\n}\n";
    let symbols = decide(&config, &[("illuminate/support/helpers.php", input)]);
    assert_eq!(
        rewrite_twice(&symbols, input),
        "<?php\nif (!function_exists('pfx_collect')) {\n    function pfx_collect($v=null){}\n}\n"
    );
}

#[test]
fn test_scope_correctness() {
    let input = "<?php\nnamespace A {\n    class X {}\n    $y = new Y();\n}\nnamespace {\n    class Y {}\n    $y = new Y();\n}\n";
    let symbols = decide(&prefixed_config("Pfx"), &[("a/a/src/both.php", input)]);

    let x = symbols.get(SymbolKind::Class, "A\\X").unwrap();
    assert_eq!(x.namespace(), "A");
    let y = symbols.get(SymbolKind::Class, "Y").unwrap();
    assert!(y.is_global());
    assert_eq!(y.replacement(), Some("Pfx_Y"));

    assert_eq!(
        rewrite_twice(&symbols, input),
        "<?php\nnamespace Pfx\\A {\n    class X {}\n    $y = new Y();\n}\nnamespace {\n    class Pfx_Y {}\n    $y = new Pfx_Y();\n}\n"
    );
}

#[test]
fn test_comment_immunity() {
    let input = "<?php\n// A class as good as any.\nclass Whatever {}\n";
    let symbols = decide(&prefixed_config("Pfx"), &[("a/a/src/w.php", input)]);
    let names: Vec<&str> = symbols.iter().map(|s| s.original_symbol()).collect();
    assert_eq!(names, vec!["Whatever"]);
}

#[test]
fn test_doubled_backslash_string() {
    let config = PrefixerConfig {
        namespace_prefix: Some("Strauss".to_string()),
        ..PrefixerConfig::default()
    };
    let symbols = decide(
        &config,
        &[(
            "example/sdk/src/Endpoints/Client.php",
            "<?php\nnamespace Example\\Sdk\\Endpoints;\nclass Client {}\n",
        )],
    );
    assert_eq!(
        rewrite_twice(&symbols, r#"<?php $class = "Example\\Sdk\\Endpoints";"#),
        r#"<?php $class = "Strauss\\Example\\Sdk\\Endpoints";"#
    );
}

#[test]
fn test_dragon_is_not_prefixed_twice() {
    let config = PrefixerConfig {
        namespace_prefix: Some("Dragon\\Dependencies".to_string()),
        ..PrefixerConfig::default()
    };
    let symbols = decide(
        &config,
        &[("dragon/dragon/src/Dragon.php", "<?php\nnamespace Dragon;\nclass Dragon {}\n")],
    );
    assert_eq!(
        symbols
            .get(SymbolKind::Namespace, "Dragon")
            .and_then(|s| s.replacement()),
        Some("Dragon\\Dependencies\\Dragon")
    );
    let already = "<?php\nnamespace Dragon\\Dependencies\\Dragon\\Form;\n";
    assert_eq!(rewrite_twice(&symbols, already), already);
}

#[test]
fn test_function_and_method_share_a_name() {
    let source = "<?php\nfunction my_function() {}\nclass Thing {\n    public function my_function() {}\n}\n";
    let symbols = decide(&prefixed_config("Pfx"), &[("a/a/src/f.php", source)]);

    let usage = "<?php\nmy_function();\n$obj->my_function();\n";
    assert_eq!(
        rewrite_twice(&symbols, usage),
        "<?php\npfx_my_function();\n$obj->my_function();\n"
    );
    assert_eq!(
        rewrite_twice(&symbols, source),
        "<?php\nfunction pfx_my_function() {}\nclass Pfx_Thing {\n    public function my_function() {}\n}\n"
    );
}

#[test]
fn test_namespaced_interface_and_usages_across_files() {
    let symbols = decide(
        &prefixed_config("Acme\\Deps"),
        &[
            (
                "psr/container/src/ContainerInterface.php",
                "<?php\nnamespace Psr\\Container;\n\ninterface ContainerInterface\n{\n    public function get(string $id);\n}\n",
            ),
            (
                "league/container/src/Container.php",
                "<?php\nnamespace League\\Container;\n\nuse Psr\\Container\\ContainerInterface;\n\nclass Container implements ContainerInterface\n{\n}\n",
            ),
        ],
    );

    let consumer = "<?php\nnamespace League\\Container;\n\nuse Psr\\Container\\ContainerInterface;\n\nclass Container implements ContainerInterface\n{\n}\n";
    assert_eq!(
        rewrite_twice(&symbols, consumer),
        "<?php\nnamespace Acme\\Deps\\League\\Container;\n\nuse Acme\\Deps\\Psr\\Container\\ContainerInterface;\n\nclass Container implements ContainerInterface\n{\n}\n"
    );
}

#[test]
fn test_global_constant_file() {
    let source = "<?php\ndefine('MY_PLUGIN_VERSION', '1.0');\necho MY_PLUGIN_VERSION;\n";
    let symbols = decide(&prefixed_config("Pfx"), &[("a/a/constants.php", source)]);
    assert_eq!(
        rewrite_twice(&symbols, source),
        "<?php\ndefine('PFX_MY_PLUGIN_VERSION', '1.0');\necho PFX_MY_PLUGIN_VERSION;\n"
    );
}
