//! Data-driven rewrite tests.
//!
//! Each `tests/fixtures/*.fixture` file holds a TOML configuration, the
//! dependency files to scan, an input to rewrite and the expected output:
//!
//! ```text
//! --- config ---
//! namespace_prefix = 'Pfx'
//! --- file: foo/bar/src/Baz.php ---
//! <?php namespace Foo\Bar; class Baz {}
//! --- input ---
//! <?php use Foo\Bar\Baz;
//! --- expected ---
//! <?php use Pfx\Foo\Bar\Baz;
//! ```
//!
//! The input is rewritten twice; the second pass must not change it.

mod common;

use std::path::Path;

use php_prefixer::{PrefixerConfig, replace_in_string};

#[derive(Default)]
struct Fixture {
    config: String,
    files: Vec<(String, String)>,
    input: Option<String>,
    expected: Option<String>,
}

enum Section {
    None,
    Config,
    File,
    Input,
    Expected,
}

fn flush(section: &Section, buffer: &mut String, fixture: &mut Fixture) {
    let text = std::mem::take(buffer);
    match section {
        Section::None => {}
        Section::Config => fixture.config = text,
        Section::File => {
            if let Some(last) = fixture.files.last_mut() {
                last.1 = text;
            }
        }
        Section::Input => fixture.input = Some(text),
        Section::Expected => fixture.expected = Some(text),
    }
}

fn parse_fixture(contents: &str) -> Result<Fixture, String> {
    let mut fixture = Fixture::default();
    let mut section = Section::None;
    let mut buffer = String::new();

    for line in contents.split_inclusive('\n') {
        let header = line
            .trim_end()
            .strip_prefix("--- ")
            .and_then(|rest| rest.strip_suffix(" ---"));
        let Some(header) = header else {
            buffer.push_str(line);
            continue;
        };
        flush(&section, &mut buffer, &mut fixture);
        section = match header {
            "config" => Section::Config,
            "input" => Section::Input,
            "expected" => Section::Expected,
            other => match other.strip_prefix("file: ") {
                Some(relative) => {
                    fixture.files.push((relative.trim().to_string(), String::new()));
                    Section::File
                }
                None => return Err(format!("unknown section `{}`", other)),
            },
        };
    }
    flush(&section, &mut buffer, &mut fixture);
    Ok(fixture)
}

fn run_fixture(path: &Path, contents: String) -> datatest_stable::Result<()> {
    let fixture = parse_fixture(&contents)?;
    let config = PrefixerConfig::from_toml_str(&fixture.config, path)?;
    let input = fixture.input.ok_or("fixture has no input section")?;
    let expected = fixture.expected.ok_or("fixture has no expected section")?;

    let files: Vec<(&str, &str)> = fixture
        .files
        .iter()
        .map(|(relative, source)| (relative.as_str(), source.as_str()))
        .collect();
    let symbols = common::decide(&config, &files);

    let once = replace_in_string(&symbols, &input)?;
    if once != expected {
        return Err(format!(
            "{}: output differs\n--- expected ---\n{}--- actual ---\n{}",
            path.display(),
            expected,
            once
        )
        .into());
    }
    let twice = replace_in_string(&symbols, &once)?;
    if twice != once {
        return Err(format!(
            "{}: second rewrite changed the output\n{}",
            path.display(),
            twice
        )
        .into());
    }
    Ok(())
}

datatest_stable::harness! {
    { test = run_fixture, root = "tests/fixtures", pattern = r"\.fixture$" },
}
