//! Compatibility aliases.
//!
//! After prefixing, code that still names a dependency symbol by its
//! original name (dev tooling, tests, other plugins) would break.  This
//! module generates one PHP file mapping every original name to its new
//! one:
//!
//! - classes get a lazy `class_alias()` inside an autoloader;
//! - interfaces and traits get a declared shim extending or using the new
//!   symbol, so `instanceof` keeps working in both directions;
//! - functions get a forwarding wrapper;
//! - constants get a mirror defined from the prefixed constant.
//!
//! An alias is only emitted for a class-like whose new name is present in
//! the [`ClassMap`] of the rewritten files, since `class_alias()` fails on
//! a target that cannot be loaded.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::error::{PrefixError, Result};
use crate::files::{File, FileSystem};
use crate::scanner::SymbolScanner;
use crate::symbols::{DiscoveredSymbol, DiscoveredSymbols, SymbolKind, short_name};

/// Location of the generated file, relative to the target directory.
pub const ALIASES_FILE: &str = "composer/autoload_aliases.php";

const REQUIRE_LINE: &str = "require_once __DIR__ . '/composer/autoload_aliases.php';";

/// Fully qualified class-like names known to be loadable, with the file
/// declaring each.
#[derive(Debug, Clone, Default)]
pub struct ClassMap {
    /// Keyed by lowercased name, as PHP class names are case-insensitive.
    classes: BTreeMap<String, (String, PathBuf)>,
}

impl ClassMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The class-likes of a decided symbol set, under their new names.
    pub fn from_symbols(symbols: &DiscoveredSymbols) -> Self {
        let mut map = Self::new();
        for symbol in symbols.class_likes() {
            let name = if symbol.is_changed() {
                symbol.replacement().unwrap_or(symbol.original_symbol())
            } else {
                symbol.original_symbol()
            };
            if let Some(path) = symbol.source_files().first() {
                map.insert(name, path.clone());
            }
        }
        map
    }

    /// The class-likes actually declared in the (rewritten) files.
    pub fn from_files(files: &[File], fs: &dyn FileSystem, scanner: &SymbolScanner) -> Result<Self> {
        let mut map = Self::new();
        for file in files.iter().filter(|f| f.is_php()) {
            let contents = match fs.read_to_string(&file.target_path) {
                Ok(contents) => contents,
                Err(e) => {
                    warn!("classmap: skipping {}: {}", file.target_path.display(), e);
                    continue;
                }
            };
            for symbol in scanner.find_in_string(&contents, file)? {
                if symbol.kind().is_class_like() {
                    map.insert(symbol.original_symbol(), file.target_path.clone());
                }
            }
        }
        debug!("classmap holds {} class-likes", map.len());
        Ok(map)
    }

    pub fn insert(&mut self, fqcn: &str, path: PathBuf) {
        let fqcn = fqcn.trim_start_matches('\\');
        self.classes
            .entry(fqcn.to_ascii_lowercase())
            .or_insert_with(|| (fqcn.to_string(), path));
    }

    pub fn contains(&self, fqcn: &str) -> bool {
        self.classes
            .contains_key(&fqcn.trim_start_matches('\\').to_ascii_lowercase())
    }

    pub fn path(&self, fqcn: &str) -> Option<&Path> {
        self.classes
            .get(&fqcn.trim_start_matches('\\').to_ascii_lowercase())
            .map(|(_, path)| path.as_path())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.classes
            .values()
            .map(|(name, path)| (name.as_str(), path.as_path()))
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// A PHP single-quoted string literal.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn split_namespace(fqn: &str) -> (&str, &str) {
    match fqn.rfind('\\') {
        Some(i) => (&fqn[..i], &fqn[i + 1..]),
        None => ("", fqn),
    }
}

/// The declaration evaluated to shim an interface or trait.
fn shim_declaration(symbol: &DiscoveredSymbol, replacement: &str) -> Option<String> {
    let (namespace, name) = split_namespace(symbol.original_symbol());
    let body = match symbol.kind() {
        SymbolKind::Interface => format!("interface {} extends \\{} {{}}", name, replacement),
        SymbolKind::Trait => format!("trait {} {{ use \\{}; }}", name, replacement),
        SymbolKind::Class
        | SymbolKind::Namespace
        | SymbolKind::Function
        | SymbolKind::Constant => return None,
    };
    Some(if namespace.is_empty() {
        body
    } else {
        format!("namespace {}; {}", namespace, body)
    })
}

/// Render the aliases file, or `None` when no symbol needs an alias.
pub fn render_aliases(symbols: &DiscoveredSymbols, classmap: &ClassMap) -> Option<String> {
    let mut cases = String::new();
    let mut functions: IndexMap<&str, String> = IndexMap::new();
    let mut constants = String::new();
    let mut count = 0usize;

    for symbol in symbols.changed() {
        let Some(replacement) = symbol.replacement() else {
            continue;
        };
        let original = symbol.original_symbol();
        match symbol.kind() {
            SymbolKind::Namespace => {}
            SymbolKind::Class | SymbolKind::Interface | SymbolKind::Trait => {
                if !classmap.contains(replacement) {
                    debug!(
                        "no alias for {}: {} is not in the classmap",
                        original, replacement
                    );
                    continue;
                }
                let _ = writeln!(cases, "            case {}:", quote(original));
                match shim_declaration(symbol, replacement) {
                    Some(declaration) => {
                        let _ = writeln!(cases, "                eval({});", quote(&declaration));
                    }
                    None => {
                        let _ = writeln!(
                            cases,
                            "                class_alias({}, {});",
                            quote(replacement),
                            quote(original)
                        );
                    }
                }
                let _ = writeln!(cases, "                break;");
                count += 1;
            }
            SymbolKind::Function => {
                let namespace = if symbol.is_global() { "" } else { symbol.namespace() };
                let block = functions.entry(namespace).or_default();
                let _ = writeln!(block, "    if (!function_exists({})) {{", quote(original));
                let _ = writeln!(
                    block,
                    "        function {}(...$args) {{ return \\{}(...$args); }}",
                    short_name(original),
                    replacement
                );
                let _ = writeln!(block, "    }}");
                count += 1;
            }
            SymbolKind::Constant => {
                let _ = writeln!(
                    constants,
                    "    if (defined({new}) && !defined({old})) {{ define({old}, constant({new})); }}",
                    new = quote(replacement),
                    old = quote(original)
                );
                count += 1;
            }
        }
    }

    if count == 0 {
        return None;
    }

    let mut out = String::from(
        "<?php\n/**\n * Original names of prefixed dependency symbols.\n *\n * @generated by php-prefixer. Do not edit.\n */\n",
    );
    if !cases.is_empty() {
        out.push_str("\nnamespace {\n");
        out.push_str("    spl_autoload_register(function ($class) {\n");
        out.push_str("        switch ($class) {\n");
        out.push_str(&cases);
        out.push_str("        }\n");
        out.push_str("    });\n");
        out.push_str("}\n");
    }
    for (namespace, block) in &functions {
        if namespace.is_empty() {
            out.push_str("\nnamespace {\n");
        } else {
            let _ = writeln!(out, "\nnamespace {} {{", namespace);
        }
        out.push_str(block);
        out.push_str("}\n");
    }
    if !constants.is_empty() {
        out.push_str("\nnamespace {\n");
        out.push_str(&constants);
        out.push_str("}\n");
    }
    info!("generated {} aliases", count);
    Some(out)
}

/// Write the aliases file beneath `target_dir`.  Returns its path, or
/// `None` when there was nothing to alias.
pub fn write_aliases_file_for_symbols(
    symbols: &DiscoveredSymbols,
    classmap: &ClassMap,
    target_dir: &Path,
    fs: &dyn FileSystem,
) -> Result<Option<PathBuf>> {
    let Some(contents) = render_aliases(symbols, classmap) else {
        debug!("no aliases to write");
        return Ok(None);
    };
    let path = target_dir.join(ALIASES_FILE);
    fs.write(&path, &contents)
        .map_err(|e| PrefixError::io(&path, e))?;
    Ok(Some(path))
}

/// Load the aliases file from `autoload.php`, right after its opening tag.
///
/// Returns whether the file was changed; an `autoload.php` that already
/// requires the aliases is left alone.
pub fn insert_aliases_require(autoload_php: &Path, fs: &dyn FileSystem) -> Result<bool> {
    let contents = fs
        .read_to_string(autoload_php)
        .map_err(|e| PrefixError::io(autoload_php, e))?;
    if contents.contains(REQUIRE_LINE) {
        return Ok(false);
    }
    let Some(tag) = contents.find("<?php") else {
        warn!("{} has no opening tag, not loading aliases", autoload_php.display());
        return Ok(false);
    };
    let line_end = contents[tag..]
        .find('\n')
        .map_or(contents.len(), |i| tag + i + 1);
    let newline = if contents[..line_end].ends_with("\r\n") { "\r\n" } else { "\n" };

    let mut updated = String::with_capacity(contents.len() + REQUIRE_LINE.len() + 4);
    updated.push_str(&contents[..line_end]);
    if line_end == contents.len() && !contents.ends_with('\n') {
        updated.push_str(newline);
    }
    updated.push_str(newline);
    updated.push_str(REQUIRE_LINE);
    updated.push_str(newline);
    updated.push_str(&contents[line_end..]);

    fs.write(autoload_php, &updated)
        .map_err(|e| PrefixError::io(autoload_php, e))?;
    Ok(true)
}
