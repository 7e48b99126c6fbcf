//! Symbol discovery.
//!
//! The scanner finds the namespaces, classes, interfaces, traits, global
//! functions and `define()`d constants a PHP file declares, without a full
//! parse.  Every pattern runs over a [mask](crate::lexer) of the file, so
//! declarations mentioned in comments, strings or inline HTML are never
//! seen, while offsets still point into the original text.
//!
//! Namespace scoping follows PHP:
//!   - `namespace Foo;` applies until the next namespace statement or the
//!     end of the file;
//!   - `namespace Foo { ... }` and `namespace { ... }` apply to their block;
//!   - code is implicitly global only in a file with no namespace
//!     statement at all.

use std::sync::LazyLock;

use regex::bytes::Regex;
use tracing::{debug, info, warn};

use crate::builtins::{BuiltinFunctions, is_reserved_class_name};
use crate::config::{Exclusions, PrefixerConfig};
use crate::error::{PrefixError, Result};
use crate::files::{File, FileSystem};
use crate::lexer::{MaskOptions, is_code_at, is_ident_byte, mask_code};
use crate::symbols::{DiscoveredSymbol, DiscoveredSymbols, SymbolKind};

/// A PHP identifier: ASCII letters, digits, underscores and any non-ASCII
/// character, not starting with a digit.
pub(crate) const IDENT: &str = r"[A-Za-z_\x{80}-\x{10FFFF}][A-Za-z0-9_\x{80}-\x{10FFFF}]*";

const NAMESPACE_STATEMENT: &str = concat!(
    r"(?i)\bnamespace\b\s*(",
    r"[A-Za-z_\x{80}-\x{10FFFF}][A-Za-z0-9_\x{80}-\x{10FFFF}]*",
    r"(?:\\[A-Za-z_\x{80}-\x{10FFFF}][A-Za-z0-9_\x{80}-\x{10FFFF}]*)*",
    r")?\s*([;{])"
);

const CLASS_DECLARATION: &str = concat!(
    r"(?i)\b(class|interface|trait)\s+(",
    r"[A-Za-z_\x{80}-\x{10FFFF}][A-Za-z0-9_\x{80}-\x{10FFFF}]*",
    r")\s*(?:\{|extends\b|implements\b)"
);

const CLASS_BODY_KEYWORD: &str = r"(?i)\b(class|interface|trait|enum)\b";

const FUNCTION_DECLARATION: &str = concat!(
    r"(?i)\bfunction(?:\s+|\s*&\s*)(",
    r"[A-Za-z_\x{80}-\x{10FFFF}][A-Za-z0-9_\x{80}-\x{10FFFF}]*",
    r")\s*\("
);

const DEFINE_CALL: &str = concat!(
    r#"(?i)\bdefine\s*\(\s*['"]("#,
    r"[A-Za-z_\x{80}-\x{10FFFF}][A-Za-z0-9_\x{80}-\x{10FFFF}]*",
    r#")['"]\s*,"#
);

const CONST_STATEMENT: &str = concat!(
    r"(?i)\bconst\s+(",
    r"[A-Za-z_\x{80}-\x{10FFFF}][A-Za-z0-9_\x{80}-\x{10FFFF}]*",
    r")\s*="
);

type Compiled = LazyLock<std::result::Result<Regex, regex::Error>>;

static NAMESPACE_STATEMENT_RE: Compiled = LazyLock::new(|| Regex::new(NAMESPACE_STATEMENT));
static CLASS_DECLARATION_RE: Compiled = LazyLock::new(|| Regex::new(CLASS_DECLARATION));
static CLASS_BODY_KEYWORD_RE: Compiled = LazyLock::new(|| Regex::new(CLASS_BODY_KEYWORD));
static FUNCTION_DECLARATION_RE: Compiled = LazyLock::new(|| Regex::new(FUNCTION_DECLARATION));
static DEFINE_CALL_RE: Compiled = LazyLock::new(|| Regex::new(DEFINE_CALL));
static CONST_STATEMENT_RE: Compiled = LazyLock::new(|| Regex::new(CONST_STATEMENT));

fn fixed(re: &'static Compiled, operation: &'static str, source: &str) -> Result<&'static Regex> {
    LazyLock::force(re)
        .as_ref()
        .map_err(|e| PrefixError::pattern(operation, source, e.clone()))
}

/// The span of source text governed by one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceRegion {
    /// The namespace name, `None` for the global namespace.
    pub name: Option<String>,
    /// Offset of the `namespace` keyword (0 for an implicit global region).
    pub start: usize,
    /// Offset just past the opening `{` or `;`.
    pub body_start: usize,
    /// Offset just past the region (the closing `}` for braced blocks).
    pub end: usize,
    pub braced: bool,
}

impl NamespaceRegion {
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end
    }

    pub fn is_global(&self) -> bool {
        self.name.is_none()
    }
}

/// Offset of the `}` matching the `{` at `open`, counting braces in a
/// code-only mask.
pub(crate) fn matching_brace(mask: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, &b) in mask.iter().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// The last non-whitespace byte before `offset`, with its position.
pub(crate) fn previous_significant(mask: &[u8], offset: usize) -> Option<(usize, u8)> {
    mask[..offset]
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map(|i| (i, mask[i]))
}

/// Whether the keyword at `offset` is used as a member or variable name
/// (`$x->class`, `Foo::class`, `$namespace`) rather than as a keyword.
fn is_member_name(mask: &[u8], offset: usize) -> bool {
    if offset > 0 && (mask[offset - 1] == b'$' || mask[offset - 1] == b'\\') {
        return true;
    }
    match previous_significant(mask, offset) {
        Some((i, b'>')) => i > 0 && mask[i - 1] == b'-',
        Some((i, b':')) => i > 0 && mask[i - 1] == b':',
        _ => false,
    }
}

/// Whether a declaration keyword at `offset` starts a statement, allowing
/// for `abstract`, `final` and `readonly` modifiers and attributes.
fn at_statement_start(mask: &[u8], offset: usize) -> bool {
    let mut i = offset;
    loop {
        let Some((pos, prev)) = previous_significant(mask, i) else {
            return true;
        };
        if is_ident_byte(prev) {
            let mut word_start = pos;
            while word_start > 0 && is_ident_byte(mask[word_start - 1]) {
                word_start -= 1;
            }
            let word = &mask[word_start..=pos];
            let is_modifier = [&b"abstract"[..], b"final", b"readonly"]
                .iter()
                .any(|m| word.eq_ignore_ascii_case(m));
            if !is_modifier {
                return false;
            }
            i = word_start;
            continue;
        }
        return match prev {
            b';' | b'{' | b'}' | b']' | b')' => true,
            b':' => pos == 0 || mask[pos - 1] != b':',
            _ => false,
        };
    }
}

/// Split a file into namespace regions.
///
/// `mask` must be the code-only mask of `content`.  A file without any
/// namespace statement is one implicit global region; otherwise only the
/// declared regions are returned.
pub fn namespace_regions(content: &str, mask: &[u8]) -> Result<Vec<NamespaceRegion>> {
    let re = fixed(
        &NAMESPACE_STATEMENT_RE,
        "scan_namespaces",
        NAMESPACE_STATEMENT,
    )?;

    let mut statements = Vec::new();
    for caps in re.captures_iter(mask) {
        let Some(whole) = caps.get(0) else { continue };
        if is_member_name(mask, whole.start()) {
            continue;
        }
        let name = caps
            .get(1)
            .map(|m| content[m.start()..m.end()].to_string());
        let braced = caps.get(2).is_some_and(|m| m.as_bytes() == b"{");
        statements.push((whole.start(), whole.end(), name, braced));
    }

    if statements.is_empty() {
        return Ok(vec![NamespaceRegion {
            name: None,
            start: 0,
            body_start: 0,
            end: content.len(),
            braced: false,
        }]);
    }

    let mut regions: Vec<NamespaceRegion> = Vec::new();
    let mut index = 0;
    while index < statements.len() {
        let (start, body_start, ref name, braced) = statements[index];
        // A statement nested inside a previous braced block is not a real
        // namespace statement.
        if regions
            .last()
            .is_some_and(|r| r.braced && start < r.end)
        {
            index += 1;
            continue;
        }
        let end = if braced {
            matching_brace(mask, body_start - 1).map_or(content.len(), |close| close + 1)
        } else {
            statements
                .get(index + 1)
                .map_or(content.len(), |next| next.0)
        };
        regions.push(NamespaceRegion {
            name: name.clone(),
            start,
            body_start,
            end,
            braced,
        });
        index += 1;
    }
    Ok(regions)
}

/// Body spans (`{` to `}`) of every class, interface, trait and enum,
/// including anonymous classes.
pub(crate) fn class_bodies(mask: &[u8]) -> Result<Vec<(usize, usize)>> {
    let re = fixed(&CLASS_BODY_KEYWORD_RE, "scan_class_bodies", CLASS_BODY_KEYWORD)?;
    let mut bodies = Vec::new();
    for m in re.find_iter(mask) {
        if is_member_name(mask, m.start()) {
            continue;
        }
        if m.as_bytes().eq_ignore_ascii_case(b"enum") {
            // `enum` is only a keyword when a name follows.
            let rest = &mask[m.end()..];
            let ws = rest.iter().take_while(|b| b.is_ascii_whitespace()).count();
            if ws == 0 || !rest.get(ws).is_some_and(|&b| is_ident_byte(b) && !b.is_ascii_digit()) {
                continue;
            }
        }
        let Some(open) = mask[m.end()..]
            .iter()
            .position(|&b| b == b'{' || b == b';')
            .map(|p| m.end() + p)
            .filter(|&p| mask[p] == b'{')
        else {
            continue;
        };
        let close = matching_brace(mask, open).unwrap_or(mask.len());
        bodies.push((open, close));
    }
    Ok(bodies)
}

fn inside_any(spans: &[(usize, usize)], offset: usize) -> bool {
    spans.iter().any(|&(open, close)| offset > open && offset < close)
}

/// Discovers symbols in PHP files.
#[derive(Debug, Clone)]
pub struct SymbolScanner {
    builtins: BuiltinFunctions,
    exclusions: Exclusions,
}

impl SymbolScanner {
    pub fn new(config: &PrefixerConfig) -> Result<Self> {
        Ok(Self {
            builtins: BuiltinFunctions::with_extra(&config.polyfill_functions),
            exclusions: Exclusions::from_config(config)?,
        })
    }

    /// Scan every PHP file, returning the combined symbol set.
    ///
    /// A file that cannot be read is logged and skipped.  Each file's
    /// `discovered_symbols` is filled in, and its `do_prefix` flag cleared
    /// when its package or path is excluded.
    pub fn find_in_files(
        &self,
        files: &mut [File],
        fs: &dyn FileSystem,
    ) -> Result<DiscoveredSymbols> {
        let mut discovered = DiscoveredSymbols::new();
        let mut scanned = 0usize;

        for file in files.iter_mut().filter(|f| f.is_php()) {
            if self.exclusions.excludes_package(file.package.as_deref())
                || self.exclusions.excludes_path(&file.relative_path)
            {
                file.do_prefix = false;
            }

            let contents = match fs.read_to_string(&file.source_path) {
                Ok(c) => c,
                Err(e) => {
                    warn!("skipping {}: {}", file.source_path.display(), e);
                    continue;
                }
            };
            scanned += 1;

            let symbols = self.find_in_string(&contents, file)?;
            debug!(
                "found {} symbols in {}",
                symbols.len(),
                file.source_path.display()
            );
            for symbol in symbols {
                let key = discovered.add(symbol);
                if !file.discovered_symbols.contains(&key) {
                    file.discovered_symbols.push(key);
                }
            }
        }

        info!(
            "scanned {} files, found {} symbols",
            scanned,
            discovered.len()
        );
        Ok(discovered)
    }

    /// Find the symbols declared in one file's contents.
    pub fn find_in_string(&self, contents: &str, file: &File) -> Result<Vec<DiscoveredSymbol>> {
        let code = mask_code(contents, MaskOptions::CODE_ONLY);
        let regions = namespace_regions(contents, &code)?;
        let bodies = class_bodies(&code)?;
        let namespace_at = |offset: usize| -> Option<Option<&str>> {
            regions
                .iter()
                .find(|r| r.contains(offset))
                .map(|r| r.name.as_deref())
        };

        let mut found = Vec::new();

        for region in regions.iter().filter(|r| !r.is_global()) {
            let name = region.name.as_deref().unwrap_or_default();
            let mut symbol = DiscoveredSymbol::new(SymbolKind::Namespace, name, None, file);
            if self.exclusions.excludes_namespace(symbol.original_symbol()) {
                symbol.exclude();
            }
            found.push(symbol);
        }

        let class_re = fixed(&CLASS_DECLARATION_RE, "scan_classes", CLASS_DECLARATION)?;
        for caps in class_re.captures_iter(&code) {
            let (Some(keyword), Some(name)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            if !at_statement_start(&code, keyword.start()) {
                continue;
            }
            let name = &contents[name.start()..name.end()];
            if is_reserved_class_name(name) {
                continue;
            }
            let kind = match keyword.as_bytes().to_ascii_lowercase().as_slice() {
                b"interface" => SymbolKind::Interface,
                b"trait" => SymbolKind::Trait,
                _ => SymbolKind::Class,
            };
            let Some(namespace) = namespace_at(keyword.start()) else {
                debug!("ignoring {} {} outside any namespace block", kind, name);
                continue;
            };
            found.push(self.symbol(kind, name, namespace, file));
        }

        let function_re = fixed(
            &FUNCTION_DECLARATION_RE,
            "scan_functions",
            FUNCTION_DECLARATION,
        )?;
        for caps in function_re.captures_iter(&code) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if inside_any(&bodies, whole.start()) || is_member_name(&code, whole.start()) {
                continue;
            }
            let name = &contents[name.start()..name.end()];
            let Some(namespace) = namespace_at(whole.start()) else {
                continue;
            };
            if namespace.is_none() && self.builtins.contains(name) {
                debug!("not recording built-in/polyfill function {}", name);
                continue;
            }
            found.push(self.symbol(SymbolKind::Function, name, namespace, file));
        }

        let strings_kept = mask_code(contents, MaskOptions::KEEP_STRINGS);
        let define_re = fixed(&DEFINE_CALL_RE, "scan_constants", DEFINE_CALL)?;
        for caps in define_re.captures_iter(&strings_kept) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if !is_code_at(contents, &code, whole.start()) || is_member_name(&code, whole.start()) {
                continue;
            }
            let name = &contents[name.start()..name.end()];
            found.push(DiscoveredSymbol::new(SymbolKind::Constant, name, None, file));
        }

        let const_re = fixed(&CONST_STATEMENT_RE, "scan_constants", CONST_STATEMENT)?;
        for caps in const_re.captures_iter(&code) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if inside_any(&bodies, whole.start()) || !at_statement_start(&code, whole.start()) {
                continue;
            }
            // `const` in a named namespace declares a namespaced constant,
            // which moves with its namespace.
            if namespace_at(whole.start()) != Some(None) {
                continue;
            }
            let name = &contents[name.start()..name.end()];
            found.push(DiscoveredSymbol::new(SymbolKind::Constant, name, None, file));
        }

        Ok(found)
    }

    fn symbol(
        &self,
        kind: SymbolKind,
        name: &str,
        namespace: Option<&str>,
        file: &File,
    ) -> DiscoveredSymbol {
        let mut symbol = DiscoveredSymbol::new(kind, name, namespace, file);
        if let Some(ns) = namespace
            && self.exclusions.excludes_namespace(ns)
        {
            symbol.exclude();
        }
        symbol
    }
}
