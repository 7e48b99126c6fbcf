//! Source rewriting.
//!
//! Applies the decided replacements to PHP source text.  Each symbol kind
//! has its own pass, always run in the same order: global class names,
//! then namespaces, then constants, then functions.  A pass finds candidate
//! occurrences with a literal pattern and then checks the surrounding text
//! by hand, since which occurrences are real references depends on what
//! comes before and after them.
//!
//! Every pass refuses to touch an occurrence that already carries its
//! replacement, so rewriting rewritten text changes nothing.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use memchr::memmem;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{PrefixError, Result, compile};
use crate::files::{File, FileSystem};
use crate::lexer::{MaskOptions, is_code_at, is_ident_byte, mask_code};
use crate::scanner::{NamespaceRegion, class_bodies, namespace_regions, previous_significant};
use crate::symbols::{DiscoveredSymbol, DiscoveredSymbols, SymbolKind};

/// Built-ins that take a callable name as a string in their first argument.
const CALLABLE_FUNCTIONS: &str = "function_exists|call_user_func|call_user_func_array\
    |forward_static_call|forward_static_call_array|register_shutdown_function\
    |register_tick_function|unregister_tick_function";

/// Keywords after which a namespace name may appear.
const NAMESPACE_KEYWORDS: &[&str] = &[
    "namespace",
    "use",
    "function",
    "const",
    "new",
    "static",
    "extends",
    "implements",
    "return",
    "instanceof",
];

const CAST_TYPES: &[&str] = &[
    "string", "int", "integer", "bool", "boolean", "float", "double", "array", "object", "binary",
];

/// Files modified by a rewrite, mapped to their owning package (`None` for
/// the project's own files).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangedFiles {
    files: IndexMap<PathBuf, Option<String>>,
}

impl ChangedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, path: impl Into<PathBuf>, package: Option<String>) {
        self.files.insert(path.into(), package);
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    pub fn package_of(&self, path: &Path) -> Option<&str> {
        self.files.get(path).and_then(|p| p.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, Option<&str>)> {
        self.files.iter().map(|(path, package)| (path, package.as_deref()))
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.keys()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn extend(&mut self, other: ChangedFiles) {
        self.files.extend(other.files);
    }
}

/// One symbol's search pattern and its replacement.
#[derive(Debug, Clone)]
struct Rule {
    original: String,
    replacement: String,
    /// Literal used to skip files that cannot contain the symbol.
    needle: String,
    pattern: Regex,
}

#[derive(Debug, Clone)]
struct NamespaceRule {
    rule: Rule,
    /// The replacement with every `\` doubled, for string literals.
    doubled_replacement: String,
}

/// A global function or constant: the bare name plus its string forms.
#[derive(Debug, Clone)]
struct NameRule {
    rule: Rule,
    /// Matches the name where it appears quoted or imported; group 1 is the
    /// name itself.
    quoted: Regex,
}

/// A text substitution at a byte range of the input.
struct Edit<'a> {
    start: usize,
    end: usize,
    text: &'a str,
}

/// Apply non-overlapping edits; on overlap the earliest-added edit at a
/// position wins.
fn apply_edits(contents: &str, mut edits: Vec<Edit<'_>>) -> String {
    if edits.is_empty() {
        return contents.to_string();
    }
    edits.sort_by_key(|e| e.start);
    let extra: usize = edits.iter().map(|e| e.text.len()).sum();
    let mut out = String::with_capacity(contents.len() + extra);
    let mut last = 0;
    for edit in edits {
        if edit.start < last {
            continue;
        }
        out.push_str(&contents[last..edit.start]);
        out.push_str(edit.text);
        last = edit.end;
    }
    out.push_str(&contents[last..]);
    out
}

fn leading_backslashes(bytes: &[u8], start: usize) -> usize {
    bytes[..start].iter().rev().take_while(|&&b| b == b'\\').count()
}

/// The identifier ending at the last non-whitespace byte before `pos`.
fn word_before(bytes: &[u8], pos: usize) -> Option<&[u8]> {
    let (end, b) = previous_significant(bytes, pos)?;
    if !is_ident_byte(b) {
        return None;
    }
    let mut start = end;
    while start > 0 && is_ident_byte(bytes[start - 1]) {
        start -= 1;
    }
    Some(&bytes[start..=end])
}

fn word_in(word: Option<&[u8]>, candidates: &[&str]) -> bool {
    word.is_some_and(|w| candidates.iter().any(|c| w.eq_ignore_ascii_case(c.as_bytes())))
}

/// Whether `pos` directly follows `->`, `?->` or `::`, allowing whitespace.
fn after_member_operator(bytes: &[u8], pos: usize) -> bool {
    match previous_significant(bytes, pos) {
        Some((i, b'>')) => i > 0 && bytes[i - 1] == b'-',
        Some((i, b':')) => i > 0 && bytes[i - 1] == b':',
        _ => false,
    }
}

fn followed_by_call(bytes: &[u8], end: usize) -> bool {
    bytes[end..]
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'(')
}

/// Whether the enum case name ending at `end` is a declaration
/// (`case NAME;` or `case NAME = ...`) rather than a switch label.
fn declares_case(bytes: &[u8], end: usize) -> bool {
    bytes[end..]
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b';' || b == b'=')
}

/// Whether `bytes[start..end]` is the entire body of a quoted string.
fn quoted_whole(bytes: &[u8], start: usize, end: usize) -> bool {
    start > 0
        && matches!(bytes[start - 1], b'\'' | b'"')
        && bytes.get(end) == Some(&bytes[start - 1])
}

/// Whether `offset` sits inside a `/** ... */` comment.
fn in_docblock(bytes: &[u8], mask: &[u8], offset: usize) -> bool {
    memmem::rfind(&bytes[..offset], b"/**").is_some_and(|open| {
        mask[open] != bytes[open] && memmem::find(&bytes[open..offset], b"*/").is_none()
    })
}

fn inside_any(spans: &[(usize, usize)], offset: usize) -> bool {
    spans
        .iter()
        .any(|&(open, close)| offset > open && offset < close)
}

fn region_at(regions: &[NamespaceRegion], offset: usize) -> Option<&NamespaceRegion> {
    regions.iter().find(|r| r.contains(offset))
}

/// Check what precedes a namespace occurrence starting at `start`.
///
/// Returns `None` when the context is not one where a namespace name can
/// appear, otherwise whether the name follows the `namespace` keyword.
fn namespace_preceded_ok(bytes: &[u8], start: usize, lead: usize) -> Option<bool> {
    if lead > 0 {
        let before = start - lead;
        return (before == 0 || !is_ident_byte(bytes[before - 1])).then_some(false);
    }
    if start == 0 {
        return Some(false);
    }
    if matches!(bytes[start - 1], b'\'' | b'"') {
        return Some(false);
    }

    let indent = bytes[..start]
        .iter()
        .rev()
        .take_while(|&&b| b == b' ' || b == b'\t')
        .count();
    let line_start = start - indent;
    if line_start == 0 || matches!(bytes[line_start - 1], b'\n' | b'\r') {
        return Some(false);
    }

    let (p, b) = previous_significant(bytes, start)?;
    match b {
        b'(' | b',' | b'.' | b'=' | b'&' | b'|' | b'!' | b'[' | b'?' | b':' | b'<' => Some(false),
        b'>' => (p > 0 && bytes[p - 1] == b'=').then_some(false),
        // Error suppression: judge what precedes the `@`.
        b'@' => namespace_preceded_ok(bytes, p, 0).map(|_| false),
        b')' => closes_cast(bytes, p).then_some(false),
        _ if is_ident_byte(b) => {
            let word = word_before(bytes, start)?;
            let word_start = p + 1 - word.len();
            if word_start > 0 && bytes[word_start - 1] == b'@' {
                // PHPDoc tag.
                return Some(false);
            }
            let spaced = p + 1 < start;
            if !spaced
                || word_start > 0 && bytes[word_start - 1] == b'$'
                || after_member_operator(bytes, word_start)
            {
                return None;
            }
            NAMESPACE_KEYWORDS
                .iter()
                .any(|k| word.eq_ignore_ascii_case(k.as_bytes()))
                .then(|| word.eq_ignore_ascii_case(b"namespace"))
        }
        _ => None,
    }
}

/// Whether the `)` at `close` ends a type cast such as `(string)`.
fn closes_cast(bytes: &[u8], close: usize) -> bool {
    let inner = &bytes[..close];
    let end = inner.len() - inner.iter().rev().take_while(|b| b.is_ascii_whitespace()).count();
    let word_len = inner[..end].iter().rev().take_while(|&&b| is_ident_byte(b)).count();
    let word = &inner[end - word_len..end];
    let open = end - word_len;
    let open = open - inner[..open].iter().rev().take_while(|b| b.is_ascii_whitespace()).count();
    open > 0
        && inner[open - 1] == b'('
        && CAST_TYPES.iter().any(|t| word.eq_ignore_ascii_case(t.as_bytes()))
}

/// Check what follows a namespace occurrence ending at `end`.
fn namespace_followed_ok(bytes: &[u8], end: usize, after_namespace_keyword: bool) -> bool {
    let rest = &bytes[end..];
    match rest.first() {
        None => false,
        Some(b'\'' | b'"' | b':' | b'<' | b'>') => true,
        Some(b'\\') => {
            let n = rest.iter().take_while(|&&b| b == b'\\').count();
            n <= 2 && rest.get(n).is_some_and(|&b| is_ident_byte(b) || b == b'{')
        }
        Some(_) => {
            let ws = rest.iter().take_while(|b| b.is_ascii_whitespace()).count();
            match rest.get(ws) {
                Some(b';') => true,
                Some(b'{') => after_namespace_keyword,
                Some(b'a' | b'A') if ws > 0 => {
                    rest.len() >= ws + 2
                        && rest[ws..ws + 2].eq_ignore_ascii_case(b"as")
                        && !rest.get(ws + 2).is_some_and(|&b| is_ident_byte(b))
                }
                _ => false,
            }
        }
    }
}

/// Rewrites PHP source using the replacements in a [`DiscoveredSymbols`].
///
/// All search patterns are compiled once, up front.
#[derive(Debug, Clone)]
pub struct Rewriter {
    classes: Vec<Rule>,
    /// Longest name first, so a nested namespace wins over its parent.
    namespaces: Vec<NamespaceRule>,
    constants: Vec<NameRule>,
    functions: Vec<NameRule>,
    /// New names of namespaced functions, for the absolute-call fix-up.
    namespaced_functions: Vec<String>,
}

impl Rewriter {
    pub fn new(symbols: &DiscoveredSymbols) -> Result<Self> {
        let mut classes = Vec::new();
        let mut namespaces = Vec::new();
        let mut constants = Vec::new();
        let mut functions = Vec::new();
        let mut namespaced_functions = Vec::new();

        for symbol in symbols.changed() {
            let Some(replacement) = symbol.replacement() else {
                continue;
            };
            match symbol.kind() {
                SymbolKind::Namespace => namespaces.push(namespace_rule(symbol, replacement)?),
                SymbolKind::Class | SymbolKind::Interface | SymbolKind::Trait => {
                    if symbol.is_global() {
                        classes.push(plain_rule("replace_classname", symbol, replacement)?);
                    }
                }
                SymbolKind::Function if symbol.is_global() => {
                    let rule = plain_rule("replace_function", symbol, replacement)?;
                    let quoted = compile(
                        "replace_function",
                        &format!(
                            r#"(?:(?i:\buse\s+function)\s+\\?({name})(?:\s*[;,]|\s+as\b)|(?i:\b(?:{callables}))\s*\(\s*['"]\\?({name})['"])"#,
                            name = regex::escape(symbol.original_symbol()),
                            callables = CALLABLE_FUNCTIONS,
                        ),
                    )?;
                    functions.push(NameRule { rule, quoted });
                }
                SymbolKind::Function => namespaced_functions.push(replacement.to_string()),
                SymbolKind::Constant => {
                    let rule = plain_rule("replace_constant", symbol, replacement)?;
                    let quoted = compile(
                        "replace_constant",
                        &format!(
                            r#"(?:(?i:\b(?:define|defined|constant))\s*\(\s*['"]\\?({name})['"]|(?i:\buse\s+const)\s+\\?({name})(?:\s*[;,]|\s+as\b))"#,
                            name = regex::escape(symbol.original_symbol()),
                        ),
                    )?;
                    constants.push(NameRule { rule, quoted });
                }
            }
        }

        namespaces.sort_by(|a, b| b.rule.original.len().cmp(&a.rule.original.len()));
        debug!(
            "rewriter: {} classes, {} namespaces, {} constants, {} functions",
            classes.len(),
            namespaces.len(),
            constants.len(),
            functions.len()
        );

        Ok(Self {
            classes,
            namespaces,
            constants,
            functions,
            namespaced_functions,
        })
    }

    /// Whether there is nothing to rewrite.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
            && self.namespaces.is_empty()
            && self.constants.is_empty()
            && self.functions.is_empty()
    }

    /// Rewrite one file's contents.
    pub fn rewrite(&self, contents: &str) -> Result<String> {
        let contents = self.replace_classnames(contents)?;
        let contents = self.replace_namespaces(&contents);
        let contents = self.replace_constants(&contents)?;
        self.replace_functions(&contents)
    }

    /// Rewrite dependency files in place through `fs`.
    ///
    /// Files that are not PHP or must not be prefixed are left alone.  A
    /// file that cannot be read or written is logged and skipped; a pattern
    /// failure aborts the batch before the file is written.
    pub fn replace_in_files(&self, files: &[File], fs: &dyn FileSystem) -> Result<ChangedFiles> {
        let mut changed = ChangedFiles::new();
        for file in files.iter().filter(|f| f.is_php() && f.do_prefix) {
            if self.rewrite_path(&file.target_path, fs)? {
                changed.record(&file.target_path, file.package.clone());
            }
        }
        info!("rewrote {} of {} files", changed.len(), files.len());
        Ok(changed)
    }

    /// Rewrite the consuming project's own files (call sites).
    pub fn replace_in_project_files(
        &self,
        paths: &[PathBuf],
        fs: &dyn FileSystem,
    ) -> Result<ChangedFiles> {
        let mut changed = ChangedFiles::new();
        for path in paths {
            if self.rewrite_path(path, fs)? {
                changed.record(path, None);
            }
        }
        info!("updated call sites in {} of {} project files", changed.len(), paths.len());
        Ok(changed)
    }

    /// Returns whether the file was changed.
    fn rewrite_path(&self, path: &Path, fs: &dyn FileSystem) -> Result<bool> {
        let contents = match fs.read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("skipping {}: {}", path.display(), e);
                return Ok(false);
            }
        };
        let rewritten = self.rewrite(&contents).map_err(|e| PrefixError::Rewrite {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
        if rewritten == contents {
            return Ok(false);
        }
        if let Err(e) = fs.write(path, &rewritten) {
            warn!("could not write {}: {}", path.display(), e);
            return Ok(false);
        }
        debug!("rewrote {}", path.display());
        Ok(true)
    }

    /// Global class, interface and trait names.
    ///
    /// Inside a named namespace an unqualified name refers to that
    /// namespace, so only `\Name` and `use Name` are rewritten there.
    /// Strings are rewritten only when they hold just the name; of the
    /// comments only docblocks are rewritten.
    fn replace_classnames(&self, contents: &str) -> Result<String> {
        let bytes = contents.as_bytes();
        let candidates: Vec<&Rule> = self
            .classes
            .iter()
            .filter(|r| memmem::find(bytes, r.needle.as_bytes()).is_some())
            .collect();
        if candidates.is_empty() {
            return Ok(contents.to_string());
        }

        let mask = mask_code(contents, MaskOptions::CODE_ONLY);
        let with_strings = mask_code(contents, MaskOptions::KEEP_STRINGS);
        let regions = namespace_regions(contents, &mask)?;
        let bodies = class_bodies(&mask)?;

        let mut edits = Vec::new();
        for rule in candidates {
            for m in rule.pattern.find_iter(contents) {
                let (start, end) = (m.start(), m.end());
                if bytes
                    .get(end)
                    .is_some_and(|&b| is_ident_byte(b) || b == b'\\')
                {
                    continue;
                }
                let lead = leading_backslashes(bytes, start);
                let before = start - lead;
                if !is_code_at(contents, &mask, start) {
                    if is_code_at(contents, &with_strings, start) {
                        // A string names a class only when it holds nothing else.
                        if quoted_whole(bytes, before, end) {
                            edits.push(Edit {
                                start,
                                end,
                                text: &rule.replacement,
                            });
                        }
                        continue;
                    }
                    if !in_docblock(bytes, &with_strings, start) {
                        continue;
                    }
                }
                if before > 0 && (is_ident_byte(bytes[before - 1]) || bytes[before - 1] == b'$') {
                    continue;
                }
                if after_member_operator(bytes, before) {
                    continue;
                }
                let word = word_before(bytes, before);
                if word_in(word, &["function", "const", "as", "namespace"]) {
                    continue;
                }
                let global = region_at(&regions, start).is_some_and(|r| r.is_global());
                let imported = word_in(word, &["use"]) && !inside_any(&bodies, start);
                if !global && lead == 0 && !imported {
                    continue;
                }
                edits.push(Edit {
                    start,
                    end,
                    text: &rule.replacement,
                });
            }
        }
        Ok(apply_edits(contents, edits))
    }

    fn replace_namespaces(&self, contents: &str) -> String {
        let bytes = contents.as_bytes();
        let mut edits = Vec::new();

        for ns in &self.namespaces {
            let rule = &ns.rule;
            if memmem::find(bytes, rule.needle.as_bytes()).is_none() {
                continue;
            }
            let mut pos = 0;
            while let Some(m) = rule.pattern.find_at(contents, pos) {
                pos = m.end();
                let (start, end) = (m.start(), m.end());
                let lead = leading_backslashes(bytes, start);
                let Some(after_keyword) = namespace_preceded_ok(bytes, start, lead) else {
                    continue;
                };

                let doubled = m.as_str().contains(r"\\")
                    || lead >= 2
                    || bytes[end..].starts_with(br"\\");
                let replacement = if doubled {
                    &ns.doubled_replacement
                } else {
                    &rule.replacement
                };

                let after = start + replacement.len();
                if bytes[start..].starts_with(replacement.as_bytes())
                    && !bytes.get(after).is_some_and(|&b| is_ident_byte(b))
                {
                    pos = pos.max(after);
                    continue;
                }
                if !namespace_followed_ok(bytes, end, after_keyword) {
                    continue;
                }
                edits.push(Edit {
                    start,
                    end,
                    text: replacement,
                });
            }
        }

        let rewritten = apply_edits(contents, edits);
        self.qualify_function_calls(&rewritten)
    }

    /// A call to a function whose namespace was just prefixed must be
    /// absolute, so `Prefix\Lib\helper(` becomes `\Prefix\Lib\helper(`.
    fn qualify_function_calls(&self, contents: &str) -> String {
        let bytes = contents.as_bytes();
        let mut edits = Vec::new();
        for name in &self.namespaced_functions {
            for start in memmem::find_iter(bytes, name.as_bytes()) {
                let end = start + name.len();
                if start > 0 && (is_ident_byte(bytes[start - 1]) || bytes[start - 1] == b'\\') {
                    continue;
                }
                if bytes.get(end).is_some_and(|&b| is_ident_byte(b)) || !followed_by_call(bytes, end) {
                    continue;
                }
                edits.push(Edit {
                    start,
                    end: start,
                    text: "\\",
                });
            }
        }
        apply_edits(contents, edits)
    }

    /// Global constants: `define()`, `defined()`, `constant()` and
    /// `use const` forms, plus bare references in code.
    fn replace_constants(&self, contents: &str) -> Result<String> {
        let bytes = contents.as_bytes();
        let candidates: Vec<&NameRule> = self
            .constants
            .iter()
            .filter(|r| memmem::find(bytes, r.rule.needle.as_bytes()).is_some())
            .collect();
        if candidates.is_empty() {
            return Ok(contents.to_string());
        }

        let mask = mask_code(contents, MaskOptions::CODE_ONLY);
        let bodies = class_bodies(&mask)?;
        let mut edits = Vec::new();

        for name_rule in candidates {
            let rule = &name_rule.rule;
            push_quoted_edits(&name_rule.quoted, contents, &mask, rule, &mut edits);

            for m in rule.pattern.find_iter(contents) {
                let (start, end) = (m.start(), m.end());
                if !is_code_at(contents, &mask, start) {
                    continue;
                }
                if start > 0 {
                    let prev = bytes[start - 1];
                    if is_ident_byte(prev) || prev == b'$' {
                        continue;
                    }
                    if prev == b'\\' && start > 1 && is_ident_byte(bytes[start - 2]) {
                        continue;
                    }
                }
                if bytes
                    .get(end)
                    .is_some_and(|&b| is_ident_byte(b) || b == b'\\')
                    || bytes[end..].starts_with(b"::")
                    || followed_by_call(bytes, end)
                {
                    continue;
                }
                let before = start - leading_backslashes(bytes, start);
                if after_member_operator(bytes, before) {
                    continue;
                }
                let word = word_before(bytes, before);
                if word_in(
                    word,
                    &[
                        "new",
                        "class",
                        "interface",
                        "trait",
                        "enum",
                        "function",
                        "extends",
                        "implements",
                        "instanceof",
                        "namespace",
                        "insteadof",
                        "as",
                        "goto",
                    ],
                ) {
                    continue;
                }
                // Class constants and enum cases; a `case NAME:` label in a
                // method's switch is still a reference.
                if inside_any(&bodies, start)
                    && (word_in(word, &["const"])
                        || word_in(word, &["case"]) && declares_case(bytes, end))
                {
                    continue;
                }
                edits.push(Edit {
                    start,
                    end,
                    text: &rule.replacement,
                });
            }
        }
        Ok(apply_edits(contents, edits))
    }

    /// Global functions: `use function` imports, string arguments of
    /// callable-taking built-ins, declarations and calls.  Methods and
    /// method calls keep their names.
    fn replace_functions(&self, contents: &str) -> Result<String> {
        let bytes = contents.as_bytes();
        let candidates: Vec<&NameRule> = self
            .functions
            .iter()
            .filter(|r| memmem::find(bytes, r.rule.needle.as_bytes()).is_some())
            .collect();
        if candidates.is_empty() {
            return Ok(contents.to_string());
        }

        let mask = mask_code(contents, MaskOptions::CODE_ONLY);
        let regions = namespace_regions(contents, &mask)?;
        let bodies = class_bodies(&mask)?;
        let mut edits = Vec::new();

        for name_rule in candidates {
            let rule = &name_rule.rule;
            push_quoted_edits(&name_rule.quoted, contents, &mask, rule, &mut edits);

            // Named namespaces that declare a function of the same short
            // name; an unqualified call there resolves to that function.
            let shadowed: Vec<usize> = rule
                .pattern
                .find_iter(contents)
                .filter(|m| {
                    is_code_at(contents, &mask, m.start())
                        && !bytes.get(m.end()).is_some_and(|&b| is_ident_byte(b))
                        && !inside_any(&bodies, m.start())
                        && word_in(word_before(bytes, m.start()), &["function"])
                })
                .filter_map(|m| region_at(&regions, m.start()))
                .filter(|r| !r.is_global())
                .map(|r| r.start)
                .collect();

            for m in rule.pattern.find_iter(contents) {
                let (start, end) = (m.start(), m.end());
                if !is_code_at(contents, &mask, start) || !followed_by_call(bytes, end) {
                    continue;
                }
                if bytes.get(end).is_some_and(|&b| is_ident_byte(b)) {
                    continue;
                }
                if start > 0 {
                    let prev = bytes[start - 1];
                    if is_ident_byte(prev) || prev == b'$' {
                        continue;
                    }
                    if prev == b'\\' && start > 1 && is_ident_byte(bytes[start - 2]) {
                        continue;
                    }
                }
                let before = start - leading_backslashes(bytes, start);
                if after_member_operator(bytes, before) {
                    continue;
                }
                let word = word_before(bytes, before);
                if word_in(word, &["new"]) {
                    continue;
                }
                if word_in(word, &["function"]) && inside_any(&bodies, start) {
                    continue;
                }
                if let Some(region) = region_at(&regions, start).filter(|r| !r.is_global()) {
                    let unqualified = start == before;
                    if word_in(word, &["function"])
                        || unqualified && shadowed.contains(&region.start)
                    {
                        continue;
                    }
                }
                edits.push(Edit {
                    start,
                    end,
                    text: &rule.replacement,
                });
            }
        }
        Ok(apply_edits(contents, edits))
    }
}

/// Queue edits for the name captured by a quoted/imported-form pattern,
/// when the form itself starts in code.
fn push_quoted_edits<'a>(
    quoted: &Regex,
    contents: &str,
    mask: &[u8],
    rule: &'a Rule,
    edits: &mut Vec<Edit<'a>>,
) {
    for caps in quoted.captures_iter(contents) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1).or_else(|| caps.get(2))) else {
            continue;
        };
        if !is_code_at(contents, mask, whole.start())
            || after_member_operator(contents.as_bytes(), whole.start())
        {
            continue;
        }
        edits.push(Edit {
            start: name.start(),
            end: name.end(),
            text: &rule.replacement,
        });
    }
}

fn plain_rule(operation: &'static str, symbol: &DiscoveredSymbol, replacement: &str) -> Result<Rule> {
    let original = symbol.original_symbol();
    Ok(Rule {
        original: original.to_string(),
        replacement: replacement.to_string(),
        needle: original.to_string(),
        pattern: compile(operation, &regex::escape(original))?,
    })
}

fn namespace_rule(symbol: &DiscoveredSymbol, replacement: &str) -> Result<NamespaceRule> {
    let original = symbol.original_symbol();
    let segments: Vec<String> = original.split('\\').map(regex::escape).collect();
    let single = segments.join(r"\\");
    let source = if segments.len() > 1 {
        format!(r"(?:{}|{})", segments.join(r"\\\\"), single)
    } else {
        single
    };
    Ok(NamespaceRule {
        rule: Rule {
            original: original.to_string(),
            replacement: replacement.to_string(),
            needle: original.split('\\').next().unwrap_or(original).to_string(),
            pattern: compile("replace_namespace", &source)?,
        },
        doubled_replacement: replacement.replace('\\', r"\\"),
    })
}

/// Rewrite `contents` with the replacements in `symbols`.
pub fn replace_in_string(symbols: &DiscoveredSymbols, contents: &str) -> Result<String> {
    Rewriter::new(symbols)?.rewrite(contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::MemoryFileSystem;

    fn file() -> File {
        File::new("/vendor/a/b/src/A.php", "a/b/src/A.php")
    }

    /// Build a symbol set with explicit replacements.
    fn symbols(entries: &[(SymbolKind, &str, Option<&str>, &str)]) -> DiscoveredSymbols {
        let mut symbols = DiscoveredSymbols::new();
        for &(kind, name, namespace, replacement) in entries {
            let mut symbol = DiscoveredSymbol::new(kind, name, namespace, &file());
            symbol.set_replacement(replacement);
            symbols.add(symbol);
        }
        symbols
    }

    fn rewrite(symbols: &DiscoveredSymbols, contents: &str) -> String {
        let once = replace_in_string(symbols, contents).unwrap();
        let twice = replace_in_string(symbols, &once).unwrap();
        assert_eq!(once, twice, "rewrite is not idempotent for {contents:?}");
        once
    }

    fn namespace(name: &str, replacement: &str) -> DiscoveredSymbols {
        symbols(&[(SymbolKind::Namespace, name, None, replacement)])
    }

    #[test]
    fn test_namespace_declaration() {
        let s = namespace("Foo\\Bar", "Strauss\\Foo\\Bar");
        assert_eq!(
            rewrite(&s, "namespace Foo\\Bar; class Baz {}"),
            "namespace Strauss\\Foo\\Bar; class Baz {}"
        );
        assert_eq!(
            rewrite(&s, "<?php\nnamespace Foo\\Bar {\n}\n"),
            "<?php\nnamespace Strauss\\Foo\\Bar {\n}\n"
        );
    }

    #[test]
    fn test_namespace_reference_contexts() {
        let s = namespace("Foo\\Bar", "Pfx\\Foo\\Bar");
        let input = r#"<?php
use Foo\Bar\Baz;
use Foo\Bar\Qux as Alias;
use function Foo\Bar\helper;
use Foo\Bar\{Baz, Qux as Q};
use function Foo\Bar\{a, b};
$a = new \Foo\Bar\Baz();
$b = Foo\Bar\Baz::class;
$c = ['k' => \Foo\Bar\Baz::NAME];
$d = $x instanceof Foo\Bar\Baz;
function f(\Foo\Bar\Baz $x): ?Foo\Bar\Baz {}
/** @var Foo\Bar\Baz $e */
$s = 'Foo\Bar\Baz';
"#;
        let expected = r#"<?php
use Pfx\Foo\Bar\Baz;
use Pfx\Foo\Bar\Qux as Alias;
use function Pfx\Foo\Bar\helper;
use Pfx\Foo\Bar\{Baz, Qux as Q};
use function Pfx\Foo\Bar\{a, b};
$a = new \Pfx\Foo\Bar\Baz();
$b = Pfx\Foo\Bar\Baz::class;
$c = ['k' => \Pfx\Foo\Bar\Baz::NAME];
$d = $x instanceof Pfx\Foo\Bar\Baz;
function f(\Pfx\Foo\Bar\Baz $x): ?Pfx\Foo\Bar\Baz {}
/** @var Pfx\Foo\Bar\Baz $e */
$s = 'Pfx\Foo\Bar\Baz';
"#;
        assert_eq!(rewrite(&s, input), expected);
    }

    #[test]
    fn test_namespace_after_error_suppression_and_casts() {
        let s = namespace("Foo\\Bar", "Pfx\\Foo\\Bar");
        let input = "<?php\n$x = @Foo\\Bar\\Baz::make();\nreturn @Foo\\Bar\\Baz::make();\n$y = (string) Foo\\Bar\\Baz::NAME;\n$z = (object)Foo\\Bar\\Baz::all();\n";
        let expected = "<?php\n$x = @Pfx\\Foo\\Bar\\Baz::make();\nreturn @Pfx\\Foo\\Bar\\Baz::make();\n$y = (string) Pfx\\Foo\\Bar\\Baz::NAME;\n$z = (object)Pfx\\Foo\\Bar\\Baz::all();\n";
        assert_eq!(rewrite(&s, input), expected);
    }

    #[test]
    fn test_namespace_not_matched_inside_identifiers_or_prose() {
        let s = namespace("Foo", "Pfx\\Foo");
        let input = "<?php\n$Foo = 1;\n$x->Foo;\necho \"Foo is great\";\nclass FooBar {}\n$y = My\\Foo\\Thing::class;\n";
        assert_eq!(rewrite(&s, input), input);
    }

    #[test]
    fn test_doubled_backslashes_in_strings() {
        let s = namespace("Example\\Sdk\\Endpoints", "Strauss\\Example\\Sdk\\Endpoints");
        assert_eq!(
            rewrite(&s, r#"$c = "Example\\Sdk\\Endpoints";"#),
            r#"$c = "Strauss\\Example\\Sdk\\Endpoints";"#
        );
        assert_eq!(
            rewrite(&s, r#"$c = "\\Example\\Sdk\\Endpoints\\Client";"#),
            r#"$c = "\\Strauss\\Example\\Sdk\\Endpoints\\Client";"#
        );
    }

    #[test]
    fn test_single_segment_namespace_in_doubled_string() {
        let s = namespace("Dragon", "Dragon\\Dependencies\\Dragon");
        assert_eq!(
            rewrite(&s, r#"$c = "Dragon\\Form";"#),
            r#"$c = "Dragon\\Dependencies\\Dragon\\Form";"#
        );
    }

    #[test]
    fn test_no_double_prefixing() {
        let s = namespace("Dragon", "Dragon\\Dependencies\\Dragon");
        let already = "namespace Dragon\\Dependencies\\Dragon\\Form;";
        assert_eq!(rewrite(&s, already), already);
        assert_eq!(
            rewrite(&s, "namespace Dragon\\Form;"),
            "namespace Dragon\\Dependencies\\Dragon\\Form;"
        );
    }

    #[test]
    fn test_nested_namespace_rule_wins() {
        let s = symbols(&[
            (SymbolKind::Namespace, "Lib", None, "One\\Lib"),
            (SymbolKind::Namespace, "Lib\\Sub", None, "Two\\Sub"),
        ]);
        assert_eq!(
            rewrite(&s, "<?php\nuse Lib\\Sub\\Thing;\nuse Lib\\Other;\n"),
            "<?php\nuse Two\\Sub\\Thing;\nuse One\\Lib\\Other;\n"
        );
    }

    #[test]
    fn test_namespaced_function_call_becomes_absolute() {
        let s = symbols(&[
            (SymbolKind::Namespace, "Lib", None, "Pfx\\Lib"),
            (SymbolKind::Function, "helper", Some("Lib"), "Pfx\\Lib\\helper"),
        ]);
        assert_eq!(
            rewrite(&s, "<?php\n$x = Lib\\helper(1);\n"),
            "<?php\n$x = \\Pfx\\Lib\\helper(1);\n"
        );
    }

    #[test]
    fn test_global_class_outside_namespace() {
        let s = symbols(&[(SymbolKind::Class, "Whatever", None, "Pfx_Whatever")]);
        let input = "<?php\nclass Whatever {}\n$a = new Whatever();\n$b = Whatever::make();\n$c = $Whatever;\n$d = $o->Whatever;\nclass WhateverElse extends \\Whatever {}\n/** @return \\Whatever|Other */\n";
        let expected = "<?php\nclass Pfx_Whatever {}\n$a = new Pfx_Whatever();\n$b = Pfx_Whatever::make();\n$c = $Whatever;\n$d = $o->Whatever;\nclass WhateverElse extends \\Pfx_Whatever {}\n/** @return \\Pfx_Whatever|Other */\n";
        assert_eq!(rewrite(&s, input), expected);
    }

    #[test]
    fn test_global_class_in_strings_and_comments() {
        let s = symbols(&[(SymbolKind::Class, "Whatever", None, "Pfx_Whatever")]);
        let input = "<?php\necho 'Whatever you do'; // Whatever happens\n# Whatever\n$a = 'Whatever';\n$b = class_exists(\"\\\\Whatever\");\n/* Whatever */\n/** @var Whatever $c */\n";
        let expected = "<?php\necho 'Whatever you do'; // Whatever happens\n# Whatever\n$a = 'Pfx_Whatever';\n$b = class_exists(\"\\\\Pfx_Whatever\");\n/* Whatever */\n/** @var Pfx_Whatever $c */\n";
        assert_eq!(rewrite(&s, input), expected);

        let input = "<?php\nnamespace App;\n$a = 'Whatever';\n/** @var Whatever $b */\n";
        let expected = "<?php\nnamespace App;\n$a = 'Pfx_Whatever';\n/** @var Whatever $b */\n";
        assert_eq!(rewrite(&s, input), expected);
    }

    #[test]
    fn test_global_class_use_alias_keeps_alias() {
        let s = symbols(&[(SymbolKind::Class, "Client", None, "Pfx_Client")]);
        assert_eq!(
            rewrite(&s, "<?php\nuse Client as Client;\n"),
            "<?php\nuse Pfx_Client as Client;\n"
        );
    }

    #[test]
    fn test_global_class_inside_named_namespace() {
        let s = symbols(&[(SymbolKind::Class, "Y", None, "Pfx_Y")]);
        let input = "<?php\nnamespace A {\n    use Y;\n    class X extends Y {}\n    $z = new \\Y();\n}\nnamespace {\n    class Y {}\n}\n";
        let expected = "<?php\nnamespace A {\n    use Pfx_Y;\n    class X extends Y {}\n    $z = new \\Pfx_Y();\n}\nnamespace {\n    class Pfx_Y {}\n}\n";
        assert_eq!(rewrite(&s, input), expected);
    }

    #[test]
    fn test_method_named_like_class_is_untouched() {
        let s = symbols(&[(SymbolKind::Class, "Render", None, "Pfx_Render")]);
        let input = "<?php\nclass View {\n    public function Render() {}\n}\n";
        assert_eq!(rewrite(&s, input), input);
    }

    #[test]
    fn test_functions_and_methods() {
        let s = symbols(&[(SymbolKind::Function, "my_function", None, "pfx_my_function")]);
        let input = "<?php\nfunction my_function() {}\nclass Thing {\n    public function my_function() {}\n}\nmy_function();\n$obj->my_function();\nThing::my_function();\n$x = \\my_function();\n// my_function() is described here\n";
        let expected = "<?php\nfunction pfx_my_function() {}\nclass Thing {\n    public function my_function() {}\n}\npfx_my_function();\n$obj->my_function();\nThing::my_function();\n$x = \\pfx_my_function();\n// my_function() is described here\n";
        assert_eq!(rewrite(&s, input), expected);
    }

    #[test]
    fn test_namespaced_function_shadows_global() {
        let s = symbols(&[
            (SymbolKind::Function, "helper", None, "pfx_helper"),
            (SymbolKind::Namespace, "Lib", None, "Pfx\\Lib"),
            (SymbolKind::Function, "helper", Some("Lib"), "Pfx\\Lib\\helper"),
        ]);
        assert_eq!(
            rewrite(&s, "<?php\nnamespace Lib;\nfunction helper() {}\nhelper();\n\\helper();\n"),
            "<?php\nnamespace Pfx\\Lib;\nfunction helper() {}\nhelper();\n\\pfx_helper();\n"
        );
        assert_eq!(
            rewrite(&s, "<?php\nnamespace App;\nhelper();\n"),
            "<?php\nnamespace App;\npfx_helper();\n"
        );
        assert_eq!(
            rewrite(&s, "<?php\nfunction helper() {}\nhelper();\n"),
            "<?php\nfunction pfx_helper() {}\npfx_helper();\n"
        );
    }

    #[test]
    fn test_function_exists_guard_and_callables() {
        let s = symbols(&[(SymbolKind::Function, "collect", None, "pfx_collect")]);
        let input = "<?php\nif (!function_exists('collect')) {\n    function collect($v = null) {}\n}\ncall_user_func_array(\"collect\", []);\nuse function collect as gather;\n";
        let expected = "<?php\nif (!function_exists('pfx_collect')) {\n    function pfx_collect($v = null) {}\n}\ncall_user_func_array(\"pfx_collect\", []);\nuse function pfx_collect as gather;\n";
        assert_eq!(rewrite(&s, input), expected);
    }

    #[test]
    fn test_constants() {
        let s = symbols(&[(SymbolKind::Constant, "MY_CONST", None, "PFX_MY_CONST")]);
        let input = "<?php\ndefine('MY_CONST', 1);\nif (defined(\"MY_CONST\")) { echo MY_CONST; }\n$v = constant('MY_CONST');\nclass K {\n    const MY_CONST = 2;\n    function f() { return self::MY_CONST . \\MY_CONST; }\n}\n// MY_CONST in a comment\n$s = 'MY_CONST';\n";
        let expected = "<?php\ndefine('PFX_MY_CONST', 1);\nif (defined(\"PFX_MY_CONST\")) { echo PFX_MY_CONST; }\n$v = constant('PFX_MY_CONST');\nclass K {\n    const MY_CONST = 2;\n    function f() { return self::MY_CONST . \\PFX_MY_CONST; }\n}\n// MY_CONST in a comment\n$s = 'MY_CONST';\n";
        assert_eq!(rewrite(&s, input), expected);
    }

    #[test]
    fn test_constant_in_switch_case_and_enum_case() {
        let s = symbols(&[(SymbolKind::Constant, "MY_CONST", None, "PFX_MY_CONST")]);
        let input = "<?php\nclass K {\n    function f($x) {\n        switch ($x) {\n            case MY_CONST:\n                return 1;\n        }\n    }\n}\nenum E: string {\n    case MY_CONST = 'a';\n}\nenum F {\n    case MY_CONST;\n}\n";
        let expected = "<?php\nclass K {\n    function f($x) {\n        switch ($x) {\n            case PFX_MY_CONST:\n                return 1;\n        }\n    }\n}\nenum E: string {\n    case MY_CONST = 'a';\n}\nenum F {\n    case MY_CONST;\n}\n";
        assert_eq!(rewrite(&s, input), expected);
    }

    #[test]
    fn test_excluded_symbols_are_never_rewritten() {
        let mut symbols = DiscoveredSymbols::new();
        let mut ns = DiscoveredSymbol::new(SymbolKind::Namespace, "Psr\\Log", None, &file());
        ns.set_replacement("Pfx\\Psr\\Log");
        ns.exclude();
        symbols.add(ns);
        let input = "<?php\nuse Psr\\Log\\LoggerInterface;\n";
        assert_eq!(rewrite(&symbols, input), input);
    }

    #[test]
    fn test_untouched_lines_are_byte_identical() {
        let s = namespace("Foo", "Pfx\\Foo");
        let input = "<?php\r\n\t// keep   this\r\nuse Foo\\A;\r\n  $x  =  1 ;\r\n";
        assert_eq!(
            rewrite(&s, input),
            "<?php\r\n\t// keep   this\r\nuse Pfx\\Foo\\A;\r\n  $x  =  1 ;\r\n"
        );
    }

    #[test]
    fn test_replace_in_files_records_only_changes() {
        let fs = MemoryFileSystem::new();
        fs.insert("/v/a/b/Changed.php", "<?php\nnamespace Foo;\n");
        fs.insert("/v/a/b/Same.php", "<?php\necho 1;\n");
        let files = vec![
            File::new("/v/a/b/Changed.php", "a/b/Changed.php").with_package("a/b"),
            File::new("/v/a/b/Same.php", "a/b/Same.php"),
            File::new("/v/a/b/Gone.php", "a/b/Gone.php"),
        ];
        let rewriter = Rewriter::new(&namespace("Foo", "Pfx\\Foo")).unwrap();
        let changed = rewriter.replace_in_files(&files, &fs).unwrap();

        assert_eq!(changed.len(), 1);
        assert_eq!(changed.package_of(Path::new("/v/a/b/Changed.php")), Some("a/b"));
        assert_eq!(fs.written_paths(), vec![PathBuf::from("/v/a/b/Changed.php")]);
        assert_eq!(
            fs.get(Path::new("/v/a/b/Changed.php")).as_deref(),
            Some("<?php\nnamespace Pfx\\Foo;\n")
        );
    }

    #[test]
    fn test_project_files_record_no_package() {
        let fs = MemoryFileSystem::new();
        fs.insert("/p/src/App.php", "<?php\nuse Foo\\Client;\n");
        let rewriter = Rewriter::new(&namespace("Foo", "Pfx\\Foo")).unwrap();
        let changed = rewriter
            .replace_in_project_files(&[PathBuf::from("/p/src/App.php")], &fs)
            .unwrap();
        assert!(changed.contains(Path::new("/p/src/App.php")));
        assert_eq!(changed.package_of(Path::new("/p/src/App.php")), None);
    }
}
