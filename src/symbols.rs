//! The symbol model.
//!
//! Every namespace, class, interface, trait, function and constant the
//! scanner finds becomes one [`DiscoveredSymbol`], stored once in
//! [`DiscoveredSymbols`] no matter how many files declare it.  The rename
//! decision engine later attaches a replacement to each symbol; after that
//! the model is only read.

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::files::File;

/// Sentinel namespace for symbols declared outside any named namespace.
pub const GLOBAL_NAMESPACE: &str = "\\";

/// The closed set of symbol kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolKind {
    Namespace,
    Class,
    Interface,
    Trait,
    Function,
    Constant,
}

impl SymbolKind {
    /// Classes, interfaces and traits share one PHP symbol table.
    pub fn is_class_like(self) -> bool {
        matches!(
            self,
            SymbolKind::Class | SymbolKind::Interface | SymbolKind::Trait
        )
    }

    /// The PHP keyword (or function) that declares this kind.
    pub fn keyword(self) -> &'static str {
        match self {
            SymbolKind::Namespace => "namespace",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Trait => "trait",
            SymbolKind::Function => "function",
            SymbolKind::Constant => "define",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Identity of a symbol inside [`DiscoveredSymbols`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolKey {
    pub kind: SymbolKind,
    /// Fully qualified name, without a leading backslash.
    pub name: String,
}

impl SymbolKey {
    pub fn new(kind: SymbolKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

/// A declared symbol and the decision taken about it.
#[derive(Debug, Clone)]
pub struct DiscoveredSymbol {
    kind: SymbolKind,
    /// Fully qualified name as declared.  For namespaces, the namespace
    /// itself.
    original: String,
    /// Enclosing namespace, or [`GLOBAL_NAMESPACE`].
    namespace: String,
    replacement: Option<String>,
    do_rename: bool,
    source_files: Vec<PathBuf>,
    package: Option<String>,
    /// Whether any declaring file may be prefixed.
    in_prefixed_file: bool,
}

impl DiscoveredSymbol {
    /// A symbol declared in `file`.  `namespace` is the enclosing namespace
    /// (`None` for the global namespace); `name` is the short name for
    /// class-likes and functions, the full name for namespaces and
    /// constants.
    pub fn new(kind: SymbolKind, name: &str, namespace: Option<&str>, file: &File) -> Self {
        let name = name.trim_start_matches('\\');
        let namespace = namespace
            .map(|ns| ns.trim_matches('\\'))
            .filter(|ns| !ns.is_empty());

        let (original, namespace) = match (kind, namespace) {
            (SymbolKind::Namespace, _) => (name.to_string(), name.to_string()),
            (_, Some(ns)) if kind != SymbolKind::Constant => {
                (format!("{}\\{}", ns, name), ns.to_string())
            }
            _ => (name.to_string(), GLOBAL_NAMESPACE.to_string()),
        };

        Self {
            kind,
            original,
            namespace,
            replacement: None,
            do_rename: true,
            source_files: vec![file.source_path.clone()],
            package: file.package.clone(),
            in_prefixed_file: file.do_prefix,
        }
    }

    pub fn key(&self) -> SymbolKey {
        SymbolKey::new(self.kind, self.original.clone())
    }

    pub fn kind(&self) -> SymbolKind {
        self.kind
    }

    pub fn original_symbol(&self) -> &str {
        &self.original
    }

    /// The last segment of the original name.
    pub fn short_name(&self) -> &str {
        short_name(&self.original)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Declared outside any named namespace.
    pub fn is_global(&self) -> bool {
        self.kind != SymbolKind::Namespace && self.namespace == GLOBAL_NAMESPACE
    }

    pub fn replacement(&self) -> Option<&str> {
        self.replacement.as_deref()
    }

    /// Record the replacement.  A replacement is decided once; later calls
    /// keep the first value.
    pub fn set_replacement(&mut self, replacement: impl Into<String>) {
        if self.replacement.is_none() {
            self.replacement = Some(replacement.into());
        }
    }

    pub fn do_rename(&self) -> bool {
        self.do_rename
    }

    /// Mark the symbol as never to be rewritten.  This cannot be undone.
    pub fn exclude(&mut self) {
        self.do_rename = false;
    }

    /// Whether rewriting would change occurrences of this symbol.
    pub fn is_changed(&self) -> bool {
        self.do_rename
            && self
                .replacement
                .as_deref()
                .is_some_and(|r| r != self.original)
    }

    pub fn source_files(&self) -> &[PathBuf] {
        &self.source_files
    }

    pub fn package(&self) -> Option<&str> {
        self.package.as_deref()
    }

    /// Whether at least one file declaring this symbol may be prefixed.
    pub fn found_in_prefixed_file(&self) -> bool {
        self.in_prefixed_file
    }

    fn add_source_file(&mut self, path: &Path) {
        if !self.source_files.iter().any(|p| p == path) {
            self.source_files.push(path.to_path_buf());
        }
    }
}

/// The last `\`-separated segment of a name.
pub fn short_name(name: &str) -> &str {
    name.rsplit('\\').next().unwrap_or(name)
}

/// All symbols found in a run, keyed by kind and fully qualified name, in
/// discovery order.
#[derive(Debug, Clone, Default)]
pub struct DiscoveredSymbols {
    symbols: IndexMap<SymbolKey, DiscoveredSymbol>,
}

impl DiscoveredSymbols {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a symbol, merging its source files into an existing entry with
    /// the same kind and name.  Returns the key.
    pub fn add(&mut self, symbol: DiscoveredSymbol) -> SymbolKey {
        let key = symbol.key();
        match self.symbols.get_mut(&key) {
            Some(existing) => {
                for path in &symbol.source_files {
                    existing.add_source_file(path);
                }
                if existing.package.is_none() {
                    existing.package = symbol.package;
                }
                existing.in_prefixed_file |= symbol.in_prefixed_file;
                if !symbol.do_rename {
                    existing.exclude();
                }
            }
            None => {
                self.symbols.insert(key.clone(), symbol);
            }
        }
        key
    }

    pub fn get(&self, kind: SymbolKind, name: &str) -> Option<&DiscoveredSymbol> {
        self.symbols
            .get(&SymbolKey::new(kind, name.trim_start_matches('\\')))
    }

    pub fn get_mut(&mut self, kind: SymbolKind, name: &str) -> Option<&mut DiscoveredSymbol> {
        self.symbols
            .get_mut(&SymbolKey::new(kind, name.trim_start_matches('\\')))
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiscoveredSymbol> {
        self.symbols.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DiscoveredSymbol> {
        self.symbols.values_mut()
    }

    pub fn of_kind(&self, kind: SymbolKind) -> impl Iterator<Item = &DiscoveredSymbol> {
        self.iter().filter(move |s| s.kind == kind)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &DiscoveredSymbol> {
        self.of_kind(SymbolKind::Namespace)
    }

    pub fn class_likes(&self) -> impl Iterator<Item = &DiscoveredSymbol> {
        self.iter().filter(|s| s.kind.is_class_like())
    }

    /// Class, interface or trait with this fully qualified name.
    pub fn class_like(&self, fqcn: &str) -> Option<&DiscoveredSymbol> {
        [SymbolKind::Class, SymbolKind::Interface, SymbolKind::Trait]
            .into_iter()
            .find_map(|kind| self.get(kind, fqcn))
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Symbols whose occurrences the rewriter will change.
    pub fn changed(&self) -> impl Iterator<Item = &DiscoveredSymbol> {
        self.iter().filter(|s| s.is_changed())
    }
}
