//! Files and the filesystem abstraction.
//!
//! The rewriting core never touches `std::fs` directly: it reads and writes
//! through [`FileSystem`], so tests and dry runs can swap in
//! [`MemoryFileSystem`].

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::warn;

use crate::composer::package_from_relative_path;
use crate::config::Exclusions;
use crate::symbols::SymbolKey;

/// A candidate source file handed to the scanner and rewriter.
#[derive(Debug, Clone)]
pub struct File {
    /// Where the scanner reads the file from.
    pub source_path: PathBuf,
    /// Where the rewriter reads and writes the file.
    pub target_path: PathBuf,
    /// Path relative to the dependency root, used for exclusion patterns.
    pub relative_path: PathBuf,
    /// Owning Composer package, `None` for project files.
    pub package: Option<String>,
    pub is_autoloaded: bool,
    /// Whether occurrences in this file may be rewritten.
    pub do_prefix: bool,
    pub do_copy: bool,
    /// Symbols the scanner found declared in this file.
    pub discovered_symbols: Vec<SymbolKey>,
}

impl File {
    /// A file rewritten in place.
    pub fn new(path: impl Into<PathBuf>, relative_path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            source_path: path.clone(),
            target_path: path,
            relative_path: relative_path.into(),
            package: None,
            is_autoloaded: true,
            do_prefix: true,
            do_copy: true,
            discovered_symbols: Vec::new(),
        }
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    pub fn is_php(&self) -> bool {
        self.source_path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("php") || e.eq_ignore_ascii_case("inc"))
    }
}

/// Read/write access to file contents.
pub trait FileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;
    fn exists(&self, path: &Path) -> bool;
}

/// The real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// An in-memory filesystem.
///
/// With `read_through` enabled, paths not held in memory are read from
/// disk; writes always stay in memory.  That makes it a dry-run overlay
/// for the real filesystem.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: Mutex<BTreeMap<PathBuf, String>>,
    written: Mutex<Vec<PathBuf>>,
    read_through: bool,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// An overlay over the real filesystem.
    pub fn overlay() -> Self {
        Self {
            read_through: true,
            ..Self::default()
        }
    }

    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        self.files.lock().insert(path.into(), contents.into());
    }

    pub fn get(&self, path: &Path) -> Option<String> {
        self.files.lock().get(path).cloned()
    }

    /// Paths written since creation, in write order.
    pub fn written_paths(&self) -> Vec<PathBuf> {
        self.written.lock().clone()
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        if let Some(contents) = self.files.lock().get(path) {
            return Ok(contents.clone());
        }
        if self.read_through {
            return std::fs::read_to_string(path);
        }
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} not found", path.display()),
        ))
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.files
            .lock()
            .insert(path.to_path_buf(), contents.to_string());
        self.written.lock().push(path.to_path_buf());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path) || (self.read_through && path.is_file())
    }
}

/// Collect every PHP file beneath `root` (a vendor or prefixed target
/// directory), in a stable order.
///
/// Each file's package is taken from its `<vendor>/<name>/` directory.
/// Files belonging to excluded packages, or matching an excluded path
/// pattern, are still returned (their declarations matter for aliases)
/// but are marked as not to be prefixed.
pub fn enumerate_php_files(root: &Path, exclusions: &Exclusions) -> Vec<File> {
    let walker = ignore::WalkBuilder::new(root)
        .hidden(false)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .parents(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable path under {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let path = entry.into_path();
        let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        let mut file = File::new(path.clone(), relative.clone());
        if !file.is_php() {
            continue;
        }
        file.package = package_from_relative_path(&relative);
        file.do_prefix = !exclusions.excludes_package(file.package.as_deref())
            && !exclusions.excludes_path(&relative);
        files.push(file);
    }
    files
}
