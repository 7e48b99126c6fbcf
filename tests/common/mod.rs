#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use php_prefixer::{
    DiscoveredSymbols, File, MemoryFileSystem, PrefixerConfig, Replacements, SymbolScanner,
};

/// Helper: a temporary project with a composer.json and a directory of
/// dependency copies to prefix.
pub struct TestProject {
    dir: tempfile::TempDir,
}

impl TestProject {
    pub fn new(composer_json: &str) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        fs::write(dir.path().join("composer.json"), composer_json)
            .expect("failed to write composer.json");
        TestProject { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative_path: &str) -> PathBuf {
        self.dir.path().join(relative_path)
    }

    /// Create a file at the given relative path.
    pub fn write(&self, relative_path: &str, content: &str) {
        let full_path = self.path(relative_path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).expect("failed to create dirs");
        }
        fs::write(&full_path, content).expect("failed to write file");
    }

    pub fn read(&self, relative_path: &str) -> String {
        fs::read_to_string(self.path(relative_path)).expect("failed to read file")
    }

    pub fn exists(&self, relative_path: &str) -> bool {
        self.path(relative_path).is_file()
    }
}

/// A configuration with every prefix set.
pub fn prefixed_config(namespace_prefix: &str) -> PrefixerConfig {
    PrefixerConfig {
        namespace_prefix: Some(namespace_prefix.to_string()),
        classmap_prefix: Some("Pfx_".to_string()),
        functions_prefix: Some("pfx_".to_string()),
        constants_prefix: Some("PFX_".to_string()),
        ..PrefixerConfig::default()
    }
}

/// Scan in-memory files and decide their replacements.
///
/// Each entry is `(path relative to the vendor directory, contents)`.
pub fn decide(config: &PrefixerConfig, files: &[(&str, &str)]) -> DiscoveredSymbols {
    let fs = MemoryFileSystem::new();
    let mut entries = Vec::new();
    for (relative, contents) in files {
        let path = Path::new("/vendor-prefixed").join(relative);
        fs.insert(path.clone(), *contents);
        entries.push(File::new(path, *relative));
    }
    let scanner = SymbolScanner::new(config).expect("scanner");
    let mut symbols = scanner
        .find_in_files(&mut entries, &fs)
        .expect("scan failed");
    Replacements::new(config)
        .expect("rules")
        .determine_replacements(&mut symbols)
        .expect("decisions failed");
    symbols
}
