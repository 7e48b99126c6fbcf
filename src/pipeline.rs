//! One prefixing run, end to end.
//!
//! ```text
//! enumerate target files -> scan -> decide -> rewrite dependencies
//!   -> (rewrite project call sites) -> aliases file -> autoload.php require
//! ```
//!
//! The target directory already holds the dependency copies to prefix;
//! they are rewritten in place.  All reads and writes go through the given
//! [`FileSystem`], so a dry run only differs in the filesystem it passes.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::aliases::{
    ALIASES_FILE, ClassMap, insert_aliases_require, write_aliases_file_for_symbols,
};
use crate::config::{Exclusions, PrefixerConfig};
use crate::error::{PrefixError, Result};
use crate::files::{FileSystem, enumerate_php_files};
use crate::replacements::Replacements;
use crate::rewriter::{ChangedFiles, Rewriter};
use crate::scanner::SymbolScanner;

/// What a run did.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub files_scanned: usize,
    pub symbols_found: usize,
    pub symbols_renamed: usize,
    /// Every file the run modified, dependencies and project files alike.
    pub changed_files: ChangedFiles,
    pub aliases_file: Option<PathBuf>,
    /// Whether `autoload.php` gained the aliases require in this run.
    pub autoload_updated: bool,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files scanned, {} symbols found, {} renamed, {} files changed",
            self.files_scanned,
            self.symbols_found,
            self.symbols_renamed,
            self.changed_files.len()
        )?;
        if let Some(path) = &self.aliases_file {
            write!(f, ", aliases in {}", path.display())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PrefixerConfig,
    project_dir: PathBuf,
}

impl Pipeline {
    pub fn new(config: PrefixerConfig, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            project_dir: project_dir.into(),
        }
    }

    pub fn config(&self) -> &PrefixerConfig {
        &self.config
    }

    pub fn target_dir(&self) -> PathBuf {
        self.project_dir.join(&self.config.target_directory)
    }

    pub fn run(&self, fs: &dyn FileSystem) -> Result<RunReport> {
        let target_dir = self.target_dir();
        if !target_dir.is_dir() {
            return Err(PrefixError::io(
                &target_dir,
                io::Error::new(io::ErrorKind::NotFound, "target directory does not exist"),
            ));
        }

        let exclusions = Exclusions::from_config(&self.config)?;
        let mut files = enumerate_php_files(&target_dir, &exclusions);
        // A previous run's aliases file declares the original names again.
        files.retain(|file| file.relative_path != Path::new(ALIASES_FILE));
        info!("found {} PHP files in {}", files.len(), target_dir.display());

        let scanner = SymbolScanner::new(&self.config)?;
        let mut symbols = scanner.find_in_files(&mut files, fs)?;

        Replacements::new(&self.config)?.determine_replacements(&mut symbols)?;

        let rewriter = Rewriter::new(&symbols)?;
        let mut changed_files = rewriter.replace_in_files(&files, fs)?;

        if self.config.update_call_sites {
            let project_files = self.project_files();
            changed_files.extend(rewriter.replace_in_project_files(&project_files, fs)?);
        }

        let mut report = RunReport {
            files_scanned: files.len(),
            symbols_found: symbols.len(),
            symbols_renamed: symbols.changed().count(),
            changed_files,
            ..RunReport::default()
        };

        if self.config.include_aliases {
            let classmap = ClassMap::from_files(&files, fs, &scanner)?;
            report.aliases_file =
                write_aliases_file_for_symbols(&symbols, &classmap, &target_dir, fs)?;
            if report.aliases_file.is_some() {
                report.autoload_updated = self.load_aliases(&target_dir, fs)?;
            }
        }

        info!("{}", report);
        Ok(report)
    }

    /// PHP files of the consuming project whose call sites are updated.
    fn project_files(&self) -> Vec<PathBuf> {
        let none = Exclusions::default();
        self.config
            .call_site_directories
            .iter()
            .map(|dir| self.project_dir.join(dir))
            .filter(|dir| dir.is_dir())
            .flat_map(|dir| enumerate_php_files(&dir, &none))
            .map(|file| file.target_path)
            .collect()
    }

    fn load_aliases(&self, target_dir: &Path, fs: &dyn FileSystem) -> Result<bool> {
        let autoload = target_dir.join("autoload.php");
        if !fs.exists(&autoload) {
            warn!(
                "{} not found, the aliases file must be required manually",
                autoload.display()
            );
            return Ok(false);
        }
        insert_aliases_require(&autoload, fs)
    }
}
