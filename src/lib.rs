//! Prefixing of PHP dependencies.
//!
//! A PHP plugin that bundles its Composer dependencies can clash with any
//! other plugin bundling different versions of the same libraries.  This
//! crate rewrites a copy of those dependencies so every namespace, class,
//! interface, trait, function and constant they declare carries a
//! project-specific prefix, and updates every reference to match.
//!
//! A run has four stages, each usable on its own:
//!
//! 1. [`SymbolScanner`] finds the symbols the dependency files declare;
//! 2. [`Replacements`] decides the new name of each one;
//! 3. [`Rewriter`] rewrites declarations and references in source text;
//! 4. the [`aliases`] module generates a file that keeps the original
//!    names working.
//!
//! [`Pipeline`] strings them together over a directory.

pub mod aliases;
pub mod builtins;
pub mod composer;
pub mod config;
pub mod error;
pub mod files;
pub mod lexer;
pub mod patterns;
pub mod pipeline;
pub mod replacements;
pub mod rewriter;
pub mod scanner;
pub mod symbols;

pub use aliases::{ClassMap, insert_aliases_require, render_aliases, write_aliases_file_for_symbols};
pub use config::{ExcludeConfig, Exclusions, PrefixerConfig};
pub use error::{PrefixError, Result};
pub use files::{File, FileSystem, LocalFileSystem, MemoryFileSystem, enumerate_php_files};
pub use pipeline::{Pipeline, RunReport};
pub use replacements::Replacements;
pub use rewriter::{ChangedFiles, Rewriter, replace_in_string};
pub use scanner::SymbolScanner;
pub use symbols::{DiscoveredSymbol, DiscoveredSymbols, SymbolKey, SymbolKind};
