//! Prefixer configuration.
//!
//! The keys mirror the `extra.strauss` block PHP projects already carry in
//! their `composer.json`, so an existing configuration can be used as is.
//! The same keys are accepted from a standalone TOML file.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;

use crate::composer;
use crate::error::{PrefixError, Result};
use crate::patterns::pattern_to_regex;

/// Settings controlling which symbols are renamed and how.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrefixerConfig {
    /// Prefix for namespaces, e.g. `"BrianHenryIE\\MyPlugin"`.
    pub namespace_prefix: Option<String>,
    /// Prefix for classes, interfaces and traits in the global namespace.
    pub classmap_prefix: Option<String>,
    /// Prefix for functions declared in the global namespace.
    pub functions_prefix: Option<String>,
    /// Prefix for constants created with `define()`.
    #[serde(alias = "constant_prefix")]
    pub constants_prefix: Option<String>,
    /// Custom namespace rules, tried in the order written; the first
    /// pattern that matches a namespace decides its replacement.
    pub namespace_replacement_patterns: IndexMap<String, String>,
    pub exclude_from_prefix: ExcludeConfig,
    /// Extra function names to treat as built-ins or polyfills, on top of
    /// the shipped list.
    pub polyfill_functions: Vec<String>,
    /// Directory, relative to the project, holding the prefixed copies.
    pub target_directory: String,
    /// Also rewrite the consuming project's own files.
    pub update_call_sites: bool,
    /// Generate the compatibility aliases file.
    pub include_aliases: bool,
    /// Directories of the consuming project rewritten when
    /// `update_call_sites` is set.
    pub call_site_directories: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExcludeConfig {
    /// Package names, e.g. `"psr/log"`.
    pub packages: Vec<String>,
    /// Namespace prefixes, e.g. `"Psr\\Log"`.
    pub namespaces: Vec<String>,
    /// Patterns matched against file paths.
    pub file_patterns: Vec<String>,
}

impl Default for PrefixerConfig {
    fn default() -> Self {
        Self {
            namespace_prefix: None,
            classmap_prefix: None,
            functions_prefix: None,
            constants_prefix: None,
            namespace_replacement_patterns: IndexMap::new(),
            exclude_from_prefix: ExcludeConfig::default(),
            polyfill_functions: Vec::new(),
            target_directory: "vendor-prefixed".to_string(),
            update_call_sites: false,
            include_aliases: true,
            call_site_directories: vec!["src".to_string()],
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl PrefixerConfig {
    /// Load the `extra.strauss` block of the project's `composer.json`,
    /// filling missing prefixes from the package name.
    ///
    /// A project without a `composer.json`, or without the block, gets the
    /// default configuration.
    pub fn from_composer_json(project_dir: &Path) -> Result<Self> {
        let Some(manifest) = composer::read_manifest(project_dir)? else {
            return Ok(Self::default());
        };
        let name = manifest.name.clone();
        let config = manifest.extra.strauss.unwrap_or_default();
        Ok(match name {
            Some(name) => config.with_package_defaults(&name),
            None => config,
        })
    }

    /// Load configuration from a TOML file using the same keys.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PrefixError::io(path, e))?;
        Self::from_toml_str(&content, path)
    }

    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| PrefixError::Config {
            path: PathBuf::from(path),
            reason: e.to_string(),
        })
    }

    /// Fill any unset prefix from a Composer package name:
    /// `brianhenryie/my-plugin` gives the namespace prefix
    /// `Brianhenryie\My_Plugin`, the class prefix `Brianhenryie_My_Plugin_`,
    /// the function prefix `brianhenryie_my_plugin_` and the constant
    /// prefix `BRIANHENRYIE_MY_PLUGIN_`.
    pub fn with_package_defaults(mut self, package_name: &str) -> Self {
        let namespace = package_name
            .split('/')
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.split(['-', '_', '.'])
                    .filter(|w| !w.is_empty())
                    .map(capitalize)
                    .collect::<Vec<_>>()
                    .join("_")
            })
            .collect::<Vec<_>>()
            .join("\\");
        if namespace.is_empty() {
            return self;
        }
        let underscored = format!("{}_", namespace.replace('\\', "_"));

        if non_empty(&self.namespace_prefix).is_none() {
            self.namespace_prefix = Some(namespace);
        }
        if non_empty(&self.classmap_prefix).is_none() {
            self.classmap_prefix = Some(underscored.clone());
        }
        if non_empty(&self.functions_prefix).is_none() {
            self.functions_prefix = Some(underscored.to_lowercase());
        }
        if non_empty(&self.constants_prefix).is_none() {
            self.constants_prefix = Some(underscored.to_uppercase());
        }
        self
    }

    /// The namespace prefix without leading or trailing backslashes.
    pub fn namespace_prefix(&self) -> Option<&str> {
        non_empty(&self.namespace_prefix)
            .map(|p| p.trim_matches('\\'))
            .filter(|p| !p.is_empty())
    }

    pub fn classmap_prefix(&self) -> Option<&str> {
        non_empty(&self.classmap_prefix)
    }

    pub fn functions_prefix(&self) -> Option<&str> {
        non_empty(&self.functions_prefix)
    }

    pub fn constants_prefix(&self) -> Option<&str> {
        non_empty(&self.constants_prefix)
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Compiled exclusion rules.
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    packages: Vec<String>,
    namespaces: Vec<String>,
    file_patterns: Vec<Regex>,
}

impl Exclusions {
    pub fn from_config(config: &PrefixerConfig) -> Result<Self> {
        let file_patterns = config
            .exclude_from_prefix
            .file_patterns
            .iter()
            .map(|p| {
                let source = pattern_to_regex(p);
                crate::error::compile("exclude_file_patterns", &source)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            packages: config.exclude_from_prefix.packages.clone(),
            namespaces: config
                .exclude_from_prefix
                .namespaces
                .iter()
                .map(|ns| ns.trim_matches('\\').to_string())
                .filter(|ns| !ns.is_empty())
                .collect(),
            file_patterns,
        })
    }

    pub fn excludes_package(&self, package: Option<&str>) -> bool {
        package.is_some_and(|p| self.packages.iter().any(|excluded| excluded == p))
    }

    /// A namespace is excluded when it equals an excluded namespace or
    /// lies beneath one.
    pub fn excludes_namespace(&self, namespace: &str) -> bool {
        let namespace = namespace.trim_matches('\\');
        self.namespaces.iter().any(|excluded| {
            namespace == excluded
                || (namespace.starts_with(excluded.as_str())
                    && namespace[excluded.len()..].starts_with('\\'))
        })
    }

    pub fn excludes_path(&self, path: &Path) -> bool {
        if self.file_patterns.is_empty() {
            return false;
        }
        let path = path.to_string_lossy().replace('\\', "/");
        self.file_patterns.iter().any(|re| re.is_match(&path))
    }
}
