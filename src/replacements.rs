//! Rename decisions.
//!
//! Given every discovered symbol, decide what each one becomes.  This runs
//! once per run, after scanning and before any file is rewritten; the
//! rewriter and the alias generator only read the decisions.
//!
//! Namespaces are decided first because namespaced classes, interfaces,
//! traits and functions derive their new names from their namespace.
//! Global class-likes, functions and constants get a flat prefix.  Every
//! rule checks for an already-applied prefix so a second run over
//! prefixed code decides the same names again.

use regex::{NoExpand, Regex};
use tracing::{debug, info};

use crate::config::{Exclusions, PrefixerConfig};
use crate::error::{PrefixError, Result, compile};
use crate::patterns::{pattern_to_regex, template_to_regex};
use crate::symbols::{DiscoveredSymbols, SymbolKind};

/// A custom namespace rule from configuration.
#[derive(Debug, Clone)]
struct CustomRule {
    pattern: Regex,
    template: String,
}

/// The compiled rename rules for one run.
#[derive(Debug, Clone)]
pub struct Replacements {
    namespace_prefix: Option<String>,
    classmap_prefix: Option<String>,
    functions_prefix: Option<String>,
    constants_prefix: Option<String>,
    /// Custom rules in configuration order.
    custom_rules: Vec<CustomRule>,
    /// `^(?:prefix\\)*`, stripping any prefix already applied.
    default_rule: Option<Regex>,
    exclusions: Exclusions,
}

impl Replacements {
    pub fn new(config: &PrefixerConfig) -> Result<Self> {
        let custom_rules = config
            .namespace_replacement_patterns
            .iter()
            .map(|(pattern, template)| compile_custom_rule(pattern, template))
            .collect::<Result<Vec<_>>>()?;

        let namespace_prefix = config.namespace_prefix().map(str::to_string);
        let default_rule = match &namespace_prefix {
            Some(prefix) => Some(compile(
                "default_namespace_rule",
                &format!(r"^(?:{}\\)*", regex::escape(prefix)),
            )?),
            None => None,
        };

        Ok(Self {
            namespace_prefix,
            classmap_prefix: config.classmap_prefix().map(str::to_string),
            functions_prefix: config.functions_prefix().map(str::to_string),
            constants_prefix: config.constants_prefix().map(str::to_string),
            custom_rules,
            default_rule,
            exclusions: Exclusions::from_config(config)?,
        })
    }

    /// Decide the replacement (or exclusion) of every symbol.
    pub fn determine_replacements(&self, symbols: &mut DiscoveredSymbols) -> Result<()> {
        for symbol in symbols
            .iter_mut()
            .filter(|s| s.kind() == SymbolKind::Namespace)
        {
            let name = symbol.original_symbol().to_string();
            if self.exclusions.excludes_namespace(&name) {
                debug!("namespace {} is excluded", name);
                symbol.exclude();
                continue;
            }
            if !symbol.found_in_prefixed_file() {
                debug!("namespace {} only declared in excluded files", name);
                symbol.exclude();
                continue;
            }
            if !symbol.do_rename() {
                continue;
            }
            match self.namespace_replacement(&name) {
                Some(replacement) => {
                    debug!("namespace {} -> {}", name, replacement);
                    symbol.set_replacement(replacement);
                }
                None => debug!("no rule matches namespace {}, leaving it unchanged", name),
            }
        }

        // Namespace decisions, looked up by the symbols declared inside.
        let namespaces: Vec<(String, Option<String>)> = symbols
            .namespaces()
            .map(|ns| {
                let replacement = ns
                    .do_rename()
                    .then(|| ns.replacement().map(str::to_string))
                    .flatten();
                (ns.original_symbol().to_string(), replacement)
            })
            .collect();

        for symbol in symbols.iter_mut() {
            let kind = symbol.kind();
            if kind == SymbolKind::Namespace || !symbol.do_rename() {
                continue;
            }
            if !symbol.found_in_prefixed_file() {
                debug!("{} {} only declared in excluded files", kind, symbol.original_symbol());
                symbol.exclude();
                continue;
            }

            if !symbol.is_global() {
                let namespace = symbol.namespace().to_string();
                let replacement = namespaces
                    .iter()
                    .find(|(name, _)| *name == namespace)
                    .and_then(|(_, replacement)| replacement.as_deref())
                    .filter(|replacement| *replacement != namespace);
                match replacement {
                    Some(replacement) => {
                        let renamed = symbol.original_symbol().replacen(&namespace, replacement, 1);
                        symbol.set_replacement(renamed);
                    }
                    None => symbol.exclude(),
                }
                continue;
            }

            let prefix = match kind {
                SymbolKind::Class | SymbolKind::Interface | SymbolKind::Trait => {
                    self.classmap_prefix.as_deref()
                }
                SymbolKind::Function => self.functions_prefix.as_deref(),
                SymbolKind::Constant => self.constants_prefix.as_deref(),
                SymbolKind::Namespace => None,
            };
            let Some(prefix) = prefix else {
                debug!("no prefix configured for global {} {}", kind, symbol.original_symbol());
                continue;
            };
            let original = symbol.original_symbol().to_string();
            if original.starts_with(prefix) {
                symbol.set_replacement(original);
            } else {
                symbol.set_replacement(format!("{}{}", prefix, original));
            }
        }

        info!(
            "{} of {} symbols will be renamed",
            symbols.changed().count(),
            symbols.len()
        );
        Ok(())
    }

    /// Apply the first matching rule to a namespace name.
    fn namespace_replacement(&self, name: &str) -> Option<String> {
        if let Some(rule) = self.custom_rules.iter().find(|r| r.pattern.is_match(name)) {
            return Some(
                rule.pattern
                    .replacen(name, 1, rule.template.as_str())
                    .into_owned(),
            );
        }
        let (prefix, rule) = self.namespace_prefix.as_deref().zip(self.default_rule.as_ref())?;
        let unprefixed = rule.replacen(name, 1, NoExpand(""));
        Some(format!("{}\\{}", prefix, unprefixed))
    }

    pub fn namespace_prefix(&self) -> Option<&str> {
        self.namespace_prefix.as_deref()
    }
}

fn compile_custom_rule(pattern: &str, template: &str) -> Result<CustomRule> {
    if pattern.is_empty() {
        return Err(PrefixError::InvalidReplacementPattern {
            pattern: pattern.to_string(),
            reason: "pattern is empty".to_string(),
        });
    }
    let source = pattern_to_regex(pattern);
    let compiled = match compile("namespace_replacement_patterns", &source) {
        Ok(compiled) => compiled,
        Err(PrefixError::Pattern { source, .. }) => {
            return Err(PrefixError::InvalidReplacementPattern {
                pattern: pattern.to_string(),
                reason: source.to_string(),
            });
        }
        Err(e) => return Err(e),
    };
    Ok(CustomRule {
        pattern: compiled,
        template: template_to_regex(template),
    })
}
