//! Names the scanner must never record as dependency symbols.
//!
//! The lists are data: the shipped function list lives in
//! `builtins/polyfill_functions.txt` and can be extended through the
//! `polyfill_functions` configuration key without touching the scanner.

use std::collections::HashSet;

const SHIPPED_POLYFILL_FUNCTIONS: &str = include_str!("builtins/polyfill_functions.txt");

/// Words that can follow `class`/`interface`/`trait` in valid code without
/// being a declared name, or that PHP reserves as type names.
const RESERVED_CLASS_NAMES: &[&str] = &[
    "extends",
    "implements",
    "self",
    "static",
    "parent",
    "array",
    "callable",
    "bool",
    "false",
    "float",
    "int",
    "iterable",
    "mixed",
    "never",
    "null",
    "object",
    "string",
    "true",
    "void",
];

/// Built-in and polyfilled function names, matched case-insensitively as
/// PHP matches function names.
#[derive(Debug, Clone)]
pub struct BuiltinFunctions {
    names: HashSet<String>,
}

impl BuiltinFunctions {
    /// The shipped list.
    pub fn shipped() -> Self {
        Self::with_extra(std::iter::empty::<&str>())
    }

    /// The shipped list plus `extra` names.
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: HashSet<String> = parse_name_list(SHIPPED_POLYFILL_FUNCTIONS).collect();
        names.extend(
            extra
                .into_iter()
                .map(|n| n.as_ref().trim().trim_start_matches('\\').to_ascii_lowercase())
                .filter(|n| !n.is_empty()),
        );
        Self { names }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn parse_name_list(data: &str) -> impl Iterator<Item = String> + '_ {
    data.lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(str::to_ascii_lowercase)
}

/// Whether `name` cannot be a user-declared class, interface or trait.
pub fn is_reserved_class_name(name: &str) -> bool {
    RESERVED_CLASS_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}
