/// Composer manifest support.
///
/// This module reads the parts of a project's `composer.json` the prefixer
/// cares about: the package name (used to derive default prefixes) and the
/// `extra.strauss` configuration block.  It also
/// knows how Composer lays packages out on disk, so a file's owning
/// package can be recovered from its path.
///
/// The manifest is deserialised straight into typed structs instead of a
/// `serde_json::Value`, so the order of keys in objects such as
/// `namespace_replacement_patterns` is the order written in the file.
use std::path::{Component, Path};

use serde::Deserialize;

use crate::config::PrefixerConfig;
use crate::error::{PrefixError, Result};

/// The subset of `composer.json` used by the prefixer.
#[derive(Debug, Default, Deserialize)]
pub struct ComposerManifest {
    /// The package name, e.g. `"brianhenryie/my-plugin"`.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub extra: ComposerExtra,
}

#[derive(Debug, Default, Deserialize)]
pub struct ComposerExtra {
    #[serde(default)]
    pub strauss: Option<PrefixerConfig>,
}

/// Parse the `composer.json` at the given workspace root.
///
/// Returns `Ok(None)` when the file does not exist; a file that exists but
/// cannot be read or parsed is a configuration error.
pub fn read_manifest(workspace_root: &Path) -> Result<Option<ComposerManifest>> {
    let composer_path = workspace_root.join("composer.json");
    if !composer_path.is_file() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&composer_path)
        .map_err(|e| PrefixError::io(&composer_path, e))?;
    parse_manifest(&content)
        .map(Some)
        .map_err(|reason| PrefixError::Config {
            path: composer_path,
            reason,
        })
}

/// Parse manifest text.  The error is a human-readable reason.
pub fn parse_manifest(content: &str) -> std::result::Result<ComposerManifest, String> {
    serde_json::from_str(content).map_err(|e| e.to_string())
}

/// Recover the owning package from a path relative to a vendor (or
/// prefixed target) directory: `brianhenryie/color-logger/src/Logger.php`
/// belongs to `brianhenryie/color-logger`.
///
/// Paths with fewer than three components (no file under a package
/// directory) have no package.
pub fn package_from_relative_path(relative: &Path) -> Option<String> {
    let mut parts = relative.components().filter_map(|c| match c {
        Component::Normal(s) => s.to_str(),
        _ => None,
    });
    let vendor = parts.next()?;
    let name = parts.next()?;
    // There must be something inside the package directory.
    parts.next()?;
    if vendor.starts_with('.') {
        return None;
    }
    Some(format!("{}/{}", vendor, name))
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Helper: create a temporary workspace with a composer.json.
    struct TestWorkspace {
        dir: tempfile::TempDir,
    }

    impl TestWorkspace {
        fn new(composer_json: &str) -> Self {
            let dir = tempfile::tempdir().expect("failed to create temp dir");
            fs::write(dir.path().join("composer.json"), composer_json)
                .expect("failed to write composer.json");
            TestWorkspace { dir }
        }

        fn root(&self) -> &Path {
            self.dir.path()
        }
    }

    #[test]
    fn test_read_name() {
        let ws = TestWorkspace::new(
            r#"{
                "name": "brianhenryie/my-plugin",
                "config": { "vendor-dir": "lib/" }
            }"#,
        );

        let manifest = read_manifest(ws.root()).unwrap().unwrap();
        assert_eq!(manifest.name.as_deref(), Some("brianhenryie/my-plugin"));
        assert!(manifest.extra.strauss.is_none());
    }

    #[test]
    fn test_read_no_composer_json() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        assert!(read_manifest(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_read_invalid_json_is_config_error() {
        let ws = TestWorkspace::new("not valid json {{{");
        let err = read_manifest(ws.root()).unwrap_err();
        assert!(matches!(err, PrefixError::Config { .. }));
    }

    #[test]
    fn test_replacement_patterns_keep_document_order() {
        let ws = TestWorkspace::new(
            r#"{
                "extra": {
                    "strauss": {
                        "namespace_replacement_patterns": {
                            "~Zeta\\\\(.*)~": "Z\\$1",
                            "~Alpha\\\\(.*)~": "A\\$1",
                            "~Mu\\\\(.*)~": "M\\$1"
                        }
                    }
                }
            }"#,
        );

        let manifest = read_manifest(ws.root()).unwrap().unwrap();
        let config = manifest.extra.strauss.unwrap();
        let keys: Vec<&str> = config
            .namespace_replacement_patterns
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, vec!["~Zeta\\\\(.*)~", "~Alpha\\\\(.*)~", "~Mu\\\\(.*)~"]);
    }

    #[test]
    fn test_package_from_relative_path() {
        assert_eq!(
            package_from_relative_path(Path::new("psr/log/src/LoggerInterface.php")).as_deref(),
            Some("psr/log")
        );
        assert_eq!(
            package_from_relative_path(Path::new("psr/log/Psr/Log/A.php")).as_deref(),
            Some("psr/log")
        );
        assert_eq!(package_from_relative_path(Path::new("autoload.php")), None);
        assert_eq!(
            package_from_relative_path(Path::new("composer/autoload_real.php")),
            None
        );
        assert_eq!(package_from_relative_path(Path::new("psr/log")), None);
    }
}
