//! Compiler configuration, loaded from TOML.
//!
//! ```toml
//! [expansion]
//! max_passes = 64
//! builtin_rules = true
//! rule_files = ["rules/extra.toml"]
//!
//! [classification]
//! naming_heuristics = true
//!
//! [normalization]
//! merge_sub_properties = true
//! simplify_ranges = true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Top-level compiler configuration. Every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    pub expansion: ExpansionConfig,
    pub classification: ClassificationConfig,
    pub normalization: NormalizationConfig,
}

/// Fixpoint expansion settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpansionConfig {
    /// Upper bound on expansion passes (default: 64).
    #[serde(default = "default_max_passes")]
    pub max_passes: usize,
    /// Include the built-in rule set (default: true).
    #[serde(default = "default_true")]
    pub builtin_rules: bool,
    /// Extra rule files, relative to the working directory.
    #[serde(default)]
    pub rule_files: Vec<PathBuf>,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            max_passes: default_max_passes(),
            builtin_rules: true,
            rule_files: Vec::new(),
        }
    }
}

/// Node classifier settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassificationConfig {
    /// Classify untyped named nodes by the case of their local name
    /// (default: true).
    #[serde(default = "default_true")]
    pub naming_heuristics: bool,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            naming_heuristics: true,
        }
    }
}

/// Normalizer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NormalizationConfig {
    /// Fold super-property rules into sub-properties (default: true).
    #[serde(default = "default_true")]
    pub merge_sub_properties: bool,
    /// Remove redundant supertype operands from range expressions (default: true).
    #[serde(default = "default_true")]
    pub simplify_ranges: bool,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            merge_sub_properties: true,
            simplify_ranges: true,
        }
    }
}

fn default_max_passes() -> usize {
    64
}

fn default_true() -> bool {
    true
}

impl CompilerConfig {
    /// Read and validate a TOML configuration file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Parse and validate a TOML configuration string.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        Self::parse(text, "<inline>")
    }

    fn parse(text: &str, origin: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.expansion.max_passes == 0 {
            return Err(ConfigError::Invalid {
                message: "expansion.max_passes must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        let config = CompilerConfig::from_toml_str("").unwrap();
        assert_eq!(config, CompilerConfig::default());
        assert_eq!(config.expansion.max_passes, 64);
        assert!(config.expansion.builtin_rules);
        assert!(config.classification.naming_heuristics);
        assert!(config.normalization.merge_sub_properties);
        assert!(config.normalization.simplify_ranges);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config = CompilerConfig::from_toml_str(
            "[expansion]\nmax_passes = 8\n[classification]\nnaming_heuristics = false\n",
        )
        .unwrap();
        assert_eq!(config.expansion.max_passes, 8);
        assert!(config.expansion.builtin_rules);
        assert!(!config.classification.naming_heuristics);
        assert!(config.normalization.simplify_ranges);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = CompilerConfig::from_toml_str("[expansion]\nmax_pass = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn zero_passes_is_invalid() {
        let err = CompilerConfig::from_toml_str("[expansion]\nmax_passes = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ontoprofile.toml");
        std::fs::write(&path, "[normalization]\nsimplify_ranges = false\n").unwrap();
        let config = CompilerConfig::load(&path).unwrap();
        assert!(!config.normalization.simplify_ranges);

        let missing = CompilerConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }
}
