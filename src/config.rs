//! Rule-set configuration (`rules.toml`).
//!
//! ```toml
//! immutable = ["010", "020", "990", "991", "996"]
//! replacement_groups = [["001"], ["004"], ["008", "009", "245"]]
//! invalid = []
//! valid_tag_pattern = '\d{3}'
//! ```
//!
//! Every key is optional and defaults to the danMARC2 rule set. A missing
//! file yields the defaults.

use std::path::Path;

use serde::Deserialize;

use crate::error::{ConfigError, RulesError};
use crate::field_rules::{
    FieldRules, IMMUTABLE_DEFAULT, INVALID_DEFAULT, OVERWRITE_DEFAULT, VALID_REGEX_DANMARC2,
};

/// Typed rule-set configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RulesConfig {
    /// Tags the enrichment layer may never supply.
    pub immutable: Vec<String>,

    /// Groups of tags replaced together.
    pub replacement_groups: Vec<Vec<String>>,

    /// Tags dropped from both layers.
    pub invalid: Vec<String>,

    /// Pattern a tag must match as a whole to be valid.
    pub valid_tag_pattern: String,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            immutable: split_tags(IMMUTABLE_DEFAULT),
            replacement_groups: OVERWRITE_DEFAULT
                .split(';')
                .filter(|group| !group.is_empty())
                .map(|group| {
                    group
                        .split(' ')
                        .filter(|t| !t.is_empty())
                        .map(str::to_owned)
                        .collect()
                })
                .collect(),
            invalid: split_tags(INVALID_DEFAULT),
            valid_tag_pattern: VALID_REGEX_DANMARC2.to_owned(),
        }
    }
}

fn split_tags(list: &str) -> Vec<String> {
    list.split(';')
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect()
}

impl RulesConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file returns the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file exists but cannot be read, and
    /// [`ConfigError::Parse`] (carrying the path) if it is not valid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no rules file, using danMARC2 defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_owned(),
                    source,
                });
            }
        };
        Self::parse(&contents).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: Some(path.to_owned()),
                message,
            },
            other => other,
        })
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on invalid TOML or unknown keys.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start]
                    .chars()
                    .filter(|&c| c == '\n')
                    .count()
                    + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError::Parse {
                path: None,
                message,
            }
        })
    }

    /// Build the rule set.
    ///
    /// # Errors
    ///
    /// See [`FieldRules::new`].
    pub fn into_rules(self) -> Result<FieldRules, RulesError> {
        FieldRules::new(
            self.immutable,
            self.replacement_groups,
            self.invalid,
            &self.valid_tag_pattern,
        )
    }
}

/// Load a rules file and build the rule set in one step.
///
/// # Errors
///
/// See [`RulesConfig::load`] and [`RulesConfig::into_rules`].
pub fn load_rules(path: &Path) -> Result<FieldRules, ConfigError> {
    Ok(RulesConfig::load(path)?.into_rules()?)
}
