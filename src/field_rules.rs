//! Field rules governing how an enrichment record overlays a common record.
//!
//! A [`FieldRules`] value is built once (typically at service startup) and
//! shared read-only between merges. Each merge takes a fresh
//! [`RuleWorkingSet`] from it, which records the replacement groups the
//! enrichment layer has touched.
//!
//! The rules are:
//! - **invalid tags**: dropped from both layers; a tag not matching the
//!   validity pattern is invalid too
//! - **immutable tags**: the enrichment layer may never supply them
//! - **replacement groups**: any enrichment field of a group removes every
//!   field of that group from the common layer
//!
//! # Examples
//!
//! ```
//! use rawrepo_marcx::FieldRules;
//!
//! let rules = FieldRules::danmarc2();
//! let mut working = rules.new_working_set();
//!
//! assert!(working.is_immutable("010"));
//! working.register_local_field("245");
//! // 245 shares a group with 100, so the common 100 goes too
//! assert!(working.must_remove_from_common("100"));
//! assert!(!working.must_remove_from_common("300"));
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use regex::Regex;

use crate::error::RulesError;
use crate::fixup::MergeFixup;

/// Immutable tags of the danMARC2 rule set.
pub const IMMUTABLE_DEFAULT: &str = "010;020;990;991;996";

/// Replacement groups of the danMARC2 rule set.
///
/// Groups are separated by `;`, members of a group by a space.
pub const OVERWRITE_DEFAULT: &str = "001;004;005;013;014;017;035;036;240;243;247;300\
;008 009 038 039 100 110 239 245 652 654";

/// Invalid tags of the danMARC2 rule set.
pub const INVALID_DEFAULT: &str = "";

/// Tag validity pattern of the danMARC2 rule set.
pub const VALID_REGEX_DANMARC2: &str = r"\d{3}";

/// Immutable rule configuration for merging records.
#[derive(Clone)]
pub struct FieldRules {
    valid_pattern: Regex,
    invalid: HashSet<String>,
    immutable: HashSet<String>,
    /// Tag → index into `groups`
    group_of: IndexMap<String, usize>,
    groups: Vec<Vec<String>>,
    fixups: Vec<Arc<dyn MergeFixup>>,
}

impl fmt::Debug for FieldRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldRules")
            .field("valid_pattern", &self.valid_pattern.as_str())
            .field("invalid", &self.invalid)
            .field("immutable", &self.immutable)
            .field("groups", &self.groups)
            .field("fixups", &self.fixups.len())
            .finish()
    }
}

impl FieldRules {
    /// Build a rule set from typed collections.
    ///
    /// The validity pattern must match a whole tag; it is anchored
    /// automatically.
    ///
    /// # Errors
    ///
    /// Returns [`RulesError::DuplicateGroupTag`] if a tag appears in more
    /// than one replacement group (or twice in one group), and
    /// [`RulesError::InvalidPattern`] if the pattern does not compile.
    pub fn new<I, G, T>(
        immutable: I,
        groups: G,
        invalid: I,
        valid_pattern: &str,
    ) -> Result<Self, RulesError>
    where
        I: IntoIterator<Item = T>,
        G: IntoIterator<Item = Vec<T>>,
        T: Into<String>,
    {
        let valid_pattern = Regex::new(&format!("^(?:{valid_pattern})$"))?;

        let mut group_of = IndexMap::new();
        let mut group_list = Vec::new();
        for group in groups {
            let members: Vec<String> = group.into_iter().map(Into::into).collect();
            if members.is_empty() {
                continue;
            }
            let index = group_list.len();
            for tag in &members {
                if group_of.insert(tag.clone(), index).is_some() {
                    return Err(RulesError::DuplicateGroupTag { tag: tag.clone() });
                }
            }
            group_list.push(members);
        }

        Ok(FieldRules {
            valid_pattern,
            invalid: collect_tags(invalid),
            immutable: collect_tags(immutable),
            group_of,
            groups: group_list,
            fixups: Vec::new(),
        })
    }

    /// Build a rule set from the `;`-separated list encoding.
    ///
    /// `overwrite` separates groups with `;` and group members with spaces,
    /// as in [`OVERWRITE_DEFAULT`].
    ///
    /// # Errors
    ///
    /// See [`FieldRules::new`].
    ///
    /// # Examples
    ///
    /// ```
    /// use rawrepo_marcx::FieldRules;
    ///
    /// let rules = FieldRules::from_lists("245", "300;006 008", "", r"\d{3}").unwrap();
    /// let mut working = rules.new_working_set();
    /// working.register_local_field("008");
    /// assert!(working.must_remove_from_common("006"));
    /// ```
    pub fn from_lists(
        immutable: &str,
        overwrite: &str,
        invalid: &str,
        valid_pattern: &str,
    ) -> Result<Self, RulesError> {
        let groups = split_list(overwrite).map(|group| {
            group
                .split(' ')
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
        });
        FieldRules::new(
            split_list(immutable).collect::<Vec<_>>(),
            groups,
            split_list(invalid).collect::<Vec<_>>(),
            valid_pattern,
        )
    }

    /// The danMARC2 rule set used when nothing else is configured.
    #[must_use]
    pub fn danmarc2() -> Self {
        FieldRules::from_lists(
            IMMUTABLE_DEFAULT,
            OVERWRITE_DEFAULT,
            INVALID_DEFAULT,
            VALID_REGEX_DANMARC2,
        )
        .expect("danMARC2 defaults are consistent")
    }

    /// The danMARC2 rule set where an enrichment `006` replaces the common one.
    #[must_use]
    pub fn danmarc2_overwrite_006() -> Self {
        FieldRules::from_lists(
            IMMUTABLE_DEFAULT,
            &format!("006;{OVERWRITE_DEFAULT}"),
            INVALID_DEFAULT,
            VALID_REGEX_DANMARC2,
        )
        .expect("danMARC2 defaults are consistent")
    }

    /// Append a post-merge fixup. Fixups run in the order they were added.
    #[must_use]
    pub fn with_fixup(mut self, fixup: impl MergeFixup + 'static) -> Self {
        self.fixups.push(Arc::new(fixup));
        self
    }

    /// Post-merge fixups in run order
    #[must_use]
    pub fn fixups(&self) -> &[Arc<dyn MergeFixup>] {
        &self.fixups
    }

    /// Start the working set for one merge.
    #[must_use]
    pub fn new_working_set(&self) -> RuleWorkingSet<'_> {
        RuleWorkingSet {
            rules: self,
            immutable: self.immutable.clone(),
            to_remove_from_common: HashSet::new(),
        }
    }

    /// Whether a tag is unwanted: it fails the validity pattern or is
    /// listed as invalid.
    #[must_use]
    pub fn is_invalid(&self, tag: &str) -> bool {
        self.is_invalid_with(tag, false)
    }

    /// Like [`FieldRules::is_invalid`], but skips the validity pattern when
    /// `include_all_fields` is set. The invalid-tag list always applies.
    #[must_use]
    pub fn is_invalid_with(&self, tag: &str, include_all_fields: bool) -> bool {
        (!include_all_fields && !self.valid_pattern.is_match(tag)) || self.invalid.contains(tag)
    }

    /// Whether a tag can never be supplied by the enrichment layer
    #[must_use]
    pub fn is_immutable(&self, tag: &str) -> bool {
        self.immutable.contains(tag)
    }

    /// The replacement group containing `tag`, if any
    #[must_use]
    pub fn replacement_group(&self, tag: &str) -> Option<&[String]> {
        self.group_of
            .get(tag)
            .map(|&index| self.groups[index].as_slice())
    }

    /// All replacement groups in configuration order
    #[must_use]
    pub fn replacement_groups(&self) -> &[Vec<String>] {
        &self.groups
    }
}

impl Default for FieldRules {
    fn default() -> Self {
        FieldRules::danmarc2()
    }
}

/// Per-merge state derived from a [`FieldRules`].
#[derive(Debug)]
pub struct RuleWorkingSet<'a> {
    rules: &'a FieldRules,
    immutable: HashSet<String>,
    to_remove_from_common: HashSet<String>,
}

impl RuleWorkingSet<'_> {
    /// Register the presence of an enrichment field.
    ///
    /// If the tag belongs to a replacement group, every tag of that group is
    /// scheduled for removal from the common record.
    pub fn register_local_field(&mut self, tag: &str) {
        if let Some(group) = self.rules.replacement_group(tag) {
            self.to_remove_from_common.extend(group.iter().cloned());
        }
    }

    /// See [`FieldRules::is_invalid`]
    #[must_use]
    pub fn is_invalid(&self, tag: &str) -> bool {
        self.rules.is_invalid(tag)
    }

    /// See [`FieldRules::is_invalid_with`]
    #[must_use]
    pub fn is_invalid_with(&self, tag: &str, include_all_fields: bool) -> bool {
        self.rules.is_invalid_with(tag, include_all_fields)
    }

    /// Whether the enrichment layer may not supply this tag
    #[must_use]
    pub fn is_immutable(&self, tag: &str) -> bool {
        self.immutable.contains(tag)
    }

    /// Whether common fields with this tag must be dropped
    #[must_use]
    pub fn must_remove_from_common(&self, tag: &str) -> bool {
        self.to_remove_from_common.contains(tag)
    }
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(';').filter(|s| !s.is_empty())
}

fn collect_tags<I, T>(tags: I) -> HashSet<String>
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    tags.into_iter().map(Into::into).collect()
}
