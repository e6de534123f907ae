//! Overlaying an enrichment record onto a common record.
//!
//! The merge keeps the common record's root element (and its leader) and
//! rebuilds the datafield list from both layers:
//!
//! 1. both field lists are stable-sorted by tag
//! 2. enrichment fields that are invalid or immutable are dropped; every
//!    kept one registers its replacement group
//! 3. common fields that are invalid or belong to a registered group are
//!    dropped
//! 4. the survivors are merge-joined by tag, common first on equal tags
//! 5. the rule set's fixups run over the result
//!
//! # Examples
//!
//! ```
//! use rawrepo_marcx::{merger, FieldRules};
//!
//! let common = br#"<record xmlns="info:lc/xmlns/marcxchange-v1">
//!   <datafield tag="245" ind1="0" ind2="0"><subfield code="a">Common</subfield></datafield>
//!   <datafield tag="300" ind1="0" ind2="0"><subfield code="a">200 s.</subfield></datafield>
//! </record>"#;
//! let local = br#"<record xmlns="info:lc/xmlns/marcxchange-v1">
//!   <datafield tag="245" ind1="0" ind2="0"><subfield code="a">Local</subfield></datafield>
//! </record>"#;
//!
//! let merged = merger::merge(common, local, false, &FieldRules::danmarc2())?;
//! let merged = String::from_utf8(merged).unwrap();
//! assert!(merged.contains("Local"));
//! assert!(!merged.contains("Common"));
//! assert!(merged.contains("200 s."));
//! # Ok::<(), rawrepo_marcx::MergeError>(())
//! ```

use std::sync::Arc;

use crate::error::MergeError;
use crate::field_rules::{FieldRules, RuleWorkingSet};
use crate::marcxchange::MarcxDocument;
use crate::mime::{self, MimeKind};
use crate::record::{Field, Record};

/// Merge MarcXchange `local` onto MarcXchange `common`.
///
/// `include_all_fields` lets enrichment fields whose tag fails the validity
/// pattern through; tags on the rule set's invalid list are always dropped.
///
/// # Errors
///
/// Returns [`MergeError::NotARecord`] if either document's outermost element
/// is not a MarcXchange `record`, and [`MergeError::ParseFailure`] if either
/// document is malformed.
pub fn merge(
    common: &[u8],
    local: &[u8],
    include_all_fields: bool,
    rules: &FieldRules,
) -> Result<Vec<u8>, MergeError> {
    let mut common_doc = MarcxDocument::parse(common)?;
    let local_doc = MarcxDocument::parse(local)?;

    let merged = merge_records(&common_doc.record, &local_doc.record, include_all_fields, rules);
    common_doc.record = merged;
    Ok(common_doc.to_bytes()?)
}

/// Merge the field lists of two records.
///
/// This is the document-independent part of [`merge`]: the result holds
/// only the merged fields, in merge-join order.
#[must_use]
pub fn merge_records(
    common: &Record,
    local: &Record,
    include_all_fields: bool,
    rules: &FieldRules,
) -> Record {
    tracing::debug!(
        common_fields = common.len(),
        local_fields = local.len(),
        include_all_fields,
        "merging records"
    );

    let mut working = rules.new_working_set();
    let local_fields = filter_local(sorted_fields(local), &mut working, include_all_fields);
    let common_fields = filter_common(sorted_fields(common), &working);

    let mut merged = Record::from_fields(merge_join(common_fields, local_fields));
    for fixup in rules.fixups() {
        fixup.fix(&mut merged, common, local);
    }

    tracing::debug!(merged_fields = merged.len(), "merge complete");
    merged
}

fn sorted_fields(record: &Record) -> Vec<Field> {
    let mut sorted = record.clone();
    sorted.sort_by_tag();
    sorted.fields
}

fn filter_local(
    fields: Vec<Field>,
    working: &mut RuleWorkingSet<'_>,
    include_all_fields: bool,
) -> Vec<Field> {
    fields
        .into_iter()
        .filter(|field| {
            if working.is_immutable(&field.tag) {
                tracing::trace!(tag = %field.tag, "dropping immutable enrichment field");
                return false;
            }
            if working.is_invalid_with(&field.tag, include_all_fields) {
                tracing::trace!(tag = %field.tag, "dropping invalid enrichment field");
                return false;
            }
            working.register_local_field(&field.tag);
            true
        })
        .collect()
}

fn filter_common(fields: Vec<Field>, working: &RuleWorkingSet<'_>) -> Vec<Field> {
    fields
        .into_iter()
        .filter(|field| {
            if working.is_invalid(&field.tag) {
                tracing::trace!(tag = %field.tag, "dropping invalid common field");
                return false;
            }
            if working.must_remove_from_common(&field.tag) {
                tracing::trace!(tag = %field.tag, "dropping replaced common field");
                return false;
            }
            true
        })
        .collect()
}

/// Merge two tag-sorted lists, taking the common field on equal tags.
fn merge_join(common: Vec<Field>, local: Vec<Field>) -> Vec<Field> {
    let mut merged = Vec::with_capacity(common.len() + local.len());
    let mut common = common.into_iter().peekable();
    let mut local = local.into_iter().peekable();

    loop {
        let take_common = match (common.peek(), local.peek()) {
            (Some(c), Some(l)) => c.tag <= l.tag,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_common { common.next() } else { local.next() };
        merged.extend(next);
    }
    merged
}

/// A merger bound to a shared rule set.
///
/// Cloning is cheap; clones share the same [`FieldRules`].
#[derive(Debug, Clone)]
pub struct MarcxMerger {
    rules: Arc<FieldRules>,
}

impl MarcxMerger {
    /// Create a merger over `rules`.
    #[must_use]
    pub fn new(rules: Arc<FieldRules>) -> Self {
        MarcxMerger { rules }
    }

    /// The rule set this merger applies
    #[must_use]
    pub fn rules(&self) -> &FieldRules {
        &self.rules
    }

    /// See [`merge`].
    ///
    /// # Errors
    ///
    /// See [`merge`].
    pub fn merge(
        &self,
        common: &[u8],
        local: &[u8],
        include_all_fields: bool,
    ) -> Result<Vec<u8>, MergeError> {
        merge(common, local, include_all_fields, &self.rules)
    }

    /// See [`mime::can_merge`].
    #[must_use]
    pub fn can_merge(&self, original: MimeKind, enrichment: MimeKind) -> bool {
        mime::can_merge(original, enrichment)
    }

    /// See [`mime::merged_mime`].
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::IncompatibleMimeTypes`] for a pair that cannot
    /// be merged.
    pub fn merged_mime(
        &self,
        original: MimeKind,
        enrichment: MimeKind,
    ) -> Result<MimeKind, MergeError> {
        mime::merged_mime(original, enrichment)
    }
}

impl Default for MarcxMerger {
    fn default() -> Self {
        MarcxMerger::new(Arc::new(FieldRules::danmarc2()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marcxchange::decode_record;

    fn field(tag: &str, value: &str) -> Field {
        Field::builder(tag, "00").subfield_str('a', value).build()
    }

    fn record(fields: &[(&str, &str)]) -> Record {
        Record::from_fields(fields.iter().map(|(t, v)| field(t, v)).collect())
    }

    fn tags(record: &Record) -> Vec<(&str, &str)> {
        record
            .fields()
            .map(|f| (f.tag.as_str(), f.get_subfield('a').unwrap_or("")))
            .collect()
    }

    #[test]
    fn test_immutable_fields_are_never_taken_from_local() {
        let rules = FieldRules::danmarc2();
        let common = record(&[("010", "common isbn"), ("245", "Title")]);
        let local = record(&[("010", "local isbn"), ("996", "DBC")]);

        let merged = merge_records(&common, &local, false, &rules);
        assert_eq!(tags(&merged), vec![("010", "common isbn"), ("245", "Title")]);
    }

    #[test]
    fn test_replacement_group_removes_whole_group() {
        let rules = FieldRules::danmarc2();
        let common = record(&[
            ("008", "common 008"),
            ("100", "Author"),
            ("245", "Common title"),
            ("300", "200 s."),
        ]);
        let local = record(&[("245", "Local title")]);

        let merged = merge_records(&common, &local, false, &rules);
        assert_eq!(tags(&merged), vec![("245", "Local title"), ("300", "200 s.")]);
    }

    #[test]
    fn test_merge_join_puts_common_first_on_equal_tags() {
        let rules = FieldRules::from_lists("", "", "", r"\d{3}").unwrap();
        let common = record(&[("700", "c1"), ("500", "c0"), ("700", "c2")]);
        let local = record(&[("700", "l1"), ("600", "l0")]);

        let merged = merge_records(&common, &local, false, &rules);
        assert_eq!(
            tags(&merged),
            vec![
                ("500", "c0"),
                ("600", "l0"),
                ("700", "c1"),
                ("700", "c2"),
                ("700", "l1"),
            ]
        );
    }

    #[test]
    fn test_include_all_fields_only_relaxes_local_pattern() {
        let rules = FieldRules::from_lists("", "", "999", r"\d{3}").unwrap();
        let common = record(&[("s10", "common s10"), ("245", "Title")]);
        let local = record(&[("s10", "local s10"), ("999", "never")]);

        let strict = merge_records(&common, &local, false, &rules);
        assert_eq!(tags(&strict), vec![("245", "Title")]);

        let relaxed = merge_records(&common, &local, true, &rules);
        assert_eq!(tags(&relaxed), vec![("245", "Title"), ("s10", "local s10")]);
    }

    #[test]
    fn test_fixups_run_in_order() {
        let rules = FieldRules::from_lists("", "", "", ".*")
            .unwrap()
            .with_fixup(|merged: &mut Record, _: &Record, _: &Record| {
                merged.add_field(field("999", "first"));
            })
            .with_fixup(|merged: &mut Record, _: &Record, _: &Record| {
                merged.add_field(field("999", "second"));
            });

        let merged = merge_records(&record(&[("245", "T")]), &Record::new(), false, &rules);
        assert_eq!(
            tags(&merged),
            vec![("245", "T"), ("999", "first"), ("999", "second")]
        );
    }

    const COMMON: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<marcx:record xmlns:marcx="info:lc/xmlns/marcxchange-v1" format="danMARC2" type="Bibliographic">
  <marcx:leader>00000n    2200000   4500</marcx:leader>
  <marcx:datafield tag="001" ind1="0" ind2="0">
    <marcx:subfield code="a">12345678</marcx:subfield>
    <marcx:subfield code="b">870970</marcx:subfield>
  </marcx:datafield>
  <marcx:datafield tag="245" ind1="0" ind2="0">
    <marcx:subfield code="a">Common title</marcx:subfield>
  </marcx:datafield>
</marcx:record>"#;

    const LOCAL: &str = r#"<record xmlns="info:lc/xmlns/marcxchange-v1" type="Enrichment">
  <leader>local leader</leader>
  <datafield tag="001" ind1="0" ind2="0">
    <subfield code="a">12345678</subfield>
    <subfield code="b">723000</subfield>
  </datafield>
  <datafield tag="504" ind1="0" ind2="0">
    <subfield code="a">Local note</subfield>
  </datafield>
</record>"#;

    #[test]
    fn test_merge_keeps_common_root_and_leader() {
        let merged = merge(COMMON.as_bytes(), LOCAL.as_bytes(), false, &FieldRules::danmarc2())
            .unwrap();
        let text = String::from_utf8(merged.clone()).unwrap();

        assert!(text.starts_with("<?xml"));
        assert!(text.contains(r#"<marcx:record xmlns:marcx="info:lc/xmlns/marcxchange-v1" format="danMARC2" type="Bibliographic">"#));
        assert!(text.contains("<marcx:leader>00000n    2200000   4500</marcx:leader>"));
        assert!(!text.contains("local leader"));
        assert!(!text.contains('\n'));

        let record = decode_record(&merged).unwrap();
        assert_eq!(record.agency_id(), Some("723000"));
        let tags: Vec<&str> = record.fields().map(|f| f.tag.as_str()).collect();
        assert_eq!(tags, vec!["001", "245", "504"]);
    }

    #[test]
    fn test_merge_is_deterministic() {
        let rules = FieldRules::danmarc2();
        let first = merge(COMMON.as_bytes(), LOCAL.as_bytes(), false, &rules).unwrap();
        let second = merge(COMMON.as_bytes(), LOCAL.as_bytes(), false, &rules).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_wrong_root_is_not_a_record() {
        let err = merge(
            COMMON.as_bytes(),
            br#"<collection xmlns="info:lc/xmlns/marcxchange-v1"/>"#,
            false,
            &FieldRules::danmarc2(),
        )
        .unwrap_err();
        assert!(matches!(err, MergeError::NotARecord { .. }), "{err:?}");
    }

    #[test]
    fn test_malformed_input_is_parse_failure() {
        let err = merge(b"<record", LOCAL.as_bytes(), false, &FieldRules::danmarc2()).unwrap_err();
        assert!(matches!(err, MergeError::ParseFailure(_)), "{err:?}");
    }

    #[test]
    fn test_marcx_merger_shares_rules() {
        let merger = MarcxMerger::default();
        let clone = merger.clone();
        assert!(std::ptr::eq(merger.rules(), clone.rules()));
        assert!(merger.can_merge(MimeKind::Plain, MimeKind::Enrichment));
        assert_eq!(
            merger.merged_mime(MimeKind::Simple, MimeKind::Enrichment).unwrap(),
            MimeKind::Simple
        );
        assert!(merger
            .merge(COMMON.as_bytes(), LOCAL.as_bytes(), false)
            .is_ok());
    }
}
